//! Specification grouping and ranking.
//!
//! Specifications sharing treatment, causal model and estimator form a group
//! and share a number. Outcomes get a letter. The id `B3` therefore reads
//! "second outcome seen, third group seen". Primary outcomes are ranked by
//! effect first, then secondary outcomes continue the same registries so their
//! letters and numbers follow on from the primary ones.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::domain::models::Specification;

/// First-seen registries of group keys and outcome names.
#[derive(Debug, Default)]
struct GroupRegistry {
    groups: HashMap<String, usize>,
    outcomes: HashMap<String, usize>,
}

impl GroupRegistry {
    fn index_of(map: &mut HashMap<String, usize>, key: String) -> usize {
        let next = map.len();
        *map.entry(key).or_insert(next)
    }

    fn assign(&mut self, spec: &mut Specification) {
        let group_number = Self::index_of(&mut self.groups, group_key(spec));
        let outcome_number = Self::index_of(&mut self.outcomes, spec.outcome.clone());
        spec.id = format!("{}{}", outcome_letter(outcome_number), group_number + 1);
    }
}

/// Group key: JSON array of treatment, causal model and estimator.
pub fn group_key(spec: &Specification) -> String {
    serde_json::to_string(&[&spec.treatment, &spec.causal_model, &spec.estimator])
        .unwrap_or_else(|_| format!("{}\u{0}{}\u{0}{}", spec.treatment, spec.causal_model, spec.estimator))
}

/// Bijective base-26 letter: 0 is `A`, 25 is `Z`, 26 is `AA`.
pub fn outcome_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Ascending by effect; NaN sorts after every number.
fn by_effect(a: &Specification, b: &Specification) -> Ordering {
    match (a.estimated_effect.is_nan(), b.estimated_effect.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a
            .estimated_effect
            .partial_cmp(&b.estimated_effect)
            .unwrap_or(Ordering::Equal),
    }
}

/// Sort, group and label specifications.
///
/// Returns primary specifications (by effect) followed by secondary ones (by
/// outcome name), each with its `id` set. Sorting is stable.
pub fn build_outcome_groups(specifications: Vec<Specification>) -> Vec<Specification> {
    let (mut primary, mut secondary): (Vec<_>, Vec<_>) =
        specifications.into_iter().partition(Specification::is_primary);

    primary.sort_by(by_effect);
    secondary.sort_by(|a, b| a.outcome.cmp(&b.outcome));

    let mut registry = GroupRegistry::default();
    for spec in primary.iter_mut().chain(secondary.iter_mut()) {
        registry.assign(spec);
    }

    primary.extend(secondary);
    primary
}
