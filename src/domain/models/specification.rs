//! Specifications: one estimated causal effect per analysis combination.
//!
//! The backend hands results back as loosely typed JSON rows. Numbers may
//! arrive as numbers, numeric strings, booleans or nulls, so every numeric
//! field goes through [`coerce_number`], which follows the same rules as a
//! JavaScript unary `+`. Refuter fields are the exception: a null refuter
//! means the refuter never ran and must stay `None` rather than become 0.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::status::{CausalityLevel, RefutationResult};

/// Refuter columns, in display order.
pub const REFUTER_FIELDS: [Refuter; 4] = [
    Refuter::PlaceboTreatment,
    Refuter::DataSubset,
    Refuter::RandomCommonCause,
    Refuter::Bootstrap,
];

/// One backend result row, kept as raw JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSpecificationRow(pub Map<String, Value>);

impl RawSpecificationRow {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// First present key among `keys`.
    fn first(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|k| self.0.get(*k))
    }

    fn text(&self, keys: &[&str]) -> String {
        match self.first(keys) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn number(&self, keys: &[&str]) -> f64 {
        coerce_number(self.first(keys))
    }

    fn optional_number(&self, keys: &[&str]) -> Option<f64> {
        match self.first(keys) {
            None | Some(Value::Null) => None,
            value => Some(coerce_number(value)),
        }
    }
}

impl From<Value> for RawSpecificationRow {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

/// The four refutation tests run against every specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Refuter {
    PlaceboTreatment,
    DataSubset,
    RandomCommonCause,
    Bootstrap,
}

impl Refuter {
    /// Column name in backend rows.
    pub fn row_key(&self) -> &'static str {
        match self {
            Self::PlaceboTreatment => "refuter_placebo_treatment",
            Self::DataSubset => "refuter_data_subset",
            Self::RandomCommonCause => "refuter_random_common_cause",
            Self::Bootstrap => "refuter_bootstrap",
        }
    }

    /// Field name on [`Specification`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlaceboTreatment => "refuterPlaceboTreatment",
            Self::DataSubset => "refuterDataSubset",
            Self::RandomCommonCause => "refuterRandomCommonCause",
            Self::Bootstrap => "refuterBootstrap",
        }
    }
}

/// Per-confounder balance before and after adjustment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CovariateBalance {
    #[serde(default)]
    pub adjusted: BTreeMap<String, f64>,
    #[serde(default)]
    pub unadjusted: BTreeMap<String, f64>,
}

impl CovariateBalance {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => {
                let side = |key: &str| -> BTreeMap<String, f64> {
                    map.get(key)
                        .and_then(Value::as_object)
                        .map(|entries| {
                            entries
                                .iter()
                                .map(|(name, v)| (name.clone(), coerce_number(Some(v))))
                                .collect()
                        })
                        .unwrap_or_default()
                };
                Some(Self {
                    adjusted: side("adjusted"),
                    unadjusted: side("unadjusted"),
                })
            }
            Value::String(raw) => serde_json::from_str::<Value>(raw)
                .ok()
                .and_then(|parsed| Self::from_value(&parsed)),
            _ => None,
        }
    }
}

/// One computed causal-effect estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specification {
    /// Outcome letter plus group number, assigned by grouping. Not unique.
    pub id: String,
    pub task_id: String,
    pub population: String,
    pub treatment: String,
    pub outcome: String,
    pub causal_model: String,
    pub estimator: String,
    pub estimator_config: String,
    pub estimated_effect: f64,
    pub population_shap: f64,
    pub treatment_shap: f64,
    pub causal_model_shap: f64,
    pub estimator_shap: f64,
    pub refuter_placebo_treatment: Option<f64>,
    pub refuter_data_subset: Option<f64>,
    pub refuter_random_common_cause: Option<f64>,
    pub refuter_bootstrap: Option<f64>,
    pub c95_lower: Option<f64>,
    pub c95_upper: Option<f64>,
    pub population_type: CausalityLevel,
    pub treatment_type: CausalityLevel,
    pub outcome_type: CausalityLevel,
    pub population_size: Option<f64>,
    pub refutation_result: Option<RefutationResult>,
    pub covariate_balance: Option<CovariateBalance>,
}

impl Specification {
    pub fn refuter(&self, refuter: Refuter) -> Option<f64> {
        match refuter {
            Refuter::PlaceboTreatment => self.refuter_placebo_treatment,
            Refuter::DataSubset => self.refuter_data_subset,
            Refuter::RandomCommonCause => self.refuter_random_common_cause,
            Refuter::Bootstrap => self.refuter_bootstrap,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.outcome_type == CausalityLevel::Primary
    }
}

/// Map one backend row to a specification. Never fails: bad numbers become NaN.
pub fn row_to_specification(row: &RawSpecificationRow) -> Specification {
    Specification {
        id: String::new(),
        task_id: row.text(&["task_id"]),
        population: row.text(&["population_name", "population"]),
        treatment: row.text(&["treatment"]),
        outcome: row.text(&["outcome"]),
        causal_model: row.text(&["causal_model"]),
        estimator: row.text(&["estimator"]),
        estimator_config: row.text(&["estimator_config"]),
        estimated_effect: row.number(&["estimated_effect"]),
        population_shap: row.number(&["shap_population_name"]),
        treatment_shap: row.number(&["shap_treatment"]),
        causal_model_shap: row.number(&["shap_causal_model"]),
        estimator_shap: row.number(&["shap_estimator"]),
        refuter_placebo_treatment: row.optional_number(&[Refuter::PlaceboTreatment.row_key()]),
        refuter_data_subset: row.optional_number(&[Refuter::DataSubset.row_key()]),
        refuter_random_common_cause: row.optional_number(&[Refuter::RandomCommonCause.row_key()]),
        refuter_bootstrap: row.optional_number(&[Refuter::Bootstrap.row_key()]),
        c95_lower: row.optional_number(&["lower_bound", "c95_lower"]),
        c95_upper: row.optional_number(&["upper_bound", "c95_upper"]),
        population_type: CausalityLevel::from_label(&row.text(&["population_type"])),
        treatment_type: CausalityLevel::from_label(&row.text(&["treatment_type"])),
        outcome_type: CausalityLevel::from_label(&row.text(&["outcome_type"])),
        population_size: row.optional_number(&["population_size"]),
        refutation_result: row
            .optional_number(&["refutation_result"])
            .and_then(RefutationResult::from_code),
        covariate_balance: row
            .get("covariate_balance")
            .and_then(CovariateBalance::from_value),
    }
}

/// Map every row, preserving order.
pub fn rows_to_specifications(rows: &[RawSpecificationRow]) -> Vec<Specification> {
    rows.iter().map(row_to_specification).collect()
}

/// Numeric coercion with unary-plus semantics.
///
/// A missing value is NaN, null is 0, booleans are 0/1, strings are trimmed
/// and parsed (empty is 0, junk is NaN). Arrays coerce through their single
/// element, objects are NaN.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => coerce_str(s),
        Some(Value::Array(items)) => match items.as_slice() {
            [] => 0.0,
            [Value::Null] => 0.0,
            [single @ (Value::Number(_) | Value::String(_) | Value::Array(_))] => {
                coerce_number(Some(single))
            }
            _ => f64::NAN,
        },
        Some(Value::Object(_)) => f64::NAN,
    }
}

fn coerce_str(raw: &str) -> f64 {
    let s = raw.trim();
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = s.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix).map_or(f64::NAN, |v| v as f64);
        }
    }
    // Rust accepts "inf"/"nan" spellings that unary plus rejects.
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RawSpecificationRow {
        RawSpecificationRow::from(value)
    }

    #[test]
    fn test_coerce_number_rules() {
        assert!(coerce_number(None).is_nan());
        assert_eq!(coerce_number(Some(&Value::Null)), 0.0);
        assert_eq!(coerce_number(Some(&json!(true))), 1.0);
        assert_eq!(coerce_number(Some(&json!(false))), 0.0);
        assert_eq!(coerce_number(Some(&json!(0.25))), 0.25);
        assert_eq!(coerce_number(Some(&json!(" 1.5 "))), 1.5);
        assert_eq!(coerce_number(Some(&json!(""))), 0.0);
        assert_eq!(coerce_number(Some(&json!("1e3"))), 1000.0);
        assert_eq!(coerce_number(Some(&json!("0x10"))), 16.0);
        assert_eq!(coerce_number(Some(&json!("-Infinity"))), f64::NEG_INFINITY);
        assert!(coerce_number(Some(&json!("inf"))).is_nan());
        assert!(coerce_number(Some(&json!("nan"))).is_nan());
        assert!(coerce_number(Some(&json!("12abc"))).is_nan());
        assert!(coerce_number(Some(&json!({"a": 1}))).is_nan());
        assert_eq!(coerce_number(Some(&json!([]))), 0.0);
        assert_eq!(coerce_number(Some(&json!(["7"]))), 7.0);
        assert!(coerce_number(Some(&json!([1, 2]))).is_nan());
    }

    #[test]
    fn test_row_to_specification_maps_fields() {
        let spec = row_to_specification(&row(json!({
            "task_id": "t1",
            "population_name": "adults",
            "treatment": "smoking",
            "outcome": "cancer",
            "causal_model": "Maximum Model",
            "estimator": "Linear Regression",
            "estimator_config": "{}",
            "estimated_effect": "0.5",
            "shap_population_name": 0.1,
            "shap_treatment": "0.2",
            "refuter_placebo_treatment": 1,
            "refuter_data_subset": "0",
            "refuter_bootstrap": null,
            "population_type": "Primary",
            "treatment_type": "Secondary",
            "outcome_type": "Primary",
            "population_size": 1200,
            "lower_bound": 0.4,
            "upper_bound": "0.6",
            "refutation_result": 2
        })));

        assert_eq!(spec.id, "");
        assert_eq!(spec.task_id, "t1");
        assert_eq!(spec.population, "adults");
        assert_eq!(spec.estimated_effect, 0.5);
        assert_eq!(spec.population_shap, 0.1);
        assert_eq!(spec.treatment_shap, 0.2);
        assert!(spec.causal_model_shap.is_nan());
        assert_eq!(spec.refuter_placebo_treatment, Some(1.0));
        assert_eq!(spec.refuter_data_subset, Some(0.0));
        assert_eq!(spec.refuter_bootstrap, None);
        assert_eq!(spec.refuter_random_common_cause, None);
        assert_eq!(spec.population_type, CausalityLevel::Primary);
        assert_eq!(spec.treatment_type, CausalityLevel::Secondary);
        assert_eq!(spec.outcome_type, CausalityLevel::Primary);
        assert_eq!(spec.population_size, Some(1200.0));
        assert_eq!(spec.c95_lower, Some(0.4));
        assert_eq!(spec.c95_upper, Some(0.6));
        assert_eq!(spec.refutation_result, Some(RefutationResult::PassedAll));
    }

    #[test]
    fn test_null_refuter_is_none_but_string_refuter_is_coerced() {
        let missing = row_to_specification(&row(json!({"refuter_bootstrap": null})));
        let present = row_to_specification(&row(json!({"refuter_bootstrap": "1"})));
        assert_eq!(missing.refuter_bootstrap, None);
        assert_eq!(present.refuter_bootstrap, Some(1.0));
    }

    #[test]
    fn test_garbage_effect_becomes_nan() {
        let spec = row_to_specification(&row(json!({"estimated_effect": "n/a"})));
        assert!(spec.estimated_effect.is_nan());
    }

    #[test]
    fn test_covariate_balance_from_object_or_string() {
        let from_object = row_to_specification(&row(json!({
            "covariate_balance": {"adjusted": {"age": 0.05}, "unadjusted": {"age": "0.3"}}
        })));
        let balance = from_object.covariate_balance.unwrap();
        assert_eq!(balance.adjusted.get("age"), Some(&0.05));
        assert_eq!(balance.unadjusted.get("age"), Some(&0.3));

        let from_string = row_to_specification(&row(json!({
            "covariate_balance": "{\"adjusted\": {\"income\": 0.2}}"
        })));
        let balance = from_string.covariate_balance.unwrap();
        assert_eq!(balance.adjusted.get("income"), Some(&0.2));
        assert!(balance.unadjusted.is_empty());

        let absent = row_to_specification(&row(json!({})));
        assert!(absent.covariate_balance.is_none());
    }
}
