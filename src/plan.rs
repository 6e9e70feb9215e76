//! The animation plan: an ordered mapping from class name to steps.
//!
//! Order is the model's response order and drives the generation loop, so
//! the plan keeps entries in a `Vec` and (de)serializes through an
//! order-preserving JSON object.
use crate::error::{PipelineError, PipelineResult};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub class_name: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    entries: Vec<PlanEntry>,
}

impl Plan {
    /// Build a plan from `(class, steps)` pairs, validating every entry.
    pub fn new(entries: Vec<PlanEntry>) -> PipelineResult<Self> {
        if entries.is_empty() {
            return Err(PipelineError::EmptyPlan);
        }
        for (i, entry) in entries.iter().enumerate() {
            validate_class_name(&entry.class_name)?;
            if entries[..i]
                .iter()
                .any(|earlier| earlier.class_name == entry.class_name)
            {
                return Err(PipelineError::model(format!(
                    "plan lists class {:?} twice",
                    entry.class_name
                )));
            }
            if entry.steps.is_empty() {
                return Err(PipelineError::model(format!(
                    "plan class {:?} has no animation steps",
                    entry.class_name
                )));
            }
            if entry.steps.iter().any(|step| step.trim().is_empty()) {
                return Err(PipelineError::model(format!(
                    "plan class {:?} has an empty step",
                    entry.class_name
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Validate a JSON plan object.
    ///
    /// A step list may also be a single string or contain objects, which
    /// are normalized to strings. `{"plan": {...}}` wrappers are unwrapped.
    pub fn from_value(value: &Value) -> PipelineResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| PipelineError::model("plan must be a JSON object"))?;
        if let (1, Some(Value::Object(inner))) = (object.len(), object.get("plan")) {
            return Self::from_map(inner);
        }
        Self::from_map(object)
    }

    fn from_map(object: &Map<String, Value>) -> PipelineResult<Self> {
        let entries = object
            .iter()
            .map(|(class_name, steps)| {
                Ok(PlanEntry {
                    class_name: class_name.trim().to_string(),
                    steps: normalize_steps(class_name, steps)?,
                })
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        Self::new(entries)
    }

    pub fn to_value(&self) -> Value {
        let map = self
            .entries
            .iter()
            .map(|entry| {
                let steps = entry.steps.iter().cloned().map(Value::String).collect();
                (entry.class_name.clone(), Value::Array(steps))
            })
            .collect::<Map<_, _>>();
        Value::Object(map)
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.class_name.as_str())
    }

    pub fn steps(&self, class_name: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|entry| entry.class_name == class_name)
            .map(|entry| entry.steps.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Plan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Plan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Plan::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// Class names become CSS selectors in the output document.
pub fn validate_class_name(name: &str) -> PipelineResult<()> {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    let ident = IDENT.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("class name regex is valid")
    });
    if ident.is_match(name) {
        Ok(())
    } else {
        Err(PipelineError::model(format!(
            "class name {name:?} is not a valid CSS identifier"
        )))
    }
}

fn normalize_steps(class_name: &str, steps: &Value) -> PipelineResult<Vec<String>> {
    let as_step = |value: &Value| match value {
        Value::String(text) => Ok(text.trim().to_string()),
        Value::Object(_) => Ok(value.to_string()),
        other => Err(PipelineError::model(format!(
            "plan class {class_name:?} has a non-text step: {other}"
        ))),
    };
    match steps {
        Value::String(_) => Ok(vec![as_step(steps)?]),
        Value::Array(items) => items.iter().map(as_step).collect(),
        other => Err(PipelineError::model(format!(
            "plan class {class_name:?} steps must be a list, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preserves_response_order() {
        let plan = Plan::from_value(&json!({
            "square": ["slide-right"],
            "circle": ["pulse", "fade in"],
        }))
        .expect("valid plan");
        let names: Vec<&str> = plan.class_names().collect();
        assert_eq!(names, ["square", "circle"]);
        assert_eq!(
            serde_json::to_string(&plan).expect("serialize"),
            r#"{"square":["slide-right"],"circle":["pulse","fade in"]}"#
        );
    }

    #[test]
    fn normalizes_string_and_object_steps() {
        let plan = Plan::from_value(&json!({
            "plan": {"sun": "rotate", "cloud": [{"effect": "drift"}]}
        }))
        .expect("valid plan");
        assert_eq!(plan.steps("sun"), Some(&["rotate".to_string()][..]));
        assert_eq!(
            plan.steps("cloud"),
            Some(&[r#"{"effect":"drift"}"#.to_string()][..])
        );
    }

    #[test]
    fn empty_plan_is_its_own_error() {
        assert!(matches!(
            Plan::from_value(&json!({})),
            Err(PipelineError::EmptyPlan)
        ));
    }

    #[test]
    fn rejects_ill_formed_entries() {
        for bad in [
            json!({"circle": []}),
            json!({"circle": [""]}),
            json!({"": ["pulse"]}),
            json!({"two words": ["pulse"]}),
            json!({"circle": 3}),
            json!(["circle"]),
        ] {
            assert!(
                matches!(Plan::from_value(&bad), Err(PipelineError::Model(_))),
                "expected model error for {bad}"
            );
        }
    }

    #[test]
    fn deserialize_validates() {
        let err = serde_json::from_str::<Plan>("{}").expect_err("empty plan");
        assert!(err.to_string().contains("no classes"));
        let plan: Plan = serde_json::from_str(r#"{"a":["b"]}"#).expect("plan");
        assert_eq!(plan.len(), 1);
    }
}
