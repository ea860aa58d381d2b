//! Typed DR pipeline parameters.
//!
//! The downstream pipeline understands exactly three switches. Callers may
//! omit any of them; omitted switches default to the string `"false"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value substituted for a parameter the caller did not supply.
pub const DEFAULT_PARAMETER_VALUE: &str = "false";

/// Parameter set attached to every job. All keys are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    pub deploy_standby_only: String,
    pub destroy_after_apply: String,
    pub skip_tests: String,
}

impl Default for JobParameters {
    fn default() -> Self {
        Self {
            deploy_standby_only: DEFAULT_PARAMETER_VALUE.to_string(),
            destroy_after_apply: DEFAULT_PARAMETER_VALUE.to_string(),
            skip_tests: DEFAULT_PARAMETER_VALUE.to_string(),
        }
    }
}

impl JobParameters {
    /// Apply the defaulting rule to a caller-supplied parameter object.
    ///
    /// Only absence is defaulted: a present value, even an empty string, is
    /// carried through as given.
    pub fn from_request(input: &RequestParameters) -> Self {
        let pick = |value: &Option<ParameterValue>| {
            value
                .as_ref()
                .map(ParameterValue::render)
                .unwrap_or_else(|| DEFAULT_PARAMETER_VALUE.to_string())
        };

        Self {
            deploy_standby_only: pick(&input.deploy_standby_only),
            destroy_after_apply: pick(&input.destroy_after_apply),
            skip_tests: pick(&input.skip_tests),
        }
    }

    /// Jenkins `buildWithParameters` form fields (upper-case names).
    pub fn build_parameters(&self) -> [(&'static str, &str); 3] {
        [
            ("DEPLOY_STANDBY_ONLY", self.deploy_standby_only.as_str()),
            ("DESTROY_AFTER_APPLY", self.destroy_after_apply.as_str()),
            ("SKIP_TESTS", self.skip_tests.as_str()),
        ]
    }
}

/// `parameters` object as submitted by a caller. Unknown keys are ignored.
///
/// Deserialization never fails on well-formed JSON: anything that is not an
/// object counts as an empty parameter set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct RequestParameters {
    pub deploy_standby_only: Option<ParameterValue>,
    pub destroy_after_apply: Option<ParameterValue>,
    pub skip_tests: Option<ParameterValue>,
}

impl From<Value> for RequestParameters {
    fn from(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        let field = |key: &str| map.get(key).and_then(ParameterValue::from_json);

        Self {
            deploy_standby_only: field("deploy_standby_only"),
            destroy_after_apply: field("destroy_after_apply"),
            skip_tests: field("skip_tests"),
        }
    }
}

/// A single submitted parameter value.
///
/// Pipelines take strings, but callers routinely send JSON booleans or
/// numbers; those are rendered in their JSON text form.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Text(String),
    Flag(bool),
    Number(serde_json::Number),
}

impl ParameterValue {
    /// Scalars only; null, arrays and objects count as not supplied.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Bool(b) => Some(Self::Flag(*b)),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            ParameterValue::Text(s) => s.clone(),
            ParameterValue::Flag(b) => b.to_string(),
            ParameterValue::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
