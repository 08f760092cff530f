//! The value a script hands back through its `result` export.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the export the orchestrator reads from every script module.
pub const RESULT_EXPORT: &str = "result";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResult {
    pub pass: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_fail: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_config: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_config: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_config: Option<Map<String, Value>>,
}

impl ScriptResult {
    pub fn passed() -> Self {
        Self {
            pass: true,
            ..Default::default()
        }
    }

    pub fn failed(continue_on_fail: bool) -> Self {
        Self {
            pass: false,
            continue_on_fail: Some(continue_on_fail),
            ..Default::default()
        }
    }

    /// Only a literal `true` lets orchestration continue past a failure.
    pub fn may_continue(&self) -> bool {
        self.continue_on_fail == Some(true)
    }

    /// Validate the raw `result` export at the module boundary.
    ///
    /// Returns a human-readable reason when the export is absent or does not
    /// match the expected shape.
    pub fn from_export(export: Option<&Value>) -> Result<Self, String> {
        let value = match export {
            None | Some(Value::Null) => {
                return Err(format!("missing `{}` export", RESULT_EXPORT));
            }
            Some(v) => v,
        };

        if !value.is_object() {
            return Err(format!(
                "`{}` must be an object, got {}",
                RESULT_EXPORT,
                json_type_name(value)
            ));
        }

        serde_json::from_value(value.clone()).map_err(|e| e.to_string())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
