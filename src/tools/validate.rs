use serde_json::Value;

use super::handler::{ArgMap, ToolDefinition};
use crate::error::ValidationError;

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

/// Check raw call arguments against a tool's declared parameters.
///
/// Required parameters must be present with the declared type. Optional ones
/// are type-checked only when present and non-null. Extra keys are ignored.
/// `null` arguments are treated as an empty object.
pub fn validate_args(def: &ToolDefinition, raw: &Value) -> Result<ArgMap, ValidationError> {
    let args = match raw {
        Value::Object(map) => map.clone(),
        Value::Null => ArgMap::new(),
        other => return Err(ValidationError::NotAnObject(json_type_name(other))),
    };

    for spec in &def.parameters {
        match args.get(&spec.name) {
            None | Some(Value::Null) if spec.required => {
                return Err(ValidationError::Missing(spec.name.clone()));
            }
            None | Some(Value::Null) => {}
            Some(value) if !spec.param_type.matches(value) => {
                return Err(ValidationError::WrongType {
                    name: spec.name.clone(),
                    expected: spec.param_type.as_str(),
                    found: json_type_name(value),
                });
            }
            Some(_) => {}
        }
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::handler::{ParamSpec, ParamType};
    use serde_json::json;

    fn def() -> ToolDefinition {
        ToolDefinition::new("calc", "Evaluate")
            .param(ParamSpec::required("expr", ParamType::String, "Expression"))
            .param(ParamSpec::optional("precision", ParamType::Number, "Digits"))
    }

    #[test]
    fn accepts_valid_args_and_ignores_extras() {
        let args = validate_args(&def(), &json!({"expr": "1+1", "extra": [1, 2]})).unwrap();
        assert_eq!(args["expr"], "1+1");
        assert!(args.contains_key("extra"));
    }

    #[test]
    fn numeral_string_is_still_a_string() {
        assert!(validate_args(&def(), &json!({"expr": "42"})).is_ok());
        let err = validate_args(&def(), &json!({"expr": 42})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::WrongType {
                name: "expr".into(),
                expected: "string",
                found: "number",
            }
        );
    }

    #[test]
    fn missing_required_is_rejected() {
        let err = validate_args(&def(), &json!({})).unwrap_err();
        assert_eq!(err, ValidationError::Missing("expr".into()));

        let err = validate_args(&def(), &json!({"expr": null})).unwrap_err();
        assert_eq!(err, ValidationError::Missing("expr".into()));
    }

    #[test]
    fn optional_checked_only_when_present() {
        assert!(validate_args(&def(), &json!({"expr": "x", "precision": null})).is_ok());
        assert!(validate_args(&def(), &json!({"expr": "x", "precision": "2"})).is_err());
    }

    #[test]
    fn null_means_no_args() {
        let no_params = ToolDefinition::new("get_current_code", "Read the buffer");
        assert!(validate_args(&no_params, &Value::Null).unwrap().is_empty());
        assert_eq!(
            validate_args(&no_params, &json!("oops")).unwrap_err(),
            ValidationError::NotAnObject("string")
        );
    }
}
