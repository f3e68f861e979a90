use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::GatewayError;

// -----------------------------------------------------------------------------
// ----- Transform -------------------------------------------------------------

/// Field overrides applied after the request is flattened to JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Replace (or add) the field with a fixed value.
    SetConstant(Value),

    /// The node wants booleans as `"true"` / `"false"`. Anything that is not a
    /// boolean `true` becomes `"false"`.
    BoolAsString,
}

pub type FieldTransform = (&'static str, Transform);

impl Transform {
    pub fn constant(value: impl Into<Value>) -> Self {
        Transform::SetConstant(value.into())
    }

    fn apply(&self, current: Option<&Value>) -> Value {
        match self {
            Transform::SetConstant(value) => value.clone(),
            Transform::BoolAsString => match current {
                Some(Value::Bool(true)) => Value::from("true"),
                _ => Value::from("false"),
            },
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ActionDocument --------------------------------------------------------

/// A request flattened to a JSON object, keyed by the request's own field
/// names, plus the `action` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDocument {
    fields: Map<String, Value>,
}

impl ActionDocument {
    pub fn from_request<R: Serialize>(request: &R, action: &str) -> Result<Self, GatewayError> {
        let value = serde_json::to_value(request)
            .map_err(|e| GatewayError::InvalidArgument(format!("unserializable request: {e}")))?;

        let mut fields = match value {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                return Err(GatewayError::InvalidArgument(format!(
                    "request must serialize to an object, got {other}"
                )));
            }
        };

        fields.insert("action".to_string(), Value::from(action));
        Ok(Self { fields })
    }

    pub fn apply(&mut self, field: &str, transform: &Transform) {
        let next = transform.apply(self.fields.get(field));
        self.fields.insert(field.to_string(), next);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(Value::Object(self.fields).to_string())
    }
}

// -----------------------------------------------------------------------------
// ----- build_action ----------------------------------------------------------

pub fn build_action<R: Serialize>(
    request: &R,
    action: &str,
    transforms: &[FieldTransform],
) -> Result<Bytes, GatewayError> {
    let mut document = ActionDocument::from_request(request, action)?;

    for (field, transform) in transforms {
        document.apply(field, transform);
    }

    Ok(document.into_bytes())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct AccountsRequest {
        accounts: Vec<String>,
    }

    #[derive(Serialize)]
    struct HashesRequest {
        hashes: Vec<String>,
        include_not_found: bool,
    }

    fn parsed(bytes: Bytes) -> Value {
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn injects_action_and_keeps_fields() {
        let request = AccountsRequest {
            accounts: vec!["123".to_string()],
        };

        let action = build_action(&request, "test", &[]).unwrap();
        assert_eq!(parsed(action), json!({"action": "test", "accounts": ["123"]}));
    }

    #[test]
    fn constant_transform_adds_field() {
        let request = AccountsRequest {
            accounts: vec!["123".to_string()],
        };

        let action = build_action(&request, "test", &[("options", Transform::constant("opt1"))])
            .unwrap();
        assert_eq!(
            parsed(action),
            json!({"action": "test", "accounts": ["123"], "options": "opt1"})
        );
    }

    #[test]
    fn multiple_transforms_apply_together() {
        let request = HashesRequest {
            hashes: vec!["123".to_string(), "456".to_string()],
            include_not_found: true,
        };

        let transforms = [
            ("options", Transform::constant("opt1")),
            ("include_not_found", Transform::BoolAsString),
        ];

        let action = build_action(&request, "test", &transforms).unwrap();
        assert_eq!(
            parsed(action),
            json!({
                "action": "test",
                "hashes": ["123", "456"],
                "options": "opt1",
                "include_not_found": "true"
            })
        );
    }

    #[test]
    fn bool_as_string_defaults_to_false() {
        let mut document = ActionDocument::from_request(&json!({}), "test").unwrap();
        document.apply("flag", &Transform::BoolAsString);
        assert_eq!(document.get("flag"), Some(&Value::from("false")));
    }

    #[test]
    fn non_object_request_is_rejected() {
        let err = build_action(&vec![1, 2, 3], "test", &[]).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
