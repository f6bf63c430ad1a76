//! CloudFormation values: literals and intrinsic functions

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Pseudo parameters CloudFormation resolves at deploy time
pub mod pseudo {
    pub const ACCOUNT_ID: &str = "AWS::AccountId";
    pub const REGION: &str = "AWS::Region";
    pub const PARTITION: &str = "AWS::Partition";
}

/// A template value: a plain string or an intrinsic function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Literal(String),
    /// `{"Ref": "LogicalId"}`
    Ref(String),
    /// `{"Fn::GetAtt": ["LogicalId", "Attribute"]}`
    GetAtt {
        logical_id: String,
        attribute: String,
    },
    /// `{"Fn::Sub": "arn:${AWS::Partition}:..."}`
    Sub(String),
}

impl Value {
    pub fn literal(value: impl Into<String>) -> Self {
        Value::Literal(value.into())
    }

    pub fn reference(logical_id: impl Into<String>) -> Self {
        Value::Ref(logical_id.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::GetAtt {
            logical_id: logical_id.into(),
            attribute: attribute.into(),
        }
    }

    pub fn sub(template: impl Into<String>) -> Self {
        Value::Sub(template.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Literal(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Literal(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Literal(value) => f.write_str(value),
            Value::Ref(id) => write!(f, "!Ref {}", id),
            Value::GetAtt {
                logical_id,
                attribute,
            } => write!(f, "!GetAtt {}.{}", logical_id, attribute),
            Value::Sub(template) => write!(f, "!Sub {}", template),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Literal(value) => serializer.serialize_str(value),
            Value::Ref(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Ref", id)?;
                map.end()
            }
            Value::GetAtt {
                logical_id,
                attribute,
            } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::GetAtt", &[logical_id, attribute])?;
                map.end()
            }
            Value::Sub(template) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::Sub", template)?;
                map.end()
            }
        }
    }
}

/// Variable names referenced by an `Fn::Sub` template.
///
/// `${Name}` and `${Name.Attribute}` yield `Name`; `${!Literal}` is an escape
/// and yields nothing.
pub fn sub_variables(template: &str) -> Vec<&str> {
    let mut variables = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let inner = &after[..end];
        if !inner.starts_with('!') {
            let name = inner.split('.').next().unwrap_or(inner);
            if !name.is_empty() {
                variables.push(name);
            }
        }
        rest = &after[end + 1..];
    }
    variables
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_forms() {
        assert_eq!(
            serde_json::to_value(Value::literal("plain")).unwrap(),
            json!("plain")
        );
        assert_eq!(
            serde_json::to_value(Value::reference("Bucket")).unwrap(),
            json!({"Ref": "Bucket"})
        );
        assert_eq!(
            serde_json::to_value(Value::get_att("Role", "Arn")).unwrap(),
            json!({"Fn::GetAtt": ["Role", "Arn"]})
        );
        assert_eq!(
            serde_json::to_value(Value::sub("arn:${AWS::Partition}:s3:::b")).unwrap(),
            json!({"Fn::Sub": "arn:${AWS::Partition}:s3:::b"})
        );
    }

    #[test]
    fn test_sub_variables() {
        assert_eq!(
            sub_variables("arn:aws:ssm:${AWS::Region}:${AWS::AccountId}:parameter/x"),
            vec!["AWS::Region", "AWS::AccountId"]
        );
        assert_eq!(sub_variables("${Role.Arn}/x"), vec!["Role"]);
        assert!(sub_variables("${!NotAVariable}").is_empty());
        assert!(sub_variables("no variables").is_empty());
        assert!(sub_variables("unterminated ${Oops").is_empty());
    }
}
