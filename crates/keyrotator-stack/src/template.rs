//! CloudFormation template assembly and reference checking

use crate::error::{Result, StackError};
use crate::intrinsic::{sub_variables, Value};
use crate::resources::Resource;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// A template output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: Value,
}

/// Resources and outputs in insertion order
#[derive(Debug, Clone, Default)]
pub struct Template {
    description: Option<String>,
    resources: Vec<(String, Resource)>,
    outputs: Vec<(String, Output)>,
}

impl Template {
    pub fn new(description: Option<String>) -> Self {
        Self {
            description,
            ..Self::default()
        }
    }

    pub fn add_resource(&mut self, logical_id: &str, resource: Resource) -> Result<()> {
        check_logical_id(logical_id)?;
        if self.contains(logical_id) {
            return Err(StackError::duplicate_logical_id(logical_id));
        }
        self.resources.push((logical_id.to_string(), resource));
        Ok(())
    }

    pub fn add_output(&mut self, logical_id: &str, output: Output) -> Result<()> {
        check_logical_id(logical_id)?;
        if self.outputs.iter().any(|(id, _)| id == logical_id) {
            return Err(StackError::duplicate_logical_id(logical_id));
        }
        self.outputs.push((logical_id.to_string(), output));
        Ok(())
    }

    pub fn contains(&self, logical_id: &str) -> bool {
        self.resources.iter().any(|(id, _)| id == logical_id)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|(id, _)| id == logical_id)
            .map(|(_, resource)| resource)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, &Resource)> {
        self.resources
            .iter()
            .map(|(id, resource)| (id.as_str(), resource))
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &Output)> {
        self.outputs.iter().map(|(id, output)| (id.as_str(), output))
    }

    /// Every `Ref`, `Fn::GetAtt` and `Fn::Sub` variable must name a resource
    /// in this template or a pseudo parameter.
    pub fn validate_references(&self) -> Result<()> {
        for (id, resource) in &self.resources {
            let rendered = serde_json::to_value(resource).map_err(StackError::serialization)?;
            let mut targets = resource.depends_on.clone();
            collect_references(&rendered, &mut targets);
            self.check_targets(id, targets)?;
        }

        for (id, output) in &self.outputs {
            let rendered = serde_json::to_value(output).map_err(StackError::serialization)?;
            let mut targets = Vec::new();
            collect_references(&rendered, &mut targets);
            self.check_targets(id, targets)?;
        }

        Ok(())
    }

    fn check_targets(&self, from: &str, targets: Vec<String>) -> Result<()> {
        for target in targets {
            if target.starts_with("AWS::") {
                continue;
            }
            if !self.contains(&target) {
                return Err(StackError::dangling_reference(from, target));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(StackError::serialization)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(StackError::serialization)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("AWSTemplateFormatVersion", TEMPLATE_FORMAT_VERSION)?;
        if let Some(description) = &self.description {
            map.serialize_entry("Description", description)?;
        }
        map.serialize_entry("Resources", &Ordered(&self.resources))?;
        if !self.outputs.is_empty() {
            map.serialize_entry("Outputs", &Ordered(&self.outputs))?;
        }
        map.end()
    }
}

/// Serializes `(key, value)` pairs as a map, keeping their order
struct Ordered<'a, T>(&'a [(String, T)]);

impl<T: Serialize> Serialize for Ordered<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(key, value)| (key, value)))
    }
}

/// Logical ids are alphanumeric, at most 255 characters
fn check_logical_id(logical_id: &str) -> Result<()> {
    if logical_id.is_empty()
        || logical_id.len() > 255
        || !logical_id.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(StackError::invalid_input(
            "logical id",
            format!("'{}' must be 1-255 alphanumeric characters", logical_id),
        ));
    }
    Ok(())
}

fn collect_references(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(target)) = map.get("Ref") {
                out.push(target.clone());
            }
            if let Some(serde_json::Value::Array(parts)) = map.get("Fn::GetAtt") {
                if let Some(serde_json::Value::String(target)) = parts.first() {
                    out.push(target.clone());
                }
            }
            if let Some(serde_json::Value::String(template)) = map.get("Fn::Sub") {
                out.extend(sub_variables(template).into_iter().map(str::to_string));
            }
            for nested in map.values() {
                collect_references(nested, out);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}
