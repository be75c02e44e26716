//! Property values exchanged with the management namespace.

use crate::handle::ObjectPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named property values of an instance, a method's inputs or its outputs.
pub type PropertyMap = BTreeMap<String, Value>;

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    UInt(u64),
    Int(i64),
    String(String),
    StringList(Vec<String>),
    Path(ObjectPath),
    PathList(Vec<ObjectPath>),
    Object(EmbeddedObject),
    ObjectList(Vec<EmbeddedObject>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Path(p) => Some(p.as_str()),
            _ => None,
        }
    }

    /// Paths are accepted both as references and as their string form.
    pub fn as_path(&self) -> Option<ObjectPath> {
        match self {
            Value::Path(p) => Some(p.clone()),
            Value::String(s) if !s.is_empty() => Some(ObjectPath::new(s.clone())),
            _ => None,
        }
    }

    pub fn as_paths(&self) -> Vec<ObjectPath> {
        match self {
            Value::PathList(paths) => paths.clone(),
            Value::StringList(items) => items.iter().cloned().map(ObjectPath::new).collect(),
            other => other.as_path().into_iter().collect(),
        }
    }

    pub fn as_strings(&self) -> Vec<String> {
        match self {
            Value::StringList(items) => items.clone(),
            Value::String(s) => vec![s.clone()],
            Value::PathList(paths) => paths.iter().map(|p| p.as_str().to_string()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_object(&self) -> Option<&EmbeddedObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Text used when comparing against a query filter.
    pub fn to_query_text(&self) -> Option<String> {
        match self {
            Value::Bool(v) => Some(if *v { "TRUE".into() } else { "FALSE".into() }),
            Value::UInt(v) => Some(v.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Path(p) => Some(p.as_str().to_string()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::UInt(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StringList(v)
    }
}

impl From<ObjectPath> for Value {
    fn from(v: ObjectPath) -> Self {
        Value::Path(v)
    }
}

impl From<Vec<ObjectPath>> for Value {
    fn from(v: Vec<ObjectPath>) -> Self {
        Value::PathList(v)
    }
}

impl From<EmbeddedObject> for Value {
    fn from(v: EmbeddedObject) -> Self {
        Value::Object(v)
    }
}

impl From<Vec<EmbeddedObject>> for Value {
    fn from(v: Vec<EmbeddedObject>) -> Self {
        Value::ObjectList(v)
    }
}

/// A setting object passed by value to a define or modify method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedObject {
    pub class: String,
    #[serde(default)]
    pub properties: PropertyMap,
}

impl EmbeddedObject {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            properties: PropertyMap::new(),
        }
    }

    /// Set a property, builder style.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Set a property only when a value is present.
    pub fn with_opt<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with(key, v),
            None => self,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.properties.insert(key.to_string(), value.into());
    }
}

/// Typed lookups over a property map.
pub trait Properties {
    fn value(&self, key: &str) -> Option<&Value>;

    fn get_u64(&self, key: &str) -> Option<u64> {
        self.value(key).and_then(Value::as_u64)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.value(key).and_then(Value::as_bool)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.value(key).and_then(Value::as_str)
    }

    fn get_path(&self, key: &str) -> Option<ObjectPath> {
        self.value(key).and_then(Value::as_path)
    }

    fn get_paths(&self, key: &str) -> Vec<ObjectPath> {
        self.value(key).map(Value::as_paths).unwrap_or_default()
    }

    fn get_strings(&self, key: &str) -> Vec<String> {
        self.value(key).map(Value::as_strings).unwrap_or_default()
    }

    fn get_object(&self, key: &str) -> Option<&EmbeddedObject> {
        self.value(key).and_then(Value::as_object)
    }
}

impl Properties for PropertyMap {
    fn value(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

impl Properties for EmbeddedObject {
    fn value(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_object_builder() {
        let obj = EmbeddedObject::new("Msvm_MemorySettingData")
            .with("VirtualQuantity", 2048u64)
            .with_opt("Limit", None::<u64>)
            .with("DynamicMemoryEnabled", true);

        assert_eq!(obj.get_u64("VirtualQuantity"), Some(2048));
        assert_eq!(obj.get_bool("DynamicMemoryEnabled"), Some(true));
        assert!(obj.value("Limit").is_none());
    }

    #[test]
    fn test_paths_accept_string_forms() {
        let mut map = PropertyMap::new();
        map.insert(
            "HostResource".into(),
            Value::StringList(vec!["Msvm_VirtualEthernetSwitch.Name=\"A\"".into()]),
        );
        map.insert("Job".into(), Value::String("Msvm_ConcreteJob.InstanceID=\"1\"".into()));

        assert_eq!(map.get_paths("HostResource").len(), 1);
        assert_eq!(map.get_path("Job").map(|p| p.class().to_string()).as_deref(), Some("Msvm_ConcreteJob"));
    }

    #[test]
    fn test_value_json_shape() {
        let json = serde_json::to_value(Value::UInt(4096)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "u_int", "value": 4096}));

        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::UInt(4096));
    }
}
