//! Property map values transferred across the toolkit boundary
//!
//! Visuals describe their configuration as a map of named values. The map
//! crosses the FFI boundary bincode-encoded; the native side owns the
//! authoritative copy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A value in a visual's property map
///
/// Note: We don't use `#[serde(untagged)]` because bincode doesn't support it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Vector2 value
    Vec2([f32; 2]),
    /// Vector4 value (also colors)
    Vec4([f32; 4]),
    /// Array of values
    Array(Vec<PropertyValue>),
    /// Nested map
    Map(HashMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as vec2
    pub fn as_vec2(&self) -> Option<[f32; 2]> {
        match self {
            PropertyValue::Vec2(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as vec4
    pub fn as_vec4(&self) -> Option<[f32; 4]> {
        match self {
            PropertyValue::Vec4(v) => Some(*v),
            _ => None,
        }
    }

    /// Get type name for debugging
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::Vec2(_) => "vec2",
            PropertyValue::Vec4(_) => "vec4",
            PropertyValue::Array(_) => "array",
            PropertyValue::Map(_) => "map",
        }
    }
}

/// Map of property name to value
pub type PropertyMap = HashMap<String, PropertyValue>;

/// Extension trait for PropertyMap
pub trait PropertyMapExt {
    /// Get a bool property
    fn get_bool(&self, key: &str) -> Option<bool>;
    /// Get an int property
    fn get_int(&self, key: &str) -> Option<i64>;
    /// Get a float property
    fn get_float(&self, key: &str) -> Option<f64>;
    /// Get a string property
    fn get_string(&self, key: &str) -> Option<&str>;
    /// Get a vec2 property
    fn get_vec2(&self, key: &str) -> Option<[f32; 2]>;
}

impl PropertyMapExt for PropertyMap {
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_int())
    }

    fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_float())
    }

    fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_string())
    }

    fn get_vec2(&self, key: &str) -> Option<[f32; 2]> {
        self.get(key).and_then(|v| v.as_vec2())
    }
}

/// Encode a property map for FFI transfer
pub fn encode_map(map: &PropertyMap) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(map)
}

/// Decode a property map received over FFI
pub fn decode_map(data: &[u8]) -> Result<PropertyMap, bincode::Error> {
    bincode::deserialize(data)
}
