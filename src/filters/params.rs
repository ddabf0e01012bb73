// SPDX-License-Identifier: GPL-3.0-only

//! Typed filter parameters

use crate::constants::KEY_FILTER_NAME;
use crate::errors::{EffectError, EffectResult};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A parameter value; accessors check the variant instead of casting
#[derive(Clone)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Text(String),
    /// Caller data passed through to delegates untouched
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Float(_) => "float",
            ParamValue::Int(_) => "int32",
            ParamValue::UInt(_) => "uint32",
            ParamValue::Text(_) => "string",
            ParamValue::Opaque(_) => "opaque",
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ParamValue::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            ParamValue::Opaque(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            ParamValue::Float(v) => serde_json::Number::from_f64(f64::from(*v)).map(Into::into),
            ParamValue::Int(v) => Some((*v).into()),
            ParamValue::UInt(v) => Some((*v).into()),
            ParamValue::Text(v) => Some(v.clone().into()),
            ParamValue::Opaque(_) => None,
        }
    }
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            ParamValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            ParamValue::UInt(v) => f.debug_tuple("UInt").field(v).finish(),
            ParamValue::Text(v) => f.debug_tuple("Text").field(v).finish(),
            ParamValue::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParamValue::Float(a), ParamValue::Float(b)) => a == b,
            (ParamValue::Int(a), ParamValue::Int(b)) => a == b,
            (ParamValue::UInt(a), ParamValue::UInt(b)) => a == b,
            (ParamValue::Text(a), ParamValue::Text(b)) => a == b,
            (ParamValue::Opaque(a), ParamValue::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::UInt(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
            ParamValue::Opaque(_) => f.write_str("<opaque>"),
        }
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::UInt(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Ordered parameter map; a later set for a key replaces the earlier one
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Decode a persisted parameter object. Numbers become floats, strings
/// become text and the filter name entry is dropped.
pub fn from_json(value: &serde_json::Value) -> EffectResult<ParamMap> {
    let object = value.as_object().ok_or_else(|| {
        EffectError::InvalidParameter("saved parameters must be a JSON object".into())
    })?;
    let mut map = ParamMap::new();
    for (key, value) in object {
        if key == KEY_FILTER_NAME {
            continue;
        }
        let param = match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(|v| ParamValue::Float(v as f32))
                .ok_or_else(|| EffectError::InvalidParameter(format!("{key}: {n}")))?,
            serde_json::Value::String(s) => ParamValue::Text(s.clone()),
            other => {
                warn!(key = %key, value = %other, "Unsupported saved value");
                return Err(EffectError::AnyCastTypeMismatch {
                    key: key.clone(),
                    expected: "number or string",
                });
            }
        };
        map.insert(key.clone(), param);
    }
    Ok(map)
}

/// Encode `params` as a JSON object tagged with the filter name; opaque
/// values are not persisted
pub fn to_json(filter: &str, params: &ParamMap) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    object.insert(KEY_FILTER_NAME.to_string(), filter.into());
    for (key, value) in params {
        if let Some(json) = value.to_json() {
            object.insert(key.clone(), json);
        }
    }
    serde_json::Value::Object(object)
}

/// A float parameter with an inclusive valid range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatParam {
    pub key: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl FloatParam {
    fn extract(&self, value: &ParamValue) -> EffectResult<f32> {
        let v = value.as_f32().ok_or_else(|| EffectError::AnyCastTypeMismatch {
            key: self.key.to_string(),
            expected: "float",
        })?;
        if v.is_nan() {
            return Err(self.out_of_range(v));
        }
        Ok(v)
    }

    fn out_of_range(&self, v: f32) -> EffectError {
        EffectError::ValueOutOfRange {
            key: self.key.to_string(),
            value: v.to_string(),
            min: self.min.to_string(),
            max: self.max.to_string(),
        }
    }

    pub fn contains(&self, v: f32) -> bool {
        (self.min..=self.max).contains(&v)
    }

    /// Store `value`, clipping it to range
    pub fn set(
        &self,
        filter: &str,
        params: &mut ParamMap,
        value: &ParamValue,
    ) -> EffectResult<f32> {
        let v = self.extract(value)?;
        let clamped = v.clamp(self.min, self.max);
        if clamped != v {
            warn!(
                filter,
                key = self.key,
                value = v,
                clamped,
                "Parameter out of range, clamped"
            );
        }
        params.insert(self.key.to_string(), ParamValue::Float(clamped));
        Ok(clamped)
    }

    /// Reapply a saved value; unlike [`FloatParam::set`] an out of range
    /// value is an error and `params` is left untouched
    pub fn restore(
        &self,
        filter: &str,
        params: &mut ParamMap,
        saved: &ParamMap,
    ) -> EffectResult<()> {
        let Some(value) = saved.get(self.key) else {
            return Ok(());
        };
        let v = self.extract(value)?;
        if !self.contains(v) {
            warn!(filter, key = self.key, value = v, "Saved parameter out of range");
            return Err(self.out_of_range(v));
        }
        params.insert(self.key.to_string(), ParamValue::Float(v));
        Ok(())
    }

    pub fn get(&self, params: &ParamMap) -> f32 {
        params
            .get(self.key)
            .and_then(ParamValue::as_f32)
            .unwrap_or(self.default)
    }
}
