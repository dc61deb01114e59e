use std::str::FromStr;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{i18ndictionary::I18NDictionary, schema::DATE_FORMAT, ContextError};

/// A designspace or userspace location, axis tag to coordinate
pub type Location = IndexMap<String, f64>;

#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
/// A position in 2D space, with an optional angle
pub struct Position {
    /// X coordinate
    pub x: i64,
    /// Y coordinate
    pub y: i64,
    /// Angle in degrees
    #[serde(default)]
    pub angle: f64,
}

impl Position {
    /// Creates a position
    pub fn new(x: i64, y: i64, angle: f64) -> Position {
        Position { x, y, angle }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// An RGBA colour, each channel 0 to 255
pub struct Color {
    /// Red
    pub r: i64,
    /// Green
    pub g: i64,
    /// Blue
    pub b: i64,
    #[serde(default)]
    /// Alpha
    pub a: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Direction of text flow
pub enum Direction {
    /// Left to right text flow
    LeftToRight,
    /// Right to left text flow
    RightToLeft,
    /// Top to bottom text flow
    TopToBottom,
    /// Bidirectional,
    Bidi,
}

impl Direction {
    /// The code stored on disk
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::LeftToRight => "LTR",
            Direction::RightToLeft => "RTL",
            Direction::TopToBottom => "TTB",
            Direction::Bidi => "BIDI",
        }
    }
}

impl FromStr for Direction {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lefttoright" | "ltr" => Ok(Direction::LeftToRight),
            "righttoleft" | "rtl" => Ok(Direction::RightToLeft),
            "toptobottom" | "ttb" | "vtr" => Ok(Direction::TopToBottom),
            "bidi" => Ok(Direction::Bidi),
            _ => Err(ContextError::General(format!(
                "Invalid direction string: {}",
                s
            ))),
        }
    }
}

/// A JSON number, written as an integer when it has no fractional part.
pub(crate) fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Conversion between typed field values and their stored JSON form.
pub trait FieldValue: Sized {
    /// Reads a value, or `None` when the JSON has the wrong shape
    fn from_json(value: &Value) -> Option<Self>;
    /// The JSON stored for this value
    fn to_json(&self) -> Value;
}

impl FieldValue for i64 {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_i64()
    }
    fn to_json(&self) -> Value {
        Value::from(*self)
    }
}

impl FieldValue for f64 {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_f64()
    }
    fn to_json(&self) -> Value {
        number(*self)
    }
}

impl FieldValue for bool {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_bool()
    }
    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FieldValue for String {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_str().map(|s| s.to_string())
    }
    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }
}

impl FieldValue for Value {
    fn from_json(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
    fn to_json(&self) -> Value {
        self.clone()
    }
}

impl FieldValue for Vec<u32> {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_array().map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_u64().and_then(|u| u32::try_from(u).ok()))
                .collect()
        })
    }
    fn to_json(&self) -> Value {
        Value::from(self.clone())
    }
}

impl FieldValue for Vec<f64> {
    fn from_json(value: &Value) -> Option<Self> {
        value
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_f64).collect())
    }
    fn to_json(&self) -> Value {
        Value::Array(self.iter().map(|v| number(*v)).collect())
    }
}

impl FieldValue for Location {
    fn from_json(value: &Value) -> Option<Self> {
        value.as_object().map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                .collect()
        })
    }
    fn to_json(&self) -> Value {
        Value::Object(self.iter().map(|(k, v)| (k.clone(), number(*v))).collect())
    }
}

impl FieldValue for Position {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Position {
                x: items.first()?.as_i64()?,
                y: items.get(1)?.as_i64()?,
                angle: items.get(2).and_then(Value::as_f64).unwrap_or(0.0),
            }),
            _ => serde_json::from_value(value.clone()).ok(),
        }
    }
    fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("x".to_string(), Value::from(self.x));
        map.insert("y".to_string(), Value::from(self.y));
        map.insert("angle".to_string(), number(self.angle));
        Value::Object(map)
    }
}

impl FieldValue for Color {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Color {
                r: items.first()?.as_i64()?,
                g: items.get(1)?.as_i64()?,
                b: items.get(2)?.as_i64()?,
                a: items.get(3).and_then(Value::as_i64).unwrap_or(0),
            }),
            _ => serde_json::from_value(value.clone()).ok(),
        }
    }
    fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("r".to_string(), Value::from(self.r));
        map.insert("g".to_string(), Value::from(self.g));
        map.insert("b".to_string(), Value::from(self.b));
        map.insert("a".to_string(), Value::from(self.a));
        Value::Object(map)
    }
}

impl FieldValue for I18NDictionary {
    fn from_json(value: &Value) -> Option<Self> {
        Some(I18NDictionary::from_json(value))
    }
    fn to_json(&self) -> Value {
        self.to_json()
    }
}

impl FieldValue for NaiveDateTime {
    fn from_json(value: &Value) -> Option<Self> {
        NaiveDateTime::parse_from_str(value.as_str()?, DATE_FORMAT).ok()
    }
    fn to_json(&self) -> Value {
        Value::String(self.format(DATE_FORMAT).to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn numbers_prefer_integers() {
        assert_eq!(number(400.0), json!(400));
        assert_eq!(number(-0.5), json!(-0.5));
    }

    #[test]
    fn position_from_either_form() {
        let from_list = Position::from_json(&json!([100, 200, 90])).unwrap();
        let from_map = Position::from_json(&json!({"x": 100, "y": 200, "angle": 90})).unwrap();
        assert_eq!(from_list, from_map);
        assert_eq!(from_list.to_json(), json!({"x": 100, "y": 200, "angle": 90}));
    }

    #[test]
    fn color_alpha_defaults_to_zero() {
        let color = Color::from_json(&json!([255, 0, 0])).unwrap();
        assert_eq!(color, Color { r: 255, g: 0, b: 0, a: 0 });
    }

    #[test]
    fn direction_strings() {
        assert_eq!(Direction::from_str("rtl").unwrap(), Direction::RightToLeft);
        assert_eq!(Direction::LeftToRight.as_str(), "LTR");
        assert!(Direction::from_str("sideways").is_err());
    }
}
