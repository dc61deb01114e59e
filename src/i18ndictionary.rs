use std::fmt::{Debug, Formatter};

use indexmap::IndexMap;
use serde_json::{Map, Value};

static DFLT: &str = "dflt";

/// A localized string, keyed by locale code.
///
/// The reserved `dflt` key holds the default-locale value. On disk a
/// dictionary with a single value is written as a bare string.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct I18NDictionary(pub IndexMap<String, String>);

impl I18NDictionary {
    /// An empty dictionary
    pub fn new() -> Self {
        I18NDictionary::default()
    }

    /// A dictionary holding only a default string
    pub fn with_default(s: impl Into<String>) -> Self {
        let mut dict = I18NDictionary::new();
        dict.set_default(s);
        dict
    }

    /// The default-locale value, falling back to the first value present.
    pub fn get_default(&self) -> Option<&String> {
        self.0.get(DFLT).or_else(|| self.0.values().next())
    }

    /// Sets the default-locale value. Empty strings are ignored.
    pub fn set_default(&mut self, s: impl Into<String>) {
        let s = s.into();
        if !s.is_empty() {
            self.0.insert(DFLT.to_string(), s);
        }
    }

    /// Sets the string for a language
    pub fn insert(&mut self, lang: String, s: String) {
        self.0.insert(lang, s);
    }

    /// The string for a language
    pub fn get(&self, lang: &str) -> Option<&String> {
        self.0.get(lang)
    }

    /// Is the dictionary empty?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of languages
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Merges a locale map in, or sets the default from a bare string.
    pub fn copy_in(&mut self, other: &Value) {
        match other {
            Value::Object(map) => {
                for (lang, s) in map {
                    if let Some(s) = s.as_str() {
                        self.0.insert(lang.clone(), s.to_string());
                    }
                }
            }
            Value::String(s) => self.set_default(s.as_str()),
            _ => {}
        }
    }

    /// The on-disk form: a bare string when there is at most one value.
    pub fn default_or_dict(&self) -> Value {
        if self.0.len() > 1 {
            self.to_json()
        } else {
            self.get_default()
                .map(|s| Value::String(s.clone()))
                .unwrap_or(Value::Null)
        }
    }

    /// Reads a bare string or a language map
    pub fn from_json(value: &Value) -> Self {
        let mut dict = I18NDictionary::new();
        dict.copy_in(value);
        dict
    }

    /// A bare string when only the default is set, else a map
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect::<Map<String, Value>>(),
        )
    }
}

impl Debug for I18NDictionary {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_str("<")?;
        let def = self.get_default();
        if let Some(def) = def {
            fmt.write_str(def)?;
        } else {
            fmt.write_str("no default")?;
        }
        fmt.write_str(">")
    }
}

impl From<String> for I18NDictionary {
    fn from(val: String) -> Self {
        I18NDictionary::with_default(val)
    }
}

impl From<&str> for I18NDictionary {
    fn from(val: &str) -> Self {
        I18NDictionary::with_default(val)
    }
}

impl From<&String> for I18NDictionary {
    fn from(val: &String) -> Self {
        I18NDictionary::with_default(val.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn bare_string_is_default() {
        let dict = I18NDictionary::from_json(&json!("Regular"));
        assert_eq!(dict.get_default().map(String::as_str), Some("Regular"));
        assert_eq!(dict.default_or_dict(), json!("Regular"));
    }

    #[test]
    fn multiple_locales_stay_a_map() {
        let dict = I18NDictionary::from_json(&json!({"dflt": "Bold", "de": "Fett"}));
        assert_eq!(dict.default_or_dict(), json!({"dflt": "Bold", "de": "Fett"}));
        assert_eq!(dict.get("de").map(String::as_str), Some("Fett"));
    }

    #[test]
    fn default_falls_back_to_first_value() {
        let dict = I18NDictionary::from_json(&json!({"en": "Light"}));
        assert_eq!(dict.get_default().map(String::as_str), Some("Light"));
    }

    #[test]
    fn empty_default_is_ignored() {
        let mut dict = I18NDictionary::new();
        dict.set_default("");
        assert!(dict.is_empty());
        assert_eq!(dict.default_or_dict(), Value::Null);
    }
}
