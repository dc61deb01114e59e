use std::any::Any;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::{
    dirty::DirtyContext,
    i18ndictionary::I18NDictionary,
    schema::Kind,
    tracking::{Facade, ObjectCore, Tracked},
    ContextError,
};

pub use crate::schema::NAME_FIELDS;

/// The localizable names of a font (or the custom names of an instance).
pub struct Names {
    core: ObjectCore,
}

facade!(Names, Kind::Names);

impl Names {
    fn build(core: ObjectCore) -> Self {
        Names { core }
    }

    /// An empty name table
    pub fn new() -> Rc<Names> {
        Names::from_record(crate::record::DynamicRecord::new_ref(Kind::Names))
    }

    /// A name field by its field name, e.g. `"familyName"`.
    pub fn field(&self, name: &str) -> I18NDictionary {
        self.get(name)
            .map(|v| I18NDictionary::from_json(&v))
            .unwrap_or_default()
    }

    /// Sets a name field, or removes it when empty
    pub fn set_field(
        &self,
        name: &str,
        value: impl Into<I18NDictionary>,
    ) -> Result<(), ContextError> {
        let value: I18NDictionary = value.into();
        if value.is_empty() {
            self.set(name, Value::Null)
        } else {
            self.set(name, value.to_json())
        }
    }

    defaulted_fields! {
        family_name: I18NDictionary = "familyName";
        style_name: I18NDictionary = "styleName";
        copyright: I18NDictionary = "copyright";
        style_map_family_name: I18NDictionary = "styleMapFamilyName";
        style_map_style_name: I18NDictionary = "styleMapStyleName";
        unique_id: I18NDictionary = "uniqueID";
        full_name: I18NDictionary = "fullName";
        version: I18NDictionary = "version";
        postscript_name: I18NDictionary = "postscriptName";
        trademark: I18NDictionary = "trademark";
        manufacturer: I18NDictionary = "manufacturer";
        designer: I18NDictionary = "designer";
        description: I18NDictionary = "description";
        manufacturer_url: I18NDictionary = "manufacturerURL";
        designer_url: I18NDictionary = "designerURL";
        license: I18NDictionary = "license";
        license_url: I18NDictionary = "licenseURL";
        typographic_family: I18NDictionary = "typographicFamily";
        typographic_subfamily: I18NDictionary = "typographicSubfamily";
        compatible_full_name: I18NDictionary = "compatibleFullName";
        sample_text: I18NDictionary = "sampleText";
        wws_family_name: I18NDictionary = "WWSFamilyName";
        wws_subfamily_name: I18NDictionary = "WWSSubfamilyName";
    }

    /// The name for an OpenType `name` table ID, or `None` if that ID is not
    /// stored here or is empty.
    pub fn by_name_id(&self, id: u16) -> Option<I18NDictionary> {
        let either = |preferred: &str, fallback: &str| {
            let value = self.field(preferred);
            if value.is_empty() {
                self.field(fallback)
            } else {
                value
            }
        };
        let value = match id {
            0 => self.field("copyright"),
            1 => either("styleMapFamilyName", "familyName"),
            2 => self.field("styleMapStyleName"),
            3 => self.field("uniqueID"),
            4 => self.field("fullName"),
            5 => self.field("version"),
            6 => self.field("postscriptName"),
            7 => self.field("trademark"),
            8 => self.field("manufacturer"),
            9 => self.field("designer"),
            10 => self.field("description"),
            11 => self.field("manufacturerURL"),
            12 => self.field("designerURL"),
            13 => self.field("license"),
            14 => self.field("licenseURL"),
            16 => self.field("typographicFamily"),
            17 => either("typographicSubfamily", "styleName"),
            18 => self.field("compatibleFullName"),
            19 => self.field("sampleText"),
            21 => self.field("WWSFamilyName"),
            22 => self.field("WWSSubfamilyName"),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }

    /// The non-empty names, each as a bare string or a locale map.
    pub fn to_name_map(&self) -> Map<String, Value> {
        NAME_FIELDS
            .iter()
            .filter_map(|field| {
                let value = self.field(field);
                (!value.is_empty()).then(|| (field.to_string(), value.default_or_dict()))
            })
            .collect()
    }
}

impl Tracked for Names {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, _context: DirtyContext) {}

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn name_id_fallbacks() {
        let names = Names::from_document(&json!({
            "familyName": "Test Sans",
            "styleName": "Bold",
            "typographicSubfamily": {"dflt": "Bold Display", "de": "Fett Display"}
        }))
        .unwrap();
        assert_eq!(names.by_name_id(1).unwrap().get_default().unwrap(), "Test Sans");
        assert_eq!(
            names.by_name_id(17).unwrap().get("de").unwrap(),
            "Fett Display"
        );
        assert!(names.by_name_id(0).is_none());
        assert!(names.by_name_id(15).is_none());
        names.set_style_map_family_name("Test Sans Bold").unwrap();
        assert_eq!(
            names.by_name_id(1).unwrap().get_default().unwrap(),
            "Test Sans Bold"
        );
    }

    #[test]
    fn name_map_uses_bare_strings() {
        let names = Names::new();
        names.set_family_name("Test Sans").unwrap();
        names.set_field("designer", "A. Designer").unwrap();
        assert_eq!(
            Value::Object(names.to_name_map()),
            json!({"familyName": "Test Sans", "designer": "A. Designer"})
        );
        names.set_field("designer", I18NDictionary::new()).unwrap();
        assert!(names.get("designer").is_none());
    }
}
