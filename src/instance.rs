use std::any::Any;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::{
    common::{FieldValue, Location},
    dirty::DirtyContext,
    font::Font,
    i18ndictionary::I18NDictionary,
    names::Names,
    schema::Kind,
    tracking::{ancestor, ChildOne, Facade, ObjectCore, Tracked},
    ContextError,
};

/// A named or static instance.
pub struct Instance {
    core: ObjectCore,
    custom_names: ChildOne<Names>,
}

facade!(Instance, Kind::Instance);

impl Instance {
    fn build(core: ObjectCore) -> Self {
        Instance {
            core,
            custom_names: ChildOne::new("customNames"),
        }
    }

    /// A new instance
    pub fn new(
        name: impl Into<I18NDictionary>,
        location: Location,
    ) -> Result<Rc<Instance>, ContextError> {
        let name: I18NDictionary = name.into();
        let mut map = Map::new();
        map.insert("name".to_string(), name.to_json());
        if !location.is_empty() {
            map.insert("location".to_string(), location.to_json());
        }
        Instance::from_document(&Value::Object(map))
    }

    defaulted_fields! {
        name: I18NDictionary = "name";
        /// Designspace location of the instance
        location: Location = "location";
        variable: bool = "variable";
    }

    /// Names which override the font's names for this instance.
    pub fn custom_names(&self) -> Option<Rc<Names>> {
        self.custom_names.get(&self.core)
    }

    /// Sets or clears the instance's own names
    pub fn set_custom_names(&self, names: Option<Rc<Names>>) {
        self.custom_names.set(&self.core, names);
        self.field_changed("customNames");
    }

    /// The custom style name if one is set, else the instance name.
    pub fn localised_style_name(&self) -> I18NDictionary {
        self.custom_names()
            .map(|names| names.style_name())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.name())
    }

    /// The PostScript name from the custom names
    pub fn postscript_font_name(&self) -> Option<String> {
        self.custom_names()?.postscript_name().get_default().cloned()
    }

    /// The font holding this instance
    pub fn font(&self) -> Option<Rc<Font>> {
        ancestor(self)
    }
}

impl Tracked for Instance {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, context: DirtyContext) {
        self.custom_names.clean(&self.core, context);
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
