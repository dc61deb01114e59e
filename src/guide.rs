use std::any::Any;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::{
    common::{Color, FieldValue, Position},
    dirty::DirtyContext,
    schema::Kind,
    tracking::{Facade, ObjectCore, Tracked},
    ContextError,
};

/// A guideline on a layer or master.
pub struct Guide {
    core: ObjectCore,
}

facade!(Guide, Kind::Guide);

impl Guide {
    fn build(core: ObjectCore) -> Self {
        Guide { core }
    }

    /// A new guideline
    pub fn new(position: Position) -> Result<Rc<Guide>, ContextError> {
        let mut map = Map::new();
        map.insert("pos".to_string(), position.to_json());
        Guide::from_document(&Value::Object(map))
    }

    optional_fields! {
        name: String = "name";
        color: Color = "color";
    }

    defaulted_fields! {
        position: Position = "position";
    }
}

impl Tracked for Guide {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, _context: DirtyContext) {}

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
