use std::any::Any;
use std::rc::Rc;

use serde_json::json;

use crate::{
    dirty::DirtyContext,
    layer::Layer,
    schema::Kind,
    tracking::{ancestor, Facade, ObjectCore, Tracked},
    ContextError,
};

/// A named attachment point on a layer.
pub struct Anchor {
    core: ObjectCore,
}

facade!(Anchor, Kind::Anchor);

impl Anchor {
    fn build(core: ObjectCore) -> Self {
        Anchor { core }
    }

    /// A new anchor
    pub fn new(name: &str, x: i64, y: i64) -> Result<Rc<Anchor>, ContextError> {
        Anchor::from_document(&json!({"name": name, "x": x, "y": y}))
    }

    optional_fields! {
        name: String = "name";
    }

    defaulted_fields! {
        x: i64 = "x";
        y: i64 = "y";
    }

    /// The layer holding this anchor
    pub fn layer(&self) -> Option<Rc<Layer>> {
        ancestor(self)
    }
}

impl Tracked for Anchor {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, _context: DirtyContext) {}

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
