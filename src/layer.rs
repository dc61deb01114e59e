use std::any::Any;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use kurbo::{Affine, BezPath};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    anchor::Anchor,
    common::{Color, Location},
    dirty::DirtyContext,
    font::Font,
    glyph::Glyph,
    guide::Guide,
    master::Master,
    schema::Kind,
    shape::Shape,
    tracking::{ancestor, ChildList, Facade, ObjectCore, Tracked, TrackedSequence},
    ContextError,
};

/// Component nesting deeper than this is assumed to be a reference cycle.
const MAX_COMPONENT_DEPTH: usize = 32;

/// One drawing of a glyph, usually the glyph's appearance in one master.
pub struct Layer {
    core: ObjectCore,
    guides: ChildList<Guide>,
    shapes: ChildList<Shape>,
    anchors: ChildList<Anchor>,
}

facade!(Layer, Kind::Layer);

impl Layer {
    fn build(core: ObjectCore) -> Self {
        Layer {
            core,
            guides: ChildList::new("guides"),
            shapes: ChildList::new("shapes"),
            anchors: ChildList::new("anchors"),
        }
    }

    /// A new layer with a fresh id, optionally bound to a master.
    pub fn new(width: i64, master_id: Option<&str>) -> Result<Rc<Layer>, ContextError> {
        let mut map = Map::new();
        map.insert("width".to_string(), Value::from(width));
        if let Some(master_id) = master_id {
            map.insert("_master".to_string(), Value::from(master_id));
        }
        map.insert("id".to_string(), Value::from(Uuid::new_v4().to_string()));
        Layer::from_document(&Value::Object(map))
    }

    defaulted_fields! {
        width: i64 = "width";
        height: i64 = "height";
        is_background: bool = "isBackground";
    }

    optional_fields! {
        vert_width: i64 = "vertWidth";
        name: String = "name";
        /// The id of the master this layer draws
        master_id: String = "_master";
        id: String = "id";
        color: Color = "color";
        layer_index: i64 = "layerIndex";
        /// The id of this layer's background layer
        background: String = "background";
        location: Location = "location";
    }

    /// The layer's guidelines
    pub fn guides(&self) -> TrackedSequence<Guide> {
        self.guides.get(&self.core)
    }

    /// The layer's paths and components
    pub fn shapes(&self) -> TrackedSequence<Shape> {
        self.shapes.get(&self.core)
    }

    /// The layer's anchors
    pub fn anchors(&self) -> TrackedSequence<Anchor> {
        self.anchors.get(&self.core)
    }

    /// The glyph holding this layer
    pub fn glyph(&self) -> Option<Rc<Glyph>> {
        ancestor(self)
    }

    /// The font holding this layer
    pub fn font(&self) -> Option<Rc<Font>> {
        ancestor(self)
    }

    /// The master this layer belongs to
    pub fn master(&self) -> Option<Rc<Master>> {
        self.font()?.master(&self.master_id()?)
    }

    /// The shapes that are paths
    pub fn paths(&self) -> Vec<Rc<Shape>> {
        self.shapes().iter().filter(|s| s.is_path()).collect()
    }

    /// The shapes that are components
    pub fn components(&self) -> Vec<Rc<Shape>> {
        self.shapes().iter().filter(|s| s.is_component()).collect()
    }

    /// Does the layer use any components?
    pub fn has_components(&self) -> bool {
        self.shapes().iter().any(|s| s.is_component())
    }

    /// The first anchor with this name
    pub fn anchor(&self, name: &str) -> Option<Rc<Anchor>> {
        self.anchors()
            .iter()
            .find(|a| a.name().as_deref() == Some(name))
    }

    /// Anchors keyed by name
    pub fn anchors_by_name(&self) -> IndexMap<String, Rc<Anchor>> {
        self.anchors()
            .iter()
            .filter_map(|a| a.name().map(|n| (n, a)))
            .collect()
    }

    /// The layer of the same glyph whose id is this layer's `background`.
    pub fn background_layer(&self) -> Option<Rc<Layer>> {
        let background = self.background()?;
        self.glyph()?.layer(&background)
    }

    /// The layer of the same glyph that uses this layer as its background.
    pub fn background_of(&self) -> Option<Rc<Layer>> {
        let id = self.id()?;
        self.glyph()?
            .layers()
            .iter()
            .find(|l| l.background().as_deref() == Some(id.as_str()))
    }

    /// Finds the layer a component of this layer draws from: the referenced
    /// glyph's layer for this layer's master, else its layer sharing this
    /// layer's id. A background layer without either falls back to the
    /// background of the referenced glyph's layer in its owner's master.
    fn component_source(&self, glyph: &str) -> Option<Rc<Layer>> {
        if let Some(master) = self.master() {
            return master.glyph_layer(glyph);
        }
        let id = self.id()?;
        if let Some(layer) = self.font()?.glyphs().get(glyph)?.layer(&id) {
            return Some(layer);
        }
        if !self.is_background() {
            return None;
        }
        let master_layer = self.background_of()?.master()?.glyph_layer(glyph)?;
        Some(master_layer.background_layer().unwrap_or(master_layer))
    }

    fn component_names(&self) -> Vec<String> {
        self.components().iter().filter_map(|c| c.reference()).collect()
    }

    fn gather_components(
        &self,
        depth: usize,
        out: &mut IndexSet<String>,
    ) -> Result<(), ContextError> {
        if depth > MAX_COMPONENT_DEPTH {
            return Err(ContextError::General(
                "Component references nest too deeply".to_string(),
            ));
        }
        let mine = self.component_names();
        out.extend(mine.iter().cloned());
        for name in mine {
            let layer = self
                .component_source(&name)
                .ok_or(ContextError::GlyphNotFound { glyph: name })?;
            layer.gather_components(depth + 1, out)?;
        }
        Ok(())
    }

    /// Names of every glyph this layer uses as a component, directly or
    /// through other components.
    pub fn recursive_component_set(&self) -> Result<IndexSet<String>, ContextError> {
        let mut out = IndexSet::new();
        self.gather_components(0, &mut out)?;
        Ok(out)
    }

    /// Every glyph reachable through this layer's components, mapped to the
    /// layer that supplies its outlines. Each glyph is visited once, so
    /// mutually referencing components still terminate.
    pub fn nested_component_dict(&self) -> Result<IndexMap<String, Rc<Layer>>, ContextError> {
        let mut result = IndexMap::new();
        let mut todo = self.component_names();
        while let Some(current) = todo.pop() {
            if result.contains_key(&current) {
                continue;
            }
            let layer = self
                .component_source(&current)
                .ok_or_else(|| ContextError::GlyphNotFound {
                    glyph: current.clone(),
                })?;
            todo.extend(layer.component_names());
            result.insert(current, layer);
        }
        Ok(result)
    }

    /// Is this layer attached to a glyph inside a font?
    pub fn valid(&self) -> bool {
        self.font().is_some() && self.glyph().is_some()
    }

    fn collect_paths(
        &self,
        transform: Affine,
        depth: usize,
        out: &mut Vec<BezPath>,
    ) -> Result<(), ContextError> {
        if depth > MAX_COMPONENT_DEPTH {
            return Err(ContextError::General(
                "Component references nest too deeply".to_string(),
            ));
        }
        for shape in self.shapes().iter() {
            if shape.is_component() {
                let layer =
                    shape
                        .component_layer()
                        .ok_or_else(|| ContextError::GlyphNotFound {
                            glyph: shape.reference().unwrap_or_default(),
                        })?;
                layer.collect_paths(transform * shape.to_affine(), depth + 1, out)?;
            } else {
                let mut path = shape.to_kurbo()?;
                path.apply_affine(transform);
                out.push(path);
            }
        }
        Ok(())
    }

    /// The outline bounds with components resolved in this layer's master,
    /// or `None` for an empty layer.
    pub fn bounds(&self) -> Result<Option<kurbo::Rect>, ContextError> {
        let mut paths = vec![];
        self.collect_paths(Affine::IDENTITY, 0, &mut paths)?;
        Ok(paths
            .iter()
            .map(kurbo::Shape::bounding_box)
            .reduce(|accum, item| accum.union(item)))
    }

    /// The left sidebearing
    pub fn lsb(&self) -> Result<f64, ContextError> {
        Ok(self.bounds()?.map(|b| b.min_x()).unwrap_or(0.0))
    }

    /// The right sidebearing
    pub fn rsb(&self) -> Result<f64, ContextError> {
        Ok(self
            .bounds()?
            .map(|b| self.width() as f64 - b.max_x())
            .unwrap_or(0.0))
    }
}

impl Tracked for Layer {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, context: DirtyContext) {
        self.guides.clean(&self.core, context);
        self.shapes.clean(&self.core, context);
        self.anchors.clean(&self.core, context);
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::dirty::{CANVAS_RENDER, FILE_SAVING};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn layer() -> Rc<Layer> {
        Layer::from_document(&json!({
            "width": 600,
            "id": "m1",
            "_master": "m1",
            "shapes": [
                {"nodes": [[50, 0, "l"], [550, 0, "l"], [550, 700, "l"], [50, 700, "l"]]}
            ],
            "anchors": [{"name": "top", "x": 300, "y": 700}, {"name": "bottom", "x": 300, "y": 0}]
        }))
        .unwrap()
    }

    #[test]
    fn sidebearings() {
        let layer = layer();
        assert_eq!(layer.bounds().unwrap(), Some(kurbo::Rect::new(50.0, 0.0, 550.0, 700.0)));
        assert_eq!(layer.lsb().unwrap(), 50.0);
        assert_eq!(layer.rsb().unwrap(), 50.0);
        let empty = Layer::new(250, None).unwrap();
        assert_eq!(empty.bounds().unwrap(), None);
        assert_eq!(empty.lsb().unwrap(), 0.0);
    }

    #[test]
    fn anchors_by_name() {
        let layer = layer();
        let anchors = layer.anchors_by_name();
        assert_eq!(anchors.keys().collect::<Vec<_>>(), vec!["top", "bottom"]);
        assert_eq!(layer.anchor("top").unwrap().y(), 700);
        assert!(layer.anchor("ogonek").is_none());
    }

    #[test]
    fn unresolvable_component_is_reported() {
        let layer = layer();
        layer
            .shapes()
            .push(Shape::component("missing", None).unwrap());
        assert!(matches!(
            layer.bounds(),
            Err(ContextError::GlyphNotFound { .. })
        ));
        assert_eq!(layer.components().len(), 1);
        assert_eq!(layer.paths().len(), 1);
    }

    #[test]
    fn fresh_layers_get_ids() {
        let a = Layer::new(500, Some("m1")).unwrap();
        let b = Layer::new(500, Some("m1")).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.master_id().as_deref(), Some("m1"));
        // Detached layers have no font or master
        assert!(a.font().is_none());
        assert!(a.master().is_none());
    }

    #[test]
    fn absent_falsy_fields_are_already_at_their_value() {
        let layer = layer();
        layer.enable_tracking();
        layer.set_height(0).unwrap();
        layer.set_is_background(false).unwrap();
        assert!(!layer.is_dirty(FILE_SAVING));
        assert!(!layer.is_dirty(CANVAS_RENDER));
        layer.set_height(800).unwrap();
        assert!(layer.dirty_fields(FILE_SAVING).contains("height"));
        assert_eq!(layer.height(), 800);
    }

    fn composite_font() -> Rc<Font> {
        Font::from_document(&json!({
            "masters": [{"name": "Regular", "id": "m1"}],
            "glyphs": [
                {"name": "dot", "layers": [{"width": 200, "id": "m1", "_master": "m1",
                    "shapes": [{"nodes": [[0, 0, "l"], [100, 0, "l"], [100, 100, "l"]]}]}]},
                {"name": "i", "layers": [
                    {"width": 250, "id": "m1", "_master": "m1", "background": "bg",
                     "shapes": [{"ref": "dotlessi"}, {"ref": "dot"}]},
                    {"width": 250, "id": "bg", "isBackground": true,
                     "shapes": [{"ref": "dot"}]}
                ]},
                {"name": "dotlessi", "layers": [{"width": 250, "id": "m1", "_master": "m1",
                    "shapes": [{"nodes": [[0, 0, "l"], [50, 0, "l"], [50, 500, "l"]]}]}]},
                {"name": "idieresis", "layers": [{"width": 250, "id": "m1", "_master": "m1",
                    "shapes": [{"ref": "i"}, {"ref": "dot"}]}]},
                {"name": "ouro", "layers": [{"width": 250, "id": "m1", "_master": "m1",
                    "shapes": [{"ref": "boros"}]}]},
                {"name": "boros", "layers": [{"width": 250, "id": "m1", "_master": "m1",
                    "shapes": [{"ref": "ouro"}]}]}
            ]
        }))
        .unwrap()
    }

    fn master_layer(font: &Font, glyph: &str) -> Rc<Layer> {
        font.glyphs().get(glyph).unwrap().layer("m1").unwrap()
    }

    #[test]
    fn recursive_components_follow_nesting() {
        let font = composite_font();
        let set = master_layer(&font, "idieresis")
            .recursive_component_set()
            .unwrap();
        let mut names: Vec<_> = set.into_iter().collect();
        names.sort();
        assert_eq!(names, vec!["dot", "dotlessi", "i"]);
        assert!(master_layer(&font, "dot")
            .recursive_component_set()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn nested_component_dict_maps_each_glyph_once() {
        let font = composite_font();
        let nested = master_layer(&font, "idieresis")
            .nested_component_dict()
            .unwrap();
        let mut names: Vec<_> = nested.keys().cloned().collect();
        names.sort();
        assert_eq!(names, vec!["dot", "dotlessi", "i"]);
        assert_eq!(nested["dotlessi"].width(), 250);
        assert_eq!(nested["dot"].width(), 200);
    }

    #[test]
    fn component_cycles_are_caught() {
        let font = composite_font();
        let ouro = master_layer(&font, "ouro");
        assert!(matches!(
            ouro.recursive_component_set(),
            Err(ContextError::General(_))
        ));
        assert!(matches!(ouro.bounds(), Err(ContextError::General(_))));
        let nested = ouro.nested_component_dict().unwrap();
        assert_eq!(nested.keys().collect::<Vec<_>>(), vec!["boros", "ouro"]);
    }

    #[test]
    fn background_layers_resolve_through_their_owner() {
        let font = composite_font();
        let background = font.glyphs().get("i").unwrap().layer("bg").unwrap();
        assert_eq!(
            background.background_of().unwrap().id().as_deref(),
            Some("m1")
        );
        let nested = background.nested_component_dict().unwrap();
        assert_eq!(nested["dot"].width(), 200);
    }

    #[test]
    fn missing_component_glyph_is_reported() {
        let font = composite_font();
        let layer = master_layer(&font, "dot");
        layer.shapes().push(Shape::component("ring", None).unwrap());
        assert!(matches!(
            layer.nested_component_dict(),
            Err(ContextError::GlyphNotFound { glyph }) if glyph == "ring"
        ));
        assert!(matches!(
            layer.recursive_component_set(),
            Err(ContextError::GlyphNotFound { .. })
        ));
    }

    #[test]
    fn only_attached_layers_are_valid() {
        let font = composite_font();
        assert!(master_layer(&font, "dot").valid());
        assert!(!Layer::new(500, Some("m1")).unwrap().valid());
    }

    #[test]
    fn deep_edit_marks_every_level_once() {
        let layer = layer();
        layer.enable_tracking();
        layer.mark_clean(FILE_SAVING, true);
        let shape = layer.shapes().first().unwrap();
        let node = shape.nodes().first().unwrap();
        node.set_x(node.x() + 50).unwrap();
        assert!(node.is_dirty(FILE_SAVING));
        assert!(shape.is_dirty(FILE_SAVING));
        assert!(layer.is_dirty(FILE_SAVING));
        assert!(layer.is_dirty(CANVAS_RENDER));
        layer.mark_clean(FILE_SAVING, true);
        assert!(!node.is_dirty(FILE_SAVING));
        assert!(!shape.is_dirty(FILE_SAVING));
        assert!(node.is_dirty(CANVAS_RENDER));
    }
}
