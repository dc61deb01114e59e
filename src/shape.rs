use std::any::Any;
use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::{
    common::{number, FieldValue},
    dirty::DirtyContext,
    layer::Layer,
    node::{Node, NodeType},
    schema::Kind,
    tracking::{ancestor, ChildList, Facade, ObjectCore, Tracked, TrackedSequence},
    ContextError,
};

/// A shape in a glyph layer, either a path or a component
pub struct Shape {
    core: ObjectCore,
    nodes: ChildList<Node>,
}

facade!(Shape, Kind::Shape);

impl Shape {
    fn build(core: ObjectCore) -> Self {
        Shape {
            core,
            nodes: ChildList::new("nodes"),
        }
    }

    /// A path through the given nodes.
    pub fn path(nodes: Vec<Rc<Node>>, closed: bool) -> Result<Rc<Shape>, ContextError> {
        let mut map = Map::new();
        if !closed {
            map.insert("closed".to_string(), Value::Bool(false));
        }
        let shape = Shape::from_document(&Value::Object(map))?;
        shape.nodes().replace_all(nodes);
        Ok(shape)
    }

    /// A reference to another glyph, optionally transformed.
    pub fn component(
        reference: &str,
        transform: Option<[f64; 6]>,
    ) -> Result<Rc<Shape>, ContextError> {
        let mut map = Map::new();
        map.insert("ref".to_string(), Value::from(reference));
        if let Some(transform) = transform {
            map.insert("transform".to_string(), transform.to_vec().to_json());
        }
        Shape::from_document(&Value::Object(map))
    }

    optional_fields! {
        /// The name of the glyph a component refers to
        reference: String = "ref";
        /// Affine transform `[xx, xy, yx, yy, dx, dy]`
        transform: Vec<f64> = "transform";
    }

    defaulted_fields! {
        closed: bool = "closed";
        direction: i64 = "direction";
    }

    /// The path's nodes
    pub fn nodes(&self) -> TrackedSequence<Node> {
        self.nodes.get(&self.core)
    }

    /// Is this a component?
    pub fn is_component(&self) -> bool {
        self.reference().is_some_and(|r| !r.is_empty())
    }

    /// Is this a path?
    pub fn is_path(&self) -> bool {
        !self.is_component()
    }

    /// The layer holding this shape
    pub fn layer(&self) -> Option<Rc<Layer>> {
        ancestor(self)
    }

    /// The translation part of a component's transform.
    pub fn position(&self) -> (f64, f64) {
        match self.transform() {
            Some(t) if t.len() == 6 => (t[4], t[5]),
            _ => (0.0, 0.0),
        }
    }

    /// The rotation of a component's transform, in degrees.
    pub fn angle(&self) -> f64 {
        match self.transform() {
            Some(t) if t.len() == 6 => t[1].atan2(t[0]).to_degrees(),
            _ => 0.0,
        }
    }

    /// The x and y scale of the transform
    pub fn scale(&self) -> (f64, f64) {
        match self.transform() {
            Some(t) if t.len() == 6 => (t[0].hypot(t[2]), t[1].hypot(t[3])),
            _ => (1.0, 1.0),
        }
    }

    /// Moves a component, keeping the rest of its transform
    pub fn set_position(&self, x: f64, y: f64) -> Result<(), ContextError> {
        let mut transform = self
            .transform()
            .filter(|t| t.len() == 6)
            .unwrap_or_else(|| vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        transform[4] = x;
        transform[5] = y;
        self.set(
            "transform",
            Value::Array(transform.into_iter().map(number).collect()),
        )
    }

    /// The transform as a kurbo affine
    pub fn to_affine(&self) -> kurbo::Affine {
        match self.transform() {
            Some(t) if t.len() == 6 => kurbo::Affine::new([t[0], t[1], t[2], t[3], t[4], t[5]]),
            _ => kurbo::Affine::IDENTITY,
        }
    }

    /// The layer a component draws, in the same master as this shape's
    /// layer. `None` for paths or when the glyph or layer is absent.
    pub fn component_layer(&self) -> Option<Rc<Layer>> {
        if !self.is_component() {
            return None;
        }
        let reference = self.reference()?;
        self.layer()?.master()?.glyph_layer(&reference)
    }

    /// Converts a path to a kurbo `BezPath`.
    pub fn to_kurbo(&self) -> Result<kurbo::BezPath, ContextError> {
        let nodes = self
            .nodes()
            .iter()
            .map(|n| {
                n.node_type()
                    .map(|t| (n.to_kurbo(), t))
                    .ok_or_else(|| ContextError::BadNode(n.type_code()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let closed = self.closed();
        let mut path = kurbo::BezPath::new();
        let mut offs = VecDeque::new();
        let rotate = if closed {
            nodes
                .iter()
                .rev()
                .position(|(_, t)| *t != NodeType::OffCurve)
                .map(|idx| nodes.len() - 1 - idx)
                .unwrap_or(0)
        } else {
            0
        };
        let mut iter = nodes.iter().cycle().skip(rotate).take(nodes.len());
        // kurbo paths, even closed ones, must start with a move_to
        if let Some((start, _)) = iter.next() {
            path.move_to(*start);
        }
        for (point, nodetype) in iter {
            match nodetype {
                NodeType::Line => path.line_to(*point),
                NodeType::OffCurve => offs.push_back(*point),
                NodeType::Curve => {
                    match offs.make_contiguous() {
                        [] => return Err(ContextError::BadPath),
                        [p1] => path.quad_to(*p1, *point),
                        [p1, p2] => path.curve_to(*p1, *p2, *point),
                        _ => return Err(ContextError::BadPath),
                    };
                    offs.clear();
                }
                NodeType::QCurve => {
                    while let Some(pt) = offs.pop_front() {
                        if let Some(next) = offs.front() {
                            let implied_point = pt.midpoint(*next);
                            path.quad_to(pt, implied_point);
                        } else {
                            path.quad_to(pt, *point);
                        }
                    }
                }
            }
        }
        if closed {
            path.close_path()
        }
        Ok(path)
    }
}

impl Tracked for Shape {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, context: DirtyContext) {
        self.nodes.clean(&self.core, context);
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
