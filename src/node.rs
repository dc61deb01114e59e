use std::any::Any;
use std::rc::Rc;

use serde_json::Value;

use crate::{
    dirty::DirtyContext,
    schema::{Kind, USER_DATA},
    tracking::{Facade, ObjectCore, Tracked},
    ContextError,
};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// The role of a node in its path
pub enum NodeType {
    /// A control point
    OffCurve,
    /// The end of a cubic curve
    Curve,
    /// The end of a straight line
    Line,
    /// The end of a quadratic curve
    QCurve,
}

impl NodeType {
    /// Parses a node type code, ignoring any smooth suffix.
    pub fn from_code(code: &str) -> Option<NodeType> {
        match code.trim_end_matches('s') {
            "o" => Some(NodeType::OffCurve),
            "c" => Some(NodeType::Curve),
            "l" => Some(NodeType::Line),
            "q" => Some(NodeType::QCurve),
            _ => None,
        }
    }

    /// The code stored on disk
    pub fn code(&self, smooth: bool) -> &'static str {
        match (self, smooth) {
            (NodeType::OffCurve, false) => "o",
            (NodeType::OffCurve, true) => "os",
            (NodeType::Curve, false) => "c",
            (NodeType::Curve, true) => "cs",
            (NodeType::Line, false) => "l",
            (NodeType::Line, true) => "ls",
            (NodeType::QCurve, false) => "q",
            (NodeType::QCurve, true) => "qs",
        }
    }
}

/// A point of a path outline.
pub struct Node {
    core: ObjectCore,
}

facade!(Node, Kind::Node);

impl Node {
    fn build(core: ObjectCore) -> Self {
        Node { core }
    }

    /// A new node, from a type code
    pub fn new(x: i64, y: i64, node_type: &str) -> Result<Rc<Node>, ContextError> {
        Node::from_document(&Value::from(vec![
            Value::from(x),
            Value::from(y),
            Value::from(node_type),
        ]))
    }

    defaulted_fields! {
        x: i64 = "x";
        y: i64 = "y";
    }

    /// The raw type code, e.g. `"cs"`.
    pub fn type_code(&self) -> String {
        self.get("type")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Sets the type from a code, smoothness included
    pub fn set_type_code(&self, code: &str) -> Result<(), ContextError> {
        self.set("type", Value::from(code))
    }

    /// The node type
    pub fn node_type(&self) -> Option<NodeType> {
        NodeType::from_code(&self.type_code())
    }

    /// Is the node smooth?
    pub fn is_smooth(&self) -> bool {
        self.type_code().ends_with('s')
    }

    /// The segment type a pen would draw to this node, `None` for off-curve
    /// points.
    pub fn pen_type(&self) -> Option<&'static str> {
        match self.node_type()? {
            NodeType::OffCurve => None,
            NodeType::Curve => Some("curve"),
            NodeType::Line => Some("line"),
            NodeType::QCurve => Some("qcurve"),
        }
    }

    /// Extra data carried as the fourth element of the compact encoding.
    pub fn extra(&self) -> Option<Value> {
        self.core.record().borrow().json(USER_DATA).cloned()
    }

    /// Sets or clears the extra user data
    pub fn set_extra(&self, extra: Option<Value>) -> Result<(), ContextError> {
        self.set(USER_DATA, extra.unwrap_or(Value::Null))
    }

    /// The node as a kurbo point
    pub fn to_kurbo(&self) -> kurbo::Point {
        kurbo::Point::new(self.x() as f64, self.y() as f64)
    }
}

impl Tracked for Node {
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
    use crate::dirty::{CANVAS_RENDER, FILE_SAVING};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("o", None, false)]
    #[case("os", None, true)]
    #[case("c", Some("curve"), false)]
    #[case("cs", Some("curve"), true)]
    #[case("l", Some("line"), false)]
    #[case("ls", Some("line"), true)]
    #[case("q", Some("qcurve"), false)]
    #[case("qs", Some("qcurve"), true)]
    fn pen_types(#[case] code: &str, #[case] pen: Option<&str>, #[case] smooth: bool) {
        let node = Node::new(0, 0, code).unwrap();
        assert_eq!(node.pen_type(), pen);
        assert_eq!(node.is_smooth(), smooth);
        let typ = node.node_type().unwrap();
        assert_eq!(typ.code(smooth), code);
    }

    #[test]
    fn bad_type_is_rejected() {
        assert!(Node::new(0, 0, "x").is_err());
        let node = Node::new(0, 0, "l").unwrap();
        assert!(node.set_type_code("").is_err());
        assert_eq!(node.type_code(), "l");
    }

    #[test]
    fn setters_only_track_when_enabled() {
        let node = Node::new(10, 20, "c").unwrap();
        node.set_x(50).unwrap();
        assert!(!node.is_dirty(FILE_SAVING));
        node.enable_tracking();
        node.set_x(50).unwrap();
        assert!(!node.is_dirty(FILE_SAVING));
        node.set_x(60).unwrap();
        assert!(node.is_dirty(FILE_SAVING));
        assert!(node.is_dirty(CANVAS_RENDER));
        assert_eq!(
            node.dirty_fields(FILE_SAVING).into_iter().collect::<Vec<_>>(),
            vec!["x"]
        );
    }

    #[test]
    fn extra_data() {
        let node = Node::from_document(&json!([1, 2, "l", {"hint": true}])).unwrap();
        assert_eq!(node.extra(), Some(json!({"hint": true})));
        node.set_extra(None).unwrap();
        assert_eq!(node.to_document(), json!({"x": 1, "y": 2, "type": "l"}));
    }
}
