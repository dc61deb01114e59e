use std::any::Any;
use std::rc::Rc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    common::number,
    dirty::DirtyContext,
    i18ndictionary::I18NDictionary,
    schema::Kind,
    tracking::{Facade, ObjectCore, Tracked},
    ContextError,
};

/// A variation axis.
pub struct Axis {
    core: ObjectCore,
}

facade!(Axis, Kind::Axis);

/// Maps `value` through the breakpoints of `mapping`, extrapolating with a
/// slope of one beyond either end.
fn piecewise_linear_map(value: f64, mapping: &[(f64, f64)]) -> f64 {
    let mut points = mapping.to_vec();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return value;
    };
    if let Some((_, to)) = points.iter().find(|(from, _)| *from == value) {
        return *to;
    }
    if value < first.0 {
        return value + first.1 - first.0;
    }
    if value > last.0 {
        return value + last.1 - last.0;
    }
    for pair in points.windows(2) {
        let ((a, va), (b, vb)) = (pair[0], pair[1]);
        if a < value && value < b {
            return va + (vb - va) * (value - a) / (b - a);
        }
    }
    value
}

impl Axis {
    fn build(core: ObjectCore) -> Self {
        Axis { core }
    }

    /// A new axis with a fresh id
    pub fn new(name: impl Into<I18NDictionary>, tag: &str) -> Result<Rc<Axis>, ContextError> {
        let name: I18NDictionary = name.into();
        Axis::from_document(&json!({
            "name": name.to_json(),
            "tag": tag,
            "id": Uuid::new_v4().to_string(),
        }))
    }

    defaulted_fields! {
        name: I18NDictionary = "name";
        hidden: bool = "hidden";
    }

    optional_fields! {
        /// The four-character OpenType axis tag
        tag: String = "tag";
        id: String = "id";
        /// Minimum, in userspace
        min: f64 = "min";
        /// Maximum, in userspace
        max: f64 = "max";
        /// Default, in userspace
        default: f64 = "default";
    }

    /// The axis map as (userspace, designspace) pairs, if any.
    pub fn map(&self) -> Option<Vec<(f64, f64)>> {
        let map = self.get("map")?;
        let pairs = map
            .as_array()?
            .iter()
            .filter_map(|pair| Some((pair.get(0)?.as_f64()?, pair.get(1)?.as_f64()?)))
            .collect::<Vec<_>>();
        (!pairs.is_empty()).then_some(pairs)
    }

    /// Sets or clears the user to design space mapping
    pub fn set_map(&self, map: Option<Vec<(f64, f64)>>) -> Result<(), ContextError> {
        let value = match map {
            Some(pairs) if !pairs.is_empty() => Value::Array(
                pairs
                    .into_iter()
                    .map(|(u, d)| Value::Array(vec![number(u), number(d)]))
                    .collect(),
            ),
            _ => Value::Null,
        };
        self.set("map", value)
    }

    /// The axis map as (designspace, userspace) pairs.
    pub fn inverted_map(&self) -> Option<Vec<(f64, f64)>> {
        self.map()
            .map(|map| map.into_iter().map(|(u, d)| (d, u)).collect())
    }

    /// Maps a userspace coordinate to designspace.
    pub fn map_forward(&self, value: f64) -> f64 {
        match self.map() {
            Some(map) => piecewise_linear_map(value, &map),
            None => value,
        }
    }

    /// Maps a designspace coordinate to userspace.
    pub fn map_backward(&self, value: f64) -> f64 {
        match self.inverted_map() {
            Some(map) => piecewise_linear_map(value, &map),
            None => value,
        }
    }

    /// The display name, falling back to a placeholder.
    pub fn display_name(&self) -> String {
        self.name()
            .get_default()
            .cloned()
            .unwrap_or_else(|| "Unnamed axis".to_string())
    }

    /// (min, default, max) in userspace.
    pub fn bounds(&self) -> Result<(f64, f64, f64), ContextError> {
        match (self.min(), self.default(), self.max()) {
            (Some(min), Some(default), Some(max)) => {
                if min <= default && default <= max {
                    Ok((min, default, max))
                } else {
                    Err(ContextError::IllDefinedAxis {
                        axis_name: self.display_name(),
                        reason: "Default value outside of min and max".to_string(),
                    })
                }
            }
            _ => Err(ContextError::IllDefinedAxis {
                axis_name: self.display_name(),
                reason: "Missing min, default, or max".to_string(),
            }),
        }
    }
}

impl Tracked for Axis {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, _context: DirtyContext) {}

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
