use std::any::Any;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    common::{number, FieldValue, Location},
    dirty::DirtyContext,
    font::Font,
    guide::Guide,
    i18ndictionary::I18NDictionary,
    layer::Layer,
    schema::Kind,
    tracking::{ancestor, ChildList, Facade, ObjectCore, Tracked, TrackedSequence},
    ContextError,
};

/// Master-specific metrics: anything which can vary across the designspace.
pub const CORE_METRICS: &[&str] = &[
    "xHeight",
    "capHeight",
    "ascender",
    "descender",
    "italicAngle",
    "hheaAscender",
    "hheaDescender",
    "hheaLineGap",
    "winAscent",
    "winDescent",
    "typoAscender",
    "typoDescender",
    "typoLineGap",
    "subscriptXSize",
    "subscriptYSize",
    "subscriptXOffset",
    "subscriptYOffset",
    "superscriptXSize",
    "superscriptYSize",
    "superscriptXOffset",
    "superscriptYOffset",
    "strikeoutSize",
    "strikeoutPosition",
    "underlinePosition",
    "underlineThickness",
    "hheaCaretSlopeRise",
    "hheaCaretSlopeRun",
    "hheaCaretOffset",
];

/// Kerning pair keys are stored as `"left//right"`.
const KERN_SEPARATOR: &str = "//";

/// Pair kerning, keyed by (left, right) glyph or group name.
pub type Kerning = IndexMap<(String, String), f64>;

fn kern_key(left: &str, right: &str) -> String {
    format!("{}{}{}", left, KERN_SEPARATOR, right)
}

/// A font master.
pub struct Master {
    core: ObjectCore,
    guides: ChildList<Guide>,
}

facade!(Master, Kind::Master);

impl Master {
    fn build(core: ObjectCore) -> Self {
        Master {
            core,
            guides: ChildList::new("guides"),
        }
    }

    /// A new master. A fresh id is generated when `id` is `None`.
    pub fn new(
        name: impl Into<I18NDictionary>,
        id: Option<&str>,
        location: Location,
    ) -> Result<Rc<Master>, ContextError> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let name: I18NDictionary = name.into();
        let mut map = Map::new();
        map.insert("name".to_string(), name.to_json());
        map.insert("id".to_string(), Value::from(id));
        if !location.is_empty() {
            map.insert("location".to_string(), location.to_json());
        }
        Master::from_document(&Value::Object(map))
    }

    defaulted_fields! {
        name: I18NDictionary = "name";
        id: String = "id";
        location: Location = "location";
        sparse: bool = "sparse";
    }

    /// The master's guidelines
    pub fn guides(&self) -> TrackedSequence<Guide> {
        self.guides.get(&self.core)
    }

    /// The font holding this master
    pub fn font(&self) -> Option<Rc<Font>> {
        ancestor(self)
    }

    /// Every metric the master sets
    pub fn metrics(&self) -> IndexMap<String, f64> {
        self.get("metrics")
            .and_then(|v| {
                v.as_object().map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    /// One metric
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.get("metrics")?.get(name)?.as_f64()
    }

    /// Sets or, with `None`, removes a metric
    pub fn set_metric(&self, name: &str, value: Option<f64>) -> Result<(), ContextError> {
        let mut metrics = match self.get("metrics") {
            Some(Value::Object(m)) => m,
            _ => Map::new(),
        };
        match value {
            Some(value) => {
                metrics.insert(name.to_string(), number(value));
            }
            None => {
                metrics.shift_remove(name);
            }
        }
        self.set("metrics", Value::Object(metrics))
    }

    /// The x-height
    pub fn x_height(&self) -> f64 {
        self.metric("xHeight").unwrap_or(0.0)
    }

    /// The cap height
    pub fn cap_height(&self) -> f64 {
        self.metric("capHeight").unwrap_or(0.0)
    }

    /// The ascender
    pub fn ascender(&self) -> f64 {
        self.metric("ascender").unwrap_or(0.0)
    }

    /// The descender
    pub fn descender(&self) -> f64 {
        self.metric("descender").unwrap_or(0.0)
    }

    /// Pair kerning, keyed by left and right
    pub fn kerning(&self) -> Kerning {
        let Some(Value::Object(map)) = self.get("kerning") else {
            return Kerning::new();
        };
        map.iter()
            .filter_map(|(key, value)| {
                let (left, right) = key.split_once(KERN_SEPARATOR)?;
                Some(((left.to_string(), right.to_string()), value.as_f64()?))
            })
            .collect()
    }

    /// Replaces all kerning
    pub fn set_kerning(&self, kerning: &Kerning) -> Result<(), ContextError> {
        let map: Map<String, Value> = kerning
            .iter()
            .map(|((l, r), v)| (kern_key(l, r), number(*v)))
            .collect();
        self.set("kerning", Value::Object(map))
    }

    /// The kerning for one pair
    pub fn kern(&self, left: &str, right: &str) -> Option<f64> {
        self.get("kerning")?.get(kern_key(left, right))?.as_f64()
    }

    /// Sets or, with `None`, removes a kerning pair.
    pub fn set_kern(
        &self,
        left: &str,
        right: &str,
        value: Option<f64>,
    ) -> Result<(), ContextError> {
        let mut map = match self.get("kerning") {
            Some(Value::Object(m)) => m,
            _ => Map::new(),
        };
        let key = kern_key(left, right);
        match value {
            Some(value) => {
                map.insert(key, number(value));
            }
            None => {
                map.shift_remove(&key);
            }
        }
        self.set("kerning", Value::Object(map))
    }

    /// The layer of the named glyph drawn for this master.
    pub fn glyph_layer(&self, glyph: &str) -> Option<Rc<Layer>> {
        self.font()?.glyphs().get(glyph)?.layer_for_master(&self.id())
    }

    /// Does this master belong to a font and sit at a location on each of
    /// the font's axes, in order?
    pub fn valid(&self) -> bool {
        let Some(font) = self.font() else {
            return false;
        };
        let location = self.location();
        let tags: Vec<String> = font.axes().iter().filter_map(|a| a.tag()).collect();
        location.is_empty() || location.keys().eq(tags.iter())
    }
}

impl Tracked for Master {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, context: DirtyContext) {
        self.guides.clean(&self.core, context);
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
