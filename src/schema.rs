//! Per-kind field tables.
//!
//! Each object kind has an ordered table of the fields it persists. The table
//! drives construction-time normalization and validation, setter validation,
//! and the generic serializer: field order on disk is table order, and the
//! on-disk name, skip rule and partition of every field come from here.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::ContextError;

/// The on-disk date format of a font.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The key under which every object stores its free-form user data.
pub const USER_DATA: &str = "_";

/// Node type codes: off-curve, curve, line and quadratic, each with a smooth variant
pub const NODE_TYPES: &[&str] = &["o", "os", "c", "cs", "l", "ls", "q", "qs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The kinds of font object
pub enum Kind {
    /// A font
    Font,
    /// A variation axis
    Axis,
    /// A named instance
    Instance,
    /// A master
    Master,
    /// A glyph
    Glyph,
    /// A layer of a glyph
    Layer,
    /// A path or component
    Shape,
    /// A point on a path
    Node,
    /// An anchor
    Anchor,
    /// A guideline
    Guide,
    /// The name table
    Names,
    /// The feature code
    Features,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a field's value is stored
pub enum FieldType {
    /// An integer
    Int,
    /// Any number
    Number,
    /// A string
    Str,
    /// A boolean
    Bool,
    /// A localized string: locale code to string, `dflt` being the default locale
    I18N,
    /// `{x, y, angle}`, written as `[x, y, angle]`
    Position,
    /// `{r, g, b, a}`, written as `[r, g, b, a]`
    Color,
    /// A date in the font's date format
    Date,
    /// A list of integers
    IntList,
    /// Pair kerning keyed by `"left//right"`
    Kerning,
    /// Free-form JSON
    Json,
    /// A list of child objects
    Children(Kind),
    /// A single child object
    Child(Kind),
}

/// The file within a package that holds a field, when it is not the file of
/// its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// `info.json`
    Info,
    /// `names.json`
    Names,
    /// `features.fea`
    Features,
    /// `glyphs.json`
    GlyphList,
    /// A glyph's own layer file
    GlyphFile,
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// The value a field reads as when absent
pub enum FieldDefault {
    /// No default
    None,
    /// An integer
    Int(i64),
    /// A boolean
    Bool(bool),
    /// A string
    Str(&'static str),
    /// A `[major, minor]` pair
    IntPair(i64, i64),
    /// Filled with a fresh identifier when an object is created in memory
    FreshId,
    /// Filled with the current time when a font is created in memory
    Now,
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// The values a field may hold
pub enum Allowed {
    /// Anything of the right type
    Any,
    /// One of these strings
    Strs(&'static [&'static str]),
    /// One of these integers
    Ints(&'static [i64]),
}

#[derive(Debug, Clone, Copy)]
/// One field of a kind's table
pub struct FieldSpec {
    /// The name used in memory
    pub name: &'static str,
    /// The name used on disk, when different
    pub alias: Option<&'static str>,
    /// How the value is stored
    pub ty: FieldType,
    /// The absent value
    pub default: FieldDefault,
    /// Null and empty values are refused
    pub required: bool,
    /// Written even when falsy
    pub keep_falsy: bool,
    /// Permitted values
    pub allowed: Allowed,
    /// Each item of a list or map gets its own line
    pub separate_items: bool,
    /// The file holding the field, when not its owner's
    pub own_file: Option<Partition>,
}

impl FieldSpec {
    const fn new(name: &'static str, ty: FieldType) -> Self {
        FieldSpec {
            name,
            alias: None,
            ty,
            default: FieldDefault::None,
            required: false,
            keep_falsy: false,
            allowed: Allowed::Any,
            separate_items: false,
            own_file: None,
        }
    }
    const fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }
    const fn default(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }
    const fn required(mut self) -> Self {
        self.required = true;
        self
    }
    const fn keep_falsy(mut self) -> Self {
        self.keep_falsy = true;
        self
    }
    const fn allowed(mut self, allowed: Allowed) -> Self {
        self.allowed = allowed;
        self
    }
    const fn separate(mut self) -> Self {
        self.separate_items = true;
        self
    }
    const fn own_file(mut self, partition: Partition) -> Self {
        self.own_file = Some(partition);
        self
    }

    /// The key this field is written under.
    pub fn disk_name(&self) -> &'static str {
        self.alias.unwrap_or(self.name)
    }

    /// The default as a JSON value, for defaults which are plain values.
    pub fn default_value(&self) -> Option<Value> {
        match self.default {
            FieldDefault::Int(i) => Some(Value::from(i)),
            FieldDefault::Bool(b) => Some(Value::Bool(b)),
            FieldDefault::Str(s) => Some(Value::from(s)),
            FieldDefault::IntPair(a, b) => Some(Value::from(vec![a, b])),
            FieldDefault::None | FieldDefault::FreshId | FieldDefault::Now => None,
        }
    }

    /// Should this value be left out when writing?
    ///
    /// Falsy values are skipped unless the field keeps them, and so is a
    /// value equal to a non-falsy default.
    pub fn skips_json(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        if is_falsy(value) && !self.keep_falsy {
            return true;
        }
        match self.default_value() {
            Some(default) if !is_falsy(&default) => json_eq(&default, value),
            _ => false,
        }
    }

    /// Brings accepted alternative spellings into the stored form.
    pub fn normalize(&self, value: Value) -> Value {
        match (self.ty, value) {
            (FieldType::I18N, Value::String(s)) => {
                let mut map = Map::new();
                if !s.is_empty() {
                    map.insert("dflt".to_string(), Value::String(s));
                }
                Value::Object(map)
            }
            (FieldType::Position, Value::Array(items)) if items.len() >= 2 => {
                let mut map = Map::new();
                map.insert("x".to_string(), items[0].clone());
                map.insert("y".to_string(), items[1].clone());
                map.insert(
                    "angle".to_string(),
                    items.get(2).cloned().unwrap_or(Value::from(0)),
                );
                Value::Object(map)
            }
            (FieldType::Position, Value::Object(mut map)) => {
                if !map.contains_key("angle") {
                    map.insert("angle".to_string(), Value::from(0));
                }
                Value::Object(map)
            }
            (FieldType::Color, Value::Array(items)) if items.len() >= 3 => {
                let mut map = Map::new();
                for (ix, channel) in ["r", "g", "b", "a"].iter().enumerate() {
                    map.insert(
                        channel.to_string(),
                        items.get(ix).cloned().unwrap_or(Value::from(0)),
                    );
                }
                Value::Object(map)
            }
            (_, value) => value,
        }
    }

    /// Checks a normalized value against this field's rules.
    pub fn validate(&self, value: &Value) -> Result<(), ContextError> {
        let field = self.name.to_string();
        if value.is_null() {
            if self.required {
                return Err(ContextError::RequiredNone { field });
            }
            return Ok(());
        }
        let expected = match self.ty {
            FieldType::Int if !is_int(value) => Some("int"),
            FieldType::Number if !value.is_number() => Some("number"),
            FieldType::Str if !value.is_string() => Some("str"),
            FieldType::Bool if !value.is_boolean() => Some("bool"),
            FieldType::I18N if !is_i18n(value) => Some("str or dict of str"),
            FieldType::Date if !value.is_string() => Some("str"),
            FieldType::IntList
                if !value
                    .as_array()
                    .is_some_and(|items| items.iter().all(is_int)) =>
            {
                Some("list of int")
            }
            FieldType::Kerning
                if !value
                    .as_object()
                    .is_some_and(|map| map.values().all(Value::is_number)) =>
            {
                Some("dict of kerning values")
            }
            FieldType::Position => {
                check_components("Position", &["x", "y"], value)?;
                None
            }
            FieldType::Color => {
                check_components("Color", &["r", "g", "b", "a"], value)?;
                None
            }
            FieldType::Children(_) | FieldType::Child(_) => {
                return Err(ContextError::General(format!(
                    "{} must be set through its typed accessor",
                    self.name
                )))
            }
            _ => None,
        };
        if let Some(expected) = expected {
            return Err(ContextError::WrongType { field, expected });
        }
        if self.required
            && (value.as_str() == Some("") || value.as_array().is_some_and(Vec::is_empty))
        {
            return Err(ContextError::RequiredEmpty { field });
        }
        if self.ty == FieldType::Date {
            if let Some(date) = value.as_str() {
                NaiveDateTime::parse_from_str(date, DATE_FORMAT).map_err(|e| {
                    ContextError::BadDate {
                        date: date.to_string(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }
        match self.allowed {
            Allowed::Strs(allowed) if !value.as_str().is_some_and(|s| allowed.contains(&s)) => {
                Err(ContextError::NotAllowed {
                    field,
                    allowed: format!("{:?}", allowed),
                })
            }
            Allowed::Ints(allowed)
                if !value.as_i64().is_some_and(|i| allowed.contains(&i)) =>
            {
                Err(ContextError::NotAllowed {
                    field,
                    allowed: format!("{:?}", allowed),
                })
            }
            _ => Ok(()),
        }
    }
}

fn check_components(what: &str, keys: &[&str], value: &Value) -> Result<(), ContextError> {
    let map = value.as_object().ok_or_else(|| ContextError::WrongType {
        field: what.to_string(),
        expected: "a list or dict",
    })?;
    for key in keys {
        if !map.get(*key).is_some_and(is_int) {
            return Err(ContextError::WrongType {
                field: format!("{} {}", what, key),
                expected: "int",
            });
        }
    }
    Ok(())
}

fn is_int(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

fn is_i18n(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.values().all(Value::is_string))
}

/// Null, false, zero and empty values are falsy and get skipped on write.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Numeric-aware equality, so that `1000` and `1000.0` compare equal.
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

use FieldType::*;

const FONT_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("upm", Int).default(FieldDefault::Int(1000)),
    FieldSpec::new("version", Json).default(FieldDefault::IntPair(1, 0)),
    FieldSpec::new("axes", Children(Kind::Axis)).separate(),
    FieldSpec::new("instances", Children(Kind::Instance)).separate(),
    FieldSpec::new("masters", Children(Kind::Master)).separate(),
    FieldSpec::new("glyphs", Children(Kind::Glyph))
        .separate()
        .own_file(Partition::GlyphList),
    FieldSpec::new("note", Str),
    FieldSpec::new("date", Date).default(FieldDefault::Now),
    FieldSpec::new("names", Child(Kind::Names)).own_file(Partition::Names),
    FieldSpec::new("customOpenTypeValues", Json),
    FieldSpec::new("features", Child(Kind::Features)).own_file(Partition::Features),
    FieldSpec::new("first_kern_groups", Json),
    FieldSpec::new("second_kern_groups", Json),
];

const AXIS_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", I18N),
    FieldSpec::new("tag", Str),
    FieldSpec::new("id", Str).default(FieldDefault::FreshId),
    FieldSpec::new("min", Number),
    FieldSpec::new("max", Number),
    FieldSpec::new("default", Number),
    FieldSpec::new("map", Json),
    FieldSpec::new("hidden", Bool),
];

const INSTANCE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", I18N),
    FieldSpec::new("location", Json),
    FieldSpec::new("variable", Bool),
    FieldSpec::new("customNames", Child(Kind::Names)),
];

const MASTER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", I18N),
    FieldSpec::new("id", Str).default(FieldDefault::FreshId),
    FieldSpec::new("location", Json),
    FieldSpec::new("sparse", Bool),
    FieldSpec::new("guides", Children(Kind::Guide)).separate(),
    FieldSpec::new("metrics", Json),
    FieldSpec::new("kerning", Kerning).separate(),
];

const GLYPH_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", Str).required(),
    FieldSpec::new("production_name", Str),
    FieldSpec::new("category", Str).default(FieldDefault::Str("base")),
    FieldSpec::new("codepoints", IntList),
    FieldSpec::new("layers", Children(Kind::Layer))
        .separate()
        .own_file(Partition::GlyphFile),
    FieldSpec::new("exported", Bool)
        .default(FieldDefault::Bool(true))
        .keep_falsy(),
    FieldSpec::new("direction", Str).default(FieldDefault::Str("LTR")),
];

const LAYER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("width", Int),
    FieldSpec::new("height", Int),
    FieldSpec::new("vertWidth", Int),
    FieldSpec::new("name", Str),
    FieldSpec::new("_master", Str),
    FieldSpec::new("id", Str).default(FieldDefault::FreshId),
    FieldSpec::new("guides", Children(Kind::Guide)).separate(),
    FieldSpec::new("shapes", Children(Kind::Shape)).separate(),
    FieldSpec::new("anchors", Children(Kind::Anchor)).separate(),
    FieldSpec::new("color", Color),
    FieldSpec::new("layerIndex", Int),
    FieldSpec::new("background", Str),
    FieldSpec::new("isBackground", Bool),
    FieldSpec::new("location", Json),
];

const SHAPE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("ref", Str),
    FieldSpec::new("transform", Json),
    FieldSpec::new("nodes", Children(Kind::Node)),
    FieldSpec::new("closed", Bool)
        .default(FieldDefault::Bool(true))
        .keep_falsy(),
    FieldSpec::new("direction", Int)
        .default(FieldDefault::Int(1))
        .allowed(Allowed::Ints(&[-1, 1])),
];

const NODE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("x", Int).required().keep_falsy(),
    FieldSpec::new("y", Int).required().keep_falsy(),
    FieldSpec::new("type", Str)
        .required()
        .allowed(Allowed::Strs(NODE_TYPES)),
];

const ANCHOR_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", Str),
    FieldSpec::new("x", Int),
    FieldSpec::new("y", Int),
];

const GUIDE_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("position", Position).alias("pos"),
    FieldSpec::new("name", Str),
    FieldSpec::new("color", Color),
];

/// The localized name fields, in the order they are written.
pub const NAME_FIELDS: &[&str] = &[
    "familyName",
    "styleName",
    "copyright",
    "styleMapFamilyName",
    "styleMapStyleName",
    "uniqueID",
    "fullName",
    "version",
    "postscriptName",
    "trademark",
    "manufacturer",
    "designer",
    "description",
    "manufacturerURL",
    "designerURL",
    "license",
    "licenseURL",
    "typographicFamily",
    "typographicSubfamily",
    "compatibleFullName",
    "sampleText",
    "WWSFamilyName",
    "WWSSubfamilyName",
];

const NAMES_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("familyName", I18N),
    FieldSpec::new("styleName", I18N),
    FieldSpec::new("copyright", I18N),
    FieldSpec::new("styleMapFamilyName", I18N),
    FieldSpec::new("styleMapStyleName", I18N),
    FieldSpec::new("uniqueID", I18N),
    FieldSpec::new("fullName", I18N),
    FieldSpec::new("version", I18N),
    FieldSpec::new("postscriptName", I18N),
    FieldSpec::new("trademark", I18N),
    FieldSpec::new("manufacturer", I18N),
    FieldSpec::new("designer", I18N),
    FieldSpec::new("description", I18N),
    FieldSpec::new("manufacturerURL", I18N),
    FieldSpec::new("designerURL", I18N),
    FieldSpec::new("license", I18N),
    FieldSpec::new("licenseURL", I18N),
    FieldSpec::new("typographicFamily", I18N),
    FieldSpec::new("typographicSubfamily", I18N),
    FieldSpec::new("compatibleFullName", I18N),
    FieldSpec::new("sampleText", I18N),
    FieldSpec::new("WWSFamilyName", I18N),
    FieldSpec::new("WWSSubfamilyName", I18N),
];

const FEATURES_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("classes", Json),
    FieldSpec::new("prefixes", Json),
    FieldSpec::new("features", Json),
];

impl Kind {
    /// The field table of this kind
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            Kind::Font => FONT_FIELDS,
            Kind::Axis => AXIS_FIELDS,
            Kind::Instance => INSTANCE_FIELDS,
            Kind::Master => MASTER_FIELDS,
            Kind::Glyph => GLYPH_FIELDS,
            Kind::Layer => LAYER_FIELDS,
            Kind::Shape => SHAPE_FIELDS,
            Kind::Node => NODE_FIELDS,
            Kind::Anchor => ANCHOR_FIELDS,
            Kind::Guide => GUIDE_FIELDS,
            Kind::Names => NAMES_FIELDS,
            Kind::Features => FEATURES_FIELDS,
        }
    }

    /// Looks a field up by its API name
    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Looks a field up by its API name or its on-disk alias.
    pub fn field_by_any_name(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields()
            .iter()
            .find(|f| f.name == name || f.alias == Some(name))
    }

    /// Kinds whose objects are always written on a single line.
    pub fn one_line(self) -> bool {
        matches!(
            self,
            Kind::Axis | Kind::Instance | Kind::Glyph | Kind::Anchor | Kind::Guide
        )
    }

    /// Fields of this kind stored in its own file rather than in a partition
    /// of its parent.
    pub fn fields_in(self, partition: Partition) -> impl Iterator<Item = &'static str> {
        self.fields()
            .iter()
            .filter(move |f| f.own_file == Some(partition))
            .map(|f| f.name)
    }

    /// Fields written alongside the object itself, including user data.
    pub fn inline_fields(self) -> impl Iterator<Item = &'static str> {
        self.fields()
            .iter()
            .filter(|f| f.own_file.is_none())
            .map(|f| f.name)
            .chain(std::iter::once(USER_DATA))
    }
}
