use std::any::Any;
use std::rc::Rc;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{json, Map, Value};
use smol_str::SmolStr;

use crate::{
    dirty::DirtyContext,
    schema::Kind,
    tracking::{Facade, ObjectCore, Tracked},
    ContextError,
};

/// The prefix holding code which appears before any `# Prefix:` marker.
pub const ANONYMOUS_PREFIX: &str = "anonymous";

const PREFIX_MARKER: &str = "# Prefix: ";

/// OpenType feature code, split into glyph classes, named prefixes and
/// feature blocks.
pub struct Features {
    core: ObjectCore,
}

facade!(Features, Kind::Features);

impl Features {
    fn build(core: ObjectCore) -> Self {
        Features { core }
    }

    /// Empty feature code
    pub fn new() -> Rc<Features> {
        Features::from_record(crate::record::DynamicRecord::new_ref(Kind::Features))
    }

    /// Opentype classes
    ///
    /// The key does not start with @.
    pub fn classes(&self) -> IndexMap<SmolStr, Vec<String>> {
        let Some(Value::Object(map)) = self.get("classes") else {
            return IndexMap::new();
        };
        map.iter()
            .map(|(name, glyphs)| {
                let glyphs = glyphs
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|g| g.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                (SmolStr::from(name.as_str()), glyphs)
            })
            .collect()
    }

    /// Replaces the glyph classes
    pub fn set_classes(
        &self,
        classes: &IndexMap<SmolStr, Vec<String>>,
    ) -> Result<(), ContextError> {
        let map: Map<String, Value> = classes
            .iter()
            .map(|(name, glyphs)| (name.to_string(), json!(glyphs)))
            .collect();
        self.set("classes", Value::Object(map))
    }

    /// Feature code placed before the features, keyed by a user-defined name.
    pub fn prefixes(&self) -> IndexMap<SmolStr, String> {
        let Some(Value::Object(map)) = self.get("prefixes") else {
            return IndexMap::new();
        };
        map.iter()
            .filter_map(|(name, code)| {
                Some((SmolStr::from(name.as_str()), code.as_str()?.to_string()))
            })
            .collect()
    }

    /// Replaces the prefixes
    pub fn set_prefixes(&self, prefixes: &IndexMap<SmolStr, String>) -> Result<(), ContextError> {
        let map: Map<String, Value> = prefixes
            .iter()
            .map(|(name, code)| (name.to_string(), Value::from(code.as_str())))
            .collect();
        self.set("prefixes", Value::Object(map))
    }

    /// Feature blocks as (feature tag, code), in order.
    pub fn features(&self) -> Vec<(SmolStr, String)> {
        let Some(Value::Array(items)) = self.get("features") else {
            return vec![];
        };
        items
            .iter()
            .filter_map(|item| {
                let tag = item.get(0)?.as_str()?;
                let code = item.get(1)?.as_str()?;
                Some((SmolStr::from(tag), code.to_string()))
            })
            .collect()
    }

    /// Replaces the feature blocks
    pub fn set_features(&self, features: &[(SmolStr, String)]) -> Result<(), ContextError> {
        let items = features
            .iter()
            .map(|(tag, code)| json!([tag.as_str(), code]))
            .collect();
        self.set("features", Value::Array(items))
    }

    /// Appends a feature block.
    pub fn add_feature(&self, tag: &str, code: &str) -> Result<(), ContextError> {
        let mut features = self.features();
        features.push((tag.into(), code.to_string()));
        self.set_features(&features)
    }

    /// Parses feature file text.
    ///
    /// Class definitions and `feature` blocks are picked out; everything else
    /// is kept verbatim in the prefix named by the most recent `# Prefix:`
    /// line, or the anonymous prefix before the first one.
    pub fn from_fea(fea: &str) -> Result<Rc<Features>, ContextError> {
        let class_re = regex(r"^@(\w+)\s*=\s*\[(.*?)\];?")?;
        let prefix_re = regex(r"^# Prefix: (.*)")?;
        let feature_re = regex(r"^feature\s+(\w+)\s*\{")?;

        let mut classes: IndexMap<SmolStr, Vec<String>> = IndexMap::new();
        let mut prefixes: IndexMap<SmolStr, String> = IndexMap::new();
        let mut features: Vec<(SmolStr, String)> = vec![];
        let mut current_prefix = SmolStr::new(ANONYMOUS_PREFIX);

        let lines: Vec<&str> = fea.split('\n').collect();
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();

            if line.starts_with('@') && line.contains('=') {
                if let Some(caps) = class_re.captures(line) {
                    classes.insert(
                        caps[1].into(),
                        caps[2].split_whitespace().map(str::to_string).collect(),
                    );
                }
                i += 1;
                continue;
            }

            if line.starts_with("# Prefix:") {
                if let Some(caps) = prefix_re.captures(line) {
                    current_prefix = caps[1].into();
                }
                i += 1;
                continue;
            }

            if line.starts_with("feature ") {
                if let Some(caps) = feature_re.captures(line) {
                    let tag = SmolStr::from(&caps[1]);
                    let mut code = String::new();
                    let mut depth: i64 = 1;
                    i += 1;
                    while i < lines.len() && depth > 0 {
                        let body = lines[i];
                        depth += body.matches('{').count() as i64;
                        depth -= body.matches('}').count() as i64;
                        if depth > 0 {
                            code.push_str(body.trim_end());
                            code.push('\n');
                        }
                        i += 1;
                    }
                    features.push((tag, code.trim_end().to_string()));
                    continue;
                }
            }

            if !line.is_empty() {
                let code = prefixes.entry(current_prefix.clone()).or_default();
                code.push_str(lines[i].trim_end());
                code.push('\n');
            }
            i += 1;
        }
        for code in prefixes.values_mut() {
            let trimmed = code.trim_end_matches('\n').len();
            code.truncate(trimmed);
        }

        let result = Features::new();
        if !classes.is_empty() {
            result.set_classes(&classes)?;
        }
        if !prefixes.is_empty() {
            result.set_prefixes(&prefixes)?;
        }
        if !features.is_empty() {
            result.set_features(&features)?;
        }
        Ok(result)
    }

    /// Emits feature file text: classes, then prefixes, then feature blocks.
    pub fn to_fea(&self) -> String {
        let mut fea = String::new();
        for (name, glyphs) in &self.classes() {
            fea.push_str(&format!("@{} = [{}];\n", name, glyphs.join(" ")));
        }
        for (prefix, code) in &self.prefixes() {
            if prefix != ANONYMOUS_PREFIX {
                fea.push_str(PREFIX_MARKER);
                fea.push_str(prefix);
                fea.push('\n');
            }
            fea.push_str(code);
            fea.push('\n');
        }
        for (name, code) in &self.features() {
            fea.push_str(&format!("feature {} {{\n{}\n}} {};\n", name, code, name));
        }
        fea
    }

    /// Is there no feature code at all?
    pub fn is_empty(&self) -> bool {
        self.classes().is_empty() && self.prefixes().is_empty() && self.features().is_empty()
    }
}

fn regex(pattern: &str) -> Result<Regex, ContextError> {
    Regex::new(pattern).map_err(|e| ContextError::General(e.to_string()))
}

impl Tracked for Features {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn mark_children_clean(&self, _context: DirtyContext) {}

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
