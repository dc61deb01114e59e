//! Loading and incremental saving of `.babelfont` packages.
//!
//! A package is a directory holding `info.json` (font fields, axes,
//! instances and masters), `names.json`, `features.fea`, `glyphs.json` (glyph
//! metadata) and one `glyphs/<name>.nfsglyph` file per glyph with its layers.
//!
//! Loading reads every file but builds no glyph facades: glyph records wait
//! in the font's glyph index and their layers stay raw JSON until asked for.
//!
//! Saving rewrites a partition only when something routed into it is dirty
//! for file saving, when the file does not exist yet, or when a full save is
//! requested. A font without change tracking is always saved in full, since
//! nothing records what changed.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use serde_json::Value;

use crate::{
    dirty::FILE_SAVING,
    features::Features,
    font::Font,
    glyph::{glyph_file_name, Glyph},
    record::{DocumentValue, DynamicRecord},
    schema::Kind,
    serializer,
    tracking::{Facade, Tracked},
    ContextError,
};

/// Font-level metadata
pub const INFO_FILE: &str = "info.json";
/// The name table
pub const NAMES_FILE: &str = "names.json";
/// Feature code, in AFDKO syntax
pub const FEATURES_FILE: &str = "features.fea";
/// Glyph metadata, one glyph per line
pub const GLYPHS_FILE: &str = "glyphs.json";
/// Directory holding one layer file per glyph
pub const GLYPHS_DIR: &str = "glyphs";
const GLYPH_EXTENSION: &str = "nfsglyph";

/// Format options for [`Font::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOptions {
    /// Rewrite every partition, dirty or not
    pub full: bool,
    /// Delete layer files of glyphs no longer in the font when `glyphs.json`
    /// is rewritten
    pub prune: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            full: false,
            prune: true,
        }
    }
}

/// What a successful save did, as paths relative to the package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Files written, in write order
    pub written: Vec<PathBuf>,
    /// Stale layer files deleted
    pub pruned: Vec<PathBuf>,
    /// Partitions left alone because nothing in them changed
    pub skipped: usize,
}

impl SaveReport {
    /// Was the file at this package-relative path written?
    pub fn wrote(&self, relative: &str) -> bool {
        self.written.iter().any(|p| p == Path::new(relative))
    }
}

fn read_json(root: &Path, relative: &str) -> Result<Value, ContextError> {
    let buffered = BufReader::new(File::open(root.join(relative))?);
    Ok(serde_json::from_reader(buffered)?)
}

/// Loads a package. Change tracking is left off.
pub fn load(path: &Path) -> Result<Rc<Font>, ContextError> {
    let start = Instant::now();
    let info = read_json(path, INFO_FILE)?;
    let record = DynamicRecord::from_document(Kind::Font, &info, false)?;
    if let (Some(spec), Some(date)) = (Kind::Font.field("date"), record.borrow().json("date")) {
        spec.validate(date)?;
    }

    if path.join(NAMES_FILE).is_file() {
        let names = read_json(path, NAMES_FILE)?;
        let names = DynamicRecord::from_document(Kind::Names, &names, false)?;
        record
            .borrow_mut()
            .insert("names", DocumentValue::Record(names));
    }

    let fea_path = path.join(FEATURES_FILE);
    if fea_path.is_file() {
        let features = Features::from_fea(&fs::read_to_string(fea_path)?)?;
        record
            .borrow_mut()
            .insert("features", DocumentValue::Record(features.record()));
    }

    let glyph_list = read_json(path, GLYPHS_FILE)?;
    let mut glyphs = vec![];
    for item in glyph_list.as_array().into_iter().flatten() {
        let glyph = DynamicRecord::from_document(Kind::Glyph, item, false)?;
        let name = glyph
            .borrow()
            .json("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let layer_file = glyph_file_name(&name);
        if path.join(&layer_file).is_file() {
            let layers = read_json(path, &layer_file)?;
            glyph
                .borrow_mut()
                .insert("layers", DocumentValue::Json(layers));
        } else {
            log::warn!("Glyph {} has no layer file {}", name, layer_file);
        }
        glyphs.push(glyph);
    }
    log::debug!("Read {} glyphs", glyphs.len());
    record
        .borrow_mut()
        .insert("glyphs", DocumentValue::Records(glyphs));

    let font = Font::from_record(record);
    font.set_filename(Some(path.to_path_buf()));
    log::debug!("Loaded {} in {:.2?}", path.display(), start.elapsed());
    Ok(font)
}

/// Writes through a temporary sibling so a partition is never left half
/// written.
fn write_partition(root: &Path, relative: &str, contents: &str) -> Result<(), ContextError> {
    let target = root.join(relative);
    let mut temporary = target.clone().into_os_string();
    temporary.push(".tmp");
    let temporary = PathBuf::from(temporary);
    fs::write(&temporary, contents)?;
    if let Err(e) = fs::rename(&temporary, &target) {
        let _ = fs::remove_file(&temporary);
        return Err(e.into());
    }
    Ok(())
}

struct Saver<'a> {
    root: &'a Path,
    full: bool,
    report: SaveReport,
}

impl Saver<'_> {
    /// Should this partition be written?
    fn wanted(&mut self, relative: &str, dirty: bool) -> bool {
        let wanted = self.full || dirty || !self.root.join(relative).exists();
        if !wanted {
            log::trace!("Skipping clean partition {}", relative);
            self.report.skipped += 1;
        }
        wanted
    }

    fn write(&mut self, relative: &str, contents: &str) -> Result<(), ContextError> {
        write_partition(self.root, relative, contents)?;
        log::debug!("Wrote {}", relative);
        self.report.written.push(PathBuf::from(relative));
        Ok(())
    }
}

/// Does this glyph's layer file need writing?
fn layers_dirty(glyph: &Glyph) -> bool {
    if !glyph.is_dirty(FILE_SAVING) {
        return false;
    }
    let fields = glyph.dirty_fields(FILE_SAVING);
    fields.is_empty()
        || fields.contains("layers")
        || fields.contains("name")
        || glyph.any_layer_dirty(FILE_SAVING)
}

/// Does this glyph's entry in `glyphs.json` need writing?
fn metadata_dirty(glyph: &Glyph) -> bool {
    let fields = glyph.dirty_fields(FILE_SAVING);
    Kind::Glyph.inline_fields().any(|f| fields.contains(f))
}

/// Saves `font` as a package at `path`.
pub(crate) fn save(
    font: &Font,
    path: &Path,
    options: &SaveOptions,
) -> Result<SaveReport, ContextError> {
    let full = options.full || !font.tracking_enabled();
    fs::create_dir_all(path.join(GLYPHS_DIR))?;
    let mut saver = Saver {
        root: path,
        full,
        report: SaveReport::default(),
    };

    let glyphs = font.glyphs().entries();
    let mut expected_files = HashSet::new();
    for (name, record, glyph) in &glyphs {
        let relative = glyph_file_name(name);
        expected_files.insert(relative.clone());
        let dirty = glyph.as_deref().is_some_and(layers_dirty);
        if saver.wanted(&relative, dirty) {
            saver.write(&relative, &serializer::list_file(&record.borrow(), "layers"))?;
            if let Some(glyph) = glyph {
                glyph.clean_layers(FILE_SAVING);
            }
        }
    }

    let list_dirty = font.dirty_fields(FILE_SAVING).contains("glyphs")
        || glyphs
            .iter()
            .any(|(_, _, g)| g.as_deref().is_some_and(metadata_dirty));
    if saver.wanted(GLYPHS_FILE, list_dirty) {
        saver.write(GLYPHS_FILE, &serializer::list_file(&font.record().borrow(), "glyphs"))?;
        for glyph in glyphs.iter().filter_map(|(_, _, g)| g.as_ref()) {
            glyph.mark_clean(FILE_SAVING, false);
        }
        if options.prune {
            prune(path, &expected_files, &mut saver.report)?;
        }
    }

    let font_fields = font.dirty_fields(FILE_SAVING);
    let names_dirty = font_fields.contains("names")
        || font
            .cached_names()
            .is_some_and(|names| names.is_dirty(FILE_SAVING));
    if saver.wanted(NAMES_FILE, names_dirty) {
        let names = font.names();
        saver.write(NAMES_FILE, &serializer::record_file(&names.record().borrow()))?;
        names.mark_clean(FILE_SAVING, true);
    }

    let features_dirty = font_fields.contains("features")
        || font
            .cached_features()
            .is_some_and(|features| features.is_dirty(FILE_SAVING));
    if saver.wanted(FEATURES_FILE, features_dirty) {
        let features = font.features();
        saver.write(FEATURES_FILE, &features.to_fea())?;
        features.mark_clean(FILE_SAVING, true);
    }

    if saver.wanted(INFO_FILE, font.info_dirty(FILE_SAVING)) {
        saver.write(INFO_FILE, &serializer::record_file(&font.record().borrow()))?;
        font.clean_info(FILE_SAVING);
    }

    font.mark_clean(FILE_SAVING, true);
    log::debug!(
        "Wrote {} partitions, skipped {}",
        saver.report.written.len(),
        saver.report.skipped
    );
    Ok(saver.report)
}

/// Removes layer files that belong to no glyph of the font.
fn prune(
    root: &Path,
    expected: &HashSet<String>,
    report: &mut SaveReport,
) -> Result<(), ContextError> {
    for entry in fs::read_dir(root.join(GLYPHS_DIR))? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if Path::new(file_name).extension().and_then(|e| e.to_str()) != Some(GLYPH_EXTENSION) {
            continue;
        }
        let relative = format!("{}/{}", GLYPHS_DIR, file_name);
        if !expected.contains(&relative) {
            fs::remove_file(entry.path())?;
            log::debug!("Pruned {}", relative);
            report.pruned.push(PathBuf::from(relative));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{layer::Layer, node::Node, shape::Shape};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn small_font() -> Rc<Font> {
        let font = Font::from_document(&json!({
            "date": "2024-05-06 07:08:09",
            "masters": [{"name": "Regular", "id": "m1"}],
            "glyphs": [{"name": "A", "codepoints": [65]}, {"name": "b"}],
            "names": {"familyName": "Test Sans"}
        }))
        .unwrap();
        for glyph in font.glyphs() {
            let layer = Layer::new(500, Some("m1")).unwrap();
            layer.shapes().push(
                Shape::path(
                    vec![
                        Node::new(0, 0, "l").unwrap(),
                        Node::new(100, 0, "l").unwrap(),
                        Node::new(100, 100, "l").unwrap(),
                    ],
                    true,
                )
                .unwrap(),
            );
            glyph.layers().push(layer);
        }
        font
    }

    #[test]
    fn load_keeps_glyphs_raw() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Test.babelfont");
        small_font().save(Some(&path), &SaveOptions::default()).unwrap();

        let font = load(&path).unwrap();
        assert_eq!(font.filename(), Some(path.clone()));
        assert!(!font.tracking_enabled());
        assert_eq!(font.glyphs().names(), vec!["A".to_string(), "b".to_string()]);
        assert!(font.glyphs().materialized().is_empty());
        let glyph = font.glyphs().get("A").unwrap();
        assert!(!glyph.layers_materialized());
        assert!(!font.glyphs().is_materialized("b"));
        assert_eq!(glyph.layers().first().unwrap().width(), 500);
        assert_eq!(
            font.names().family_name().get_default().map(String::as_str),
            Some("Test Sans")
        );
    }

    #[test]
    fn untracked_fonts_save_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Test.babelfont");
        let font = small_font();
        let report = font.save(Some(&path), &SaveOptions::default()).unwrap();
        assert_eq!(report.written.len(), 6);
        let again = font.save(None, &SaveOptions::default()).unwrap();
        assert_eq!(again.written.len(), 6);
        assert_eq!(again.skipped, 0);
        assert!(path.join("glyphs/A_.nfsglyph").is_file());
        assert!(path.join("glyphs/b.nfsglyph").is_file());
    }

    #[test]
    fn clean_tracked_font_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Test.babelfont");
        small_font().save(Some(&path), &SaveOptions::default()).unwrap();
        let font = load(&path).unwrap();
        font.initialize_dirty_tracking();
        let report = font.save(None, &SaveOptions::default()).unwrap();
        assert!(report.written.is_empty());
        assert_eq!(report.skipped, 6);
    }

    #[test]
    fn removed_glyph_files_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Test.babelfont");
        small_font().save(Some(&path), &SaveOptions::default()).unwrap();
        let font = load(&path).unwrap();
        font.initialize_dirty_tracking();
        font.glyphs().remove("b");
        let report = font.save(None, &SaveOptions::default()).unwrap();
        assert!(report.wrote(GLYPHS_FILE));
        assert_eq!(report.pruned, vec![PathBuf::from("glyphs/b.nfsglyph")]);
        assert!(!path.join("glyphs/b.nfsglyph").exists());
        assert_eq!(load(&path).unwrap().glyphs().len(), 1);
    }

    #[test]
    fn renamed_glyph_moves_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Test.babelfont");
        small_font().save(Some(&path), &SaveOptions::default()).unwrap();
        let font = load(&path).unwrap();
        font.initialize_dirty_tracking();
        font.glyphs().get("b").unwrap().set_name("c").unwrap();
        let report = font.save(None, &SaveOptions::default()).unwrap();
        assert!(report.wrote("glyphs/c.nfsglyph"));
        assert!(report.wrote(GLYPHS_FILE));
        assert!(!report.wrote(INFO_FILE));
        assert!(!path.join("glyphs/b.nfsglyph").exists());
        let reloaded = load(&path).unwrap();
        assert_eq!(reloaded.glyphs().names(), vec!["A".to_string(), "c".to_string()]);
        assert_eq!(reloaded.glyphs().get("c").unwrap().layers().len(), 1);
    }

    #[test]
    fn bad_dates_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Test.babelfont");
        small_font().save(Some(&path), &SaveOptions::default()).unwrap();
        fs::write(path.join(INFO_FILE), r#"{"date": "last tuesday"}"#).unwrap();
        assert!(matches!(load(&path), Err(ContextError::BadDate { .. })));
    }
}
