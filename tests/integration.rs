use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use context_font::{
    load, Axis, ContextError, Facade, Features, Font, Glyph, Layer, Location, Master, Node,
    SaveOptions, Shape, Tracked, CANVAS_RENDER, CORE_METRICS, FILE_SAVING, UNDO,
};
use filetime::FileTime;
use pretty_assertions::assert_eq;
use serde_json::json;

const OLD: i64 = 1_000_000;

fn rectangle() -> Rc<Shape> {
    Shape::path(
        vec![
            Node::new(0, 0, "l").unwrap(),
            Node::new(400, 0, "l").unwrap(),
            Node::new(400, 700, "l").unwrap(),
            Node::new(0, 700, "l").unwrap(),
        ],
        true,
    )
    .unwrap()
}

/// upm 1000, a weight axis, one master and the glyphs `A`, `B` and `space`.
fn build_font() -> Result<Rc<Font>, ContextError> {
    let font = Font::new();
    font.set_upm(1000)?;
    font.names().set_family_name("Integration Sans")?;
    let axis = Axis::new("Weight", "wght")?;
    axis.set_min(100.0)?;
    axis.set_max(900.0)?;
    axis.set_default(400.0)?;
    font.axes().push(axis);
    let location: Location = [("wght".to_string(), 400.0)].into_iter().collect();
    font.masters().push(Master::new("Regular", Some("m01"), location)?);
    for (name, codepoint) in [("A", 65u32), ("B", 66), ("space", 32)] {
        let glyph = Glyph::new(name)?;
        glyph.set_codepoints(vec![codepoint])?;
        let layer = Layer::new(600, Some("m01"))?;
        if name != "space" {
            layer.shapes().push(rectangle());
        }
        glyph.layers().push(layer);
        font.glyphs().append(glyph);
    }
    font.features().add_feature("liga", "    sub A B by A;")?;
    Ok(font)
}

fn saved_package(dir: &Path) -> PathBuf {
    let path = dir.join("Integration.babelfont");
    build_font()
        .unwrap()
        .save(Some(&path), &SaveOptions::default())
        .unwrap();
    path
}

/// Every file in a package, keyed by relative path.
fn contents(package: &Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    for dir in [package.to_path_buf(), package.join("glyphs")] {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_file() {
                let relative = path.strip_prefix(package).unwrap();
                files.insert(
                    relative.to_string_lossy().replace('\\', "/"),
                    fs::read_to_string(&path).unwrap(),
                );
            }
        }
    }
    files
}

fn age_files(package: &Path) {
    for relative in contents(package).keys() {
        filetime::set_file_mtime(package.join(relative), FileTime::from_unix_time(OLD, 0))
            .unwrap();
    }
}

fn untouched(package: &Path, relative: &str) -> bool {
    let metadata = fs::metadata(package.join(relative)).unwrap();
    FileTime::from_last_modification_time(&metadata) == FileTime::from_unix_time(OLD, 0)
}

#[test]
fn round_trip_is_stable_after_one_pass() {
    let dir = tempfile::tempdir().unwrap();
    let first = saved_package(dir.path());
    let second = dir.path().join("Second.babelfont");
    load(&first)
        .unwrap()
        .save(Some(&second), &SaveOptions::default())
        .unwrap();
    let third = dir.path().join("Third.babelfont");
    load(&second)
        .unwrap()
        .save(Some(&third), &SaveOptions::default())
        .unwrap();
    assert_eq!(contents(&second), contents(&third));
}

#[test]
fn loaded_fields_survive() {
    let dir = tempfile::tempdir().unwrap();
    let font = load(saved_package(dir.path())).unwrap();
    assert_eq!(font.upm(), 1000);
    assert_eq!(font.axes().len(), 1);
    assert_eq!(font.axes().first().unwrap().default(), Some(400.0));
    assert_eq!(font.default_master().unwrap().id(), "m01");
    assert_eq!(font.glyphs().names(), vec!["A", "B", "space"]);
    assert_eq!(font.unicode_map().get(&32).map(String::as_str), Some("space"));
    assert_eq!(
        font.names().family_name().get_default().map(String::as_str),
        Some("Integration Sans")
    );
    assert_eq!(font.features().features()[0].1, "    sub A B by A;");
    let a = font.glyphs().get("A").unwrap();
    let layer = a.layers().first().unwrap();
    assert_eq!(layer.width(), 600);
    assert_eq!(layer.shapes().first().unwrap().nodes().len(), 4);
}

#[test]
fn tracking_does_not_change_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = saved_package(dir.path());
    let full = SaveOptions {
        full: true,
        ..Default::default()
    };

    let plain = dir.path().join("Plain.babelfont");
    let font = load(&source).unwrap();
    font.glyphs().get("B").unwrap().layers().first().unwrap().set_width(650).unwrap();
    font.save(Some(&plain), &full).unwrap();

    let tracked = dir.path().join("Tracked.babelfont");
    let font = load(&source).unwrap();
    font.initialize_dirty_tracking();
    font.glyphs().get("B").unwrap().layers().first().unwrap().set_width(650).unwrap();
    font.save(Some(&tracked), &full).unwrap();

    assert_eq!(contents(&plain), contents(&tracked));
}

#[test]
fn dirtiness_propagates_and_cleans() {
    let dir = tempfile::tempdir().unwrap();
    let font = load(saved_package(dir.path())).unwrap();
    font.initialize_dirty_tracking();
    let glyph = font.glyphs().get("A").unwrap();
    let layer = glyph.layers().first().unwrap();
    let shape = layer.shapes().first().unwrap();
    let node = shape.nodes().get(2).unwrap();

    node.mark_dirty(UNDO, None, true);
    let chain: [&dyn Tracked; 5] = [&*node, &*shape, &*layer, &*glyph, &*font];
    for object in &chain {
        assert!(object.is_dirty(UNDO));
        assert!(!object.is_dirty(FILE_SAVING));
    }

    font.mark_clean(UNDO, true);
    for object in &chain {
        assert!(!object.is_dirty(UNDO));
    }
    assert!(!font.glyphs().is_materialized("B"));
}

#[test]
fn contexts_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let font = load(saved_package(dir.path())).unwrap();
    font.initialize_dirty_tracking();
    let glyph = font.glyphs().get("B").unwrap();
    glyph.mark_clean(CANVAS_RENDER, false);
    glyph.mark_dirty(UNDO, Some("category"), false);
    assert!(!glyph.is_dirty(CANVAS_RENDER));
    assert!(!glyph.is_dirty(FILE_SAVING));
    glyph.mark_clean(UNDO, false);
    glyph.mark_dirty(CANVAS_RENDER, None, false);
    assert!(!glyph.is_dirty(UNDO));
    assert!(glyph.is_dirty(CANVAS_RENDER));
}

#[test]
fn setting_the_same_value_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let font = load(saved_package(dir.path())).unwrap();
    font.initialize_dirty_tracking();
    let glyph = font.glyphs().get("A").unwrap();
    glyph.set_codepoints(vec![65u32]).unwrap();
    assert!(!glyph.is_dirty(FILE_SAVING));
    glyph.set_codepoints(vec![0xC0u32]).unwrap();
    assert!(glyph.is_dirty(FILE_SAVING));
    assert_eq!(
        glyph.dirty_fields(FILE_SAVING).into_iter().collect::<Vec<_>>(),
        vec!["codepoints".to_string()]
    );
    assert!(font.is_dirty(FILE_SAVING));
}

#[test]
fn only_the_touched_glyph_is_built() {
    let dir = tempfile::tempdir().unwrap();
    let font = load(saved_package(dir.path())).unwrap();
    assert!(font.glyphs().materialized().is_empty());
    assert_eq!(font.glyphs().len(), 3);

    let b = font.glyphs().get("B").unwrap();
    assert_eq!(font.glyphs().materialized().len(), 1);
    assert!(!font.glyphs().is_materialized("A"));
    assert!(!font.glyphs().is_materialized("space"));
    assert!(!b.layers_materialized());
    let _ = b.layers();
    assert!(b.layers_materialized());
}

#[test]
fn editing_one_width_rewrites_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let package = saved_package(dir.path());
    age_files(&package);

    let font = load(&package).unwrap();
    font.initialize_dirty_tracking();
    let layer = font.glyphs().get("A").unwrap().layers().first().unwrap();
    layer.set_width(layer.width() + 10).unwrap();
    let report = font.save(None, &SaveOptions::default()).unwrap();

    assert_eq!(report.written, vec![PathBuf::from("glyphs/A_.nfsglyph")]);
    assert_eq!(report.skipped, 6);
    assert!(!untouched(&package, "glyphs/A_.nfsglyph"));
    for relative in [
        "glyphs/B_.nfsglyph",
        "glyphs/space.nfsglyph",
        "glyphs.json",
        "names.json",
        "features.fea",
        "info.json",
    ] {
        assert!(untouched(&package, relative), "{} was rewritten", relative);
    }
    assert_eq!(
        load(&package).unwrap().glyphs().get("A").unwrap().layers().first().unwrap().width(),
        610
    );
}

#[test]
fn glyph_metadata_rewrites_only_the_glyph_list() {
    let dir = tempfile::tempdir().unwrap();
    let package = saved_package(dir.path());
    let font = load(&package).unwrap();
    font.initialize_dirty_tracking();
    font.glyphs().get("space").unwrap().set_category("separator").unwrap();
    let report = font.save(None, &SaveOptions::default()).unwrap();
    assert_eq!(report.written, vec![PathBuf::from("glyphs.json")]);
}

#[test]
fn nodes_use_the_compact_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Nodes.babelfont");
    let font = Font::new();
    let glyph = Glyph::new("a").unwrap();
    let layer = Layer::new(500, None).unwrap();
    let shape = Shape::path(
        vec![
            Node::new(10, 20, "l").unwrap(),
            Node::from_document(&json!([30, 40, "cs", {"hint": true, "a": 1}])).unwrap(),
            Node::new(50, 60, "o").unwrap(),
        ],
        false,
    )
    .unwrap();
    layer.shapes().push(shape);
    glyph.layers().push(layer);
    font.glyphs().append(glyph);
    font.save(Some(&path), &SaveOptions::default()).unwrap();

    let text = fs::read_to_string(path.join("glyphs/a.nfsglyph")).unwrap();
    assert!(text.contains(r#"[10,20,"l"]"#));
    assert!(text.contains(r#"[30,40,"cs",{"a":1,"hint":true}]"#));

    let nodes = load(&path)
        .unwrap()
        .glyphs()
        .get("a")
        .unwrap()
        .layers()
        .first()
        .unwrap()
        .shapes()
        .first()
        .unwrap()
        .nodes();
    let plain = nodes.first().unwrap();
    assert_eq!((plain.x(), plain.y(), plain.type_code()), (10, 20, "l".to_string()));
    assert_eq!(plain.extra(), None);
    let rich = nodes.get(1).unwrap();
    assert_eq!((rich.x(), rich.y(), rich.type_code()), (30, 40, "cs".to_string()));
    assert!(rich.is_smooth());
    assert_eq!(rich.extra(), Some(json!({"hint": true, "a": 1})));
}

#[test]
fn rectangle_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Scenario.babelfont");
    let font = build_font().unwrap();
    font.save(Some(&path), &SaveOptions::default()).unwrap();

    font.initialize_dirty_tracking();
    assert!(!font.is_dirty(FILE_SAVING));
    assert!(font.is_dirty(CANVAS_RENDER));

    let glyph = font.glyphs().get("A").unwrap();
    let layer = glyph.layers().first().unwrap();
    let shape = layer.shapes().first().unwrap();
    let node = shape.nodes().get(1).unwrap();
    glyph.mark_clean(CANVAS_RENDER, true);
    node.set_x(node.x() + 50).unwrap();
    assert_eq!(node.x(), 450);

    let chain: [&dyn Tracked; 5] = [&*node, &*shape, &*layer, &*glyph, &*font];
    for object in &chain {
        assert!(object.is_dirty(FILE_SAVING));
        assert!(object.is_dirty(CANVAS_RENDER));
    }

    let report = font.save(None, &SaveOptions::default()).unwrap();
    assert!(report.wrote("glyphs/A_.nfsglyph"));
    for object in &chain {
        assert!(!object.is_dirty(FILE_SAVING));
        assert!(object.is_dirty(CANVAS_RENDER));
    }
}

#[test]
fn features_survive_a_round_trip() {
    let fea = "@vowels = [a e i o u];
lookup anon {
    sub a by a.alt;
} anon;
# Prefix: languagesystems
languagesystem DFLT dflt;
languagesystem latn dflt;
feature smcp {
    sub [a e] by [a.sc e.sc];
        # keep this indentation
} smcp;
";
    let features = Features::from_fea(fea).unwrap();
    assert_eq!(features.classes().len(), 1);
    assert_eq!(features.prefixes().len(), 2);
    assert_eq!(
        features.features()[0].1,
        "    sub [a e] by [a.sc e.sc];\n        # keep this indentation"
    );

    let again = Features::from_fea(&features.to_fea()).unwrap();
    assert_eq!(again.classes(), features.classes());
    assert_eq!(again.prefixes(), features.prefixes());
    assert_eq!(again.features(), features.features());
}

#[test]
fn missing_info_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let package = saved_package(dir.path());
    fs::remove_file(package.join("info.json")).unwrap();
    assert!(matches!(load(&package), Err(ContextError::IO(_))));
}

#[test]
fn core_metrics_survive_a_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let package = saved_package(dir.path());
    let font = load(&package).unwrap();
    let master = font.masters().first().unwrap();
    for (ix, name) in CORE_METRICS.iter().enumerate() {
        master.set_metric(name, Some((ix + 1) as f64 * 10.0)).unwrap();
    }
    font.save(Some(&package), &SaveOptions::default()).unwrap();

    let master = load(&package).unwrap().masters().first().unwrap();
    for (ix, name) in CORE_METRICS.iter().enumerate() {
        assert_eq!(master.metric(name), Some((ix + 1) as f64 * 10.0), "{}", name);
    }
}
