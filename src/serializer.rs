//! Renders records in the package's JSON dialect.
//!
//! Output is driven entirely by the per-kind field tables: fields appear in
//! table order under their on-disk names, falsy values and values equal to a
//! non-falsy default are left out, and fields living in another partition are
//! skipped. Unknown fields follow, and user data comes last with its keys
//! sorted. Nodes are compact `[x,y,type]` or `[x,y,type,extra]` arrays.
//!
//! The writer is deterministic: a record renders to the same bytes whether
//! or not its facades were ever built, which is what makes saves with and
//! without change tracking interchangeable.

use serde_json::{Map, Value};

use crate::{
    i18ndictionary::I18NDictionary,
    record::{inflate_list, inflate_one, DocumentValue, DynamicRecord, RecordRef},
    schema::{is_falsy, FieldSpec, FieldType, Kind, USER_DATA},
};

const INDENT: &str = "  ";

fn pad(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

fn quote(key: &str) -> String {
    Value::from(key).to_string()
}

/// A copy of `value` with the keys of every object in sorted order.
pub(crate) fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), sort_keys(&map[k.as_str()])))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn is_component(record: &DynamicRecord) -> bool {
    record.kind() == Kind::Shape && record.json("ref").is_some()
}

fn node_array(record: &DynamicRecord) -> String {
    let mut items = vec![
        record.json("x").cloned().unwrap_or(Value::from(0)),
        record.json("y").cloned().unwrap_or(Value::from(0)),
        record.json("type").cloned().unwrap_or(Value::Null),
    ];
    if let Some(extra) = record.json(USER_DATA).filter(|v| !is_falsy(v)) {
        items.push(sort_keys(extra));
    }
    Value::Array(items).to_string()
}

/// The records of a child list, inflating raw JSON into temporary records
/// without touching the owner.
fn child_records(kind: Kind, value: &DocumentValue) -> Vec<RecordRef> {
    match value {
        DocumentValue::Records(list) => list.clone(),
        DocumentValue::Json(raw) => inflate_list(kind, raw),
        DocumentValue::Record(record) => vec![record.clone()],
    }
}

fn write_list(out: &mut String, kind: Kind, records: &[RecordRef], level: usize, separate: bool) {
    if records.is_empty() {
        out.push_str("[]");
        return;
    }
    if separate {
        out.push_str("[\n");
        for (ix, record) in records.iter().enumerate() {
            if ix > 0 {
                out.push_str(",\n");
            }
            pad(out, level + 1);
            write_record(out, &record.borrow(), level + 1, false);
        }
        out.push('\n');
        pad(out, level);
        out.push(']');
    } else {
        let separator = if kind == Kind::Node { "," } else { ", " };
        out.push('[');
        for (ix, record) in records.iter().enumerate() {
            if ix > 0 {
                out.push_str(separator);
            }
            write_record(out, &record.borrow(), level, true);
        }
        out.push(']');
    }
}

fn write_scalar(
    out: &mut String,
    spec: &FieldSpec,
    value: &Value,
    level: usize,
    inline: bool,
) {
    let component = |key: &str| value.get(key).cloned().unwrap_or(Value::from(0));
    match spec.ty {
        FieldType::I18N => {
            out.push_str(&I18NDictionary::from_json(value).default_or_dict().to_string())
        }
        FieldType::Position if value.is_object() => out.push_str(
            &Value::Array(vec![component("x"), component("y"), component("angle")]).to_string(),
        ),
        FieldType::Color if value.is_object() => out.push_str(
            &Value::Array(vec![component("r"), component("g"), component("b"), component("a")])
                .to_string(),
        ),
        FieldType::Kerning if spec.separate_items && !inline => {
            let Some(map) = value.as_object() else {
                out.push_str(&value.to_string());
                return;
            };
            out.push_str("{\n");
            for (ix, (pair, kern)) in map.iter().enumerate() {
                if ix > 0 {
                    out.push_str(",\n");
                }
                pad(out, level + 1);
                out.push_str(&quote(pair));
                out.push_str(": ");
                out.push_str(&kern.to_string());
            }
            out.push('\n');
            pad(out, level);
            out.push('}');
        }
        _ => out.push_str(&value.to_string()),
    }
}

/// Renders one field, or `None` when it is skipped.
fn render_field(
    spec: &FieldSpec,
    value: &DocumentValue,
    level: usize,
    inline: bool,
) -> Option<String> {
    let mut out = String::new();
    match (spec.ty, value) {
        (FieldType::Children(kind), value) => {
            let records = child_records(kind, value);
            if records.is_empty() {
                return None;
            }
            write_list(&mut out, kind, &records, level, spec.separate_items && !inline);
        }
        (FieldType::Child(kind), value) => {
            let record = match value {
                DocumentValue::Record(record) => record.clone(),
                DocumentValue::Json(raw) => inflate_one(kind, raw)?,
                DocumentValue::Records(_) => return None,
            };
            write_record(&mut out, &record.borrow(), level, true);
            if out == "{}" {
                return None;
            }
        }
        (_, DocumentValue::Json(value)) => {
            if spec.skips_json(value) {
                return None;
            }
            write_scalar(&mut out, spec, value, level, inline);
        }
        _ => return None,
    }
    Some(out)
}

/// The (key, rendered value) pairs of a record whose entries sit at `level`.
fn entries(record: &DynamicRecord, level: usize, inline: bool) -> Vec<(String, String)> {
    let kind = record.kind();
    let mut entries = vec![];
    for spec in kind.fields() {
        if spec.own_file.is_some() {
            continue;
        }
        if let Some(rendered) = record
            .get(spec.name)
            .and_then(|value| render_field(spec, value, level, inline))
        {
            entries.push((spec.disk_name().to_string(), rendered));
        }
    }
    for (key, value) in record.iter() {
        if key == USER_DATA || kind.field(key).is_some() {
            continue;
        }
        if let DocumentValue::Json(value) = value {
            entries.push((key.clone(), value.to_string()));
        }
    }
    if let Some(user_data) = record.json(USER_DATA).filter(|v| !is_falsy(v)) {
        entries.push((USER_DATA.to_string(), sort_keys(user_data).to_string()));
    }
    entries
}

/// Writes a record whose opening brace is already positioned at `level`.
pub(crate) fn write_record(out: &mut String, record: &DynamicRecord, level: usize, inline: bool) {
    if record.kind() == Kind::Node {
        out.push_str(&node_array(record));
        return;
    }
    let inline = inline || record.kind().one_line() || is_component(record);
    let entries = entries(record, level + 1, inline);
    if entries.is_empty() {
        out.push_str("{}");
        return;
    }
    if inline {
        out.push('{');
        for (ix, (key, value)) in entries.iter().enumerate() {
            if ix > 0 {
                out.push_str(", ");
            }
            out.push_str(&quote(key));
            out.push_str(": ");
            out.push_str(value);
        }
        out.push('}');
    } else {
        out.push_str("{\n");
        for (ix, (key, value)) in entries.iter().enumerate() {
            if ix > 0 {
                out.push_str(",\n");
            }
            pad(out, level + 1);
            out.push_str(&quote(key));
            out.push_str(": ");
            out.push_str(value);
        }
        out.push('\n');
        pad(out, level);
        out.push('}');
    }
}

/// A whole file holding one record.
pub(crate) fn record_file(record: &DynamicRecord) -> String {
    let mut out = String::new();
    write_record(&mut out, record, 0, false);
    out.push('\n');
    out
}

/// A whole file holding one child list of `owner`, one item per line.
pub(crate) fn list_file(owner: &DynamicRecord, field: &str) -> String {
    let kind = match owner.kind().field(field).map(|f| f.ty) {
        Some(FieldType::Children(kind)) => kind,
        _ => owner.kind(),
    };
    let records = owner
        .get(field)
        .map(|value| child_records(kind, value))
        .unwrap_or_default();
    let mut out = String::new();
    write_list(&mut out, kind, &records, 0, true);
    out.push('\n');
    out
}
