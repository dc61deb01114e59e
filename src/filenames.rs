//! Glyph name to file name conversion.
//!
//! Follows the UFO user-name-to-file-name convention: names stay readable
//! and distinct on case-insensitive filesystems. Not reversible.

fn ok_for_filenames(c: char) -> bool {
    !matches!(
        c,
        '\u{0}'..='\u{1f}'
            | '\u{7f}'
            | '"'
            | '*'
            | '+'
            | '/'
            | ':'
            | '<'
            | '>'
            | '?'
            | '['
            | '\\'
            | ']'
            | '|'
    )
}

/// Is the part of the name before the first `.` reserved on Windows?
fn scary_for_windows(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    matches!(
        stem.to_ascii_uppercase().as_str(),
        "CON"
            | "PRN"
            | "AUX"
            | "CLOCK$"
            | "NUL"
            | "COM1"
            | "COM2"
            | "COM3"
            | "COM4"
            | "COM5"
            | "COM6"
            | "COM7"
            | "COM8"
            | "COM9"
            | "LPT1"
            | "LPT2"
            | "LPT3"
            | "LPT4"
            | "LPT5"
            | "LPT6"
            | "LPT7"
            | "LPT8"
            | "LPT9"
    )
}

/// Converts a glyph name into a base file name (without extension).
pub fn user_name_to_file_name(name: &str) -> String {
    let mut filename = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        filename.push(if ok_for_filenames(ch) { ch } else { '_' });
        if ch == '_' || ch.is_uppercase() {
            filename.push('_');
        }
    }
    if filename.starts_with('.') {
        filename.replace_range(..1, "_");
    }
    if scary_for_windows(&filename) {
        filename.insert(0, '_');
    }
    filename
}
