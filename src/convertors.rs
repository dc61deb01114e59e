/// The `.babelfont` package format: a directory of JSON partitions with one
/// file per glyph
pub mod nfsf;
