use crate::{Row, RowValue, statics};
use anyhow::{Context, bail};
use flate2::{Compression, GzBuilder, read::GzDecoder};
use std::{
    collections::HashMap,
    fmt, fs,
    io::{Read, Write},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    #[default]
    Json,
    GzipJson,
}

impl SourceFormat {
    pub fn for_path(path: &Path) -> Self {
        if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            SourceFormat::GzipJson
        } else {
            SourceFormat::Json
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => statics::NL_LF,
            LineEnding::CrLf => statics::NL_CRLF,
        }
    }
}

/// Stable identity of a source row: the key field's text plus an occurrence
/// counter for rows that repeat the same text. Unlike a position, it survives
/// resorting and refiltering of the visible rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub text: String,
    pub occurrence: usize,
}

impl RowKey {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            occurrence: 0,
        }
    }

    pub fn nth(text: impl Into<String>, occurrence: usize) -> Self {
        Self {
            text: text.into(),
            occurrence,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.occurrence == 0 {
            f.write_str(&self.text)
        } else {
            write!(f, "{} #{}", self.text, self.occurrence + 1)
        }
    }
}

/// Text form of a row's key field; non-string keys use their compact JSON form.
pub fn key_text(row: &Row, key_field: &str) -> String {
    match row.get(key_field) {
        Some(RowValue::String(s)) => s.clone(),
        Some(RowValue::Null) | None => String::new(),
        Some(other) => other.to_json_compact(),
    }
}

/// Assigns a key to every row in order, counting repeated key texts.
pub fn assign_keys<'a>(rows: impl IntoIterator<Item = &'a Row>, key_field: &str) -> Vec<RowKey> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    rows.into_iter()
        .map(|row| {
            let text = key_text(row, key_field);
            let count = seen.entry(text.clone()).or_insert(0);
            let key = RowKey::nth(text, *count);
            *count += 1;
            key
        })
        .collect()
}

/// The ordered source rows handed to the review table.
/// Rows are never mutated by editing; only the owner replaces them after a commit.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub source_path: Option<PathBuf>,
    pub format: SourceFormat,
    pub line_ending: LineEnding,
    /// Entries dropped while loading because they were null or not objects.
    pub skipped: usize,
    rows: Vec<Row>,
    keys: Vec<RowKey>,
    positions: HashMap<RowKey, usize>,
}

impl RowSet {
    pub fn from_rows(rows: Vec<Row>, key_field: &str) -> Self {
        let keys = assign_keys(&rows, key_field);
        let positions = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();
        Self {
            rows,
            keys,
            positions,
            ..Default::default()
        }
    }

    /// Builds a row set from raw values, skipping null and non-object entries.
    pub fn from_values(values: Vec<RowValue>, key_field: &str) -> Self {
        let mut skipped = 0usize;
        let rows: Vec<Row> = values
            .into_iter()
            .enumerate()
            .filter_map(|(i, v)| match v {
                RowValue::Object(row) => Some(row),
                other => {
                    tracing::warn!(index = i, kind = other.type_name(), "skipping malformed row");
                    skipped += 1;
                    None
                }
            })
            .collect();
        let mut set = Self::from_rows(rows, key_field);
        set.skipped = skipped;
        set
    }

    /// Parses row file text. The root is either an array of rows or an object
    /// holding the array under `rows_field`.
    pub fn parse_text(text: &str, key_field: &str, rows_field: &str) -> anyhow::Result<Self> {
        let mut root = RowValue::parse_json5(text).context("parsing JSON5")?;
        let values = std::mem::take(row_entries(&mut root, rows_field)?);
        Ok(Self::from_values(values, key_field))
    }

    pub fn load_path(path: &Path, key_field: &str, rows_field: &str) -> anyhow::Result<Self> {
        let mut doc = RowDocument::read(path)?;
        let values = std::mem::take(doc.entries_mut(rows_field)?);

        let mut set = Self::from_values(values, key_field);
        set.source_path = Some(path.to_path_buf());
        set.format = doc.format;
        set.line_ending = doc.line_ending;
        tracing::info!(
            path = %path.display(),
            rows = set.len(),
            skipped = set.skipped,
            "loaded rows"
        );
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, key: &RowKey) -> Option<&Row> {
        self.positions.get(key).map(|&i| &self.rows[i])
    }

    pub fn position(&self, key: &RowKey) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowKey, &Row)> {
        self.keys.iter().zip(self.rows.iter())
    }

    /// Replaces rows in place by key, keeping order and identities. Unknown keys are ignored.
    /// Returns how many rows were replaced.
    pub fn replace_rows<'a>(&mut self, rows: impl IntoIterator<Item = (&'a RowKey, &'a Row)>) -> usize {
        let mut replaced = 0usize;
        for (key, row) in rows {
            if let Some(&i) = self.positions.get(key) {
                self.rows[i] = row.clone();
                replaced += 1;
            }
        }
        replaced
    }
}

/// A whole row file: the decoded root plus how it was stored on disk.
/// Writing it back keeps every root key and every entry, malformed ones included.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDocument {
    pub root: RowValue,
    pub format: SourceFormat,
    pub line_ending: LineEnding,
}

impl RowDocument {
    /// An empty array root, for an output file that does not exist yet.
    pub fn empty(format: SourceFormat, line_ending: LineEnding) -> Self {
        Self {
            root: RowValue::Array(Vec::new()),
            format,
            line_ending,
        }
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("reading {path:?}"))?;
        let format = detect_format(path, &bytes);
        let text_bytes = match format {
            SourceFormat::Json => bytes,
            SourceFormat::GzipJson => {
                let mut decoder = GzDecoder::new(&bytes[..]);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out).context("gzip decompress")?;
                out
            }
        };

        let line_ending = detect_line_ending(&text_bytes);
        let text = std::str::from_utf8(&text_bytes).context("row file is not valid UTF-8")?;
        let root = RowValue::parse_json5(text).with_context(|| format!("parsing {path:?}"))?;
        Ok(Self {
            root,
            format,
            line_ending,
        })
    }

    /// The row entries of the document, in file order.
    pub fn entries_mut(&mut self, rows_field: &str) -> anyhow::Result<&mut Vec<RowValue>> {
        row_entries(&mut self.root, rows_field)
    }

    /// Pretty JSON with the document's line ending, gzipped if the document was.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let text = self.root.to_json_pretty_with_newline(self.line_ending.as_str());
        match self.format {
            SourceFormat::Json => Ok(text.into_bytes()),
            SourceFormat::GzipJson => {
                let mut encoder = GzBuilder::new()
                    .mtime(0)
                    .write(Vec::new(), Compression::default());
                encoder.write_all(text.as_bytes()).context("gzip compress")?;
                encoder.finish().context("gzip finish")
            }
        }
    }

    pub fn write_to_path(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path, &bytes).with_context(|| format!("writing {path:?}"))
    }
}

fn row_entries<'a>(root: &'a mut RowValue, rows_field: &str) -> anyhow::Result<&'a mut Vec<RowValue>> {
    match root {
        RowValue::Array(values) => Ok(values),
        RowValue::Object(map) => match map.get_mut(rows_field) {
            Some(RowValue::Array(values)) => Ok(values),
            Some(other) => bail!(
                "expected '{rows_field}' to be an array, found {}",
                other.type_name()
            ),
            None => bail!("root object has no '{rows_field}' array"),
        },
        other => bail!("expected an array of rows, found {}", other.type_name()),
    }
}

fn detect_line_ending(text_bytes: &[u8]) -> LineEnding {
    // Count terminators rather than trusting the first CRLF seen.
    let mut lf_count = 0usize;
    let mut crlf_count = 0usize;

    for (i, b) in text_bytes.iter().enumerate() {
        if *b != b'\n' {
            continue;
        }
        if i > 0 && text_bytes[i - 1] == b'\r' {
            crlf_count += 1;
        } else {
            lf_count += 1;
        }
    }

    if crlf_count > lf_count {
        LineEnding::CrLf
    } else {
        LineEnding::Lf
    }
}

fn detect_format(path: &Path, bytes: &[u8]) -> SourceFormat {
    if SourceFormat::for_path(path) == SourceFormat::GzipJson {
        return SourceFormat::GzipJson;
    }
    // Gzip magic: 1F 8B
    if bytes.len() >= 2 && bytes[0] == 0x1F && bytes[1] == 0x8B {
        return SourceFormat::GzipJson;
    }
    SourceFormat::Json
}

#[cfg(test)]
mod tests {
    use super::{
        LineEnding, RowDocument, RowKey, RowSet, SourceFormat, detect_format, detect_line_ending,
    };
    use crate::{RowValue, statics};
    use std::path::Path;

    #[test]
    fn detect_format_uses_extension_and_magic() {
        let gz_magic = [0x1F_u8, 0x8B_u8, 0x08_u8, 0x00_u8];
        let plain = b"[]\n";

        assert_eq!(
            detect_format(Path::new("rows.json.gz"), plain),
            SourceFormat::GzipJson
        );
        assert_eq!(
            detect_format(Path::new("rows.json"), &gz_magic),
            SourceFormat::GzipJson
        );
        assert_eq!(
            detect_format(Path::new("rows.json5"), plain),
            SourceFormat::Json
        );
    }

    #[test]
    fn detect_line_ending_uses_majority() {
        let mostly_lf = b"[\n  1,\n  2,\r\n  3\n]\n";
        assert_eq!(detect_line_ending(mostly_lf), LineEnding::Lf);

        let mostly_crlf = b"[\r\n  1,\r\n  2,\n  3\r\n]\r\n";
        assert_eq!(detect_line_ending(mostly_crlf), LineEnding::CrLf);
    }

    #[test]
    fn repeated_key_text_gets_occurrence_counter() {
        let set = RowSet::parse_text(
            "[{ original: 'A' }, { original: 'B' }, { original: 'A' }, {}]",
            statics::FIELD_ORIGINAL,
            statics::FIELD_ROWS,
        )
        .unwrap();
        assert_eq!(
            set.keys(),
            &[
                RowKey::new("A"),
                RowKey::new("B"),
                RowKey::nth("A", 1),
                RowKey::new("")
            ]
        );
        assert_eq!(set.position(&RowKey::nth("A", 1)), Some(2));
        assert_eq!(RowKey::nth("A", 1).to_string(), "A #2");
    }

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let set = RowSet::parse_text(
            "{ data: [null, { original: 'X' }, 5, 'y'] }",
            statics::FIELD_ORIGINAL,
            statics::FIELD_ROWS,
        )
        .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.skipped, 3);
        assert!(set.contains(&RowKey::new("X")));
    }

    #[test]
    fn root_must_hold_rows() {
        assert!(RowSet::parse_text("{ rows: [] }", "original", "data").is_err());
        assert!(RowSet::parse_text("{ data: 1 }", "original", "data").is_err());
        assert!(RowSet::parse_text("'text'", "original", "data").is_err());
    }

    #[test]
    fn non_string_key_field_uses_json_text() {
        let set = RowSet::parse_text("[{ id: 7 }]", "id", "data").unwrap();
        assert_eq!(set.keys()[0], RowKey::new("7"));
        assert_eq!(
            set.row(&RowKey::new("7")).and_then(|r| r.get("id")),
            Some(&RowValue::from(7))
        );
    }

    #[test]
    fn document_rewrites_only_the_row_array() {
        let mut doc = RowDocument {
            root: RowValue::parse_json5("{ meta: { run: 3 }, data: [null] }").unwrap(),
            format: SourceFormat::Json,
            line_ending: LineEnding::Lf,
        };
        doc.entries_mut(statics::FIELD_ROWS)
            .unwrap()
            .push(RowValue::parse_json5("{ original: 'A' }").unwrap());

        let text = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert_eq!(
            text,
            "{\n    \"meta\": {\n        \"run\": 3\n    },\n    \"data\": [\n        null,\n        {\n            \"original\": \"A\"\n        }\n    ]\n}\n"
        );
    }
}
