use crate::statics;
use anyhow::Context;
use serde::Deserialize;
use std::{fs, path::Path};

/// How a column's value is rendered when the effective value is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text; missing renders as an empty string.
    Text,
    /// Enumerable/label-like; missing renders as the "N/A" placeholder.
    Label,
    /// Boolean checkbox; missing renders as false.
    Flag,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnSpec {
    pub field: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub editable: bool,
}

impl ColumnSpec {
    fn new(field: &str, label: &str, kind: FieldKind, editable: bool) -> Self {
        Self {
            field: field.to_string(),
            label: label.to_string(),
            kind,
            editable,
        }
    }
}

/// Describes which row fields play which role in review.
/// The defaults match the brush split review table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReviewSchema {
    pub key_field: String,
    pub toggle_field: String,
    pub dependent_fields: Vec<String>,
    pub validated_field: String,
    pub columns: Vec<ColumnSpec>,
    pub provenance_fields: Vec<String>,
    pub rows_field: String,
    pub page_size: usize,
}

impl Default for ReviewSchema {
    fn default() -> Self {
        Self {
            key_field: statics::FIELD_ORIGINAL.to_string(),
            toggle_field: statics::FIELD_SHOULD_NOT_SPLIT.to_string(),
            dependent_fields: vec![
                statics::FIELD_HANDLE.to_string(),
                statics::FIELD_KNOT.to_string(),
            ],
            validated_field: statics::FIELD_VALIDATED.to_string(),
            columns: vec![
                ColumnSpec::new(
                    statics::FIELD_ORIGINAL,
                    statics::EN_COL_ORIGINAL,
                    FieldKind::Label,
                    false,
                ),
                ColumnSpec::new(
                    statics::FIELD_HANDLE,
                    statics::EN_COL_HANDLE,
                    FieldKind::Text,
                    true,
                ),
                ColumnSpec::new(
                    statics::FIELD_KNOT,
                    statics::EN_COL_KNOT,
                    FieldKind::Text,
                    true,
                ),
                ColumnSpec::new(
                    statics::FIELD_VALIDATED,
                    statics::EN_COL_VALIDATED,
                    FieldKind::Flag,
                    true,
                ),
                ColumnSpec::new(
                    statics::FIELD_SHOULD_NOT_SPLIT,
                    statics::EN_COL_SHOULD_NOT_SPLIT,
                    FieldKind::Flag,
                    true,
                ),
                ColumnSpec::new(
                    statics::FIELD_COMMENT_IDS,
                    statics::EN_COL_COMMENTS,
                    FieldKind::Label,
                    false,
                ),
            ],
            provenance_fields: vec![statics::FIELD_COMMENT_IDS.to_string()],
            rows_field: statics::FIELD_ROWS.to_string(),
            page_size: statics::DEFAULT_PAGE_SIZE,
        }
    }
}

impl ReviewSchema {
    pub fn parse_json5(text: &str) -> anyhow::Result<Self> {
        let mut schema: Self = json5::from_str(text).context("parsing review schema")?;
        schema.page_size = schema.page_size.max(1);
        Ok(schema)
    }

    pub fn load_path(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {path:?}"))?;
        Self::parse_json5(&text).with_context(|| format!("loading schema {path:?}"))
    }

    pub fn is_dependent(&self, field: &str) -> bool {
        self.dependent_fields.iter().any(|f| f == field)
    }

    /// Kind of a field per the column list; unknown fields are treated as free text.
    pub fn kind_of(&self, field: &str) -> FieldKind {
        self.columns
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.kind)
            .unwrap_or(FieldKind::Text)
    }

    /// Fields captured in a snapshot when the exclusive toggle turns on.
    pub fn snapshot_fields(&self) -> impl Iterator<Item = &str> {
        self.dependent_fields
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.validated_field.as_str()))
    }
}
