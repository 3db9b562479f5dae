use crate::buffer::{BufferEntry, EditBuffer, Reconciled, effective_value, reconcile, source_value};
use crate::commit::CommitState;
use crate::display;
use crate::exclusive::SnapshotTable;
use crate::{ReviewSchema, Row, RowKey, RowSet, RowValue};
use indexmap::IndexMap;
use std::borrow::Cow;

/// A change to the edit buffer. `value: None` means the override was removed
/// and the field shows its source value again.
#[derive(Debug, Clone, PartialEq)]
pub struct EditEvent {
    pub key: RowKey,
    pub field: String,
    pub value: Option<RowValue>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("no row with key '{0}'")]
    UnknownRow(RowKey),
    #[error("'{field}' is locked while '{toggle}' is set on row '{key}'")]
    FieldLocked {
        key: RowKey,
        field: String,
        toggle: String,
    },
    #[error("'{field}' expects a bool, got {found}")]
    ExpectedBool { field: String, found: &'static str },
}

type Observer = Box<dyn FnMut(&EditEvent)>;

/// Pending edits layered over one set of source rows.
///
/// The source rows are only read while editing and committing. The buffer, the
/// snapshot table and the commit lifecycle are private to one session.
pub struct EditSession {
    pub(crate) schema: ReviewSchema,
    pub(crate) source: RowSet,
    pub(crate) buffer: EditBuffer,
    pub(crate) snapshots: SnapshotTable,
    pub(crate) commit_state: CommitState,
    pub(crate) in_flight: IndexMap<RowKey, Row>,
    pub(crate) next_commit_id: u64,
    observer: Option<Observer>,
}

impl EditSession {
    pub fn new(source: RowSet, schema: ReviewSchema) -> Self {
        Self {
            schema,
            source,
            buffer: EditBuffer::default(),
            snapshots: SnapshotTable::default(),
            commit_state: CommitState::Idle,
            in_flight: IndexMap::new(),
            next_commit_id: 1,
            observer: None,
        }
    }

    /// Receives every buffer change, e.g. to mirror edits elsewhere.
    pub fn set_observer(&mut self, observer: impl FnMut(&EditEvent) + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn schema(&self) -> &ReviewSchema {
        &self.schema
    }

    pub fn source(&self) -> &RowSet {
        &self.source
    }

    pub fn buffer(&self) -> &EditBuffer {
        &self.buffer
    }

    pub fn snapshots(&self) -> &SnapshotTable {
        &self.snapshots
    }

    pub(crate) fn source_row(&self, key: &RowKey) -> Result<&Row, EditError> {
        self.source
            .row(key)
            .ok_or_else(|| EditError::UnknownRow(key.clone()))
    }

    pub(crate) fn emit(&mut self, key: &RowKey, field: &str, value: Option<RowValue>) {
        tracing::debug!(row = %key, field, removed = value.is_none(), "buffer changed");
        if let Some(observer) = self.observer.as_mut() {
            observer(&EditEvent {
                key: key.clone(),
                field: field.to_string(),
                value,
            });
        }
    }

    /// Sets one field of a row. A value equal to the source removes the override.
    /// The toggle field is routed through the exclusive toggle.
    pub fn set_field(
        &mut self,
        key: &RowKey,
        field: &str,
        value: RowValue,
    ) -> Result<(), EditError> {
        if field == self.schema.toggle_field {
            let on = value.as_bool().ok_or_else(|| EditError::ExpectedBool {
                field: field.to_string(),
                found: value.type_name(),
            })?;
            return self.set_exclusive(key, on);
        }

        if self.schema.is_dependent(field) && self.is_exclusive(key) {
            return Err(EditError::FieldLocked {
                key: key.clone(),
                field: field.to_string(),
                toggle: self.schema.toggle_field.clone(),
            });
        }

        let source = self
            .source
            .row(key)
            .ok_or_else(|| EditError::UnknownRow(key.clone()))?;
        let stored = value.clone();
        let outcome = self
            .buffer
            .update(key, |entry| reconcile(source, entry, field, value));

        match outcome {
            Reconciled::Stored => self.emit(key, field, Some(stored)),
            Reconciled::Removed => self.emit(key, field, None),
            Reconciled::Unchanged => {}
        }
        Ok(())
    }

    /// Effective value of a field, or `None` for an unknown row.
    pub fn get_field(&self, key: &RowKey, field: &str) -> Option<&RowValue> {
        let source = self.source.row(key)?;
        Some(effective_value(source, self.buffer.get(key), field))
    }

    /// Display text for a cell, with the column's fallback for missing values.
    pub fn display(&self, key: &RowKey, field: &str) -> Option<Cow<'_, str>> {
        let value = self.get_field(key, field)?;
        Some(display::display_value(value, self.schema.kind_of(field)))
    }

    pub fn flag(&self, key: &RowKey, field: &str) -> bool {
        self.get_field(key, field).is_some_and(display::flag_value)
    }

    /// Rows with pending edits.
    pub fn unsaved_count(&self) -> usize {
        self.buffer.len()
    }

    /// Buffered overrides for one row, if it has any.
    pub fn entry(&self, key: &RowKey) -> Option<&BufferEntry> {
        self.buffer.get(key)
    }

    pub fn is_edited(&self, key: &RowKey) -> bool {
        self.buffer.contains(key)
    }

    pub fn is_field_edited(&self, key: &RowKey, field: &str) -> bool {
        self.buffer
            .get(key)
            .is_some_and(|entry| entry.contains_key(field))
    }

    /// Drops all pending edits and snapshots.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.snapshots.clear();
    }

    /// Drops one row's pending edits and snapshot. Returns whether anything was dropped.
    pub fn revert_row(&mut self, key: &RowKey) -> bool {
        self.snapshots.remove(key);
        let Some(entry) = self.buffer.remove(key) else {
            return false;
        };
        for field in entry.keys() {
            self.emit(key, field, None);
        }
        true
    }

    /// Scalar references held in the row's provenance fields, as `(field, reference)`.
    /// Null and empty entries are skipped.
    pub fn provenance(&self, key: &RowKey) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for field in &self.schema.provenance_fields {
            let Some(value) = self.get_field(key, field) else {
                continue;
            };
            let items: Vec<&RowValue> = match value {
                RowValue::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for item in items.into_iter().filter(|item| !item.is_blank()) {
                let text = match item {
                    RowValue::String(s) => s.clone(),
                    other => other.to_json_compact(),
                };
                out.push((field.clone(), text));
            }
        }
        out
    }

    /// Swaps in new source rows. Edits on rows that disappeared are dropped and the
    /// remaining entries are reconciled against the new rows.
    pub fn replace_source(&mut self, source: RowSet) {
        self.source = source;
        self.rebase();
    }

    /// Folds rows the owner has persisted into the session's source rows.
    pub fn fold_committed<'a>(&mut self, rows: impl IntoIterator<Item = (&'a RowKey, &'a Row)>) {
        let replaced = self.source.replace_rows(rows);
        tracing::debug!(replaced, "folded committed rows into source");
        self.rebase();
    }

    fn rebase(&mut self) {
        let source = &self.source;
        let snapshots = &mut self.snapshots;
        self.buffer.retain(|key, entry| {
            let Some(row) = source.row(key) else {
                snapshots.remove(key);
                return false;
            };
            // Exclusive entries are pinned until the toggle is turned off.
            if snapshots.contains(key) {
                return true;
            }
            entry.retain(|field, value| *source_value(row, field) != *value);
            !entry.is_empty()
        });
        let buffer = &self.buffer;
        self.snapshots.retain(|key| buffer.contains(key));
    }
}

#[cfg(test)]
mod tests {
    use super::{EditError, EditEvent, EditSession};
    use crate::{ReviewSchema, RowKey, RowSet, RowValue, statics};
    use std::{cell::RefCell, rc::Rc};

    fn session(text: &str) -> EditSession {
        let schema = ReviewSchema::default();
        let rows = RowSet::parse_text(text, &schema.key_field, &schema.rows_field).unwrap();
        EditSession::new(rows, schema)
    }

    #[test]
    fn unknown_row_is_an_error_and_reads_as_none() {
        let mut s = session("[{ original: 'A', handle: '' }]");
        let missing = RowKey::new("B");
        assert_eq!(
            s.set_field(&missing, statics::FIELD_HANDLE, RowValue::from("x")),
            Err(EditError::UnknownRow(missing.clone()))
        );
        assert_eq!(s.get_field(&missing, statics::FIELD_HANDLE), None);
    }

    #[test]
    fn toggle_field_requires_bool() {
        let mut s = session("[{ original: 'A' }]");
        let err = s
            .set_field(
                &RowKey::new("A"),
                statics::FIELD_SHOULD_NOT_SPLIT,
                RowValue::from("yes"),
            )
            .unwrap_err();
        assert!(matches!(err, EditError::ExpectedBool { found: "string", .. }));
    }

    #[test]
    fn observer_sees_stores_and_removals() {
        let mut s = session("[{ original: 'A', handle: '' }]");
        let seen: Rc<RefCell<Vec<EditEvent>>> = Rc::default();
        let sink = Rc::clone(&seen);
        s.set_observer(move |e| sink.borrow_mut().push(e.clone()));

        let key = RowKey::new("A");
        s.set_field(&key, statics::FIELD_HANDLE, RowValue::from("Simpson"))
            .unwrap();
        s.set_field(&key, statics::FIELD_HANDLE, RowValue::from("Simpson"))
            .unwrap();
        s.set_field(&key, statics::FIELD_HANDLE, RowValue::from(""))
            .unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].value, Some(RowValue::from("Simpson")));
        assert_eq!(seen[1].value, None);
    }

    #[test]
    fn revert_row_drops_entry_and_snapshot() {
        let mut s = session("[{ original: 'A', handle: 'H', knot: 'K' }]");
        let key = RowKey::new("A");
        s.set_exclusive(&key, true).unwrap();
        assert!(s.snapshots().contains(&key));

        assert!(s.revert_row(&key));
        assert_eq!(s.unsaved_count(), 0);
        assert!(s.snapshots().is_empty());
        assert_eq!(
            s.get_field(&key, statics::FIELD_HANDLE),
            Some(&RowValue::from("H"))
        );
        assert!(!s.revert_row(&key));
    }

    #[test]
    fn display_uses_column_fallbacks() {
        let s = session("[{ original: 'A', handle: null, comment_ids: null }]");
        let key = RowKey::new("A");
        assert_eq!(s.display(&key, statics::FIELD_HANDLE).as_deref(), Some(""));
        assert_eq!(
            s.display(&key, statics::FIELD_COMMENT_IDS).as_deref(),
            Some(statics::EN_PLACEHOLDER_NA)
        );
        assert_eq!(
            s.display(&key, statics::FIELD_VALIDATED).as_deref(),
            Some("false")
        );
    }

    #[test]
    fn provenance_lists_scalar_references() {
        let s = session("[{ original: 'A', comment_ids: ['c1', 42, null, ''] }]");
        assert_eq!(
            s.provenance(&RowKey::new("A")),
            vec![
                ("comment_ids".to_string(), "c1".to_string()),
                ("comment_ids".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn replace_source_drops_vanished_rows_and_matching_fields() {
        let mut s = session("[{ original: 'A', handle: '' }, { original: 'B', handle: '' }]");
        let a = RowKey::new("A");
        let b = RowKey::new("B");
        s.set_field(&a, statics::FIELD_HANDLE, RowValue::from("Simpson"))
            .unwrap();
        s.set_field(&b, statics::FIELD_HANDLE, RowValue::from("Omega"))
            .unwrap();

        let schema = ReviewSchema::default();
        let next = RowSet::parse_text(
            "[{ original: 'A', handle: 'Simpson' }]",
            &schema.key_field,
            &schema.rows_field,
        )
        .unwrap();
        s.replace_source(next);

        assert_eq!(s.unsaved_count(), 0);
        assert_eq!(
            s.get_field(&a, statics::FIELD_HANDLE),
            Some(&RowValue::from("Simpson"))
        );
    }
}
