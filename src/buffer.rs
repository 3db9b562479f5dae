use crate::{Row, RowKey, RowValue};
use indexmap::IndexMap;

/// Field overrides for one row. Only fields that differ from the source are kept,
/// except the values pinned by the exclusive toggle.
pub type BufferEntry = Row;

static NULL: RowValue = RowValue::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Stored,
    Removed,
    Unchanged,
}

/// A source field, with a missing field reading as null.
pub fn source_value<'a>(source: &'a Row, field: &str) -> &'a RowValue {
    source.get(field).unwrap_or(&NULL)
}

/// Records `value` as an override of `field`, or drops the override when the value
/// matches the source again.
pub fn reconcile(source: &Row, entry: &mut BufferEntry, field: &str, value: RowValue) -> Reconciled {
    if *source_value(source, field) == value {
        if entry.shift_remove(field).is_some() {
            Reconciled::Removed
        } else {
            Reconciled::Unchanged
        }
    } else if entry.get(field) == Some(&value) {
        Reconciled::Unchanged
    } else {
        entry.insert(field.to_string(), value);
        Reconciled::Stored
    }
}

/// Buffered value over source value.
pub fn effective_value<'a>(source: &'a Row, entry: Option<&'a BufferEntry>, field: &str) -> &'a RowValue {
    entry
        .and_then(|e| e.get(field))
        .unwrap_or_else(|| source_value(source, field))
}

/// Sparse map of pending edits, in the order rows were first edited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditBuffer {
    entries: IndexMap<RowKey, BufferEntry>,
}

impl EditBuffer {
    pub fn get(&self, key: &RowKey) -> Option<&BufferEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Rows with pending edits (not the number of edited fields).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowKey, &BufferEntry)> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &IndexMap<RowKey, BufferEntry> {
        &self.entries
    }

    pub fn remove(&mut self, key: &RowKey) -> Option<BufferEntry> {
        self.entries.shift_remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn retain(&mut self, f: impl FnMut(&RowKey, &mut BufferEntry) -> bool) {
        self.entries.retain(f);
    }

    /// Runs `f` on the row's entry, creating it if needed. An entry left empty is removed.
    pub fn update<R>(&mut self, key: &RowKey, f: impl FnOnce(&mut BufferEntry) -> R) -> R {
        let entry = self.entries.entry(key.clone()).or_default();
        let out = f(entry);
        if entry.is_empty() {
            self.entries.shift_remove(key);
        }
        out
    }
}
