//! The exclusive ("don't split") toggle.
//!
//! Turning the toggle on blanks the dependent fields and marks the row validated,
//! after snapshotting their effective values. Turning it off restores the snapshot.

use crate::buffer::{Reconciled, effective_value, reconcile, source_value};
use crate::display::flag_value;
use crate::session::{EditError, EditSession};
use crate::{Row, RowKey, RowValue};
use std::collections::HashMap;

/// Effective values of the dependent and validated fields captured when the
/// toggle was turned on.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub values: Row,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotTable {
    entries: HashMap<RowKey, Snapshot>,
}

impl SnapshotTable {
    pub fn get(&self, key: &RowKey) -> Option<&Snapshot> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: RowKey, snapshot: Snapshot) {
        self.entries.insert(key, snapshot);
    }

    pub fn remove(&mut self, key: &RowKey) -> Option<Snapshot> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn retain(&mut self, mut f: impl FnMut(&RowKey) -> bool) {
        self.entries.retain(|k, _| f(k));
    }
}

impl EditSession {
    /// Effective value of the toggle field.
    pub fn is_exclusive(&self, key: &RowKey) -> bool {
        self.flag(key, &self.schema.toggle_field)
    }

    /// Turns the exclusive toggle on or off for one row. Setting the current state is a no-op.
    pub fn set_exclusive(&mut self, key: &RowKey, on: bool) -> Result<(), EditError> {
        self.source_row(key)?;
        if self.is_exclusive(key) == on {
            return Ok(());
        }
        if on {
            self.enter_exclusive(key);
        } else {
            self.leave_exclusive(key);
        }
        Ok(())
    }

    /// Applies the toggle to each key individually, e.g. every row on the visible page.
    /// All keys are checked first; nothing changes if one is unknown.
    /// Returns how many rows changed state.
    pub fn set_exclusive_for<'a>(
        &mut self,
        keys: impl IntoIterator<Item = &'a RowKey>,
        on: bool,
    ) -> Result<usize, EditError> {
        let keys: Vec<&RowKey> = keys.into_iter().collect();
        for key in &keys {
            self.source_row(key)?;
        }

        let mut changed = 0usize;
        for key in keys {
            if self.is_exclusive(key) != on {
                self.set_exclusive(key, on)?;
                changed += 1;
            }
        }
        tracing::debug!(changed, on, "bulk exclusive toggle");
        Ok(changed)
    }

    fn enter_exclusive(&mut self, key: &RowKey) {
        let Some(source) = self.source.row(key) else {
            return;
        };
        let entry = self.buffer.get(key);
        let values: Row = self
            .schema
            .snapshot_fields()
            .map(|f| (f.to_string(), effective_value(source, entry, f).clone()))
            .collect();
        self.snapshots.insert(key.clone(), Snapshot { values });

        // One compound update; these values are pinned even where they equal the source.
        let mut writes: Vec<(String, RowValue)> =
            vec![(self.schema.toggle_field.clone(), RowValue::Bool(true))];
        writes.extend(
            self.schema
                .dependent_fields
                .iter()
                .map(|f| (f.clone(), RowValue::String(String::new()))),
        );
        writes.push((self.schema.validated_field.clone(), RowValue::Bool(true)));

        self.buffer.update(key, |entry| {
            for (field, value) in &writes {
                entry.insert(field.clone(), value.clone());
            }
        });
        for (field, value) in writes {
            self.emit(key, &field, Some(value));
        }
    }

    fn leave_exclusive(&mut self, key: &RowKey) {
        let mut restores: Vec<(String, RowValue)> = match self.snapshots.remove(key) {
            Some(snapshot) => snapshot.values.into_iter().collect(),
            None => {
                tracing::warn!(
                    row = %key,
                    "no snapshot for exclusive row; dependent fields are not restored"
                );
                Vec::new()
            }
        };
        let Some(source) = self.source.row(key) else {
            return;
        };

        // A missing or false source toggle reads as off, so the override simply goes away.
        let toggle = self.schema.toggle_field.clone();
        let toggle_source = source_value(source, &toggle);
        let toggle_off = if flag_value(toggle_source) {
            RowValue::Bool(false)
        } else {
            toggle_source.clone()
        };
        restores.push((toggle, toggle_off));

        let outcomes: Vec<(String, Reconciled, RowValue)> = self.buffer.update(key, |entry| {
            restores
                .into_iter()
                .map(|(field, value)| {
                    let outcome = reconcile(source, entry, &field, value.clone());
                    (field, outcome, value)
                })
                .collect()
        });

        for (field, outcome, value) in outcomes {
            match outcome {
                Reconciled::Stored => self.emit(key, &field, Some(value)),
                Reconciled::Removed => self.emit(key, &field, None),
                Reconciled::Unchanged => {}
            }
        }
    }
}
