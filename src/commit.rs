//! Bulk commit of buffered edits.
//!
//! A commit merges every source row with its buffered entry, keeps rows that were
//! edited or already validated, and hands them to a sink. The buffer is only
//! cleared once the sink acknowledges; a failed commit keeps every edit.

use crate::buffer::EditBuffer;
use crate::rows::{LineEnding, RowDocument, SourceFormat, key_text};
use crate::session::EditSession;
use crate::{Row, RowKey, RowNumber, RowSet, RowValue, statics};
use anyhow::{Context, bail};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A merged row emitted by a commit, with `validated` forced true.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedRow {
    pub key: RowKey,
    pub row: Row,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CommitState {
    #[default]
    Idle,
    Pending {
        id: u64,
        rows: usize,
    },
    Failed {
        id: u64,
        message: String,
    },
}

/// A commit that has been started and is waiting for the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommit {
    pub id: u64,
    pub rows: Vec<CommittedRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitStart {
    /// Nothing was edited or validated; the sink must not be invoked.
    Empty,
    Pending(PendingCommit),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Empty,
    Acknowledged {
        rows: usize,
        /// Rows edited again while the commit was pending.
        still_unsaved: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("commit {0} is still pending")]
    InFlight(u64),
    #[error("no pending commit with id {0}")]
    UnknownCommit(u64),
    #[error("persisting {rows} rows failed")]
    Persist {
        rows: usize,
        #[source]
        source: anyhow::Error,
    },
}

/// Receives committed rows. Returning an error leaves the edits buffered.
pub trait CommitSink {
    fn persist(&mut self, rows: &[CommittedRow]) -> anyhow::Result<()>;
}

impl<F> CommitSink for F
where
    F: FnMut(&[CommittedRow]) -> anyhow::Result<()>,
{
    fn persist(&mut self, rows: &[CommittedRow]) -> anyhow::Result<()> {
        self(rows)
    }
}

/// Merges source rows with their entries and keeps those that were edited or
/// already validated. Reads the source only.
pub fn build_commit_payload(
    source: &RowSet,
    buffer: &EditBuffer,
    validated_field: &str,
) -> Vec<CommittedRow> {
    source
        .iter()
        .filter_map(|(key, row)| {
            let entry = buffer.get(key).filter(|e| !e.is_empty());
            let already_validated = row
                .get(validated_field)
                .and_then(RowValue::as_bool)
                .unwrap_or(false);
            if entry.is_none() && !already_validated {
                return None;
            }

            let mut merged = row.clone();
            if let Some(entry) = entry {
                for (field, value) in entry {
                    merged.insert(field.clone(), value.clone());
                }
            }
            merged.insert(validated_field.to_string(), RowValue::Bool(true));
            Some(CommittedRow {
                key: key.clone(),
                row: merged,
            })
        })
        .collect()
}

impl EditSession {
    pub fn commit_state(&self) -> &CommitState {
        &self.commit_state
    }

    /// Builds the payload and moves to `Pending`. An empty payload clears the
    /// buffer and snapshot table and returns `CommitStart::Empty`.
    pub fn begin_commit(&mut self) -> Result<CommitStart, CommitError> {
        if let CommitState::Pending { id, .. } = self.commit_state {
            return Err(CommitError::InFlight(id));
        }

        let rows = build_commit_payload(&self.source, &self.buffer, &self.schema.validated_field);
        if rows.is_empty() {
            self.clear();
            self.commit_state = CommitState::Idle;
            tracing::info!("commit skipped: nothing edited or validated");
            return Ok(CommitStart::Empty);
        }

        let id = self.next_commit_id;
        self.next_commit_id += 1;
        self.in_flight = self.buffer.entries().clone();
        self.commit_state = CommitState::Pending {
            id,
            rows: rows.len(),
        };
        tracing::info!(id, rows = rows.len(), edited = self.in_flight.len(), "commit started");
        Ok(CommitStart::Pending(PendingCommit { id, rows }))
    }

    /// The sink stored the payload. Entries unchanged since the commit began are
    /// dropped along with their snapshots; later edits stay buffered.
    pub fn acknowledge(&mut self, id: u64) -> Result<CommitOutcome, CommitError> {
        let rows = match self.commit_state {
            CommitState::Pending { id: pending, rows } if pending == id => rows,
            _ => return Err(CommitError::UnknownCommit(id)),
        };

        for (key, committed) in std::mem::take(&mut self.in_flight) {
            if self.buffer.get(&key) == Some(&committed) {
                self.buffer.remove(&key);
                self.snapshots.remove(&key);
            }
        }
        let buffer = &self.buffer;
        self.snapshots.retain(|key| buffer.contains(key));
        self.commit_state = CommitState::Idle;

        let still_unsaved = self.buffer.len();
        tracing::info!(id, rows, still_unsaved, "commit acknowledged");
        Ok(CommitOutcome::Acknowledged {
            rows,
            still_unsaved,
        })
    }

    /// The sink failed. Every edit stays buffered so the commit can be retried.
    pub fn fail(&mut self, id: u64, message: impl Into<String>) -> Result<(), CommitError> {
        match self.commit_state {
            CommitState::Pending { id: pending, .. } if pending == id => {}
            _ => return Err(CommitError::UnknownCommit(id)),
        }
        let message = message.into();
        tracing::warn!(id, %message, "commit failed");
        self.in_flight.clear();
        self.commit_state = CommitState::Failed { id, message };
        Ok(())
    }

    /// Runs a whole commit against a synchronous sink.
    pub fn commit(&mut self, sink: &mut impl CommitSink) -> Result<CommitOutcome, CommitError> {
        self.run_commit(sink).map(|(outcome, _)| outcome)
    }

    /// Runs a whole commit, then folds the persisted rows into the source rows so
    /// reads show what the sink now holds.
    pub fn commit_and_fold(
        &mut self,
        sink: &mut impl CommitSink,
    ) -> Result<CommitOutcome, CommitError> {
        let (outcome, rows) = self.run_commit(sink)?;
        if !rows.is_empty() {
            self.fold_committed(rows.iter().map(|c| (&c.key, &c.row)));
        }
        Ok(outcome)
    }

    fn run_commit(
        &mut self,
        sink: &mut impl CommitSink,
    ) -> Result<(CommitOutcome, Vec<CommittedRow>), CommitError> {
        let pending = match self.begin_commit()? {
            CommitStart::Empty => return Ok((CommitOutcome::Empty, Vec::new())),
            CommitStart::Pending(pending) => pending,
        };

        match sink.persist(&pending.rows) {
            Ok(()) => {
                let outcome = self.acknowledge(pending.id)?;
                Ok((outcome, pending.rows))
            }
            Err(source) => {
                self.fail(pending.id, format!("{source:#}"))?;
                Err(CommitError::Persist {
                    rows: pending.rows.len(),
                    source,
                })
            }
        }
    }
}

/// Persists committed rows into a row file, replacing rows with the same key
/// and appending new ones. The rest of the file is written back untouched.
///
/// Rows whose key text repeats in the source carry `occurrence_field`, so the
/// second "Simpson" row is never mistaken for the first.
#[derive(Debug, Clone)]
pub struct FileSink {
    pub path: PathBuf,
    pub key_field: String,
    pub rows_field: String,
    pub occurrence_field: String,
    /// Used when the output file does not exist yet; an existing file keeps its own.
    pub line_ending: LineEnding,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, key_field: &str, rows_field: &str) -> Self {
        Self {
            path: path.into(),
            key_field: key_field.to_string(),
            rows_field: rows_field.to_string(),
            occurrence_field: statics::FIELD_KEY_OCCURRENCE.to_string(),
            line_ending: LineEnding::Lf,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_document(&self) -> anyhow::Result<RowDocument> {
        if !self.path.exists() {
            return Ok(RowDocument::empty(
                SourceFormat::for_path(&self.path),
                self.line_ending,
            ));
        }
        RowDocument::read(&self.path)
            .with_context(|| format!("reading existing output {:?}", self.path))
    }

    fn persisted_key(&self, row: &Row) -> RowKey {
        let occurrence = match row.get(&self.occurrence_field) {
            Some(RowValue::Number(n)) => n.as_i64().and_then(|n| usize::try_from(n).ok()),
            _ => None,
        };
        RowKey::nth(key_text(row, &self.key_field), occurrence.unwrap_or(0))
    }

    fn persisted_row(&self, committed: &CommittedRow) -> Row {
        let mut row = committed.row.clone();
        let occurrence = committed.key.occurrence;
        if occurrence > 0 || row.contains_key(&self.occurrence_field) {
            row.insert(
                self.occurrence_field.clone(),
                RowValue::Number(RowNumber::U64(occurrence as u64)),
            );
        }
        row
    }
}

impl CommitSink for FileSink {
    fn persist(&mut self, rows: &[CommittedRow]) -> anyhow::Result<()> {
        let mut doc = self.load_document()?;
        let entries = doc.entries_mut(&self.rows_field)?;

        let mut index: HashMap<RowKey, usize> = HashMap::new();
        let mut ambiguous: HashSet<String> = HashSet::new();
        for (i, entry) in entries.iter().enumerate() {
            let RowValue::Object(row) = entry else {
                continue;
            };
            let key = self.persisted_key(row);
            if index.contains_key(&key) {
                ambiguous.insert(key.text);
            } else {
                index.insert(key, i);
            }
        }
        if let Some(clash) = rows.iter().find(|c| ambiguous.contains(&c.key.text)) {
            bail!(
                "{:?} holds several rows keyed '{}' without {}; refusing to guess which to replace",
                self.path,
                clash.key.text,
                self.occurrence_field
            );
        }

        let mut appended = 0usize;
        for committed in rows {
            let row = RowValue::Object(self.persisted_row(committed));
            match index.get(&committed.key) {
                Some(&i) => entries[i] = row,
                None => {
                    entries.push(row);
                    appended += 1;
                }
            }
        }
        let total = entries.len();

        doc.write_to_path(&self.path)?;
        tracing::info!(
            path = %self.path.display(),
            committed = rows.len(),
            appended,
            total,
            "wrote committed rows"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CommitError, CommitOutcome, CommitStart, CommitState, CommittedRow};
    use crate::{EditSession, ReviewSchema, RowKey, RowSet, RowValue, statics};
    use pretty_assertions::assert_eq;

    fn session(text: &str) -> EditSession {
        let schema = ReviewSchema::default();
        let rows = RowSet::parse_text(text, &schema.key_field, &schema.rows_field).unwrap();
        EditSession::new(rows, schema)
    }

    #[test]
    fn second_begin_while_pending_is_rejected() {
        let mut s = session("[{ original: 'A', validated: true }]");
        let CommitStart::Pending(p) = s.begin_commit().unwrap() else {
            panic!("expected a pending commit");
        };
        assert!(matches!(s.begin_commit(), Err(CommitError::InFlight(id)) if id == p.id));
        s.acknowledge(p.id).unwrap();
        assert_eq!(s.commit_state(), &CommitState::Idle);
    }

    #[test]
    fn edits_during_pending_window_survive_acknowledge() {
        let mut s = session("[{ original: 'A', handle: '' }, { original: 'B', handle: '' }]");
        let a = RowKey::new("A");
        let b = RowKey::new("B");
        s.set_field(&a, statics::FIELD_HANDLE, RowValue::from("Simpson"))
            .unwrap();

        let CommitStart::Pending(p) = s.begin_commit().unwrap() else {
            panic!("expected a pending commit");
        };
        s.set_field(&b, statics::FIELD_HANDLE, RowValue::from("Omega"))
            .unwrap();

        let outcome = s.acknowledge(p.id).unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Acknowledged {
                rows: 1,
                still_unsaved: 1
            }
        );
        assert!(s.is_edited(&b));
        assert!(!s.is_edited(&a));
    }

    #[test]
    fn row_changed_again_during_pending_window_stays_buffered() {
        let mut s = session("[{ original: 'A', handle: '' }]");
        let a = RowKey::new("A");
        s.set_field(&a, statics::FIELD_HANDLE, RowValue::from("Simpson"))
            .unwrap();
        let CommitStart::Pending(p) = s.begin_commit().unwrap() else {
            panic!("expected a pending commit");
        };
        s.set_field(&a, statics::FIELD_HANDLE, RowValue::from("Simpsons"))
            .unwrap();
        s.acknowledge(p.id).unwrap();
        assert_eq!(s.unsaved_count(), 1);
    }

    #[test]
    fn failed_sink_keeps_edits_and_allows_retry() {
        let mut s = session("[{ original: 'A', handle: '' }]");
        let a = RowKey::new("A");
        s.set_field(&a, statics::FIELD_HANDLE, RowValue::from("Simpson"))
            .unwrap();

        let mut failing = |_: &[CommittedRow]| -> anyhow::Result<()> { anyhow::bail!("offline") };
        let err = s.commit(&mut failing).unwrap_err();
        assert!(matches!(err, CommitError::Persist { rows: 1, .. }));
        assert!(matches!(
            s.commit_state(),
            CommitState::Failed { message, .. } if message == "offline"
        ));
        assert_eq!(s.unsaved_count(), 1);

        let mut saved = Vec::new();
        let mut ok = |rows: &[CommittedRow]| -> anyhow::Result<()> {
            saved.extend_from_slice(rows);
            Ok(())
        };
        s.commit(&mut ok).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(s.unsaved_count(), 0);
        assert_eq!(s.commit_state(), &CommitState::Idle);
    }

    #[test]
    fn stale_ids_are_rejected() {
        let mut s = session("[{ original: 'A', validated: true }]");
        assert!(matches!(s.acknowledge(7), Err(CommitError::UnknownCommit(7))));
        assert!(matches!(s.fail(7, "x"), Err(CommitError::UnknownCommit(7))));
    }

    #[test]
    fn commit_and_fold_shows_committed_values_as_source() {
        let mut s = session("[{ original: 'A', handle: '', validated: false }, { original: 'B' }]");
        let a = RowKey::new("A");
        s.set_field(&a, statics::FIELD_HANDLE, RowValue::from("Simpson"))
            .unwrap();

        let mut ok = |_: &[CommittedRow]| -> anyhow::Result<()> { Ok(()) };
        let outcome = s.commit_and_fold(&mut ok).unwrap();
        assert_eq!(
            outcome,
            CommitOutcome::Acknowledged {
                rows: 1,
                still_unsaved: 0
            }
        );
        let row = s.source().row(&a).unwrap();
        assert_eq!(row.get(statics::FIELD_HANDLE), Some(&RowValue::from("Simpson")));
        assert_eq!(row.get(statics::FIELD_VALIDATED), Some(&RowValue::Bool(true)));
        assert_eq!(s.get_field(&a, statics::FIELD_HANDLE), Some(&RowValue::from("Simpson")));
        assert!(!s.is_edited(&a));
    }

    #[test]
    fn commit_and_fold_leaves_source_alone_when_sink_fails() {
        let mut s = session("[{ original: 'A', handle: '' }]");
        let a = RowKey::new("A");
        s.set_field(&a, statics::FIELD_HANDLE, RowValue::from("Simpson"))
            .unwrap();

        let mut failing = |_: &[CommittedRow]| -> anyhow::Result<()> { anyhow::bail!("disk full") };
        assert!(s.commit_and_fold(&mut failing).is_err());
        assert_eq!(
            s.source().row(&a).and_then(|r| r.get(statics::FIELD_HANDLE)),
            Some(&RowValue::from(""))
        );
        assert!(s.is_edited(&a));
    }
}
