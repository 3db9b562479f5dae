//! Core library for Match Review.
//! Buffers per-row edits over immutable match results, handles the exclusive
//! ("don't split") toggle with exact restore, and commits validated rows to a sink.

pub mod buffer;
pub mod commit;
pub mod display;
pub mod exclusive;
mod gui;
pub mod rows;
pub mod schema;
mod session;
pub mod statics;
pub mod value;
pub mod view;

pub use commit::{
    CommitError, CommitOutcome, CommitSink, CommitStart, CommitState, CommittedRow, FileSink,
    PendingCommit, build_commit_payload,
};
pub use gui::{GuiOptions, run_gui};
pub use rows::{RowKey, RowSet};
pub use schema::{FieldKind, ReviewSchema};
pub use session::{EditError, EditEvent, EditSession};
pub use value::{Row, RowNumber, RowValue};
