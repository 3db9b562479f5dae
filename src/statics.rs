// Central place for UI strings, default field names and other non-localized constants.
// Keep these out of gui.rs to reduce duplication and make tweaks safer.

// English UI strings (EN_ prefix to make future localization easier)
pub const EN_APP_TITLE: &str = "Match Review";

pub const EN_BTN_OPEN: &str = "Open...";
pub const EN_BTN_SAVE: &str = "Save";
pub const EN_BTN_SAVE_TO: &str = "Save To...";
pub const EN_BTN_TOGGLE_THEME: &str = "Theme";
pub const EN_BTN_REVERT: &str = "Revert";
pub const EN_BTN_RETRY: &str = "Retry";
pub const EN_BTN_PREV_PAGE: &str = "<- Prev";
pub const EN_BTN_NEXT_PAGE: &str = "Next ->";

pub const EN_HOME_HEADING: &str = "Match Review";
pub const EN_HOME_INSTRUCTIONS: &str = "Open a match results file (.json/.json5/.gz) to begin.";

pub const EN_LABEL_SEARCH: &str = "Filter:";
pub const EN_HINT_SEARCH: &str = "original text";
pub const EN_CHECKBOX_HIDE_VALIDATED: &str = "Hide validated";
pub const EN_LABEL_SORT: &str = "Sort:";
pub const EN_SORT_SOURCE: &str = "Source order";
pub const EN_SORT_ASC: &str = "A-Z";
pub const EN_SORT_DESC: &str = "Z-A";
pub const EN_LABEL_PAGE: &str = "Page";
pub const EN_LABEL_ROWS: &str = "rows";
pub const EN_SELECT_ALL_PAGE: &str = "all";

pub const EN_UNSAVED_ONE: &str = "1 unsaved change";
pub const EN_UNSAVED_MANY_SUFFIX: &str = "unsaved changes";
pub const EN_NO_ROWS: &str = "No rows match the current filter.";
pub const EN_COMMIT_EMPTY: &str = "Nothing to save.";
pub const EN_COMMIT_SAVED_PREFIX: &str = "Saved rows:";
pub const EN_COMMIT_FAILED_PREFIX: &str = "Save failed:";
pub const EN_COMMIT_PENDING: &str = "Saving...";
pub const EN_ERR_NO_OUTPUT: &str = "No output file selected";

pub const EN_WINDOW_DETAILS: &str = "Reference";
pub const EN_DETAILS_ROW: &str = "Row:";
pub const EN_DETAILS_FIELD: &str = "Field:";
pub const EN_DETAILS_REF: &str = "Reference:";

// Placeholder for label-like cells whose value is missing.
pub const EN_PLACEHOLDER_NA: &str = "N/A";
pub const EN_EMPTY: &str = "";
pub const EN_BADGE_EDITED: &str = "*";

// Newline constants (used for output formatting; keep out of rows/value code).
pub const NL_LF: &str = "\n";
pub const NL_CRLF: &str = "\r\n";

// Default row field names produced by the matching pipeline.
pub const FIELD_ORIGINAL: &str = "original";
pub const FIELD_HANDLE: &str = "handle";
pub const FIELD_KNOT: &str = "knot";
pub const FIELD_VALIDATED: &str = "validated";
pub const FIELD_SHOULD_NOT_SPLIT: &str = "should_not_split";
pub const FIELD_COMMENT_IDS: &str = "comment_ids";

// Root key holding the row array when a file's root is an object.
pub const FIELD_ROWS: &str = "data";

// Written into output rows whose key text repeats in the source, so the row can be found again.
pub const FIELD_KEY_OCCURRENCE: &str = "key_occurrence";

pub const DEFAULT_PAGE_SIZE: usize = 50;

// Default column labels.
pub const EN_COL_ORIGINAL: &str = "Original";
pub const EN_COL_HANDLE: &str = "Handle";
pub const EN_COL_KNOT: &str = "Knot";
pub const EN_COL_VALIDATED: &str = "Validated";
pub const EN_COL_SHOULD_NOT_SPLIT: &str = "Don't Split";
pub const EN_COL_COMMENTS: &str = "Comments";
pub const EN_COL_ACTIONS: &str = "";
