use crate::commit::{CommitOutcome, CommitState, FileSink};
use crate::schema::{ColumnSpec, FieldKind};
use crate::view::{Pagination, SortOrder, ViewFilter, visible_keys};
use crate::{EditSession, ReviewSchema, RowKey, RowSet, RowValue, statics};
use eframe::egui;
use egui_extras::{Column, TableBuilder};
use std::{collections::HashMap, path::PathBuf};

/// Startup options for the review window.
#[derive(Debug, Clone, Default)]
pub struct GuiOptions {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub schema: ReviewSchema,
}

pub fn run_gui(options: GuiOptions) -> eframe::Result {
    let native = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 900.0]),
        ..Default::default()
    };
    let title = format!("{} {}", statics::EN_APP_TITLE, env!("CARGO_PKG_VERSION"));
    eframe::run_native(
        &title,
        native,
        Box::new(move |_cc| {
            let mut app = ReviewApp {
                pagination: Pagination::new(options.schema.page_size),
                schema: options.schema,
                output_path: options.output,
                theme_dark: true,
                ..Default::default()
            };
            if let Some(path) = options.input {
                app.load_rows(path);
            }
            Ok(Box::new(app))
        }),
    )
}

/// Edits collected while drawing the table, applied once the table is done.
#[derive(Clone, Debug, PartialEq)]
enum CellAction {
    SetText {
        key: RowKey,
        field: String,
        text: String,
    },
    SetFlag {
        key: RowKey,
        field: String,
        on: bool,
    },
    ExclusiveForPage(bool),
    Revert(RowKey),
    OpenRef {
        key: RowKey,
        field: String,
        reference: String,
    },
}

#[derive(Clone, Debug)]
struct RefDetails {
    key: RowKey,
    field: String,
    reference: String,
}

/// Window state: the loaded session plus view and draft state for the table.
#[derive(Default)]
struct ReviewApp {
    schema: ReviewSchema,
    session: Option<EditSession>,
    output_path: Option<PathBuf>,
    dialog_dir: Option<PathBuf>,
    filter: ViewFilter,
    pagination: Pagination,
    // Text typed into a cell but not yet written to the buffer (until focus leaves).
    drafts: HashMap<(RowKey, String), String>,
    details: Option<RefDetails>,
    status: String,
    last_error: Option<String>,
    theme_dark: bool,
}

impl ReviewApp {
    fn file_dialog(&self) -> rfd::FileDialog {
        let dialog = rfd::FileDialog::new().add_filter("Match results", &["json", "json5", "gz"]);
        match &self.dialog_dir {
            Some(dir) => dialog.set_directory(dir),
            None => dialog,
        }
    }

    fn open_file(&mut self) {
        let Some(path) = self.file_dialog().pick_file() else {
            return;
        };
        self.load_rows(path);
    }

    fn load_rows(&mut self, path: PathBuf) {
        if let Some(session) = &self.session
            && session.unsaved_count() > 0
        {
            tracing::warn!(
                unsaved = session.unsaved_count(),
                "discarding unsaved edits on open"
            );
        }

        match RowSet::load_path(&path, &self.schema.key_field, &self.schema.rows_field) {
            Ok(rows) => {
                self.status = format!("{} ({} {})", path.display(), rows.len(), statics::EN_LABEL_ROWS);
                self.session = Some(EditSession::new(rows, self.schema.clone()));
                self.pagination = Pagination::new(self.schema.page_size);
                self.drafts.clear();
                self.details = None;
                self.last_error = None;
                self.dialog_dir = path.parent().map(|p| p.to_path_buf());
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %format!("{e:#}"), "open failed");
                self.last_error = Some(format!("{e:#}"));
            }
        }
    }

    fn default_output_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.output_path {
            return Some(path.clone());
        }
        let source = self.session.as_ref()?.source().source_path.as_ref()?;
        Some(source.with_extension("validated.json"))
    }

    fn save_to(&mut self) {
        let Some(path) = self.file_dialog().save_file() else {
            return;
        };
        self.output_path = Some(path);
        self.save();
    }

    fn save(&mut self) {
        let Some(path) = self.default_output_path() else {
            self.last_error = Some(statics::EN_ERR_NO_OUTPUT.to_string());
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let schema = session.schema();
        let mut sink = FileSink::new(&path, &schema.key_field, &schema.rows_field);
        sink.line_ending = session.source().line_ending;

        match session.commit_and_fold(&mut sink) {
            Ok(CommitOutcome::Empty) => {
                self.status = statics::EN_COMMIT_EMPTY.to_string();
                self.last_error = None;
            }
            Ok(CommitOutcome::Acknowledged { rows, .. }) => {
                self.status = format!(
                    "{} {rows} -> {}",
                    statics::EN_COMMIT_SAVED_PREFIX,
                    path.display()
                );
                self.last_error = None;
                self.output_path = Some(path);
            }
            Err(e) => {
                let message = match session.commit_state() {
                    CommitState::Failed { message, .. } => message.clone(),
                    _ => e.to_string(),
                };
                tracing::error!(path = %path.display(), error = %message, "save failed");
                self.last_error = Some(format!("{} {message}", statics::EN_COMMIT_FAILED_PREFIX));
            }
        }
    }

    fn unsaved_label(count: usize) -> String {
        if count == 1 {
            statics::EN_UNSAVED_ONE.to_string()
        } else {
            format!("{count} {}", statics::EN_UNSAVED_MANY_SUFFIX)
        }
    }

    /// Text typed into a cell; an empty string over a missing source value stays missing.
    fn text_value(session: &EditSession, key: &RowKey, field: &str, text: String) -> RowValue {
        let source_missing = session
            .source()
            .row(key)
            .is_none_or(|row| matches!(row.get(field), None | Some(RowValue::Null)));
        if text.is_empty() && source_missing {
            RowValue::Null
        } else {
            RowValue::String(text)
        }
    }

    fn apply_actions(&mut self, actions: Vec<CellAction>, page_keys: &[RowKey]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        for action in actions {
            let result = match action {
                CellAction::SetText { key, field, text } => {
                    let value = Self::text_value(session, &key, &field, text);
                    session.set_field(&key, &field, value)
                }
                CellAction::SetFlag { key, field, on } => {
                    session.set_field(&key, &field, RowValue::Bool(on))
                }
                CellAction::ExclusiveForPage(on) => {
                    session.set_exclusive_for(page_keys, on).map(|_| ())
                }
                CellAction::Revert(key) => {
                    session.revert_row(&key);
                    self.drafts.retain(|(k, _), _| *k != key);
                    Ok(())
                }
                CellAction::OpenRef {
                    key,
                    field,
                    reference,
                } => {
                    tracing::info!(row = %key, field = %field, reference = %reference, "reference lookup");
                    self.details = Some(RefDetails {
                        key,
                        field,
                        reference,
                    });
                    Ok(())
                }
            };
            if let Err(e) = result {
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn render_toolbar(&mut self, ui: &mut egui::Ui, total: usize) {
        ui.horizontal(|ui| {
            ui.label(statics::EN_LABEL_SEARCH);
            ui.add(
                egui::TextEdit::singleline(&mut self.filter.query)
                    .hint_text(statics::EN_HINT_SEARCH)
                    .desired_width(240.0),
            );
            ui.checkbox(
                &mut self.filter.hide_validated,
                statics::EN_CHECKBOX_HIDE_VALIDATED,
            );

            ui.separator();
            ui.label(statics::EN_LABEL_SORT);
            let sort_label = |s: SortOrder| match s {
                SortOrder::Source => statics::EN_SORT_SOURCE,
                SortOrder::KeyAsc => statics::EN_SORT_ASC,
                SortOrder::KeyDesc => statics::EN_SORT_DESC,
            };
            egui::ComboBox::from_id_salt("sort_order")
                .selected_text(sort_label(self.filter.sort))
                .show_ui(ui, |ui| {
                    for s in [SortOrder::Source, SortOrder::KeyAsc, SortOrder::KeyDesc] {
                        ui.selectable_value(&mut self.filter.sort, s, sort_label(s));
                    }
                });

            ui.separator();
            if ui.button(statics::EN_BTN_PREV_PAGE).clicked() {
                self.pagination.prev();
            }
            ui.label(format!(
                "{} {} / {} ({total} {})",
                statics::EN_LABEL_PAGE,
                self.pagination.page + 1,
                self.pagination.page_count(total),
                statics::EN_LABEL_ROWS
            ));
            if ui.button(statics::EN_BTN_NEXT_PAGE).clicked() {
                self.pagination.next(total);
            }
        });
    }

    fn render_cell(
        ui: &mut egui::Ui,
        session: &EditSession,
        drafts: &mut HashMap<(RowKey, String), String>,
        key: &RowKey,
        col: &ColumnSpec,
        actions: &mut Vec<CellAction>,
    ) {
        let schema = session.schema();
        let edited = session.is_field_edited(key, &col.field);

        if schema.provenance_fields.contains(&col.field) {
            let refs: Vec<String> = session
                .provenance(key)
                .into_iter()
                .filter(|(field, _)| *field == col.field)
                .map(|(_, reference)| reference)
                .collect();
            if refs.is_empty() {
                ui.weak(statics::EN_PLACEHOLDER_NA);
            }
            for reference in refs {
                if ui.small_button(reference.as_str()).clicked() {
                    actions.push(CellAction::OpenRef {
                        key: key.clone(),
                        field: col.field.clone(),
                        reference,
                    });
                }
            }
            return;
        }

        match col.kind {
            FieldKind::Flag => {
                let mut on = session.flag(key, &col.field);
                let response = ui.add_enabled(col.editable, egui::Checkbox::without_text(&mut on));
                if response.changed() {
                    actions.push(CellAction::SetFlag {
                        key: key.clone(),
                        field: col.field.clone(),
                        on,
                    });
                }
            }
            FieldKind::Text | FieldKind::Label if col.editable => {
                let locked = schema.is_dependent(&col.field) && session.is_exclusive(key);
                let draft_key = (key.clone(), col.field.clone());
                let mut text = match drafts.get(&draft_key) {
                    Some(draft) => draft.clone(),
                    None => session
                        .display(key, &col.field)
                        .map(|s| s.into_owned())
                        .unwrap_or_default(),
                };

                let response = ui.add_enabled(
                    !locked,
                    egui::TextEdit::singleline(&mut text).desired_width(f32::INFINITY),
                );
                if response.changed() {
                    drafts.insert(draft_key.clone(), text);
                }
                if response.lost_focus() {
                    if let Some(text) = drafts.remove(&draft_key) {
                        actions.push(CellAction::SetText {
                            key: key.clone(),
                            field: col.field.clone(),
                            text,
                        });
                    }
                } else if !response.has_focus() {
                    drafts.remove(&draft_key);
                }
            }
            FieldKind::Text | FieldKind::Label => {
                let text = session.display(key, &col.field).unwrap_or_default();
                ui.label(&*text);
            }
        }

        if edited {
            ui.colored_label(ui.visuals().warn_fg_color, statics::EN_BADGE_EDITED);
        }
    }

    fn render_table(
        ui: &mut egui::Ui,
        session: &EditSession,
        drafts: &mut HashMap<(RowKey, String), String>,
        keys: &[RowKey],
    ) -> Vec<CellAction> {
        let schema = session.schema();
        let mut actions = Vec::new();
        let row_h = ui.text_style_height(&egui::TextStyle::Body) + 8.0;
        let page_exclusive = !keys.is_empty() && keys.iter().all(|k| session.is_exclusive(k));

        let mut table = TableBuilder::new(ui)
            .striped(true)
            .cell_layout(egui::Layout::left_to_right(egui::Align::Center));
        for col in &schema.columns {
            table = table.column(match col.kind {
                FieldKind::Flag => Column::initial(110.0).resizable(false),
                _ => Column::initial(220.0).resizable(true).clip(true),
            });
        }
        table = table.column(Column::remainder());

        table
            .header(row_h, |mut header| {
                for col in &schema.columns {
                    header.col(|ui| {
                        ui.strong(col.label.as_str());
                        if col.field == schema.toggle_field && col.editable {
                            let mut all = page_exclusive;
                            if ui.checkbox(&mut all, statics::EN_SELECT_ALL_PAGE).changed() {
                                actions.push(CellAction::ExclusiveForPage(all));
                            }
                        }
                    });
                }
                header.col(|ui| {
                    ui.strong(statics::EN_COL_ACTIONS);
                });
            })
            .body(|mut body| {
                for key in keys {
                    body.row(row_h, |mut row| {
                        for col in &schema.columns {
                            row.col(|ui| {
                                Self::render_cell(ui, session, drafts, key, col, &mut actions);
                            });
                        }
                        row.col(|ui| {
                            if session.is_edited(key)
                                && ui.small_button(statics::EN_BTN_REVERT).clicked()
                            {
                                actions.push(CellAction::Revert(key.clone()));
                            }
                        });
                    });
                }
            });

        actions
    }

    fn render_review_panel(&mut self, ui: &mut egui::Ui) {
        let Some(session) = self.session.as_ref() else {
            ui.vertical_centered(|ui| {
                ui.add_space(40.0);
                ui.heading(statics::EN_HOME_HEADING);
                ui.label(statics::EN_HOME_INSTRUCTIONS);
            });
            return;
        };

        let keys = visible_keys(session, &self.filter);
        self.pagination.clamp(keys.len());
        self.render_toolbar(ui, keys.len());
        ui.separator();

        let page_keys = self.pagination.slice(&keys).to_vec();
        if page_keys.is_empty() {
            ui.label(statics::EN_NO_ROWS);
            return;
        }

        let Some(session) = self.session.as_ref() else {
            return;
        };
        let actions = Self::render_table(ui, session, &mut self.drafts, &page_keys);
        if !actions.is_empty() {
            self.apply_actions(actions, &page_keys);
        }
    }

    fn render_details_window(&mut self, ctx: &egui::Context) {
        let mut open = self.details.is_some();
        if let Some(details) = &self.details {
            egui::Window::new(statics::EN_WINDOW_DETAILS)
                .open(&mut open)
                .resizable(false)
                .show(ctx, |ui| {
                    egui::Grid::new("ref_details").num_columns(2).show(ui, |ui| {
                        ui.label(statics::EN_DETAILS_ROW);
                        ui.monospace(details.key.to_string());
                        ui.end_row();
                        ui.label(statics::EN_DETAILS_FIELD);
                        ui.monospace(details.field.as_str());
                        ui.end_row();
                        ui.label(statics::EN_DETAILS_REF);
                        ui.monospace(details.reference.as_str());
                        ui.end_row();
                    });
                });
        }
        if !open {
            self.details = None;
        }
    }
}

impl eframe::App for ReviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input_mut(|i| i.consume_key(egui::Modifiers::CTRL, egui::Key::S)) {
            self.save();
        }

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                if ui.button(statics::EN_BTN_OPEN).clicked() {
                    self.open_file();
                }

                let has_session = self.session.is_some();
                if ui
                    .add_enabled(has_session, egui::Button::new(statics::EN_BTN_SAVE_TO))
                    .clicked()
                {
                    self.save_to();
                }

                if ui.button(statics::EN_BTN_TOGGLE_THEME).clicked() {
                    self.theme_dark = !self.theme_dark;
                    if self.theme_dark {
                        ctx.set_visuals(egui::Visuals::dark());
                    } else {
                        ctx.set_visuals(egui::Visuals::light());
                    }
                }

                let Some(session) = &self.session else {
                    return;
                };
                let unsaved = session.unsaved_count();
                let state = session.commit_state().clone();

                ui.separator();
                match state {
                    CommitState::Pending { .. } => {
                        ui.label(statics::EN_COMMIT_PENDING);
                    }
                    CommitState::Failed { .. } => {
                        ui.colored_label(ui.visuals().error_fg_color, Self::unsaved_label(unsaved));
                        if ui.button(statics::EN_BTN_RETRY).clicked() {
                            self.save();
                        }
                    }
                    CommitState::Idle if unsaved > 0 => {
                        ui.colored_label(ui.visuals().warn_fg_color, Self::unsaved_label(unsaved));
                        if ui.button(statics::EN_BTN_SAVE).clicked() {
                            self.save();
                        }
                    }
                    CommitState::Idle => {}
                }
            });
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let Some(err) = &self.last_error {
                    ui.colored_label(ui.visuals().error_fg_color, err.as_str());
                } else {
                    ui.label(self.status.as_str());
                }
            });
        });

        self.render_details_window(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_review_panel(ui);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{CellAction, ReviewApp};
    use crate::{EditSession, ReviewSchema, RowKey, RowSet, RowValue, statics};

    fn app(text: &str) -> ReviewApp {
        let schema = ReviewSchema::default();
        let rows = RowSet::parse_text(text, &schema.key_field, &schema.rows_field).unwrap();
        ReviewApp {
            session: Some(EditSession::new(rows, schema.clone())),
            schema,
            ..Default::default()
        }
    }

    #[test]
    fn unsaved_label_pluralizes() {
        assert_eq!(ReviewApp::unsaved_label(1), statics::EN_UNSAVED_ONE);
        assert_eq!(ReviewApp::unsaved_label(3), "3 unsaved changes");
    }

    #[test]
    fn clearing_text_over_missing_source_is_not_an_edit() {
        let mut app = app("[{ original: 'A' }]");
        let key = RowKey::new("A");
        app.apply_actions(
            vec![CellAction::SetText {
                key: key.clone(),
                field: statics::FIELD_HANDLE.to_string(),
                text: String::new(),
            }],
            &[key],
        );
        assert_eq!(app.session.as_ref().unwrap().unsaved_count(), 0);
    }

    #[test]
    fn page_toggle_and_revert_actions_reach_the_session() {
        let mut app = app("[{ original: 'A', handle: 'H' }, { original: 'B' }]");
        let page = [RowKey::new("A"), RowKey::new("B")];
        app.apply_actions(vec![CellAction::ExclusiveForPage(true)], &page);
        assert_eq!(app.session.as_ref().unwrap().unsaved_count(), 2);

        app.apply_actions(vec![CellAction::Revert(RowKey::new("A"))], &page);
        let session = app.session.as_ref().unwrap();
        assert_eq!(session.unsaved_count(), 1);
        assert_eq!(
            session.get_field(&RowKey::new("A"), statics::FIELD_HANDLE),
            Some(&RowValue::from("H"))
        );
    }

    #[test]
    fn locked_field_edit_surfaces_as_error() {
        let mut app = app("[{ original: 'A', handle: 'H' }]");
        let key = RowKey::new("A");
        app.apply_actions(
            vec![
                CellAction::SetFlag {
                    key: key.clone(),
                    field: statics::FIELD_SHOULD_NOT_SPLIT.to_string(),
                    on: true,
                },
                CellAction::SetText {
                    key: key.clone(),
                    field: statics::FIELD_HANDLE.to_string(),
                    text: "X".to_string(),
                },
            ],
            &[key],
        );
        assert!(app.last_error.is_some());
    }

    #[test]
    fn save_writes_output_and_shows_committed_values() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("validated.json");
        let mut app = app("[{ original: 'A', handle: '' }]");
        app.output_path = Some(output.clone());
        let key = RowKey::new("A");
        app.apply_actions(
            vec![CellAction::SetText {
                key: key.clone(),
                field: statics::FIELD_HANDLE.to_string(),
                text: "Simpson".to_string(),
            }],
            &[key.clone()],
        );

        app.save();
        assert_eq!(app.last_error, None);
        assert!(output.exists());
        let session = app.session.as_ref().unwrap();
        assert_eq!(session.unsaved_count(), 0);
        assert_eq!(
            session.source().row(&key).and_then(|r| r.get(statics::FIELD_HANDLE)),
            Some(&RowValue::from("Simpson"))
        );
    }
}
