// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use clusterview_app::{
    AppCommand, AppEvent, AppMode, AppState, Condition, Debouncer, DisplayMode, DisplayRow,
    GroupHash, GroupHeader, NO_OWNER, OwnerUpdate, PatternLevel, PatternRow, PatternSpan,
    PromptKind, Remark, RemarkAction, RemarkEdit, RowPatch, RowRef, SortDirection, SortField,
    SortState, StrategyAck, StrategyUpdate, UserDirectory, UserInfo, drill_down_additions,
    group_search_conditions, latest_remark, parse_owner_list, placeholder_spans,
    remark_display,
};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info, warn};

const HALF_PAGE_ROWS: isize = 10;
const SORT_ASC_MARK: &str = "▲";
const SORT_DESC_MARK: &str = "▼";
const GROUP_OPEN_MARK: &str = "▾";
const GROUP_CLOSED_MARK: &str = "▸";
const NEW_CLASS_MARK: &str = "N";
const UNMATCHED_PATTERN: &str = "(unmatched)";
const CURRENT_WINDOW_SORT_FIELDS: [SortField; 2] = [SortField::Count, SortField::Percentage];
/// Summary bar, status bar, table borders and the column header row.
const TABLE_CHROME_ROWS: u16 = 3 + 3 + 2 + 1;

/// One fetch result plus the clustering parameters it was produced with.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternBatch {
    pub group_by: Vec<String>,
    pub pattern_level: PatternLevel,
    pub year_on_year_hour: u32,
    pub rows: Vec<PatternRow>,
}

impl PatternBatch {
    pub fn shows_year_on_year(&self) -> bool {
        self.year_on_year_hour >= 1
    }
}

pub trait AppRuntime {
    fn fetch_patterns(&mut self) -> Result<PatternBatch>;
    fn set_owners(&mut self, update: &OwnerUpdate) -> Result<Vec<String>>;
    fn update_strategy(&mut self, update: &StrategyUpdate) -> Result<StrategyAck>;
    fn edit_remark(&mut self, edit: &RemarkEdit) -> Result<Vec<Remark>>;
    fn lookup_users(&mut self, usernames: &[String]) -> Result<Vec<UserInfo>>;
    /// Runs a fetch and reports back over `tx`. Implementations that can
    /// fetch off-thread override this; results are matched by `request_id`.
    fn spawn_fetch(&mut self, request_id: u64, tx: Sender<InternalEvent>) -> Result<()> {
        let event = match self.fetch_patterns() {
            Ok(batch) => InternalEvent::FetchCompleted { request_id, batch },
            Err(error) => InternalEvent::FetchFailed {
                request_id,
                error: format!("{error:#}"),
            },
        };
        tx.send(event)
            .map_err(|_| anyhow::anyhow!("fetch event channel closed"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    FetchCompleted { request_id: u64, batch: PatternBatch },
    FetchFailed { request_id: u64, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableCommand {
    MoveRow(isize),
    MoveHalfPageDown,
    MoveHalfPageUp,
    JumpFirstRow,
    JumpLastRow,
    MoveSortColumn(isize),
    CycleSort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TableStatus {
    SortColumn(&'static str),
}

impl TableStatus {
    fn message(self) -> String {
        match self {
            Self::SortColumn(label) => format!("sort column: {label}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TableEvent {
    CursorUpdated,
    Status(TableStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableColumn {
    Marker,
    Count,
    Percentage,
    YearOnYearCount,
    YearOnYearPercentage,
    Group(usize),
    Pattern,
    Owners,
    Strategy,
    Remark,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct PromptUiState {
    input: String,
    target: Option<PatternRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FetchUiState {
    next_request_id: u64,
    in_flight: Option<u64>,
    loaded_once: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct BatchMeta {
    pattern_level: Option<PatternLevel>,
    year_on_year: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConditionsOverlay {
    title: String,
    conditions: Vec<Condition>,
}

#[derive(Debug, Default)]
struct ViewData {
    selected: usize,
    sort_column: usize,
    help_visible: bool,
    conditions: Option<ConditionsOverlay>,
    prompt: PromptUiState,
    status_token: u64,
    fetch: FetchUiState,
    load_more: Debouncer,
    meta: BatchMeta,
    users: UserDirectory,
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    view_data
        .users
        .subscribe(|changed| debug!(count = changed.len(), "owner names refreshed"));
    let (internal_tx, internal_rx) = mpsc::channel();

    start_fetch(state, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        let viewport_rows = match terminal.size() {
            Ok(size) => table_viewport_rows(size.height),
            Err(error) => {
                result = Err(error).context("read terminal size");
                break;
            }
        };
        let now = Instant::now();
        watch_sentinel(state, &mut view_data, viewport_rows, now);
        if view_data.load_more.poll(now) {
            dispatch_and_track(state, &mut view_data, &internal_tx, AppCommand::LoadMore);
        }

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::FetchCompleted { request_id, batch } => {
                if view_data.fetch.in_flight != Some(request_id) {
                    debug!(request_id, "dropping stale pattern fetch");
                    continue;
                }
                apply_batch(state, runtime, view_data, tx, batch);
            }
            InternalEvent::FetchFailed { request_id, error } => {
                if view_data.fetch.in_flight != Some(request_id) {
                    debug!(request_id, "dropping stale fetch failure");
                    continue;
                }
                view_data.fetch.in_flight = None;
                warn!(request_id, %error, "pattern fetch failed");
                emit_status(
                    state,
                    view_data,
                    tx,
                    format!("fetch failed: {error}; showing previous results"),
                );
            }
        }
    }
}

fn apply_batch<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    batch: PatternBatch,
) {
    view_data.fetch.in_flight = None;
    view_data.fetch.loaded_once = true;
    view_data.meta = BatchMeta {
        pattern_level: Some(batch.pattern_level),
        year_on_year: batch.shows_year_on_year(),
    };
    view_data.selected = 0;
    view_data.sort_column = view_data
        .sort_column
        .min(sort_columns(view_data.meta.year_on_year).len() - 1);
    view_data.load_more.cancel();

    let events = dispatch_and_track(
        state,
        view_data,
        tx,
        AppCommand::ReplaceRows {
            group_by: batch.group_by,
            rows: batch.rows,
        },
    );
    if let Some(AppEvent::RowsReplaced { groups, rows }) = events.first() {
        info!(rows, groups, "patterns loaded");
        emit_status(
            state,
            view_data,
            tx,
            format!("loaded {rows} patterns in {groups} groups"),
        );
    }
    resolve_owner_names(state, runtime, view_data);
}

fn start_fetch<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    view_data.fetch.next_request_id = view_data.fetch.next_request_id.saturating_add(1);
    let request_id = view_data.fetch.next_request_id;
    view_data.fetch.in_flight = Some(request_id);
    debug!(request_id, "starting pattern fetch");
    if let Err(error) = runtime.spawn_fetch(request_id, tx.clone()) {
        view_data.fetch.in_flight = None;
        warn!(request_id, error = %format!("{error:#}"), "could not start pattern fetch");
        emit_status(state, view_data, tx, format!("fetch failed: {error:#}"));
    }
}

fn resolve_owner_names<R: AppRuntime>(
    state: &AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
) {
    let missing = view_data.users.missing(
        state
            .view
            .rows()
            .iter()
            .filter_map(DisplayRow::as_data)
            .flat_map(|row| row.data.owners.iter()),
    );
    if missing.is_empty() {
        return;
    }
    match runtime.lookup_users(&missing) {
        Ok(users) => {
            view_data.users.update(users);
        }
        Err(error) => warn!(
            count = missing.len(),
            error = %format!("{error:#}"),
            "owner lookup failed"
        ),
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

/// Dispatches and keeps the cursor inside the rendered rows. Status
/// updates raised by the dispatcher get the same auto-clear as `emit_status`.
fn dispatch_and_track(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: AppCommand,
) -> Vec<AppEvent> {
    let events = state.dispatch(command);
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::StatusUpdated(_)))
    {
        view_data.status_token = view_data.status_token.saturating_add(1);
        schedule_status_clear(internal_tx, view_data.status_token);
    }
    clamp_selection(state, view_data);
    events
}

fn clamp_selection(state: &AppState, view_data: &mut ViewData) {
    let len = state.view.rendered_rows().len();
    view_data.selected = view_data.selected.min(len.saturating_sub(1));
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
            emit_status(state, view_data, internal_tx, "help hidden");
        }
        return false;
    }

    if view_data.conditions.is_some() {
        if matches!(
            key.code,
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')
        ) {
            view_data.conditions = None;
        }
        return false;
    }

    if let AppMode::Prompt(kind) = state.mode {
        handle_prompt_key(state, runtime, view_data, internal_tx, kind, key);
        return false;
    }

    if handle_table_key(state, view_data, internal_tx, key) {
        return false;
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('?'), _) => {
            view_data.help_visible = true;
        }
        (KeyCode::Char('r'), KeyModifiers::NONE) => {
            start_fetch(state, runtime, view_data, internal_tx);
            emit_status(state, view_data, internal_tx, "refreshing");
        }
        (KeyCode::Enter, _) | (KeyCode::Char(' '), _) => {
            handle_nav_enter(state, view_data, internal_tx);
        }
        (KeyCode::Char('c'), KeyModifiers::NONE) => {
            open_group_conditions(state, view_data, internal_tx);
        }
        (KeyCode::Char('m'), KeyModifiers::NONE) => {
            dispatch_and_track(state, view_data, internal_tx, AppCommand::ToggleDisplayMode);
        }
        (KeyCode::Char('f'), KeyModifiers::NONE) => {
            dispatch_and_track(state, view_data, internal_tx, AppCommand::CycleRemarkFilter);
        }
        (KeyCode::Char('O'), _) => {
            dispatch_and_track(state, view_data, internal_tx, AppCommand::ToggleNoOwner);
        }
        (KeyCode::Char('/'), _) => {
            open_prompt(state, view_data, internal_tx, PromptKind::OwnerFilter);
        }
        (KeyCode::Char('e'), KeyModifiers::NONE) => {
            open_prompt(state, view_data, internal_tx, PromptKind::EditOwners);
        }
        (KeyCode::Char('R'), _) => {
            open_prompt(state, view_data, internal_tx, PromptKind::AddRemark);
        }
        (KeyCode::Char('E'), _) => {
            open_prompt(state, view_data, internal_tx, PromptKind::EditRemark);
        }
        (KeyCode::Char('a'), KeyModifiers::NONE) => {
            toggle_strategy(state, runtime, view_data, internal_tx);
        }
        (KeyCode::Char('x'), KeyModifiers::NONE) => {
            delete_latest_remark(state, runtime, view_data, internal_tx);
        }
        _ => {}
    }
    false
}

fn handle_table_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    let Some(command) = table_command_for_key(key) else {
        return false;
    };

    if command == TableCommand::CycleSort {
        let field = selected_sort_field(view_data);
        dispatch_and_track(state, view_data, internal_tx, AppCommand::CycleSort(field));
        return true;
    }

    let rendered = state.view.rendered_rows().len();
    match apply_table_command(view_data, rendered, command) {
        TableEvent::CursorUpdated => {
            if state.view.window().has_more && view_data.selected + 1 >= rendered {
                view_data.load_more.trigger(Instant::now());
            }
        }
        TableEvent::Status(status) => emit_status(state, view_data, internal_tx, status.message()),
    }
    true
}

fn table_command_for_key(key: KeyEvent) -> Option<TableCommand> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(TableCommand::MoveRow(1)),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(TableCommand::MoveRow(-1)),
        (KeyCode::Char('h'), _) | (KeyCode::Left, _) => Some(TableCommand::MoveSortColumn(-1)),
        (KeyCode::Char('l'), _) | (KeyCode::Right, _) => Some(TableCommand::MoveSortColumn(1)),
        (KeyCode::Char('d'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            Some(TableCommand::MoveHalfPageDown)
        }
        (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            Some(TableCommand::MoveHalfPageUp)
        }
        (KeyCode::PageDown, _) => Some(TableCommand::MoveHalfPageDown),
        (KeyCode::PageUp, _) => Some(TableCommand::MoveHalfPageUp),
        (KeyCode::Char('g'), _) | (KeyCode::Home, _) => Some(TableCommand::JumpFirstRow),
        (KeyCode::Char('G'), _) | (KeyCode::End, _) => Some(TableCommand::JumpLastRow),
        (KeyCode::Char('s'), KeyModifiers::NONE) => Some(TableCommand::CycleSort),
        _ => None,
    }
}

fn apply_table_command(
    view_data: &mut ViewData,
    rendered: usize,
    command: TableCommand,
) -> TableEvent {
    let last = rendered.saturating_sub(1) as isize;
    let move_to = |current: usize, delta: isize| (current as isize + delta).clamp(0, last) as usize;
    match command {
        TableCommand::MoveRow(delta) => view_data.selected = move_to(view_data.selected, delta),
        TableCommand::MoveHalfPageDown => {
            view_data.selected = move_to(view_data.selected, HALF_PAGE_ROWS);
        }
        TableCommand::MoveHalfPageUp => {
            view_data.selected = move_to(view_data.selected, -HALF_PAGE_ROWS);
        }
        TableCommand::JumpFirstRow => view_data.selected = 0,
        TableCommand::JumpLastRow => view_data.selected = last.max(0) as usize,
        TableCommand::MoveSortColumn(delta) => {
            let columns = sort_columns(view_data.meta.year_on_year);
            let len = columns.len() as isize;
            let next = (view_data.sort_column as isize + delta).rem_euclid(len) as usize;
            view_data.sort_column = next;
            return TableEvent::Status(TableStatus::SortColumn(columns[next].label()));
        }
        TableCommand::CycleSort => {}
    }
    TableEvent::CursorUpdated
}

fn sort_columns(year_on_year: bool) -> &'static [SortField] {
    if year_on_year {
        &SortField::ALL
    } else {
        &CURRENT_WINDOW_SORT_FIELDS
    }
}

fn selected_sort_field(view_data: &ViewData) -> SortField {
    let columns = sort_columns(view_data.meta.year_on_year);
    columns[view_data.sort_column.min(columns.len() - 1)]
}

/// True when the "more rows" sentinel would be on screen: the cursor sits on
/// the last rendered row, or everything rendered fits above the fold.
fn sentinel_visible(rendered: usize, selected: usize, viewport_rows: usize) -> bool {
    selected + 1 >= rendered || rendered < viewport_rows
}

fn watch_sentinel(state: &AppState, view_data: &mut ViewData, viewport_rows: usize, now: Instant) {
    if !state.view.window().has_more || view_data.load_more.is_pending() {
        return;
    }
    let rendered = state.view.rendered_rows().len();
    if sentinel_visible(rendered, view_data.selected, viewport_rows) {
        view_data.load_more.trigger(now);
    }
}

fn table_viewport_rows(terminal_height: u16) -> usize {
    usize::from(terminal_height.saturating_sub(TABLE_CHROME_ROWS))
}

fn selected_row<'a>(state: &'a AppState, view_data: &ViewData) -> Option<&'a DisplayRow> {
    state.view.rendered_rows().get(view_data.selected).copied()
}

fn selected_pattern(state: &AppState, view_data: &ViewData) -> Option<PatternRow> {
    selected_row(state, view_data)
        .and_then(DisplayRow::as_data)
        .map(|row| row.data.clone())
}

fn handle_nav_enter(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(row) = selected_row(state, view_data) else {
        emit_status(state, view_data, internal_tx, "nothing selected");
        return;
    };
    match row {
        DisplayRow::Header(header) => {
            let hash = header.hash;
            dispatch_and_track(state, view_data, internal_tx, AppCommand::ToggleGroup(hash));
        }
        DisplayRow::Data(data) => {
            let level = view_data.meta.pattern_level.unwrap_or(PatternLevel::L05);
            let conditions = drill_down_additions(&data.data, state.view.group_by(), level);
            view_data.conditions = Some(ConditionsOverlay {
                title: format!("drill-down {}", data.data.signature),
                conditions,
            });
        }
    }
}

fn open_group_conditions(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if state.view.group_by().is_empty() {
        emit_status(state, view_data, internal_tx, "no grouping dimensions");
        return;
    }
    let Some(hash) = selected_row(state, view_data).map(DisplayRow::hash) else {
        emit_status(state, view_data, internal_tx, "nothing selected");
        return;
    };
    let values = group_values(state, hash);
    let conditions = group_search_conditions(state.view.group_by(), &values);
    let title = conditions
        .iter()
        .map(|condition| format!("{}={}", condition.field, condition.value.join(",")))
        .collect::<Vec<_>>()
        .join(" | ");
    view_data.conditions = Some(ConditionsOverlay {
        title: format!("group search {title}"),
        conditions,
    });
}

fn group_values(state: &AppState, hash: GroupHash) -> Vec<String> {
    state
        .view
        .rows()
        .iter()
        .filter_map(DisplayRow::as_data)
        .find(|row| row.hash == hash)
        .map(|row| row.data.group.clone())
        .unwrap_or_default()
}

fn open_prompt(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: PromptKind,
) {
    let target = selected_pattern(state, view_data);
    let input = match kind {
        PromptKind::OwnerFilter => state
            .view
            .filter()
            .owners
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
        PromptKind::EditOwners => match &target {
            Some(row) => row.owners.join(", "),
            None => {
                emit_status(state, view_data, internal_tx, "select a pattern row first");
                return;
            }
        },
        PromptKind::AddRemark => {
            if target.is_none() {
                emit_status(state, view_data, internal_tx, "select a pattern row first");
                return;
            }
            String::new()
        }
        PromptKind::EditRemark => {
            let Some(row) = &target else {
                emit_status(state, view_data, internal_tx, "select a pattern row first");
                return;
            };
            match latest_remark(&row.remark) {
                Some(latest) => latest.remark.clone(),
                None => {
                    emit_status(state, view_data, internal_tx, "no remark to edit");
                    return;
                }
            }
        }
    };
    view_data.prompt = PromptUiState { input, target };
    dispatch_and_track(state, view_data, internal_tx, AppCommand::OpenPrompt(kind));
}

fn handle_prompt_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: PromptKind,
    key: KeyEvent,
) {
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => {
            view_data.prompt = PromptUiState::default();
            dispatch_and_track(state, view_data, internal_tx, AppCommand::ExitToNav);
        }
        (KeyCode::Enter, _) => submit_prompt(state, runtime, view_data, internal_tx, kind),
        (KeyCode::Backspace, _) => {
            view_data.prompt.input.pop();
        }
        (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            view_data.prompt.input.clear();
        }
        (KeyCode::Char(ch), modifiers) => {
            if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT {
                view_data.prompt.input.push(ch);
            }
        }
        _ => {}
    }
}

fn submit_prompt<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: PromptKind,
) {
    let prompt = std::mem::take(&mut view_data.prompt);
    dispatch_and_track(state, view_data, internal_tx, AppCommand::ExitToNav);

    match kind {
        PromptKind::OwnerFilter => {
            let owners = parse_owner_list(&prompt.input).into_iter().collect();
            dispatch_and_track(state, view_data, internal_tx, AppCommand::SetOwnerFilter(owners));
        }
        PromptKind::EditOwners => {
            if let Some(row) = prompt.target {
                let owners = parse_owner_list(&prompt.input);
                apply_owner_edit(state, runtime, view_data, internal_tx, row, owners);
            }
        }
        PromptKind::AddRemark => {
            if let Some(row) = prompt.target {
                match RemarkEdit::add(&row, state.view.group_by(), &prompt.input) {
                    Ok(edit) => {
                        apply_remark_edit(state, runtime, view_data, internal_tx, row, edit)
                    }
                    Err(error) => emit_status(state, view_data, internal_tx, error.to_string()),
                }
            }
        }
        PromptKind::EditRemark => {
            if let Some(row) = prompt.target {
                let Some(create_time) = latest_remark(&row.remark).map(|remark| remark.create_time)
                else {
                    emit_status(state, view_data, internal_tx, "no remark to edit");
                    return;
                };
                let edit =
                    RemarkEdit::update(&row, state.view.group_by(), create_time, &prompt.input);
                match edit {
                    Ok(edit) => {
                        apply_remark_edit(state, runtime, view_data, internal_tx, row, edit)
                    }
                    Err(error) => emit_status(state, view_data, internal_tx, error.to_string()),
                }
            }
        }
    }
}

fn apply_owner_edit<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    row: PatternRow,
    owners: Vec<String>,
) {
    let update = match OwnerUpdate::for_row(&row, state.view.group_by(), owners) {
        Ok(update) => update,
        Err(error) => {
            emit_status(state, view_data, internal_tx, error.to_string());
            return;
        }
    };
    match runtime.set_owners(&update) {
        Ok(owners) => {
            dispatch_and_track(
                state,
                view_data,
                internal_tx,
                AppCommand::PatchRow {
                    target: RowRef::of(&row),
                    patch: RowPatch::Owners(owners),
                },
            );
            resolve_owner_names(state, runtime, view_data);
            emit_status(state, view_data, internal_tx, "owners updated");
        }
        Err(error) => {
            warn!(
                signature = %row.signature,
                error = %format!("{error:#}"),
                "owner update failed"
            );
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("owner update failed: {error:#}"),
            );
        }
    }
}

fn toggle_strategy<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(row) = selected_pattern(state, view_data) else {
        emit_status(state, view_data, internal_tx, "select a pattern row first");
        return;
    };
    let enabled = !row.strategy_enabled;
    let update = match StrategyUpdate::for_row(&row, state.view.group_by(), enabled) {
        Ok(update) => update,
        Err(error) => {
            emit_status(state, view_data, internal_tx, error.to_string());
            return;
        }
    };
    match runtime.update_strategy(&update) {
        Ok(ack) => {
            dispatch_and_track(
                state,
                view_data,
                internal_tx,
                AppCommand::PatchRow {
                    target: RowRef::of(&row),
                    patch: RowPatch::Strategy {
                        enabled,
                        strategy_id: ack.strategy_id,
                    },
                },
            );
            let label = if enabled { "alerting on" } else { "alerting off" };
            emit_status(state, view_data, internal_tx, label);
        }
        Err(error) => {
            warn!(
                signature = %row.signature,
                error = %format!("{error:#}"),
                "strategy update failed"
            );
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("strategy update failed: {error:#}"),
            );
        }
    }
}

fn delete_latest_remark<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(row) = selected_pattern(state, view_data) else {
        emit_status(state, view_data, internal_tx, "select a pattern row first");
        return;
    };
    let Some(create_time) = latest_remark(&row.remark).map(|remark| remark.create_time) else {
        emit_status(state, view_data, internal_tx, "no remark to delete");
        return;
    };
    match RemarkEdit::delete(&row, state.view.group_by(), create_time) {
        Ok(edit) => apply_remark_edit(state, runtime, view_data, internal_tx, row, edit),
        Err(error) => emit_status(state, view_data, internal_tx, error.to_string()),
    }
}

fn apply_remark_edit<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    row: PatternRow,
    edit: RemarkEdit,
) {
    match runtime.edit_remark(&edit) {
        Ok(remarks) => {
            dispatch_and_track(
                state,
                view_data,
                internal_tx,
                AppCommand::PatchRow {
                    target: RowRef::of(&row),
                    patch: RowPatch::Remarks(remarks),
                },
            );
            let done = match edit.action {
                RemarkAction::Add => "remark added",
                RemarkAction::Update => "remark updated",
                RemarkAction::Delete => "remark deleted",
            };
            emit_status(state, view_data, internal_tx, done);
        }
        Err(error) => {
            warn!(
                signature = %row.signature,
                action = edit.action.as_str(),
                error = %format!("{error:#}"),
                "remark edit failed"
            );
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("remark {} failed: {error:#}", edit.action.as_str()),
            );
        }
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let summary = Paragraph::new(summary_text(state, view_data))
        .block(Block::default().title("clusterview").borders(Borders::ALL));
    frame.render_widget(summary, layout[0]);

    render_table(frame, layout[1], state, view_data);

    let status_widget = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_widget, layout[2]);

    if let AppMode::Prompt(kind) = state.mode {
        let area = centered_rect(64, 30, frame.area());
        frame.render_widget(Clear, area);
        let prompt = Paragraph::new(prompt_overlay_text(kind, &view_data.prompt))
            .block(Block::default().title(kind.label()).borders(Borders::ALL));
        frame.render_widget(prompt, area);
    }

    if let Some(overlay) = &view_data.conditions {
        let area = centered_rect(70, 40, frame.area());
        frame.render_widget(Clear, area);
        let conditions = Paragraph::new(conditions_overlay_text(overlay))
            .block(Block::default().title(overlay.title.as_str()).borders(Borders::ALL));
        frame.render_widget(conditions, area);
    }

    if view_data.help_visible {
        let area = centered_rect(80, 60, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let title = table_title(state);
    if state.view.is_empty_state() {
        let empty = Paragraph::new(empty_state_text(state, view_data))
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(empty, area);
        return;
    }

    let columns = table_columns(state.view.display_mode(), state.view.group_by(), view_data.meta);
    let widths = columns.iter().map(|column| column_width(*column)).collect::<Vec<_>>();
    let focused = selected_sort_field(view_data);
    let header = Row::new(columns.iter().map(|column| {
        Cell::from(column_label(*column, state, state.view.sort(), focused)).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let mut rows = state
        .view
        .rendered_rows()
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let table_row = match row {
                DisplayRow::Header(header) => group_header_row(
                    &columns,
                    header,
                    state.view.visible_children(header.hash),
                ),
                DisplayRow::Data(data) => pattern_row(&columns, &data.data, &view_data.users),
            };
            if index == view_data.selected {
                table_row.style(Style::default().bg(Color::DarkGray))
            } else {
                table_row
            }
        })
        .collect::<Vec<_>>();

    let window = state.view.window();
    if window.has_more {
        let remaining = window.remaining();
        let cells = columns.iter().map(|column| match column {
            TableColumn::Pattern => Cell::from(format!("… {remaining} more, scroll to load")),
            _ => Cell::from(""),
        });
        rows.push(Row::new(cells).style(Style::default().fg(Color::DarkGray)));
    }

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn table_columns(mode: DisplayMode, group_by: &[String], meta: BatchMeta) -> Vec<TableColumn> {
    let mut columns = vec![
        TableColumn::Marker,
        TableColumn::Count,
        TableColumn::Percentage,
    ];
    if meta.year_on_year {
        columns.push(TableColumn::YearOnYearCount);
        columns.push(TableColumn::YearOnYearPercentage);
    }
    if mode == DisplayMode::Flatten {
        columns.extend((0..group_by.len()).map(TableColumn::Group));
    }
    columns.extend([
        TableColumn::Pattern,
        TableColumn::Owners,
        TableColumn::Strategy,
        TableColumn::Remark,
    ]);
    columns
}

fn column_width(column: TableColumn) -> Constraint {
    match column {
        TableColumn::Marker => Constraint::Length(2),
        TableColumn::Count => Constraint::Length(9),
        TableColumn::Percentage => Constraint::Length(9),
        TableColumn::YearOnYearCount => Constraint::Length(11),
        TableColumn::YearOnYearPercentage => Constraint::Length(12),
        TableColumn::Group(_) => Constraint::Length(12),
        TableColumn::Pattern => Constraint::Min(24),
        TableColumn::Owners => Constraint::Length(20),
        TableColumn::Strategy => Constraint::Length(10),
        TableColumn::Remark => Constraint::Length(24),
    }
}

fn column_label(
    column: TableColumn,
    state: &AppState,
    sort: &SortState,
    focused: SortField,
) -> String {
    let sortable = |field: SortField| sort_column_label(field, sort, focused);
    match column {
        TableColumn::Marker => String::new(),
        TableColumn::Count => sortable(SortField::Count),
        TableColumn::Percentage => sortable(SortField::Percentage),
        TableColumn::YearOnYearCount => sortable(SortField::YearOnYearCount),
        TableColumn::YearOnYearPercentage => sortable(SortField::YearOnYearPercentage),
        TableColumn::Group(index) => state
            .view
            .group_by()
            .get(index)
            .cloned()
            .unwrap_or_default(),
        TableColumn::Pattern => "pattern".to_owned(),
        TableColumn::Owners => "owners".to_owned(),
        TableColumn::Strategy => "alert".to_owned(),
        TableColumn::Remark => "remark".to_owned(),
    }
}

fn sort_column_label(field: SortField, sort: &SortState, focused: SortField) -> String {
    let mut label = field.label().to_owned();
    match sort.direction_for(field) {
        Some(SortDirection::Asc) => {
            label.push(' ');
            label.push_str(SORT_ASC_MARK);
        }
        Some(SortDirection::Desc) => {
            label.push(' ');
            label.push_str(SORT_DESC_MARK);
        }
        None => {}
    }
    if field == focused {
        format!("[{label}]")
    } else {
        label
    }
}

fn group_header_row(columns: &[TableColumn], header: &GroupHeader, visible: usize) -> Row<'static> {
    let style = Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD);
    let cells = columns
        .iter()
        .map(|column| match column {
            TableColumn::Marker => {
                let mark = if header.open {
                    GROUP_OPEN_MARK
                } else {
                    GROUP_CLOSED_MARK
                };
                Cell::from(mark).style(style)
            }
            TableColumn::Pattern => Cell::from(group_header_label(header, visible)).style(style),
            _ => Cell::from(""),
        })
        .collect::<Vec<_>>();
    Row::new(cells)
}

fn group_header_label(header: &GroupHeader, visible: usize) -> String {
    if visible == header.child_count {
        format!("{} ({})", header.key, header.child_count)
    } else {
        format!("{} ({visible}/{})", header.key, header.child_count)
    }
}

fn pattern_row(columns: &[TableColumn], row: &PatternRow, users: &UserDirectory) -> Row<'static> {
    let cells = columns
        .iter()
        .map(|column| match column {
            TableColumn::Marker => {
                if row.is_new_class {
                    Cell::from(NEW_CLASS_MARK).style(Style::default().fg(Color::Yellow))
                } else {
                    Cell::from("")
                }
            }
            TableColumn::Count => Cell::from(row.count.to_string()),
            TableColumn::Percentage => Cell::from(format_percentage(row.percentage)),
            TableColumn::YearOnYearCount => Cell::from(row.year_on_year_count.to_string()),
            TableColumn::YearOnYearPercentage => {
                let color = if row.year_on_year_percentage > 0.0 {
                    Color::Red
                } else if row.year_on_year_percentage < 0.0 {
                    Color::Green
                } else {
                    Color::Gray
                };
                Cell::from(format_yoy_change(row.year_on_year_percentage))
                    .style(Style::default().fg(color))
            }
            TableColumn::Group(index) => Cell::from(row.group_value(*index).to_owned()),
            TableColumn::Pattern => Cell::from(pattern_line(&row.pattern)),
            TableColumn::Owners => Cell::from(owners_label(&row.owners, users)),
            TableColumn::Strategy => Cell::from(strategy_label(row)),
            TableColumn::Remark => Cell::from(remark_display(&row.remark).to_owned()),
        })
        .collect::<Vec<_>>();
    Row::new(cells)
}

fn pattern_line(pattern: &str) -> Line<'static> {
    if pattern.is_empty() {
        return Line::from(Span::styled(
            UNMATCHED_PATTERN,
            Style::default().fg(Color::DarkGray),
        ));
    }
    let placeholder = Style::default()
        .fg(Color::Magenta)
        .add_modifier(Modifier::BOLD);
    let spans = placeholder_spans(pattern)
        .into_iter()
        .map(|span| match span {
            PatternSpan::Text(text) => Span::raw(text.to_owned()),
            PatternSpan::Placeholder(text) => Span::styled(text.to_owned(), placeholder),
        })
        .collect::<Vec<_>>();
    Line::from(spans)
}

fn format_percentage(value: f64) -> String {
    format!("{value:.2}%")
}

fn format_yoy_change(value: f64) -> String {
    let arrow = if value > 0.0 {
        "↑"
    } else if value < 0.0 {
        "↓"
    } else {
        "–"
    };
    format!("{arrow}{:.2}%", value.abs())
}

fn owners_label(owners: &[String], users: &UserDirectory) -> String {
    if owners.is_empty() {
        return "--".to_owned();
    }
    owners
        .iter()
        .map(|owner| users.display_name(owner))
        .collect::<Vec<_>>()
        .join(", ")
}

fn strategy_label(row: &PatternRow) -> String {
    if row.owners.is_empty() {
        return "needs owner".to_owned();
    }
    match (row.strategy_enabled, row.strategy_id) {
        (true, Some(id)) if row.has_strategy() => format!("on #{id}"),
        (true, _) => "on".to_owned(),
        (false, _) => "off".to_owned(),
    }
}

fn format_remark_time(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn table_title(state: &AppState) -> String {
    let window = state.view.window();
    format!(
        "patterns {}/{} | page {}",
        window.visible_data_rows,
        window.total_visible,
        state.view.page()
    )
}

fn empty_state_text(state: &AppState, view_data: &ViewData) -> &'static str {
    if view_data.fetch.in_flight.is_some() && !view_data.fetch.loaded_once {
        "loading patterns..."
    } else if state.view.total_rows() == 0 {
        "no patterns for this query"
    } else {
        "no patterns match the current filter"
    }
}

fn summary_text(state: &AppState, view_data: &ViewData) -> String {
    let view = &state.view;
    let level = view_data
        .meta
        .pattern_level
        .map(PatternLevel::as_str)
        .unwrap_or("--");
    let filter = if view.filter().is_empty() {
        "none".to_owned()
    } else {
        view.filter().summary()
    };
    let sort = match view.sort().active() {
        Some(spec) => format!("{} {}", spec.field.label(), spec.direction.as_str()),
        None => "none".to_owned(),
    };
    let grouping = if view.group_by().is_empty() {
        "ungrouped".to_owned()
    } else {
        format!("by {}", view.group_by().join(","))
    };
    format!(
        "{} patterns | {} groups | {grouping} | level {level} | {} view | filter: {filter} | sort: {sort}",
        view.total_rows(),
        view.group_count(),
        view.display_mode().as_str(),
    )
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if view_data.help_visible || view_data.conditions.is_some() {
        return String::new();
    }

    let mode = match state.mode {
        AppMode::Nav => "NAV",
        AppMode::Prompt(_) => "PROMPT",
    };
    let mut default = "j/k g/G | enter open/drill | h/l s sort | / O f filter | m mode | e a R E x edit | c group | r refresh | ? help | ctrl+q".to_owned();
    if view_data.fetch.in_flight.is_some() {
        default = format!("loading | {default}");
    }
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {default}"),
        None => format!("{mode} | {default}"),
    }
}

fn prompt_overlay_text(kind: PromptKind, prompt: &PromptUiState) -> String {
    let hint = match (kind, &prompt.target) {
        (PromptKind::OwnerFilter, _) => format!(
            "owners separated by commas; {NO_OWNER} selects unassigned patterns; empty clears"
        ),
        (PromptKind::EditOwners, Some(row)) => {
            let mut hint = format!("owners for {} separated by commas", row.signature);
            if row.strategy_enabled {
                hint.push_str("; alerting is on, keep at least one");
            }
            hint
        }
        (PromptKind::EditRemark, Some(row)) => match latest_remark(&row.remark) {
            Some(latest) => format!(
                "edit latest remark on {} ({} at {})",
                row.signature,
                latest.username,
                format_remark_time(latest.create_time)
            ),
            None => format!("edit latest remark on {}", row.signature),
        },
        (PromptKind::AddRemark, Some(row)) => match latest_remark(&row.remark) {
            Some(latest) => format!(
                "remark for {}\nlatest: {} ({} at {})",
                row.signature,
                latest.remark,
                latest.username,
                format_remark_time(latest.create_time)
            ),
            None => format!("remark for {}", row.signature),
        },
        (_, None) => String::new(),
    };
    format!("{hint}\n\n> {}_\n\nenter submit | esc cancel | ctrl+u clear", prompt.input)
}

fn conditions_overlay_text(overlay: &ConditionsOverlay) -> String {
    let mut lines = overlay
        .conditions
        .iter()
        .map(Condition::display)
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines.push("esc close".to_owned());
    lines.join("\n")
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | ? help\n\
nav: j/k up/down | ctrl+d/u half page | g/G first/last | moving past the last row loads more\n\
nav: enter/space toggle group or show drill-down conditions | c group search conditions\n\
sort: h/l pick column | s cycle asc/desc/none\n\
filter: / owners | O toggle no_owner | f cycle remarked/no_remark/all\n\
view: m group/flatten | r refresh\n\
edit: e owners | a toggle alerting | R add remark | E edit latest remark | x delete latest remark\n\
prompt: type text | backspace | ctrl+u clear | enter submit | esc cancel"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
