// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use crate::{
    DisplayMode, FilterSpec, GroupHash, NO_OWNER, PatternRow, PatternView, RemarkFilter,
    RowPatch, RowRef, SortField, SortSpec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    OwnerFilter,
    EditOwners,
    AddRemark,
    EditRemark,
}

impl PromptKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::OwnerFilter => "filter owners",
            Self::EditOwners => "set owners",
            Self::AddRemark => "add remark",
            Self::EditRemark => "edit remark",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Nav,
    Prompt(PromptKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub mode: AppMode,
    pub status_line: Option<String>,
    pub view: PatternView,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(PatternView::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    ReplaceRows {
        group_by: Vec<String>,
        rows: Vec<PatternRow>,
    },
    ToggleGroup(GroupHash),
    CycleSort(SortField),
    SetOwnerFilter(BTreeSet<String>),
    ToggleNoOwner,
    SetRemarkFilter(Option<RemarkFilter>),
    CycleRemarkFilter,
    SetDisplayMode(DisplayMode),
    ToggleDisplayMode,
    LoadMore,
    PatchRow {
        target: RowRef,
        patch: RowPatch,
    },
    OpenPrompt(PromptKind),
    ExitToNav,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    RowsReplaced { groups: usize, rows: usize },
    GroupToggled { hash: GroupHash, open: bool },
    SortChanged(Option<SortSpec>),
    FilterChanged(FilterSpec),
    DisplayModeChanged(DisplayMode),
    PageAdvanced(usize),
    RowPatched(String),
    ModeChanged(AppMode),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn new(view: PatternView) -> Self {
        Self {
            mode: AppMode::Nav,
            status_line: None,
            view,
        }
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::ReplaceRows { group_by, rows } => {
                self.view.replace_rows(group_by, rows);
                let groups = self.view.group_count();
                let rows = self.view.total_rows();
                vec![AppEvent::RowsReplaced { groups, rows }]
            }
            AppCommand::ToggleGroup(hash) => match self.view.toggle_group(hash) {
                Some(open) => vec![AppEvent::GroupToggled { hash, open }],
                None => Vec::new(),
            },
            AppCommand::CycleSort(field) => {
                let active = self.view.cycle_sort(field);
                let label = match active {
                    Some(spec) => {
                        format!("sort {} {}", spec.field.label(), spec.direction.as_str())
                    }
                    None => "sort cleared".to_owned(),
                };
                vec![AppEvent::SortChanged(active), self.set_status(&label)]
            }
            AppCommand::SetOwnerFilter(owners) => {
                self.view.set_owner_filter(owners);
                self.filter_changed()
            }
            AppCommand::ToggleNoOwner => {
                let mut owners = self.view.filter().owners.clone();
                if !owners.remove(NO_OWNER) {
                    owners.insert(NO_OWNER.to_owned());
                }
                self.view.set_owner_filter(owners);
                self.filter_changed()
            }
            AppCommand::SetRemarkFilter(remark) => {
                self.view.set_remark_filter(remark);
                self.filter_changed()
            }
            AppCommand::CycleRemarkFilter => {
                let next = RemarkFilter::cycle(self.view.filter().remark);
                self.view.set_remark_filter(next);
                self.filter_changed()
            }
            AppCommand::SetDisplayMode(mode) => self.change_display_mode(mode),
            AppCommand::ToggleDisplayMode => {
                let mode = self.view.display_mode().toggled();
                self.change_display_mode(mode)
            }
            AppCommand::LoadMore => {
                if self.view.load_more() {
                    vec![AppEvent::PageAdvanced(self.view.page())]
                } else {
                    Vec::new()
                }
            }
            AppCommand::PatchRow { target, patch } => {
                if self.view.patch_row(&target, &patch) {
                    vec![AppEvent::RowPatched(target.signature)]
                } else {
                    vec![self.set_status(&format!(
                        "pattern {} no longer listed",
                        target.signature
                    ))]
                }
            }
            AppCommand::OpenPrompt(kind) => {
                self.mode = AppMode::Prompt(kind);
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn filter_changed(&mut self) -> Vec<AppEvent> {
        let filter = self.view.filter().clone();
        let label = if filter.is_empty() {
            "filter cleared".to_owned()
        } else {
            format!("filter {}", filter.summary())
        };
        vec![AppEvent::FilterChanged(filter), self.set_status(&label)]
    }

    fn change_display_mode(&mut self, mode: DisplayMode) -> Vec<AppEvent> {
        self.view.set_display_mode(mode);
        vec![
            AppEvent::DisplayModeChanged(mode),
            self.set_status(&format!("{} view", mode.as_str())),
        ]
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}
