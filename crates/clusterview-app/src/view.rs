// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use crate::{
    DataRow, DisplayMode, DisplayRow, FilterSpec, GroupHash, GroupHeader, PageWindow,
    Pagination, PatternRow, RemarkFilter, RowPatch, RowRef, SortField, SortSpec, SortState,
    index_groups, normalize,
};

/// Everything `recompute` reads besides the indexed rows.
#[derive(Debug, Clone, Copy)]
pub struct ViewInput<'a> {
    pub filter: &'a FilterSpec,
    pub sort: &'a SortState,
    pub display_mode: DisplayMode,
    pub open: &'a BTreeSet<GroupHash>,
}

/// Derives hidden flags, open state and row order from the output of
/// `index_groups`. Groups keep their first-seen order; only data rows move.
/// Flatten mode drops the headers and sorts across all groups.
pub fn recompute(base: &[DisplayRow], input: &ViewInput<'_>) -> Vec<DisplayRow> {
    let mut groups: Vec<(GroupHeader, Vec<DataRow>)> = Vec::new();
    for row in base {
        match row {
            DisplayRow::Header(header) => groups.push((header.clone(), Vec::new())),
            DisplayRow::Data(data) => {
                let mut data = data.clone();
                data.hidden = !input.filter.matches(&data.data);
                if let Some((_, members)) = groups.last_mut() {
                    members.push(data);
                }
            }
        }
    }

    match input.display_mode {
        DisplayMode::Flatten => {
            let mut rows = groups
                .into_iter()
                .flat_map(|(_, members)| members)
                .collect::<Vec<_>>();
            input.sort.sort_rows(&mut rows);
            rows.into_iter().map(DisplayRow::Data).collect()
        }
        DisplayMode::Group => {
            let mut out = Vec::with_capacity(base.len());
            for (mut header, mut members) in groups {
                input.sort.sort_rows(&mut members);
                header.hidden = members.iter().all(|member| member.hidden);
                header.open = input.open.contains(&header.hash);
                out.push(DisplayRow::Header(header));
                out.extend(members.into_iter().map(DisplayRow::Data));
            }
            out
        }
    }
}

/// The result table: indexed rows plus the user's view controls.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternView {
    group_by: Vec<String>,
    base: Vec<DisplayRow>,
    rows: Vec<DisplayRow>,
    open: BTreeSet<GroupHash>,
    filter: FilterSpec,
    sort: SortState,
    display_mode: DisplayMode,
    pagination: Pagination,
    window: PageWindow,
}

impl Default for PatternView {
    fn default() -> Self {
        Self::new(Pagination::default().page_size(), DisplayMode::default())
    }
}

impl PatternView {
    pub fn new(page_size: usize, display_mode: DisplayMode) -> Self {
        Self {
            group_by: Vec::new(),
            base: Vec::new(),
            rows: Vec::new(),
            open: BTreeSet::new(),
            filter: FilterSpec::default(),
            sort: SortState::default(),
            display_mode,
            pagination: Pagination::new(page_size),
            window: PageWindow::default(),
        }
    }

    /// Rebuilds from a fresh fetch. Open state goes back to "first group
    /// open"; filter, sort and display mode carry over.
    pub fn replace_rows(&mut self, group_by: Vec<String>, rows: Vec<PatternRow>) {
        self.base = index_groups(normalize(rows, &group_by));
        self.group_by = group_by;
        self.open = self
            .base
            .iter()
            .filter_map(DisplayRow::as_header)
            .filter(|header| header.open)
            .map(|header| header.hash)
            .collect();
        self.pagination.reset();
        self.rederive();
    }

    /// Returns the new open state, or `None` when no group has that hash.
    pub fn toggle_group(&mut self, hash: GroupHash) -> Option<bool> {
        if !self
            .base
            .iter()
            .any(|row| matches!(row, DisplayRow::Header(header) if header.hash == hash))
        {
            return None;
        }
        let open = if self.open.remove(&hash) {
            false
        } else {
            self.open.insert(hash);
            true
        };
        self.rederive();
        Some(open)
    }

    pub fn set_owner_filter(&mut self, owners: BTreeSet<String>) {
        self.filter.owners = owners;
        self.reset_and_rederive();
    }

    pub fn set_remark_filter(&mut self, remark: Option<RemarkFilter>) {
        self.filter.remark = remark;
        self.reset_and_rederive();
    }

    pub fn cycle_sort(&mut self, field: SortField) -> Option<SortSpec> {
        let active = self.sort.cycle(field);
        self.reset_and_rederive();
        active
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.display_mode = mode;
        self.reset_and_rederive();
    }

    /// Grows the window by one page. No-op once everything is covered.
    pub fn load_more(&mut self) -> bool {
        if !self.pagination.advance(&self.window) {
            return false;
        }
        self.window = self.pagination.window(&self.rows);
        true
    }

    /// Applies a server-confirmed field change to the current row. Counts and
    /// shares keep whatever the latest fetch delivered, and paging is left
    /// alone so the user keeps their place.
    pub fn patch_row(&mut self, target: &RowRef, patch: &RowPatch) -> bool {
        let mut patched = false;
        for row in &mut self.base {
            if let DisplayRow::Data(data) = row
                && target.matches(&data.data)
            {
                patch.apply(&mut data.data);
                patched = true;
            }
        }
        if patched {
            self.rederive();
        }
        patched
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    pub fn rows(&self) -> &[DisplayRow] {
        &self.rows
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    pub fn sort(&self) -> &SortState {
        &self.sort
    }

    pub const fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub const fn window(&self) -> PageWindow {
        self.window
    }

    pub const fn page(&self) -> usize {
        self.pagination.page()
    }

    pub fn is_open(&self, hash: GroupHash) -> bool {
        self.open.contains(&hash)
    }

    pub fn is_empty_state(&self) -> bool {
        self.window.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.base.iter().filter(|row| row.as_data().is_some()).count()
    }

    pub fn group_count(&self) -> usize {
        self.base.iter().filter(|row| row.as_header().is_some()).count()
    }

    /// Rows that actually reach the screen: every non-hidden header, plus the
    /// windowed data rows of open groups.
    pub fn rendered_rows(&self) -> Vec<&DisplayRow> {
        let mut out = Vec::new();
        let mut group_open = true;
        for (index, row) in self.rows.iter().enumerate() {
            match row {
                DisplayRow::Header(header) => {
                    group_open = header.open;
                    if !header.hidden {
                        out.push(row);
                    }
                }
                DisplayRow::Data(data) => {
                    if !data.hidden && group_open && self.window.includes(index) {
                        out.push(row);
                    }
                }
            }
        }
        out
    }

    /// Non-hidden members of a group, for header counts.
    pub fn visible_children(&self, hash: GroupHash) -> usize {
        self.rows
            .iter()
            .filter(|row| row.hash() == hash && row.is_visible_data())
            .count()
    }

    fn reset_and_rederive(&mut self) {
        self.pagination.reset();
        self.rederive();
    }

    fn rederive(&mut self) {
        let input = ViewInput {
            filter: &self.filter,
            sort: &self.sort,
            display_mode: self.display_mode,
            open: &self.open,
        };
        self.rows = recompute(&self.base, &input);
        self.window = self.pagination.window(&self.rows);
    }
}
