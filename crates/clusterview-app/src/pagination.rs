// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::{Duration, Instant};

use crate::DisplayRow;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const LOAD_MORE_DEBOUNCE: Duration = Duration::from_millis(180);

/// Growing window over the derived row list. Every group header stays in
/// the window; data rows are cut after the `page * page_size`-th visible row
/// of an open group. `end` is that cutoff, exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageWindow {
    pub end: usize,
    pub visible_data_rows: usize,
    /// Data rows that pass the filter, open or collapsed.
    pub total_visible: usize,
    /// Data rows that pass the filter and sit in an open group.
    pub available: usize,
    pub has_more: bool,
}

impl PageWindow {
    pub fn compute(rows: &[DisplayRow], page: usize, page_size: usize) -> Self {
        let limit = page.max(1).saturating_mul(page_size.max(1));

        let mut window = Self::default();
        let mut group_open = true;
        for (index, row) in rows.iter().enumerate() {
            match row {
                DisplayRow::Header(header) => group_open = header.open,
                DisplayRow::Data(data) if !data.hidden => {
                    window.total_visible += 1;
                    if !group_open {
                        continue;
                    }
                    window.available += 1;
                    if window.visible_data_rows < limit {
                        window.visible_data_rows += 1;
                        window.end = index + 1;
                    }
                }
                DisplayRow::Data(_) => {}
            }
        }

        window.has_more = window.available > window.visible_data_rows;
        if !window.has_more {
            window.end = rows.len();
        }
        window
    }

    /// Whether the data row at `index` falls inside the window. Headers are
    /// always in.
    pub const fn includes(&self, index: usize) -> bool {
        index < self.end
    }

    pub const fn remaining(&self) -> usize {
        self.available.saturating_sub(self.visible_data_rows)
    }

    pub fn is_empty(&self) -> bool {
        self.total_visible == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: usize,
    page_size: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub const fn page(&self) -> usize {
        self.page
    }

    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn reset(&mut self) {
        self.page = 1;
    }

    pub fn window(&self, rows: &[DisplayRow]) -> PageWindow {
        PageWindow::compute(rows, self.page, self.page_size)
    }

    /// Moves to the next page only while the current window leaves rows out.
    pub fn advance(&mut self, current: &PageWindow) -> bool {
        if !current.has_more {
            return false;
        }
        self.page += 1;
        true
    }
}

/// Trailing-edge debounce for the "load more" trigger. Every `trigger`
/// restarts the quiet period; `poll` fires once the period has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    delay: Duration,
    pending_since: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(LOAD_MORE_DEBOUNCE)
    }
}

impl Debouncer {
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending_since: None,
        }
    }

    pub fn trigger(&mut self, now: Instant) {
        self.pending_since = Some(now);
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending_since {
            Some(since) if now.saturating_duration_since(since) >= self.delay => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.pending_since = None;
    }

    pub const fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }
}
