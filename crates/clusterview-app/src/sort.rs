// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cmp::Ordering;

use crate::{DataRow, SortDirection, SortField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

/// At most one active sort across the sortable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortState {
    active: Option<SortSpec>,
}

impl SortState {
    pub const fn active(&self) -> Option<SortSpec> {
        self.active
    }

    pub fn direction_for(&self, field: SortField) -> Option<SortDirection> {
        self.active
            .filter(|spec| spec.field == field)
            .map(|spec| spec.direction)
    }

    /// asc -> desc -> none on the same field; a different field starts at asc
    /// and clears the previous one.
    pub fn cycle(&mut self, field: SortField) -> Option<SortSpec> {
        self.active = match self.direction_for(field) {
            None => Some(SortSpec {
                field,
                direction: SortDirection::Asc,
            }),
            Some(SortDirection::Asc) => Some(SortSpec {
                field,
                direction: SortDirection::Desc,
            }),
            Some(SortDirection::Desc) => None,
        };
        self.active
    }

    pub fn set(&mut self, spec: Option<SortSpec>) {
        self.active = spec;
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn compare(&self, left: &DataRow, right: &DataRow) -> Ordering {
        let primary = match self.active {
            None => Ordering::Equal,
            Some(spec) => {
                let ordering = left
                    .data
                    .metric(spec.field)
                    .total_cmp(&right.data.metric(spec.field));
                match spec.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            }
        };
        primary.then_with(|| left.sequence.cmp(&right.sequence))
    }

    pub fn sort_rows(&self, rows: &mut [DataRow]) {
        rows.sort_by(|left, right| self.compare(left, right));
    }
}

#[cfg(test)]
mod tests {
    use super::{SortSpec, SortState};
    use crate::{DataRow, GroupKey, PatternRow, SortDirection, SortField};

    fn data_row(sequence: usize, count: i64, percentage: f64) -> DataRow {
        let key = GroupKey::build(&[], &sample(count, percentage));
        DataRow {
            hash: key.hash(),
            key,
            sequence,
            data: sample(count, percentage),
            hidden: false,
        }
    }

    fn sample(count: i64, percentage: f64) -> PatternRow {
        PatternRow {
            signature: format!("sig-{count}"),
            pattern: String::new(),
            origin_pattern: String::new(),
            count,
            percentage,
            year_on_year_count: -count,
            year_on_year_percentage: 0.0,
            is_new_class: false,
            group: Vec::new(),
            owners: Vec::new(),
            remark: Vec::new(),
            strategy_enabled: false,
            strategy_id: None,
        }
    }

    fn sequences(rows: &[DataRow]) -> Vec<usize> {
        rows.iter().map(|row| row.sequence).collect()
    }

    #[test]
    fn cycle_goes_asc_desc_none() {
        let mut state = SortState::default();
        assert_eq!(
            state.cycle(SortField::Count),
            Some(SortSpec {
                field: SortField::Count,
                direction: SortDirection::Asc
            })
        );
        assert_eq!(
            state.cycle(SortField::Count).map(|spec| spec.direction),
            Some(SortDirection::Desc)
        );
        assert_eq!(state.cycle(SortField::Count), None);
        assert_eq!(state.active(), None);
    }

    #[test]
    fn selecting_new_field_resets_previous() {
        let mut state = SortState::default();
        state.cycle(SortField::Count);
        state.cycle(SortField::Count);
        state.cycle(SortField::Percentage);
        assert_eq!(state.direction_for(SortField::Count), None);
        assert_eq!(
            state.direction_for(SortField::Percentage),
            Some(SortDirection::Asc)
        );
    }

    #[test]
    fn rows_order_by_metric_with_sequence_tiebreak() {
        let mut rows = vec![
            data_row(0, 5, 1.0),
            data_row(1, 9, 3.0),
            data_row(2, 5, 2.0),
            data_row(3, 1, 0.5),
        ];
        let mut state = SortState::default();

        state.cycle(SortField::Count);
        state.sort_rows(&mut rows);
        assert_eq!(sequences(&rows), vec![3, 0, 2, 1]);

        state.cycle(SortField::Count);
        state.sort_rows(&mut rows);
        assert_eq!(sequences(&rows), vec![1, 0, 2, 3]);

        state.cycle(SortField::Count);
        state.sort_rows(&mut rows);
        assert_eq!(sequences(&rows), vec![0, 1, 2, 3]);
    }

    #[test]
    fn year_on_year_fields_sort_on_their_own_metric() {
        let mut rows = vec![data_row(0, 1, 0.0), data_row(1, 3, 0.0), data_row(2, 2, 0.0)];
        let mut state = SortState::default();
        state.cycle(SortField::YearOnYearCount);
        state.sort_rows(&mut rows);
        assert_eq!(sequences(&rows), vec![1, 2, 0]);
    }
}
