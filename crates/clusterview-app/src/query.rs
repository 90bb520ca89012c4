// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{PatternLevel, PatternRow};

pub const DEFAULT_KEYWORD: &str = "*";
pub const DEFAULT_MAX_ROWS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[serde(rename = "is")]
    Is,
    #[serde(rename = "=")]
    Equals,
}

impl ConditionOperator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Is => "is",
            Self::Equals => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Vec<String>,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: vec![value.into()],
        }
    }

    pub fn display(&self) -> String {
        format!("{} {} {}", self.field, self.operator.as_str(), self.value.join(","))
    }
}

/// Request body for a pattern fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternQuery {
    pub keyword: String,
    #[serde(with = "time::serde::timestamp")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub end_time: OffsetDateTime,
    pub addition: Vec<Condition>,
    pub pattern_level: PatternLevel,
    pub group_by: Vec<String>,
    pub year_on_year_hour: u32,
    pub size: u32,
}

impl PatternQuery {
    pub fn validate(&self) -> Result<()> {
        if self.end_time <= self.start_time {
            bail!("query end time must be after start time");
        }
        if self.size == 0 {
            bail!("query size must be positive");
        }
        if self.group_by.iter().any(|field| field.trim().is_empty()) {
            bail!("group_by contains a blank field name -- remove it and retry");
        }
        Ok(())
    }

    pub fn shows_year_on_year(&self) -> bool {
        self.year_on_year_hour >= 1
    }
}

/// Conditions that narrow a raw log search down to one pattern row: one
/// `is` condition per grouping dimension, then the signature on the
/// level-specific dist field.
pub fn drill_down_additions(
    row: &PatternRow,
    group_by: &[String],
    level: PatternLevel,
) -> Vec<Condition> {
    let mut additions = group_by
        .iter()
        .enumerate()
        .map(|(index, field)| Condition::new(field, ConditionOperator::Is, row.group_value(index)))
        .collect::<Vec<_>>();
    additions.push(Condition::new(
        level.dist_field(),
        ConditionOperator::Is,
        row.signature.clone(),
    ));
    additions
}

/// Adds a whole group as search conditions.
pub fn group_search_conditions(group_by: &[String], values: &[String]) -> Vec<Condition> {
    group_by
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let value = values.get(index).map(String::as_str).unwrap_or("");
            Condition::new(field, ConditionOperator::Equals, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ConditionOperator, PatternQuery, drill_down_additions, group_search_conditions};
    use crate::{PatternLevel, PatternRow};
    use anyhow::Result;
    use time::{Duration, OffsetDateTime};

    fn row() -> PatternRow {
        PatternRow {
            signature: "7f3a".to_owned(),
            pattern: String::new(),
            origin_pattern: String::new(),
            count: 1,
            percentage: 0.0,
            year_on_year_count: 0,
            year_on_year_percentage: 0.0,
            is_new_class: false,
            group: vec!["api".to_owned()],
            owners: Vec::new(),
            remark: Vec::new(),
            strategy_enabled: false,
            strategy_id: None,
        }
    }

    fn query() -> PatternQuery {
        let end = OffsetDateTime::UNIX_EPOCH + Duration::hours(1);
        PatternQuery {
            keyword: "*".to_owned(),
            start_time: end - Duration::minutes(15),
            end_time: end,
            addition: Vec::new(),
            pattern_level: PatternLevel::L05,
            group_by: vec!["service".to_owned()],
            year_on_year_hour: 0,
            size: 10_000,
        }
    }

    #[test]
    fn drill_down_appends_signature_condition() {
        let dims = vec!["service".to_owned(), "host".to_owned()];
        let additions = drill_down_additions(&row(), &dims, PatternLevel::L07);
        let rendered = additions.iter().map(|c| c.display()).collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec!["service is api", "host is ", "__dist_07 is 7f3a"]
        );
    }

    #[test]
    fn group_search_uses_equals_operator() {
        let conditions = group_search_conditions(&["service".to_owned()], &["api".to_owned()]);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].operator, ConditionOperator::Equals);
        assert_eq!(conditions[0].value, vec!["api"]);
    }

    #[test]
    fn query_serializes_wire_names() -> Result<()> {
        let json = serde_json::to_value(query())?;
        assert_eq!(json["pattern_level"], "05");
        assert_eq!(json["start_time"], 2700);
        assert_eq!(json["end_time"], 3600);
        assert_eq!(json["group_by"][0], "service");
        Ok(())
    }

    #[test]
    fn validate_rejects_inverted_range_and_zero_size() {
        assert!(query().validate().is_ok());
        let mut inverted = query();
        std::mem::swap(&mut inverted.start_time, &mut inverted.end_time);
        assert!(inverted.validate().is_err());
        let empty = PatternQuery { size: 0, ..query() };
        assert!(empty.validate().is_err());
        assert!(!query().shows_year_on_year());
    }
}
