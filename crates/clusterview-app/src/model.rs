// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternLevel {
    #[serde(rename = "01")]
    L01,
    #[serde(rename = "03")]
    L03,
    #[serde(rename = "05")]
    L05,
    #[serde(rename = "07")]
    L07,
    #[serde(rename = "09")]
    L09,
}

impl PatternLevel {
    pub const ALL: [Self; 5] = [Self::L01, Self::L03, Self::L05, Self::L07, Self::L09];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::L01 => "01",
            Self::L03 => "03",
            Self::L05 => "05",
            Self::L07 => "07",
            Self::L09 => "09",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "01" => Some(Self::L01),
            "03" => Some(Self::L03),
            "05" => Some(Self::L05),
            "07" => Some(Self::L07),
            "09" => Some(Self::L09),
            _ => None,
        }
    }

    /// Search field holding the signature for this sensitivity level.
    pub fn dist_field(self) -> String {
        format!("__dist_{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Count,
    Percentage,
    YearOnYearCount,
    YearOnYearPercentage,
}

impl SortField {
    pub const ALL: [Self; 4] = [
        Self::Count,
        Self::Percentage,
        Self::YearOnYearCount,
        Self::YearOnYearPercentage,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Percentage => "percentage",
            Self::YearOnYearCount => "year_on_year_count",
            Self::YearOnYearPercentage => "year_on_year_percentage",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Percentage => "share",
            Self::YearOnYearCount => "yoy count",
            Self::YearOnYearPercentage => "yoy change",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "count" => Some(Self::Count),
            "percentage" => Some(Self::Percentage),
            "year_on_year_count" => Some(Self::YearOnYearCount),
            "year_on_year_percentage" => Some(Self::YearOnYearPercentage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Group,
    Flatten,
}

impl DisplayMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Flatten => "flatten",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "group" => Some(Self::Group),
            "flatten" => Some(Self::Flatten),
            _ => None,
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::Group => Self::Flatten,
            Self::Flatten => Self::Group,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remark {
    pub remark: String,
    #[serde(default)]
    pub username: String,
    #[serde(with = "time::serde::timestamp")]
    pub create_time: OffsetDateTime,
}

/// One clustered log pattern as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRow {
    pub signature: String,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub origin_pattern: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub year_on_year_count: i64,
    #[serde(default)]
    pub year_on_year_percentage: f64,
    #[serde(default)]
    pub is_new_class: bool,
    #[serde(default, deserialize_with = "loose_string_list")]
    pub group: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub owners: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub remark: Vec<Remark>,
    #[serde(default)]
    pub strategy_enabled: bool,
    #[serde(default)]
    pub strategy_id: Option<StrategyId>,
}

impl PatternRow {
    pub fn metric(&self, field: SortField) -> f64 {
        match field {
            SortField::Count => self.count as f64,
            SortField::Percentage => self.percentage,
            SortField::YearOnYearCount => self.year_on_year_count as f64,
            SortField::YearOnYearPercentage => self.year_on_year_percentage,
        }
    }

    /// Value of the grouping dimension at `index`; missing values read as empty.
    pub fn group_value(&self, index: usize) -> &str {
        self.group.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn has_strategy(&self) -> bool {
        self.strategy_id.is_some_and(|id| id.get() > 0)
    }
}

/// Identity of a pattern row inside its group bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRef {
    pub signature: String,
    pub group: Vec<String>,
}

impl RowRef {
    pub fn of(row: &PatternRow) -> Self {
        Self {
            signature: row.signature.clone(),
            group: row.group.clone(),
        }
    }

    pub fn matches(&self, row: &PatternRow) -> bool {
        self.signature == row.signature && self.group == row.group
    }
}

/// A server-confirmed change to one editable field. Everything else on the
/// row stays as the latest fetch left it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowPatch {
    Owners(Vec<String>),
    Strategy {
        enabled: bool,
        strategy_id: Option<StrategyId>,
    },
    Remarks(Vec<Remark>),
}

impl RowPatch {
    pub fn apply(&self, row: &mut PatternRow) {
        match self {
            Self::Owners(owners) => row.owners = owners.clone(),
            Self::Strategy {
                enabled,
                strategy_id,
            } => {
                row.strategy_enabled = *enabled;
                row.strategy_id = *strategy_id;
            }
            Self::Remarks(remarks) => row.remark = remarks.clone(),
        }
    }
}

/// Most recent remark by `create_time`; on ties the earliest entry wins.
pub fn latest_remark(remarks: &[Remark]) -> Option<&Remark> {
    let mut iter = remarks.iter();
    let first = iter.next()?;
    Some(iter.fold(first, |latest, current| {
        if current.create_time > latest.create_time {
            current
        } else {
            latest
        }
    }))
}

pub fn remark_display(remarks: &[Remark]) -> &str {
    latest_remark(remarks)
        .map(|remark| remark.remark.as_str())
        .unwrap_or("--")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSpan<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

/// Splits `#...#` placeholder tokens out of a pattern.
pub fn placeholder_spans(pattern: &str) -> Vec<PatternSpan<'_>> {
    let mut spans = Vec::new();
    let mut rest = pattern;
    while let Some(open) = rest.find('#') {
        let Some(close) = rest[open + 1..].find('#') else {
            break;
        };
        let end = open + 1 + close + 1;
        if open > 0 {
            spans.push(PatternSpan::Text(&rest[..open]));
        }
        spans.push(PatternSpan::Placeholder(&rest[open..end]));
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        spans.push(PatternSpan::Text(rest));
    }
    spans
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseScalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Other(IgnoredAny),
}

impl LooseScalar {
    fn into_string(self) -> String {
        match self {
            Self::Text(value) => value,
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Other(_) => String::new(),
        }
    }
}

fn loose_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Option<LooseScalar>>>::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .map(|value| value.map(LooseScalar::into_string).unwrap_or_default())
        .collect())
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::{
        PatternLevel, PatternRow, PatternSpan, Remark, SortField, latest_remark,
        placeholder_spans, remark_display,
    };
    use time::OffsetDateTime;

    fn remark(text: &str, at: i64) -> Remark {
        Remark {
            remark: text.to_owned(),
            username: "ops".to_owned(),
            create_time: OffsetDateTime::from_unix_timestamp(at).expect("valid timestamp"),
        }
    }

    #[test]
    fn latest_remark_uses_create_time_not_insertion_order() {
        let remarks = vec![remark("newest", 300), remark("oldest", 100), remark("mid", 200)];
        assert_eq!(remark_display(&remarks), "newest");

        let tied = vec![remark("first", 100), remark("second", 100)];
        assert_eq!(latest_remark(&tied).map(|r| r.remark.as_str()), Some("first"));
    }

    #[test]
    fn remark_display_falls_back_to_dashes() {
        assert_eq!(remark_display(&[]), "--");
    }

    #[test]
    fn placeholder_spans_split_hash_tokens() {
        let spans = placeholder_spans("user #NUMBER# logged in from #IP#");
        assert_eq!(
            spans,
            vec![
                PatternSpan::Text("user "),
                PatternSpan::Placeholder("#NUMBER#"),
                PatternSpan::Text(" logged in from "),
                PatternSpan::Placeholder("#IP#"),
            ]
        );
        assert_eq!(
            placeholder_spans("dangling # marker"),
            vec![PatternSpan::Text("dangling # marker")]
        );
        assert!(placeholder_spans("").is_empty());
    }

    #[test]
    fn pattern_row_decodes_loose_group_values() -> anyhow::Result<()> {
        let row: PatternRow = serde_json::from_str(
            r#"{"signature":"abc","count":3,"percentage":1.5,"group":["api",7,null,{"x":1}],"owners":null,"remark":[{"remark":"hi","username":"bo","create_time":1700000000}]}"#,
        )?;
        assert_eq!(row.group, vec!["api", "7", "", ""]);
        assert!(row.owners.is_empty());
        assert_eq!(row.remark.len(), 1);
        assert_eq!(row.group_value(5), "");
        assert!(!row.has_strategy());
        Ok(())
    }

    #[test]
    fn missing_group_decodes_as_empty() -> anyhow::Result<()> {
        let row: PatternRow = serde_json::from_str(r#"{"signature":"abc","group":null}"#)?;
        assert!(row.group.is_empty());
        assert_eq!(row.metric(SortField::Count), 0.0);
        Ok(())
    }

    #[test]
    fn pattern_level_round_trips_and_builds_dist_field() {
        for level in PatternLevel::ALL {
            assert_eq!(PatternLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(PatternLevel::L05.dist_field(), "__dist_05");
        assert_eq!(PatternLevel::parse("04"), None);
    }

    #[test]
    fn sort_field_parse_matches_wire_names() {
        for field in SortField::ALL {
            assert_eq!(SortField::parse(field.as_str()), Some(field));
        }
    }
}
