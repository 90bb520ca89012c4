// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

use crate::{PatternRow, StrategyId};

/// Grouping dimension to value for the row; missing values map to `""`.
pub fn groups_map(group_by: &[String], row: &PatternRow) -> BTreeMap<String, String> {
    group_by
        .iter()
        .enumerate()
        .map(|(index, field)| (field.clone(), row.group_value(index).to_owned()))
        .collect()
}

/// Splits a comma/whitespace separated owner list, dropping blanks and repeats.
pub fn parse_owner_list(input: &str) -> Vec<String> {
    let mut owners: Vec<String> = Vec::new();
    for token in input.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = token.trim();
        if !token.is_empty() && !owners.iter().any(|owner| owner == token) {
            owners.push(token.to_owned());
        }
    }
    owners
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerUpdate {
    pub signature: String,
    pub origin_pattern: String,
    pub groups: BTreeMap<String, String>,
    pub owners: Vec<String>,
}

impl OwnerUpdate {
    pub fn for_row(row: &PatternRow, group_by: &[String], owners: Vec<String>) -> Result<Self> {
        if row.strategy_enabled && owners.is_empty() {
            bail!(
                "cannot remove the last owner while alerting is on -- disable the strategy first"
            );
        }
        Ok(Self {
            signature: row.signature.clone(),
            origin_pattern: row.origin_pattern.clone(),
            groups: groups_map(group_by, row),
            owners,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyUpdate {
    pub signature: String,
    pub origin_pattern: String,
    pub groups: BTreeMap<String, String>,
    pub strategy_enabled: bool,
}

impl StrategyUpdate {
    pub fn for_row(row: &PatternRow, group_by: &[String], enabled: bool) -> Result<Self> {
        if enabled && row.owners.is_empty() {
            bail!("alerting needs at least one owner -- assign an owner and retry");
        }
        Ok(Self {
            signature: row.signature.clone(),
            origin_pattern: row.origin_pattern.clone(),
            groups: groups_map(group_by, row),
            strategy_enabled: enabled,
        })
    }
}

/// Server acknowledgement of a strategy toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct StrategyAck {
    #[serde(default)]
    pub strategy_id: Option<StrategyId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemarkAction {
    Add,
    Update,
    Delete,
}

impl RemarkAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemarkEdit {
    #[serde(skip)]
    pub action: RemarkAction,
    pub signature: String,
    pub origin_pattern: String,
    pub groups: BTreeMap<String, String>,
    pub remark: String,
    /// Identifies the existing remark for update/delete.
    #[serde(
        with = "time::serde::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub create_time: Option<OffsetDateTime>,
}

impl RemarkEdit {
    pub fn add(row: &PatternRow, group_by: &[String], text: &str) -> Result<Self> {
        Ok(Self {
            action: RemarkAction::Add,
            remark: required_text(text)?,
            create_time: None,
            ..Self::base(row, group_by)
        })
    }

    pub fn update(
        row: &PatternRow,
        group_by: &[String],
        create_time: OffsetDateTime,
        text: &str,
    ) -> Result<Self> {
        ensure_remark_exists(row, create_time)?;
        Ok(Self {
            action: RemarkAction::Update,
            remark: required_text(text)?,
            create_time: Some(create_time),
            ..Self::base(row, group_by)
        })
    }

    pub fn delete(
        row: &PatternRow,
        group_by: &[String],
        create_time: OffsetDateTime,
    ) -> Result<Self> {
        let existing = ensure_remark_exists(row, create_time)?;
        Ok(Self {
            action: RemarkAction::Delete,
            remark: existing,
            create_time: Some(create_time),
            ..Self::base(row, group_by)
        })
    }

    fn base(row: &PatternRow, group_by: &[String]) -> Self {
        Self {
            action: RemarkAction::Add,
            signature: row.signature.clone(),
            origin_pattern: row.origin_pattern.clone(),
            groups: groups_map(group_by, row),
            remark: String::new(),
            create_time: None,
        }
    }
}

fn required_text(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        bail!("remark text is required -- enter a remark and retry");
    }
    Ok(text.to_owned())
}

fn ensure_remark_exists(row: &PatternRow, create_time: OffsetDateTime) -> Result<String> {
    match row.remark.iter().find(|remark| remark.create_time == create_time) {
        Some(remark) => Ok(remark.remark.clone()),
        None => bail!("remark not found on pattern {}", row.signature),
    }
}
