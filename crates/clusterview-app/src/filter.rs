// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::PatternRow;

/// Owner token selecting rows that have nobody assigned.
pub const NO_OWNER: &str = "no_owner";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemarkFilter {
    Remarked,
    NoRemark,
}

impl RemarkFilter {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remarked => "remarked",
            Self::NoRemark => "no_remark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "remarked" => Some(Self::Remarked),
            "no_remark" => Some(Self::NoRemark),
            _ => None,
        }
    }

    /// none -> remarked -> no_remark -> none
    pub const fn cycle(current: Option<Self>) -> Option<Self> {
        match current {
            None => Some(Self::Remarked),
            Some(Self::Remarked) => Some(Self::NoRemark),
            Some(Self::NoRemark) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    pub owners: BTreeSet<String>,
    pub remark: Option<RemarkFilter>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty() && self.remark.is_none()
    }

    pub fn matches(&self, row: &PatternRow) -> bool {
        self.owner_matches(row) && self.remark_matches(row)
    }

    /// `no_owner` on its own selects unassigned rows. Mixed with names it is
    /// just another owner token.
    fn owner_matches(&self, row: &PatternRow) -> bool {
        if self.owners.is_empty() {
            return true;
        }
        if self.owners.len() == 1 && self.owners.contains(NO_OWNER) {
            return row.owners.is_empty();
        }
        row.owners.iter().any(|owner| self.owners.contains(owner))
    }

    fn remark_matches(&self, row: &PatternRow) -> bool {
        match self.remark {
            None => true,
            Some(RemarkFilter::Remarked) => !row.remark.is_empty(),
            Some(RemarkFilter::NoRemark) => row.remark.is_empty(),
        }
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.owners.is_empty() {
            parts.push(format!(
                "owners: {}",
                self.owners.iter().cloned().collect::<Vec<_>>().join(",")
            ));
        }
        if let Some(remark) = self.remark {
            parts.push(format!("remark: {}", remark.as_str()));
        }
        parts.join(" ")
    }
}
