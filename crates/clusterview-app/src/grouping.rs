// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::HashMap;
use std::fmt;

use crate::PatternRow;

/// Group key used when no grouping dimensions are configured.
pub const UNGROUPED_KEY: &str = "#";

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(String);

impl GroupKey {
    /// Joins `dimension=value` pairs with `" | "`, or `#` without dimensions.
    pub fn build(group_by: &[String], row: &PatternRow) -> Self {
        if group_by.is_empty() {
            return Self(UNGROUPED_KEY.to_owned());
        }

        let parts = group_by
            .iter()
            .enumerate()
            .map(|(index, field)| format!("{field}={}", row.group_value(index)))
            .collect::<Vec<_>>();
        Self(parts.join(" | "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hash(&self) -> GroupHash {
        GroupHash::of(&self.0)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short FNV-1a hash of a group key. Collisions are tolerated: it only
/// identifies open/closed state, membership uses the exact key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupHash(u32);

impl GroupHash {
    pub fn of(value: &str) -> Self {
        let hash = value.bytes().fold(FNV_OFFSET, |hash, byte| {
            (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
        });
        Self(hash)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GroupHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub key: GroupKey,
    pub hash: GroupHash,
    pub sequence: usize,
    pub data: PatternRow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupHeader {
    pub key: GroupKey,
    pub hash: GroupHash,
    pub child_count: usize,
    pub open: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    pub key: GroupKey,
    pub hash: GroupHash,
    pub sequence: usize,
    pub data: PatternRow,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayRow {
    Header(GroupHeader),
    Data(DataRow),
}

impl DisplayRow {
    pub fn hash(&self) -> GroupHash {
        match self {
            Self::Header(header) => header.hash,
            Self::Data(row) => row.hash,
        }
    }

    pub fn key(&self) -> &GroupKey {
        match self {
            Self::Header(header) => &header.key,
            Self::Data(row) => &row.key,
        }
    }

    pub fn is_hidden(&self) -> bool {
        match self {
            Self::Header(header) => header.hidden,
            Self::Data(row) => row.hidden,
        }
    }

    pub fn as_data(&self) -> Option<&DataRow> {
        match self {
            Self::Data(row) => Some(row),
            Self::Header(_) => None,
        }
    }

    pub fn as_header(&self) -> Option<&GroupHeader> {
        match self {
            Self::Header(header) => Some(header),
            Self::Data(_) => None,
        }
    }

    pub fn is_visible_data(&self) -> bool {
        matches!(self, Self::Data(row) if !row.hidden)
    }
}

/// Tags raw rows with their group key and a running sequence index.
pub fn normalize(rows: Vec<PatternRow>, group_by: &[String]) -> Vec<NormalizedRow> {
    rows.into_iter()
        .enumerate()
        .map(|(sequence, data)| {
            let key = GroupKey::build(group_by, &data);
            NormalizedRow {
                hash: key.hash(),
                key,
                sequence,
                data,
            }
        })
        .collect()
}

/// Buckets rows by key in first-seen order and emits one header per bucket
/// followed by its members. The first group starts open.
pub fn index_groups(rows: Vec<NormalizedRow>) -> Vec<DisplayRow> {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut buckets: HashMap<GroupKey, Vec<NormalizedRow>> = HashMap::new();
    for row in rows {
        if !buckets.contains_key(&row.key) {
            order.push(row.key.clone());
        }
        buckets.entry(row.key.clone()).or_default().push(row);
    }

    let mut out = Vec::new();
    for key in order {
        let members = buckets.remove(&key).unwrap_or_default();
        out.push(DisplayRow::Header(GroupHeader {
            hash: key.hash(),
            key,
            child_count: members.len(),
            open: false,
            hidden: false,
        }));
        out.extend(members.into_iter().map(|row| {
            DisplayRow::Data(DataRow {
                key: row.key,
                hash: row.hash,
                sequence: row.sequence,
                data: row.data,
                hidden: false,
            })
        }));
    }

    let any_open = out
        .iter()
        .any(|row| matches!(row, DisplayRow::Header(header) if header.open));
    if !any_open
        && let Some(DisplayRow::Header(first)) = out.first_mut()
    {
        first.open = true;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{DisplayRow, GroupHash, GroupKey, UNGROUPED_KEY, index_groups, normalize};
    use crate::PatternRow;
    use std::collections::BTreeSet;

    fn row(signature: &str, group: &[&str]) -> PatternRow {
        PatternRow {
            signature: signature.to_owned(),
            pattern: String::new(),
            origin_pattern: String::new(),
            count: 1,
            percentage: 0.0,
            year_on_year_count: 0,
            year_on_year_percentage: 0.0,
            is_new_class: false,
            group: group.iter().map(|value| (*value).to_owned()).collect(),
            owners: Vec::new(),
            remark: Vec::new(),
            strategy_enabled: false,
            strategy_id: None,
        }
    }

    fn dims(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn group_key_joins_dimension_pairs() {
        let key = GroupKey::build(&dims(&["service", "level"]), &row("a", &["api", "error"]));
        assert_eq!(key.as_str(), "service=api | level=error");
    }

    #[test]
    fn group_key_coerces_missing_values_to_empty() {
        let key = GroupKey::build(&dims(&["service", "level"]), &row("a", &["api"]));
        assert_eq!(key.as_str(), "service=api | level=");
    }

    #[test]
    fn zero_dimensions_yield_single_sentinel_key() {
        let normalized = normalize(
            vec![row("a", &["x"]), row("b", &[]), row("c", &["y", "z"])],
            &[],
        );
        let keys = normalized
            .iter()
            .map(|row| row.key.as_str().to_owned())
            .collect::<BTreeSet<_>>();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec![UNGROUPED_KEY]);
    }

    #[test]
    fn sequence_runs_across_groups() {
        let normalized = normalize(
            vec![row("a", &["x"]), row("b", &["y"]), row("c", &["x"])],
            &dims(&["service"]),
        );
        let sequences = normalized.iter().map(|row| row.sequence).collect::<Vec<_>>();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn hash_is_deterministic_and_order_sensitive() {
        assert_eq!(GroupHash::of("service=api"), GroupHash::of("service=api"));
        assert_ne!(GroupHash::of("ab"), GroupHash::of("ba"));
        assert_eq!(GroupHash::of("").to_string(), "811c9dc5");
        assert_eq!(GroupHash::of("a").to_string().len(), 8);
    }

    #[test]
    fn index_emits_one_header_per_distinct_key_in_first_seen_order() {
        let normalized = normalize(
            vec![
                row("a1", &["a"]),
                row("b1", &["b"]),
                row("a2", &["a"]),
                row("c1", &["c"]),
                row("b2", &["b"]),
            ],
            &dims(&["service"]),
        );
        let rows = index_groups(normalized);

        let headers = rows
            .iter()
            .filter_map(DisplayRow::as_header)
            .map(|header| (header.key.as_str().to_owned(), header.child_count))
            .collect::<Vec<_>>();
        assert_eq!(
            headers,
            vec![
                ("service=a".to_owned(), 2),
                ("service=b".to_owned(), 2),
                ("service=c".to_owned(), 1),
            ]
        );

        let layout = rows
            .iter()
            .map(|row| match row {
                DisplayRow::Header(_) => "H".to_owned(),
                DisplayRow::Data(data) => data.data.signature.clone(),
            })
            .collect::<Vec<_>>();
        assert_eq!(layout, vec!["H", "a1", "a2", "H", "b1", "b2", "H", "c1"]);
    }

    #[test]
    fn members_share_header_hash_and_first_group_opens() {
        let rows = index_groups(normalize(
            vec![row("a1", &["a"]), row("b1", &["b"]), row("a2", &["a"])],
            &dims(&["service"]),
        ));

        let mut current = None;
        for display in &rows {
            match display {
                DisplayRow::Header(header) => current = Some(header.hash),
                DisplayRow::Data(data) => assert_eq!(Some(data.hash), current),
            }
        }

        let open = rows
            .iter()
            .filter_map(DisplayRow::as_header)
            .map(|header| header.open)
            .collect::<Vec<_>>();
        assert_eq!(open, vec![true, false]);
    }

    #[test]
    fn empty_input_produces_no_rows() {
        assert!(index_groups(Vec::new()).is_empty());
    }
}
