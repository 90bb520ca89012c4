// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use clusterview_api::Client;
use clusterview_app::{
    OwnerUpdate, PatternLevel, PatternQuery, PatternRow, Remark, RemarkAction, RemarkEdit,
    StrategyAck, StrategyId, StrategyUpdate, UserInfo, groups_map,
};
use clusterview_testkit::{PatternFaker, fixture_users};
use clusterview_tui::{AppRuntime, InternalEvent, PatternBatch};
use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

const DEMO_ROWS: u32 = 240;
const DEMO_USER: &str = "demo";

/// Query parameters that stay fixed for a session; only the time window
/// moves with each fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    pub keyword: String,
    pub pattern_level: PatternLevel,
    pub group_by: Vec<String>,
    pub year_on_year_hour: u32,
    pub size: u32,
    pub lookback: Duration,
}

impl QuerySettings {
    pub fn query_at(&self, now: OffsetDateTime) -> PatternQuery {
        PatternQuery {
            keyword: self.keyword.clone(),
            start_time: now - self.lookback,
            end_time: now,
            addition: Vec::new(),
            pattern_level: self.pattern_level,
            group_by: self.group_by.clone(),
            year_on_year_hour: self.year_on_year_hour,
            size: self.size,
        }
    }

    fn batch(&self, rows: Vec<PatternRow>) -> PatternBatch {
        PatternBatch {
            group_by: self.group_by.clone(),
            pattern_level: self.pattern_level,
            year_on_year_hour: self.year_on_year_hour,
            rows,
        }
    }
}

fn fetch_batch(client: &Client, settings: &QuerySettings) -> Result<PatternBatch> {
    let query = settings.query_at(OffsetDateTime::now_utc());
    let rows = client.fetch_patterns(&query)?;
    Ok(settings.batch(rows))
}

pub struct ApiRuntime {
    client: Client,
    settings: QuerySettings,
}

impl ApiRuntime {
    pub fn new(client: Client, settings: QuerySettings) -> Self {
        Self { client, settings }
    }
}

impl AppRuntime for ApiRuntime {
    fn fetch_patterns(&mut self) -> Result<PatternBatch> {
        fetch_batch(&self.client, &self.settings)
    }

    fn set_owners(&mut self, update: &OwnerUpdate) -> Result<Vec<String>> {
        self.client.set_owners(update)
    }

    fn update_strategy(&mut self, update: &StrategyUpdate) -> Result<StrategyAck> {
        self.client.update_strategy(update)
    }

    fn edit_remark(&mut self, edit: &RemarkEdit) -> Result<Vec<Remark>> {
        self.client.edit_remark(edit)
    }

    fn lookup_users(&mut self, usernames: &[String]) -> Result<Vec<UserInfo>> {
        self.client.lookup_users(usernames)
    }

    fn spawn_fetch(&mut self, request_id: u64, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        let settings = self.settings.clone();
        thread::Builder::new()
            .name(format!("pattern-fetch-{request_id}"))
            .spawn(move || {
                let event = match fetch_batch(&client, &settings) {
                    Ok(batch) => {
                        debug!(request_id, rows = batch.rows.len(), "pattern fetch finished");
                        InternalEvent::FetchCompleted { request_id, batch }
                    }
                    Err(error) => InternalEvent::FetchFailed {
                        request_id,
                        error: format!("{error:#}"),
                    },
                };
                if tx.send(event).is_err() {
                    warn!(request_id, "fetch result dropped, UI already closed");
                }
            })
            .context("spawn pattern fetch thread")?;
        Ok(())
    }
}

/// Offline backend over generated rows. Mutations stick for the session so
/// refreshes show them.
pub struct DemoRuntime {
    settings: QuerySettings,
    rows: Vec<PatternRow>,
    next_strategy_id: i64,
}

impl DemoRuntime {
    pub fn new(seed: u64, settings: QuerySettings) -> Self {
        let mut faker = PatternFaker::new(seed);
        let count = settings.size.min(DEMO_ROWS) as usize;
        let rows = faker.pattern_rows(count, &settings.group_by);
        let next_strategy_id = rows
            .iter()
            .filter_map(|row| row.strategy_id)
            .map(StrategyId::get)
            .max()
            .unwrap_or(0)
            + 1;
        info!(rows = rows.len(), seed, "demo runtime ready");
        Self {
            settings,
            rows,
            next_strategy_id,
        }
    }

    fn row_mut(
        &mut self,
        signature: &str,
        groups: &BTreeMap<String, String>,
    ) -> Result<&mut PatternRow> {
        let group_by = &self.settings.group_by;
        match self
            .rows
            .iter_mut()
            .find(|row| row.signature == signature && groups_map(group_by, row) == *groups)
        {
            Some(row) => Ok(row),
            None => bail!("pattern {signature} not found"),
        }
    }
}

impl AppRuntime for DemoRuntime {
    fn fetch_patterns(&mut self) -> Result<PatternBatch> {
        Ok(self.settings.batch(self.rows.clone()))
    }

    fn set_owners(&mut self, update: &OwnerUpdate) -> Result<Vec<String>> {
        let row = self.row_mut(&update.signature, &update.groups)?;
        row.owners = update.owners.clone();
        Ok(row.owners.clone())
    }

    fn update_strategy(&mut self, update: &StrategyUpdate) -> Result<StrategyAck> {
        let next_id = self.next_strategy_id;
        let row = self.row_mut(&update.signature, &update.groups)?;
        row.strategy_enabled = update.strategy_enabled;
        let assigned = update.strategy_enabled && row.strategy_id.is_none();
        if assigned {
            row.strategy_id = Some(StrategyId::new(next_id));
        }
        let strategy_id = row.strategy_id;
        if assigned {
            self.next_strategy_id += 1;
        }
        Ok(StrategyAck { strategy_id })
    }

    fn edit_remark(&mut self, edit: &RemarkEdit) -> Result<Vec<Remark>> {
        let row = self.row_mut(&edit.signature, &edit.groups)?;
        match edit.action {
            RemarkAction::Add => row.remark.push(Remark {
                remark: edit.remark.clone(),
                username: DEMO_USER.to_owned(),
                create_time: OffsetDateTime::now_utc(),
            }),
            RemarkAction::Update => {
                let Some(existing) = row
                    .remark
                    .iter_mut()
                    .find(|remark| Some(remark.create_time) == edit.create_time)
                else {
                    bail!("remark not found on pattern {}", edit.signature);
                };
                existing.remark = edit.remark.clone();
            }
            RemarkAction::Delete => {
                let before = row.remark.len();
                row.remark
                    .retain(|remark| Some(remark.create_time) != edit.create_time);
                if row.remark.len() == before {
                    bail!("remark not found on pattern {}", edit.signature);
                }
            }
        }
        Ok(row.remark.clone())
    }

    fn lookup_users(&mut self, usernames: &[String]) -> Result<Vec<UserInfo>> {
        Ok(fixture_users()
            .into_iter()
            .filter(|user| usernames.contains(&user.username))
            .collect())
    }
}
