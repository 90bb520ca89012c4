// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use clusterview_app::{PatternRow, Remark, StrategyId, UserInfo};
use time::{Duration, OffsetDateTime};

const PATTERN_TEMPLATES: [&str; 16] = [
    "user #NUMBER# logged in from #IP#",
    "connection reset by peer #IP#:#NUMBER#",
    "request #UUID# completed in #NUMBER#ms",
    "GET #PATH# returned #NUMBER#",
    "failed to open #PATH#: permission denied",
    "retrying job #NUMBER# after timeout",
    "cache miss for key #KEY#",
    "worker #NUMBER# heartbeat lost",
    "slow query took #NUMBER#ms on table #WORD#",
    "disk usage at #NUMBER#% on #PATH#",
    "token expired for session #UUID#",
    "upstream #IP# responded with status #NUMBER#",
    "scheduled task #WORD# started",
    "out of memory while allocating #NUMBER# bytes",
    "certificate for #WORD# expires in #NUMBER# days",
    "kafka consumer lag #NUMBER# on partition #NUMBER#",
];

const SERVICES: [&str; 6] = ["api", "auth", "billing", "gateway", "search", "worker"];
const HOSTS: [&str; 5] = ["node-01", "node-02", "node-03", "edge-01", "edge-02"];
const LEVELS: [&str; 4] = ["error", "warn", "info", "debug"];
const WORDS: [&str; 8] = ["alpha", "bravo", "delta", "echo", "kilo", "lima", "oscar", "zulu"];

const USERS: [(&str, &str); 8] = [
    ("avery", "Avery Walker"),
    ("jordan", "Jordan Hill"),
    ("taylor", "Taylor Evans"),
    ("riley", "Riley Lopez"),
    ("morgan", "Morgan Gray"),
    ("casey", "Casey Ward"),
    ("quinn", "Quinn Reed"),
    ("parker", "Parker Diaz"),
];

const REMARKS: [&str; 6] = [
    "known issue, ticket filed",
    "expected during deploys",
    "noisy, consider sampling",
    "investigating",
    "fixed in next release",
    "caused by upstream outage",
];

/// Fixed clock so fixtures do not depend on wall time.
const REFERENCE_UNIX: i64 = 1_767_225_600;

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn chance(&mut self, one_in: usize) -> bool {
        self.int_n(one_in) == 0
    }
}

/// Seeded generator of clustering results.
#[derive(Debug, Clone)]
pub struct PatternFaker {
    rng: DeterministicRng,
    seed: u64,
    next_signature: u64,
}

impl PatternFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
            next_signature: 0,
        }
    }

    pub const fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    /// One row; `percentage` is left at zero for `pattern_rows` to fill in.
    pub fn pattern_row(&mut self, group_by: &[String]) -> PatternRow {
        let template = self.pick(&PATTERN_TEMPLATES);
        let origin_pattern = self.fill_template(template);
        let count = 1 + self.rng.int_n(5_000) as i64;
        let year_on_year_count = self.rng.int_n(2 * count as usize) as i64;
        let year_on_year_percentage = if year_on_year_count == 0 {
            100.0
        } else {
            ((count - year_on_year_count) as f64 / year_on_year_count as f64 * 10_000.0).round()
                / 100.0
        };

        let owners = self.owners();
        let strategy_enabled = !owners.is_empty() && self.rng.chance(3);
        let strategy_id = strategy_enabled.then(|| StrategyId::new(1 + self.rng.int_n(900) as i64));
        let remark = if self.rng.chance(3) {
            (0..1 + self.rng.int_n(3)).map(|_| self.remark()).collect()
        } else {
            Vec::new()
        };

        PatternRow {
            signature: self.signature(),
            pattern: if self.rng.chance(25) {
                String::new()
            } else {
                template.to_owned()
            },
            origin_pattern,
            count,
            percentage: 0.0,
            year_on_year_count,
            year_on_year_percentage,
            is_new_class: self.rng.chance(8),
            group: group_by.iter().map(|field| self.group_value(field)).collect(),
            owners,
            remark,
            strategy_enabled,
            strategy_id,
        }
    }

    /// `count` rows with percentages summing to roughly 100, ordered by
    /// count descending the way the backend returns them.
    pub fn pattern_rows(&mut self, count: usize, group_by: &[String]) -> Vec<PatternRow> {
        let mut rows = (0..count)
            .map(|_| self.pattern_row(group_by))
            .collect::<Vec<_>>();
        let total = rows.iter().map(|row| row.count).sum::<i64>().max(1) as f64;
        for row in &mut rows {
            row.percentage = (row.count as f64 / total * 10_000.0).round() / 100.0;
        }
        rows.sort_by(|left, right| right.count.cmp(&left.count));
        rows
    }

    pub fn group_value(&mut self, field: &str) -> String {
        let options: &[&str] = match field {
            "service" | "serverIp" | "app" => &SERVICES,
            "host" | "hostname" => &HOSTS,
            "level" | "severity" => &LEVELS,
            _ => &WORDS,
        };
        // A few rows come back with the dimension missing.
        if self.rng.chance(20) {
            return String::new();
        }
        self.pick(options).to_owned()
    }

    pub fn owners(&mut self) -> Vec<String> {
        let wanted = match self.rng.int_n(6) {
            0..=2 => 0,
            3 | 4 => 1,
            _ => 2,
        };
        let mut owners: Vec<String> = Vec::new();
        while owners.len() < wanted {
            let (username, _) = USERS[self.rng.int_n(USERS.len())];
            if !owners.iter().any(|owner| owner == username) {
                owners.push(username.to_owned());
            }
        }
        owners
    }

    pub fn remark(&mut self) -> Remark {
        let (username, _) = USERS[self.rng.int_n(USERS.len())];
        let age = Duration::minutes(self.rng.int_n(60 * 24 * 30) as i64);
        Remark {
            remark: self.pick(&REMARKS).to_owned(),
            username: username.to_owned(),
            create_time: reference_now() - age,
        }
    }

    fn signature(&mut self) -> String {
        self.next_signature += 1;
        format!("{:016x}", self.rng.next_u64() ^ self.next_signature)
    }

    fn fill_template(&mut self, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + 16);
        let mut rest = template;
        while let Some(open) = rest.find('#') {
            let Some(close) = rest[open + 1..].find('#') else {
                break;
            };
            out.push_str(&rest[..open]);
            let token = &rest[open + 1..open + 1 + close];
            out.push_str(&self.token_value(token));
            rest = &rest[open + close + 2..];
        }
        out.push_str(rest);
        out
    }

    fn token_value(&mut self, token: &str) -> String {
        match token {
            "NUMBER" => self.rng.int_n(10_000).to_string(),
            "IP" => format!(
                "10.{}.{}.{}",
                self.rng.int_n(256),
                self.rng.int_n(256),
                self.rng.int_n(256)
            ),
            "UUID" => format!("{:016x}", self.rng.next_u64()),
            "PATH" => format!("/var/{}/{}", self.pick(&WORDS), self.pick(&WORDS)),
            _ => self.pick(&WORDS).to_owned(),
        }
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

/// Directory entries matching the owners `PatternFaker` hands out.
pub fn fixture_users() -> Vec<UserInfo> {
    USERS
        .iter()
        .map(|(username, display_name)| UserInfo {
            username: (*username).to_owned(),
            display_name: (*display_name).to_owned(),
        })
        .collect()
}

pub fn fixture_group_by() -> Vec<String> {
    vec!["service".to_owned(), "level".to_owned()]
}

pub fn reference_now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(REFERENCE_UNIX).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
