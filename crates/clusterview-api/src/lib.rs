// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use clusterview_app::{
    IndexSetId, OwnerUpdate, PatternQuery, PatternRow, Remark, RemarkAction, RemarkEdit,
    StrategyAck, StrategyUpdate, UserInfo,
};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Blocking client for the clustering backend of one index set.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    index_set_id: IndexSetId,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, index_set_id: IndexSetId, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("api.base_url must not be empty");
        }
        // Trailing slash so relative joins append instead of replacing the last segment.
        let base_url = Url::parse(&format!("{trimmed}/"))
            .with_context(|| format!("api.base_url {trimmed:?} is not a valid URL"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {:?}",
                base_url.scheme()
            );
        }
        if index_set_id.get() <= 0 {
            bail!("api.index_set_id must be positive -- set it in the config file");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            index_set_id,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub const fn index_set_id(&self) -> IndexSetId {
        self.index_set_id
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn fetch_patterns(&self, query: &PatternQuery) -> Result<Vec<PatternRow>> {
        query.validate()?;
        let url = self.clustering_url("pattern/")?;
        let rows: Vec<PatternRow> = self
            .send(self.http.post(url.clone()).json(query), "pattern fetch")?
            .unwrap_or_default();
        debug!(%url, rows = rows.len(), "fetched patterns");
        Ok(rows)
    }

    /// Returns the owner list as stored by the server.
    pub fn set_owners(&self, update: &OwnerUpdate) -> Result<Vec<String>> {
        let url = self.clustering_url("owner/")?;
        let data: OwnersData = self
            .send(self.http.post(url).json(update), "owner update")?
            .ok_or_else(|| anyhow!("owner update returned no data"))?;
        Ok(data.owners)
    }

    pub fn update_strategy(&self, update: &StrategyUpdate) -> Result<StrategyAck> {
        let url = self.clustering_url("strategy/")?;
        let ack = self
            .send(self.http.post(url).json(update), "strategy update")?
            .unwrap_or_default();
        Ok(ack)
    }

    /// Applies a remark edit and returns the pattern's full remark list.
    pub fn edit_remark(&self, edit: &RemarkEdit) -> Result<Vec<Remark>> {
        let url = self.clustering_url("remark/")?;
        let method = match edit.action {
            RemarkAction::Add => Method::POST,
            RemarkAction::Update => Method::PUT,
            RemarkAction::Delete => Method::DELETE,
        };
        let what = format!("remark {}", edit.action.as_str());
        let data: RemarksData = self
            .send(self.http.request(method, url).json(edit), &what)?
            .unwrap_or_default();
        Ok(data.remark)
    }

    pub fn lookup_users(&self, usernames: &[String]) -> Result<Vec<UserInfo>> {
        if usernames.is_empty() {
            return Ok(Vec::new());
        }
        let mut url = self.join("users/")?;
        url.query_pairs_mut()
            .append_pair("usernames", &usernames.join(","));
        let users = self
            .send(self.http.get(url), "user lookup")?
            .unwrap_or_default();
        Ok(users)
    }

    fn clustering_url(&self, endpoint: &str) -> Result<Url> {
        self.join(&format!("clustering/{}/{endpoint}", self.index_set_id))
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("build URL for {path}"))
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<Option<T>> {
        let response = request
            .send()
            .map_err(|error| connection_error(self.base_url(), error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(%status, what, "backend request failed");
            return Err(clean_error_response(status, &body));
        }

        let envelope: Envelope<T> = response
            .json()
            .with_context(|| format!("decode {what} response"))?;
        if !envelope.result {
            warn!(
                what,
                code = ?envelope.code,
                message = %envelope.message,
                "backend rejected request"
            );
            if envelope.message.is_empty() {
                bail!("{what} rejected by server");
            }
            bail!("{what} rejected by server: {}", envelope.message);
        }
        Ok(envelope.data)
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("request to {base_url} timed out -- raise api.timeout or retry");
    }
    anyhow!(
        "cannot reach {} -- check api.base_url and that the backend is running ({})",
        base_url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<Envelope<serde_json::Value>>(body)
        && !parsed.message.is_empty()
    {
        return anyhow!("server error ({}): {}", status.as_u16(), parsed.message);
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

/// `{result, data, message, code}` wrapper used by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "default_result")]
    result: bool,
    data: Option<T>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

const fn default_result() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct OwnersData {
    #[serde(default)]
    owners: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RemarksData {
    #[serde(default)]
    remark: Vec<Remark>,
}

#[cfg(test)]
mod tests {
    use super::{Client, Envelope, clean_error_response};
    use clusterview_app::IndexSetId;
    use reqwest::StatusCode;
    use std::time::Duration;

    #[test]
    fn new_rejects_bad_urls_and_ids() {
        let timeout = Duration::from_secs(1);
        assert!(Client::new("", IndexSetId::new(1), timeout).is_err());
        assert!(Client::new("not a url", IndexSetId::new(1), timeout).is_err());
        assert!(Client::new("ftp://example.com", IndexSetId::new(1), timeout).is_err());
        assert!(Client::new("http://example.com/api/v1", IndexSetId::new(0), timeout).is_err());
    }

    #[test]
    fn base_url_is_normalized() -> anyhow::Result<()> {
        let client = Client::new(
            "http://example.com/api/v1/",
            IndexSetId::new(7),
            Duration::from_secs(1),
        )?;
        assert_eq!(client.base_url(), "http://example.com/api/v1");
        assert_eq!(
            client.clustering_url("pattern/")?.as_str(),
            "http://example.com/api/v1/clustering/7/pattern/"
        );
        Ok(())
    }

    #[test]
    fn error_body_message_is_surfaced() {
        let error = clean_error_response(
            StatusCode::BAD_REQUEST,
            r#"{"result":false,"code":"400","message":"index set not found","data":null}"#,
        );
        assert_eq!(error.to_string(), "server error (400): index set not found");

        let plain = clean_error_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(plain.to_string(), "server error (502): upstream down");

        let opaque = clean_error_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(opaque.to_string(), "server returned 500");
    }

    #[test]
    fn envelope_defaults_to_success_without_result_flag() -> anyhow::Result<()> {
        let parsed: Envelope<Vec<i64>> = serde_json::from_str(r#"{"data":[1,2]}"#)?;
        assert!(parsed.result);
        assert_eq!(parsed.data, Some(vec![1, 2]));
        Ok(())
    }
}
