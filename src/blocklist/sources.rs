//! Per-source fetch and status tracking for blocklist URLs (SPEC_FULL.md
//! §4.1). A source that fails keeps its previous contents so a single flaky
//! upstream doesn't blank out domains the union already had.

use std::time::Duration;

use reqwest::Client;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::warn;

use super::parser::parse_contents;

/// Outcome taxonomy for a single fetch attempt, mirrored into
/// `upsert_blocklist_source`'s `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Success,
    Timeout,
    ConnectError,
    HttpError,
    ReadError,
    Other,
}

impl SourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceStatus::Success => "success",
            SourceStatus::Timeout => "timeout",
            SourceStatus::ConnectError => "connect_error",
            SourceStatus::HttpError => "http_error",
            SourceStatus::ReadError => "read_error",
            SourceStatus::Other => "other",
        }
    }
}

/// One configured blocklist URL plus the last fetch's outcome.
#[derive(Debug, Clone, Default)]
pub struct BlocklistSource {
    pub url: String,
    pub last_status: Option<SourceStatus>,
    pub last_contents: Option<String>,
}

impl BlocklistSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), last_status: None, last_contents: None }
    }

    /// Domains attributed to this source as of its last successful fetch.
    pub fn domains(&self) -> Vec<String> {
        match &self.last_contents {
            Some(contents) => parse_contents(contents),
            None => Vec::new(),
        }
    }
}

const FETCH_TIMEOUT: Duration = Duration::from_secs(9);
const FETCH_RETRIES: usize = 3;

pub fn build_client() -> reqwest::Result<Client> {
    Client::builder().user_agent("sentrydns/0.1 (blocklist-sync)").timeout(FETCH_TIMEOUT).build()
}

/// Fetch one source, retrying transport failures up to `FETCH_RETRIES`
/// times. Updates `last_status` always, and `last_contents` only on success.
pub async fn fetch_one(client: &Client, source: &mut BlocklistSource) {
    let retry_strategy = FixedInterval::from_millis(200).take(FETCH_RETRIES);
    let url = source.url.clone();

    let result = Retry::spawn(retry_strategy, || {
        let client = client.clone();
        let url = url.clone();
        async move { attempt_fetch(&client, &url).await }
    })
    .await;

    match result {
        Ok(body) => {
            source.last_status = Some(SourceStatus::Success);
            source.last_contents = Some(body);
        }
        Err(status) => {
            warn!(url = %source.url, status = status.as_str(), "blocklist source fetch failed");
            source.last_status = Some(status);
        }
    }
}

async fn attempt_fetch(client: &Client, url: &str) -> Result<String, SourceStatus> {
    let response = client.get(url).send().await.map_err(|err| {
        if err.is_timeout() {
            SourceStatus::Timeout
        } else if err.is_connect() {
            SourceStatus::ConnectError
        } else {
            SourceStatus::Other
        }
    })?;

    if !response.status().is_success() {
        return Err(SourceStatus::HttpError);
    }

    response.text().await.map_err(|_| SourceStatus::ReadError)
}

/// The default blacklist, used when `adsblock.blacklist` is empty in config.
pub fn default_sources() -> Vec<BlocklistSource> {
    [
        "https://v.firebog.net/hosts/easyprivacy.txt",
        "https://raw.githubusercontent.com/StevenBlack/hosts/master/hosts",
    ]
    .into_iter()
    .map(BlocklistSource::new)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_are_empty_before_first_fetch() {
        let source = BlocklistSource::new("https://example.invalid/list.txt");
        assert!(source.domains().is_empty());
    }

    #[test]
    fn domains_parse_last_successful_contents() {
        let mut source = BlocklistSource::new("https://example.invalid/list.txt");
        source.last_contents = Some("0.0.0.0 ads.example.com\n".to_string());
        assert_eq!(source.domains(), vec!["ads.example.com.".to_string()]);
    }

    #[test]
    fn status_strings_match_the_taxonomy() {
        assert_eq!(SourceStatus::Success.as_str(), "success");
        assert_eq!(SourceStatus::Timeout.as_str(), "timeout");
        assert_eq!(SourceStatus::ConnectError.as_str(), "connect_error");
        assert_eq!(SourceStatus::HttpError.as_str(), "http_error");
        assert_eq!(SourceStatus::ReadError.as_str(), "read_error");
        assert_eq!(SourceStatus::Other.as_str(), "other");
    }
}
