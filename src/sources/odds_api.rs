//! Default odds provider speaking The Odds API v4 shape.
//!
//! Requests carry a per-request timeout and a small retry budget
//! (exponential backoff + jitter on retryable failures). The fetch stage
//! drives one `fetch_games` call per sport, bounded-concurrently.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{info, warn};

use super::{Game, OddsSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 500;

/// Failure classes for one odds request; retryability drives the backoff
/// loop.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("odds feed rate limited")]
    RateLimited,
    #[error("odds feed returned status {0}")]
    Status(StatusCode),
    #[error("odds feed transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl FeedError {
    fn retryable(&self) -> bool {
        match self {
            FeedError::RateLimited => true,
            FeedError::Status(status) => status.is_server_error(),
            FeedError::Transport(e) => e.is_timeout() || e.is_connect(),
        }
    }
}

pub struct OddsApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    markets: String,
}

impl OddsApiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(OddsApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            markets: "h2h,spreads,totals,h2h_h1,spreads_h1,totals_h1,alternate_totals"
                .to_string(),
        })
    }

    fn odds_url(&self, sport: &str) -> Result<url::Url> {
        let mut u = url::Url::parse(&format!("{}/sports/{}/odds", self.base_url, sport))?;
        u.query_pairs_mut()
            .append_pair("regions", "us")
            .append_pair("oddsFormat", "decimal")
            .append_pair("markets", &self.markets)
            .append_pair("apiKey", self.api_key.as_deref().unwrap_or_default());
        Ok(u)
    }

    async fn get_with_retries(&self, url: url::Url) -> Result<Vec<Game>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.http.get(url.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Vec<Game>>()
                        .await
                        .context("decoding odds payload");
                }
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    FeedError::RateLimited
                }
                Ok(resp) => FeedError::Status(resp.status()),
                Err(e) => FeedError::Transport(e),
            };
            if !err.retryable() || attempt > MAX_RETRIES {
                return Err(err.into());
            }
            let backoff = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
            let jitter = rand::thread_rng().gen_range(0..=backoff / 2);
            let delay = Duration::from_millis(backoff + jitter);
            warn!(
                "Odds request retry {}/{} ({}) after {:?}",
                attempt, MAX_RETRIES, err, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl OddsSource for OddsApiClient {
    async fn fetch_games(&self, sport: &str) -> Result<Vec<Game>> {
        let url = self.odds_url(sport)?;
        let games = self.get_with_retries(url).await?;
        info!("Fetched {} games for {}", games.len(), sport);
        Ok(games)
    }

    fn verify_credentials(&self) -> Result<()> {
        if self.api_key.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("odds API key is not configured");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "the-odds-api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_markets_and_format() {
        let client = OddsApiClient::new(
            "https://api.the-odds-api.com/v4",
            Some("secret".to_string()),
        )
        .unwrap();
        let url = client.odds_url("basketball_nba").unwrap();
        let s = url.as_str();
        assert!(s.contains("/sports/basketball_nba/odds"));
        assert!(s.contains("oddsFormat=decimal"));
        assert!(s.contains("spreads_h1"));
    }

    #[test]
    fn only_rate_limits_and_server_errors_retry() {
        assert!(FeedError::RateLimited.retryable());
        assert!(FeedError::Status(StatusCode::BAD_GATEWAY).retryable());
        assert!(!FeedError::Status(StatusCode::BAD_REQUEST).retryable());
        assert!(!FeedError::Status(StatusCode::UNAUTHORIZED).retryable());
    }

    #[test]
    fn missing_key_fails_credential_check() {
        let client = OddsApiClient::new("https://api.the-odds-api.com/v4", None).unwrap();
        assert!(client.verify_credentials().is_err());
    }
}
