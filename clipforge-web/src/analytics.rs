//! Soft-dependency analytics and quota bookkeeping.
//!
//! The datastore is optional: when it is not configured or is failing, every
//! operation degrades to a permissive default instead of propagating an
//! error into the pipeline contract. "Not configured" and "configured but
//! erroring" are distinct outcomes that get logged differently, but both map
//! to the same defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Downloads allowed per quota window when the datastore has no say.
pub const DEFAULT_QUOTA: u32 = 5;

/// Result of an operation against an optional external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftOutcome<T> {
    /// The service answered
    Value(T),
    /// The service is not configured; feature is off
    Disabled,
    /// The service is configured but the call failed
    Errored,
}

/// Connection settings for the managed datastore.
#[derive(Debug, Clone)]
pub struct DatastoreConfig {
    pub base_url: String,
    pub api_key: String,
}

impl DatastoreConfig {
    /// Reads the datastore settings from the environment, if both are set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("CLIPFORGE_DATASTORE_URL").ok()?;
        let api_key = std::env::var("CLIPFORGE_DATASTORE_KEY").ok()?;
        Some(Self { base_url, api_key })
    }
}

/// One tracked download, in datastore column names.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRecord {
    pub fingerprint: String,
    pub video_id: String,
    pub video_title: Option<String>,
    pub format: String,
    pub quality: String,
}

/// Remaining quota for a client fingerprint, in wire field names.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub remaining: u32,
    #[serde(rename = "resetAt")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitStatus {
    /// The permissive default returned whenever the datastore has no answer.
    pub fn permissive() -> Self {
        Self {
            remaining: DEFAULT_QUOTA,
            reset_at: None,
        }
    }
}

/// Quota row as stored in the datastore.
#[derive(Debug, Clone, Deserialize)]
struct QuotaRow {
    download_count: u32,
    reset_at: DateTime<Utc>,
}

/// Evaluates a stored quota row at a point in time.
///
/// A row whose window has passed counts as fully reset.
fn status_from_row(row: &QuotaRow, now: DateTime<Utc>) -> RateLimitStatus {
    if now > row.reset_at {
        return RateLimitStatus::permissive();
    }
    RateLimitStatus {
        remaining: DEFAULT_QUOTA.saturating_sub(row.download_count),
        reset_at: Some(row.reset_at),
    }
}

struct Datastore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Datastore {
    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url.trim_end_matches('/'))
    }

    async fn insert_download(&self, record: &DownloadRecord) -> Result<(), reqwest::Error> {
        self.http
            .post(self.table_url("downloads"))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_quota_row(&self, fingerprint: &str) -> Result<Option<QuotaRow>, reqwest::Error> {
        let rows: Vec<QuotaRow> = self
            .http
            .get(self.table_url("rate_limits"))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&[
                ("fingerprint", format!("eq.{fingerprint}")),
                ("select", "download_count,reset_at".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn reset_quota(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<(), reqwest::Error> {
        self.http
            .patch(self.table_url("rate_limits"))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .query(&[("fingerprint", format!("eq.{fingerprint}"))])
            .json(&serde_json::json!({ "download_count": 0, "reset_at": now }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Client for the optional analytics datastore.
pub struct AnalyticsClient {
    inner: Option<Datastore>,
}

impl AnalyticsClient {
    pub fn new(config: Option<DatastoreConfig>) -> Self {
        match config {
            Some(config) => Self {
                inner: Some(Datastore {
                    http: reqwest::Client::new(),
                    base_url: config.base_url,
                    api_key: config.api_key,
                }),
            },
            None => Self { inner: None },
        }
    }

    /// Client with the datastore feature off.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Records one download. Failures never propagate.
    pub async fn record_download(&self, record: &DownloadRecord) -> SoftOutcome<()> {
        let Some(datastore) = &self.inner else {
            tracing::debug!("analytics disabled, download not tracked");
            return SoftOutcome::Disabled;
        };

        match datastore.insert_download(record).await {
            Ok(()) => SoftOutcome::Value(()),
            Err(e) => {
                tracing::warn!("analytics datastore errored on insert: {e}");
                SoftOutcome::Errored
            }
        }
    }

    /// Remaining quota for a fingerprint. Always answers; any datastore
    /// trouble degrades to the permissive default.
    pub async fn rate_limit(&self, fingerprint: &str) -> RateLimitStatus {
        match self.try_rate_limit(fingerprint).await {
            SoftOutcome::Value(status) => status,
            SoftOutcome::Disabled => {
                tracing::debug!("rate limiting disabled, returning permissive quota");
                RateLimitStatus::permissive()
            }
            SoftOutcome::Errored => RateLimitStatus::permissive(),
        }
    }

    async fn try_rate_limit(&self, fingerprint: &str) -> SoftOutcome<RateLimitStatus> {
        let Some(datastore) = &self.inner else {
            return SoftOutcome::Disabled;
        };

        let row = match datastore.fetch_quota_row(fingerprint).await {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!("rate-limit datastore errored on read: {e}");
                return SoftOutcome::Errored;
            }
        };

        let Some(row) = row else {
            // No row yet means a fresh quota
            return SoftOutcome::Value(RateLimitStatus::permissive());
        };

        let now = Utc::now();
        if now > row.reset_at {
            if let Err(e) = datastore.reset_quota(fingerprint, now).await {
                tracing::warn!("rate-limit datastore errored on reset: {e}");
            }
            return SoftOutcome::Value(RateLimitStatus::permissive());
        }

        SoftOutcome::Value(status_from_row(&row, now))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_active_window_subtracts_used_quota() {
        let now = Utc::now();
        let row = QuotaRow {
            download_count: 3,
            reset_at: now + TimeDelta::minutes(10),
        };

        let status = status_from_row(&row, now);

        assert_eq!(status.remaining, 2);
        assert_eq!(status.reset_at, Some(row.reset_at));
    }

    #[test]
    fn test_exhausted_quota_saturates_at_zero() {
        let now = Utc::now();
        let row = QuotaRow {
            download_count: 99,
            reset_at: now + TimeDelta::minutes(10),
        };

        assert_eq!(status_from_row(&row, now).remaining, 0);
    }

    #[test]
    fn test_elapsed_window_is_permissive() {
        let now = Utc::now();
        let row = QuotaRow {
            download_count: 5,
            reset_at: now - TimeDelta::minutes(1),
        };

        let status = status_from_row(&row, now);

        assert_eq!(status.remaining, DEFAULT_QUOTA);
        assert_eq!(status.reset_at, None);
    }

    #[test]
    fn test_rate_limit_status_wire_names() {
        let status = RateLimitStatus::permissive();
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["remaining"], 5);
        assert!(json["resetAt"].is_null());
    }

    #[tokio::test]
    async fn test_disabled_client_is_permissive_not_errored() {
        let client = AnalyticsClient::disabled();

        let record = DownloadRecord {
            fingerprint: "fp".to_string(),
            video_id: "abc123".to_string(),
            video_title: None,
            format: "mp3".to_string(),
            quality: "320kbps".to_string(),
        };
        assert_eq!(client.record_download(&record).await, SoftOutcome::Disabled);

        let status = client.rate_limit("fp").await;
        assert_eq!(status.remaining, DEFAULT_QUOTA);
    }
}
