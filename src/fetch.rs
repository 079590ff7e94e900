use crate::{
    config::Fetch as FetchCfg,
    util::{clock_hms, excerpt, StatusLine},
};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use thiserror::Error;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("tmdb-harvest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("interrupted by user")]
    Cancelled,
    #[error("gave up after {attempts} failed attempts: {last}")]
    Exhausted { attempts: u32, last: String },
    #[error("connection failed or timed out: {0}")]
    ConnectTimeout(String),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Unbounded { delay: Duration },
    /// Gives up after `max_attempts` failures, or at once on a connect/timeout failure.
    Bounded { max_attempts: u32, delay: Duration },
}

impl RetryPolicy {
    pub fn unbounded(cfg: &FetchCfg) -> Self {
        RetryPolicy::Unbounded {
            delay: cfg.retry_delay(),
        }
    }

    pub fn bounded(cfg: &FetchCfg) -> Self {
        RetryPolicy::Bounded {
            max_attempts: cfg.max_attempts.max(1),
            delay: cfg.retry_delay(),
        }
    }

    pub fn delay(&self) -> Duration {
        match *self {
            RetryPolicy::Unbounded { delay } | RetryPolicy::Bounded { delay, .. } => delay,
        }
    }
}

/// Failure streak of the request currently being retried.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    first_failure_at: Option<Instant>,
    first_failure_clock: Option<OffsetDateTime>,
    last_alert_at: Option<Instant>,
    streak: u32,
}

impl RetryState {
    /// Records one failure and returns whether a diagnostic is due.
    pub fn record_failure(&mut self, now: Instant, alert_interval: Duration) -> bool {
        self.streak += 1;
        if self.first_failure_at.is_none() {
            self.first_failure_at = Some(now);
            self.first_failure_clock = Some(OffsetDateTime::now_utc());
        }
        let due = match self.last_alert_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= alert_interval,
        };
        if due {
            self.last_alert_at = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn is_failing(&self) -> bool {
        self.streak > 0
    }

    pub fn first_failure_at(&self) -> Option<Instant> {
        self.first_failure_at
    }

    pub fn last_alert_at(&self) -> Option<Instant> {
        self.last_alert_at
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.first_failure_at
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default()
    }
}

struct AttemptError {
    message: String,
    connect_class: bool,
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the API key.
        let e = e.without_url();
        Self {
            connect_class: e.is_connect() || e.is_timeout(),
            message: e.to_string(),
        }
    }
}

pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    alert_interval: Duration,
    excerpt_chars: usize,
    cancel: CancellationToken,
    state: RetryState,
    diagnostics: u32,
    status: StatusLine,
}

impl Fetcher {
    pub fn new(cfg: &FetchCfg, policy: RetryPolicy, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout())
            .user_agent(USER_AGENT)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            policy,
            alert_interval: cfg.alert_interval(),
            excerpt_chars: cfg.error_excerpt_chars,
            cancel,
            state: RetryState::default(),
            diagnostics: 0,
            status: StatusLine::new(cfg.status_line),
        })
    }

    pub fn retry_state(&self) -> &RetryState {
        &self.state
    }

    /// Retry diagnostics emitted since construction.
    pub fn diagnostics_emitted(&self) -> u32 {
        self.diagnostics
    }

    /// GETs `url` and decodes the JSON body, retrying per the configured policy.
    pub async fn get_json<T: DeserializeOwned>(
        &mut self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, FetchError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            debug!(url, attempt = self.state.streak() + 1, "GET");
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                r = attempt_json::<T>(&self.client, url, params) => r,
            };

            let err = match attempt {
                Ok(body) => {
                    if self.state.is_failing() {
                        info!(
                            url,
                            failures = self.state.streak(),
                            "request recovered after {:.1}s",
                            self.state.elapsed(Instant::now()).as_secs_f32()
                        );
                        self.status.finish();
                    }
                    self.state.reset();
                    return Ok(body);
                }
                Err(err) => err,
            };

            let now = Instant::now();
            if self.state.record_failure(now, self.alert_interval) {
                self.diagnostics += 1;
                let msg = excerpt(&err.message, self.excerpt_chars);
                let first = self
                    .state
                    .first_failure_clock
                    .map(clock_hms)
                    .unwrap_or_default();
                warn!(
                    url,
                    streak = self.state.streak(),
                    first_failure = %first,
                    elapsed_secs = self.state.elapsed(now).as_secs(),
                    "request failed: {msg}"
                );
                self.status.update(&format!(
                    "[Retrying] first failure {first} | attempts {} | {msg} (Ctrl+C to abort)",
                    self.state.streak()
                ));
            }

            if let RetryPolicy::Bounded { max_attempts, .. } = self.policy {
                if err.connect_class {
                    self.state.reset();
                    self.status.finish();
                    return Err(FetchError::ConnectTimeout(err.message));
                }
                if self.state.streak() >= max_attempts {
                    let attempts = self.state.streak();
                    self.state.reset();
                    self.status.finish();
                    return Err(FetchError::Exhausted {
                        attempts,
                        last: err.message,
                    });
                }
            }

            let delay = self.policy.delay();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Single best-effort download; any failure yields `None`.
    pub async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Option<Vec<u8>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let fut = async {
            let resp = self
                .client
                .get(url)
                .timeout(timeout)
                .send()
                .await?
                .error_for_status()?;
            resp.bytes().await
        };
        let res = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            r = fut => r,
        };
        match res {
            Ok(bytes) if !bytes.is_empty() => Some(bytes.to_vec()),
            Ok(_) => None,
            Err(e) => {
                debug!(url, "download failed: {}", e.without_url());
                None
            }
        }
    }
}

async fn attempt_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    params: &[(&str, String)],
) -> Result<T, AttemptError> {
    let resp = client.get(url).query(params).send().await?;
    let resp = resp.error_for_status()?;
    let body = resp.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| AttemptError {
        message: format!("decoding response body: {e}"),
        connect_class: false,
    })
}
