use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::api::latency::LatencyStats;
use crate::config::Config;
use crate::error::{AppError, Result};

/// Fixed-delay retry: `1 + max_retries` attempts, `delay` between them, each
/// attempt bounded by `timeout`. No backoff, no jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_retries: cfg.max_retries,
            delay: cfg.retry_delay,
            timeout: cfg.request_timeout,
        }
    }
}

/// Run `op` until it succeeds or the retry budget is spent, returning the last error.
///
/// Timeouts, transport errors, non-2xx statuses and application-level errors
/// embedded in 2xx bodies all consume one attempt each.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    latency: &LatencyStats,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_retries + 1;
    let mut last_err = None;

    for attempt in 1..=attempts {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(policy.timeout.as_millis() as u64)),
        };
        latency.record(started.elapsed());

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{label} succeeded on attempt {attempt}/{attempts}");
                }
                return Ok(value);
            }
            Err(e) => {
                warn!(
                    request = label,
                    attempt,
                    attempts,
                    "{label} failed (attempt {attempt}/{attempts}): {e}"
                );
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| AppError::UnexpectedResponse(format!("{label}: no attempts made"))))
}

/// Turn a response into JSON, failing on non-2xx statuses.
pub async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        return Err(AppError::UpstreamStatus {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.json().await?)
}
