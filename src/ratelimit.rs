//! Per-caller sliding-window rate limiting against an external store

use std::time::{SystemTime, UNIX_EPOCH};
use async_trait::async_trait;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{RateLimitPolicy, RateLimitStoreConfig};

/// Outcome of one rate-limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitVerdict
{   pub success: bool
  , pub limit: u64
  , pub remaining: u64
  , /// Unix time in milliseconds when the current window ends
    pub reset: u64
}

/// External counter store consulted once per request.
#[async_trait]
pub trait RateLimitStore: Send + Sync
{   async fn limit(
      &self
    , key: &str
    , policy: &RateLimitPolicy
    ) -> Result<RateLimitVerdict, crate::error::Error>;
}

/// Caller identity for rate limiting: the first address in
/// `x-forwarded-for`.
pub fn caller_key(headers: &axum::http::HeaderMap) -> String
{   headers.get("x-forwarded-for")
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.split(',').next())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .unwrap_or("unknown")
      .to_string()
}

/// Weighted two-window estimate of the requests in the trailing window.
pub fn sliding_window_verdict(
  policy: &RateLimitPolicy
, now_ms: u64
, current: u64
, previous: u64
) -> RateLimitVerdict
{   let window_ms = window_millis(policy);
    let elapsed = now_ms % window_ms;
    let carried = (previous as f64
      * (1.0 - elapsed as f64 / window_ms as f64)) as u64;
    let used = carried + current;

    RateLimitVerdict
    {   success: used <= policy.limit
      , limit: policy.limit
      , remaining: policy.limit.saturating_sub(used)
      , reset: now_ms - elapsed + window_ms
    }
}

fn window_millis(policy: &RateLimitPolicy) -> u64
{   (policy.window.as_millis() as u64).max(1)
}

fn now_millis() -> u64
{   SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_millis() as u64)
      .unwrap_or(0)
}

/// Redis-over-REST store (`POST {url}/pipeline` with a bearer token).
pub struct RestKvStore
{   config: RateLimitStoreConfig
  , http_client: reqwest::Client
}

#[derive(Debug, Deserialize)]
struct PipelineReply
{   #[serde(default)]
    result: Value
  , #[serde(default)]
    error: Option<String>
}

impl RestKvStore
{   pub fn new(
      config: RateLimitStoreConfig
    , http_client: reqwest::Client
    ) -> Self
    {   debug!("Creating RestKvStore for {}", config.url);
        RestKvStore
        {   config
          , http_client
        }
    }

    async fn pipeline(
      &self
    , commands: Value
    ) -> Result<Vec<PipelineReply>, crate::error::Error>
    {   let url = format!(
          "{}/pipeline",
          self.config.url.trim_end_matches('/')
        );
        trace!("Rate-limit pipeline: {}", commands);

        let response = self.http_client
          .post(url)
          .bearer_auth(&self.config.token)
          .json(&commands)
          .send()
          .await
          .map_err(|e| {
            error!("Rate-limit store unreachable: {}", e);
            crate::error::Error::RateLimitStore(e.to_string())
          })?;

        let status = response.status();
        if !status.is_success()
        {   let text = response.text().await
              .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Rate-limit store error {}: {}", status, text);
            return Err(crate::error::Error::RateLimitStore(
              format!("status {}", status.as_u16())
            ));
        }

        response.json().await.map_err(|e| {
          error!("Rate-limit store reply unreadable: {}", e);
          crate::error::Error::RateLimitStore(e.to_string())
        })
    }
}

fn reply_count(
  reply: Option<&PipelineReply>
) -> Result<u64, crate::error::Error>
{   let reply = reply.ok_or_else(|| {
      crate::error::Error::RateLimitStore(
        "short pipeline reply".to_string()
      )
    })?;
    if let Some(err) = &reply.error
    {   return Err(crate::error::Error::RateLimitStore(err.clone()));
    }
    match &reply.result
    {   Value::Null => Ok(0)
      , Value::Number(n) => n.as_u64().ok_or_else(|| {
          crate::error::Error::RateLimitStore(
            format!("bad counter {}", n)
          )
        })
      , Value::String(s) => s.parse().map_err(|_| {
          crate::error::Error::RateLimitStore(
            format!("bad counter {:?}", s)
          )
        })
      , other => Err(crate::error::Error::RateLimitStore(
          format!("bad counter {}", other)
        ))
    }
}

#[async_trait]
impl RateLimitStore for RestKvStore
{   async fn limit(
      &self
    , key: &str
    , policy: &RateLimitPolicy
    ) -> Result<RateLimitVerdict, crate::error::Error>
    {   let now = now_millis();
        let window_ms = window_millis(policy);
        let index = now / window_ms;
        let current_key = format!("{}:{}", key, index);
        let previous_key = format!("{}:{}", key, index.saturating_sub(1));

        let replies = self.pipeline(json!([
          ["INCR", current_key],
          ["PEXPIRE", current_key, window_ms * 2],
          ["GET", previous_key]
        ])).await?;

        let current = reply_count(replies.first())?;
        let previous = reply_count(replies.get(2))?;
        let verdict
          = sliding_window_verdict(policy, now, current, previous);
        debug!(
          "Rate limit for {}: {}/{} remaining",
          key, verdict.remaining, verdict.limit
        );
        Ok(verdict)
    }
}
