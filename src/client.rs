use std::sync::Arc;
use tokio::sync::mpsc;
use log::{debug, error, info, warn};

use crate::config::{AppConfig, ProfileSource, RateLimitPolicy};
use crate::failover::{FailoverSequence, ProfileRole};
use crate::ratelimit::{RateLimitStore, RestKvStore};
use crate::request::GenerateRequest;

/// A completion stream that is being relayed to the caller
pub struct Generation
{   pub served_by: ProfileRole
  , pub body: mpsc::Receiver<crate::stream::RelayItem>
}

/// Handles generate requests: rate check, prompt resolution, provider
/// call with fallback, relay. Holds no per-request state, so one value
/// is shared by every handler.
#[derive(Clone)]
pub struct GenerateService
{   http_client: reqwest::Client
  , primary: ProfileSource
  , fallback: ProfileSource
  , limiter: Option<Arc<dyn RateLimitStore>>
  , policy: RateLimitPolicy
}

impl GenerateService
{   pub fn new(
      http_client: reqwest::Client
    , primary: ProfileSource
    , fallback: ProfileSource
    ) -> Self
    {   debug!("Creating GenerateService");
        GenerateService
        {   http_client
          , primary
          , fallback
          , limiter: None
          , policy: RateLimitPolicy::default()
        }
    }

    /// Service wired from process configuration.
    pub fn from_config(config: &AppConfig)
      -> Result<Self, crate::error::Error>
    {   let http_client = reqwest::Client::builder()
          .connect_timeout(config.connect_timeout)
          .build()
          .map_err(|e| {
            error!("Failed to build HTTP client: {}", e);
            crate::error::Error::Configuration(e.to_string())
          })?;

        let mut service = GenerateService::new(
          http_client.clone(),
          config.primary.clone(),
          config.fallback.clone()
        );
        if let Some(store) = &config.rate_limit_store
        {   service = service.with_rate_limit(
              Arc::new(RestKvStore::new(store.clone(), http_client)),
              config.rate_limit.clone()
            );
        }
        Ok(service)
    }

    pub fn with_rate_limit(
      mut self
    , limiter: Arc<dyn RateLimitStore>
    , policy: RateLimitPolicy
    ) -> Self
    {   self.limiter = Some(limiter);
        self.policy = policy;
        self
    }

    /// Count this request against the caller's window. Without a store
    /// every request passes; a failing store lets the request through.
    pub async fn check_rate(
      &self
    , caller: &str
    ) -> Result<(), crate::error::Error>
    {   let Some(limiter) = &self.limiter else
        {   return Ok(());
        };

        let key = format!("{}_{}", self.policy.prefix, caller);
        match limiter.limit(&key, &self.policy).await
        {   Ok(verdict) if verdict.success => Ok(())
          , Ok(verdict) => {
              info!("Caller {} is over its rate limit", caller);
              Err(crate::error::Error::RateLimitExceeded(verdict))
            }
          , Err(e) => {
              error!("Rate-limit check failed, allowing request: {}", e);
              Ok(())
            }
        }
    }

    /// Resolve the prompt and open a relayed completion stream.
    pub async fn complete(
      &self
    , request: GenerateRequest
    ) -> Result<Generation, crate::error::Error>
    {   let kind = request.operation()?;
        let pair = crate::prompts::resolve(
          kind,
          &request.prompt,
          request.command.as_deref()
        );
        debug!(
          "Resolved {} prompt ({} chars of text)",
          kind,
          request.prompt.chars().count()
        );

        let sequence
          = FailoverSequence::new(&self.primary, &self.fallback);
        let (served_by, response)
          = crate::failover::stream_with_fallback(
              &self.http_client,
              sequence,
              &pair.to_messages()
            ).await?;

        if served_by == ProfileRole::Fallback
        {   warn!("Serving {} from fallback provider", kind);
        }

        Ok(Generation
        {   served_by
          , body: crate::stream::relay(response)
        })
    }

    /// Rate check followed by [`GenerateService::complete`].
    pub async fn generate(
      &self
    , caller: &str
    , request: GenerateRequest
    ) -> Result<Generation, crate::error::Error>
    {   self.check_rate(caller).await?;
        self.complete(request).await
    }
}
