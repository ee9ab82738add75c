//! Configuration for provider profiles, rate limiting and the server

use std::fmt;
use std::time::Duration;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Version segment every provider base URL must end with
pub const API_VERSION_SUFFIX: &str = "/v1";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const PRIMARY_ENV_PREFIX: &str = "OPENAI";
pub const FALLBACK_ENV_PREFIX: &str = "OPENAI_FALLBACK";

/// Raw provider settings, possibly incomplete
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings
{   /// Profile name used in error messages ("primary", "fallback")
    pub name: String
  , /// API base URL, e.g. https://api.openai.com/v1
    pub base_url: Option<String>
  , pub api_key: Option<String>
  , /// Model identifier; defaults to [`DEFAULT_MODEL`]
    pub model: Option<String>
}

impl ProviderSettings
{   pub fn new(
      name: impl Into<String>
    , base_url: impl Into<String>
    , api_key: impl Into<String>
    , model: impl Into<String>
    ) -> Self
    {   ProviderSettings
        {   name: name.into()
          , base_url: Some(base_url.into())
          , api_key: Some(api_key.into())
          , model: Some(model.into())
        }
    }

    /// Validate into a usable profile.
    pub fn validate(&self)
      -> Result<ProviderProfile, crate::error::Error>
    {   let api_key = non_empty(&self.api_key).ok_or_else(|| {
          crate::error::Error::Configuration(format!(
            "{} provider profile is incomplete: missing API key",
            self.name
          ))
        })?;
        let raw_url = non_empty(&self.base_url).ok_or_else(|| {
          crate::error::Error::Configuration(format!(
            "{} provider profile is incomplete: missing base URL",
            self.name
          ))
        })?;
        let base_url = validate_base_url(&self.name, raw_url)?;
        let model = non_empty(&self.model)
          .unwrap_or(DEFAULT_MODEL)
          .to_string();

        Ok(ProviderProfile
        {   name: self.name.clone()
          , base_url
          , api_key: api_key.to_string()
          , model
        })
    }
}

impl fmt::Debug for ProviderSettings
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("ProviderSettings")
          .field("name", &self.name)
          .field("base_url", &self.base_url)
          .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
          .field("model", &self.model)
          .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str>
{   value.as_deref()
      .map(str::trim)
      .filter(|v| !v.is_empty())
}

/// Check that `raw` is an absolute http(s) URL whose path ends with the
/// API version segment. Returns it without a trailing slash.
pub fn validate_base_url(
  profile: &str
, raw: &str
) -> Result<String, crate::error::Error>
{   let parsed = url::Url::parse(raw).map_err(|e| {
      crate::error::Error::Configuration(format!(
        "{} base URL {:?} is not an absolute URL: {}",
        profile, raw, e
      ))
    })?;

    match parsed.scheme()
    {   "http" | "https" => {}
      , other => {
          return Err(crate::error::Error::Configuration(format!(
            "{} base URL must use http or https, got {}",
            profile, other
          )));
        }
    }

    let path = parsed.path().trim_end_matches('/');
    if !path.ends_with(API_VERSION_SUFFIX)
    {   return Err(crate::error::Error::Configuration(format!(
          "{} base URL path must end with {}, got {:?}",
          profile, API_VERSION_SUFFIX, parsed.path()
        )));
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

/// A validated provider profile
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderProfile
{   pub name: String
  , pub base_url: String
  , pub api_key: String
  , pub model: String
}

impl ProviderProfile
{   pub fn chat_completions_url(&self) -> String
    {   format!("{}/chat/completions", self.base_url)
    }
}

impl fmt::Debug for ProviderProfile
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("ProviderProfile")
          .field("name", &self.name)
          .field("base_url", &self.base_url)
          .field("api_key", &"<redacted>")
          .field("model", &self.model)
          .finish()
    }
}

/// Where a provider profile comes from. Environment sources are re-read
/// on every call so a corrected variable applies to the next request.
#[derive(Debug, Clone)]
pub enum ProfileSource
{   Environment
    {   name: String
      , prefix: String
      , default_base_url: Option<String>
    }
  , Fixed(ProviderSettings)
  , Unset
}

impl ProfileSource
{   pub fn primary_from_env() -> Self
    {   ProfileSource::Environment
        {   name: "primary".to_string()
          , prefix: PRIMARY_ENV_PREFIX.to_string()
          , default_base_url: Some(DEFAULT_BASE_URL.to_string())
        }
    }

    pub fn fallback_from_env() -> Self
    {   ProfileSource::Environment
        {   name: "fallback".to_string()
          , prefix: FALLBACK_ENV_PREFIX.to_string()
          , default_base_url: None
        }
    }

    /// Current raw settings for this source.
    pub fn settings(&self) -> ProviderSettings
    {   match self
        {   ProfileSource::Environment { name, prefix, default_base_url } => {
              let var = |suffix: &str| {
                std::env::var(format!("{}_{}", prefix, suffix))
                  .ok()
                  .filter(|v| !v.trim().is_empty())
              };
              ProviderSettings
              {   name: name.clone()
                , base_url: var("BASE_URL")
                    .or_else(|| default_base_url.clone())
                , api_key: var("API_KEY")
                , model: var("MODEL")
              }
            }
          , ProfileSource::Fixed(settings) => settings.clone()
          , ProfileSource::Unset => ProviderSettings::default()
        }
    }

    /// Whether anything was provided for this profile at all. An
    /// unconfigured fallback is skipped instead of failing validation.
    pub fn is_configured(&self) -> bool
    {   match self
        {   ProfileSource::Environment { prefix, .. } => {
              ["BASE_URL", "API_KEY"].iter().any(|suffix| {
                std::env::var(format!("{}_{}", prefix, suffix))
                  .map(|v| !v.trim().is_empty())
                  .unwrap_or(false)
              })
            }
          , ProfileSource::Fixed(_) => true
          , ProfileSource::Unset => false
        }
    }

    pub fn resolve(&self)
      -> Result<ProviderProfile, crate::error::Error>
    {   self.settings().validate()
    }
}

/// Sliding-window rate-limit policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy
{   /// Prefix of the per-caller key
    pub prefix: String
  , /// Requests allowed per window
    pub limit: u64
  , /// Window length
    pub window: Duration
}

impl Default for RateLimitPolicy
{   fn default() -> Self
    {   RateLimitPolicy
        {   prefix: "novel_ratelimit".to_string()
          , limit: 50
          , window: Duration::from_secs(24 * 60 * 60)
        }
    }
}

/// REST key-value store backing the rate limiter
#[derive(Clone, Serialize, Deserialize)]
pub struct RateLimitStoreConfig
{   pub url: String
  , pub token: String
}

impl fmt::Debug for RateLimitStoreConfig
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("RateLimitStoreConfig")
          .field("url", &self.url)
          .field("token", &"<redacted>")
          .finish()
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct AppConfig
{   pub bind_addr: String
  , pub primary: ProfileSource
  , pub fallback: ProfileSource
  , pub rate_limit_store: Option<RateLimitStoreConfig>
  , pub rate_limit: RateLimitPolicy
  , pub connect_timeout: Duration
}

impl Default for AppConfig
{   fn default() -> Self
    {   AppConfig
        {   bind_addr: DEFAULT_BIND_ADDR.to_string()
          , primary: ProfileSource::primary_from_env()
          , fallback: ProfileSource::fallback_from_env()
          , rate_limit_store: None
          , rate_limit: RateLimitPolicy::default()
          , connect_timeout: Duration::from_secs(10)
        }
    }
}

impl AppConfig
{   /// Build the configuration from process environment.
    pub fn from_env() -> Self
    {   let mut config = AppConfig::default();

        if let Ok(addr) = std::env::var("BIND_ADDR")
        {   config.bind_addr = addr;
        }

        match (
          std::env::var("KV_REST_API_URL").ok(),
          std::env::var("KV_REST_API_TOKEN").ok()
        )
        {   (Some(url), Some(token))
              if !url.is_empty() && !token.is_empty() => {
              debug!("Rate limiting enabled against {}", url);
              config.rate_limit_store
                = Some(RateLimitStoreConfig { url, token });
            }
          , _ => {
              warn!("KV_REST_API_URL/KV_REST_API_TOKEN not set; rate limiting disabled");
            }
        }

        if let Some(limit) = env_number("RATE_LIMIT_MAX")
        {   config.rate_limit.limit = limit;
        }
        if let Some(secs) = env_number("RATE_LIMIT_WINDOW_SECS")
        {   config.rate_limit.window = Duration::from_secs(secs);
        }
        if let Some(secs) = env_number("PROVIDER_CONNECT_TIMEOUT_SECS")
        {   config.connect_timeout = Duration::from_secs(secs);
        }

        config
    }
}

fn env_number(name: &str) -> Option<u64>
{   let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>()
    {   Ok(n) if n > 0 => Some(n)
      , _ => {
          warn!("Ignoring {}={:?}: expected a positive integer", name, raw);
          None
        }
    }
}
