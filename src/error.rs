use std::fmt;

/// Error type for every stage of a generate request.
/// Implements Clone so a failed attempt can be logged and kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Request body could not be read as a generate request
    InvalidRequest(String)
  , /// `option` named no known operation
    InvalidOperation(String)
  , /// Provider profile missing or malformed
    Configuration(String)
  , /// Caller exhausted its rate-limit window
    RateLimitExceeded(crate::ratelimit::RateLimitVerdict)
  , /// Rate-limit store could not be reached or answered nonsense
    RateLimitStore(String)
  , /// Provider rejected the request (HTTP 4xx)
    ProviderClient
    {   status: u16
      , message: String
    }
  , /// Provider failed while serving the request (HTTP >= 500)
    ProviderServer
    {   status: u16
      , message: String
    }
  , /// Network failure talking to the provider
    Transport(String)
  , /// Every configured provider failed
    ProvidersUnavailable
  , /// Failed to parse a provider or store payload
    ParseError(String)
}

impl Error
{   /// Whether the failure points at the provider rather than the
    /// request, so the next provider may succeed where this one did not.
    pub fn is_fallback_eligible(&self) -> bool
    {   matches!(
          self,
          Error::ProviderServer { .. } | Error::Transport(_)
        )
    }

    /// Classify a non-success provider status.
    pub fn from_provider_status(
      status: u16
    , message: String
    ) -> Self
    {   if status >= 500
        {   Error::ProviderServer { status, message }
        } else
        {   Error::ProviderClient { status, message }
        }
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::InvalidRequest(msg) => {
              write!(f, "Invalid request: {}", msg)
            }
          , Error::InvalidOperation(option) => {
              write!(f, "Unknown operation: {}", option)
            }
          , Error::Configuration(msg) => {
              write!(f, "Configuration error: {}", msg)
            }
          , Error::RateLimitExceeded(verdict) => {
              write!(f,
                "Rate limit exceeded ({} of {} remaining)",
                verdict.remaining,
                verdict.limit
              )
            }
          , Error::RateLimitStore(msg) => {
              write!(f, "Rate-limit store error: {}", msg)
            }
          , Error::ProviderClient { status, message } => {
              write!(f,
                "Provider rejected request ({}): {}",
                status,
                message
              )
            }
          , Error::ProviderServer { status, message } => {
              write!(f,
                "Provider server error ({}): {}",
                status,
                message
              )
            }
          , Error::Transport(msg) => {
              write!(f, "Transport error: {}", msg)
            }
          , Error::ProvidersUnavailable => {
              write!(f, "All completion providers failed")
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error
{   fn from(e: serde_json::Error) -> Self
    {   Error::ParseError(e.to_string())
    }
}
