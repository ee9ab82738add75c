//! Primary/fallback provider sequencing

use log::{debug, info, warn};

use crate::config::ProfileSource;
use crate::providers::OpenAiClient;
use crate::request::ChatMessage;

/// Position of a profile in the failover order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileRole
{   Primary
  , Fallback
}

/// Ordered profiles to try: the primary, then the fallback if one is
/// configured.
#[derive(Debug, Clone)]
pub struct FailoverSequence<'a>
{   pub profiles: Vec<(ProfileRole, &'a ProfileSource)>
  , pub current_index: usize
}

impl<'a> FailoverSequence<'a>
{   /// Build the sequence, skipping an unconfigured fallback.
    pub fn new(
      primary: &'a ProfileSource
    , fallback: &'a ProfileSource
    ) -> Self
    {   let mut profiles = vec![(ProfileRole::Primary, primary)];
        if fallback.is_configured()
        {   profiles.push((ProfileRole::Fallback, fallback));
        }
        debug!(
          "Creating failover sequence with {} providers",
          profiles.len()
        );
        FailoverSequence
        {   profiles
          , current_index: 0
        }
    }

    /// Get the current profile
    pub fn current(&self)
      -> Option<(ProfileRole, &'a ProfileSource)>
    {   self.profiles.get(self.current_index).copied()
    }

    /// Move to the next profile
    pub fn next(&mut self)
      -> Option<(ProfileRole, &'a ProfileSource)>
    {   self.current_index += 1;
        self.current()
    }

    /// Check if we have more profiles to try
    pub fn has_next(&self) -> bool
    {   self.current_index + 1 < self.profiles.len()
    }
}

/// Open a completion stream on the first profile that accepts it.
///
/// Each profile is validated right before its call, so configuration
/// errors surface before any network traffic to that provider. Only
/// server-class and transport failures move on to the next profile;
/// provider 4xx errors are returned as they are. When every profile
/// fails the result is [`crate::error::Error::ProvidersUnavailable`].
pub async fn stream_with_fallback(
  http_client: &reqwest::Client
, mut sequence: FailoverSequence<'_>
, messages: &[ChatMessage]
) -> Result<(ProfileRole, reqwest::Response), crate::error::Error>
{   let mut current = sequence.current();

    while let Some((role, source)) = current
    {   let profile = source.resolve()?;
        debug!("Calling {:?} provider {}", role, profile.base_url);

        match OpenAiClient::new(&profile, http_client)
          .stream_chat(messages.to_vec())
          .await
        {   Ok(response) => {
              info!("Streaming completion from {:?} provider", role);
              return Ok((role, response));
            }
          , Err(e) if e.is_fallback_eligible() => {
              warn!("{:?} provider failed: {}", role, e);
              if !sequence.has_next()
              {   break;
              }
              current = sequence.next();
            }
          , Err(e) => return Err(e)
        }
    }

    warn!("No completion provider available");
    Err(crate::error::Error::ProvidersUnavailable)
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::config::ProviderSettings;

    #[test]
    fn unconfigured_fallback_is_skipped()
    {   let primary = ProfileSource::Fixed(ProviderSettings::default());
        let fallback = ProfileSource::Unset;
        let sequence = FailoverSequence::new(&primary, &fallback);
        assert_eq!(sequence.profiles.len(), 1);
        assert!(!sequence.has_next());
    }

    #[test]
    fn sequence_walks_primary_then_fallback()
    {   let primary = ProfileSource::Fixed(ProviderSettings::default());
        let fallback = ProfileSource::Fixed(ProviderSettings::default());
        let mut sequence = FailoverSequence::new(&primary, &fallback);
        assert_eq!(sequence.current().map(|p| p.0), Some(ProfileRole::Primary));
        assert!(sequence.has_next());
        assert_eq!(sequence.next().map(|p| p.0), Some(ProfileRole::Fallback));
        assert!(sequence.next().is_none());
    }

    #[test]
    fn only_server_and_transport_errors_fall_back()
    {   use crate::error::Error;
        assert!(Error::from_provider_status(500, String::new()).is_fallback_eligible());
        assert!(Error::Transport("reset".to_string()).is_fallback_eligible());
        assert!(!Error::from_provider_status(404, String::new()).is_fallback_eligible());
        assert!(!Error::from_provider_status(429, String::new()).is_fallback_eligible());
    }
}
