use serde::{Deserialize, Serialize};
use log::{debug, trace, error};

use crate::config::ProviderProfile;
use crate::request::ChatMessage;

pub const MAX_TOKENS: usize = 4096;
pub const TEMPERATURE: f32 = 0.7;
pub const TOP_P: f32 = 1.0;
pub const FREQUENCY_PENALTY: f32 = 0.0;
pub const PRESENCE_PENALTY: f32 = 0.0;

// ===== Wire Types =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , pub max_tokens: usize
  , pub temperature: f32
  , pub top_p: f32
  , pub frequency_penalty: f32
  , pub presence_penalty: f32
  , pub stream: bool
}

impl ChatCompletionRequest
{   /// Streaming request with the toolbox's fixed sampling parameters.
    pub fn streaming(
      model: String
    , messages: Vec<ChatMessage>
    ) -> Self
    {   ChatCompletionRequest
        {   model
          , messages
          , max_tokens: MAX_TOKENS
          , temperature: TEMPERATURE
          , top_p: TOP_P
          , frequency_penalty: FREQUENCY_PENALTY
          , presence_penalty: PRESENCE_PENALTY
          , stream: true
        }
    }
}

// ===== Client =====

/// Client for one resolved provider profile. Cheap to build per call:
/// the connection pool lives in the shared `reqwest::Client`.
pub struct OpenAiClient<'a>
{   profile: &'a ProviderProfile
  , http_client: &'a reqwest::Client
}

impl<'a> OpenAiClient<'a>
{   pub fn new(
      profile: &'a ProviderProfile
    , http_client: &'a reqwest::Client
    ) -> Self
    {   debug!("Creating OpenAiClient for {} profile", profile.name);
        OpenAiClient
        {   profile
          , http_client
        }
    }

    /// Start a streaming chat completion. On success the returned
    /// response's body has not been read yet. No retries happen here;
    /// the caller owns the fallback policy.
    pub async fn stream_chat(
      &self
    , messages: Vec<ChatMessage>
    ) -> Result<reqwest::Response, crate::error::Error>
    {   let request = ChatCompletionRequest::streaming(
          self.profile.model.clone(),
          messages
        );
        trace!("{} request: {:?}", self.profile.name, request);

        let response = self.http_client
          .post(self.profile.chat_completions_url())
          .bearer_auth(&self.profile.api_key)
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            error!("{} provider HTTP error: {}", self.profile.name, e);
            crate::error::Error::Transport(e.to_string())
          })?;

        let status = response.status();
        trace!("{} response status: {}", self.profile.name, status);

        if !status.is_success()
        {   let error_text = response.text().await
              .unwrap_or_else(|_|
                "Unknown error".to_string()
              );
            error!(
              "{} provider error {}: {}",
              self.profile.name, status, error_text
            );
            return Err(crate::error::Error::from_provider_status(
              status.as_u16(),
              error_text
            ));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn request_carries_fixed_sampling_and_stream_flag()
    {   let request = ChatCompletionRequest::streaming(
          "gpt-4o-mini".to_string(),
          vec![ChatMessage::system("s"), ChatMessage::user("u")]
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], true);
        assert_eq!(value["max_tokens"], 4096);
        assert_eq!(value["top_p"], 1.0);
        assert_eq!(value["messages"][1]["role"], "user");
    }
}
