//! Request types shared by the route, the prompt resolver and the
//! provider client

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/generate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest
{   /// Selected or preceding editor text
    #[serde(default)]
    pub prompt: String
  , /// Operation name, parsed into [`OperationKind`]
    pub option: String
  , /// Free-text instruction for `continue` and `zap`
    #[serde(default)]
    pub command: Option<String>
}

impl GenerateRequest
{   pub fn operation(&self)
      -> Result<OperationKind, crate::error::Error>
    {   self.option.parse()
    }
}

/// The writing transformations offered by the toolbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind
{   /// Keep writing after the preceding text
    Continue
  , /// Polish the selection
    Improve
  , /// Condense the selection
    Shorter
  , /// Expand the selection
    Longer
  , /// Correct grammar and spelling
    Fix
  , /// Apply a user-written command
    Zap
  , /// Propose a chapter title
    GenerateTitle
}

impl OperationKind
{   pub const ALL: [OperationKind; 7] = [
      OperationKind::Continue
    , OperationKind::Improve
    , OperationKind::Shorter
    , OperationKind::Longer
    , OperationKind::Fix
    , OperationKind::Zap
    , OperationKind::GenerateTitle
    ];

    pub fn as_str(&self) -> &'static str
    {   match self
        {   OperationKind::Continue => "continue"
          , OperationKind::Improve => "improve"
          , OperationKind::Shorter => "shorter"
          , OperationKind::Longer => "longer"
          , OperationKind::Fix => "fix"
          , OperationKind::Zap => "zap"
          , OperationKind::GenerateTitle => "generate_title"
        }
    }
}

impl FromStr for OperationKind
{   type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {   OperationKind::ALL
          .iter()
          .copied()
          .find(|kind| kind.as_str() == s)
          .ok_or_else(|| {
            crate::error::Error::InvalidOperation(s.to_string())
          })
    }
}

impl fmt::Display for OperationKind
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: String
}

impl ChatMessage
{   pub fn system(content: impl Into<String>) -> Self
    {   ChatMessage
        {   role: "system".to_string()
          , content: content.into()
        }
    }

    pub fn user(content: impl Into<String>) -> Self
    {   ChatMessage
        {   role: "user".to_string()
          , content: content.into()
        }
    }
}

/// Resolved system instruction and user message for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePair
{   pub system: String
  , pub user: String
}

impl MessagePair
{   pub fn to_messages(&self) -> Vec<ChatMessage>
    {   vec![
          ChatMessage::system(self.system.clone())
        , ChatMessage::user(self.user.clone())
        ]
    }
}
