pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod prompts;
pub mod ratelimit;
pub mod failover;
pub mod stream;
pub mod client;
pub mod server;

/*

novel-ai-proxy: the backend of the novel editor's AI toolbox. One route,
POST /api/generate, turns {prompt, option, command} into a chat
completion and streams it back while it is being written.

src/
├── lib.rs          # Module list and re-exports
├── main.rs         # Binary: .env, logging, serve
├── error.rs        # Error type and fallback classification
├── config.rs       # Provider profiles, rate-limit and server settings
├── request.rs      # Request body, operation kinds, chat messages
├── prompts.rs      # Per-operation templates and substitution
├── ratelimit.rs    # Sliding-window limiter over a REST key-value store
├── providers/      # OpenAI-compatible streaming client
├── failover.rs     # Primary, then fallback on server/transport errors
├── stream.rs       # Relay of provider chunks as JSON lines
├── client.rs       # GenerateService tying the steps together
└── server.rs       # axum router and error-to-response mapping

*/

pub use client::{GenerateService, Generation};
pub use config::{AppConfig, ProfileSource, ProviderProfile, ProviderSettings};
pub use error::Error;
pub use failover::ProfileRole;
pub use request::{GenerateRequest, OperationKind};
