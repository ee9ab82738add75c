//! HTTP surface: `POST /api/generate`

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use log::{debug, error, info, warn};
use tokio_stream::wrappers::ReceiverStream;

use crate::client::GenerateService;
use crate::error::Error;
use crate::request::GenerateRequest;

pub const RATE_LIMITED_MESSAGE: &str
  = "You have reached your request limit for the day.";
pub const UNAVAILABLE_MESSAGE: &str
  = "The AI service is temporarily unavailable. Please try again later.";

pub fn router(service: GenerateService) -> Router
{   Router::new()
      .route("/api/generate", post(generate))
      .with_state(service)
}

async fn generate(
  State(service): State<GenerateService>
, headers: HeaderMap
, payload: Result<Json<GenerateRequest>, JsonRejection>
) -> Response
{   let caller = crate::ratelimit::caller_key(&headers);
    debug!("Generate request from {}", caller);

    if let Err(e) = service.check_rate(&caller).await
    {   return e.into_response();
    }

    let Json(request) = match payload
    {   Ok(json) => json
      , Err(rejection) => {
          warn!("Rejected generate body: {}", rejection.body_text());
          return Error::InvalidRequest(rejection.body_text())
            .into_response();
        }
    };

    match service.complete(request).await
    {   Ok(generation) => {
          debug!("Relaying completion from {:?}", generation.served_by);
          (
            [
              (header::CONTENT_TYPE, "text/plain; charset=utf-8")
            , (header::CACHE_CONTROL, "no-cache")
            ],
            Body::from_stream(ReceiverStream::new(generation.body))
          ).into_response()
        }
      , Err(e) => e.into_response()
    }
}

impl IntoResponse for Error
{   fn into_response(self) -> Response
    {   match self
        {   Error::InvalidRequest(_)
          | Error::InvalidOperation(_)
          | Error::Configuration(_) => {
              warn!("Bad request: {}", self);
              (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
          , Error::RateLimitExceeded(verdict) => {
              let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                RATE_LIMITED_MESSAGE
              ).into_response();
              let headers = response.headers_mut();
              headers.insert("x-ratelimit-limit", HeaderValue::from(verdict.limit));
              headers.insert("x-ratelimit-remaining", HeaderValue::from(verdict.remaining));
              headers.insert("x-ratelimit-reset", HeaderValue::from(verdict.reset));
              response
            }
          , Error::ProviderClient { status, .. } => {
              let code = StatusCode::from_u16(status)
                .ok()
                .filter(StatusCode::is_client_error)
                .unwrap_or(StatusCode::BAD_REQUEST);
              (
                code,
                format!("The AI provider rejected the request (status {}).", status)
              ).into_response()
            }
          , Error::ProviderServer { .. }
          | Error::Transport(_)
          | Error::ProvidersUnavailable
          | Error::RateLimitStore(_) => {
              error!("Upstream failure: {}", self);
              (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_MESSAGE)
                .into_response()
            }
          , Error::ParseError(_) => {
              error!("Internal failure: {}", self);
              (StatusCode::INTERNAL_SERVER_ERROR, "Internal error.")
                .into_response()
            }
        }
    }
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: crate::config::AppConfig)
  -> Result<(), Box<dyn std::error::Error>>
{   let service = GenerateService::from_config(&config)?;
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
      .with_graceful_shutdown(shutdown_signal())
      .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal()
{   match tokio::signal::ctrl_c().await
    {   Ok(()) => info!("Shutdown requested")
      , Err(e) => error!("Failed to listen for shutdown signal: {}", e)
    }
}
