//! Signaling protocol: one JSON session description each way over HTTP
//!
//! The client POSTs `{"sdp": ..., "type": "offer"}` to [`OFFER_PATH`] and
//! receives `{"sdp": ..., "type": "answer"}` with status 200. Errors are
//! plain text with a 4xx or 5xx status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use framerelay_core::RelayError;
use thiserror::Error;

pub use framerelay_core::{SdpType, SessionDescription};

/// Path of the offer endpoint
pub const OFFER_PATH: &str = "/offer";

/// Content type of signaling messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Whether a `Content-Type` header value denotes JSON
///
/// Parameters such as `charset` are ignored, and `+json` suffix types are
/// accepted.
pub fn is_json_content_type(value: &str) -> bool {
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == JSON_CONTENT_TYPE || (essence.starts_with("application/") && essence.ends_with("+json"))
}

/// Why an offer was rejected by the server
#[derive(Error, Debug)]
pub enum OfferRejection {
    /// The request body is not a usable offer
    #[error("Bad offer: {0}")]
    BadRequest(RelayError),

    /// Negotiation failed after the offer was accepted for processing
    #[error("Negotiation failed: {0}")]
    Negotiation(RelayError),
}

impl OfferRejection {
    /// HTTP status sent for this rejection
    pub fn status(&self) -> StatusCode {
        match self {
            OfferRejection::BadRequest(_) => StatusCode::BAD_REQUEST,
            OfferRejection::Negotiation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Underlying error
    pub fn error(&self) -> &RelayError {
        match self {
            OfferRejection::BadRequest(e) | OfferRejection::Negotiation(e) => e,
        }
    }
}

impl IntoResponse for OfferRejection {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
