use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use gantry_github::{EVENT_HEADER, SIGNATURE_HEADER, SIGNATURE_HEADER_SHA256, event::ClassifyError};

use crate::{
    AppState,
    pipeline::{self, Delivery, Outcome, Rejection, Timeouts},
};

/// Webhook endpoint. The body is buffered here, once, and handed to the
/// pipeline as raw bytes; verification and decoding both work off that
/// buffer.
pub async fn receive(
    State(state): State<AppState>,
    Path(login): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event_type = headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok());
    let signature = headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(SIGNATURE_HEADER_SHA256))
        .and_then(|v| v.to_str().ok());
    let timeouts = Timeouts {
        lookup: state.config.webhook.lookup_timeout(),
        publish: state.config.webhook.publish_timeout(),
    };
    let delivery = Delivery { login: &login, event_type, signature, body: &body };
    match pipeline::process(state.db.as_ref(), state.jobs.as_ref(), &timeouts, delivery).await {
        Ok(outcome) => acknowledged(&login, outcome),
        Err(rejection) => rejected(&login, rejection),
    }
}

fn acknowledged(login: &str, outcome: Outcome) -> Response {
    match outcome {
        Outcome::Dispatched => (StatusCode::OK, "Build dispatched").into_response(),
        Outcome::Ignored(reason) => {
            tracing::debug!("Ignoring event for `{login}`: {reason}");
            (StatusCode::OK, "Event ignored").into_response()
        }
        Outcome::Skipped(reason) => {
            tracing::info!("No build for event for `{login}`: {}", reason.as_str());
            (StatusCode::OK, "No build triggered").into_response()
        }
    }
}

fn rejected(login: &str, rejection: Rejection) -> Response {
    match rejection {
        Rejection::UnknownAccount => {
            tracing::warn!("Webhook delivery for unknown account `{login}`");
            (StatusCode::NOT_FOUND, "Unknown account").into_response()
        }
        Rejection::Signature(err) => {
            tracing::warn!("Rejected delivery for `{login}`: {err}");
            (StatusCode::BAD_REQUEST, "Signature verification failed").into_response()
        }
        Rejection::UnparsableBody(err) => {
            tracing::warn!("Unparsable webhook body for `{login}`: {err}");
            (StatusCode::BAD_REQUEST, "Invalid JSON body").into_response()
        }
        Rejection::Malformed(err @ ClassifyError::MalformedRef(_)) => {
            tracing::warn!("Rejected delivery for `{login}`: {err}");
            (StatusCode::NOT_FOUND, "Ref does not name a branch").into_response()
        }
        Rejection::Malformed(err) => {
            tracing::warn!("Rejected delivery for `{login}`: {err}");
            (StatusCode::BAD_REQUEST, "Malformed event payload").into_response()
        }
        Rejection::Transport(err) => {
            tracing::error!("Webhook pipeline failure for `{login}`: {err:?}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}
