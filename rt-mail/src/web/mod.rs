//! HTTP surface: provider webhooks and the SNS endpoint.
//!
//! | Route | Provider |
//! |---|---|
//! | `GET /health` | liveness |
//! | `POST /mg/mx/mime` | Mailgun |
//! | `POST /sendgrid/mx` | SendGrid Inbound Parse |
//! | `HEAD /spark`, `POST /spark` | SparkPost events |
//! | `POST /spark/mx` | SparkPost relay |
//! | `POST /ses` | AWS SES via SNS (only with a configured topic) |

pub mod form;
pub mod handlers;
pub mod signature;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub use handlers::{
    health, mailgun_mime, sendgrid_mx, ses_notification, spark_events, spark_head, spark_relay,
    AppState, HealthResponse, SendgridEnvelope, WebhookResponse,
};
pub use signature::{configured_signing_key, verify_mailgun_signature, MailgunSignatureError};

/// Build the application router.
///
/// Request bodies are capped at `max_email_bytes`; every request is bounded
/// by `request_timeout`, and dropping a timed-out handler cancels its
/// outbound calls.
pub fn router(state: AppState) -> Router {
    let max_body = state.config.max_email_bytes;
    let request_timeout = state.config.request_timeout;

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/mg/mx/mime", post(mailgun_mime))
        .route("/sendgrid/mx", post(sendgrid_mx))
        .route("/spark", post(spark_events).head(spark_head))
        .route("/spark/mx", post(spark_relay));

    if state.dispatcher.is_some() {
        app = app.route("/ses", post(ses_notification));
    }

    with_middleware(app, max_body, request_timeout).with_state(state)
}

/// Body limit, panic recovery, timeout, gzip responses and request tracing.
///
/// A panicking handler answers 500 and the process keeps serving.
fn with_middleware<S>(app: Router<S>, max_body: usize, request_timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    app.layer(DefaultBodyLimit::max(max_body))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
