//! Quote submission form, listing, and Slack Events API intake.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tera::{Context, Tera};
use tracing::{error, info, warn};

use billbot_core::ApplicationError;
use billbot_slack::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use billbot_slack::{EnvelopeSender, EventsApiPayload, RequestVerifier, SlackEnvelope};
use billbot_store::{QuoteCache, QuoteStore};

pub const QUOTE_ADDED: &str = "quote added!";
pub const NO_QUOTE_SPECIFIED: &str = "no quote specified";

const FORM_TEMPLATE: &str = "form.html";

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn QuoteStore>,
    cache: Arc<QuoteCache>,
    templates: Arc<Tera>,
    events: Option<EnvelopeSender>,
    verifier: Option<Arc<RequestVerifier>>,
}

impl AppState {
    pub fn new(store: Arc<dyn QuoteStore>, cache: Arc<QuoteCache>) -> Self {
        Self { store, cache, templates: init_templates(), events: None, verifier: None }
    }

    /// Accepts signed Events API requests and queues them on `events`.
    pub fn with_event_intake(mut self, events: EnvelopeSender, verifier: RequestVerifier) -> Self {
        self.events = Some(events);
        self.verifier = Some(Arc::new(verifier));
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSubmission {
    quote: Option<String>,
}

fn init_templates() -> Arc<Tera> {
    let mut tera = Tera::default();
    if let Err(error) =
        tera.add_raw_template(FORM_TEMPLATE, include_str!("../templates/form.html"))
    {
        warn!(
            event_name = "system.http.template_error",
            error = %error,
            "failed to register submission form template"
        );
    }
    Arc::new(tera)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(submission_form))
        .route("/quote", post(add_quote))
        .route("/list", get(list_quotes))
        .route("/slack/events", post(slack_events))
        .with_state(state)
}

async fn submission_form(State(state): State<AppState>) -> Result<Html<String>, Response> {
    let mut context = Context::new();
    context.insert("title", "bill-bot");
    context.insert("action", "/quote");
    context.insert("placeholder", "Enter something Bill says...");
    context.insert("quote_count", &state.cache.len().await);

    state.templates.render(FORM_TEMPLATE, &context).map(Html).map_err(|error| {
        error!(event_name = "system.http.template_error", error = %error, "form render failed");
        let body = Html(format!("<h1>Template Error</h1><pre>{error:?}</pre>"));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    })
}

/// Accepts JSON or urlencoded bodies. A body that does not decode is treated
/// like one without a `quote` field. The text is stored as submitted.
async fn add_quote(State(state): State<AppState>, request: Request) -> Response {
    let submission = read_submission(request).await;
    let text = submission.quote.as_deref().unwrap_or_default();
    if text.is_empty() {
        info!(event_name = "http.quote.missing", "quote submission without text");
        return (StatusCode::OK, NO_QUOTE_SPECIFIED).into_response();
    }

    match state.store.append_quote(text).await {
        Ok(id) => {
            state.cache.invalidate().await;
            info!(event_name = "http.quote.added", record_id = %id, "quote appended");
            (StatusCode::OK, QUOTE_ADDED).into_response()
        }
        Err(store_error) => {
            let correlation_id = format!("quote-{}", Utc::now().timestamp_millis());
            let interface = ApplicationError::Persistence(store_error.to_string())
                .into_interface(correlation_id);
            error!(
                event_name = "http.quote.append_failed",
                correlation_id = %interface.correlation_id(),
                error = %interface,
                "quote append failed"
            );
            (StatusCode::BAD_GATEWAY, interface.user_message()).into_response()
        }
    }
}

async fn read_submission(request: Request) -> QuoteSubmission {
    if is_json(request.headers()) {
        Json::<QuoteSubmission>::from_request(request, &())
            .await
            .map(|Json(submission)| submission)
            .unwrap_or_default()
    } else {
        Form::<QuoteSubmission>::from_request(request, &())
            .await
            .map(|Form(submission)| submission)
            .unwrap_or_default()
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn list_quotes(State(state): State<AppState>) -> Json<Vec<String>> {
    state.cache.ensure_fresh().await;
    Json(state.cache.list().await)
}

/// Events API intake. Every request must carry a valid Slack signature,
/// including `url_verification`.
async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let (Some(verifier), Some(events)) = (&state.verifier, &state.events) else {
        warn!(
            event_name = "ingress.slack.intake_disabled",
            "event received but slack.signing_secret or the runner is not configured"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "ok": false })));
    };

    let timestamp = header_str(&headers, TIMESTAMP_HEADER);
    let signature = header_str(&headers, SIGNATURE_HEADER);
    if let Err(error) = verifier.verify(timestamp, signature, &body) {
        warn!(
            event_name = "ingress.slack.signature_rejected",
            error = %error,
            "rejected unsigned or forged events request"
        );
        return (StatusCode::UNAUTHORIZED, Json(json!({ "ok": false })));
    }

    let payload = match serde_json::from_slice::<EventsApiPayload>(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(
                event_name = "ingress.slack.payload_invalid",
                error = %error,
                "events request body did not decode"
            );
            return (StatusCode::BAD_REQUEST, Json(json!({ "ok": false })));
        }
    };

    match payload {
        EventsApiPayload::UrlVerification { challenge } => {
            info!(event_name = "ingress.slack.url_verification", "answering url verification");
            (StatusCode::OK, Json(json!({ "challenge": challenge })))
        }
        EventsApiPayload::EventCallback { event_id, event } => {
            let envelope: SlackEnvelope = event.into_envelope(event_id);
            match events.send(envelope).await {
                Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))),
                Err(error) => {
                    error!(
                        event_name = "ingress.slack.enqueue_failed",
                        error = %error,
                        "slack runner stopped accepting events"
                    );
                    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "ok": false })))
                }
            }
        }
        EventsApiPayload::Other => (StatusCode::OK, Json(json!({ "ok": true }))),
    }
}
