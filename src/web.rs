//! HTTP form and JSON endpoints.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{
        State,
        rejection::{FormRejection, JsonRejection},
    },
    response::{Html, IntoResponse},
    routing::get,
};
use secrecy::SecretString;
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{ClusterParams, DEFAULT_CLUSTERS, DEFAULT_SUBJECT};
use crate::error::{ConfigError, Error};
use crate::mail::MailSource;
use crate::pipeline::{self, Query};
use crate::render::{self, FormValues, View};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn MailSource>,
    pub params: ClusterParams,
}

/// A form or JSON submission.
#[derive(Debug, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_clusters")]
    pub clusters: usize,
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

fn default_clusters() -> usize {
    DEFAULT_CLUSTERS
}

impl Submission {
    fn into_parts(self) -> (FormValues, Query) {
        let form = FormValues {
            email: self.email.clone(),
            subject: self.subject.clone(),
            clusters: self.clusters,
        };
        let query = Query {
            username: self.email,
            password: SecretString::from(self.password),
            subject: self.subject,
            clusters: self.clusters,
        };
        (form, query)
    }
}

/// Build the Axum router.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(form_page).post(submit_form))
        .route("/api/cluster", axum::routing::post(submit_json))
        .route("/health", get(health))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mail-cluster"
    }))
}

// ── Form ────────────────────────────────────────────────────────────────

async fn form_page() -> Html<String> {
    Html(render::page(&FormValues::default(), None))
}

async fn submit_form(
    State(state): State<AppState>,
    submission: Result<Form<Submission>, FormRejection>,
) -> Html<String> {
    let Form(submission) = match submission {
        Ok(form) => form,
        Err(rejection) => {
            let view = rejected(rejection.body_text());
            return Html(render::page(&FormValues::default(), Some(&view)));
        }
    };
    let (form, query) = submission.into_parts();
    let view = cluster_request(&state, &query).await;
    Html(render::page(&form, Some(&view)))
}

// ── JSON ────────────────────────────────────────────────────────────────

async fn submit_json(
    State(state): State<AppState>,
    submission: Result<Json<Submission>, JsonRejection>,
) -> Json<View> {
    match submission {
        Ok(Json(submission)) => {
            let (_, query) = submission.into_parts();
            Json(cluster_request(&state, &query).await)
        }
        Err(rejection) => Json(rejected(rejection.body_text())),
    }
}

/// A submission that could not be decoded, as the one error line.
fn rejected(reason: String) -> View {
    warn!(%reason, "Rejected submission");
    View::from_error(&Error::Config(ConfigError::InvalidValue {
        key: "request".into(),
        message: reason,
    }))
}

async fn cluster_request(state: &AppState, query: &Query) -> View {
    info!(subject = %query.subject, clusters = query.clusters, "Cluster request");
    pipeline::run(state.source.as_ref(), query, &state.params).await
}
