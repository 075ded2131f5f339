use std::sync::Arc;

use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use chrono::Utc;
use http::StatusCode;
use serde::Serialize;
use tracing::{error, info};

use crate::config::Config;
use crate::delivery::{deliver, Connector};
use crate::message::compose;

pub const MAIL_DELIVERED_PATH: &str = "/mail-delivered";

/// Read-only state shared by every request.
pub struct AppState<C> {
    pub config: Config,
    pub connector: C,
}

impl<C> AppState<C> {
    pub fn new(config: Config, connector: C) -> Self {
        Self { config, connector }
    }
}

// Response model
#[derive(Debug, Serialize)]
pub struct MailResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

pub fn router<C>(state: AppState<C>) -> Router
where
    C: Connector + 'static,
{
    Router::new()
        .route(MAIL_DELIVERED_PATH, any(mail_delivered::<C>))
        .with_state(Arc::new(state))
}

pub async fn mail_delivered<C: Connector>(State(state): State<Arc<AppState<C>>>) -> Response {
    info!("got {MAIL_DELIVERED_PATH} request");

    let message = compose(&state.config, Utc::now());
    info!(subject = %message.subject, "composed notification");

    match deliver(&state.connector, &state.config, &message).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MailResponse {
                success: true,
                error: None,
            }),
        )
            .into_response(),
        Err(err) => {
            error!(stage = %err.stage, error = %err.source, "failed to deliver notification");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MailResponse {
                    success: false,
                    error: Some(err.stage.description()),
                }),
            )
                .into_response()
        }
    }
}
