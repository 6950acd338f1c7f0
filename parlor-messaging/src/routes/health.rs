use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::prelude::*;
use std::sync::Arc;

use parlor_shared::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

const SERVICE: &str = "parlor-messaging";

pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse::healthy(SERVICE, env!("CARGO_PKG_VERSION")))
}

/// Readiness: the service is only healthy while the database answers.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let database = match state.db.get() {
        Ok(mut conn) => match diesel::sql_query("SELECT 1").execute(&mut conn) {
            Ok(_) => HealthCheck {
                name: "database".to_string(),
                status: HealthStatus::Healthy,
                message: None,
            },
            Err(e) => HealthCheck {
                name: "database".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(format!("{e}")),
            },
        },
        Err(e) => HealthCheck {
            name: "database".to_string(),
            status: HealthStatus::Unhealthy,
            message: Some(format!("{e}")),
        },
    };

    let response = HealthResponse::healthy(SERVICE, env!("CARGO_PKG_VERSION")).with_checks(vec![database]);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}
