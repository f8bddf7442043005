use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use crate::AppState;
use keiba::models::HealthResponse;

/// Health check endpoint
pub async fn health_check(state: web::Data<Arc<AppState>>) -> impl Responder {
    let available_sources = state.service.available_sources();
    let response = HealthResponse {
        status: if available_sources.is_empty() {
            "degraded".to_string()
        } else {
            "ok".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        available_sources,
    };

    HttpResponse::Ok().json(response)
}

/// Service status: mode, providers and cache
pub async fn service_status(state: web::Data<Arc<AppState>>) -> impl Responder {
    HttpResponse::Ok().json(state.service.status())
}
