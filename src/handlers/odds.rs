use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::AppState;
use keiba::error::{validate_source, AppError};

#[derive(Debug, Deserialize)]
pub struct OddsQuery {
    /// Replay odds this many seconds before the deadline
    pub seconds_before_deadline: Option<u32>,
    pub data_source: Option<String>,
}

/// Odds for a race, optionally time-shifted
pub async fn get_odds(
    state: web::Data<Arc<AppState>>,
    race_id: web::Path<String>,
    query: web::Query<OddsQuery>,
) -> Result<HttpResponse, AppError> {
    let hint = validate_source(query.data_source.as_deref())?;
    let race_id = race_id.into_inner();

    let response = state
        .service
        .get_realtime_odds(&race_id, query.seconds_before_deadline, hint)?;
    info!(
        "Served {} odds records for race {} from {}",
        response.odds.len(),
        race_id,
        response.data_source
    );

    Ok(HttpResponse::Ok().json(response))
}
