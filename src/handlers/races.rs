use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::AppState;
use keiba::error::{validate_source, AppError};
use keiba::models::RacesResponse;

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    pub data_source: Option<String>,
}

/// List races for a YYYYMMDD date
pub async fn list_races(
    state: web::Data<Arc<AppState>>,
    date: web::Path<String>,
    query: web::Query<SourceQuery>,
) -> Result<HttpResponse, AppError> {
    let hint = validate_source(query.data_source.as_deref())?;
    let date = date.into_inner();
    let races = state.service.get_race_info(&date, hint)?;

    Ok(HttpResponse::Ok().json(RacesResponse {
        date,
        count: races.len(),
        races,
    }))
}

/// Race detail
pub async fn race_detail(
    state: web::Data<Arc<AppState>>,
    race_id: web::Path<String>,
    query: web::Query<SourceQuery>,
) -> Result<HttpResponse, AppError> {
    let hint = validate_source(query.data_source.as_deref())?;
    let race_id = race_id.into_inner();

    match state.service.get_race_detail(&race_id, hint)? {
        Some(detail) => Ok(HttpResponse::Ok().json(detail)),
        None => Err(AppError::NotFound(format!("race {} not found", race_id))),
    }
}
