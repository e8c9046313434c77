use std::num::NonZeroUsize;

use actix_web::{HttpResponse, get, web};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

macros_utils::routes! {
    route history_route,
    route failures_route,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<String>,
}

fn parse_limit(raw: Option<&str>, default: NonZeroUsize) -> Result<NonZeroUsize, ApiError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<NonZeroUsize>()
            .map_err(|_| ApiError::InvalidLimit(raw.to_string())),
    }
}

/// Most recent probe records, newest first
#[get("/history")]
pub async fn history_route(
    state: web::Data<AppState>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = parse_limit(query.limit.as_deref(), state.history_limit)?;
    let records = state.store.recent(limit).await?;

    Ok(HttpResponse::Ok().json(records))
}

/// Every unreachable record, newest first
#[get("/failures")]
pub async fn failures_route(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let records = state.store.failures_only().await?;

    Ok(HttpResponse::Ok().json(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        let default = NonZeroUsize::new(50).unwrap();
        assert_eq!(parse_limit(None, default).unwrap().get(), 50);
        assert_eq!(parse_limit(Some("7"), default).unwrap().get(), 7);
        assert!(matches!(parse_limit(Some("0"), default), Err(ApiError::InvalidLimit(_))));
        assert!(matches!(parse_limit(Some("-3"), default), Err(ApiError::InvalidLimit(_))));
        assert!(matches!(parse_limit(Some("ten"), default), Err(ApiError::InvalidLimit(_))));
    }
}
