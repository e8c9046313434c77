use actix_web::{HttpResponse, Responder, get, web};
use serde_json::json;

use crate::state::AppState;

macros_utils::routes! {
    route status_route,
}

/// Liveness route
/// Reports the monitor's last published state; never touches the log.
#[get("/")]
pub async fn status_route(state: web::Data<AppState>) -> impl Responder {
    let snapshot = state.status.borrow().clone();

    HttpResponse::Ok().json(json!({
        "status": "monitoring",
        "targets": state.target_count,
        "monitor": snapshot,
    }))
}
