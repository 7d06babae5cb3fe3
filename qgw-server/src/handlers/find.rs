//! `GET /find/<hash>`: hands back a previously-submitted query body by
//! its saved-query hash. A real deployment backs `SavedQueryStore` with
//! something durable; `state.saved_queries` here is whatever `main.rs`
//! wired in (`MemorySavedQueries` by default).

use actix_web::{web, HttpResponse};

use crate::app::AppState;
use crate::errors::ServerError;

pub async fn find_handler(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ServerError> {
    let hash = path.into_inner();
    match state.saved_queries.find(&hash) {
        Some(body) => Ok(HttpResponse::Ok().content_type("application/json").body(body)),
        None => Err(ServerError::SavedQueryNotFound(hash)),
    }
}
