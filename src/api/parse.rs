use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;

use crate::query_parser::ParsedQuery;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub message: String,
}

/// Run the intent classifier alone and return the structured query.
/// Debug surface for inspecting what /chat would retrieve on.
pub async fn parse_message(
    State(state): State<AppState>,
    Json(request): Json<ParseRequest>,
) -> Json<ParsedQuery> {
    Json(state.parser.parse(&request.message))
}
