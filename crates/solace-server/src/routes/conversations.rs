use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use solace_core::TurnError;
use solace_schema::{AnalysisRecord, StoredMessage};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/messages", get(list_messages))
        .route("/{id}/analysis", get(get_analysis))
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub user_id: Uuid,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
pub struct MessagesResponse {
    pub conversation_id: Uuid,
    pub messages: Vec<StoredMessage>,
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let store = state.orchestrator.store();
    store
        .get_owned(id, query.user_id)
        .await
        .map_err(TurnError::Storage)?
        .ok_or(TurnError::ConversationNotFound)?;
    let messages = store
        .recent_messages(id, query.limit)
        .await
        .map_err(TurnError::Storage)?;
    Ok(Json(MessagesResponse {
        conversation_id: id,
        messages,
    }))
}

#[derive(Serialize)]
pub struct AnalysisResponse {
    pub conversation_id: Uuid,
    pub analysis: Option<AnalysisRecord>,
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let store = state.orchestrator.store();
    store
        .get_owned(id, query.user_id)
        .await
        .map_err(TurnError::Storage)?
        .ok_or(TurnError::ConversationNotFound)?;
    let analysis = store.load_analysis(id).await.map_err(TurnError::Storage)?;
    Ok(Json(AnalysisResponse {
        conversation_id: id,
        analysis,
    }))
}
