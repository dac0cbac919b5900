use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use solace_core::{TurnOutcome, TurnRequest};
use solace_schema::AnalysisRecord;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(send_turn))
}

#[derive(Deserialize)]
pub struct SendTurnBody {
    pub user_id: Uuid,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    pub text: String,
    #[serde(default)]
    pub is_session_end: bool,
    #[serde(default)]
    pub requires_deep_analysis: bool,
}

#[derive(Serialize)]
pub struct SendTurnResponse {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub reply_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisRecord>,
    pub crisis_detected: bool,
}

impl From<TurnOutcome> for SendTurnResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            conversation_id: outcome.conversation_id,
            message_id: outcome.message_id,
            reply_text: outcome.reply_text,
            analysis: outcome.analysis,
            crisis_detected: outcome.crisis_detected,
        }
    }
}

async fn send_turn(
    State(state): State<AppState>,
    Json(body): Json<SendTurnBody>,
) -> Result<Json<SendTurnResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .send_turn(TurnRequest {
            user_id: body.user_id,
            conversation_id: body.conversation_id,
            text: body.text,
            is_session_end: body.is_session_end,
            requires_deep_analysis: body.requires_deep_analysis,
        })
        .await?;
    Ok(Json(outcome.into()))
}
