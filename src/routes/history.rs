use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::DateTime;
use serde::Serialize;
use rocket_okapi::okapi::schemars::JsonSchema;
use crate::engine::{Engine, HistoryEntry, Progress};
use crate::models::{CareRequestResponse, EngagementResponse};
use crate::guards::AuthGuard;
use crate::utils::{ApiResponse, ApiError};

#[derive(Debug, Serialize, JsonSchema)]
pub struct HistoryEntryResponse {
    pub engagement: EngagementResponse,
    pub request: CareRequestResponse,
    pub duration_days: i64,
    pub duration_label: String,
    pub cost_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl From<HistoryEntry> for HistoryEntryResponse {
    fn from(entry: HistoryEntry) -> Self {
        HistoryEntryResponse {
            engagement: entry.engagement.into(),
            request: entry.request.into(),
            duration_days: entry.duration_days,
            duration_label: entry.duration_label,
            cost_estimate: entry.cost_estimate,
            progress: entry.progress,
        }
    }
}

#[openapi(tag = "History")]
#[get("/history")]
pub async fn get_history(
    engine: &State<Engine>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let history = engine.service_history(&auth.caller(), DateTime::now()).await?;

    let in_progress: Vec<HistoryEntryResponse> =
        history.in_progress.into_iter().map(HistoryEntryResponse::from).collect();
    let historical: Vec<HistoryEntryResponse> =
        history.historical.into_iter().map(HistoryEntryResponse::from).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "in_progress": in_progress,
        "historical": historical,
    }))))
}
