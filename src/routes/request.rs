use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::DateTime;
use crate::db::RequestFilter;
use crate::engine::{CloseTarget, Engine, RequestDraft};
use crate::models::{
    CareRequestResponse, CareType, CreateCareRequestDto, EngagementResponse, RequestStatus,
};
use crate::guards::AuthGuard;
use crate::utils::{parse_id, ApiResponse, ApiError};

#[openapi(tag = "Care Request")]
#[post("/requests", data = "<dto>")]
pub async fn create_request(
    engine: &State<Engine>,
    auth: AuthGuard,
    dto: Json<CreateCareRequestDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let draft = RequestDraft::from_dto(dto.into_inner())?;
    let request = engine.create_request(&auth.caller(), draft).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Care request created".to_string(),
        serde_json::json!(CareRequestResponse::from(request)),
    )))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct RequestListQuery {
    pub status: Option<String>,
    pub care_type: Option<String>,
    /// Only requests the caller owns.
    pub mine: Option<bool>,
}

#[openapi(tag = "Care Request")]
#[get("/requests?<query..>")]
pub async fn list_requests(
    engine: &State<Engine>,
    auth: AuthGuard,
    query: RequestListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            RequestStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("Unknown status '{}'", raw)))?,
        ),
        None => None,
    };
    let care_type = match query.care_type.as_deref() {
        Some(raw) => Some(
            CareType::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("Unknown care type '{}'", raw)))?,
        ),
        None => None,
    };

    let filter = RequestFilter {
        owner_id: query.mine.unwrap_or(false).then_some(auth.user_id),
        status,
        care_type,
    };
    let requests: Vec<CareRequestResponse> = engine
        .list_requests(&filter)
        .await?
        .into_iter()
        .map(CareRequestResponse::from)
        .collect();
    let total = requests.len();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "requests": requests,
        "total": total,
    }))))
}

#[openapi(tag = "Care Request")]
#[get("/requests/<request_id>")]
pub async fn get_request(
    engine: &State<Engine>,
    _auth: AuthGuard,
    request_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let request_id = parse_id(&request_id, "request")?;
    let request = engine.request(&request_id).await?;
    let projection = engine.request_projection(&request, DateTime::now()).await?;
    let engagement = engine.engagement_for(&request.id).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "request": CareRequestResponse::from(request),
        "projection": projection,
        "engagement": engagement.map(EngagementResponse::from),
    }))))
}

async fn close_request(
    engine: &Engine,
    auth: &AuthGuard,
    request_id: &str,
    target: CloseTarget,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let request_id = parse_id(request_id, "request")?;
    let request = engine
        .complete_or_cancel(&request_id, &auth.caller(), target)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        format!("Request {}", request.status.as_str()),
        serde_json::json!(CareRequestResponse::from(request)),
    )))
}

#[openapi(tag = "Care Request")]
#[post("/requests/<request_id>/complete")]
pub async fn complete_request(
    engine: &State<Engine>,
    auth: AuthGuard,
    request_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    close_request(engine, &auth, &request_id, CloseTarget::Completed).await
}

#[openapi(tag = "Care Request")]
#[post("/requests/<request_id>/cancel")]
pub async fn cancel_request(
    engine: &State<Engine>,
    auth: AuthGuard,
    request_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    close_request(engine, &auth, &request_id, CloseTarget::Cancelled).await
}
