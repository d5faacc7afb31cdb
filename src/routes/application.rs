use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use crate::engine::Engine;
use crate::models::{
    ApplicationResponse, ApplicationStatus, ApplyDto, CareRequestResponse, EngagementResponse,
};
use crate::guards::AuthGuard;
use crate::utils::{parse_id, ApiResponse, ApiError};

#[openapi(tag = "Application")]
#[post("/requests/<request_id>/applications", data = "<dto>")]
pub async fn apply(
    engine: &State<Engine>,
    auth: AuthGuard,
    request_id: String,
    dto: Json<ApplyDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let request_id = parse_id(&request_id, "request")?;
    let application = engine
        .apply(&request_id, &auth.caller(), dto.into_inner().note)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Application submitted".to_string(),
        serde_json::json!(ApplicationResponse::from(application)),
    )))
}

#[openapi(tag = "Application")]
#[get("/requests/<request_id>/applications")]
pub async fn list_request_applications(
    engine: &State<Engine>,
    auth: AuthGuard,
    request_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let request_id = parse_id(&request_id, "request")?;
    let applications: Vec<ApplicationResponse> = engine
        .applications_for_request(&request_id, &auth.caller())
        .await?
        .into_iter()
        .map(ApplicationResponse::from)
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "applications": applications
    }))))
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct MyApplicationsQuery {
    pub status: Option<String>,
}

#[openapi(tag = "Application")]
#[get("/applications/mine?<query..>")]
pub async fn my_applications(
    engine: &State<Engine>,
    auth: AuthGuard,
    query: MyApplicationsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            ApplicationStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("Unknown status '{}'", raw)))?,
        ),
        None => None,
    };

    let applications: Vec<ApplicationResponse> = engine
        .my_applications(&auth.caller(), status)
        .await?
        .into_iter()
        .map(ApplicationResponse::from)
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "applications": applications
    }))))
}

#[openapi(tag = "Application")]
#[post("/requests/<request_id>/applications/<application_id>/accept")]
pub async fn accept_application(
    engine: &State<Engine>,
    auth: AuthGuard,
    request_id: String,
    application_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let request_id = parse_id(&request_id, "request")?;
    let application_id = parse_id(&application_id, "application")?;

    let accepted = engine
        .accept_application(&request_id, &application_id, &auth.caller())
        .await?;
    let rejected: Vec<String> = accepted.rejected.iter().map(|id| id.to_hex()).collect();

    Ok(Json(ApiResponse::success_with_message(
        "Application accepted".to_string(),
        serde_json::json!({
            "request": CareRequestResponse::from(accepted.request),
            "application": ApplicationResponse::from(accepted.application),
            "engagement": EngagementResponse::from(accepted.engagement),
            "rejected_applications": rejected,
        }),
    )))
}

#[openapi(tag = "Application")]
#[post("/requests/<request_id>/applications/<application_id>/reject")]
pub async fn reject_application(
    engine: &State<Engine>,
    auth: AuthGuard,
    request_id: String,
    application_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let request_id = parse_id(&request_id, "request")?;
    let application_id = parse_id(&application_id, "application")?;

    let application = engine
        .reject_application(&request_id, &application_id, &auth.caller())
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Application rejected".to_string(),
        serde_json::json!(ApplicationResponse::from(application)),
    )))
}
