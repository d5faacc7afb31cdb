use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use crate::engine::{AssistantDraft, Engine, EngineError};
use crate::models::{
    AssistantProfileResponse, CreateAssistantProfileDto, ReputationResponse, UserResponse,
};
use crate::guards::AuthGuard;
use crate::utils::{parse_id, ApiResponse, ApiError};

#[openapi(tag = "User")]
#[get("/user/me")]
pub async fn get_me(
    engine: &State<Engine>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = engine.user(&auth.user_id).await?;
    let reputation = engine.reputation(&auth.user_id).await?;
    let profile = match engine.assistant_profile(&auth.user_id).await {
        Ok(profile) => Some(profile),
        Err(EngineError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };

    Ok(Json(ApiResponse::success(serde_json::json!({
        "user": UserResponse::from(user),
        "reputation": ReputationResponse::from(reputation),
        "assistant_profile": profile.map(AssistantProfileResponse::from),
    }))))
}

#[openapi(tag = "Assistant")]
#[post("/assistant/profile", data = "<dto>")]
pub async fn create_assistant_profile(
    engine: &State<Engine>,
    auth: AuthGuard,
    dto: Json<CreateAssistantProfileDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let profile = engine
        .create_assistant_profile(&auth.caller(), AssistantDraft::from(dto.into_inner()))
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Assistant profile created".to_string(),
        serde_json::json!(AssistantProfileResponse::from(profile)),
    )))
}

#[openapi(tag = "Assistant")]
#[get("/assistant/profile/<user_id>")]
pub async fn get_assistant_profile(
    engine: &State<Engine>,
    _auth: AuthGuard,
    user_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = parse_id(&user_id, "user")?;
    let profile = engine.assistant_profile(&user_id).await?;

    Ok(Json(ApiResponse::success(serde_json::json!(
        AssistantProfileResponse::from(profile)
    ))))
}
