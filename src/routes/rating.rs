use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use crate::engine::Engine;
use crate::models::{RatingResponse, ReputationResponse, SubmitRatingDto};
use crate::guards::AuthGuard;
use crate::utils::{parse_id, ApiResponse, ApiError};

#[openapi(tag = "Rating")]
#[post("/requests/<request_id>/ratings", data = "<dto>")]
pub async fn submit_rating(
    engine: &State<Engine>,
    auth: AuthGuard,
    request_id: String,
    dto: Json<SubmitRatingDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let request_id = parse_id(&request_id, "request")?;
    let dto = dto.into_inner();

    let (rating, reputation) = engine
        .submit_rating(&request_id, &auth.caller(), dto.score, dto.comment, dto.would_recommend)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Rating submitted successfully".to_string(),
        serde_json::json!({
            "rating": RatingResponse::from(rating),
            "reputation": ReputationResponse::from(reputation),
        }),
    )))
}

#[openapi(tag = "Rating")]
#[get("/ratings/user/<user_id>")]
pub async fn get_user_ratings(
    engine: &State<Engine>,
    _auth: AuthGuard,
    user_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user_id = parse_id(&user_id, "user")?;

    let reputation = engine.reputation(&user_id).await?;
    let ratings: Vec<RatingResponse> = engine
        .ratings_for(&user_id)
        .await?
        .into_iter()
        .map(RatingResponse::from)
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "ratings": ratings,
        "reputation": ReputationResponse::from(reputation),
    }))))
}
