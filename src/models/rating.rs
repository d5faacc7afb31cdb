use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use super::format_date;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Rating {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub request_id: ObjectId,
    pub rater_id: ObjectId,
    pub rated_id: ObjectId,
    pub score: i32, // 1-5
    pub comment: Option<String>,
    pub would_recommend: Option<bool>,
    pub created_at: DateTime,
}

/// Which record the reputation summary was written to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReputationTarget {
    Assistant,
    User,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Reputation {
    pub rated_id: ObjectId,
    pub target: ReputationTarget,
    pub rating: f64,
    pub rating_count: i64,
}

impl Reputation {
    /// Exact mean over every score, no rounding.
    pub fn from_scores(rated_id: ObjectId, target: ReputationTarget, scores: &[i32]) -> Self {
        let rating_count = scores.len() as i64;
        let rating = if rating_count > 0 {
            scores.iter().map(|s| *s as i64).sum::<i64>() as f64 / rating_count as f64
        } else {
            0.0
        };
        Reputation {
            rated_id,
            target,
            rating,
            rating_count,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubmitRatingDto {
    pub score: i32,
    pub comment: Option<String>,
    pub would_recommend: Option<bool>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct RatingResponse {
    pub id: String,
    pub request_id: String,
    pub rater_id: String,
    pub rated_id: String,
    pub score: i32,
    pub comment: Option<String>,
    pub would_recommend: Option<bool>,
    pub created_at: String,
}

impl From<Rating> for RatingResponse {
    fn from(rating: Rating) -> Self {
        RatingResponse {
            id: rating.id.to_hex(),
            request_id: rating.request_id.to_hex(),
            rater_id: rating.rater_id.to_hex(),
            rated_id: rating.rated_id.to_hex(),
            score: rating.score,
            comment: rating.comment,
            would_recommend: rating.would_recommend,
            created_at: format_date(rating.created_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ReputationResponse {
    pub rated_id: String,
    pub target: ReputationTarget,
    pub rating: f64,
    pub rating_count: i64,
}

impl From<Reputation> for ReputationResponse {
    fn from(reputation: Reputation) -> Self {
        ReputationResponse {
            rated_id: reputation.rated_id.to_hex(),
            target: reputation.target,
            rating: reputation.rating,
            rating_count: reputation.rating_count,
        }
    }
}
