use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

use super::{format_date, CareType};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub role: Role,
    pub rating: f64,
    pub rating_count: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl User {
    pub fn new(name: String, role: Role) -> Self {
        let now = DateTime::now();
        User {
            id: ObjectId::new(),
            name,
            role,
            rating: 0.0,
            rating_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Caregiver-side profile. Its presence is what lets a user bid on requests,
/// and when present it carries the user's reputation instead of [`User`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssistantProfile {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub bio: Option<String>,
    pub care_types: Vec<CareType>,
    pub experience_years: Option<i32>,
    pub hourly_rate: Option<f64>,
    pub rating: f64,
    pub rating_count: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RegisterDto {
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RefreshTokenDto {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct CreateAssistantProfileDto {
    pub bio: Option<String>,
    #[serde(default)]
    pub care_types: Vec<CareType>,
    pub experience_years: Option<i32>,
    pub hourly_rate: Option<f64>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub role: String,
    pub rating: f64,
    pub rating_count: i64,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.to_hex(),
            name: user.name,
            role: user.role.as_str().to_string(),
            rating: user.rating,
            rating_count: user.rating_count,
            created_at: format_date(user.created_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AssistantProfileResponse {
    pub id: String,
    pub user_id: String,
    pub bio: Option<String>,
    pub care_types: Vec<CareType>,
    pub experience_years: Option<i32>,
    pub hourly_rate: Option<f64>,
    pub rating: f64,
    pub rating_count: i64,
}

impl From<AssistantProfile> for AssistantProfileResponse {
    fn from(profile: AssistantProfile) -> Self {
        AssistantProfileResponse {
            id: profile.id.to_hex(),
            user_id: profile.user_id.to_hex(),
            bio: profile.bio,
            care_types: profile.care_types,
            experience_years: profile.experience_years,
            hourly_rate: profile.hourly_rate,
            rating: profile.rating,
            rating_count: profile.rating_count,
        }
    }
}
