use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use super::format_date;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ApplicationStatus::Pending),
            "accepted" => Some(ApplicationStatus::Accepted),
            "rejected" => Some(ApplicationStatus::Rejected),
            _ => None,
        }
    }
}

/// An assistant's bid on a single care request. Unique per
/// `(assistant_id, request_id)`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Application {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub request_id: ObjectId,
    pub assistant_id: ObjectId,
    pub status: ApplicationStatus,
    pub note: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub struct ApplyDto {
    pub note: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ApplicationResponse {
    pub id: String,
    pub request_id: String,
    pub assistant_id: String,
    pub status: ApplicationStatus,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Application> for ApplicationResponse {
    fn from(application: Application) -> Self {
        ApplicationResponse {
            id: application.id.to_hex(),
            request_id: application.request_id.to_hex(),
            assistant_id: application.assistant_id.to_hex(),
            status: application.status,
            note: application.note,
            created_at: format_date(application.created_at),
            updated_at: format_date(application.updated_at),
        }
    }
}
