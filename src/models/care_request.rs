use std::collections::BTreeSet;

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use super::format_date;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CareType {
    Elderly,
    Children,
    Disability,
    Hospital,
    Companion,
    SpecialNeeds,
}

impl CareType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CareType::Elderly => "elderly",
            CareType::Children => "children",
            CareType::Disability => "disability",
            CareType::Hospital => "hospital",
            CareType::Companion => "companion",
            CareType::SpecialNeeds => "special_needs",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().replace('-', "_").as_str() {
            "elderly" => Some(CareType::Elderly),
            "children" => Some(CareType::Children),
            "disability" => Some(CareType::Disability),
            "hospital" => Some(CareType::Hospital),
            "companion" => Some(CareType::Companion),
            "special_needs" => Some(CareType::SpecialNeeds),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

/// Request status machine: `open -> assigned -> completed | cancelled`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Assigned,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "open" => Some(RequestStatus::Open),
            // Legacy labels for "work underway" collapse into assigned.
            "assigned" | "in_progress" | "accepted" => Some(RequestStatus::Assigned),
            "completed" => Some(RequestStatus::Completed),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CareRequest {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub owner_id: ObjectId,
    pub title: String,
    pub description: String,
    pub care_type: CareType,
    pub person_age: Option<i32>,
    pub requirements: Vec<String>,
    pub urgency: Urgency,
    pub hourly_rate: Option<f64>,
    pub total_hours: Option<f64>,
    pub is_recurring: bool,
    pub weekdays: BTreeSet<Weekday>,
    pub scheduled_date: Option<DateTime>,
    pub schedule_text: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema, Clone)]
pub struct CreateCareRequestDto {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub care_type: CareType,
    pub person_age: Option<i32>,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub urgency: Option<Urgency>,
    pub hourly_rate: Option<f64>,
    pub total_hours: Option<f64>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub weekdays: BTreeSet<Weekday>,
    /// RFC 3339 timestamp or plain `YYYY-MM-DD` date.
    pub scheduled_date: Option<String>,
    pub schedule_text: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CareRequestResponse {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub care_type: CareType,
    pub person_age: Option<i32>,
    pub requirements: Vec<String>,
    pub urgency: Urgency,
    pub hourly_rate: Option<f64>,
    pub total_hours: Option<f64>,
    pub is_recurring: bool,
    pub weekdays: BTreeSet<Weekday>,
    pub scheduled_date: Option<String>,
    pub schedule_text: Option<String>,
    pub status: RequestStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CareRequest> for CareRequestResponse {
    fn from(request: CareRequest) -> Self {
        CareRequestResponse {
            id: request.id.to_hex(),
            owner_id: request.owner_id.to_hex(),
            title: request.title,
            description: request.description,
            care_type: request.care_type,
            person_age: request.person_age,
            requirements: request.requirements,
            urgency: request.urgency,
            hourly_rate: request.hourly_rate,
            total_hours: request.total_hours,
            is_recurring: request.is_recurring,
            weekdays: request.weekdays,
            scheduled_date: request.scheduled_date.map(format_date),
            schedule_text: request.schedule_text,
            status: request.status,
            created_at: format_date(request.created_at),
            updated_at: format_date(request.updated_at),
        }
    }
}
