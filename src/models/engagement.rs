use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use super::format_date;

/// Client and assistant pairing opened when an application is accepted.
/// `end_date` stays `None` while the work is ongoing.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssistantEngagement {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub client_id: ObjectId,
    pub assistant_id: ObjectId,
    pub request_id: ObjectId,
    pub application_id: ObjectId,
    pub start_date: DateTime,
    pub end_date: Option<DateTime>,
}

impl AssistantEngagement {
    pub fn involves(&self, user_id: &ObjectId) -> bool {
        self.client_id == *user_id || self.assistant_id == *user_id
    }

    pub fn is_in_progress(&self, now: DateTime) -> bool {
        match self.end_date {
            None => true,
            Some(end) => end > now,
        }
    }

    /// End date for a close happening at `now`, never before `start_date`.
    pub fn closing_date(&self, now: DateTime) -> DateTime {
        if now < self.start_date {
            self.start_date
        } else {
            now
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct EngagementResponse {
    pub id: String,
    pub client_id: String,
    pub assistant_id: String,
    pub request_id: String,
    pub application_id: String,
    pub start_date: String,
    pub end_date: Option<String>,
}

impl From<AssistantEngagement> for EngagementResponse {
    fn from(engagement: AssistantEngagement) -> Self {
        EngagementResponse {
            id: engagement.id.to_hex(),
            client_id: engagement.client_id.to_hex(),
            assistant_id: engagement.assistant_id.to_hex(),
            request_id: engagement.request_id.to_hex(),
            application_id: engagement.application_id.to_hex(),
            start_date: format_date(engagement.start_date),
            end_date: engagement.end_date.map(format_date),
        }
    }
}
