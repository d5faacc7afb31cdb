use log::info;
use mongodb::bson::{oid::ObjectId, DateTime};

use super::{Caller, Engine, EngineError, EngineResult};
use crate::db::{ApplicationFilter, StoreError};
use crate::models::{
    Application, ApplicationStatus, AssistantProfile, CareType, CreateAssistantProfileDto,
    RequestStatus, Role,
};

#[derive(Debug, Clone, Default)]
pub struct AssistantDraft {
    pub bio: Option<String>,
    pub care_types: Vec<CareType>,
    pub experience_years: Option<i32>,
    pub hourly_rate: Option<f64>,
}

impl From<CreateAssistantProfileDto> for AssistantDraft {
    fn from(dto: CreateAssistantProfileDto) -> Self {
        AssistantDraft {
            bio: dto.bio,
            care_types: dto.care_types,
            experience_years: dto.experience_years,
            hourly_rate: dto.hourly_rate,
        }
    }
}

impl Engine {
    pub async fn create_assistant_profile(
        &self,
        caller: &Caller,
        draft: AssistantDraft,
    ) -> EngineResult<AssistantProfile> {
        if caller.role != Role::Assistant {
            return Err(EngineError::not_authorized(
                "Only assistant accounts can create an assistant profile",
            ));
        }
        if draft.experience_years.is_some_and(|years| years < 0) {
            return Err(EngineError::validation("Experience years cannot be negative"));
        }
        if draft.hourly_rate.is_some_and(|rate| !(rate > 0.0)) {
            return Err(EngineError::validation("Hourly rate must be positive"));
        }

        let mut care_types = draft.care_types;
        care_types.dedup();

        let now = DateTime::now();
        let profile = AssistantProfile {
            id: ObjectId::new(),
            user_id: caller.user_id,
            bio: draft.bio.map(|b| b.trim().to_string()).filter(|b| !b.is_empty()),
            care_types,
            experience_years: draft.experience_years,
            hourly_rate: draft.hourly_rate,
            rating: 0.0,
            rating_count: 0,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_assistant_profile(profile).await {
            Ok(profile) => {
                info!("Assistant profile created for {}", caller.user_id);
                Ok(profile)
            }
            Err(StoreError::Duplicate(_)) => Err(EngineError::AlreadyExists("assistant profile")),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn assistant_profile(&self, user_id: &ObjectId) -> EngineResult<AssistantProfile> {
        self.store
            .find_assistant_profile(user_id)
            .await?
            .ok_or(EngineError::NotFound("assistant profile"))
    }

    /// Submits a bid. The duplicate check is a direct lookup on
    /// `(assistant, request)`, and the store's uniqueness rule catches two
    /// concurrent first attempts.
    pub async fn apply(
        &self,
        request_id: &ObjectId,
        caller: &Caller,
        note: Option<String>,
    ) -> EngineResult<Application> {
        if self.store.find_assistant_profile(&caller.user_id).await?.is_none() {
            return Err(EngineError::NotAssistant);
        }

        let request = self.request(request_id).await?;
        if request.owner_id == caller.user_id {
            return Err(EngineError::not_authorized("You cannot apply to your own request"));
        }
        if request.status != RequestStatus::Open {
            return Err(EngineError::RequestUnavailable);
        }
        if self
            .store
            .find_application_by_pair(&caller.user_id, &request.id)
            .await?
            .is_some()
        {
            return Err(EngineError::AlreadyApplied);
        }

        let now = DateTime::now();
        let application = Application {
            id: ObjectId::new(),
            request_id: request.id,
            assistant_id: caller.user_id,
            status: ApplicationStatus::Pending,
            note: note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_application(application).await {
            Ok(application) => {
                info!("Assistant {} applied to request {}", caller.user_id, request.id);
                Ok(application)
            }
            Err(StoreError::Duplicate(_)) => Err(EngineError::AlreadyApplied),
            Err(e) => Err(e.into()),
        }
    }

    /// Every bid on a request, oldest first. Owner only.
    pub async fn applications_for_request(
        &self,
        request_id: &ObjectId,
        caller: &Caller,
    ) -> EngineResult<Vec<Application>> {
        let request = self.request(request_id).await?;
        if request.owner_id != caller.user_id {
            return Err(EngineError::not_authorized(
                "Only the request owner can list its applications",
            ));
        }
        let filter = ApplicationFilter {
            request_id: Some(request.id),
            ..Default::default()
        };
        Ok(self.store.list_applications(&filter).await?)
    }

    pub async fn my_applications(
        &self,
        caller: &Caller,
        status: Option<ApplicationStatus>,
    ) -> EngineResult<Vec<Application>> {
        let filter = ApplicationFilter {
            assistant_id: Some(caller.user_id),
            status,
            ..Default::default()
        };
        Ok(self.store.list_applications(&filter).await?)
    }
}
