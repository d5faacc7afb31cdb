use std::collections::BTreeSet;

use log::{info, warn};
use mongodb::bson::{oid::ObjectId, DateTime};

use super::{Caller, Engine, EngineError, EngineResult};
use crate::db::{AcceptCommand, AcceptOutcome, ApplicationFilter, RequestFilter};
use crate::models::{
    parse_date, Application, ApplicationStatus, AssistantEngagement, CareRequest, CareType,
    CreateCareRequestDto, RequestStatus, Urgency, Weekday,
};

/// Validated input for a new care request.
#[derive(Debug, Clone)]
pub struct RequestDraft {
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
}

impl RequestDraft {
    pub fn new(title: impl Into<String>, care_type: CareType) -> Self {
        RequestDraft {
            title: title.into(),
            description: String::new(),
            care_type,
            person_age: None,
            requirements: Vec::new(),
            urgency: Urgency::Medium,
            hourly_rate: None,
            total_hours: None,
            is_recurring: false,
            weekdays: BTreeSet::new(),
            scheduled_date: None,
            schedule_text: None,
        }
    }

    pub fn from_dto(dto: CreateCareRequestDto) -> EngineResult<Self> {
        let scheduled_date = match dto.scheduled_date.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(
                parse_date(raw)
                    .ok_or_else(|| EngineError::validation("Invalid scheduled date"))?,
            ),
            _ => None,
        };

        Ok(RequestDraft {
            title: dto.title,
            description: dto.description,
            care_type: dto.care_type,
            person_age: dto.person_age,
            requirements: dto.requirements,
            urgency: dto.urgency.unwrap_or(Urgency::Medium),
            hourly_rate: dto.hourly_rate,
            total_hours: dto.total_hours,
            is_recurring: dto.is_recurring,
            weekdays: dto.weekdays,
            scheduled_date,
            schedule_text: dto.schedule_text,
        })
    }

    fn validate(&self) -> EngineResult<()> {
        if self.title.trim().is_empty() {
            return Err(EngineError::validation("Title is required"));
        }
        if let Some(age) = self.person_age {
            if !(0..=130).contains(&age) {
                return Err(EngineError::validation("Person age must be between 0 and 130"));
            }
        }
        if self.hourly_rate.is_some_and(|rate| !(rate > 0.0)) {
            return Err(EngineError::validation("Hourly rate must be positive"));
        }
        if self.total_hours.is_some_and(|hours| !(hours > 0.0)) {
            return Err(EngineError::validation("Total hours must be positive"));
        }
        Ok(())
    }
}

/// Terminal states reachable from `assigned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseTarget {
    Completed,
    Cancelled,
}

impl CloseTarget {
    pub fn status(self) -> RequestStatus {
        match self {
            CloseTarget::Completed => RequestStatus::Completed,
            CloseTarget::Cancelled => RequestStatus::Cancelled,
        }
    }
}

/// Result of the accept cascade.
#[derive(Debug, Clone)]
pub struct AcceptedApplication {
    pub request: CareRequest,
    pub application: Application,
    pub rejected: Vec<ObjectId>,
    pub engagement: AssistantEngagement,
}

impl Engine {
    pub async fn create_request(&self, caller: &Caller, draft: RequestDraft) -> EngineResult<CareRequest> {
        draft.validate()?;

        let now = DateTime::now();
        let weekdays = if draft.is_recurring {
            draft.weekdays
        } else {
            BTreeSet::new()
        };
        let request = CareRequest {
            id: ObjectId::new(),
            owner_id: caller.user_id,
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            care_type: draft.care_type,
            person_age: draft.person_age,
            requirements: draft
                .requirements
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            urgency: draft.urgency,
            hourly_rate: draft.hourly_rate,
            total_hours: draft.total_hours,
            is_recurring: draft.is_recurring,
            weekdays,
            scheduled_date: draft.scheduled_date,
            schedule_text: draft.schedule_text,
            status: RequestStatus::Open,
            created_at: now,
            updated_at: now,
        };

        let request = self.store.insert_request(request).await?;
        info!("Care request {} opened by {}", request.id, caller.user_id);
        Ok(request)
    }

    pub async fn request(&self, id: &ObjectId) -> EngineResult<CareRequest> {
        self.store
            .find_request(id)
            .await?
            .ok_or(EngineError::NotFound("request"))
    }

    pub async fn list_requests(&self, filter: &RequestFilter) -> EngineResult<Vec<CareRequest>> {
        Ok(self.store.list_requests(filter).await?)
    }

    /// The single accepted application of a request, if any.
    pub async fn accepted_application(&self, request_id: &ObjectId) -> EngineResult<Option<Application>> {
        let filter = ApplicationFilter {
            request_id: Some(*request_id),
            status: Some(ApplicationStatus::Accepted),
            ..Default::default()
        };
        Ok(self.store.list_applications(&filter).await?.into_iter().next())
    }

    async fn owned_request(&self, request_id: &ObjectId, caller: &Caller) -> EngineResult<CareRequest> {
        let request = self.request(request_id).await?;
        if request.owner_id != caller.user_id {
            return Err(EngineError::not_authorized("Only the request owner can do this"));
        }
        Ok(request)
    }

    async fn application_of(&self, request: &CareRequest, application_id: &ObjectId) -> EngineResult<Application> {
        match self.store.find_application(application_id).await? {
            Some(application) if application.request_id == request.id => Ok(application),
            _ => Err(EngineError::NotFound("application")),
        }
    }

    /// Accepts one application, rejects every other pending one and moves the
    /// request to `assigned`, all in one atomic store call. A request that is
    /// already assigned refuses with `InvalidState` instead of re-running the
    /// cascade.
    pub async fn accept_application(
        &self,
        request_id: &ObjectId,
        application_id: &ObjectId,
        caller: &Caller,
    ) -> EngineResult<AcceptedApplication> {
        let request = self.owned_request(request_id, caller).await?;
        if request.status != RequestStatus::Open {
            return Err(EngineError::invalid_state(format!(
                "Request is {}, applications can only be accepted while open",
                request.status.as_str()
            )));
        }

        let application = self.application_of(&request, application_id).await?;
        if application.status != ApplicationStatus::Pending {
            return Err(EngineError::invalid_state(format!(
                "Application is already {}",
                application.status.as_str()
            )));
        }

        let now = DateTime::now();
        let start_date = match request.scheduled_date {
            Some(scheduled) if scheduled > now => scheduled,
            _ => now,
        };
        let engagement = AssistantEngagement {
            id: ObjectId::new(),
            client_id: request.owner_id,
            assistant_id: application.assistant_id,
            request_id: request.id,
            application_id: application.id,
            start_date,
            end_date: None,
        };

        let command = AcceptCommand {
            request_id: request.id,
            application_id: application.id,
            engagement,
            at: now,
        };
        match self.store.accept_application(command).await? {
            AcceptOutcome::Accepted {
                request,
                application,
                rejected,
                engagement,
            } => {
                info!(
                    "Application {} accepted for request {} ({} rejected)",
                    application.id,
                    request.id,
                    rejected.len()
                );
                Ok(AcceptedApplication {
                    request,
                    application,
                    rejected,
                    engagement,
                })
            }
            AcceptOutcome::RequestNotOpen => {
                warn!("Accept on request {} lost the race to another accept", request_id);
                Err(EngineError::invalid_state("Request is no longer open"))
            }
            AcceptOutcome::ApplicationNotPending => {
                warn!("Application {} changed state before it could be accepted", application_id);
                Err(EngineError::invalid_state("Application is no longer pending"))
            }
        }
    }

    /// Rejects a single pending application. The request stays open.
    pub async fn reject_application(
        &self,
        request_id: &ObjectId,
        application_id: &ObjectId,
        caller: &Caller,
    ) -> EngineResult<Application> {
        let request = self.owned_request(request_id, caller).await?;
        if request.status != RequestStatus::Open {
            return Err(EngineError::invalid_state(format!(
                "Request is {}, applications can only be rejected while open",
                request.status.as_str()
            )));
        }

        let application = self.application_of(&request, application_id).await?;
        if application.status != ApplicationStatus::Pending {
            return Err(EngineError::invalid_state(format!(
                "Application is already {}",
                application.status.as_str()
            )));
        }

        match self.store.reject_application(&application.id, DateTime::now()).await? {
            Some(rejected) => {
                info!("Application {} rejected for request {}", rejected.id, request.id);
                Ok(rejected)
            }
            None => Err(EngineError::invalid_state("Application is no longer pending")),
        }
    }

    /// Closes an assigned request. Either party to the accepted application
    /// may do it.
    pub async fn complete_or_cancel(
        &self,
        request_id: &ObjectId,
        caller: &Caller,
        target: CloseTarget,
    ) -> EngineResult<CareRequest> {
        let request = self.request(request_id).await?;
        let accepted = self.accepted_application(&request.id).await?;

        let is_owner = request.owner_id == caller.user_id;
        let is_assistant = accepted
            .as_ref()
            .is_some_and(|application| application.assistant_id == caller.user_id);
        if !is_owner && !is_assistant {
            return Err(EngineError::not_authorized(
                "Only the request owner or the assigned assistant can close a request",
            ));
        }

        if request.status != RequestStatus::Assigned {
            return Err(EngineError::invalid_state(format!(
                "Request is {}, only assigned requests can be closed",
                request.status.as_str()
            )));
        }

        let to = target.status();
        match self
            .store
            .transition_request(&request.id, RequestStatus::Assigned, to, DateTime::now())
            .await?
        {
            Some(closed) => {
                info!("Request {} {} by {}", closed.id, to.as_str(), caller.user_id);
                Ok(closed)
            }
            None => Err(EngineError::invalid_state("Request is no longer assigned")),
        }
    }
}
