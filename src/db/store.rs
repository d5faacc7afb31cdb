use mongodb::bson::{oid::ObjectId, DateTime};

use crate::models::{
    Application, ApplicationStatus, AssistantEngagement, AssistantProfile, CareRequest, CareType,
    Rating, Reputation, RequestStatus, User,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    /// A uniqueness constraint rejected the write.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error("transaction gave up after {0} attempts")]
    RetriesExhausted(u32),
}

#[derive(Debug, Default, Clone)]
pub struct RequestFilter {
    pub owner_id: Option<ObjectId>,
    pub status: Option<RequestStatus>,
    pub care_type: Option<CareType>,
}

impl RequestFilter {
    pub fn matches(&self, request: &CareRequest) -> bool {
        self.owner_id.is_none_or(|owner| request.owner_id == owner)
            && self.status.is_none_or(|status| request.status == status)
            && self.care_type.is_none_or(|care_type| request.care_type == care_type)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ApplicationFilter {
    pub request_id: Option<ObjectId>,
    pub assistant_id: Option<ObjectId>,
    pub status: Option<ApplicationStatus>,
}

impl ApplicationFilter {
    pub fn matches(&self, application: &Application) -> bool {
        self.request_id.is_none_or(|id| application.request_id == id)
            && self.assistant_id.is_none_or(|id| application.assistant_id == id)
            && self.status.is_none_or(|status| application.status == status)
    }
}

/// Everything the accept cascade writes, prepared ahead of the atomic call.
#[derive(Debug, Clone)]
pub struct AcceptCommand {
    pub request_id: ObjectId,
    pub application_id: ObjectId,
    pub engagement: AssistantEngagement,
    pub at: DateTime,
}

#[derive(Debug, Clone)]
pub enum AcceptOutcome {
    Accepted {
        request: CareRequest,
        application: Application,
        rejected: Vec<ObjectId>,
        engagement: AssistantEngagement,
    },
    /// The request left `open` before the cascade could claim it.
    RequestNotOpen,
    /// The application is no longer `pending` for this request.
    ApplicationNotPending,
}

/// Persistence seam for the engine.
///
/// Point reads and lists are plain lookups. `accept_application`,
/// `transition_request` and `record_rating` are the multi-document writes and
/// must be all-or-nothing; their status checks are compare-and-swap so two
/// concurrent callers cannot both win.
#[rocket::async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: User) -> StoreResult<User>;
    async fn find_user(&self, id: &ObjectId) -> StoreResult<Option<User>>;

    /// Fails with [`StoreError::Duplicate`] when the user already has a profile.
    async fn insert_assistant_profile(&self, profile: AssistantProfile) -> StoreResult<AssistantProfile>;
    async fn find_assistant_profile(&self, user_id: &ObjectId) -> StoreResult<Option<AssistantProfile>>;

    async fn insert_request(&self, request: CareRequest) -> StoreResult<CareRequest>;
    async fn find_request(&self, id: &ObjectId) -> StoreResult<Option<CareRequest>>;
    /// Newest first.
    async fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<CareRequest>>;

    /// Fails with [`StoreError::Duplicate`] when the assistant already has an
    /// application for the request.
    async fn insert_application(&self, application: Application) -> StoreResult<Application>;
    async fn find_application(&self, id: &ObjectId) -> StoreResult<Option<Application>>;
    async fn find_application_by_pair(
        &self,
        assistant_id: &ObjectId,
        request_id: &ObjectId,
    ) -> StoreResult<Option<Application>>;
    /// Oldest first, so owners review bids in arrival order.
    async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<Application>>;

    /// Atomically: request `open -> assigned`, the application
    /// `pending -> accepted`, every other pending application of the request
    /// `-> rejected`, and the engagement inserted.
    async fn accept_application(&self, command: AcceptCommand) -> StoreResult<AcceptOutcome>;

    /// `pending -> rejected` for one application. `None` if it was not pending.
    async fn reject_application(&self, id: &ObjectId, at: DateTime) -> StoreResult<Option<Application>>;

    /// Moves a request from `from` to `to` and closes its open engagement.
    /// `None` if the request was not in `from`.
    async fn transition_request(
        &self,
        id: &ObjectId,
        from: RequestStatus,
        to: RequestStatus,
        at: DateTime,
    ) -> StoreResult<Option<CareRequest>>;

    async fn find_engagement_by_request(&self, request_id: &ObjectId) -> StoreResult<Option<AssistantEngagement>>;
    /// Engagements where the user is client or assistant, newest first.
    async fn list_engagements_for(&self, user_id: &ObjectId) -> StoreResult<Vec<AssistantEngagement>>;

    /// Inserts the rating and recomputes the rated party's mean and count in
    /// one step, writing the summary to the assistant profile when one exists
    /// and to the user row otherwise. Fails with [`StoreError::Duplicate`] on a
    /// second rating for the same `(request_id, rater_id)`.
    async fn record_rating(&self, rating: Rating) -> StoreResult<Reputation>;
    async fn find_rating(&self, request_id: &ObjectId, rater_id: &ObjectId) -> StoreResult<Option<Rating>>;
    /// Newest first.
    async fn list_ratings_for(&self, rated_id: &ObjectId) -> StoreResult<Vec<Rating>>;
}
