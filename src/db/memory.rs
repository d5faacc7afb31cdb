use std::collections::HashMap;

use mongodb::bson::{oid::ObjectId, DateTime};
use tokio::sync::Mutex;

use super::store::{
    AcceptCommand, AcceptOutcome, ApplicationFilter, RequestFilter, Store, StoreError, StoreResult,
};
use crate::models::{
    Application, ApplicationStatus, AssistantEngagement, AssistantProfile, CareRequest, Rating,
    Reputation, ReputationTarget, RequestStatus, User,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<ObjectId, User>,
    // keyed by user id
    assistants: HashMap<ObjectId, AssistantProfile>,
    requests: HashMap<ObjectId, CareRequest>,
    applications: HashMap<ObjectId, Application>,
    engagements: HashMap<ObjectId, AssistantEngagement>,
    ratings: HashMap<ObjectId, Rating>,
}

/// In-process store. One lock guards all collections, so every trait call is
/// a serializable transaction.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(&user.id) {
            return Err(StoreError::Duplicate("user"));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: &ObjectId) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(id).cloned())
    }

    async fn insert_assistant_profile(&self, profile: AssistantProfile) -> StoreResult<AssistantProfile> {
        let mut state = self.state.lock().await;
        if state.assistants.contains_key(&profile.user_id) {
            return Err(StoreError::Duplicate("assistant profile"));
        }
        state.assistants.insert(profile.user_id, profile.clone());
        Ok(profile)
    }

    async fn find_assistant_profile(&self, user_id: &ObjectId) -> StoreResult<Option<AssistantProfile>> {
        Ok(self.state.lock().await.assistants.get(user_id).cloned())
    }

    async fn insert_request(&self, request: CareRequest) -> StoreResult<CareRequest> {
        let mut state = self.state.lock().await;
        if state.requests.contains_key(&request.id) {
            return Err(StoreError::Duplicate("care request"));
        }
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_request(&self, id: &ObjectId) -> StoreResult<Option<CareRequest>> {
        Ok(self.state.lock().await.requests.get(id).cloned())
    }

    async fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<CareRequest>> {
        let state = self.state.lock().await;
        let mut requests: Vec<CareRequest> = state
            .requests
            .values()
            .filter(|request| filter.matches(request))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }

    async fn insert_application(&self, application: Application) -> StoreResult<Application> {
        let mut state = self.state.lock().await;
        let duplicate = state.applications.values().any(|existing| {
            existing.assistant_id == application.assistant_id
                && existing.request_id == application.request_id
        });
        if duplicate || state.applications.contains_key(&application.id) {
            return Err(StoreError::Duplicate("application"));
        }
        state.applications.insert(application.id, application.clone());
        Ok(application)
    }

    async fn find_application(&self, id: &ObjectId) -> StoreResult<Option<Application>> {
        Ok(self.state.lock().await.applications.get(id).cloned())
    }

    async fn find_application_by_pair(
        &self,
        assistant_id: &ObjectId,
        request_id: &ObjectId,
    ) -> StoreResult<Option<Application>> {
        let state = self.state.lock().await;
        Ok(state
            .applications
            .values()
            .find(|a| a.assistant_id == *assistant_id && a.request_id == *request_id)
            .cloned())
    }

    async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<Application>> {
        let state = self.state.lock().await;
        let mut applications: Vec<Application> = state
            .applications
            .values()
            .filter(|application| filter.matches(application))
            .cloned()
            .collect();
        applications.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(applications)
    }

    async fn accept_application(&self, command: AcceptCommand) -> StoreResult<AcceptOutcome> {
        let mut state = self.state.lock().await;

        // Check everything before touching anything.
        match state.requests.get(&command.request_id) {
            Some(request) if request.status == RequestStatus::Open => {}
            _ => return Ok(AcceptOutcome::RequestNotOpen),
        }
        match state.applications.get(&command.application_id) {
            Some(application)
                if application.request_id == command.request_id
                    && application.status == ApplicationStatus::Pending => {}
            _ => return Ok(AcceptOutcome::ApplicationNotPending),
        }

        let mut rejected = Vec::new();
        for application in state.applications.values_mut() {
            if application.request_id != command.request_id
                || application.status != ApplicationStatus::Pending
            {
                continue;
            }
            application.updated_at = command.at;
            if application.id == command.application_id {
                application.status = ApplicationStatus::Accepted;
            } else {
                application.status = ApplicationStatus::Rejected;
                rejected.push(application.id);
            }
        }
        rejected.sort();

        let request = match state.requests.get_mut(&command.request_id) {
            Some(request) => {
                request.status = RequestStatus::Assigned;
                request.updated_at = command.at;
                request.clone()
            }
            None => return Ok(AcceptOutcome::RequestNotOpen),
        };
        let application = match state.applications.get(&command.application_id) {
            Some(application) => application.clone(),
            None => return Ok(AcceptOutcome::ApplicationNotPending),
        };

        state
            .engagements
            .insert(command.engagement.id, command.engagement.clone());

        Ok(AcceptOutcome::Accepted {
            request,
            application,
            rejected,
            engagement: command.engagement,
        })
    }

    async fn reject_application(&self, id: &ObjectId, at: DateTime) -> StoreResult<Option<Application>> {
        let mut state = self.state.lock().await;
        match state.applications.get_mut(id) {
            Some(application) if application.status == ApplicationStatus::Pending => {
                application.status = ApplicationStatus::Rejected;
                application.updated_at = at;
                Ok(Some(application.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition_request(
        &self,
        id: &ObjectId,
        from: RequestStatus,
        to: RequestStatus,
        at: DateTime,
    ) -> StoreResult<Option<CareRequest>> {
        let mut state = self.state.lock().await;
        let request = match state.requests.get_mut(id) {
            Some(request) if request.status == from => {
                request.status = to;
                request.updated_at = at;
                request.clone()
            }
            _ => return Ok(None),
        };

        if to.is_terminal() {
            for engagement in state.engagements.values_mut() {
                if engagement.request_id == *id && engagement.end_date.is_none() {
                    engagement.end_date = Some(engagement.closing_date(at));
                }
            }
        }
        Ok(Some(request))
    }

    async fn find_engagement_by_request(&self, request_id: &ObjectId) -> StoreResult<Option<AssistantEngagement>> {
        let state = self.state.lock().await;
        Ok(state
            .engagements
            .values()
            .find(|engagement| engagement.request_id == *request_id)
            .cloned())
    }

    async fn list_engagements_for(&self, user_id: &ObjectId) -> StoreResult<Vec<AssistantEngagement>> {
        let state = self.state.lock().await;
        let mut engagements: Vec<AssistantEngagement> = state
            .engagements
            .values()
            .filter(|engagement| engagement.involves(user_id))
            .cloned()
            .collect();
        engagements.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
        Ok(engagements)
    }

    async fn record_rating(&self, rating: Rating) -> StoreResult<Reputation> {
        let mut state = self.state.lock().await;
        let duplicate = state.ratings.values().any(|existing| {
            existing.request_id == rating.request_id && existing.rater_id == rating.rater_id
        });
        if duplicate {
            return Err(StoreError::Duplicate("rating"));
        }

        let rated_id = rating.rated_id;
        let at = rating.created_at;
        state.ratings.insert(rating.id, rating);

        let scores: Vec<i32> = state
            .ratings
            .values()
            .filter(|r| r.rated_id == rated_id)
            .map(|r| r.score)
            .collect();

        if let Some(profile) = state.assistants.get_mut(&rated_id) {
            let reputation = Reputation::from_scores(rated_id, ReputationTarget::Assistant, &scores);
            profile.rating = reputation.rating;
            profile.rating_count = reputation.rating_count;
            profile.updated_at = at;
            return Ok(reputation);
        }

        let reputation = Reputation::from_scores(rated_id, ReputationTarget::User, &scores);
        if let Some(user) = state.users.get_mut(&rated_id) {
            user.rating = reputation.rating;
            user.rating_count = reputation.rating_count;
            user.updated_at = at;
        }
        Ok(reputation)
    }

    async fn find_rating(&self, request_id: &ObjectId, rater_id: &ObjectId) -> StoreResult<Option<Rating>> {
        let state = self.state.lock().await;
        Ok(state
            .ratings
            .values()
            .find(|r| r.request_id == *request_id && r.rater_id == *rater_id)
            .cloned())
    }

    async fn list_ratings_for(&self, rated_id: &ObjectId) -> StoreResult<Vec<Rating>> {
        let state = self.state.lock().await;
        let mut ratings: Vec<Rating> = state
            .ratings
            .values()
            .filter(|r| r.rated_id == *rated_id)
            .cloned()
            .collect();
        ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(ratings)
    }
}
