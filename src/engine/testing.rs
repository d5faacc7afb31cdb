use std::sync::Arc;

use mongodb::bson::oid::ObjectId;

use super::{AssistantDraft, Caller, CloseTarget, Engine, ProjectionPolicy, RequestDraft};
use crate::db::{ApplicationFilter, MemoryStore};
use crate::models::{Application, CareRequest, CareType, Role};

/// Engine over a fresh in-memory store plus shortcuts for common setups.
pub(crate) struct Fixture {
    pub engine: Arc<Engine>,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            engine: Arc::new(Engine::new(Arc::new(MemoryStore::new()), ProjectionPolicy::default())),
        }
    }

    pub async fn client(&self, name: &str) -> Caller {
        let user = self.engine.register_user(name, Role::User).await.unwrap();
        Caller::new(user.id, user.role)
    }

    pub async fn assistant(&self, name: &str) -> Caller {
        let user = self.engine.register_user(name, Role::Assistant).await.unwrap();
        let caller = Caller::new(user.id, user.role);
        self.engine
            .create_assistant_profile(&caller, AssistantDraft::default())
            .await
            .unwrap();
        caller
    }

    pub async fn open_request(&self, owner: &Caller) -> CareRequest {
        let mut draft = RequestDraft::new("Afternoon companion", CareType::Companion);
        draft.hourly_rate = Some(12.0);
        draft.total_hours = Some(80.0);
        self.engine.create_request(owner, draft).await.unwrap()
    }

    pub async fn applications_of(&self, request_id: &ObjectId) -> Vec<Application> {
        let filter = ApplicationFilter {
            request_id: Some(*request_id),
            ..Default::default()
        };
        self.engine.store.list_applications(&filter).await.unwrap()
    }

    /// A fresh assistant applies and the owner accepts.
    pub async fn assign(&self, owner: &Caller, request: &CareRequest) -> (Caller, Application) {
        let assistant = self.assistant("Assigned assistant").await;
        let application = self.engine.apply(&request.id, &assistant, None).await.unwrap();
        let accepted = self
            .engine
            .accept_application(&request.id, &application.id, owner)
            .await
            .unwrap();
        (assistant, accepted.application)
    }

    /// An assigned request closed as completed, with its assistant.
    pub async fn completed_request(&self, owner: &Caller) -> (CareRequest, Caller) {
        let request = self.open_request(owner).await;
        let (assistant, _) = self.assign(owner, &request).await;
        let request = self
            .engine
            .complete_or_cancel(&request.id, owner, CloseTarget::Completed)
            .await
            .unwrap();
        (request, assistant)
    }
}
