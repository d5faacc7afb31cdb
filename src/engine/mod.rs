//! Request lifecycle, application and rating rules.
//!
//! The engine is constructed around an injected [`Store`] and is shared by
//! every request handler. Each public operation validates everything it can
//! against the current records first and then performs its writes through a
//! single store call, so a refused operation never leaves partial state.

pub mod applications;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod ratings;

#[cfg(test)]
pub(crate) mod testing;

pub use applications::AssistantDraft;
pub use error::{EngineError, EngineResult};
pub use history::{HistoryEntry, Progress, ProjectionPolicy, RequestProjection, ServiceHistory};
pub use lifecycle::{AcceptedApplication, CloseTarget, RequestDraft};

use std::sync::Arc;

use log::info;
use mongodb::bson::oid::ObjectId;

use crate::db::Store;
use crate::models::{Role, User};

/// Authenticated identity of whoever invoked an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: ObjectId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: ObjectId, role: Role) -> Self {
        Caller { user_id, role }
    }
}

pub struct Engine {
    store: Arc<dyn Store>,
    policy: ProjectionPolicy,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, policy: ProjectionPolicy) -> Self {
        Engine { store, policy }
    }

    pub async fn register_user(&self, name: &str, role: Role) -> EngineResult<User> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("Name is required"));
        }
        let user = self.store.insert_user(User::new(name.to_string(), role)).await?;
        info!("Registered {} {}", role.as_str(), user.id);
        Ok(user)
    }

    pub async fn user(&self, id: &ObjectId) -> EngineResult<User> {
        self.store
            .find_user(id)
            .await?
            .ok_or(EngineError::NotFound("user"))
    }
}
