pub mod memory;
pub mod mongo;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use store::*;

use std::sync::Arc;

use mongodb::bson::doc;
use mongodb::Client;
use log::{error, info};
use rocket::fairing::AdHoc;

use crate::config::{Config, EngineSettings, StoreBackend};
use crate::engine::Engine;

/// Validates settings, connects the configured store and hands Rocket a
/// ready [`Engine`]. Ignition aborts on bad configuration.
pub fn init() -> AdHoc {
    AdHoc::try_on_ignite("Care engine", |rocket| async move {
        let settings = match Config::engine_settings(rocket.figment()) {
            Ok(settings) => settings,
            Err(e) => {
                error!("✗ Invalid engine settings: {}", e);
                return Err(rocket);
            }
        };
        if let Err(e) = Config::require_jwt_secrets(rocket.figment()) {
            error!("✗ {}", e);
            return Err(rocket);
        }

        match connect(&settings).await {
            Ok(store) => {
                info!("✓ {} store ready", settings.store_backend.as_str());
                Ok(rocket.manage(Engine::new(store, settings.policy)))
            }
            Err(e) => {
                error!("✗ Failed to open {} store: {}", settings.store_backend.as_str(), e);
                Err(rocket)
            }
        }
    })
}

async fn connect(settings: &EngineSettings) -> Result<Arc<dyn Store>, StoreError> {
    match settings.store_backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Mongodb => {
            let client = Client::with_uri_str(&settings.mongodb_uri).await?;

            // Test connection
            client
                .database("admin")
                .run_command(doc! {"ping": 1}, None)
                .await?;

            let store = MongoStore::new(client.clone(), client.database(&settings.database_name));
            store.ensure_indexes().await?;
            Ok(Arc::new(store))
        }
    }
}
