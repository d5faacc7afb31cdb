use rocket::figment::{self, Figment};
use rocket::Config as RocketConfig;
use serde::Deserialize;

use crate::engine::ProjectionPolicy;

pub struct Config;

/// Signing keys used when none are configured. Only the debug profile may
/// run with them.
pub const FALLBACK_JWT_SECRET: &str = "default-secret";
pub const FALLBACK_JWT_REFRESH_SECRET: &str = "default-refresh-secret";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mongodb,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Mongodb => "mongodb",
            StoreBackend::Memory => "memory",
        }
    }
}

/// Store selection and projection constants, read from the Rocket figment.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineSettings {
    pub store_backend: StoreBackend,
    pub mongodb_uri: String,
    pub database_name: String,
    #[serde(flatten)]
    pub policy: ProjectionPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            store_backend: StoreBackend::default(),
            mongodb_uri: "mongodb://localhost:27017/?replicaSet=rs0".to_string(),
            database_name: "care-services".to_string(),
            policy: ProjectionPolicy::default(),
        }
    }
}

impl Config {
    // Rocket.toml plus ROCKET_* env vars, with the same profile Rocket selects.
    fn figment() -> Figment {
        RocketConfig::figment()
    }

    /// Any key that fails to parse is an error; nothing falls back silently.
    pub fn engine_settings(figment: &Figment) -> Result<EngineSettings, figment::Error> {
        figment.extract::<EngineSettings>()
    }

    fn configured_secret(figment: &Figment, key: &str) -> Option<String> {
        figment
            .extract_inner::<String>(key)
            .ok()
            .filter(|secret| !secret.trim().is_empty())
    }

    /// Refuses to run outside the debug profile without real signing keys.
    pub fn require_jwt_secrets(figment: &Figment) -> Result<(), String> {
        if figment.profile() == &RocketConfig::DEBUG_PROFILE {
            return Ok(());
        }
        let keys = [
            ("jwt_secret", FALLBACK_JWT_SECRET),
            ("jwt_refresh_secret", FALLBACK_JWT_REFRESH_SECRET),
        ];
        for (key, fallback) in keys {
            match Self::configured_secret(figment, key) {
                Some(secret) if secret != fallback => {}
                _ => {
                    return Err(format!(
                        "`{}` must be set for the {} profile",
                        key,
                        figment.profile()
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn jwt_secret_in(figment: &Figment) -> String {
        Self::configured_secret(figment, "jwt_secret")
            .unwrap_or_else(|| FALLBACK_JWT_SECRET.to_string())
    }

    pub fn jwt_secret() -> String {
        Self::jwt_secret_in(&Self::figment())
    }

    pub fn jwt_refresh_secret() -> String {
        Self::configured_secret(&Self::figment(), "jwt_refresh_secret")
            .unwrap_or_else(|| FALLBACK_JWT_REFRESH_SECRET.to_string())
    }

    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(900)
    }

    pub fn jwt_refresh_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_refresh_expiry")
            .unwrap_or(604800)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_when_keys_are_missing() {
        let settings = Config::engine_settings(&Figment::new()).unwrap();
        assert_eq!(settings.store_backend, StoreBackend::Mongodb);
        assert_eq!(settings.policy, ProjectionPolicy::default());
    }

    #[test]
    fn settings_read_backend_and_policy_overrides() {
        let figment = Figment::new()
            .merge(("store_backend", "memory"))
            .merge(("hours_per_day", 6.0))
            .merge(("completion_threshold", 90));
        let settings = Config::engine_settings(&figment).unwrap();
        assert_eq!(settings.store_backend, StoreBackend::Memory);
        assert_eq!(settings.policy.hours_per_day, 6.0);
        assert_eq!(settings.policy.completion_threshold, 90);
        assert_eq!(settings.policy.days_per_month, 30);
    }

    #[test]
    fn one_bad_key_fails_the_whole_extraction() {
        let figment = Figment::new()
            .merge(("store_backend", "memory"))
            .merge(("completion_threshold", 300));
        assert!(Config::engine_settings(&figment).is_err());

        let figment = Figment::new().merge(("store_backend", "postgres"));
        assert!(Config::engine_settings(&figment).is_err());
    }

    #[test]
    fn release_profile_needs_both_signing_keys() {
        let release = Figment::new().select(RocketConfig::RELEASE_PROFILE);
        assert!(Config::require_jwt_secrets(&release).is_err());

        let only_access = release.clone().merge(("jwt_secret", "access-key"));
        assert!(Config::require_jwt_secrets(&only_access).is_err());

        let fallback = release
            .clone()
            .merge(("jwt_secret", FALLBACK_JWT_SECRET))
            .merge(("jwt_refresh_secret", "refresh-key"));
        assert!(Config::require_jwt_secrets(&fallback).is_err());

        let configured = release
            .merge(("jwt_secret", "access-key"))
            .merge(("jwt_refresh_secret", "refresh-key"));
        assert!(Config::require_jwt_secrets(&configured).is_ok());
        assert_eq!(Config::jwt_secret_in(&configured), "access-key");
    }

    #[test]
    fn debug_profile_may_use_fallback_keys() {
        let debug = Figment::new().select(RocketConfig::DEBUG_PROFILE);
        assert!(Config::require_jwt_secrets(&debug).is_ok());
        assert_eq!(Config::jwt_secret_in(&debug), FALLBACK_JWT_SECRET);
    }
}
