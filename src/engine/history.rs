//! Read-only projections over stored requests and engagements: duration
//! labels, cost estimates and progress. Nothing here is persisted.

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use super::{Caller, Engine, EngineResult};
use crate::models::{AssistantEngagement, CareRequest};

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Tunable constants behind every projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionPolicy {
    /// Working hours assumed per day when converting between hours and days.
    pub hours_per_day: f64,
    pub days_per_month: i64,
    /// Estimated length of an engagement whose total hours are unknown.
    pub fallback_total_days: i64,
    /// Progress percentage at which an engagement may be marked complete.
    pub completion_threshold: u8,
}

impl Default for ProjectionPolicy {
    fn default() -> Self {
        ProjectionPolicy {
            hours_per_day: 8.0,
            days_per_month: 30,
            fallback_total_days: 30,
            completion_threshold: 80,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Progress {
    pub days_elapsed: i64,
    pub total_days: i64,
    pub percent: i64,
    pub can_complete: bool,
}

/// Whole days between two instants, rounded up. Never negative.
pub fn duration_days(start: DateTime, end: DateTime) -> i64 {
    let span = end.timestamp_millis() - start.timestamp_millis();
    if span <= 0 {
        return 0;
    }
    (span + DAY_MILLIS - 1) / DAY_MILLIS
}

/// Completed days since `start`. Never negative.
fn days_elapsed(start: DateTime, now: DateTime) -> i64 {
    ((now.timestamp_millis() - start.timestamp_millis()) / DAY_MILLIS).max(0)
}

impl ProjectionPolicy {
    /// "29 días", "1 mes", "2 meses". Months are `round(days / 30)` and only
    /// pluralised from two full months of days upwards.
    pub fn duration_label(&self, days: i64) -> String {
        let per_month = self.days_per_month.max(1);
        if days >= per_month {
            let months = (days as f64 / per_month as f64).round() as i64;
            let unit = if days >= 2 * per_month { "meses" } else { "mes" };
            format!("{} {}", months, unit)
        } else {
            let unit = if days == 1 { "día" } else { "días" };
            format!("{} {}", days, unit)
        }
    }

    /// `rate * total_hours` when hours are known, else `rate * days * hours_per_day`.
    pub fn cost_estimate(
        &self,
        hourly_rate: Option<f64>,
        total_hours: Option<f64>,
        duration_days: i64,
    ) -> Option<f64> {
        let rate = hourly_rate?;
        Some(match total_hours {
            Some(hours) => rate * hours,
            None => rate * (duration_days as f64 * self.hours_per_day),
        })
    }

    pub fn total_days_estimate(&self, total_hours: Option<f64>) -> i64 {
        match total_hours {
            Some(hours) if self.hours_per_day > 0.0 => {
                ((hours / self.hours_per_day).ceil() as i64).max(1)
            }
            _ => self.fallback_total_days.max(1),
        }
    }

    pub fn progress(&self, start: DateTime, now: DateTime, total_hours: Option<f64>) -> Progress {
        let days_elapsed = days_elapsed(start, now);
        let total_days = self.total_days_estimate(total_hours);
        let ratio = days_elapsed as f64 / total_days as f64 * 100.0;
        let percent = (ratio.round() as i64).min(100);
        Progress {
            days_elapsed,
            total_days,
            percent,
            can_complete: percent >= self.completion_threshold as i64,
        }
    }
}

/// One engagement as shown in a service history list.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub engagement: AssistantEngagement,
    pub request: CareRequest,
    pub duration_days: i64,
    pub duration_label: String,
    pub cost_estimate: Option<f64>,
    /// Present only for engagements still in progress.
    pub progress: Option<Progress>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceHistory {
    pub in_progress: Vec<HistoryEntry>,
    pub historical: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct RequestProjection {
    pub estimated_days: i64,
    pub estimated_duration: String,
    pub estimated_cost: Option<f64>,
    pub progress: Option<Progress>,
}

impl ProjectionPolicy {
    pub fn history_entry(
        &self,
        engagement: AssistantEngagement,
        request: CareRequest,
        now: DateTime,
    ) -> HistoryEntry {
        let active = engagement.is_in_progress(now);
        let end = match engagement.end_date {
            Some(end) if !active => end,
            _ => now,
        };
        let duration_days = duration_days(engagement.start_date, end);
        let progress = active.then(|| self.progress(engagement.start_date, now, request.total_hours));
        HistoryEntry {
            duration_label: self.duration_label(duration_days),
            cost_estimate: self.cost_estimate(request.hourly_rate, request.total_hours, duration_days),
            duration_days,
            progress,
            engagement,
            request,
        }
    }
}

impl Engine {
    /// The caller's engagements, split into in-progress and historical.
    pub async fn service_history(&self, caller: &Caller, now: DateTime) -> EngineResult<ServiceHistory> {
        let mut history = ServiceHistory::default();
        for engagement in self.store.list_engagements_for(&caller.user_id).await? {
            let Some(request) = self.store.find_request(&engagement.request_id).await? else {
                continue;
            };
            let active = engagement.is_in_progress(now);
            let entry = self.policy.history_entry(engagement, request, now);
            if active {
                history.in_progress.push(entry);
            } else {
                history.historical.push(entry);
            }
        }
        Ok(history)
    }

    pub async fn request_projection(
        &self,
        request: &CareRequest,
        now: DateTime,
    ) -> EngineResult<RequestProjection> {
        let estimated_days = self.policy.total_days_estimate(request.total_hours);
        let progress = self
            .store
            .find_engagement_by_request(&request.id)
            .await?
            .filter(|engagement| engagement.is_in_progress(now))
            .map(|engagement| self.policy.progress(engagement.start_date, now, request.total_hours));
        Ok(RequestProjection {
            estimated_days,
            estimated_duration: self.policy.duration_label(estimated_days),
            estimated_cost: self
                .policy
                .cost_estimate(request.hourly_rate, request.total_hours, estimated_days),
            progress,
        })
    }

    pub async fn engagement_for(&self, request_id: &ObjectId) -> EngineResult<Option<AssistantEngagement>> {
        Ok(self.store.find_engagement_by_request(request_id).await?)
    }
}
