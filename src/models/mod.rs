pub mod user;
pub mod care_request;
pub mod application;
pub mod engagement;
pub mod rating;

pub use user::*;
pub use care_request::*;
pub use application::*;
pub use engagement::*;
pub use rating::*;

use mongodb::bson::DateTime;

/// RFC 3339 rendering for API responses.
pub fn format_date(date: DateTime) -> String {
    date.try_to_rfc3339_string()
        .unwrap_or_else(|_| date.timestamp_millis().to_string())
}

/// Accepts either an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_date(value: &str) -> Option<DateTime> {
    let value = value.trim();
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(DateTime::from_millis(parsed.timestamp_millis()));
    }
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_millis(naive.and_utc().timestamp_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_dates_and_timestamps() {
        let day = parse_date("2024-03-01").expect("plain date");
        let stamp = parse_date("2024-03-01T00:00:00Z").expect("rfc3339");
        assert_eq!(day, stamp);
        assert!(parse_date("next tuesday").is_none());
    }

    #[test]
    fn legacy_status_labels_collapse_to_assigned() {
        assert_eq!(RequestStatus::parse("IN_PROGRESS"), Some(RequestStatus::Assigned));
        assert_eq!(RequestStatus::parse("accepted"), Some(RequestStatus::Assigned));
        assert_eq!(RequestStatus::parse("open"), Some(RequestStatus::Open));
        assert_eq!(RequestStatus::parse("archived"), None);
    }

    #[test]
    fn engagement_close_never_precedes_start() {
        let start = DateTime::from_millis(10_000);
        let engagement = AssistantEngagement {
            id: mongodb::bson::oid::ObjectId::new(),
            client_id: mongodb::bson::oid::ObjectId::new(),
            assistant_id: mongodb::bson::oid::ObjectId::new(),
            request_id: mongodb::bson::oid::ObjectId::new(),
            application_id: mongodb::bson::oid::ObjectId::new(),
            start_date: start,
            end_date: None,
        };
        assert_eq!(engagement.closing_date(DateTime::from_millis(5_000)), start);
        assert_eq!(
            engagement.closing_date(DateTime::from_millis(20_000)),
            DateTime::from_millis(20_000)
        );
        assert!(engagement.is_in_progress(DateTime::from_millis(20_000)));
    }

    #[test]
    fn reputation_is_exact_mean() {
        let id = mongodb::bson::oid::ObjectId::new();
        let reputation = Reputation::from_scores(id, ReputationTarget::User, &[5, 3, 4]);
        assert_eq!(reputation.rating, 4.0);
        assert_eq!(reputation.rating_count, 3);

        let uneven = Reputation::from_scores(id, ReputationTarget::User, &[5, 4]);
        assert_eq!(uneven.rating, 4.5);
    }
}
