use log::info;
use mongodb::bson::{oid::ObjectId, DateTime};

use super::{Caller, Engine, EngineError, EngineResult};
use crate::db::StoreError;
use crate::models::{Rating, Reputation, ReputationTarget, RequestStatus};

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

impl Engine {
    /// Records one party's rating of the other on a completed request and
    /// returns the rated party's recomputed reputation.
    pub async fn submit_rating(
        &self,
        request_id: &ObjectId,
        caller: &Caller,
        score: i32,
        comment: Option<String>,
        would_recommend: Option<bool>,
    ) -> EngineResult<(Rating, Reputation)> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(EngineError::InvalidScore(score));
        }

        let request = self.request(request_id).await?;
        if request.status != RequestStatus::Completed {
            return Err(EngineError::not_eligible(format!(
                "Request is {}, only completed requests can be rated",
                request.status.as_str()
            )));
        }

        let accepted = self
            .accepted_application(&request.id)
            .await?
            .ok_or_else(|| EngineError::not_eligible("Request has no accepted assistant"))?;

        // The rated party is whoever the caller is not.
        let rated_id = if caller.user_id == request.owner_id {
            accepted.assistant_id
        } else if caller.user_id == accepted.assistant_id {
            request.owner_id
        } else {
            return Err(EngineError::not_eligible("You are not a party to this request"));
        };

        if self
            .store
            .find_rating(&request.id, &caller.user_id)
            .await?
            .is_some()
        {
            return Err(EngineError::DuplicateRating);
        }

        let rating = Rating {
            id: ObjectId::new(),
            request_id: request.id,
            rater_id: caller.user_id,
            rated_id,
            score,
            comment: comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            would_recommend,
            created_at: DateTime::now(),
        };

        match self.store.record_rating(rating.clone()).await {
            Ok(reputation) => {
                info!(
                    "Rating {} from {} for {} on request {}; reputation now {:.2} over {}",
                    score, caller.user_id, rated_id, request.id, reputation.rating, reputation.rating_count
                );
                Ok((rating, reputation))
            }
            Err(StoreError::Duplicate(_)) => Err(EngineError::DuplicateRating),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn ratings_for(&self, rated_id: &ObjectId) -> EngineResult<Vec<Rating>> {
        Ok(self.store.list_ratings_for(rated_id).await?)
    }

    /// The stored summary: assistant profile when the user has one, else the
    /// user row.
    pub async fn reputation(&self, user_id: &ObjectId) -> EngineResult<Reputation> {
        if let Some(profile) = self.store.find_assistant_profile(user_id).await? {
            return Ok(Reputation {
                rated_id: *user_id,
                target: ReputationTarget::Assistant,
                rating: profile.rating,
                rating_count: profile.rating_count,
            });
        }
        let user = self.user(user_id).await?;
        Ok(Reputation {
            rated_id: user.id,
            target: ReputationTarget::User,
            rating: user.rating,
            rating_count: user.rating_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::testing::Fixture;
    use crate::engine::CloseTarget;

    #[tokio::test]
    async fn only_completed_requests_are_eligible() {
        let fx = Fixture::new();
        let client = fx.client("Carmen").await;
        let request = fx.open_request(&client).await;

        let open = fx.engine.submit_rating(&request.id, &client, 5, None, None).await;
        assert!(matches!(open, Err(EngineError::NotEligible(_))));

        let (assistant, _) = fx.assign(&client, &request).await;
        let assigned = fx.engine.submit_rating(&request.id, &assistant, 5, None, None).await;
        assert!(matches!(assigned, Err(EngineError::NotEligible(_))));

        fx.engine
            .complete_or_cancel(&request.id, &client, CloseTarget::Cancelled)
            .await
            .unwrap();
        let cancelled = fx.engine.submit_rating(&request.id, &client, 5, None, None).await;
        assert!(matches!(cancelled, Err(EngineError::NotEligible(_))));
    }

    #[tokio::test]
    async fn score_must_be_in_range() {
        let fx = Fixture::new();
        let client = fx.client("Carmen").await;
        let (request, _) = fx.completed_request(&client).await;

        for score in [0, 6, -1] {
            let result = fx.engine.submit_rating(&request.id, &client, score, None, None).await;
            assert!(matches!(result, Err(EngineError::InvalidScore(s)) if s == score));
        }
    }

    #[tokio::test]
    async fn outsiders_cannot_rate() {
        let fx = Fixture::new();
        let client = fx.client("Carmen").await;
        let stranger = fx.assistant("Mallory").await;
        let (request, _) = fx.completed_request(&client).await;

        let result = fx.engine.submit_rating(&request.id, &stranger, 4, None, None).await;
        assert!(matches!(result, Err(EngineError::NotEligible(_))));
    }

    #[tokio::test]
    async fn each_party_rates_the_other_once() {
        let fx = Fixture::new();
        let client = fx.client("Carmen").await;
        let (request, assistant) = fx.completed_request(&client).await;

        let (rating, reputation) = fx
            .engine
            .submit_rating(&request.id, &client, 4, Some("Punctual".into()), Some(true))
            .await
            .unwrap();
        assert_eq!(rating.rated_id, assistant.user_id);
        assert_eq!(reputation.target, ReputationTarget::Assistant);
        assert_eq!(reputation.rating, 4.0);
        assert_eq!(reputation.rating_count, 1);

        let twice = fx.engine.submit_rating(&request.id, &client, 5, None, None).await;
        assert!(matches!(twice, Err(EngineError::DuplicateRating)));

        let (back, _) = fx
            .engine
            .submit_rating(&request.id, &assistant, 5, None, None)
            .await
            .unwrap();
        assert_eq!(back.rated_id, client.user_id);
    }

    #[tokio::test]
    async fn reputation_is_the_exact_mean_of_all_ratings() {
        let fx = Fixture::new();
        let assistant = fx.assistant("Ana").await;

        for (i, score) in [5, 3, 4].into_iter().enumerate() {
            let client = fx.client(&format!("Client {}", i)).await;
            let request = fx.open_request(&client).await;
            let application = fx.engine.apply(&request.id, &assistant, None).await.unwrap();
            fx.engine
                .accept_application(&request.id, &application.id, &client)
                .await
                .unwrap();
            fx.engine
                .complete_or_cancel(&request.id, &assistant, CloseTarget::Completed)
                .await
                .unwrap();
            fx.engine
                .submit_rating(&request.id, &client, score, None, None)
                .await
                .unwrap();
        }

        let reputation = fx.engine.reputation(&assistant.user_id).await.unwrap();
        assert_eq!(reputation.rating, 4.0);
        assert_eq!(reputation.rating_count, 3);
        assert_eq!(fx.engine.ratings_for(&assistant.user_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn users_without_assistant_profile_keep_reputation_on_user_row() {
        let fx = Fixture::new();
        let client = fx.client("Carmen").await;
        let (request, assistant) = fx.completed_request(&client).await;

        let (_, reputation) = fx
            .engine
            .submit_rating(&request.id, &assistant, 5, None, None)
            .await
            .unwrap();
        assert_eq!(reputation.target, ReputationTarget::User);

        let user = fx.engine.user(&client.user_id).await.unwrap();
        assert_eq!(user.rating, 5.0);
        assert_eq!(user.rating_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ratings_for_one_party_lose_no_updates() {
        let fx = Fixture::new();
        let assistant = fx.assistant("Ana").await;

        let mut jobs = Vec::new();
        for i in 0..10 {
            let client = fx.client(&format!("Client {}", i)).await;
            let request = fx.open_request(&client).await;
            let application = fx.engine.apply(&request.id, &assistant, None).await.unwrap();
            fx.engine
                .accept_application(&request.id, &application.id, &client)
                .await
                .unwrap();
            fx.engine
                .complete_or_cancel(&request.id, &client, CloseTarget::Completed)
                .await
                .unwrap();
            jobs.push((request.id, client, if i % 2 == 0 { 5 } else { 2 }));
        }

        let barrier = Arc::new(tokio::sync::Barrier::new(jobs.len()));
        let mut handles = Vec::new();
        for (request_id, client, score) in jobs {
            let engine = Arc::clone(&fx.engine);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                engine.submit_rating(&request_id, &client, score, None, None).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reputation = fx.engine.reputation(&assistant.user_id).await.unwrap();
        assert_eq!(reputation.rating_count, 10);
        assert_eq!(reputation.rating, 3.5);
    }
}
