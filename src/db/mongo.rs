use log::{error, warn};
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT};
use mongodb::options::{
    Acknowledgment, FindOptions, IndexOptions, ReadConcern, TransactionOptions, WriteConcern,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use rocket::futures::TryStreamExt;

use super::store::{
    AcceptCommand, AcceptOutcome, ApplicationFilter, RequestFilter, Store, StoreError, StoreResult,
};
use crate::models::{
    Application, ApplicationStatus, AssistantEngagement, AssistantProfile, CareRequest, Rating,
    Reputation, ReputationTarget, RequestStatus, User,
};

const USERS: &str = "users";
const ASSISTANTS: &str = "assistant_profiles";
const REQUESTS: &str = "care_requests";
const APPLICATIONS: &str = "applications";
const ENGAGEMENTS: &str = "engagements";
const RATINGS: &str = "ratings";

const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// MongoDB-backed store. Multi-document writes run inside client-session
/// transactions (requires a replica set) and are retried on transient errors.
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, db: Database) -> Self {
        MongoStore { client, db }
    }

    /// Unique indexes backing the duplicate-application and duplicate-rating rules.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.assistants()
            .create_index(
                IndexModel::builder().keys(doc! { "user_id": 1 }).options(unique()).build(),
                None,
            )
            .await?;
        self.applications()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "assistant_id": 1, "request_id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.applications()
            .create_index(
                IndexModel::builder().keys(doc! { "request_id": 1, "status": 1 }).build(),
                None,
            )
            .await?;
        self.ratings()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "request_id": 1, "rater_id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.ratings()
            .create_index(IndexModel::builder().keys(doc! { "rated_id": 1 }).build(), None)
            .await?;
        self.engagements()
            .create_index(IndexModel::builder().keys(doc! { "request_id": 1 }).build(), None)
            .await?;
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection::<User>(USERS)
    }

    fn assistants(&self) -> Collection<AssistantProfile> {
        self.db.collection::<AssistantProfile>(ASSISTANTS)
    }

    fn requests(&self) -> Collection<CareRequest> {
        self.db.collection::<CareRequest>(REQUESTS)
    }

    fn applications(&self) -> Collection<Application> {
        self.db.collection::<Application>(APPLICATIONS)
    }

    fn engagements(&self) -> Collection<AssistantEngagement> {
        self.db.collection::<AssistantEngagement>(ENGAGEMENTS)
    }

    fn ratings(&self) -> Collection<Rating> {
        self.db.collection::<Rating>(RATINGS)
    }

    async fn start_transaction(&self, session: &mut ClientSession) -> StoreResult<()> {
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session.start_transaction(options).await?;
        Ok(())
    }

    /// Commits, retrying a bounded number of times while the outcome is unknown.
    async fn commit<C: Commit + Send>(session: &mut C) -> StoreResult<()> {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            match session.commit_once().await {
                Ok(()) => return Ok(()),
                Err(e) if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) => {
                    warn!("Commit result unknown (attempt {}), retrying: {}", attempt, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        error!("Commit outcome still unknown after {} attempts", MAX_TRANSACTION_ATTEMPTS);
        Err(StoreError::RetriesExhausted(MAX_TRANSACTION_ATTEMPTS))
    }

    async fn abort(session: &mut ClientSession) {
        if let Err(e) = session.abort_transaction().await {
            warn!("Failed to abort transaction: {}", e);
        }
    }

    async fn accept_in(
        &self,
        session: &mut ClientSession,
        command: &AcceptCommand,
    ) -> StoreResult<AcceptOutcome> {
        let claimed = self
            .requests()
            .update_one_with_session(
                doc! { "_id": command.request_id, "status": RequestStatus::Open.as_str() },
                doc! { "$set": {
                    "status": RequestStatus::Assigned.as_str(),
                    "updated_at": command.at,
                }},
                None,
                session,
            )
            .await?;
        if claimed.modified_count == 0 {
            return Ok(AcceptOutcome::RequestNotOpen);
        }

        let accepted = self
            .applications()
            .update_one_with_session(
                doc! {
                    "_id": command.application_id,
                    "request_id": command.request_id,
                    "status": ApplicationStatus::Pending.as_str(),
                },
                doc! { "$set": {
                    "status": ApplicationStatus::Accepted.as_str(),
                    "updated_at": command.at,
                }},
                None,
                session,
            )
            .await?;
        if accepted.modified_count == 0 {
            return Ok(AcceptOutcome::ApplicationNotPending);
        }

        let siblings = doc! {
            "request_id": command.request_id,
            "status": ApplicationStatus::Pending.as_str(),
            "_id": { "$ne": command.application_id },
        };
        let mut rejected = Vec::new();
        let mut cursor = self
            .applications()
            .find_with_session(siblings.clone(), None, session)
            .await?;
        while let Some(application) = cursor.next(session).await {
            rejected.push(application?.id);
        }
        rejected.sort();

        self.applications()
            .update_many_with_session(
                siblings,
                doc! { "$set": {
                    "status": ApplicationStatus::Rejected.as_str(),
                    "updated_at": command.at,
                }},
                None,
                session,
            )
            .await?;

        self.engagements()
            .insert_one_with_session(&command.engagement, None, session)
            .await?;

        let request = self
            .requests()
            .find_one_with_session(doc! { "_id": command.request_id }, None, session)
            .await?;
        let application = self
            .applications()
            .find_one_with_session(doc! { "_id": command.application_id }, None, session)
            .await?;

        match (request, application) {
            (Some(request), Some(application)) => Ok(AcceptOutcome::Accepted {
                request,
                application,
                rejected,
                engagement: command.engagement.clone(),
            }),
            (None, _) => Ok(AcceptOutcome::RequestNotOpen),
            (_, None) => Ok(AcceptOutcome::ApplicationNotPending),
        }
    }

    async fn transition_in(
        &self,
        session: &mut ClientSession,
        id: &ObjectId,
        from: RequestStatus,
        to: RequestStatus,
        at: DateTime,
    ) -> StoreResult<Option<CareRequest>> {
        let moved = self
            .requests()
            .update_one_with_session(
                doc! { "_id": id, "status": from.as_str() },
                doc! { "$set": { "status": to.as_str(), "updated_at": at } },
                None,
                session,
            )
            .await?;
        if moved.modified_count == 0 {
            return Ok(None);
        }

        if to.is_terminal() {
            let open = self
                .engagements()
                .find_one_with_session(doc! { "request_id": id, "end_date": null }, None, session)
                .await?;
            if let Some(engagement) = open {
                self.engagements()
                    .update_one_with_session(
                        doc! { "_id": engagement.id },
                        doc! { "$set": { "end_date": engagement.closing_date(at) } },
                        None,
                        session,
                    )
                    .await?;
            }
        }

        Ok(self
            .requests()
            .find_one_with_session(doc! { "_id": id }, None, session)
            .await?)
    }

    async fn record_rating_in(&self, session: &mut ClientSession, rating: &Rating) -> StoreResult<Reputation> {
        self.ratings()
            .insert_one_with_session(rating, None, session)
            .await
            .map_err(|e| duplicate_or(e, "rating"))?;

        let mut scores = Vec::new();
        let mut cursor = self
            .ratings()
            .find_with_session(doc! { "rated_id": rating.rated_id }, None, session)
            .await?;
        while let Some(existing) = cursor.next(session).await {
            scores.push(existing?.score);
        }

        // Assistant profile first, user row as the fallback.
        let target = Reputation::from_scores(rating.rated_id, ReputationTarget::Assistant, &scores);
        let summary = doc! { "$set": {
            "rating": target.rating,
            "rating_count": target.rating_count,
            "updated_at": rating.created_at,
        }};
        let on_profile = self
            .assistants()
            .update_one_with_session(doc! { "user_id": rating.rated_id }, summary.clone(), None, session)
            .await?;
        if on_profile.matched_count > 0 {
            return Ok(target);
        }

        self.users()
            .update_one_with_session(doc! { "_id": rating.rated_id }, summary, None, session)
            .await?;
        Ok(Reputation {
            target: ReputationTarget::User,
            ..target
        })
    }
}

/// One commit attempt of an open transaction.
#[rocket::async_trait]
trait Commit {
    async fn commit_once(&mut self) -> mongodb::error::Result<()>;
}

#[rocket::async_trait]
impl Commit for ClientSession {
    async fn commit_once(&mut self) -> mongodb::error::Result<()> {
        self.commit_transaction().await
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

fn duplicate_or(error: mongodb::error::Error, what: &'static str) -> StoreError {
    if is_duplicate_key(&error) {
        StoreError::Duplicate(what)
    } else {
        StoreError::Database(error)
    }
}

fn is_transient(error: &StoreError) -> bool {
    matches!(error, StoreError::Database(e) if e.contains_label(TRANSIENT_TRANSACTION_ERROR))
}

fn request_filter(filter: &RequestFilter) -> Document {
    let mut query = doc! {};
    if let Some(owner_id) = filter.owner_id {
        query.insert("owner_id", owner_id);
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    if let Some(care_type) = filter.care_type {
        query.insert("care_type", care_type.as_str());
    }
    query
}

fn application_filter(filter: &ApplicationFilter) -> Document {
    let mut query = doc! {};
    if let Some(request_id) = filter.request_id {
        query.insert("request_id", request_id);
    }
    if let Some(assistant_id) = filter.assistant_id {
        query.insert("assistant_id", assistant_id);
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    query
}

fn sorted(key: &str, direction: i32) -> FindOptions {
    let mut sort = Document::new();
    sort.insert(key, direction);
    sort.insert("_id", direction);
    FindOptions::builder().sort(sort).build()
}

/// Runs `$body` inside a transaction on a fresh session, retrying the whole
/// attempt on `TransientTransactionError`. `$body` evaluates to
/// `StoreResult<(T, bool)>` where the flag says whether to commit.
macro_rules! in_transaction {
    ($store:expr, $what:literal, |$session:ident| $body:expr) => {{
        let mut $session = $store.client.start_session(None).await?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            if attempt > MAX_TRANSACTION_ATTEMPTS {
                error!("{} transaction exhausted {} attempts", $what, MAX_TRANSACTION_ATTEMPTS);
                break Err(StoreError::RetriesExhausted(MAX_TRANSACTION_ATTEMPTS));
            }
            $store.start_transaction(&mut $session).await?;
            let outcome: StoreResult<(_, bool)> = $body;
            match outcome {
                Ok((value, true)) => match MongoStore::commit(&mut $session).await {
                    Ok(()) => break Ok(value),
                    Err(e) if is_transient(&e) => {
                        warn!("{} commit conflicted (attempt {}), retrying", $what, attempt);
                        continue;
                    }
                    Err(e) => break Err(e),
                },
                Ok((value, false)) => {
                    MongoStore::abort(&mut $session).await;
                    break Ok(value);
                }
                Err(e) => {
                    MongoStore::abort(&mut $session).await;
                    if is_transient(&e) {
                        warn!("{} write conflicted (attempt {}), retrying", $what, attempt);
                        continue;
                    }
                    break Err(e);
                }
            }
        }
    }};
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        self.users()
            .insert_one(&user, None)
            .await
            .map_err(|e| duplicate_or(e, "user"))?;
        Ok(user)
    }

    async fn find_user(&self, id: &ObjectId) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "_id": id }, None).await?)
    }

    async fn insert_assistant_profile(&self, profile: AssistantProfile) -> StoreResult<AssistantProfile> {
        self.assistants()
            .insert_one(&profile, None)
            .await
            .map_err(|e| duplicate_or(e, "assistant profile"))?;
        Ok(profile)
    }

    async fn find_assistant_profile(&self, user_id: &ObjectId) -> StoreResult<Option<AssistantProfile>> {
        Ok(self.assistants().find_one(doc! { "user_id": user_id }, None).await?)
    }

    async fn insert_request(&self, request: CareRequest) -> StoreResult<CareRequest> {
        self.requests()
            .insert_one(&request, None)
            .await
            .map_err(|e| duplicate_or(e, "care request"))?;
        Ok(request)
    }

    async fn find_request(&self, id: &ObjectId) -> StoreResult<Option<CareRequest>> {
        Ok(self.requests().find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<CareRequest>> {
        Ok(self
            .requests()
            .find(request_filter(filter), sorted("created_at", -1))
            .await?
            .try_collect()
            .await?)
    }

    async fn insert_application(&self, application: Application) -> StoreResult<Application> {
        self.applications()
            .insert_one(&application, None)
            .await
            .map_err(|e| duplicate_or(e, "application"))?;
        Ok(application)
    }

    async fn find_application(&self, id: &ObjectId) -> StoreResult<Option<Application>> {
        Ok(self.applications().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_application_by_pair(
        &self,
        assistant_id: &ObjectId,
        request_id: &ObjectId,
    ) -> StoreResult<Option<Application>> {
        Ok(self
            .applications()
            .find_one(doc! { "assistant_id": assistant_id, "request_id": request_id }, None)
            .await?)
    }

    async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<Application>> {
        Ok(self
            .applications()
            .find(application_filter(filter), sorted("created_at", 1))
            .await?
            .try_collect()
            .await?)
    }

    async fn accept_application(&self, command: AcceptCommand) -> StoreResult<AcceptOutcome> {
        in_transaction!(self, "accept", |session| {
            match self.accept_in(&mut session, &command).await {
                Ok(outcome) => {
                    let commit = matches!(outcome, AcceptOutcome::Accepted { .. });
                    Ok((outcome, commit))
                }
                Err(e) => Err(e),
            }
        })
    }

    async fn reject_application(&self, id: &ObjectId, at: DateTime) -> StoreResult<Option<Application>> {
        let rejected = self
            .applications()
            .update_one(
                doc! { "_id": id, "status": ApplicationStatus::Pending.as_str() },
                doc! { "$set": { "status": ApplicationStatus::Rejected.as_str(), "updated_at": at } },
                None,
            )
            .await?;
        if rejected.modified_count == 0 {
            return Ok(None);
        }
        self.find_application(id).await
    }

    async fn transition_request(
        &self,
        id: &ObjectId,
        from: RequestStatus,
        to: RequestStatus,
        at: DateTime,
    ) -> StoreResult<Option<CareRequest>> {
        in_transaction!(self, "transition", |session| {
            match self.transition_in(&mut session, id, from, to, at).await {
                Ok(request) => {
                    let commit = request.is_some();
                    Ok((request, commit))
                }
                Err(e) => Err(e),
            }
        })
    }

    async fn find_engagement_by_request(&self, request_id: &ObjectId) -> StoreResult<Option<AssistantEngagement>> {
        Ok(self
            .engagements()
            .find_one(doc! { "request_id": request_id }, None)
            .await?)
    }

    async fn list_engagements_for(&self, user_id: &ObjectId) -> StoreResult<Vec<AssistantEngagement>> {
        Ok(self
            .engagements()
            .find(
                doc! { "$or": [ { "client_id": user_id }, { "assistant_id": user_id } ] },
                sorted("start_date", -1),
            )
            .await?
            .try_collect()
            .await?)
    }

    async fn record_rating(&self, rating: Rating) -> StoreResult<Reputation> {
        in_transaction!(self, "rating", |session| {
            match self.record_rating_in(&mut session, &rating).await {
                Ok(reputation) => Ok((reputation, true)),
                Err(e) => Err(e),
            }
        })
    }

    async fn find_rating(&self, request_id: &ObjectId, rater_id: &ObjectId) -> StoreResult<Option<Rating>> {
        Ok(self
            .ratings()
            .find_one(doc! { "request_id": request_id, "rater_id": rater_id }, None)
            .await?)
    }

    async fn list_ratings_for(&self, rated_id: &ObjectId) -> StoreResult<Vec<Rating>> {
        Ok(self
            .ratings()
            .find(doc! { "rated_id": rated_id }, sorted("created_at", -1))
            .await?
            .try_collect()
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use mongodb::bson::{self, Bson};
    use mongodb::error::{CommandError, WriteConcernError, WriteError};

    use super::*;
    use crate::models::{CareType, Urgency};

    fn write_error(code: i32) -> mongodb::error::Error {
        let failure: WriteError =
            bson::from_document(doc! { "code": code, "errmsg": "write failed" }).unwrap();
        ErrorKind::Write(WriteFailure::WriteError(failure)).into()
    }

    fn command_error(code: i32) -> mongodb::error::Error {
        let failure: CommandError =
            bson::from_document(doc! { "code": code, "codeName": "Failed", "errmsg": "command failed" })
                .unwrap();
        ErrorKind::Command(failure).into()
    }

    fn labelled(label: &str) -> mongodb::error::Error {
        let failure: WriteConcernError = bson::from_document(doc! {
            "code": 64,
            "codeName": "WriteConcernFailed",
            "errmsg": "waiting for replication timed out",
            "errorLabels": [label],
        })
        .unwrap();
        ErrorKind::Write(WriteFailure::WriteConcernError(failure)).into()
    }

    fn stored_request(care_type: CareType, status: RequestStatus) -> Document {
        let now = DateTime::now();
        let request = CareRequest {
            id: ObjectId::new(),
            owner_id: ObjectId::new(),
            title: "Night shift".to_string(),
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
            status,
            created_at: now,
            updated_at: now,
        };
        bson::to_document(&request).unwrap()
    }

    #[test]
    fn duplicate_key_errors_become_duplicates() {
        assert!(is_duplicate_key(&write_error(11000)));
        assert!(is_duplicate_key(&command_error(11000)));
        assert!(!is_duplicate_key(&write_error(121)));

        assert!(matches!(duplicate_or(write_error(11000), "rating"), StoreError::Duplicate("rating")));
        assert!(matches!(duplicate_or(command_error(11000), "user"), StoreError::Duplicate("user")));
        assert!(matches!(duplicate_or(write_error(121), "rating"), StoreError::Database(_)));
    }

    #[test]
    fn only_transient_transaction_errors_are_retried() {
        assert!(is_transient(&StoreError::Database(labelled(TRANSIENT_TRANSACTION_ERROR))));
        assert!(!is_transient(&StoreError::Database(labelled(UNKNOWN_TRANSACTION_COMMIT_RESULT))));
        assert!(!is_transient(&StoreError::Database(write_error(11000))));
        assert!(!is_transient(&StoreError::Duplicate("rating")));
    }

    #[test]
    fn request_filter_matches_stored_field_names_and_values() {
        let owner_id = ObjectId::new();
        let filter = RequestFilter {
            owner_id: Some(owner_id),
            status: Some(RequestStatus::Assigned),
            care_type: Some(CareType::SpecialNeeds),
        };
        let query = request_filter(&filter);
        assert_eq!(query.len(), 3);
        assert_eq!(query.get_object_id("owner_id").unwrap(), owner_id);

        let stored = stored_request(CareType::SpecialNeeds, RequestStatus::Assigned);
        for key in ["status", "care_type"] {
            assert_eq!(query.get(key), stored.get(key), "field {}", key);
        }
        assert_eq!(query.get("care_type"), Some(&Bson::String("special_needs".into())));

        assert!(request_filter(&RequestFilter::default()).is_empty());
    }

    #[test]
    fn application_filter_matches_stored_field_names_and_values() {
        let request_id = ObjectId::new();
        let assistant_id = ObjectId::new();
        let filter = ApplicationFilter {
            request_id: Some(request_id),
            assistant_id: Some(assistant_id),
            status: Some(ApplicationStatus::Pending),
        };
        let query = application_filter(&filter);

        let now = DateTime::now();
        let stored = bson::to_document(&Application {
            id: ObjectId::new(),
            request_id,
            assistant_id,
            status: ApplicationStatus::Pending,
            note: None,
            created_at: now,
            updated_at: now,
        })
        .unwrap();
        assert_eq!(query.len(), 3);
        for (key, value) in query.iter() {
            assert_eq!(stored.get(key), Some(value), "field {}", key);
        }
    }

    #[test]
    fn sort_orders_ties_by_id() {
        let options = sorted("created_at", -1);
        assert_eq!(options.sort, Some(doc! { "created_at": -1, "_id": -1 }));

        let options = sorted("start_date", 1);
        assert_eq!(options.sort, Some(doc! { "start_date": 1, "_id": 1 }));
    }

    /// Fails with the given errors in order, then succeeds.
    struct ScriptedCommit {
        failures: Vec<mongodb::error::Error>,
        calls: u32,
    }

    #[rocket::async_trait]
    impl Commit for ScriptedCommit {
        async fn commit_once(&mut self) -> mongodb::error::Result<()> {
            self.calls += 1;
            if self.failures.is_empty() {
                Ok(())
            } else {
                Err(self.failures.remove(0))
            }
        }
    }

    #[tokio::test]
    async fn unknown_commit_results_are_retried_then_succeed() {
        let mut session = ScriptedCommit {
            failures: vec![
                labelled(UNKNOWN_TRANSACTION_COMMIT_RESULT),
                labelled(UNKNOWN_TRANSACTION_COMMIT_RESULT),
            ],
            calls: 0,
        };
        MongoStore::commit(&mut session).await.unwrap();
        assert_eq!(session.calls, 3);
    }

    #[tokio::test]
    async fn unknown_commit_retries_are_bounded() {
        let failures = (0..MAX_TRANSACTION_ATTEMPTS + 3)
            .map(|_| labelled(UNKNOWN_TRANSACTION_COMMIT_RESULT))
            .collect();
        let mut session = ScriptedCommit { failures, calls: 0 };

        let result = MongoStore::commit(&mut session).await;
        assert!(matches!(result, Err(StoreError::RetriesExhausted(n)) if n == MAX_TRANSACTION_ATTEMPTS));
        assert_eq!(session.calls, MAX_TRANSACTION_ATTEMPTS);
    }

    #[tokio::test]
    async fn other_commit_failures_are_not_retried() {
        let mut session = ScriptedCommit {
            failures: vec![write_error(121)],
            calls: 0,
        };
        assert!(matches!(MongoStore::commit(&mut session).await, Err(StoreError::Database(_))));
        assert_eq!(session.calls, 1);
    }
}
