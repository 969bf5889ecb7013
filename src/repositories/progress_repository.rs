use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Bson},
    options::IndexOptions,
    Collection, IndexModel,
};

use crate::{
    db::Database,
    errors::AppResult,
    models::domain::{
        attempt::ConceptPerformance,
        progress::{
            ConceptProgress, ProgressRecord, ProgressScope, WEAK_AREA_MASTERY_THRESHOLD,
            WEAK_AREA_MIN_SEEN,
        },
    },
};

/// Level/category progress. Writes use monotonic operators so concurrent
/// evaluations for one user cannot lower `best_score` or clear `passed_at`.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn find_for_user(&self, user_id: &str) -> AppResult<Vec<ProgressRecord>>;
    async fn find_one(&self, user_id: &str, scope: &ProgressScope) -> AppResult<Option<ProgressRecord>>;
    async fn record_evaluation(
        &self,
        user_id: &str,
        scope: &ProgressScope,
        score: f64,
        passed: bool,
        at: DateTime<Utc>,
    ) -> AppResult<()>;
    async fn unlock(&self, user_id: &str, scope: &ProgressScope, at: DateTime<Utc>) -> AppResult<()>;
}

#[async_trait]
pub trait ConceptProgressRepository: Send + Sync {
    async fn record_performance(
        &self,
        user_id: &str,
        performance: &[ConceptPerformance],
        at: DateTime<Utc>,
    ) -> AppResult<()>;
    async fn find_for_user(&self, user_id: &str) -> AppResult<Vec<ConceptProgress>>;
}

pub struct MongoProgressRepository {
    collection: Collection<ProgressRecord>,
}

impl MongoProgressRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("progress_records");
        Self { collection }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for progress_records collection");

        let scope_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "scope_key": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_scope_unique".to_string())
                    .build(),
            )
            .build();

        self.collection.create_index(scope_index).await?;

        log::info!("Successfully created indexes for progress_records collection");
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for MongoProgressRepository {
    async fn find_for_user(&self, user_id: &str) -> AppResult<Vec<ProgressRecord>> {
        let records = self
            .collection
            .find(doc! { "user_id": user_id })
            .await?
            .try_collect()
            .await?;
        Ok(records)
    }

    async fn find_one(&self, user_id: &str, scope: &ProgressScope) -> AppResult<Option<ProgressRecord>> {
        let record = self
            .collection
            .find_one(doc! { "user_id": user_id, "scope_key": scope.key() })
            .await?;
        Ok(record)
    }

    async fn record_evaluation(
        &self,
        user_id: &str,
        scope: &ProgressScope,
        score: f64,
        passed: bool,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let at = to_bson(&at)?;
        let filter = doc! { "user_id": user_id, "scope_key": scope.key() };

        self.collection
            .update_one(
                filter.clone(),
                doc! {
                    "$max": { "best_score": score },
                    "$inc": { "attempts_count": 1_i64 },
                    "$set": {
                        "unlocked": true,
                        "last_attempt_at": at.clone(),
                        "modified_at": at.clone(),
                    },
                    "$setOnInsert": {
                        "scope": to_bson(scope)?,
                        "created_at": at.clone(),
                    },
                },
            )
            .upsert(true)
            .await?;

        if passed {
            // Set-if-null keeps the first pass timestamp.
            let mut first_pass = filter;
            first_pass.insert("passed_at", Bson::Null);
            self.collection
                .update_one(first_pass, doc! { "$set": { "passed_at": at } })
                .await?;
        }
        Ok(())
    }

    async fn unlock(&self, user_id: &str, scope: &ProgressScope, at: DateTime<Utc>) -> AppResult<()> {
        let at = to_bson(&at)?;
        self.collection
            .update_one(
                doc! { "user_id": user_id, "scope_key": scope.key() },
                doc! {
                    "$set": { "unlocked": true, "modified_at": at.clone() },
                    "$setOnInsert": {
                        "scope": to_bson(scope)?,
                        "best_score": 0.0,
                        "attempts_count": 0_i64,
                        "created_at": at,
                    },
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }
}

pub struct MongoConceptProgressRepository {
    collection: Collection<ConceptProgress>,
}

impl MongoConceptProgressRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("concept_progress");
        Self { collection }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for concept_progress collection");

        let concept_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "concept_id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_concept_unique".to_string())
                    .build(),
            )
            .build();

        self.collection.create_index(concept_index).await?;

        log::info!("Successfully created indexes for concept_progress collection");
        Ok(())
    }
}

#[async_trait]
impl ConceptProgressRepository for MongoConceptProgressRepository {
    async fn record_performance(
        &self,
        user_id: &str,
        performance: &[ConceptPerformance],
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let at = to_bson(&at)?;
        for entry in performance {
            let correct: i64 = if entry.correct { 1 } else { 0 };
            // Pipeline update so mastery is derived from the counters in the
            // same atomic write.
            let pipeline = vec![
                doc! {
                    "$set": {
                        "times_seen": { "$add": [{ "$ifNull": ["$times_seen", 0] }, 1] },
                        "times_correct": { "$add": [{ "$ifNull": ["$times_correct", 0] }, correct] },
                        "last_seen_at": at.clone(),
                    }
                },
                doc! {
                    "$set": {
                        "mastery_score": { "$divide": ["$times_correct", "$times_seen"] },
                    }
                },
                doc! {
                    "$set": {
                        "is_weak_area": {
                            "$and": [
                                { "$gte": ["$times_seen", WEAK_AREA_MIN_SEEN as i64] },
                                { "$lt": ["$mastery_score", WEAK_AREA_MASTERY_THRESHOLD] },
                            ]
                        },
                    }
                },
            ];

            self.collection
                .update_one(
                    doc! { "user_id": user_id, "concept_id": &entry.concept_id },
                    pipeline,
                )
                .upsert(true)
                .await?;
        }
        Ok(())
    }

    async fn find_for_user(&self, user_id: &str) -> AppResult<Vec<ConceptProgress>> {
        let records = self
            .collection
            .find(doc! { "user_id": user_id })
            .await?
            .try_collect()
            .await?;
        Ok(records)
    }
}
