use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson},
    options::IndexOptions,
    Collection, IndexModel,
};

use crate::{
    db::{is_duplicate_key, Database},
    errors::{AppError, AppResult},
    models::domain::attempt::{Attempt, AttemptResult, AttemptStatus, RecordedAnswer},
};

/// Fields written by the single evaluation update.
#[derive(Debug, Clone)]
pub struct EvaluationWrite {
    pub answers: HashMap<String, RecordedAnswer>,
    pub submitted_at: DateTime<Utc>,
    pub evaluated_at: DateTime<Utc>,
    pub time_spent_sec: Option<u32>,
    pub result: AttemptResult,
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Fails with a conflict when the (user, exam, attempt number) slot is taken.
    async fn create(&self, attempt: Attempt) -> AppResult<Attempt>;
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Attempt>>;
    async fn find_by_user_and_exam(&self, user_id: &str, exam_id: &str) -> AppResult<Vec<Attempt>>;
    async fn find_in_progress(&self, user_id: &str, exam_id: &str) -> AppResult<Option<Attempt>>;
    /// Returns false when the attempt is no longer in progress.
    async fn record_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        answer: RecordedAnswer,
    ) -> AppResult<bool>;
    async fn pause(
        &self,
        attempt_id: &str,
        time_remaining_sec: u32,
        paused_at: DateTime<Utc>,
    ) -> AppResult<bool>;
    /// Compare-and-set from IN_PROGRESS to EVALUATED. Exactly one caller
    /// observes `true` for a given attempt.
    async fn mark_evaluated(&self, attempt_id: &str, write: EvaluationWrite) -> AppResult<bool>;
}

pub struct MongoAttemptRepository {
    collection: Collection<Attempt>,
}

impl MongoAttemptRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("exam_attempts");
        Self { collection }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for exam_attempts collection");

        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            )
            .build();

        let attempt_number_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "exam_id": 1, "attempt_number": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_exam_attempt_number".to_string())
                    .build(),
            )
            .build();

        let status_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "exam_id": 1, "status": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_exam_status".to_string())
                    .build(),
            )
            .build();

        self.collection.create_index(id_index).await?;
        self.collection.create_index(attempt_number_index).await?;
        self.collection.create_index(status_index).await?;

        log::info!("Successfully created indexes for exam_attempts collection");
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for MongoAttemptRepository {
    async fn create(&self, attempt: Attempt) -> AppResult<Attempt> {
        match self.collection.insert_one(&attempt).await {
            Ok(_) => Ok(attempt),
            Err(err) if is_duplicate_key(&err) => Err(AppError::conflict(format!(
                "Attempt {} for exam {} already exists",
                attempt.attempt_number, attempt.exam_id
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Attempt>> {
        let attempt = self.collection.find_one(doc! { "id": id }).await?;
        Ok(attempt)
    }

    async fn find_by_user_and_exam(&self, user_id: &str, exam_id: &str) -> AppResult<Vec<Attempt>> {
        let attempts = self
            .collection
            .find(doc! {
                "user_id": user_id,
                "exam_id": exam_id
            })
            .sort(doc! { "attempt_number": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(attempts)
    }

    async fn find_in_progress(&self, user_id: &str, exam_id: &str) -> AppResult<Option<Attempt>> {
        let attempt = self
            .collection
            .find_one(doc! {
                "user_id": user_id,
                "exam_id": exam_id,
                "status": AttemptStatus::InProgress.as_str()
            })
            .sort(doc! { "attempt_number": -1 })
            .await?;
        Ok(attempt)
    }

    async fn record_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        answer: RecordedAnswer,
    ) -> AppResult<bool> {
        let mut set = doc! { "modified_at": to_bson(&Utc::now())? };
        set.insert(format!("answers.{}", question_id), to_bson(&answer)?);

        let result = self
            .collection
            .update_one(
                doc! { "id": attempt_id, "status": AttemptStatus::InProgress.as_str() },
                doc! { "$set": set },
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn pause(
        &self,
        attempt_id: &str,
        time_remaining_sec: u32,
        paused_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "id": attempt_id, "status": AttemptStatus::InProgress.as_str() },
                doc! {
                    "$set": {
                        "time_remaining_sec": time_remaining_sec as i64,
                        "paused_at": to_bson(&paused_at)?,
                        "modified_at": to_bson(&paused_at)?,
                    }
                },
            )
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn mark_evaluated(&self, attempt_id: &str, write: EvaluationWrite) -> AppResult<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "id": attempt_id, "status": AttemptStatus::InProgress.as_str() },
                doc! {
                    "$set": {
                        "status": AttemptStatus::Evaluated.as_str(),
                        "answers": to_bson(&write.answers)?,
                        "submitted_at": to_bson(&write.submitted_at)?,
                        "evaluated_at": to_bson(&write.evaluated_at)?,
                        "time_spent_sec": to_bson(&write.time_spent_sec)?,
                        "result": to_bson(&write.result)?,
                        "modified_at": to_bson(&write.evaluated_at)?,
                    }
                },
            )
            .await?;
        Ok(result.matched_count == 1)
    }
}
