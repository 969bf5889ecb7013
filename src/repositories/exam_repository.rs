use async_trait::async_trait;
use chrono::Utc;
use mongodb::{
    bson::{doc, to_bson},
    options::IndexOptions,
    Collection, IndexModel,
};

use crate::{
    db::Database,
    errors::{AppError, AppResult},
    models::domain::{
        exam::{ExamSpec, GenerationConfig},
        question::Question,
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExamRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<ExamSpec>>;
    async fn create(&self, exam: ExamSpec) -> AppResult<ExamSpec>;
    /// Caches a generated question set on an exam that has none yet.
    /// Returns `false` when another set was stored first; a stored set is
    /// never replaced.
    async fn save_question_set(
        &self,
        exam_id: &str,
        questions: &[Question],
        system_instructions: &str,
        generation_config: &GenerationConfig,
    ) -> AppResult<bool>;
}

pub struct MongoExamRepository {
    collection: Collection<ExamSpec>,
}

impl MongoExamRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("exam_specs");
        Self { collection }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for exam_specs collection");

        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            )
            .build();

        let level_index = IndexModel::builder()
            .keys(doc! { "exam_type": 1, "level_number": 1 })
            .options(
                IndexOptions::builder()
                    .name("type_level".to_string())
                    .build(),
            )
            .build();

        self.collection.create_index(id_index).await?;
        self.collection.create_index(level_index).await?;

        log::info!("Successfully created indexes for exam_specs collection");
        Ok(())
    }
}

#[async_trait]
impl ExamRepository for MongoExamRepository {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<ExamSpec>> {
        let exam = self.collection.find_one(doc! { "id": id }).await?;
        Ok(exam)
    }

    async fn create(&self, exam: ExamSpec) -> AppResult<ExamSpec> {
        self.collection.insert_one(&exam).await?;
        Ok(exam)
    }

    async fn save_question_set(
        &self,
        exam_id: &str,
        questions: &[Question],
        system_instructions: &str,
        generation_config: &GenerationConfig,
    ) -> AppResult<bool> {
        let result = self
            .collection
            .update_one(
                doc! {
                    "id": exam_id,
                    "$or": [
                        { "question_set": null },
                        { "question_set": { "$size": 0 } },
                    ],
                },
                doc! {
                    "$set": {
                        "question_set": to_bson(questions)?,
                        "system_instructions": system_instructions,
                        "generation_config": to_bson(generation_config)?,
                        "modified_at": to_bson(&Utc::now())?,
                    }
                },
            )
            .await?;

        if result.matched_count == 1 {
            return Ok(true);
        }

        let exists = self.collection.find_one(doc! { "id": exam_id }).await?.is_some();
        if !exists {
            return Err(AppError::NotFound(format!("Exam {} not found", exam_id)));
        }
        Ok(false)
    }
}
