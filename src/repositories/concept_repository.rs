use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{bson::doc, options::IndexOptions, Collection, IndexModel};

use crate::{
    db::Database,
    errors::AppResult,
    models::domain::progress::{ConceptRef, RemediationRequest},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConceptScope {
    Levels(Vec<u32>),
    Category(String),
}

/// Read side of the content catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConceptCatalog: Send + Sync {
    async fn concepts_for_scope(&self, scope: &ConceptScope) -> AppResult<Vec<ConceptRef>>;
}

/// Receives failed concepts so a study plan can be built. Fire and forget.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemediationNotifier: Send + Sync {
    async fn notify(&self, request: RemediationRequest) -> AppResult<()>;
}

pub struct MongoConceptCatalog {
    collection: Collection<ConceptRef>,
}

impl MongoConceptCatalog {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("concepts");
        Self { collection }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for concepts collection");

        let level_index = IndexModel::builder()
            .keys(doc! { "level_number": 1 })
            .options(IndexOptions::builder().name("level_number".to_string()).build())
            .build();

        let category_index = IndexModel::builder()
            .keys(doc! { "category_id": 1 })
            .options(IndexOptions::builder().name("category_id".to_string()).build())
            .build();

        self.collection.create_index(level_index).await?;
        self.collection.create_index(category_index).await?;

        log::info!("Successfully created indexes for concepts collection");
        Ok(())
    }
}

#[async_trait]
impl ConceptCatalog for MongoConceptCatalog {
    async fn concepts_for_scope(&self, scope: &ConceptScope) -> AppResult<Vec<ConceptRef>> {
        let filter = match scope {
            ConceptScope::Levels(levels) => {
                let levels: Vec<i64> = levels.iter().map(|l| *l as i64).collect();
                doc! { "level_number": { "$in": levels } }
            }
            ConceptScope::Category(category_id) => doc! { "category_id": category_id },
        };

        let concepts = self
            .collection
            .find(filter)
            .sort(doc! { "id": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(concepts)
    }
}

pub struct MongoRemediationNotifier {
    collection: Collection<RemediationRequest>,
}

impl MongoRemediationNotifier {
    pub fn new(db: &Database) -> Self {
        let collection = db.get_collection("remediation_requests");
        Self { collection }
    }
}

#[async_trait]
impl RemediationNotifier for MongoRemediationNotifier {
    async fn notify(&self, request: RemediationRequest) -> AppResult<()> {
        log::info!(
            "Queueing remediation for user {} on {} concepts (attempt {})",
            request.user_id,
            request.failed_concept_ids.len(),
            request.attempt_id
        );
        self.collection.insert_one(&request).await?;
        Ok(())
    }
}
