use std::sync::Arc;

use secrecy::SecretString;

use crate::{
    config::Config,
    db::Database,
    errors::AppResult,
    repositories::{
        MongoAttemptRepository, MongoConceptCatalog, MongoConceptProgressRepository,
        MongoExamRepository, MongoProgressRepository, MongoRemediationNotifier,
    },
    services::{
        AttemptService, GenerationOrchestrator, OpenAiQuestionGenerator, ProgressionGate,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub attempt_service: Arc<AttemptService>,
    pub db: Database,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        let db = Database::connect(&config).await?;

        let exam_repository = Arc::new(MongoExamRepository::new(&db));
        exam_repository.ensure_indexes().await?;

        let attempt_repository = Arc::new(MongoAttemptRepository::new(&db));
        attempt_repository.ensure_indexes().await?;

        let progress_repository = Arc::new(MongoProgressRepository::new(&db));
        progress_repository.ensure_indexes().await?;

        let concept_progress_repository = Arc::new(MongoConceptProgressRepository::new(&db));
        concept_progress_repository.ensure_indexes().await?;

        let concept_catalog = Arc::new(MongoConceptCatalog::new(&db));
        concept_catalog.ensure_indexes().await?;

        let remediation = Arc::new(MongoRemediationNotifier::new(&db));

        let api_key = config.openai_api_key.clone().unwrap_or_else(|| {
            log::warn!("OPENAI_API_KEY is not set, question generation will fail");
            SecretString::from(String::new())
        });
        let generator = Arc::new(OpenAiQuestionGenerator::new(&api_key, config.openai_model.clone()));

        let orchestrator = Arc::new(GenerationOrchestrator::new(
            generator,
            concept_catalog,
            exam_repository.clone(),
            config.generation_settings(),
        ));

        let gate = ProgressionGate::new(config.cooldown_policy(), config.premium_level_threshold);

        let attempt_service = Arc::new(AttemptService::new(
            exam_repository,
            attempt_repository,
            progress_repository,
            concept_progress_repository,
            remediation,
            orchestrator,
            gate,
        ));

        Ok(Self {
            attempt_service,
            db,
            config: Arc::new(config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_cloneable() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
