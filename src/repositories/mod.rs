pub mod attempt_repository;
pub mod concept_repository;
pub mod exam_repository;
pub mod progress_repository;

pub use attempt_repository::{AttemptRepository, EvaluationWrite, MongoAttemptRepository};
pub use concept_repository::{
    ConceptCatalog, ConceptScope, MongoConceptCatalog, MongoRemediationNotifier,
    RemediationNotifier,
};
pub use exam_repository::{ExamRepository, MongoExamRepository};
pub use progress_repository::{
    ConceptProgressRepository, MongoConceptProgressRepository, MongoProgressRepository,
    ProgressRepository,
};
