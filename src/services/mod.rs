pub mod assessment_service;
pub mod attempt_service;
pub mod composition_validator;
pub mod generation_orchestrator;
pub mod option_shuffler;
pub mod progression_gate;
pub mod question_generator;

pub use assessment_service::AssessmentService;
pub use attempt_service::{AttemptService, ExamUser};
pub use generation_orchestrator::{GenerationOrchestrator, GenerationSettings};
pub use progression_gate::{CooldownPolicy, ProgressionGate};
pub use question_generator::{OpenAiQuestionGenerator, QuestionGenerator};
