pub mod attempt;
pub mod blueprint;
pub mod exam;
pub mod progress;
pub mod question;

pub use attempt::{Attempt, AttemptResult, AttemptStatus, OptionMapping};
pub use blueprint::{Blueprint, BossTier};
pub use exam::{ExamSpec, ExamType};
pub use progress::{ConceptProgress, ConceptRef, ProgressRecord, ProgressScope};
pub use question::{Question, QuestionOption, QuestionTags};
