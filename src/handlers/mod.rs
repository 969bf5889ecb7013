pub mod exam_handler;
pub mod health_handler;

pub use exam_handler::configure;
pub use health_handler::{health_check, health_check_ready};
