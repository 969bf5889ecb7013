use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    #[validate(length(min = 1, max = 100))]
    pub question_id: String,

    #[validate(length(min = 1, max = 100))]
    pub selected_option_id: String,

    #[validate(range(max = 86400))]
    pub time_spent_sec: Option<u32>,

    #[serde(default)]
    pub is_flagged: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmittedAnswer {
    #[validate(length(min = 1, max = 100))]
    pub question_id: String,

    #[validate(length(min = 1, max = 100))]
    pub selected_option_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    #[validate(length(min = 1, max = 100))]
    pub attempt_id: String,

    /// Answers in shuffled option ids. Merged over answers recorded earlier.
    #[serde(default)]
    #[validate(nested)]
    pub answers: Vec<SubmittedAnswer>,

    #[validate(range(max = 86400))]
    pub time_spent_sec: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PauseAttemptRequest {
    #[validate(range(max = 86400))]
    pub time_remaining_sec: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_request_rejects_empty_attempt_id() {
        let request = SubmitAttemptRequest {
            attempt_id: String::new(),
            answers: vec![],
            time_spent_sec: None,
        };

        assert!(request.validate().is_err());
    }

    #[test]
    fn submit_request_validates_nested_answers() {
        let request: SubmitAttemptRequest = serde_json::from_str(
            r#"{"attempt_id": "a-1", "answers": [{"question_id": "q1", "selected_option_id": ""}]}"#,
        )
        .expect("request should deserialize");

        assert!(request.validate().is_err());
    }

    #[test]
    fn record_answer_defaults_flag_to_false() {
        let request: RecordAnswerRequest =
            serde_json::from_str(r#"{"question_id": "q1", "selected_option_id": "B"}"#)
                .expect("request should deserialize");

        assert!(!request.is_flagged);
        assert!(request.validate().is_ok());
    }
}
