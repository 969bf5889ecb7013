pub mod exam_prompts;
