//! Essay questions. Only a human can grade these.

use serde::{Deserialize, Serialize};

use super::{default_mark, field, QuestionDefinition};
use crate::behaviour::BehaviourKind;
use crate::error::EngineError;
use crate::state::QuestionState;
use crate::step::Response;

/// A free-text question graded by a teacher comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssayQuestion {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_mark")]
    pub default_mark: f64,
    /// Guidance shown to graders.
    #[serde(default)]
    pub grader_info: String,
}

impl QuestionDefinition for EssayQuestion {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn qtype(&self) -> &'static str {
        "essay"
    }

    fn default_mark(&self) -> f64 {
        self.default_mark
    }

    fn expected_data(&self) -> Vec<String> {
        vec!["answer".to_string()]
    }

    fn is_complete_response(&self, response: &Response) -> bool {
        field(response, "answer").is_some()
    }

    fn is_same_response(&self, a: &Response, b: &Response) -> bool {
        a.get("answer").map(String::as_str).unwrap_or("")
            == b.get("answer").map(String::as_str).unwrap_or("")
    }

    fn grade_response(&self, _response: &Response) -> Result<(f64, QuestionState), EngineError> {
        Err(EngineError::GradingFault {
            question: self.id.clone(),
            reason: "essay responses must be graded manually".into(),
        })
    }

    fn summarise_response(&self, response: &Response) -> Option<String> {
        field(response, "answer").map(str::to_string)
    }

    fn correct_response(&self) -> Response {
        Response::new()
    }

    fn is_automatically_gradable(&self) -> bool {
        false
    }

    fn make_behaviour_kind(&self, _preferred: BehaviourKind) -> BehaviourKind {
        BehaviourKind::ManualGraded
    }
}
