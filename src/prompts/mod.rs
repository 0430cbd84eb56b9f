//! Prompt templates for assignment adaptation.
//!
//! # Architecture
//!
//! - [`profiles`] - Per-neurodiversity tone, verbosity, structure and examples
//! - [`adaptation`] - The single adaptation prompt every profile plugs into
//!
//! Rendering produces a provider-agnostic [`PromptPayload`]; adapters turn it
//! into their own wire format.
//!
//! # Usage
//!
//! ```no_run
//! use neuroadapt::prompts::render;
//! use neuroadapt::request::{
//!     AssignmentSnapshot, BlockKind, LearnerProfile, NeurodiversityType, ProjectContext,
//! };
//!
//! let payload = render(
//!     &LearnerProfile::new(NeurodiversityType::Adhd),
//!     &AssignmentSnapshot::new("Stacks").with_block(BlockKind::Paragraph, "Implement a stack."),
//!     &ProjectContext::new("rust"),
//! )
//! .expect("renderable input");
//! let messages = payload.to_messages();
//! ```

pub mod adaptation;
pub mod profiles;

pub use adaptation::render;
pub use profiles::{template_for, ProfileTemplate, Verbosity, PROFILE_TEMPLATES};

use serde::Serialize;

use crate::error::ValidationError;
use crate::llm::Message;

/// A few-shot example pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptExample {
    pub input: String,
    pub output: String,
}

impl PromptExample {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Provider-agnostic rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPayload {
    pub system: String,
    pub user: String,
    pub examples: Vec<PromptExample>,
}

impl PromptPayload {
    pub fn new(system: String, user: String, examples: Vec<PromptExample>) -> Self {
        Self {
            system,
            user,
            examples,
        }
    }

    /// Full chat transcript: system, example pairs, then the user turn.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2 + self.examples.len() * 2);
        messages.push(Message::system(self.system.clone()));
        messages.extend(self.conversation_messages());
        messages
    }

    /// Transcript without the system turn, for APIs that take the system
    /// prompt separately.
    pub fn conversation_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(1 + self.examples.len() * 2);
        for example in &self.examples {
            messages.push(Message::user(example.input.clone()));
            messages.push(Message::assistant(example.output.clone()));
        }
        messages.push(Message::user(self.user.clone()));
        messages
    }

    /// Copy of this payload asking the provider to fix the listed issues.
    pub fn with_repair_note(&self, error: &ValidationError) -> Self {
        let issues = error
            .issues
            .iter()
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n");

        let mut repaired = self.clone();
        repaired.user = format!(
            "{}\n\n## CORRECTION REQUIRED\n\nYour previous answer was rejected because of these problems:\n{}\n\nAnswer again with a complete JSON object that fixes every problem listed.",
            self.user, issues
        );
        repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldIssue;

    fn payload() -> PromptPayload {
        PromptPayload::new(
            "system text".into(),
            "user text".into(),
            vec![PromptExample::new("in", "out")],
        )
    }

    #[test]
    fn test_to_messages_order() {
        let messages = payload().to_messages();
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[3].content, "user text");
    }

    #[test]
    fn test_conversation_messages_skip_system() {
        let messages = payload().conversation_messages();
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.role != "system"));
    }

    #[test]
    fn test_repair_note_lists_issues() {
        let error = ValidationError::new(vec![
            FieldIssue::new("sections[0].body", "empty"),
            FieldIssue::new("complexity", "missing"),
        ]);
        let repaired = payload().with_repair_note(&error);

        assert!(repaired.user.starts_with("user text"));
        assert!(repaired.user.contains("## CORRECTION REQUIRED"));
        assert!(repaired.user.contains("- sections[0].body: empty"));
        assert!(repaired.user.contains("- complexity: missing"));
        assert_eq!(repaired.system, "system text");
    }
}
