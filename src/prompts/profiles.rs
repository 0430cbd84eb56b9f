//! Profile-specific template fragments.
//!
//! Each neurodiversity variant contributes tone, verbosity, structural hints
//! and one few-shot example. The fragments plug into the single adaptation
//! prompt in [`super::adaptation`], so every variant yields the same payload
//! shape and providers never need to know which profile produced it.
//!
//! Each template includes:
//! - A tone instruction for the rewritten text
//! - A verbosity level
//! - Structural hints (how to break up and order the content)
//! - A worked example (input fragment and expected JSON output)

use crate::request::NeurodiversityType;

/// How much wording the rewrite should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Concise,
    Detailed,
}

impl Verbosity {
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Minimal => "Use as few words as possible. One idea per sentence.",
            Self::Concise => "Keep sentences short and direct. Remove filler words.",
            Self::Detailed => {
                "Be explicit and complete. State every expectation, even ones that seem obvious."
            }
        }
    }
}

/// Template fragment for one neurodiversity variant.
#[derive(Debug, Clone)]
pub struct ProfileTemplate {
    pub kind: NeurodiversityType,
    /// Tone instruction for the rewritten text.
    pub tone: &'static str,
    pub verbosity: Verbosity,
    /// Structural hints listed to the provider.
    pub structural_hints: &'static [&'static str],
    /// Example assignment fragment.
    pub example_input: &'static str,
    /// Expected JSON answer for `example_input`.
    pub example_output: &'static str,
}

/// Static array of all profile templates.
pub static PROFILE_TEMPLATES: &[ProfileTemplate] = &[
    // ==========================================================================
    // DYSLEXIA
    // ==========================================================================
    ProfileTemplate {
        kind: NeurodiversityType::Dyslexia,
        tone: "Warm, plain and encouraging. Prefer common words over jargon; when a technical term is required, define it once in simple words.",
        verbosity: Verbosity::Concise,
        structural_hints: &[
            "Short paragraphs of at most the allowed sentences",
            "Put the most important instruction first in each section",
            "Use bullet points instead of long comma-separated lists",
            "Keep code identifiers exactly as written and put them in their own code section",
            "Add emphasis hints for words that are easy to misread",
        ],
        example_input: "Implement a function that, given an unsorted vector of integers, returns the second largest distinct value, or None if it doesn't exist.",
        example_output: r#"{"sections":[{"type":"overview","body":"You will write one function. It finds the second biggest number in a list."},{"type":"requirement","title":"What to return","body":"Return the second biggest number. Each number counts once, even if it appears twice. Return None if there is no second biggest number."},{"type":"code","title":"Function name","body":"second_largest(values: Vec<i32>) -> Option<i32>"}],"complexity":"low","visual_hints":{"emphasis":["second biggest","None"],"numbered_steps":false},"focus_areas":["edge cases"]}"#,
    },
    // ==========================================================================
    // AUTISM
    // ==========================================================================
    ProfileTemplate {
        kind: NeurodiversityType::Autism,
        tone: "Literal, precise and neutral. Never use idioms, metaphors, sarcasm or implied expectations. Say exactly what is required and what is optional.",
        verbosity: Verbosity::Detailed,
        structural_hints: &[
            "Separate required work from optional work explicitly",
            "State exact inputs, outputs and constraints for every requirement",
            "Replace vague words (\"some\", \"a few\", \"reasonable\") with concrete values when the assignment gives them",
            "List steps in the order they must be done",
            "End with a checklist the learner can verify their work against",
        ],
        example_input: "Write a small CLI that reads a CSV file and prints some basic stats. Make it reasonably fast.",
        example_output: r#"{"sections":[{"type":"overview","body":"Write a command-line program. The program reads one CSV file and prints statistics about it."},{"type":"requirement","title":"Required output","body":"Print the number of rows and the number of columns. The assignment does not name other statistics, so any further statistics are optional."},{"type":"requirement","title":"Speed","body":"The assignment says \"reasonably fast\" but gives no number. Ask the instructor for a time limit if you need one."},{"type":"checklist","body":"- The program accepts a file path argument\n- The program prints the row count\n- The program prints the column count"}],"complexity":"moderate","visual_hints":{"numbered_steps":true},"focus_areas":["requirements"]}"#,
    },
    // ==========================================================================
    // ADHD
    // ==========================================================================
    ProfileTemplate {
        kind: NeurodiversityType::Adhd,
        tone: "Energetic, direct and action-oriented. Start each section with a verb. Make progress visible.",
        verbosity: Verbosity::Minimal,
        structural_hints: &[
            "Break the work into small numbered steps that each take under 15 minutes",
            "Start with a one-sentence overview of the goal",
            "Mark a natural break point after every two or three steps",
            "Put hints in their own short sections so they can be skipped",
            "Finish with a short summary of what done looks like",
        ],
        example_input: "Refactor the inventory module to use a HashMap instead of a Vec, update all callers, and add tests for lookup and removal.",
        example_output: r#"{"sections":[{"type":"overview","body":"Goal: swap the Vec in the inventory module for a HashMap."},{"type":"step","title":"Step 1","body":"Change the storage field to a HashMap."},{"type":"step","title":"Step 2","body":"Fix every caller until the project builds."},{"type":"step","title":"Step 3","body":"Add a test for lookup. Add a test for removal."},{"type":"summary","body":"Done when the project builds and both new tests pass."}],"complexity":"moderate","visual_hints":{"numbered_steps":true,"break_after":[2]},"focus_areas":["testing"]}"#,
    },
    // ==========================================================================
    // CUSTOM
    // ==========================================================================
    ProfileTemplate {
        kind: NeurodiversityType::Custom,
        tone: "Follow the learner's custom instructions for tone. Where they say nothing, be clear and neutral.",
        verbosity: Verbosity::Concise,
        structural_hints: &[
            "Apply the learner's custom instructions before any default structure",
            "Keep every requirement from the original assignment",
            "Use sections so the renderer can lay the content out",
        ],
        example_input: "Create a REST endpoint that returns the list of users sorted by signup date.",
        example_output: r#"{"sections":[{"type":"overview","body":"Add one REST endpoint that lists users."},{"type":"requirement","body":"Sort the users by signup date."}],"complexity":"low","visual_hints":{},"focus_areas":[]}"#,
    },
];

/// Returns the template for a neurodiversity variant.
pub fn template_for(kind: NeurodiversityType) -> &'static ProfileTemplate {
    PROFILE_TEMPLATES
        .iter()
        .find(|t| t.kind == kind)
        .unwrap_or(&PROFILE_TEMPLATES[PROFILE_TEMPLATES.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_has_a_template() {
        for kind in [
            NeurodiversityType::Dyslexia,
            NeurodiversityType::Autism,
            NeurodiversityType::Adhd,
            NeurodiversityType::Custom,
        ] {
            assert_eq!(template_for(kind).kind, kind);
        }
    }

    #[test]
    fn test_templates_have_hints() {
        for template in PROFILE_TEMPLATES {
            assert!(!template.tone.is_empty());
            assert!(!template.structural_hints.is_empty());
        }
    }

    #[test]
    fn test_example_outputs_are_valid_json() {
        for template in PROFILE_TEMPLATES {
            let value: serde_json::Value = serde_json::from_str(template.example_output)
                .unwrap_or_else(|e| panic!("{:?} example is not JSON: {}", template.kind, e));
            let sections = value["sections"].as_array().expect("sections array");
            assert!(!sections.is_empty());
            assert!(value["complexity"].is_string());
        }
    }
}
