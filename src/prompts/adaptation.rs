//! Adaptation prompt rendering.
//!
//! Turns a learner profile, an assignment snapshot and a project context into
//! a [`PromptPayload`]. Rendering is deterministic: collections that have no
//! meaningful order are sorted, and nothing depends on clocks or randomness,
//! so identical inputs render byte-identical prompts.

use super::profiles::template_for;
use super::{PromptExample, PromptPayload};
use crate::content::{ComplexityLevel, SectionKind};
use crate::error::TemplateError;
use crate::request::{
    AssignmentSnapshot, NeurodiversityType, ProjectContext, LearnerProfile, ReadingLevel,
};

/// System prompt for assignment adaptation.
const ADAPTATION_SYSTEM_PROMPT: &str = r#"You rewrite programming assignments for neurodivergent learners ({profile} profile).

## YOUR ROLE

You restructure and reword the assignment so it is easier to read and act on, WITHOUT changing what is required:
1. Keep every requirement, constraint and deliverable from the original
2. Never add requirements that are not in the original
3. Keep code identifiers, file names and commands exactly as written

## TONE

{tone}

## LENGTH

{verbosity}

## STRUCTURE

{structure}

## OUTPUT FORMAT

You must output a JSON object:
{
  "sections": [
    {"type": "{section_types}", "title": "optional short title", "body": "section text"}
  ],
  "complexity": "{complexity_levels}",
  "visual_hints": {
    "emphasis": ["phrase"],
    "highlight_keywords": ["keyword"],
    "numbered_steps": true,
    "break_after": [1]
  },
  "focus_areas": ["topic"]
}

"sections" must contain at least one section, in reading order. Every section needs a "type" and a non-empty "body".

Output ONLY the JSON object. No additional text."#;

/// Render the adaptation prompt.
///
/// # Arguments
///
/// * `profile` - Learner profile snapshot
/// * `assignment` - Parsed assignment snapshot
/// * `context` - Project context snapshot
///
/// # Errors
///
/// Returns `TemplateError` when a field needed for templating is missing:
/// an empty title, no content blocks, a blank block, a blank language, or a
/// custom profile without custom instructions. An empty prompt is never
/// produced.
pub fn render(
    profile: &LearnerProfile,
    assignment: &AssignmentSnapshot,
    context: &ProjectContext,
) -> Result<PromptPayload, TemplateError> {
    check_inputs(profile, assignment, context)?;

    let template = template_for(profile.neurodiversity);

    let structure = template
        .structural_hints
        .iter()
        .map(|h| format!("- {}", h))
        .collect::<Vec<_>>()
        .join("\n");
    let section_types = SectionKind::ALL
        .iter()
        .map(SectionKind::as_str)
        .collect::<Vec<_>>()
        .join("|");
    let complexity_levels = ComplexityLevel::ALL
        .iter()
        .map(ComplexityLevel::as_str)
        .collect::<Vec<_>>()
        .join("|");

    let system = ADAPTATION_SYSTEM_PROMPT
        .replace("{profile}", profile.neurodiversity.as_str())
        .replace("{tone}", template.tone)
        .replace("{verbosity}", template.verbosity.instruction())
        .replace("{structure}", &structure)
        .replace("{section_types}", &section_types)
        .replace("{complexity_levels}", &complexity_levels);

    let user = format!(
        "{}\n\n{}\n\n{}{}\n\nProduce the adapted assignment as a JSON object now.",
        assignment_section(assignment),
        context_section(context),
        preferences_section(profile),
        custom_section(profile),
    );

    let examples = vec![PromptExample::new(
        template.example_input,
        template.example_output,
    )];

    Ok(PromptPayload::new(system, user, examples))
}

fn check_inputs(
    profile: &LearnerProfile,
    assignment: &AssignmentSnapshot,
    context: &ProjectContext,
) -> Result<(), TemplateError> {
    if assignment.title.trim().is_empty() {
        return Err(TemplateError::MissingField {
            source_name: "assignment",
            field: "title",
        });
    }
    if assignment.blocks.is_empty() {
        return Err(TemplateError::EmptyAssignment);
    }
    if let Some(index) = assignment.blocks.iter().position(|b| b.text.trim().is_empty()) {
        return Err(TemplateError::BlankBlock { index });
    }
    if context.language.trim().is_empty() {
        return Err(TemplateError::MissingField {
            source_name: "context",
            field: "language",
        });
    }
    if profile.neurodiversity == NeurodiversityType::Custom
        && profile
            .custom_instructions
            .as_deref()
            .map_or(true, |s| s.trim().is_empty())
    {
        return Err(TemplateError::MissingCustomInstructions);
    }
    Ok(())
}

fn assignment_section(assignment: &AssignmentSnapshot) -> String {
    let blocks = assignment
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let kind = serde_json::to_value(b.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            format!("{}. [{}] {}", i + 1, kind, b.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n");

    let course = assignment
        .course
        .as_deref()
        .map(|c| format!("**Course**: {}\n", c.trim()))
        .unwrap_or_default();

    format!(
        "## ASSIGNMENT\n\n**Title**: {}\n{}\n### Content\n\n{}",
        assignment.title.trim(),
        course,
        blocks
    )
}

fn context_section(context: &ProjectContext) -> String {
    let mut files: Vec<&str> = context.files.iter().map(String::as_str).collect();
    files.sort_unstable();
    files.dedup();
    let mut symbols: Vec<&str> = context.symbols.iter().map(String::as_str).collect();
    symbols.sort_unstable();
    symbols.dedup();

    let files = if files.is_empty() {
        "None listed".to_string()
    } else {
        files.join(", ")
    };
    let symbols = if symbols.is_empty() {
        "None listed".to_string()
    } else {
        symbols.join(", ")
    };
    let notes = context
        .notes
        .as_deref()
        .map(|n| format!("\n**Notes**: {}", n.trim()))
        .unwrap_or_default();

    format!(
        "## PROJECT CONTEXT\n\n**Language**: {}\n**Files**: {}\n**Symbols**: {}{}",
        context.language.trim().to_lowercase(),
        files,
        symbols,
        notes
    )
}

fn preferences_section(profile: &LearnerProfile) -> String {
    let prefs = &profile.preferences;

    let reading = match prefs.reading_level {
        ReadingLevel::Simple => "simple (short everyday words)",
        ReadingLevel::Standard => "standard",
        ReadingLevel::Advanced => "advanced (technical vocabulary is fine)",
    };

    let mut focus: Vec<String> = prefs
        .focus_areas
        .iter()
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect();
    focus.sort_unstable();
    focus.dedup();
    let focus = if focus.is_empty() {
        "None specified".to_string()
    } else {
        focus.join(", ")
    };

    format!(
        "## LEARNER PREFERENCES\n\n\
         - Reading level: {}\n\
         - At most {} sentences per section\n\
         - Worked examples: {}\n\
         - Checklists for requirements: {}\n\
         - Strictly literal language: {}\n\
         - Focus areas: {}",
        reading,
        prefs.chunk_size.max_sentences(),
        yes_no(prefs.include_examples),
        yes_no(prefs.use_checklists),
        yes_no(prefs.literal_language),
        focus
    )
}

fn custom_section(profile: &LearnerProfile) -> String {
    match profile.custom_instructions.as_deref().map(str::trim) {
        Some(instructions) if !instructions.is_empty() => {
            format!("\n\n## CUSTOM INSTRUCTIONS\n\n{}", instructions)
        }
        _ => String::new(),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{BlockKind, ChunkSize, StylePreferences};

    fn assignment() -> AssignmentSnapshot {
        AssignmentSnapshot::new("Word count")
            .with_course("CS101")
            .with_block(BlockKind::Paragraph, "Count the words in a file.")
            .with_block(BlockKind::Requirement, "Ignore punctuation.")
    }

    fn context() -> ProjectContext {
        ProjectContext::new("Python")
            .with_file("wc.py")
            .with_file("README.md")
            .with_symbol("count_words")
    }

    #[test]
    fn test_render_includes_assignment_and_context() {
        let profile = LearnerProfile::new(NeurodiversityType::Dyslexia);
        let payload = render(&profile, &assignment(), &context()).expect("renders");

        assert!(payload.system.contains("dyslexia profile"));
        assert!(payload.system.contains("Output ONLY the JSON object"));
        assert!(payload.user.contains("**Title**: Word count"));
        assert!(payload.user.contains("**Course**: CS101"));
        assert!(payload.user.contains("2. [requirement] Ignore punctuation."));
        assert!(payload.user.contains("**Language**: python"));
        assert!(payload.user.contains("**Files**: README.md, wc.py"));
        assert_eq!(payload.examples.len(), 1);
    }

    #[test]
    fn test_render_is_deterministic() {
        let profile = LearnerProfile::new(NeurodiversityType::Adhd);
        let a = render(&profile, &assignment(), &context()).expect("renders");
        let b = render(&profile, &assignment(), &context()).expect("renders");
        assert_eq!(a, b);
    }

    #[test]
    fn test_variants_share_payload_schema() {
        let variants = [
            LearnerProfile::new(NeurodiversityType::Dyslexia),
            LearnerProfile::new(NeurodiversityType::Autism),
            LearnerProfile::new(NeurodiversityType::Adhd),
            LearnerProfile::new(NeurodiversityType::Custom)
                .with_custom_instructions("Use British spelling."),
        ];

        for profile in &variants {
            let payload = render(profile, &assignment(), &context()).expect("renders");
            assert!(payload.system.contains("\"sections\""));
            assert!(payload.user.contains("## LEARNER PREFERENCES"));
            assert_eq!(payload.examples.len(), 1);
        }

        let custom = render(&variants[3], &assignment(), &context()).expect("renders");
        assert!(custom.user.contains("Use British spelling."));
    }

    #[test]
    fn test_preferences_rendered() {
        let prefs = StylePreferences {
            chunk_size: ChunkSize::Small,
            literal_language: true,
            focus_areas: vec!["Testing".into(), "loops".into(), "testing ".into()],
            ..StylePreferences::default()
        };
        let profile = LearnerProfile::new(NeurodiversityType::Autism).with_preferences(prefs);
        let payload = render(&profile, &assignment(), &context()).expect("renders");

        assert!(payload.user.contains("At most 2 sentences per section"));
        assert!(payload.user.contains("Strictly literal language: yes"));
        assert!(payload.user.contains("Focus areas: loops, testing"));
    }

    #[test]
    fn test_render_rejects_empty_assignment() {
        let profile = LearnerProfile::new(NeurodiversityType::Adhd);
        let empty = AssignmentSnapshot::new("Nothing here");

        assert_eq!(
            render(&profile, &empty, &context()),
            Err(TemplateError::EmptyAssignment)
        );
    }

    #[test]
    fn test_render_rejects_missing_title_and_blank_block() {
        let profile = LearnerProfile::new(NeurodiversityType::Adhd);

        let untitled = AssignmentSnapshot::new("  ").with_block(BlockKind::Paragraph, "text");
        assert!(matches!(
            render(&profile, &untitled, &context()),
            Err(TemplateError::MissingField { field: "title", .. })
        ));

        let blank = AssignmentSnapshot::new("Title")
            .with_block(BlockKind::Paragraph, "text")
            .with_block(BlockKind::List, "   ");
        assert_eq!(
            render(&profile, &blank, &context()),
            Err(TemplateError::BlankBlock { index: 1 })
        );
    }

    #[test]
    fn test_render_rejects_missing_language() {
        let profile = LearnerProfile::new(NeurodiversityType::Dyslexia);
        assert!(matches!(
            render(&profile, &assignment(), &ProjectContext::new("")),
            Err(TemplateError::MissingField { field: "language", .. })
        ));
    }

    #[test]
    fn test_custom_profile_requires_instructions() {
        let profile = LearnerProfile::new(NeurodiversityType::Custom);
        assert_eq!(
            render(&profile, &assignment(), &context()),
            Err(TemplateError::MissingCustomInstructions)
        );
    }
}
