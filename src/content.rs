//! Validated adapted-content model.
//!
//! [`AdaptedContent`] is the only type handed to the renderer. It can only be
//! constructed by the response validator, so holding one means the provider
//! output passed every schema check.

use serde::{Deserialize, Serialize};

/// Type tag of a content section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Overview,
    Step,
    Requirement,
    Example,
    Hint,
    Checklist,
    Code,
    Summary,
}

impl SectionKind {
    /// Every known tag, in the order they are listed to providers.
    pub const ALL: [SectionKind; 8] = [
        SectionKind::Overview,
        SectionKind::Step,
        SectionKind::Requirement,
        SectionKind::Example,
        SectionKind::Hint,
        SectionKind::Checklist,
        SectionKind::Code,
        SectionKind::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Step => "step",
            Self::Requirement => "requirement",
            Self::Example => "example",
            Self::Hint => "hint",
            Self::Checklist => "checklist",
            Self::Code => "code",
            Self::Summary => "summary",
        }
    }

    /// Parse an exact lowercase tag.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

/// One ordered section of adapted assignment text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentSection {
    pub kind: SectionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
}

/// Presentation hints the renderer may honour.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualHints {
    /// Phrases to emphasise.
    pub emphasis: Vec<String>,
    /// Keywords to highlight wherever they appear.
    pub highlight_keywords: Vec<String>,
    /// Render step sections as a numbered list.
    pub numbered_steps: bool,
    /// Section indices after which a visual break is suggested.
    pub break_after: Vec<usize>,
}

/// Provider's assessment of the assignment's complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl ComplexityLevel {
    pub const ALL: [ComplexityLevel; 4] = [
        ComplexityLevel::Low,
        ComplexityLevel::Moderate,
        ComplexityLevel::High,
        ComplexityLevel::VeryHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

/// Validated, schema-conformant adaptation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdaptedContent {
    sections: Vec<ContentSection>,
    visual_hints: VisualHints,
    complexity: ComplexityLevel,
    focus_areas: Vec<String>,
}

impl AdaptedContent {
    /// Only the validator builds content; `sections` is guaranteed non-empty.
    pub(crate) fn new(
        sections: Vec<ContentSection>,
        visual_hints: VisualHints,
        complexity: ComplexityLevel,
        focus_areas: Vec<String>,
    ) -> Self {
        debug_assert!(!sections.is_empty());
        Self {
            sections,
            visual_hints,
            complexity,
            focus_areas,
        }
    }

    pub fn sections(&self) -> &[ContentSection] {
        &self.sections
    }

    pub fn visual_hints(&self) -> &VisualHints {
        &self.visual_hints
    }

    pub fn complexity(&self) -> ComplexityLevel {
        self.complexity
    }

    pub fn focus_areas(&self) -> &[String] {
        &self.focus_areas
    }

    /// Sections of the given kind, in order.
    pub fn sections_of(&self, kind: SectionKind) -> impl Iterator<Item = &ContentSection> {
        self.sections.iter().filter(move |s| s.kind == kind)
    }

    /// Total characters across all section bodies.
    pub fn body_len(&self) -> usize {
        self.sections.iter().map(|s| s.body.len()).sum()
    }
}
