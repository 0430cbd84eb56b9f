//! Adaptation request model.
//!
//! An [`AdaptationRequest`] bundles the snapshots handed over by the editor's
//! collaborators (learner profile store, assignment parser, project context
//! collector) together with generation parameters. It is built once per user
//! action and never mutated afterwards.
//!
//! Fields marked as volatile (timestamps, request ids, cosmetic profile
//! metadata) are carried for tracing only and never influence the
//! fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::ProviderId;

/// Neurodiversity profile variant selecting the prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeurodiversityType {
    Dyslexia,
    Autism,
    Adhd,
    Custom,
}

impl NeurodiversityType {
    /// Stable lowercase name used in prompts and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dyslexia => "dyslexia",
            Self::Autism => "autism",
            Self::Adhd => "adhd",
            Self::Custom => "custom",
        }
    }
}

/// Target reading level for rewritten text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingLevel {
    Simple,
    #[default]
    Standard,
    Advanced,
}

/// Preferred size of each chunk of instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl ChunkSize {
    /// Rough upper bound of sentences per section for this chunk size.
    pub fn max_sentences(&self) -> usize {
        match self {
            Self::Small => 2,
            Self::Medium => 4,
            Self::Large => 7,
        }
    }
}

/// Style and content preferences from the learner profile store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StylePreferences {
    pub reading_level: ReadingLevel,
    pub chunk_size: ChunkSize,
    /// Include worked examples next to requirements.
    pub include_examples: bool,
    /// Turn requirements into checklists.
    pub use_checklists: bool,
    /// Avoid idioms, metaphors and implied instructions.
    pub literal_language: bool,
    /// Topics the learner wants emphasised (e.g. "testing", "edge cases").
    pub focus_areas: Vec<String>,
}

impl Default for StylePreferences {
    fn default() -> Self {
        Self {
            reading_level: ReadingLevel::Standard,
            chunk_size: ChunkSize::Medium,
            include_examples: true,
            use_checklists: true,
            literal_language: false,
            focus_areas: Vec::new(),
        }
    }
}

/// Snapshot of a learner profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub neurodiversity: NeurodiversityType,
    #[serde(default)]
    pub preferences: StylePreferences,
    /// Free-form instructions; required for [`NeurodiversityType::Custom`].
    #[serde(default)]
    pub custom_instructions: Option<String>,
    /// Cosmetic; volatile.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Volatile.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LearnerProfile {
    /// Create a profile with default preferences.
    pub fn new(neurodiversity: NeurodiversityType) -> Self {
        Self {
            neurodiversity,
            preferences: StylePreferences::default(),
            custom_instructions: None,
            display_name: None,
            updated_at: None,
        }
    }

    /// Replace the style preferences.
    pub fn with_preferences(mut self, preferences: StylePreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Set custom instructions.
    pub fn with_custom_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.custom_instructions = Some(instructions.into());
        self
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the last-updated timestamp.
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }
}

/// Kind of a parsed assignment block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading,
    Paragraph,
    Requirement,
    List,
    Code,
}

/// One block of the parsed assignment document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub text: String,
}

impl ContentBlock {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Snapshot produced by the assignment document parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentSnapshot {
    pub title: String,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    /// Source document path; volatile.
    #[serde(default)]
    pub source_path: Option<String>,
    /// Volatile.
    #[serde(default)]
    pub parsed_at: Option<DateTime<Utc>>,
}

impl AssignmentSnapshot {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            course: None,
            blocks: Vec::new(),
            source_path: None,
            parsed_at: None,
        }
    }

    pub fn with_course(mut self, course: impl Into<String>) -> Self {
        self.course = Some(course.into());
        self
    }

    pub fn with_block(mut self, kind: BlockKind, text: impl Into<String>) -> Self {
        self.blocks.push(ContentBlock::new(kind, text));
        self
    }

    pub fn with_parsed_at(mut self, parsed_at: DateTime<Utc>) -> Self {
        self.parsed_at = Some(parsed_at);
        self
    }
}

/// Snapshot produced by the project context collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub language: String,
    #[serde(default)]
    pub files: Vec<String>,
    /// Notable symbols (types, functions) the assignment refers to.
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Volatile.
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl ProjectContext {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            files: Vec::new(),
            symbols: Vec::new(),
            notes: None,
            captured_at: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbols.push(symbol.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }
}

/// Generation parameters attached to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParameters {
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f64,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Providers to try, in order. Empty means "use the configured order".
    pub provider_preference_order: Vec<ProviderId>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2048,
            provider_preference_order: Vec::new(),
        }
    }
}

impl GenerationParameters {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_providers<I, P>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProviderId>,
    {
        self.provider_preference_order = providers.into_iter().map(Into::into).collect();
        self
    }
}

/// Volatile request metadata, used for tracing only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }
}

/// Immutable input of one adaptation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationRequest {
    profile: LearnerProfile,
    assignment: AssignmentSnapshot,
    context: ProjectContext,
    #[serde(default)]
    parameters: GenerationParameters,
    #[serde(default)]
    metadata: RequestMetadata,
}

impl AdaptationRequest {
    /// Create a request with default parameters and fresh metadata.
    pub fn new(
        profile: LearnerProfile,
        assignment: AssignmentSnapshot,
        context: ProjectContext,
    ) -> Self {
        Self {
            profile,
            assignment,
            context,
            parameters: GenerationParameters::default(),
            metadata: RequestMetadata::default(),
        }
    }

    /// Set the generation parameters.
    pub fn with_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Override the volatile metadata.
    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Parse a request from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn profile(&self) -> &LearnerProfile {
        &self.profile
    }

    pub fn assignment(&self) -> &AssignmentSnapshot {
        &self.assignment
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    pub fn parameters(&self) -> &GenerationParameters {
        &self.parameters
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }
}
