//! Stable cache keys for adaptation requests.
//!
//! A [`Fingerprint`] is the SHA-256 hash (256 bits, 64 hex chars) of a
//! canonical JSON encoding of the semantically relevant parts of an
//! [`AdaptationRequest`]. Object keys are sorted recursively and set-like
//! preference lists are normalised, so two requests that differ only in field
//! order or volatile metadata collapse to the same key.
//!
//! Excluded (volatile) fields: request id, request timestamp, profile display
//! name, profile update time, assignment source path and parse time, context
//! capture time, and the provider preference order (routing only).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::request::{
    AdaptationRequest, AssignmentSnapshot, ContentBlock, LearnerProfile, ProjectContext,
    StylePreferences,
};

/// Number of hex characters shown by [`Fingerprint::short`].
const SHORT_LEN: usize = 12;

/// Content hash identifying a semantically unique adaptation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Build a fingerprint from raw digest bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Hash arbitrary canonical content.
    pub fn from_content(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self::from_bytes(&hasher.finalize())
    }

    /// Full hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(SHORT_LEN);
        &self.0[..end]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Borrowed view of the fields that take part in the hash.
#[derive(Serialize)]
struct SemanticView<'a> {
    profile: ProfileView<'a>,
    assignment: AssignmentView<'a>,
    context: ContextView<'a>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ProfileView<'a> {
    neurodiversity: &'static str,
    preferences: PreferencesView,
    custom_instructions: Option<&'a str>,
}

#[derive(Serialize)]
struct PreferencesView {
    reading_level: crate::request::ReadingLevel,
    chunk_size: crate::request::ChunkSize,
    include_examples: bool,
    use_checklists: bool,
    literal_language: bool,
    focus_areas: Vec<String>,
}

#[derive(Serialize)]
struct AssignmentView<'a> {
    title: &'a str,
    course: Option<&'a str>,
    blocks: &'a [ContentBlock],
}

#[derive(Serialize)]
struct ContextView<'a> {
    language: String,
    files: Vec<&'a str>,
    symbols: Vec<&'a str>,
    notes: Option<&'a str>,
}

impl<'a> ProfileView<'a> {
    fn of(profile: &'a LearnerProfile) -> Self {
        Self {
            neurodiversity: profile.neurodiversity.as_str(),
            preferences: PreferencesView::of(&profile.preferences),
            custom_instructions: profile
                .custom_instructions
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        }
    }
}

impl PreferencesView {
    fn of(prefs: &StylePreferences) -> Self {
        Self {
            reading_level: prefs.reading_level,
            chunk_size: prefs.chunk_size,
            include_examples: prefs.include_examples,
            use_checklists: prefs.use_checklists,
            literal_language: prefs.literal_language,
            focus_areas: normalized_set(prefs.focus_areas.iter().map(String::as_str)),
        }
    }
}

impl<'a> AssignmentView<'a> {
    fn of(assignment: &'a AssignmentSnapshot) -> Self {
        Self {
            title: assignment.title.trim(),
            course: assignment.course.as_deref(),
            blocks: &assignment.blocks,
        }
    }
}

impl<'a> ContextView<'a> {
    fn of(context: &'a ProjectContext) -> Self {
        // File and symbol lists come from directory walks whose order is not
        // meaningful.
        let mut files: Vec<&str> = context.files.iter().map(String::as_str).collect();
        files.sort_unstable();
        files.dedup();
        let mut symbols: Vec<&str> = context.symbols.iter().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols.dedup();

        Self {
            language: context.language.trim().to_lowercase(),
            files,
            symbols,
            notes: context.notes.as_deref(),
        }
    }
}

/// Lowercase, trim, sort and de-duplicate a set of preference strings.
fn normalized_set<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = items
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Recursively rebuild a JSON value with object keys in sorted order.
///
/// `serde_json::Map` only sorts keys when the `preserve_order` feature is off,
/// and any crate in the dependency graph may turn it on.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, val) in entries {
                sorted.insert(key, canonicalize(val));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Canonical JSON text hashed by [`fingerprint`].
pub fn canonical_form(request: &AdaptationRequest) -> String {
    let view = SemanticView {
        profile: ProfileView::of(request.profile()),
        assignment: AssignmentView::of(request.assignment()),
        context: ContextView::of(request.context()),
        temperature: request.parameters().temperature,
        max_tokens: request.parameters().max_tokens,
    };

    // Serializing plain structs of strings, numbers and enums cannot fail.
    let value = serde_json::to_value(&view).unwrap_or(Value::Null);
    canonicalize(value).to_string()
}

/// Derive the stable cache key of a request. Pure and deterministic.
pub fn fingerprint(request: &AdaptationRequest) -> Fingerprint {
    Fingerprint::from_content(&canonical_form(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{
        BlockKind, GenerationParameters, NeurodiversityType, RequestMetadata,
    };
    use chrono::{TimeZone, Utc};

    fn sample_request() -> AdaptationRequest {
        let mut prefs = StylePreferences::default();
        prefs.focus_areas = vec!["testing".into(), "Edge cases".into()];

        AdaptationRequest::new(
            LearnerProfile::new(NeurodiversityType::Dyslexia).with_preferences(prefs),
            AssignmentSnapshot::new("Binary search")
                .with_block(BlockKind::Paragraph, "Implement binary search.")
                .with_block(BlockKind::Requirement, "Return None when missing."),
            ProjectContext::new("rust")
                .with_file("src/lib.rs")
                .with_file("src/search.rs")
                .with_symbol("search"),
        )
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = fingerprint(&sample_request());
        let b = fingerprint(&sample_request());
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_volatile_metadata() {
        let base = sample_request();

        let mut profile = base.profile().clone();
        profile.display_name = Some("Sam".into());
        profile.updated_at = Some(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap());

        let mut assignment = base.assignment().clone();
        assignment.parsed_at = Some(Utc::now());
        assignment.source_path = Some("/tmp/hw1.md".into());

        let context = base.context().clone().with_captured_at(Utc::now());

        let other = AdaptationRequest::new(profile, assignment, context)
            .with_metadata(RequestMetadata::default())
            .with_parameters(GenerationParameters::default().with_providers(["backup"]));

        assert_ne!(base.metadata(), other.metadata());
        assert_eq!(fingerprint(&base), fingerprint(&other));
    }

    #[test]
    fn test_fingerprint_normalizes_set_ordering() {
        let base = sample_request();

        let mut profile = base.profile().clone();
        profile.preferences.focus_areas = vec![" edge cases".into(), "TESTING".into()];
        let mut context = ProjectContext::new("Rust")
            .with_file("src/search.rs")
            .with_file("src/lib.rs")
            .with_symbol("search");
        context.notes = base.context().notes.clone();

        let other = AdaptationRequest::new(profile, base.assignment().clone(), context);
        assert_eq!(fingerprint(&base), fingerprint(&other));
    }

    #[test]
    fn test_fingerprint_ignores_json_field_order() {
        let a = r#"{
            "profile": {"neurodiversity": "autism", "preferences": {"chunk_size": "small", "literal_language": true}},
            "assignment": {"title": "Queues", "blocks": [{"kind": "paragraph", "text": "Build a queue."}]},
            "context": {"language": "python"}
        }"#;
        let b = r#"{
            "context": {"language": "python"},
            "assignment": {"blocks": [{"text": "Build a queue.", "kind": "paragraph"}], "title": "Queues"},
            "profile": {"preferences": {"literal_language": true, "chunk_size": "small"}, "neurodiversity": "autism"}
        }"#;

        let ra = AdaptationRequest::from_json(a).expect("valid json");
        let rb = AdaptationRequest::from_json(b).expect("valid json");
        assert_eq!(fingerprint(&ra), fingerprint(&rb));
    }

    #[test]
    fn test_fingerprint_changes_with_preferences() {
        let base = sample_request();

        let mut profile = base.profile().clone();
        profile.preferences.chunk_size = crate::request::ChunkSize::Small;
        let changed =
            AdaptationRequest::new(profile, base.assignment().clone(), base.context().clone());

        assert_ne!(fingerprint(&base), fingerprint(&changed));
    }

    #[test]
    fn test_fingerprint_changes_with_block_order() {
        let base = sample_request();
        let mut assignment = base.assignment().clone();
        assignment.blocks.reverse();
        let reordered =
            AdaptationRequest::new(base.profile().clone(), assignment, base.context().clone());

        assert_ne!(fingerprint(&base), fingerprint(&reordered));
    }

    #[test]
    fn test_canonicalize_sorts_nested_keys() {
        let value = serde_json::json!({"b": {"z": 1, "a": 2}, "a": [{"y": 1, "x": 2}]});
        let text = canonicalize(value).to_string();
        assert_eq!(text, r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#);
    }

    #[test]
    fn test_short_fingerprint() {
        let fp = Fingerprint::from_content("hello");
        assert_eq!(fp.short().len(), 12);
        assert!(fp.as_str().starts_with(fp.short()));
    }
}
