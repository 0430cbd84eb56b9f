//! Validation of raw provider output against the adapted-content schema.
//!
//! The validator is the only producer of [`AdaptedContent`]. It applies a
//! bounded, deterministic set of repairs before judging the payload:
//!
//! - strip a markdown code fence and surrounding prose around the object
//! - trim whitespace in string fields
//! - drop whitespace-only `focus_areas` entries
//! - normalize tag case (`"Step"` becomes `step`, `"Very High"` becomes `very_high`)
//!
//! Anything else that is missing or malformed is rejected, never coerced. A
//! rejection lists every offending field so a repair-retry can address them
//! all at once.

use std::fmt;

use serde_json::{Map, Value};

use crate::content::{AdaptedContent, ComplexityLevel, ContentSection, SectionKind, VisualHints};
use crate::error::{FieldIssue, ValidationError};
use crate::llm::RawOutput;
use crate::utils::json_extraction::{extract_json_object, JsonExtractionError};

/// One repair applied to a provider payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    StrippedCodeFence,
    StrippedProse,
    TrimmedField { field: String },
    DroppedBlankEntry { field: String },
    NormalizedTag { field: String, from: String, to: String },
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StrippedCodeFence => write!(f, "stripped markdown code fence"),
            Self::StrippedProse => write!(f, "stripped text surrounding the JSON object"),
            Self::TrimmedField { field } => write!(f, "trimmed whitespace in {}", field),
            Self::DroppedBlankEntry { field } => write!(f, "dropped blank entry {}", field),
            Self::NormalizedTag { field, from, to } => {
                write!(f, "normalized {} from '{}' to '{}'", field, from, to)
            }
        }
    }
}

/// Repairs applied during one validation, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairLog {
    repairs: Vec<Repair>,
}

impl RepairLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, repair: Repair) {
        tracing::debug!(repair = %repair, "Repaired provider output");
        self.repairs.push(repair);
    }

    pub fn repairs(&self) -> &[Repair] {
        &self.repairs
    }

    pub fn is_empty(&self) -> bool {
        self.repairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.repairs.len()
    }
}

/// Validator for provider payloads.
#[derive(Debug, Clone, Default)]
pub struct ResponseValidator;

impl ResponseValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a raw provider payload.
    ///
    /// # Arguments
    ///
    /// * `raw` - Unvalidated provider output
    ///
    /// # Returns
    ///
    /// The validated content, or a `ValidationError` listing every missing
    /// or malformed field.
    pub fn validate(&self, raw: &RawOutput) -> Result<AdaptedContent, ValidationError> {
        self.validate_with_log(raw).0
    }

    /// Like [`validate`](Self::validate), also returning the repairs applied.
    pub fn validate_with_log(
        &self,
        raw: &RawOutput,
    ) -> (Result<AdaptedContent, ValidationError>, RepairLog) {
        let mut log = RepairLog::new();

        let value = match raw {
            RawOutput::Structured(Value::String(text)) | RawOutput::Text(text) => {
                match parse_text(text, &mut log) {
                    Ok(value) => value,
                    Err(e) => return (Err(e), log),
                }
            }
            RawOutput::Structured(value) => value.clone(),
        };

        let Value::Object(object) = value else {
            return (
                Err(ValidationError::single("$", "expected a JSON object")),
                log,
            );
        };

        let result = validate_object(&object, &mut log);
        if !log.is_empty() {
            tracing::debug!(repairs = log.len(), ok = result.is_ok(), "Validated repaired output");
        }
        (result, log)
    }
}

fn parse_text(text: &str, log: &mut RepairLog) -> Result<Value, ValidationError> {
    let extracted = extract_json_object(text).map_err(|e| match e {
        JsonExtractionError::Truncated { .. } => {
            ValidationError::single("$", "JSON object is truncated")
        }
        JsonExtractionError::NotFound { .. } => {
            ValidationError::single("$", "no JSON object found")
        }
    })?;

    if extracted.stripped_fence {
        log.push(Repair::StrippedCodeFence);
    }
    if extracted.stripped_prose {
        log.push(Repair::StrippedProse);
    }

    serde_json::from_str(&extracted.json)
        .map_err(|e| ValidationError::single("$", format!("invalid JSON: {}", e)))
}

fn validate_object(
    object: &Map<String, Value>,
    log: &mut RepairLog,
) -> Result<AdaptedContent, ValidationError> {
    let mut issues = Vec::new();

    let sections = validate_sections(object.get("sections"), &mut issues, log);
    let complexity = validate_complexity(object.get("complexity"), &mut issues, log);
    let visual_hints = validate_visual_hints(object.get("visual_hints"), sections.len(), &mut issues);
    let focus_areas = validate_focus_areas(object.get("focus_areas"), &mut issues, log);

    match complexity {
        Some(complexity) if issues.is_empty() => Ok(AdaptedContent::new(
            sections,
            visual_hints,
            complexity,
            focus_areas,
        )),
        _ => Err(ValidationError::new(issues)),
    }
}

fn validate_sections(
    value: Option<&Value>,
    issues: &mut Vec<FieldIssue>,
    log: &mut RepairLog,
) -> Vec<ContentSection> {
    let items = match value {
        None | Some(Value::Null) => {
            issues.push(FieldIssue::new("sections", "missing"));
            return Vec::new();
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            issues.push(FieldIssue::new("sections", "expected an array"));
            return Vec::new();
        }
    };

    if items.is_empty() {
        issues.push(FieldIssue::new(
            "sections",
            "must contain at least one section",
        ));
        return Vec::new();
    }

    let mut sections = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("sections[{}]", i);
        let Value::Object(section) = item else {
            issues.push(FieldIssue::new(path, "expected an object"));
            continue;
        };

        let type_path = format!("{}.type", path);
        let kind = match required_string(section.get("type"), &type_path, issues) {
            Some(tag) => {
                let normalized = normalize_tag(&tag, &type_path, log);
                match SectionKind::parse(&normalized) {
                    Some(kind) => Some(kind),
                    None => {
                        issues.push(FieldIssue::new(
                            type_path,
                            format!(
                                "unknown section type '{}'; expected one of {}",
                                tag,
                                SectionKind::ALL.map(|k| k.as_str()).join(", ")
                            ),
                        ));
                        None
                    }
                }
            }
            None => None,
        };

        let title_path = format!("{}.title", path);
        let title = match section.get("title") {
            None | Some(Value::Null) => None,
            Some(Value::String(title)) => {
                let trimmed = trimmed(title, &title_path, log);
                (!trimmed.is_empty()).then_some(trimmed)
            }
            Some(_) => {
                issues.push(FieldIssue::new(title_path, "expected a string"));
                None
            }
        };

        let body_path = format!("{}.body", path);
        let body = match required_string(section.get("body"), &body_path, issues) {
            Some(body) => {
                let body = trimmed(&body, &body_path, log);
                if body.is_empty() {
                    issues.push(FieldIssue::new(body_path, "must not be blank"));
                    None
                } else {
                    Some(body)
                }
            }
            None => None,
        };

        if let (Some(kind), Some(body)) = (kind, body) {
            sections.push(ContentSection { kind, title, body });
        }
    }

    sections
}

fn validate_complexity(
    value: Option<&Value>,
    issues: &mut Vec<FieldIssue>,
    log: &mut RepairLog,
) -> Option<ComplexityLevel> {
    let tag = required_string(value, "complexity", issues)?;
    let normalized = normalize_tag(&tag, "complexity", log);
    let level = ComplexityLevel::parse(&normalized);
    if level.is_none() {
        issues.push(FieldIssue::new(
            "complexity",
            format!(
                "'{}' is not one of {}",
                tag,
                ComplexityLevel::ALL.map(|c| c.as_str()).join(", ")
            ),
        ));
    }
    level
}

fn validate_visual_hints(
    value: Option<&Value>,
    section_count: usize,
    issues: &mut Vec<FieldIssue>,
) -> VisualHints {
    let hints = match value {
        None | Some(Value::Null) => return VisualHints::default(),
        Some(value) => match serde_json::from_value::<VisualHints>(value.clone()) {
            Ok(hints) => hints,
            Err(e) => {
                issues.push(FieldIssue::new("visual_hints", e.to_string()));
                return VisualHints::default();
            }
        },
    };

    if section_count > 0 {
        for (i, index) in hints.break_after.iter().enumerate() {
            if *index >= section_count {
                issues.push(FieldIssue::new(
                    format!("visual_hints.break_after[{}]", i),
                    format!("section index {} out of range", index),
                ));
            }
        }
    }

    hints
}

fn validate_focus_areas(
    value: Option<&Value>,
    issues: &mut Vec<FieldIssue>,
    log: &mut RepairLog,
) -> Vec<String> {
    let items = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            issues.push(FieldIssue::new("focus_areas", "expected an array of strings"));
            return Vec::new();
        }
    };

    let mut areas = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let path = format!("focus_areas[{}]", i);
        match item {
            Value::String(area) if area.trim().is_empty() => {
                log.push(Repair::DroppedBlankEntry { field: path });
            }
            Value::String(area) => areas.push(trimmed(area, &path, log)),
            _ => issues.push(FieldIssue::new(path, "expected a string")),
        }
    }
    areas
}

fn required_string(
    value: Option<&Value>,
    field: &str,
    issues: &mut Vec<FieldIssue>,
) -> Option<String> {
    match value {
        None | Some(Value::Null) => {
            issues.push(FieldIssue::new(field, "missing"));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            issues.push(FieldIssue::new(field, "expected a string"));
            None
        }
    }
}

fn trimmed(value: &str, field: &str, log: &mut RepairLog) -> String {
    let out = value.trim();
    if out.len() != value.len() {
        log.push(Repair::TrimmedField {
            field: field.to_string(),
        });
    }
    out.to_string()
}

/// Lowercase a tag and join words with underscores.
fn normalize_tag(tag: &str, field: &str, log: &mut RepairLog) -> String {
    let normalized = tag
        .trim()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    if normalized != tag {
        log.push(Repair::NormalizedTag {
            field: field.to_string(),
            from: tag.to_string(),
            to: normalized.clone(),
        });
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> Value {
        json!({
            "sections": [
                {"type": "overview", "body": "Build a stack."},
                {"type": "step", "title": "Push", "body": "Implement push."}
            ],
            "complexity": "moderate",
            "visual_hints": {"numbered_steps": true, "break_after": [0]},
            "focus_areas": ["testing"]
        })
    }

    #[test]
    fn test_valid_structured_payload() {
        let content = ResponseValidator::new()
            .validate(&RawOutput::Structured(valid_payload()))
            .expect("valid");

        assert_eq!(content.sections().len(), 2);
        assert_eq!(content.sections()[1].title.as_deref(), Some("Push"));
        assert_eq!(content.complexity(), ComplexityLevel::Moderate);
        assert!(content.visual_hints().numbered_steps);
        assert_eq!(content.focus_areas(), &["testing".to_string()]);
    }

    #[test]
    fn test_missing_sections_rejected() {
        let err = ResponseValidator::new()
            .validate(&RawOutput::Structured(json!({"complexity": "low"})))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["sections"]);
    }

    #[test]
    fn test_empty_sections_rejected() {
        let err = ResponseValidator::new()
            .validate(&RawOutput::Structured(
                json!({"sections": [], "complexity": "low"}),
            ))
            .unwrap_err();
        assert!(err.mentions("sections"));
    }

    #[test]
    fn test_every_issue_listed() {
        let payload = json!({
            "sections": [
                {"type": "appendix", "body": "x"},
                {"type": "step"},
                {"type": "hint", "body": "   "},
                "not an object"
            ],
            "complexity": "extreme",
            "focus_areas": ["ok", 3]
        });
        let err = ResponseValidator::new()
            .validate(&RawOutput::Structured(payload))
            .unwrap_err();

        assert_eq!(
            err.fields(),
            vec![
                "sections[0].type",
                "sections[1].body",
                "sections[2].body",
                "sections[3]",
                "complexity",
                "focus_areas[1]",
            ]
        );
    }

    #[test]
    fn test_missing_complexity_rejected_not_defaulted() {
        let mut payload = valid_payload();
        payload
            .as_object_mut()
            .expect("object")
            .remove("complexity");
        let err = ResponseValidator::new()
            .validate(&RawOutput::Structured(payload))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["complexity"]);
    }

    #[test]
    fn test_fenced_text_with_repairs() {
        let text = "Here is the adapted assignment:\n```json\n{\"sections\": [{\"type\": \"Step\", \"body\": \"  Do it.  \"}], \"complexity\": \"Very High\", \"focus_areas\": [\" \", \"loops\"]}\n```";
        let (result, log) =
            ResponseValidator::new().validate_with_log(&RawOutput::Text(text.to_string()));

        let content = result.expect("repaired payload is valid");
        assert_eq!(content.sections()[0].kind, SectionKind::Step);
        assert_eq!(content.sections()[0].body, "Do it.");
        assert_eq!(content.complexity(), ComplexityLevel::VeryHigh);
        assert_eq!(content.focus_areas(), &["loops".to_string()]);

        let repairs = log.repairs();
        assert!(repairs.contains(&Repair::StrippedCodeFence));
        assert!(repairs.contains(&Repair::StrippedProse));
        assert!(repairs.contains(&Repair::TrimmedField {
            field: "sections[0].body".into()
        }));
        assert!(repairs.contains(&Repair::DroppedBlankEntry {
            field: "focus_areas[0]".into()
        }));
        assert!(repairs.iter().any(|r| matches!(
            r,
            Repair::NormalizedTag { to, .. } if to == "very_high"
        )));
    }

    #[test]
    fn test_clean_payload_has_no_repairs() {
        let text = serde_json::to_string(&valid_payload()).expect("serializable");
        let (result, log) = ResponseValidator::new().validate_with_log(&RawOutput::Text(text));
        assert!(result.is_ok());
        assert!(log.is_empty());
    }

    #[test]
    fn test_not_json() {
        let err = ResponseValidator::new()
            .validate(&RawOutput::Text("Sorry, I can't do that.".into()))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["$"]);

        let err = ResponseValidator::new()
            .validate(&RawOutput::Structured(json!([1, 2])))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["$"]);
    }

    #[test]
    fn test_break_after_out_of_range() {
        let mut payload = valid_payload();
        payload["visual_hints"]["break_after"] = json!([5]);
        let err = ResponseValidator::new()
            .validate(&RawOutput::Structured(payload))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["visual_hints.break_after[0]"]);
    }
}
