//! neuroadapt: adaptive generation pipeline for programming assignments.
//!
//! This library rewrites an assignment snapshot for a neurodivergent
//! learner's profile through LLM providers, with request fingerprinting,
//! result caching, de-duplication of concurrent identical requests,
//! retries with backoff, provider fallback, output validation with
//! repair-retries, and per-attempt and overall deadlines.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use neuroadapt::{AdaptationPipeline, AdaptationRequest, PipelineConfig};
//! use neuroadapt::llm::{ProviderRegistry, ScriptedProvider};
//!
//! # async fn example(request: AdaptationRequest) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ProviderRegistry::new().with(Arc::new(ScriptedProvider::new("offline")));
//! let pipeline = AdaptationPipeline::new(PipelineConfig::default(), registry)?;
//! let content = pipeline.adapt(&request).await?;
//! println!("{} sections", content.sections().len());
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod cache;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod fingerprint;
pub mod llm;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod request;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use cache::{CacheStats, ResultCache};
pub use config::{ConfigError, PipelineConfig};
pub use content::{AdaptedContent, ComplexityLevel, ContentSection, SectionKind, VisualHints};
pub use error::{
    ExhaustedError, ExhaustionReason, FieldIssue, PipelineError, TemplateError, ValidationError,
};
pub use fingerprint::{fingerprint, Fingerprint};
pub use pipeline::AdaptationPipeline;
pub use request::{
    AdaptationRequest, AssignmentSnapshot, GenerationParameters, LearnerProfile,
    NeurodiversityType, ProjectContext, StylePreferences,
};
