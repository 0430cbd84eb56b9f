//! Integration tests against live LLM providers.
//!
//! These tests make real API calls.
//! Run with: OPENROUTER_API_KEY=your_key cargo test --test llm_integration -- --ignored

use std::sync::Arc;

use neuroadapt::llm::{
    AnthropicProvider, AttemptOutcome, OpenAiCompatibleProvider, ProviderAdapter, ProviderId,
    ProviderRegistry,
};
use neuroadapt::prompts::render;
use neuroadapt::request::{
    AdaptationRequest, AssignmentSnapshot, BlockKind, GenerationParameters, LearnerProfile,
    NeurodiversityType, ProjectContext,
};
use neuroadapt::validation::ResponseValidator;
use neuroadapt::{AdaptationPipeline, PipelineConfig};

fn get_env_key(var: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| panic!("{var} environment variable must be set for integration tests"))
}

fn create_openrouter() -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(
        ProviderId::from("openrouter"),
        get_env_key("OPENROUTER_API_KEY"),
        None,
        None,
    )
    .expect("client builds")
}

fn sample_request() -> AdaptationRequest {
    AdaptationRequest::new(
        LearnerProfile::new(NeurodiversityType::Adhd),
        AssignmentSnapshot::new("Word frequency counter")
            .with_course("CS101")
            .with_block(
                BlockKind::Paragraph,
                "Write a program that reads a text file and prints the ten most frequent words.",
            )
            .with_block(BlockKind::Requirement, "Ignore case and punctuation."),
        ProjectContext::new("rust").with_file("src/main.rs"),
    )
    .with_parameters(GenerationParameters::default().with_temperature(0.0))
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_openrouter_single_attempt_validates() {
    let provider = create_openrouter();
    let request = sample_request();
    let payload = render(request.profile(), request.assignment(), request.context())
        .expect("renderable request");

    let outcome = provider.send(&payload, request.parameters()).await;
    let reply = match outcome {
        AttemptOutcome::Success(reply) => reply,
        other => panic!("provider call failed: {:?}", other),
    };

    let content = ResponseValidator::new()
        .validate(&reply.output)
        .expect("provider output should satisfy the schema");
    assert!(!content.sections().is_empty());
    assert!(reply.usage.map(|u| u.total() > 0).unwrap_or(false), "Should report token usage");
}

#[tokio::test]
#[ignore]
async fn test_anthropic_single_attempt_validates() {
    let provider = AnthropicProvider::new(
        ProviderId::from("anthropic"),
        get_env_key("ANTHROPIC_API_KEY"),
        None,
        None,
    )
    .expect("client builds");
    let request = sample_request();
    let payload = render(request.profile(), request.assignment(), request.context())
        .expect("renderable request");

    match provider.send(&payload, request.parameters()).await {
        AttemptOutcome::Success(reply) => {
            ResponseValidator::new()
                .validate(&reply.output)
                .expect("provider output should satisfy the schema");
        }
        other => panic!("provider call failed: {:?}", other),
    }
}

#[tokio::test]
#[ignore]
async fn test_invalid_key_is_fatal() {
    let provider = OpenAiCompatibleProvider::new(
        ProviderId::from("openrouter"),
        "sk-invalid".to_string(),
        None,
        None,
    )
    .expect("client builds");
    let request = sample_request();
    let payload = render(request.profile(), request.assignment(), request.context())
        .expect("renderable request");

    let outcome = provider.send(&payload, request.parameters()).await;
    assert!(matches!(outcome, AttemptOutcome::Fatal(_)), "got {:?}", outcome);
}

#[tokio::test]
#[ignore]
async fn test_pipeline_end_to_end_with_cache() {
    let registry = ProviderRegistry::new().with(Arc::new(create_openrouter()));
    let pipeline = AdaptationPipeline::new(PipelineConfig::default(), registry).expect("valid config");
    let request = sample_request();

    let first = pipeline.adapt(&request).await.expect("adaptation succeeds");
    let second = pipeline.adapt(&request).await.expect("served from cache");

    assert!(Arc::ptr_eq(&first, &second));
    let usage = pipeline.usage_report();
    assert!(usage.total_calls >= 1);
    assert_eq!(pipeline.cache_stats().hits, 1);
}
