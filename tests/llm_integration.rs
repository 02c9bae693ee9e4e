//! Integration tests for the completion client and the QA pipeline against a
//! real OpenAI-compatible endpoint.
//!
//! Run with: LITELLM_API_BASE=... LITELLM_API_KEY=... QA_TEST_MODEL=... \
//!     cargo test --test llm_integration -- --ignored

use qa_forge::error::LlmError;
use qa_forge::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
use qa_forge::qa::{build_qa_messages, parse_qa_answer, IndexKind, SentenceSplitter};

fn create_test_client() -> LiteLlmClient {
    LiteLlmClient::from_env()
        .expect("LITELLM_API_BASE environment variable must be set for integration tests")
}

fn test_model() -> String {
    std::env::var("QA_TEST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string())
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let client = create_test_client();

    let request = GenerationRequest::new(
        test_model(),
        vec![Message::user("What is 2 + 2? Reply with just the number.")],
    )
    .with_max_tokens(10)
    .with_temperature(0.0)
    .with_n(1);

    let response = client.generate(request).await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let response = response.expect("Should have response");
    let content = response.first_content().expect("Should have content");
    assert!(content.contains('4'), "Response should contain '4', got: {}", content);

    // Verify usage was tracked
    assert!(response.usage.total_tokens > 0, "Should have token usage");
}

#[tokio::test]
#[ignore]
async fn test_default_prompt_yields_qa_blocks() {
    let client = create_test_client();
    let text = "The Rust borrow checker enforces that a value has either one mutable \
                reference or any number of shared references at a time. Lifetimes \
                describe how long references stay valid.";

    let request = GenerationRequest::new(test_model(), build_qa_messages(None, text))
        .with_temperature(0.01)
        .with_n(1);
    let response = client
        .generate(request)
        .await
        .expect("Generation should succeed");
    let answer = response.first_content().expect("Should have content");

    let chunks = parse_qa_answer(answer, text, &SentenceSplitter::new(), 500);
    assert!(!chunks.is_empty());
    assert!(
        chunks.iter().all(|c| c.kind() == Some(IndexKind::Qa)),
        "Model did not follow the Q/A format: {}",
        answer
    );
}

#[tokio::test]
#[ignore]
async fn test_unknown_model_is_an_api_error() {
    let client = create_test_client();

    let request = GenerationRequest::new("no-such-model-qa-forge", vec![Message::user("test")])
        .with_max_tokens(5);

    match client.generate(request).await {
        Err(e) => assert!(e.has_response(), "Expected an API error, got {e}"),
        Ok(_) => panic!("Unknown model should be rejected"),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let client = LiteLlmClient::new("http://127.0.0.1:9".to_string(), None);

    let request = GenerationRequest::new("any", vec![Message::user("test")])
        .with_timeout(std::time::Duration::from_secs(5));

    let err = client
        .generate(request)
        .await
        .expect_err("Nothing listens on the discard port");
    assert!(matches!(err, LlmError::RequestFailed(_)), "{err}");
    assert!(!err.has_response());
}
