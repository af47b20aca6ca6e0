//! Backend factory and scripted backend behaviour.

use crate::conversation::domain::{ContentPart, Role, ToolCallPart};
use crate::conversation::services::ConversationState;
use crate::model::adapters::{OpenAiConfig, ProviderSettings, ScriptedModel, backend_for};
use crate::model::domain::{ModelRequest, ModelResponse, ModelSpec};
use crate::model::ports::{ModelBackend, ModelBackendError};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[fixture]
fn request() -> ModelRequest {
    let mut state = ConversationState::new(Arc::new(DefaultClock));
    state
        .append(Role::Human, vec![ContentPart::text("hello")])
        .expect("valid turn");
    ModelRequest {
        model: ModelSpec::parse("passthrough").expect("valid spec"),
        instruction: "Be helpful".to_owned(),
        turns: state.snapshot(),
        tools: Vec::new(),
    }
}

#[rstest]
fn openai_without_key_is_not_configured() {
    let spec = ModelSpec::parse("openai.gpt-4.1").expect("valid spec");

    let result = backend_for(&spec, &ProviderSettings::default());

    assert!(matches!(result, Err(ModelBackendError::NotConfigured(_))));
}

#[rstest]
#[case("openai.gpt-4.1")]
#[case("generic.llama3.2")]
#[case("passthrough")]
fn configured_providers_build(#[case] raw: &str) {
    let spec = ModelSpec::parse(raw).expect("valid spec");
    let settings = ProviderSettings {
        openai: OpenAiConfig::openai(Some("sk-test".to_owned())),
        ..ProviderSettings::default()
    };

    assert!(backend_for(&spec, &settings).is_ok());
}

#[rstest]
#[tokio::test]
async fn passthrough_backend_echoes(request: ModelRequest) {
    let backend = backend_for(&request.model, &ProviderSettings::default()).expect("backend");

    let response = backend.complete(&request).await;

    assert_eq!(response.ok(), Some(ModelResponse::Text("hello".to_owned())));
}

#[rstest]
#[tokio::test]
async fn scripted_backend_replays_in_order_and_records(request: ModelRequest) {
    let script = ScriptedModel::new()
        .then_tool_calls(vec![ToolCallPart::new("c1", "echo", json!({}))])
        .then_error(ModelBackendError::Timeout(Duration::from_secs(1)))
        .then_text("done");
    let backend: Arc<dyn ModelBackend> = Arc::new(script.clone());

    let first = backend.complete(&request).await.expect("tool calls");
    let second = backend.complete(&request).await;
    let third = backend.complete(&request).await;
    let fourth = backend.complete(&request).await;

    assert_eq!(first.tool_calls().len(), 1);
    assert!(matches!(second, Err(ModelBackendError::Timeout(_))));
    assert_eq!(third.ok(), Some(ModelResponse::Text("done".to_owned())));
    assert!(matches!(fourth, Err(ModelBackendError::Exhausted)));
    assert_eq!(script.requests().len(), 4);
    assert_eq!(script.remaining(), 0);
}
