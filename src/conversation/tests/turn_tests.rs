//! Turn construction and per-role content rules.

use crate::conversation::domain::{
    ContentPart, ConversationError, Role, SequenceNumber, ToolCallPart, ToolResultPart, Turn,
};
use mockable::DefaultClock;
use rstest::rstest;
use serde_json::json;

fn build(role: Role, content: Vec<ContentPart>) -> Result<Turn, ConversationError> {
    Turn::new(role, content, SequenceNumber::new(1), &DefaultClock)
}

fn call(id: &str) -> ContentPart {
    ContentPart::ToolCall(ToolCallPart::new(id, "filesystem-read_file", json!({})))
}

fn result(id: &str) -> ContentPart {
    ContentPart::ToolResult(ToolResultPart::success(id, json!("ok")))
}

#[rstest]
#[case(Role::Human, vec![ContentPart::text("hi")])]
#[case(Role::Assistant, vec![ContentPart::text("hello")])]
#[case(Role::Assistant, vec![ContentPart::text("let me look"), call("c1"), call("c2")])]
#[case(Role::ToolResult, vec![result("c1")])]
fn accepts_valid_content(#[case] role: Role, #[case] content: Vec<ContentPart>) {
    let turn = build(role, content).expect("turn should be valid");
    assert_eq!(turn.role(), role);
}

#[rstest]
#[case(Role::Human, vec![], ConversationError::EmptyContent(Role::Human))]
#[case(
    Role::Human,
    vec![ContentPart::text("   ")],
    ConversationError::BlankText(Role::Human)
)]
#[case(
    Role::Human,
    vec![call("c1")],
    ConversationError::InvalidPartForRole { role: Role::Human, kind: "tool_call" }
)]
#[case(
    Role::Assistant,
    vec![ContentPart::ToolCall(ToolCallPart::new("", "echo", json!({})))],
    ConversationError::InvalidToolCall
)]
#[case(
    Role::Assistant,
    vec![result("c1")],
    ConversationError::InvalidPartForRole { role: Role::Assistant, kind: "tool_result" }
)]
#[case(
    Role::ToolResult,
    vec![result("c1"), result("c2")],
    ConversationError::ToolResultCount(2)
)]
#[case(
    Role::ToolResult,
    vec![ContentPart::text("loose text")],
    ConversationError::InvalidPartForRole { role: Role::ToolResult, kind: "text" }
)]
fn rejects_invalid_content(
    #[case] role: Role,
    #[case] content: Vec<ContentPart>,
    #[case] expected: ConversationError,
) {
    assert_eq!(build(role, content), Err(expected));
}

#[rstest]
fn accessors_expose_calls_text_and_result() {
    let assistant = build(
        Role::Assistant,
        vec![ContentPart::text("one"), call("c1"), ContentPart::text("two")],
    )
    .expect("valid assistant turn");
    assert_eq!(assistant.text(), "one\n\ntwo");
    assert_eq!(assistant.tool_calls().count(), 1);
    assert!(assistant.tool_result().is_none());

    let tool = build(Role::ToolResult, vec![result("c1")]).expect("valid result turn");
    assert_eq!(
        tool.tool_result().map(|part| part.call_id.as_str()),
        Some("c1")
    );
}

#[rstest]
fn failed_result_carries_error_text() {
    let failure = ToolResultPart::failure("c9", "unknown tool: nope");
    assert!(!failure.success);
    assert_eq!(failure.content_text(), "unknown tool: nope");

    let structured = ToolResultPart::success("c1", json!({"lines": 3}));
    assert_eq!(structured.content_text(), r#"{"lines":3}"#);
}

#[rstest]
fn content_parts_serialise_with_type_tag() {
    let value = serde_json::to_value(call("c1")).expect("serialisable part");
    assert_eq!(value["type"], "tool_call");
    assert_eq!(value["call_id"], "c1");
}
