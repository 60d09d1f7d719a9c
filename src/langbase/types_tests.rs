//! Unit tests for Langbase wire types.

use super::*;
use serde_json::json;

#[test]
fn test_message_constructors() {
    let msg = Message::system("You are a planner");
    assert_eq!(msg.role, MessageRole::System);
    assert_eq!(msg.content, "You are a planner");

    let msg = Message::user("Solve it");
    assert_eq!(msg.role, MessageRole::User);
}

#[test]
fn test_pipe_request_serialization() {
    let req = PipeRequest::new("tota-generation-v1", vec![Message::user("task")]);
    let value = serde_json::to_value(&req).unwrap();

    assert_eq!(value["name"], "tota-generation-v1");
    assert_eq!(value["stream"], false);
    assert_eq!(value["messages"][0]["role"], "user");
    assert!(value.get("variables").is_none());
}

#[test]
fn test_pipe_request_with_variable() {
    let req = PipeRequest::new("p", vec![]).with_variable("node_id", "n0.1");
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value["variables"]["node_id"], "n0.1");
}

#[test]
fn test_pipe_response_deserialization() {
    let resp: PipeResponse = serde_json::from_value(json!({
        "success": true,
        "completion": "{\"thoughts\": []}",
        "threadId": "thread-1",
        "raw": {
            "model": "gpt-4o-mini",
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        }
    }))
    .unwrap();

    assert!(resp.success);
    assert_eq!(resp.completion, "{\"thoughts\": []}");
    assert_eq!(resp.total_tokens(), Some(15));
}

#[test]
fn test_pipe_response_minimal() {
    let resp: PipeResponse = serde_json::from_value(json!({ "completion": "hi" })).unwrap();
    assert!(!resp.success);
    assert!(resp.total_tokens().is_none());
}

#[test]
fn test_create_pipe_request_builder() {
    let req = CreatePipeRequest::new("tota-decision-v1")
        .with_description("Decision pipe")
        .with_model("openai:gpt-4o-mini")
        .with_upsert(true)
        .with_json_output(true)
        .with_temperature(0.2)
        .with_max_tokens(1500)
        .with_system_prompt("decide");

    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value["name"], "tota-decision-v1");
    assert_eq!(value["upsert"], true);
    assert_eq!(value["json"], true);
    assert_eq!(value["max_tokens"], 1500);
    assert_eq!(value["messages"][0]["role"], "system");
    assert_eq!(value["messages"][0]["content"], "decide");
}

#[test]
fn test_create_pipe_request_skips_unset_fields() {
    let value = serde_json::to_value(CreatePipeRequest::new("bare")).unwrap();
    assert_eq!(value, json!({ "name": "bare" }));
}
