//! Server-level integration tests: config layering, dispatcher wiring, and
//! the routed tool surface.

use serde_json::json;

use mcp_server::{build_dispatcher, config::Config};

#[test]
fn embedded_defaults_are_valid() {
    let config = Config::from_env().expect("defaults load");
    assert!(config.validate().is_ok());
}

#[test]
fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lodestar.toml");
    std::fs::write(
        &path,
        r#"
[logging]
level = "debug"
format = "json"

[engine]
staleness_threshold_minutes = 45
"#,
    )
    .unwrap();

    let config = Config::from_file(path.to_str().unwrap()).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.engine.staleness_threshold_minutes, 45);
    // Untouched engine knobs keep their defaults
    assert_eq!(config.engine.max_hints_per_response, 6);
}

#[test]
fn tool_surface_is_complete() {
    let (dispatcher, _stores) = build_dispatcher(&Config::default());
    let names = dispatcher.tool_names();

    for expected in [
        "manage_task",
        "manage_subtask",
        "complete_task_with_update",
        "complete_subtask_with_update",
        "report_progress",
        "quick_task_update",
        "checkpoint_work",
        "get_workflow_hints",
        "provide_hint_feedback",
        "assign_agent_to_task",
        "request_work_handoff",
        "accept_handoff",
        "reject_handoff",
        "complete_handoff",
        "get_agent_workload",
        "resolve_conflict",
        "broadcast_status",
        "get_vision_alignment",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
    assert_eq!(names.len(), 18);
}

#[tokio::test]
async fn create_then_get_roundtrip() {
    let (dispatcher, _stores) = build_dispatcher(&Config::default());

    let reply = dispatcher
        .dispatch(
            "manage_task",
            json!({
                "action": "create",
                "title": "Wire the stdio loop",
                "description": "Line-delimited JSON over stdin/stdout",
                "branch_id": "branch-server",
            }),
        )
        .await;
    assert!(reply.success, "create failed: {:?}", reply.error);
    let task_id = reply.data.unwrap()["task"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let reply = dispatcher
        .dispatch("manage_task", json!({ "action": "get", "task_id": task_id }))
        .await;
    assert!(reply.success);
    let data = reply.data.unwrap();
    assert_eq!(data["task"]["title"], "Wire the stdio loop");
    assert_eq!(data["task"]["status"], "todo");

    // A fresh todo task gets a "start it" suggestion
    assert!(reply
        .workflow_guidance
        .next_actions
        .iter()
        .any(|a| a.params["status"] == "in_progress"));
}

#[tokio::test]
async fn failures_share_the_success_envelope_shape() {
    let (dispatcher, _stores) = build_dispatcher(&Config::default());

    let reply = dispatcher
        .dispatch("manage_task", json!({ "action": "get", "task_id": "ghost" }))
        .await;

    assert!(!reply.success);
    assert!(reply.error.is_some());
    assert!(reply.data.is_none());
    // Guidance present and populated even on failure
    assert!(!reply.workflow_guidance.next_actions.is_empty());

    let wire = serde_json::to_value(&reply).unwrap();
    assert!(wire.get("workflow_guidance").is_some());
    assert_eq!(wire["error"]["code"], "NOT_FOUND");
}
