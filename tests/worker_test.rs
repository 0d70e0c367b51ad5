use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use supervisor_rs::error::{Error, Result};
use supervisor_rs::llm::scripted::{ScriptStep, ScriptedChatModel};
use supervisor_rs::model::{ConversationState, DatasetRef, Role, StateUpdate};
use supervisor_rs::tools::{
    Handoff, HandoffPayload, HandoffTool, Tool, ToolOutput, ToolRegistry,
};
use supervisor_rs::worker::{PayloadKind, Worker, WorkerInput, WorkerRegistry, WorkerSpec};

const SQL_WORKER: &str = r#"
[worker]
name = "text2sql_agent"
description = "Assign task to a text2sql agent."
preamble = "You answer questions with SQL and export the rows."
tools = ["export_csv"]
max_iterations = 4
temperature = 0.0
"#;

const STATS_WORKER: &str = r#"
[worker]
name = "statistic_agent"
preamble = "You compute descriptive statistics."
"#;

/// Pretends to run a query and export its rows.
struct ExportCsv;

#[async_trait]
impl Tool for ExportCsv {
    fn name(&self) -> &str {
        "export_csv"
    }

    fn description(&self) -> &str {
        "Export query rows to a CSV file."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(&self, _args: Value, _state: &ConversationState) -> Result<ToolOutput> {
        Ok(ToolOutput::Update {
            content: json!({ "status": "success", "message": "exported 12 rows" }),
            update: StateUpdate::none().with_dataset(DatasetRef {
                path: "/tmp/sales.csv".into(),
                meta: json!({ "rows": 12 }),
            }),
        })
    }
}

fn tools() -> ToolRegistry {
    ToolRegistry::new().with(Arc::new(ExportCsv))
}

fn input(task: &str) -> WorkerInput {
    let handoff = Handoff {
        target: "text2sql_agent".into(),
        payload: HandoffPayload::Message(task.into()),
    };
    let parent = ConversationState::from_user_message("parent history").with_user_id("u1");
    WorkerInput {
        state: handoff.seed_state(&parent),
        payload: handoff.payload,
    }
}

#[test]
fn worker_spec_defaults_and_validation() {
    let spec = WorkerSpec::from_toml(STATS_WORKER).unwrap();
    assert_eq!(spec.description, None);
    assert!(spec.tools.is_empty());
    assert_eq!(spec.max_iterations, 10);
    assert_eq!(spec.payload, PayloadKind::Message);

    let bad_name = STATS_WORKER.replace("statistic_agent", "stat agent");
    assert!(matches!(WorkerSpec::from_toml(&bad_name), Err(Error::Config(_))));

    let zero = format!("{STATS_WORKER}max_iterations = 0\n");
    assert!(matches!(WorkerSpec::from_toml(&zero), Err(Error::Config(_))));

    let unknown_key = format!("{STATS_WORKER}retries = 3\n");
    assert!(matches!(WorkerSpec::from_toml(&unknown_key), Err(Error::Config(_))));

    let task = format!("{STATS_WORKER}payload = \"task\"\n");
    assert_eq!(WorkerSpec::from_toml(&task).unwrap().payload, PayloadKind::Task);
}

#[test]
fn loads_toml_files_from_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sql.toml"), SQL_WORKER).unwrap();
    std::fs::write(dir.path().join("stats.toml"), STATS_WORKER).unwrap();
    std::fs::write(dir.path().join("README.md"), "not a worker").unwrap();

    let registry = WorkerRegistry::load_from_dir(dir.path()).unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.names().collect::<Vec<_>>(),
        vec!["statistic_agent", "text2sql_agent"]
    );
    assert_eq!(
        registry.get("text2sql_agent").map(|s| s.tools.clone()),
        Some(vec!["export_csv".to_string()])
    );
}

#[test]
fn duplicate_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.toml"), STATS_WORKER).unwrap();
    std::fs::write(dir.path().join("b.toml"), STATS_WORKER).unwrap();

    let err = WorkerRegistry::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, Error::Config(msg) if msg.contains("duplicate")));
}

#[test]
fn missing_dir_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = WorkerRegistry::load_from_dir(&dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn build_fails_on_unavailable_tool() {
    let spec = WorkerSpec::from_toml(SQL_WORKER).unwrap();
    let model = Arc::new(ScriptedChatModel::new(Vec::new()));
    let err = spec.build(model, &ToolRegistry::new()).err().unwrap();
    assert!(matches!(err, Error::Config(msg) if msg.contains("export_csv")));
}

#[tokio::test]
async fn agent_worker_runs_tools_and_returns_its_messages() {
    let model = ScriptedChatModel::new([
        ScriptStep::tool_call("c1", "export_csv", json!({})),
        ScriptStep::text("Exported 12 rows to /tmp/sales.csv."),
    ]);
    let mut registry = WorkerRegistry::empty();
    registry.insert(WorkerSpec::from_toml(SQL_WORKER).unwrap()).unwrap();
    let workers = registry.build_all(Arc::new(model.clone()), &tools()).unwrap();
    let worker = &workers[0];
    assert_eq!(worker.name(), "text2sql_agent");
    assert_eq!(worker.description(), "Assign task to a text2sql agent.");

    let update = worker.run(input("export last quarter's sales")).await.unwrap();

    let roles: Vec<_> = update.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    assert_eq!(update.messages[0].text(), "export last quarter's sales");
    assert_eq!(
        update.messages[3].name.as_deref(),
        Some("text2sql_agent")
    );
    assert_eq!(
        update.dataset.as_ref().map(|d| d.path.as_str()),
        Some("/tmp/sales.csv")
    );

    // Preamble first, then only the seeded task; the parent history stays out.
    let first = &model.requests()[0];
    assert_eq!(first.messages[0].role, Role::System);
    assert_eq!(first.messages.len(), 2);
    assert_eq!(first.temperature, Some(0.0));
    assert_eq!(first.tools.len(), 1);
}

#[tokio::test]
async fn iteration_limit_returns_partial_work() {
    let spec = WorkerSpec::from_toml(&SQL_WORKER.replace("max_iterations = 4", "max_iterations = 2"))
        .unwrap();
    let model = ScriptedChatModel::new([
        ScriptStep::tool_call("c1", "export_csv", json!({})),
        ScriptStep::tool_call("c2", "export_csv", json!({})),
        ScriptStep::text("never reached"),
    ]);
    let worker = spec.build(Arc::new(model.clone()), &tools()).unwrap();

    let update = worker.run(input("loop")).await.unwrap();
    assert_eq!(model.call_count(), 2);
    assert_eq!(model.remaining(), 1);
    assert_eq!(update.messages.len(), 5);
}

#[tokio::test]
async fn worker_cannot_hand_off() {
    let spec = WorkerSpec::from_toml(
        r#"
        [worker]
        name = "rogue_agent"
        preamble = "p"
        tools = ["transfer_to_statistic_agent"]
        "#,
    )
    .unwrap();
    let registry = ToolRegistry::new().with(Arc::new(HandoffTool::new("statistic_agent", None)));
    let model = ScriptedChatModel::new([ScriptStep::tool_call(
        "c1",
        "transfer_to_statistic_agent",
        json!({ "task_description": "do it for me" }),
    )]);
    let worker = spec.build(Arc::new(model), &registry).unwrap();

    let err = worker.run(input("task")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidHandoff(_)));
}

#[test]
fn shipped_worker_definitions_parse() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("workers");
    let registry = WorkerRegistry::load_from_dir(&dir).unwrap();
    assert_eq!(
        registry.names().collect::<Vec<_>>(),
        vec!["analysis_agent", "statistic_agent", "text2sql_agent"]
    );
}
