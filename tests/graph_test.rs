use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use supervisor_rs::error::Error;
use supervisor_rs::event::EventKind;
use supervisor_rs::graph::SupervisorGraph;
use supervisor_rs::llm::scripted::{ScriptStep, ScriptedChatModel};
use supervisor_rs::memory::{InProcessBackend, MemoryBackend};
use supervisor_rs::model::{ConversationState, Role, ToolCall};
use supervisor_rs::worker::{AgentWorker, WorkerSpec};
use supervisor_rs::{Message, TurnOutcome};

const FORGET: &str = r#"{"should_write": false, "memory_summary": "", "reason": "one-off"}"#;
const REMEMBER: &str = r#"{"should_write": true, "memory_summary": "用户喜欢简洁的回答", "reason": "长期偏好"}"#;

fn sql_worker(model: &ScriptedChatModel) -> Arc<AgentWorker> {
    let spec = WorkerSpec::from_toml(
        r#"
        [worker]
        name = "text2sql_agent"
        description = "Assign task to a text2sql agent."
        preamble = "You answer questions with SQL."
        max_iterations = 3
        "#,
    )
    .unwrap();
    Arc::new(AgentWorker::new(
        spec,
        Arc::new(model.clone()),
        Default::default(),
    ))
}

struct Fixture {
    supervisor: ScriptedChatModel,
    judge: ScriptedChatModel,
    worker: ScriptedChatModel,
    backend: Arc<InProcessBackend>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            supervisor: ScriptedChatModel::new(Vec::new()),
            judge: ScriptedChatModel::new(Vec::new()),
            worker: ScriptedChatModel::new(Vec::new()),
            backend: Arc::new(InProcessBackend::new()),
        }
    }

    fn graph(&self, max_steps: usize) -> SupervisorGraph {
        SupervisorGraph::builder(Arc::new(self.supervisor.clone()), self.backend.clone())
            .judge_model(Arc::new(self.judge.clone()))
            .worker(sql_worker(&self.worker))
            .max_steps(max_steps)
            .build()
            .unwrap()
    }
}

fn handoff(id: &str, task: &str) -> ToolCall {
    ToolCall::new(id, "transfer_to_text2sql_agent", json!({ "task_description": task }))
}

fn count(outcome: &TurnOutcome, pred: impl Fn(&EventKind) -> bool) -> usize {
    outcome.events.iter().filter(|e| pred(&e.kind)).count()
}

#[tokio::test]
async fn worker_returns_control_to_memory_router() {
    let f = Fixture::new();
    f.judge.push(ScriptStep::text(FORGET));
    f.judge.push(ScriptStep::text(FORGET));
    f.supervisor
        .push(ScriptStep::tool_calls(vec![handoff("call_1", "查询上季度销售额")]));
    f.supervisor.push(ScriptStep::text("上季度销售额为 42 万元。"));
    f.worker.push(ScriptStep::text("销售额为 42 万元"));

    let outcome = f
        .graph(25)
        .run(ConversationState::from_user_message("上季度卖了多少？"))
        .await
        .unwrap();

    assert_eq!(
        outcome.path,
        vec![
            "memory_router",
            "supervisor",
            "text2sql_agent",
            "memory_router",
            "supervisor",
            "memory_persist",
        ]
    );
    assert_eq!(outcome.answer(), "上季度销售额为 42 万元。");
    assert_eq!(
        count(&outcome, |k| matches!(k, EventKind::Handoff { to, .. } if to == "text2sql_agent")),
        1
    );

    // The worker saw only the task, not the parent history.
    let worker_request = &f.worker.requests()[0];
    let seen: Vec<_> = worker_request
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(Message::text)
        .collect();
    assert_eq!(seen, vec!["查询上季度销售额"]);

    // The worker's answer is part of the parent conversation.
    assert!(outcome.state.messages.iter().any(|m| {
        m.name.as_deref() == Some("text2sql_agent") && m.text() == "销售额为 42 万元"
    }));
    // Re-entry routed the seeded task message as a new user message.
    assert_eq!(
        outcome.state.last_memory_routed_message.as_deref(),
        Some("查询上季度销售额")
    );
    assert_eq!(f.judge.call_count(), 2);
}

#[tokio::test]
async fn preference_is_persisted_with_final_answer() {
    let f = Fixture::new();
    f.judge.push(ScriptStep::text(REMEMBER));
    f.supervisor.push(ScriptStep::text("好的，之后我会尽量简洁。"));

    let outcome = f
        .graph(25)
        .run(ConversationState::from_user_message("记住我喜欢简洁的回答").with_user_id("u7"))
        .await
        .unwrap();

    assert_eq!(outcome.path, vec!["memory_router", "supervisor", "memory_persist"]);
    assert_eq!(outcome.state.pending_memory_write, None);
    assert_eq!(
        count(&outcome, |k| matches!(k, EventKind::MemoryWriteStaged { .. })),
        1
    );
    assert_eq!(
        count(&outcome, |k| matches!(k, EventKind::MemoryWriteCommitted { .. })),
        1
    );

    let hits = f
        .backend
        .search("supervisor_memories/u7", "简洁的回答", 5, 0.0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("【最终回答】\n好的，之后我会尽量简洁。"));
}

#[tokio::test]
async fn empty_direct_answer_still_terminates() {
    let f = Fixture::new();
    f.judge.push(ScriptStep::text(FORGET));
    f.supervisor.push(ScriptStep::text(""));

    let outcome = f
        .graph(25)
        .run(ConversationState::from_user_message("hi"))
        .await
        .unwrap();
    assert_eq!(outcome.answer(), "");
    assert_eq!(outcome.path.last().map(String::as_str), Some("memory_persist"));
    assert!(matches!(
        outcome.events.last().map(|e| &e.kind),
        Some(EventKind::TurnCompleted { steps: 3 })
    ));
    let seqs: Vec<u64> = outcome.events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..seqs.len() as u64).collect::<Vec<_>>());
}

#[tokio::test]
async fn only_the_first_handoff_of_a_reply_is_honored() {
    let f = Fixture::new();
    f.judge.push(ScriptStep::text(FORGET));
    f.judge.push(ScriptStep::text(FORGET));
    f.supervisor.push(ScriptStep::tool_calls(vec![
        handoff("call_1", "first task"),
        handoff("call_2", "second task"),
    ]));
    f.supervisor.push(ScriptStep::text("done"));
    f.worker.push(ScriptStep::text("first result"));

    let outcome = f
        .graph(25)
        .run(ConversationState::from_user_message("do two things"))
        .await
        .unwrap();

    assert_eq!(f.worker.call_count(), 1);
    let results: Vec<_> = outcome
        .state
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| (m.tool_call_id.clone().unwrap_or_default(), m.text()))
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "call_1");
    assert!(results[0].1.contains("Successfully transferred"));
    assert_eq!(results[1].0, "call_2");
    assert!(results[1].1.contains("skipped"));
}

#[tokio::test]
async fn step_limit_aborts_without_persisting() {
    let f = Fixture::new();
    f.judge.push(ScriptStep::text(REMEMBER));
    f.judge.push(ScriptStep::text(FORGET));
    f.supervisor.push(ScriptStep::tool_calls(vec![handoff("call_1", "loop")]));
    f.supervisor.push(ScriptStep::tool_calls(vec![handoff("call_2", "loop again")]));
    f.worker.push(ScriptStep::text("partial"));
    f.worker.push(ScriptStep::text("partial"));

    let err = f
        .graph(5)
        .run(ConversationState::from_user_message("记住我喜欢表格"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RecursionLimit(5)));
    assert!(
        f.backend
            .search("supervisor_memories/anonymous", "表格", 5, 0.0)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn worker_failure_fails_the_turn() {
    let f = Fixture::new();
    f.judge.push(ScriptStep::text(FORGET));
    f.supervisor
        .push(ScriptStep::tool_calls(vec![handoff("call_1", "query")]));
    f.worker.push(ScriptStep::error("upstream timeout"));

    let err = f
        .graph(25)
        .run(ConversationState::from_user_message("query please"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Llm(_)));
}

#[tokio::test]
async fn memory_tools_are_available_to_the_supervisor() {
    let f = Fixture::new();
    f.judge.push(ScriptStep::text(FORGET));
    f.supervisor.push(ScriptStep::tool_call(
        "call_1",
        "memory_write",
        json!({ "content": "prefers charts", "metadata": { "source": "tool" } }),
    ));
    f.supervisor.push(ScriptStep::text("saved"));

    let graph = f.graph(25);
    let names = graph.supervisor().agent().tools().names().to_vec();
    assert!(names.contains(&"transfer_to_text2sql_agent".to_string()));
    assert!(names.contains(&"memory_search".to_string()));

    let outcome = graph
        .run(ConversationState::from_user_message("note that I like charts").with_user_id("u9"))
        .await
        .unwrap();
    assert_eq!(outcome.answer(), "saved");
    let hits = f
        .backend
        .search("supervisor_memories/u9", "charts", 5, 0.0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.get("source"), Some(&json!("tool")));
}
