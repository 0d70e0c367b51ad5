use std::sync::Arc;

use pretty_assertions::assert_eq;
use supervisor_rs::graph::{MemoryRouter, WriteJudge};
use supervisor_rs::llm::scripted::{ScriptStep, ScriptedChatModel};
use supervisor_rs::memory::{InProcessBackend, MemoryBackend, Namespaces};
use supervisor_rs::model::{ConversationState, Message, Metadata, Role};

fn router(model: &ScriptedChatModel, backend: Arc<InProcessBackend>) -> MemoryRouter {
    MemoryRouter::new(
        backend,
        Namespaces::default(),
        WriteJudge::new(Arc::new(model.clone())),
    )
}

const REMEMBER: &str = r#"{"should_write": true, "memory_summary": "用户喜欢简洁的回答", "reason": "明确表达的长期偏好"}"#;
const FORGET: &str = r#"{"should_write": false, "memory_summary": "", "reason": "一次性计算问题"}"#;

#[tokio::test]
async fn preference_is_staged_and_arithmetic_is_not() {
    let model = ScriptedChatModel::new([ScriptStep::text(REMEMBER), ScriptStep::text(FORGET)]);
    let router = router(&model, Arc::new(InProcessBackend::new()));

    let mut state = ConversationState::from_user_message("记住我喜欢简洁的回答").with_user_id("u1");
    let update = router.route(&state).await;
    let staged = update
        .pending_memory_write
        .clone()
        .flatten()
        .expect("preference should be staged");
    assert_eq!(staged.namespace, "supervisor_memories/u1");
    assert_eq!(staged.query, "记住我喜欢简洁的回答");
    assert!(!staged.summary.is_empty());
    state.apply(update);

    state.messages.push(Message::assistant("好的").with_name("supervisor"));
    state.messages.push(Message::user("1+2是多少"));
    let update = router.route(&state).await;
    assert_eq!(update.pending_memory_write, None);
    assert_eq!(update.last_memory_routed_message.as_deref(), Some("1+2是多少"));
    assert_eq!(model.call_count(), 2);

    let judge_prompt = model.requests()[1].messages[1].text();
    assert!(judge_prompt.contains("1+2是多少"));
}

#[tokio::test]
async fn unchanged_message_is_not_routed_twice() {
    let model = ScriptedChatModel::new([ScriptStep::text(FORGET)]);
    let router = router(&model, Arc::new(InProcessBackend::new()));

    let mut state = ConversationState::from_user_message("what were last quarter's sales?");
    let first = router.route(&state).await;
    assert!(!first.is_empty());
    state.apply(first);

    // A worker answered; no new user input.
    state.messages.push(Message::assistant("sales were 42").with_name("text2sql_agent"));
    let second = router.route(&state).await;
    assert!(second.is_empty());
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn fenced_judgment_is_understood() {
    let reply = format!("```json\n{REMEMBER}\n```");
    let model = ScriptedChatModel::new([ScriptStep::text(reply)]);
    let router = router(&model, Arc::new(InProcessBackend::new()));

    let update = router
        .route(&ConversationState::from_user_message("以后都用中文回答"))
        .await;
    assert!(matches!(update.pending_memory_write, Some(Some(_))));
}

#[tokio::test]
async fn bad_judgment_or_failed_call_never_stages() {
    let model = ScriptedChatModel::new([
        ScriptStep::text("yes, definitely remember that"),
        ScriptStep::error("rate limited"),
    ]);
    let router = router(&model, Arc::new(InProcessBackend::new()));

    let update = router
        .route(&ConversationState::from_user_message("remember I like tables"))
        .await;
    assert_eq!(update.pending_memory_write, None);
    assert!(update.last_memory_routed_message.is_some());

    let update = router
        .route(&ConversationState::from_user_message("from now on use charts"))
        .await;
    assert_eq!(update.pending_memory_write, None);
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn related_memories_are_injected() {
    let backend = Arc::new(InProcessBackend::new());
    backend
        .write(
            "supervisor_memories/anonymous",
            "user prefers bar charts for sales",
            Metadata::new(),
        )
        .await
        .unwrap();
    let model = ScriptedChatModel::new([ScriptStep::text(FORGET)]);
    let router = router(&model, backend);

    let update = router
        .route(&ConversationState::from_user_message("plot sales charts"))
        .await;
    let recall = &update.messages[0];
    assert_eq!(recall.role, Role::System);
    assert!(recall.text().contains("user prefers bar charts for sales"));

    let judge_prompt = model.requests()[0].messages[1].text();
    assert!(judge_prompt.contains("user prefers bar charts for sales"));
}

#[tokio::test]
async fn no_user_message_is_a_no_op() {
    let model = ScriptedChatModel::new(Vec::new());
    let router = router(&model, Arc::new(InProcessBackend::new()));
    let state = ConversationState {
        messages: vec![Message::system("setup")],
        ..ConversationState::default()
    };
    assert!(router.route(&state).await.is_empty());
    assert_eq!(model.call_count(), 0);
}
