use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use supervisor_rs::error::{Error, Result};
use supervisor_rs::graph::SupervisorGraph;
use supervisor_rs::llm::scripted::{ScriptStep, ScriptedChatModel};
use supervisor_rs::memory::InProcessBackend;
use supervisor_rs::model::ConversationState;
use supervisor_rs::worker::map_reduce::{NO_DATA_ANSWER, plan};
use supervisor_rs::worker::{Community, CommunitySource, MapReduceSearch};

/// Serves fixed reports and records the levels it was asked for.
#[derive(Default)]
struct FakeCommunities {
    reports: Vec<Community>,
    levels: Mutex<Vec<u32>>,
    fail: bool,
}

impl FakeCommunities {
    fn with_reports(contents: &[&str]) -> Self {
        Self {
            reports: contents
                .iter()
                .enumerate()
                .map(|(i, content)| Community {
                    id: format!("c{i}"),
                    content: content.to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl CommunitySource for FakeCommunities {
    async fn fetch(&self, level: u32) -> Result<Vec<Community>> {
        self.levels.lock().push(level);
        if self.fail {
            return Err(Error::Other("graph store offline".into()));
        }
        Ok(self.reports.clone())
    }
}

fn search(model: &ScriptedChatModel, source: Arc<FakeCommunities>) -> MapReduceSearch {
    MapReduceSearch::new("graphrag_agent", Arc::new(model.clone()), source).with_concurrency(1)
}

#[tokio::test]
async fn no_communities_short_circuits() {
    let model = ScriptedChatModel::new(Vec::new());
    let source = Arc::new(FakeCommunities::default());

    let answer = search(&model, source.clone()).search("main themes?", 2).await.unwrap();
    assert_eq!(answer, NO_DATA_ANSWER);
    assert_eq!(model.call_count(), 0);
    assert_eq!(*source.levels.lock(), vec![2]);
}

#[tokio::test]
async fn reduce_sees_map_outputs_in_community_order() {
    let model = ScriptedChatModel::new([
        ScriptStep::text("points from north"),
        ScriptStep::text("points from south"),
        ScriptStep::text("Sales grew in both regions."),
    ]);
    let source = Arc::new(FakeCommunities::with_reports(&[
        "north region report",
        "south region report",
    ]));

    let answer = search(&model, source)
        .with_response_type("a single paragraph")
        .search("how did sales go?", 0)
        .await
        .unwrap();
    assert_eq!(answer, "Sales grew in both regions.");

    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].messages[1].text().contains("north region report"));
    assert!(requests[1].messages[1].text().contains("south region report"));
    assert_eq!(requests[0].temperature, Some(0.3));

    let reduce_prompt = requests[2].messages[1].text();
    let north = reduce_prompt.find("points from north").unwrap();
    let south = reduce_prompt.find("points from south").unwrap();
    assert!(north < south);
    assert!(reduce_prompt.contains("how did sales go?"));
    assert!(reduce_prompt.contains("a single paragraph"));
}

#[tokio::test]
async fn failed_map_tasks_are_left_out() {
    let model = ScriptedChatModel::new([
        ScriptStep::error("timeout"),
        ScriptStep::text("points from south"),
        ScriptStep::text("Only the south reported."),
    ]);
    let source = Arc::new(FakeCommunities::with_reports(&["north", "south"]));

    let answer = search(&model, source).search("q", 0).await.unwrap();
    assert_eq!(answer, "Only the south reported.");
    let reduce_prompt = model.requests()[2].messages[1].text();
    assert!(reduce_prompt.contains("points from south"));
    assert!(!reduce_prompt.contains("timeout"));
}

#[tokio::test]
async fn all_maps_failing_is_an_error() {
    let model = ScriptedChatModel::new([ScriptStep::error("a"), ScriptStep::error("b")]);
    let source = Arc::new(FakeCommunities::with_reports(&["north", "south"]));

    let err = search(&model, source).search("q", 0).await.unwrap_err();
    assert!(matches!(err, Error::Llm(_)));
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn source_failure_propagates() {
    let model = ScriptedChatModel::new(Vec::new());
    let source = Arc::new(FakeCommunities {
        fail: true,
        ..FakeCommunities::default()
    });
    assert!(search(&model, source).search("q", 0).await.is_err());
    assert_eq!(model.call_count(), 0);
}

#[test]
fn plan_assigns_one_slot_per_community() {
    let tasks = plan(FakeCommunities::with_reports(&["a", "b", "c"]).reports);
    let indices: Vec<_> = tasks.iter().map(|t| t.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(tasks.iter().all(|t| t.result.is_none() && t.output().is_none()));
}

#[tokio::test]
async fn supervisor_hands_off_a_typed_task_with_level() {
    let forget = r#"{"should_write": false, "memory_summary": "", "reason": "question"}"#;
    let judge = ScriptedChatModel::new([ScriptStep::text(forget), ScriptStep::text(forget)]);
    let supervisor = ScriptedChatModel::new([
        ScriptStep::tool_call(
            "call_1",
            "transfer_to_graphrag_agent",
            json!({ "task": "what are the main themes?", "level": 1 }),
        ),
        ScriptStep::text("The main theme is growth."),
    ]);
    let worker_model = ScriptedChatModel::new([
        ScriptStep::text("growth everywhere"),
        ScriptStep::text("Growth is the main theme."),
    ]);
    let source = Arc::new(FakeCommunities::with_reports(&["report"]));

    let graph = SupervisorGraph::builder(Arc::new(supervisor), Arc::new(InProcessBackend::new()))
        .judge_model(Arc::new(judge))
        .worker(Arc::new(search(&worker_model, source.clone())))
        .build()
        .unwrap();

    let outcome = graph
        .run(ConversationState::from_user_message("summarize the dataset's themes"))
        .await
        .unwrap();

    assert_eq!(*source.levels.lock(), vec![1]);
    assert_eq!(outcome.answer(), "The main theme is growth.");
    assert!(outcome.path.contains(&"graphrag_agent".to_string()));
    assert!(outcome.state.messages.iter().any(|m| {
        m.name.as_deref() == Some("graphrag_agent") && m.text() == "Growth is the main theme."
    }));
}
