// tests/skills_test.rs
// Skill catalogue loading and injection into the system prompt.

mod common;

use common::StreamTurn;
use std::sync::Arc;

use vega_backend::llm::EstimateCounter;
use vega_backend::queue::{Lane, TaskStatus};
use vega_backend::runtime::{Collaborators, Runtime};

const MARKET_SKILL: &str = "---\nname: market report\ndescription: Summarize market prices and treasury posture\ntriggers: [market report, daily brief]\npriority: 2\n---\n\nWhen reporting the market, lead with the treasury balance and cite sources.\n";

const HAIKU_SKILL: &str = "---\nname: haiku mode\ndescription: Answer in haiku\ntriggers: [haiku]\npriority: 1\n---\n\nAnswer strictly as a haiku.\n";

#[tokio::test]
async fn selected_skill_body_lands_in_system_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let skills_dir = dir.path().join("skills");
    tokio::fs::create_dir_all(&skills_dir).await.unwrap();
    tokio::fs::write(skills_dir.join("market-report.md"), MARKET_SKILL)
        .await
        .unwrap();
    tokio::fs::write(skills_dir.join("haiku.md"), HAIKU_SKILL)
        .await
        .unwrap();

    let config = common::test_config(dir.path().to_path_buf(), 1_000_000);
    let llm = common::ScriptedLlm::new();
    let wallet = common::MockWallet::new();
    let search = common::MockSearch::new();
    let social = common::MockSocial::new();
    let runtime = Runtime::with_parts(
        config,
        llm.clone(),
        Collaborators {
            wallet,
            search,
            social,
            browser: Arc::new(common::MockBrowser),
        },
        common::ManualClock::new(0),
        Arc::new(EstimateCounter),
    )
    .await
    .unwrap();

    llm.push_stream(StreamTurn::Text("Markets are calm.".to_string()));
    let result = runtime
        .submit_task(
            "give me the market report for our treasury",
            Vec::new(),
            Lane::Fast,
            None,
        )
        .await;
    assert_eq!(result.status, TaskStatus::Completed);

    let system = llm.last_system_prompt.lock().clone().unwrap();
    // Catalogue summary lists every skill; the matching skill's body is
    // injected under the active-skill block.
    assert!(system.contains("Available skills:"));
    assert!(system.contains("haiku mode"));
    assert!(system.contains("Active Skill Instructions:"));
    assert!(system.contains("lead with the treasury balance"));
    assert!(!system.contains("strictly as a haiku"));
}

#[tokio::test]
async fn no_skill_below_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let skills_dir = dir.path().join("skills");
    tokio::fs::create_dir_all(&skills_dir).await.unwrap();
    tokio::fs::write(skills_dir.join("haiku.md"), HAIKU_SKILL)
        .await
        .unwrap();

    let config = common::test_config(dir.path().to_path_buf(), 1_000_000);
    let llm = common::ScriptedLlm::new();
    let runtime = Runtime::with_parts(
        config,
        llm.clone(),
        Collaborators {
            wallet: common::MockWallet::new(),
            search: common::MockSearch::new(),
            social: common::MockSocial::new(),
            browser: Arc::new(common::MockBrowser),
        },
        common::ManualClock::new(0),
        Arc::new(EstimateCounter),
    )
    .await
    .unwrap();

    llm.push_stream(StreamTurn::Text("Hello!".to_string()));
    let result = runtime
        .submit_task("good morning, friend", Vec::new(), Lane::Fast, None)
        .await;
    assert_eq!(result.status, TaskStatus::Completed);

    let system = llm.last_system_prompt.lock().clone().unwrap();
    assert!(!system.contains("Active Skill Instructions:"));
}
