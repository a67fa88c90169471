//! Integration tests for `SqliteWorkflowRepository` against a real migrated database.

mod common;

use abathur::adapters::sqlite::SqliteWorkflowRepository;
use abathur::domain::models::{OnResultFound, Phase, Workflow};
use abathur::domain::ports::WorkflowRepository;

#[tokio::test]
async fn create_and_get_roundtrips_workflow() {
    let pool = common::test_pool().await;
    let repo = SqliteWorkflowRepository::new(pool);

    let workflow = Workflow::new("ship the feature", "land the thing end to end").with_on_result_found(OnResultFound::StopAll);
    repo.create(&workflow).await.unwrap();

    let fetched = repo.get(workflow.id).await.unwrap().expect("workflow should exist");
    assert_eq!(fetched.name, "ship the feature");
    assert!(fetched.stops_all_on_result());
}

#[tokio::test]
async fn update_persists_board_config_changes() {
    let pool = common::test_pool().await;
    let repo = SqliteWorkflowRepository::new(pool);

    let mut workflow = Workflow::new("w", "goal");
    repo.create(&workflow).await.unwrap();

    workflow.board_config.ticket_human_review = true;
    repo.update(&workflow).await.unwrap();

    let fetched = repo.get(workflow.id).await.unwrap().unwrap();
    assert!(fetched.board_config.ticket_human_review);
}

#[tokio::test]
async fn list_returns_all_workflows() {
    let pool = common::test_pool().await;
    let repo = SqliteWorkflowRepository::new(pool);

    repo.create(&Workflow::new("a", "goal a")).await.unwrap();
    repo.create(&Workflow::new("b", "goal b")).await.unwrap();

    assert_eq!(repo.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn phases_are_ordered_by_sequence() {
    let pool = common::test_pool().await;
    let repo = SqliteWorkflowRepository::new(pool);

    let workflow = Workflow::new("w", "goal");
    repo.create(&workflow).await.unwrap();

    let phases = vec![
        Phase::new(workflow.id, 2, "build", "build it"),
        Phase::new(workflow.id, 1, "plan", "plan it"),
    ];
    repo.create_phases(&phases).await.unwrap();

    let ordered = repo.get_phases(workflow.id).await.unwrap();
    assert_eq!(ordered.iter().map(|p| p.sequence).collect::<Vec<_>>(), vec![1, 2]);

    let next = repo.get_next_phase(workflow.id, 1).await.unwrap().expect("a phase follows sequence 1");
    assert_eq!(next.name, "build");
    assert!(repo.get_next_phase(workflow.id, 2).await.unwrap().is_none());
}
