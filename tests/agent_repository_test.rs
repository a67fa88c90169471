//! Integration tests for `SqliteAgentRepository` against a real migrated database.

mod common;

use abathur::adapters::sqlite::SqliteAgentRepository;
use abathur::domain::models::{Agent, AgentStatus, AgentType};
use abathur::domain::ports::{AgentFilter, AgentRepository};
use uuid::Uuid;

#[tokio::test]
async fn create_and_get_roundtrips_agent() {
    let pool = common::test_pool().await;
    let repo = SqliteAgentRepository::new(pool);
    let workflow_id = Uuid::new_v4();

    let agent = Agent::new(workflow_id, AgentType::Phase, "session-1", "/tmp/worktree-1");
    repo.create(&agent).await.unwrap();

    let fetched = repo.get(agent.id).await.unwrap().expect("agent should exist");
    assert_eq!(fetched.agent_type, AgentType::Phase);
    assert_eq!(fetched.status, AgentStatus::Spawning);
}

#[tokio::test]
async fn list_active_excludes_terminated_agents() {
    let pool = common::test_pool().await;
    let repo = SqliteAgentRepository::new(pool);
    let workflow_id = Uuid::new_v4();

    let mut working = Agent::new(workflow_id, AgentType::Phase, "s1", "/tmp/wt1");
    working.mark_working();
    repo.create(&working).await.unwrap();

    let mut terminated = Agent::new(workflow_id, AgentType::Phase, "s2", "/tmp/wt2");
    terminated.terminate();
    repo.create(&terminated).await.unwrap();

    let active = repo.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, working.id);
}

#[tokio::test]
async fn list_filters_by_agent_type() {
    let pool = common::test_pool().await;
    let repo = SqliteAgentRepository::new(pool);
    let workflow_id = Uuid::new_v4();

    repo.create(&Agent::new(workflow_id, AgentType::Phase, "s1", "/tmp/wt1")).await.unwrap();
    repo.create(&Agent::new(workflow_id, AgentType::Validator, "s2", "/tmp/wt2")).await.unwrap();

    let validators = repo.list(AgentFilter { agent_type: Some(AgentType::Validator), ..Default::default() }).await.unwrap();
    assert_eq!(validators.len(), 1);
    assert_eq!(validators[0].agent_type, AgentType::Validator);
}

#[tokio::test]
async fn get_by_task_finds_the_assigned_agent() {
    let pool = common::test_pool().await;
    let repo = SqliteAgentRepository::new(pool);
    let workflow_id = Uuid::new_v4();
    let task_id = Uuid::new_v4();

    let mut agent = Agent::new(workflow_id, AgentType::Phase, "s1", "/tmp/wt1");
    agent.task_id = Some(task_id);
    repo.create(&agent).await.unwrap();

    let fetched = repo.get_by_task(task_id).await.unwrap().expect("agent should be found by task");
    assert_eq!(fetched.id, agent.id);
    assert!(repo.get_by_task(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_removes_agent() {
    let pool = common::test_pool().await;
    let repo = SqliteAgentRepository::new(pool);
    let agent = Agent::new(Uuid::new_v4(), AgentType::Phase, "s1", "/tmp/wt1");
    repo.create(&agent).await.unwrap();

    repo.delete(agent.id).await.unwrap();
    assert!(repo.get(agent.id).await.unwrap().is_none());
}
