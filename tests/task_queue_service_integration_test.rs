//! End-to-end queue dispatch test against real `SqliteTaskRepository` and
//! `SqliteAgentRepository`, confirming the dense 1-based `queue_position`
//! convention holds against actual SQL ordering, not just an in-memory stub.

mod common;

use std::sync::{Arc, Mutex};

use abathur::adapters::sqlite::{SqliteAgentRepository, SqliteGuardianRepository, SqliteTaskRepository};
use abathur::domain::errors::DomainResult;
use abathur::domain::models::{TaskPriority, TaskStatus};
use abathur::domain::ports::AgentSpawner;
use abathur::services::task_queue_service::{TaskQueueService, TaskQueueServiceConfig};
use async_trait::async_trait;
use uuid::Uuid;

struct RecordingSpawner {
    spawned: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl AgentSpawner for RecordingSpawner {
    async fn spawn_for_task(&self, task_id: Uuid) -> DomainResult<Uuid> {
        self.spawned.lock().unwrap().push(task_id);
        Ok(Uuid::new_v4())
    }
}

#[tokio::test]
async fn queue_positions_are_dense_and_one_based_against_real_storage() {
    let pool = common::test_pool().await;
    let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let agents = Arc::new(SqliteAgentRepository::new(pool.clone()));
    let guardian = Arc::new(SqliteGuardianRepository::new(pool));
    let spawner = Arc::new(RecordingSpawner { spawned: Mutex::new(Vec::new()) });

    let service = TaskQueueService::new(
        tasks.clone(),
        agents.clone(),
        guardian,
        None,
        None,
        TaskQueueServiceConfig { max_concurrent_agents: 1, ..TaskQueueServiceConfig::default() },
    );
    service.set_spawner(spawner.clone());

    let workflow_id = Uuid::new_v4();

    let first = service.create_task(workflow_id, "first task", "done", None, TaskPriority::Med, false).await.unwrap();
    assert_eq!(first.status, TaskStatus::Assigned);
    assert_eq!(spawner.spawned.lock().unwrap().len(), 1);

    let second = service.create_task(workflow_id, "second task", "done", None, TaskPriority::Med, false).await.unwrap();
    let third = service.create_task(workflow_id, "third task", "done", None, TaskPriority::Med, false).await.unwrap();

    let second = tasks.get(second.id).await.unwrap().unwrap();
    let third = tasks.get(third.id).await.unwrap().unwrap();
    assert_eq!(second.status, TaskStatus::Queued);
    assert_eq!(third.status, TaskStatus::Queued);
    assert_eq!(second.queue_position, Some(1));
    assert_eq!(third.queue_position, Some(2));
}

#[tokio::test]
async fn bumping_a_queued_task_dispatches_it_past_capacity() {
    let pool = common::test_pool().await;
    let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let agents = Arc::new(SqliteAgentRepository::new(pool.clone()));
    let guardian = Arc::new(SqliteGuardianRepository::new(pool));
    let spawner = Arc::new(RecordingSpawner { spawned: Mutex::new(Vec::new()) });

    let service = TaskQueueService::new(
        tasks.clone(),
        agents,
        guardian,
        None,
        None,
        TaskQueueServiceConfig { max_concurrent_agents: 1, bump_safety_multiplier: 4, ..TaskQueueServiceConfig::default() },
    );
    service.set_spawner(spawner.clone());

    let workflow_id = Uuid::new_v4();
    service.create_task(workflow_id, "occupies capacity", "done", None, TaskPriority::Med, false).await.unwrap();
    let queued = service.create_task(workflow_id, "queued task", "done", None, TaskPriority::Med, false).await.unwrap();
    assert_eq!(queued.status, TaskStatus::Queued);

    service.bump_task_priority(queued.id).await.unwrap();

    let bumped = tasks.get(queued.id).await.unwrap().unwrap();
    assert_eq!(bumped.status, TaskStatus::Assigned);
    assert!(bumped.priority_boosted);
    assert!(spawner.spawned.lock().unwrap().contains(&queued.id));
}
