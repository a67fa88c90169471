//! Integration tests for `TicketService` against a real `SqliteTicketRepository`,
//! exercising the blocking DAG, resolve/unblock propagation, and delete paths
//! that a pure in-memory repo stub can't catch (actual SQL, actual rows).

mod common;

use std::sync::Arc;

use abathur::adapters::sqlite::SqliteTicketRepository;
use abathur::domain::errors::DomainError;
use abathur::services::ticket_service::{TicketService, TicketServiceConfig};
use uuid::Uuid;

fn service(pool: sqlx::SqlitePool) -> TicketService {
    TicketService::new(Arc::new(SqliteTicketRepository::new(pool)), None, TicketServiceConfig::default())
}

#[tokio::test]
async fn resolving_a_blocker_reports_newly_unblocked_successors() {
    let pool = common::test_pool().await;
    let service = service(pool);
    let workflow_id = Uuid::new_v4();
    let columns = vec!["backlog".to_string(), "resolved".to_string()];

    let blocker = service.create_ticket(workflow_id, "Infra", "set up infra", "task", "backlog", false).await.unwrap();
    let blocked_a = service.create_ticket(workflow_id, "App A", "build app a", "task", "backlog", false).await.unwrap();
    let blocked_b = service.create_ticket(workflow_id, "App B", "build app b", "task", "backlog", false).await.unwrap();
    service.add_block(workflow_id, blocker.id, blocked_a.id).await.unwrap();
    service.add_block(workflow_id, blocker.id, blocked_b.id).await.unwrap();

    let (resolved, mut unblocked) = service.resolve(workflow_id, blocker.id, "infra is up", "resolved", &columns).await.unwrap();
    assert_eq!(resolved.id, blocker.id);
    unblocked.sort();
    let mut expected = vec![blocked_a.id, blocked_b.id];
    expected.sort();
    assert_eq!(unblocked, expected);
}

#[tokio::test]
async fn resolving_with_a_still_blocked_sibling_only_reports_the_freed_one() {
    let pool = common::test_pool().await;
    let service = service(pool);
    let workflow_id = Uuid::new_v4();
    let columns = vec!["backlog".to_string(), "resolved".to_string()];

    let blocker_a = service.create_ticket(workflow_id, "A", "a", "task", "backlog", false).await.unwrap();
    let blocker_b = service.create_ticket(workflow_id, "B", "b", "task", "backlog", false).await.unwrap();
    let doubly_blocked = service.create_ticket(workflow_id, "C", "c", "task", "backlog", false).await.unwrap();
    service.add_block(workflow_id, blocker_a.id, doubly_blocked.id).await.unwrap();
    service.add_block(workflow_id, blocker_b.id, doubly_blocked.id).await.unwrap();

    let (_, unblocked) = service.resolve(workflow_id, blocker_a.id, "done", "resolved", &columns).await.unwrap();
    assert!(unblocked.is_empty(), "C is still blocked by B, should not be reported as unblocked yet");

    let (_, unblocked) = service.resolve(workflow_id, blocker_b.id, "done", "resolved", &columns).await.unwrap();
    assert_eq!(unblocked, vec![doubly_blocked.id]);
}

#[tokio::test]
async fn delete_then_get_reports_not_found() {
    let pool = common::test_pool().await;
    let service = service(pool);
    let ticket = service.create_ticket(Uuid::new_v4(), "Throwaway", "n/a", "task", "backlog", false).await.unwrap();

    service.delete(ticket.id).await.unwrap();
    let err = service.get(ticket.id).await.unwrap_err();
    assert!(matches!(err, DomainError::TicketNotFound(id) if id == ticket.id));
}

#[tokio::test]
async fn rejecting_a_ticket_does_not_delete_the_row() {
    let pool = common::test_pool().await;
    let service = service(pool);
    let ticket = service.create_ticket(Uuid::new_v4(), "Needs review", "risky", "task", "backlog", true).await.unwrap();

    let rejected = service.reject(ticket.id).await.unwrap();
    assert_eq!(rejected.approval_status, abathur::domain::models::ApprovalStatus::Rejected);
    assert!(service.get(ticket.id).await.is_ok(), "reject flips status but keeps the row");
}
