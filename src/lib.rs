//! Hephaestus - autonomous multi-agent swarm orchestrator.
//!
//! Architecture follows a ports-and-adapters layout:
//! - `domain` - entities, value objects and repository/client traits, no I/O
//! - `adapters` - concrete implementations of domain ports (SQLite, HTTP, substrates)
//! - `services` - application/use-case logic built on top of domain ports
//! - `infrastructure` - composition-root concerns: config loading, logging

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;
