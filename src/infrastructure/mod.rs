//! Infrastructure layer
//!
//! Contains composition-root concerns that do not belong in the domain:
//! configuration loading (figment) and structured logging (tracing).

pub mod config;
pub mod logging;
