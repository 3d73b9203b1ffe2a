#![deny(missing_docs)]
//! Subgate core library.
//!
//! Per-user admission control (cooldown, channel-subscription gating,
//! in-flight tracking), configuration, and the collaborator clients the
//! transport calls once a request is admitted.

/// Admission control: clock, rate limiter, subscription checks, request gate.
pub mod admission;
/// Configuration management.
pub mod config;
/// Remote inference, vision and speech collaborators.
pub mod services;

pub use admission::{AdmitResult, RequestGate, UserId};
