//! Learner's license application intake and review.
//!
//! Applicants submit personal details and three document scans; staff review,
//! approve, or reject them behind token-authenticated admin routes.

pub mod access;
pub mod adapters;
pub mod config;
pub mod error;
pub mod intake;
pub mod router;
pub mod telemetry;

pub use router::{api_router, ServiceState};
