//! learnlock-core — The duel engine, claim pipeline, and review scheduler.
//!
//! This crate defines the data model, the capability and storage seams, and
//! every piece of policy the adversarial tutor applies: which claims are worth
//! asking about, how a dialogue escalates, how it is graded, and when the
//! concept comes back for review.

pub mod belief;
pub mod capability;
pub mod claims;
pub mod config;
pub mod contradiction;
pub mod engine;
pub mod error;
pub mod interrogator;
pub mod model;
pub mod parser;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod store;
pub mod traits;

pub use config::EngineConfig;
pub use engine::DuelEngine;
pub use error::{CapabilityError, EngineError, ProviderError};
