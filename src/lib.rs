pub mod config;
pub mod error;
pub mod moderation;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

pub use config::Config;
pub use error::{ErrorKind, ModerationError};
pub use moderation::{
    ApprovalChain, ApprovalRequest, ApprovalStep, ApproverAssignment, DecisionOutcome,
    RecordLink, StepDecision, StepSpec,
};
pub use service::ModerationService;
pub use store::{ModerationStore, Resource};
pub use types::{ApprovalStatus, Decision, UserId};
