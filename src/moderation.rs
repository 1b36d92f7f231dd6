//! Moderation entities and the pure state derivation over them
use super::error::ModerationError;
use super::types::{ApprovalStatus, Decision, TimeStamp, UserId};
use chrono::Utc;

/// Points a target record at the head of its moderation chain.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RecordLink {
    #[n(0)]
    pub record_table: String,
    #[n(1)]
    pub record_id: u64,
    #[n(2)]
    pub approval_request_id: u64,
}

/// One approval chain instance for a target record.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalRequest {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub external_ref: String, // bech32 encoded uuid7
    #[n(2)]
    pub record_table: String,
    #[n(3)]
    pub record_id: u64,
    #[n(4)]
    pub requested_by: UserId,
    #[n(5)]
    pub ordered: bool,
    #[n(6)]
    pub step_total: u32,
    #[n(7)]
    pub step_current: u32, // number of steps decided so far
    #[n(8)]
    pub status: ApprovalStatus,
    #[n(9)]
    pub last_decided_step_id: Option<u64>,
    #[n(10)]
    pub supersedes: Option<u64>,
    #[n(11)]
    pub step_ids: Vec<u64>, // creation order, fixed with step_total
    #[n(12)]
    pub created_at: TimeStamp<Utc>,
}

/// A single decision point within a request.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalStep {
    #[n(0)]
    pub id: u64,
    #[n(1)]
    pub approval_request_id: u64,
    #[n(2)]
    pub external_ref: String,
    #[n(3)]
    pub ordinal: Option<u32>,
    #[n(4)]
    pub outcome: ApprovalStatus,
    #[n(5)]
    pub is_current: bool,
    #[n(6)]
    pub decided_by: Option<UserId>,
    #[n(7)]
    pub remarks: Option<String>,
    #[n(8)]
    pub attachment_ref: Option<u64>,
    #[n(9)]
    pub decided_at: Option<TimeStamp<Utc>>,
}

/// The set of users allowed to decide a step. Any one of them may act.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApproverAssignment {
    #[n(0)]
    pub step_id: u64,
    #[n(1)]
    pub approvers: Vec<UserId>,
}

/// Approver group for one entry of a submitted step sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSpec {
    pub approvers: Vec<UserId>,
}

/// A moderator's vote on a step, as handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDecision {
    pub moderator: UserId,
    pub decision: Decision,
    pub remarks: Option<String>,
    pub attachment_ref: Option<u64>,
}

/// Snapshot returned by a successful decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub request: ApprovalRequest,
    pub step: ApprovalStep,
}

/// A created request together with its steps, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalChain {
    pub request: ApprovalRequest,
    pub steps: Vec<ApprovalStep>,
}

impl ApprovalRequest {
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
    /// Counter value a step must carry as its ordinal to be decidable next.
    pub fn next_counter(&self) -> u32 {
        self.step_current + 1
    }
}

impl ApprovalStep {
    pub fn new(
        id: u64,
        approval_request_id: u64,
        external_ref: String,
        index: usize,
        ordered: bool,
    ) -> Self {
        Self {
            id,
            approval_request_id,
            external_ref,
            ordinal: ordered.then_some(index as u32 + 1),
            outcome: ApprovalStatus::Pending,
            is_current: ordered && index == 0,
            decided_by: None,
            remarks: None,
            attachment_ref: None,
            decided_at: None,
        }
    }
    pub fn is_pending(&self) -> bool {
        self.outcome == ApprovalStatus::Pending
    }
    /// Writes every decision field at once and closes the step.
    pub fn record_decision(&mut self, decision: &StepDecision) {
        self.outcome = decision.decision.into();
        self.decided_by = Some(decision.moderator.clone());
        self.remarks = decision.remarks.clone();
        self.attachment_ref = decision.attachment_ref;
        self.is_current = false;
        self.decided_at = Some(TimeStamp::new());
    }
}

impl ApproverAssignment {
    pub fn new(step_id: u64, approvers: impl IntoIterator<Item = UserId>) -> Self {
        let mut approvers: Vec<UserId> = approvers.into_iter().collect();
        approvers.sort();
        approvers.dedup();

        Self { step_id, approvers }
    }
    pub fn permits(&self, user: &UserId) -> bool {
        self.approvers.binary_search(user).is_ok()
    }
}

impl StepSpec {
    pub fn new<I, U>(approvers: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        Self {
            approvers: approvers.into_iter().map(Into::into).collect(),
        }
    }
}

impl StepDecision {
    pub fn new(moderator: impl Into<UserId>, decision: Decision) -> Self {
        Self {
            moderator: moderator.into(),
            decision,
            remarks: None,
            attachment_ref: None,
        }
    }
    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }
    pub fn with_attachment(mut self, attachment_ref: u64) -> Self {
        self.attachment_ref = Some(attachment_ref);
        self
    }
}

/// Status of a request after one more step has been decided.
///
/// A rejection finalises the request immediately regardless of what is still
/// pending; an approval only does so once nothing else is pending.
pub fn aggregate_status(decision: Decision, remaining_pending: usize) -> ApprovalStatus {
    match decision {
        Decision::Reject => ApprovalStatus::Rejected,
        Decision::Approve if remaining_pending == 0 => ApprovalStatus::Approved,
        Decision::Approve => ApprovalStatus::Pending,
    }
}

/// Decides whether a record may get a new request given the request its link
/// currently points at. Returns the id the new request supersedes.
pub fn creation_guard(
    prior: Option<&ApprovalRequest>,
    resubmit_after_rejection: bool,
) -> Result<Option<u64>, ModerationError> {
    match prior {
        None => Ok(None),
        Some(prior) if resubmit_after_rejection && prior.status == ApprovalStatus::Rejected => {
            Ok(Some(prior.id))
        }
        Some(prior) => Err(ModerationError::AlreadyModerated(prior.status)),
    }
}
