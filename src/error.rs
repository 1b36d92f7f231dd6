use crate::types::ApprovalStatus;

/// Broad classification of a [`ModerationError`], for callers mapping errors
/// onto a transport (status codes, retry policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Unauthorized,
    OutOfOrder,
    StoreFailure,
}

#[derive(thiserror::Error, Debug)]
pub enum ModerationError {
    #[error("record {record_id} not found in {table}")]
    RecordNotFound { table: String, record_id: u64 },
    #[error("approval request {0} not found")]
    RequestNotFound(u64),
    #[error("step {0} not found")]
    StepNotFound(u64),
    #[error("approval request needs at least one step")]
    EmptySequence,
    #[error("moderation is already {0}")]
    AlreadyModerated(ApprovalStatus),
    #[error("step must be pending")]
    StepNotPending { step_id: u64 },
    #[error("moderator not authorized for this step")]
    Unauthorized { step_id: u64, moderator: String },
    #[error("request already finished")]
    RequestFinished { request_id: u64 },
    #[error("step is not the current step")]
    OutOfOrder {
        step_id: u64,
        expected: u32,
        ordinal: Option<u32>,
    },
    #[error("store failure: {0}")]
    Store(#[from] sled::Error),
    #[error("failed to decode {0}")]
    Decode(&'static str),
    #[error("failed to encode {0}")]
    Encode(&'static str),
}

impl ModerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModerationError::RecordNotFound { .. }
            | ModerationError::RequestNotFound(_)
            | ModerationError::StepNotFound(_) => ErrorKind::NotFound,
            ModerationError::EmptySequence
            | ModerationError::AlreadyModerated(_)
            | ModerationError::StepNotPending { .. }
            | ModerationError::RequestFinished { .. } => ErrorKind::InvalidState,
            ModerationError::Unauthorized { .. } => ErrorKind::Unauthorized,
            ModerationError::OutOfOrder { .. } => ErrorKind::OutOfOrder,
            ModerationError::Store(_)
            | ModerationError::Decode(_)
            | ModerationError::Encode(_) => ErrorKind::StoreFailure,
        }
    }

    /// Stable machine-readable code for the error
    pub fn code(&self) -> &'static str {
        match self {
            ModerationError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            ModerationError::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            ModerationError::StepNotFound(_) => "STEP_NOT_FOUND",
            ModerationError::EmptySequence => "EMPTY_SEQUENCE",
            ModerationError::AlreadyModerated(ApprovalStatus::Pending) => "ALREADY_PENDING",
            ModerationError::AlreadyModerated(ApprovalStatus::Approved) => "ALREADY_APPROVED",
            ModerationError::AlreadyModerated(ApprovalStatus::Rejected) => "ALREADY_REJECTED",
            ModerationError::StepNotPending { .. } => "STEP_NOT_PENDING",
            ModerationError::Unauthorized { .. } => "UNAUTHORIZED",
            ModerationError::RequestFinished { .. } => "REQUEST_FINISHED",
            ModerationError::OutOfOrder { .. } => "OUT_OF_ORDER",
            ModerationError::Store(_) => "STORE_FAILURE",
            ModerationError::Decode(_) => "DECODE_FAILURE",
            ModerationError::Encode(_) => "ENCODE_FAILURE",
        }
    }
}

impl From<sled::transaction::TransactionError<ModerationError>> for ModerationError {
    fn from(value: sled::transaction::TransactionError<ModerationError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => ModerationError::Store(err),
        }
    }
}
