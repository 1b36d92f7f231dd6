//! Smoke Screen Unit tests for moderation engine components
//!
//! These exercise the public building blocks in isolation from the store:
//! references, value types, entity helpers and error classification. They
//! mostly cover the happy path.
//!

use moderation_engine::{
    ApprovalStatus, ApproverAssignment, Config, Decision, ErrorKind, ModerationError, StepDecision,
    StepSpec, UserId,
    config::TableNames,
    moderation::{ApprovalStep, aggregate_status},
    store::{id_key, link_key},
    utils::new_uuid_to_bech32,
};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Test that references for requests and steps are distinguishable by prefix
    #[test]
    fn request_and_step_references_differ() {
        let request_ref = new_uuid_to_bech32("mod_").unwrap();
        let step_ref = new_uuid_to_bech32("step_").unwrap();

        assert!(request_ref.starts_with("mod_1"));
        assert!(step_ref.starts_with("step_1"));
        assert_ne!(request_ref, step_ref);
    }

    /// Test that multiple calls generate unique references
    #[test]
    fn generates_unique_references() {
        let a = new_uuid_to_bech32("mod_").unwrap();
        let b = new_uuid_to_bech32("mod_").unwrap();

        assert_ne!(a, b);
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;

    /// Test that status renders the words used in error reasons
    #[test]
    fn status_display_is_lowercase() {
        assert_eq!(ApprovalStatus::Pending.to_string(), "pending");
        assert_eq!(ApprovalStatus::Approved.to_string(), "approved");
        assert_eq!(ApprovalStatus::Rejected.to_string(), "rejected");
    }

    /// Test that a decision maps onto the matching terminal outcome
    #[test]
    fn decision_maps_to_outcome() {
        assert_eq!(ApprovalStatus::from(Decision::Approve), ApprovalStatus::Approved);
        assert_eq!(ApprovalStatus::from(Decision::Reject), ApprovalStatus::Rejected);
    }

    /// Test that user ids compare by their text
    #[test]
    fn user_ids_compare_by_value() {
        assert_eq!(UserId::from("user_1"), UserId::new(String::from("user_1")));
        assert_eq!(UserId::new("user_1").as_str(), "user_1");
    }
}

// MODERATION MODULE TESTS
#[cfg(test)]
mod moderation_tests {
    use super::*;

    /// Test that StepSpec collects approvers from plain strings
    #[test]
    fn step_spec_from_strings() {
        let spec = StepSpec::new(["user_1", "user_2"]);

        assert_eq!(spec.approvers, vec![UserId::new("user_1"), UserId::new("user_2")]);
    }

    /// Test that an empty approver group authorizes nobody
    #[test]
    fn empty_assignment_permits_nobody() {
        let assignment = ApproverAssignment::new(1, Vec::<UserId>::new());

        assert!(!assignment.permits(&UserId::new("user_1")));
    }

    /// Test that a decision without extras leaves remarks and attachment unset
    #[test]
    fn bare_decision_has_no_extras() {
        let mut step = ApprovalStep::new(1, 1, "step_ref".into(), 0, false);
        step.record_decision(&StepDecision::new("user_1", Decision::Approve));

        assert_eq!(step.outcome, ApprovalStatus::Approved);
        assert_eq!(step.remarks, None);
        assert_eq!(step.attachment_ref, None);
        // unordered steps only get an ordinal from the engine
        assert_eq!(step.ordinal, None);
    }

    /// Test the aggregation table for the last pending step
    #[test]
    fn last_step_decides_the_request() {
        assert_eq!(aggregate_status(Decision::Approve, 0), ApprovalStatus::Approved);
        assert_eq!(aggregate_status(Decision::Reject, 0), ApprovalStatus::Rejected);
    }
}

// STORE AND CONFIG TESTS
#[cfg(test)]
mod store_tests {
    use super::*;

    /// Test that id keys sort numerically as bytes
    #[test]
    fn id_keys_sort_numerically() {
        assert!(id_key(2) < id_key(10));
        assert!(id_key(255) < id_key(256));
    }

    /// Test that link keys are scoped by table
    #[test]
    fn link_keys_are_table_scoped() {
        assert!(link_key("posts", 1).starts_with(b"posts\0"));
        assert_ne!(link_key("posts", 1), link_key("pages", 1));
    }

    /// Test that the default config uses the mod_ prefix
    #[test]
    fn default_table_names() {
        assert_eq!(
            Config::default().table_names(),
            TableNames {
                requests: "mod_requests".into(),
                steps: "mod_steps".into(),
                step_users: "mod_step_users".into(),
                record_links: "mod_record_links".into(),
                records: "mod_rec:".into(),
            }
        );
    }
}

// ERROR MODULE TESTS
#[cfg(test)]
mod error_tests {
    use super::*;

    /// Test that every precondition has its own reason and kind
    #[test]
    fn preconditions_are_distinguishable() {
        let cases = [
            (
                ModerationError::StepNotPending { step_id: 1 },
                ErrorKind::InvalidState,
                "step must be pending",
            ),
            (
                ModerationError::Unauthorized {
                    step_id: 1,
                    moderator: "user_9".into(),
                },
                ErrorKind::Unauthorized,
                "moderator not authorized for this step",
            ),
            (
                ModerationError::RequestFinished { request_id: 1 },
                ErrorKind::InvalidState,
                "request already finished",
            ),
            (
                ModerationError::OutOfOrder {
                    step_id: 2,
                    expected: 1,
                    ordinal: Some(2),
                },
                ErrorKind::OutOfOrder,
                "step is not the current step",
            ),
            (
                ModerationError::AlreadyModerated(ApprovalStatus::Pending),
                ErrorKind::InvalidState,
                "moderation is already pending",
            ),
        ];

        for (err, kind, reason) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.to_string(), reason);
        }
    }

    /// Test that codec failures count as store failures
    #[test]
    fn codec_errors_are_store_failures() {
        assert_eq!(
            ModerationError::Decode("approval step").kind(),
            ErrorKind::StoreFailure
        );
        assert_eq!(ModerationError::Decode("approval step").code(), "DECODE_FAILURE");
    }
}
