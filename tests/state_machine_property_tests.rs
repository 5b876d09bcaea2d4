//! Property-based tests for the contract state machine and status mapping
//!
//! The transition table is the single authority every status change passes
//! through, so these tests check its shape for all status pairs and check
//! that the remote status mapping never proposes something the table would
//! let a contract leave.
//!
//! What these tests DON'T cover:
//!
//! - Persistence and locking (see scenarios.rs)
//! - Callback authentication (see callback_property_tests.rs)

use esign_sync::reconcile::candidate_status;
use esign_sync::signal::RemoteSignal;
use esign_sync::status::{ContractStateMachine, ContractStatus};
use proptest::prelude::*;
use serde_json::json;

fn status_strategy() -> impl Strategy<Value = ContractStatus> {
    prop::sample::select(ContractStatus::ALL.to_vec())
}

/// Known and unknown remote flow codes
fn flow_code_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        prop::sample::select(vec![1i64, 2, 3, 4, 5, 6, 7, 8, 9, 10, 21]),
        -5i64..100,
    ]
}

fn approver_strategy() -> impl Strategy<Value = serde_json::Value> {
    (
        prop::sample::select(vec!["PERSON", "ORGANIZATION", "ENTERPRISESERVER"]),
        0i64..7,
    )
        .prop_map(|(kind, status)| json!({"ApproveType": kind, "ApproveStatus": status}))
}

fn signal_strategy() -> impl Strategy<Value = RemoteSignal> {
    (
        flow_code_strategy(),
        prop::collection::vec(approver_strategy(), 0..4),
    )
        .prop_map(|(code, approvers)| {
            serde_json::from_value(json!({
                "FlowId": "flow-prop",
                "FlowStatus": code,
                "Approvers": approvers,
            }))
            .unwrap()
        })
}

proptest! {
    /// A status never lists itself as a next status
    #[test]
    fn no_self_transitions(status in status_strategy()) {
        prop_assert!(!ContractStateMachine::is_valid_transition(status, status));
    }

    /// Terminal statuses have no way out
    #[test]
    fn terminal_statuses_are_final(from in status_strategy(), to in status_strategy()) {
        if ContractStateMachine::is_terminal(from) {
            prop_assert!(!ContractStateMachine::is_valid_transition(from, to));
        }
    }

    /// is_valid_transition agrees with next_valid_statuses
    #[test]
    fn validity_matches_table(from in status_strategy(), to in status_strategy()) {
        let listed = ContractStateMachine::next_valid_statuses(from).contains(&to);
        prop_assert_eq!(ContractStateMachine::is_valid_transition(from, to), listed);
    }

    /// The enum's own notion of terminal matches the table
    #[test]
    fn terminal_flags_agree(status in status_strategy()) {
        prop_assert_eq!(status.is_terminal(), ContractStateMachine::is_terminal(status));
    }

    /// Nothing ever moves back to DRAFT
    #[test]
    fn draft_is_never_a_target(from in status_strategy()) {
        prop_assert!(!ContractStateMachine::is_valid_transition(from, ContractStatus::Draft));
    }

    /// The mapping never proposes DRAFT or PENDING_PARTY_B; those are set locally
    #[test]
    fn remote_signals_never_propose_local_statuses(signal in signal_strategy()) {
        let candidate = candidate_status(&signal);
        prop_assert_ne!(candidate, Some(ContractStatus::Draft));
        prop_assert_ne!(candidate, Some(ContractStatus::PendingPartyB));
    }

    /// Expiry is only corrected to completion when every approver signed
    #[test]
    fn expiry_correction_requires_all_signed(signal in signal_strategy()) {
        if signal.flow_status == 5 {
            let expected = if signal.all_approvers_signed() {
                ContractStatus::Completed
            } else {
                ContractStatus::Expired
            };
            prop_assert_eq!(candidate_status(&signal), Some(expected));
        }
    }
}

#[test]
fn pending_party_b_can_complete_directly() {
    assert!(ContractStateMachine::is_valid_transition(
        ContractStatus::PendingPartyB,
        ContractStatus::Completed
    ));
    assert!(!ContractStateMachine::is_valid_transition(
        ContractStatus::PendingPartyA,
        ContractStatus::Expired
    ));
}
