//! # Derived State
//!
//! Pure recomputation of user-facing flags from the latest snapshot values.
//!
//! Fail-safe defaults when `messageCost` is unknown:
//! - `needs_approval` = true (require approval)
//! - `has_enough_balance` = false (block the spend)

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::domain::{ChainId, WalletSession};

/// Inputs read from one snapshot.
///
/// Balance and allowance may come from different ticks; the flags tolerate it.
#[derive(Clone, Copy, Debug, Default)]
pub struct DerivedInputs {
    /// Connected wallet, if any.
    pub session: Option<WalletSession>,
    /// Deployment chain.
    pub target_chain_id: ChainId,
    /// Cost of one message, once read.
    pub message_cost: Option<U256>,
    /// Latest balance; unknown counts as zero.
    pub balance: Option<U256>,
    /// Latest allowance; unknown counts as zero.
    pub allowance: Option<U256>,
    /// Approval transaction outstanding.
    pub approval_pending: bool,
    /// Post transaction outstanding.
    pub post_pending: bool,
}

/// Flags driving which actions the UI offers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFlags {
    /// Connected on a chain other than the deployment chain.
    pub wrong_network: bool,
    /// Allowance is below one message's cost.
    pub needs_approval: bool,
    /// Balance covers one message's cost.
    pub has_enough_balance: bool,
    /// An approval may be submitted now.
    pub can_approve: bool,
    /// A post may be submitted now (body validity aside).
    pub can_post: bool,
}

/// Recompute all flags.
pub fn compute_derived_flags(inputs: &DerivedInputs) -> DerivedFlags {
    let wrong_network = inputs
        .session
        .map(|s| s.chain_id != inputs.target_chain_id)
        .unwrap_or(false);

    let allowance = inputs.allowance.unwrap_or_default();
    let balance = inputs.balance.unwrap_or_default();

    let needs_approval = match inputs.message_cost {
        Some(cost) => allowance < cost,
        None => true,
    };
    let has_enough_balance = match inputs.message_cost {
        Some(cost) => balance >= cost,
        None => false,
    };

    let writable = inputs.session.is_some() && !wrong_network;

    DerivedFlags {
        wrong_network,
        needs_approval,
        has_enough_balance,
        can_approve: writable
            && inputs.message_cost.is_some()
            && needs_approval
            && has_enough_balance
            && !inputs.approval_pending,
        can_post: writable && !needs_approval && has_enough_balance && !inputs.post_pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Address;

    const TARGET: ChainId = 8453;

    fn inputs(cost: Option<u64>, balance: u64, allowance: u64) -> DerivedInputs {
        DerivedInputs {
            session: Some(WalletSession::new(Address([1u8; 20]), TARGET)),
            target_chain_id: TARGET,
            message_cost: cost.map(U256::from),
            balance: Some(U256::from(balance)),
            allowance: Some(U256::from(allowance)),
            approval_pending: false,
            post_pending: false,
        }
    }

    #[test]
    fn test_cost_100_balance_100_allowance_0() {
        let flags = compute_derived_flags(&inputs(Some(100), 100, 0));
        assert!(flags.needs_approval);
        assert!(flags.has_enough_balance);
        assert!(flags.can_approve);
        assert!(!flags.can_post);
    }

    #[test]
    fn test_allowance_equal_to_cost_needs_no_approval() {
        let flags = compute_derived_flags(&inputs(Some(100), 100, 100));
        assert!(!flags.needs_approval);
        assert!(flags.can_post);
        assert!(!flags.can_approve);
    }

    #[test]
    fn test_allowance_one_below_cost_needs_approval() {
        let flags = compute_derived_flags(&inputs(Some(100), 100, 99));
        assert!(flags.needs_approval);
    }

    #[test]
    fn test_balance_boundary() {
        assert!(compute_derived_flags(&inputs(Some(100), 100, 0)).has_enough_balance);
        assert!(!compute_derived_flags(&inputs(Some(100), 99, 0)).has_enough_balance);
    }

    #[test]
    fn test_unknown_cost_fails_safe() {
        let flags = compute_derived_flags(&inputs(None, 1_000_000, 1_000_000));
        assert!(flags.needs_approval);
        assert!(!flags.has_enough_balance);
        assert!(!flags.can_approve);
        assert!(!flags.can_post);
    }

    #[test]
    fn test_unknown_balance_and_allowance_count_as_zero() {
        let mut i = inputs(Some(1), 0, 0);
        i.balance = None;
        i.allowance = None;
        let flags = compute_derived_flags(&i);
        assert!(flags.needs_approval);
        assert!(!flags.has_enough_balance);
    }

    #[test]
    fn test_wrong_network_blocks_writes() {
        let mut i = inputs(Some(100), 500, 500);
        i.session = Some(WalletSession::new(Address([1u8; 20]), 1));
        let flags = compute_derived_flags(&i);
        assert!(flags.wrong_network);
        assert!(!flags.can_post);
        assert!(!flags.can_approve);
    }

    #[test]
    fn test_disconnected_is_not_wrong_network() {
        let mut i = inputs(Some(100), 0, 0);
        i.session = None;
        let flags = compute_derived_flags(&i);
        assert!(!flags.wrong_network);
        assert!(!flags.can_approve);
    }

    #[test]
    fn test_pending_transactions_block_resubmission() {
        let mut i = inputs(Some(100), 100, 0);
        i.approval_pending = true;
        assert!(!compute_derived_flags(&i).can_approve);

        let mut i = inputs(Some(100), 100, 100);
        i.post_pending = true;
        assert!(!compute_derived_flags(&i).can_post);
    }
}
