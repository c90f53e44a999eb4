// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! What reconciliation does with each stored resource
//!
//! Removal is two-phase.  A tenant request first moves a resource to
//! `Deleting` (and out of the desired-state document); the operator tears it
//! down and stops reporting it; only then does reconciliation remove the
//! row.  A resource that merely goes missing from one report, without having
//! been marked `Deleting`, is left alone.
//!
//! Each function here maps the stored state of one resource, and what the
//! latest report says about it, to an [`Action`].

use iks_db_model::{
    AddonState, FirewallState, NodeGroupState, StorageState, VipState,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Write the reported status over the stored row
    Upsert,
    /// Leave the stored row untouched
    Skip,
    /// Remove the row (and its children)
    Delete,
    /// Keep the row as an audit record, in its terminal state
    Finalize,
    /// Remove the vip unless a firewall rule still guards it
    DeleteUnlessFirewall,
    /// Blank the firewall rule: "Not Specified", no source ips, no protocols
    Reset,
}

pub fn nodegroup(stored: NodeGroupState, reported: bool) -> Action {
    match (stored, reported) {
        (NodeGroupState::Deleting, true) => Action::Skip,
        (NodeGroupState::Deleting, false) => Action::Delete,
        (_, true) => Action::Upsert,
        (_, false) => Action::Skip,
    }
}

pub fn addon(stored: AddonState, reported: bool) -> Action {
    match (stored, reported) {
        (_, true) => Action::Upsert,
        (AddonState::Deleting, false) => Action::Delete,
        (_, false) => Action::Skip,
    }
}

/// `reported` is the state the operator reports for the vip, if it reports
/// the vip at all.
pub fn vip(stored: VipState, reported: Option<VipState>) -> Action {
    match (stored, reported) {
        (VipState::Deleting, None | Some(VipState::Deleting)) => {
            Action::DeleteUnlessFirewall
        }
        (VipState::Deleting, Some(_)) => Action::Skip,
        (_, Some(_)) => Action::Upsert,
        (_, None) => Action::Skip,
    }
}

pub fn storage(stored: StorageState, reported: bool) -> Action {
    match (stored, reported) {
        (_, true) => Action::Upsert,
        (StorageState::Deleting, false) => Action::Finalize,
        (_, false) => Action::Skip,
    }
}

/// The firewall controller owns a rule while it is being deleted; its state
/// only moves forward once the rule is reported `Deleted`.
pub fn firewall(
    stored: FirewallState,
    reported: Option<FirewallState>,
) -> Action {
    match (stored, reported) {
        (FirewallState::Deleting, Some(FirewallState::Deleted)) => {
            Action::Upsert
        }
        (FirewallState::Deleting, Some(_)) => Action::Skip,
        (_, Some(_)) => Action::Upsert,
        (_, None) => Action::Reset,
    }
}

/// A firewall entry reported without a state has not been picked up by the
/// firewall controller yet.
pub fn reported_firewall_state(
    state: &str,
) -> Result<FirewallState, iks_db_model::UnknownVariant> {
    if state.is_empty() {
        Ok(FirewallState::Pending)
    } else {
        state.parse()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_nodegroup_table() {
        for state in NodeGroupState::iter() {
            let expected = match state {
                NodeGroupState::Deleting => (Action::Skip, Action::Delete),
                _ => (Action::Upsert, Action::Skip),
            };
            assert_eq!(
                (nodegroup(state, true), nodegroup(state, false)),
                expected
            );
        }
    }

    #[test]
    fn test_addon_table() {
        for state in AddonState::iter() {
            assert_eq!(addon(state, true), Action::Upsert);
            let absent = addon(state, false);
            if state == AddonState::Deleting {
                assert_eq!(absent, Action::Delete);
            } else {
                assert_eq!(absent, Action::Skip);
            }
        }
    }

    #[test]
    fn test_vip_table() {
        for reported in VipState::iter() {
            let expected = if reported == VipState::Deleting {
                Action::DeleteUnlessFirewall
            } else {
                Action::Skip
            };
            assert_eq!(vip(VipState::Deleting, Some(reported)), expected);
            assert_eq!(vip(VipState::Active, Some(reported)), Action::Upsert);
        }
        assert_eq!(vip(VipState::Deleting, None), Action::DeleteUnlessFirewall);
        assert_eq!(vip(VipState::Active, None), Action::Skip);
        assert_eq!(vip(VipState::Pending, None), Action::Skip);
    }

    #[test]
    fn test_storage_table() {
        for state in StorageState::iter() {
            assert_eq!(storage(state, true), Action::Upsert);
        }
        assert_eq!(storage(StorageState::Deleting, false), Action::Finalize);
        assert_eq!(storage(StorageState::Active, false), Action::Skip);
        assert_eq!(storage(StorageState::Deleted, false), Action::Skip);
    }

    #[test]
    fn test_firewall_table() {
        for reported in FirewallState::iter() {
            let expected = if reported == FirewallState::Deleted {
                Action::Upsert
            } else {
                Action::Skip
            };
            assert_eq!(
                firewall(FirewallState::Deleting, Some(reported)),
                expected
            );
        }
        for stored in FirewallState::iter() {
            assert_eq!(firewall(stored, None), Action::Reset);
        }
        assert_eq!(
            firewall(FirewallState::Active, Some(FirewallState::Pending)),
            Action::Upsert
        );
    }

    #[test]
    fn test_reported_firewall_state() {
        assert_eq!(reported_firewall_state(""), Ok(FirewallState::Pending));
        assert_eq!(
            reported_firewall_state("Active"),
            Ok(FirewallState::Active)
        );
        assert!(reported_firewall_state("Ready").is_err());
    }
}
