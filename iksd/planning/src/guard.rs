// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cluster actionability
//!
//! A cluster accepts tenant changes only when it is settled: not being
//! created, upgraded or deleted, and with the operator having converged on
//! the latest revision.

use iks_common::api::external::Error;
use iks_db_model::ClusterState;

pub const NOT_ACTIONABLE: &str = "Cluster not in actionable state";

/// Whether tenant mutations are allowed on a cluster
pub fn is_actionable(state: ClusterState, latest_change_applied: bool) -> bool {
    !matches!(
        state,
        ClusterState::Pending
            | ClusterState::Updating
            | ClusterState::DeletePending
            | ClusterState::Deleting
            | ClusterState::Deleted
    ) && latest_change_applied
}

pub fn require_actionable(
    state: ClusterState,
    latest_change_applied: bool,
) -> Result<(), Error> {
    if is_actionable(state, latest_change_applied) {
        Ok(())
    } else {
        Err(Error::failed_precondition(NOT_ACTIONABLE))
    }
}

/// Whether an operator status report may be committed
///
/// This is looser than [`is_actionable`]: a cluster that is `Updating` still
/// takes status.  Returns the reason the report must be discarded otherwise.
pub fn check_status_report(
    state: ClusterState,
    latest_change_applied: bool,
) -> Result<(), String> {
    if matches!(
        state,
        ClusterState::Pending
            | ClusterState::DeletePending
            | ClusterState::Deleting
            | ClusterState::Deleted
    ) {
        return Err(format!("cluster is {state}"));
    }
    if !latest_change_applied {
        return Err("latest revision has not been applied".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_actionable_states() {
        let actionable: Vec<ClusterState> = ClusterState::iter()
            .filter(|s| is_actionable(*s, true))
            .collect();
        assert_eq!(actionable, vec![ClusterState::Active, ClusterState::Error]);
        for state in ClusterState::iter() {
            assert!(!is_actionable(state, false));
        }
    }

    #[test]
    fn test_require_actionable_message() {
        let err = require_actionable(ClusterState::Updating, true).unwrap_err();
        assert_eq!(err.to_string(), NOT_ACTIONABLE);
        assert!(require_actionable(ClusterState::Active, true).is_ok());
    }

    #[test]
    fn test_status_report_gate() {
        assert!(check_status_report(ClusterState::Updating, true).is_ok());
        assert!(check_status_report(ClusterState::Active, true).is_ok());
        assert_eq!(
            check_status_report(ClusterState::Deleting, true),
            Err("cluster is Deleting".to_string())
        );
        assert!(check_status_report(ClusterState::Active, false).is_err());
    }
}
