// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Results returned by the control plane

use serde::{Deserialize, Serialize};

/// A version the cluster or a nodegroup may be upgraded to, with the machine
/// image artifact that goes with it
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct UpgradeTarget {
    pub version: String,
    pub imi: String,
}

/// Versions offered for a nodegroup, and the images that go with them
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct NodeGroupUpgrades {
    pub versions: Vec<String>,
    pub imis: Vec<String>,
}

impl NodeGroupUpgrades {
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl From<Vec<UpgradeTarget>> for NodeGroupUpgrades {
    fn from(targets: Vec<UpgradeTarget>) -> Self {
        let (versions, imis) =
            targets.into_iter().map(|t| (t.version, t.imi)).unzip();
        NodeGroupUpgrades { versions, imis }
    }
}

/// Result of applying an operator status report
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The report was written
    Applied,
    /// The cluster changed underneath the report, which was discarded.  The
    /// operator will report again.
    Superseded { reason: String },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ClusterCreated {
    pub cluster_uuid: String,
    pub name: String,
    pub k8sversion_name: String,
    pub state: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct NodeGroupCreated {
    pub nodegroup_uuid: String,
    pub name: String,
    pub state: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct VipCreated {
    pub vip_id: i32,
    pub name: String,
    pub state: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_targets_split() {
        let ups = NodeGroupUpgrades::from(vec![
            UpgradeTarget { version: "1.28.2".into(), imi: "img-a".into() },
            UpgradeTarget { version: "1.28.3".into(), imi: "img-b".into() },
        ]);
        assert_eq!(ups.versions, vec!["1.28.2", "1.28.3"]);
        assert_eq!(ups.imis, vec!["img-a", "img-b"]);
        assert!(NodeGroupUpgrades::from(vec![]).is_empty());
    }

    #[test]
    fn test_outcome_serialization() {
        let s = serde_json::to_string(&ReconcileOutcome::Superseded {
            reason: "cluster is Deleting".into(),
        })
        .unwrap();
        assert_eq!(
            s,
            r#"{"outcome":"superseded","reason":"cluster is Deleting"}"#
        );
    }
}
