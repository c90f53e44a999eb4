// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Status reported by the operator
//!
//! The operator sends one [`ClusterStatusReport`] per cluster after it has
//! driven infrastructure toward the latest revision.  Every list is optional
//! on the wire and treated as empty when absent.  States are carried as the
//! operator's strings and validated when they are applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatusReport {
    pub state: String,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub nodegroups: Vec<NodeGroupStatus>,
    #[serde(default)]
    pub addons: Vec<AddonStatus>,
    #[serde(default)]
    pub ilbs: Vec<IlbStatus>,
    #[serde(default)]
    pub storages: Vec<StorageStatus>,
    #[serde(default)]
    pub firewall: Vec<FirewallStatus>,
}

impl ClusterStatusReport {
    /// The report with its nested lists removed, as stored on the cluster row
    pub fn summary(&self) -> ClusterStatusReport {
        ClusterStatusReport {
            state: self.state.clone(),
            last_update: self.last_update,
            reason: self.reason.clone(),
            message: self.message.clone(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupStatus {
    /// The nodegroup's unique id
    pub name: String,
    pub count: i32,
    pub state: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub nodes: Vec<NodeStatus>,
}

impl NodeGroupStatus {
    /// The report without its node list, as stored on the nodegroup row
    pub fn summary(&self) -> NodeGroupStatus {
        NodeGroupStatus { nodes: Vec::new(), ..self.clone() }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub name: String,
    pub ip_address: String,
    /// Machine image artifact the node booted from
    #[serde(default, rename = "instanceIMI")]
    pub instance_imi: String,
    pub state: String,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dns_name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub weka_storage_status: WekaStorageStatus,
}

/// Sub-status of the storage sidecar running on a node
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WekaStorageStatus {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub custom_status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonStatus {
    /// The addon version name
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub artifact: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IlbStatus {
    /// `<cluster uuid>-<logical vip name>`
    pub name: String,
    pub state: String,
    /// Assigned address; empty until the load balancer is provisioned
    #[serde(default)]
    pub vip: String,
    /// Load balancer pool id; zero until the pool exists
    #[serde(default, rename = "poolID")]
    pub pool_id: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conditions: serde_json::Value,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    pub provider: String,
    #[serde(default)]
    pub size: String,
    pub state: String,
    #[serde(default)]
    pub namespace_created: bool,
    #[serde(default)]
    pub namespace_name: String,
    #[serde(default)]
    pub namespace_state: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallStatus {
    /// Firewall rule state; empty means the rule has not been picked up yet
    #[serde(default)]
    pub state: String,
    pub destination_ip: String,
    #[serde(default)]
    pub port: i32,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, rename = "sourceips")]
    pub source_ips: Vec<String>,
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minimal_report_parses() {
        let report: ClusterStatusReport =
            serde_json::from_str(r#"{"state": "Active"}"#).unwrap();
        assert_eq!(report.state, "Active");
        assert!(report.nodegroups.is_empty());
        assert!(report.firewall.is_empty());
    }

    #[test]
    fn test_nested_report_parses() {
        let report: ClusterStatusReport = serde_json::from_str(
            r#"{
                "state": "Updating",
                "message": "rolling workers",
                "nodegroups": [{
                    "name": "ng-abcdefghij",
                    "count": 1,
                    "state": "Updating",
                    "nodes": [{
                        "name": "w1",
                        "ipAddress": "10.0.0.5",
                        "instanceIMI": "iks-u22-wk-1-27-4",
                        "state": "Active",
                        "wekaStorageStatus": {"clientId": "c1"}
                    }]
                }],
                "ilbs": [{"name": "cl-x-etcd", "state": "Active",
                          "vip": "10.1.1.1", "poolID": 7}],
                "firewall": [{"destinationIp": "10.1.1.1",
                              "sourceips": ["0.0.0.0/0"]}]
            }"#,
        )
        .unwrap();
        let node = &report.nodegroups[0].nodes[0];
        assert_eq!(node.ip_address, "10.0.0.5");
        assert_eq!(node.instance_imi, "iks-u22-wk-1-27-4");
        assert_eq!(node.weka_storage_status.client_id, "c1");
        assert_eq!(report.ilbs[0].pool_id, 7);
        assert_eq!(report.firewall[0].state, "");
        assert_eq!(report.firewall[0].source_ips, vec!["0.0.0.0/0"]);

        let summary = report.summary();
        assert_eq!(summary.message, "rolling workers");
        assert!(summary.nodegroups.is_empty());
        assert!(report.nodegroups[0].summary().nodes.is_empty());
    }
}
