// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The desired-state document stored with every cluster revision
//!
//! Only the fields the control plane substitutes are typed.  Everything else
//! the operator put in the document (metadata, networking, advanced
//! configuration, ...) is carried through `extra` untouched, so a document
//! read from one revision and written to the next loses nothing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ClusterDocument {
    #[serde(default)]
    pub spec: ClusterSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub kubernetes_version: String,
    #[serde(default, rename = "instanceIMI")]
    pub instance_imi: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub runtime: String,
    #[serde(default)]
    pub kubernetes_provider: String,
    #[serde(default)]
    pub nodegroups: Vec<NodegroupTemplateSpec>,
    #[serde(default)]
    pub addons: Vec<AddonTemplateSpec>,
    #[serde(default)]
    pub ilbs: Vec<IlbTemplateSpec>,
    #[serde(default)]
    pub storage: Vec<StorageTemplateSpec>,
    #[serde(default)]
    pub firewall: Vec<FirewallTemplateSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ClusterSpec {
    pub fn nodegroup_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut NodegroupTemplateSpec> {
        self.nodegroups.iter_mut().find(|ng| ng.name == name)
    }

    /// Removes the named nodegroup, returning whether it was present
    pub fn remove_nodegroup(&mut self, name: &str) -> bool {
        let before = self.nodegroups.len();
        self.nodegroups.retain(|ng| ng.name != name);
        before != self.nodegroups.len()
    }

    /// Replaces or appends the firewall entry for `destination_ip`
    pub fn upsert_firewall(&mut self, rule: FirewallTemplateSpec) {
        match self
            .firewall
            .iter_mut()
            .find(|fw| fw.destination_ip == rule.destination_ip)
        {
            Some(existing) => *existing = rule,
            None => self.firewall.push(rule),
        }
    }

    /// Removes the named ILB, returning whether it was present
    pub fn remove_ilb(&mut self, name: &str) -> bool {
        let before = self.ilbs.len();
        self.ilbs.retain(|ilb| ilb.name != name);
        before != self.ilbs.len()
    }

    pub fn remove_firewall(&mut self, destination_ip: &str) {
        self.firewall.retain(|fw| fw.destination_ip != destination_ip);
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodegroupTemplateSpec {
    /// The nodegroup's unique id
    pub name: String,
    #[serde(default)]
    pub kubernetes_version: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default, rename = "instanceIMI")]
    pub instance_imi: String,
    #[serde(default)]
    pub count: i32,
    #[serde(default)]
    pub runtime: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct AddonTemplateSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub install_type: String,
    #[serde(default)]
    pub artifact: String,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct IlbTemplateSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub port: i32,
    #[serde(default)]
    pub iptype: String,
    #[serde(default)]
    pub ipprotocol: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub pool: IlbPoolTemplateSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct IlbPoolTemplateSpec {
    pub name: String,
    #[serde(default)]
    pub port: i32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct StorageTemplateSpec {
    pub provider: String,
    #[serde(default)]
    pub size: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallTemplateSpec {
    pub destination_ip: String,
    #[serde(default)]
    pub port: i32,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, rename = "sourceips")]
    pub source_ips: Vec<String>,
}
