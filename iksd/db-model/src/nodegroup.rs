// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::impl_text_enum;
use crate::schema::{k8snode, nodegroup};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

impl_text_enum! {
    pub enum NodeGroupType;

    ControlPlane => "ControlPlane"
    Worker => "Worker"
}

impl_text_enum! {
    /// Lifecycle of a nodegroup
    ///
    /// `Creating` and `Error` only ever come from the operator.
    pub enum NodeGroupState;

    Pending => "Pending"
    Creating => "Creating"
    Active => "Active"
    Updating => "Updating"
    Deleting => "Deleting"
    Error => "Error"
}

impl NodeGroupState {
    /// Nodegroups in these states are mid-transition and are not offered
    /// upgrades.
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            NodeGroupState::Updating
                | NodeGroupState::Creating
                | NodeGroupState::Deleting
        )
    }
}

/// Database representation of a nodegroup
#[derive(
    Queryable, Selectable, Clone, Debug, PartialEq, Serialize, Deserialize,
)]
#[diesel(table_name = nodegroup)]
pub struct NodeGroup {
    pub nodegroup_id: i32,
    pub cluster_id: i32,
    pub unique_id: String,
    pub name: String,
    pub nodegrouptype_name: NodeGroupType,
    pub k8sversion_name: String,
    pub runtime_name: String,
    pub instancetype_name: String,
    pub osimageinstance_name: String,
    pub nodecount: i32,
    pub nodegroupstate_name: NodeGroupState,
    pub kubernetes_status: Option<serde_json::Value>,
    pub createddate: DateTime<Utc>,
}

impl NodeGroup {
    pub fn is_control_plane(&self) -> bool {
        self.nodegrouptype_name == NodeGroupType::ControlPlane
    }
}

#[derive(Insertable, Clone, Debug, PartialEq)]
#[diesel(table_name = nodegroup)]
pub struct NewNodeGroup {
    pub cluster_id: i32,
    pub unique_id: String,
    pub name: String,
    pub nodegrouptype_name: NodeGroupType,
    pub k8sversion_name: String,
    pub runtime_name: String,
    pub instancetype_name: String,
    pub osimageinstance_name: String,
    pub nodecount: i32,
    pub nodegroupstate_name: NodeGroupState,
    pub createddate: DateTime<Utc>,
}

/// A Kubernetes node as last reported by the operator
///
/// Nodes are keyed by `ip_address` when diffing a status report against the
/// database.  Their lifecycle state is owned by the operator and stored as
/// free-form text.
#[derive(
    Queryable, Selectable, Clone, Debug, PartialEq, Serialize, Deserialize,
)]
#[diesel(table_name = k8snode)]
pub struct Node {
    pub k8snode_id: i32,
    pub k8snode_name: String,
    pub cluster_id: i32,
    pub nodegroup_id: i32,
    pub ip_address: String,
    pub k8snodestate_name: String,
    pub nodeprovider_name: Option<String>,
    pub osimageinstance_name: Option<String>,
    pub dns_name: Option<String>,
    pub kubernetes_status: Option<serde_json::Value>,
    pub created_date: Option<DateTime<Utc>>,
    pub weka_storage_client_id: Option<String>,
    pub weka_storage_status: Option<String>,
    pub weka_storage_custom_status: Option<String>,
    pub weka_storage_message: Option<String>,
}

#[derive(Insertable, Clone, Debug, PartialEq)]
#[diesel(table_name = k8snode)]
pub struct NewNode {
    pub k8snode_name: String,
    pub cluster_id: i32,
    pub nodegroup_id: i32,
    pub ip_address: String,
    pub k8snodestate_name: String,
    pub nodeprovider_name: Option<String>,
    pub osimageinstance_name: Option<String>,
    pub dns_name: Option<String>,
    pub kubernetes_status: Option<serde_json::Value>,
    pub created_date: Option<DateTime<Utc>>,
    pub weka_storage_client_id: Option<String>,
    pub weka_storage_status: Option<String>,
    pub weka_storage_custom_status: Option<String>,
    pub weka_storage_message: Option<String>,
}

/// Columns of an existing node refreshed from a status report
#[derive(AsChangeset, Clone, Debug, PartialEq)]
#[diesel(table_name = k8snode, treat_none_as_null = true)]
pub struct NodeUpdate {
    pub k8snode_name: String,
    pub k8snodestate_name: String,
    pub nodeprovider_name: Option<String>,
    pub osimageinstance_name: Option<String>,
    pub kubernetes_status: Option<serde_json::Value>,
    pub created_date: Option<DateTime<Utc>>,
    pub weka_storage_client_id: Option<String>,
    pub weka_storage_status: Option<String>,
    pub weka_storage_custom_status: Option<String>,
    pub weka_storage_message: Option<String>,
}

impl Node {
    pub fn apply(&mut self, update: NodeUpdate) {
        self.k8snode_name = update.k8snode_name;
        self.k8snodestate_name = update.k8snodestate_name;
        self.nodeprovider_name = update.nodeprovider_name;
        self.osimageinstance_name = update.osimageinstance_name;
        self.kubernetes_status = update.kubernetes_status;
        self.created_date = update.created_date;
        self.weka_storage_client_id = update.weka_storage_client_id;
        self.weka_storage_status = update.weka_storage_status;
        self.weka_storage_custom_status = update.weka_storage_custom_status;
        self.weka_storage_message = update.weka_storage_message;
    }
}
