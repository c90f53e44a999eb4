// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::impl_text_enum;
use crate::schema::{cluster, cluster_extraconfig, clusterrev};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

impl_text_enum! {
    /// Lifecycle of a cluster
    ///
    /// `Error` is not set by the control plane itself; it is written when the
    /// operator reports it.
    pub enum ClusterState;

    Pending => "Pending"
    Active => "Active"
    Updating => "Updating"
    DeletePending => "DeletePending"
    Deleting => "Deleting"
    Deleted => "Deleted"
    Error => "Error"
}

impl ClusterState {
    /// States in which a cluster no longer counts against quota or holds its
    /// name.
    pub fn is_deleting(&self) -> bool {
        matches!(
            self,
            ClusterState::DeletePending
                | ClusterState::Deleting
                | ClusterState::Deleted
        )
    }
}

impl_text_enum! {
    /// Kubernetes distribution a cluster is built with
    pub enum Provider;

    Iks => "iks"
    Rke2 => "rke2"
}

/// Database representation of a cluster
#[derive(
    Queryable, Selectable, Clone, Debug, PartialEq, Serialize, Deserialize,
)]
#[diesel(table_name = cluster)]
pub struct Cluster {
    pub cluster_id: i32,
    pub unique_id: String,
    pub name: String,
    pub description: Option<String>,
    pub cloudaccount_id: String,
    pub provider_name: Provider,
    pub region_name: String,
    pub clusterstate_name: ClusterState,
    pub kubernetes_status: Option<serde_json::Value>,
    pub created_date: DateTime<Utc>,
}

/// Insert-side of [`Cluster`]; the id is assigned by the database.
#[derive(Insertable, Clone, Debug, PartialEq)]
#[diesel(table_name = cluster)]
pub struct NewCluster {
    pub unique_id: String,
    pub name: String,
    pub description: Option<String>,
    pub cloudaccount_id: String,
    pub provider_name: Provider,
    pub region_name: String,
    pub clusterstate_name: ClusterState,
    pub created_date: DateTime<Utc>,
}

/// One desired-state document for a cluster
///
/// Revisions are append-only.  The only column ever updated after insert is
/// `change_applied`, which the operator flips once it has converged on the
/// document.
#[derive(
    Queryable, Selectable, Clone, Debug, PartialEq, Serialize, Deserialize,
)]
#[diesel(table_name = clusterrev)]
pub struct ClusterRevision {
    pub clusterrev_id: i32,
    pub cluster_id: i32,
    pub desiredspec_json: serde_json::Value,
    pub component_typegrp: String,
    pub component_typename: String,
    pub created_date: DateTime<Utc>,
    pub change_applied: bool,
}

#[derive(Insertable, Clone, Debug, PartialEq)]
#[diesel(table_name = clusterrev)]
pub struct NewClusterRevision {
    pub cluster_id: i32,
    pub desiredspec_json: serde_json::Value,
    pub component_typegrp: String,
    pub component_typename: String,
    pub created_date: DateTime<Utc>,
    pub change_applied: bool,
}

/// Per-cluster secrets, encrypted with `encryptionkey_id` and `nonce`
#[derive(
    Queryable, Insertable, Selectable, Clone, Debug, Default, PartialEq,
)]
#[diesel(table_name = cluster_extraconfig)]
pub struct ClusterExtraConfig {
    pub cluster_id: i32,
    pub encryptionkey_id: i32,
    /// base64-encoded AES-GCM nonce
    pub nonce: String,
    pub cluster_cacrt: Option<String>,
    pub cluster_cakey: Option<String>,
    pub cluster_etcd_cacrt: Option<String>,
    pub cluster_etcd_cakey: Option<String>,
    pub cluster_etcd_rotation_keys: Option<String>,
    pub cluster_sa_pub: Option<String>,
    pub cluster_sa_key: Option<String>,
    pub cluster_cp_reg_cmd: Option<String>,
    pub cluster_wk_reg_cmd: Option<String>,
}

/// The nine encrypted certificate columns of [`ClusterExtraConfig`]
#[derive(AsChangeset, Clone, Debug, Default, PartialEq, Eq)]
#[diesel(table_name = cluster_extraconfig)]
pub struct ClusterCertsUpdate {
    pub cluster_cacrt: Option<String>,
    pub cluster_cakey: Option<String>,
    pub cluster_etcd_cacrt: Option<String>,
    pub cluster_etcd_cakey: Option<String>,
    pub cluster_etcd_rotation_keys: Option<String>,
    pub cluster_sa_pub: Option<String>,
    pub cluster_sa_key: Option<String>,
    pub cluster_cp_reg_cmd: Option<String>,
    pub cluster_wk_reg_cmd: Option<String>,
}

impl ClusterExtraConfig {
    pub fn apply_certs(&mut self, certs: ClusterCertsUpdate) {
        self.cluster_cacrt = certs.cluster_cacrt;
        self.cluster_cakey = certs.cluster_cakey;
        self.cluster_etcd_cacrt = certs.cluster_etcd_cacrt;
        self.cluster_etcd_cakey = certs.cluster_etcd_cakey;
        self.cluster_etcd_rotation_keys = certs.cluster_etcd_rotation_keys;
        self.cluster_sa_pub = certs.cluster_sa_pub;
        self.cluster_sa_key = certs.cluster_sa_key;
        self.cluster_cp_reg_cmd = certs.cluster_cp_reg_cmd;
        self.cluster_wk_reg_cmd = certs.cluster_wk_reg_cmd;
    }

    pub fn certs(&self) -> ClusterCertsUpdate {
        ClusterCertsUpdate {
            cluster_cacrt: self.cluster_cacrt.clone(),
            cluster_cakey: self.cluster_cakey.clone(),
            cluster_etcd_cacrt: self.cluster_etcd_cacrt.clone(),
            cluster_etcd_cakey: self.cluster_etcd_cakey.clone(),
            cluster_etcd_rotation_keys: self.cluster_etcd_rotation_keys.clone(),
            cluster_sa_pub: self.cluster_sa_pub.clone(),
            cluster_sa_key: self.cluster_sa_key.clone(),
            cluster_cp_reg_cmd: self.cluster_cp_reg_cmd.clone(),
            cluster_wk_reg_cmd: self.cluster_wk_reg_cmd.clone(),
        }
    }
}

/// A cluster snapshot (etcd backup) record
#[derive(Queryable, Selectable, Clone, Debug, PartialEq)]
#[diesel(table_name = crate::schema::snapshot)]
pub struct Snapshot {
    pub snapshot_id: i32,
    pub cluster_id: i32,
    pub name: String,
    pub snapshotstate_name: String,
    pub created_date: DateTime<Utc>,
}
