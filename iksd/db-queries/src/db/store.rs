// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The transaction seam between workflows and storage
//!
//! Every workflow in [`super::DataStore`] runs against one
//! [`ClusterTransaction`]: lock, check, act, then commit or roll back.  The
//! Postgres implementation maps each method onto a statement inside a real
//! transaction; the in-memory implementation serializes whole transactions
//! and is what the workflow tests run against.
//!
//! Methods operate on rows of [`iks_db_model`] and know nothing about
//! workflow rules.  Lookups that may legitimately find nothing return
//! `Option`; updates and deletes of a row by id that does not exist are
//! errors.

use async_trait::async_trait;
use iks_common::api::external::Error;
use iks_db_model::{
    Addon, Cluster, ClusterCertsUpdate, ClusterExtraConfig, ClusterRevision,
    ClusterState, NewCluster, NewClusterRevision, NewNode, NewNodeGroup,
    NewStorage, NewVip, Node, NodeGroup, NodeUpdate, Storage, Vip, VipDetails,
    VipWithDetails,
};

/// Source of transactions
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ClusterTransaction>, Error>;
}

#[async_trait]
pub trait ClusterTransaction: Send {
    async fn commit(self: Box<Self>) -> Result<(), Error>;
    async fn rollback(self: Box<Self>) -> Result<(), Error>;

    // Locks

    /// Serializes cluster creation against everything else touching the
    /// cluster table
    async fn lock_cluster_table(&mut self) -> Result<(), Error>;

    /// Fetches a cluster by unique id, holding its row lock until the end of
    /// the transaction
    async fn cluster_fetch_for_update(
        &mut self,
        unique_id: &str,
    ) -> Result<Option<Cluster>, Error>;

    // Clusters

    async fn cluster_fetch(
        &mut self,
        unique_id: &str,
    ) -> Result<Option<Cluster>, Error>;

    /// Counts the account's clusters whose state is not in `excluded`
    async fn cluster_count(
        &mut self,
        cloudaccount_id: &str,
        name: Option<&str>,
        excluded: &[ClusterState],
    ) -> Result<i64, Error>;

    async fn cluster_unique_id_exists(
        &mut self,
        unique_id: &str,
    ) -> Result<bool, Error>;

    async fn cluster_insert(
        &mut self,
        cluster: NewCluster,
    ) -> Result<Cluster, Error>;

    /// Writes the mutable columns of `cluster`: state and reported status
    async fn cluster_update(&mut self, cluster: &Cluster) -> Result<(), Error>;

    // Revisions

    async fn revision_latest(
        &mut self,
        cluster_id: i32,
    ) -> Result<Option<ClusterRevision>, Error>;

    async fn revision_insert(
        &mut self,
        revision: NewClusterRevision,
    ) -> Result<ClusterRevision, Error>;

    /// Returns false if no revision has this id
    async fn revision_set_change_applied(
        &mut self,
        clusterrev_id: i32,
        change_applied: bool,
    ) -> Result<bool, Error>;

    async fn revision_delete_all(&mut self, cluster_id: i32)
        -> Result<(), Error>;

    // Extra configuration

    async fn extraconfig_insert(
        &mut self,
        config: ClusterExtraConfig,
    ) -> Result<(), Error>;

    async fn extraconfig_fetch(
        &mut self,
        cluster_id: i32,
    ) -> Result<Option<ClusterExtraConfig>, Error>;

    async fn extraconfig_update_certs(
        &mut self,
        cluster_id: i32,
        certs: ClusterCertsUpdate,
    ) -> Result<(), Error>;

    async fn extraconfig_delete(&mut self, cluster_id: i32)
        -> Result<(), Error>;

    // Nodegroups

    async fn nodegroup_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<NodeGroup>, Error>;

    async fn nodegroup_unique_id_exists(
        &mut self,
        unique_id: &str,
    ) -> Result<bool, Error>;

    async fn nodegroup_insert(
        &mut self,
        nodegroup: NewNodeGroup,
    ) -> Result<NodeGroup, Error>;

    /// Writes the mutable columns of `nodegroup`: version, image, count,
    /// state and reported status
    async fn nodegroup_update(
        &mut self,
        nodegroup: &NodeGroup,
    ) -> Result<(), Error>;

    async fn nodegroup_delete(&mut self, nodegroup_id: i32)
        -> Result<(), Error>;

    async fn nodegroup_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error>;

    // Nodes

    async fn node_list(&mut self, cluster_id: i32) -> Result<Vec<Node>, Error>;

    async fn node_insert(&mut self, node: NewNode) -> Result<Node, Error>;

    async fn node_update(
        &mut self,
        k8snode_id: i32,
        update: NodeUpdate,
    ) -> Result<(), Error>;

    async fn node_delete(&mut self, k8snode_id: i32) -> Result<(), Error>;

    async fn node_delete_by_nodegroup(
        &mut self,
        nodegroup_id: i32,
    ) -> Result<(), Error>;

    async fn node_delete_all(&mut self, cluster_id: i32) -> Result<(), Error>;

    // Addons

    async fn addon_list(&mut self, cluster_id: i32)
        -> Result<Vec<Addon>, Error>;

    /// Inserts the addon, or overwrites the row with the same cluster and
    /// addon version
    async fn addon_upsert(&mut self, addon: Addon) -> Result<(), Error>;

    async fn addon_delete(
        &mut self,
        cluster_id: i32,
        addonversion_name: &str,
    ) -> Result<(), Error>;

    async fn addon_delete_all(&mut self, cluster_id: i32) -> Result<(), Error>;

    // Snapshots

    async fn snapshot_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error>;

    // Vips

    async fn vip_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<VipWithDetails>, Error>;

    async fn vip_insert(
        &mut self,
        vip: NewVip,
        details: VipDetails,
    ) -> Result<VipWithDetails, Error>;

    /// Writes the mutable columns of `vip`: state, owner, address, reported
    /// status and the firewall rule
    async fn vip_update(&mut self, vip: &Vip) -> Result<(), Error>;

    /// Writes the mutable columns of `details`: pool id and protocols
    async fn vipdetails_update(
        &mut self,
        details: &VipDetails,
    ) -> Result<(), Error>;

    async fn vipdetails_delete(&mut self, vip_id: i32) -> Result<(), Error>;

    async fn vip_delete(&mut self, vip_id: i32) -> Result<(), Error>;

    // Storage

    async fn storage_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<Storage>, Error>;

    async fn storage_insert(
        &mut self,
        storage: NewStorage,
    ) -> Result<Storage, Error>;

    /// Writes the mutable columns of `storage`: size, state and reported
    /// status
    async fn storage_update(&mut self, storage: &Storage) -> Result<(), Error>;

    async fn storage_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error>;
}
