// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Removal of everything a deleted cluster owned

use super::{cluster_not_found, DataStore};
use crate::db::error::TenantOp;
use crate::db::store::ClusterTransaction;
use iks_common::api::external::DeleteResult;
use iks_db_model::ClusterState;

impl DataStore {
    /// Removes the rows of a cluster the operator has finished tearing down
    ///
    /// The cluster row itself stays behind in `Deleted`.  Children go first
    /// so that a failure part way leaves the cluster as it was.
    pub async fn cluster_delete_finalize(
        &self,
        cluster_uuid: &str,
    ) -> DeleteResult {
        let mut txn =
            self.begin("cluster_delete_finalize", TenantOp::Delete).await?;
        let result =
            self.cluster_delete_finalize_txn(&mut *txn, cluster_uuid).await;
        self.finish(txn, result, "cluster_delete_finalize", TenantOp::Delete)
            .await?;
        info!(
            self.log,
            "cluster deleted";
            "cluster_uuid" => cluster_uuid,
        );
        Ok(())
    }

    async fn cluster_delete_finalize_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        cluster_uuid: &str,
    ) -> DeleteResult {
        let mut cluster = txn
            .cluster_fetch_for_update(cluster_uuid)
            .await?
            .ok_or_else(|| cluster_not_found(cluster_uuid))?;
        let cluster_id = cluster.cluster_id;

        txn.node_delete_all(cluster_id).await?;
        txn.nodegroup_delete_all(cluster_id).await?;
        txn.addon_delete_all(cluster_id).await?;
        txn.snapshot_delete_all(cluster_id).await?;
        txn.revision_delete_all(cluster_id).await?;
        txn.storage_delete_all(cluster_id).await?;
        txn.extraconfig_delete(cluster_id).await?;
        for vip in txn.vip_list(cluster_id).await? {
            txn.vipdetails_delete(vip.vip.vip_id).await?;
            txn.vip_delete(vip.vip.vip_id).await?;
        }

        if cluster.clusterstate_name != ClusterState::Deleted {
            cluster.clusterstate_name = ClusterState::Deleted;
            txn.cluster_update(&cluster).await?;
        }
        Ok(())
    }
}
