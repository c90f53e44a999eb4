// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory [`ClusterStore`]
//!
//! A transaction holds the store's only lock from `begin` until it commits,
//! rolls back or is dropped, so transactions are fully serialized.  Changes
//! are made to a private copy of the tables that replaces the shared copy on
//! commit.

use super::store::{ClusterStore, ClusterTransaction};
use async_trait::async_trait;
use iks_common::api::external::{Error, ResourceType};
use iks_db_model::{
    Addon, Cluster, ClusterCertsUpdate, ClusterExtraConfig, ClusterRevision,
    ClusterState, NewCluster, NewClusterRevision, NewNode, NewNodeGroup,
    NewStorage, NewVip, Node, NodeGroup, NodeUpdate, Snapshot, Storage, Vip,
    VipDetails, VipWithDetails,
};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Every table the control plane writes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimTables {
    pub clusters: Vec<Cluster>,
    pub revisions: Vec<ClusterRevision>,
    pub extraconfigs: Vec<ClusterExtraConfig>,
    pub nodegroups: Vec<NodeGroup>,
    pub nodes: Vec<Node>,
    pub addons: Vec<Addon>,
    pub snapshots: Vec<Snapshot>,
    pub vips: Vec<Vip>,
    pub vipdetails: Vec<VipDetails>,
    pub storage: Vec<Storage>,
    last_id: i32,
}

impl SimTables {
    /// Allocates a surrogate id.  One sequence is shared by all tables.
    pub fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    /// Counts the rows in every cluster-owned table that reference
    /// `cluster_id`.  Vip details are attributed through their vip.
    pub fn rows_referencing(&self, cluster_id: i32) -> usize {
        let vip_ids: Vec<i32> = self
            .vips
            .iter()
            .filter(|v| v.cluster_id == cluster_id)
            .map(|v| v.vip_id)
            .collect();
        let details = self
            .vipdetails
            .iter()
            .filter(|d| vip_ids.contains(&d.vip_id))
            .count();
        let owned = |id: i32| id == cluster_id;
        self.revisions.iter().filter(|r| owned(r.cluster_id)).count()
            + self.extraconfigs.iter().filter(|c| owned(c.cluster_id)).count()
            + self.nodegroups.iter().filter(|n| owned(n.cluster_id)).count()
            + self.nodes.iter().filter(|n| owned(n.cluster_id)).count()
            + self.addons.iter().filter(|a| owned(a.cluster_id)).count()
            + self.snapshots.iter().filter(|s| owned(s.cluster_id)).count()
            + self.storage.iter().filter(|s| owned(s.cluster_id)).count()
            + vip_ids.len()
            + details
    }
}

#[derive(Clone, Debug, Default)]
pub struct SimStore {
    tables: Arc<Mutex<SimTables>>,
}

impl SimStore {
    pub fn new() -> SimStore {
        SimStore::default()
    }

    /// Returns a copy of the committed tables
    pub async fn tables(&self) -> SimTables {
        self.tables.lock().await.clone()
    }

    /// Edits the committed tables directly, outside of any transaction
    pub async fn modify<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut SimTables) -> T,
    {
        f(&mut *self.tables.lock().await)
    }
}

#[async_trait]
impl ClusterStore for SimStore {
    async fn begin(&self) -> Result<Box<dyn ClusterTransaction>, Error> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(SimTransaction { guard, working }))
    }
}

struct SimTransaction {
    guard: OwnedMutexGuard<SimTables>,
    working: SimTables,
}

fn missing(resource_type: ResourceType, id: i32) -> Error {
    Error::not_found_by_id(resource_type, id)
}

impl SimTransaction {
    fn cluster_mut(&mut self, cluster_id: i32) -> Result<&mut Cluster, Error> {
        self.working
            .clusters
            .iter_mut()
            .find(|c| c.cluster_id == cluster_id)
            .ok_or_else(|| missing(ResourceType::Cluster, cluster_id))
    }
}

#[async_trait]
impl ClusterTransaction for SimTransaction {
    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let SimTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        Ok(())
    }

    async fn lock_cluster_table(&mut self) -> Result<(), Error> {
        Ok(())
    }

    async fn cluster_fetch_for_update(
        &mut self,
        unique_id: &str,
    ) -> Result<Option<Cluster>, Error> {
        self.cluster_fetch(unique_id).await
    }

    async fn cluster_fetch(
        &mut self,
        unique_id: &str,
    ) -> Result<Option<Cluster>, Error> {
        Ok(self
            .working
            .clusters
            .iter()
            .find(|c| c.unique_id == unique_id)
            .cloned())
    }

    async fn cluster_count(
        &mut self,
        cloudaccount_id: &str,
        name: Option<&str>,
        excluded: &[ClusterState],
    ) -> Result<i64, Error> {
        let count = self
            .working
            .clusters
            .iter()
            .filter(|c| c.cloudaccount_id == cloudaccount_id)
            .filter(|c| name.map_or(true, |n| c.name == n))
            .filter(|c| !excluded.contains(&c.clusterstate_name))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn cluster_unique_id_exists(
        &mut self,
        unique_id: &str,
    ) -> Result<bool, Error> {
        Ok(self.working.clusters.iter().any(|c| c.unique_id == unique_id))
    }

    async fn cluster_insert(
        &mut self,
        cluster: NewCluster,
    ) -> Result<Cluster, Error> {
        let row = Cluster {
            cluster_id: self.working.next_id(),
            unique_id: cluster.unique_id,
            name: cluster.name,
            description: cluster.description,
            cloudaccount_id: cluster.cloudaccount_id,
            provider_name: cluster.provider_name,
            region_name: cluster.region_name,
            clusterstate_name: cluster.clusterstate_name,
            kubernetes_status: None,
            created_date: cluster.created_date,
        };
        self.working.clusters.push(row.clone());
        Ok(row)
    }

    async fn cluster_update(&mut self, cluster: &Cluster) -> Result<(), Error> {
        let row = self.cluster_mut(cluster.cluster_id)?;
        row.clusterstate_name = cluster.clusterstate_name;
        row.kubernetes_status = cluster.kubernetes_status.clone();
        Ok(())
    }

    async fn revision_latest(
        &mut self,
        cluster_id: i32,
    ) -> Result<Option<ClusterRevision>, Error> {
        Ok(self
            .working
            .revisions
            .iter()
            .filter(|r| r.cluster_id == cluster_id)
            .max_by_key(|r| r.clusterrev_id)
            .cloned())
    }

    async fn revision_insert(
        &mut self,
        revision: NewClusterRevision,
    ) -> Result<ClusterRevision, Error> {
        let row = ClusterRevision {
            clusterrev_id: self.working.next_id(),
            cluster_id: revision.cluster_id,
            desiredspec_json: revision.desiredspec_json,
            component_typegrp: revision.component_typegrp,
            component_typename: revision.component_typename,
            created_date: revision.created_date,
            change_applied: revision.change_applied,
        };
        self.working.revisions.push(row.clone());
        Ok(row)
    }

    async fn revision_set_change_applied(
        &mut self,
        clusterrev_id: i32,
        change_applied: bool,
    ) -> Result<bool, Error> {
        match self
            .working
            .revisions
            .iter_mut()
            .find(|r| r.clusterrev_id == clusterrev_id)
        {
            Some(row) => {
                row.change_applied = change_applied;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revision_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error> {
        self.working.revisions.retain(|r| r.cluster_id != cluster_id);
        Ok(())
    }

    async fn extraconfig_insert(
        &mut self,
        config: ClusterExtraConfig,
    ) -> Result<(), Error> {
        self.working.extraconfigs.push(config);
        Ok(())
    }

    async fn extraconfig_fetch(
        &mut self,
        cluster_id: i32,
    ) -> Result<Option<ClusterExtraConfig>, Error> {
        Ok(self
            .working
            .extraconfigs
            .iter()
            .find(|c| c.cluster_id == cluster_id)
            .cloned())
    }

    async fn extraconfig_update_certs(
        &mut self,
        cluster_id: i32,
        certs: ClusterCertsUpdate,
    ) -> Result<(), Error> {
        let row = self
            .working
            .extraconfigs
            .iter_mut()
            .find(|c| c.cluster_id == cluster_id)
            .ok_or_else(|| {
                missing(ResourceType::ClusterExtraConfig, cluster_id)
            })?;
        row.apply_certs(certs);
        Ok(())
    }

    async fn extraconfig_delete(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error> {
        self.working.extraconfigs.retain(|c| c.cluster_id != cluster_id);
        Ok(())
    }

    async fn nodegroup_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<NodeGroup>, Error> {
        Ok(self
            .working
            .nodegroups
            .iter()
            .filter(|n| n.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    async fn nodegroup_unique_id_exists(
        &mut self,
        unique_id: &str,
    ) -> Result<bool, Error> {
        Ok(self.working.nodegroups.iter().any(|n| n.unique_id == unique_id))
    }

    async fn nodegroup_insert(
        &mut self,
        nodegroup: NewNodeGroup,
    ) -> Result<NodeGroup, Error> {
        let row = NodeGroup {
            nodegroup_id: self.working.next_id(),
            cluster_id: nodegroup.cluster_id,
            unique_id: nodegroup.unique_id,
            name: nodegroup.name,
            nodegrouptype_name: nodegroup.nodegrouptype_name,
            k8sversion_name: nodegroup.k8sversion_name,
            runtime_name: nodegroup.runtime_name,
            instancetype_name: nodegroup.instancetype_name,
            osimageinstance_name: nodegroup.osimageinstance_name,
            nodecount: nodegroup.nodecount,
            nodegroupstate_name: nodegroup.nodegroupstate_name,
            kubernetes_status: None,
            createddate: nodegroup.createddate,
        };
        self.working.nodegroups.push(row.clone());
        Ok(row)
    }

    async fn nodegroup_update(
        &mut self,
        nodegroup: &NodeGroup,
    ) -> Result<(), Error> {
        let row = self
            .working
            .nodegroups
            .iter_mut()
            .find(|n| n.nodegroup_id == nodegroup.nodegroup_id)
            .ok_or_else(|| {
                missing(ResourceType::NodeGroup, nodegroup.nodegroup_id)
            })?;
        row.k8sversion_name = nodegroup.k8sversion_name.clone();
        row.osimageinstance_name = nodegroup.osimageinstance_name.clone();
        row.nodecount = nodegroup.nodecount;
        row.nodegroupstate_name = nodegroup.nodegroupstate_name;
        row.kubernetes_status = nodegroup.kubernetes_status.clone();
        Ok(())
    }

    async fn nodegroup_delete(
        &mut self,
        nodegroup_id: i32,
    ) -> Result<(), Error> {
        self.working.nodegroups.retain(|n| n.nodegroup_id != nodegroup_id);
        Ok(())
    }

    async fn nodegroup_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error> {
        self.working.nodegroups.retain(|n| n.cluster_id != cluster_id);
        Ok(())
    }

    async fn node_list(&mut self, cluster_id: i32) -> Result<Vec<Node>, Error> {
        Ok(self
            .working
            .nodes
            .iter()
            .filter(|n| n.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    async fn node_insert(&mut self, node: NewNode) -> Result<Node, Error> {
        let row = Node {
            k8snode_id: self.working.next_id(),
            k8snode_name: node.k8snode_name,
            cluster_id: node.cluster_id,
            nodegroup_id: node.nodegroup_id,
            ip_address: node.ip_address,
            k8snodestate_name: node.k8snodestate_name,
            nodeprovider_name: node.nodeprovider_name,
            osimageinstance_name: node.osimageinstance_name,
            dns_name: node.dns_name,
            kubernetes_status: node.kubernetes_status,
            created_date: node.created_date,
            weka_storage_client_id: node.weka_storage_client_id,
            weka_storage_status: node.weka_storage_status,
            weka_storage_custom_status: node.weka_storage_custom_status,
            weka_storage_message: node.weka_storage_message,
        };
        self.working.nodes.push(row.clone());
        Ok(row)
    }

    async fn node_update(
        &mut self,
        k8snode_id: i32,
        update: NodeUpdate,
    ) -> Result<(), Error> {
        let row = self
            .working
            .nodes
            .iter_mut()
            .find(|n| n.k8snode_id == k8snode_id)
            .ok_or_else(|| missing(ResourceType::Node, k8snode_id))?;
        row.apply(update);
        Ok(())
    }

    async fn node_delete(&mut self, k8snode_id: i32) -> Result<(), Error> {
        self.working.nodes.retain(|n| n.k8snode_id != k8snode_id);
        Ok(())
    }

    async fn node_delete_by_nodegroup(
        &mut self,
        nodegroup_id: i32,
    ) -> Result<(), Error> {
        self.working.nodes.retain(|n| n.nodegroup_id != nodegroup_id);
        Ok(())
    }

    async fn node_delete_all(&mut self, cluster_id: i32) -> Result<(), Error> {
        self.working.nodes.retain(|n| n.cluster_id != cluster_id);
        Ok(())
    }

    async fn addon_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<Addon>, Error> {
        Ok(self
            .working
            .addons
            .iter()
            .filter(|a| a.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    async fn addon_upsert(&mut self, addon: Addon) -> Result<(), Error> {
        match self.working.addons.iter_mut().find(|a| {
            a.cluster_id == addon.cluster_id
                && a.addonversion_name == addon.addonversion_name
        }) {
            Some(row) => *row = addon,
            None => self.working.addons.push(addon),
        }
        Ok(())
    }

    async fn addon_delete(
        &mut self,
        cluster_id: i32,
        addonversion_name: &str,
    ) -> Result<(), Error> {
        self.working.addons.retain(|a| {
            a.cluster_id != cluster_id
                || a.addonversion_name != addonversion_name
        });
        Ok(())
    }

    async fn addon_delete_all(&mut self, cluster_id: i32) -> Result<(), Error> {
        self.working.addons.retain(|a| a.cluster_id != cluster_id);
        Ok(())
    }

    async fn snapshot_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error> {
        self.working.snapshots.retain(|s| s.cluster_id != cluster_id);
        Ok(())
    }

    async fn vip_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<VipWithDetails>, Error> {
        let mut vips = Vec::new();
        let vips_of_cluster =
            self.working.vips.iter().filter(|v| v.cluster_id == cluster_id);
        for vip in vips_of_cluster {
            let details = self
                .working
                .vipdetails
                .iter()
                .find(|d| d.vip_id == vip.vip_id)
                .ok_or_else(|| missing(ResourceType::VipDetails, vip.vip_id))?;
            vips.push(VipWithDetails {
                vip: vip.clone(),
                details: details.clone(),
            });
        }
        Ok(vips)
    }

    async fn vip_insert(
        &mut self,
        vip: NewVip,
        details: VipDetails,
    ) -> Result<VipWithDetails, Error> {
        let vip = Vip {
            vip_id: self.working.next_id(),
            cluster_id: vip.cluster_id,
            viptype_name: vip.viptype_name,
            vipstate_name: vip.vipstate_name,
            owner: vip.owner,
            vipprovider_name: vip.vipprovider_name,
            vip_ip: None,
            vip_status: None,
            firewall_status: None,
            sourceips: None,
            created_date: vip.created_date,
        };
        let details = VipDetails { vip_id: vip.vip_id, ..details };
        self.working.vips.push(vip.clone());
        self.working.vipdetails.push(details.clone());
        Ok(VipWithDetails { vip, details })
    }

    async fn vip_update(&mut self, vip: &Vip) -> Result<(), Error> {
        let row = self
            .working
            .vips
            .iter_mut()
            .find(|v| v.vip_id == vip.vip_id)
            .ok_or_else(|| missing(ResourceType::Vip, vip.vip_id))?;
        row.vipstate_name = vip.vipstate_name;
        row.owner = vip.owner;
        row.vip_ip = vip.vip_ip.clone();
        row.vip_status = vip.vip_status.clone();
        row.firewall_status = vip.firewall_status;
        row.sourceips = vip.sourceips.clone();
        Ok(())
    }

    async fn vipdetails_update(
        &mut self,
        details: &VipDetails,
    ) -> Result<(), Error> {
        let row = self
            .working
            .vipdetails
            .iter_mut()
            .find(|d| d.vip_id == details.vip_id)
            .ok_or_else(|| missing(ResourceType::VipDetails, details.vip_id))?;
        row.pool_id = details.pool_id;
        row.protocol = details.protocol.clone();
        Ok(())
    }

    async fn vipdetails_delete(&mut self, vip_id: i32) -> Result<(), Error> {
        self.working.vipdetails.retain(|d| d.vip_id != vip_id);
        Ok(())
    }

    async fn vip_delete(&mut self, vip_id: i32) -> Result<(), Error> {
        self.working.vips.retain(|v| v.vip_id != vip_id);
        Ok(())
    }

    async fn storage_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<Storage>, Error> {
        Ok(self
            .working
            .storage
            .iter()
            .filter(|s| s.cluster_id == cluster_id)
            .cloned()
            .collect())
    }

    async fn storage_insert(
        &mut self,
        storage: NewStorage,
    ) -> Result<Storage, Error> {
        let row = Storage {
            storage_id: self.working.next_id(),
            cluster_id: storage.cluster_id,
            storageprovider_name: storage.storageprovider_name,
            size: storage.size,
            storagestate_name: storage.storagestate_name,
            kubernetes_status: storage.kubernetes_status,
        };
        self.working.storage.push(row.clone());
        Ok(row)
    }

    async fn storage_update(&mut self, storage: &Storage) -> Result<(), Error> {
        let row = self
            .working
            .storage
            .iter_mut()
            .find(|s| s.storage_id == storage.storage_id)
            .ok_or_else(|| {
                missing(ResourceType::Storage, storage.storage_id)
            })?;
        row.size = storage.size.clone();
        row.storagestate_name = storage.storagestate_name;
        row.kubernetes_status = storage.kubernetes_status.clone();
        Ok(())
    }

    async fn storage_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error> {
        self.working.storage.retain(|s| s.cluster_id != cluster_id);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use iks_db_model::Provider;

    fn new_cluster(name: &str) -> NewCluster {
        NewCluster {
            unique_id: format!("cl-{name}"),
            name: name.to_string(),
            description: None,
            cloudaccount_id: "acct".to_string(),
            provider_name: Provider::Iks,
            region_name: "us-region-1".to_string(),
            clusterstate_name: ClusterState::Pending,
            created_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_commit_and_rollback() {
        let store = SimStore::new();

        let mut txn = store.begin().await.unwrap();
        txn.cluster_insert(new_cluster("kept")).await.unwrap();
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        txn.cluster_insert(new_cluster("discarded")).await.unwrap();
        txn.rollback().await.unwrap();

        {
            let mut txn = store.begin().await.unwrap();
            txn.cluster_insert(new_cluster("dropped")).await.unwrap();
        }

        let tables = store.tables().await;
        assert_eq!(tables.clusters.len(), 1);
        assert_eq!(tables.clusters[0].name, "kept");
    }

    #[tokio::test]
    async fn test_missing_rows() {
        let store = SimStore::new();
        let mut txn = store.begin().await.unwrap();
        assert!(txn.cluster_fetch("cl-nothing").await.unwrap().is_none());
        assert!(!txn.revision_set_change_applied(42, true).await.unwrap());
        let err = txn
            .node_update(
                7,
                NodeUpdate {
                    k8snode_name: "n".to_string(),
                    k8snodestate_name: "Active".to_string(),
                    nodeprovider_name: None,
                    osimageinstance_name: None,
                    kubernetes_status: None,
                    created_date: None,
                    weka_storage_client_id: None,
                    weka_storage_status: None,
                    weka_storage_custom_status: None,
                    weka_storage_message: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Node not found: 7");
    }
}
