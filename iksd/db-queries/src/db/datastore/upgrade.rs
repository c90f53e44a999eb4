// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods that offer and apply Kubernetes upgrades

use super::{
    control_plane, guarded_cluster, insert_revision, latest_change_applied,
    latest_document, owned_cluster, Change, DataStore,
};
use crate::db::error::TenantOp;
use crate::db::store::ClusterTransaction;
use iks_common::api::external::{
    Error, ListResultVec, LookupResult, ResourceType, UpdateResult,
};
use iks_db_model::{Cluster, ClusterState, NodeGroup, NodeGroupState};
use iks_planning::guard::is_actionable;
use iks_planning::upgrade::{
    cluster_upgrades, control_plane_upgrades, offers_upgrades,
    resolve_version, worker_upgrades, CompatEntry, NodeGroupImage,
    UpgradeError,
};
use iks_types::params::{UpgradeClusterParams, UpgradeNodeGroupParams};
use iks_types::views::{NodeGroupUpgrades, UpgradeTarget};

const NO_UPGRADES: &str = "No Upgrades Available";

fn upgrade_error(error: UpgradeError) -> Error {
    Error::internal_error(&error.to_string())
}

fn image_of(nodegroup: &NodeGroup) -> NodeGroupImage {
    NodeGroupImage {
        version: nodegroup.k8sversion_name.clone(),
        image: nodegroup.osimageinstance_name.clone(),
    }
}

async fn find_nodegroup(
    txn: &mut dyn ClusterTransaction,
    cluster_id: i32,
    nodegroup_uuid: &str,
) -> Result<(NodeGroup, NodeGroup), Error> {
    let nodegroups = txn.nodegroup_list(cluster_id).await?;
    let cp = control_plane(&nodegroups)?.clone();
    let nodegroup = nodegroups
        .into_iter()
        .find(|ng| ng.unique_id == nodegroup_uuid)
        .ok_or_else(|| {
            Error::not_found_by_unique_id(
                ResourceType::NodeGroup,
                nodegroup_uuid,
            )
        })?;
    Ok((nodegroup, cp))
}

impl DataStore {
    /// Compatibility rows for the provider, runtime, instance type and os
    /// image `nodegroup` runs today
    async fn compatibility_of(
        &self,
        cluster: &Cluster,
        nodegroup: &NodeGroup,
    ) -> Result<Vec<CompatEntry>, Error> {
        let image = self
            .reference
            .osimageinstance(&nodegroup.osimageinstance_name)
            .await?
            .ok_or_else(|| {
                Error::internal_error(&format!(
                    "nodegroup {:?} runs unknown osimageinstance {:?}",
                    nodegroup.unique_id, nodegroup.osimageinstance_name
                ))
            })?;
        self.reference
            .compatibility(
                cluster.provider_name,
                &nodegroup.runtime_name,
                &nodegroup.instancetype_name,
                &image.osimage_name,
            )
            .await
    }

    /// Machine image artifact of an osimageinstance
    async fn artifact(&self, osimageinstance: &str) -> Result<String, Error> {
        self.reference
            .osimageinstance(osimageinstance)
            .await?
            .map(|i| i.imiartifact)
            .ok_or_else(|| {
                Error::internal_error(&format!(
                    "no osimageinstance {osimageinstance:?}"
                ))
            })
    }

    /// Upgrades on offer for one nodegroup, as (version, osimageinstance)
    async fn nodegroup_targets(
        &self,
        cluster: &Cluster,
        nodegroup: &NodeGroup,
        cp: &NodeGroup,
    ) -> Result<Vec<UpgradeTarget>, Error> {
        if !offers_upgrades(nodegroup.nodegroupstate_name) {
            return Ok(Vec::new());
        }
        let provider = cluster.provider_name;
        let entries = self.compatibility_of(cluster, nodegroup).await?;
        let current = image_of(nodegroup);
        if nodegroup.is_control_plane() {
            control_plane_upgrades(provider, &current, &entries)
        } else {
            worker_upgrades(provider, &current, &image_of(cp), &entries)
        }
        .map_err(upgrade_error)
    }

    /// Versions the cluster may be upgraded to
    ///
    /// A cluster that is not actionable is offered nothing.
    pub async fn cluster_upgrades_available(
        &self,
        cluster_uuid: &str,
        cloudaccount_id: &str,
    ) -> ListResultVec<String> {
        let mut txn =
            self.begin("cluster_upgrades_available", TenantOp::Read).await?;
        let result = async {
            let cluster =
                owned_cluster(&mut *txn, cluster_uuid, cloudaccount_id)
                    .await?;
            let applied =
                latest_change_applied(&mut *txn, cluster.cluster_id).await?;
            if !is_actionable(cluster.clusterstate_name, applied) {
                return Ok(Vec::new());
            }
            let nodegroups = txn.nodegroup_list(cluster.cluster_id).await?;
            let cp = control_plane(&nodegroups)?;
            let entries = self.compatibility_of(&cluster, cp).await?;
            cluster_upgrades(
                cluster.provider_name,
                &cp.k8sversion_name,
                &entries,
            )
            .map_err(upgrade_error)
        }
        .await;
        self.finish(txn, result, "cluster_upgrades_available", TenantOp::Read)
            .await
    }

    /// Versions and image artifacts one nodegroup may be upgraded to
    pub async fn nodegroup_upgrades_available(
        &self,
        cluster_uuid: &str,
        nodegroup_uuid: &str,
        cloudaccount_id: &str,
    ) -> LookupResult<NodeGroupUpgrades> {
        let mut txn = self
            .begin("nodegroup_upgrades_available", TenantOp::Read)
            .await?;
        let result = async {
            let cluster =
                owned_cluster(&mut *txn, cluster_uuid, cloudaccount_id)
                    .await?;
            let (nodegroup, cp) =
                find_nodegroup(&mut *txn, cluster.cluster_id, nodegroup_uuid)
                    .await?;
            let applied =
                latest_change_applied(&mut *txn, cluster.cluster_id).await?;
            if !is_actionable(cluster.clusterstate_name, applied) {
                return Ok(NodeGroupUpgrades::default());
            }
            let mut targets =
                self.nodegroup_targets(&cluster, &nodegroup, &cp).await?;
            for target in &mut targets {
                target.imi = self.artifact(&target.imi).await?;
            }
            Ok(NodeGroupUpgrades::from(targets))
        }
        .await;
        self.finish(
            txn,
            result,
            "nodegroup_upgrades_available",
            TenantOp::Read,
        )
        .await
    }

    /// Moves the control plane to a newer version
    ///
    /// Without a requested version the newest one on offer is used.  Returns
    /// the version and image artifact handed to the operator.
    pub async fn cluster_upgrade(
        &self,
        params: &UpgradeClusterParams,
    ) -> UpdateResult<UpgradeTarget> {
        let mut txn = self.begin("cluster_upgrade", TenantOp::Update).await?;
        let result = self.cluster_upgrade_txn(&mut *txn, params).await;
        let target = self
            .finish(txn, result, "cluster_upgrade", TenantOp::Update)
            .await?;
        info!(
            self.log,
            "cluster upgrade requested";
            "cluster_uuid" => &params.cluster_uuid,
            "k8sversion" => &target.version,
        );
        Ok(target)
    }

    async fn cluster_upgrade_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        params: &UpgradeClusterParams,
    ) -> UpdateResult<UpgradeTarget> {
        let mut cluster = guarded_cluster(
            txn,
            &params.cluster_uuid,
            &params.cloudaccount_id,
        )
        .await?;
        let nodegroups = txn.nodegroup_list(cluster.cluster_id).await?;
        let mut cp = control_plane(&nodegroups)?.clone();
        let entries = self.compatibility_of(&cluster, &cp).await?;
        let offered = cluster_upgrades(
            cluster.provider_name,
            &cp.k8sversion_name,
            &entries,
        )
        .map_err(upgrade_error)?;

        let requested = match &params.k8sversion_name {
            Some(version) if offered.contains(version) => version,
            Some(version) if !offered.is_empty() => {
                return Err(Error::invalid_request(&format!(
                    "Kubernetes version {version} is not available for \
                     upgrade"
                )));
            }
            _ => offered
                .last()
                .ok_or_else(|| Error::failed_precondition(NO_UPGRADES))?,
        };
        let entry = resolve_version(requested, &entries)
            .map_err(upgrade_error)?
            .ok_or_else(|| {
                Error::internal_error(&format!(
                    "offered version {requested:?} has no compatibility entry"
                ))
            })?;
        let artifact = self.artifact(&entry.cp_image).await?;

        cp.k8sversion_name = entry.version.clone();
        cp.osimageinstance_name = entry.cp_image.clone();
        cp.nodegroupstate_name = NodeGroupState::Updating;
        txn.nodegroup_update(&cp).await?;
        cluster.clusterstate_name = ClusterState::Updating;
        txn.cluster_update(&cluster).await?;

        let mut document = latest_document(txn, cluster.cluster_id).await?;
        document.spec.kubernetes_version = entry.version.clone();
        document.spec.instance_imi = artifact.clone();
        insert_revision(
            txn,
            cluster.cluster_id,
            &document,
            Change::ClusterUpgrade,
        )
        .await?;
        Ok(UpgradeTarget { version: entry.version.clone(), imi: artifact })
    }

    /// Applies the upgrade on offer to one nodegroup
    pub async fn nodegroup_upgrade(
        &self,
        params: &UpgradeNodeGroupParams,
    ) -> UpdateResult<UpgradeTarget> {
        let mut txn =
            self.begin("nodegroup_upgrade", TenantOp::Update).await?;
        let result = self.nodegroup_upgrade_txn(&mut *txn, params).await;
        let target = self
            .finish(txn, result, "nodegroup_upgrade", TenantOp::Update)
            .await?;
        info!(
            self.log,
            "nodegroup upgrade requested";
            "cluster_uuid" => &params.cluster_uuid,
            "nodegroup_uuid" => &params.nodegroup_uuid,
            "k8sversion" => &target.version,
        );
        Ok(target)
    }

    async fn nodegroup_upgrade_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        params: &UpgradeNodeGroupParams,
    ) -> UpdateResult<UpgradeTarget> {
        let mut cluster = guarded_cluster(
            txn,
            &params.cluster_uuid,
            &params.cloudaccount_id,
        )
        .await?;
        let (mut nodegroup, cp) =
            find_nodegroup(txn, cluster.cluster_id, &params.nodegroup_uuid)
                .await?;
        let target = self
            .nodegroup_targets(&cluster, &nodegroup, &cp)
            .await?
            .pop()
            .ok_or_else(|| Error::failed_precondition(NO_UPGRADES))?;
        let artifact = self.artifact(&target.imi).await?;

        nodegroup.k8sversion_name = target.version.clone();
        nodegroup.osimageinstance_name = target.imi;
        nodegroup.nodegroupstate_name = NodeGroupState::Updating;
        txn.nodegroup_update(&nodegroup).await?;
        cluster.clusterstate_name = ClusterState::Updating;
        txn.cluster_update(&cluster).await?;

        let mut document = latest_document(txn, cluster.cluster_id).await?;
        if nodegroup.is_control_plane() {
            document.spec.kubernetes_version = target.version.clone();
            document.spec.instance_imi = artifact.clone();
        } else {
            let entry = document
                .spec
                .nodegroup_mut(&nodegroup.unique_id)
                .ok_or_else(|| {
                    Error::internal_error(&format!(
                        "nodegroup {:?} missing from the desired state",
                        nodegroup.unique_id
                    ))
                })?;
            entry.kubernetes_version = target.version.clone();
            entry.instance_imi = artifact.clone();
        }
        insert_revision(
            txn,
            cluster.cluster_id,
            &document,
            Change::NodeGroupUpgrade,
        )
        .await?;
        Ok(UpgradeTarget { version: target.version, imi: artifact })
    }
}

#[cfg(test)]
mod test {
    use crate::db::pub_test_utils::{
        create_params, nodegroup_params, settle, TestDatastore, CLOUD_ACCOUNT,
    };
    use iks_common::api::external::Error;
    use iks_db_model::{ClusterState, NodeGroupState, NodeGroupType};
    use iks_planning::guard::NOT_ACTIONABLE;
    use iks_test_utils::dev;
    use iks_types::document::ClusterDocument;
    use iks_types::params::{UpgradeClusterParams, UpgradeNodeGroupParams};

    /// Creates and settles a cluster at exactly `version`
    async fn cluster_at(test: &TestDatastore, version: &str) -> String {
        let mut params = create_params("one");
        params.k8sversion_name = version.to_string();
        let created = test.datastore.cluster_create(&params).await.unwrap();
        settle(test, &created.cluster_uuid).await;
        created.cluster_uuid
    }

    fn ng_upgrade(uuid: &str, ng: &str) -> UpgradeNodeGroupParams {
        UpgradeNodeGroupParams {
            cloudaccount_id: CLOUD_ACCOUNT.to_string(),
            cluster_uuid: uuid.to_string(),
            nodegroup_uuid: ng.to_string(),
        }
    }

    #[tokio::test]
    async fn test_cluster_upgrade() {
        let logctx = dev::test_setup_log("test_cluster_upgrade");
        let test = TestDatastore::new(&logctx.log);
        let uuid = test.active_cluster("one").await;

        let offered = test
            .datastore
            .cluster_upgrades_available(&uuid, CLOUD_ACCOUNT)
            .await
            .unwrap();
        assert_eq!(offered, vec!["1.28"]);

        let params = UpgradeClusterParams {
            cloudaccount_id: CLOUD_ACCOUNT.to_string(),
            cluster_uuid: uuid.clone(),
            k8sversion_name: Some("1.29".to_string()),
        };
        let err = test.datastore.cluster_upgrade(&params).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));

        let params =
            UpgradeClusterParams { k8sversion_name: None, ..params };
        let target = test.datastore.cluster_upgrade(&params).await.unwrap();
        assert_eq!(target.version, "1.28.2");
        assert_eq!(target.imi, "iks-u22-cp-1-28-2.img");

        let tables = test.store.tables().await;
        let cluster =
            tables.clusters.iter().find(|c| c.unique_id == uuid).unwrap();
        assert_eq!(cluster.clusterstate_name, ClusterState::Updating);
        let cp = tables
            .nodegroups
            .iter()
            .find(|ng| ng.nodegrouptype_name == NodeGroupType::ControlPlane)
            .unwrap();
        assert_eq!(cp.k8sversion_name, "1.28.2");
        assert_eq!(cp.osimageinstance_name, "iks-cp-1-28-2");
        assert_eq!(cp.nodegroupstate_name, NodeGroupState::Updating);
        let doc: ClusterDocument = serde_json::from_value(
            tables.revisions.last().unwrap().desiredspec_json.clone(),
        )
        .unwrap();
        assert_eq!(doc.spec.kubernetes_version, "1.28.2");
        assert_eq!(doc.spec.instance_imi, "iks-u22-cp-1-28-2.img");

        // Mid-upgrade, nothing is offered and nothing may start.
        let offered = test
            .datastore
            .cluster_upgrades_available(&uuid, CLOUD_ACCOUNT)
            .await
            .unwrap();
        assert!(offered.is_empty());
        let err = test.datastore.cluster_upgrade(&params).await.unwrap_err();
        assert_eq!(err, Error::failed_precondition(NOT_ACTIONABLE));

        // At the newest version there is nothing left to offer.
        settle(&test, &uuid).await;
        let err = test.datastore.cluster_upgrade(&params).await.unwrap_err();
        assert_eq!(err, Error::failed_precondition("No Upgrades Available"));
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_nodegroup_upgrades_follow_control_plane() {
        let logctx =
            dev::test_setup_log("test_nodegroup_upgrades_follow_control_plane");
        let test = TestDatastore::new(&logctx.log);
        let uuid = cluster_at(&test, "1.27.3").await;
        let worker = test
            .datastore
            .nodegroup_create(&nodegroup_params(&uuid, "workers", 2))
            .await
            .unwrap()
            .nodegroup_uuid;
        settle(&test, &uuid).await;

        // The worker already matches its control plane.
        let ups = test
            .datastore
            .nodegroup_upgrades_available(&uuid, &worker, CLOUD_ACCOUNT)
            .await
            .unwrap();
        assert!(ups.is_empty());
        let err = test
            .datastore
            .nodegroup_upgrade(&ng_upgrade(&uuid, &worker))
            .await
            .unwrap_err();
        assert_eq!(err, Error::failed_precondition("No Upgrades Available"));

        let tables = test.store.tables().await;
        let cp = tables
            .nodegroups
            .iter()
            .find(|ng| ng.nodegrouptype_name == NodeGroupType::ControlPlane)
            .unwrap()
            .unique_id
            .clone();
        let ups = test
            .datastore
            .nodegroup_upgrades_available(&uuid, &cp, CLOUD_ACCOUNT)
            .await
            .unwrap();
        assert_eq!(ups.versions, vec!["1.27.4"]);
        assert_eq!(ups.imis, vec!["iks-u22-cp-1-27-4.img"]);
        test.datastore
            .nodegroup_upgrade(&ng_upgrade(&uuid, &cp))
            .await
            .unwrap();
        settle(&test, &uuid).await;

        let ups = test
            .datastore
            .nodegroup_upgrades_available(&uuid, &worker, CLOUD_ACCOUNT)
            .await
            .unwrap();
        assert_eq!(ups.versions, vec!["1.27.4"]);
        assert_eq!(ups.imis, vec!["iks-u22-wk-1-27-4.img"]);

        let target = test
            .datastore
            .nodegroup_upgrade(&ng_upgrade(&uuid, &worker))
            .await
            .unwrap();
        assert_eq!(target.version, "1.27.4");
        let tables = test.store.tables().await;
        let row =
            tables.nodegroups.iter().find(|ng| ng.unique_id == worker).unwrap();
        assert_eq!(row.osimageinstance_name, "iks-wk-1-27-4");
        assert_eq!(row.nodegroupstate_name, NodeGroupState::Updating);
        let doc: ClusterDocument = serde_json::from_value(
            tables.revisions.last().unwrap().desiredspec_json.clone(),
        )
        .unwrap();
        let entry =
            doc.spec.nodegroups.iter().find(|ng| ng.name == worker).unwrap();
        assert_eq!(entry.kubernetes_version, "1.27.4");
        assert_eq!(entry.instance_imi, "iks-u22-wk-1-27-4.img");
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_upgrades_hidden_from_other_accounts() {
        let logctx =
            dev::test_setup_log("test_upgrades_hidden_from_other_accounts");
        let test = TestDatastore::new(&logctx.log);
        let uuid = test.active_cluster("one").await;
        let err = test
            .datastore
            .cluster_upgrades_available(&uuid, "someone-else")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound { .. }));
        let err = test
            .datastore
            .nodegroup_upgrades_available(&uuid, "ng-missing00", CLOUD_ACCOUNT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound { .. }));
        logctx.cleanup_successful();
    }
}
