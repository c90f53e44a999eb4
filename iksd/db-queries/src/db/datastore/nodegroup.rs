// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on nodegroups

use super::{
    control_plane, fresh_unique_id, guarded_cluster, insert_revision,
    latest_document, Change, DataStore,
};
use crate::db::error::TenantOp;
use crate::db::store::ClusterTransaction;
use chrono::Utc;
use iks_common::api::external::{
    CreateResult, DeleteResult, Error, ResourceType,
};
use iks_db_model::{ClusterState, NewNodeGroup, NodeGroupState, NodeGroupType};
use iks_planning::naming::UniqueIdKind;
use iks_planning::quota::{Limits, QuotaKind};
use iks_types::document::NodegroupTemplateSpec;
use iks_types::params::CreateNodeGroupParams;
use iks_types::views::NodeGroupCreated;

impl DataStore {
    pub async fn nodegroup_create(
        &self,
        params: &CreateNodeGroupParams,
    ) -> CreateResult<NodeGroupCreated> {
        let mut txn = self.begin("nodegroup_create", TenantOp::Create).await?;
        let result = self.nodegroup_create_txn(&mut *txn, params).await;
        let created = self
            .finish(txn, result, "nodegroup_create", TenantOp::Create)
            .await?;
        info!(
            self.log,
            "created nodegroup";
            "cluster_uuid" => &params.cluster_uuid,
            "nodegroup_uuid" => &created.nodegroup_uuid,
        );
        Ok(created)
    }

    async fn nodegroup_create_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        params: &CreateNodeGroupParams,
    ) -> CreateResult<NodeGroupCreated> {
        let mut cluster = guarded_cluster(
            txn,
            &params.cluster_uuid,
            &params.cloudaccount_id,
        )
        .await?;
        if params.count < 0 {
            return Err(Error::invalid_request(
                "nodegroup count must not be negative",
            ));
        }

        let nodegroups = txn.nodegroup_list(cluster.cluster_id).await?;
        let workers: Vec<_> = nodegroups
            .iter()
            .filter(|ng| ng.nodegrouptype_name == NodeGroupType::Worker)
            .filter(|ng| ng.nodegroupstate_name != NodeGroupState::Deleting)
            .collect();
        if workers.iter().any(|ng| ng.name == params.name) {
            return Err(Error::ObjectAlreadyExists {
                type_name: ResourceType::NodeGroup,
                object_name: params.name.clone(),
            });
        }

        let defaults = self.reference.defaults().await?;
        let account = self.account_spec(&params.cloudaccount_id).await?;
        let limits = Limits::new(&defaults, &account);
        let existing = i64::try_from(workers.len()).unwrap_or(i64::MAX);
        limits.check_count(QuotaKind::NodeGroupsPerCluster, existing)?;
        limits.check_size(
            QuotaKind::NodesPerNodeGroup,
            i64::from(params.count),
        )?;
        let cluster_nodes: i64 =
            workers.iter().map(|ng| i64::from(ng.nodecount)).sum();
        limits.check_size(
            QuotaKind::NodesPerCluster,
            cluster_nodes + i64::from(params.count),
        )?;

        // Workers join at the control plane's version.
        let cp = control_plane(&nodegroups)?;
        let entries = self
            .reference
            .compatibility(
                cluster.provider_name,
                &cp.runtime_name,
                &params.instancetype_name,
                &params.osimage_name,
            )
            .await?;
        let entry = entries
            .iter()
            .find(|e| e.version == cp.k8sversion_name)
            .ok_or_else(|| {
                Error::invalid_request(&format!(
                    "instance type {} with os image {} is not available \
                     for Kubernetes version {}",
                    params.instancetype_name,
                    params.osimage_name,
                    cp.k8sversion_name
                ))
            })?;
        let image = self
            .reference
            .osimageinstance(&entry.worker_image)
            .await?
            .ok_or_else(|| {
                Error::internal_error(&format!(
                    "no osimageinstance {:?}",
                    entry.worker_image
                ))
            })?;

        let unique_id = fresh_unique_id(txn, UniqueIdKind::NodeGroup).await?;
        let nodegroup = txn
            .nodegroup_insert(NewNodeGroup {
                cluster_id: cluster.cluster_id,
                unique_id: unique_id.clone(),
                name: params.name.clone(),
                nodegrouptype_name: NodeGroupType::Worker,
                k8sversion_name: cp.k8sversion_name.clone(),
                runtime_name: cp.runtime_name.clone(),
                instancetype_name: params.instancetype_name.clone(),
                osimageinstance_name: image.osimageinstance_name.clone(),
                nodecount: params.count,
                nodegroupstate_name: NodeGroupState::Pending,
                createddate: Utc::now(),
            })
            .await?;

        cluster.clusterstate_name = ClusterState::Pending;
        txn.cluster_update(&cluster).await?;

        let mut document = latest_document(txn, cluster.cluster_id).await?;
        document.spec.nodegroups.push(NodegroupTemplateSpec {
            name: unique_id.clone(),
            kubernetes_version: nodegroup.k8sversion_name.clone(),
            instance_type: nodegroup.instancetype_name.clone(),
            instance_imi: image.imiartifact,
            count: nodegroup.nodecount,
            runtime: nodegroup.runtime_name.clone(),
            ..Default::default()
        });
        insert_revision(
            txn,
            cluster.cluster_id,
            &document,
            Change::NodeGroupCreate,
        )
        .await?;

        Ok(NodeGroupCreated {
            nodegroup_uuid: unique_id,
            name: nodegroup.name,
            state: nodegroup.nodegroupstate_name.to_string(),
        })
    }

    /// Starts removing a worker nodegroup
    ///
    /// The row stays until the operator stops reporting the nodegroup.
    pub async fn nodegroup_delete(
        &self,
        cluster_uuid: &str,
        nodegroup_uuid: &str,
        cloudaccount_id: &str,
    ) -> DeleteResult {
        let mut txn = self.begin("nodegroup_delete", TenantOp::Delete).await?;
        let result = self
            .nodegroup_delete_txn(
                &mut *txn,
                cluster_uuid,
                nodegroup_uuid,
                cloudaccount_id,
            )
            .await;
        self.finish(txn, result, "nodegroup_delete", TenantOp::Delete).await?;
        info!(
            self.log,
            "nodegroup delete requested";
            "cluster_uuid" => cluster_uuid,
            "nodegroup_uuid" => nodegroup_uuid,
        );
        Ok(())
    }

    async fn nodegroup_delete_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        cluster_uuid: &str,
        nodegroup_uuid: &str,
        cloudaccount_id: &str,
    ) -> DeleteResult {
        let mut cluster =
            guarded_cluster(txn, cluster_uuid, cloudaccount_id).await?;
        let mut nodegroup = txn
            .nodegroup_list(cluster.cluster_id)
            .await?
            .into_iter()
            .find(|ng| ng.unique_id == nodegroup_uuid)
            .ok_or_else(|| {
                Error::not_found_by_unique_id(
                    ResourceType::NodeGroup,
                    nodegroup_uuid,
                )
            })?;
        if nodegroup.is_control_plane() {
            return Err(Error::failed_precondition(
                "Control plane nodegroup can not be deleted",
            ));
        }
        if nodegroup.nodegroupstate_name == NodeGroupState::Deleting {
            return Err(Error::failed_precondition(
                "Cannot delete nodegroup in deleting state",
            ));
        }

        // A repeated request after the document already dropped the
        // nodegroup changes nothing.
        let mut document = latest_document(txn, cluster.cluster_id).await?;
        if !document.spec.remove_nodegroup(nodegroup_uuid) {
            warn!(
                self.log,
                "nodegroup missing from desired state";
                "cluster_uuid" => cluster_uuid,
                "nodegroup_uuid" => nodegroup_uuid,
            );
            return Ok(());
        }

        nodegroup.nodegroupstate_name = NodeGroupState::Deleting;
        txn.nodegroup_update(&nodegroup).await?;
        cluster.clusterstate_name = ClusterState::Pending;
        txn.cluster_update(&cluster).await?;
        insert_revision(
            txn,
            cluster.cluster_id,
            &document,
            Change::NodeGroupDelete,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::db::pub_test_utils::{
        nodegroup_params, settle, TestDatastore, CLOUD_ACCOUNT,
    };
    use assert_matches::assert_matches;
    use iks_common::api::external::{Error, ResourceType};
    use iks_db_model::{
        CloudAccountExtraSpec, ClusterState, NodeGroupState, NodeGroupType,
    };
    use iks_planning::guard::NOT_ACTIONABLE;
    use iks_test_utils::dev;
    use iks_types::document::ClusterDocument;

    fn latest_document(tables: &crate::db::SimTables) -> ClusterDocument {
        let rev = tables
            .revisions
            .iter()
            .max_by_key(|r| r.clusterrev_id)
            .unwrap();
        serde_json::from_value(rev.desiredspec_json.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_nodegroup_create() {
        let logctx = dev::test_setup_log("test_nodegroup_create");
        let test = TestDatastore::new(&logctx.log);
        let uuid = test.active_cluster("one").await;

        let created = test
            .datastore
            .nodegroup_create(&nodegroup_params(&uuid, "workers", 2))
            .await
            .unwrap();
        assert!(created.nodegroup_uuid.starts_with("ng-"));
        assert_eq!(created.state, "Pending");

        let tables = test.store.tables().await;
        assert_eq!(tables.clusters[0].clusterstate_name, ClusterState::Pending);
        let ng = tables
            .nodegroups
            .iter()
            .find(|ng| ng.unique_id == created.nodegroup_uuid)
            .unwrap();
        assert_eq!(ng.nodegrouptype_name, NodeGroupType::Worker);
        assert_eq!(ng.k8sversion_name, "1.27.4");
        assert_eq!(ng.osimageinstance_name, "iks-wk-1-27-4");

        let doc = latest_document(&tables);
        assert_eq!(doc.spec.nodegroups.len(), 1);
        assert_eq!(doc.spec.nodegroups[0].name, created.nodegroup_uuid);
        assert_eq!(doc.spec.nodegroups[0].count, 2);
        assert_eq!(
            doc.spec.nodegroups[0].instance_imi,
            "iks-u22-wk-1-27-4.img"
        );
        // Earlier content of the document is carried over.
        assert_eq!(doc.spec.ilbs.len(), 4);

        // The new revision has yet to be applied.
        let err = test
            .datastore
            .nodegroup_create(&nodegroup_params(&uuid, "more", 2))
            .await
            .unwrap_err();
        assert_eq!(err, Error::failed_precondition(NOT_ACTIONABLE));
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_nodegroup_create_checks() {
        let logctx = dev::test_setup_log("test_nodegroup_create_checks");
        let test = TestDatastore::new(&logctx.log);
        let uuid = test.active_cluster("one").await;

        test.datastore
            .nodegroup_create(&nodegroup_params(&uuid, "workers", 2))
            .await
            .unwrap();
        settle(&test, &uuid).await;

        let err = test
            .datastore
            .nodegroup_create(&nodegroup_params(&uuid, "workers", 2))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "NodeGroup name already in use");

        let err = test
            .datastore
            .nodegroup_create(&nodegroup_params(&uuid, "big", 11))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::permission_denied(
                "Can not create more than 10 nodes for this nodegroup"
            )
        );

        let mut params = nodegroup_params(&uuid, "odd", 1);
        params.osimage_name = "centos-7".to_string();
        let err = test.datastore.nodegroup_create(&params).await.unwrap_err();
        assert_matches!(err, Error::InvalidRequest { .. });

        let mut params = nodegroup_params(&uuid, "stranger", 1);
        params.cloudaccount_id = "other-account".to_string();
        let err = test.datastore.nodegroup_create(&params).await.unwrap_err();
        assert_matches!(
            err,
            Error::ObjectNotFound { type_name: ResourceType::Cluster, .. }
        );
        logctx.cleanup_successful();
    }

    async fn race(remaining: i32) -> (usize, Vec<Error>) {
        let logctx = dev::test_setup_log(&format!("race_{remaining}"));
        let reference = TestDatastore::reference().with_cloud_account(
            CloudAccountExtraSpec {
                cloudaccount_id: CLOUD_ACCOUNT.to_string(),
                maxclusterng_override: Some(remaining),
                ..Default::default()
            },
        );
        let test = TestDatastore::with_reference(&logctx.log, reference);
        let uuid = test.active_cluster("one").await;

        let names: Vec<String> = (0..5).map(|i| format!("ng{i}")).collect();
        let results = futures::future::join_all(names.iter().map(|name| {
            let params = nodegroup_params(&uuid, name, 1);
            let datastore = &test.datastore;
            async move { datastore.nodegroup_create(&params).await }
        }))
        .await;

        let workers = test
            .store
            .tables()
            .await
            .nodegroups
            .iter()
            .filter(|ng| ng.nodegrouptype_name == NodeGroupType::Worker)
            .count();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(workers, successes);
        let errors = results.into_iter().filter_map(Result::err).collect();
        logctx.cleanup_successful();
        (successes, errors)
    }

    #[tokio::test]
    async fn test_nodegroup_quota_race() {
        let (successes, errors) = race(1).await;
        assert_eq!(successes, 1);
        assert_eq!(errors.len(), 4);
        for err in errors {
            // The losers find the cluster busy with the winner's revision.
            assert_eq!(err, Error::failed_precondition(NOT_ACTIONABLE));
        }

        let (successes, errors) = race(0).await;
        assert_eq!(successes, 0);
        assert_eq!(errors.len(), 5);
        for err in errors {
            assert_eq!(
                err,
                Error::permission_denied(
                    "Can not create more than 0 nodegroups for this cluster"
                )
            );
        }
    }

    #[tokio::test]
    async fn test_nodegroup_delete() {
        let logctx = dev::test_setup_log("test_nodegroup_delete");
        let test = TestDatastore::new(&logctx.log);
        let uuid = test.active_cluster("one").await;
        let created = test
            .datastore
            .nodegroup_create(&nodegroup_params(&uuid, "workers", 2))
            .await
            .unwrap();
        settle(&test, &uuid).await;

        let cp_uuid = format!("cp-{}", &uuid[3..]);
        let err = test
            .datastore
            .nodegroup_delete(&uuid, &cp_uuid, CLOUD_ACCOUNT)
            .await
            .unwrap_err();
        assert_matches!(err, Error::FailedPrecondition { .. });

        let err = test
            .datastore
            .nodegroup_delete(&uuid, "ng-nonexistent", CLOUD_ACCOUNT)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "NodeGroup not found: ng-nonexistent");

        test.datastore
            .nodegroup_delete(&uuid, &created.nodegroup_uuid, CLOUD_ACCOUNT)
            .await
            .unwrap();
        let tables = test.store.tables().await;
        let ng = tables
            .nodegroups
            .iter()
            .find(|ng| ng.unique_id == created.nodegroup_uuid)
            .unwrap();
        assert_eq!(ng.nodegroupstate_name, NodeGroupState::Deleting);
        assert_eq!(tables.clusters[0].clusterstate_name, ClusterState::Pending);
        assert!(latest_document(&tables).spec.nodegroups.is_empty());

        settle(&test, &uuid).await;
        let err = test
            .datastore
            .nodegroup_delete(&uuid, &created.nodegroup_uuid, CLOUD_ACCOUNT)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::failed_precondition(
                "Cannot delete nodegroup in deleting state"
            )
        );
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_nodegroup_delete_after_document_dropped_it() {
        let logctx = dev::test_setup_log(
            "test_nodegroup_delete_after_document_dropped_it",
        );
        let test = TestDatastore::new(&logctx.log);
        let uuid = test.active_cluster("one").await;
        let created = test
            .datastore
            .nodegroup_create(&nodegroup_params(&uuid, "workers", 2))
            .await
            .unwrap();
        settle(&test, &uuid).await;
        let nodegroup_uuid = created.nodegroup_uuid.clone();
        test.store
            .modify(move |t| {
                let rev = t.revisions.last_mut().unwrap();
                let mut doc: ClusterDocument =
                    serde_json::from_value(rev.desiredspec_json.clone())
                        .unwrap();
                assert!(doc.spec.remove_nodegroup(&nodegroup_uuid));
                rev.desiredspec_json = serde_json::to_value(&doc).unwrap();
            })
            .await;
        let before = test.store.tables().await;

        test.datastore
            .nodegroup_delete(&uuid, &created.nodegroup_uuid, CLOUD_ACCOUNT)
            .await
            .unwrap();
        let after = test.store.tables().await;
        assert_eq!(after, before);
        assert_eq!(after.clusters[0].clusterstate_name, ClusterState::Active);
        logctx.cleanup_successful();
    }
}
