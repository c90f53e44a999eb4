// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on clusters

use super::{
    cluster_not_found, fresh_unique_id, insert_revision, key_error,
    latest_change_applied, owned_cluster, Change, DataStore,
};
use crate::db::error::TenantOp;
use crate::db::store::ClusterTransaction;
use chrono::Utc;
use iks_common::api::external::{
    CreateResult, DeleteResult, Error, ResourceType, UpdateResult,
};
use iks_db_model::{
    Addon, AddonState, ClusterExtraConfig, ClusterState, NewCluster,
    NewNodeGroup, NewVip, NodeGroupState, NodeGroupType, Provider, VipDetails,
    VipOwner, VipState, VipType,
};
use iks_key_manager::ClusterNonce;
use iks_planning::guard::require_actionable;
use iks_planning::naming::UniqueIdKind;
use iks_planning::quota::{Defaults, Limits, QuotaKind};
use iks_planning::upgrade::resolve_version;
use iks_types::document::{
    AddonTemplateSpec, ClusterDocument, ClusterSpec, IlbPoolTemplateSpec,
    IlbTemplateSpec,
};
use iks_types::params::CreateClusterParams;
use iks_types::views::ClusterCreated;
use serde_json::{json, Map};

/// Nodes in a new control plane
const CONTROL_PLANE_NODES: i32 = 3;

/// Prefix of a control plane nodegroup's unique id; the rest is the
/// cluster's random part.
const CONTROL_PLANE_PREFIX: &str = "cp-";

/// `defaultconfig` key naming the load balancer provider for new vips
pub(super) const VIP_PROVIDER: &str = "vip_provider";
/// `defaultconfig` key with the protocol new ILBs are created with
pub(super) const ILB_IPPROTOCOL: &str = "ilb_ipprotocol";

/// The load balancers every control plane is created with, as
/// `defaultconfig` keys: (name, ip type, port, pool port)
const SYSTEM_ILBS: [(&str, &str, &str, &str); 4] = [
    (
        "ilb_etcdservername",
        "ilb_etcdiptype",
        "ilb_etcdport",
        "ilb_etcdpool_port",
    ),
    (
        "ilb_apiservername",
        "ilb_apiserveriptype",
        "ilb_apiserverport",
        "ilb_apiserverpool_port",
    ),
    (
        "ilb_public_apiservername",
        "ilb_public_apiserveriptype",
        "ilb_public_apiserverport",
        "ilb_public_apiserverpool_port",
    ),
    (
        "ilb_konnectivityname",
        "ilb_konnectivityiptype",
        "ilb_konnectivityport",
        "ilb_konnectivitypool_port",
    ),
];

pub(super) fn required_default<'a>(
    defaults: &'a Defaults,
    key: &str,
) -> Result<&'a str, Error> {
    defaults.get(key).filter(|v| !v.is_empty()).ok_or_else(|| {
        Error::internal_error(&format!("missing default {key:?}"))
    })
}

fn default_i32(defaults: &Defaults, key: &str) -> Result<i32, Error> {
    let value = defaults.get_i64(key)?;
    i32::try_from(value).map_err(|_| {
        Error::internal_error(&format!("default {key:?} out of range: {value}"))
    })
}

/// Parses a state reported by the operator
pub(super) fn parse_state<T>(value: &str) -> Result<T, Error>
where
    T: std::str::FromStr<Err = iks_db_model::UnknownVariant>,
{
    value.parse().map_err(|e: iks_db_model::UnknownVariant| {
        Error::invalid_request(&e.to_string())
    })
}

impl DataStore {
    /// Provider of the account's clusters, `iks` unless the account says
    /// otherwise
    pub(super) async fn account_provider(
        &self,
        cloudaccount_id: &str,
    ) -> Result<Provider, Error> {
        let account = self.account_spec(cloudaccount_id).await?;
        match account.provider_name.as_deref() {
            None | Some("") => Ok(Provider::Iks),
            Some(name) => {
                name.parse().map_err(|e: iks_db_model::UnknownVariant| {
                    Error::internal_error(&e.to_string())
                })
            }
        }
    }

    pub async fn cluster_create(
        &self,
        params: &CreateClusterParams,
    ) -> CreateResult<ClusterCreated> {
        let mut txn = self.begin("cluster_create", TenantOp::Create).await?;
        let result = self.cluster_create_txn(&mut *txn, params).await;
        let created = self
            .finish(txn, result, "cluster_create", TenantOp::Create)
            .await?;
        info!(
            self.log,
            "created cluster";
            "cluster_uuid" => &created.cluster_uuid,
            "cloudaccount_id" => &params.cloudaccount_id,
            "k8sversion" => &created.k8sversion_name,
        );
        Ok(created)
    }

    async fn cluster_create_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        params: &CreateClusterParams,
    ) -> CreateResult<ClusterCreated> {
        txn.lock_cluster_table().await?;

        let defaults = self.reference.defaults().await?;
        let account = self.account_spec(&params.cloudaccount_id).await?;
        let limits = Limits::new(&defaults, &account);
        limits.check_may_create_cluster()?;

        let same_name = txn
            .cluster_count(
                &params.cloudaccount_id,
                Some(&params.name),
                &[ClusterState::Deleting, ClusterState::Deleted],
            )
            .await?;
        if same_name > 0 {
            return Err(Error::ObjectAlreadyExists {
                type_name: ResourceType::Cluster,
                object_name: params.name.clone(),
            });
        }
        let existing = txn
            .cluster_count(
                &params.cloudaccount_id,
                None,
                &[
                    ClusterState::Deleting,
                    ClusterState::DeletePending,
                    ClusterState::Deleted,
                ],
            )
            .await?;
        limits.check_count(QuotaKind::Clusters, existing)?;

        // Pick the version and control plane image.
        let provider = self.account_provider(&params.cloudaccount_id).await?;
        let entries = self
            .reference
            .compatibility(
                provider,
                &params.runtime_name,
                &params.instancetype_name,
                &params.osimage_name,
            )
            .await?;
        let entry = resolve_version(&params.k8sversion_name, &entries)
            .map_err(|e| Error::internal_error(&e.to_string()))?
            .ok_or_else(|| {
                Error::invalid_request(&format!(
                    "Kubernetes version {} is not available for this \
                     runtime, instance type and os image",
                    params.k8sversion_name
                ))
            })?
            .clone();
        let image = self
            .reference
            .osimageinstance(&entry.cp_image)
            .await?
            .ok_or_else(|| {
                Error::internal_error(&format!(
                    "no osimageinstance {:?}",
                    entry.cp_image
                ))
            })?;
        let vip_provider = required_default(&defaults, VIP_PROVIDER)?;
        let ipprotocol = required_default(&defaults, ILB_IPPROTOCOL)?;

        let unique_id = fresh_unique_id(txn, UniqueIdKind::Cluster).await?;
        let now = Utc::now();
        let cluster = txn
            .cluster_insert(NewCluster {
                unique_id: unique_id.clone(),
                name: params.name.clone(),
                description: params.description.clone(),
                cloudaccount_id: params.cloudaccount_id.clone(),
                provider_name: provider,
                region_name: params.region.clone(),
                clusterstate_name: ClusterState::Pending,
                created_date: now,
            })
            .await?;

        let random_part = unique_id
            .strip_prefix(UniqueIdKind::Cluster.prefix())
            .unwrap_or(&unique_id);
        let cp_id = format!("{CONTROL_PLANE_PREFIX}{random_part}");
        txn.nodegroup_insert(NewNodeGroup {
            cluster_id: cluster.cluster_id,
            unique_id: cp_id.clone(),
            name: cp_id,
            nodegrouptype_name: NodeGroupType::ControlPlane,
            k8sversion_name: entry.version.clone(),
            runtime_name: params.runtime_name.clone(),
            instancetype_name: params.instancetype_name.clone(),
            osimageinstance_name: image.osimageinstance_name.clone(),
            nodecount: CONTROL_PLANE_NODES,
            nodegroupstate_name: NodeGroupState::Pending,
            createddate: now,
        })
        .await?;

        let key_id = self.keys.latest_key_id().await.map_err(key_error)?;
        txn.extraconfig_insert(ClusterExtraConfig {
            cluster_id: cluster.cluster_id,
            encryptionkey_id: key_id,
            nonce: ClusterNonce::generate().to_base64(),
            ..Default::default()
        })
        .await?;

        let mut addons = Vec::new();
        for addon in self.reference.default_addons(&entry.version).await? {
            txn.addon_upsert(Addon {
                cluster_id: cluster.cluster_id,
                addonversion_name: addon.addonversion_name.clone(),
                install_type: addon.install_type.clone(),
                artifact_repo: Some(addon.artifact_repo.clone()),
                clusteraddonstate_name: AddonState::Pending,
                kubernetes_status: None,
                lastchangetimestamp: now,
            })
            .await?;
            addons.push(AddonTemplateSpec {
                name: addon.name,
                install_type: addon.install_type,
                artifact: addon.artifact_repo,
            });
        }

        let mut ilbs = Vec::new();
        for (name_key, type_key, port_key, pool_port_key) in SYSTEM_ILBS {
            let name = required_default(&defaults, name_key)?;
            let iptype = required_default(&defaults, type_key)?;
            let viptype: VipType = iptype.parse().map_err(
                |e: iks_db_model::UnknownVariant| {
                    Error::internal_error(&e.to_string())
                },
            )?;
            let port = default_i32(&defaults, port_key)?;
            let pool_port = default_i32(&defaults, pool_port_key)?;
            txn.vip_insert(
                NewVip {
                    cluster_id: cluster.cluster_id,
                    viptype_name: viptype,
                    vipstate_name: VipState::Pending,
                    owner: VipOwner::System,
                    vipprovider_name: vip_provider.to_string(),
                    created_date: now,
                },
                VipDetails {
                    vip_id: 0,
                    vip_name: name.to_string(),
                    description: None,
                    port,
                    pool_name: name.to_string(),
                    pool_port,
                    pool_id: None,
                    protocol: None,
                },
            )
            .await?;
            ilbs.push(IlbTemplateSpec {
                name: name.to_string(),
                port,
                iptype: iptype.to_string(),
                ipprotocol: ipprotocol.to_string(),
                owner: VipOwner::System.to_string(),
                pool: IlbPoolTemplateSpec {
                    name: name.to_string(),
                    port: pool_port,
                    ..Default::default()
                },
                ..Default::default()
            });
        }

        let document = ClusterDocument {
            spec: ClusterSpec {
                kubernetes_version: entry.version.clone(),
                instance_imi: image.imiartifact,
                instance_type: params.instancetype_name.clone(),
                runtime: params.runtime_name.clone(),
                kubernetes_provider: provider.to_string(),
                addons,
                ilbs,
                ..Default::default()
            },
            extra: Map::from_iter([
                ("apiVersion".to_string(), json!("private.cloud/v1alpha1")),
                ("kind".to_string(), json!("Cluster")),
                ("metadata".to_string(), json!({ "name": unique_id })),
            ]),
        };
        insert_revision(
            txn,
            cluster.cluster_id,
            &document,
            Change::ClusterCreate,
        )
        .await?;

        Ok(ClusterCreated {
            cluster_uuid: unique_id,
            name: cluster.name,
            k8sversion_name: entry.version,
            state: ClusterState::Pending.to_string(),
        })
    }

    /// Starts tearing down a cluster
    ///
    /// Every nodegroup, vip and addon is marked `Deleting` and the cluster
    /// `DeletePending`.  Rows are only removed once the operator confirms
    /// teardown, through [`DataStore::cluster_delete_finalize`].
    pub async fn cluster_delete(
        &self,
        cluster_uuid: &str,
        cloudaccount_id: &str,
    ) -> DeleteResult {
        let mut txn = self.begin("cluster_delete", TenantOp::Delete).await?;
        let result = self
            .cluster_delete_txn(&mut *txn, cluster_uuid, cloudaccount_id)
            .await;
        self.finish(txn, result, "cluster_delete", TenantOp::Delete).await?;
        info!(
            self.log,
            "cluster delete requested";
            "cluster_uuid" => cluster_uuid,
        );
        Ok(())
    }

    async fn cluster_delete_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        cluster_uuid: &str,
        cloudaccount_id: &str,
    ) -> DeleteResult {
        let mut cluster =
            owned_cluster(txn, cluster_uuid, cloudaccount_id).await?;
        if cluster.clusterstate_name.is_deleting() {
            return Err(Error::failed_precondition(
                "Cluster can not be deleted , it is currently in deleting \
                 state",
            ));
        }
        let applied = latest_change_applied(txn, cluster.cluster_id).await?;
        require_actionable(cluster.clusterstate_name, applied)?;

        for mut nodegroup in txn.nodegroup_list(cluster.cluster_id).await? {
            nodegroup.nodegroupstate_name = NodeGroupState::Deleting;
            txn.nodegroup_update(&nodegroup).await?;
        }
        for mut vip in txn.vip_list(cluster.cluster_id).await? {
            vip.vip.vipstate_name = VipState::Deleting;
            txn.vip_update(&vip.vip).await?;
        }
        for mut addon in txn.addon_list(cluster.cluster_id).await? {
            addon.clusteraddonstate_name = AddonState::Deleting;
            addon.lastchangetimestamp = Utc::now();
            txn.addon_upsert(addon).await?;
        }
        cluster.clusterstate_name = ClusterState::DeletePending;
        txn.cluster_update(&cluster).await
    }

    /// Records a cluster state reported by the operator
    pub async fn cluster_state_update(
        &self,
        cluster_uuid: &str,
        state: &str,
    ) -> UpdateResult<()> {
        let state: ClusterState = parse_state(state)?;
        let mut txn =
            self.begin("cluster_state_update", TenantOp::Update).await?;
        let result =
            self.cluster_state_update_txn(&mut *txn, cluster_uuid, state).await;
        self.finish(txn, result, "cluster_state_update", TenantOp::Update)
            .await?;
        debug!(
            self.log,
            "cluster state updated";
            "cluster_uuid" => cluster_uuid,
            "state" => %state,
        );
        Ok(())
    }

    async fn cluster_state_update_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        cluster_uuid: &str,
        state: ClusterState,
    ) -> UpdateResult<()> {
        let mut cluster = txn
            .cluster_fetch_for_update(cluster_uuid)
            .await?
            .ok_or_else(|| cluster_not_found(cluster_uuid))?;
        if cluster.clusterstate_name != state {
            cluster.clusterstate_name = state;
            txn.cluster_update(&cluster).await?;
        }
        Ok(())
    }

    /// Marks one revision as (not) converged on by the operator
    pub async fn cluster_change_applied(
        &self,
        clusterrev_id: i32,
        change_applied: bool,
    ) -> UpdateResult<()> {
        let mut txn =
            self.begin("cluster_change_applied", TenantOp::Update).await?;
        let result = txn
            .revision_set_change_applied(clusterrev_id, change_applied)
            .await
            .and_then(|found| {
                if found {
                    Ok(())
                } else {
                    Err(Error::not_found_by_id(
                        ResourceType::ClusterRevision,
                        clusterrev_id,
                    ))
                }
            });
        self.finish(txn, result, "cluster_change_applied", TenantOp::Update)
            .await
    }
}

#[cfg(test)]
mod test {
    use crate::db::pub_test_utils::{
        create_params, settle, TestDatastore, CLOUD_ACCOUNT,
    };
    use assert_matches::assert_matches;
    use iks_common::api::external::{Error, ResourceType};
    use iks_db_model::{
        AddonState, CloudAccountExtraSpec, ClusterState, NodeGroupState,
        NodeGroupType, VipOwner, VipState,
    };
    use iks_planning::guard::NOT_ACTIONABLE;
    use iks_planning::quota::RESTRICTED_ACCOUNT;
    use iks_test_utils::dev;
    use iks_types::document::ClusterDocument;

    #[tokio::test]
    async fn test_cluster_create() {
        let logctx = dev::test_setup_log("test_cluster_create");
        let test = TestDatastore::new(&logctx.log);

        let created =
            test.datastore.cluster_create(&create_params("one")).await.unwrap();
        assert!(created.cluster_uuid.starts_with("cl-"));
        assert_eq!(created.k8sversion_name, "1.27.4");
        assert_eq!(created.state, "Pending");

        let tables = test.store.tables().await;
        assert_eq!(tables.clusters.len(), 1);
        let cluster = &tables.clusters[0];
        assert_eq!(cluster.clusterstate_name, ClusterState::Pending);

        assert_eq!(tables.nodegroups.len(), 1);
        let cp = &tables.nodegroups[0];
        assert_eq!(cp.nodegrouptype_name, NodeGroupType::ControlPlane);
        assert_eq!(cp.unique_id, format!("cp-{}", &created.cluster_uuid[3..]));
        assert_eq!(cp.nodecount, 3);
        assert_eq!(cp.osimageinstance_name, "iks-cp-1-27-4");

        assert_eq!(tables.extraconfigs.len(), 1);
        assert_eq!(tables.extraconfigs[0].encryptionkey_id, 1);

        assert_eq!(tables.addons.len(), 2);
        assert!(tables
            .addons
            .iter()
            .all(|a| a.clusteraddonstate_name == AddonState::Pending));

        assert_eq!(tables.vips.len(), 4);
        assert!(tables.vips.iter().all(|v| v.owner == VipOwner::System
            && v.vipstate_name == VipState::Pending));

        assert_eq!(tables.revisions.len(), 1);
        let rev = &tables.revisions[0];
        assert!(!rev.change_applied);
        let doc: ClusterDocument =
            serde_json::from_value(rev.desiredspec_json.clone()).unwrap();
        assert_eq!(doc.spec.kubernetes_version, "1.27.4");
        assert_eq!(doc.spec.instance_imi, "iks-u22-cp-1-27-4.img");
        assert_eq!(doc.spec.addons.len(), 2);
        assert_eq!(doc.spec.ilbs.len(), 4);
        assert_eq!(doc.extra["metadata"]["name"], created.cluster_uuid);
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_cluster_create_checks() {
        let logctx = dev::test_setup_log("test_cluster_create_checks");
        let test = TestDatastore::new(&logctx.log);

        test.datastore.cluster_create(&create_params("one")).await.unwrap();
        let err = test
            .datastore
            .cluster_create(&create_params("one"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cluster name already in use");

        test.datastore.cluster_create(&create_params("two")).await.unwrap();
        test.datastore.cluster_create(&create_params("three")).await.unwrap();
        let err = test
            .datastore
            .cluster_create(&create_params("four"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::permission_denied(
                "Can not create more than 3 clusters for this cloud account"
            )
        );

        let mut params = create_params("five");
        params.cloudaccount_id = "other-account".to_string();
        params.k8sversion_name = "1.26".to_string();
        let err = test.datastore.cluster_create(&params).await.unwrap_err();
        assert_matches!(err, Error::InvalidRequest { .. });
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_cluster_create_quota_race() {
        let logctx = dev::test_setup_log("test_cluster_create_quota_race");
        let test = TestDatastore::new(&logctx.log);

        let names: Vec<String> = (0..8).map(|i| format!("race{i}")).collect();
        let results = futures::future::join_all(names.iter().map(|name| {
            let params = create_params(name);
            let datastore = &test.datastore;
            async move { datastore.cluster_create(&params).await }
        }))
        .await;

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 3);
        assert_eq!(test.store.tables().await.clusters.len(), 3);
        let errors: Vec<Error> =
            results.into_iter().filter_map(Result::err).collect();
        assert_eq!(errors.len(), 5);
        for err in errors {
            assert_eq!(
                err,
                Error::permission_denied(
                    "Can not create more than 3 clusters for this cloud \
                     account"
                )
            );
        }
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_cluster_create_restricted() {
        let logctx = dev::test_setup_log("test_cluster_create_restricted");
        let reference = TestDatastore::reference()
            .with_default("restrict_create_cluster", "true");
        let test =
            TestDatastore::with_reference(&logctx.log, reference.clone());
        let err = test
            .datastore
            .cluster_create(&create_params("one"))
            .await
            .unwrap_err();
        assert_eq!(err, Error::permission_denied(RESTRICTED_ACCOUNT));

        let reference = reference.with_cloud_account(CloudAccountExtraSpec {
            cloudaccount_id: CLOUD_ACCOUNT.to_string(),
            active_account_create_cluster: true,
            maxclusters_override: Some(1),
            ..Default::default()
        });
        let test = TestDatastore::with_reference(&logctx.log, reference);
        test.datastore.cluster_create(&create_params("one")).await.unwrap();
        let err = test
            .datastore
            .cluster_create(&create_params("two"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::permission_denied(
                "Can not create more than 1 clusters for this cloud account"
            )
        );
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_deleted_clusters_free_their_name() {
        let logctx =
            dev::test_setup_log("test_deleted_clusters_free_their_name");
        let test = TestDatastore::new(&logctx.log);
        let created =
            test.datastore.cluster_create(&create_params("one")).await.unwrap();
        test.datastore
            .cluster_state_update(&created.cluster_uuid, "Deleted")
            .await
            .unwrap();
        test.datastore.cluster_create(&create_params("one")).await.unwrap();
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_cluster_delete() {
        let logctx = dev::test_setup_log("test_cluster_delete");
        let test = TestDatastore::new(&logctx.log);
        let uuid = test.active_cluster("one").await;

        // Someone else's cluster does not exist.
        let err = test
            .datastore
            .cluster_delete(&uuid, "other-account")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), format!("Cluster not found: {uuid}"));

        test.datastore.cluster_delete(&uuid, CLOUD_ACCOUNT).await.unwrap();
        let tables = test.store.tables().await;
        assert_eq!(
            tables.clusters[0].clusterstate_name,
            ClusterState::DeletePending
        );
        assert!(tables
            .nodegroups
            .iter()
            .all(|n| n.nodegroupstate_name == NodeGroupState::Deleting));
        assert!(tables
            .vips
            .iter()
            .all(|v| v.vipstate_name == VipState::Deleting));
        assert!(tables
            .addons
            .iter()
            .all(|a| a.clusteraddonstate_name == AddonState::Deleting));

        let err = test
            .datastore
            .cluster_delete(&uuid, CLOUD_ACCOUNT)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::failed_precondition(
                "Cluster can not be deleted , it is currently in deleting state"
            )
        );
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_cluster_delete_needs_applied_revision() {
        let logctx =
            dev::test_setup_log("test_cluster_delete_needs_applied_revision");
        let test = TestDatastore::new(&logctx.log);
        let created =
            test.datastore.cluster_create(&create_params("one")).await.unwrap();
        test.datastore
            .cluster_state_update(&created.cluster_uuid, "Active")
            .await
            .unwrap();
        let err = test
            .datastore
            .cluster_delete(&created.cluster_uuid, CLOUD_ACCOUNT)
            .await
            .unwrap_err();
        assert_eq!(err, Error::failed_precondition(NOT_ACTIONABLE));

        settle(&test, &created.cluster_uuid).await;
        test.datastore
            .cluster_delete(&created.cluster_uuid, CLOUD_ACCOUNT)
            .await
            .unwrap();
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_operator_callbacks() {
        let logctx = dev::test_setup_log("test_operator_callbacks");
        let test = TestDatastore::new(&logctx.log);

        let err = test
            .datastore
            .cluster_state_update("cl-missing000", "Active")
            .await
            .unwrap_err();
        assert_matches!(
            err,
            Error::ObjectNotFound { type_name: ResourceType::Cluster, .. }
        );
        let err = test
            .datastore
            .cluster_state_update("cl-missing000", "Sleeping")
            .await
            .unwrap_err();
        assert_matches!(err, Error::InvalidRequest { .. });

        let err = test
            .datastore
            .cluster_change_applied(999, true)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::not_found_by_id(ResourceType::ClusterRevision, 999)
        );

        let created =
            test.datastore.cluster_create(&create_params("one")).await.unwrap();
        let rev_id = test.store.tables().await.revisions[0].clusterrev_id;
        test.datastore.cluster_change_applied(rev_id, true).await.unwrap();
        test.datastore
            .cluster_state_update(&created.cluster_uuid, "Active")
            .await
            .unwrap();
        let tables = test.store.tables().await;
        assert!(tables.revisions[0].change_applied);
        assert_eq!(tables.clusters[0].clusterstate_name, ClusterState::Active);
        logctx.cleanup_successful();
    }
}
