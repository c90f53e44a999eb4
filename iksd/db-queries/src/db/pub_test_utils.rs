// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test support code that can be enabled by dependencies via this crate's
//! `testing` feature.
//!
//! This feature should only be enabled under `dev-dependencies` to avoid this
//! test support code leaking into release binaries.

use super::{DataStore, FixtureReferenceData, SimStore};
use async_trait::async_trait;
use iks_db_model::{
    AddonVersion, CloudAccountExtraSpec, InstanceType, K8sCompatibility,
    K8sVersion, LifecycleState, OsImageInstance, Provider,
};
use iks_key_manager::{SecretRetriever, SecretRetrieverError, VersionedKey};
use iks_types::params::{
    CreateClusterParams, CreateNodeGroupParams, CreateVipParams,
    EnableStorageParams,
};
use slog::Logger;
use std::sync::Arc;

/// The account every helper acts as
pub const CLOUD_ACCOUNT: &str = "123456789012";

const VERSIONS: [&str; 3] = ["1.27.3", "1.27.4", "1.28.2"];
const RUNTIME: &str = "containerd";
const INSTANCE_TYPE: &str = "vm-spr-sml";
const OS_IMAGE: &str = "ubuntu-2204";

/// Hands out a single fixed 256-bit key with id 1
struct FixedKey;

#[async_trait]
impl SecretRetriever for FixedKey {
    async fn get_latest(&self) -> Result<VersionedKey, SecretRetrieverError> {
        self.get(1).await
    }

    async fn get(&self, id: i32) -> Result<VersionedKey, SecretRetrieverError> {
        if id != 1 {
            return Err(SecretRetrieverError::NoSuchKey(id));
        }
        Ok(VersionedKey::new(1, b"0123456789abcdef0123456789abcdef"))
    }
}

/// A [`DataStore`] over an in-memory store, with the store kept at hand so
/// tests can look at (and tamper with) the committed rows
pub struct TestDatastore {
    pub datastore: DataStore,
    pub store: SimStore,
}

impl TestDatastore {
    pub fn new(log: &Logger) -> TestDatastore {
        TestDatastore::with_reference(log, TestDatastore::reference())
    }

    pub fn with_reference(
        log: &Logger,
        reference: FixtureReferenceData,
    ) -> TestDatastore {
        let store = SimStore::new();
        let datastore = DataStore::new(
            log,
            Arc::new(store.clone()),
            Arc::new(reference),
            Arc::new(FixedKey),
        );
        TestDatastore { datastore, store }
    }

    /// A small but complete world: three versions of one provider, one
    /// runtime, instance type and os image, two default addons
    pub fn reference() -> FixtureReferenceData {
        let defaults = [
            ("max_cluster", "3"),
            ("max_cluster_ng", "5"),
            ("max_cust_cluster_ilb", "2"),
            ("max_nodegroup_vm", "10"),
            ("max_cluster_vm", "40"),
            ("restrict_create_cluster", "false"),
            ("vip_provider", "highwire"),
            ("ilb_ipprotocol", "TCP"),
            ("max_source_ips", "20"),
            ("ilb_etcdservername", "etcd"),
            ("ilb_etcdiptype", "private"),
            ("ilb_etcdport", "2379"),
            ("ilb_etcdpool_port", "2379"),
            ("ilb_apiservername", "apiserver"),
            ("ilb_apiserveriptype", "private"),
            ("ilb_apiserverport", "443"),
            ("ilb_apiserverpool_port", "6443"),
            ("ilb_public_apiservername", "public-apiserver"),
            ("ilb_public_apiserveriptype", "public"),
            ("ilb_public_apiserverport", "443"),
            ("ilb_public_apiserverpool_port", "6443"),
            ("ilb_konnectivityname", "konnectivity"),
            ("ilb_konnectivityiptype", "private"),
            ("ilb_konnectivityport", "8132"),
            ("ilb_konnectivitypool_port", "8132"),
        ];

        let mut reference = FixtureReferenceData {
            defaults: defaults
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            instance_types: vec![InstanceType {
                instancetype_name: INSTANCE_TYPE.to_string(),
                nodeprovider_name: "Compute".to_string(),
                lifecyclestate_name: LifecycleState::Active,
            }],
            ..Default::default()
        };
        for addon in ["calico", "coredns"] {
            reference.addon_versions.push(AddonVersion {
                addonversion_name: format!("{addon}-v1"),
                name: addon.to_string(),
                install_type: "kubectl-apply".to_string(),
                artifact_repo: format!("s3://addons/{addon}-v1.yaml"),
                lifecyclestate_name: LifecycleState::Active,
            });
        }

        for version in VERSIONS {
            let (major, minor) = version.rsplit_once('.').unwrap_or_default();
            reference.versions.push(K8sVersion {
                k8sversion_name: version.to_string(),
                major_version: major.to_string(),
                minor_version: minor.to_string(),
                provider_name: Provider::Iks,
                lifecyclestate_name: LifecycleState::Active,
            });
            let dashed = version.replace('.', "-");
            reference.compatibility.push(K8sCompatibility {
                provider_name: Provider::Iks,
                runtime_name: RUNTIME.to_string(),
                k8sversion_name: version.to_string(),
                osimage_name: OS_IMAGE.to_string(),
                instancetype_name: INSTANCE_TYPE.to_string(),
                cp_osimageinstance_name: format!("iks-cp-{dashed}"),
                wrk_osimageinstance_name: format!("iks-wk-{dashed}"),
                lifecyclestate_name: LifecycleState::Active,
            });
            for (role, nodegrouptype) in
                [("cp", "ControlPlane"), ("wk", "Worker")]
            {
                reference.osimageinstances.push(OsImageInstance {
                    osimageinstance_name: format!("iks-{role}-{dashed}"),
                    osimage_name: OS_IMAGE.to_string(),
                    k8sversion_name: version.to_string(),
                    nodegrouptype_name: nodegrouptype.to_string(),
                    provider_name: Provider::Iks,
                    imiartifact: format!("iks-u22-{role}-{dashed}.img"),
                    lifecyclestate_name: LifecycleState::Active,
                });
            }
            for addon in ["calico-v1", "coredns-v1"] {
                reference
                    .addon_compatibility
                    .push((addon.to_string(), version.to_string()));
            }
        }
        reference
    }

    /// Creates a cluster and brings it to an actionable state, returning its
    /// unique id
    pub async fn active_cluster(&self, name: &str) -> String {
        let created =
            self.datastore.cluster_create(&create_params(name)).await.unwrap();
        settle(self, &created.cluster_uuid).await;
        created.cluster_uuid
    }
}

/// Plays the operator converging on the latest revision of a cluster
pub async fn settle(test: &TestDatastore, cluster_uuid: &str) {
    let tables = test.store.tables().await;
    let cluster_id = tables
        .clusters
        .iter()
        .find(|c| c.unique_id == cluster_uuid)
        .unwrap()
        .cluster_id;
    let rev_id = tables
        .revisions
        .iter()
        .filter(|r| r.cluster_id == cluster_id)
        .map(|r| r.clusterrev_id)
        .max()
        .unwrap();
    test.datastore.cluster_change_applied(rev_id, true).await.unwrap();
    test.datastore.cluster_state_update(cluster_uuid, "Active").await.unwrap();
}

pub fn create_params(name: &str) -> CreateClusterParams {
    CreateClusterParams {
        cloudaccount_id: CLOUD_ACCOUNT.to_string(),
        name: name.to_string(),
        description: None,
        region: "us-region-1".to_string(),
        k8sversion_name: "1.27".to_string(),
        runtime_name: RUNTIME.to_string(),
        instancetype_name: INSTANCE_TYPE.to_string(),
        osimage_name: OS_IMAGE.to_string(),
    }
}

pub fn nodegroup_params(
    cluster_uuid: &str,
    name: &str,
    count: i32,
) -> CreateNodeGroupParams {
    CreateNodeGroupParams {
        cloudaccount_id: CLOUD_ACCOUNT.to_string(),
        cluster_uuid: cluster_uuid.to_string(),
        name: name.to_string(),
        count,
        instancetype_name: INSTANCE_TYPE.to_string(),
        osimage_name: OS_IMAGE.to_string(),
    }
}

pub fn vip_params(
    cluster_uuid: &str,
    name: &str,
    viptype: &str,
) -> CreateVipParams {
    CreateVipParams {
        cloudaccount_id: CLOUD_ACCOUNT.to_string(),
        cluster_uuid: cluster_uuid.to_string(),
        name: name.to_string(),
        description: None,
        port: 443,
        viptype: viptype.to_string(),
    }
}

pub fn storage_params(cluster_uuid: &str) -> EnableStorageParams {
    EnableStorageParams {
        cloudaccount_id: CLOUD_ACCOUNT.to_string(),
        cluster_uuid: cluster_uuid.to_string(),
        provider: "weka".to_string(),
        size: "100GB".to_string(),
    }
}

/// [`CLOUD_ACCOUNT`] with permission to use storage
pub fn storage_account() -> CloudAccountExtraSpec {
    CloudAccountExtraSpec {
        cloudaccount_id: CLOUD_ACCOUNT.to_string(),
        active_account_create_cluster: true,
        allow_create_storage: true,
        ..Default::default()
    }
}
