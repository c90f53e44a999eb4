// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Primary control plane interface for database read and write operations

// Every workflow has the same shape:
//
// 1. begin a transaction,
// 2. lock what it is about to check (the cluster row, or the cluster table
//    when there is no row yet),
// 3. run the guard: existence, ownership, actionability,
// 4. run its own checks (names, quotas, states), then write,
// 5. commit, or roll back on any error.
//
// Steps 2 through 4 live in a `*_txn` method that takes the transaction;
// the public method wraps it with `finish`.

use super::error::{TenantOp, TenantSafe};
use super::pool::Pool;
use super::reference::{PgReferenceData, ReferenceData};
use super::store::{ClusterStore, ClusterTransaction};
use super::PgStore;
use chrono::Utc;
use iks_common::api::external::{Error, ResourceType};
use iks_db_model::{
    CloudAccountExtraSpec, Cluster, ClusterRevision, NewClusterRevision,
    NodeGroup,
};
use iks_key_manager::{KeyManager, SecretRetriever};
use iks_planning::guard::require_actionable;
use iks_planning::naming::{generate_unique_id, UniqueIdKind};
use iks_types::document::ClusterDocument;
use slog::Logger;
use std::sync::Arc;

mod cascade;
mod certs;
mod cluster;
mod nodegroup;
mod reconcile;
mod storage;
mod upgrade;
mod vip;

/// How many random unique ids to try before giving up
const UNIQUE_ID_ATTEMPTS: usize = 5;

pub struct DataStore {
    log: Logger,
    store: Arc<dyn ClusterStore>,
    reference: Arc<dyn ReferenceData>,
    keys: KeyManager<Arc<dyn SecretRetriever>>,
}

impl DataStore {
    pub fn new(
        log: &Logger,
        store: Arc<dyn ClusterStore>,
        reference: Arc<dyn ReferenceData>,
        secrets: Arc<dyn SecretRetriever>,
    ) -> DataStore {
        DataStore {
            log: log.new(o!("component" => "DataStore")),
            store,
            reference,
            keys: KeyManager::new(secrets),
        }
    }

    /// Constructs a datastore backed by the Postgres database behind `pool`
    pub fn new_postgres(
        log: &Logger,
        pool: Pool,
        secrets: Arc<dyn SecretRetriever>,
    ) -> DataStore {
        let store = Arc::new(PgStore::new(log, pool.clone()));
        let reference = Arc::new(PgReferenceData::new(pool));
        DataStore::new(log, store, reference, secrets)
    }

    async fn begin(
        &self,
        call: &'static str,
        op: TenantOp,
    ) -> Result<Box<dyn ClusterTransaction>, Error> {
        self.store
            .begin()
            .await
            .map_err(|e| TenantSafe::new(&self.log, op).wrap(call, e))
    }

    /// Commits `txn` if `result` is Ok and rolls it back otherwise
    ///
    /// A failed rollback is logged and reported in place of the error that
    /// caused it.  Server-side errors are replaced by the generic message for
    /// `op` on the way out.
    async fn finish<T>(
        &self,
        txn: Box<dyn ClusterTransaction>,
        result: Result<T, Error>,
        call: &'static str,
        op: TenantOp,
    ) -> Result<T, Error> {
        let safe = TenantSafe::new(&self.log, op);
        match result {
            Ok(value) => {
                txn.commit().await.map_err(|e| safe.wrap(call, e))?;
                Ok(value)
            }
            Err(error) => match txn.rollback().await {
                Ok(()) => Err(safe.wrap(call, error)),
                Err(rollback_error) => {
                    error!(
                        self.log,
                        "transaction rollback failed";
                        "failed_call" => call,
                        "error" => %rollback_error,
                        "original_error" => %error,
                    );
                    let error = rollback_error.internal_context(format!(
                        "rolling back after: {error}"
                    ));
                    Err(safe.wrap(call, error))
                }
            },
        }
    }

    /// Returns the account's extra spec, or an all-defaults one if the
    /// account has none
    async fn account_spec(
        &self,
        cloudaccount_id: &str,
    ) -> Result<CloudAccountExtraSpec, Error> {
        Ok(self.reference.cloud_account(cloudaccount_id).await?.unwrap_or_else(
            || CloudAccountExtraSpec {
                cloudaccount_id: cloudaccount_id.to_string(),
                ..Default::default()
            },
        ))
    }
}

fn cluster_not_found(cluster_uuid: &str) -> Error {
    Error::not_found_by_unique_id(ResourceType::Cluster, cluster_uuid)
}

/// Fetches and locks a cluster, hiding it from anyone but its owner
async fn owned_cluster(
    txn: &mut dyn ClusterTransaction,
    cluster_uuid: &str,
    cloudaccount_id: &str,
) -> Result<Cluster, Error> {
    let cluster = txn
        .cluster_fetch_for_update(cluster_uuid)
        .await?
        .ok_or_else(|| cluster_not_found(cluster_uuid))?;
    if cluster.cloudaccount_id != cloudaccount_id {
        return Err(cluster_not_found(cluster_uuid));
    }
    Ok(cluster)
}

/// A cluster without revisions has never been handed to the operator and
/// counts as not applied.
async fn latest_change_applied(
    txn: &mut dyn ClusterTransaction,
    cluster_id: i32,
) -> Result<bool, Error> {
    Ok(txn
        .revision_latest(cluster_id)
        .await?
        .map(|rev| rev.change_applied)
        .unwrap_or(false))
}

/// Runs the guard shared by every tenant mutation: existence, ownership,
/// then actionability
async fn guarded_cluster(
    txn: &mut dyn ClusterTransaction,
    cluster_uuid: &str,
    cloudaccount_id: &str,
) -> Result<Cluster, Error> {
    let cluster = owned_cluster(txn, cluster_uuid, cloudaccount_id).await?;
    let applied = latest_change_applied(txn, cluster.cluster_id).await?;
    require_actionable(cluster.clusterstate_name, applied)?;
    Ok(cluster)
}

fn control_plane(nodegroups: &[NodeGroup]) -> Result<&NodeGroup, Error> {
    nodegroups.iter().find(|ng| ng.is_control_plane()).ok_or_else(|| {
        Error::internal_error("cluster has no control plane nodegroup")
    })
}

/// What a revision changed, recorded alongside its document
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Change {
    ClusterCreate,
    ClusterUpgrade,
    NodeGroupCreate,
    NodeGroupDelete,
    NodeGroupUpgrade,
    VipCreate,
    VipDelete,
    FirewallUpdate,
    FirewallDelete,
    StorageEnable,
}

impl Change {
    fn component(&self) -> (&'static str, &'static str) {
        match self {
            Change::ClusterCreate => ("Cluster", "Create"),
            Change::ClusterUpgrade => ("Cluster", "Upgrade"),
            Change::NodeGroupCreate => ("NodeGroup", "Create"),
            Change::NodeGroupDelete => ("NodeGroup", "Delete"),
            Change::NodeGroupUpgrade => ("NodeGroup", "Upgrade"),
            Change::VipCreate => ("Vip", "Create"),
            Change::VipDelete => ("Vip", "Delete"),
            Change::FirewallUpdate => ("Firewall", "Update"),
            Change::FirewallDelete => ("Firewall", "Delete"),
            Change::StorageEnable => ("Storage", "Create"),
        }
    }
}

async fn latest_document(
    txn: &mut dyn ClusterTransaction,
    cluster_id: i32,
) -> Result<ClusterDocument, Error> {
    let rev = txn.revision_latest(cluster_id).await?.ok_or_else(|| {
        Error::internal_error(&format!(
            "cluster {cluster_id} has no desired-state revision"
        ))
    })?;
    Ok(serde_json::from_value(rev.desiredspec_json)?)
}

/// Appends a revision the operator has yet to apply
async fn insert_revision(
    txn: &mut dyn ClusterTransaction,
    cluster_id: i32,
    document: &ClusterDocument,
    change: Change,
) -> Result<ClusterRevision, Error> {
    let (typegrp, typename) = change.component();
    txn.revision_insert(NewClusterRevision {
        cluster_id,
        desiredspec_json: serde_json::to_value(document)?,
        component_typegrp: typegrp.to_string(),
        component_typename: typename.to_string(),
        created_date: Utc::now(),
        change_applied: false,
    })
    .await
}

/// Draws unique ids of `kind` until `taken` says one is free
async fn fresh_unique_id(
    txn: &mut dyn ClusterTransaction,
    kind: UniqueIdKind,
) -> Result<String, Error> {
    for _ in 0..UNIQUE_ID_ATTEMPTS {
        let candidate = generate_unique_id(&mut rand::thread_rng(), kind);
        let taken = match kind {
            UniqueIdKind::Cluster => {
                txn.cluster_unique_id_exists(&candidate).await?
            }
            UniqueIdKind::NodeGroup => {
                txn.nodegroup_unique_id_exists(&candidate).await?
            }
        };
        if !taken {
            return Ok(candidate);
        }
    }
    Err(Error::internal_error(&format!(
        "no free {} id after {UNIQUE_ID_ATTEMPTS} attempts",
        kind.prefix()
    )))
}

fn key_error(error: iks_key_manager::Error) -> Error {
    Error::internal_error(&error.to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::pub_test_utils::TestDatastore;
    use crate::db::store::ClusterTransaction;
    use async_trait::async_trait;
    use iks_db_model::*;
    use iks_test_utils::dev;

    /// A transaction whose every call fails, to exercise `finish`
    struct BrokenTransaction;

    #[async_trait]
    impl ClusterTransaction for BrokenTransaction {
        async fn commit(self: Box<Self>) -> Result<(), Error> {
            Err(Error::internal_error("connection reset"))
        }
        async fn rollback(self: Box<Self>) -> Result<(), Error> {
            Err(Error::internal_error("connection reset"))
        }
        async fn lock_cluster_table(&mut self) -> Result<(), Error> {
            unimplemented!()
        }
        async fn cluster_fetch_for_update(
            &mut self,
            _: &str,
        ) -> Result<Option<Cluster>, Error> {
            unimplemented!()
        }
        async fn cluster_fetch(
            &mut self,
            _: &str,
        ) -> Result<Option<Cluster>, Error> {
            unimplemented!()
        }
        async fn cluster_count(
            &mut self,
            _: &str,
            _: Option<&str>,
            _: &[ClusterState],
        ) -> Result<i64, Error> {
            unimplemented!()
        }
        async fn cluster_unique_id_exists(
            &mut self,
            _: &str,
        ) -> Result<bool, Error> {
            unimplemented!()
        }
        async fn cluster_insert(
            &mut self,
            _: NewCluster,
        ) -> Result<Cluster, Error> {
            unimplemented!()
        }
        async fn cluster_update(&mut self, _: &Cluster) -> Result<(), Error> {
            unimplemented!()
        }
        async fn revision_latest(
            &mut self,
            _: i32,
        ) -> Result<Option<ClusterRevision>, Error> {
            unimplemented!()
        }
        async fn revision_insert(
            &mut self,
            _: NewClusterRevision,
        ) -> Result<ClusterRevision, Error> {
            unimplemented!()
        }
        async fn revision_set_change_applied(
            &mut self,
            _: i32,
            _: bool,
        ) -> Result<bool, Error> {
            unimplemented!()
        }
        async fn revision_delete_all(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
        async fn extraconfig_insert(
            &mut self,
            _: ClusterExtraConfig,
        ) -> Result<(), Error> {
            unimplemented!()
        }
        async fn extraconfig_fetch(
            &mut self,
            _: i32,
        ) -> Result<Option<ClusterExtraConfig>, Error> {
            unimplemented!()
        }
        async fn extraconfig_update_certs(
            &mut self,
            _: i32,
            _: ClusterCertsUpdate,
        ) -> Result<(), Error> {
            unimplemented!()
        }
        async fn extraconfig_delete(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
        async fn nodegroup_list(
            &mut self,
            _: i32,
        ) -> Result<Vec<NodeGroup>, Error> {
            unimplemented!()
        }
        async fn nodegroup_unique_id_exists(
            &mut self,
            _: &str,
        ) -> Result<bool, Error> {
            unimplemented!()
        }
        async fn nodegroup_insert(
            &mut self,
            _: NewNodeGroup,
        ) -> Result<NodeGroup, Error> {
            unimplemented!()
        }
        async fn nodegroup_update(
            &mut self,
            _: &NodeGroup,
        ) -> Result<(), Error> {
            unimplemented!()
        }
        async fn nodegroup_delete(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
        async fn nodegroup_delete_all(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
        async fn node_list(&mut self, _: i32) -> Result<Vec<Node>, Error> {
            unimplemented!()
        }
        async fn node_insert(&mut self, _: NewNode) -> Result<Node, Error> {
            unimplemented!()
        }
        async fn node_update(
            &mut self,
            _: i32,
            _: NodeUpdate,
        ) -> Result<(), Error> {
            unimplemented!()
        }
        async fn node_delete(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
        async fn node_delete_by_nodegroup(
            &mut self,
            _: i32,
        ) -> Result<(), Error> {
            unimplemented!()
        }
        async fn node_delete_all(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
        async fn addon_list(&mut self, _: i32) -> Result<Vec<Addon>, Error> {
            unimplemented!()
        }
        async fn addon_upsert(&mut self, _: Addon) -> Result<(), Error> {
            unimplemented!()
        }
        async fn addon_delete(&mut self, _: i32, _: &str) -> Result<(), Error> {
            unimplemented!()
        }
        async fn addon_delete_all(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
        async fn snapshot_delete_all(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
        async fn vip_list(
            &mut self,
            _: i32,
        ) -> Result<Vec<VipWithDetails>, Error> {
            unimplemented!()
        }
        async fn vip_insert(
            &mut self,
            _: NewVip,
            _: VipDetails,
        ) -> Result<VipWithDetails, Error> {
            unimplemented!()
        }
        async fn vip_update(&mut self, _: &Vip) -> Result<(), Error> {
            unimplemented!()
        }
        async fn vipdetails_update(
            &mut self,
            _: &VipDetails,
        ) -> Result<(), Error> {
            unimplemented!()
        }
        async fn vipdetails_delete(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
        async fn vip_delete(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
        async fn storage_list(
            &mut self,
            _: i32,
        ) -> Result<Vec<Storage>, Error> {
            unimplemented!()
        }
        async fn storage_insert(
            &mut self,
            _: NewStorage,
        ) -> Result<Storage, Error> {
            unimplemented!()
        }
        async fn storage_update(&mut self, _: &Storage) -> Result<(), Error> {
            unimplemented!()
        }
        async fn storage_delete_all(&mut self, _: i32) -> Result<(), Error> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_finish_double_fault() {
        let logctx = dev::test_setup_log("test_finish_double_fault");
        let test = TestDatastore::new(&logctx.log);

        // A client error that cannot be rolled back surfaces the rollback
        // failure, which is then hidden behind the generic message.
        let result: Result<(), Error> = test
            .datastore
            .finish(
                Box::new(BrokenTransaction),
                Err(Error::failed_precondition("nope")),
                "test_call",
                TenantOp::Delete,
            )
            .await;
        assert_eq!(
            result.unwrap_err(),
            Error::internal_error("Could not delete Cluster. Please try again.")
        );

        // So does a failed commit.
        let result = test
            .datastore
            .finish(
                Box::new(BrokenTransaction),
                Ok(()),
                "test_call",
                TenantOp::Create,
            )
            .await;
        assert_eq!(
            result.unwrap_err(),
            Error::internal_error("Could not create Cluster. Please try again.")
        );
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_finish_rolls_back_on_error() {
        let logctx = dev::test_setup_log("test_finish_rolls_back_on_error");
        let test = TestDatastore::new(&logctx.log);
        let before = test.store.tables().await;

        let mut txn = test.datastore.store.begin().await.unwrap();
        txn.lock_cluster_table().await.unwrap();
        let id =
            fresh_unique_id(&mut *txn, UniqueIdKind::Cluster).await.unwrap();
        assert!(id.starts_with("cl-"));
        let result: Result<(), Error> =
            Err(Error::permission_denied("over quota"));
        let err = test
            .datastore
            .finish(txn, result, "test_call", TenantOp::Create)
            .await
            .unwrap_err();
        assert_eq!(err, Error::permission_denied("over quota"));
        assert_eq!(test.store.tables().await, before);
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_mutations_require_actionable_cluster() {
        use crate::db::pub_test_utils::{
            nodegroup_params, settle, storage_params, vip_params,
            CLOUD_ACCOUNT,
        };
        use iks_planning::guard::NOT_ACTIONABLE;
        use iks_types::params::{
            FirewallRuleParams, UpgradeClusterParams, UpgradeNodeGroupParams,
        };

        let logctx =
            dev::test_setup_log("test_mutations_require_actionable_cluster");
        let test = TestDatastore::new(&logctx.log);
        let uuid = test.active_cluster("one").await;
        let worker = test
            .datastore
            .nodegroup_create(&nodegroup_params(&uuid, "workers", 1))
            .await
            .unwrap()
            .nodegroup_uuid;
        settle(&test, &uuid).await;
        let vip_id = test
            .datastore
            .vip_create(&vip_params(&uuid, "web", "public"))
            .await
            .unwrap()
            .vip_id;
        settle(&test, &uuid).await;
        let datastore = &test.datastore;
        let states =
            ["Updating", "Pending", "DeletePending", "Deleting", "Deleted"];
        for state in states {
            datastore.cluster_state_update(&uuid, state).await.unwrap();
            let before = test.store.tables().await;

            let results = vec![
                datastore
                    .nodegroup_create(&nodegroup_params(&uuid, "more", 1))
                    .await
                    .map(|_| ()),
                datastore
                    .nodegroup_delete(&uuid, &worker, CLOUD_ACCOUNT)
                    .await,
                datastore
                    .vip_create(&vip_params(&uuid, "other", "private"))
                    .await
                    .map(|_| ()),
                datastore.vip_delete(&uuid, vip_id, CLOUD_ACCOUNT).await,
                datastore
                    .firewall_rule_update(&FirewallRuleParams {
                        cloudaccount_id: CLOUD_ACCOUNT.to_string(),
                        cluster_uuid: uuid.clone(),
                        vip_id,
                        source_ips: vec!["10.1.0.0/16".to_string()],
                        protocols: vec!["TCP".to_string()],
                    })
                    .await,
                datastore
                    .firewall_rule_delete(&uuid, vip_id, CLOUD_ACCOUNT)
                    .await,
                datastore.storage_enable(&storage_params(&uuid)).await,
                datastore
                    .cluster_upgrade(&UpgradeClusterParams {
                        cloudaccount_id: CLOUD_ACCOUNT.to_string(),
                        cluster_uuid: uuid.clone(),
                        k8sversion_name: None,
                    })
                    .await
                    .map(|_| ()),
                datastore
                    .nodegroup_upgrade(&UpgradeNodeGroupParams {
                        cloudaccount_id: CLOUD_ACCOUNT.to_string(),
                        cluster_uuid: uuid.clone(),
                        nodegroup_uuid: worker.clone(),
                    })
                    .await
                    .map(|_| ()),
            ];
            for result in results {
                assert_eq!(
                    result.unwrap_err(),
                    Error::failed_precondition(NOT_ACTIONABLE),
                    "{state}"
                );
            }
            // A cluster on its way out says so instead.
            let err = datastore
                .cluster_delete(&uuid, CLOUD_ACCOUNT)
                .await
                .unwrap_err();
            if state == "Updating" || state == "Pending" {
                assert_eq!(err, Error::failed_precondition(NOT_ACTIONABLE));
            } else {
                assert_eq!(
                    err,
                    Error::failed_precondition(
                        "Cluster can not be deleted , it is currently in \
                         deleting state"
                    )
                );
            }
            assert_eq!(test.store.tables().await, before, "{state}");
        }
        logctx.cleanup_successful();
    }
}
