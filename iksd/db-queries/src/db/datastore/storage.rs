// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on cluster storage

use super::{
    guarded_cluster, insert_revision, latest_document, Change, DataStore,
};
use crate::db::error::TenantOp;
use crate::db::store::ClusterTransaction;
use iks_common::api::external::{Error, UpdateResult};
use iks_db_model::{ClusterState, NewStorage, StorageState};
use iks_planning::quota::Limits;
use iks_types::document::StorageTemplateSpec;
use iks_types::params::EnableStorageParams;

impl DataStore {
    /// Turns on storage for a cluster
    ///
    /// Storage can only be enabled once; rows are kept in `Deleted` after a
    /// removal, and only those allow enabling it again.
    pub async fn storage_enable(
        &self,
        params: &EnableStorageParams,
    ) -> UpdateResult<()> {
        let mut txn = self.begin("storage_enable", TenantOp::Update).await?;
        let result = self.storage_enable_txn(&mut *txn, params).await;
        self.finish(txn, result, "storage_enable", TenantOp::Update).await?;
        info!(
            self.log,
            "storage enabled";
            "cluster_uuid" => &params.cluster_uuid,
            "provider" => &params.provider,
            "size" => &params.size,
        );
        Ok(())
    }

    async fn storage_enable_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        params: &EnableStorageParams,
    ) -> UpdateResult<()> {
        let mut cluster = guarded_cluster(
            txn,
            &params.cluster_uuid,
            &params.cloudaccount_id,
        )
        .await?;
        let defaults = self.reference.defaults().await?;
        let account = self.account_spec(&params.cloudaccount_id).await?;
        Limits::new(&defaults, &account).check_may_use_storage()?;

        if txn
            .storage_list(cluster.cluster_id)
            .await?
            .iter()
            .any(|s| s.storagestate_name != StorageState::Deleted)
        {
            return Err(Error::failed_precondition(
                "Cluster storage is already enabled",
            ));
        }
        if params.provider.trim().is_empty() {
            return Err(Error::invalid_request("Storage provider is required"));
        }
        if params.size.trim().is_empty() {
            return Err(Error::invalid_request("Invalid Storage Size"));
        }

        txn.storage_insert(NewStorage {
            cluster_id: cluster.cluster_id,
            storageprovider_name: params.provider.clone(),
            size: params.size.clone(),
            storagestate_name: StorageState::Pending,
            kubernetes_status: None,
        })
        .await?;
        cluster.clusterstate_name = ClusterState::Pending;
        txn.cluster_update(&cluster).await?;

        let mut document = latest_document(txn, cluster.cluster_id).await?;
        document.spec.storage = vec![StorageTemplateSpec {
            provider: params.provider.clone(),
            size: params.size.clone(),
            ..Default::default()
        }];
        insert_revision(
            txn,
            cluster.cluster_id,
            &document,
            Change::StorageEnable,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::db::pub_test_utils::{
        settle, storage_account, storage_params, TestDatastore,
    };
    use iks_common::api::external::Error;
    use iks_db_model::{ClusterState, StorageState};
    use iks_planning::guard::NOT_ACTIONABLE;
    use iks_planning::quota::RESTRICTED_STORAGE;
    use iks_test_utils::dev;
    use iks_types::document::ClusterDocument;

    #[tokio::test]
    async fn test_storage_restricted() {
        let logctx = dev::test_setup_log("test_storage_restricted");
        let test = TestDatastore::new(&logctx.log);
        let uuid = test.active_cluster("one").await;

        let err = test
            .datastore
            .storage_enable(&storage_params(&uuid))
            .await
            .unwrap_err();
        assert_eq!(err, Error::permission_denied(RESTRICTED_STORAGE));
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_storage_enable() {
        let logctx = dev::test_setup_log("test_storage_enable");
        let reference =
            TestDatastore::reference().with_cloud_account(storage_account());
        let test = TestDatastore::with_reference(&logctx.log, reference);
        let uuid = test.active_cluster("one").await;

        test.datastore.storage_enable(&storage_params(&uuid)).await.unwrap();
        let tables = test.store.tables().await;
        assert_eq!(tables.storage.len(), 1);
        assert_eq!(tables.storage[0].storagestate_name, StorageState::Pending);
        assert_eq!(tables.storage[0].storageprovider_name, "weka");
        let cluster =
            tables.clusters.iter().find(|c| c.unique_id == uuid).unwrap();
        assert_eq!(cluster.clusterstate_name, ClusterState::Pending);
        let doc: ClusterDocument = serde_json::from_value(
            tables.revisions.last().unwrap().desiredspec_json.clone(),
        )
        .unwrap();
        assert_eq!(doc.spec.storage.len(), 1);
        assert_eq!(doc.spec.storage[0].size, "100GB");

        // Until the operator catches up, nothing else goes through.
        let err = test
            .datastore
            .storage_enable(&storage_params(&uuid))
            .await
            .unwrap_err();
        assert_eq!(err, Error::failed_precondition(NOT_ACTIONABLE));

        settle(&test, &uuid).await;
        let err = test
            .datastore
            .storage_enable(&storage_params(&uuid))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::failed_precondition("Cluster storage is already enabled")
        );
        logctx.cleanup_successful();
    }
}
