// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Postgres-backed [`ClusterStore`]
//!
//! A transaction owns one pooled connection from `BEGIN` until `COMMIT` or
//! `ROLLBACK`.  A transaction dropped before either (for example because the
//! caller's future was cancelled) is rolled back in the background before
//! the connection goes back to the pool.

use super::error::{public_error_from_diesel, ErrorHandler};
use super::pool::{DbConnection, OwnedConnection};
use super::store::{ClusterStore, ClusterTransaction};
use super::Pool;
use async_bb8_diesel::{AsyncRunQueryDsl, AsyncSimpleConnection};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use iks_common::api::external::{Error, ResourceType};
use iks_db_model::schema;
use iks_db_model::{
    Addon, Cluster, ClusterCertsUpdate, ClusterExtraConfig, ClusterRevision,
    ClusterState, NewCluster, NewClusterRevision, NewNode, NewNodeGroup,
    NewStorage, NewVip, Node, NodeGroup, NodeUpdate, Storage, Vip, VipDetails,
    VipWithDetails,
};
use slog::Logger;

type AsyncConn = async_bb8_diesel::Connection<DbConnection>;

fn server(e: DieselError) -> Error {
    public_error_from_diesel(e, ErrorHandler::Server)
}

/// Fails unless an update or delete by primary key touched its row
fn expect_one(
    count: usize,
    resource_type: ResourceType,
    id: i32,
) -> Result<(), Error> {
    match count {
        0 => Err(Error::not_found_by_id(resource_type, id)),
        _ => Ok(()),
    }
}

pub struct PgStore {
    log: Logger,
    pool: Pool,
}

impl PgStore {
    pub fn new(log: &Logger, pool: Pool) -> PgStore {
        PgStore { log: log.new(o!("component" => "PgStore")), pool }
    }
}

#[async_trait]
impl ClusterStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn ClusterTransaction>, Error> {
        let conn = self.pool.claim().await?;
        conn.batch_execute_async("BEGIN").await.map_err(server)?;
        Ok(Box::new(PgTransaction { log: self.log.clone(), conn: Some(conn) }))
    }
}

struct PgTransaction {
    log: Logger,
    conn: Option<OwnedConnection>,
}

impl PgTransaction {
    fn conn(&self) -> Result<&AsyncConn, Error> {
        self.conn.as_deref().ok_or_else(|| {
            Error::internal_error("transaction already finished")
        })
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<(), Error> {
        let conn = self.conn.take().ok_or_else(|| {
            Error::internal_error("transaction already finished")
        })?;
        conn.batch_execute_async(statement).await.map_err(server)
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let log = self.log.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.batch_execute_async("ROLLBACK").await
                    {
                        warn!(
                            log,
                            "failed to roll back abandoned transaction";
                            "error" => %e,
                        );
                    }
                });
            }
            Err(_) => {
                warn!(log, "abandoned transaction outside of a runtime");
            }
        }
    }
}

#[async_trait]
impl ClusterTransaction for PgTransaction {
    async fn commit(self: Box<Self>) -> Result<(), Error> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        self.finish("ROLLBACK").await
    }

    async fn lock_cluster_table(&mut self) -> Result<(), Error> {
        self.conn()?
            .batch_execute_async("LOCK TABLE cluster IN EXCLUSIVE MODE")
            .await
            .map_err(server)
    }

    async fn cluster_fetch_for_update(
        &mut self,
        unique_id: &str,
    ) -> Result<Option<Cluster>, Error> {
        use schema::cluster::dsl;
        dsl::cluster
            .filter(dsl::unique_id.eq(unique_id.to_string()))
            .select(Cluster::as_select())
            .for_update()
            .get_result_async(self.conn()?)
            .await
            .optional()
            .map_err(server)
    }

    async fn cluster_fetch(
        &mut self,
        unique_id: &str,
    ) -> Result<Option<Cluster>, Error> {
        use schema::cluster::dsl;
        dsl::cluster
            .filter(dsl::unique_id.eq(unique_id.to_string()))
            .select(Cluster::as_select())
            .get_result_async(self.conn()?)
            .await
            .optional()
            .map_err(server)
    }

    async fn cluster_count(
        &mut self,
        cloudaccount_id: &str,
        name: Option<&str>,
        excluded: &[ClusterState],
    ) -> Result<i64, Error> {
        use schema::cluster::dsl;
        let conn = self.conn()?;
        let query = dsl::cluster
            .filter(dsl::cloudaccount_id.eq(cloudaccount_id.to_string()))
            .filter(dsl::clusterstate_name.ne_all(excluded.to_vec()));
        match name {
            Some(name) => {
                query
                    .filter(dsl::name.eq(name.to_string()))
                    .count()
                    .get_result_async(conn)
                    .await
            }
            None => query.count().get_result_async(conn).await,
        }
        .map_err(server)
    }

    async fn cluster_unique_id_exists(
        &mut self,
        unique_id: &str,
    ) -> Result<bool, Error> {
        use schema::cluster::dsl;
        let count: i64 = dsl::cluster
            .filter(dsl::unique_id.eq(unique_id.to_string()))
            .count()
            .get_result_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(count > 0)
    }

    async fn cluster_insert(
        &mut self,
        cluster: NewCluster,
    ) -> Result<Cluster, Error> {
        use schema::cluster::dsl;
        let name = cluster.name.clone();
        diesel::insert_into(dsl::cluster)
            .values(cluster)
            .returning(Cluster::as_returning())
            .get_result_async(self.conn()?)
            .await
            .map_err(|e| {
                public_error_from_diesel(
                    e,
                    ErrorHandler::Conflict(ResourceType::Cluster, &name),
                )
            })
    }

    async fn cluster_update(&mut self, cluster: &Cluster) -> Result<(), Error> {
        use schema::cluster::dsl;
        let count = diesel::update(
            dsl::cluster.filter(dsl::cluster_id.eq(cluster.cluster_id)),
        )
        .set((
            dsl::clusterstate_name.eq(cluster.clusterstate_name),
            dsl::kubernetes_status.eq(cluster.kubernetes_status.clone()),
        ))
        .execute_async(self.conn()?)
        .await
        .map_err(server)?;
        expect_one(count, ResourceType::Cluster, cluster.cluster_id)
    }

    async fn revision_latest(
        &mut self,
        cluster_id: i32,
    ) -> Result<Option<ClusterRevision>, Error> {
        use schema::clusterrev::dsl;
        dsl::clusterrev
            .filter(dsl::cluster_id.eq(cluster_id))
            .order(dsl::clusterrev_id.desc())
            .select(ClusterRevision::as_select())
            .first_async(self.conn()?)
            .await
            .optional()
            .map_err(server)
    }

    async fn revision_insert(
        &mut self,
        revision: NewClusterRevision,
    ) -> Result<ClusterRevision, Error> {
        use schema::clusterrev::dsl;
        diesel::insert_into(dsl::clusterrev)
            .values(revision)
            .returning(ClusterRevision::as_returning())
            .get_result_async(self.conn()?)
            .await
            .map_err(server)
    }

    async fn revision_set_change_applied(
        &mut self,
        clusterrev_id: i32,
        change_applied: bool,
    ) -> Result<bool, Error> {
        use schema::clusterrev::dsl;
        let count = diesel::update(
            dsl::clusterrev.filter(dsl::clusterrev_id.eq(clusterrev_id)),
        )
        .set(dsl::change_applied.eq(change_applied))
        .execute_async(self.conn()?)
        .await
        .map_err(server)?;
        Ok(count > 0)
    }

    async fn revision_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error> {
        use schema::clusterrev::dsl;
        diesel::delete(dsl::clusterrev.filter(dsl::cluster_id.eq(cluster_id)))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }

    async fn extraconfig_insert(
        &mut self,
        config: ClusterExtraConfig,
    ) -> Result<(), Error> {
        use schema::cluster_extraconfig::dsl;
        diesel::insert_into(dsl::cluster_extraconfig)
            .values(config)
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }

    async fn extraconfig_fetch(
        &mut self,
        cluster_id: i32,
    ) -> Result<Option<ClusterExtraConfig>, Error> {
        use schema::cluster_extraconfig::dsl;
        dsl::cluster_extraconfig
            .filter(dsl::cluster_id.eq(cluster_id))
            .select(ClusterExtraConfig::as_select())
            .get_result_async(self.conn()?)
            .await
            .optional()
            .map_err(server)
    }

    async fn extraconfig_update_certs(
        &mut self,
        cluster_id: i32,
        certs: ClusterCertsUpdate,
    ) -> Result<(), Error> {
        use schema::cluster_extraconfig::dsl;
        let count = diesel::update(
            dsl::cluster_extraconfig.filter(dsl::cluster_id.eq(cluster_id)),
        )
        .set(certs)
        .execute_async(self.conn()?)
        .await
        .map_err(server)?;
        expect_one(count, ResourceType::ClusterExtraConfig, cluster_id)
    }

    async fn extraconfig_delete(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error> {
        use schema::cluster_extraconfig::dsl;
        diesel::delete(
            dsl::cluster_extraconfig.filter(dsl::cluster_id.eq(cluster_id)),
        )
        .execute_async(self.conn()?)
        .await
        .map_err(server)?;
        Ok(())
    }

    async fn nodegroup_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<NodeGroup>, Error> {
        use schema::nodegroup::dsl;
        dsl::nodegroup
            .filter(dsl::cluster_id.eq(cluster_id))
            .order(dsl::nodegroup_id.asc())
            .select(NodeGroup::as_select())
            .load_async(self.conn()?)
            .await
            .map_err(server)
    }

    async fn nodegroup_unique_id_exists(
        &mut self,
        unique_id: &str,
    ) -> Result<bool, Error> {
        use schema::nodegroup::dsl;
        let count: i64 = dsl::nodegroup
            .filter(dsl::unique_id.eq(unique_id.to_string()))
            .count()
            .get_result_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(count > 0)
    }

    async fn nodegroup_insert(
        &mut self,
        nodegroup: NewNodeGroup,
    ) -> Result<NodeGroup, Error> {
        use schema::nodegroup::dsl;
        let name = nodegroup.name.clone();
        diesel::insert_into(dsl::nodegroup)
            .values(nodegroup)
            .returning(NodeGroup::as_returning())
            .get_result_async(self.conn()?)
            .await
            .map_err(|e| {
                public_error_from_diesel(
                    e,
                    ErrorHandler::Conflict(ResourceType::NodeGroup, &name),
                )
            })
    }

    async fn nodegroup_update(
        &mut self,
        nodegroup: &NodeGroup,
    ) -> Result<(), Error> {
        use schema::nodegroup::dsl;
        let count = diesel::update(
            dsl::nodegroup.filter(dsl::nodegroup_id.eq(nodegroup.nodegroup_id)),
        )
        .set((
            dsl::k8sversion_name.eq(nodegroup.k8sversion_name.clone()),
            dsl::osimageinstance_name
                .eq(nodegroup.osimageinstance_name.clone()),
            dsl::nodecount.eq(nodegroup.nodecount),
            dsl::nodegroupstate_name.eq(nodegroup.nodegroupstate_name),
            dsl::kubernetes_status.eq(nodegroup.kubernetes_status.clone()),
        ))
        .execute_async(self.conn()?)
        .await
        .map_err(server)?;
        expect_one(count, ResourceType::NodeGroup, nodegroup.nodegroup_id)
    }

    async fn nodegroup_delete(
        &mut self,
        nodegroup_id: i32,
    ) -> Result<(), Error> {
        use schema::nodegroup::dsl;
        diesel::delete(
            dsl::nodegroup.filter(dsl::nodegroup_id.eq(nodegroup_id)),
        )
        .execute_async(self.conn()?)
        .await
        .map_err(server)?;
        Ok(())
    }

    async fn nodegroup_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error> {
        use schema::nodegroup::dsl;
        diesel::delete(dsl::nodegroup.filter(dsl::cluster_id.eq(cluster_id)))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }

    async fn node_list(&mut self, cluster_id: i32) -> Result<Vec<Node>, Error> {
        use schema::k8snode::dsl;
        dsl::k8snode
            .filter(dsl::cluster_id.eq(cluster_id))
            .order(dsl::k8snode_id.asc())
            .select(Node::as_select())
            .load_async(self.conn()?)
            .await
            .map_err(server)
    }

    async fn node_insert(&mut self, node: NewNode) -> Result<Node, Error> {
        use schema::k8snode::dsl;
        diesel::insert_into(dsl::k8snode)
            .values(node)
            .returning(Node::as_returning())
            .get_result_async(self.conn()?)
            .await
            .map_err(server)
    }

    async fn node_update(
        &mut self,
        k8snode_id: i32,
        update: NodeUpdate,
    ) -> Result<(), Error> {
        use schema::k8snode::dsl;
        let count =
            diesel::update(dsl::k8snode.filter(dsl::k8snode_id.eq(k8snode_id)))
                .set(update)
                .execute_async(self.conn()?)
                .await
                .map_err(server)?;
        expect_one(count, ResourceType::Node, k8snode_id)
    }

    async fn node_delete(&mut self, k8snode_id: i32) -> Result<(), Error> {
        use schema::k8snode::dsl;
        diesel::delete(dsl::k8snode.filter(dsl::k8snode_id.eq(k8snode_id)))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }

    async fn node_delete_by_nodegroup(
        &mut self,
        nodegroup_id: i32,
    ) -> Result<(), Error> {
        use schema::k8snode::dsl;
        diesel::delete(dsl::k8snode.filter(dsl::nodegroup_id.eq(nodegroup_id)))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }

    async fn node_delete_all(&mut self, cluster_id: i32) -> Result<(), Error> {
        use schema::k8snode::dsl;
        diesel::delete(dsl::k8snode.filter(dsl::cluster_id.eq(cluster_id)))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }

    async fn addon_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<Addon>, Error> {
        use schema::clusteraddonversion::dsl;
        dsl::clusteraddonversion
            .filter(dsl::cluster_id.eq(cluster_id))
            .order(dsl::addonversion_name.asc())
            .select(Addon::as_select())
            .load_async(self.conn()?)
            .await
            .map_err(server)
    }

    async fn addon_upsert(&mut self, addon: Addon) -> Result<(), Error> {
        use schema::clusteraddonversion::dsl;
        diesel::insert_into(dsl::clusteraddonversion)
            .values(addon.clone())
            .on_conflict((dsl::cluster_id, dsl::addonversion_name))
            .do_update()
            .set((
                dsl::install_type.eq(addon.install_type),
                dsl::artifact_repo.eq(addon.artifact_repo),
                dsl::clusteraddonstate_name.eq(addon.clusteraddonstate_name),
                dsl::kubernetes_status.eq(addon.kubernetes_status),
                dsl::lastchangetimestamp.eq(addon.lastchangetimestamp),
            ))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }

    async fn addon_delete(
        &mut self,
        cluster_id: i32,
        addonversion_name: &str,
    ) -> Result<(), Error> {
        use schema::clusteraddonversion::dsl;
        diesel::delete(
            dsl::clusteraddonversion
                .filter(dsl::cluster_id.eq(cluster_id))
                .filter(
                    dsl::addonversion_name.eq(addonversion_name.to_string()),
                ),
        )
        .execute_async(self.conn()?)
        .await
        .map_err(server)?;
        Ok(())
    }

    async fn addon_delete_all(&mut self, cluster_id: i32) -> Result<(), Error> {
        use schema::clusteraddonversion::dsl;
        diesel::delete(
            dsl::clusteraddonversion.filter(dsl::cluster_id.eq(cluster_id)),
        )
        .execute_async(self.conn()?)
        .await
        .map_err(server)?;
        Ok(())
    }

    async fn snapshot_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error> {
        use schema::snapshot::dsl;
        diesel::delete(dsl::snapshot.filter(dsl::cluster_id.eq(cluster_id)))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }

    async fn vip_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<VipWithDetails>, Error> {
        use schema::{vip, vipdetails};
        let rows: Vec<(Vip, VipDetails)> = vip::table
            .inner_join(vipdetails::table)
            .filter(vip::cluster_id.eq(cluster_id))
            .order(vip::vip_id.asc())
            .select((Vip::as_select(), VipDetails::as_select()))
            .load_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(rows
            .into_iter()
            .map(|(vip, details)| VipWithDetails { vip, details })
            .collect())
    }

    async fn vip_insert(
        &mut self,
        vip: NewVip,
        details: VipDetails,
    ) -> Result<VipWithDetails, Error> {
        let name = details.vip_name.clone();
        let vip: Vip = diesel::insert_into(schema::vip::table)
            .values(vip)
            .returning(Vip::as_returning())
            .get_result_async(self.conn()?)
            .await
            .map_err(|e| {
                public_error_from_diesel(
                    e,
                    ErrorHandler::Conflict(ResourceType::Vip, &name),
                )
            })?;
        let details = VipDetails { vip_id: vip.vip_id, ..details };
        diesel::insert_into(schema::vipdetails::table)
            .values(details.clone())
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(VipWithDetails { vip, details })
    }

    async fn vip_update(&mut self, vip: &Vip) -> Result<(), Error> {
        use schema::vip::dsl;
        let count = diesel::update(dsl::vip.filter(dsl::vip_id.eq(vip.vip_id)))
            .set((
                dsl::vipstate_name.eq(vip.vipstate_name),
                dsl::owner.eq(vip.owner),
                dsl::vip_ip.eq(vip.vip_ip.clone()),
                dsl::vip_status.eq(vip.vip_status.clone()),
                dsl::firewall_status.eq(vip.firewall_status),
                dsl::sourceips.eq(vip.sourceips.clone()),
            ))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        expect_one(count, ResourceType::Vip, vip.vip_id)
    }

    async fn vipdetails_update(
        &mut self,
        details: &VipDetails,
    ) -> Result<(), Error> {
        use schema::vipdetails::dsl;
        let count = diesel::update(
            dsl::vipdetails.filter(dsl::vip_id.eq(details.vip_id)),
        )
        .set((
            dsl::pool_id.eq(details.pool_id),
            dsl::protocol.eq(details.protocol.clone()),
        ))
        .execute_async(self.conn()?)
        .await
        .map_err(server)?;
        expect_one(count, ResourceType::VipDetails, details.vip_id)
    }

    async fn vipdetails_delete(&mut self, vip_id: i32) -> Result<(), Error> {
        use schema::vipdetails::dsl;
        diesel::delete(dsl::vipdetails.filter(dsl::vip_id.eq(vip_id)))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }

    async fn vip_delete(&mut self, vip_id: i32) -> Result<(), Error> {
        use schema::vip::dsl;
        diesel::delete(dsl::vip.filter(dsl::vip_id.eq(vip_id)))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }

    async fn storage_list(
        &mut self,
        cluster_id: i32,
    ) -> Result<Vec<Storage>, Error> {
        use schema::storage::dsl;
        dsl::storage
            .filter(dsl::cluster_id.eq(cluster_id))
            .order(dsl::storage_id.asc())
            .select(Storage::as_select())
            .load_async(self.conn()?)
            .await
            .map_err(server)
    }

    async fn storage_insert(
        &mut self,
        storage: NewStorage,
    ) -> Result<Storage, Error> {
        use schema::storage::dsl;
        diesel::insert_into(dsl::storage)
            .values(storage)
            .returning(Storage::as_returning())
            .get_result_async(self.conn()?)
            .await
            .map_err(server)
    }

    async fn storage_update(&mut self, storage: &Storage) -> Result<(), Error> {
        use schema::storage::dsl;
        let count = diesel::update(
            dsl::storage.filter(dsl::storage_id.eq(storage.storage_id)),
        )
        .set((
            dsl::size.eq(storage.size.clone()),
            dsl::storagestate_name.eq(storage.storagestate_name),
            dsl::kubernetes_status.eq(storage.kubernetes_status.clone()),
        ))
        .execute_async(self.conn()?)
        .await
        .map_err(server)?;
        expect_one(count, ResourceType::Storage, storage.storage_id)
    }

    async fn storage_delete_all(
        &mut self,
        cluster_id: i32,
    ) -> Result<(), Error> {
        use schema::storage::dsl;
        diesel::delete(dsl::storage.filter(dsl::cluster_id.eq(cluster_id)))
            .execute_async(self.conn()?)
            .await
            .map_err(server)?;
        Ok(())
    }
}
