// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on vips and the firewall rules of public vips

use super::cluster::{required_default, ILB_IPPROTOCOL, VIP_PROVIDER};
use super::{
    guarded_cluster, insert_revision, latest_document, Change, DataStore,
};
use crate::db::error::TenantOp;
use crate::db::store::ClusterTransaction;
use chrono::Utc;
use iks_common::api::external::{
    CreateResult, DeleteResult, Error, ResourceType, UpdateResult,
};
use iks_db_model::{
    ClusterState, FirewallState, NewVip, VipDetails, VipOwner, VipState,
    VipType, VipWithDetails,
};
use iks_planning::quota::{Limits, QuotaKind};
use iks_types::document::{
    FirewallTemplateSpec, IlbPoolTemplateSpec, IlbTemplateSpec,
};
use iks_types::params::{CreateVipParams, FirewallRuleParams};
use iks_types::views::VipCreated;

/// `defaultconfig` key limiting the source ips of one firewall rule
const MAX_SOURCE_IPS: &str = "max_source_ips";

async fn cluster_vip(
    txn: &mut dyn ClusterTransaction,
    cluster_id: i32,
    vip_id: i32,
) -> Result<VipWithDetails, Error> {
    txn.vip_list(cluster_id)
        .await?
        .into_iter()
        .find(|v| v.vip.vip_id == vip_id)
        .ok_or_else(|| Error::not_found_by_id(ResourceType::Vip, vip_id))
}

fn json_list(values: &[String]) -> serde_json::Value {
    serde_json::Value::from(values.to_vec())
}

impl DataStore {
    pub async fn vip_create(
        &self,
        params: &CreateVipParams,
    ) -> CreateResult<VipCreated> {
        let mut txn = self.begin("vip_create", TenantOp::Create).await?;
        let result = self.vip_create_txn(&mut *txn, params).await;
        let created =
            self.finish(txn, result, "vip_create", TenantOp::Create).await?;
        info!(
            self.log,
            "created vip";
            "cluster_uuid" => &params.cluster_uuid,
            "vip_id" => created.vip_id,
            "vip_name" => &created.name,
        );
        Ok(created)
    }

    async fn vip_create_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        params: &CreateVipParams,
    ) -> CreateResult<VipCreated> {
        let cluster = guarded_cluster(
            txn,
            &params.cluster_uuid,
            &params.cloudaccount_id,
        )
        .await?;
        let viptype: VipType = params.viptype.parse().map_err(|_| {
            Error::invalid_request("Vip type should be 'public' or 'private'")
        })?;
        if params.port <= 0 {
            return Err(Error::invalid_request("Vip ports are not correct"));
        }

        let vips: Vec<VipWithDetails> = txn
            .vip_list(cluster.cluster_id)
            .await?
            .into_iter()
            .filter(|v| {
                !matches!(
                    v.vip.vipstate_name,
                    VipState::Deleting | VipState::Deleted
                )
            })
            .collect();
        if vips.iter().any(|v| v.details.vip_name == params.name) {
            return Err(Error::ObjectAlreadyExists {
                type_name: ResourceType::Vip,
                object_name: params.name.clone(),
            });
        }

        let defaults = self.reference.defaults().await?;
        let account = self.account_spec(&params.cloudaccount_id).await?;
        let customer_vips = vips
            .iter()
            .filter(|v| v.vip.owner == VipOwner::Customer)
            .count();
        Limits::new(&defaults, &account).check_count(
            QuotaKind::IlbsPerCluster,
            i64::try_from(customer_vips).unwrap_or(i64::MAX),
        )?;
        let vip_provider = required_default(&defaults, VIP_PROVIDER)?;
        let ipprotocol = required_default(&defaults, ILB_IPPROTOCOL)?;

        let created = txn
            .vip_insert(
                NewVip {
                    cluster_id: cluster.cluster_id,
                    viptype_name: viptype,
                    vipstate_name: VipState::Pending,
                    owner: VipOwner::Customer,
                    vipprovider_name: vip_provider.to_string(),
                    created_date: Utc::now(),
                },
                VipDetails {
                    vip_id: 0,
                    vip_name: params.name.clone(),
                    description: params.description.clone(),
                    port: params.port,
                    pool_name: params.name.clone(),
                    pool_port: params.port,
                    pool_id: None,
                    protocol: None,
                },
            )
            .await?;

        let mut document = latest_document(txn, cluster.cluster_id).await?;
        document.spec.ilbs.push(IlbTemplateSpec {
            name: params.name.clone(),
            description: params.description.clone().unwrap_or_default(),
            port: params.port,
            iptype: viptype.to_string(),
            ipprotocol: ipprotocol.to_string(),
            owner: VipOwner::Customer.to_string(),
            pool: IlbPoolTemplateSpec {
                name: params.name.clone(),
                port: params.port,
                ..Default::default()
            },
            ..Default::default()
        });
        insert_revision(txn, cluster.cluster_id, &document, Change::VipCreate)
            .await?;

        Ok(VipCreated {
            vip_id: created.vip.vip_id,
            name: created.details.vip_name,
            state: created.vip.vipstate_name.to_string(),
        })
    }

    /// Marks a vip for removal
    ///
    /// The rows go once the operator reports the load balancer gone and no
    /// firewall rule guards it any longer.
    pub async fn vip_delete(
        &self,
        cluster_uuid: &str,
        vip_id: i32,
        cloudaccount_id: &str,
    ) -> DeleteResult {
        let mut txn = self.begin("vip_delete", TenantOp::Delete).await?;
        let result = self
            .vip_delete_txn(&mut *txn, cluster_uuid, vip_id, cloudaccount_id)
            .await;
        self.finish(txn, result, "vip_delete", TenantOp::Delete).await?;
        info!(
            self.log,
            "vip delete requested";
            "cluster_uuid" => cluster_uuid,
            "vip_id" => vip_id,
        );
        Ok(())
    }

    async fn vip_delete_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        cluster_uuid: &str,
        vip_id: i32,
        cloudaccount_id: &str,
    ) -> DeleteResult {
        let mut cluster =
            guarded_cluster(txn, cluster_uuid, cloudaccount_id).await?;
        let VipWithDetails { mut vip, details } =
            cluster_vip(txn, cluster.cluster_id, vip_id).await?;
        // System vips are not visible to tenants.
        if vip.owner != VipOwner::Customer {
            return Err(Error::not_found_by_id(ResourceType::Vip, vip_id));
        }
        if vip.vipstate_name == VipState::Deleting {
            return Err(Error::failed_precondition(
                "Vip can not be deleted, it is currently in deleting state",
            ));
        }
        if vip.firewall_state().is_transient() {
            return Err(Error::failed_precondition(
                "Vip can not be deleted, there is security rule with non \
                 active state",
            ));
        }

        // A repeated request after the document already dropped the load
        // balancer changes nothing.
        let mut document = latest_document(txn, cluster.cluster_id).await?;
        if !document.spec.remove_ilb(&details.vip_name) {
            return Ok(());
        }
        if let Some(ip) = &vip.vip_ip {
            document.spec.remove_firewall(ip);
        }

        cluster.clusterstate_name = ClusterState::Pending;
        txn.cluster_update(&cluster).await?;
        vip.vipstate_name = VipState::Deleting;
        vip.vip_status =
            Some(serde_json::json!({ "status": "Vip is being deleted" }));
        if vip.has_active_firewall_rule() {
            vip.firewall_status = Some(FirewallState::Deleting);
        }
        txn.vip_update(&vip).await?;
        insert_revision(txn, cluster.cluster_id, &document, Change::VipDelete)
            .await?;
        Ok(())
    }

    /// Sets the source ips allowed through a public vip
    pub async fn firewall_rule_update(
        &self,
        params: &FirewallRuleParams,
    ) -> UpdateResult<()> {
        let mut txn =
            self.begin("firewall_rule_update", TenantOp::Update).await?;
        let result = self.firewall_rule_update_txn(&mut *txn, params).await;
        self.finish(txn, result, "firewall_rule_update", TenantOp::Update)
            .await
    }

    async fn firewall_rule_update_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        params: &FirewallRuleParams,
    ) -> UpdateResult<()> {
        let cluster = guarded_cluster(
            txn,
            &params.cluster_uuid,
            &params.cloudaccount_id,
        )
        .await?;
        let VipWithDetails { mut vip, mut details } =
            cluster_vip(txn, cluster.cluster_id, params.vip_id).await?;
        if vip.viptype_name != VipType::Public {
            return Err(Error::failed_precondition(
                "Security rules can only be set on public vips",
            ));
        }
        let destination_ip = match (&vip.vip_ip, vip.vipstate_name) {
            (Some(ip), VipState::Active) if !ip.is_empty() => ip.clone(),
            _ => {
                return Err(Error::failed_precondition(
                    "Wait for Vip to get active before updating Firewall rule",
                ))
            }
        };
        let protocol = params.protocols.first().ok_or_else(|| {
            Error::invalid_request("at least one protocol is required")
        })?;

        let defaults = self.reference.defaults().await?;
        let max_source_ips = defaults.get_i64(MAX_SOURCE_IPS)?;
        if i64::try_from(params.source_ips.len()).unwrap_or(i64::MAX)
            > max_source_ips
        {
            return Err(Error::permission_denied(&format!(
                "Security rule cannot exceed {max_source_ips}"
            )));
        }
        if vip.firewall_state().is_transient() {
            return Err(Error::failed_precondition(
                "Security rule can only be updated for Active Rules",
            ));
        }

        // Nothing to do if the rule already allows exactly these sources.
        let sourceips = json_list(&params.source_ips);
        let protocols = json_list(&params.protocols);
        if vip.firewall_state() != FirewallState::NotSpecified
            && vip.sourceips.as_ref() == Some(&sourceips)
            && details.protocol.as_ref() == Some(&protocols)
        {
            debug!(
                self.log,
                "security rule unchanged";
                "cluster_uuid" => &params.cluster_uuid,
                "vip_id" => params.vip_id,
            );
            return Ok(());
        }

        details.protocol = Some(protocols);
        txn.vipdetails_update(&details).await?;
        vip.sourceips = Some(sourceips);
        vip.firewall_status = Some(FirewallState::Pending);
        txn.vip_update(&vip).await?;

        let mut document = latest_document(txn, cluster.cluster_id).await?;
        document.spec.upsert_firewall(FirewallTemplateSpec {
            destination_ip,
            port: details.port,
            protocol: protocol.clone(),
            source_ips: params.source_ips.clone(),
        });
        insert_revision(
            txn,
            cluster.cluster_id,
            &document,
            Change::FirewallUpdate,
        )
        .await?;
        Ok(())
    }

    /// Starts removing the firewall rule of a public vip
    pub async fn firewall_rule_delete(
        &self,
        cluster_uuid: &str,
        vip_id: i32,
        cloudaccount_id: &str,
    ) -> DeleteResult {
        let mut txn =
            self.begin("firewall_rule_delete", TenantOp::Delete).await?;
        let result = self
            .firewall_rule_delete_txn(
                &mut *txn,
                cluster_uuid,
                vip_id,
                cloudaccount_id,
            )
            .await;
        self.finish(txn, result, "firewall_rule_delete", TenantOp::Delete)
            .await
    }

    async fn firewall_rule_delete_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        cluster_uuid: &str,
        vip_id: i32,
        cloudaccount_id: &str,
    ) -> DeleteResult {
        let cluster =
            guarded_cluster(txn, cluster_uuid, cloudaccount_id).await?;
        let VipWithDetails { mut vip, .. } =
            cluster_vip(txn, cluster.cluster_id, vip_id).await?;
        if !vip.has_active_firewall_rule() {
            return Err(Error::not_found_by_id(
                ResourceType::FirewallRule,
                vip_id,
            ));
        }
        if vip.vipstate_name == VipState::Deleting {
            return Err(Error::failed_precondition(
                "Security rule can not be deleted , vip is currently in \
                 deleting state",
            ));
        }
        if vip.firewall_state() != FirewallState::Active {
            return Err(Error::failed_precondition(
                "Only Active security rules can be deleted",
            ));
        }

        vip.firewall_status = Some(FirewallState::Deleting);
        txn.vip_update(&vip).await?;

        let mut document = latest_document(txn, cluster.cluster_id).await?;
        if let Some(ip) = &vip.vip_ip {
            document.spec.remove_firewall(ip);
        }
        insert_revision(
            txn,
            cluster.cluster_id,
            &document,
            Change::FirewallDelete,
        )
        .await?;
        Ok(())
    }
}
