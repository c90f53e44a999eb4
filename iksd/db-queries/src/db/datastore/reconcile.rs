// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Applying operator status reports
//!
//! A report is applied in one transaction under the cluster's row lock:
//! nodegroups and their nodes, addons, load balancers, storage, firewall
//! rules, then the cluster itself.  Resources marked `Deleting` are only
//! removed once the report stops mentioning them (see
//! [`iks_planning::transition`]).  Every write is skipped when the stored
//! row already says what the report says, so replaying a report is a no-op.
//!
//! A report that raced with a tenant change (the cluster went back to
//! `Pending`, or a newer revision has not been applied yet) is rolled back
//! and reported as superseded rather than failed.

use super::cluster::parse_state;
use super::{cluster_not_found, latest_change_applied, DataStore};
use crate::db::error::{TenantOp, TenantSafe};
use crate::db::store::ClusterTransaction;
use chrono::Utc;
use iks_common::api::external::{Error, ResourceType, UpdateResult};
use iks_db_model::{
    AddonState, Cluster, ClusterState, FirewallState, NewNode, Node,
    NodeGroup, NodeGroupState, NodeUpdate, StorageState, VipState,
    VipType, VipWithDetails,
};
use iks_planning::guard::check_status_report;
use iks_planning::naming::ilb_logical_name;
use iks_planning::transition::{self, reported_firewall_state, Action};
use iks_types::status::{
    AddonStatus, ClusterStatusReport, FirewallStatus, IlbStatus,
    NodeGroupStatus, NodeStatus, StorageStatus,
};
use iks_types::views::ReconcileOutcome;
use serde_json::json;
use std::collections::BTreeSet;

const NODEGROUP_NOT_FOUND: &str = "No cluster nodegroup found";

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Every reported nodegroup must list exactly as many nodes as its count.
fn check_node_counts(report: &ClusterStatusReport) -> Result<(), Error> {
    for nodegroup in &report.nodegroups {
        if usize::try_from(nodegroup.count).ok()
            != Some(nodegroup.nodes.len())
        {
            return Err(Error::failed_precondition(&format!(
                "The number of nodes doesn't match the count number of \
                 nodes. {}",
                nodegroup.name
            )));
        }
    }
    Ok(())
}

async fn reconcile_addons(
    txn: &mut dyn ClusterTransaction,
    log: &slog::Logger,
    cluster_id: i32,
    reported: &[AddonStatus],
) -> Result<(), Error> {
    let stored = txn.addon_list(cluster_id).await?;
    for report in reported {
        let Some(addon) =
            stored.iter().find(|a| a.addonversion_name == report.name)
        else {
            warn!(log, "status for unknown addon"; "addon" => &report.name);
            continue;
        };
        if transition::addon(addon.clusteraddonstate_name, true)
            != Action::Upsert
        {
            continue;
        }
        let mut row = addon.clone();
        row.clusteraddonstate_name = parse_state::<AddonState>(&report.state)?;
        row.kubernetes_status = Some(serde_json::to_value(report)?);
        if row != *addon {
            row.lastchangetimestamp = Utc::now();
            txn.addon_upsert(row).await?;
        }
    }
    for addon in &stored {
        let reported =
            reported.iter().any(|r| r.name == addon.addonversion_name);
        if transition::addon(addon.clusteraddonstate_name, reported)
            == Action::Delete
        {
            txn.addon_delete(cluster_id, &addon.addonversion_name).await?;
        }
    }
    Ok(())
}

async fn reconcile_storage(
    txn: &mut dyn ClusterTransaction,
    log: &slog::Logger,
    cluster_id: i32,
    reported: &[StorageStatus],
) -> Result<(), Error> {
    let stored = txn.storage_list(cluster_id).await?;
    for report in reported {
        if !stored.iter().any(|s| s.storageprovider_name == report.provider) {
            warn!(
                log,
                "status for unknown storage";
                "provider" => &report.provider,
            );
        }
    }
    for storage in stored {
        let report = reported
            .iter()
            .find(|r| r.provider == storage.storageprovider_name);
        let action =
            transition::storage(storage.storagestate_name, report.is_some());
        let mut row = storage.clone();
        match (action, report) {
            (Action::Upsert, Some(report)) => {
                row.storagestate_name =
                    parse_state::<StorageState>(&report.state)?;
                row.kubernetes_status = Some(serde_json::to_value(report)?);
                if !report.size.is_empty() {
                    row.size = report.size.clone();
                }
            }
            (Action::Finalize, _) => {
                row.storagestate_name = StorageState::Deleted;
            }
            _ => continue,
        }
        if row != storage {
            txn.storage_update(&row).await?;
        }
    }
    Ok(())
}

/// Removes a vip the operator no longer serves, unless a firewall rule
/// still guards it
async fn finalize_vip(
    txn: &mut dyn ClusterTransaction,
    log: &slog::Logger,
    entry: &VipWithDetails,
) -> Result<(), Error> {
    if entry.vip.has_active_firewall_rule() {
        debug!(
            log,
            "vip removal deferred until its firewall rule is gone";
            "vip_id" => entry.vip.vip_id,
        );
        return Ok(());
    }
    txn.vipdetails_delete(entry.vip.vip_id).await?;
    txn.vip_delete(entry.vip.vip_id).await
}

async fn reconcile_vips(
    txn: &mut dyn ClusterTransaction,
    log: &slog::Logger,
    cluster: &Cluster,
    reported: &[IlbStatus],
) -> Result<(), Error> {
    let vips = txn.vip_list(cluster.cluster_id).await?;
    let mut seen = BTreeSet::new();
    for report in reported.iter().filter(|r| !r.name.is_empty()) {
        let name = ilb_logical_name(&report.name, &cluster.unique_id)
            .map_err(|e| Error::internal_error(&e.to_string()))?;
        let entry =
            vips.iter().find(|v| v.details.vip_name == name).ok_or_else(
                || {
                    Error::internal_error(&format!(
                        "cluster {:?} has no vip named {name:?}",
                        cluster.unique_id
                    ))
                },
            )?;
        seen.insert(entry.vip.vip_id);
        let state = parse_state::<VipState>(&report.state)?;
        match transition::vip(entry.vip.vipstate_name, Some(state)) {
            Action::Upsert => {
                let mut vip = entry.vip.clone();
                vip.vipstate_name = state;
                vip.vip_status = Some(serde_json::to_value(report)?);
                if let Some(ip) = non_empty(&report.vip) {
                    vip.vip_ip = Some(ip);
                }
                if vip != entry.vip {
                    txn.vip_update(&vip).await?;
                }
                let mut details = entry.details.clone();
                if report.pool_id != 0 {
                    details.pool_id = Some(report.pool_id);
                }
                if details != entry.details {
                    txn.vipdetails_update(&details).await?;
                }
            }
            Action::DeleteUnlessFirewall => {
                finalize_vip(txn, log, entry).await?;
            }
            _ => (),
        }
    }
    for entry in vips.iter().filter(|v| !seen.contains(&v.vip.vip_id)) {
        if transition::vip(entry.vip.vipstate_name, None)
            == Action::DeleteUnlessFirewall
        {
            finalize_vip(txn, log, entry).await?;
        }
    }
    Ok(())
}

async fn reconcile_firewall(
    txn: &mut dyn ClusterTransaction,
    cluster: &Cluster,
    reported: &[FirewallStatus],
) -> Result<(), Error> {
    let vips = txn.vip_list(cluster.cluster_id).await?;
    let mut seen = BTreeSet::new();
    for report in reported {
        let entry = vips
            .iter()
            .find(|v| {
                v.vip.vip_ip.as_deref() == Some(report.destination_ip.as_str())
            })
            .ok_or_else(|| {
                Error::internal_error(&format!(
                    "cluster {:?} has no vip with address {:?}",
                    cluster.unique_id, report.destination_ip
                ))
            })?;
        seen.insert(entry.vip.vip_id);
        let state = reported_firewall_state(&report.state)
            .map_err(|e| Error::invalid_request(&e.to_string()))?;
        if transition::firewall(entry.vip.firewall_state(), Some(state))
            != Action::Upsert
        {
            continue;
        }
        // The operator reports one protocol per rule; the tenant's rule
        // keeps its own source and protocol lists.
        write_firewall(txn, entry, state, None).await?;
    }

    // Rules the firewall controller has not picked up yet are not expected
    // in the report.
    let compared = vips.iter().filter(|v| {
        v.vip.viptype_name == VipType::Public
            && v.vip.firewall_status.is_some()
            && v.vip.firewall_status != Some(FirewallState::Pending)
            && !seen.contains(&v.vip.vip_id)
    });
    for entry in compared {
        if transition::firewall(entry.vip.firewall_state(), None)
            == Action::Reset
        {
            write_firewall(
                txn,
                entry,
                FirewallState::NotSpecified,
                Some((json!([]), json!([]))),
            )
            .await?;
        }
    }
    Ok(())
}

async fn write_firewall(
    txn: &mut dyn ClusterTransaction,
    entry: &VipWithDetails,
    state: FirewallState,
    rule: Option<(serde_json::Value, serde_json::Value)>,
) -> Result<(), Error> {
    let mut vip = entry.vip.clone();
    vip.firewall_status = Some(state);
    let mut details = entry.details.clone();
    if let Some((sourceips, protocols)) = rule {
        vip.sourceips = Some(sourceips);
        details.protocol = Some(protocols);
    }
    if vip != entry.vip {
        txn.vip_update(&vip).await?;
    }
    if details != entry.details {
        txn.vipdetails_update(&details).await?;
    }
    Ok(())
}

impl DataStore {
    /// Applies a status report from the operator
    pub async fn cluster_reconcile(
        &self,
        cluster_uuid: &str,
        report: &ClusterStatusReport,
    ) -> UpdateResult<ReconcileOutcome> {
        let mut txn =
            self.begin("cluster_reconcile", TenantOp::Update).await?;
        let result =
            self.cluster_reconcile_txn(&mut *txn, cluster_uuid, report).await;
        match result {
            Ok(Some(reason)) => {
                txn.rollback().await.map_err(|e| {
                    TenantSafe::new(&self.log, TenantOp::Update)
                        .wrap("cluster_reconcile", e)
                })?;
                warn!(
                    self.log,
                    "status report superseded, not committing";
                    "cluster_uuid" => cluster_uuid,
                    "reason" => &reason,
                );
                Ok(ReconcileOutcome::Superseded { reason })
            }
            result => {
                self.finish(txn, result, "cluster_reconcile", TenantOp::Update)
                    .await?;
                debug!(
                    self.log,
                    "status report applied";
                    "cluster_uuid" => cluster_uuid,
                    "state" => &report.state,
                );
                Ok(ReconcileOutcome::Applied)
            }
        }
    }

    /// Returns the reason to discard the report, if it must be
    async fn cluster_reconcile_txn(
        &self,
        txn: &mut dyn ClusterTransaction,
        cluster_uuid: &str,
        report: &ClusterStatusReport,
    ) -> Result<Option<String>, Error> {
        let mut cluster = txn
            .cluster_fetch_for_update(cluster_uuid)
            .await?
            .ok_or_else(|| cluster_not_found(cluster_uuid))?;
        // The row lock keeps this valid until commit.
        let stored_state = cluster.clusterstate_name;
        check_node_counts(report)?;
        let reported_state = parse_state::<ClusterState>(&report.state)?;

        self.reconcile_nodegroups(txn, cluster.cluster_id, &report.nodegroups)
            .await?;
        reconcile_addons(txn, &self.log, cluster.cluster_id, &report.addons)
            .await?;
        reconcile_vips(txn, &self.log, &cluster, &report.ilbs).await?;
        reconcile_storage(
            txn,
            &self.log,
            cluster.cluster_id,
            &report.storages,
        )
        .await?;
        reconcile_firewall(txn, &cluster, &report.firewall).await?;

        let summary = serde_json::to_value(report.summary())?;
        if cluster.clusterstate_name != reported_state
            || cluster.kubernetes_status.as_ref() != Some(&summary)
        {
            cluster.clusterstate_name = reported_state;
            cluster.kubernetes_status = Some(summary);
            txn.cluster_update(&cluster).await?;
        }

        let applied = latest_change_applied(txn, cluster.cluster_id).await?;
        Ok(check_status_report(stored_state, applied).err())
    }

    async fn reconcile_nodegroups(
        &self,
        txn: &mut dyn ClusterTransaction,
        cluster_id: i32,
        reported: &[NodeGroupStatus],
    ) -> Result<(), Error> {
        let stored = txn.nodegroup_list(cluster_id).await?;
        let nodes = txn.node_list(cluster_id).await?;
        for report in reported {
            let nodegroup = stored
                .iter()
                .find(|ng| ng.unique_id == report.name)
                .ok_or_else(|| {
                    Error::not_found_described(
                        ResourceType::NodeGroup,
                        NODEGROUP_NOT_FOUND,
                    )
                })?;
            if transition::nodegroup(nodegroup.nodegroupstate_name, true)
                != Action::Upsert
            {
                continue;
            }
            let mut row = nodegroup.clone();
            row.nodegroupstate_name =
                parse_state::<NodeGroupState>(&report.state)?;
            row.kubernetes_status =
                Some(serde_json::to_value(report.summary())?);
            if row != *nodegroup {
                txn.nodegroup_update(&row).await?;
            }
            let existing: Vec<&Node> = nodes
                .iter()
                .filter(|n| n.nodegroup_id == nodegroup.nodegroup_id)
                .collect();
            self.reconcile_nodes(txn, nodegroup, &existing, &report.nodes)
                .await?;
        }

        for nodegroup in &stored {
            let reported =
                reported.iter().any(|r| r.name == nodegroup.unique_id);
            if transition::nodegroup(nodegroup.nodegroupstate_name, reported)
                == Action::Delete
            {
                txn.node_delete_by_nodegroup(nodegroup.nodegroup_id).await?;
                txn.nodegroup_delete(nodegroup.nodegroup_id).await?;
            }
        }
        Ok(())
    }

    /// Diffs one nodegroup's nodes against the report, keyed by address
    async fn reconcile_nodes(
        &self,
        txn: &mut dyn ClusterTransaction,
        nodegroup: &NodeGroup,
        existing: &[&Node],
        reported: &[NodeStatus],
    ) -> Result<(), Error> {
        let nodeprovider = self
            .reference
            .instance_type(&nodegroup.instancetype_name)
            .await?
            .map(|t| t.nodeprovider_name);

        for report in reported {
            let image = self
                .reference
                .osimageinstance_by_artifact(&report.instance_imi)
                .await?
                .map(|i| i.osimageinstance_name);
            let status = Some(serde_json::to_value(report)?);
            let weka = &report.weka_storage_status;
            match existing.iter().find(|n| n.ip_address == report.ip_address) {
                Some(node) => {
                    let update = NodeUpdate {
                        k8snode_name: report.name.clone(),
                        k8snodestate_name: report.state.clone(),
                        nodeprovider_name: nodeprovider.clone(),
                        osimageinstance_name: image
                            .or_else(|| node.osimageinstance_name.clone()),
                        kubernetes_status: status,
                        created_date: report.creation_time,
                        weka_storage_client_id: non_empty(&weka.client_id),
                        weka_storage_status: non_empty(&weka.status),
                        weka_storage_custom_status: non_empty(
                            &weka.custom_status,
                        ),
                        weka_storage_message: non_empty(&weka.message),
                    };
                    let mut row = (*node).clone();
                    row.apply(update.clone());
                    if row != **node {
                        txn.node_update(node.k8snode_id, update).await?;
                    }
                }
                None => {
                    let image = image.ok_or_else(|| {
                        Error::internal_error(&format!(
                            "no osimageinstance for artifact {:?} of node {:?}",
                            report.instance_imi, report.name
                        ))
                    })?;
                    txn.node_insert(NewNode {
                        k8snode_name: report.name.clone(),
                        cluster_id: nodegroup.cluster_id,
                        nodegroup_id: nodegroup.nodegroup_id,
                        ip_address: report.ip_address.clone(),
                        k8snodestate_name: report.state.clone(),
                        nodeprovider_name: nodeprovider.clone(),
                        osimageinstance_name: Some(image),
                        dns_name: non_empty(&report.dns_name),
                        kubernetes_status: status,
                        created_date: report.creation_time,
                        weka_storage_client_id: non_empty(&weka.client_id),
                        weka_storage_status: non_empty(&weka.status),
                        weka_storage_custom_status: non_empty(
                            &weka.custom_status,
                        ),
                        weka_storage_message: non_empty(&weka.message),
                    })
                    .await?;
                }
            }
        }

        for node in existing {
            if !reported.iter().any(|r| r.ip_address == node.ip_address) {
                txn.node_delete(node.k8snode_id).await?;
            }
        }
        Ok(())
    }
}
