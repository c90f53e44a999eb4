// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::impl_text_enum;
use crate::schema::{vip, vipdetails};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

impl_text_enum! {
    pub enum VipType;

    Public => "public"
    Private => "private"
}

impl_text_enum! {
    /// Who created a vip.  System vips (e.g. the API server ILB) are created
    /// with the cluster; customer vips through the vip API and count against
    /// the ILB quota.
    pub enum VipOwner;

    System => "system"
    Customer => "customer"
}

impl_text_enum! {
    pub enum VipState;

    Pending => "Pending"
    Active => "Active"
    Deleting => "Deleting"
    Deleted => "Deleted"
    Error => "Error"
}

impl_text_enum! {
    /// State of the firewall rule attached to a public vip
    ///
    /// A NULL column reads as `NotSpecified`, meaning no rule is in force.
    pub enum FirewallState;

    NotSpecified => "Not Specified"
    Pending => "Pending"
    Reconciling => "Reconciling"
    Active => "Active"
    Deleting => "Deleting"
    Deleted => "Deleted"
    Error => "Error"
}

impl FirewallState {
    /// A rule in one of these states is being changed by the firewall
    /// controller and may not be modified or have its vip removed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FirewallState::Reconciling | FirewallState::Deleting)
    }
}

/// Database representation of a load-balanced virtual IP
///
/// The firewall rule of a public vip is stored inline: `firewall_status`,
/// `sourceips` here and `protocol` on [`VipDetails`].  A NULL `sourceips`
/// means no rule was ever configured.
#[derive(
    Queryable, Selectable, Clone, Debug, PartialEq, Serialize, Deserialize,
)]
#[diesel(table_name = vip)]
pub struct Vip {
    pub vip_id: i32,
    pub cluster_id: i32,
    pub viptype_name: VipType,
    pub vipstate_name: VipState,
    pub owner: VipOwner,
    pub vipprovider_name: String,
    pub vip_ip: Option<String>,
    pub vip_status: Option<serde_json::Value>,
    pub firewall_status: Option<FirewallState>,
    pub sourceips: Option<serde_json::Value>,
    pub created_date: DateTime<Utc>,
}

impl Vip {
    pub fn firewall_state(&self) -> FirewallState {
        self.firewall_status.unwrap_or(FirewallState::NotSpecified)
    }

    /// Whether a firewall rule still guards this vip
    ///
    /// A rule guards the vip once source ips have been configured and until
    /// the rule has been reset to "Not Specified".
    pub fn has_active_firewall_rule(&self) -> bool {
        self.sourceips.is_some()
            && self.firewall_state() != FirewallState::NotSpecified
    }
}

#[derive(Insertable, Clone, Debug, PartialEq)]
#[diesel(table_name = vip)]
pub struct NewVip {
    pub cluster_id: i32,
    pub viptype_name: VipType,
    pub vipstate_name: VipState,
    pub owner: VipOwner,
    pub vipprovider_name: String,
    pub created_date: DateTime<Utc>,
}

#[derive(
    Queryable,
    Insertable,
    Selectable,
    Clone,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = vipdetails)]
pub struct VipDetails {
    pub vip_id: i32,
    /// Logical name; the operator reports it prefixed with the cluster uuid
    pub vip_name: String,
    pub description: Option<String>,
    pub port: i32,
    pub pool_name: String,
    pub pool_port: i32,
    pub pool_id: Option<i32>,
    pub protocol: Option<serde_json::Value>,
}

/// A vip joined with its details row
#[derive(Clone, Debug, PartialEq)]
pub struct VipWithDetails {
    pub vip: Vip,
    pub details: VipDetails,
}
