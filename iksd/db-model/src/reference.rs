// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only reference data maintained outside of the control plane

use super::LifecycleState;
use super::Provider;
use crate::schema::{
    addonversion, cloudaccountextraspec, defaultconfig, instancetype,
    k8scompatibility, k8sversion, osimageinstance,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

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
#[diesel(table_name = k8sversion)]
pub struct K8sVersion {
    pub k8sversion_name: String,
    pub major_version: String,
    pub minor_version: String,
    pub provider_name: Provider,
    pub lifecyclestate_name: LifecycleState,
}

/// One row of the compatibility matrix: for a provider, runtime, version,
/// os image and instance type, the images to use for control-plane and
/// worker nodes.
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
#[diesel(table_name = k8scompatibility)]
pub struct K8sCompatibility {
    pub provider_name: Provider,
    pub runtime_name: String,
    pub k8sversion_name: String,
    pub osimage_name: String,
    pub instancetype_name: String,
    pub cp_osimageinstance_name: String,
    pub wrk_osimageinstance_name: String,
    pub lifecyclestate_name: LifecycleState,
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
#[diesel(table_name = osimageinstance)]
pub struct OsImageInstance {
    pub osimageinstance_name: String,
    pub osimage_name: String,
    pub k8sversion_name: String,
    pub nodegrouptype_name: String,
    pub provider_name: Provider,
    /// The machine image artifact the operator reports on each node
    pub imiartifact: String,
    pub lifecyclestate_name: LifecycleState,
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
#[diesel(table_name = instancetype)]
pub struct InstanceType {
    pub instancetype_name: String,
    pub nodeprovider_name: String,
    pub lifecyclestate_name: LifecycleState,
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
#[diesel(table_name = defaultconfig)]
pub struct DefaultConfig {
    pub name: String,
    pub value: String,
}

/// Per cloud account overrides and permissions
#[derive(
    Queryable,
    Insertable,
    Selectable,
    Clone,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = cloudaccountextraspec)]
pub struct CloudAccountExtraSpec {
    pub cloudaccount_id: String,
    pub provider_name: Option<String>,
    pub active_account_create_cluster: bool,
    pub allow_create_storage: bool,
    pub maxclusters_override: Option<i32>,
    pub maxclusterng_override: Option<i32>,
    pub maxclusterilb_override: Option<i32>,
    pub maxclustervm_override: Option<i32>,
    pub maxnodegroupvm_override: Option<i32>,
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
#[diesel(table_name = addonversion)]
pub struct AddonVersion {
    pub addonversion_name: String,
    pub name: String,
    pub install_type: String,
    pub artifact_repo: String,
    pub lifecyclestate_name: LifecycleState,
}
