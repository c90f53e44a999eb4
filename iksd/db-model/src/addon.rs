// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::impl_text_enum;
use crate::schema::clusteraddonversion;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

impl_text_enum! {
    pub enum AddonState;

    Pending => "Pending"
    Active => "Active"
    Updating => "Updating"
    Deleting => "Deleting"
    Error => "Error"
}

/// An addon installed on a cluster, keyed by (cluster, addon version)
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
#[diesel(table_name = clusteraddonversion)]
pub struct Addon {
    pub cluster_id: i32,
    pub addonversion_name: String,
    pub install_type: String,
    pub artifact_repo: Option<String>,
    pub clusteraddonstate_name: AddonState,
    pub kubernetes_status: Option<serde_json::Value>,
    pub lastchangetimestamp: DateTime<Utc>,
}
