// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::impl_text_enum;
use crate::schema::storage;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

impl_text_enum! {
    /// Lifecycle of cluster storage
    ///
    /// Storage rows are never removed by reconciliation; a confirmed removal
    /// leaves the row behind in `Deleted`.
    pub enum StorageState;

    Pending => "Pending"
    Updating => "Updating"
    Active => "Active"
    Deleting => "Deleting"
    Deleted => "Deleted"
    Error => "Error"
}

#[derive(
    Queryable, Selectable, Clone, Debug, PartialEq, Serialize, Deserialize,
)]
#[diesel(table_name = storage)]
pub struct Storage {
    pub storage_id: i32,
    pub cluster_id: i32,
    pub storageprovider_name: String,
    pub size: String,
    pub storagestate_name: StorageState,
    pub kubernetes_status: Option<serde_json::Value>,
}

#[derive(Insertable, Clone, Debug, PartialEq)]
#[diesel(table_name = storage)]
pub struct NewStorage {
    pub cluster_id: i32,
    pub storageprovider_name: String,
    pub size: String,
    pub storagestate_name: StorageState,
    pub kubernetes_status: Option<serde_json::Value>,
}
