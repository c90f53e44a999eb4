// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data structures and related facilities for representing resources in the
//! API
//!
//! This includes all representations over the wire for the tenant-facing and
//! operator-facing surfaces, plus the error type every component reports.

mod error;
pub use error::*;

use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FormatResult;

/// Result of a create operation for the specified type
pub type CreateResult<T> = Result<T, Error>;
/// Result of a delete operation for the specified type
pub type DeleteResult = Result<(), Error>;
/// Result of a list operation that returns a vector
pub type ListResultVec<T> = Result<Vec<T>, Error>;
/// Result of a lookup operation for the specified type
pub type LookupResult<T> = Result<T, Error>;
/// Result of an update operation for the specified type
pub type UpdateResult<T> = Result<T, Error>;

/// Identifies a type of API resource
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ResourceType {
    Cluster,
    ClusterRevision,
    ClusterExtraConfig,
    NodeGroup,
    Node,
    Addon,
    Vip,
    VipDetails,
    FirewallRule,
    Storage,
    Snapshot,
    K8sVersion,
    OsImageInstance,
    EncryptionKey,
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut Formatter) -> FormatResult {
        write!(
            f,
            "{}",
            match self {
                ResourceType::Cluster => "Cluster",
                ResourceType::ClusterRevision => "Cluster revision",
                ResourceType::ClusterExtraConfig => "Cluster extra config",
                ResourceType::NodeGroup => "NodeGroup",
                ResourceType::Node => "Node",
                ResourceType::Addon => "Addon",
                ResourceType::Vip => "Vip",
                ResourceType::VipDetails => "Vip details",
                ResourceType::FirewallRule => "Firewall rule",
                ResourceType::Storage => "Storage",
                ResourceType::Snapshot => "Snapshot",
                ResourceType::K8sVersion => "K8s version",
                ResourceType::OsImageInstance => "OS image instance",
                ResourceType::EncryptionKey => "Encryption key",
            }
        )
    }
}
