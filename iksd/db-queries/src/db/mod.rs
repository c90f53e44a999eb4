// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facilities for working with the IKS control plane database

mod config;
// This is marked public for use by the daemon and by integration tests
pub mod datastore;
pub mod error;
#[cfg(any(test, feature = "testing"))]
mod fixture;
mod pg;
mod pool;
mod reference;
#[cfg(any(test, feature = "testing"))]
mod sim;
mod store;

#[cfg(any(test, feature = "testing"))]
pub mod pub_test_utils;

pub use iks_db_model as model;
pub use iks_db_model::schema;

pub use config::Config;
pub use datastore::DataStore;
pub use pg::PgStore;
pub use pool::DbConnection;
pub use pool::Pool;
#[cfg(any(test, feature = "testing"))]
pub use fixture::FixtureReferenceData;
pub use reference::PgReferenceData;
pub use reference::ReferenceData;
#[cfg(any(test, feature = "testing"))]
pub use sim::{SimStore, SimTables};
pub use store::ClusterStore;
pub use store::ClusterTransaction;
