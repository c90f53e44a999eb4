// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Database configuration

use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

/// Database configuration, the `[database]` section of the daemon's config
/// file
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// database url
    pub url: String,
    /// upper bound on pooled connections
    #[serde(default = "Config::default_max_size")]
    pub max_pool_size: u32,
    /// how long to wait for a pooled connection before giving up
    #[serde(default = "Config::default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
}

impl Config {
    fn default_max_size() -> u32 {
        16
    }

    fn default_connection_timeout_secs() -> u64 {
        30
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}
