// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for parsing the daemon's configuration file

use camino::{Utf8Path, Utf8PathBuf};
use dropshot::ConfigLogging;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for `iksd`
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Daemon-wide logging configuration.
    pub log: ConfigLogging,
    /// Where the control plane database lives.
    pub database: iks_db_queries::db::Config,
    /// Where the certificate encryption keys live.
    pub secrets: SecretsConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecretsConfig {
    /// JSON file of versioned encryption keys
    pub key_file: Utf8PathBuf,
}

impl Config {
    /// Load a `Config` from the given TOML file
    pub fn from_file<P: AsRef<Utf8Path>>(
        path: P,
    ) -> Result<Config, LoadError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config = toml::from_str(&contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading \"{path}\"")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\"")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use dropshot::ConfigLoggingLevel;
    use pretty_assertions::assert_eq;

    fn write_config(dir: &Utf8TempDir, contents: &str) -> Utf8PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_config_full() {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [log]
            mode = "stderr-terminal"
            level = "info"

            [database]
            url = "postgresql://iks@localhost:5432/iks"
            max_pool_size = 4

            [secrets]
            key_file = "/etc/iks/keys.json"
            "#,
        );
        let config = Config::from_file(&path).unwrap();
        assert_eq!(
            config,
            Config {
                log: ConfigLogging::StderrTerminal {
                    level: ConfigLoggingLevel::Info,
                },
                database: iks_db_queries::db::Config {
                    url: "postgresql://iks@localhost:5432/iks".to_string(),
                    max_pool_size: 4,
                    connection_timeout_secs: 30,
                },
                secrets: SecretsConfig {
                    key_file: "/etc/iks/keys.json".into(),
                },
            }
        );
    }

    #[test]
    fn test_config_bad() {
        let dir = Utf8TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = Config::from_file(&missing).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Io { ref path, .. } if *path == missing
        ));

        // No [secrets] section.
        let path = write_config(
            &dir,
            r#"
            [log]
            mode = "stderr-terminal"
            level = "info"

            [database]
            url = "postgresql://iks@localhost:5432/iks"
            "#,
        );
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
        assert_eq!(err.to_string(), format!("error parsing \"{path}\""));

        // Misspelled database key.
        let path = write_config(
            &dir,
            r#"
            [log]
            mode = "stderr-terminal"
            level = "info"

            [database]
            url = "postgresql://iks@localhost:5432/iks"
            max_pool = 4

            [secrets]
            key_file = "/etc/iks/keys.json"
            "#,
        );
        assert!(matches!(
            Config::from_file(&path).unwrap_err(),
            LoadError::Parse { .. }
        ));
    }
}
