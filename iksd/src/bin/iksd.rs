// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line driver for the IKS control plane
//!
//! Each subcommand runs one operator callback or query against the
//! configured database and prints its result as JSON.

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use iks_common::FileKv;
use iks_db_queries::db::{DataStore, Pool};
use iks_key_manager::KeyFileRetriever;
use iks_types::params::ClusterCerts;
use iks_types::status::ClusterStatusReport;
use iksd::Config;
use serde::de::DeserializeOwned;
use serde::Serialize;
use slog::{info, o, Logger};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[clap(name = "iksd", about = "IKS control plane")]
struct Cli {
    /// Path to the daemon's TOML configuration file
    #[clap(long, action)]
    config: Utf8PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply an operator status report to a cluster
    Reconcile(ReconcileArgs),
    /// Record the state the operator reports for a cluster
    SetState(SetStateArgs),
    /// Mark a cluster revision as converged on (or not)
    ChangeApplied(ChangeAppliedArgs),
    /// Store the certificates the operator generated for a cluster
    PutCerts(PutCertsArgs),
    /// Remove the rows of a cluster the operator has torn down
    FinalizeDelete(FinalizeDeleteArgs),
    /// List the versions a cluster or one of its nodegroups may move to
    Upgrades(UpgradesArgs),
}

#[derive(Debug, Args)]
struct ReconcileArgs {
    #[clap(action)]
    cluster_uuid: String,
    /// JSON file holding the status report
    #[clap(action)]
    report: Utf8PathBuf,
}

#[derive(Debug, Args)]
struct SetStateArgs {
    #[clap(action)]
    cluster_uuid: String,
    #[clap(action)]
    state: String,
}

#[derive(Debug, Args)]
struct ChangeAppliedArgs {
    #[clap(action)]
    clusterrev_id: i32,
    /// Record the revision as not applied
    #[clap(long, action)]
    not_applied: bool,
}

#[derive(Debug, Args)]
struct PutCertsArgs {
    #[clap(action)]
    cluster_uuid: String,
    /// JSON file holding the plaintext certificates
    #[clap(action)]
    certs: Utf8PathBuf,
}

#[derive(Debug, Args)]
struct FinalizeDeleteArgs {
    #[clap(action)]
    cluster_uuid: String,
}

#[derive(Debug, Args)]
struct UpgradesArgs {
    #[clap(action)]
    cloudaccount_id: String,
    #[clap(action)]
    cluster_uuid: String,
    /// Ask about this nodegroup instead of the control plane
    #[clap(long, action)]
    nodegroup: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading config {}", cli.config))?;
    let log = config
        .log
        .to_logger("iksd")
        .context("failed to create logger")?
        .new(o!(FileKv));
    let datastore = datastore(&log, &config);

    match cli.command {
        Command::Reconcile(args) => {
            let report: ClusterStatusReport = read_json(&args.report)?;
            let outcome = datastore
                .cluster_reconcile(&args.cluster_uuid, &report)
                .await
                .context("reconcile")?;
            print_json(&outcome)
        }
        Command::SetState(args) => {
            datastore
                .cluster_state_update(&args.cluster_uuid, &args.state)
                .await
                .context("set-state")?;
            info!(log, "cluster state recorded";
                "cluster_uuid" => &args.cluster_uuid,
                "state" => &args.state,
            );
            Ok(())
        }
        Command::ChangeApplied(args) => {
            datastore
                .cluster_change_applied(args.clusterrev_id, !args.not_applied)
                .await
                .context("change-applied")?;
            Ok(())
        }
        Command::PutCerts(args) => {
            let certs: ClusterCerts = read_json(&args.certs)?;
            datastore
                .cluster_certs_update(&args.cluster_uuid, &certs)
                .await
                .context("put-certs")?;
            Ok(())
        }
        Command::FinalizeDelete(args) => {
            datastore
                .cluster_delete_finalize(&args.cluster_uuid)
                .await
                .context("finalize-delete")?;
            Ok(())
        }
        Command::Upgrades(args) => match args.nodegroup {
            Some(nodegroup_uuid) => {
                let upgrades = datastore
                    .nodegroup_upgrades_available(
                        &args.cluster_uuid,
                        &nodegroup_uuid,
                        &args.cloudaccount_id,
                    )
                    .await
                    .context("upgrades")?;
                print_json(&upgrades)
            }
            None => {
                let versions = datastore
                    .cluster_upgrades_available(
                        &args.cluster_uuid,
                        &args.cloudaccount_id,
                    )
                    .await
                    .context("upgrades")?;
                print_json(&versions)
            }
        },
    }
}

fn datastore(log: &Logger, config: &Config) -> DataStore {
    let pool = Pool::new(log, &config.database);
    let secrets = Arc::new(KeyFileRetriever::new(
        config.secrets.key_file.clone(),
    ));
    DataStore::new_postgres(log, pool, secrets)
}

fn read_json<T: DeserializeOwned>(
    path: &Utf8PathBuf,
) -> Result<T, anyhow::Error> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read {path}"))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {path}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), anyhow::Error> {
    let out = serde_json::to_string_pretty(value)
        .context("serializing result")?;
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from([
            "iksd",
            "--config",
            "/etc/iks/config.toml",
            "change-applied",
            "42",
            "--not-applied",
        ])
        .unwrap();
        assert_eq!(cli.config, "/etc/iks/config.toml");
        assert!(matches!(
            cli.command,
            Command::ChangeApplied(ChangeAppliedArgs {
                clusterrev_id: 42,
                not_applied: true,
            })
        ));

        // The config file is not optional.
        assert!(Cli::try_parse_from(["iksd", "finalize-delete", "cl-abc"])
            .is_err());
    }
}
