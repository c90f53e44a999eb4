// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Upgrade resolution
//!
//! The two providers upgrade differently:
//!
//! * `iks` clusters move one minor at a time; the cluster is offered the
//!   first later minor and nothing else.  Control planes may also move to a
//!   later patch of their own minor.
//! * `rke2` clusters are offered every later patch of their minor plus the
//!   first later version of the next minor.  Control planes are offered an
//!   image refresh when the compatibility table has moved on to a new image
//!   for their version.
//!
//! Workers never get ahead of their control plane: they are offered the
//! control plane's current version (and matching worker image), and only
//! when they are behind it.
//!
//! Callers are responsible for the actionability gate and the nodegroup
//! state gate ([`offers_upgrades`]); these functions only compare versions
//! and images.

use crate::version::{K8sVersion, VersionParseError};
use iks_db_model::{NodeGroupState, Provider};
use iks_types::views::UpgradeTarget;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UpgradeError {
    #[error(transparent)]
    Version(#[from] VersionParseError),
    #[error("no compatibility entry for version {version:?}")]
    MissingCompatibility { version: String },
}

/// One row of the compatibility matrix, already narrowed down to a single
/// provider, runtime, instance type and os image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompatEntry {
    pub version: String,
    /// osimageinstance used by control plane nodes at this version
    pub cp_image: String,
    /// osimageinstance used by worker nodes at this version
    pub worker_image: String,
    /// Whether the version itself is in the Active lifecycle state
    pub active: bool,
}

/// What a nodegroup is running today
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeGroupImage {
    pub version: String,
    pub image: String,
}

/// Nodegroups that are mid-transition are not offered anything.
pub fn offers_upgrades(state: NodeGroupState) -> bool {
    !state.is_transitioning()
}

fn active_sorted(
    entries: &[CompatEntry],
) -> Result<Vec<(K8sVersion, &CompatEntry)>, VersionParseError> {
    let mut active = entries
        .iter()
        .filter(|e| e.active)
        .map(|e| Ok((K8sVersion::parse(&e.version)?, e)))
        .collect::<Result<Vec<_>, VersionParseError>>()?;
    active.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(active)
}

/// Versions a cluster may be upgraded to, in ascending order
pub fn cluster_upgrades(
    provider: Provider,
    current: &str,
    entries: &[CompatEntry],
) -> Result<Vec<String>, UpgradeError> {
    let current = K8sVersion::parse(current)?;
    let mut available = Vec::new();
    for (candidate, _) in active_sorted(entries)? {
        match provider {
            Provider::Iks => {
                if current.is_minor_behind(&candidate) {
                    available.push(candidate.major_minor());
                    break;
                }
            }
            Provider::Rke2 => {
                if current.is_patch_behind(&candidate) {
                    available.push(candidate.name().to_string());
                } else if current.is_minor_behind(&candidate) {
                    available.push(candidate.name().to_string());
                    break;
                }
            }
        }
    }
    Ok(available)
}

/// Upgrades available to a control plane nodegroup
pub fn control_plane_upgrades(
    provider: Provider,
    control_plane: &NodeGroupImage,
    entries: &[CompatEntry],
) -> Result<Vec<UpgradeTarget>, UpgradeError> {
    let current = K8sVersion::parse(&control_plane.version)?;
    let patches: Vec<(K8sVersion, &CompatEntry)> = active_sorted(entries)?
        .into_iter()
        .filter(|(v, _)| v.same_minor(&current))
        .collect();

    let mut available = Vec::new();
    match provider {
        Provider::Rke2 => {
            let current_entry = entries
                .iter()
                .find(|e| e.version == control_plane.version)
                .ok_or_else(|| UpgradeError::MissingCompatibility {
                    version: control_plane.version.clone(),
                })?;
            let patch_image = patches
                .iter()
                .find(|(_, e)| e.version == control_plane.version)
                .map(|(_, e)| e.cp_image.as_str())
                .filter(|image| !image.is_empty());
            match patch_image {
                Some(image) if image != control_plane.image => {
                    available.push(UpgradeTarget {
                        version: control_plane.version.clone(),
                        imi: image.to_string(),
                    });
                }
                _ if control_plane.image != current_entry.cp_image => {
                    available.push(UpgradeTarget {
                        version: control_plane.version.clone(),
                        imi: current_entry.cp_image.clone(),
                    });
                }
                _ => (),
            }
        }
        Provider::Iks => {
            for (candidate, entry) in patches {
                if current.is_patch_behind(&candidate) {
                    available.push(UpgradeTarget {
                        version: candidate.name().to_string(),
                        imi: entry.cp_image.clone(),
                    });
                }
            }
        }
    }
    Ok(available)
}

/// Upgrades available to a worker nodegroup
///
/// `worker_entries` are the compatibility rows for the worker's own runtime,
/// instance type and os image.  They are only consulted for iks.
pub fn worker_upgrades(
    provider: Provider,
    worker: &NodeGroupImage,
    control_plane: &NodeGroupImage,
    worker_entries: &[CompatEntry],
) -> Result<Vec<UpgradeTarget>, UpgradeError> {
    match provider {
        Provider::Rke2 => {
            if worker.image != control_plane.image {
                return Ok(vec![UpgradeTarget {
                    version: control_plane.version.clone(),
                    imi: control_plane.image.clone(),
                }]);
            }
            Ok(Vec::new())
        }
        Provider::Iks => {
            let cp_version = K8sVersion::parse(&control_plane.version)?;
            let worker_version = K8sVersion::parse(&worker.version)?;
            if !worker_version.is_patch_behind(&cp_version) {
                return Ok(Vec::new());
            }
            let entry = worker_entries
                .iter()
                .find(|e| e.version == control_plane.version)
                .ok_or_else(|| UpgradeError::MissingCompatibility {
                    version: control_plane.version.clone(),
                })?;
            Ok(vec![UpgradeTarget {
                version: control_plane.version.clone(),
                imi: entry.worker_image.clone(),
            }])
        }
    }
}

/// Picks the compatibility entry a cluster is created at or moved to
///
/// `requested` is either an exact version name or, as iks upgrades are
/// offered, `major.minor`; the latter selects the newest Active patch of that
/// minor.
pub fn resolve_version<'a>(
    requested: &str,
    entries: &'a [CompatEntry],
) -> Result<Option<&'a CompatEntry>, UpgradeError> {
    let minor = requested.trim().trim_start_matches(['v', 'V']);
    Ok(active_sorted(entries)?
        .into_iter()
        .rev()
        .find(|(v, e)| e.version == requested || v.major_minor() == minor)
        .map(|(_, e)| e))
}
