// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-tenant limits
//!
//! Every limit has a default in the `defaultconfig` table and an optional
//! per-account override in `cloudaccountextraspec`, where `-1` (or NULL)
//! means "use the default".  Exceeding a limit is reported as
//! PermissionDenied.

use iks_common::api::external::Error;
use iks_db_model::CloudAccountExtraSpec;
use std::collections::BTreeMap;

pub const RESTRICTED_ACCOUNT: &str = "Due to restrictions, we are currently \
    not allowing non-approved users to provision clusters.";
pub const RESTRICTED_STORAGE: &str = "Due to storage restrictions, we are \
    currently not allowing non-approved users to use storage.";

/// `defaultconfig` key that turns on the provisioning allow-list
pub const RESTRICT_CREATE_CLUSTER: &str = "restrict_create_cluster";

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumIter)]
pub enum QuotaKind {
    Clusters,
    NodeGroupsPerCluster,
    IlbsPerCluster,
    NodesPerNodeGroup,
    NodesPerCluster,
}

impl QuotaKind {
    pub fn default_key(&self) -> &'static str {
        match self {
            QuotaKind::Clusters => "max_cluster",
            QuotaKind::NodeGroupsPerCluster => "max_cluster_ng",
            QuotaKind::IlbsPerCluster => "max_cust_cluster_ilb",
            QuotaKind::NodesPerNodeGroup => "max_nodegroup_vm",
            QuotaKind::NodesPerCluster => "max_cluster_vm",
        }
    }

    pub fn override_value(&self, spec: &CloudAccountExtraSpec) -> Option<i32> {
        match self {
            QuotaKind::Clusters => spec.maxclusters_override,
            QuotaKind::NodeGroupsPerCluster => spec.maxclusterng_override,
            QuotaKind::IlbsPerCluster => spec.maxclusterilb_override,
            QuotaKind::NodesPerNodeGroup => spec.maxnodegroupvm_override,
            QuotaKind::NodesPerCluster => spec.maxclustervm_override,
        }
    }

    fn exceeded_message(&self, max: i64) -> String {
        let (what, scope) = match self {
            QuotaKind::Clusters => ("clusters", "cloud account"),
            QuotaKind::NodeGroupsPerCluster => ("nodegroups", "cluster"),
            QuotaKind::IlbsPerCluster => ("ILBs", "cluster"),
            QuotaKind::NodesPerNodeGroup => ("nodes", "nodegroup"),
            QuotaKind::NodesPerCluster => ("nodes", "cluster"),
        };
        format!("Can not create more than {max} {what} for this {scope}")
    }
}

/// The override wins when it is set to anything above `-1`.
pub fn effective_max(default: i64, override_value: Option<i32>) -> i64 {
    match override_value {
        Some(v) if v > -1 => i64::from(v),
        _ => default,
    }
}

/// Snapshot of the `defaultconfig` table
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Defaults(BTreeMap<String, String>);

impl Defaults {
    pub fn new(values: BTreeMap<String, String>) -> Defaults {
        Defaults(values)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, Error> {
        let value = self.get(key).ok_or_else(|| {
            Error::internal_error(&format!("missing default {key:?}"))
        })?;
        value.trim().parse().map_err(|_| {
            Error::internal_error(&format!(
                "default {key:?} is not a number: {value:?}"
            ))
        })
    }

    /// Missing keys read as false.
    pub fn get_bool(&self, key: &str) -> Result<bool, Error> {
        match self.get(key).map(str::trim) {
            None => Ok(false),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(Error::internal_error(&format!(
                "default {key:?} is not a boolean: {v:?}"
            ))),
        }
    }
}

/// Limits in force for one cloud account
#[derive(Clone, Debug)]
pub struct Limits<'a> {
    defaults: &'a Defaults,
    account: &'a CloudAccountExtraSpec,
}

impl<'a> Limits<'a> {
    pub fn new(
        defaults: &'a Defaults,
        account: &'a CloudAccountExtraSpec,
    ) -> Limits<'a> {
        Limits { defaults, account }
    }

    pub fn max(&self, kind: QuotaKind) -> Result<i64, Error> {
        let default = self.defaults.get_i64(kind.default_key())?;
        Ok(effective_max(default, kind.override_value(self.account)))
    }

    /// Fails once `existing` resources already use up the limit
    pub fn check_count(
        &self,
        kind: QuotaKind,
        existing: i64,
    ) -> Result<(), Error> {
        let max = self.max(kind)?;
        if existing >= max {
            return Err(Error::permission_denied(&kind.exceeded_message(max)));
        }
        Ok(())
    }

    /// Fails if a request for `requested` units would go over the limit
    pub fn check_size(
        &self,
        kind: QuotaKind,
        requested: i64,
    ) -> Result<(), Error> {
        let max = self.max(kind)?;
        if requested > max {
            return Err(Error::permission_denied(&kind.exceeded_message(max)));
        }
        Ok(())
    }

    /// Cluster provisioning may be limited to an allow-list of accounts.
    pub fn check_may_create_cluster(&self) -> Result<(), Error> {
        if self.defaults.get_bool(RESTRICT_CREATE_CLUSTER)?
            && !self.account.active_account_create_cluster
        {
            return Err(Error::permission_denied(RESTRICTED_ACCOUNT));
        }
        Ok(())
    }

    pub fn check_may_use_storage(&self) -> Result<(), Error> {
        if !(self.account.active_account_create_cluster
            && self.account.allow_create_storage)
        {
            return Err(Error::permission_denied(RESTRICTED_STORAGE));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use iks_common::api::external::Error;
    use strum::IntoEnumIterator;

    fn defaults() -> Defaults {
        Defaults::new(
            [
                ("max_cluster", "3"),
                ("max_cluster_ng", "5"),
                ("max_cust_cluster_ilb", "2"),
                ("max_nodegroup_vm", "10"),
                ("max_cluster_vm", "40"),
                ("restrict_create_cluster", "true"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        )
    }

    #[test]
    fn test_effective_max() {
        assert_eq!(effective_max(5, None), 5);
        assert_eq!(effective_max(5, Some(-1)), 5);
        assert_eq!(effective_max(5, Some(0)), 0);
        assert_eq!(effective_max(5, Some(12)), 12);
    }

    #[test]
    fn test_every_kind_has_a_default() {
        let defaults = defaults();
        let account = CloudAccountExtraSpec::default();
        let limits = Limits::new(&defaults, &account);
        for kind in QuotaKind::iter() {
            assert!(limits.max(kind).is_ok(), "{kind:?}");
        }
    }

    #[test]
    fn test_count_check() {
        let defaults = defaults();
        let account = CloudAccountExtraSpec {
            maxclusterng_override: Some(1),
            ..Default::default()
        };
        let limits = Limits::new(&defaults, &account);
        assert!(limits.check_count(QuotaKind::Clusters, 2).is_ok());
        let err = limits.check_count(QuotaKind::Clusters, 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can not create more than 3 clusters for this cloud account"
        );
        assert!(matches!(err, Error::PermissionDenied { .. }));

        let err = limits
            .check_count(QuotaKind::NodeGroupsPerCluster, 1)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can not create more than 1 nodegroups for this cluster"
        );
        let err =
            limits.check_count(QuotaKind::IlbsPerCluster, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can not create more than 2 ILBs for this cluster"
        );
    }

    #[test]
    fn test_size_check() {
        let defaults = defaults();
        let account = CloudAccountExtraSpec::default();
        let limits = Limits::new(&defaults, &account);
        assert!(limits.check_size(QuotaKind::NodesPerNodeGroup, 10).is_ok());
        let err =
            limits.check_size(QuotaKind::NodesPerNodeGroup, 11).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can not create more than 10 nodes for this nodegroup"
        );
    }

    #[test]
    fn test_restrictions() {
        let defaults = defaults();
        let mut account = CloudAccountExtraSpec::default();
        let err = Limits::new(&defaults, &account)
            .check_may_create_cluster()
            .unwrap_err();
        assert_eq!(err.to_string(), RESTRICTED_ACCOUNT);
        assert!(Limits::new(&defaults, &account)
            .check_may_use_storage()
            .is_err());

        account.active_account_create_cluster = true;
        assert!(Limits::new(&defaults, &account)
            .check_may_create_cluster()
            .is_ok());
        assert!(Limits::new(&defaults, &account)
            .check_may_use_storage()
            .is_err());
        account.allow_create_storage = true;
        assert!(Limits::new(&defaults, &account)
            .check_may_use_storage()
            .is_ok());

        let open = Defaults::new(BTreeMap::new());
        let account = CloudAccountExtraSpec::default();
        assert!(Limits::new(&open, &account)
            .check_may_create_cluster()
            .is_ok());
    }

    #[test]
    fn test_bad_defaults() {
        let defaults = Defaults::new(
            [("max_cluster".to_string(), "lots".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(defaults.get_i64("max_cluster").is_err());
        assert!(defaults.get_i64("max_cluster_ng").is_err());
    }
}
