// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parameters of the mutating handlers

use serde::{Deserialize, Serialize};

/// Create a cluster and its control plane
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CreateClusterParams {
    pub cloudaccount_id: String,
    pub name: String,
    pub description: Option<String>,
    pub region: String,
    /// Requested version; for iks this may be `major.minor`, in which case
    /// the newest Active patch of that minor is used.
    pub k8sversion_name: String,
    pub runtime_name: String,
    pub instancetype_name: String,
    pub osimage_name: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CreateNodeGroupParams {
    pub cloudaccount_id: String,
    pub cluster_uuid: String,
    pub name: String,
    pub count: i32,
    pub instancetype_name: String,
    pub osimage_name: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CreateVipParams {
    pub cloudaccount_id: String,
    pub cluster_uuid: String,
    pub name: String,
    pub description: Option<String>,
    pub port: i32,
    /// `public` or `private`
    pub viptype: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct UpgradeClusterParams {
    pub cloudaccount_id: String,
    pub cluster_uuid: String,
    /// Upgrade to this version instead of the newest one offered
    pub k8sversion_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct UpgradeNodeGroupParams {
    pub cloudaccount_id: String,
    pub cluster_uuid: String,
    pub nodegroup_uuid: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FirewallRuleParams {
    pub cloudaccount_id: String,
    pub cluster_uuid: String,
    pub vip_id: i32,
    pub source_ips: Vec<String>,
    pub protocols: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EnableStorageParams {
    pub cloudaccount_id: String,
    pub cluster_uuid: String,
    pub provider: String,
    pub size: String,
}

/// Plaintext cluster certificates, as produced by the operator
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCerts {
    #[serde(default)]
    pub ca_crt: String,
    #[serde(default)]
    pub ca_key: String,
    #[serde(default)]
    pub etcd_ca_crt: String,
    #[serde(default)]
    pub etcd_ca_key: String,
    #[serde(default)]
    pub etcd_rotation_keys: String,
    #[serde(default)]
    pub sa_pub: String,
    #[serde(default)]
    pub sa_key: String,
    #[serde(default)]
    pub cp_registration_cmd: String,
    #[serde(default)]
    pub wk_registration_cmd: String,
}

impl ClusterCerts {
    /// The fields in storage column order
    pub fn fields(&self) -> [&str; 9] {
        [
            &self.ca_crt,
            &self.ca_key,
            &self.etcd_ca_crt,
            &self.etcd_ca_key,
            &self.etcd_rotation_keys,
            &self.sa_pub,
            &self.sa_key,
            &self.cp_registration_cmd,
            &self.wk_registration_cmd,
        ]
    }

    /// Inverse of [`ClusterCerts::fields`]
    pub fn from_fields(fields: [String; 9]) -> ClusterCerts {
        let [
            ca_crt,
            ca_key,
            etcd_ca_crt,
            etcd_ca_key,
            etcd_rotation_keys,
            sa_pub,
            sa_key,
            cp_registration_cmd,
            wk_registration_cmd,
        ] = fields;
        ClusterCerts {
            ca_crt,
            ca_key,
            etcd_ca_crt,
            etcd_ca_key,
            etcd_rotation_keys,
            sa_pub,
            sa_key,
            cp_registration_cmd,
            wk_registration_cmd,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cert_fields_order() {
        let certs = ClusterCerts {
            ca_crt: "a".to_string(),
            wk_registration_cmd: "z".to_string(),
            ..Default::default()
        };
        let fields = certs.fields().map(String::from);
        assert_eq!(fields[0], "a");
        assert_eq!(fields[8], "z");
        assert_eq!(ClusterCerts::from_fields(fields), certs);
    }
}
