// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reference data for tests, held in memory

use super::reference::{compat_entry, ReferenceData};
use async_trait::async_trait;
use iks_common::api::external::Error;
use iks_db_model::{
    AddonVersion, CloudAccountExtraSpec, InstanceType, K8sCompatibility,
    K8sVersion, LifecycleState, OsImageInstance, Provider,
};
use iks_planning::quota::Defaults;
use iks_planning::upgrade::CompatEntry;
use std::collections::BTreeMap;

/// Reference data held in memory
///
/// Fields are public so that tests can describe exactly the world they need.
#[derive(Clone, Debug, Default)]
pub struct FixtureReferenceData {
    pub defaults: BTreeMap<String, String>,
    pub cloud_accounts: Vec<CloudAccountExtraSpec>,
    pub versions: Vec<K8sVersion>,
    pub compatibility: Vec<K8sCompatibility>,
    pub osimageinstances: Vec<OsImageInstance>,
    pub instance_types: Vec<InstanceType>,
    pub addon_versions: Vec<AddonVersion>,
    /// (addon version, k8s version) pairs
    pub addon_compatibility: Vec<(String, String)>,
}

impl FixtureReferenceData {
    pub fn with_default(mut self, name: &str, value: &str) -> Self {
        self.defaults.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_cloud_account(
        mut self,
        account: CloudAccountExtraSpec,
    ) -> Self {
        self.cloud_accounts
            .retain(|a| a.cloudaccount_id != account.cloudaccount_id);
        self.cloud_accounts.push(account);
        self
    }

    fn version_state(&self, name: &str) -> LifecycleState {
        self.versions
            .iter()
            .find(|v| v.k8sversion_name == name)
            .map(|v| v.lifecyclestate_name)
            .unwrap_or(LifecycleState::Archived)
    }
}

#[async_trait]
impl ReferenceData for FixtureReferenceData {
    async fn defaults(&self) -> Result<Defaults, Error> {
        Ok(Defaults::new(self.defaults.clone()))
    }

    async fn cloud_account(
        &self,
        cloudaccount_id: &str,
    ) -> Result<Option<CloudAccountExtraSpec>, Error> {
        Ok(self
            .cloud_accounts
            .iter()
            .find(|a| a.cloudaccount_id == cloudaccount_id)
            .cloned())
    }

    async fn compatibility(
        &self,
        provider: Provider,
        runtime: &str,
        instancetype: &str,
        osimage: &str,
    ) -> Result<Vec<CompatEntry>, Error> {
        Ok(self
            .compatibility
            .iter()
            .filter(|c| {
                c.provider_name == provider
                    && c.runtime_name == runtime
                    && c.instancetype_name == instancetype
                    && c.osimage_name == osimage
            })
            .map(|c| {
                compat_entry(c.clone(), self.version_state(&c.k8sversion_name))
            })
            .collect())
    }

    async fn osimageinstance(
        &self,
        name: &str,
    ) -> Result<Option<OsImageInstance>, Error> {
        Ok(self
            .osimageinstances
            .iter()
            .find(|i| i.osimageinstance_name == name)
            .cloned())
    }

    async fn osimageinstance_by_artifact(
        &self,
        artifact: &str,
    ) -> Result<Option<OsImageInstance>, Error> {
        Ok(self
            .osimageinstances
            .iter()
            .find(|i| i.imiartifact == artifact)
            .cloned())
    }

    async fn instance_type(
        &self,
        name: &str,
    ) -> Result<Option<InstanceType>, Error> {
        Ok(self
            .instance_types
            .iter()
            .find(|t| t.instancetype_name == name)
            .cloned())
    }

    async fn default_addons(
        &self,
        k8sversion: &str,
    ) -> Result<Vec<AddonVersion>, Error> {
        let mut addons: Vec<AddonVersion> = self
            .addon_versions
            .iter()
            .filter(|a| a.lifecyclestate_name == LifecycleState::Active)
            .filter(|a| {
                self.addon_compatibility.iter().any(|(addon, version)| {
                    *addon == a.addonversion_name && version == k8sversion
                })
            })
            .cloned()
            .collect();
        addons.sort_by(|a, b| a.addonversion_name.cmp(&b.addonversion_name));
        Ok(addons)
    }
}
