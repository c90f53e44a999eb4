// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only reference data: defaults, account overrides, the version
//! compatibility matrix and machine images
//!
//! These tables are maintained outside of the control plane.  Workflows read
//! them through [`ReferenceData`] rather than inside their own transaction.

use super::error::{public_error_from_diesel, ErrorHandler};
use super::Pool;
use async_bb8_diesel::AsyncRunQueryDsl;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use iks_common::api::external::Error;
use iks_db_model::schema;
use iks_db_model::{
    AddonVersion, CloudAccountExtraSpec, DefaultConfig, InstanceType,
    K8sCompatibility, LifecycleState, OsImageInstance, Provider,
};
use iks_planning::quota::Defaults;
use iks_planning::upgrade::CompatEntry;

fn server(e: DieselError) -> Error {
    public_error_from_diesel(e, ErrorHandler::Server)
}

pub(super) fn compat_entry(
    row: K8sCompatibility,
    version_state: LifecycleState,
) -> CompatEntry {
    CompatEntry {
        version: row.k8sversion_name,
        cp_image: row.cp_osimageinstance_name,
        worker_image: row.wrk_osimageinstance_name,
        active: version_state == LifecycleState::Active,
    }
}

#[async_trait]
pub trait ReferenceData: Send + Sync {
    /// The whole `defaultconfig` table
    async fn defaults(&self) -> Result<Defaults, Error>;

    async fn cloud_account(
        &self,
        cloudaccount_id: &str,
    ) -> Result<Option<CloudAccountExtraSpec>, Error>;

    /// Compatibility rows for one provider, runtime, instance type and os
    /// image.  An entry is active when its Kubernetes version is.
    async fn compatibility(
        &self,
        provider: Provider,
        runtime: &str,
        instancetype: &str,
        osimage: &str,
    ) -> Result<Vec<CompatEntry>, Error>;

    async fn osimageinstance(
        &self,
        name: &str,
    ) -> Result<Option<OsImageInstance>, Error>;

    /// Maps the image artifact a node reports back to its osimageinstance
    async fn osimageinstance_by_artifact(
        &self,
        artifact: &str,
    ) -> Result<Option<OsImageInstance>, Error>;

    async fn instance_type(
        &self,
        name: &str,
    ) -> Result<Option<InstanceType>, Error>;

    /// Active addons installed by default at `k8sversion`
    async fn default_addons(
        &self,
        k8sversion: &str,
    ) -> Result<Vec<AddonVersion>, Error>;
}

pub struct PgReferenceData {
    pool: Pool,
}

impl PgReferenceData {
    pub fn new(pool: Pool) -> PgReferenceData {
        PgReferenceData { pool }
    }
}

#[async_trait]
impl ReferenceData for PgReferenceData {
    async fn defaults(&self) -> Result<Defaults, Error> {
        use schema::defaultconfig::dsl;
        let conn = self.pool.claim().await?;
        let rows: Vec<DefaultConfig> = dsl::defaultconfig
            .select(DefaultConfig::as_select())
            .load_async(&*conn)
            .await
            .map_err(server)?;
        Ok(Defaults::new(
            rows.into_iter().map(|r| (r.name, r.value)).collect(),
        ))
    }

    async fn cloud_account(
        &self,
        cloudaccount_id: &str,
    ) -> Result<Option<CloudAccountExtraSpec>, Error> {
        use schema::cloudaccountextraspec::dsl;
        let conn = self.pool.claim().await?;
        dsl::cloudaccountextraspec
            .filter(dsl::cloudaccount_id.eq(cloudaccount_id.to_string()))
            .select(CloudAccountExtraSpec::as_select())
            .get_result_async(&*conn)
            .await
            .optional()
            .map_err(server)
    }

    async fn compatibility(
        &self,
        provider: Provider,
        runtime: &str,
        instancetype: &str,
        osimage: &str,
    ) -> Result<Vec<CompatEntry>, Error> {
        use schema::{k8scompatibility, k8sversion};
        let conn = self.pool.claim().await?;
        let rows: Vec<(K8sCompatibility, LifecycleState)> =
            k8scompatibility::table
                .inner_join(k8sversion::table.on(
                    k8sversion::k8sversion_name
                        .eq(k8scompatibility::k8sversion_name),
                ))
                .filter(k8scompatibility::provider_name.eq(provider))
                .filter(k8scompatibility::runtime_name.eq(runtime.to_string()))
                .filter(
                    k8scompatibility::instancetype_name
                        .eq(instancetype.to_string()),
                )
                .filter(k8scompatibility::osimage_name.eq(osimage.to_string()))
                .select((
                    K8sCompatibility::as_select(),
                    k8sversion::lifecyclestate_name,
                ))
                .load_async(&*conn)
                .await
                .map_err(server)?;
        Ok(rows
            .into_iter()
            .map(|(row, state)| compat_entry(row, state))
            .collect())
    }

    async fn osimageinstance(
        &self,
        name: &str,
    ) -> Result<Option<OsImageInstance>, Error> {
        use schema::osimageinstance::dsl;
        let conn = self.pool.claim().await?;
        dsl::osimageinstance
            .filter(dsl::osimageinstance_name.eq(name.to_string()))
            .select(OsImageInstance::as_select())
            .get_result_async(&*conn)
            .await
            .optional()
            .map_err(server)
    }

    async fn osimageinstance_by_artifact(
        &self,
        artifact: &str,
    ) -> Result<Option<OsImageInstance>, Error> {
        use schema::osimageinstance::dsl;
        let conn = self.pool.claim().await?;
        dsl::osimageinstance
            .filter(dsl::imiartifact.eq(artifact.to_string()))
            .select(OsImageInstance::as_select())
            .first_async(&*conn)
            .await
            .optional()
            .map_err(server)
    }

    async fn instance_type(
        &self,
        name: &str,
    ) -> Result<Option<InstanceType>, Error> {
        use schema::instancetype::dsl;
        let conn = self.pool.claim().await?;
        dsl::instancetype
            .filter(dsl::instancetype_name.eq(name.to_string()))
            .select(InstanceType::as_select())
            .get_result_async(&*conn)
            .await
            .optional()
            .map_err(server)
    }

    async fn default_addons(
        &self,
        k8sversion: &str,
    ) -> Result<Vec<AddonVersion>, Error> {
        use schema::{addoncompatibilityk8s, addonversion};
        let conn = self.pool.claim().await?;
        addonversion::table
            .inner_join(addoncompatibilityk8s::table)
            .filter(
                addoncompatibilityk8s::k8sversion_name
                    .eq(k8sversion.to_string()),
            )
            .filter(
                addonversion::lifecyclestate_name.eq(LifecycleState::Active),
            )
            .order(addonversion::addonversion_name.asc())
            .select(AddonVersion::as_select())
            .load_async(&*conn)
            .await
            .map_err(server)
    }
}
