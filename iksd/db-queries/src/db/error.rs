// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling and conversions.

use diesel::result::DatabaseErrorInformation;
use diesel::result::DatabaseErrorKind as DieselErrorKind;
use diesel::result::Error as DieselError;
use iks_common::api::external::{
    Error as PublicError, LookupType, ResourceType,
};
use slog::Logger;

/// Summarizes details provided with a database error.
fn format_database_error(
    kind: DieselErrorKind,
    info: &dyn DatabaseErrorInformation,
) -> String {
    let mut rv =
        format!("database error (kind = {:?}): {}\n", kind, info.message());
    if let Some(details) = info.details() {
        rv.push_str(&format!("DETAILS: {}\n", details));
    }
    if let Some(hint) = info.hint() {
        rv.push_str(&format!("HINT: {}\n", hint));
    }
    if let Some(table_name) = info.table_name() {
        rv.push_str(&format!("TABLE NAME: {}\n", table_name));
    }
    if let Some(column_name) = info.column_name() {
        rv.push_str(&format!("COLUMN NAME: {}\n", column_name));
    }
    if let Some(constraint_name) = info.constraint_name() {
        rv.push_str(&format!("CONSTRAINT NAME: {}\n", constraint_name));
    }
    rv
}

/// Allows the caller to handle user-facing errors, and provide additional
/// context which may be used to populate more informative errors.
///
/// Note that all operations may return server-level errors for a variety of
/// reasons, including being unable to contact the database, I/O errors, etc.
pub enum ErrorHandler<'a> {
    /// The operation expected to fetch, update, or delete exactly one resource
    /// identified by the given lookup.  If that row is not found, an
    /// appropriate "Not Found" error will be returned.
    NotFoundByLookup(ResourceType, LookupType),
    /// The operation was attempting to insert a row with the given name.  If a
    /// unique constraint is violated, "ObjectAlreadyExists" is returned.
    Conflict(ResourceType, &'a str),
    /// The operation does not expect any user errors.
    Server,
}

/// Converts a Diesel error to an external error.
///
/// Handles a variety of cases, and leaves the handler to decide whether
/// "Not Found" and "Conflict" are client errors or server errors.
pub fn public_error_from_diesel(
    error: DieselError,
    handler: ErrorHandler<'_>,
) -> PublicError {
    match handler {
        ErrorHandler::NotFoundByLookup(resource_type, lookup_type) => {
            match error {
                DieselError::NotFound => {
                    lookup_type.into_not_found(resource_type)
                }
                _ => public_error_from_diesel_server(error),
            }
        }
        ErrorHandler::Conflict(resource_type, object_name) => match error {
            DieselError::DatabaseError(
                DieselErrorKind::UniqueViolation,
                _,
            ) => PublicError::ObjectAlreadyExists {
                type_name: resource_type,
                object_name: object_name.to_string(),
            },
            _ => public_error_from_diesel_server(error),
        },
        ErrorHandler::Server => public_error_from_diesel_server(error),
    }
}

fn public_error_from_diesel_server(error: DieselError) -> PublicError {
    match error {
        DieselError::DatabaseError(kind, info) => {
            PublicError::internal_error(&format_database_error(kind, &*info))
        }
        error => PublicError::internal_error(&format!(
            "Unknown diesel error: {:?}",
            error
        )),
    }
}

/// Tenant-facing verbs, each with its own generic failure message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TenantOp {
    Create,
    Delete,
    Update,
    Read,
}

impl TenantOp {
    pub fn message(&self) -> &'static str {
        match self {
            TenantOp::Create => "Could not create Cluster. Please try again.",
            TenantOp::Delete => "Could not delete Cluster. Please try again.",
            TenantOp::Update => "Could not update Cluster. Please try again.",
            TenantOp::Read => "Could not get Cluster. Please try again.",
        }
    }
}

/// Keeps server-side detail out of tenant-visible errors
///
/// Client errors (not found, conflicts, failed preconditions, quota) pass
/// through unchanged.  Anything else is logged in full and replaced by the
/// generic message for `op`.
pub struct TenantSafe<'a> {
    log: &'a Logger,
    op: TenantOp,
}

impl<'a> TenantSafe<'a> {
    pub fn new(log: &'a Logger, op: TenantOp) -> TenantSafe<'a> {
        TenantSafe { log, op }
    }

    pub fn wrap(&self, call: &'static str, error: PublicError) -> PublicError {
        if error.is_client_error() {
            return error;
        }
        error!(
            self.log,
            "database operation failed";
            "failed_call" => call,
            "error" => %error,
        );
        PublicError::internal_error(self.op.message())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use iks_test_utils::dev;

    #[test]
    fn test_not_found_handler() {
        let error = public_error_from_diesel(
            DieselError::NotFound,
            ErrorHandler::NotFoundByLookup(
                ResourceType::Cluster,
                LookupType::ByUniqueId("cl-abcdefghij".to_string()),
            ),
        );
        assert_eq!(error.to_string(), "Cluster not found: cl-abcdefghij");

        let error = public_error_from_diesel(
            DieselError::NotFound,
            ErrorHandler::Server,
        );
        assert_matches!(error, PublicError::InternalError { .. });
    }

    #[test]
    fn test_tenant_safe() {
        let logctx = dev::test_setup_log("test_tenant_safe");
        let safe = TenantSafe::new(&logctx.log, TenantOp::Create);

        let error = safe.wrap(
            "cluster_create",
            PublicError::internal_error("relation \"cluster\" does not exist"),
        );
        assert_eq!(
            error,
            PublicError::internal_error(
                "Could not create Cluster. Please try again."
            )
        );

        let error = safe.wrap(
            "cluster_create",
            PublicError::permission_denied("Can not create more than 3"),
        );
        assert_eq!(
            error,
            PublicError::permission_denied("Can not create more than 3")
        );
        logctx.cleanup_successful();
    }
}
