// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for the IKS control plane
//!
//! For HTTP-level error handling, see Dropshot.

use crate::api::external::ResourceType;
use dropshot::HttpError;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;

/// An error that can be generated within a control plane component
///
/// These may be generated while handling a tenant request, an operator
/// callback, or as part of background operation.  When generated as part of
/// an HTTP request, an `Error` will be converted into an HTTP error as one of
/// the last steps in processing the request.  This allows most of the system
/// to remain agnostic to the transport with which it communicates.
///
/// Where possible, reuse existing variants rather than inventing new ones to
/// distinguish cases that no programmatic consumer needs to distinguish.
#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq, Serialize)]
pub enum Error {
    /// An object needed as part of this operation was not found.
    ///
    /// This is also returned for objects that exist but belong to a different
    /// cloud account, so that their existence is never confirmed to a
    /// non-owner.
    #[error("{}", not_found_message(.type_name, .lookup_type))]
    ObjectNotFound { type_name: ResourceType, lookup_type: LookupType },
    /// An object already exists with the specified name.
    #[error("{type_name} name already in use")]
    ObjectAlreadyExists { type_name: ResourceType, object_name: String },
    /// The request was malformed.
    #[error("Invalid Request: {message}")]
    InvalidRequest { message: String },
    /// The request was well-formed, but the operation cannot be completed
    /// given the current state of the system.
    #[error("{message}")]
    FailedPrecondition { message: String },
    /// The caller may not perform this operation.  Quota violations and
    /// restricted accounts land here.
    #[error("{message}")]
    PermissionDenied { message: String },

    /// The system encountered an unhandled operational error.
    #[error("Internal Error: {internal_message}")]
    InternalError { internal_message: String },
    /// The system (or part of it) is unavailable.
    #[error("Service Unavailable: {internal_message}")]
    ServiceUnavailable { internal_message: String },
}

/// Indicates how an object was looked up (for an `ObjectNotFound` error)
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum LookupType {
    /// a tenant-facing unique id (e.g. "cl-abcdefghij") was requested
    ByUniqueId(String),
    /// a surrogate database id was requested
    ById(i32),
    /// the caller describes the failed lookup in full, and that description
    /// is the whole tenant-visible message
    Described(String),
}

impl LookupType {
    /// Returns an ObjectNotFound error appropriate for the case where this
    /// lookup failed
    pub fn into_not_found(self, type_name: ResourceType) -> Error {
        Error::ObjectNotFound { type_name, lookup_type: self }
    }
}

impl Display for LookupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupType::ByUniqueId(id) => write!(f, "{id}"),
            LookupType::ById(id) => write!(f, "{id}"),
            LookupType::Described(message) => f.write_str(message),
        }
    }
}

fn not_found_message(type_name: &ResourceType, lookup: &LookupType) -> String {
    match lookup {
        LookupType::Described(message) => message.clone(),
        _ => format!("{type_name} not found: {lookup}"),
    }
}

impl Error {
    /// Returns whether this error describes a problem with the request rather
    /// than with the system.  Client errors are safe to show to a tenant
    /// verbatim.
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::ObjectNotFound { .. }
            | Error::ObjectAlreadyExists { .. }
            | Error::InvalidRequest { .. }
            | Error::FailedPrecondition { .. }
            | Error::PermissionDenied { .. } => true,

            Error::InternalError { .. } | Error::ServiceUnavailable { .. } => {
                false
            }
        }
    }

    /// Generates an [`Error::ObjectNotFound`] error for a lookup by the
    /// tenant-facing unique id.
    pub fn not_found_by_unique_id(
        type_name: ResourceType,
        unique_id: &str,
    ) -> Error {
        LookupType::ByUniqueId(unique_id.to_owned()).into_not_found(type_name)
    }

    /// Generates an [`Error::ObjectNotFound`] error for a lookup by surrogate
    /// id.
    pub fn not_found_by_id(type_name: ResourceType, id: i32) -> Error {
        LookupType::ById(id).into_not_found(type_name)
    }

    /// Generates an [`Error::ObjectNotFound`] error whose message is exactly
    /// `message`
    pub fn not_found_described(
        type_name: ResourceType,
        message: &str,
    ) -> Error {
        LookupType::Described(message.to_owned()).into_not_found(type_name)
    }

    /// Generates an [`Error::InternalError`] error with the specific message
    ///
    /// InternalError should be used for operational conditions that should not
    /// happen but that we cannot reasonably handle at runtime (e.g.,
    /// deserializing a value from the database, or finding two records for
    /// something that is supposed to be unique).
    pub fn internal_error(internal_message: &str) -> Error {
        Error::InternalError { internal_message: internal_message.to_owned() }
    }

    /// Generates an [`Error::InvalidRequest`] error with the specific message
    ///
    /// This should be used for failures due possibly to invalid client input
    /// or malformed requests.
    pub fn invalid_request(message: &str) -> Error {
        Error::InvalidRequest { message: message.to_owned() }
    }

    /// Generates an [`Error::FailedPrecondition`] error with the specific
    /// message
    pub fn failed_precondition(message: &str) -> Error {
        Error::FailedPrecondition { message: message.to_owned() }
    }

    /// Generates an [`Error::PermissionDenied`] error with the specific
    /// message
    pub fn permission_denied(message: &str) -> Error {
        Error::PermissionDenied { message: message.to_owned() }
    }

    /// Generates an [`Error::ServiceUnavailable`] error with the specific
    /// message
    ///
    /// This should be used for transient failures where the caller might be
    /// expected to retry.  Logic errors or other problems indicating that a
    /// retry would not work should probably be an InternalError (if it's a
    /// server problem) or InvalidRequest (if it's a client problem) instead.
    pub fn unavail(message: &str) -> Error {
        Error::ServiceUnavailable { internal_message: message.to_owned() }
    }

    /// Given an [`Error`] with an internal message, return the same error with
    /// `context` prepended to it to provide more context
    ///
    /// If the error has no internal message, then it is returned unchanged.
    pub fn internal_context<C>(self, context: C) -> Error
    where
        C: Display + Send + Sync + 'static,
    {
        match self {
            Error::ObjectNotFound { .. }
            | Error::ObjectAlreadyExists { .. }
            | Error::InvalidRequest { .. }
            | Error::FailedPrecondition { .. }
            | Error::PermissionDenied { .. } => self,
            Error::InternalError { internal_message } => Error::InternalError {
                internal_message: format!("{context}: {internal_message}"),
            },
            Error::ServiceUnavailable { internal_message } => {
                let internal_message = format!("{context}: {internal_message}");
                Error::ServiceUnavailable { internal_message }
            }
        }
    }
}

impl From<Error> for HttpError {
    /// Converts an `Error` error into an `HttpError`.  This defines how
    /// errors that are represented internally using `Error` are ultimately
    /// exposed to clients over HTTP.
    fn from(error: Error) -> HttpError {
        match error {
            Error::ObjectNotFound { .. } => HttpError::for_client_error(
                Some(String::from("ObjectNotFound")),
                http::StatusCode::NOT_FOUND,
                error.to_string(),
            ),

            Error::ObjectAlreadyExists { .. } => HttpError::for_client_error(
                Some(String::from("ObjectAlreadyExists")),
                http::StatusCode::CONFLICT,
                error.to_string(),
            ),

            Error::InvalidRequest { message } => HttpError::for_bad_request(
                Some(String::from("InvalidRequest")),
                message,
            ),

            Error::FailedPrecondition { message } => {
                HttpError::for_bad_request(
                    Some(String::from("FailedPrecondition")),
                    message,
                )
            }

            // Quota errors are deliberately reported as 403 rather than 429
            // so that internal limits are not advertised as exhaustion.
            Error::PermissionDenied { message } => HttpError::for_client_error(
                Some(String::from("PermissionDenied")),
                http::StatusCode::FORBIDDEN,
                message,
            ),

            Error::InternalError { internal_message } => {
                HttpError::for_internal_error(internal_message)
            }

            Error::ServiceUnavailable { internal_message } => {
                HttpError::for_unavail(
                    Some(String::from("ServiceNotAvailable")),
                    internal_message,
                )
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::internal_error(&e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::Error;
    use super::LookupType;
    use crate::api::external::ResourceType;
    use dropshot::HttpError;

    #[test]
    fn test_internal_context() {
        let error = Error::internal_error("connection reset");
        assert_eq!(
            error.internal_context("rolling back"),
            Error::internal_error("rolling back: connection reset")
        );

        let error = Error::unavail("pool exhausted");
        assert_eq!(
            error.internal_context(format!("attempt {}", 2)),
            Error::unavail("attempt 2: pool exhausted")
        );

        // Tenant-visible variants are left alone.
        let error = Error::failed_precondition("No Upgrades Available");
        assert_eq!(
            error.internal_context("upgrade"),
            Error::failed_precondition("No Upgrades Available")
        );
    }

    #[test]
    fn test_tenant_visible_messages() {
        let error = Error::not_found_by_unique_id(
            ResourceType::Cluster,
            "cl-abcdefghij",
        );
        assert_eq!(error.to_string(), "Cluster not found: cl-abcdefghij");

        let error = Error::ObjectAlreadyExists {
            type_name: ResourceType::NodeGroup,
            object_name: String::from("ng1"),
        };
        assert_eq!(error.to_string(), "NodeGroup name already in use");

        let error = LookupType::ById(7).into_not_found(ResourceType::Vip);
        assert_eq!(error.to_string(), "Vip not found: 7");

        let error = Error::not_found_described(
            ResourceType::NodeGroup,
            "No cluster nodegroup found",
        );
        assert_eq!(error.to_string(), "No cluster nodegroup found");
    }

    #[test]
    fn test_http_status_mapping() {
        let cases = [
            (
                Error::not_found_by_unique_id(ResourceType::Cluster, "c"),
                http::StatusCode::NOT_FOUND,
            ),
            (
                Error::ObjectAlreadyExists {
                    type_name: ResourceType::Cluster,
                    object_name: String::from("c"),
                },
                http::StatusCode::CONFLICT,
            ),
            (Error::invalid_request("bad"), http::StatusCode::BAD_REQUEST),
            (
                Error::failed_precondition("nope"),
                http::StatusCode::BAD_REQUEST,
            ),
            (Error::permission_denied("quota"), http::StatusCode::FORBIDDEN),
            (
                Error::internal_error("boom"),
                http::StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (Error::unavail("later"), http::StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (error, status) in cases {
            let client = error.is_client_error();
            let http_error = HttpError::from(error);
            assert_eq!(http_error.status_code, status);
            assert_eq!(client, status.is_client_error());
        }
    }
}
