// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structures stored to the database.

mod addon;
mod cluster;
mod nodegroup;
mod reference;
pub mod schema;
mod storage;
mod vip;

pub use addon::*;
pub use cluster::*;
pub use nodegroup::*;
pub use reference::*;
pub use storage::*;
pub use vip::*;

/// Returned when a stored or reported string does not name a known variant
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {type_name} value: {value:?}")]
pub struct UnknownVariant {
    pub type_name: &'static str,
    pub value: String,
}

/// This macro implements serialization and deserialization of a state-like
/// enum stored in a `Text` column.  See [`ClusterState`] for a sample usage.
///
/// Every variant is paired with the exact string written to the database,
/// which is also the string the operator reports and the serde
/// representation.
macro_rules! impl_text_enum {
    (
        $(#[$model_meta:meta])*
        pub enum $model_type:ident;

        $($enum_item:ident => $sql_value:literal)+
    ) => {
        $(#[$model_meta])*
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::diesel::AsExpression,
            ::diesel::FromSqlRow,
            ::serde::Serialize,
            ::serde::Deserialize,
            ::strum::EnumIter,
        )]
        #[diesel(sql_type = ::diesel::sql_types::Text)]
        pub enum $model_type {
            $(
                #[serde(rename = $sql_value)]
                $enum_item,
            )*
        }

        impl $model_type {
            /// Returns the string stored in the database for this value
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(
                    $model_type::$enum_item => $sql_value,
                    )*
                }
            }
        }

        impl ::std::fmt::Display for $model_type {
            fn fmt(
                &self,
                f: &mut ::std::fmt::Formatter<'_>,
            ) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $model_type {
            type Err = $crate::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(
                    $sql_value => Ok($model_type::$enum_item),
                    )*
                    other => Err($crate::UnknownVariant {
                        type_name: stringify!($model_type),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ::diesel::serialize::ToSql<
            ::diesel::sql_types::Text,
            ::diesel::pg::Pg,
        > for $model_type {
            fn to_sql<'a>(
                &'a self,
                out: &mut ::diesel::serialize::Output<'a, '_, ::diesel::pg::Pg>,
            ) -> ::diesel::serialize::Result {
                use ::std::io::Write;
                out.write_all(self.as_str().as_bytes())?;
                Ok(::diesel::serialize::IsNull::No)
            }
        }

        impl ::diesel::deserialize::FromSql<
            ::diesel::sql_types::Text,
            ::diesel::pg::Pg,
        > for $model_type {
            fn from_sql(
                bytes: <::diesel::pg::Pg as ::diesel::backend::Backend>
                    ::RawValue<'_>,
            ) -> ::diesel::deserialize::Result<Self> {
                let s = ::std::str::from_utf8(bytes.as_bytes())?;
                Ok(s.parse::<$model_type>()?)
            }
        }
    }
}

pub(crate) use impl_text_enum;

impl_text_enum! {
    /// Lifecycle of reference data rows (versions, images, compatibility)
    pub enum LifecycleState;

    Active => "Active"
    Staged => "Staged"
    Archived => "Archived"
}
