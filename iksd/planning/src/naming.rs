// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tenant-facing identifiers and operator resource names

use rand::Rng;
use thiserror::Error;

/// Length of the random part of a generated unique id
pub const UNIQUE_ID_LEN: usize = 10;

// Lowercase base32 alphabet.
const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniqueIdKind {
    Cluster,
    NodeGroup,
}

impl UniqueIdKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            UniqueIdKind::Cluster => "cl-",
            UniqueIdKind::NodeGroup => "ng-",
        }
    }
}

/// Generates a candidate unique id such as `cl-k3xq9mpa2b`
///
/// Uniqueness is not guaranteed; callers check the candidate against the
/// database and try again on collision.
pub fn generate_unique_id<R: Rng>(rng: &mut R, kind: UniqueIdKind) -> String {
    let mut id = String::with_capacity(kind.prefix().len() + UNIQUE_ID_LEN);
    id.push_str(kind.prefix());
    for _ in 0..UNIQUE_ID_LEN {
        let i = rng.gen_range(0..ALPHABET.len());
        id.push(char::from(ALPHABET[i]));
    }
    id
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("load balancer {name:?} does not belong to cluster {cluster_uuid:?}")]
pub struct IlbNameError {
    pub name: String,
    pub cluster_uuid: String,
}

/// Recovers the logical vip name from the name the operator reports
///
/// The operator names load balancers `<cluster uuid>-<vip name>`.
pub fn ilb_logical_name<'a>(
    reported: &'a str,
    cluster_uuid: &str,
) -> Result<&'a str, IlbNameError> {
    match reported.strip_prefix(cluster_uuid) {
        Some(rest) => Ok(rest.strip_prefix('-').unwrap_or(rest)),
        None => Err(IlbNameError {
            name: reported.to_string(),
            cluster_uuid: cluster_uuid.to_string(),
        }),
    }
}

/// Inverse of [`ilb_logical_name`]
pub fn ilb_reported_name(cluster_uuid: &str, vip_name: &str) -> String {
    format!("{cluster_uuid}-{vip_name}")
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_unique_ids() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let a = generate_unique_id(&mut rng, UniqueIdKind::Cluster);
        let b = generate_unique_id(&mut rng, UniqueIdKind::NodeGroup);
        assert!(a.starts_with("cl-"));
        assert!(b.starts_with("ng-"));
        assert_eq!(a.len(), 3 + UNIQUE_ID_LEN);
        assert!(a[3..].bytes().all(|c| ALPHABET.contains(&c)));
        assert_ne!(a[3..], b[3..]);
    }

    #[test]
    fn test_ilb_names() {
        assert_eq!(
            ilb_logical_name("cl-abcdefghij-etcd", "cl-abcdefghij"),
            Ok("etcd")
        );
        assert_eq!(
            ilb_logical_name("cl-abcdefghijapiserver", "cl-abcdefghij"),
            Ok("apiserver")
        );
        assert!(ilb_logical_name("cl-other-etcd", "cl-abcdefghij").is_err());
        assert_eq!(
            ilb_logical_name(
                &ilb_reported_name("cl-abcdefghij", "public-apiserver"),
                "cl-abcdefghij"
            ),
            Ok("public-apiserver")
        );
    }
}
