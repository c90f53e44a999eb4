// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kubernetes version names
//!
//! Version names in the reference tables are not always strict semver:
//! `v1.27`, `1.27.4` and `1.28.2+rke2r1` all appear.  [`K8sVersion`] parses
//! them tolerantly and keeps the original name, which is what gets written
//! back to the database.

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid kubernetes version {name:?}: {reason}")]
pub struct VersionParseError {
    pub name: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct K8sVersion {
    name: String,
    version: semver::Version,
}

impl K8sVersion {
    /// Parses a version name.  A leading `v` is accepted, missing minor or
    /// patch components read as zero, and leading zeros are ignored.
    pub fn parse(name: &str) -> Result<K8sVersion, VersionParseError> {
        let err = |reason: &str| VersionParseError {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = name.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let split_at = trimmed
            .find(|c: char| c == '-' || c == '+')
            .unwrap_or(trimmed.len());
        let (core, suffix) = trimmed.split_at(split_at);

        let mut parts = core.split('.');
        let mut numbers = [0u64; 3];
        for (i, slot) in numbers.iter_mut().enumerate() {
            match parts.next() {
                Some(part) => {
                    *slot = part.parse().map_err(|_| {
                        err(&format!("component {} is not a number", i + 1))
                    })?;
                }
                None if i == 0 => return Err(err("empty version")),
                None => break,
            }
        }
        if parts.next().is_some() {
            return Err(err("too many components"));
        }

        let normalized =
            format!("{}.{}.{}{}", numbers[0], numbers[1], numbers[2], suffix);
        let version = semver::Version::parse(&normalized)
            .map_err(|e| err(&e.to_string()))?;
        Ok(K8sVersion { name: name.to_string(), version })
    }

    /// The name exactly as it appears in the reference tables
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn major(&self) -> u64 {
        self.version.major
    }

    pub fn minor(&self) -> u64 {
        self.version.minor
    }

    pub fn patch(&self) -> u64 {
        self.version.patch
    }

    /// Build metadata such as `rke2r1`, empty if none
    pub fn build(&self) -> &str {
        self.version.build.as_str()
    }

    /// `major.minor`, the form iks clusters are upgraded with
    pub fn major_minor(&self) -> String {
        format!("{}.{}", self.version.major, self.version.minor)
    }

    pub fn same_minor(&self, other: &K8sVersion) -> bool {
        self.major() == other.major() && self.minor() == other.minor()
    }

    /// True if `other` is a later patch of the same minor
    pub fn is_patch_behind(&self, other: &K8sVersion) -> bool {
        self.same_minor(other) && self.patch() < other.patch()
    }

    /// True if `other` is in a later minor
    pub fn is_minor_behind(&self, other: &K8sVersion) -> bool {
        (self.major(), self.minor()) < (other.major(), other.minor())
    }
}

impl fmt::Display for K8sVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl PartialOrd for K8sVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Build metadata does not affect precedence; the name breaks ties so that
// the ordering stays consistent with `Eq`.
impl Ord for K8sVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp_precedence(&other.version)
            .then_with(|| self.name.cmp(&other.name))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tolerant_parse() {
        let v = K8sVersion::parse("v1.27").unwrap();
        assert_eq!((v.major(), v.minor(), v.patch()), (1, 27, 0));
        assert_eq!(v.name(), "v1.27");
        assert_eq!(v.major_minor(), "1.27");

        let v = K8sVersion::parse("1.28.02+rke2r1").unwrap();
        assert_eq!((v.major(), v.minor(), v.patch()), (1, 28, 2));
        assert_eq!(v.build(), "rke2r1");
        assert_eq!(v.to_string(), "1.28.02+rke2r1");

        assert!(K8sVersion::parse("").is_err());
        assert!(K8sVersion::parse("1.x.3").is_err());
        assert!(K8sVersion::parse("1.2.3.4").is_err());
    }

    #[test]
    fn test_ordering_ignores_build() {
        let mut versions: Vec<K8sVersion> =
            ["1.28.1+rke2r1", "1.27.10", "v1.27.9", "1.28.0"]
                .into_iter()
                .map(|n| K8sVersion::parse(n).unwrap())
                .collect();
        versions.sort();
        let names: Vec<&str> = versions.iter().map(|v| v.name()).collect();
        assert_eq!(names, ["v1.27.9", "1.27.10", "1.28.0", "1.28.1+rke2r1"]);
    }

    #[test]
    fn test_relations() {
        let a = K8sVersion::parse("1.27.3").unwrap();
        let b = K8sVersion::parse("1.27.5").unwrap();
        let c = K8sVersion::parse("1.28.0").unwrap();
        assert!(a.is_patch_behind(&b));
        assert!(!b.is_patch_behind(&a));
        assert!(!a.is_patch_behind(&c));
        assert!(a.is_minor_behind(&c));
        assert!(!a.is_minor_behind(&b));
    }
}
