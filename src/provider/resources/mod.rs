//! Managed resources
//!
//! One module per PowerStore entity type. Every resource follows the same
//! lifecycle: create, then read back by id; update after the immutability
//! checks, then read back; delete; import by id.

pub mod filesystem;
pub mod filesystem_snapshot;
pub mod host;
pub mod hostgroup;
pub mod nfs_export;
pub mod protectionpolicy;
pub mod replication_rule;
pub mod smb_share;
pub mod snapshotrule;
pub mod storagecontainer;
pub mod volume;
pub mod volume_snapshot;
pub mod volumegroup;
pub mod volumegroup_snapshot;

pub use filesystem::FileSystemResource;
pub use filesystem_snapshot::FileSystemSnapshotResource;
pub use host::HostResource;
pub use hostgroup::HostGroupResource;
pub use nfs_export::NfsExportResource;
pub use protectionpolicy::ProtectionPolicyResource;
pub use replication_rule::ReplicationRuleResource;
pub use smb_share::SmbShareResource;
pub use snapshotrule::SnapshotRuleResource;
pub use storagecontainer::StorageContainerResource;
pub use volume::VolumeResource;
pub use volume_snapshot::VolumeSnapshotResource;
pub use volumegroup::VolumeGroupResource;
pub use volumegroup_snapshot::VolumeGroupSnapshotResource;

use crate::error::Error;
use std::collections::BTreeSet;

/// Error texts of one entity kind
#[derive(Debug, Clone, Copy)]
pub(crate) struct Messages(pub &'static str);

impl Messages {
    pub fn create(&self, err: &Error) -> Error {
        Error::operation(
            format!("Error creating {}", self.0),
            &format!("Could not create {}, unexpected error: ", self.0),
            err,
        )
    }

    pub fn created_refresh(&self, err: &Error) -> Error {
        Error::refresh(
            format!("Error getting {} after creation", self.0),
            &format!("Could not get {}, unexpected error: ", self.0),
            err,
        )
    }

    /// A vanished entity stays a not-found error so the caller can drop it
    pub fn read(&self, id: &str, err: Error) -> Error {
        if err.is_not_found() {
            return err;
        }
        Error::operation(
            format!("Error reading {}", self.0),
            &format!("Could not read {} with error {}: ", self.0, id),
            &err,
        )
    }

    pub fn update(&self, id: &str, err: &Error) -> Error {
        Error::operation(
            format!("Error updating {}", self.0),
            &format!("Could not update {} {}: ", self.0, id),
            err,
        )
    }

    pub fn updated_refresh(&self, err: &Error) -> Error {
        Error::refresh(
            format!("Error getting {} after update", self.0),
            &format!("Could not get {}, unexpected error: ", self.0),
            err,
        )
    }

    pub fn delete(&self, id: &str, err: &Error) -> Error {
        Error::operation(
            format!("Error deleting {}", self.0),
            &format!("Could not delete {} {}: ", self.0, id),
            err,
        )
    }

    /// Rejected update of an attribute the array cannot change
    pub fn immutable(&self, detail: impl Into<String>) -> Error {
        Error::validation(format!("Error updating {}", self.0), detail)
    }
}

/// Identifier recorded in state
pub(crate) fn id_of(id: &Option<String>) -> &str {
    id.as_deref().unwrap_or_default()
}

/// The plan knows a value and it differs from state
pub(crate) fn changed<T: PartialEq>(planned: &Option<T>, current: &Option<T>) -> bool {
    planned.is_some() && planned != current
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.is_empty())
}

pub(crate) fn non_empty_str(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}

/// Array timestamps carry a `+00:00` offset, state uses `Z`
pub(crate) fn expiration_to_state(raw: Option<String>) -> Option<String> {
    let raw = raw.filter(|ts| !ts.is_empty())?;
    let base = raw
        .strip_suffix("+00:00")
        .or_else(|| raw.strip_suffix('Z'))
        .unwrap_or(&raw);
    let base = base.split('.').next().unwrap_or(base);
    Some(format!("{}Z", base))
}

/// Elements of `desired` missing from `current`, and the reverse
pub(crate) fn diff_ids(current: &[String], desired: &[String]) -> (Vec<String>, Vec<String>) {
    let current: BTreeSet<&String> = current.iter().collect();
    let desired: BTreeSet<&String> = desired.iter().collect();
    let add = desired.difference(&current).map(|s| s.to_string()).collect();
    let remove = current.difference(&desired).map(|s| s.to_string()).collect();
    (add, remove)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiration_to_state() {
        assert_eq!(
            expiration_to_state(Some("2030-01-01T10:00:00+00:00".into())).as_deref(),
            Some("2030-01-01T10:00:00Z")
        );
        assert_eq!(
            expiration_to_state(Some("2030-01-01T10:00:00.123+00:00".into())).as_deref(),
            Some("2030-01-01T10:00:00Z")
        );
        assert_eq!(expiration_to_state(Some(String::new())), None);
        assert_eq!(expiration_to_state(None), None);
    }

    #[test]
    fn test_diff_ids() {
        let current = vec!["a".to_string(), "b".to_string()];
        let desired = vec!["b".to_string(), "c".to_string()];
        let (add, remove) = diff_ids(&current, &desired);
        assert_eq!(add, vec!["c".to_string()]);
        assert_eq!(remove, vec!["a".to_string()]);
    }

    #[test]
    fn test_read_keeps_not_found() {
        let missing = Error::NotFound {
            kind: "file_system".into(),
            id: "x".into(),
        };
        assert!(Messages("file system").read("x", missing).is_not_found());

        let failed = Messages("file system").read(
            "x",
            Error::Api {
                status: 500,
                message: "boom".into(),
            },
        );
        assert_eq!(failed.summary(), "Error reading file system");
        assert!(failed.detail().starts_with("Could not read file system with error x: "));
    }
}
