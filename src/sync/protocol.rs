//! Wire-level vocabulary for talking to a bridge server: action tags,
//! parameter and header names, lock-error tag mapping, and version
//! comparison for capability gates.

use std::cmp::Ordering;

use crate::errors::LockError;

// Request parameters.
pub const ACTION_PARAM: &str = "action";
pub const NAME_PARAM: &str = "name";
pub const USER_NAME_PARAM: &str = "userName";
pub const USER_ID_PARAM: &str = "userId";
pub const ENABLED_PARAM: &str = "enabled";
pub const QUALIFIER_PARAM: &str = "qualifier";
pub const SOURCE_ID_PARAM: &str = "sourceId";
pub const LOCK_DATA_PARAM: &str = "lockData";

// Action tags.
pub const HASHCODE_ACTION: &str = "hashcode";
pub const LIST_ACTION: &str = "list";
pub const DOWNLOAD_ACTION: &str = "download";
pub const UPLOAD_ACTION: &str = "upload";
pub const DELETE_ACTION: &str = "delete";
pub const ACQUIRE_LOCK_ACTION: &str = "acquireLock";
pub const PING_LOCK_ACTION: &str = "pingLock";
pub const ASSERT_LOCK_ACTION: &str = "assertLock";
pub const RELEASE_LOCK_ACTION: &str = "releaseLock";
pub const RESUME_OFFLINE_LOCK_ACTION: &str = "resumeOfflineLock";
pub const SET_OFFLINE_LOCK_ACTION: &str = "setOfflineLockEnabled";
pub const NEW_COLLECTION_ACTION: &str = "newCollection";
pub const BACKUP_ACTION: &str = "backup";
pub const GET_BACKUP_ACTION: &str = "getBackup";
pub const LOCATION_TOKEN_ACTION: &str = "getLocationToken";
pub const SESSION_INQUIRY_ACTION: &str = "sessionStatus";

// Response headers.
pub const LOCK_ERROR_HEADER: &str = "X-Bridge-Lock-Error";
pub const SERVER_VERSION_HEADER: &str = "X-Bridge-Version";
pub const OFFLINE_STATUS_HEADER: &str = "X-Bridge-Offline-Lock";

// Lock-error tags the server may place in the lock-error header. Tags may
// carry a detail after a colon (e.g. the owner's name).
pub const ALREADY_LOCKED_TAG: &str = "alreadyLocked";
pub const NOT_LOCKED_TAG: &str = "notLocked";
pub const OFFLINE_LOCK_LOST_TAG: &str = "offlineLockLost";
pub const LOCK_UNCERTAIN_TAG: &str = "lockUncertain";

/// GET requests whose full URL would exceed this many characters are sent
/// as POST form bodies instead.
pub const MAX_GET_URL_LENGTH: usize = 512;

/// Servers at or above this version accept ZIP-bundled uploads.
pub const MIN_ZIP_UPLOAD_VERSION: &str = "3.6.9";

/// Longest user id sent to the server. Longer ids are cut to 14 characters
/// plus a trailing `*`.
pub const MAX_USER_ID_LENGTH: usize = 15;

/// Whether the server-side offline lock is engaged for this client, as
/// reported in the offline-status response header on lock actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineLockStatus {
    /// No server lock is held, so offline mode is moot.
    NotLocked,
    Enabled,
    Disabled,
    /// The server predates offline locking and never sends the header.
    Unsupported,
}

/// Parse the offline-status header from a lock response. A missing header
/// means the server does not speak offline locking at all.
pub fn offline_status_from_header(value: Option<&str>) -> OfflineLockStatus {
    match value.map(str::trim) {
        Some("NotLocked") => OfflineLockStatus::NotLocked,
        Some("Enabled") => OfflineLockStatus::Enabled,
        Some("Disabled") => OfflineLockStatus::Disabled,
        _ => OfflineLockStatus::Unsupported,
    }
}

/// Map a lock-error header value onto the typed taxonomy. The tag set is
/// closed; anything unrecognized becomes [`LockError::Rejected`] so new
/// server-side failure modes degrade loudly rather than silently.
pub fn lock_error_from_tag(value: &str) -> LockError {
    let (tag, detail) = match value.split_once(':') {
        Some((t, d)) => (t.trim(), Some(d.trim())),
        None => (value.trim(), None),
    };
    match tag {
        ALREADY_LOCKED_TAG => LockError::AlreadyLocked {
            owner: detail.filter(|d| !d.is_empty()).map(str::to_string),
        },
        NOT_LOCKED_TAG => LockError::NotLocked,
        OFFLINE_LOCK_LOST_TAG => LockError::OfflineLockLost {
            last_sync: detail.and_then(|d| d.parse().ok()),
        },
        LOCK_UNCERTAIN_TAG => {
            LockError::Uncertain(detail.unwrap_or("reported by server").to_string())
        }
        other => LockError::Rejected(other.to_string()),
    }
}

/// Cut a user id down to the wire limit, marking the truncation.
pub fn truncated_user_id(full: &str) -> String {
    if full.chars().count() <= MAX_USER_ID_LENGTH {
        return full.to_string();
    }
    let mut cut: String = full.chars().take(MAX_USER_ID_LENGTH - 1).collect();
    cut.push('*');
    cut
}

/// Compare dotted version strings component-wise, numerically where the
/// components are numeric. `"3.10.0"` sorts above `"3.6.9"`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    normalize_version(a).cmp(&normalize_version(b))
}

/// Whether `version` satisfies a minimum-version capability gate.
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    compare_versions(version, minimum) != Ordering::Less
}

/// Zero-pad each dotted component to a fixed width so lexicographic
/// comparison matches numeric comparison.
fn normalize_version(v: &str) -> String {
    v.split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            format!("{:0>5}", digits)
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_comparison_is_numeric_per_component() {
        assert!(version_at_least("3.10.0", "3.6.9"));
        assert!(version_at_least("3.6.9", "3.6.9"));
        assert!(!version_at_least("3.6.8", "3.6.9"));
        assert!(!version_at_least("2.99", "3.0"));
        assert!(version_at_least("4", "3.6.9"));
    }

    #[test]
    fn version_tolerates_suffixes() {
        assert!(version_at_least("3.7.0-beta", "3.6.9"));
    }

    #[test]
    fn lock_error_tags_map_to_taxonomy() {
        match lock_error_from_tag("alreadyLocked: alice") {
            LockError::AlreadyLocked { owner } => assert_eq!(owner.as_deref(), Some("alice")),
            other => panic!("{other:?}"),
        }
        assert!(matches!(
            lock_error_from_tag("notLocked"),
            LockError::NotLocked
        ));
        match lock_error_from_tag("offlineLockLost: 12345") {
            LockError::OfflineLockLost { last_sync } => assert_eq!(last_sync, Some(12345)),
            other => panic!("{other:?}"),
        }
        assert!(matches!(
            lock_error_from_tag("lockUncertain"),
            LockError::Uncertain(_)
        ));
    }

    #[test]
    fn unknown_tag_is_rejected_not_misfiled() {
        match lock_error_from_tag("somethingNew: details") {
            LockError::Rejected(tag) => assert_eq!(tag, "somethingNew"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn offline_status_header_parsing() {
        assert_eq!(
            offline_status_from_header(Some("Enabled")),
            OfflineLockStatus::Enabled
        );
        assert_eq!(
            offline_status_from_header(Some("Disabled")),
            OfflineLockStatus::Disabled
        );
        assert_eq!(
            offline_status_from_header(Some("NotLocked")),
            OfflineLockStatus::NotLocked
        );
        assert_eq!(
            offline_status_from_header(None),
            OfflineLockStatus::Unsupported
        );
        assert_eq!(
            offline_status_from_header(Some("garbage")),
            OfflineLockStatus::Unsupported
        );
    }

    #[test]
    fn user_id_truncation() {
        assert_eq!(truncated_user_id("short"), "short");
        assert_eq!(truncated_user_id("exactly15chars!"), "exactly15chars!");
        assert_eq!(truncated_user_id("definitely.too.long.id"), "definitely.too*");
        assert_eq!(truncated_user_id("definitely.too.long.id").len(), 15);
    }
}
