//! Persisted key layout.
//!
//! Every piece of state lives under a well-known key (or key prefix) in the
//! host key-value store. Classification helpers tell data keys apart from
//! bookkeeping so backups never snapshot other backups.

/// Legacy array-format payload (pre-4.0).
pub const TABS_ARRAY: &str = "tabsArray";
pub const COLLECTIONS_INDEX: &str = "collections_index";
pub const COLLECTION_PREFIX: &str = "collection_";
pub const FOLDERS_INDEX: &str = "folders_index";
pub const FOLDER_PREFIX: &str = "folder_";
pub const APP_METADATA: &str = "app_metadata";
pub const USER_SETTINGS: &str = "user_settings";
pub const LEGACY_BACKUP: &str = "_legacy_backup";
pub const COLOR_SYSTEM_VERSION: &str = "colorSystemVersion";

pub const SCHEMA_VERSION: &str = "tabox_schema_version";
pub const SCHEMA_VERSION_UPDATED: &str = "tabox_schema_version_updated";
pub const MIGRATION_LOCK: &str = "migration_lock";
pub const MIGRATION_HISTORY: &str = "migration_history";
pub const ROLLBACK_CHAIN_PREFIX: &str = "rollback_chain_";

/// Backup arrays that older releases kept next to `tabsArray`.
pub const LEGACY_BACKUP_ARRAYS: &[&str] = &["autoBackups", "localBackups"];

const BACKUP_INFIX: &str = "_backup_";
const MINIMAL_INFIX: &str = "_backup_minimal_";

pub fn collection_key(uid: &str) -> String {
    format!("{}{}", COLLECTION_PREFIX, uid)
}

pub fn folder_key(uid: &str) -> String {
    format!("{}{}", FOLDER_PREFIX, uid)
}

pub fn rollback_chain_key(chain_id: &str) -> String {
    format!("{}{}", ROLLBACK_CHAIN_PREFIX, chain_id)
}

/// `<TYPE>_backup_<timestamp>` or `<TYPE>_backup_minimal_<timestamp>`.
pub fn backup_key(backup_type: &str, timestamp: i64, minimal: bool) -> String {
    let infix = if minimal { MINIMAL_INFIX } else { BACKUP_INFIX };
    format!("{}{}{}", backup_type, infix, timestamp)
}

/// Parses a backup key into `(type, timestamp, minimal)`.
pub fn parse_backup_key(key: &str) -> Option<(&str, i64, bool)> {
    if let Some(pos) = key.rfind(MINIMAL_INFIX) {
        let ts = key[pos + MINIMAL_INFIX.len()..].parse().ok()?;
        return Some((&key[..pos], ts, true));
    }
    let pos = key.rfind(BACKUP_INFIX)?;
    let ts = key[pos + BACKUP_INFIX.len()..].parse().ok()?;
    Some((&key[..pos], ts, false))
}

pub fn is_backup_key(key: &str) -> bool {
    parse_backup_key(key).is_some()
}

/// Uid of a collection body key, or `None` for anything else (including the index).
pub fn collection_uid(key: &str) -> Option<&str> {
    if key == COLLECTIONS_INDEX {
        return None;
    }
    key.strip_prefix(COLLECTION_PREFIX)
}

pub fn folder_uid(key: &str) -> Option<&str> {
    if key == FOLDERS_INDEX {
        return None;
    }
    key.strip_prefix(FOLDER_PREFIX)
}

/// Keys owned by the backup engine and the migration coordinator's lock.
///
/// These are never part of a backup payload and never touched by a restore.
pub fn is_bookkeeping_key(key: &str) -> bool {
    key == MIGRATION_LOCK || key.starts_with(ROLLBACK_CHAIN_PREFIX) || is_backup_key(key)
}

/// Keys that hold user data proper; a minimal backup keeps only these.
pub fn is_essential_key(key: &str) -> bool {
    matches!(
        key,
        TABS_ARRAY
            | COLLECTIONS_INDEX
            | FOLDERS_INDEX
            | APP_METADATA
            | SCHEMA_VERSION
            | SCHEMA_VERSION_UPDATED
            | COLOR_SYSTEM_VERSION
    ) || collection_uid(key).is_some()
        || folder_uid(key).is_some()
}
