//! Schema versions, detection and migration paths.

use std::fmt;

use serde_json::{Map, Value};
use tabox_core::color::{value_needs_color_migration, CURRENT_COLOR_SYSTEM};
use tabox_core::keys::{self, COLOR_SYSTEM_VERSION, LEGACY_BACKUP_ARRAYS, SCHEMA_VERSION, TABS_ARRAY};

use crate::steps::MigrationStep;
use crate::validate::{detect_and_validate_format, DataFormat};

/// Version written to `app_metadata` and the schema marker after a full run.
pub const CURRENT_VERSION: &str = "4.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// Plain collection array
    V3_0,
    /// Collection array with auto/local backup arrays
    V3_5,
    /// 3.5 data whose colors are still hex codes
    V3_5ColorMigrationNeeded,
    /// Indexed document storage
    V4_0,
    Unknown,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V3_0 => "3.0",
            SchemaVersion::V3_5 => "3.5",
            SchemaVersion::V3_5ColorMigrationNeeded => "3.5-color-migration-needed",
            SchemaVersion::V4_0 => CURRENT_VERSION,
            SchemaVersion::Unknown => "unknown",
        }
    }

    /// Parses a stored marker. Unrecognized strings yield `None`.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "3.0" => Some(SchemaVersion::V3_0),
            "3.5" => Some(SchemaVersion::V3_5),
            "3.5-color-migration-needed" => Some(SchemaVersion::V3_5ColorMigrationNeeded),
            CURRENT_VERSION => Some(SchemaVersion::V4_0),
            _ => None,
        }
    }

    pub fn is_current(&self) -> bool {
        *self == SchemaVersion::V4_0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered steps that take data at `from` to the current version.
///
/// Deterministic; unknown data is treated as the oldest format.
pub fn calculate_migration_path(from: SchemaVersion) -> Vec<MigrationStep> {
    use MigrationStep::*;
    match from {
        SchemaVersion::V3_0 | SchemaVersion::Unknown => vec![
            EnhancedToCurrent,
            ColorMigration,
            FoldersInitialization,
            TimestampMigration,
            IndexedStorage,
        ],
        SchemaVersion::V3_5 => vec![FoldersInitialization, TimestampMigration, IndexedStorage],
        SchemaVersion::V3_5ColorMigrationNeeded => {
            vec![ColorMigration, FoldersInitialization, TimestampMigration, IndexedStorage]
        }
        SchemaVersion::V4_0 => Vec::new(),
    }
}

fn stored_collections(data: &Map<String, Value>) -> Vec<&Value> {
    let mut all: Vec<&Value> = data
        .get(TABS_ARRAY)
        .and_then(Value::as_array)
        .map(|list| list.iter().collect())
        .unwrap_or_default();
    all.extend(
        data.iter()
            .filter(|(k, _)| keys::collection_uid(k).is_some())
            .map(|(_, v)| v),
    );
    all
}

/// True if there are collections and either the color system marker is not
/// current or some stored color is not a palette name.
pub fn needs_color_migration(data: &Map<String, Value>) -> bool {
    let collections = stored_collections(data);
    if collections.is_empty() {
        return false;
    }
    let marker_current = data.get(COLOR_SYSTEM_VERSION).and_then(Value::as_str) == Some(CURRENT_COLOR_SYSTEM);
    !marker_current || collections.into_iter().any(value_needs_color_migration)
}

/// Infers the schema version of a storage payload.
///
/// A recognized schema marker wins. Otherwise the shape decides: document
/// storage is current, an array with legacy backup arrays is 3.5 (refined by
/// color state), a bare array is 3.0, and empty storage is current.
pub fn detect_current_version_from_data(data: &Map<String, Value>) -> SchemaVersion {
    if let Some(version) = data
        .get(SCHEMA_VERSION)
        .and_then(Value::as_str)
        .and_then(SchemaVersion::from_marker)
    {
        return version;
    }

    match detect_and_validate_format(data).format {
        DataFormat::Document => SchemaVersion::V4_0,
        DataFormat::Empty => SchemaVersion::V4_0,
        DataFormat::Array => {
            if LEGACY_BACKUP_ARRAYS.iter().any(|k| data.contains_key(*k)) {
                if needs_color_migration(data) {
                    SchemaVersion::V3_5ColorMigrationNeeded
                } else {
                    SchemaVersion::V3_5
                }
            } else {
                SchemaVersion::V3_0
            }
        }
        DataFormat::Invalid => SchemaVersion::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_detect_versions() {
        assert_eq!(detect_current_version_from_data(&Map::new()), SchemaVersion::V4_0);

        let bare = map(json!({"tabsArray": [{"uid": "a", "name": "A", "tabs": [], "color": "red"}]}));
        assert_eq!(detect_current_version_from_data(&bare), SchemaVersion::V3_0);

        let with_backups = map(json!({
            "tabsArray": [{"uid": "a", "name": "A", "tabs": [], "color": "red"}],
            "autoBackups": [],
            "colorSystemVersion": "2.0"
        }));
        assert_eq!(detect_current_version_from_data(&with_backups), SchemaVersion::V3_5);

        let hex = map(json!({
            "tabsArray": [{"uid": "a", "name": "A", "tabs": [], "color": "#d93025"}],
            "localBackups": []
        }));
        assert_eq!(
            detect_current_version_from_data(&hex),
            SchemaVersion::V3_5ColorMigrationNeeded
        );

        let document = map(json!({
            "collections_index": {},
            "app_metadata": {"version": "4.0", "lastUpdated": 1}
        }));
        assert_eq!(detect_current_version_from_data(&document), SchemaVersion::V4_0);

        let junk = map(json!({"collection_x": 5}));
        assert_eq!(detect_current_version_from_data(&junk), SchemaVersion::Unknown);
    }

    #[test]
    fn test_marker_wins() {
        let data = map(json!({
            "tabox_schema_version": "3.5",
            "collections_index": {},
            "app_metadata": {"version": "4.0", "lastUpdated": 1}
        }));
        assert_eq!(detect_current_version_from_data(&data), SchemaVersion::V3_5);

        let unrecognized = map(json!({"tabox_schema_version": "9.9", "tabsArray": []}));
        assert_eq!(detect_current_version_from_data(&unrecognized), SchemaVersion::V3_0);
    }

    #[test]
    fn test_migration_paths() {
        assert_eq!(calculate_migration_path(SchemaVersion::V3_0).len(), 5);
        assert_eq!(
            calculate_migration_path(SchemaVersion::Unknown),
            calculate_migration_path(SchemaVersion::V3_0)
        );
        assert_eq!(
            calculate_migration_path(SchemaVersion::V3_5)[0],
            MigrationStep::FoldersInitialization
        );
        assert_eq!(
            calculate_migration_path(SchemaVersion::V3_5ColorMigrationNeeded)[0],
            MigrationStep::ColorMigration
        );
        assert!(calculate_migration_path(SchemaVersion::V4_0).is_empty());
        for v in [SchemaVersion::V3_0, SchemaVersion::V3_5] {
            assert_eq!(
                calculate_migration_path(v).last(),
                Some(&MigrationStep::IndexedStorage)
            );
        }
    }

    #[test]
    fn test_needs_color_migration() {
        assert!(!needs_color_migration(&Map::new()));
        let marked = map(json!({
            "colorSystemVersion": "2.0",
            "collection_a": {"uid": "a", "name": "A", "tabs": [], "color": "blue"}
        }));
        assert!(!needs_color_migration(&marked));

        let unmarked = map(json!({"collection_a": {"uid": "a", "name": "A", "tabs": [], "color": "blue"}}));
        assert!(needs_color_migration(&unmarked));
    }
}
