//! Structural validation of raw storage payloads.
//!
//! Validators never fail: problems are collected as human-readable strings in a
//! [`ValidationReport`]. Format detection is an explicit decode into
//! [`DataFormat`] based on discriminator keys.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value};
use tabox_core::keys::{self, APP_METADATA, COLLECTIONS_INDEX, TABS_ARRAY, USER_SETTINGS};
use tabox_core::TaboxError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub collection_count: usize,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>, collection_count: usize) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            collection_count,
        }
    }
}

/// Storage shapes recognized by [`detect_and_validate_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// `collections_index` + `app_metadata` + `collection_<uid>` bodies
    Document,
    /// `{tabsArray: Collection[]}`
    Array,
    Empty,
    Invalid,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Document => "document",
            DataFormat::Array => "array",
            DataFormat::Empty => "empty",
            DataFormat::Invalid => "invalid",
        }
    }
}

/// How the document-format index is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexShape {
    /// A plain list of uids
    UidList,
    /// uid → metadata, as written by the indexed store
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatInfo {
    pub collection_count: usize,
    pub version: Option<String>,
    pub index_shape: Option<IndexShape>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatDetection {
    pub format: DataFormat,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub info: FormatInfo,
}

impl FormatDetection {
    /// Converts a failed detection into [`TaboxError::Validation`].
    pub fn ensure_valid(self) -> tabox_core::Result<Self> {
        if self.is_valid {
            Ok(self)
        } else {
            Err(TaboxError::Validation(self.errors))
        }
    }
}

/// Checks one raw collection object.
pub fn validate_collection(collection: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    let Some(obj) = collection.as_object() else {
        return ValidationReport::from_errors(vec!["collection is not an object".to_string()], 0);
    };

    if !obj.get("uid").is_some_and(Value::is_string) {
        errors.push("missing or non-string uid".to_string());
    }
    if !obj.get("name").is_some_and(Value::is_string) {
        errors.push("missing or non-string name".to_string());
    }
    match obj.get("tabs") {
        Some(Value::Array(tabs)) => {
            for (i, tab) in tabs.iter().enumerate() {
                if !tab.get("uid").is_some_and(Value::is_string) {
                    errors.push(format!("tab {} missing uid", i));
                }
                if !tab.get("url").is_some_and(Value::is_string) {
                    errors.push(format!("tab {} missing url", i));
                }
            }
        }
        _ => errors.push("tabs is not an array".to_string()),
    }
    match obj.get("chromeGroups") {
        None | Some(Value::Null) | Some(Value::Array(_)) => {}
        Some(_) => errors.push("chromeGroups is not an array".to_string()),
    }
    match obj.get("type") {
        None | Some(Value::Null) => {}
        Some(Value::String(t)) if t == "collection" => {}
        Some(other) => errors.push(format!("type is {} instead of \"collection\"", other)),
    }

    ValidationReport::from_errors(errors, 1)
}

fn label(collection: &Value, index: usize) -> String {
    match collection.get("name").and_then(Value::as_str) {
        Some(name) => format!("collection {} ({:?})", index, name),
        None => format!("collection {}", index),
    }
}

/// Checks a `{tabsArray: [...]}` payload, including uid uniqueness.
pub fn validate_array_format(data: &Map<String, Value>) -> ValidationReport {
    let Some(raw) = data.get(TABS_ARRAY) else {
        return ValidationReport::from_errors(vec![format!("{} is missing", TABS_ARRAY)], 0);
    };
    let Some(collections) = raw.as_array() else {
        return ValidationReport::from_errors(vec![format!("{} is not an array", TABS_ARRAY)], 0);
    };

    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (i, collection) in collections.iter().enumerate() {
        let report = validate_collection(collection);
        errors.extend(
            report
                .errors
                .into_iter()
                .map(|e| format!("{}: {}", label(collection, i), e)),
        );
        if let Some(uid) = collection.get("uid").and_then(Value::as_str) {
            if !seen.insert(uid) {
                errors.push(format!("duplicate uid {:?}", uid));
            }
        }
    }
    ValidationReport::from_errors(errors, collections.len())
}

/// Uids listed by a document-format index, with its shape.
pub fn index_uids(index: &Value) -> Option<(IndexShape, Vec<String>)> {
    match index {
        Value::Array(items) => {
            let uids: Option<Vec<String>> = items.iter().map(|v| v.as_str().map(str::to_string)).collect();
            uids.map(|u| (IndexShape::UidList, u))
        }
        Value::Object(map) => Some((IndexShape::Metadata, map.keys().cloned().collect())),
        _ => None,
    }
}

/// Checks a document-format payload: index, metadata, settings and every body.
pub fn validate_document_format(data: &Map<String, Value>) -> ValidationReport {
    let mut errors = Vec::new();

    match data.get(APP_METADATA) {
        Some(Value::Object(meta)) => {
            if !meta.get("version").is_some_and(Value::is_string) {
                errors.push("app_metadata.version is missing".to_string());
            }
            if !meta.get("lastUpdated").is_some_and(Value::is_number) {
                errors.push("app_metadata.lastUpdated is missing".to_string());
            }
        }
        Some(_) => errors.push("app_metadata is not an object".to_string()),
        None => errors.push("app_metadata is missing".to_string()),
    }
    match data.get(USER_SETTINGS) {
        None | Some(Value::Object(_)) => {}
        Some(_) => errors.push("user_settings is not an object".to_string()),
    }

    let Some(index) = data.get(COLLECTIONS_INDEX) else {
        errors.push("collections_index is missing".to_string());
        return ValidationReport::from_errors(errors, 0);
    };
    let Some((_, uids)) = index_uids(index) else {
        errors.push("collections_index is neither a uid list nor a uid map".to_string());
        return ValidationReport::from_errors(errors, 0);
    };

    for uid in &uids {
        match data.get(&keys::collection_key(uid)) {
            None => errors.push(format!("index entry {} has no body", uid)),
            Some(body) => {
                let report = validate_collection(body);
                errors.extend(report.errors.into_iter().map(|e| format!("collection {}: {}", uid, e)));
                if body.get("uid").and_then(Value::as_str).is_some_and(|u| u != uid.as_str()) {
                    errors.push(format!("collection {}: body uid does not match its key", uid));
                }
            }
        }
    }
    ValidationReport::from_errors(errors, uids.len())
}

fn has_user_data(data: &Map<String, Value>) -> bool {
    data.keys().any(|k| {
        k == TABS_ARRAY || k == COLLECTIONS_INDEX || k == APP_METADATA || keys::collection_uid(k).is_some()
    })
}

/// Detects the storage shape and validates it.
///
/// Document shape is checked first, then array shape. A payload with neither and
/// no collection data at all is empty; anything else is invalid.
pub fn detect_and_validate_format(data: &Map<String, Value>) -> FormatDetection {
    let version = data
        .get(APP_METADATA)
        .and_then(|m| m.get("version"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if data.contains_key(COLLECTIONS_INDEX) && data.contains_key(APP_METADATA) {
        let report = validate_document_format(data);
        let index_shape = data.get(COLLECTIONS_INDEX).and_then(index_uids).map(|(s, _)| s);
        return FormatDetection {
            format: DataFormat::Document,
            is_valid: report.is_valid,
            errors: report.errors,
            info: FormatInfo {
                collection_count: report.collection_count,
                version,
                index_shape,
            },
        };
    }

    if data.contains_key(TABS_ARRAY) {
        let report = validate_array_format(data);
        return FormatDetection {
            format: DataFormat::Array,
            is_valid: report.is_valid,
            errors: report.errors,
            info: FormatInfo {
                collection_count: report.collection_count,
                version,
                index_shape: None,
            },
        };
    }

    if !has_user_data(data) {
        return FormatDetection {
            format: DataFormat::Empty,
            is_valid: true,
            errors: Vec::new(),
            info: FormatInfo {
                collection_count: 0,
                version,
                index_shape: None,
            },
        };
    }

    FormatDetection {
        format: DataFormat::Invalid,
        is_valid: false,
        errors: vec!["data matches no known storage format".to_string()],
        info: FormatInfo {
            collection_count: 0,
            version,
            index_shape: None,
        },
    }
}

/// True iff the payload is in a known format and validates.
pub fn is_data_safe(data: &Map<String, Value>) -> bool {
    detect_and_validate_format(data).is_valid
}
