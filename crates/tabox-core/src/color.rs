//! Named color palette and the mapping from legacy hex colors onto it.
//!
//! Collections and groups used to store arbitrary hex strings. The current
//! color system stores one of the browser's tab-group color names instead.
//! [`migrate_color`] is pure and idempotent: its output is always a palette
//! name, and palette names map to themselves.

use serde_json::Value;

use crate::Collection;

/// Fallback for anything that cannot be mapped.
pub const DEFAULT_COLOR: &str = "default";

/// Every color name the current color system accepts.
pub const PALETTE: &[&str] = &[
    DEFAULT_COLOR,
    "grey",
    "blue",
    "red",
    "yellow",
    "green",
    "pink",
    "purple",
    "cyan",
    "orange",
];

/// Version written to `colorSystemVersion` once colors are migrated.
pub const CURRENT_COLOR_SYSTEM: &str = "2.0";

/// Hex codes the old color picker offered, lowercase without `#`.
const LEGACY_HEX: &[(&str, &str)] = &[
    ("1a73e8", "blue"),
    ("4285f4", "blue"),
    ("d93025", "red"),
    ("ea4335", "red"),
    ("f9ab00", "yellow"),
    ("fbbc04", "yellow"),
    ("188038", "green"),
    ("34a853", "green"),
    ("d01884", "pink"),
    ("e52592", "pink"),
    ("a142f4", "purple"),
    ("9334e6", "purple"),
    ("007b83", "cyan"),
    ("12b5cb", "cyan"),
    ("fa903e", "orange"),
    ("e8710a", "orange"),
    ("5f6368", "grey"),
    ("9aa0a6", "grey"),
];

/// Returns true if `color` is already a palette name.
pub fn is_palette_color(color: &str) -> bool {
    PALETTE.contains(&color)
}

/// Maps a stored color onto the palette.
///
/// Palette names (any case) are returned as-is, known legacy hex codes are looked
/// up case-insensitively, other hex codes are matched to the nearest color family
/// by comparing channels, and anything else becomes [`DEFAULT_COLOR`].
pub fn migrate_color(old: &str) -> &'static str {
    let trimmed = old.trim();
    let lowered = trimmed.to_ascii_lowercase();

    if let Some(name) = PALETTE.iter().find(|name| **name == lowered) {
        return *name;
    }
    if lowered == "gray" {
        return "grey";
    }

    let Some(hex) = normalize_hex(&lowered) else {
        return DEFAULT_COLOR;
    };

    if let Some((_, name)) = LEGACY_HEX.iter().find(|(code, _)| *code == hex) {
        return *name;
    }

    nearest_family(&hex)
}

/// Expands `#abc` / `abc` / `#aabbcc` into `aabbcc`, or `None` if not a hex color.
fn normalize_hex(color: &str) -> Option<String> {
    let digits = color.strip_prefix('#').unwrap_or(color);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        3 => Some(digits.chars().flat_map(|c| [c, c]).collect()),
        6 => Some(digits.to_string()),
        _ => None,
    }
}

fn nearest_family(hex: &str) -> &'static str {
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).unwrap_or(0);
    let (r, g, b) = (channel(0..2), channel(2..4), channel(4..6));

    let high = |v: u8| v >= 0x99;
    let low = |v: u8| v <= 0x66;

    if high(r) && high(g) && low(b) {
        "yellow"
    } else if high(r) && high(b) && low(g) {
        "purple"
    } else if r > g && r > b {
        "red"
    } else if g > r && g > b {
        "green"
    } else if b > r && b > g {
        "blue"
    } else {
        DEFAULT_COLOR
    }
}

/// Migrates each collection's own color and every nested group color.
///
/// Returns how many color fields changed. Nothing else is touched.
pub fn migrate_all_collection_colors(collections: &mut [Collection]) -> usize {
    let mut changed = 0;
    for collection in collections.iter_mut() {
        changed += migrate_in_place(&mut collection.color);
        for group in collection.chrome_groups.iter_mut() {
            changed += migrate_in_place(&mut group.color);
        }
    }
    changed
}

fn migrate_in_place(color: &mut String) -> usize {
    let migrated = migrate_color(color);
    if color.as_str() != migrated {
        *color = migrated.to_string();
        1
    } else {
        0
    }
}

/// Same as [`migrate_all_collection_colors`] for a raw stored collection object.
///
/// Used by migration steps, which run before bodies are guaranteed to decode.
/// Returns how many color fields changed.
pub fn migrate_value_colors(collection: &mut Value) -> usize {
    let mut changed = 0;
    let Some(obj) = collection.as_object_mut() else {
        return 0;
    };

    changed += migrate_value_field(obj.get_mut("color"));
    if let Some(Value::Array(groups)) = obj.get_mut("chromeGroups") {
        for group in groups.iter_mut() {
            if let Some(g) = group.as_object_mut() {
                changed += migrate_value_field(g.get_mut("color"));
            }
        }
    }
    changed
}

fn migrate_value_field(field: Option<&mut Value>) -> usize {
    match field {
        Some(Value::String(color)) => migrate_in_place(color),
        _ => 0,
    }
}

/// True if any color in a raw stored collection is not a palette name.
pub fn value_needs_color_migration(collection: &Value) -> bool {
    let unmigrated = |v: Option<&Value>| matches!(v, Some(Value::String(c)) if !is_palette_color(c));

    if unmigrated(collection.get("color")) {
        return true;
    }
    collection
        .get("chromeGroups")
        .and_then(Value::as_array)
        .map(|groups| groups.iter().any(|g| unmigrated(g.get("color"))))
        .unwrap_or(false)
}
