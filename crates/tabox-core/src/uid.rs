//! Uid generation.

/// A fresh random uid for newly created entities (duplicates, imports, captures).
pub fn new_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A uid derived from a name, a position and a timestamp.
///
/// Migration uses this instead of [`new_uid`] so re-running a step over the same
/// input assigns the same uids.
pub fn derived_uid(name: &str, index: usize, timestamp: i64) -> String {
    let slug: String = name
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c.is_whitespace() || c == '-' || c == '_' {
                Some('-')
            } else {
                None
            }
        })
        .take(24)
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        format!("item-{}-{}", timestamp, index)
    } else {
        format!("{}-{}-{}", slug, timestamp, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_uid_is_deterministic() {
        assert_eq!(derived_uid("My Tabs!", 3, 1700), derived_uid("My Tabs!", 3, 1700));
        assert_eq!(derived_uid("My Tabs!", 3, 1700), "my-tabs-1700-3");
        assert_ne!(derived_uid("My Tabs", 3, 1700), derived_uid("My Tabs", 4, 1700));
    }

    #[test]
    fn test_derived_uid_without_usable_name() {
        assert_eq!(derived_uid("???", 0, 5), "item-5-0");
    }

    #[test]
    fn test_new_uid_is_unique() {
        assert_ne!(new_uid(), new_uid());
        assert_eq!(new_uid().len(), 32);
    }
}
