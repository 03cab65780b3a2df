//! Copy naming for duplicated and imported entities.

const COPY_SUFFIX: &str = " (copy)";
const NUMBERED_COPY_PREFIX: &str = " (copy ";

/// Strips a trailing `" (copy)"` or `" (copy N)"` to recover the base name.
pub fn strip_copy_suffix(name: &str) -> &str {
    if let Some(base) = name.strip_suffix(COPY_SUFFIX) {
        return base;
    }
    if let Some(inner) = name.strip_suffix(')') {
        if let Some(pos) = inner.rfind(NUMBERED_COPY_PREFIX) {
            let digits = &inner[pos + NUMBERED_COPY_PREFIX.len()..];
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return &name[..pos];
            }
        }
    }
    name
}

/// Picks the first free copy name for `name`.
///
/// The base name is recovered with [`strip_copy_suffix`], then the lowest `N >= 1`
/// is chosen such that `"<base> (copy)"` (N = 1) or `"<base> (copy N)"` is not
/// already taken.
///
/// ```
/// use tabox_core::generate_copy_name;
///
/// assert_eq!(generate_copy_name("X", []), "X (copy)");
/// assert_eq!(generate_copy_name("X (copy)", ["X", "X (copy)"]), "X (copy 2)");
/// ```
pub fn generate_copy_name<'a, I>(name: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: std::collections::HashSet<&str> = existing.into_iter().collect();
    let base = strip_copy_suffix(name);

    (1..)
        .map(|n| copy_name(base, n))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| copy_name(base, 1))
}

/// Keeps `name` if it is free, otherwise falls back to [`generate_copy_name`].
pub fn disambiguate_name<'a, I>(name: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: Vec<&str> = existing.into_iter().collect();
    if taken.iter().any(|t| *t == name) {
        generate_copy_name(name, taken)
    } else {
        name.to_string()
    }
}

fn copy_name(base: &str, n: usize) -> String {
    if n == 1 {
        format!("{}{}", base, COPY_SUFFIX)
    } else {
        format!("{}{}{})", base, NUMBERED_COPY_PREFIX, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_copy() {
        assert_eq!(generate_copy_name("X", []), "X (copy)");
    }

    #[test]
    fn test_copy_of_copy() {
        assert_eq!(generate_copy_name("X (copy)", ["X", "X (copy)"]), "X (copy 2)");
    }

    #[test]
    fn test_copy_of_numbered_copy() {
        assert_eq!(
            generate_copy_name("X (copy 2)", ["X", "X (copy)", "X (copy 2)"]),
            "X (copy 3)"
        );
    }

    #[test]
    fn test_fills_lowest_gap() {
        assert_eq!(generate_copy_name("X", ["X (copy)", "X (copy 3)"]), "X (copy 2)");
    }

    #[test]
    fn test_disambiguate_keeps_free_names() {
        assert_eq!(disambiguate_name("Fresh", ["Other"]), "Fresh");
        assert_eq!(disambiguate_name("Other", ["Other"]), "Other (copy)");
    }

    #[test]
    fn test_strip_copy_suffix() {
        assert_eq!(strip_copy_suffix("Work (copy)"), "Work");
        assert_eq!(strip_copy_suffix("Work (copy 12)"), "Work");
        assert_eq!(strip_copy_suffix("Work (copy x)"), "Work (copy x)");
        assert_eq!(strip_copy_suffix("Work (draft)"), "Work (draft)");
        assert_eq!(strip_copy_suffix("(copy)"), "(copy)");
    }
}
