//! Migration file naming
//!
//! Files are named `<timestamp>__<slug>.sql` so that lexicographic order is apply order.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Name used when `create` is called without one
pub const DEFAULT_MIGRATION_NAME: &str = "new_migration";

/// Slug used when the name normalizes to nothing
const EMPTY_SLUG: &str = "migration";

/// Compact 14-digit UTC timestamp
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^a-z0-9]+").expect("valid slug pattern"));

/// Normalize a human-readable name into a filesystem-safe fragment.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a single
/// underscore and strips leading and trailing underscores. May return an empty string.
pub fn slugify(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Build the file name for a new migration created at `now`.
pub fn migration_file_name(raw_name: Option<&str>, now: DateTime<Utc>) -> String {
    let slug = slugify(raw_name.unwrap_or(DEFAULT_MIGRATION_NAME));
    let slug = if slug.is_empty() { EMPTY_SLUG } else { slug.as_str() };

    format!("{}__{}.sql", now.format(TIMESTAMP_FORMAT), slug)
}
