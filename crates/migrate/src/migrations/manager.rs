//! Migration Manager - File system operations for migrations
//!
//! Handles creating, listing, and parsing migration files from the filesystem.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::definitions::{MigrationConfig, MigrationFile};
use super::naming::migration_file_name;
use crate::error::{MigrationError, MigrationResult};

/// Body written by `create_migration`
pub const MIGRATION_TEMPLATE: &str = "-- up\n-- down\n";

static UP_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*--\s*up\s*$").expect("valid up marker pattern"));
static DOWN_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*--\s*down\s*$").expect("valid down marker pattern"));

/// Migration manager for creating and loading migration files
#[derive(Debug, Clone)]
pub struct MigrationManager {
    config: MigrationConfig,
}

impl MigrationManager {
    /// Create a new migration manager with custom configuration
    pub fn with_config(config: MigrationConfig) -> Self {
        Self { config }
    }

    fn migrations_dir(&self) -> &Path {
        &self.config.migrations_dir
    }

    fn ensure_migrations_dir(&self) -> MigrationResult<()> {
        fs::create_dir_all(self.migrations_dir())
            .map_err(|e| MigrationError::io(self.migrations_dir(), e))
    }

    /// File names of all `.sql` migrations, sorted lexicographically.
    ///
    /// Creates the migrations directory first if it does not exist.
    pub fn list_migrations(&self) -> MigrationResult<Vec<String>> {
        self.ensure_migrations_dir()?;

        let entries = fs::read_dir(self.migrations_dir())
            .map_err(|e| MigrationError::io(self.migrations_dir(), e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MigrationError::io(self.migrations_dir(), e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::warn!("Ignoring migration entry with a non UTF-8 name: {:?}", entry.path());
                continue;
            };
            // Same rule as `exists`: symlinks to files count, directories do not
            if name.ends_with(".sql") && entry.path().is_file() {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    /// Whether a migration file with this name exists
    pub fn exists(&self, name: &str) -> bool {
        self.migrations_dir().join(name).is_file()
    }

    /// Read and parse a migration file by name
    pub fn load(&self, name: &str) -> MigrationResult<MigrationFile> {
        let path = self.migrations_dir().join(name);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => MigrationError::NotFound(name.to_string()),
            _ => MigrationError::io(&path, e),
        })?;

        Ok(parse_migration_content(name, &content))
    }

    /// Create a new migration file from the up/down template
    pub fn create_migration(&self, raw_name: Option<&str>) -> MigrationResult<PathBuf> {
        self.create_migration_at(raw_name, Utc::now())
    }

    /// Create a new migration file named after `now`.
    ///
    /// Never overwrites: an existing file with the same name yields `FileExists`.
    pub fn create_migration_at(
        &self,
        raw_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> MigrationResult<PathBuf> {
        self.ensure_migrations_dir()?;

        let filename = migration_file_name(raw_name, now);
        let filepath = self.migrations_dir().join(&filename);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&filepath)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => MigrationError::FileExists(filename.clone()),
                _ => MigrationError::io(&filepath, e),
            })?;

        file.write_all(MIGRATION_TEMPLATE.as_bytes())
            .map_err(|e| MigrationError::io(&filepath, e))?;

        Ok(filepath)
    }
}

/// Split migration text into its up and down bodies.
///
/// The first standalone `-- down` line (any case, any surrounding whitespace) separates
/// the sections. A leading `-- up` line is dropped from the up section. Without a down
/// marker the down body is `None`.
pub fn parse_migration_content(name: &str, content: &str) -> MigrationFile {
    let (up_section, down_section) = split_at_down_marker(content);

    MigrationFile {
        name: name.to_string(),
        up_body: strip_up_marker(up_section).trim().to_string(),
        down_body: down_section.map(|section| section.trim().to_string()),
    }
}

fn split_at_down_marker(content: &str) -> (&str, Option<&str>) {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let end = offset + line.len();
        if DOWN_MARKER.is_match(line.trim_end_matches(['\n', '\r'])) {
            return (&content[..offset], Some(&content[end..]));
        }
        offset = end;
    }
    (content, None)
}

fn strip_up_marker(section: &str) -> &str {
    let section = section.trim_start();
    let (first_line, rest) = section.split_once('\n').unwrap_or((section, ""));
    if UP_MARKER.is_match(first_line) {
        rest
    } else {
        section
    }
}
