//! Backup code export.
//!
//! Backup codes only exist in memory while the dialog is open. Exporting them produces a
//! plain-text artifact the user can save; it neither consumes the codes nor tells the server
//! anything.

use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Prefix of the exported file name
const EXPORT_FILE_PREFIX: &str = "simbld-backup-codes";

/// Downloadable text file holding a backup code set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupCodeExport {
    pub file_name: String,
    pub contents: String,
}

impl BackupCodeExport {
    pub fn new(codes: &[String], generated_at: DateTime<Utc>) -> Self {
        let mut contents = String::from("Simbld two-factor authentication backup codes\n");
        contents.push_str(&format!("Generated: {}\n\n", generated_at.format("%Y-%m-%d %H:%M UTC")));
        contents.push_str("Each code can be used once. Keep them somewhere safe.\n\n");

        let width = codes.len().to_string().len();
        for (index, code) in codes.iter().enumerate() {
            contents.push_str(&format!("{:>width$}. {}\n", index + 1, code));
        }

        Self {
            file_name: format!("{EXPORT_FILE_PREFIX}-{}.txt", generated_at.format("%Y-%m-%d")),
            contents,
        }
    }

    /// Write the artifact into `dir`, returning the full path
    pub fn write_to_dir(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.contents)?;
        log::info!("Backup codes exported to {}", path.display());
        Ok(path)
    }
}
