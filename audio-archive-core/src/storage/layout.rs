//! Archive path construction.
//!
//! Maps a file start time to a path under the archive root, creating parent
//! directories as needed. Supported layouts:
//!
//! ```text
//! flat       root/YYYY-MM-DD-HH.sfx
//! hierarchy  root/YYYY/MM/DD/HH/archive.sfx
//! combo      root/YYYY/MM/DD/HH/YYYY-MM-DD-HH.sfx
//! dailydir   root/YYYY-MM-DD/YYYY-MM-DD-HH.sfx
//! accurate   root/YYYY-MM-DD/YYYY-MM-DD-HH-mm-ss-cc.sfx
//! custom     root/<strftime template>
//! ```
//!
//! Where a layout uses a name stem, the configured archive name replaces
//! the default (or prefixes the date for flat/combo/dailydir).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::error::ArchiveError;
use crate::models::timestamp::Timestamp;

const DEFAULT_ARCHIVE_NAME: &str = "archive";

/// How archive files are laid out under the root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileLayout {
    Flat,
    Hierarchy,
    Combo,
    DailyDir,
    Accurate,
    /// A strftime-style template, e.g. `"%Y-%m-%d/studio-1/%H%M.flac"`.
    Custom(String),
}

impl FileLayout {
    /// Build the full path for a file starting at `file_start` and create
    /// its parent directories.
    pub fn build_path(
        &self,
        root: &Path,
        archive_name: Option<&str>,
        suffix: &str,
        file_start: Timestamp,
        utc: bool,
    ) -> Result<PathBuf, ArchiveError> {
        let relative = if utc {
            let dt = datetime_in(Utc, file_start)?;
            self.relative_path(&dt, archive_name, suffix, file_start.usec)
        } else {
            let dt = datetime_in(Local, file_start)?;
            self.relative_path(&dt, archive_name, suffix, file_start.usec)
        }?;

        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ArchiveError::Storage(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(path)
    }

    fn relative_path<Tz: TimeZone>(
        &self,
        dt: &DateTime<Tz>,
        archive_name: Option<&str>,
        suffix: &str,
        usec: u32,
    ) -> Result<PathBuf, ArchiveError>
    where
        Tz::Offset: fmt::Display,
    {
        let date_hour = dt.format("%Y-%m-%d-%H");
        let name_prefix = archive_name
            .map(|name| format!("{name}-"))
            .unwrap_or_default();

        let relative = match self {
            Self::Flat => format!("{name_prefix}{date_hour}.{suffix}"),
            Self::Hierarchy => format!(
                "{}/{}.{suffix}",
                dt.format("%Y/%m/%d/%H"),
                archive_name.unwrap_or(DEFAULT_ARCHIVE_NAME)
            ),
            Self::Combo => format!(
                "{}/{name_prefix}{date_hour}.{suffix}",
                dt.format("%Y/%m/%d/%H")
            ),
            Self::DailyDir => format!(
                "{}/{name_prefix}{date_hour}.{suffix}",
                dt.format("%Y-%m-%d")
            ),
            Self::Accurate => format!(
                "{}/{}-{:02}.{suffix}",
                dt.format("%Y-%m-%d"),
                dt.format("%Y-%m-%d-%H-%M-%S"),
                usec / 10_000
            ),
            Self::Custom(template) => {
                let formatted = dt.format(template).to_string();
                if formatted.is_empty() {
                    return Err(ArchiveError::ConfigurationFailed(
                        "custom file layout produced an empty path".into(),
                    ));
                }
                formatted
            }
        };

        Ok(PathBuf::from(relative))
    }
}

fn datetime_in<Tz: TimeZone>(tz: Tz, ts: Timestamp) -> Result<DateTime<Tz>, ArchiveError> {
    tz.timestamp_opt(ts.sec, ts.usec * 1000)
        .single()
        .ok_or_else(|| ArchiveError::Storage(format!("unrepresentable file time: {}", ts.sec)))
}

impl FromStr for FileLayout {
    type Err = std::convert::Infallible;

    /// Known layout names resolve to their variants; anything else is
    /// treated as a custom strftime template, as the CLI surface expects.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "flat" => Self::Flat,
            "hierarchy" => Self::Hierarchy,
            "combo" => Self::Combo,
            "dailydir" => Self::DailyDir,
            "accurate" => Self::Accurate,
            _ => Self::Custom(s.to_string()),
        })
    }
}

impl fmt::Display for FileLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => f.write_str("flat"),
            Self::Hierarchy => f.write_str("hierarchy"),
            Self::Combo => f.write_str("combo"),
            Self::DailyDir => f.write_str("dailydir"),
            Self::Accurate => f.write_str("accurate"),
            Self::Custom(template) => f.write_str(template),
        }
    }
}

impl From<String> for FileLayout {
    fn from(s: String) -> Self {
        s.parse().expect("infallible")
    }
}

impl From<FileLayout> for String {
    fn from(layout: FileLayout) -> Self {
        layout.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_time() -> Timestamp {
        // 2024-01-02 03:04:05.123456 UTC
        let sec = Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap()
            .timestamp();
        Timestamp::new(sec, 123_456)
    }

    fn temp_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("audio_archive_layout_{name}"));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        root
    }

    fn relative(path: &Path, root: &Path) -> String {
        path.strip_prefix(root).unwrap().to_string_lossy().into_owned()
    }

    #[test]
    fn flat_layout() {
        let root = temp_root("flat");
        let path = FileLayout::Flat
            .build_path(&root, None, "wav", test_time(), true)
            .unwrap();
        assert_eq!(relative(&path, &root), "2024-01-02-03.wav");

        let named = FileLayout::Flat
            .build_path(&root, Some("studio"), "wav", test_time(), true)
            .unwrap();
        assert_eq!(relative(&named, &root), "studio-2024-01-02-03.wav");
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn hierarchy_layout_creates_parents() {
        let root = temp_root("hierarchy");
        let path = FileLayout::Hierarchy
            .build_path(&root, None, "wav", test_time(), true)
            .unwrap();
        assert_eq!(relative(&path, &root), "2024/01/02/03/archive.wav");
        assert!(path.parent().unwrap().is_dir());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn combo_and_dailydir_layouts() {
        let root = temp_root("combo");
        let combo = FileLayout::Combo
            .build_path(&root, Some("st1"), "au", test_time(), true)
            .unwrap();
        assert_eq!(relative(&combo, &root), "2024/01/02/03/st1-2024-01-02-03.au");

        let daily = FileLayout::DailyDir
            .build_path(&root, None, "au", test_time(), true)
            .unwrap();
        assert_eq!(relative(&daily, &root), "2024-01-02/2024-01-02-03.au");
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn accurate_layout_includes_subsecond() {
        let root = temp_root("accurate");
        let path = FileLayout::Accurate
            .build_path(&root, None, "wav", test_time(), true)
            .unwrap();
        // 123456 µs → "12" hundredths.
        assert_eq!(
            relative(&path, &root),
            "2024-01-02/2024-01-02-03-04-05-12.wav"
        );
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn custom_template() {
        let root = temp_root("custom");
        let layout: FileLayout = "%Y-%m-%d/studio-1/%H%M.flac".parse().unwrap();
        assert!(matches!(layout, FileLayout::Custom(_)));

        let path = layout
            .build_path(&root, None, "ignored", test_time(), true)
            .unwrap();
        assert_eq!(relative(&path, &root), "2024-01-02/studio-1/0304.flac");
        assert!(path.parent().unwrap().is_dir());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn parses_known_names() {
        assert_eq!("hierarchy".parse::<FileLayout>().unwrap(), FileLayout::Hierarchy);
        assert_eq!("DAILYDIR".parse::<FileLayout>().unwrap(), FileLayout::DailyDir);
        assert_eq!(FileLayout::Accurate.to_string(), "accurate");
    }
}
