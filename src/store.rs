//! PSD result persistence
//!
//! Results are written as pretty JSON, one file per processed waveform:
//! `root/NET/STA/LOC/CHA/<stem>_psd.json` when a root is configured, or
//! `<source dir>/PSD/<stem>_psd.json` next to the waveform otherwise.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::psd::PsdResult;
use crate::waveform::ChannelId;

/// File name suffix of stored results
pub const PSD_SUFFIX: &str = "_psd.json";

/// Folder created next to source files when no root is configured
pub const PSD_FOLDER: &str = "PSD";

/// One persisted result with the identity of its segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPsd {
    pub channel: ChannelId,
    pub start_time: DateTime<Utc>,
    pub duration_s: f64,
    pub source: Option<PathBuf>,
    pub result: PsdResult,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PsdStore {
    root: Option<PathBuf>,
}

impl PsdStore {
    /// Store under `root` with a station/component layout
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Store next to each source file, in a `PSD` folder
    pub fn beside_sources() -> Self {
        Self { root: None }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Output path for the result of `source`
    pub fn path_for(&self, source: &Path, channel: &ChannelId) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "segment".to_string());
        let file_name = format!("{}{}", stem, PSD_SUFFIX);
        match &self.root {
            Some(root) => root.join(channel.folder_path()).join(file_name),
            None => source
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(PSD_FOLDER)
                .join(file_name),
        }
    }

    /// Write `stored` for `source`, creating directories as needed
    pub fn save(&self, source: &Path, stored: &StoredPsd) -> Result<PathBuf, StoreError> {
        let path = self.path_for(source, &stored.channel);
        write_json(&path, stored)?;
        log::debug!("Stored PSD for {} at {}", stored.channel, path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<StoredPsd, StoreError> {
        let contents = fs::read_to_string(path).map_err(|err| StoreError::read(path, err))?;
        serde_json::from_str(&contents).map_err(|err| StoreError::malformed(path, err))
    }

    /// All `*_psd.json` files below `dir`, sorted
    pub fn list(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let mut found = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let entries = fs::read_dir(&current).map_err(|err| StoreError::read(&current, err))?;
            for entry in entries {
                let path = entry.map_err(|err| StoreError::read(&current, err))?.path();
                if path.is_dir() {
                    pending.push(path);
                } else if is_psd_file(&path) {
                    found.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    /// Load every result below `dir`; unreadable files are returned separately
    pub fn discover(dir: &Path) -> Result<(Vec<StoredPsd>, Vec<(PathBuf, StoreError)>), StoreError> {
        let mut loaded = Vec::new();
        let mut failed = Vec::new();
        for path in Self::list(dir)? {
            match Self::load(&path) {
                Ok(stored) => loaded.push(stored),
                Err(err) => {
                    log::warn!("Skipping {}: {}", path.display(), err);
                    failed.push((path, err));
                }
            }
        }
        Ok((loaded, failed))
    }
}

fn is_psd_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(PSD_SUFFIX))
}

/// Pretty JSON written through a temporary file and renamed into place
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| StoreError::write(parent, err))?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|err| StoreError::write(path, err))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|err| StoreError::write(&tmp, err))?;
    fs::rename(&tmp, path).map_err(|err| StoreError::write(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PsdParameters;
    use crate::psd::NoiseComparison;
    use chrono::TimeZone;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("psd_store_{}_{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn stored() -> StoredPsd {
        let comparison = NoiseComparison {
            nlnm_db: vec![-170.0, -168.0],
            nhnm_db: vec![-110.0, -112.0],
            fraction_above_nhnm: 0.0,
            fraction_below_nlnm: 0.5,
        };
        StoredPsd {
            channel: ChannelId::new("XX", "ST01", "", "HHZ"),
            start_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            duration_s: 3600.0,
            source: None,
            result: PsdResult {
                frequencies: vec![0.1, 0.2],
                raw_power_db: vec![-150.0, -171.0],
                smoothed_frequencies: vec![0.1, 0.2],
                smoothed_power_db: vec![-150.0, -171.0],
                distribution: vec![vec![0; 150]; 2],
                noise: comparison.clone(),
                smoothed_noise: comparison,
                window_count: 3,
                resolution_hz: 0.1,
                sample_rate: 1.0,
                settings: PsdParameters::default(),
            },
        }
    }

    #[test]
    fn test_path_layouts() {
        let id = ChannelId::new("XX", "ST01", "", "HHZ");
        let source = Path::new("/data/raw/ST01.Z.20240301120000.wav");
        let rooted = PsdStore::new("/out").path_for(source, &id);
        assert_eq!(
            rooted,
            PathBuf::from("/out/XX/ST01/HHZ/ST01.Z.20240301120000_psd.json")
        );
        let beside = PsdStore::beside_sources().path_for(source, &id);
        assert_eq!(
            beside,
            PathBuf::from("/data/raw/PSD/ST01.Z.20240301120000_psd.json")
        );
    }

    #[test]
    fn test_save_load_and_list() {
        let dir = temp_dir("save");
        let store = PsdStore::new(&dir);
        let entry = stored();
        let path = store.save(Path::new("a.wav"), &entry).unwrap();
        assert!(path.ends_with("XX/ST01/HHZ/a_psd.json"));
        assert_eq!(PsdStore::load(&path).unwrap(), entry);

        store.save(Path::new("b.wav"), &entry).unwrap();
        fs::write(dir.join("notes.json"), "{}").unwrap();
        let listed = PsdStore::list(&dir).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0] < listed[1]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_discover_reports_bad_files() {
        let dir = temp_dir("discover");
        let store = PsdStore::new(&dir);
        store.save(Path::new("good.wav"), &stored()).unwrap();
        fs::write(dir.join("broken_psd.json"), "not json").unwrap();

        let (loaded, failed) = PsdStore::discover(&dir).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0].1, StoreError::Malformed { .. }));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file() {
        let err = PsdStore::load(Path::new("/nonexistent/x_psd.json")).unwrap_err();
        assert!(matches!(err, StoreError::ReadFailed { .. }));
    }
}
