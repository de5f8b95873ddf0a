//! Format readers
//!
//! Every supported format implements [`WaveformReader`], the capability of
//! turning a file into a [`WaveformSegment`]. The [`ReaderRegistry`] maps
//! file extensions to readers and is the single place formats are added. It
//! also carries the project's [`FileNameParser`], which readers use to name
//! the channel when the file itself does not.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::waveform::name_parser::{extract_timestamp, FileNameParser};
use crate::waveform::{ChannelId, WaveformSegment};

/// Produces a waveform segment from a file
pub trait WaveformReader: Send + Sync {
    /// Human-readable format name, e.g. `WAV`
    fn format_name(&self) -> &'static str;

    /// Lower-case extensions without the dot
    fn extensions(&self) -> &'static [&'static str];

    fn read(&self, path: &Path, naming: &FileNameParser) -> Result<WaveformSegment, StoreError>;
}

/// Identity and start time recovered from a file name
///
/// Names `naming` can parse give the channel codes; anything else keeps the
/// stem as station. The start time comes from the scheme's date part, then
/// from a `STA.COMP.YYYYmmddHHMMSS` layout, then defaults to the epoch.
fn identify(path: &Path, naming: &FileNameParser) -> (ChannelId, DateTime<Utc>) {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let parsed = naming.parse_path(path);
    let start = parsed
        .as_ref()
        .ok()
        .and_then(|parsed| parsed.start_time)
        .or_else(|| extract_timestamp(file_name))
        .unwrap_or_default();
    let channel = match parsed {
        Ok(parsed) => parsed.channel,
        Err(err) => {
            log::debug!("{}; using the file stem as station", err);
            ChannelId {
                station: path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or_default()
                    .to_string(),
                ..ChannelId::default()
            }
        }
    };
    (channel, start)
}

/// Mono PCM or float WAV; integer samples are kept as raw counts
#[derive(Debug, Clone, Copy, Default)]
pub struct WavReader;

impl WaveformReader for WavReader {
    fn format_name(&self) -> &'static str {
        "WAV"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["wav"]
    }

    fn read(&self, path: &Path, naming: &FileNameParser) -> Result<WaveformSegment, StoreError> {
        let mut reader = hound::WavReader::open(path).map_err(|err| StoreError::read(path, err))?;
        let spec = reader.spec();
        if spec.channels != 1 {
            return Err(StoreError::malformed(
                path,
                format!("expected one channel, found {}", spec.channels),
            ));
        }

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|sample| sample.map(f64::from))
                .collect::<Result<Vec<f64>, _>>(),
            hound::SampleFormat::Int => reader
                .samples::<i32>()
                .map(|sample| sample.map(f64::from))
                .collect::<Result<Vec<f64>, _>>(),
        }
        .map_err(|err| StoreError::malformed(path, err))?;

        let (channel, start) = identify(path, naming);
        WaveformSegment::new(samples, f64::from(spec.sample_rate), start, channel)
            .map_err(|err| StoreError::malformed(path, err))
    }
}

/// Plain-text samples with a `# key=value` header
///
/// Recognised header keys: `network`, `station`, `location`, `channel`,
/// `sample_rate` (required) and `start_time` (RFC 3339). Body lines hold one
/// sample each; blank lines are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiReader;

impl AsciiReader {
    /// Write `segment` in the layout [`AsciiReader`] reads
    pub fn write(path: &Path, segment: &WaveformSegment) -> Result<(), StoreError> {
        let id = segment.channel();
        let mut text = String::with_capacity(segment.len() * 12 + 200);
        let header = [
            ("network", id.network.clone()),
            ("station", id.station.clone()),
            ("location", id.location.clone()),
            ("channel", id.channel.clone()),
            ("sample_rate", segment.sample_rate().to_string()),
            ("start_time", segment.start_time().to_rfc3339()),
        ];
        for (key, value) in header {
            let _ = writeln!(text, "# {}={}", key, value);
        }
        for sample in segment.samples() {
            let _ = writeln!(text, "{}", sample);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| StoreError::write(path, err))?;
        }
        fs::write(path, text).map_err(|err| StoreError::write(path, err))
    }
}

impl WaveformReader for AsciiReader {
    fn format_name(&self) -> &'static str {
        "ASCII"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "asc", "ascii"]
    }

    fn read(&self, path: &Path, naming: &FileNameParser) -> Result<WaveformSegment, StoreError> {
        let contents = fs::read_to_string(path).map_err(|err| StoreError::read(path, err))?;
        let (mut channel, mut start) = identify(path, naming);
        let mut sample_rate = None;
        let mut samples = Vec::new();

        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('#') {
                let Some((key, value)) = header.split_once('=') else {
                    continue;
                };
                let value = value.trim();
                match key.trim() {
                    "network" => channel.network = value.to_string(),
                    "station" => channel.station = value.to_string(),
                    "location" => channel.location = value.to_string(),
                    "channel" => channel.channel = value.to_string(),
                    "sample_rate" => {
                        sample_rate = Some(value.parse::<f64>().map_err(|err| {
                            StoreError::malformed(path, format!("sample_rate '{}': {}", value, err))
                        })?)
                    }
                    "start_time" => {
                        start = DateTime::parse_from_rfc3339(value)
                            .map_err(|err| {
                                StoreError::malformed(path, format!("start_time '{}': {}", value, err))
                            })?
                            .with_timezone(&Utc)
                    }
                    _ => {}
                }
                continue;
            }
            let sample = line.parse::<f64>().map_err(|err| {
                StoreError::malformed(path, format!("line {}: {}", line_no + 1, err))
            })?;
            samples.push(sample);
        }

        let sample_rate =
            sample_rate.ok_or_else(|| StoreError::malformed(path, "missing sample_rate header"))?;
        WaveformSegment::new(samples, sample_rate, start, channel)
            .map_err(|err| StoreError::malformed(path, err))
    }
}

/// Format listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatInfo {
    pub name: &'static str,
    pub extensions: Vec<&'static str>,
}

/// Extension → reader lookup
#[derive(Clone)]
pub struct ReaderRegistry {
    readers: BTreeMap<String, Arc<dyn WaveformReader>>,
    naming: FileNameParser,
}

impl ReaderRegistry {
    /// Registry without any reader
    pub fn empty() -> Self {
        Self {
            readers: BTreeMap::new(),
            naming: FileNameParser::station_component(),
        }
    }

    /// Use `naming` instead of the `STA.COMP.YYYYmmddHHMMSS` layout
    pub fn with_naming(mut self, naming: FileNameParser) -> Self {
        self.naming = naming;
        self
    }

    pub fn naming(&self) -> &FileNameParser {
        &self.naming
    }

    /// WAV and ASCII readers
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(WavReader));
        registry.register(Arc::new(AsciiReader));
        registry
    }

    /// Register `reader` for all of its extensions, replacing earlier entries
    pub fn register(&mut self, reader: Arc<dyn WaveformReader>) {
        for ext in reader.extensions() {
            if let Some(previous) = self.readers.insert(ext.to_string(), Arc::clone(&reader)) {
                log::debug!(
                    "Reader {} replaces {} for .{}",
                    reader.format_name(),
                    previous.format_name(),
                    ext
                );
            }
        }
    }

    pub fn reader_for(&self, path: &Path) -> Result<Arc<dyn WaveformReader>, StoreError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        self.readers
            .get(&extension)
            .cloned()
            .ok_or(StoreError::UnsupportedFormat { extension })
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.reader_for(path).is_ok()
    }

    pub fn read(&self, path: &Path) -> Result<WaveformSegment, StoreError> {
        self.reader_for(path)?.read(path, &self.naming)
    }

    /// Supported formats, one entry per reader
    pub fn formats(&self) -> Vec<FormatInfo> {
        let mut formats: Vec<FormatInfo> = Vec::new();
        for reader in self.readers.values() {
            if formats.iter().any(|info| info.name == reader.format_name()) {
                continue;
            }
            formats.push(FormatInfo {
                name: reader.format_name(),
                extensions: reader.extensions().to_vec(),
            });
        }
        formats.sort_by(|a, b| a.name.cmp(b.name));
        formats
    }

    /// Supported files below `dir`, sorted, skipping `PSD` result folders
    pub fn scan(&self, dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let mut found = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let entries = fs::read_dir(&current).map_err(|err| StoreError::read(&current, err))?;
            for entry in entries {
                let path = entry.map_err(|err| StoreError::read(&current, err))?.path();
                if path.is_dir() {
                    if path.file_name().is_some_and(|name| name != "PSD") {
                        pending.push(path);
                    }
                } else if self.is_supported(&path) {
                    found.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("extensions", &self.readers.keys().collect::<Vec<_>>())
            .field("naming", &self.naming)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reader_{}_{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_ascii_round_trip() {
        let dir = temp_dir("ascii");
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let segment = WaveformSegment::new(
            vec![1.0, -2.5, 3.25],
            20.0,
            start,
            ChannelId::new("XX", "ST01", "00", "HHZ"),
        )
        .unwrap();
        let path = dir.join("trace.txt");
        AsciiReader::write(&path, &segment).unwrap();

        let loaded = ReaderRegistry::with_defaults().read(&path).unwrap();
        assert_eq!(loaded, segment);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_ascii_requires_sample_rate() {
        let dir = temp_dir("ascii_rate");
        let path = dir.join("trace.asc");
        fs::write(&path, "# station=A\n1\n2\n").unwrap();
        let naming = FileNameParser::station_component();
        let err = AsciiReader.read(&path, &naming).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));

        fs::write(&path, "# sample_rate=10\n1\nabc\n").unwrap();
        let err = AsciiReader.read(&path, &naming).unwrap_err();
        match err {
            StoreError::Malformed { reason, .. } => assert!(reason.contains("line 3")),
            other => panic!("unexpected {:?}", other),
        }
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wav_reader_keeps_counts_and_name_identity() {
        let dir = temp_dir("wav");
        let path = dir.join("ST01.Z.20240301120000.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for value in [-1000i32, 0, 250_000] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let segment = WavReader
            .read(&path, &FileNameParser::station_component())
            .unwrap();
        assert_eq!(segment.samples(), &[-1000.0, 0.0, 250_000.0]);
        assert_eq!(segment.sample_rate(), 100.0);
        assert_eq!(segment.channel().station, "ST01");
        assert_eq!(
            segment.start_time(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_registry_naming_scheme_names_channel() {
        let dir = temp_dir("naming");
        let path = dir.join("XX_ST02_HHN.20240302.asc");
        fs::write(&path, "# sample_rate=10\n1\n2\n3\n").unwrap();

        // the default layout cannot parse the name and falls back to the stem
        let loaded = ReaderRegistry::with_defaults().read(&path).unwrap();
        assert_eq!(loaded.channel().station, "XX_ST02_HHN.20240302");

        let naming = FileNameParser::new(
            "_ _ .",
            "Net Sta Comp Date",
            "Network:Net;Station:Sta;Channel:Comp",
        )
        .unwrap();
        let registry = ReaderRegistry::with_defaults().with_naming(naming.clone());
        assert_eq!(registry.naming(), &naming);
        let loaded = registry.read(&path).unwrap();
        assert_eq!(loaded.channel(), &ChannelId::new("XX", "ST02", "", "HHN"));
        assert_eq!(
            loaded.start_time(),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()
        );
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_extension() {
        let registry = ReaderRegistry::with_defaults();
        let err = registry.read(Path::new("trace.mseed")).unwrap_err();
        assert_eq!(
            err,
            StoreError::UnsupportedFormat {
                extension: "mseed".to_string()
            }
        );
        assert!(registry.is_supported(Path::new("TRACE.WAV")));
    }

    #[test]
    fn test_formats_listing() {
        let formats = ReaderRegistry::with_defaults().formats();
        let names: Vec<&str> = formats.iter().map(|info| info.name).collect();
        assert_eq!(names, vec!["ASCII", "WAV"]);
        assert!(ReaderRegistry::empty().formats().is_empty());
    }

    #[test]
    fn test_scan_skips_psd_folder() {
        let dir = temp_dir("scan");
        fs::create_dir_all(dir.join("PSD")).unwrap();
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("b.txt"), "# sample_rate=1\n").unwrap();
        fs::write(dir.join("sub/a.asc"), "# sample_rate=1\n").unwrap();
        fs::write(dir.join("PSD/c.txt"), "").unwrap();
        fs::write(dir.join("notes.md"), "").unwrap();

        let found = ReaderRegistry::with_defaults().scan(&dir).unwrap();
        assert_eq!(found, vec![dir.join("b.txt"), dir.join("sub/a.asc")]);
        fs::remove_dir_all(&dir).ok();
    }
}
