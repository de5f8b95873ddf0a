// Name parser module - channel identity from project file names
//
// A project describes its naming scheme with three strings: the delimiters
// in the order they appear (space separated), the names of the parts they
// separate (space separated) and a mapping such as
// `Network:Net;Station:Sta;Channel:Comp`. A mapping value naming a part is
// replaced by that part of the file name; any other value is used literally.
// A part called `Datetime` (YYYYmmddHHMMSS) or `Date` (YYYYmmdd) gives the
// start time.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::waveform::ChannelId;

/// Start-time format used in file names, e.g. `20240301120000`
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const DATE_FORMAT: &str = "%Y%m%d";

const CODE_TYPES: [&str; 4] = ["Network", "Station", "Location", "Channel"];

/// Naming scheme as stored in a project's `data.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingScheme {
    pub delimiters: String,
    pub parts_info: String,
    pub name_info: String,
}

/// Result of parsing one file name
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    pub channel: ChannelId,
    /// Whether the scheme maps a channel code at all
    pub channel_present: bool,
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileNameParser {
    delimiters: Vec<String>,
    parts: Vec<String>,
    name_info: HashMap<String, String>,
}

impl FileNameParser {
    pub fn new(delimiters: &str, parts_info: &str, name_info: &str) -> Result<Self, StoreError> {
        let delimiters: Vec<String> = delimiters.split_whitespace().map(str::to_string).collect();
        let parts: Vec<String> = parts_info.split_whitespace().map(str::to_string).collect();
        if delimiters.is_empty() || parts.is_empty() {
            return Err(StoreError::NameParseFailed {
                name: String::new(),
                reason: "parser needs delimiters and part names".to_string(),
            });
        }
        Ok(Self {
            delimiters,
            parts,
            name_info: parse_name_info(name_info),
        })
    }

    pub fn from_scheme(scheme: &NamingScheme) -> Result<Self, StoreError> {
        Self::new(&scheme.delimiters, &scheme.parts_info, &scheme.name_info)
    }

    /// Load the scheme from a project file, under `name_parser` or at the root
    pub fn from_project_file<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| StoreError::read(path, err))?;
        let value: serde_json::Value =
            serde_json::from_str(&contents).map_err(|err| StoreError::malformed(path, err))?;
        let section = value.get("name_parser").cloned().unwrap_or(value);
        let scheme: NamingScheme =
            serde_json::from_value(section).map_err(|err| StoreError::malformed(path, err))?;
        Self::from_scheme(&scheme)
    }

    /// `STATION.COMPONENT.YYYYmmddHHMMSS`, the layout cut and merged files get
    pub fn station_component() -> Self {
        Self {
            delimiters: vec![".".to_string(), ".".to_string()],
            parts: vec![
                "Station".to_string(),
                "Component".to_string(),
                "Datetime".to_string(),
            ],
            name_info: parse_name_info("Station:Station;Channel:Component"),
        }
    }

    /// Parse a bare name (no extension)
    pub fn parse(&self, name: &str) -> Result<ParsedName, StoreError> {
        let fail = |reason: String| StoreError::NameParseFailed {
            name: name.to_string(),
            reason,
        };

        let mut remaining = name;
        let mut pieces = Vec::with_capacity(self.parts.len());
        for (index, delimiter) in self.delimiters.iter().enumerate() {
            if remaining.is_empty() {
                break;
            }
            let Some((head, tail)) = remaining.split_once(delimiter.as_str()) else {
                return Err(fail(format!(
                    "delimiter '{}' not found in '{}'",
                    delimiter, remaining
                )));
            };
            pieces.push(head);
            remaining = tail;
            if index == self.delimiters.len() - 1 {
                pieces.push(remaining);
            }
        }

        if pieces.len() != self.parts.len() {
            return Err(fail(format!(
                "expected {} parts but got {}",
                self.parts.len(),
                pieces.len()
            )));
        }
        if let Some(bad) = pieces
            .iter()
            .find(|piece| !piece.chars().all(char::is_alphanumeric))
        {
            return Err(fail(format!("special characters in part '{}'", bad)));
        }

        let by_part: HashMap<&str, &str> = self
            .parts
            .iter()
            .map(String::as_str)
            .zip(pieces.iter().copied())
            .collect();
        let resolve = |code_type: &str| -> String {
            match self.name_info.get(code_type) {
                Some(value) => by_part
                    .get(value.as_str())
                    .map(|piece| piece.to_string())
                    .unwrap_or_else(|| value.clone()),
                None => String::new(),
            }
        };

        let channel_present = self
            .name_info
            .get("Channel")
            .is_some_and(|value| !value.trim().is_empty());
        let [network, station, location, channel] = CODE_TYPES.map(resolve);
        let start_time = by_part
            .iter()
            .find_map(|(part, piece)| part_start_time(part, piece));

        Ok(ParsedName {
            channel: ChannelId {
                network,
                station,
                location,
                channel,
            },
            channel_present,
            start_time,
        })
    }

    /// Parse the stem of `path`
    pub fn parse_path(&self, path: &Path) -> Result<ParsedName, StoreError> {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| StoreError::NameParseFailed {
                name: path.display().to_string(),
                reason: "no usable file stem".to_string(),
            })?;
        self.parse(stem)
    }

    /// `/NET/STA/LOC/CHA`, with `[NEZ]` standing in for a missing channel
    pub fn folder_architecture(parsed: &ParsedName) -> String {
        let id = &parsed.channel;
        let mut folder = String::from("/");
        for part in [&id.network, &id.station, &id.location] {
            if !part.trim().is_empty() {
                folder.push_str(part);
                folder.push('/');
            }
        }
        if parsed.channel_present {
            if id.channel.trim().is_empty() {
                folder.push_str("[NEZ]");
            } else {
                folder.push_str(&id.channel);
            }
        }
        folder
    }

    /// `Network:NET;Station:STA;...` for the non-empty codes
    pub fn name_info_string(parsed: &ParsedName) -> String {
        let id = &parsed.channel;
        CODE_TYPES
            .iter()
            .zip([&id.network, &id.station, &id.location, &id.channel])
            .filter(|(_, value)| !value.is_empty())
            .map(|(code_type, value)| format!("{}:{}", code_type, value))
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn part_start_time(part: &str, piece: &str) -> Option<DateTime<Utc>> {
    if part.eq_ignore_ascii_case("datetime") {
        NaiveDateTime::parse_from_str(piece, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    } else if part.eq_ignore_ascii_case("date") {
        NaiveDate::parse_from_str(piece, DATE_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    } else {
        None
    }
}

fn parse_name_info(name_info: &str) -> HashMap<String, String> {
    name_info
        .split(';')
        .filter_map(|entry| entry.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Start time from names like `STA.Z.20240301120000[_suffix].ext`
pub fn extract_timestamp(file_name: &str) -> Option<DateTime<Utc>> {
    let third = file_name.split('.').nth(2)?;
    let stamp = third.split('_').next()?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn project_parser() -> FileNameParser {
        FileNameParser::new(
            "_ _ .",
            "Net Sta Comp Date",
            "Network:Net;Station:Sta;Location:00;Channel:Comp",
        )
        .unwrap()
    }

    #[test]
    fn test_parse_project_scheme() {
        let parsed = project_parser().parse("XX_ST01_HHZ.20240301").unwrap();
        assert_eq!(parsed.channel, ChannelId::new("XX", "ST01", "00", "HHZ"));
        assert!(parsed.channel_present);
        assert_eq!(
            FileNameParser::folder_architecture(&parsed),
            "/XX/ST01/00/HHZ"
        );
        assert_eq!(
            FileNameParser::name_info_string(&parsed),
            "Network:XX;Station:ST01;Location:00;Channel:HHZ"
        );
        assert_eq!(
            parsed.start_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_missing_delimiter() {
        let err = project_parser().parse("XX-ST01-HHZ").unwrap_err();
        assert!(matches!(err, StoreError::NameParseFailed { .. }));
    }

    #[test]
    fn test_special_characters_rejected() {
        let err = project_parser().parse("XX_ST-01_HHZ.20240301").unwrap_err();
        match err {
            StoreError::NameParseFailed { reason, .. } => assert!(reason.contains("ST-01")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_channel_mapping_uses_placeholder() {
        let parser = FileNameParser::new(".", "Sta Date", "Station:Sta;Channel: ").unwrap();
        let parsed = parser.parse("ST01.20240301").unwrap();
        assert!(!parsed.channel_present);
        assert_eq!(FileNameParser::folder_architecture(&parsed), "/ST01/");

        let parser = FileNameParser::new(".", "Sta Date", "Station:Sta;Channel:Comp").unwrap();
        let parsed = parser.parse("ST01.20240301").unwrap();
        // "Comp" names no part, so it is taken literally
        assert_eq!(parsed.channel.channel, "Comp");
    }

    #[test]
    fn test_station_component_default() {
        let parser = FileNameParser::station_component();
        let parsed = parser
            .parse_path(Path::new("/data/ST01.Z.20240301120000.wav"))
            .unwrap();
        assert_eq!(parsed.channel.station, "ST01");
        assert_eq!(parsed.channel.channel, "Z");
        assert_eq!(
            parsed.start_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(FileNameParser::folder_architecture(&parsed), "/ST01/Z");

        // with the extension the last part is not alphanumeric
        assert!(parser.parse("ST01.Z.20240301120000.wav").is_err());
    }

    #[test]
    fn test_extract_timestamp() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(extract_timestamp("ST01.Z.20240301120000.wav"), Some(expected));
        assert_eq!(
            extract_timestamp("ST01.Z.20240301120000_psd.json"),
            Some(expected)
        );
        assert_eq!(extract_timestamp("ST01.Z.notadate.wav"), None);
        assert_eq!(extract_timestamp("short.wav"), None);
    }

    #[test]
    fn test_project_file_nested_and_root() {
        let dir = std::env::temp_dir().join(format!("name_parser_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let nested = dir.join("nested.json");
        fs::write(
            &nested,
            r#"{"name_parser": {"delimiters": "_ _ .", "parts_info": "Net Sta Comp Date", "name_info": "Network:Net;Station:Sta;Channel:Comp"}}"#,
        )
        .unwrap();
        let parser = FileNameParser::from_project_file(&nested).unwrap();
        assert_eq!(
            parser.parse("XX_ST01_HHZ.20240301").unwrap().channel.network,
            "XX"
        );

        let root = dir.join("root.json");
        fs::write(
            &root,
            r#"{"delimiters": ".", "parts_info": "Sta Date", "name_info": "Station:Sta"}"#,
        )
        .unwrap();
        assert!(FileNameParser::from_project_file(&root).is_ok());
        fs::remove_dir_all(&dir).ok();
    }
}
