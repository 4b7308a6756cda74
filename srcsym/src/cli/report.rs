//! JSON output of the `srcsym` binary

use serde::Serialize;

use crate::classification::FrameOrigin;
use crate::extractor::{ClassifiedFrame, SourceSymbol};
use crate::symbolization::ResolvedFrame;

/// Everything `srcsym --json` prints
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    /// Rendered source symbol, as the in-process entry point would return it
    pub source: Option<String>,
    pub symbol: Option<&'a SourceSymbol>,
    /// Only filled with `--all`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<FrameReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct FrameReport<'a> {
    pub index: usize,
    pub in_executable: bool,
    pub relative: Option<u64>,
    pub resolved: &'a ResolvedFrame,
    /// One per inlined frame
    pub origins: &'a [FrameOrigin],
}

impl<'a> Report<'a> {
    #[must_use]
    pub fn new(symbol: Option<&'a SourceSymbol>, frames: &'a [ClassifiedFrame]) -> Self {
        Self {
            source: symbol.map(ToString::to_string),
            symbol,
            frames: frames
                .iter()
                .enumerate()
                .map(|(index, classified)| FrameReport {
                    index,
                    in_executable: classified.frame.in_executable,
                    relative: classified.frame.relative,
                    resolved: &classified.frame.resolved,
                    origins: &classified.origins,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_without_frames_omits_field() {
        let symbol = SourceSymbol {
            address: 0x10,
            function: Some("app::main".to_string()),
            location: None,
            module: Some("app".to_string()),
            relative: Some(0x10),
            frame_index: 0,
        };
        let report = Report::new(Some(&symbol), &[]);
        let json: serde_json::Value = serde_json::to_value(&report).expect("serializable");

        assert_eq!(json["source"], "app::main");
        assert_eq!(json["symbol"]["frame_index"], 0);
        assert!(json.get("frames").is_none());
    }

    #[test]
    fn test_report_no_source() {
        let report = Report::new(None, &[]);
        let json: serde_json::Value = serde_json::to_value(&report).expect("serializable");
        assert!(json["source"].is_null());
    }
}
