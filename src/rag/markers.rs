//! Citation markers emitted by the extraction model.
//!
//! A marker is one line of the form
//! `{{timestamp:MM:SS}}{{title:...}}{{url:...}}{{description:...}}`.
//! Markers missing any of the four fields are skipped and counted.

use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::LazyLock;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\{\{timestamp:(\d{2}:\d{2})\}\}\{\{title:([^}\n]+)\}\}\{\{url:([^}\n]+)\}\}\{\{description:([^}\n]+)\}\}",
    )
    .expect("marker pattern is valid")
});

static BOILERPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(This video |Here |In this clip |This clip |Shows |Demonstrates )")
        .expect("boilerplate pattern is valid")
});

/// One cited moment in a source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoReference {
    pub urls: Vec<String>,
    /// `MM:SS`.
    pub timestamp: String,
    pub video_title: String,
    pub description: String,
}

/// Ordered video references, serialized as `{"0": ..., "1": ...}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoReferenceMap(Vec<VideoReference>);

impl VideoReferenceMap {
    pub fn new(references: Vec<VideoReference>) -> Self {
        Self(references)
    }

    /// Look up a reference by its string index key.
    pub fn get(&self, key: &str) -> Option<&VideoReference> {
        key.parse::<usize>().ok().and_then(|i| self.0.get(i))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VideoReference> {
        self.0.iter()
    }

    /// Distinct video titles in first-seen order.
    pub fn titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = Vec::new();
        for reference in &self.0 {
            if !titles.contains(&reference.video_title) {
                titles.push(reference.video_title.clone());
            }
        }
        titles
    }
}

impl Serialize for VideoReferenceMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (i, reference) in self.0.iter().enumerate() {
            map.serialize_entry(&i.to_string(), reference)?;
        }
        map.end()
    }
}

/// Counts from one parse of extraction output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerReport {
    pub accepted: usize,
    /// Marker-like lines that did not carry all four fields.
    pub rejected: usize,
    /// Accepted markers whose title does not occur in the retrieved context.
    pub unverified: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedMarkers {
    pub references: VideoReferenceMap,
    pub report: MarkerReport,
}

/// Extract every well-formed marker from raw model output.
pub fn parse_citation_markers(raw: &str) -> ParsedMarkers {
    let mut references = Vec::new();
    let mut rejected = 0;

    for line in raw.lines() {
        let before = references.len();
        for caps in MARKER.captures_iter(line) {
            references.push(VideoReference {
                timestamp: caps[1].to_string(),
                video_title: caps[2].trim().to_string(),
                urls: vec![caps[3].trim().to_string()],
                description: clean_description(&caps[4]),
            });
        }

        let found = references.len() - before;
        let attempted = line.matches("{{timestamp:").count();
        rejected += attempted.saturating_sub(found);
    }

    ParsedMarkers {
        report: MarkerReport {
            accepted: references.len(),
            rejected,
            unverified: 0,
        },
        references: VideoReferenceMap(references),
    }
}

/// Shorten a marker description to a single capitalized phrase.
pub fn clean_description(raw: &str) -> String {
    let first_sentence = raw.trim().split('.').next().unwrap_or_default();
    let stripped = BOILERPLATE.replace(first_sentence, "");
    let trimmed = stripped.trim();

    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_marker() {
        let parsed = parse_citation_markers(
            "{{timestamp:05:30}}{{title:Workshop Tour}}{{url:https://youtube.com/watch?v=abc}}{{description:This video shows chisel sharpening. Then more.}}",
        );

        assert_eq!(parsed.references.len(), 1);
        let reference = parsed.references.get("0").unwrap();
        assert_eq!(reference.timestamp, "05:30");
        assert_eq!(reference.video_title, "Workshop Tour");
        assert_eq!(reference.urls, vec!["https://youtube.com/watch?v=abc"]);
        assert_eq!(reference.description, "Shows chisel sharpening");
        assert_eq!(parsed.report.accepted, 1);
        assert_eq!(parsed.report.rejected, 0);
    }

    #[test]
    fn test_boilerplate_prefix_is_stripped() {
        let parsed = parse_citation_markers(
            "{{timestamp:05:30}}{{title:Workshop Tour}}{{url:https://youtube.com/abc}}{{description:Shows chisel sharpening.}}",
        );
        let reference = parsed.references.get("0").unwrap();
        assert_eq!(reference.urls, vec!["https://youtube.com/abc"]);
        assert_eq!(reference.description, "Chisel sharpening");
    }

    #[test]
    fn test_marker_missing_url_is_skipped() {
        let parsed = parse_citation_markers(
            "{{timestamp:05:30}}{{title:Workshop Tour}}{{description:Chisel sharpening}}",
        );
        assert!(parsed.references.is_empty());
        assert_eq!(parsed.report.rejected, 1);
    }

    #[test]
    fn test_mixed_lines_keep_order() {
        let raw = "Here are the references:\n\
            {{timestamp:01:10}}{{title:A}}{{url:https://yt/a}}{{description:First}}\n\
            {{timestamp:1:10}}{{title:Bad}}{{url:https://yt/bad}}{{description:Short timestamp}}\n\
            {{timestamp:02:20}}{{title:B}}{{url:https://yt/b}}{{description:Second}}";
        let parsed = parse_citation_markers(raw);

        assert_eq!(parsed.references.len(), 2);
        assert_eq!(parsed.references.get("0").unwrap().video_title, "A");
        assert_eq!(parsed.references.get("1").unwrap().video_title, "B");
        assert!(parsed.references.get("2").is_none());
        assert!(parsed.references.get("x").is_none());
        assert_eq!(parsed.report.rejected, 1);
    }

    #[test]
    fn test_clean_description() {
        assert_eq!(clean_description("  demonstration of chisel sharpening. More."), "Demonstration of chisel sharpening");
        assert_eq!(clean_description("Here the board is planed"), "The board is planed");
        assert_eq!(clean_description("In this clip glue is applied"), "Glue is applied");
        assert_eq!(clean_description("Demonstrates dovetail layout"), "Dovetail layout");
        // Only one prefix is removed.
        assert_eq!(clean_description("This video shows a jig"), "Shows a jig");
        assert_eq!(clean_description("."), "");
        assert_eq!(clean_description("épure du bois"), "Épure du bois");
    }

    #[test]
    fn test_map_serializes_with_index_keys() {
        let map = VideoReferenceMap::new(vec![
            VideoReference {
                urls: vec!["https://yt/a".to_string()],
                timestamp: "01:00".to_string(),
                video_title: "A".to_string(),
                description: "First".to_string(),
            },
            VideoReference {
                urls: vec!["https://yt/b".to_string()],
                timestamp: "02:00".to_string(),
                video_title: "A".to_string(),
                description: "Second".to_string(),
            },
        ]);

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["0"]["video_title"], "A");
        assert_eq!(json["1"]["timestamp"], "02:00");
        assert_eq!(json["1"]["urls"][0], "https://yt/b");
        assert_eq!(map.titles(), vec!["A".to_string()]);

        assert_eq!(serde_json::to_string(&VideoReferenceMap::default()).unwrap(), "{}");
    }
}
