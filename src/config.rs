//! Tracked-line configuration.
//!
//! Lines are loaded from a plain JSON array on disk:
//! ```json
//! [
//!   { "id": "victoria", "name": "Victoria", "mode": "tube" },
//!   { "id": "dlr", "name": "DLR", "mode": "dlr" }
//! ]
//! ```
//! When no file is given, the built-in TfL line set is used.

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TrackedLine {
    pub id: String,
    pub name: String,
    pub mode: String,
}

pub struct LinesConfig {
    lines: Vec<TrackedLine>,
}

impl LinesConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let lines: Vec<TrackedLine> = serde_json::from_str(&content)?;
        Ok(Self { lines })
    }

    pub fn default_lines() -> Self {
        let tube = [
            ("bakerloo", "Bakerloo"),
            ("central", "Central"),
            ("circle", "Circle"),
            ("district", "District"),
            ("hammersmith-city", "Hammersmith & City"),
            ("jubilee", "Jubilee"),
            ("metropolitan", "Metropolitan"),
            ("northern", "Northern"),
            ("piccadilly", "Piccadilly"),
            ("victoria", "Victoria"),
            ("waterloo-city", "Waterloo & City"),
        ];

        let mut lines: Vec<TrackedLine> = tube
            .iter()
            .map(|(id, name)| TrackedLine {
                id: id.to_string(),
                name: name.to_string(),
                mode: "tube".to_string(),
            })
            .collect();
        lines.push(TrackedLine {
            id: "dlr".to_string(),
            name: "DLR".to_string(),
            mode: "dlr".to_string(),
        });

        Self { lines }
    }

    pub fn lines(&self) -> &[TrackedLine] {
        &self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_parses_json_lines() {
        let path = format!(
            "{}/journey_tracker_test_lines.json",
            std::env::temp_dir().display()
        );
        std::fs::write(
            &path,
            r#"[{ "id": "victoria", "name": "Victoria", "mode": "tube" }]"#,
        )
        .unwrap();

        let config = LinesConfig::load(&path).unwrap();
        assert_eq!(config.lines().len(), 1);
        assert_eq!(config.lines()[0].id, "victoria");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_default_lines_are_present() {
        let config = LinesConfig::default_lines();
        assert!(config.lines().iter().any(|line| line.id == "victoria"));
        assert!(config.lines().iter().any(|line| line.mode == "dlr"));
    }
}
