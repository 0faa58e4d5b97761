use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenshotId(pub u64);

impl ScreenshotId {
    pub fn confirm_label(self) -> String {
        format!("confirm-{}", self.0)
    }

    pub fn result_label(self) -> String {
        format!("result-{}", self.0)
    }

    /// Splits a dialog label such as `confirm-3` into its kind and id.
    pub fn from_label(label: &str) -> Option<(&str, ScreenshotId)> {
        let (kind, id) = label.rsplit_once('-')?;
        Some((kind, ScreenshotId(id.parse().ok()?)))
    }
}

impl fmt::Display for ScreenshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ScreenshotEvent {
    pub path: PathBuf,
    pub detected_at: DateTime<Local>,
}

impl ScreenshotEvent {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            detected_at: Local::now(),
        }
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// A downscaled rendering of a screenshot, ready for an `<img>` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationView {
    pub id: ScreenshotId,
    pub file_name: String,
    pub detected_at: String,
    pub image: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub id: ScreenshotId,
    pub file_name: String,
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub text: String,
    pub presets: Vec<String>,
    pub default_preset: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_from_label() {
        let id = ScreenshotId(7);
        assert_eq!(ScreenshotId::from_label(&id.confirm_label()), Some(("confirm", id)));
        assert_eq!(ScreenshotId::from_label(&id.result_label()), Some(("result", id)));
        assert_eq!(ScreenshotId::from_label("main"), None);
        assert_eq!(ScreenshotId::from_label("result-x"), None);
    }

    #[test]
    fn file_name_falls_back_to_full_path() {
        assert_eq!(file_name_of(Path::new("/shots/a.png")), "a.png");
        assert_eq!(file_name_of(Path::new("/")), "/");
    }
}
