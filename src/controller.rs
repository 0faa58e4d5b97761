//! Application state and the screenshot workflow.
//!
//! The controller never touches Tauri directly; windows, message boxes,
//! clipboard and browser all go through [`Desktop`].

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::WebPreset;
use crate::imaging;
use crate::layout;
use crate::ocr::OcrClient;
use crate::session::{SessionBook, SessionError, Stage};
use crate::types::{ConfirmationView, ResultView, ScreenshotEvent, ScreenshotId};
use crate::watcher::WatchError;
use crate::web;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogSpec {
    pub label: String,
    pub title: String,
    pub page: &'static str,
    pub width: f64,
    pub height: f64,
}

pub trait Desktop: Send + Sync + 'static {
    /// Logical size of the primary monitor, if known.
    fn screen_size(&self) -> Option<(f64, f64)>;
    fn open_dialog(&self, dialog: &DialogSpec) -> anyhow::Result<()>;
    fn close_dialog(&self, label: &str);
    fn show_message(&self, severity: Severity, title: &str, message: &str);
    /// Shows an error and ends the app with `exit_code` once it is dismissed.
    fn show_fatal(&self, title: &str, message: &str, exit_code: i32);
    fn copy_text(&self, text: &str) -> anyhow::Result<()>;
    fn open_url(&self, url: &str) -> anyhow::Result<()>;
    fn exit(&self, exit_code: i32);
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("screenshot {0} has no preview yet")]
    NotReady(ScreenshotId),
    #[error("Unknown web preset: {0}")]
    UnknownPreset(String),
    #[error("{0}")]
    Action(String),
}

pub struct Controller<D: Desktop> {
    desktop: D,
    ocr: OcrClient,
    presets: Vec<WebPreset>,
    sessions: SessionBook,
    skip_confirmation: AtomicBool,
    ocr_gate: tokio::sync::Mutex<()>,
}

impl<D: Desktop> Controller<D> {
    pub fn new(desktop: D, ocr: OcrClient, presets: Vec<WebPreset>) -> Self {
        Self {
            desktop,
            ocr,
            presets,
            sessions: SessionBook::new(),
            skip_confirmation: AtomicBool::new(false),
            ocr_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn skips_confirmation(&self) -> bool {
        self.skip_confirmation.load(Ordering::SeqCst)
    }

    pub fn desktop(&self) -> &D {
        &self.desktop
    }

    pub fn sessions(&self) -> &SessionBook {
        &self.sessions
    }

    pub fn watch_failed(&self, error: &WatchError) {
        log::error!("Could not start watcher: {}", error);
        let message = match error {
            WatchError::MissingDirectory(dir) => {
                format!("Could not start watching directory: {}", dir.display())
            }
            other => format!("Could not start watching directory: {}", other),
        };
        self.desktop.show_fatal("Error", &message, 1);
    }

    /// Entry point for the watcher: either asks the user or goes straight to OCR.
    pub async fn handle_detection(&self, event: ScreenshotEvent) {
        let path = event.path.clone();
        let Some(id) = self.sessions.open(event) else {
            log::debug!("Ignoring duplicate detection of {}", path.display());
            return;
        };

        if self.skips_confirmation() {
            log::info!("Skipping confirmation for {}", path.display());
            if self.sessions.advance(id, Stage::Confirmed).is_ok() {
                self.process(id).await;
            }
            return;
        }

        let preview = match imaging::render_preview_async(path.clone()).await {
            Ok(preview) => preview,
            Err(e) => {
                log::error!("Error creating confirmation dialog: {:#}", e);
                self.fail(id, "Failed to create confirmation dialog");
                return;
            }
        };

        let (width, height) = self.window_size(preview.width, preview.height);
        let dialog = DialogSpec {
            label: id.confirm_label(),
            title: "Confirm OCR".to_string(),
            page: "confirm.html",
            width,
            height,
        };

        let presented = self
            .sessions
            .set_preview(id, preview)
            .and_then(|_| self.sessions.advance(id, Stage::AwaitingConfirmation));
        if let Err(e) = presented {
            log::warn!("Screenshot {} vanished before confirmation: {}", id, e);
            return;
        }

        if let Err(e) = self.desktop.open_dialog(&dialog) {
            log::error!("Error creating confirmation dialog: {:#}", e);
            self.fail(id, "Failed to create confirmation dialog");
        }
    }

    pub fn confirmation_view(&self, id: ScreenshotId) -> Result<ConfirmationView, ControllerError> {
        let session = self.sessions.get(id)?;
        let preview = session.preview.ok_or(ControllerError::NotReady(id))?;
        Ok(ConfirmationView {
            id,
            file_name: session.screenshot.file_name(),
            detected_at: session.screenshot.detected_at.format("%H:%M:%S").to_string(),
            image: preview.data_url,
            width: preview.width,
            height: preview.height,
        })
    }

    /// Accepts the screenshot. Call [`Controller::process`] afterwards to run OCR.
    pub fn confirm(&self, id: ScreenshotId, skip_future: bool) -> Result<(), ControllerError> {
        self.sessions.advance(id, Stage::Confirmed)?;
        self.remember_skip(skip_future);
        self.desktop.close_dialog(&id.confirm_label());
        Ok(())
    }

    /// Declines this screenshot. A ticked "Don't ask again" still applies to later ones.
    pub fn cancel(&self, id: ScreenshotId, skip_future: bool) -> Result<(), ControllerError> {
        self.sessions.advance(id, Stage::Cancelled)?;
        self.remember_skip(skip_future);
        log::info!("Screenshot {} cancelled", id);
        self.finish(id);
        Ok(())
    }

    // Only ever sets the flag; it stays on for the rest of the run.
    fn remember_skip(&self, skip_future: bool) {
        if skip_future && !self.skip_confirmation.swap(true, Ordering::SeqCst) {
            log::info!("Confirmation disabled for the rest of this run");
        }
    }

    /// Runs OCR for a confirmed screenshot and shows the result editor.
    pub async fn process(&self, id: ScreenshotId) {
        if let Err(e) = self.sessions.advance(id, Stage::OcrInFlight) {
            log::warn!("Not processing screenshot {}: {}", id, e);
            return;
        }
        let Ok(session) = self.sessions.get(id) else {
            return;
        };
        let path = session.screenshot.path.clone();

        let outcome = {
            let _gate = self.ocr_gate.lock().await;
            log::info!("Running OCR on {}", path.display());
            self.ocr.recognize(&path).await
        };

        let text = match outcome {
            Ok(Some(text)) => text,
            Ok(None) => {
                self.fail(id, "Failed to perform OCR on the image");
                return;
            }
            Err(e) => {
                log::error!("Error processing screenshot: {}", e);
                self.fail(id, &format!("Failed to process screenshot: {}", e));
                return;
            }
        };

        let preview = match session.preview {
            Some(preview) => preview,
            None => match imaging::render_preview_async(path).await {
                Ok(preview) => preview,
                Err(e) => {
                    log::error!("Error showing result editor: {:#}", e);
                    self.fail(id, "Failed to show result editor");
                    return;
                }
            },
        };

        let (width, height) = self.window_size(preview.width, preview.height);
        let dialog = DialogSpec {
            label: id.result_label(),
            title: "OCR Result".to_string(),
            page: "result.html",
            width,
            height,
        };

        let presented = self
            .sessions
            .set_preview(id, preview)
            .and_then(|_| self.sessions.set_text(id, text))
            .and_then(|_| self.sessions.advance(id, Stage::ResultShown));
        if let Err(e) = presented {
            log::warn!("Screenshot {} vanished before showing result: {}", id, e);
            return;
        }

        if let Err(e) = self.desktop.open_dialog(&dialog) {
            log::error!("Error showing result editor: {:#}", e);
            self.fail(id, "Failed to show result editor");
        }
    }

    pub fn result_view(&self, id: ScreenshotId) -> Result<ResultView, ControllerError> {
        let session = self.sessions.get(id)?;
        let preview = session.preview.ok_or(ControllerError::NotReady(id))?;
        let text = session.text.ok_or(ControllerError::NotReady(id))?;
        Ok(ResultView {
            id,
            file_name: session.screenshot.file_name(),
            image: preview.data_url,
            width: preview.width,
            height: preview.height,
            text,
            presets: self.presets.iter().map(|p| p.name.clone()).collect(),
            default_preset: self.presets.first().map(|p| p.name.clone()),
        })
    }

    pub fn send(&self, id: ScreenshotId, preset: &str, text: &str) -> Result<(), ControllerError> {
        self.sessions.advance(id, Stage::Sent)?;
        let outcome = self.open_in_preset(preset, text.trim());
        self.finish(id);
        outcome
    }

    fn open_in_preset(&self, preset: &str, text: &str) -> Result<(), ControllerError> {
        let Some(preset) = web::find_preset(&self.presets, preset) else {
            log::error!("Unknown web preset: {}", preset);
            self.desktop
                .show_message(Severity::Error, "Error", &format!("Unknown web preset: {}", preset));
            return Err(ControllerError::UnknownPreset(preset.to_string()));
        };

        if text.is_empty() {
            log::warn!("No text to send");
            self.desktop
                .show_message(Severity::Warning, "Warning", "No text selected to send");
            return Ok(());
        }

        let url = preset.url_for(text);
        log::info!("Opening URL: {}", url);
        self.desktop.open_url(&url).map_err(|e| {
            log::error!("Error sending to web preset: {:#}", e);
            let message = format!("Failed to send to web preset: {}", e);
            self.desktop.show_message(Severity::Error, "Error", &message);
            ControllerError::Action(message)
        })
    }

    pub fn copy(&self, id: ScreenshotId, text: &str) -> Result<(), ControllerError> {
        self.sessions.advance(id, Stage::Copied)?;
        log::info!("Copying text to clipboard...");
        let outcome = self.desktop.copy_text(text.trim()).map_err(|e| {
            log::error!("Error copying to clipboard: {:#}", e);
            let message = format!("Failed to copy text: {}", e);
            self.desktop.show_message(Severity::Error, "Error", &message);
            ControllerError::Action(message)
        });
        self.finish(id);
        outcome
    }

    pub fn discard(&self, id: ScreenshotId) -> Result<(), ControllerError> {
        self.sessions.advance(id, Stage::Discarded)?;
        log::info!("Discarding screenshot {}", id);
        self.finish(id);
        Ok(())
    }

    /// A dialog window went away, possibly through its title bar. Settles
    /// whatever it was waiting for.
    pub fn dialog_closed(&self, label: &str) {
        let Some((kind, id)) = ScreenshotId::from_label(label) else {
            return;
        };
        let Ok(session) = self.sessions.get(id) else {
            return;
        };
        let outcome = match (kind, session.stage) {
            ("confirm", Stage::AwaitingConfirmation) => self.cancel(id, false),
            ("result", Stage::ResultShown) => self.discard(id),
            _ => Ok(()),
        };
        if let Err(e) = outcome {
            log::warn!("Could not settle closed dialog {}: {}", label, e);
        }
    }

    pub fn exit(&self) {
        log::info!("Exiting program...");
        self.desktop.exit(0);
    }

    fn window_size(&self, preview_width: u32, preview_height: u32) -> (f64, f64) {
        layout::window_size((preview_width, preview_height), self.desktop.screen_size())
    }

    fn fail(&self, id: ScreenshotId, message: &str) {
        if let Err(e) = self.sessions.advance(id, Stage::Failed) {
            log::debug!("Screenshot {} already settled: {}", id, e);
        }
        self.finish(id);
        self.desktop.show_message(Severity::Error, "Error", message);
    }

    fn finish(&self, id: ScreenshotId) {
        self.desktop.close_dialog(&id.confirm_label());
        self.desktop.close_dialog(&id.result_label());
        self.sessions.remove(id);
    }
}
