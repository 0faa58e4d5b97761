use std::sync::{Arc, Mutex};

use log::{debug, info};

/// Text writer for the system clipboard.
///
/// The `arboard` handle is created lazily and kept for the life of the app:
/// on X11 the copied text is only served while the handle is alive.
#[derive(Clone, Default)]
pub struct ClipboardWriter {
    inner: Arc<Mutex<Option<arboard::Clipboard>>>,
}

impl ClipboardWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_text(&self, text: &str) -> anyhow::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("Clipboard lock poisoned"))?;

        if guard.is_none() {
            debug!("Opening system clipboard");
            *guard = Some(arboard::Clipboard::new()?);
        }

        if let Some(clipboard) = guard.as_mut() {
            if let Err(e) = clipboard.set_text(text.to_string()) {
                // A stale handle (e.g. after the display server restarted) is dropped so the next copy reopens it.
                *guard = None;
                return Err(e.into());
            }
        }

        info!("Copied {} characters to clipboard", text.chars().count());
        Ok(())
    }
}
