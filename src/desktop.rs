use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindowBuilder};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};
use tauri_plugin_opener::OpenerExt;

use crate::clipboard::ClipboardWriter;
use crate::controller::{Desktop, DialogSpec, Severity};

pub struct TauriDesktop {
    app: AppHandle,
    clipboard: ClipboardWriter,
}

impl TauriDesktop {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            clipboard: ClipboardWriter::new(),
        }
    }
}

impl Desktop for TauriDesktop {
    fn screen_size(&self) -> Option<(f64, f64)> {
        let monitor = self.app.primary_monitor().ok().flatten()?;
        let size = monitor.size().to_logical::<f64>(monitor.scale_factor());
        Some((size.width, size.height))
    }

    fn open_dialog(&self, dialog: &DialogSpec) -> anyhow::Result<()> {
        if let Some(existing) = self.app.get_webview_window(&dialog.label) {
            log::debug!("Dialog {} already open, focusing", dialog.label);
            existing.set_focus()?;
            return Ok(());
        }

        WebviewWindowBuilder::new(&self.app, &dialog.label, WebviewUrl::App(dialog.page.into()))
            .title(&dialog.title)
            .inner_size(dialog.width, dialog.height)
            .center()
            .always_on_top(true)
            .focused(true)
            .build()?;
        log::debug!(
            "Opened {} ({}x{})",
            dialog.label,
            dialog.width,
            dialog.height
        );
        Ok(())
    }

    fn close_dialog(&self, label: &str) {
        if let Some(window) = self.app.get_webview_window(label) {
            if let Err(e) = window.destroy() {
                log::error!("Failed to close {}: {}", label, e);
            }
        }
    }

    fn show_message(&self, severity: Severity, title: &str, message: &str) {
        let kind = match severity {
            Severity::Warning => MessageDialogKind::Warning,
            Severity::Error => MessageDialogKind::Error,
        };
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(kind)
            .show(|_| {});
    }

    fn show_fatal(&self, title: &str, message: &str, exit_code: i32) {
        let app = self.app.clone();
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Error)
            .show(move |_| app.exit(exit_code));
    }

    fn copy_text(&self, text: &str) -> anyhow::Result<()> {
        self.clipboard.write_text(text)
    }

    fn open_url(&self, url: &str) -> anyhow::Result<()> {
        self.app.opener().open_url(url, None::<&str>)?;
        Ok(())
    }

    fn exit(&self, exit_code: i32) {
        self.app.exit(exit_code);
    }
}
