mod clipboard;
mod commands;
pub mod config;
pub mod controller;
mod desktop;
pub mod imaging;
pub mod layout;
pub mod ocr;
pub mod session;
mod tray;
pub mod types;
pub mod watcher;
pub mod web;

use std::sync::{Arc, Mutex};

use tauri::{Manager, RunEvent, WindowEvent};
use tauri_plugin_log::{Target, TargetKind};

use commands::AppController;
use config::AppConfig;
use controller::Controller;
use desktop::TauriDesktop;
use ocr::OcrClient;
use watcher::{FileWatcher, ScreenshotHandler};

/// Owns the running watcher so it can be stopped on exit.
#[derive(Default)]
struct WatcherSlot(Mutex<Option<FileWatcher>>);

impl WatcherSlot {
    fn take(&self) -> Option<FileWatcher> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Runs the app and returns its exit code.
pub fn run() -> anyhow::Result<i32> {
    let config = AppConfig::load()?;

    let app = tauri::Builder::default()
        .plugin(
            tauri_plugin_log::Builder::default()
                .level(config.log_level)
                .targets([
                    Target::new(TargetKind::Stdout),
                    Target::new(TargetKind::LogDir { file_name: None }),
                ])
                .build(),
        )
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_opener::init())
        .setup(move |app| {
            setup(app, config)?;
            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Destroyed = event {
                if let Some(controller) = window.try_state::<AppController>() {
                    controller.dialog_closed(window.label());
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            commands::get_confirmation,
            commands::confirm_screenshot,
            commands::cancel_screenshot,
            commands::get_result,
            commands::send_result,
            commands::copy_result,
            commands::discard_result,
            commands::exit_app
        ])
        .build(tauri::generate_context!())?;

    let code = app.run_return(|app, event| match event {
        // Closing the last dialog must not end the app; explicit exits carry a code.
        RunEvent::ExitRequested { code: None, api, .. } => api.prevent_exit(),
        RunEvent::Exit => shutdown(app),
        _ => {}
    });

    log::info!("Main loop ended with code {}", code);
    Ok(code)
}

fn setup(app: &mut tauri::App, config: AppConfig) -> anyhow::Result<()> {
    log::info!("Configuration loaded: {:?}", config);
    log::info!("Watching {} for screenshots", config.watch_dir.display());

    let ocr = OcrClient::from_config(&config)?;
    let controller: AppController = Arc::new(Controller::new(
        TauriDesktop::new(app.handle().clone()),
        ocr,
        config.web_presets.clone(),
    ));
    app.manage(controller.clone());

    let handler = {
        let controller = controller.clone();
        ScreenshotHandler::new(move |event| {
            let controller = controller.clone();
            tauri::async_runtime::spawn(async move {
                controller.handle_detection(event).await;
            });
        })
    };

    // The watcher spawns its dispatcher with `tokio::spawn`, so it has to start inside the runtime.
    let watch_dir = config.watch_dir.clone();
    let started = tauri::async_runtime::block_on(async move { FileWatcher::start(watch_dir, handler) });

    let slot = WatcherSlot::default();
    match started {
        Ok(watcher) => {
            if let Ok(mut guard) = slot.0.lock() {
                *guard = Some(watcher);
            }
        }
        Err(e) => controller.watch_failed(&e),
    }
    app.manage(slot);

    tray::build(app, config.watch_dir.clone())?;
    log::info!("UI created successfully");
    Ok(())
}

fn shutdown(app: &tauri::AppHandle) {
    log::info!("Cleaning up...");
    if let Some(watcher) = app.try_state::<WatcherSlot>().and_then(|slot| slot.take()) {
        tauri::async_runtime::block_on(watcher.stop());
    }
}
