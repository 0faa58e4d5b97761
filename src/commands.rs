use std::sync::Arc;

use tauri::State;

use crate::controller::Controller;
use crate::desktop::TauriDesktop;
use crate::types::{ConfirmationView, ResultView, ScreenshotId};

pub type AppController = Arc<Controller<TauriDesktop>>;

#[tauri::command]
pub async fn get_confirmation(id: u64, state: State<'_, AppController>) -> Result<ConfirmationView, String> {
    state
        .confirmation_view(ScreenshotId(id))
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn confirm_screenshot(
    id: u64,
    skip_future: bool,
    state: State<'_, AppController>,
) -> Result<(), String> {
    let id = ScreenshotId(id);
    state.confirm(id, skip_future).map_err(|e| e.to_string())?;

    let controller = state.inner().clone();
    tauri::async_runtime::spawn(async move {
        controller.process(id).await;
    });
    Ok(())
}

#[tauri::command]
pub async fn cancel_screenshot(
    id: u64,
    skip_future: bool,
    state: State<'_, AppController>,
) -> Result<(), String> {
    state
        .cancel(ScreenshotId(id), skip_future)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn get_result(id: u64, state: State<'_, AppController>) -> Result<ResultView, String> {
    state.result_view(ScreenshotId(id)).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn send_result(
    id: u64,
    preset: String,
    text: String,
    state: State<'_, AppController>,
) -> Result<(), String> {
    state
        .send(ScreenshotId(id), &preset, &text)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn copy_result(id: u64, text: String, state: State<'_, AppController>) -> Result<(), String> {
    state.copy(ScreenshotId(id), &text).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn discard_result(id: u64, state: State<'_, AppController>) -> Result<(), String> {
    state.discard(ScreenshotId(id)).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn exit_app(state: State<'_, AppController>) -> Result<(), String> {
    state.exit();
    Ok(())
}
