use std::path::PathBuf;

use tauri::{
    menu::{Menu, MenuItem},
    tray::TrayIconBuilder,
    App,
};
use tauri_plugin_opener::OpenerExt;

pub fn build(app: &App, watch_dir: PathBuf) -> tauri::Result<()> {
    let open_item = MenuItem::with_id(app, "open-folder", "Open watch folder", true, None::<&str>)?;
    let quit_item = MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?;
    let menu = Menu::with_items(app, &[&open_item, &quit_item])?;

    let mut builder = TrayIconBuilder::with_id("main")
        .menu(&menu)
        .tooltip(format!("SnapText - watching {}", watch_dir.display()))
        .on_menu_event(move |app, event| match event.id.as_ref() {
            "open-folder" => {
                if let Err(e) = app
                    .opener()
                    .open_path(watch_dir.to_string_lossy(), None::<&str>)
                {
                    log::error!("Failed to open {}: {}", watch_dir.display(), e);
                }
            }
            "quit" => {
                log::info!("Quit requested from tray");
                app.exit(0);
            }
            _ => {}
        });

    if let Some(icon) = app.default_window_icon() {
        builder = builder.icon(icon.clone());
    }

    builder.build(app)?;
    Ok(())
}
