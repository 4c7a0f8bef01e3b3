use std::path::PathBuf;

use eframe::egui;
use insight_studio::app::InsightApp;

fn main() -> eframe::Result {
    env_logger::init();

    // Optional dataset to open on startup.
    let initial: Option<PathBuf> = std::env::args_os().nth(1).map(PathBuf::from);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([640.0, 420.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Insight Studio",
        options,
        Box::new(move |_cc| {
            let mut app = InsightApp::default();
            if let Some(path) = initial {
                app.open_path(&path);
            }
            Ok(Box::new(app))
        }),
    )
}
