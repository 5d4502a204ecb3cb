mod app;
mod config;
mod error;
mod modules;
mod style;

use clap::Parser;
use eframe::egui;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::EditorConfig;
use crate::modules::overlay_editor::{FontBook, OverlayEditor};

#[derive(Parser)]
#[command(name = "overlay-editor")]
#[command(about = "Place styled text over an image and export the result")]
struct Args {
    /// Image to open on start
    image: Option<PathBuf>,

    /// Project file to load after the image
    #[arg(long)]
    project: Option<PathBuf>,

    /// Extra directory to search for fonts, remembered for later runs
    #[arg(long)]
    font_dir: Option<PathBuf>,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Args = Args::parse();
    let mut config: EditorConfig = EditorConfig::load();
    if args.font_dir.is_some() {
        config.font_dir = args.font_dir.clone();
        config.save();
    }

    let fonts: FontBook = FontBook::load(&config);
    let mut editor: OverlayEditor = OverlayEditor::new(config, Box::new(fonts));
    if let Some(path) = &args.image {
        if let Err(e) = editor.open_image(path) { tracing::warn!("Could not open {}: {}", path.display(), e); }
    }
    let mut project: Option<PathBuf> = None;
    if let Some(path) = &args.project {
        match editor.load_project(path) {
            Ok(()) => project = Some(path.clone()),
            Err(e) => tracing::warn!("Could not load project {}: {}", path.display(), e),
        }
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("Overlay Editor"),
        ..Default::default()
    };
    eframe::run_native(
        "Overlay Editor",
        options,
        Box::new(move |cc| Ok(Box::new(app::OverlayApp::new(cc, editor).with_project_path(project)))),
    )
}
