mod cli;

use std::path::Path;

use canvas_llm::canvas::memory::{MemoryCanvas, MemoryWorkspace};
use canvas_llm::canvas::{CanvasNode, NodeGeometry};
use canvas_llm::config::{ConfigManager, GeneralConfig};
use canvas_llm::llm::GenerationOutcome;
use canvas_llm::plugin::MENU_ITEM_TITLE;
use canvas_llm::LlmInstructionPlugin;
use cli::Cli;
use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const SOURCE_NODE_GEOMETRY: NodeGeometry = NodeGeometry {
    x: 0.0,
    y: 0.0,
    width: 400.0,
    height: 120.0,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse_args();

    let mut manager = match &cli.config {
        Some(path) => ConfigManager::from_existing_path(path.clone())?,
        None => ConfigManager::new()?,
    };
    cli.apply_overrides(manager.app_config_mut());
    let config = manager.app_config().clone();

    // Held until exit so buffered log lines are flushed
    let _log_guard = init_logging(&config.general)?;
    tracing::debug!(path = %manager.config_path().display(), "Loaded config");

    config.settings.validate()?;

    let workspace = MemoryWorkspace::new();
    let canvas = MemoryCanvas::new();
    let source = canvas.add_text_node(&cli.prompt, SOURCE_NODE_GEOMETRY);
    workspace.open_canvas(canvas.clone());

    let plugin = LlmInstructionPlugin::new(config.settings.clone())?;
    plugin.on_load(workspace.clone());

    let menu = canvas.right_click(&source);
    if !menu.activate(MENU_ITEM_TITLE) {
        plugin.on_unload();
        return Err(eyre!("`{}` is missing from the node menu", MENU_ITEM_TITLE));
    }

    let outcomes = plugin.wait_idle().await;
    plugin.on_unload();

    let response = canvas
        .memory_nodes()
        .into_iter()
        .find(|node| node.id() != source.id())
        .ok_or_else(|| eyre!("no response node was created"))?;

    println!("{}", response.text());
    if let Some(color) = response.color() {
        eprintln!("color: {}", color);
    }

    match outcomes.first() {
        Some(GenerationOutcome::Failure(description)) => {
            Err(eyre!("generation failed: {}", description))
        }
        _ => Ok(()),
    }
}

fn init_logging(general: &GeneralConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&general.log_level))
        .wrap_err_with(|| format!("invalid log level `{}`", general.log_level))?;

    let Some(path) = &general.log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("log file {} has no file name", path.display()))?;
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("cannot create log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}
