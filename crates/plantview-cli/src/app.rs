//! CLI Application logic
//!
//! Contains the command-line interface implementation.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use plantview_render::{
    detect, is_source_path, Capabilities, Notice, OutputFormat, PendingRender, PreviewController,
    PreviewStatus, QualityOptions, QualityPreset, RenderBridge, RenderOutcome, RenderService,
    RenderedDiagram, RequestId, Settings, SOURCE_EXTENSIONS,
};

use crate::logging;

/// Output format for the check report
#[derive(Debug, Clone, Copy, Default, PartialEq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for editor/tool integration
    Json,
}

#[derive(Parser)]
#[command(name = "plantview")]
#[command(author, version, about = "Render and preview PlantUML diagrams", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Format and quality flags shared by rendering commands
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    /// Output format (png or svg)
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// PNG resolution (72-600)
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Engine scale (1-8)
    #[arg(long)]
    pub scale: Option<f32>,

    /// Quality preset (screen, standard, hd, print); overrides --dpi/--scale
    #[arg(long)]
    pub preset: Option<QualityPreset>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a diagram to an image file
    Render {
        /// Input PlantUML file
        input: PathBuf,

        /// Output file (defaults to the input with the format's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: RenderOptions,
    },

    /// Check whether a file looks like PlantUML and show the normalised source
    Check {
        /// Input file
        input: PathBuf,

        /// Output format (text or json)
        #[arg(long, value_enum, default_value = "text")]
        report: ReportFormat,
    },

    /// Render a diagram and copy it to the clipboard
    Copy {
        /// Input PlantUML file
        input: PathBuf,

        #[command(flatten)]
        options: RenderOptions,
    },

    /// Re-render a diagram whenever the file changes
    Watch {
        /// Input PlantUML file
        input: PathBuf,

        /// Output file (defaults to the input with the format's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: RenderOptions,
    },

    /// List quality presets
    Presets,
}

/// Run the CLI application
///
/// Parses arguments, loads settings, installs logging and dispatches to
/// the appropriate command.
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let (settings, loaded) =
        Settings::discover(cli.config.as_deref()).context("Failed to load settings")?;
    let log_file = logging::init_logging(&settings.log, cli.log_level.as_deref())?;
    if let Some(path) = &loaded {
        tracing::info!("Loaded settings from {}", path.display());
    }
    if let Some(path) = &log_file {
        tracing::debug!("Appending log records to {}", path.display());
    }

    match cli.command {
        Commands::Render {
            input,
            output,
            options,
        } => {
            let mut session = Session::from_settings(settings);
            session.configure(&options);
            session.start().await?;
            render_command(&mut session, &input, output.as_deref()).await?;
        }
        Commands::Check { input, report } => {
            check_command(&input, report)?;
        }
        Commands::Copy { input, options } => {
            let mut session = Session::from_settings(settings);
            session.configure(&options);
            session.start().await?;
            copy_command(&mut session, &input).await?;
        }
        Commands::Watch {
            input,
            output,
            options,
        } => {
            let mut session = Session::from_settings(settings);
            session.configure(&options);
            session.start().await?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            };
            println!("Watching {} (Ctrl-C to stop)", input.display());
            let renders = watch_command(&mut session, &input, output.as_deref(), shutdown).await?;
            println!("Stopped after {} render(s)", renders);
        }
        Commands::Presets => {
            presets_command();
        }
    }

    Ok(())
}

/// A render service paired with preview state
pub struct Session {
    settings: Settings,
    service: RenderService,
    preview: PreviewController,
}

impl Session {
    /// Create a session on the current Tokio runtime
    pub fn new(settings: Settings, bridge: Arc<dyn RenderBridge>, capabilities: Capabilities) -> Self {
        let service = RenderService::current(bridge, settings.service_options());
        let mut preview = PreviewController::new(capabilities);
        preview.set_format(settings.render.format);
        preview.set_quality(settings.quality());
        Self {
            settings,
            service,
            preview,
        }
    }

    /// Create a session with the configured bridge
    pub fn from_settings(settings: Settings) -> Self {
        let bridge = settings.build_bridge();
        Self::new(settings, bridge, Capabilities::probe())
    }

    /// Apply command-line overrides on top of the settings
    pub fn configure(&mut self, options: &RenderOptions) {
        let format = options.format.unwrap_or(self.settings.render.format);
        self.preview.set_format(format);

        let quality = match options.preset {
            Some(preset) => QualityOptions::from(preset),
            None => {
                let mut quality = self.settings.quality();
                if let Some(dpi) = options.dpi {
                    quality = quality.with_dpi(dpi);
                }
                if let Some(scale) = options.scale {
                    quality = quality.with_scale(scale);
                }
                quality
            }
        };
        self.preview.set_quality(quality);
        self.report_notices();
    }

    /// Start the render engine
    pub async fn start(&self) -> Result<()> {
        self.service
            .initialize()
            .await
            .with_context(|| format!("Failed to start the {} engine", self.service.bridge_name()))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn preview(&self) -> &PreviewController {
        &self.preview
    }

    pub fn service(&self) -> &RenderService {
        &self.service
    }

    /// Submit `source` and mark it as the request the preview waits for
    pub fn submit(&mut self, source: &str) -> PendingRender {
        let pending = self.service.submit(self.preview.request(source));
        self.preview.begin(pending.id());
        pending
    }

    /// Hand an outcome to the preview
    pub fn apply(&mut self, id: RequestId, outcome: RenderOutcome) -> bool {
        let applied = self.preview.apply(id, outcome);
        self.report_notices();
        applied
    }

    /// Render `source` and wait for the result
    pub async fn render_source(&mut self, source: &str) -> Result<RenderedDiagram> {
        let pending = self.submit(source);
        let id = pending.id();
        let outcome = pending.wait().await;
        self.apply(id, outcome);

        match self.preview.status() {
            PreviewStatus::Ready => self
                .preview
                .current()
                .cloned()
                .context("Render finished without an image"),
            PreviewStatus::Error(diagnostic) => anyhow::bail!("{}", diagnostic),
            PreviewStatus::Unrecognized => {
                anyhow::bail!("Input does not look like a PlantUML diagram")
            }
            PreviewStatus::Idle | PreviewStatus::Rendering => {
                anyhow::bail!("Render was superseded")
            }
        }
    }

    /// Default output path for `input` in the current format
    pub fn output_path(&self, input: &Path) -> PathBuf {
        input.with_extension(self.preview.format().extension())
    }

    fn report_notices(&mut self) {
        for notice in self.preview.take_notices() {
            match notice {
                Notice::CapabilityDegraded { requested, used } => {
                    eprintln!("Note: {} preview is unavailable, using {}", requested, used);
                }
                Notice::ExportUnavailable => {
                    eprintln!("Note: nothing to export yet");
                }
                Notice::RuntimeUnavailable(message) => {
                    eprintln!("Error: {}", message);
                }
            }
        }
    }
}

fn read_source(input: &Path) -> Result<String> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    if !is_source_path(input) {
        tracing::warn!(
            "{} does not have a PlantUML extension ({})",
            input.display(),
            SOURCE_EXTENSIONS.join(", ")
        );
    }
    fs::read_to_string(input).with_context(|| format!("Failed to read: {}", input.display()))
}

/// Execute the render command
pub async fn render_command(
    session: &mut Session,
    input: &Path,
    output: Option<&Path>,
) -> Result<PathBuf> {
    let source = read_source(input)?;
    let output_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| session.output_path(input));
    if output_path == input {
        anyhow::bail!(
            "Output would overwrite the input file: {}",
            output_path.display()
        );
    }

    println!("Rendering: {}", input.display());
    let diagram = session
        .render_source(&source)
        .await
        .with_context(|| format!("Failed to render {}", input.display()))?;

    session
        .preview
        .export_to_file(&output_path)
        .with_context(|| format!("Failed to write output: {}", output_path.display()))?;

    println!("  Output: {}", output_path.display());
    println!("  Format: {}", diagram.format);
    println!("  Size: {} bytes", diagram.len());
    if let Some((width, height)) = session.preview.display_size() {
        println!("  Pixels: {}x{}", width, height);
    }

    Ok(output_path)
}

/// Execute the check command
///
/// Returns whether the text looks like PlantUML.
pub fn check_command(input: &Path, report: ReportFormat) -> Result<bool> {
    let source = read_source(input)?;
    let accepted = detect::looks_like_plantuml(&source);

    match report {
        ReportFormat::Json => {
            let value = serde_json::json!({
                "path": input.display().to_string(),
                "plantuml": accepted,
                "has_markers": detect::has_markers(&source),
                "normalized": accepted.then(|| detect::normalize(&source)),
            });
            let json = serde_json::to_string_pretty(&value).context("Failed to serialize report")?;
            println!("{}", json);
        }
        ReportFormat::Text if !accepted => {
            println!("✗ {} does not look like PlantUML", input.display());
        }
        ReportFormat::Text => {
            println!("✓ {} looks like PlantUML", input.display());
            if !detect::has_markers(&source) {
                println!("  {}/{} markers will be added", detect::START_MARKER, detect::END_MARKER);
            }
            println!();
            println!("{}", detect::normalize(&source));
        }
    }

    Ok(accepted)
}

/// Execute the copy command
pub async fn copy_command(session: &mut Session, input: &Path) -> Result<()> {
    if !session.preview.capabilities().clipboard {
        anyhow::bail!("No clipboard is available in this build");
    }
    let source = read_source(input)?;
    session
        .render_source(&source)
        .await
        .with_context(|| format!("Failed to render {}", input.display()))?;

    #[cfg(feature = "clipboard")]
    {
        // This process exits right after the copy, so the contents have to
        // be handed to another owner first
        let mut clipboard = plantview_render::SystemClipboard::new()?.hand_off();
        if clipboard.waits_for_owner() {
            eprintln!("Holding the clipboard until another application takes it (Ctrl-C to abandon)");
        }
        session.preview.export_to_clipboard(&mut clipboard)?;
        println!(
            "Copied {} diagram from {}",
            session.preview.format(),
            input.display()
        );
        Ok(())
    }

    #[cfg(not(feature = "clipboard"))]
    {
        anyhow::bail!("Clipboard support is not compiled in")
    }
}

/// Execute the watch command
///
/// Renders whenever the file has been quiet for the debounce interval
/// after a change. A change during a render supersedes it. Returns the
/// number of images written once `shutdown` resolves.
pub async fn watch_command<F>(
    session: &mut Session,
    input: &Path,
    output: Option<&Path>,
    shutdown: F,
) -> Result<usize>
where
    F: Future<Output = ()>,
{
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    let debounce = session.settings.debounce();
    let poll = (debounce / 4).max(Duration::from_millis(20));
    let mut ticker = tokio::time::interval(poll);
    tokio::pin!(shutdown);

    let mut seen: Option<SystemTime> = None;
    let mut changed_at: Option<Instant> = None;
    let mut pending: Option<PendingRender> = None;
    let mut renders = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let modified = fs::metadata(input).and_then(|m| m.modified()).ok();
        if modified.is_some() && modified != seen {
            seen = modified;
            changed_at = Some(Instant::now());
        }

        if changed_at.is_some_and(|at| at.elapsed() >= debounce) {
            changed_at = None;
            match fs::read_to_string(input) {
                Ok(source) => {
                    if let Some(previous) = &pending {
                        tracing::debug!("Render #{} superseded by a newer edit", previous.id());
                    }
                    pending = Some(session.submit(&source));
                }
                Err(e) => tracing::warn!("Cannot read {}: {}", input.display(), e),
            }
        }

        let Some(outcome) = pending.as_mut().and_then(PendingRender::try_take) else {
            continue;
        };
        let Some(id) = pending.take().map(|p| p.id()) else {
            continue;
        };
        if !session.apply(id, outcome) {
            continue;
        }

        let status = session.preview.status().clone();
        match status {
            PreviewStatus::Ready => {
                let output_path = output
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| session.output_path(input));
                match session.preview.export_to_file(&output_path) {
                    Ok(()) => {
                        renders += 1;
                        println!("✓ Updated {}", output_path.display());
                    }
                    Err(e) => eprintln!("✗ Failed to write {}: {}", output_path.display(), e),
                }
            }
            PreviewStatus::Error(diagnostic) => eprintln!("✗ {}", diagnostic),
            PreviewStatus::Unrecognized => {
                eprintln!("✗ {} does not look like PlantUML", input.display())
            }
            PreviewStatus::Idle | PreviewStatus::Rendering => {}
        }
    }

    Ok(renders)
}

/// Execute the presets command
pub fn presets_command() {
    println!("{:<10} {:>5} {:>6}", "PRESET", "DPI", "SCALE");
    for preset in QualityPreset::all() {
        println!(
            "{:<10} {:>5} {:>5}x",
            preset.name(),
            preset.dpi(),
            preset.scale()
        );
    }
}
