//! CLI command definitions, routing, and tracing setup.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::fmt::MakeWriter;

use projectmap_core::{
    ProgressReporter, ProjectOutcome, RunContext, RunReport, Workspace, bootstrap, ensure_dir,
    log_file_path, preview_project,
};
use projectmap_devops::{DevOpsClient, FetchOptions};
use projectmap_diagram::DEFAULT_HEADER;
use projectmap_render::Renderer;
use projectmap_shared::{
    AppConfig, PlatformConfig, default_config_path, init_config, load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// projectmap: repository/pipeline diagrams for every project wiki.
#[derive(Parser)]
#[command(
    name = "projectmap",
    version,
    about = "Render each project's repositories and build pipelines as a WBS diagram and publish it to the project wiki.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./projectmap.toml, then ~/.projectmap/projectmap.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Organization URL, e.g. https://dev.azure.com/Contoso/.
    #[arg(long, env = "PROJECTMAP_ORG_URL", global = true)]
    pub org_url: Option<String>,

    /// Username for basic auth.
    #[arg(long, env = "PROJECTMAP_USERNAME", global = true)]
    pub username: Option<String>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build, render and publish the diagram for every project.
    Run {
        /// Only process this project (repeatable).
        #[arg(short, long)]
        project: Vec<String>,

        /// Render locally but do not touch the wiki.
        #[arg(long)]
        skip_publish: bool,
    },

    /// Print one project's diagram source without rendering or publishing.
    Preview {
        /// Project name.
        #[arg(short, long)]
        project: String,
    },

    /// List the organization's projects.
    Projects,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default config file and header template.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Config + tracing setup
// ---------------------------------------------------------------------------

/// Load the config file and apply command-line overrides.
///
/// `config init` may name a file that does not exist yet; defaults are used
/// until it is written.
pub(crate) fn load_app_config(cli: &Cli) -> Result<AppConfig> {
    let initializing = matches!(
        cli.command,
        Command::Config {
            action: ConfigAction::Init
        }
    );
    let mut config = match &cli.config {
        Some(path) if initializing && !path.exists() => AppConfig::default(),
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(url) = &cli.org_url {
        config.organization.url = url.clone();
    }
    if let Some(username) = &cli.username {
        config.organization.username = username.clone();
    }
    Ok(config)
}

/// Initialize tracing: console output plus, for platform commands, a
/// date-stamped log file under the configured logs folder.
///
/// Console lines go through `spinner` so they never tear its redraws.
pub(crate) fn init_tracing(cli: &Cli, config: &AppConfig, spinner: &ProgressBar) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

    let filter = match cli.verbose {
        0 => "projectmap=info",
        1 => "projectmap=debug",
        _ => "projectmap=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // stderr keeps stdout clean for `preview` output.
    let writer = SpinnerWriter::new(spinner.clone());
    let console: Box<dyn Layer<Registry> + Send + Sync> = match cli.log_format {
        LogFormat::Text => fmt::layer().with_target(false).with_writer(writer).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    };

    let file_layer = match cli.command {
        Command::Config { .. } => None,
        _ => {
            let file = open_log_file(&config.paths.logs_dir)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new("projectmap=debug")),
            )
        }
    };

    tracing_subscriber::registry()
        .with(console.with_filter(env_filter))
        .with(file_layer)
        .init();
    Ok(())
}

/// Console log writer that hides the spinner while a line is written.
#[derive(Clone)]
struct SpinnerWriter {
    spinner: ProgressBar,
}

impl SpinnerWriter {
    fn new(spinner: ProgressBar) -> Self {
        Self { spinner }
    }
}

impl io::Write for SpinnerWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.spinner.suspend(|| io::stderr().write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.spinner.suspend(|| io::stderr().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.spinner.suspend(|| io::stderr().flush())
    }
}

impl<'a> MakeWriter<'a> for SpinnerWriter {
    type Writer = SpinnerWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Open today's log file for appending, creating the folder if needed.
fn open_log_file(logs_dir: &Path) -> Result<std::fs::File> {
    ensure_dir(logs_dir)?;
    let path = log_file_path(logs_dir, chrono::Local::now().date_naive());
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| eyre!("cannot open log file {}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command. `spinner` is the bar the console logs suspend.
pub(crate) async fn run(cli: Cli, config: AppConfig, spinner: ProgressBar) -> Result<()> {
    match cli.command {
        Command::Run {
            project,
            skip_publish,
        } => cmd_run(&config, project, skip_publish, spinner).await,
        Command::Preview { project } => cmd_preview(&config, &project).await,
        Command::Projects => cmd_projects(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(cli.config.as_deref(), &config),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Build a run context from the resolved config.
fn run_context(config: &AppConfig, workspace: &Workspace) -> Result<RunContext> {
    let platform = PlatformConfig::try_from(config)?;
    let client = DevOpsClient::new(&platform)?;

    let mut ctx = RunContext::new(
        client,
        workspace,
        Renderer::from(&config.render),
        config.wiki.page_path.clone(),
    );
    ctx.fetch = FetchOptions {
        expand_repository: config.fetch.expand_repository,
        detail_concurrency: config.fetch.detail_concurrency as usize,
        deadline: None,
    };
    ctx.run_timeout = Some(Duration::from_secs(config.fetch.run_timeout_secs));
    Ok(ctx)
}

/// Log line that opens every `run`.
const START_MARKER: &str = "START";

/// Closing log line for a run; `None` means the run aborted before any
/// project was processed.
fn exit_marker(report: Option<&RunReport>) -> &'static str {
    match report {
        Some(report) if report.is_success() => "EXIT 0",
        _ => "EXIT 1",
    }
}

async fn cmd_run(
    config: &AppConfig,
    only: Vec<String>,
    skip_publish: bool,
    spinner: ProgressBar,
) -> Result<()> {
    info!("{START_MARKER}");

    let report = match execute_run(config, only, skip_publish, spinner).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "run aborted");
            info!("{}", exit_marker(None));
            return Err(e);
        }
    };

    print_summary(&report);

    for outcome in report.failed() {
        if let Err(e) = &outcome.result {
            error!(project = %outcome.project.name, error = %e, "project failed");
        }
    }
    info!("{}", exit_marker(Some(&report)));

    let failed = report.failed().count();
    if failed == 0 {
        Ok(())
    } else {
        Err(eyre!(
            "{failed} of {} projects failed; see the log for details",
            report.outcomes.len()
        ))
    }
}

async fn execute_run(
    config: &AppConfig,
    only: Vec<String>,
    skip_publish: bool,
    spinner: ProgressBar,
) -> Result<RunReport> {
    let workspace = bootstrap(&config.paths)?;
    let mut ctx = run_context(config, &workspace)?;
    ctx.only_projects = only;
    ctx.skip_publish = skip_publish;

    info!(
        organization = %ctx.client.organization(),
        skip_publish,
        "processing organization"
    );

    let reporter = CliProgress::new(spinner);
    let result = projectmap_core::run(&ctx, &reporter).await;
    if result.is_err() {
        reporter.spinner.finish_and_clear();
    }
    Ok(result?)
}

fn print_summary(report: &RunReport) {
    println!();
    println!("  Run {}", report.run_id);
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => {
                let published = summary
                    .publish
                    .as_ref()
                    .map(|p| p.attachment_name.as_str())
                    .unwrap_or("not published");
                println!(
                    "  ✓ {:<30} {:>3} repos {:>3} pipelines  {published}",
                    outcome.project.name, summary.repositories, summary.pipelines
                );
            }
            Err(e) => println!("  ✗ {:<30} {e}", outcome.project.name),
        }
    }
    println!();
    println!(
        "  Succeeded: {}  Failed: {}  Time: {:.1}s",
        report.succeeded().count(),
        report.failed().count(),
        report.elapsed.as_secs_f64()
    );
    println!();
}

async fn cmd_preview(config: &AppConfig, project: &str) -> Result<()> {
    let workspace = bootstrap(&config.paths)?;
    let ctx = run_context(config, &workspace)?;

    info!(project, "building preview");
    let document = preview_project(&ctx, project).await?;
    print!("{document}");
    Ok(())
}

async fn cmd_projects(config: &AppConfig) -> Result<()> {
    let platform = PlatformConfig::try_from(config)?;
    let client = DevOpsClient::new(&platform)?;

    let projects = client.list_projects().await?;
    for project in &projects {
        println!("{}", project.name);
    }
    info!(count = projects.len(), "listed projects");
    Ok(())
}

fn cmd_config_init(path: Option<&Path>, config: &AppConfig) -> Result<()> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if init_config(&path)? {
        println!("Config initialized at: {}", path.display());
    } else {
        println!("Config already exists at: {}", path.display());
    }

    let template = &config.paths.header_template;
    if template.exists() {
        println!("Header template already exists at: {}", template.display());
    } else {
        if let Some(parent) = template.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        std::fs::write(template, DEFAULT_HEADER)
            .map_err(|e| eyre!("cannot write {}: {e}", template.display()))?;
        println!("Header template written to: {}", template.display());
    }
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(spinner: ProgressBar) -> Self {
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn project_started(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {name}"));
    }

    fn project_finished(&self, outcome: &ProjectOutcome) {
        let mark = if outcome.result.is_ok() { "✓" } else { "✗" };
        self.spinner
            .println(format!("  {mark} {}", outcome.project.name));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
