//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use guidepress_core::{
    ItemOutcome, ProgressReporter, PublishCoordinator, RunOptions, RunSummary, rebuild_catalog,
};
use guidepress_shared::config::{
    KEY_ADVISOR_ID, KEY_FETCH_CONTENT, KEY_OUTPUT_DIR, KEY_PORTAL_PASSWORD, KEY_SOURCE_CSV,
};
use guidepress_shared::{
    ConfigStore, GuidePressError, PublishMode, PublishSettings, StoreLocations, locate_config,
};
use guidepress_storage::{CatalogIndex, PublicationState};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// GuidePress: publish partner travel guides without duplicates.
#[derive(Parser)]
#[command(
    name = "guidepress",
    version,
    about = "Publish partner travel guides from an exported sheet as branded pages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./guidepress.conf, then ~/.guidepress/guidepress.conf).
    #[arg(short, long, global = true, env = "GUIDEPRESS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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
    /// Publish every guide in the sheet that has not been published yet.
    Run {
        /// List what would be published without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Publish teasers only, without logging in to the portal.
        #[arg(long)]
        no_fetch: bool,

        /// Guide sheet (CSV) to read.
        #[arg(long, env = "GUIDEPRESS_SOURCE")]
        source: Option<PathBuf>,

        /// Directory receiving pages and index.json.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Advisor token embedded into guide links.
        #[arg(long, env = "GUIDEPRESS_ADVISOR_ID")]
        advisor: Option<String>,
    },

    /// Show publication state and catalog counts.
    Status,

    /// Catalog management.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Catalog subcommands.
#[derive(Subcommand)]
pub(crate) enum CatalogAction {
    /// List published guides in catalog order.
    List {
        /// Print the raw entries as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Rebuild index.json from the sheet and publication state.
    Rebuild,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show the resolved configuration (secrets redacted).
    Show,
    /// Check that a run could start with the current configuration.
    Check,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "guidepress=info",
        1 => "guidepress=debug",
        _ => "guidepress=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let mut store = load_store(cli.config)?;

    match cli.command {
        Command::Run {
            dry_run,
            no_fetch,
            source,
            output,
            advisor,
        } => {
            let overrides = RunOverrides {
                no_fetch,
                source,
                output,
                advisor,
            };
            overrides.apply(&mut store);
            cmd_run(&store, dry_run).await
        }
        Command::Status => cmd_status(&store),
        Command::Catalog { action } => match action {
            CatalogAction::List { json } => cmd_catalog_list(&store, json),
            CatalogAction::Rebuild => cmd_catalog_rebuild(&mut store),
        },
        Command::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&store),
            ConfigAction::Check => cmd_config_check(&store),
        },
    }
}

fn load_store(explicit: Option<PathBuf>) -> Result<ConfigStore> {
    match locate_config(explicit.as_deref()) {
        Some(path) => ConfigStore::load(&path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display())),
        None => {
            info!("no config file found, using defaults");
            Ok(ConfigStore::default())
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
struct RunOverrides {
    no_fetch: bool,
    source: Option<PathBuf>,
    output: Option<PathBuf>,
    advisor: Option<String>,
}

impl RunOverrides {
    fn apply(self, store: &mut ConfigStore) {
        if self.no_fetch {
            store.set(KEY_FETCH_CONTENT, "false");
        }
        if let Some(source) = self.source {
            store.set(KEY_SOURCE_CSV, source.to_string_lossy());
        }
        if let Some(output) = self.output {
            store.set(KEY_OUTPUT_DIR, output.to_string_lossy());
        }
        if let Some(advisor) = self.advisor {
            store.set(KEY_ADVISOR_ID, advisor);
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(store: &ConfigStore, dry_run: bool) -> Result<()> {
    let settings = PublishSettings::from_store(store).map_err(config_error)?;

    info!(
        source = %settings.source_csv.display(),
        output = %settings.output_dir.display(),
        fetch = settings.fetch_content,
        dry_run,
        "starting publish"
    );

    let reporter = CliProgress::new();
    let mut coordinator = PublishCoordinator::from_settings(settings)?;
    let summary = coordinator.run(RunOptions { dry_run }, &reporter).await?;

    println!();
    if summary.dry_run {
        println!("  Dry run: {} guide(s) would be published", summary.candidates.len());
        for name in &summary.candidates {
            println!("    - {name}");
        }
        println!("  Already published: {}", summary.skipped_duplicate);
    } else {
        print_summary(&summary);
    }
    println!();

    if summary.failed > 0 {
        return Err(eyre!(
            "{} guide(s) failed and will be retried on the next run",
            summary.failed
        ));
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("  Publish run complete!");
    println!("  Run:        {}", summary.run_id);
    println!("  Guides:     {}", summary.items);
    if summary.listed > 0 {
        println!("  Listed:     {}", summary.listed);
    }
    println!("  Published:  {} ({} teaser)", summary.published, summary.teasers);
    println!("  Duplicates: {}", summary.skipped_duplicate);
    println!("  Failed:     {}", summary.failed);
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
}

fn cmd_status(store: &ConfigStore) -> Result<()> {
    let locations = StoreLocations::from_store(store)?;
    let state = PublicationState::load(&locations.state_file)?;
    let catalog = CatalogIndex::load(locations.catalog_file(), locations.catalog_sort);

    let full = catalog
        .entries()
        .iter()
        .filter(|e| e.mode == PublishMode::Full)
        .count();
    let last_run = state
        .last_run()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".into());

    println!();
    println!("  State:     {}", locations.state_file.display());
    println!("  Published: {}", state.len());
    println!("  Last run:  {last_run}");
    println!("  Catalog:   {}", locations.catalog_file().display());
    println!("  Entries:   {} ({full} full, {} teaser)", catalog.len(), catalog.len() - full);
    println!();

    if catalog.len() < state.len() {
        println!("  Catalog is missing entries; run `guidepress catalog rebuild`.");
        println!();
    }
    Ok(())
}

fn cmd_catalog_list(store: &ConfigStore, json: bool) -> Result<()> {
    let locations = StoreLocations::from_store(store)?;
    let catalog = CatalogIndex::load(locations.catalog_file(), locations.catalog_sort);

    if json {
        println!("{}", serde_json::to_string_pretty(catalog.entries())?);
        return Ok(());
    }

    if catalog.is_empty() {
        println!("No guides published yet.");
        return Ok(());
    }

    for entry in catalog.entries() {
        let mode = match entry.mode {
            PublishMode::Full => "full",
            PublishMode::Teaser => "teaser",
        };
        println!(
            "{}  {:<6}  {}  ({})",
            entry.published_date.format("%Y-%m-%d"),
            mode,
            entry.title,
            entry.filename
        );
    }
    Ok(())
}

fn cmd_catalog_rebuild(store: &mut ConfigStore) -> Result<()> {
    // Rebuilding never talks to the portal.
    store.set(KEY_FETCH_CONTENT, "false");
    let settings = PublishSettings::from_store(store).map_err(config_error)?;
    let count = rebuild_catalog(&settings)?;
    println!("Catalog rebuilt with {count} entries: {}", settings.catalog_file().display());
    Ok(())
}

fn cmd_config_show(store: &ConfigStore) -> Result<()> {
    match store.path() {
        Some(path) => println!("# {}", path.display()),
        None => println!("# (no config file)"),
    }
    for key in store.keys() {
        let value = if key == KEY_PORTAL_PASSWORD {
            "<redacted>"
        } else {
            store.get_or(key, "")
        };
        println!("{key}={value}");
    }
    Ok(())
}

fn cmd_config_check(store: &ConfigStore) -> Result<()> {
    let settings = PublishSettings::from_store(store).map_err(config_error)?;
    if !settings.source_csv.exists() {
        return Err(eyre!(
            "guide sheet not found at {}",
            settings.source_csv.display()
        ));
    }

    println!("Configuration OK");
    println!("  Source:  {}", settings.source_csv.display());
    println!("  Output:  {}", settings.output_dir.display());
    println!("  Fetch:   {}", if settings.fetch_content { "portal content" } else { "teasers only" });
    if let Some(url) = &settings.portal_guides_url {
        println!("  Listing: {url}");
    }
    if let Some(url) = &settings.notify_webhook_url {
        println!("  Webhook: {url}");
    }
    Ok(())
}

/// Point the user at the config file when keys are missing.
fn config_error(e: GuidePressError) -> color_eyre::Report {
    match e {
        GuidePressError::ConfigMissing { .. } => {
            eyre!(e).wrap_err("configuration incomplete; set the keys in guidepress.conf or pass them as flags")
        }
        other => other.into(),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_started(&self, name: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("Publishing [{current}/{total}] {name}"));
    }

    fn item_finished(&self, name: &str, outcome: &ItemOutcome) {
        let line = match outcome {
            ItemOutcome::Published { output_ref, mode } => match mode {
                PublishMode::Full => format!("  ✓ {name} → {output_ref}"),
                PublishMode::Teaser => format!("  ✓ {name} → {output_ref} (teaser)"),
            },
            ItemOutcome::Failed { reason } => format!("  ✗ {name}: {reason}"),
        };
        self.spinner.println(line);
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
