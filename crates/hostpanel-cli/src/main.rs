//! Hostpanel CLI - plugin and theme administration

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use hostpanel_core::config::Config;
use hostpanel_core::events::{CompositePublisher, EventPublisher, InMemoryEventStore, TracingEventPublisher};
use hostpanel_core::fs::{Filesystem, LocalFilesystem};
use hostpanel_plugins::adapters::{
    FsAssetPublisher, JsonlPluginRepository, JsonlSettingsStore, ManifestRuntimeLoader, MigrationLedger,
};
use hostpanel_plugins::packages::ComposerInstaller;
use hostpanel_plugins::scanner::PluginScanner;
use hostpanel_plugins::security::StaticSecurityScanner;
use hostpanel_plugins::validator::PluginManifestValidator;
use hostpanel_plugins::{
    EnabledPluginsCache, Plugin, PluginError, PluginManager, PluginServices, PluginState, PostCommit,
};
use hostpanel_themes::archive::UploadLimits;
use hostpanel_themes::copy::ThemeCopyService;
use hostpanel_themes::export::ThemeExportService;
use hostpanel_themes::validator::TemplateManifestValidator;
use hostpanel_themes::{ThemeCatalog, ThemeDirs, ThemeError, ThemeUpgradeService, ThemeUploadService};

#[derive(Parser)]
#[command(name = "hostpanel")]
#[command(author, version, about = "Plugin and theme administration for Hostpanel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage plugins
    Plugins {
        #[command(subcommand)]
        action: PluginAction,
    },

    /// Manage themes
    Themes {
        #[command(subcommand)]
        action: ThemeAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PluginAction {
    /// List known plugins
    List {
        /// Only plugins in this state (registered, enabled, disabled, update_pending, faulted)
        #[arg(short, long, value_parser = parse_state)]
        state: Option<PluginState>,
    },
    /// Show plugin details
    Show { name: String },
    /// Scan the plugins directory and register new or updated plugins
    Discover,
    /// Enable a plugin
    Enable { name: String },
    /// Disable a plugin
    Disable {
        name: String,
        /// Also disable every enabled plugin that depends on it
        #[arg(long)]
        cascade: bool,
    },
    /// Move a faulted plugin back to registered
    Reset { name: String },
    /// Remove a plugin's record and settings
    Uninstall {
        name: String,
        /// Keep the plugin directory on disk
        #[arg(long)]
        keep_files: bool,
    },
    /// Install a plugin's package dependencies
    InstallDeps {
        name: String,
        /// Remove previously installed packages first
        #[arg(long)]
        clean: bool,
    },
    /// Show plugin counts per state
    Stats,
}

#[derive(Subcommand)]
enum ThemeAction {
    /// List installed themes
    List,
    /// Install a theme from a ZIP archive
    Upload {
        archive: PathBuf,
        /// Install even when the theme raises non-critical warnings
        #[arg(long)]
        ignore_warnings: bool,
    },
    /// Migrate a legacy theme to the panel/landing/email layout
    Upgrade {
        name: String,
        /// Skip the backup copy
        #[arg(long)]
        no_backup: bool,
    },
    /// Copy a theme under a new name
    Copy { source: String, target: String },
    /// Package a theme as an uploadable ZIP archive
    Export { name: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Show config file path
    Path,
}

fn parse_state(value: &str) -> Result<PluginState, String> {
    PluginState::from_str(value).ok_or_else(|| {
        let valid: Vec<&str> = PluginState::ALL.iter().map(PluginState::as_str).collect();
        format!("unknown state '{}', expected one of: {}", value, valid.join(", "))
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_directive = if cli.quiet { "hostpanel=warn" } else { "hostpanel=info" };
    let filter = match default_directive.parse() {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(_) => tracing_subscriber::EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Plugins { action } => cmd_plugins(action, cli.format, cli.quiet),
        Commands::Themes { action } => cmd_themes(action, cli.format, cli.quiet),
        Commands::Config { action } => cmd_config(action, cli.format, cli.quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// Print the error chain, plus the stable code and suggestion of the first typed error in it
fn report_error(err: &anyhow::Error) {
    eprintln!("Error: {}", err);
    for cause in err.chain().skip(1) {
        eprintln!("  Caused by: {}", cause);
    }

    let diagnosis = err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<PluginError>() {
            Some((e.code(), e.suggestion()))
        } else if let Some(e) = cause.downcast_ref::<ThemeError>() {
            Some((e.code(), e.suggestion()))
        } else {
            cause
                .downcast_ref::<hostpanel_core::Error>()
                .map(|e| (e.code(), e.suggestion()))
        }
    });
    if let Some((code, suggestion)) = diagnosis {
        eprintln!("  Code: {}", code);
        if let Some(suggestion) = suggestion {
            eprintln!("  Suggestion: {}", suggestion);
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Plugins
// ============================================================================

/// Plugin manager wired to the disk-backed adapters of one project
struct PluginRuntime {
    manager: PluginManager,
    repository: Arc<JsonlPluginRepository>,
    cache: EnabledPluginsCache,
    events: Arc<InMemoryEventStore>,
}

impl PluginRuntime {
    fn open(config: &Config) -> anyhow::Result<Self> {
        let paths = &config.paths;
        let data_dir = paths.data_dir();
        let fs: Arc<dyn Filesystem> = Arc::new(LocalFilesystem::new());

        let repository = Arc::new(JsonlPluginRepository::new(&data_dir));
        let events = Arc::new(InMemoryEventStore::new());
        let publishers: Vec<Arc<dyn EventPublisher>> = vec![Arc::new(TracingEventPublisher), events.clone()];

        let validator = PluginManifestValidator::new(config.host_version()?);
        let scanner = PluginScanner::new(paths.plugins_dir(), validator);
        let services = PluginServices {
            repository: repository.clone(),
            settings: Arc::new(JsonlSettingsStore::new(&data_dir)),
            loader: Arc::new(ManifestRuntimeLoader::new()),
            assets: Arc::new(FsAssetPublisher::new(paths.plugin_assets_dir(), fs.clone())),
            migrations: Arc::new(MigrationLedger::new(&data_dir)),
            installer: Arc::new(ComposerInstaller::resolved(
                &config.packages.installer,
                Duration::from_secs(config.packages.timeout_secs),
            )),
            security: Arc::new(StaticSecurityScanner::new()),
            events: Arc::new(CompositePublisher::new(publishers)),
            fs: fs.clone(),
        };

        tracing::debug!(plugins_dir = %paths.plugins_dir().display(), data_dir = %data_dir.display(), "Plugin runtime ready");
        Ok(Self {
            manager: PluginManager::new(scanner, services),
            repository,
            cache: EnabledPluginsCache::new(paths.cache_dir(), fs),
            events,
        })
    }

    /// Refresh caches once a lifecycle change is persisted
    fn commit(&self, post_commit: PostCommit) -> anyhow::Result<()> {
        let operation = post_commit.operation();
        post_commit
            .apply(&self.cache, self.repository.as_ref())
            .with_context(|| format!("Plugin {} succeeded but the cache refresh failed", operation))?;
        Ok(())
    }

    fn print_events(&self, quiet: bool) {
        if quiet {
            return;
        }
        for event in self.events.all_events() {
            println!("  [event] {} ({})", event.event_type, event.aggregate_name);
        }
    }
}

fn cmd_plugins(action: PluginAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let runtime = PluginRuntime::open(&config)?;
    let manager = &runtime.manager;
    let json = format == OutputFormat::Json;

    match action {
        PluginAction::List { state } => {
            let plugins = match state {
                Some(state) => manager.get_plugins_in_state(state)?,
                None => manager.get_all_plugins()?,
            };
            if json {
                return print_json(&plugins);
            }
            if plugins.is_empty() {
                if !quiet {
                    println!("No plugins found.");
                    println!();
                    println!("Run `hostpanel plugins discover` to scan the plugins directory.");
                }
                return Ok(());
            }
            println!("{:<24} {:<12} {:<15} DESCRIPTION", "NAME", "VERSION", "STATE");
            for plugin in &plugins {
                println!(
                    "{:<24} {:<12} {:<15} {}",
                    plugin.name,
                    plugin.version,
                    plugin.state(),
                    plugin.description
                );
            }
        }

        PluginAction::Show { name } => {
            let plugin = manager.find_plugin(&name)?;
            if json {
                return print_json(&plugin);
            }
            print_plugin(&plugin);
        }

        PluginAction::Discover => {
            let report = manager.discover_and_register_plugins()?;
            if json {
                return print_json(&report);
            }
            if !quiet {
                println!("Plugin discovery finished");
                println!("  Discovered: {}", report.discovered);
                println!("  Registered: {}", report.registered);
                println!("  Updated: {}", report.updated);
                println!("  Failed: {}", report.failed);
                for (plugin, errors) in &report.errors {
                    println!();
                    println!("  {}:", plugin);
                    for error in errors {
                        println!("    - {}", error);
                    }
                }
                runtime.print_events(quiet);
            }
        }

        PluginAction::Enable { name } => {
            let mut plugin = manager.find_plugin(&name)?;
            let post_commit = manager.enable_plugin(&mut plugin)?.into_result()?;
            runtime.commit(post_commit)?;

            if json {
                return print_json(&plugin);
            }
            if !quiet {
                println!("Plugin '{}' enabled (version {})", plugin.name, plugin.version);
                runtime.print_events(quiet);
            }
        }

        PluginAction::Disable { name, cascade } => {
            let mut plugin = manager.find_plugin(&name)?;
            let post_commit = manager.disable_plugin(&mut plugin, cascade)?;
            let disabled = post_commit.plugins().to_vec();
            runtime.commit(post_commit)?;

            if json {
                return print_json(&disabled);
            }
            if !quiet {
                println!("Disabled: {}", disabled.join(", "));
                runtime.print_events(quiet);
            }
        }

        PluginAction::Reset { name } => {
            let mut plugin = manager.find_plugin(&name)?;
            manager.reset_plugin(&mut plugin)?;
            if json {
                return print_json(&plugin);
            }
            if !quiet {
                println!("Plugin '{}' reset to {}", plugin.name, plugin.state());
                println!();
                println!("Next steps:");
                println!("  hostpanel plugins enable {}", plugin.name);
            }
        }

        PluginAction::Uninstall { name, keep_files } => {
            let mut plugin = manager.find_plugin(&name)?;
            let post_commit = match manager.delete_plugin(&mut plugin, !keep_files) {
                Ok(post_commit) => post_commit,
                Err(e) => {
                    if let Some(pending) = e.pending_post_commit() {
                        runtime.commit(pending.clone())?;
                    }
                    return Err(e.into());
                }
            };
            runtime.commit(post_commit)?;

            if json {
                return print_json(&serde_json::json!({
                    "plugin": plugin.name,
                    "files_removed": !keep_files,
                }));
            }
            if !quiet {
                println!("Plugin '{}' uninstalled", plugin.name);
                if keep_files {
                    println!("  Files kept: {}", plugin.path.display());
                }
                runtime.print_events(quiet);
            }
        }

        PluginAction::InstallDeps { name, clean } => {
            let plugin = manager.find_plugin(&name)?;
            let output = manager.install_dependencies(&plugin, clean)?;
            if json {
                return print_json(&serde_json::json!({
                    "plugin": plugin.name,
                    "installed": output.is_some(),
                    "duration_ms": output.as_ref().map(|o| o.duration.as_millis() as u64),
                }));
            }
            if quiet {
                return Ok(());
            }
            match output {
                Some(output) => {
                    println!(
                        "Installed package dependencies for '{}' in {:.1}s",
                        plugin.name,
                        output.duration.as_secs_f64()
                    );
                    if !output.stdout.trim().is_empty() {
                        println!();
                        println!("{}", output.stdout.trim_end());
                    }
                }
                None => println!("Plugin '{}' declares no package dependencies.", plugin.name),
            }
        }

        PluginAction::Stats => {
            let stats = manager.statistics()?;
            if json {
                return print_json(&stats);
            }
            println!("Plugins");
            println!("  Total: {}", stats.total);
            println!("  Enabled: {}", stats.enabled);
            println!("  Disabled: {}", stats.disabled);
            println!("  Faulted: {}", stats.faulted);
        }
    }
    Ok(())
}

fn print_plugin(plugin: &Plugin) {
    println!("{} ({})", plugin.display_name, plugin.name);
    println!("  Version: {}", plugin.version);
    println!("  State: {}", plugin.state());
    if let Some(reason) = plugin.fault_reason() {
        println!("  Fault: {}", reason);
    }
    if !plugin.author.is_empty() {
        println!("  Author: {}", plugin.author);
    }
    if !plugin.license.is_empty() {
        println!("  License: {}", plugin.license);
    }
    println!("  Path: {}", plugin.path.display());
    if !plugin.description.is_empty() {
        println!("  Description: {}", plugin.description);
    }
    if !plugin.requires.is_empty() {
        println!("  Requires:");
        for (name, constraint) in &plugin.requires {
            println!("    {} {}", name, constraint);
        }
    }
    if !plugin.capabilities.is_empty() {
        println!("  Capabilities: {}", plugin.capabilities.join(", "));
    }
    println!("  Updated: {}", plugin.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));

    if plugin.state() == PluginState::Faulted {
        println!();
        println!("Next steps:");
        println!("  hostpanel plugins reset {}", plugin.name);
    }
}

// ============================================================================
// Themes
// ============================================================================

fn cmd_themes(action: ThemeAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let dirs = ThemeDirs::from(&config.paths);
    let fs: Arc<dyn Filesystem> = Arc::new(LocalFilesystem::new());
    let json = format == OutputFormat::Json;

    match action {
        ThemeAction::List => {
            let themes = ThemeCatalog::new(dirs, config.themes.clone()).list()?;
            if json {
                return print_json(&themes);
            }
            if themes.is_empty() {
                if !quiet {
                    println!("No themes installed in {}", config.paths.themes_dir().display());
                }
                return Ok(());
            }
            println!("{:<24} {:<10} {:<22} ACTIVE", "NAME", "VERSION", "CONTEXTS");
            for theme in &themes {
                let mut active = theme.active_contexts.join(", ");
                if theme.needs_upgrade {
                    active.push_str(" (needs upgrade)");
                }
                println!(
                    "{:<24} {:<10} {:<22} {}",
                    theme.name,
                    theme.manifest.version(),
                    theme.manifest.contexts().join(","),
                    active.trim()
                );
            }
        }

        ThemeAction::Upload {
            archive,
            ignore_warnings,
        } => cmd_theme_upload(&config, dirs, fs, &archive, ignore_warnings, json, quiet)?,

        ThemeAction::Upgrade { name, no_backup } => {
            let service = ThemeUpgradeService::new(dirs, fs, config.host_version()?)
                .with_default_theme(config.themes.default_theme.clone());
            let report = service.upgrade(&name, !no_backup)?;
            if json {
                return print_json(&report);
            }
            if report.already_upgraded {
                if !quiet {
                    println!("Theme '{}' already uses the context-based layout. No action needed.", report.theme);
                }
                return Ok(());
            }
            if !quiet {
                println!("Theme '{}' upgraded", report.theme);
                match &report.backup_path {
                    Some(backup) => println!("  Backup: {}", backup.display()),
                    None => println!("  Backup: skipped"),
                }
                println!("  Moved to panel/: {}", report.moved.len());
                if report.assets_copied {
                    println!("  Assets copied from '{}'", config.themes.default_theme);
                }
            }
        }

        ThemeAction::Copy { source, target } => {
            ThemeCopyService::new(dirs.clone(), fs).copy_theme(&source, &target)?;
            if json {
                return print_json(&serde_json::json!({
                    "source": source,
                    "target": target,
                    "path": dirs.theme_path(&target),
                }));
            }
            if !quiet {
                println!("Theme '{}' copied to '{}'", source, target);
                println!("  Path: {}", dirs.theme_path(&target).display());
            }
        }

        ThemeAction::Export { name } => {
            let path = ThemeExportService::new(dirs, fs).export_theme(&name)?;
            if json {
                return print_json(&serde_json::json!({ "theme": name, "archive": path }));
            }
            if quiet {
                println!("{}", path.display());
            } else {
                println!("Theme '{}' exported", name);
                println!("  Archive: {}", path.display());
            }
        }
    }
    Ok(())
}

fn cmd_theme_upload(
    config: &Config,
    dirs: ThemeDirs,
    fs: Arc<dyn Filesystem>,
    archive: &Path,
    ignore_warnings: bool,
    json: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let validator = TemplateManifestValidator::new(config.host_version()?);
    let service = ThemeUploadService::new(dirs, validator, fs).with_limits(UploadLimits::from(&config.themes));
    let result = service.upload(archive, ignore_warnings)?;

    if json {
        print_json(&result)?;
    } else if !quiet || !result.success {
        if result.success {
            println!("Theme '{}' installed", result.manifest.name());
            if let Some(path) = &result.theme_path {
                println!("  Templates: {}", path.display());
            }
            if let Some(path) = &result.assets_path {
                println!("  Assets: {}", path.display());
            }
        }
        if result.has_warnings() {
            println!("Warnings:");
            for warning in &result.warnings {
                println!("  - {}", warning);
            }
        }
    }

    if !result.success {
        bail!(
            "Theme '{}' was not installed: {} warning(s) need confirmation. Re-run with --ignore-warnings to install anyway.",
            result.manifest.name(),
            result.warnings.len()
        );
    }
    Ok(())
}

// ============================================================================
// Config
// ============================================================================

fn cmd_config(action: ConfigAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let json = format == OutputFormat::Json;
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            if json {
                return print_json(&serde_json::json!({ "key": key, "value": value }));
            }
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if json {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(key, value)| (key, serde_json::Value::String(value)))
                    .collect();
                return print_json(&map);
            }
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod main_tests;
