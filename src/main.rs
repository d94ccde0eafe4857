mod cli;

use multi_platform::config::ProjectConfig;
use multi_platform::error::PluginResult;
use multi_platform::plugin::{PluginLifecycleManager, PluginRecord};
use multi_platform::transform::{
    DocumentState, PlatformTarget, TransformOrchestrator, TransformOutcome,
};
use multi_platform::utils::paths::get_logs_dir;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, PluginCommand};
use std::fs;
use std::path::{Path, PathBuf};

/// Initialize file-based logging.
///
/// Logs are written to `<data_local_dir>/multi-platform/logs/mpt.log`, never
/// inside the project. Level is controlled with RUST_LOG (default: info).
/// Falls back to warnings on stderr when the log directory is unusable.
fn init_file_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let logs_dir = match get_logs_dir() {
        Ok(dir) => dir,
        Err(_) => {
            init_stderr_logging();
            return None;
        }
    };

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Could not create logs directory: {}", e);
        init_stderr_logging();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&logs_dir, "mpt.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    Some(guard)
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Guard must outlive the command so buffered log lines are flushed
    let _log_guard = init_file_logging();
    tracing::info!("mpt starting: {:?}", cli.command);

    match cli.command {
        Commands::Plugin { command } => handle_plugin_command(command, &cli.path),
        Commands::Init => handle_init(&cli.path),
        Commands::Transform { platforms } => handle_transform(&cli.path, platforms),
        Commands::Status => handle_status(&cli.path),
        Commands::Record { document, outputs } => handle_record(&cli.path, document, outputs),
    }
}

/// Unwrap a required positional argument or exit with status 1.
fn require_target(value: Option<String>, what: &str, usage: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => {
            eprintln!("{}", error_line(format!("Missing {}", what)));
            eprintln!("Usage: mpt plugin {}", usage);
            std::process::exit(1);
        }
    }
}

/// Operator-facing failure line: red `[ERROR]` prefix, then the message.
fn error_line(message: impl std::fmt::Display) -> String {
    format!("\x1b[31m[ERROR]\x1b[0m {}", message)
}

/// Corrupt stores propagate; every other plugin failure is reported and
/// ends the process with status 1.
fn check<T>(result: PluginResult<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            tracing::warn!("Plugin operation failed: {}", e);
            eprintln!("{}", error_line(e));
            std::process::exit(1);
        }
    }
}

fn plugin_manager(base: &Path) -> Result<PluginLifecycleManager> {
    let config = ProjectConfig::load(base)?;
    Ok(PluginLifecycleManager::new(base, &config.plugins))
}

fn handle_plugin_command(command: PluginCommand, base: &Path) -> Result<()> {
    let manager = plugin_manager(base)?;

    match command {
        PluginCommand::List { all } => {
            let plugins = check(manager.list_plugins(all))?;
            print_plugin_table(&plugins, all);
        }
        PluginCommand::Install { source } => {
            let source = require_target(source, "plugin source", "install <source>");
            let result = check(manager.install(&source))?;
            println!(
                "\x1b[32m[OK]\x1b[0m Installed plugin '{}' v{} to {}",
                result.plugin_name,
                result.version,
                result.path.display()
            );
            println!("Enable it with: mpt plugin enable {}", result.plugin_name);
        }
        PluginCommand::Update { name } => {
            let name = require_target(name, "plugin name", "update <name>");
            let result = check(manager.update(&name))?;
            println!(
                "\x1b[32m[OK]\x1b[0m Updated plugin '{}' to v{}",
                result.plugin_name, result.version
            );
        }
        PluginCommand::Enable { name } => {
            let name = require_target(name, "plugin name", "enable <name>");
            check(manager.enable(&name))?;
            println!("Plugin '{}' enabled", name);
        }
        PluginCommand::Disable { name } => {
            let name = require_target(name, "plugin name", "disable <name>");
            check(manager.disable(&name))?;
            println!("Plugin '{}' disabled", name);
        }
    }
    Ok(())
}

fn print_plugin_table(plugins: &[PluginRecord], all: bool) {
    if plugins.is_empty() {
        if all {
            println!("No plugins installed.");
            println!("\nInstall plugins with: mpt plugin install <source>");
        } else {
            println!("No enabled plugins.");
            println!("\nSee all plugins with: mpt plugin list --all");
        }
        return;
    }

    println!("{:<20} {:<12} {:<10} HOOKS", "NAME", "VERSION", "STATUS");
    println!("{}", "-".repeat(60));

    for plugin in plugins {
        let status = if plugin.enabled { "enabled" } else { "disabled" };
        let name = if plugin.builtin {
            format!("{} (builtin)", plugin.name)
        } else {
            plugin.name.clone()
        };
        let hooks = if plugin.hooks.is_empty() {
            "-".to_string()
        } else {
            plugin.hooks.join(", ")
        };
        println!("{:<20} {:<12} {:<10} {}", name, plugin.version, status, hooks);
    }
}

fn handle_init(base: &Path) -> Result<()> {
    let report = TransformOrchestrator::new(base).initialize()?;
    if report.config_created {
        println!("Created default configuration");
    }
    println!(
        "Initialized multi-platform project at {}",
        report.workspace.display()
    );
    Ok(())
}

fn handle_transform(base: &Path, platforms: Option<Vec<String>>) -> Result<()> {
    let orchestrator = TransformOrchestrator::new(base);

    match orchestrator.transform(platforms.as_deref())? {
        TransformOutcome::NoRequirements { targets } => {
            print_targets(&targets);
            println!("Warning: No requirement documents found in requirements/");
            println!("Please add your PRD.md or other requirement documents.");
        }
        TransformOutcome::Prepared(plan) => {
            print_targets(&plan.targets);
            if let Some(ref backup) = plan.backup {
                println!("Backup created: {}", backup.display());
            }

            println!("\nRequirement documents ({}):", plan.documents.len());
            for document in &plan.documents {
                println!("  - {}", document.display());
            }
            println!("\nOutput directories:");
            for dir in &plan.output_dirs {
                println!("  - {}", dir.display());
            }

            println!("\nReady for transformation.");
            println!("Record generated files with: mpt record <document> <output>...");
        }
    }
    Ok(())
}

fn print_targets(targets: &[PlatformTarget]) {
    let codes: Vec<&str> = targets.iter().map(|t| t.code.as_str()).collect();
    println!("Target platforms: {}", codes.join(", "));
}

fn handle_status(base: &Path) -> Result<()> {
    let orchestrator = TransformOrchestrator::new(base);

    let platforms = orchestrator.enabled_platforms()?;
    println!("\nEnabled platforms ({}):", platforms.len());
    for platform in &platforms {
        println!("  - {} ({})", platform.display_name, platform.code);
    }

    let documents = orchestrator.document_status()?;
    if !documents.is_empty() {
        println!("\nRequirement documents ({}):", documents.len());
        for document in &documents {
            let state = match document.state {
                DocumentState::Cached => "cached",
                DocumentState::Changed => "changed",
            };
            let name = document
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| document.path.display().to_string());
            println!("  - {} [{}]", name, state);
        }
    }
    Ok(())
}

fn handle_record(base: &Path, document: Option<PathBuf>, outputs: Vec<String>) -> Result<()> {
    let Some(document) = document else {
        eprintln!("{}", error_line("Missing requirement document"));
        eprintln!("Usage: mpt record <document> [OUTPUT...]");
        std::process::exit(1);
    };

    let count = outputs.len();
    TransformOrchestrator::new(base).record_outputs(&document, outputs)?;
    println!(
        "\x1b[32m[OK]\x1b[0m Recorded {} output file(s) for {}",
        count,
        document.display()
    );
    Ok(())
}
