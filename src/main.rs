//! LUMASS model runner - Main Entry Point
//!
//! Loads `*.lmx` model files and executes them on a controller thread, the
//! same way an embedding application talks to the controller.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lumass_core::{
    config::ControllerConfig,
    controller::{ComponentSnapshot, ControllerEvent, ControllerWorker, ExecutionOutcome},
    model::processes::BuiltinProcessType,
    ModelController, ProcessFactory,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "lumass")]
#[command(author, version, about = "Execute LUMASS model files", long_about = None)]
struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory to scan for process plugins
    #[arg(long, global = true)]
    plugins: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a model file and execute one of its components
    Run {
        /// Model file (*.lmx)
        model: PathBuf,
        /// Component to execute
        #[arg(short = 'C', long, default_value = "root")]
        component: String,
    },
    /// List the available process types
    ListProcesses,
    /// Parse a model file and print its component tree
    Check {
        /// Model file (*.lmx)
        model: PathBuf,
    },
}

fn init_logging(config: &ControllerConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lumass.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn load_config(cli: &Cli) -> Result<ControllerConfig> {
    let mut config = match &cli.config {
        Some(path) => ControllerConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ControllerConfig::default_path()
            .map(ControllerConfig::load_or_default)
            .unwrap_or_default(),
    };
    if let Some(dir) = &cli.plugins {
        config.plugin_dir = Some(dir.clone());
    }
    Ok(config)
}

fn process_factory(config: &ControllerConfig) -> Arc<ProcessFactory> {
    let factory = ProcessFactory::with_builtins();
    let factory = match config.effective_plugin_dir() {
        Some(dir) => factory.with_plugin_dir(dir),
        None => factory,
    };
    Arc::new(factory)
}

fn print_event(event: &ControllerEvent) {
    match event {
        ControllerEvent::ExecutionStarted { component } => println!("▶ {}", component),
        ControllerEvent::ExecutionStopped { component } => println!("■ {}", component),
        ControllerEvent::ComponentError { component, message } => {
            eprintln!("✗ {}: {}", component, message)
        }
        ControllerEvent::CommandError(message) => eprintln!("✗ {}", message),
        ControllerEvent::ModelLoaded { names } => {
            println!("Loaded {} component(s)", names.len())
        }
        _ => {}
    }
}

fn run(config: &ControllerConfig, model: &Path, component: &str) -> Result<()> {
    let controller = ModelController::new(process_factory(config)).with_indent(config.indent);
    let (bridge, handle) = ControllerWorker::spawn_with_capacity(
        controller,
        config.command_capacity,
        config.event_capacity,
    )
    .context("Failed to start controller thread")?;

    bridge.load_model(model, None);
    bridge.execute_model(component);

    let mut report = None;
    for event in bridge.event_rx.iter() {
        print_event(&event);
        match event {
            ControllerEvent::Finished(r) => {
                report = Some(r);
                break;
            }
            ControllerEvent::CommandError(_) | ControllerEvent::Shutdown => break,
            _ => {}
        }
    }

    bridge.shutdown();
    if handle.join().is_err() {
        tracing::error!("Controller thread panicked");
    }

    let Some(report) = report else {
        bail!("'{}' was not executed", component);
    };
    println!(
        "{} {} in {} (min:sec), {} process update(s)",
        report.component,
        report.outcome.state(),
        report.elapsed_display(),
        report.updates
    );
    match report.outcome {
        ExecutionOutcome::Completed => Ok(()),
        ExecutionOutcome::Aborted => bail!("execution aborted"),
        ExecutionOutcome::Failed { component, message } => {
            bail!("{} failed: {}", component, message)
        }
    }
}

fn list_processes(config: &ControllerConfig) {
    let factory = process_factory(config);
    for alias in factory.registered_processes() {
        let class = factory.class_for_alias(&alias).unwrap_or_else(|| alias.clone());
        let sink = if factory.is_sink(&class) { " (sink)" } else { "" };
        println!("{:<24} {}{}", alias, class, sink);
        let builtin = BuiltinProcessType::all()
            .iter()
            .find(|ty| ty.class_name() == class);
        if let Some(ty) = builtin {
            for line in ty.description().lines() {
                println!("{:<24} {}", "", line.trim());
            }
        }
    }
    let plugins = factory.loaded_plugins();
    if plugins > 0 {
        println!("{} plugin(s) loaded", plugins);
    }
}

fn check(config: &ControllerConfig, model: &Path) -> Result<()> {
    let mut controller = ModelController::new(process_factory(config));
    let register = controller
        .load_model(model, None)
        .with_context(|| format!("Failed to load {}", model.display()))?;

    let repo = controller.repository();
    for snapshot in ComponentSnapshot::capture_all(repo) {
        let depth = repo.host_chain(&snapshot.name).len();
        let kind = snapshot
            .process_type
            .as_deref()
            .unwrap_or(snapshot.class_name.as_str());
        println!(
            "{}{} [{}] level {} x{}",
            "  ".repeat(depth),
            snapshot.name,
            kind,
            snapshot.time_level,
            snapshot.num_iterations
        );
    }
    for (original, registered) in register.iter().filter(|(o, r)| o != r) {
        println!("renamed '{}' to '{}'", original, registered);
    }
    let detached = repo.transient_components();
    for id in &detached {
        println!("'{}' is not attached to any host", repo.name_of(*id));
    }
    if !detached.is_empty() {
        bail!("{} component(s) outside the model tree", detached.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _guard = init_logging(&config);

    tracing::info!("Starting LUMASS model runner");

    match &cli.command {
        Commands::Run { model, component } => run(&config, model, component),
        Commands::ListProcesses => {
            list_processes(&config);
            Ok(())
        }
        Commands::Check { model } => check(&config, model),
    }
}
