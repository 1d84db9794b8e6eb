mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::add::AddOptions;
use commands::{
    Overrides, EXIT_FAILURE, EXIT_STORE_ERROR, EXIT_VALIDATION_ERROR, STORE_PREFIX,
    VALIDATION_PREFIX,
};
use provis_core::install_signal_handler;
use provis_schema::{ConfigId, LayerName};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "provis",
    version,
    about = "Incremental feature-pack installer with staged, atomic promotion"
)]
struct Cli {
    /// Path to the installation directory.
    #[arg(short, long, default_value = ".", global = true)]
    installation: String,

    /// Local feature-pack repository (overrides installer.json).
    #[arg(long, global = true)]
    repository: Option<PathBuf>,

    /// Channel manifest listing available versions (overrides installer.json).
    #[arg(long, global = true)]
    channel: Option<PathBuf>,

    /// Feature-pack templates file (overrides installer.json).
    #[arg(long, global = true)]
    templates: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create an empty installation and record its settings.
    Init,
    /// Query and add feature-packs.
    #[command(subcommand)]
    FeaturePack(FeaturePackCommand),
    /// Promote a previously staged candidate into the installation.
    Apply {
        /// Staging directory written by `feature-pack add --stage-only`.
        staging: PathBuf,
    },
    /// Delete a staged candidate without applying it.
    Discard {
        /// Staging directory to remove.
        staging: PathBuf,
    },
    /// Show the installed provisioning configuration.
    Show,
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum FeaturePackCommand {
    /// Check whether a feature-pack can be resolved through the channels.
    Available {
        /// Coordinate `groupId:artifactId[:version]`.
        coordinate: String,
    },
    /// Add a feature-pack to the installation.
    Add {
        /// Coordinate `groupId:artifactId[:version]`.
        coordinate: String,
        /// Install only these layers (comma-separated).
        #[arg(long, value_delimiter = ',')]
        layers: Vec<String>,
        /// Config to provision as `model/name`, `model/` or `name`. Repeatable;
        /// with --layers, the single config the layers are merged into.
        #[arg(long = "config")]
        configs: Vec<ConfigId>,
        /// Where to build the candidate installation.
        #[arg(long)]
        staging_dir: Option<PathBuf>,
        /// Stop after staging; promote later with `provis apply`.
        #[arg(long, default_value_t = false)]
        stage_only: bool,
        /// Accept the feature-pack's license agreements without prompting.
        #[arg(long, default_value_t = false)]
        accept_license_agreements: bool,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("PROVIS_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let root = match commands::absolute(&expand_tilde(&cli.installation)) {
        Ok(root) => root,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let overrides = Overrides {
        repository: cli.repository,
        channel: cli.channel,
        templates: cli.templates,
    };
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Init => commands::init::run(&root, &overrides, json_output),
        Commands::FeaturePack(FeaturePackCommand::Available { coordinate }) => {
            commands::available::run(&root, &overrides, &coordinate, json_output)
        }
        Commands::FeaturePack(FeaturePackCommand::Add {
            coordinate,
            layers,
            configs,
            staging_dir,
            stage_only,
            accept_license_agreements,
        }) => commands::add::run(
            &root,
            &overrides,
            &coordinate,
            &AddOptions {
                layers: layers
                    .iter()
                    .filter(|l| !l.trim().is_empty())
                    .map(|l| LayerName::from(l.trim()))
                    .collect(),
                configs,
                staging: staging_dir,
                stage_only,
                accept_licenses: accept_license_agreements,
            },
            json_output,
        ),
        Commands::Apply { staging } => {
            commands::apply::run(&root, &overrides, &staging, json_output)
        }
        Commands::Discard { staging } => {
            commands::discard::run(&root, &overrides, &staging, json_output)
        }
        Commands::Show => commands::show::run(&root, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with(VALIDATION_PREFIX) {
                EXIT_VALIDATION_ERROR
            } else if msg.starts_with(STORE_PREFIX) {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
