mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::CliError;
use exechub_core::{install_signal_handler, BuildOptions, HubConfig, HubIO};
use exechub_remote::CatalogQuery;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "hub",
    version,
    about = "Build, usage-test, publish and discover executor images"
)]
struct Cli {
    /// Path to the configuration file (default: ~/.config/exechub/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Registry URL or directory (overrides config and EXECHUB_REGISTRY).
    #[arg(long, global = true)]
    registry: Option<String>,

    /// Namespace images are built and resolved under.
    #[arg(long, global = true)]
    namespace: Option<String>,

    /// Container engine: docker or mock.
    #[arg(long, global = true)]
    engine: Option<String>,

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
#[allow(clippy::struct_excessive_bools)]
enum Commands {
    /// Build an executor image from an artifact directory.
    Build {
        /// Directory containing Dockerfile and manifest.yml.
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Publish the image after a successful build.
        #[arg(long, default_value_t = false)]
        push: bool,
        /// Start the image once and check that it comes up.
        #[arg(long, default_value_t = false)]
        test_uses: bool,
        /// Usage-test in daemon mode instead of waiting for readiness.
        #[arg(long, default_value_t = false)]
        daemon: bool,
        /// Fail on the first error instead of reporting it in the summary.
        #[arg(long, default_value_t = false)]
        raise_error: bool,
        /// Record information about this machine in the summary and catalog.
        #[arg(long, default_value_t = false)]
        host_info: bool,
        /// Refuse to replace an image already in the catalog.
        #[arg(long, default_value_t = false)]
        no_overwrite: bool,
        /// Seconds to wait for the container to become ready.
        #[arg(long)]
        timeout_ready: Option<u64>,
    },
    /// Pull an image by `[namespace/]name[:version]`.
    Pull {
        /// Image reference; without a version the highest published one is used.
        reference: String,
    },
    /// List published images matching all given filters.
    List {
        /// Exact executor name.
        #[arg(long)]
        name: Option<String>,
        /// Match entries carrying any of these keywords.
        #[arg(long, num_args = 1..)]
        keywords: Vec<String>,
        /// Exact executor type.
        #[arg(long = "type")]
        executor_type: Option<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn load_config(cli: &Cli) -> Result<HubConfig, CliError> {
    let mut config = match cli.config {
        Some(ref path) => HubConfig::load(path)?,
        None => HubConfig::load_default()?,
    };
    config.apply_env();
    if let Some(ref url) = cli.registry {
        config.registry.url = Some(url.clone());
    }
    if let Some(ref ns) = cli.namespace {
        config.namespace.clone_from(ns);
    }
    if let Some(ref engine) = cli.engine {
        config.engine.clone_from(engine);
    }
    Ok(config)
}

fn check_prereqs(config: &HubConfig, command: &Commands) -> Result<(), CliError> {
    let needs_engine = matches!(command, Commands::Build { .. } | Commands::Pull { .. });
    if !needs_engine
        || config.engine != "docker"
        || std::env::var("EXECHUB_SKIP_PREREQS").as_deref() == Ok("1")
    {
        return Ok(());
    }
    let missing = exechub_runtime::check_docker_prereqs();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(exechub_runtime::format_missing(&missing).into())
    }
}

fn run(cli: Cli) -> Result<u8, CliError> {
    if let Commands::Completions { shell } = cli.command {
        return commands::completions::run::<Cli>(shell);
    }

    let config = load_config(&cli)?;
    check_prereqs(&config, &cli.command)?;
    let hub = HubIO::from_config(config, None)?;
    let json = cli.json;

    match cli.command {
        Commands::Build {
            path,
            push,
            test_uses,
            daemon,
            raise_error,
            host_info,
            no_overwrite,
            timeout_ready,
        } => commands::build::run(
            &hub,
            &path,
            &BuildOptions {
                push,
                test_uses,
                daemon,
                raise_error,
                host_info,
                no_overwrite,
                timeout_ready: timeout_ready.map(Duration::from_secs),
            },
            json,
        ),
        Commands::Pull { reference } => commands::pull::run(&hub, &reference, json),
        Commands::List {
            name,
            keywords,
            executor_type,
        } => commands::list::run(
            &hub,
            &CatalogQuery {
                name,
                keywords,
                executor_type,
            },
            json,
        ),
        Commands::Completions { .. } => Ok(commands::EXIT_SUCCESS),
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
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
            tracing_subscriber::EnvFilter::try_from_env("EXECHUB_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.code)
        }
    }
}
