use clap::{Args, Parser, Subcommand};
use notesplit::{Config, NoteSplitter};
use std::path::PathBuf;

/// Split multi-note recordings into pitch-named samples
#[derive(Parser)]
#[command(name = "notesplit")]
#[command(about = "Cut recorded takes into individual, pitch-tagged note samples")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the processing commands
#[derive(Args)]
struct RunOptions {
    /// Output directory for results
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Custom configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detect and log only, write no files
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Split takes into one sample file per note
    Split {
        /// Input WAV files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        options: RunOptions,
    },
    /// Trim the silence ahead of single-note sample files
    Trim {
        /// Input WAV files, one note each
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        options: RunOptions,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn prepare(options: &RunOptions) -> anyhow::Result<Config> {
    if options.verbose && options.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }
    init_logging(options.verbose, options.quiet);

    let mut config = if let Some(config_path) = &options.config {
        notesplit::config::load_config(config_path)?
    } else {
        Config::default()
    };
    if options.dry_run {
        config.export.dry_run = true;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Split { inputs, options } => {
            let config = prepare(&options)?;
            notesplit::config::validate_config(&config)?;

            let processor = NoteSplitter::new(config);
            let batch = processor.process_batch(&inputs, &options.output);
            if batch.has_failures() {
                anyhow::bail!("{} of {} files failed", batch.failures(), batch.files.len());
            }
        }
        Commands::Trim { inputs, options } => {
            let config = prepare(&options)?;
            notesplit::config::validate_config(&config)?;

            let processor = NoteSplitter::new(config);
            let (_stats, failures) = processor.trim_batch(&inputs, &options.output);
            if failures > 0 {
                anyhow::bail!("{} of {} files failed", failures, inputs.len());
            }
        }
        Commands::ValidateConfig { config } => {
            let config = notesplit::config::load_config(config)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}
