mod cli;
mod core;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cost-report",
    about = "Daily Azure resource-group cost report posted to Slack",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format for --dry-run and config check
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Debug logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch costs and post the report once
    Run {
        /// Print the report instead of posting it
        #[arg(long)]
        dry_run: bool,
    },
    /// Post the report every day at the configured time
    Schedule,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file and environment
    Check,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output_opts = cli::output::OutputOptions {
        format: cli::output::OutputFormat::parse(cli.json, cli.format.as_deref()),
        pretty: cli.pretty,
        use_color: cli::output::detect_color(!cli.no_color),
        verbose: cli.verbose,
    };

    match cli.command {
        None => cli::run_cmd::run(false, &output_opts).await?,
        Some(Commands::Run { dry_run }) => cli::run_cmd::run(dry_run, &output_opts).await?,
        Some(Commands::Schedule) => cli::schedule_cmd::run(&output_opts).await?,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
        },
    }

    Ok(())
}
