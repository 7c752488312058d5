mod cmd;
mod config;
mod logging;
mod util;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "project-updater", version, about = "Rewrite TypeScript, HTML, JSON and text files across a project", long_about = None, disable_help_subcommand = true)]
struct Cli {
    /// Log debug output to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured rules and show the resulting diffs
    Update {
        /// Project root
        path: String,
        /// Config file (default: <path>/.project-updater.yaml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Extra directory name to skip; repeatable
        #[arg(long = "skip-dir")]
        skip_dir: Vec<String>,
        /// Write the changes to disk
        #[arg(long)]
        write: bool,
        /// Do not ask before writing
        #[arg(long, short = 'y')]
        yes: bool,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// List the files an update would visit and the format handling each
    Plan {
        /// Project root
        path: String,
        /// Config file (default: <path>/.project-updater.yaml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Extra directory name to skip; repeatable
        #[arg(long = "skip-dir")]
        skip_dir: Vec<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);
    match cli.command {
        Commands::Update { path, config, skip_dir, write, yes, json } => {
            cmd::update::handle_update(cmd::update::UpdateArgs { path, config, skip_dir, write, yes, json }).await
        }
        Commands::Plan { path, config, skip_dir } => cmd::plan::handle_plan(path, config, skip_dir).await,
    }
}
