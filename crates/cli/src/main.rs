mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::migrate::{MigrateArgs, Mode};
use logging::{init_logging, LoggingConfig};

#[derive(Parser)]
#[command(name = "matchbox")]
#[command(about = "Pointer-based PostgreSQL migrations")]
#[command(version)]
struct Cli {
    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Log debug output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migration folder and a config template for a database
    Init {
        /// Root folder holding one subfolder per database
        #[arg(long, short)]
        path: PathBuf,

        /// Name of the database
        #[arg(long, short)]
        database: String,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Create a migration file
    Make {
        /// Title of the migration, camel-cased into the file name
        #[arg(long, short)]
        title: String,

        /// Root folder holding one subfolder per database
        #[arg(long, short)]
        path: PathBuf,

        /// Name of the database
        #[arg(long, short)]
        database: String,
    },

    /// Run migrations
    Migrate {
        /// What to do
        #[arg(long, short, value_enum)]
        mode: Mode,

        /// Root folder holding one subfolder per database
        #[arg(long, short)]
        path: PathBuf,

        /// Name of the database
        #[arg(long, short)]
        database: String,

        /// Config file name inside the database folder
        #[arg(long, short, default_value = "config")]
        config: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging = LoggingConfig::default()
        .json(cli.log_json)
        .verbose(cli.verbose);
    if let Err(e) = init_logging(&logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli.command).await {
        tracing::error!("{:#}", e);
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init { path, database, force } => commands::init::run(&path, &database, force),
        Commands::Make { title, path, database } => commands::make::run(&path, &database, &title),
        Commands::Migrate {
            mode,
            path,
            database,
            config,
            json,
        } => {
            commands::migrate::run(MigrateArgs {
                mode,
                path,
                database,
                config,
                json,
            })
            .await
        }
    }
}
