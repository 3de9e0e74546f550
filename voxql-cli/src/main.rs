mod ask;
mod connect;
mod output;
mod schema;
mod sql;

use ask::Ask;
use clap::{Parser, Subcommand};
use schema::ShowSchema;
use sql::RunSql;
use tracing::{error, level_filters::LevelFilter};
use tracing_subscriber::{
    EnvFilter,
    fmt::{format, layer},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Subcommand, Debug)]
enum Subcommands {
    Schema(ShowSchema),
    Ask(Ask),
    Sql(RunSql),
}

/// Ask a database questions in plain language, by voice or text.
#[derive(Parser, Debug)]
#[command(name = "voxql", version)]
struct Args {
    #[command(subcommand)]
    command: Subcommands,
}

#[tokio::main]
async fn main() {
    // Must happen before parsing, so `.env` values can fill `env` backed flags.
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(
            layer()
                .with_writer(std::io::stderr)
                .event_format(format().without_time().with_target(false).compact()),
        )
        .init();

    let r = match args.command {
        Subcommands::Schema(cmd) => cmd.run().await,
        Subcommands::Ask(cmd) => cmd.run().await,
        Subcommands::Sql(cmd) => cmd.run().await,
    };

    if let Err(e) = r {
        error!("Command execution failed: {e:#}");
        std::process::exit(1);
    }
}
