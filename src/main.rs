#![cfg(not(tarpaulin_include))]

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use audiencias::{Config, HearingRecord, app, template};

#[derive(Parser)]
#[command(name = "audiencias", version, about = "Hearing record ledgers kept in xlsx workbooks")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create a ledger from the base template
    Create { name: String },
    /// Append the hearing(s) in a JSON file to a ledger
    Add { name: String, json: PathBuf },
    /// List the ledgers in the files directory
    List,
    /// Print the records of a ledger as JSON
    Records { name: String },
    /// Write a signed export copy of a ledger
    Export { name: String },
    /// Write the default base template if none exists
    InitTemplate,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Hearings {
    Many(Vec<HearingRecord>),
    One(HearingRecord),
}

/// Entry point: runs the HTTP server, or one ledger operation and exits.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let store = cli.config.store();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => app::run(cli.config).await?,
        Command::Create { name } => {
            let path = store.create_from_template(&name)?;
            println!("{}", path.display());
        }
        Command::Add { name, json } => {
            let hearings = match serde_json::from_str(&fs::read_to_string(&json)?)? {
                Hearings::Many(records) => records,
                Hearings::One(record) => vec![record],
            };
            let mut records = store.read_all(&name)?;
            records.extend(hearings);
            let summary = store.replace_all(&name, records)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::List => {
            for name in store.list()? {
                println!("{}", name);
            }
        }
        Command::Records { name } => {
            println!("{}", serde_json::to_string_pretty(&store.read_all(&name)?)?);
        }
        Command::Export { name } => {
            let exported = store.export(&name)?;
            println!("{}", store.files_dir().join(exported).display());
        }
        Command::InitTemplate => {
            let path = store.template();
            if template::write_default_template(path)? {
                println!("{}", path.display());
            } else {
                log::warn!("{} already exists, left unchanged", path.display());
            }
        }
    }

    Ok(())
}
