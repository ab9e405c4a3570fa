#[macro_use] extern crate log;

mod autoreply;
mod config;
mod db;
mod edition;
mod ingest;
mod mail;
mod maildir;
mod resolve;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crate::config::Config;
use crate::db::Database;
use crate::edition::{EditionState, EditionStore};
use crate::mail::Message;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(value_parser = Config::try_from_arg)]
    config: Config,

    #[command(subcommand)]
    op: Operation,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Operation {
    /// Process incoming mail once: record fact-check responses against their editions.
    Ingest(IngestArgs),

    /// Read a raw email from standard input, and show which recipients it has and whether it
    /// looks like an automatic reply. This does not alter the database.
    Classify,

    /// Add an edition and print the address fact-check responses for it should be sent to.
    Register(RegisterArgs),

    /// Show an edition's state and the actions recorded against it.
    History(HistoryArgs),
}

#[derive(clap::Args, Debug)]
pub struct IngestArgs {
    /// show what would be done, but do not make any changes
    #[arg(long)]
    dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct RegisterArgs {
    /// Title of the edition.
    #[arg(long)]
    title: String,

    /// Workflow state to start the edition in.
    #[arg(long, default_value = "fact_check")]
    state: EditionState,
}

#[derive(clap::Args, Debug)]
pub struct HistoryArgs {
    /// The edition's fact-check email address.
    #[arg(long)]
    address: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    stderrlog::new()
        .module(module_path!())
        .verbosity(usize::from(args.verbose))
        .init()?;

    debug!("{:#?}", args);

    match args.op {
        Operation::Ingest(op) => ingest::ingest(&args.config, op),
        Operation::Classify => {
            let mut raw_input = vec![];
            std::io::Read::read_to_end(&mut std::io::stdin(), &mut raw_input)
                .context("failed to read standard input")?;
            classify(&raw_input)
        }
        Operation::Register(op) => register(&args.config, op),
        Operation::History(op) => history(&args.config, op),
    }
}

fn classify(raw: &[u8]) -> anyhow::Result<()> {
    let message = Message::parse("stdin", raw)
        .context("failed to parse mail")?;
    for (field, set) in &[("To", &message.to), ("Cc", &message.cc), ("Bcc", &message.bcc)] {
        for address in set.iter() {
            println!("{}: {}", field, address);
        }
    }
    let classification = autoreply::classify(&message);
    match classification.reason {
        Some(rule) => println!("automatic reply: {}", rule),
        None => println!("not an automatic reply"),
    }
    Ok(())
}

fn register(config: &Config, args: RegisterArgs) -> anyhow::Result<()> {
    let mut db = Database::open(&config.database_path)?;
    let edition = db.create_edition(&args.title, args.state,
        |id| config.fact_check_address.address_for(id))?;
    println!("{}", edition.fact_check_email_address);
    Ok(())
}

fn history(config: &Config, args: HistoryArgs) -> anyhow::Result<()> {
    let db = Database::open(&config.database_path)?;
    let edition = db.find_by_fact_check_address(&args.address)?
        .with_context(|| format!("no edition has fact-check address {:?}", args.address))?;
    println!("edition {}: {:?} ({})", edition.id, edition.title, edition.state);
    for action in &edition.actions {
        println!("{} {}", action.created_at.to_rfc3339(), action.request_type);
        for line in action.comment.lines() {
            println!("    {}", line);
        }
    }
    Ok(())
}
