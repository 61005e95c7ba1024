//! kbase CLI
//!
//! Indexes a folder of `.txt` documents and answers questions from it.
//!
//! # Commands
//!
//! - `index`: rebuild the corpus and report what was indexed
//! - `retrieve`: print the units closest to a question
//! - `ask`: answer a question from the retrieved units
//! - `chat`: answer questions read from standard input, one per line
//!
//! The index lives in memory, so every command rebuilds it first. `chat`
//! keeps it for the whole session and can rebuild it on request.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kbase_retrieval::{Answer, KbaseConfig, KnowledgeBase, RebuildReport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Retrieval-augmented question answering over a folder of text documents.
#[derive(Debug, Parser)]
#[command(name = "kbase", version, propagate_version = true)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Folder of `.txt` documents; overrides the configuration.
    #[arg(long, global = true, value_name = "DIR")]
    docs: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index the document folder and report what was built.
    Index,

    /// Print the units closest to a question.
    Retrieve(QuestionArgs),

    /// Answer a question from the document folder.
    Ask(QuestionArgs),

    /// Answer questions from standard input until end of input.
    ///
    /// `:rebuild` re-indexes the folder, `:status` prints the corpus status
    /// and `:quit` exits.
    Chat {
        /// Number of units to retrieve per question.
        #[arg(short, long)]
        k: Option<usize>,
    },
}

#[derive(Debug, clap::Args)]
struct QuestionArgs {
    /// The question.
    #[arg(required = true, num_args = 1..)]
    question: Vec<String>,

    /// Number of units to retrieve.
    #[arg(short, long)]
    k: Option<usize>,
}

impl QuestionArgs {
    fn text(&self) -> String {
        self.question.join(" ")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let kb = KnowledgeBase::from_config(&config).context("failed to set up the knowledge base")?;

    match &cli.command {
        Command::Index => {
            let report = rebuild(&kb, &config).await?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
        }
        Command::Retrieve(args) => {
            rebuild(&kb, &config).await?;
            let k = args.k.unwrap_or_else(|| kb.default_top_k());
            let units = kb.retrieve(&args.text(), k).await?;
            if cli.json {
                print_json(&units)?;
            } else {
                for (rank, unit) in units.iter().enumerate() {
                    println!("{}. {unit}", rank + 1);
                }
            }
        }
        Command::Ask(args) => {
            rebuild(&kb, &config).await?;
            let k = args.k.unwrap_or_else(|| kb.default_top_k());
            let answer = kb.ask(&args.text(), k).await?;
            print_answer(&answer, cli.json)?;
        }
        Command::Chat { k } => {
            rebuild(&kb, &config).await?;
            chat(&kb, &config, k.unwrap_or_else(|| kb.default_top_k()), cli.json).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<KbaseConfig> {
    let mut config = match &cli.config {
        Some(path) => KbaseConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => KbaseConfig::default(),
    };

    if let Some(docs) = &cli.docs {
        config.documents_dir = docs.clone();
    }

    Ok(config)
}

async fn rebuild(kb: &KnowledgeBase, config: &KbaseConfig) -> anyhow::Result<RebuildReport> {
    kb.rebuild_from_folder(&config.documents_dir)
        .await
        .with_context(|| format!("failed to index {}", config.documents_dir.display()))
}

async fn chat(kb: &KnowledgeBase, config: &KbaseConfig, k: usize, json: bool) -> anyhow::Result<()> {
    info!("Reading questions from standard input");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":rebuild" => match rebuild(kb, config).await {
                Ok(report) => print_report(&report),
                Err(e) => error!("{e:#}"),
            },
            ":status" => print_json(&kb.status().await)?,
            question => match kb.ask(question, k).await {
                Ok(answer) => print_answer(&answer, json)?,
                Err(e) => error!("{e}"),
            },
        }
    }

    Ok(())
}

fn print_report(report: &RebuildReport) {
    let dimension = report
        .dimension
        .map_or_else(|| "-".to_string(), |d| d.to_string());
    println!(
        "generation {}: {} documents, {} units, dimension {dimension} ({}ms)",
        report.generation, report.documents, report.units, report.elapsed_ms
    );
}

fn print_answer(answer: &Answer, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(answer)
    } else {
        println!("{}", answer.text);
        Ok(())
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ask_joins_words() {
        let cli = Cli::try_parse_from([
            "kbase", "--docs", "notes", "ask", "what", "is", "up?", "-k", "5",
        ])
        .unwrap();

        let Command::Ask(args) = &cli.command else {
            panic!("expected ask, got {:?}", cli.command);
        };
        assert_eq!(args.text(), "what is up?");
        assert_eq!(args.k, Some(5));
        assert_eq!(load_config(&cli).unwrap().documents_dir, PathBuf::from("notes"));
    }

    #[test]
    fn test_question_required() {
        assert!(Cli::try_parse_from(["kbase", "retrieve"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["kbase", "index", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(load_config(&cli).unwrap().documents_dir, PathBuf::from("data"));
    }
}
