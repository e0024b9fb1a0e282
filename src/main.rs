use std::path::PathBuf;

use anyhow::Context;
use askrepo_core::config::{Config, resolve_config_path};
use askrepo_core::preflight::{self, Requirement};
use askrepo_core::workflow::{AskOptions, ReadReport, run_ask, run_read};
use askrepo_llm::ollama::OllamaClient;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "askrepo",
    version,
    about = "Ask questions about a source repository using local models",
    long_about = "Indexes a repository into local embeddings and answers questions with citations.\n\n\
                   Examples:\n  \
                     askrepo read                       Index new and changed files\n  \
                     askrepo read --force               Rebuild the index from scratch\n  \
                     askrepo ask \"where is auth done?\"  Answer from the indexed content"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: <root>/askrepo.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Repository root (default: current directory)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the repository and bring the index up to date
    Read {
        /// Discard the manifest and index before scanning
        #[arg(long)]
        force: bool,
    },
    /// Answer a question from the indexed content
    Ask {
        question: String,

        /// Use the index as it is instead of running `read` first
        #[arg(long)]
        no_refresh: bool,

        /// Number of context blocks to retrieve
        #[arg(short = 'k', long = "top-k", value_parser = parse_top_k)]
        top_k: Option<usize>,

        /// Upper bound on generated tokens
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Chat model to answer with
        #[arg(long)]
        model: Option<String>,

        /// Print the cited sources after the answer
        #[arg(long)]
        show_sources: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let root = std::fs::canonicalize(&cli.root)
        .with_context(|| format!("repository root {} not found", cli.root.display()))?;

    let config_path = resolve_config_path(cli.config.as_deref(), &root);
    let config = Config::load(&config_path)?;
    config.validate()?;

    let client = build_client(&config)?;

    match cli.command {
        Command::Read { force } => {
            preflight::check(&client, &preflight::required_models(&config, Requirement::Read))
                .await?;
            let outcome = run_read(&config, &root, force, &client).await?;
            print_read_report(&outcome.report);
        }
        Command::Ask {
            question,
            no_refresh,
            top_k,
            max_tokens,
            model,
            show_sources,
        } => {
            let mut required = preflight::required_models(&config, Requirement::Ask);
            if let Some(model) = model.as_deref() {
                required.retain(|m| *m != config.llm.chat_model);
                required.push(model);
            }
            preflight::check(&client, &required).await?;

            let options = AskOptions {
                question,
                refresh: !no_refresh,
                top_k,
                max_tokens,
                chat_model: model,
            };
            let answer = run_ask(&config, &root, &options, &client, &client).await?;
            if let Some(report) = &answer.refreshed
                && !report.update.failures.is_empty()
            {
                eprintln!("{} file(s) failed to index", report.update.failures.len());
            }

            println!("{}", answer.text);
            if show_sources {
                println!();
                println!("Sources:");
                for citation in answer.citations() {
                    println!("  [{citation}]");
                }
            }
        }
    }

    Ok(())
}

fn parse_top_k(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_owned()),
        Ok(k) => Ok(k),
        Err(e) => Err(e.to_string()),
    }
}

fn build_client(config: &Config) -> anyhow::Result<OllamaClient> {
    let client = OllamaClient::new(&config.llm.base_url, config.llm.timeout())
        .with_context(|| format!("invalid llm.base_url {}", config.llm.base_url))?
        .with_pacing(config.embedding.pacing())
        .with_max_retries(config.embedding.max_retries);
    Ok(client)
}

fn print_read_report(report: &ReadReport) {
    if report.model_changed {
        println!("embedding model changed, index rebuilt");
    }
    println!(
        "scanned {} files: {} added, {} changed, {} removed",
        report.scanned, report.added, report.changed, report.removed
    );
    println!(
        "indexed {} files, {} new chunks, {} chunks pruned ({} ms)",
        report.update.processed,
        report.update.new_chunks,
        report.update.removed_chunks,
        report.update.duration_ms
    );
    if !report.update.failures.is_empty() {
        println!("errors:");
        for failure in &report.update.failures {
            println!("  {failure}");
        }
    }
    let unavailable = report.update.unavailable_count();
    if unavailable > 0 {
        println!(
            "model service was unreachable for {unavailable} file(s), run `read` again to retry"
        );
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
