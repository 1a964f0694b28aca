use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ragprobe_cli::{
    load_corpus, load_dataset, print_generation, print_retrieval, print_synthesis,
    print_validation, save_dataset, write_json, write_jsonl,
};
use ragprobe_core::{CancelToken, EvalConfig, Judge, ValidatorConfig, Vocabularies};
use ragprobe_eval::{GenerationEvaluator, ModelJudge, RetrievalEvaluator, RuleJudge, Thresholds};
use ragprobe_openai::{OpenAiClient, SearchIndexClient};
use ragprobe_synth::{
    DatasetValidator, PromptBuilder, Synthesizer, UnanswerabilityCheck, filter_flagged,
};

#[derive(Parser)]
#[command(name = "ragprobe")]
#[command(about = "Synthetic test sets and retrieval/groundedness scoring for RAG pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate grounded and not-grounded questions from a chunk corpus
    Synthesize {
        /// Corpus JSONL (one chunk per line)
        #[arg(long)]
        corpus: PathBuf,
        /// Dataset JSONL to write
        #[arg(long)]
        out: PathBuf,
        /// Directory holding vocabulary JSONL files
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Only use the first N chunks as anchors
        #[arg(long)]
        limit: Option<usize>,
        /// Seed for control-parameter draws
        #[arg(long)]
        seed: Option<u64>,
        /// Neighbors per anchor chunk
        #[arg(short, long)]
        k: Option<usize>,
        /// Where to write failed records (defaults next to the dataset)
        #[arg(long)]
        failures: Option<PathBuf>,
    },
    /// Check a dataset for length outliers, imbalance and duplicates
    Validate {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Compare question embeddings instead of word overlap for duplicates
        #[arg(long)]
        embed: bool,
        /// Write records flagged by record-level warnings here
        #[arg(long)]
        filtered_out: Option<PathBuf>,
        /// Write the records that passed here
        #[arg(long)]
        accepted_out: Option<PathBuf>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Score retrieval (Hit Rate@k, MRR) against the search index
    EvalRetrieval {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(short, long)]
        k: Option<usize>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Score fixed-context answers for groundedness
    EvalGeneration {
        #[arg(long)]
        dataset: PathBuf,
        /// Corpus JSONL holding the records' source chunks
        #[arg(long)]
        corpus: PathBuf,
        /// Use the offline rule judge instead of the judge model
        #[arg(long)]
        rule_judge: bool,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Download every chunk of the search index as a corpus
    ExportCorpus {
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = EvalConfig::from_env()?;

    match cli.command {
        Commands::Synthesize {
            corpus,
            out,
            settings,
            limit,
            seed,
            k,
            failures,
        } => {
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            if let Some(k) = k {
                config.neighbors_k = k;
            }
            config.validate()?;
            synthesize(&config, &corpus, &out, settings.as_deref(), limit, failures).await
        }
        Commands::Validate {
            dataset,
            settings,
            embed,
            filtered_out,
            accepted_out,
            report,
        } => {
            validate(&config, &dataset, settings.as_deref(), embed, filtered_out, accepted_out, report).await
        }
        Commands::EvalRetrieval { dataset, k, report } => {
            if let Some(k) = k {
                config.retrieval_k = k;
            }
            config.validate()?;
            eval_retrieval(&config, &dataset, report).await
        }
        Commands::EvalGeneration {
            dataset,
            corpus,
            rule_judge,
            report,
        } => eval_generation(&config, &dataset, &corpus, rule_judge, report).await,
        Commands::ExportCorpus { out } => export_corpus(&out).await,
    }
}

/// Cancel the run on Ctrl-C; completed records are kept
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, keeping completed records");
            token.cancel();
        }
    });
    cancel
}

fn load_vocabularies(settings: Option<&Path>) -> Result<Vocabularies> {
    match settings {
        Some(dir) => Ok(Vocabularies::load_dir(dir)?),
        None => Ok(Vocabularies::default()),
    }
}

/// Optional prompt overrides from the settings directory
fn load_prompts(settings: Option<&Path>) -> Result<PromptBuilder> {
    let mut prompts = PromptBuilder::new();
    let Some(dir) = settings else {
        return Ok(prompts);
    };

    let grounded = dir.join("system_grounded.txt");
    let not_grounded = dir.join("system_not_grounded.txt");
    if grounded.exists() && not_grounded.exists() {
        prompts = prompts.with_system_messages(
            fs::read_to_string(&grounded).with_context(|| format!("reading {}", grounded.display()))?,
            fs::read_to_string(&not_grounded).with_context(|| format!("reading {}", not_grounded.display()))?,
        );
    }
    let instructions = dir.join("instructions.txt");
    if instructions.exists() {
        prompts = prompts.with_instructions(fs::read_to_string(&instructions)?.trim());
    }
    let task = dir.join("task.txt");
    if task.exists() {
        prompts = prompts.with_task(fs::read_to_string(&task)?.trim());
    }
    Ok(prompts)
}

async fn synthesize(
    config: &EvalConfig,
    corpus_path: &Path,
    out: &Path,
    settings: Option<&Path>,
    limit: Option<usize>,
    failures: Option<PathBuf>,
) -> Result<()> {
    let vocabularies = load_vocabularies(settings)?;
    let corpus = load_corpus(corpus_path)?;
    info!(chunks = corpus.len(), k = config.neighbors_k, "loaded corpus");

    let client = OpenAiClient::from_env()?;
    let mut synthesizer = Synthesizer::new(Arc::new(client.clone())).with_prompts(load_prompts(settings)?);
    if config.verify_ungrounded {
        synthesizer = synthesizer.with_verifier(UnanswerabilityCheck::new(Arc::new(client.judge())));
    }

    let cancel = cancel_on_ctrl_c();
    let outcome = synthesizer
        .synthesize_corpus(&corpus, config, &vocabularies, limit, &cancel)
        .await?;

    let written = save_dataset(out, &outcome.records)?;
    print_synthesis(&outcome);
    println!("{} {} record(s) to {}", "Wrote".green(), written, out.display());

    if !outcome.failures.is_empty() {
        let path = failures.unwrap_or_else(|| out.with_extension("failures.jsonl"));
        write_jsonl(&path, &outcome.failures)?;
        println!("{} {} failure(s) to {}", "Wrote".yellow(), outcome.failures.len(), path.display());
    }
    Ok(())
}

async fn validate(
    config: &EvalConfig,
    dataset_path: &Path,
    settings: Option<&Path>,
    embed: bool,
    filtered_out: Option<PathBuf>,
    accepted_out: Option<PathBuf>,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let dataset = load_dataset(dataset_path)?;
    let validator_config = ValidatorConfig::from_env()?;
    let mut validator = DatasetValidator::new(validator_config);
    if let Some(dir) = settings {
        validator = validator.with_vocabularies(Vocabularies::load_dir(dir)?);
    }

    let report = if embed {
        let embedder = Arc::new(OpenAiClient::from_env()?);
        validator
            .validate_embedded(&dataset, embedder, config.concurrency, &cancel_on_ctrl_c())
            .await
    } else {
        validator.validate(&dataset)
    };

    print_validation(&report);

    if filtered_out.is_some() || accepted_out.is_some() {
        let (accepted, rejected) = filter_flagged(&dataset, &report);
        if let Some(path) = filtered_out {
            write_jsonl(&path, &rejected)?;
            println!("{} {} filtered record(s) to {}", "Wrote".yellow(), rejected.len(), path.display());
        }
        if let Some(path) = accepted_out {
            save_dataset(&path, &accepted)?;
            println!("{} {} accepted record(s) to {}", "Wrote".green(), accepted.len(), path.display());
        }
    }
    if let Some(path) = report_path {
        write_json(&path, &report)?;
    }
    Ok(())
}

async fn eval_retrieval(config: &EvalConfig, dataset_path: &Path, report_path: Option<PathBuf>) -> Result<()> {
    let dataset = load_dataset(dataset_path)?;
    let search = Arc::new(SearchIndexClient::from_env()?);
    let evaluator = RetrievalEvaluator::new(search, config.retrieval_k)?.with_concurrency(config.concurrency);

    let report = evaluator.evaluate(&dataset, &cancel_on_ctrl_c()).await;
    print_retrieval(&report);
    if let Some(path) = report_path {
        write_json(&path, &report)?;
    }
    Ok(())
}

async fn eval_generation(
    config: &EvalConfig,
    dataset_path: &Path,
    corpus_path: &Path,
    rule_judge: bool,
    report_path: Option<PathBuf>,
) -> Result<()> {
    let dataset = load_dataset(dataset_path)?;
    let corpus = Arc::new(load_corpus(corpus_path)?);
    let client = OpenAiClient::from_env()?;

    let judge: Arc<dyn Judge> = if rule_judge {
        Arc::new(RuleJudge::new()?)
    } else {
        Arc::new(ModelJudge::new(Arc::new(client.judge())))
    };
    let evaluator = GenerationEvaluator::new(Arc::new(client), judge, corpus)
        .with_thresholds(Thresholds::from(config))
        .with_concurrency(config.concurrency);

    let report = evaluator.evaluate(&dataset, &cancel_on_ctrl_c()).await;
    print_generation(&report);
    if let Some(path) = report_path {
        write_json(&path, &report)?;
    }
    Ok(())
}

async fn export_corpus(out: &Path) -> Result<()> {
    let search = SearchIndexClient::from_env()?;
    let chunks = search.export_chunks().await?;
    let written = write_jsonl(out, &chunks)?;
    println!("{} {} chunk(s) to {}", "Wrote".green(), written, out.display());
    Ok(())
}
