use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use support_core::config::{DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_CLARITY, DEFAULT_FOCUS, DEFAULT_TONE};
use support_core::openai::{DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
use support_core::{
    default_policies, evaluate_cases, load_corpus_file, load_eval_cases, ApiConfig, CacheBuilder,
    CorpusLoad, EmbeddingProvider, EvaluationRun, HashEmbeddingProvider, OpenAiEmbeddingProvider,
    OpenAiTextGenerator, OrchestrationStatus, PipelineConfig, SupportPipeline, TextGenerator,
    DEFAULT_LEXICAL_THRESHOLD, DEFAULT_REQUIRED_PASS_RATE, DEFAULT_SEMANTIC_THRESHOLD,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "support")]
#[command(about = "Customer support intent resolution CLI")]
struct Cli {
    /// FAQ corpus JSON (category name -> list of question/answer objects).
    #[arg(long, global = true, env = "SUPPORT_CORPUS")]
    corpus: Option<PathBuf>,

    /// Base URL of an OpenAI-compatible API. Without it, embeddings come from
    /// the offline hash embedder and no text generator is available.
    #[arg(long, global = true, env = "SUPPORT_API_BASE")]
    api_base: Option<String>,

    #[arg(long, global = true, env = "SUPPORT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, global = true, env = "SUPPORT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    #[arg(long, global = true, env = "SUPPORT_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Per-call timeout in seconds for embedding and generation.
    #[arg(long, global = true, env = "SUPPORT_TIMEOUT", default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    timeout: u64,

    /// Answer with the matched FAQ text instead of generating.
    #[arg(long, global = true, env = "SUPPORT_VERBATIM")]
    verbatim: bool,

    #[arg(long, global = true, env = "SUPPORT_TONE", default_value = DEFAULT_TONE)]
    tone: String,

    #[arg(long, global = true, env = "SUPPORT_CLARITY", default_value = DEFAULT_CLARITY)]
    clarity: String,

    #[arg(long, global = true, env = "SUPPORT_FOCUS", default_value = DEFAULT_FOCUS)]
    focus: String,

    #[arg(long, global = true, env = "SUPPORT_LEXICAL_THRESHOLD", default_value_t = DEFAULT_LEXICAL_THRESHOLD)]
    lexical_threshold: f32,

    #[arg(long, global = true, env = "SUPPORT_SEMANTIC_THRESHOLD", default_value_t = DEFAULT_SEMANTIC_THRESHOLD)]
    semantic_threshold: f32,

    /// Extra passes over items whose embedding failed during the cache build.
    #[arg(long, global = true, env = "SUPPORT_RETRY_ATTEMPTS", default_value_t = 0)]
    retry_attempts: u32,

    /// Seconds to wait before each retry pass.
    #[arg(long, global = true, env = "SUPPORT_RETRY_DELAY", default_value_t = 5)]
    retry_delay: u64,

    /// Print results as JSON.
    #[arg(long, global = true, env = "SUPPORT_JSON")]
    json: bool,

    /// Force debug logging regardless of RUST_LOG.
    #[arg(long, global = true, env = "SUPPORT_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Answer a customer question end to end.
    Ask {
        #[arg(long)]
        question: String,
    },
    /// Run only the policy override check.
    Policy {
        #[arg(long)]
        question: String,
    },
    /// Run only FAQ matching and show how each sub-question resolved.
    Match {
        #[arg(long)]
        question: String,
    },
    /// Evaluate labelled cases against the override check and FAQ matching.
    Eval {
        #[arg(long)]
        cases: PathBuf,
        #[arg(long, default_value_t = DEFAULT_REQUIRED_PASS_RATE)]
        min_pass_rate: f32,
    },
    /// Build the embedding cache and report what was loaded.
    Inspect,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn load_records(cli: &Cli) -> Result<CorpusLoad> {
    match &cli.corpus {
        Some(path) => load_corpus_file(path),
        None => {
            tracing::warn!("no --corpus given; FAQ matching has nothing to match against");
            Ok(CorpusLoad::default())
        }
    }
}

fn api_config(cli: &Cli, api_base: &str) -> ApiConfig {
    ApiConfig {
        api_base: api_base.to_string(),
        api_key: cli.api_key.clone(),
        request_timeout: Duration::from_secs(cli.timeout),
    }
}

fn make_embedder(cli: &Cli) -> Result<Arc<dyn EmbeddingProvider>> {
    match &cli.api_base {
        Some(base) => {
            let provider = OpenAiEmbeddingProvider::new(api_config(cli, base), &cli.embedding_model)
                .context("build embedding client")?;
            Ok(Arc::new(provider))
        }
        None => Ok(Arc::new(HashEmbeddingProvider::default())),
    }
}

fn make_generator(cli: &Cli) -> Result<Option<Arc<dyn TextGenerator>>> {
    match &cli.api_base {
        Some(base) => {
            let generator = OpenAiTextGenerator::new(api_config(cli, base), &cli.chat_model)
                .context("build chat client")?;
            Ok(Some(Arc::new(generator)))
        }
        None => Ok(None),
    }
}

fn pipeline_config(cli: &Cli) -> PipelineConfig {
    PipelineConfig {
        verbatim: cli.verbatim,
        tone: cli.tone.clone(),
        clarity: cli.clarity.clone(),
        focus: cli.focus.clone(),
        call_timeout: Duration::from_secs(cli.timeout),
        lexical_threshold: cli.lexical_threshold,
        semantic_threshold: cli.semantic_threshold,
    }
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

fn opt_score(score: Option<f32>) -> String {
    score.map_or_else(|| "null".to_string(), |s| format!("{s:.4}"))
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let load = load_records(&cli)?;
    for skipped in &load.skipped {
        tracing::warn!(
            category = %skipped.category,
            index = ?skipped.index,
            reason = %skipped.reason,
            "skipped corpus item"
        );
    }

    let builder = CacheBuilder::new(make_embedder(&cli)?)
        .with_call_timeout(Duration::from_secs(cli.timeout))
        .with_retries(cli.retry_attempts, Duration::from_secs(cli.retry_delay));
    let pipeline = SupportPipeline::spawn(
        load.records.clone(),
        Arc::new(default_policies()),
        builder,
        make_generator(&cli)?,
        pipeline_config(&cli),
    );

    match &cli.command {
        Commands::Ask { question } => {
            let resolution = pipeline.resolve(question).await.context("answer question")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&resolution)?);
                return Ok(());
            }
            println!(
                "decision={:?} policy={} method={} sources={}",
                resolution.policy.decision,
                opt(resolution.policy.policy_id),
                opt(resolution.policy.method.map(|m| m.as_str())),
                resolution.matched_sources.len()
            );
            for source in &resolution.matched_sources {
                println!("source category={} question={}", source.category, source.question);
            }
            println!("answer={}", resolution.answer);
        }
        Commands::Policy { question } => {
            let result = pipeline.check_policy(question).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            println!(
                "decision={:?} policy={} method={} score={}",
                result.decision,
                opt(result.policy_id),
                opt(result.method.map(|m| m.as_str())),
                opt_score(result.score)
            );
            if let Some(answer) = &result.answer {
                println!("answer={answer}");
            }
        }
        Commands::Match { question } => {
            let outcome = pipeline.match_faqs(question).await;
            if cli.json {
                let value = serde_json::json!({
                    "matches": outcome.matches.iter().map(|e| e.source()).collect::<Vec<_>>(),
                    "trace": outcome.trace,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }
            for part in &outcome.trace {
                println!(
                    "part={:?} stage={} question={} score={}",
                    part.text,
                    serde_json::to_value(part.stage)?
                        .as_str()
                        .unwrap_or("unknown"),
                    opt(part.question.as_deref()),
                    opt_score(part.score)
                );
            }
            println!("matched={}", outcome.matches.len());
            for entry in &outcome.matches {
                println!("match category={} question={}", entry.category, entry.question);
            }
        }
        Commands::Eval {
            cases,
            min_pass_rate,
        } => {
            let run_id = format!("eval-{}", chrono::Utc::now().timestamp_millis());
            let mut run = EvaluationRun::start(
                run_id,
                cases.to_string_lossy().into_owned(),
                Some(*min_pass_rate),
            );
            let cases = load_eval_cases(cases)?;

            match pipeline.cache().ensure_ready().await {
                Ok(cache) => run.on_cache_ready(&cache.report()),
                Err(err) => run.on_cache_failed(format!("cache_unavailable:{err}")),
            }

            if run.status == OrchestrationStatus::Failed {
                println!(
                    "run_id={} status={:?} required={:.4} error={}",
                    run.run_id,
                    run.status,
                    run.required_pass_rate,
                    run.error.as_deref().unwrap_or("unknown")
                );
                return Ok(());
            }

            let summary = evaluate_cases(&pipeline, &cases).await;
            run.on_eval_completed(&summary);

            if cli.json {
                let value = serde_json::json!({ "run": run, "summary": summary });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            println!(
                "run_id={} status={:?} total={} passed={} failed={} pass_rate={:.4} required={:.4} meets_threshold={}",
                run.run_id,
                run.status,
                summary.total,
                summary.passed,
                summary.failed,
                summary.pass_rate,
                run.required_pass_rate,
                run.meets_threshold()
            );

            for o in &summary.outcomes {
                println!(
                    "case={} passed={} decision={:?} policy={} method={} questions={} latency={:.1}ms",
                    o.case_id,
                    o.passed,
                    o.actual_decision,
                    opt(o.actual_policy),
                    opt(o.actual_method.map(|m| m.as_str())),
                    o.actual_questions.len(),
                    o.latency_ms
                );
            }
        }
        Commands::Inspect => {
            let cache = pipeline
                .cache()
                .ensure_ready()
                .await
                .context("wait for embedding cache")?;
            let report = cache.report();
            if cli.json {
                let value = serde_json::json!({
                    "records": load.records.len(),
                    "skipped": load.skipped,
                    "cache": report,
                    "failures": cache
                        .failures()
                        .iter()
                        .map(|f| serde_json::json!({ "subject": f.subject.label(), "error": f.error }))
                        .collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            println!(
                "records={} skipped={} faq_embedded={} policy_embedded={} failed={} dimension={} built_at={}",
                load.records.len(),
                load.skipped.len(),
                report.faq_embedded,
                report.policy_embedded,
                report.failed,
                opt(report.dimension),
                report.built_at.to_rfc3339()
            );
            for skipped in &load.skipped {
                println!(
                    "skipped category={} index={} reason={}",
                    skipped.category,
                    opt(skipped.index),
                    skipped.reason
                );
            }
            for failure in cache.failures() {
                println!("failure subject={} error={}", failure.subject.label(), failure.error);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
