use anyhow::Result;
use clap::{Arg, Command};
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info, warn};

use notegen::config::Config;
use notegen::event::{self, PipelineEvent};
use notegen::pipeline::Pipeline;
use notegen::transcription::FailurePolicy;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("notegen=info,warn")
        .init();

    let matches = Command::new("notegen")
        .version("0.1.0")
        .about("Turn lecture videos, audio, and documents into structured notes, Q&A, or quizzes")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Video, audio, or text document to process")
                .required(true),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Generation mode: notes, qa, or quiz")
                .default_value("notes"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("NAME")
                .help("Base name of the output file (without extension)")
                .default_value("study_notes"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("NUM")
                .help("Number of parallel transcription workers"),
        )
        .arg(
            Arg::new("policy")
                .long("policy")
                .value_name("POLICY")
                .help("Chunk failure policy: strict or lenient"),
        )
        .arg(
            Arg::new("keep-temp")
                .long("keep-temp")
                .help("Keep intermediate chunk and transcript files")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to a configuration file"),
        )
        .get_matches();

    let input = PathBuf::from(matches.get_one::<String>("input").unwrap());
    let mode = matches.get_one::<String>("mode").unwrap().clone();
    let output_base = matches.get_one::<String>("output").unwrap().clone();

    // Load configuration
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };
    config.apply_env();

    if let Some(workers) = matches.get_one::<String>("workers") {
        config.transcription.concurrency = workers.parse()?;
    }
    if let Some(policy) = matches.get_one::<String>("policy") {
        config.pipeline.failure_policy = match policy.to_lowercase().as_str() {
            "strict" => FailurePolicy::Strict,
            "lenient" => FailurePolicy::Lenient,
            other => return Err(anyhow::anyhow!("Unknown failure policy: {}", other)),
        };
    }
    if matches.get_flag("keep-temp") {
        config.pipeline.keep_intermediate = true;
    }
    config.validate()?;

    info!("🚀 notegen starting...");
    info!("📁 Input: {}", input.display());
    info!("📝 Mode: {}", mode);
    info!("🔧 Workers: {}", config.transcription.concurrency);

    if !input.exists() {
        error!("Input file does not exist: {}", input.display());
        return Err(anyhow::anyhow!("Input file not found"));
    }

    let pipeline = Pipeline::new(config).await?;
    let (tx, mut rx) = event::channel();

    // Render events while the pipeline runs.
    let printer = tokio::spawn(async move {
        let mut streaming = false;
        while let Some(event) = rx.recv().await {
            render(event, &mut streaming);
        }
        if streaming {
            println!();
        }
    });

    let result = pipeline.run(input, &mode, &output_base, &tx).await;
    drop(tx);
    printer.await?;

    match result {
        Ok(path) => {
            info!("✅ Output saved to: {}", path.display());
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Job failed: {}", e)),
    }
}

/// Render one pipeline event to the terminal. Generation deltas stream to
/// stdout; everything else goes through the logger.
fn render(event: PipelineEvent, streaming: &mut bool) {
    if *streaming && !matches!(event, PipelineEvent::LlmChunk { .. }) {
        println!();
        *streaming = false;
    }

    match event {
        PipelineEvent::Progress { fraction, message } => {
            info!("[{:>3.0}%] {}", fraction * 100.0, message);
        }
        PipelineEvent::SubProgress { fraction, message } => {
            info!("  [{:>3.0}%] {}", fraction * 100.0, message);
        }
        PipelineEvent::LlmChunk { delta } => {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
            *streaming = true;
        }
        PipelineEvent::Error { message } => {
            warn!("{}", message);
        }
        PipelineEvent::PersistentError { message } => {
            error!("{}", message);
        }
        PipelineEvent::Done {
            output_path,
            message,
        } => {
            info!("{} ({})", message, output_path.display());
        }
    }
}
