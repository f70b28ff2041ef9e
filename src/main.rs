//! ask - answer plain-language questions against a SQLite database.

use db_ask::cli::{resolve_connection, Cli, OutputFormat};
use db_ask::config::Config;
use db_ask::db::{self, SchemaDescription};
use db_ask::error::{AskError, Result};
use db_ask::llm::{create_client, resolve_api_key};
use db_ask::logging;
use db_ask::output::{render_json, render_text};
use db_ask::pipeline::{suggest_questions, Session};
use std::io::Read;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    match cli.log_path() {
        Some(path) => logging::init_file_logging(&path),
        None => logging::init_stderr_logging(),
    }

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}: {}", e.category(), e);
            eprintln!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    }
}

/// Runs one invocation. Returns whether the question was answered.
async fn run(cli: Cli) -> Result<bool> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_overrides(&mut config)?;
    let format = cli.parse_output_format()?;

    let connection = resolve_connection(&cli, &config)?;
    info!("Connection: {}", connection.display_string());
    let store = db::connect(&connection).await?;
    let pipeline_config = config.pipeline.to_pipeline_config();

    if cli.schema || cli.suggest {
        let schema = store.introspect_schema(&pipeline_config.introspection).await;
        store.close().await?;
        print_schema_info(&cli, &schema?, pipeline_config.introspection.effective_sample_rows());
        return Ok(true);
    }

    let question = read_question(&cli)?;
    let api_key = resolve_api_key(config.llm.provider, cli.api_key.clone());
    let generator = create_client(
        config.llm.provider,
        config.llm.generation_settings(),
        api_key,
    )?;
    let session = Session::open(store, generator, pipeline_config).await?;

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current attempt");
                cancel.cancel();
            }
        }
    });

    let response = session
        .translate_and_run_with_cancel(&question, &cancel)
        .await;
    watcher.abort();
    let response = response?;

    match format {
        OutputFormat::Text => println!("{}", render_text(&response)),
        OutputFormat::Json => println!("{}", render_json(&response)?),
    }

    let answered = response.is_success();
    if answered && cli.explain {
        if let Some(sql) = &response.sql {
            match session.explain(sql).await {
                Ok(explanation) => println!("\n{explanation}"),
                Err(e) => warn!(error = %e, "Could not explain the query"),
            }
        }
    }

    session.close().await?;
    Ok(answered)
}

fn read_question(cli: &Cli) -> Result<String> {
    if let Some(question) = &cli.question {
        return Ok(question.clone());
    }

    let mut question = String::new();
    std::io::stdin()
        .read_to_string(&mut question)
        .map_err(|e| AskError::config(format!("Failed to read question from stdin: {e}")))?;
    Ok(question)
}

fn print_schema_info(cli: &Cli, schema: &SchemaDescription, sample_rows: usize) {
    if cli.schema {
        println!("{}", schema.format_for_llm(sample_rows));
    }
    if cli.suggest {
        for question in suggest_questions(schema) {
            println!("- {question}");
        }
    }
}
