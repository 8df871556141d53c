use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use ordinance_rag::{Metadata, QueryEvent, QueryRequest, ingest_directory};
use ordinance_server::app::{build_backend, build_embedder, rag_config};
use ordinance_server::{AppState, ServerConfig, build_rag, init_telemetry, run_server};
use serde_json::json;
use tracing::warn;

#[derive(Parser)]
#[command(name = "ordinance")]
#[command(version)]
#[command(about = "Ask questions about municipal ordinances", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP query service
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Export directory to load into the collection at startup
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// Load a directory of JSON exports into the collection
    Ingest {
        dir: PathBuf,
        #[arg(long)]
        collection: Option<String>,
    },
    /// Answer one question and exit
    Ask {
        query: String,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        city: Option<String>,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
        /// Export directory to load into the collection first
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

async fn serve_command(config: &ServerConfig) -> Result<()> {
    let rag = build_rag(config).await?;
    run_server(config, AppState::new(rag)).await
}

async fn ingest_command(config: &ServerConfig, dir: PathBuf) -> Result<()> {
    if config.qdrant_url.is_none() {
        warn!("no ORDINANCE_QDRANT_URL set, the ingested collection is discarded on exit");
    }

    let rag = rag_config(config)?;
    let (_, report) = ingest_directory(
        build_backend(config)?,
        build_embedder(config, &rag)?,
        &dir,
        &rag.collection_name,
        rag.upsert_batch_size,
    )
    .await?;

    for file in report.files.iter().filter(|f| f.error.is_some()) {
        eprintln!("skipped {}: {}", file.path.display(), file.error.as_deref().unwrap_or_default());
    }

    let info = report.info;
    let summary = json!({
        "name": info.name,
        "document_count": info.document_count,
        "states": info.states,
        "cities": info.cities,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn ask_command(config: &ServerConfig, request: QueryRequest) -> Result<()> {
    let rag = build_rag(config).await?;

    let sources = if request.stream {
        let mut events = rag.answer_stream(request);
        let mut sources = Vec::new();
        let mut stdout = std::io::stdout();
        while let Some(event) = events.next().await {
            match event? {
                QueryEvent::Sources(found) => sources = found,
                QueryEvent::Content(chunk) => {
                    write!(stdout, "{chunk}")?;
                    stdout.flush()?;
                }
            }
        }
        writeln!(stdout)?;
        sources
    } else {
        let answer = rag.answer(&request).await?;
        println!("{}", answer.response);
        answer.sources
    };

    print_sources(&sources);
    Ok(())
}

fn print_sources(sources: &[Metadata]) {
    if sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for (i, source) in sources.iter().enumerate() {
        let label = ["title", "chapter", "section"]
            .iter()
            .filter_map(|key| source.get(*key))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" / ");
        match source.get("url") {
            Some(url) => println!("  {}. {label} ({url})", i + 1),
            None => println!("  {}. {label}", i + 1),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let mut config = ServerConfig::from_env()?;
    init_telemetry(config.log_json);

    match args.command {
        Commands::Serve { host, port, data } => {
            config.host = host.unwrap_or(config.host);
            config.port = port.unwrap_or(config.port);
            config.data_dir = data.or(config.data_dir);
            serve_command(&config).await?
        }
        Commands::Ingest { dir, collection } => {
            config.collection = collection.unwrap_or(config.collection);
            ingest_command(&config, dir).await?
        }
        Commands::Ask { query, state, city, stream, data } => {
            config.data_dir = data.or(config.data_dir);
            let request = QueryRequest { query, state, city, stream, ..QueryRequest::default() };
            ask_command(&config, request).await?
        }
    }
    Ok(())
}
