use anyhow::{Context, Result, bail};
use auto_didact::{
    api, bootstrap,
    config::{self, Config},
    knowledge::discover_pdfs,
    logging,
    video::{Script, ScriptSource},
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "auto-didact",
    about = "PDF knowledge base, grounded answers and narrated explainer videos"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Ingest a PDF, or every PDF below a directory.
    Ingest { path: PathBuf },
    /// Answer a question from the indexed documents.
    Ask { question: String },
    /// Render a video from context text or a script file.
    Video {
        /// Source text to write a script from.
        #[arg(long, conflicts_with = "script", required_unless_present = "script")]
        context: Option<String>,
        /// Title for a generated script.
        #[arg(long, requires = "context")]
        title: Option<String>,
        /// JSON script file.
        #[arg(long)]
        script: Option<PathBuf>,
        /// Output MP4 path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();
    let services = bootstrap::build_services(config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, services).await,
        Command::Ingest { path } => ingest(&services, &path).await,
        Command::Ask { question } => {
            let answer = services.knowledge.answer(&question).await?;
            println!("{}", answer.answer);
            for source in answer.sources.unwrap_or_default() {
                println!("  - {source}");
            }
            Ok(())
        }
        Command::Video {
            context,
            title,
            script,
            output,
        } => {
            let script = match script {
                Some(path) => Some(read_script(&path).await?),
                None => None,
            };
            let source = ScriptSource::from_request(script, context, title)?;
            let video = services.video.run(source, output).await?;
            println!("{}", video.display());
            Ok(())
        }
    }
}

async fn serve(config: &Config, services: bootstrap::Services) -> Result<()> {
    let state = api::AppState::new(services.knowledge, services.video, services.metrics);
    let app = api::create_router(state).layer(
        api::cors_layer(&config.cors_allow_origin).context("invalid CORS_ALLOW_ORIGIN")?,
    );

    let (listener, port) = bind_listener(config.server_port).await?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ingest(services: &bootstrap::Services, path: &Path) -> Result<()> {
    let documents = if path.is_dir() {
        discover_pdfs(path)
    } else {
        vec![path.to_path_buf()]
    };
    if documents.is_empty() {
        bail!("no PDF files found under {}", path.display());
    }

    let mut total = 0;
    for document in &documents {
        let outcome = services.knowledge.ingest_pdf(document).await?;
        println!(
            "{}: {} chunks from {} pages",
            document.display(),
            outcome.chunks_uploaded,
            outcome.pages
        );
        total += outcome.chunks_uploaded;
    }
    println!("Uploaded {total} chunks from {} documents", documents.len());
    Ok(())
}

async fn read_script(path: &Path) -> Result<Script> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid script JSON in {}", path.display()))
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8000-8099",
    ))
}
