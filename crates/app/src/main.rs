mod config;
mod http;

use chrono::Utc;
use clap::{Parser, Subcommand};
use config::Settings;
use http::{create_app, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-qa-server", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the upload/query HTTP API.
    Serve {
        /// Address to listen on
        #[arg(long, env = "PDF_QA_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Directory uploaded PDFs are written to
        #[arg(long, env = "PDF_QA_UPLOAD_DIR", default_value = "uploads")]
        upload_dir: PathBuf,

        /// Largest accepted upload body, in bytes
        #[arg(long, default_value_t = 50 * 1024 * 1024)]
        max_upload_bytes: usize,
    },
    /// Process one PDF and answer questions about it in order.
    Ask {
        /// PDF to load
        #[arg(long)]
        pdf: PathBuf,

        /// Question to ask; repeat for follow-ups that see earlier answers
        #[arg(long = "question", required = true)]
        questions: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let session = Arc::new(cli.settings.build_session()?);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        chat_model = %cli.settings.chat_model,
        embedding_provider = ?cli.settings.embedding_provider,
        "pdf-qa-server boot"
    );

    match cli.command {
        Command::Serve {
            bind,
            upload_dir,
            max_upload_bytes,
        } => {
            tokio::fs::create_dir_all(&upload_dir).await?;
            let state = AppState {
                session,
                upload_dir: Arc::new(upload_dir),
            };
            let app = create_app(state, max_upload_bytes);

            let listener = tokio::net::TcpListener::bind(bind).await?;
            info!(address = %bind, "listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Command::Ask { pdf, questions } => {
            let document = session.process_pdf(&pdf).await?;
            println!(
                "{} processed: {} pages, {} chunks",
                document.title, document.page_count, document.chunk_count
            );

            for question in questions {
                let result = session.query_pdf(&question).await?;
                println!("question: {question}");
                println!("answer: {}", result.answer);
                for source in result.sources {
                    println!("  [page {}] {}", source.page, source.content);
                }
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
