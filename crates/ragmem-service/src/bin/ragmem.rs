//! ragmem: command-line front end for the retrieval-and-memory pipeline.
//!
//! Configuration comes from the environment (and `.env`); see
//! [`AppConfig::from_env`]. Results are printed as JSON on stdout, logs go to
//! stderr or `LOG_FILE`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use ragmem_jobs::IngestEvent;
use ragmem_service::{
    init_tracing, parse_tags, AppConfig, ChatRequest, DocumentStatus, Error, MemoryQuery, NewMemory,
    RagApp, UploadedFile,
};

#[derive(Parser)]
#[command(name = "ragmem")]
#[command(author, version, about = "Document question answering with long-term memory")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Register files and wait until each is indexed or failed
    Ingest {
        /// Owner of the documents
        #[arg(short, long)]
        user: Uuid,

        /// Files to ingest
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },

    /// Ask a question against your documents and memories
    Ask {
        #[arg(short, long)]
        user: Uuid,

        /// Restrict retrieval to these documents (repeatable)
        #[arg(short, long)]
        doc: Vec<Uuid>,

        /// Sampling temperature, 0 to 2
        #[arg(short, long)]
        temperature: Option<f32>,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Skip document retrieval
        #[arg(long)]
        no_retrieval: bool,

        /// Skip memory retrieval
        #[arg(long)]
        no_memory: bool,

        /// Extra clarification appended to the context
        #[arg(long)]
        clarify: Option<String>,

        question: String,
    },

    /// Manage long-term memories
    Memory {
        #[command(subcommand)]
        action: MemoryCommand,
    },

    /// Manage documents
    Documents {
        #[command(subcommand)]
        action: DocumentCommand,
    },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// Store a memory
    Add {
        #[arg(short, long)]
        user: Uuid,

        /// Importance in [0, 1]; drives expiry
        #[arg(short, long, default_value_t = 0.5)]
        importance: f32,

        #[arg(short, long)]
        category: Option<String>,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,

        content: String,
    },

    /// List memories, newest first
    List {
        #[arg(short, long)]
        user: Uuid,

        /// Include deactivated memories
        #[arg(short, long)]
        all: bool,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Retrieve memories matching any query word
    Search {
        #[arg(short, long)]
        user: Uuid,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(long, default_value_t = 0.0)]
        min_importance: f32,

        #[arg(short, long)]
        limit: Option<usize>,

        query: Option<String>,
    },

    /// Deactivate a memory
    Forget {
        #[arg(short, long)]
        user: Uuid,

        id: Uuid,
    },

    /// Deactivate expired memories
    Cleanup {
        /// Only this user's memories (default: everyone)
        #[arg(short, long)]
        user: Option<Uuid>,
    },
}

#[derive(Subcommand)]
enum DocumentCommand {
    /// List documents, newest first
    List {
        #[arg(short, long)]
        user: Uuid,

        /// processing, completed, or failed
        #[arg(short, long)]
        status: Option<DocumentStatus>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show document totals
    Stats {
        #[arg(short, long)]
        user: Uuid,
    },

    /// Delete a document, its chunks, and its stored file
    Delete {
        #[arg(short, long)]
        user: Uuid,

        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load().context("invalid configuration")?;
    let _log_guard = init_tracing(&config.log)?;

    let app = RagApp::build(config).await.context("failed to start ragmem")?;
    let result = dispatch(&app, cli.command).await;
    app.shutdown().await?;
    result
}

async fn dispatch(app: &RagApp, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => {
            app.migrate().await?;
            print_json(&serde_json::json!({ "migrated": true }))
        }
        Commands::Ingest {
            user,
            files,
            timeout_secs,
        } => cmd_ingest(app, user, files, Duration::from_secs(timeout_secs)).await,
        Commands::Ask {
            user,
            doc,
            temperature,
            top_k,
            no_retrieval,
            no_memory,
            clarify,
            question,
        } => {
            let mut request = ChatRequest::new(user, question);
            if !doc.is_empty() {
                request = request.with_documents(doc);
            }
            request.temperature = temperature;
            request.top_k = top_k;
            request.use_retrieval = !no_retrieval;
            request.use_memory = !no_memory;
            request.extra_prompt = clarify;
            cmd_ask(app, request).await
        }
        Commands::Memory { action } => cmd_memory(app, action).await,
        Commands::Documents { action } => cmd_documents(app, action).await,
    }
}

async fn cmd_ingest(
    app: &RagApp,
    user: Uuid,
    files: Vec<PathBuf>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let mut events = app.worker.events();
    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let upload = UploadedFile::from_path(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let document = app
            .documents
            .register_upload(user, upload)
            .await
            .with_context(|| format!("cannot register {}", path.display()))?;
        documents.push(document);
    }

    let mut pending: HashSet<Uuid> = documents
        .iter()
        .filter(|d| d.status == DocumentStatus::Processing)
        .map(|d| d.id)
        .collect();

    let waited = tokio::time::timeout(timeout, async {
        while !pending.is_empty() {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) if event.is_terminal() => {
                        if let Some(id) = event.document_id() {
                            pending.remove(&id);
                        }
                    }
                    Ok(IngestEvent::WorkerStopped) | Err(RecvError::Closed) => break,
                    Ok(_) => {}
                    // Missed events; statuses are re-read below.
                    Err(RecvError::Lagged(_)) => break,
                },
                _ = tokio::signal::ctrl_c() => bail!("interrupted"),
            }
        }
        Ok::<_, anyhow::Error>(())
    })
    .await;
    match waited {
        Ok(inner) => inner?,
        Err(_) => eprintln!("Timed out waiting for ingestion; reporting current status"),
    }

    let mut report = Vec::with_capacity(documents.len());
    for document in &documents {
        report.push(app.documents.get(document.id, user).await?);
    }
    print_json(&report)
}

async fn cmd_ask(app: &RagApp, request: ChatRequest) -> anyhow::Result<()> {
    request.validate()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = app.chat.converse_with_cancel(&request, &cancel).await;
    watcher.abort();

    match result {
        Ok(reply) => print_json(&reply),
        Err(Error::Cancelled) => bail!("interrupted"),
        Err(e) => Err(e.into()),
    }
}

async fn cmd_memory(app: &RagApp, action: MemoryCommand) -> anyhow::Result<()> {
    match action {
        MemoryCommand::Add {
            user,
            importance,
            category,
            tags,
            content,
        } => {
            let mut memory = NewMemory::new(content, importance);
            if let Some(category) = category {
                memory = memory.with_category(category);
            }
            if let Some(tags) = tags {
                memory = memory.with_tags(parse_tags(&tags));
            }
            print_json(&app.memories.add(user, memory).await?)
        }
        MemoryCommand::List { user, all, limit } => {
            print_json(&app.memories.list(user, all, limit).await?)
        }
        MemoryCommand::Search {
            user,
            category,
            min_importance,
            limit,
            query,
        } => {
            let mut filter = MemoryQuery::default().with_min_importance(min_importance);
            if let Some(query) = query {
                filter = filter.with_query(query);
            }
            if let Some(category) = category {
                filter = filter.with_category(category);
            }
            if let Some(limit) = limit {
                filter = filter.with_limit(limit);
            }
            print_json(&app.memories.retrieve(user, &filter).await?)
        }
        MemoryCommand::Forget { user, id } => {
            app.memories.deactivate(id, user).await?;
            print_json(&serde_json::json!({ "id": id, "is_active": false }))
        }
        MemoryCommand::Cleanup { user } => {
            let deactivated = app.memories.cleanup_expired(user).await?;
            print_json(&serde_json::json!({ "deactivated": deactivated }))
        }
    }
}

async fn cmd_documents(app: &RagApp, action: DocumentCommand) -> anyhow::Result<()> {
    match action {
        DocumentCommand::List {
            user,
            status,
            limit,
        } => print_json(&app.documents.list(user, status, limit).await?),
        DocumentCommand::Stats { user } => print_json(&app.documents.stats(user).await?),
        DocumentCommand::Delete { user, id } => {
            if !app.documents.delete(id, user).await? {
                return Err(Error::DocumentNotFound(id).into());
            }
            print_json(&serde_json::json!({ "id": id, "deleted": true }))
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
