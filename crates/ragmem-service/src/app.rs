//! Application wiring.
//!
//! [`RagApp::build`] turns an [`AppConfig`] into connected services: storage
//! (Postgres or in-memory), inference, the retrieval index with its cache,
//! the ingestion worker, and the services on top.

use std::sync::Arc;

use tracing::{info, warn};

use ragmem_core::{
    ChunkRepository, DocumentRepository, EmbeddingBackend, Error, GenerationBackend,
    InferenceBackend, MemoryRepository, Result, RetrievalIndex,
};
use ragmem_db::{Database, InMemoryStore, TextChunker};
use ragmem_inference::{MockInferenceBackend, OpenAIBackend};
use ragmem_jobs::{ExtractionRegistry, IngestionPipeline, IngestionWorker, WorkerHandle};
use ragmem_search::{build_cache, build_index};

use crate::config::{AppConfig, InferenceKind};
use crate::documents::DocumentService;
use crate::memory_store::MemoryStore;
use crate::orchestrator::ChatOrchestrator;

struct Repositories {
    documents: Arc<dyn DocumentRepository>,
    chunks: Arc<dyn ChunkRepository>,
    memories: Arc<dyn MemoryRepository>,
}

struct Inference {
    embedder: Arc<dyn EmbeddingBackend>,
    generator: Arc<dyn GenerationBackend>,
}

impl Inference {
    async fn from_backend<B: InferenceBackend + 'static>(backend: B) -> Self {
        match backend.health_check().await {
            Ok(true) => info!(
                subsystem = "service",
                component = "app",
                embed_model = EmbeddingBackend::model_name(&backend),
                gen_model = GenerationBackend::model_name(&backend),
                "Inference backend reachable"
            ),
            Ok(false) | Err(_) => warn!(
                subsystem = "service",
                component = "app",
                embed_model = EmbeddingBackend::model_name(&backend),
                "Inference backend health check failed, continuing"
            ),
        }
        let backend = Arc::new(backend);
        Self {
            embedder: backend.clone(),
            generator: backend,
        }
    }
}

/// Fully wired ragmem services.
pub struct RagApp {
    pub config: AppConfig,
    pub documents: DocumentService,
    pub memories: Arc<MemoryStore>,
    pub chat: ChatOrchestrator,
    pub index: Arc<dyn RetrievalIndex>,
    pub worker: Arc<WorkerHandle>,
    database: Option<Database>,
}

impl RagApp {
    /// Connect storage and start the ingestion worker.
    ///
    /// With a `DATABASE_URL`, pending migrations are applied before anything
    /// else runs.
    pub async fn build(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let (database, repos) = match &config.database_url {
            Some(url) => {
                info!(subsystem = "service", component = "app", "Connecting to database");
                let db = Database::connect_with_config(url, config.pool.clone()).await?;
                db.migrate().await?;
                info!(subsystem = "service", component = "app", "Database migrations complete");
                let repos = Repositories {
                    documents: Arc::new(db.documents.clone()),
                    chunks: Arc::new(db.chunks.clone()),
                    memories: Arc::new(db.memories.clone()),
                };
                (Some(db), repos)
            }
            None => {
                warn!(
                    subsystem = "service",
                    component = "app",
                    "DATABASE_URL not set, using in-memory store (data is lost on exit)"
                );
                let store = Arc::new(InMemoryStore::new());
                let repos = Repositories {
                    documents: store.clone(),
                    chunks: store.clone(),
                    memories: store,
                };
                (None, repos)
            }
        };

        let inference = match config.inference {
            InferenceKind::OpenAI => {
                Inference::from_backend(OpenAIBackend::new(config.openai.clone())?).await
            }
            InferenceKind::Mock => Inference::from_backend(MockInferenceBackend::new()).await,
        };

        let cache = build_cache(&config.retrieval).await?;
        let index = build_index(
            &config.retrieval,
            repos.chunks.clone(),
            inference.embedder.clone(),
            cache,
        );

        let extractor = ExtractionRegistry::with_defaults();
        for (adapter, available) in extractor.health_check_all().await {
            if !available {
                warn!(
                    subsystem = "service",
                    component = "app",
                    adapter = %adapter,
                    "Extraction tool not available, matching uploads will fail"
                );
            }
        }

        let memories = Arc::new(MemoryStore::new(repos.memories.clone()));
        let pipeline = IngestionPipeline::new(
            repos.documents.clone(),
            Arc::new(extractor),
            Arc::new(TextChunker::new(config.chunker.clone())),
            index.clone(),
        );
        let worker = Arc::new(
            IngestionWorker::new(Arc::new(pipeline), config.worker.clone())
                .with_maintenance(memories.clone())
                .start(),
        );

        let documents = DocumentService::new(repos.documents, index.clone(), worker.clone())
            .with_settings(config.uploads.clone());
        let chat = ChatOrchestrator::new(index.clone(), memories.clone(), inference.generator)
            .with_settings(config.chat.clone());

        info!(
            subsystem = "service",
            component = "app",
            storage = if database.is_some() { "postgres" } else { "memory" },
            retrieval_backend = index.backend_name(),
            inference = %config.inference,
            "ragmem ready"
        );

        Ok(Self {
            config,
            documents,
            memories,
            chat,
            index,
            worker,
            database,
        })
    }

    /// Apply pending migrations. Fails without a database.
    pub async fn migrate(&self) -> Result<()> {
        match &self.database {
            Some(db) => db.migrate().await,
            None => Err(Error::Config("DATABASE_URL is not set".into())),
        }
    }

    pub fn uses_database(&self) -> bool {
        self.database.is_some()
    }

    /// Stop the worker after it drains queued documents.
    pub async fn shutdown(&self) -> Result<()> {
        self.worker.shutdown().await?;
        if let Some(db) = &self.database {
            db.close().await;
        }
        info!(subsystem = "service", component = "app", "ragmem stopped");
        Ok(())
    }
}
