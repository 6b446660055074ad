//! CLI entry point for lore-ingest.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use lore_graph::{BatchWriter, GraphClient, GraphStore};
use lore_registry::{ChecksumRegistry, FileKvStore, KvStore, MemoryKvStore, RegistryConfig};
use lore_validate::{CandidateBatch, StructuralValidator};

use lore_ingest::config::IngestConfig;
use lore_ingest::{IngestError, IngestPipeline, IngestRequest, ProvenanceManager, RecoverySweep};

#[derive(Parser)]
#[command(name = "lore-ingest")]
#[command(about = "Provenance-preserving ingestion for the Lore knowledge graph")]
struct Cli {
    /// Config file prefix (default: lore).
    #[arg(short, long, default_value = "lore", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a candidate batch and commit it to the graph.
    Ingest {
        /// JSON file with `concepts` and `relationships`.
        #[arg(long)]
        batch: PathBuf,

        /// Raw source document; its bytes are fingerprinted. Defaults to the batch file.
        #[arg(long)]
        source: Option<PathBuf>,

        /// Document id (default: random).
        #[arg(long)]
        doc_id: Option<String>,

        /// Logical filename (default: the source file's name).
        #[arg(long)]
        filename: Option<String>,

        /// Ingest even when identical content was already committed.
        #[arg(long)]
        force: bool,
    },

    /// Validate a candidate batch without touching the graph.
    Validate {
        #[arg(long)]
        batch: PathBuf,

        /// Promote configured warnings to errors.
        #[arg(long)]
        strict: bool,

        /// Apply auto-fix to an invalid batch and validate again.
        #[arg(long)]
        fix: bool,
    },

    /// Recompute every canonical concept and relationship.
    Rebuild,

    /// Fail and roll back documents stuck in PROCESSING.
    Sweep {
        /// Override recovery.processing_timeout_secs.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Remove a document's contribution from the graph.
    Delete {
        #[arg(long)]
        doc_id: String,
    },

    /// Show registry and graph state for a document.
    Status {
        #[arg(long)]
        doc_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config = IngestConfig::load(&cli.config)?;

    match cli.command {
        Command::Validate { batch, strict, fix } => {
            validate(&config, &batch, strict, fix).await
        }
        Command::Ingest {
            batch,
            source,
            doc_id,
            filename,
            force,
        } => {
            let pipeline = build_pipeline(&config).await?;
            let batch_json = tokio::fs::read(&batch).await?;
            let candidates: CandidateBatch = serde_json::from_slice(&batch_json)?;
            let source_path = source.as_deref().unwrap_or(batch.as_path());
            let content = match &source {
                Some(path) => tokio::fs::read(path).await?,
                None => batch_json,
            };

            let request = IngestRequest {
                doc_id: doc_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                filename: filename.unwrap_or_else(|| file_name(source_path)),
                content,
                batch: candidates,
                force_override: force,
            };

            match pipeline.ingest(request).await {
                Ok(outcome) => print_json(&outcome),
                Err(IngestError::Validation(verdict)) => {
                    print_json(&verdict)?;
                    anyhow::bail!("Batch rejected with {} errors", verdict.error_count)
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Rebuild => {
            let manager = build_manager(&config).await?;
            print_json(&manager.rebuild_all().await?)
        }
        Command::Sweep { timeout_secs } => {
            let pipeline = build_pipeline(&config).await?;
            let timeout = timeout_secs.unwrap_or(config.recovery.processing_timeout_secs);
            let sweep = RecoverySweep::new(
                pipeline.manager().clone(),
                pipeline.locks().clone(),
                Duration::from_secs(timeout),
            )
            .with_registry(Arc::clone(pipeline.registry()));
            print_json(&sweep.run().await?)
        }
        Command::Delete { doc_id } => {
            let manager = build_manager(&config).await?;
            print_json(&manager.delete_document(&doc_id).await?)
        }
        Command::Status { doc_id } => {
            let manager = build_manager(&config).await?;
            let registry = build_registry(&config.registry).await?;

            #[derive(Serialize)]
            struct Status {
                registry: Option<lore_registry::IngestionRecord>,
                document: Option<lore_core::SourceDocument>,
            }
            print_json(&Status {
                registry: registry.get_by_doc(&doc_id).await?,
                document: manager.store().get_document(&doc_id).await?,
            })
        }
    }
}

async fn validate(config: &IngestConfig, path: &Path, strict: bool, fix: bool) -> anyhow::Result<()> {
    let batch: CandidateBatch = serde_json::from_slice(&tokio::fs::read(path).await?)?;

    let mut validator_config = config.validator.clone();
    validator_config.strict |= strict;
    validator_config.auto_fix = fix;
    let validator = StructuralValidator::new(validator_config);

    let (batch, verdict) = validator.validate_with_fix(&batch);

    #[derive(Serialize)]
    struct Report<'a> {
        result: &'a lore_validate::ValidationResult,
        #[serde(skip_serializing_if = "Option::is_none")]
        fixed: Option<&'a CandidateBatch>,
    }
    print_json(&Report {
        result: &verdict,
        fixed: fix.then_some(&batch),
    })?;

    if !verdict.is_valid {
        anyhow::bail!("Batch is invalid ({} errors)", verdict.error_count);
    }
    Ok(())
}

async fn build_manager(config: &IngestConfig) -> anyhow::Result<ProvenanceManager> {
    let graph = GraphClient::connect(&config.neo4j).await?;
    graph.ensure_schema().await?;

    let store: Arc<dyn GraphStore> = Arc::new(graph);
    let writer = BatchWriter::with_batch_size(store, config.writer.batch_size);
    Ok(ProvenanceManager::new(writer))
}

async fn build_registry(config: &RegistryConfig) -> anyhow::Result<Arc<ChecksumRegistry>> {
    let kv: Arc<dyn KvStore> = match &config.dir {
        Some(dir) => Arc::new(FileKvStore::new(dir.clone()).await?),
        None => {
            tracing::warn!("registry.dir not set, checksum registry will not survive restarts");
            Arc::new(MemoryKvStore::new())
        }
    };
    Ok(Arc::new(ChecksumRegistry::with_ttl(
        kv,
        Duration::from_secs(config.ttl_secs),
    )))
}

async fn build_pipeline(config: &IngestConfig) -> anyhow::Result<IngestPipeline> {
    let manager = build_manager(config).await?;
    let registry = build_registry(&config.registry).await?;
    let validator = StructuralValidator::new(config.validator.clone());
    Ok(IngestPipeline::new(registry, validator, manager))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
