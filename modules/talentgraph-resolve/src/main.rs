use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use talentgraph_common::{Config, EngineConfig};
use talentgraph_graph::{
    run_migrations, GroundTruth, InfluenceScorer, MetricsAggregator, OrganizationDeduplicator,
    PgStore, RelationGraph, RelationRepairer,
};
use talentgraph_resolve::{
    apply_report, read_report, DeeplTranslator, IdentityTranslator, IngestDeps, Pacer,
    PersonIngestor, RelationInference, RelationIngestor, Translator, WikidataClient,
};

#[derive(Parser)]
#[command(name = "talentgraph", about = "AI people knowledge base maintenance jobs")]
struct Cli {
    /// TOML file with engine tunables. Defaults apply when omitted.
    #[arg(long, global = true, env = "TALENTGRAPH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending SQL migrations.
    Migrate,
    /// Resolve and ingest people listed one per line in a file.
    IngestPeople {
        #[arg(long)]
        names: PathBuf,
    },
    /// Merge duplicate organizations and migrate their references.
    DedupOrgs,
    /// Remove duplicate edges and resolve contradictory pairs.
    RepairRelations {
        /// JSON file of known-correct edges used to settle contradictions.
        #[arg(long)]
        ground_truth: Option<PathBuf>,
    },
    /// Reverse every edge imported from a source stored in the wrong direction.
    ReverseSource {
        #[arg(long)]
        provenance: String,
    },
    /// Derive colleague and cofounder edges from overlapping affiliations.
    InferRelations,
    /// Recompute influence scores and per-topic ranks.
    ComputeMetrics,
    /// Apply a reviewed content audit report.
    ApplyAudit {
        #[arg(long)]
        report: PathBuf,
    },
}

fn read_names(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read names file: {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("talentgraph=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    let engine = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => {
            let engine = EngineConfig::default();
            engine.validate()?;
            engine
        }
    };

    let store = Arc::new(PgStore::connect(&config.database_url).await?);

    match cli.command {
        Command::Migrate => {
            run_migrations(store.pool()).await?;
            info!("Migrations applied");
        }
        Command::IngestPeople { names } => {
            let names = read_names(&names)?;
            let translator: Arc<dyn Translator> = match &config.deepl_api_key {
                Some(key) => Arc::new(DeeplTranslator::new(
                    key.clone(),
                    engine.ingest.target_language.clone(),
                )),
                None => {
                    warn!("DEEPL_API_KEY not set, localized names will copy the source text");
                    Arc::new(IdentityTranslator)
                }
            };
            let deps = IngestDeps::builder()
                .people(store.clone())
                .orgs(store.clone())
                .content(store.clone())
                .knowledge(Arc::new(WikidataClient::new(config.wikidata_api_url.clone())?))
                .translator(translator)
                .pacer(Arc::new(Pacer::new(&engine.pacing)))
                .config(engine.ingest.clone())
                .build();
            PersonIngestor::new(deps).run(&names).await;
        }
        Command::DedupOrgs => {
            let report = OrganizationDeduplicator::new(store.clone(), store.clone())
                .run()
                .await?;
            for group in &report.groups {
                info!(
                    survivor = %group.survivor_id,
                    name = group.survivor_name.as_str(),
                    merged = group.merged_ids.len(),
                    edges_moved = group.edges_moved,
                    "Merged organization group"
                );
            }
            info!(
                groups = report.groups.len(),
                failed = report.failed.len(),
                "Organization dedup complete"
            );
        }
        Command::RepairRelations { ground_truth } => {
            let ground_truth = match ground_truth {
                Some(path) => GroundTruth::load(&path)?,
                None => GroundTruth::default(),
            };
            let report = RelationRepairer::new(RelationGraph::new(store.clone()), ground_truth)
                .run()
                .await?;
            info!(
                duplicates_removed = report.duplicates_removed,
                contradictions = report.contradictions_found,
                resolved = report.resolved.len(),
                unresolved = report.unresolved.len(),
                "Relation repair complete"
            );
        }
        Command::ReverseSource { provenance } => {
            let repairer =
                RelationRepairer::new(RelationGraph::new(store.clone()), GroundTruth::default());
            let report = repairer.reverse_source(&provenance).await?;
            info!(
                provenance = report.provenance.as_str(),
                reversed = report.reversed,
                collapsed = report.collapsed,
                already_applied = report.already_applied,
                "Source reversal complete"
            );
        }
        Command::InferRelations => {
            RelationInference::new(
                store.clone(),
                RelationIngestor::new(RelationGraph::new(store.clone())),
                engine.inference,
            )
            .run()
            .await?;
        }
        Command::ComputeMetrics => {
            let aggregator =
                MetricsAggregator::new(store.clone(), InfluenceScorer::new(engine.influence));
            let metrics = aggregator.run().await?;
            info!(people = metrics.len(), "Metrics saved");
        }
        Command::ApplyAudit { report } => {
            let rows = read_report(&report)?;
            let summary = apply_report(store.as_ref(), &rows).await?;
            for invalid in &summary.invalid {
                warn!(
                    content_id = %invalid.content_id,
                    value = invalid.value.as_str(),
                    "Row not applied"
                );
            }
        }
    }

    Ok(())
}
