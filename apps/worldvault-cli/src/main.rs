use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use worldvault_compress::{CompressionEngine, Strategy, recommend, recommend_for};
use worldvault_model::{WorldBranch, WorldElement, WorldState, canonical_bytes};
use worldvault_persist::{
    ExportEnvelope, ExportFormat, FsBackend, ImportOptions, StoreConfig, WorldStore,
};

#[derive(Parser)]
#[command(name = "worldvault-cli", about = "CLI tool for worldvault stores")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Store configuration (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store directory
    #[arg(short, long, global = true, default_value = "worldvault-data")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version and schema info
    Info,
    /// Save a world JSON file as the next version of its world
    Save {
        file: PathBuf,
    },
    /// List stored worlds
    List,
    /// Export a stored world to an envelope file
    Export {
        id: String,
        /// json or compressed
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,
        /// Output path (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Import an export envelope
    Import {
        file: PathBuf,
        /// Keep the envelope's world id
        #[arg(long)]
        preserve_ids: bool,
        /// Skip the document shape check
        #[arg(long)]
        no_validate: bool,
        /// Do not back up an existing world with the same id
        #[arg(long)]
        no_backup: bool,
    },
    /// Compare every compression strategy on a world
    Bench {
        /// World JSON file (a generated world when omitted)
        file: Option<PathBuf>,
        /// Elements in the generated world
        #[arg(short, long, default_value = "200")]
        elements: usize,
        #[arg(short, long, default_value = "6")]
        level: u8,
    },
    /// Suggest a strategy for a world file or raw figures
    Recommend {
        file: Option<PathBuf>,
        #[arg(long, default_value = "0")]
        size: usize,
        #[arg(long, default_value = "0")]
        elements: usize,
        #[arg(long)]
        timeline: bool,
    },
    /// Save, export, and re-import a generated world
    Demo {
        #[arg(short, long, default_value = "50")]
        elements: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = match &cli.config {
        Some(path) => StoreConfig::from_path(path)?,
        None => StoreConfig::default(),
    };
    tracing::debug!(store = %cli.store.display(), command = ?cli.command, "dispatching");

    match cli.command {
        Commands::Info => {
            println!("worldvault-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("record schema: v{}", worldvault_persist::RECORD_SCHEMA_VERSION);
            println!("export schema: {}", worldvault_persist::EXPORT_SCHEMA_VERSION);
            let strategies: Vec<&str> = Strategy::ALL.iter().map(|s| s.as_str()).collect();
            println!("strategies: {}", strategies.join(", "));
        }
        Commands::Save { file } => {
            let store = open_store(&cli.store, config).await?;
            let mut world: WorldState = read_json(&file)?;
            let receipt = store.save_world(&mut world).await?;
            println!(
                "Saved {} v{} ({} bytes, {})",
                receipt.id, receipt.version, receipt.stored_bytes, receipt.algorithm
            );
        }
        Commands::List => {
            let store = open_store(&cli.store, config).await?;
            let worlds = store.list_worlds().await?;
            if worlds.is_empty() {
                println!("No worlds in {}", cli.store.display());
            }
            for w in worlds {
                println!(
                    "{:<36} v{:<5} {:>9} bytes  {:<10}  {}  {}",
                    w.id,
                    w.version,
                    w.stored_bytes,
                    w.algorithm,
                    w.last_modified.to_rfc3339(),
                    w.name
                );
            }
        }
        Commands::Export { id, format, out } => {
            let store = open_store(&cli.store, config).await?;
            let envelope = store.export_world(&id, format).await?;
            let text = serde_json::to_string_pretty(&envelope)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Exported {id} to {} (checksum {})", path.display(), envelope.checksum);
                }
                None => println!("{text}"),
            }
        }
        Commands::Import {
            file,
            preserve_ids,
            no_validate,
            no_backup,
        } => {
            let store = open_store(&cli.store, config).await?;
            let envelope: ExportEnvelope = read_json(&file)?;
            let options = ImportOptions {
                preserve_ids,
                validate_schema: !no_validate,
                create_backup: !no_backup,
            };
            let id = store.import_world(&envelope, options).await?;
            println!("Imported as {id}");
        }
        Commands::Bench {
            file,
            elements,
            level,
        } => {
            let world = match file {
                Some(path) => read_json(&path)?,
                None => sample_world(elements),
            };
            let engine = CompressionEngine::new();
            let size = canonical_bytes(&world)?.len();
            println!("Benchmark: world={}, {size} bytes, level={level}", world.id());
            for entry in engine.benchmark(&world, &Strategy::ALL, level) {
                println!(
                    "  {:<7} -> {:<10} ratio={:.3} time={:>8.3}ms score={:.4}",
                    entry.strategy,
                    entry.result.algorithm,
                    entry.result.ratio,
                    entry.result.duration.as_secs_f64() * 1000.0,
                    entry.score
                );
            }
        }
        Commands::Recommend {
            file,
            size,
            elements,
            timeline,
        } => {
            let (strategy, size, elements, timeline) = match file {
                Some(path) => {
                    let world: WorldState = read_json(&path)?;
                    let (strategy, size) = recommend_for(&world);
                    (strategy, size, world.element_count(), world.has_timeline())
                }
                None => (recommend(size, elements, timeline), size, elements, timeline),
            };
            println!("size={size} elements={elements} timeline={timeline} -> {strategy}");
        }
        Commands::Demo { elements } => {
            let store = open_store(&cli.store, config).await?;
            let mut world = sample_world(elements);
            for _ in 0..3 {
                let receipt = store.save_world(&mut world).await?;
                println!(
                    "Saved {} v{} ({} bytes, {})",
                    receipt.id, receipt.version, receipt.stored_bytes, receipt.algorithm
                );
            }

            let loaded = store.load_world(world.id()).await?;
            println!(
                "Loaded: version={}, elements={}, match={}",
                loaded.version(),
                loaded.element_count(),
                if loaded == world { "OK" } else { "MISMATCH" }
            );

            let envelope = store.export_world(world.id(), ExportFormat::Compressed).await?;
            let algorithm = envelope
                .compression
                .as_ref()
                .map_or("none".to_string(), |c| c.algorithm.to_string());
            println!("Exported: algorithm={algorithm}, checksum={}", envelope.checksum);

            let copy = store.import_world(&envelope, ImportOptions::default()).await?;
            let imported = store.load_world(&copy).await?;
            println!(
                "Imported as {copy}: elements={}, match={}",
                imported.element_count(),
                if imported.elements == world.elements { "OK" } else { "MISMATCH" }
            );

            let metrics = store.engine().metrics();
            println!(
                "Metrics: processed={}, compressed={}, average ratio={:.3}",
                metrics.total_processed, metrics.total_compressed, metrics.average_ratio
            );
        }
    }

    Ok(())
}

async fn open_store(dir: &Path, config: StoreConfig) -> anyhow::Result<Arc<WorldStore>> {
    let backend = FsBackend::open(dir)
        .await
        .with_context(|| format!("opening store at {}", dir.display()))?;
    Ok(WorldStore::open(Arc::new(backend), config).await?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// A village of near-identical houses on one branch.
fn sample_world(elements: usize) -> WorldState {
    let mut world = WorldState::new("demo-village", "Demo Village");
    world.creative_dna = json!({"mood": "pastoral", "palette": ["ochre", "moss", "slate"]});
    for i in 0..elements {
        let mut house = WorldElement::new(
            format!("house-{i}"),
            "building",
            glam::Vec3::new((i % 10) as f32 * 4.0, 0.0, (i / 10) as f32 * 4.0),
        );
        house.properties = json!({
            "roof": {"material": "thatch", "pitch": 35.0},
            "walls": {"material": "timber", "height": 3.0},
            "occupants": i % 5
        });
        house.metadata.name = format!("House {i}");
        house.metadata.tags = vec!["residential".into()];
        world.elements.push(house);
    }
    let mut main = WorldBranch::new("main", None);
    main.elements = world.elements.iter().map(|e| e.id.clone()).collect();
    world.active_branch_id = Some(main.id.clone());
    world.branches.push(main);
    world
}
