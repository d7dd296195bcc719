//! Init command implementation

use crate::config::{list_presets, Config};
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::store::{QdrantStore, VectorStore};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
    /// Named preset to start from
    pub preset: Option<String>,
}

/// Write the config file, create the metadata database and the collection
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
        preset,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = match preset.as_deref() {
        Some(name) => Config::from_preset(name).map_err(|e| {
            Error::Config(format!(
                "{} (available: {})",
                e,
                list_presets().join(", ")
            ))
        })?,
        None => Config::default(),
    };

    config.paths.base_dir = base_dir.clone();
    config.paths.config_file = config_path;
    config.paths.db_file = base_dir.join("metadata.db");
    config.validate()?;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    match QdrantStore::connect(&config) {
        Ok(store) => match store.ensure_ready().await {
            Ok(()) => info!("Qdrant collection '{}' ready", config.collection_name),
            Err(e) => warn!(
                "Could not create Qdrant collection: {}. It will be created on first index.",
                e
            ),
        },
        Err(e) => warn!(
            "Could not connect to Qdrant at {}: {}. Make sure Qdrant is running.",
            config.qdrant_url, e
        ),
    }

    Ok(config)
}

pub fn print_init(config: &Config) {
    println!("✓ Initialized zotero-rag at {:?}", config.paths.base_dir);
    println!("\nConfiguration: {:?}", config.paths.config_file);
    println!("Database: {:?}", config.paths.db_file);
    if let Some(preset) = &config.preset {
        println!("Preset: {}", preset);
    }
    println!("\nNext steps:");
    println!("  1. Start Zotero and enable its local API");
    println!("  2. Start Qdrant: docker run -p 6334:6334 qdrant/qdrant");
    println!("  3. zotero-rag libraries                  # Find library ids");
    println!("  4. zotero-rag index 0                    # Index your library");
    println!("  5. zotero-rag query \"your question\"      # Ask a question");
}
