//! Versioned world store over a [`Backend`].
//!
//! Key layout:
//! ```text
//! meta:store                 - StoreMeta JSON, written on first open
//! world:<id>                 - current record for a world
//! backup:<id>:<version>      - record copied aside before an import overwrote it
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use worldvault_compress::{Algorithm, CompressionEngine, CompressionResult};
use worldvault_model::{WorldState, canonical_bytes, canonical_value};

use crate::autosave::AutoSaveRegistry;
use crate::envelope::{self, check_shape};
use crate::locks::KeyedLocks;
use crate::record::{RecordHeader, StoreMeta, decode_record, encode_record, sha256_hex};
use crate::{
    AutoSaveErrorHandler, AutoSaveState, Backend, CompressionInfo, EXPORT_SCHEMA_VERSION,
    ExportEnvelope, ExportFormat, ImportOptions, RECORD_SCHEMA_VERSION, StoreConfig, StoreError,
    ValidationError,
};

const META_KEY: &str = "meta:store";
const WORLD_PREFIX: &str = "world:";
const BACKUP_PREFIX: &str = "backup:";

fn world_key(id: &str) -> String {
    format!("{WORLD_PREFIX}{id}")
}

fn backup_key(id: &str, version: u64) -> String {
    format!("{BACKUP_PREFIX}{id}:{version:010}")
}

fn mint_world_id() -> String {
    format!("world_{}", uuid::Uuid::new_v4().simple())
}

fn encode_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Encode(err.to_string())
}

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveReceipt {
    pub id: String,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    /// Record size on the backend, header included.
    pub stored_bytes: usize,
    pub algorithm: Algorithm,
    /// Mirrors `StoreConfig::sync_on_save` for a sync layer to act on.
    pub sync_requested: bool,
}

/// Header-only view of a stored world.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldSummary {
    pub id: String,
    pub name: String,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    pub stored_bytes: usize,
    pub algorithm: Algorithm,
}

/// Versioned persistence for world documents.
pub struct WorldStore {
    backend: Arc<dyn Backend>,
    engine: Arc<CompressionEngine>,
    config: StoreConfig,
    locks: KeyedLocks,
    pub(crate) autosave: AutoSaveRegistry,
    closed: AtomicBool,
}

impl WorldStore {
    /// Open a store on `backend`, writing store metadata on first use.
    pub async fn open(
        backend: Arc<dyn Backend>,
        config: StoreConfig,
    ) -> Result<Arc<Self>, StoreError> {
        Self::open_with_engine(backend, Arc::new(CompressionEngine::new()), config).await
    }

    /// Open with a shared compression engine, so its metrics cover this store.
    #[tracing::instrument(skip_all)]
    pub async fn open_with_engine(
        backend: Arc<dyn Backend>,
        engine: Arc<CompressionEngine>,
        config: StoreConfig,
    ) -> Result<Arc<Self>, StoreError> {
        match backend.get(META_KEY).await? {
            Some(bytes) => {
                let meta: StoreMeta =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptRecord {
                        key: META_KEY.to_string(),
                        reason: e.to_string(),
                    })?;
                if meta.record_schema_version != RECORD_SCHEMA_VERSION {
                    return Err(StoreError::SchemaMismatch {
                        found: meta.record_schema_version,
                        expected: RECORD_SCHEMA_VERSION,
                    });
                }
                tracing::info!(created_at = %meta.created_at, "opened world store");
            }
            None => {
                let meta = StoreMeta {
                    record_schema_version: RECORD_SCHEMA_VERSION,
                    created_at: Utc::now(),
                };
                let bytes = serde_json::to_vec_pretty(&meta).map_err(encode_err)?;
                backend.put(META_KEY, bytes).await?;
                tracing::info!("initialized world store");
            }
        }

        Ok(Arc::new(Self {
            backend,
            engine,
            config,
            locks: KeyedLocks::default(),
            autosave: AutoSaveRegistry::default(),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<CompressionEngine> {
        &self.engine
    }

    /// Stop auto-save timers and reject further operations. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.autosave.disable_all();
            tracing::info!("world store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Persist `doc` as the next version of its world.
    ///
    /// On success `doc.metadata.version` and `last_modified` are updated to
    /// the stored values. On failure `doc` is left untouched.
    #[tracing::instrument(skip_all, fields(world = %doc.metadata.id))]
    pub async fn save_world(&self, doc: &mut WorldState) -> Result<SaveReceipt, StoreError> {
        self.ensure_open()?;
        let key = world_key(&doc.metadata.id);
        let _guard = self.locks.lock(&key).await;
        self.save_locked(&key, doc).await
    }

    /// Save path shared by `save_world` and `import_world`. Caller holds the
    /// key lock.
    async fn save_locked(&self, key: &str, doc: &mut WorldState) -> Result<SaveReceipt, StoreError> {
        let prior = self.read_header(key).await?;
        let prior_version = prior.as_ref().map_or(0, |h| h.version);
        let mut last_modified = Utc::now().max(doc.metadata.last_modified);
        if let Some(header) = &prior {
            last_modified = last_modified.max(header.last_modified);
        }

        let previous = (doc.metadata.version, doc.metadata.last_modified);
        doc.metadata.version = doc.metadata.version.max(prior_version) + 1;
        doc.metadata.last_modified = last_modified;

        match self.write_record(key, doc).await {
            Ok(receipt) => {
                tracing::debug!(
                    version = receipt.version,
                    algorithm = %receipt.algorithm,
                    bytes = receipt.stored_bytes,
                    "saved world"
                );
                Ok(receipt)
            }
            Err(err) => {
                (doc.metadata.version, doc.metadata.last_modified) = previous;
                Err(err)
            }
        }
    }

    async fn write_record(&self, key: &str, doc: &WorldState) -> Result<SaveReceipt, StoreError> {
        let canonical = canonical_bytes(doc).map_err(encode_err)?;
        let original_size = canonical.len();

        let (algorithm, level, body) =
            if self.config.compresses_on_save(self.backend.size_ceiling()) {
                let result = self
                    .engine
                    .compress_async(doc.clone(), self.config.save_options())
                    .await;
                if result.is_compressed() {
                    (result.algorithm, result.metadata.level, result.data)
                } else {
                    (Algorithm::None, None, canonical)
                }
            } else {
                (Algorithm::None, None, canonical)
            };

        let header = RecordHeader {
            schema: RECORD_SCHEMA_VERSION,
            id: doc.metadata.id.clone(),
            name: doc.metadata.name.clone(),
            version: doc.metadata.version,
            last_modified: doc.metadata.last_modified,
            algorithm,
            level,
            original_size,
            body_sha256: sha256_hex(&body),
        };
        let bytes = encode_record(&header, &body)?;
        let stored_bytes = bytes.len();
        self.backend.put(key, bytes).await?;

        Ok(SaveReceipt {
            id: header.id,
            version: header.version,
            last_modified: header.last_modified,
            stored_bytes,
            algorithm,
            sync_requested: self.config.sync_on_save,
        })
    }

    async fn read_header(&self, key: &str) -> Result<Option<RecordHeader>, StoreError> {
        match self.backend.get(key).await? {
            Some(bytes) => Ok(Some(decode_record(key, &bytes)?.header)),
            None => Ok(None),
        }
    }

    /// Load the current version of a world.
    #[tracing::instrument(skip(self))]
    pub async fn load_world(&self, id: &str) -> Result<WorldState, StoreError> {
        self.ensure_open()?;
        let key = world_key(id);
        let bytes = self
            .backend
            .get(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let result = decode_record(&key, &bytes)?.to_compression_result();
        let decoded = self
            .engine
            .decompress_async(result, self.config.save_options().parallel)
            .await?;
        Ok(decoded.data)
    }

    /// Remove a world and release its auto-save registration. Deleting an
    /// unknown id succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn delete_world(&self, id: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.autosave.disable(id);
        let key = world_key(id);
        let _guard = self.locks.lock(&key).await;
        self.backend.delete(&key).await?;
        tracing::debug!("deleted world");
        Ok(())
    }

    /// Summaries of every stored world, ordered by id. Unreadable records are
    /// skipped with a warning.
    pub async fn list_worlds(&self) -> Result<Vec<WorldSummary>, StoreError> {
        self.ensure_open()?;
        let mut summaries = Vec::new();
        for key in self.backend.list_keys(Some(WORLD_PREFIX)).await? {
            let Some(bytes) = self.backend.get(&key).await? else {
                continue;
            };
            match decode_record(&key, &bytes) {
                Ok(record) => summaries.push(WorldSummary {
                    id: record.header.id,
                    name: record.header.name,
                    version: record.header.version,
                    last_modified: record.header.last_modified,
                    stored_bytes: bytes.len(),
                    algorithm: record.header.algorithm,
                }),
                Err(err) => tracing::warn!(%key, error = %err, "skipping unreadable record"),
            }
        }
        Ok(summaries)
    }

    /// Backup keys kept for a world, oldest version first.
    pub async fn list_backups(&self, id: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        let prefix = format!("{BACKUP_PREFIX}{id}:");
        Ok(self.backend.list_keys(Some(&prefix)).await?)
    }

    /// Package a stored world for transfer.
    #[tracing::instrument(skip(self))]
    pub async fn export_world(
        &self,
        id: &str,
        format: ExportFormat,
    ) -> Result<ExportEnvelope, StoreError> {
        let doc = self.load_world(id).await?;
        let tree = canonical_value(&doc).map_err(encode_err)?;
        let checksum = envelope::checksum(&tree).map_err(encode_err)?;

        let (world_state, compression) = match format {
            ExportFormat::Json => (tree, None),
            ExportFormat::Compressed => {
                let result = self
                    .engine
                    .compress_async(doc, self.config.export_compression)
                    .await;
                let info = CompressionInfo {
                    algorithm: result.algorithm,
                    level: result.metadata.level,
                };
                (Value::String(STANDARD.encode(&result.data)), Some(info))
            }
        };

        tracing::info!(?format, "exported world");
        Ok(ExportEnvelope {
            format,
            version: EXPORT_SCHEMA_VERSION.to_string(),
            world_state,
            compression,
            checksum,
            exported_at: Some(Utc::now()),
        })
    }

    /// Verify and store an exported world. Returns the id it was saved under.
    ///
    /// Checksum failures and shape failures are reported as distinct
    /// [`ValidationError`] variants. Nothing is written unless every check
    /// passes.
    #[tracing::instrument(skip_all, fields(format = ?envelope.format))]
    pub async fn import_world(
        &self,
        envelope: &ExportEnvelope,
        options: ImportOptions,
    ) -> Result<String, StoreError> {
        self.ensure_open()?;
        if envelope.version != EXPORT_SCHEMA_VERSION {
            return Err(ValidationError::UnsupportedVersion(envelope.version.clone()).into());
        }

        let tree = match envelope.format {
            ExportFormat::Json => envelope.world_state.clone(),
            ExportFormat::Compressed => self.unpack_payload(envelope).await?,
        };

        let actual = envelope::checksum(&tree).map_err(encode_err)?;
        if actual != envelope.checksum {
            return Err(ValidationError::ChecksumMismatch {
                expected: envelope.checksum.clone(),
                actual,
            }
            .into());
        }
        if options.validate_schema {
            check_shape(&tree)?;
        }

        // Runs even when the shape check is skipped: the tree must still type
        // as a document.
        let mut doc: WorldState = serde_json::from_value(tree)
            .map_err(|e| ValidationError::Unreadable(e.to_string()))?;
        if !options.preserve_ids || doc.metadata.id.is_empty() {
            doc.metadata.id = mint_world_id();
        }

        let key = world_key(&doc.metadata.id);
        let _guard = self.locks.lock(&key).await;
        if options.create_backup {
            self.backup_locked(&key, &doc.metadata.id).await?;
        }
        let receipt = self.save_locked(&key, &mut doc).await?;
        tracing::info!(world = %receipt.id, version = receipt.version, "imported world");
        Ok(receipt.id)
    }

    async fn unpack_payload(&self, envelope: &ExportEnvelope) -> Result<Value, StoreError> {
        let info = envelope.compression.as_ref().ok_or_else(|| {
            ValidationError::Schema("compressed export has no compression block".into())
        })?;
        let text = envelope.world_state.as_str().ok_or_else(|| {
            ValidationError::Schema("compressed payload must be a base64 string".into())
        })?;
        let data = STANDARD
            .decode(text)
            .map_err(|e| ValidationError::Schema(format!("payload is not base64: {e}")))?;
        let decoded = self
            .engine
            .decompress_async(
                CompressionResult::from_payload(info.algorithm, info.level, data),
                self.config.save_options().parallel,
            )
            .await?;
        canonical_value(&decoded.data).map_err(encode_err)
    }

    /// Copy the current record under `key` aside. Caller holds the key lock.
    async fn backup_locked(&self, key: &str, id: &str) -> Result<(), StoreError> {
        let Some(bytes) = self.backend.get(key).await? else {
            return Ok(());
        };
        let version = match decode_record(key, &bytes) {
            Ok(record) => record.header.version,
            Err(err) => {
                tracing::warn!(%key, error = %err, "backing up unreadable record");
                0
            }
        };
        let backup = backup_key(id, version);
        self.backend.put(&backup, bytes).await?;
        tracing::debug!(%backup, "backed up world before import");
        Ok(())
    }

    /// Start debounced auto-save for `id`, flushing every `interval`.
    /// Fails with [`StoreError::NoRuntime`] outside a Tokio runtime.
    pub fn enable_auto_save(self: &Arc<Self>, id: &str, interval: Duration) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.autosave.enable(self, id, interval)
    }

    /// Queue `doc` for the next flush of its world, replacing anything queued.
    pub fn queue_auto_save(&self, doc: WorldState) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.autosave.queue(doc)
    }

    /// Cancel auto-save for every world.
    pub fn disable_auto_save(&self) {
        self.autosave.disable_all();
    }

    /// Cancel auto-save for one world. Returns whether it was enabled.
    pub fn disable_auto_save_for(&self, id: &str) -> bool {
        self.autosave.disable(id)
    }

    pub fn auto_save_state(&self, id: &str) -> AutoSaveState {
        self.autosave.state(id)
    }

    pub fn auto_save_interval(&self, id: &str) -> Option<Duration> {
        self.autosave.interval(id)
    }

    pub fn set_auto_save_error_handler(&self, handler: AutoSaveErrorHandler) {
        self.autosave.set_error_handler(handler);
    }
}

impl Drop for WorldStore {
    fn drop(&mut self) {
        self.autosave.disable_all();
    }
}
