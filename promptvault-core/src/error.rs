//! Error types for PromptVault operations

use thiserror::Error;

/// Kind of persisted entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Prompt,
    VersionEntry,
    UsageEvent,
}

/// Source-of-truth store errors.
///
/// These are the only failures allowed to reach callers of the service layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity:?} with id {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("Entity already exists: {entity:?} with id {id}")]
    Duplicate { entity: EntityKind, id: String },

    #[error("Insert failed for {entity:?}: {reason}")]
    InsertFailed { entity: EntityKind, reason: String },

    #[error("Update failed for {entity:?} with id {id}: {reason}")]
    UpdateFailed {
        entity: EntityKind,
        id: String,
        reason: String,
    },

    #[error("Delete failed for {entity:?} with id {id}: {reason}")]
    DeleteFailed {
        entity: EntityKind,
        id: String,
        reason: String,
    },

    #[error("Store backend error: {reason}")]
    Backend { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache layer errors.
///
/// The service layer never surfaces these: a failing cache degrades to the
/// store-backed path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("Cache deserialization error: {0}")]
    Deserialization(String),

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },
}

/// Version ledger errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Version entry append failed for prompt {prompt_id} at version {version}: {reason}")]
    AppendFailed {
        prompt_id: String,
        version: u32,
        reason: String,
    },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all PromptVault errors.
#[derive(Debug, Clone, Error)]
pub enum VaultError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl VaultError {
    /// Whether this error originated in the cache layer.
    pub fn is_cache(&self) -> bool {
        matches!(self, Self::Cache(_))
    }
}

/// Result type alias for PromptVault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Result type alias for cache-layer operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
