//! On-disk persistence for derivation trees.
//!
//! Two encodings of the same [`TreeSnapshot`]:
//!
//! ```text
//! binary (.rstr)                         json (.json)
//! ┌──────┬─────────┬─────────┬────────┐  ┌──────────────────────────┐
//! │ RSTR │ u32 ver │ u64 len │ bincode│  │ pretty TreeSnapshot JSON │
//! └──────┴─────────┴─────────┴────────┘  └──────────────────────────┘
//! ```
//!
//! Integers in the header are little-endian. [`load_tree`] sniffs the magic
//! bytes, so either encoding can be loaded regardless of file extension.


use retrosyn_core::{DerivationTree, TreeError, TreeSnapshot};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File magic for binary tree files.
pub const TREE_MAGIC: &[u8; 4] = b"RSTR";

/// Version of the binary container (header layout), not of the snapshot.
pub const TREE_FILE_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 8;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a retrosyn tree file")]
    InvalidMagic,

    #[error("unsupported tree file version: {0}")]
    UnsupportedVersion(u32),

    #[error("truncated tree file: expected {expected} payload bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("binary codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// Formats
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeFormat {
    Binary,
    Json,
}

impl TreeFormat {
    /// `.json` files are JSON, everything else is binary.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => TreeFormat::Json,
            _ => TreeFormat::Binary,
        }
    }

    fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(TREE_MAGIC) {
            TreeFormat::Binary
        } else {
            TreeFormat::Json
        }
    }
}

/// Serialize a tree to the binary container.
pub fn to_bytes(tree: &DerivationTree) -> Result<Vec<u8>> {
    let payload = bincode::serialize(&tree.to_snapshot())?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(TREE_MAGIC);
    out.extend_from_slice(&TREE_FILE_VERSION.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parse the binary container and rebuild the tree, re-validating it.
pub fn from_bytes(bytes: &[u8]) -> Result<DerivationTree> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != TREE_MAGIC {
        return Err(StorageError::InvalidMagic);
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != TREE_FILE_VERSION {
        return Err(StorageError::UnsupportedVersion(version));
    }

    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[8..HEADER_LEN]);
    let expected = u64::from_le_bytes(len) as usize;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() < expected {
        return Err(StorageError::Truncated {
            expected,
            found: payload.len(),
        });
    }

    let snapshot: TreeSnapshot = bincode::deserialize(&payload[..expected])?;
    Ok(DerivationTree::from_snapshot(snapshot)?)
}

pub fn to_json(tree: &DerivationTree) -> Result<String> {
    Ok(serde_json::to_string_pretty(&tree.to_snapshot())?)
}

pub fn from_json(json: &str) -> Result<DerivationTree> {
    let snapshot: TreeSnapshot = serde_json::from_str(json)?;
    Ok(DerivationTree::from_snapshot(snapshot)?)
}

// ============================================================================
// Files
// ============================================================================

/// Write `tree` to `path`, picking the encoding from the extension.
pub fn save_tree(tree: &DerivationTree, path: &Path) -> Result<TreeFormat> {
    let format = TreeFormat::from_path(path);
    let bytes = match format {
        TreeFormat::Binary => to_bytes(tree)?,
        TreeFormat::Json => to_json(tree)?.into_bytes(),
    };
    std::fs::write(path, &bytes).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(
        path = %path.display(),
        ?format,
        nodes = tree.len(),
        bytes = bytes.len(),
        "saved derivation tree"
    );
    Ok(format)
}

/// Read a tree written by [`save_tree`] in either encoding.
pub fn load_tree(path: &Path) -> Result<DerivationTree> {
    let bytes = std::fs::read(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let format = TreeFormat::sniff(&bytes);
    let tree = match format {
        TreeFormat::Binary => from_bytes(&bytes)?,
        TreeFormat::Json => {
            let snapshot: TreeSnapshot = serde_json::from_slice(&bytes)?;
            DerivationTree::from_snapshot(snapshot)?
        }
    };
    tracing::debug!(path = %path.display(), ?format, nodes = tree.len(), "loaded derivation tree");
    Ok(tree)
}
