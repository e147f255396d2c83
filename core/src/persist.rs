use crate::error::{Result, StoreError};
use crate::DocId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, IVec, Tree};
use std::path::{Path, PathBuf};

pub const DOCUMENTS_TREE: &str = "documents";
pub const METADATA_TREE: &str = "metadata";
pub const SEQUENCES_TREE: &str = "sequences";
pub const POSTINGS_TREE: &str = "postings";
pub const DOC_TERMS_TREE: &str = "doc_terms";

/// Where a store lives on disk. `None` means a throwaway database that is
/// removed when the handle drops.
#[derive(Debug, Clone)]
pub struct DbPaths {
    pub root: Option<PathBuf>,
}

impl DbPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: Some(root.as_ref().to_path_buf()) }
    }

    pub fn temporary() -> Self { Self { root: None } }

    pub fn open(&self) -> Result<Db> {
        let config = match &self.root {
            Some(root) => sled::Config::new().path(root),
            None => sled::Config::new().temporary(true),
        };
        Ok(config.open()?)
    }
}

/// The five trees backing the logical tables.
pub struct Trees {
    pub documents: Tree,
    pub metadata: Tree,
    pub sequences: Tree,
    pub postings: Tree,
    pub doc_terms: Tree,
}

pub fn open_trees(db: &Db) -> Result<Trees> {
    Ok(Trees {
        documents: db.open_tree(DOCUMENTS_TREE)?,
        metadata: db.open_tree(METADATA_TREE)?,
        sequences: db.open_tree(SEQUENCES_TREE)?,
        postings: db.open_tree(POSTINGS_TREE)?,
        doc_terms: db.open_tree(DOC_TERMS_TREE)?,
    })
}

/// Big-endian so that tree order equals id order.
pub fn id_key(id: DocId) -> IVec {
    IVec::from(&id.to_be_bytes()[..])
}

pub fn decode_id(bytes: &[u8]) -> Result<DocId> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("id key of {} bytes", bytes.len())))?;
    Ok(DocId::from_be_bytes(raw))
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}
