//! Durable document store.
//!
//! Every mutation takes the write side of `gate` and commits one sled
//! transaction spanning the document row, its postings and any metadata it
//! touches, so either all of it lands or none of it does. Reads take the read
//! side and therefore only ever observe committed states.

use crate::error::{tx_abort, Result, StoreError, TxResult};
use crate::index::{self, Index};
use crate::persist::{decode, decode_id, encode, id_key, open_trees, DbPaths};
use crate::tokenizer::distinct_terms;
use crate::{DocId, Document, DocumentSummary, MetadataEntry, NewDocument, Posting, StoreStats};
use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use sled::transaction::TransactionalTree;
use sled::{Db, Transactional, Tree};
use std::cmp::Ordering;
use std::path::Path;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Metadata key refreshed by every successful `add_document`.
pub const LAST_DOCUMENT_ID: &str = "last_document_id";

const DOCUMENT_SEQUENCE: &str = "documents";

/// Hands out strictly increasing timestamps so recency order is total even
/// when two writes land within the clock's resolution.
struct Clock {
    last: OffsetDateTime,
}

impl Clock {
    fn tick(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        self.last = if now > self.last { now } else { self.last + Duration::nanoseconds(1) };
        self.last
    }
}

pub struct Store {
    db: Db,
    documents: Tree,
    metadata: Tree,
    sequences: Tree,
    index: Index,
    gate: RwLock<Clock>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_paths(DbPaths::new(path))
    }

    /// A store backed by a temporary database, removed on drop.
    pub fn temporary() -> Result<Self> {
        Self::with_paths(DbPaths::temporary())
    }

    fn with_paths(paths: DbPaths) -> Result<Self> {
        let db = paths.open()?;
        let trees = open_trees(&db)?;
        let mut store = Self {
            db,
            documents: trees.documents,
            metadata: trees.metadata,
            sequences: trees.sequences,
            index: Index::new(trees.postings, trees.doc_terms),
            gate: RwLock::new(Clock { last: OffsetDateTime::UNIX_EPOCH }),
        };
        let latest = store.scan_documents()?.into_iter().map(|d| d.updated_at).max();
        if let Some(latest) = latest {
            store.gate.get_mut().last = latest;
        }
        info!(path = ?paths.root, documents = store.documents.len(), "store opened");
        Ok(store)
    }

    /// Postings of one document in position order.
    pub fn postings_for(&self, id: DocId) -> Result<Vec<Posting>> {
        let _clock = self.gate.read();
        self.index.postings_for(id)
    }

    /// True once the document's body has gone through the index, even when
    /// it produced no tokens.
    pub fn is_indexed(&self, id: DocId) -> Result<bool> {
        let _clock = self.gate.read();
        self.index.is_indexed(id)
    }

    pub fn posting_count(&self) -> usize {
        let _clock = self.gate.read();
        self.index.posting_count()
    }

    pub fn add_document(&self, new: NewDocument) -> Result<DocId> {
        let mut clock = self.gate.write();
        let now = clock.tick();
        let content_hash = content_hash(&new.body);
        let (postings, doc_terms) = self.index.trees();
        let (id, tokens) = (&self.documents, &self.metadata, &self.sequences, postings, doc_terms)
            .transaction(|(documents, metadata, sequences, postings, doc_terms)| -> TxResult<(DocId, usize)> {
                let id = next_id(sequences)?;
                let doc = Document {
                    id,
                    title: new.title.clone(),
                    body: new.body.clone(),
                    doc_type: new.doc_type.clone(),
                    source: new.source.clone(),
                    file_path: new.file_path.clone(),
                    content_hash: content_hash.clone(),
                    created_at: now,
                    updated_at: now,
                };
                documents.insert(id_key(id), encode(&doc).map_err(tx_abort)?)?;
                let tokens = index::stage_rebuild(postings, doc_terms, id, &doc.body)?;
                stage_metadata(metadata, LAST_DOCUMENT_ID, &id.to_string(), now)?;
                Ok((id, tokens))
            })?;
        info!(doc_id = id, tokens, doc_type = %new.doc_type, "document added");
        Ok(id)
    }

    /// Apply the supplied fields together. `Ok(false)` when nothing was
    /// supplied or the document does not exist.
    pub fn update_document(&self, id: DocId, title: Option<&str>, body: Option<&str>) -> Result<bool> {
        if title.is_none() && body.is_none() {
            return Ok(false);
        }
        let mut clock = self.gate.write();
        let now = clock.tick();
        let (postings, doc_terms) = self.index.trees();
        let outcome = (&self.documents, postings, doc_terms).transaction(|(documents, postings, doc_terms)| -> TxResult<Option<Option<usize>>> {
            let Some(raw) = documents.get(id_key(id))? else { return Ok(None) };
            let mut doc: Document = decode(&raw).map_err(tx_abort)?;
            if let Some(title) = title {
                doc.title = title.to_string();
            }
            let mut tokens = None;
            if let Some(body) = body {
                doc.body = body.to_string();
                doc.content_hash = content_hash(body);
                tokens = Some(index::stage_rebuild(postings, doc_terms, id, body)?);
            }
            doc.updated_at = now;
            documents.insert(id_key(id), encode(&doc).map_err(tx_abort)?)?;
            Ok(Some(tokens))
        })?;
        match outcome {
            Some(tokens) => {
                info!(doc_id = id, reindexed = tokens.is_some(), "document updated");
                Ok(true)
            }
            None => {
                debug!(doc_id = id, "update of unknown document");
                Ok(false)
            }
        }
    }

    /// Remove a document and all of its postings. `Ok(false)` for unknown ids.
    pub fn delete_document(&self, id: DocId) -> Result<bool> {
        let _clock = self.gate.write();
        let (postings, doc_terms) = self.index.trees();
        let removed = (&self.documents, postings, doc_terms).transaction(|(documents, postings, doc_terms)| -> TxResult<bool> {
            if documents.remove(id_key(id))?.is_none() {
                return Ok(false);
            }
            index::stage_remove(postings, doc_terms, id)?;
            Ok(true)
        })?;
        if removed {
            info!(doc_id = id, "document deleted");
        } else {
            debug!(doc_id = id, "delete of unknown document");
        }
        Ok(removed)
    }

    pub fn get_document(&self, id: DocId) -> Result<Option<Document>> {
        let _clock = self.gate.read();
        self.load(id)
    }

    /// Summaries of every document, most recently updated first.
    pub fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        Ok(self.documents()?.iter().map(DocumentSummary::from).collect())
    }

    /// Every full record, most recently updated first.
    pub fn documents(&self) -> Result<Vec<Document>> {
        let _clock = self.gate.read();
        let mut docs = self.scan_documents()?;
        docs.sort_by(by_recency);
        Ok(docs)
    }

    /// Most recently updated document whose title equals `title` exactly.
    pub fn find_by_title(&self, title: &str) -> Result<Option<Document>> {
        Ok(self.documents()?.into_iter().find(|d| d.title == title))
    }

    /// AND-match over the distinct terms of `query`, newest first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        let mut hits = self.matching(query)?;
        hits.truncate(limit);
        Ok(hits)
    }

    /// Documents of one type. An empty query lists the whole type; any other
    /// query is AND-matched, so one without terms finds nothing.
    pub fn search_by_type(&self, doc_type: &str, query: &str, limit: usize) -> Result<Vec<Document>> {
        let pool = if query.is_empty() { self.documents()? } else { self.matching(query)? };
        Ok(pool.into_iter().filter(|d| d.doc_type == doc_type).take(limit).collect())
    }

    fn matching(&self, query: &str) -> Result<Vec<Document>> {
        let terms = distinct_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let _clock = self.gate.read();
        let candidates = self.index.candidates(terms.iter().map(String::as_str))?;
        let mut hits = Vec::with_capacity(candidates.len());
        for id in candidates {
            let doc = self
                .load(id)?
                .ok_or_else(|| StoreError::Corrupt(format!("posting references missing document {id}")))?;
            hits.push(doc);
        }
        hits.sort_by(by_recency);
        debug!(query, terms = terms.len(), hits = hits.len(), "search");
        Ok(hits)
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(self.metadata_entry(key)?.map(|entry| entry.value))
    }

    pub fn metadata_entry(&self, key: &str) -> Result<Option<MetadataEntry>> {
        let _clock = self.gate.read();
        match self.metadata.get(key)? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Upsert; the first write's `created_at` is kept.
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let mut clock = self.gate.write();
        let now = clock.tick();
        self.metadata.transaction(|metadata| stage_metadata(metadata, key, value, now))?;
        Ok(())
    }

    pub fn get_stats(&self) -> Result<StoreStats> {
        let _clock = self.gate.read();
        let mut stats = StoreStats {
            total_documents: self.documents.len() as u64,
            total_postings: self.index.posting_count() as u64,
            ..StoreStats::default()
        };
        for doc in self.scan_documents()? {
            *stats.counts_by_type.entry(doc.doc_type).or_insert(0) += 1;
        }
        Ok(stats)
    }

    /// Rebuild one document's postings from its stored body.
    pub fn reindex(&self, id: DocId) -> Result<bool> {
        let _clock = self.gate.write();
        let Some(doc) = self.load(id)? else { return Ok(false) };
        self.index.rebuild(id, &doc.body)?;
        Ok(true)
    }

    /// Rebuild the postings of every document, one transaction each.
    pub fn reindex_all(&self) -> Result<usize> {
        let _clock = self.gate.write();
        let docs = self.scan_documents()?;
        for doc in &docs {
            self.index.rebuild(doc.id, &doc.body)?;
        }
        info!(documents = docs.len(), "index rebuilt");
        Ok(docs.len())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn load(&self, id: DocId) -> Result<Option<Document>> {
        match self.documents.get(id_key(id))? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    fn scan_documents(&self) -> Result<Vec<Document>> {
        self.documents.iter().values().map(|raw| decode::<Document>(&raw?)).collect()
    }
}

/// SHA-1 of the body, lowercase hex.
pub fn content_hash(body: &str) -> String {
    Sha1::digest(body.as_bytes()).iter().map(|b| format!("{b:02x}")).collect()
}

fn by_recency(a: &Document, b: &Document) -> Ordering {
    b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id))
}

fn next_id(sequences: &TransactionalTree) -> TxResult<DocId> {
    let last = match sequences.get(DOCUMENT_SEQUENCE)? {
        Some(raw) => decode_id(&raw).map_err(tx_abort)?,
        None => 0,
    };
    let id = last + 1;
    sequences.insert(DOCUMENT_SEQUENCE, id_key(id))?;
    Ok(id)
}

fn stage_metadata(metadata: &TransactionalTree, key: &str, value: &str, now: OffsetDateTime) -> TxResult<()> {
    let created_at = match metadata.get(key)? {
        Some(raw) => decode::<MetadataEntry>(&raw).map_err(tx_abort)?.created_at,
        None => now,
    };
    let entry = MetadataEntry { value: value.to_string(), created_at, updated_at: now };
    metadata.insert(key, encode(&entry).map_err(tx_abort)?)?;
    Ok(())
}
