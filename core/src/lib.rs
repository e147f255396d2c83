//! Persistent record store with a keyword inverted index.
//!
//! [`Store`] owns the documents, the metadata and the inverted index, and is
//! the only way to read or write any of them. Postings are rebuilt in the same
//! transaction as the document write that produced them.

pub mod error;
mod index;
pub mod model;
pub mod persist;
pub mod store;
pub mod tokenizer;

pub use error::{Result, StoreError};
pub use model::{DocId, Document, DocumentSummary, MetadataEntry, NewDocument, Posting, StoreStats};
pub use store::{content_hash, Store, DEFAULT_SEARCH_LIMIT, LAST_DOCUMENT_ID};
