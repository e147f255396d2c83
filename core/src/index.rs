//! Inverted index over document bodies.
//!
//! Two trees back it. `postings` holds one empty-valued key per token
//! occurrence, laid out as `token 0x00 doc_id position` so a prefix scan on
//! `token 0x00` yields every document containing the token. `doc_terms` maps a
//! document id to the token sequence that was posted for it, which is what a
//! rebuild or delete removes.

use crate::error::{tx_abort, Result, StoreError, TxResult};
use crate::persist::{decode, encode, id_key};
use crate::tokenizer::tokenize;
use crate::{DocId, Posting};
use sled::transaction::TransactionalTree;
use sled::{Transactional, Tree};
use std::collections::BTreeSet;

const SEPARATOR: u8 = 0;

pub struct Index {
    postings: Tree,
    doc_terms: Tree,
}

impl Index {
    pub(crate) fn new(postings: Tree, doc_terms: Tree) -> Self {
        Self { postings, doc_terms }
    }

    pub(crate) fn trees(&self) -> (&Tree, &Tree) {
        (&self.postings, &self.doc_terms)
    }

    /// Replace every posting of `doc_id` with the tokenization of `body`.
    /// Runs as one transaction; on error the previous postings stay intact.
    pub(crate) fn rebuild(&self, doc_id: DocId, body: &str) -> Result<usize> {
        let count = (&self.postings, &self.doc_terms)
            .transaction(|(postings, doc_terms)| stage_rebuild(postings, doc_terms, doc_id, body))?;
        Ok(count)
    }

    /// Postings of one document in position order.
    pub fn postings_for(&self, doc_id: DocId) -> Result<Vec<Posting>> {
        let Some(raw) = self.doc_terms.get(id_key(doc_id))? else { return Ok(Vec::new()) };
        let terms: Vec<String> = decode(&raw)?;
        Ok(terms
            .into_iter()
            .enumerate()
            .map(|(pos, token)| Posting { doc_id, token, position: pos as u32 })
            .collect())
    }

    pub fn is_indexed(&self, doc_id: DocId) -> Result<bool> {
        Ok(self.doc_terms.contains_key(id_key(doc_id))?)
    }

    pub fn posting_count(&self) -> usize { self.postings.len() }

    /// Documents whose postings contain every term (AND-match).
    pub fn candidates<'a, I>(&self, terms: I) -> Result<BTreeSet<DocId>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut matched: Option<BTreeSet<DocId>> = None;
        for term in terms {
            let docs = self.documents_with(term)?;
            let next = match matched {
                None => docs,
                Some(prev) => prev.intersection(&docs).copied().collect(),
            };
            if next.is_empty() {
                return Ok(next);
            }
            matched = Some(next);
        }
        Ok(matched.unwrap_or_default())
    }

    fn documents_with(&self, term: &str) -> Result<BTreeSet<DocId>> {
        let prefix = term_prefix(term);
        let mut docs = BTreeSet::new();
        for item in self.postings.scan_prefix(&prefix) {
            let (key, _) = item?;
            docs.insert(posting_doc_id(&key, prefix.len())?);
        }
        Ok(docs)
    }
}

/// Stage a full replace of `doc_id`'s postings inside a caller's transaction.
pub(crate) fn stage_rebuild(
    postings: &TransactionalTree,
    doc_terms: &TransactionalTree,
    doc_id: DocId,
    body: &str,
) -> TxResult<usize> {
    stage_remove(postings, doc_terms, doc_id)?;
    let mut terms = Vec::new();
    for (token, pos) in tokenize(body) {
        postings.insert(posting_key(&token, doc_id, pos as u32), Vec::<u8>::new())?;
        terms.push(token);
    }
    doc_terms.insert(id_key(doc_id), encode(&terms).map_err(tx_abort)?)?;
    Ok(terms.len())
}

/// Stage removal of every posting of `doc_id`. Returns false when the
/// document had never been indexed.
pub(crate) fn stage_remove(
    postings: &TransactionalTree,
    doc_terms: &TransactionalTree,
    doc_id: DocId,
) -> TxResult<bool> {
    let Some(raw) = doc_terms.remove(id_key(doc_id))? else { return Ok(false) };
    let terms: Vec<String> = decode(&raw).map_err(tx_abort)?;
    for (pos, token) in terms.iter().enumerate() {
        postings.remove(posting_key(token, doc_id, pos as u32))?;
    }
    Ok(true)
}

fn term_prefix(term: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(term.len() + 1);
    key.extend_from_slice(term.as_bytes());
    key.push(SEPARATOR);
    key
}

fn posting_key(term: &str, doc_id: DocId, position: u32) -> Vec<u8> {
    let mut key = term_prefix(term);
    key.extend_from_slice(&doc_id.to_be_bytes());
    key.extend_from_slice(&position.to_be_bytes());
    key
}

fn posting_doc_id(key: &[u8], prefix_len: usize) -> Result<DocId> {
    key.get(prefix_len..prefix_len + 8)
        .and_then(|raw| raw.try_into().ok())
        .map(DocId::from_be_bytes)
        .ok_or_else(|| StoreError::Corrupt(format!("posting key of {} bytes", key.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::DbPaths;

    fn index() -> Index {
        let db = DbPaths::temporary().open().unwrap();
        Index::new(db.open_tree("postings").unwrap(), db.open_tree("doc_terms").unwrap())
    }

    #[test]
    fn postings_follow_token_order() {
        let idx = index();
        assert_eq!(idx.rebuild(7, "Beta, alpha; beta").unwrap(), 3);
        let postings = idx.postings_for(7).unwrap();
        let got: Vec<(&str, u32)> = postings.iter().map(|p| (p.token.as_str(), p.position)).collect();
        assert_eq!(got, [("beta", 0), ("alpha", 1), ("beta", 2)]);
        assert_eq!(idx.posting_count(), 3);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let idx = index();
        idx.rebuild(1, "one two two three").unwrap();
        let first = idx.postings_for(1).unwrap();
        idx.rebuild(1, "one two two three").unwrap();
        assert_eq!(idx.postings_for(1).unwrap(), first);
        assert_eq!(idx.posting_count(), 4);
    }

    #[test]
    fn rebuild_drops_stale_terms() {
        let idx = index();
        idx.rebuild(1, "moscow phone").unwrap();
        idx.rebuild(1, "kazan").unwrap();
        assert!(idx.candidates(["moscow"]).unwrap().is_empty());
        assert_eq!(idx.candidates(["kazan"]).unwrap().into_iter().collect::<Vec<_>>(), [1]);
        assert_eq!(idx.posting_count(), 1);
    }

    #[test]
    fn candidates_require_every_term() {
        let idx = index();
        idx.rebuild(1, "alpha beta").unwrap();
        idx.rebuild(2, "beta gamma").unwrap();
        assert_eq!(idx.candidates(["beta"]).unwrap().len(), 2);
        assert!(idx.candidates(["alpha", "gamma"]).unwrap().is_empty());
        assert!(idx.candidates(["delta"]).unwrap().is_empty());
    }

    #[test]
    fn term_prefix_does_not_match_longer_terms() {
        let idx = index();
        idx.rebuild(1, "betamax").unwrap();
        assert!(idx.candidates(["beta"]).unwrap().is_empty());
    }

    #[test]
    fn empty_body_is_indexed_with_no_postings() {
        let idx = index();
        assert_eq!(idx.rebuild(3, "").unwrap(), 0);
        assert!(idx.is_indexed(3).unwrap());
        assert!(idx.postings_for(3).unwrap().is_empty());
    }
}
