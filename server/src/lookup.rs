//! Inline substring lookup over titles and bodies.
//!
//! This sits next to the keyword index rather than in it: it matches raw,
//! case-insensitive substrings and ranks title hits above body hits.

use cardex_core::Document;
use serde::Serialize;

pub const TITLE_RELEVANCE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Title,
    Content,
}

#[derive(Debug, Clone)]
pub struct LookupHit {
    pub doc: Document,
    pub match_type: MatchType,
    pub relevance: usize,
}

/// `docs` should arrive most recent first; equal relevance keeps that order.
pub fn lookup(docs: Vec<Document>, query: &str, limit: usize) -> Vec<LookupHit> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    let mut hits: Vec<LookupHit> = docs
        .into_iter()
        .filter_map(|doc| {
            if doc.title.to_lowercase().contains(&needle) {
                return Some(LookupHit { doc, match_type: MatchType::Title, relevance: TITLE_RELEVANCE });
            }
            let count = doc.body.to_lowercase().matches(&needle).count();
            (count > 0).then_some(LookupHit { doc, match_type: MatchType::Content, relevance: count })
        })
        .collect();
    hits.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn doc(id: u64, title: &str, body: &str) -> Document {
        let now = OffsetDateTime::UNIX_EPOCH;
        Document {
            id,
            title: title.into(),
            body: body.into(),
            doc_type: "TXT".into(),
            source: String::new(),
            file_path: String::new(),
            content_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn title_hits_outrank_body_hits() {
        let docs = vec![
            doc(1, "notes", "moscow moscow moscow"),
            doc(2, "Moscow office", "nothing"),
            doc(3, "other", "no match"),
        ];
        let hits = lookup(docs, "MOSCOW", 10);
        let got: Vec<(u64, MatchType, usize)> = hits.iter().map(|h| (h.doc.id, h.match_type, h.relevance)).collect();
        assert_eq!(got, [(2, MatchType::Title, 10), (1, MatchType::Content, 3)]);
    }

    #[test]
    fn substring_matches_inside_words() {
        let hits = lookup(vec![doc(1, "t", "betamax")], "beta", 10);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn blank_query_matches_nothing() {
        assert!(lookup(vec![doc(1, "t", "x")], "  ", 10).is_empty());
    }
}
