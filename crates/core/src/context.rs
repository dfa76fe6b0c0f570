use crate::models::{DocumentId, FragmentId, SearchResult, Span};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Attribution record for one fragment included in the assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: DocumentId,
    pub ordinal: u32,
    pub span: Span,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub citations: Vec<Citation>,
}

pub const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Packs ranked fragments into a bounded context payload for the downstream
/// completion call.
///
/// Greedy in rank order: the first fragment is always taken, then assembly
/// stops at the first fragment whose text would push the running total past
/// `max_context_chars`. Fragments are never split to fit. Duplicates (same
/// document and ordinal) are skipped before the budget check. Only fragment
/// text counts against the budget; the separator does not.
pub fn assemble(ranked: &[SearchResult], max_context_chars: usize) -> AssembledContext {
    let mut seen: HashSet<FragmentId> = HashSet::new();
    let mut accepted: Vec<&SearchResult> = Vec::new();
    let mut used = 0usize;

    for result in ranked {
        if !seen.insert(result.fragment_id) {
            continue;
        }
        let length = result.text.chars().count();
        if !accepted.is_empty() && used + length > max_context_chars {
            break;
        }
        used += length;
        accepted.push(result);
    }

    AssembledContext {
        text: accepted
            .iter()
            .map(|result| result.text.as_str())
            .collect::<Vec<_>>()
            .join(FRAGMENT_SEPARATOR),
        citations: accepted
            .iter()
            .map(|result| Citation {
                document_id: result.fragment_id.document,
                ordinal: result.fragment_id.ordinal,
                span: result.span,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(document: DocumentId, ordinal: u32, length: usize, rank: usize) -> SearchResult {
        SearchResult {
            fragment_id: FragmentId { document, ordinal },
            span: Span {
                start: 0,
                end: length,
            },
            text: "x".repeat(length),
            score: 1.0 / rank as f64,
            rank,
        }
    }

    #[test]
    fn empty_input_assembles_to_nothing() {
        let assembled = assemble(&[], 500);
        assert!(assembled.text.is_empty());
        assert!(assembled.citations.is_empty());
    }

    #[test]
    fn assembly_stops_at_the_first_overflowing_fragment() {
        let document = DocumentId::new();
        let ranked = vec![
            result(document, 0, 100, 1),
            result(document, 1, 150, 2),
            result(document, 2, 120, 3),
        ];

        let assembled = assemble(&ranked, 220);
        assert_eq!(assembled.citations.len(), 1);
        assert_eq!(assembled.citations[0].ordinal, 0);
        assert_eq!(assembled.text.chars().count(), 100);
    }

    #[test]
    fn exact_fit_is_accepted() {
        let document = DocumentId::new();
        let ranked = vec![
            result(document, 0, 100, 1),
            result(document, 1, 120, 2),
        ];

        let assembled = assemble(&ranked, 220);
        assert_eq!(assembled.citations.len(), 2);
    }

    #[test]
    fn first_fragment_is_included_even_when_oversized() {
        let document = DocumentId::new();
        let ranked = vec![result(document, 0, 300, 1)];

        let assembled = assemble(&ranked, 100);
        assert_eq!(assembled.citations.len(), 1);
        assert_eq!(assembled.text.chars().count(), 300);
    }

    #[test]
    fn duplicate_fragments_are_skipped() {
        let document = DocumentId::new();
        let ranked = vec![
            result(document, 0, 50, 1),
            result(document, 0, 50, 2),
            result(document, 1, 50, 3),
        ];

        let assembled = assemble(&ranked, 500);
        assert_eq!(assembled.citations.len(), 2);
        assert_eq!(
            assembled
                .citations
                .iter()
                .map(|citation| citation.ordinal)
                .collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn citations_carry_document_and_span() {
        let doc_a = DocumentId::new();
        let doc_b = DocumentId::new();
        let mut second = result(doc_b, 4, 30, 2);
        second.span = Span { start: 250, end: 280 };
        let ranked = vec![result(doc_a, 0, 40, 1), second];

        let assembled = assemble(&ranked, 500);
        assert_eq!(assembled.citations[0].document_id, doc_a);
        assert_eq!(assembled.citations[1].document_id, doc_b);
        assert_eq!(assembled.citations[1].span, Span { start: 250, end: 280 });
        assert!(assembled.text.contains(FRAGMENT_SEPARATOR));
    }
}
