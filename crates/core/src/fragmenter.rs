use crate::error::IngestError;
use crate::models::{Document, Fragment, FragmentId, Span};

/// Splitting operates on characters, not bytes or tokens. Budgets, offsets,
/// and overlaps all count `char`s, so multi-byte text never splits inside a
/// code point and a character budget maps directly onto fragment counts.
#[derive(Debug, Clone, Copy)]
pub struct FragmenterConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    /// How far back from the hard cutoff to look for a paragraph or
    /// sentence boundary before giving up and cutting mid-text.
    pub boundary_window: usize,
}

pub const DEFAULT_MAX_CHARS: usize = 1_000;
pub const DEFAULT_OVERLAP_CHARS: usize = 100;
pub const DEFAULT_BOUNDARY_WINDOW: usize = 200;

impl Default for FragmenterConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
            boundary_window: DEFAULT_BOUNDARY_WINDOW,
        }
    }
}

impl FragmenterConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidFragmentConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars == 0 {
            return Err(IngestError::InvalidFragmentConfig(
                "overlap_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidFragmentConfig(format!(
                "overlap_chars {} must be smaller than max_chars {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Splits `text` into overlapping pieces of at most `max_chars` characters.
///
/// Each piece after the first starts `overlap_chars` before the previous
/// piece's end, so stripping the overlap and concatenating in order
/// reconstructs the input exactly. Empty text yields zero pieces.
pub fn fragment_text(
    text: &str,
    config: FragmenterConfig,
) -> Result<Vec<(Span, String)>, IngestError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let hard_end = (start + config.max_chars).min(chars.len());
        let end = if hard_end < chars.len() {
            pick_boundary(&chars, start, hard_end, config.boundary_window).unwrap_or(hard_end)
        } else {
            hard_end
        };

        pieces.push((
            Span { start, end },
            chars[start..end].iter().collect::<String>(),
        ));

        if end == chars.len() {
            break;
        }

        // Step back by the overlap unless that would stall the cursor.
        start = if end > config.overlap_chars && end - config.overlap_chars > start {
            end - config.overlap_chars
        } else {
            end
        };
    }

    Ok(pieces)
}

/// Fragments a document and assigns ordinals in document order.
pub fn fragment_document(
    document: &Document,
    config: FragmenterConfig,
) -> Result<Vec<Fragment>, IngestError> {
    let pieces = fragment_text(&document.text, config)?;

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(ordinal, (span, text))| Fragment {
            id: FragmentId {
                document: document.id,
                ordinal: ordinal as u32,
            },
            span,
            text,
        })
        .collect())
}

/// Best cut position in `(start, hard_end]` within the backtrack window:
/// the nearest paragraph break if any, else the nearest sentence end.
fn pick_boundary(chars: &[char], start: usize, hard_end: usize, window: usize) -> Option<usize> {
    let floor = start.max(hard_end.saturating_sub(window));
    let mut sentence = None;

    for cut in (floor + 1..=hard_end).rev() {
        if is_paragraph_break(chars, cut) {
            return Some(cut);
        }
        if sentence.is_none() && is_sentence_end(chars, cut) {
            sentence = Some(cut);
        }
    }

    sentence
}

fn is_paragraph_break(chars: &[char], cut: usize) -> bool {
    cut >= 2 && chars[cut - 1] == '\n' && chars[cut - 2] == '\n'
}

fn is_sentence_end(chars: &[char], cut: usize) -> bool {
    matches!(chars[cut - 1], '.' | '?' | '!')
        && (cut == chars.len() || matches!(chars[cut], ' ' | '\n'))
}
