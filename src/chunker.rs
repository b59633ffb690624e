//! Boundary-aware text splitting.
//!
//! Chunks are contiguous slices of the input measured in characters. Each
//! window of `max_chunk_size` characters is cut at the last paragraph break,
//! then line break, sentence end, or whitespace it contains, and only falls
//! back to a hard cut when the window has none of those. Whitespace following
//! a cut joins the chunk while it fits; only blank text at the very end of
//! the input is dropped.

use crate::document::{chunk_id, Chunk, Document, LineRange};
use crate::error::{RagError, Result};

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

const BOUNDARY_LEVELS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "]];

/// Lazily splits `text` into chunks of at most `max_chunk_size` characters.
///
/// The returned iterator is `Clone`, so a consumer can restart it from the
/// beginning without re-validating the size.
pub fn split(text: &str, max_chunk_size: usize) -> Result<Chunks<'_>> {
    Ok(Chunks {
        spans: Spans::new(text, max_chunk_size)?,
    })
}

/// Splits a document and assigns ids, ordinals and line ranges.
pub fn chunk_document(doc: &Document, max_chunk_size: usize) -> Result<Vec<Chunk>> {
    let mut lines = LineCounter::new(&doc.text);
    Spans::new(&doc.text, max_chunk_size)?
        .enumerate()
        .map(|(ordinal, (offset, text))| {
            Ok(Chunk {
                id: chunk_id(&doc.source_id, ordinal),
                source_id: doc.source_id.clone(),
                ordinal,
                text: text.to_string(),
                lines: lines.locate(offset, text),
            })
        })
        .collect()
}

/// Iterator over chunk slices produced by [`split`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    spans: Spans<'a>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.spans.next().map(|(_, text)| text)
    }
}

#[derive(Debug, Clone)]
struct Spans<'a> {
    text: &'a str,
    pos: usize,
    max_chars: usize,
}

impl<'a> Spans<'a> {
    fn new(text: &'a str, max_chars: usize) -> Result<Self> {
        if max_chars == 0 {
            return Err(RagError::config("chunk size must be positive"));
        }
        Ok(Self {
            text,
            pos: 0,
            max_chars,
        })
    }
}

impl<'a> Iterator for Spans<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        let rest = &self.text[start..];
        if rest.trim_start().is_empty() {
            self.pos = self.text.len();
            return None;
        }
        let len = match rest.char_indices().nth(self.max_chars) {
            None => rest.len(),
            Some((window_end, _)) => {
                absorb_whitespace(rest, cut_point(&rest[..window_end]), self.max_chars)
            }
        };
        self.pos += len;
        Some((start, &rest[..len]))
    }
}

/// Extends a cut over the whitespace that follows it, up to `max_chars` in total.
///
/// A blank run longer than a whole chunk still becomes a blank chunk of its own.
fn absorb_whitespace(rest: &str, cut: usize, max_chars: usize) -> usize {
    let used = rest[..cut].chars().count();
    rest[cut..]
        .char_indices()
        .take(max_chars.saturating_sub(used))
        .take_while(|(_, ch)| ch.is_whitespace())
        .last()
        .map(|(idx, ch)| cut + idx + ch.len_utf8())
        .unwrap_or(cut)
}

/// Byte length of the prefix of `window` that should form the next chunk.
///
/// A cut must keep at least one non-whitespace character in the prefix.
fn cut_point(window: &str) -> usize {
    let leading = window.len() - window.trim_start().len();
    for separators in BOUNDARY_LEVELS {
        let best = separators
            .iter()
            .filter_map(|sep| window.rfind(sep).map(|idx| idx + sep.len()))
            .filter(|cut| *cut > leading)
            .max();
        if let Some(cut) = best {
            return cut;
        }
    }
    window
        .char_indices()
        .rev()
        .find(|(_, ch)| ch.is_whitespace())
        .map(|(idx, ch)| idx + ch.len_utf8())
        .filter(|cut| *cut > leading)
        .unwrap_or(window.len())
}

struct LineCounter<'a> {
    text: &'a str,
    scanned: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            scanned: 0,
            line: 1,
        }
    }

    // Offsets arrive in increasing order, so the scan never rewinds.
    fn locate(&mut self, offset: usize, piece: &str) -> LineRange {
        let leading = piece.len() - piece.trim_start().len();
        let content_start = offset + leading;
        self.line += self.text[self.scanned..content_start].matches('\n').count();
        self.scanned = content_start;
        let from = self.line;
        LineRange {
            from,
            to: from + piece.trim().matches('\n').count(),
        }
    }
}
