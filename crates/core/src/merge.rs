use crate::models::{Chunk, MergedChunk};

pub const DEFAULT_MIN_CHARS: usize = 500;

/// Coalesces consecutive chunks until the buffer reaches `min_chars` characters.
///
/// A chunk's page is its lowest page number. The buffer is flushed before a chunk
/// whose page differs from the previous chunk's, so merged chunks never straddle a
/// page boundary at their start.
pub fn merge_chunks_by_size(chunks: &[Chunk], min_chars: usize) -> Vec<MergedChunk> {
    let mut merged = Vec::new();
    let mut buffer = MergedChunk::default();
    let mut buffer_chars = 0usize;
    let mut current_page: Option<Option<u32>> = None;

    for chunk in chunks {
        let page = chunk.first_page();

        if let Some(previous) = current_page {
            if previous != page || buffer_chars >= min_chars {
                merged.push(std::mem::take(&mut buffer));
            }
        }
        current_page = Some(page);

        buffer.absorb(chunk);
        buffer_chars = buffer.text.chars().count();
    }

    if !buffer.text.is_empty() {
        merged.push(buffer);
    }

    merged
}
