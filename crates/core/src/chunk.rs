//! Fixed-size overlapping window chunker for documentation text.

/// Split text into overlapping windows of `chunk_size` code units.
///
/// Windows are measured in `char` code units so that later lexical
/// operations address the same units. Adjacent windows share `overlap`
/// code units; the window start advances by `chunk_size - overlap` each
/// step, so for `L > overlap` the number of windows is
/// `ceil((L - overlap) / (chunk_size - overlap))`. Text no longer than
/// `chunk_size` yields a single window; empty input yields none. The
/// final window is shorter when the text does not divide evenly.
///
/// Concatenating the windows in order while dropping the first `overlap`
/// code units of every window after the first reproduces the input.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    // A degenerate overlap would stall the window; always advance.
    let step = chunk_size.saturating_sub(overlap).max(1);

    // Byte offset of every char boundary, plus the end of the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(total_chars);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        if end == total_chars {
            break;
        }
        start += step;
    }
    chunks
}
