//! Embedding vector blob encoding.
//!
//! Vectors are persisted as little-endian `f32` bytes so the store never
//! interprets them; it only hands back the bytes it was given.

/// Encode a vector as a little-endian byte blob.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vec.len() * 4);
    for value in vec {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a little-endian byte blob back into a vector.
///
/// Trailing bytes that do not form a whole `f32` are ignored; a stored
/// blob is always produced by [`vec_to_blob`] so in practice none exist.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
