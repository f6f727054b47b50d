//! BLAKE3 hashing helpers shared across the crypto surface.

/// Hash arbitrary bytes to a 32-byte digest.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash a sequence of byte slices as if they were concatenated, without an
/// intermediate allocation.
pub fn blake3_hash_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}
