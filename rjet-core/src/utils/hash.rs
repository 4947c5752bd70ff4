use std::io::Cursor;

use murmur3::murmur3_32;

const SEED: u32 = 0x19264330;

pub fn hash_code(v: &[u8]) -> std::io::Result<u32> {
    let mut cursor = Cursor::new(v);
    murmur3_32(&mut cursor, SEED)
}

/// Bucket of `v` among `buckets` slots. `buckets` must be positive.
pub fn bucket_of(v: &[u8], buckets: usize) -> usize {
    // reading from an in-memory cursor can't fail
    let code = hash_code(v).unwrap_or(0);
    code as usize % buckets
}
