/// Hash function placing keys and node replicas on a ring.
pub type HashFn = fn(&[u8]) -> u32;

/// CRC-32 (IEEE) of `data`; the default ring hash.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Reads `data` as a decimal integer and truncates it to 32 bits.
///
/// Gives rings with hand-computable layouts, which is what tests and
/// examples want. Keys that are not decimal integers fall back to
/// [`crc32`].
pub fn numeric_hash(data: &[u8]) -> u32 {
    core::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .map_or_else(|| crc32(data), |n| n as u32)
}
