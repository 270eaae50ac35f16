//! Content checksums and the combined listing hash used for cheap
//! "anything changed?" round trips.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use super::listing::CollectionListing;
use super::strategy::CollectionStrategy;

/// Checksum a file's contents. Streams the file so large resources do
/// not need to fit in memory.
pub fn resource_checksum(path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(digest_to_u64(hasher.finalize()))
}

/// Checksum an in-memory byte slice. Used for data that never touches disk.
pub fn bytes_checksum(data: &[u8]) -> u64 {
    digest_to_u64(blake3::hash(data))
}

fn digest_to_u64(digest: blake3::Hash) -> u64 {
    let bytes = digest.as_bytes();
    u64::from_le_bytes(bytes[..8].try_into().unwrap())
}

/// Combined hash over every (name, checksum) pair in a listing, after
/// removing names the strategy excludes by default. The fold is a wrapping
/// sum so the result does not depend on iteration order.
pub fn listing_hash(listing: &CollectionListing, strategy: &dyn CollectionStrategy) -> u64 {
    let mut acc: u64 = 0;
    for (name, info) in listing.iter() {
        if strategy.is_default_excluded(name) {
            continue;
        }
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&info.checksum.unwrap_or(0).to_le_bytes());
        acc = acc.wrapping_add(digest_to_u64(hasher.finalize()));
    }
    acc
}
