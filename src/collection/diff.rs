//! Three-way classification of two collection listings.

use super::listing::CollectionListing;

/// The outcome of comparing a local listing against a remote one.
///
/// A name lands in `differing` when its checksum differs, or when
/// checksums are unavailable and the timestamps differ.
#[derive(Debug, Default)]
pub struct CollectionDiff {
    local: CollectionListing,
    remote: CollectionListing,
    only_in_local: Vec<String>,
    only_in_remote: Vec<String>,
    differing: Vec<String>,
}

impl CollectionDiff {
    pub fn compute(local: CollectionListing, remote: CollectionListing) -> Self {
        let mut only_in_local = Vec::new();
        let mut only_in_remote = Vec::new();
        let mut differing = Vec::new();

        for (name, li) in local.iter() {
            match remote.get(name) {
                None => only_in_local.push(name.clone()),
                Some(ri) => {
                    let changed = match (li.checksum, ri.checksum) {
                        (Some(a), Some(b)) => a != b,
                        _ => li.last_modified != ri.last_modified,
                    };
                    if changed {
                        differing.push(name.clone());
                    }
                }
            }
        }
        for (name, _) in remote.iter() {
            if local.get(name).is_none() {
                only_in_remote.push(name.clone());
            }
        }

        CollectionDiff {
            local,
            remote,
            only_in_local,
            only_in_remote,
            differing,
        }
    }

    pub fn local(&self) -> &CollectionListing {
        &self.local
    }

    pub fn remote(&self) -> &CollectionListing {
        &self.remote
    }

    pub fn only_in_local(&self) -> &[String] {
        &self.only_in_local
    }

    pub fn only_in_remote(&self) -> &[String] {
        &self.only_in_remote
    }

    pub fn differing(&self) -> &[String] {
        &self.differing
    }

    pub fn is_empty(&self) -> bool {
        self.only_in_local.is_empty() && self.only_in_remote.is_empty() && self.differing.is_empty()
    }

    /// Drop names the filter rejects from every bucket.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.only_in_local.retain(|n| keep(n));
        self.only_in_remote.retain(|n| keep(n));
        self.differing.retain(|n| keep(n));
    }
}
