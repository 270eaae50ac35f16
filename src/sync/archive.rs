//! ZIP bundles for batched transfers.
//!
//! Every bundle carries a `manifest.xml` listing entry mapping resource
//! names to millisecond timestamps and checksums. The manifest is
//! authoritative for timestamps; ZIP's own two-second DOS timestamps are
//! never trusted.

use std::io::{Cursor, Read, Write};

use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::collection::{CollectionListing, ResourceCollection, ResourceInfo};
use crate::errors::{SyncError, SyncResult};

const MANIFEST_NAME: &str = "manifest.xml";

/// Unpack a downloaded bundle into the collection. Returns the names that
/// were written.
pub fn unpack_bundle(
    mut body: impl Read,
    collection: &dyn ResourceCollection,
) -> SyncResult<Vec<String>> {
    let mut bytes = Vec::new();
    body.read_to_end(&mut bytes)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let manifest = read_manifest(&mut archive)?;
    let mut written = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || entry.name() == MANIFEST_NAME {
            continue;
        }
        let name = match entry.enclosed_name() {
            Some(p) => p.to_string_lossy().replace('\\', "/"),
            None => {
                warn!(entry = entry.name(), "skipping archive entry with unsafe name");
                continue;
            }
        };
        let mod_time = manifest.last_modified(&name);
        if mod_time <= 0 {
            debug!(name, "archive entry missing from manifest; using current time");
        }
        if !collection.write_resource(&name, mod_time, &mut entry)? {
            warn!(name, "collection refused archive entry");
        } else {
            written.push(name);
        }
    }
    Ok(written)
}

/// Build an upload bundle containing the named resources plus a manifest.
pub fn build_bundle(
    names: &[String],
    collection: &dyn ResourceCollection,
) -> SyncResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let mut manifest = CollectionListing::default();
    for name in names {
        let Some(mut data) = collection.open_resource(name)? else {
            debug!(name, "resource vanished before bundling; skipped");
            continue;
        };
        manifest.insert(
            name.clone(),
            ResourceInfo {
                last_modified: collection.last_modified(name),
                checksum: collection.checksum(name),
            },
        );
        writer.start_file(name.as_str(), options)?;
        std::io::copy(&mut data, &mut writer)?;
    }

    writer.start_file(MANIFEST_NAME, options)?;
    writer.write_all(manifest.to_xml()?.as_bytes())?;
    Ok(writer.finish()?.into_inner())
}

fn read_manifest(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> SyncResult<CollectionListing> {
    let mut entry = archive
        .by_name(MANIFEST_NAME)
        .map_err(|_| SyncError::Protocol("bundle is missing its manifest".into()))?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    CollectionListing::parse_xml(&text).map_err(SyncError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{DefaultStrategy, FileCollection};
    use std::io::Cursor;
    use std::sync::Arc;

    fn collection(dir: &std::path::Path) -> FileCollection {
        FileCollection::new(dir, Arc::new(DefaultStrategy::new()))
    }

    #[test]
    fn bundle_round_trip_preserves_manifest_timestamps() {
        let src_dir = tempfile::tempdir().unwrap();
        let src = collection(src_dir.path());
        src.write_resource("a.txt", 1_111_000, &mut Cursor::new(b"alpha"))
            .unwrap();
        src.write_resource("sub/b.txt", 2_222_000, &mut Cursor::new(b"beta"))
            .unwrap();

        let bundle =
            build_bundle(&["a.txt".into(), "sub/b.txt".into()], &src).unwrap();

        let dst_dir = tempfile::tempdir().unwrap();
        let dst = collection(dst_dir.path());
        let mut written = unpack_bundle(Cursor::new(bundle), &dst).unwrap();
        written.sort();
        assert_eq!(written, ["a.txt", "sub/b.txt"]);

        assert_eq!(dst.last_modified("a.txt"), 1_111_000);
        assert_eq!(dst.last_modified("sub/b.txt"), 2_222_000);
        assert_eq!(dst.checksum("a.txt"), src.checksum("a.txt"));
    }

    #[test]
    fn bundle_without_manifest_is_a_protocol_error() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("orphan.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"data").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let dir = tempfile::tempdir().unwrap();
        let dst = collection(dir.path());
        assert!(matches!(
            unpack_bundle(Cursor::new(bytes), &dst),
            Err(SyncError::Protocol(_))
        ));
    }

    #[test]
    fn missing_resources_are_skipped_when_bundling() {
        let dir = tempfile::tempdir().unwrap();
        let src = collection(dir.path());
        src.write_resource("real.txt", 1_000, &mut Cursor::new(b"x"))
            .unwrap();

        let bundle =
            build_bundle(&["real.txt".into(), "ghost.txt".into()], &src).unwrap();

        let dst_dir = tempfile::tempdir().unwrap();
        let dst = collection(dst_dir.path());
        let written = unpack_bundle(Cursor::new(bundle), &dst).unwrap();
        assert_eq!(written, ["real.txt"]);
    }
}
