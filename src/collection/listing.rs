//! Collection listings: the name -> (timestamp, checksum) snapshot exchanged
//! with the server and diffed against the local directory.
//!
//! The wire form is a small XML document; the same document doubles as the
//! manifest entry inside a download archive, so entry timestamps inside the
//! archive never need to be trusted.

use std::collections::btree_map::{self, BTreeMap};
use std::io;

use serde::{Deserialize, Serialize};

/// Metadata for one resource. A `last_modified` of 0 means the resource
/// does not exist; checksum None means unknown/unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceInfo {
    pub last_modified: i64,
    pub checksum: Option<u64>,
}

/// An order-irrelevant mapping from resource name to its metadata.
/// A name absent from the listing means the resource does not exist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionListing {
    entries: BTreeMap<String, ResourceInfo>,
}

impl CollectionListing {
    pub fn insert(&mut self, name: String, info: ResourceInfo) {
        self.entries.insert(name, info);
    }

    pub fn get(&self, name: &str) -> Option<&ResourceInfo> {
        self.entries.get(name)
    }

    /// Last-modified time for a name; 0 when the name is absent.
    pub fn last_modified(&self, name: &str) -> i64 {
        self.entries.get(name).map_or(0, |i| i.last_modified)
    }

    pub fn checksum(&self, name: &str) -> Option<u64> {
        self.entries.get(name).and_then(|i| i.checksum)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ResourceInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The single most recent modification time in the listing, or 0.
    pub fn most_recent_mod_time(&self) -> i64 {
        self.entries.values().map(|i| i.last_modified).max().unwrap_or(0)
    }

    /// Serialize to the XML wire form.
    pub fn to_xml(&self) -> io::Result<String> {
        let doc = ListingDoc {
            resources: self
                .entries
                .iter()
                .map(|(name, info)| EntryXml {
                    name: name.clone(),
                    last_mod: info.last_modified,
                    checksum: info.checksum,
                })
                .collect(),
        };
        quick_xml::se::to_string(&doc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Parse the XML wire form.
    pub fn parse_xml(text: &str) -> io::Result<Self> {
        let doc: ListingDoc = quick_xml::de::from_str(text)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut out = CollectionListing::default();
        for e in doc.resources {
            out.insert(
                e.name,
                ResourceInfo {
                    last_modified: e.last_mod,
                    checksum: e.checksum,
                },
            );
        }
        Ok(out)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "resources")]
struct ListingDoc {
    #[serde(rename = "resource", default)]
    resources: Vec<EntryXml>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@lastMod")]
    last_mod: i64,
    #[serde(rename = "@checksum", skip_serializing_if = "Option::is_none", default)]
    checksum: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CollectionListing {
        let mut l = CollectionListing::default();
        l.insert(
            "a.txt".into(),
            ResourceInfo {
                last_modified: 100,
                checksum: Some(42),
            },
        );
        l.insert(
            "sub/b.txt".into(),
            ResourceInfo {
                last_modified: 50,
                checksum: None,
            },
        );
        l
    }

    #[test]
    fn absent_name_means_nonexistent() {
        let l = sample();
        assert_eq!(l.last_modified("missing"), 0);
        assert_eq!(l.checksum("missing"), None);
    }

    #[test]
    fn xml_round_trip() {
        let l = sample();
        let xml = l.to_xml().unwrap();
        let back = CollectionListing::parse_xml(&xml).unwrap();
        assert_eq!(l, back);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(CollectionListing::parse_xml("not xml at all <<<").is_err());
    }

    #[test]
    fn most_recent_mod_time() {
        assert_eq!(sample().most_recent_mod_time(), 100);
        assert_eq!(CollectionListing::default().most_recent_mod_time(), 0);
    }
}
