//! Probing candidate bridge servers.
//!
//! Several URLs may name the same logical server (an intranet name, a VPN
//! address, a public one). Each candidate gets a short session-inquiry
//! request; responders below the minimum protocol version are ruled out,
//! and the fastest remaining responder wins.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::sync::protocol::{
    version_at_least, ACTION_PARAM, SERVER_VERSION_HEADER, SESSION_INQUIRY_ACTION,
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A successful probe of one candidate URL.
#[derive(Debug, Clone)]
pub struct ServerProbe {
    pub url: String,
    pub version: String,
    pub rtt: Duration,
}

pub struct ServerSelector {
    http: Client,
    min_version: String,
}

impl ServerSelector {
    pub fn new(min_version: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        ServerSelector {
            http,
            min_version: min_version.into(),
        }
    }

    /// Whether a location string names a server rather than a filesystem
    /// path.
    pub fn is_url_format(location: &str) -> bool {
        location.starts_with("http://") || location.starts_with("https://")
    }

    /// Derive the collection URL a server hosts for a given id.
    pub fn collection_url(base_url: &str, collection_id: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            urlencoding::encode(collection_id)
        )
    }

    /// Probe one candidate. `None` when it is unreachable, answers badly,
    /// or runs a version below the minimum.
    pub fn probe(&self, url: &str) -> Option<ServerProbe> {
        let started = Instant::now();
        let resp = self
            .http
            .get(url)
            .query(&[(ACTION_PARAM, SESSION_INQUIRY_ACTION)])
            .send()
            .ok()?;
        let rtt = started.elapsed();

        if !resp.status().is_success() {
            debug!(url, status = %resp.status(), "probe rejected");
            return None;
        }
        let version = resp
            .headers()
            .get(SERVER_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())?
            .to_string();
        if !version_at_least(&version, &self.min_version) {
            debug!(url, version, minimum = %self.min_version, "server too old");
            return None;
        }
        Some(ServerProbe { url: url.to_string(), version, rtt })
    }

    /// Probe every candidate in parallel and pick the fastest acceptable
    /// responder.
    pub fn select(&self, candidates: &[String]) -> Option<ServerProbe> {
        let best = candidates
            .par_iter()
            .filter(|url| Self::is_url_format(url))
            .filter_map(|url| self.probe(url))
            .min_by_key(|probe| probe.rtt);
        match &best {
            Some(p) => info!(url = %p.url, version = %p.version, rtt_ms = p.rtt.as_millis() as u64,
                             "selected server"),
            None => debug!(count = candidates.len(), "no candidate server responded"),
        }
        best
    }
}
