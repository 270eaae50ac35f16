//! Minimal in-process bridge server for the HTTP sync tests.
//!
//! Serves one collection out of a temp directory over a raw
//! `TcpListener`, one request per connection. Every request is recorded
//! so tests can assert on what actually went over the wire, and lock
//! actions can be told to refuse with a chosen error tag.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dirbridge::collection::{
    hash, CollectionStrategy, DefaultStrategy, FileCollection, ResourceCollection,
};
use dirbridge::sync::archive::{build_bundle, unpack_bundle};

const VERSION: &str = "3.6.9";

/// One request as the stub saw it: the action plus every parameter pair,
/// repeats included.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub action: String,
    pub params: Vec<(String, String)>,
}

impl RequestRecord {
    pub fn first(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn all(&self, key: &str) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

struct StubState {
    collection: Arc<FileCollection>,
    strategy: Arc<DefaultStrategy>,
    requests: Mutex<Vec<RequestRecord>>,
    refusals: Mutex<HashMap<String, String>>,
    offline_header: Mutex<Option<String>>,
    location_tokens: Mutex<HashMap<String, String>>,
}

pub struct StubServer {
    _dir: tempfile::TempDir,
    addr: String,
    state: Arc<StubState>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StubServer {
    pub fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let strategy = Arc::new(DefaultStrategy::new());
        let collection = Arc::new(FileCollection::new(dir.path(), strategy.clone()));
        let state = Arc::new(StubState {
            collection,
            strategy,
            requests: Mutex::new(Vec::new()),
            refusals: Mutex::new(HashMap::new()),
            offline_header: Mutex::new(None),
            location_tokens: Mutex::new(HashMap::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = format!("http://{}/data", listener.local_addr().unwrap());
        let stop = Arc::new(AtomicBool::new(false));

        let loop_state = Arc::clone(&state);
        let loop_stop = Arc::clone(&stop);
        let thread = thread::spawn(move || {
            while !loop_stop.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, _)) => handle(stream, &loop_state),
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        StubServer {
            _dir: dir,
            addr,
            state,
            stop,
            thread: Some(thread),
        }
    }

    /// The collection URL clients should talk to.
    pub fn url(&self) -> &str {
        &self.addr
    }

    /// The server's copy of the collection, for seeding and asserting.
    pub fn collection(&self) -> &Arc<FileCollection> {
        &self.state.collection
    }

    pub fn seed(&self, name: &str, mod_time: i64, content: &[u8]) {
        self.collection()
            .write_resource(name, mod_time, &mut Cursor::new(content.to_vec()))
            .unwrap();
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn count_of(&self, action: &str) -> usize {
        self.requests().iter().filter(|r| r.action == action).count()
    }

    /// Make the named lock action answer 409 with the given error tag.
    pub fn refuse(&self, action: &str, tag: &str) {
        self.state
            .refusals
            .lock()
            .unwrap()
            .insert(action.to_string(), tag.to_string());
    }

    /// Value of the offline-status header sent with lock responses, or
    /// None to omit it (an older server).
    pub fn set_offline_header(&self, value: Option<&str>) {
        *self.state.offline_header.lock().unwrap() = value.map(str::to_string);
    }

    pub fn set_location_token(&self, name: &str, token: &str) {
        self.state
            .location_tokens
            .lock()
            .unwrap()
            .insert(name.to_string(), token.to_string());
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

fn handle(mut stream: TcpStream, state: &StubState) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    let response = dispatch(state, request);
    let _ = response.write_to(&mut stream);
}

struct HttpRequest {
    query: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

struct HttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpResponse {
    fn ok(body: Vec<u8>) -> Self {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    fn error(status: u16, msg: &str) -> Self {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: msg.as_bytes().to_vec(),
        }
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn write_to(&self, stream: &mut TcpStream) -> std::io::Result<()> {
        let reason = match self.status {
            200 => "OK",
            404 => "Not Found",
            409 => "Conflict",
            _ => "Error",
        };
        write!(stream, "HTTP/1.1 {} {reason}\r\n", self.status)?;
        write!(stream, "X-Bridge-Version: {VERSION}\r\n")?;
        write!(stream, "Connection: close\r\n")?;
        for (name, value) in &self.headers {
            write!(stream, "{name}: {value}\r\n")?;
        }
        write!(stream, "Content-Length: {}\r\n\r\n", self.body.len())?;
        stream.write_all(&self.body)?;
        stream.flush()
    }
}

fn read_request(stream: &mut TcpStream) -> Option<HttpRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        match find(&buf, b"\r\n\r\n") {
            Some(pos) => break pos,
            None => {
                let n = stream.read(&mut chunk).ok()?;
                if n == 0 {
                    return None;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next()?;
    let target = request_line.split_whitespace().nth(1)?;
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or("").to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let body_start = header_end + 4;
    let mut body = buf[body_start..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Some(HttpRequest {
        query,
        headers,
        body,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn decode_pairs(text: &str) -> Vec<(String, String)> {
    text.split('&')
        .filter(|piece| !piece.is_empty())
        .filter_map(|piece| {
            let (k, v) = piece.split_once('=')?;
            let decode = |s: &str| {
                urlencoding::decode(&s.replace('+', " "))
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            };
            Some((decode(k), decode(v)))
        })
        .collect()
}

/// Pull form-data parts out of a multipart body: plain text fields become
/// parameter pairs, and the payload of the part whose filename matches
/// `file_name` is returned separately.
fn parse_multipart(
    body: &[u8],
    boundary: &str,
    file_name: &str,
) -> (Vec<(String, String)>, Option<Vec<u8>>) {
    let delim = format!("--{boundary}");
    let mut params = Vec::new();
    let mut file = None;

    let mut rest = body;
    while let Some(start) = find(rest, delim.as_bytes()) {
        rest = &rest[start + delim.len()..];
        if rest.starts_with(b"--") {
            break;
        }
        let Some(head_end) = find(rest, b"\r\n\r\n") else {
            break;
        };
        let head = String::from_utf8_lossy(&rest[..head_end]).to_string();
        let content_start = head_end + 4;
        let Some(content_end) = find(&rest[content_start..], delim.as_bytes()) else {
            break;
        };
        // strip the \r\n that precedes the next boundary
        let content = &rest[content_start..content_start + content_end.saturating_sub(2)];

        if head.contains(&format!("filename=\"{file_name}\"")) {
            file = Some(content.to_vec());
        } else if let Some(name) = field_name(&head) {
            params.push((name, String::from_utf8_lossy(content).into_owned()));
        }
        rest = &rest[content_start..];
    }
    (params, file)
}

fn field_name(part_head: &str) -> Option<String> {
    let marker = "name=\"";
    let start = part_head.find(marker)? + marker.len();
    let end = part_head[start..].find('"')? + start;
    Some(part_head[start..end].to_string())
}

fn dispatch(state: &StubState, request: HttpRequest) -> HttpResponse {
    let mut params = decode_pairs(&request.query);
    let content_type = request
        .headers
        .get("content-type")
        .cloned()
        .unwrap_or_default();

    let mut upload_bundle = None;
    if content_type.starts_with("application/x-www-form-urlencoded") {
        params.extend(decode_pairs(&String::from_utf8_lossy(&request.body)));
    } else if let Some(boundary) = content_type.split("boundary=").nth(1) {
        let (form_params, bundle) = parse_multipart(&request.body, boundary, "bundle.zip");
        params.extend(form_params);
        upload_bundle = bundle;
    }

    let action = params
        .iter()
        .find(|(k, _)| k == "action")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();
    state.requests.lock().unwrap().push(RequestRecord {
        action: action.clone(),
        params: params.clone(),
    });

    let names: Vec<String> = params
        .iter()
        .filter(|(k, _)| k == "name")
        .map(|(_, v)| v.clone())
        .collect();

    match action.as_str() {
        "hashcode" => {
            let listing = listing(state);
            let digest = hash::listing_hash(&listing, state.strategy.as_ref());
            HttpResponse::ok(digest.to_string().into_bytes())
        }
        "list" => match listing(state).to_xml() {
            Ok(xml) => HttpResponse::ok(xml.into_bytes()),
            Err(e) => HttpResponse::error(500, &e.to_string()),
        },
        "download" => {
            let wanted: Vec<String> = if let Some((_, after)) =
                params.iter().find(|(k, _)| k == "after")
            {
                let after: i64 = after.parse().unwrap_or(0);
                state
                    .collection
                    .list_resource_names()
                    .into_iter()
                    .filter(|n| state.collection.last_modified(n) > after)
                    .collect()
            } else {
                names
            };
            match build_bundle(&wanted, state.collection.as_ref()) {
                Ok(bundle) => HttpResponse::ok(bundle),
                Err(e) => HttpResponse::error(500, &e.to_string()),
            }
        }
        "upload" => {
            let Some(bundle) = upload_bundle else {
                return HttpResponse::error(500, "expected a bundled upload");
            };
            match unpack_bundle(Cursor::new(bundle), state.collection.as_ref()) {
                Ok(_) => HttpResponse::ok(b"OK".to_vec()),
                Err(e) => HttpResponse::error(500, &e.to_string()),
            }
        }
        "delete" => {
            for name in &names {
                let _ = state.collection.delete_resource(name);
            }
            HttpResponse::ok(b"OK".to_vec())
        }
        "acquireLock" | "pingLock" | "assertLock" | "releaseLock" | "resumeOfflineLock"
        | "setOfflineLockEnabled" => {
            if let Some(tag) = state.refusals.lock().unwrap().get(&action) {
                return HttpResponse::error(409, "lock refused")
                    .header("X-Bridge-Lock-Error", tag);
            }
            let mut resp = HttpResponse::ok(b"OK".to_vec());
            if let Some(status) = state.offline_header.lock().unwrap().as_deref() {
                resp = resp.header("X-Bridge-Offline-Lock", status);
            }
            resp
        }
        "getLocationToken" => {
            let name = names.first().cloned().unwrap_or_default();
            match state.location_tokens.lock().unwrap().get(&name) {
                Some(token) => HttpResponse::ok(token.clone().into_bytes()),
                None => HttpResponse::error(404, "unknown location"),
            }
        }
        "sessionStatus" | "backup" | "getBackup" => HttpResponse::ok(b"OK".to_vec()),
        other => HttpResponse::error(404, &format!("unknown action {other:?}")),
    }
}

fn listing(state: &StubState) -> dirbridge::collection::CollectionListing {
    let strategy = Arc::clone(&state.strategy);
    state
        .collection
        .listing(&move |name| strategy.includes(name) && !strategy.is_default_excluded(name))
}
