//! Lock file metadata and the same-host message handshake.
//!
//! The metadata block starts with a newline so the file's first byte stays
//! clear of the advisory lock region on platforms where locked ranges block
//! reads. A contender reads the block, connects to the loopback port it
//! names, and proves it read the current block by echoing the token; the
//! owner proves it is the real owner by echoing the token back with its
//! reply.

use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::errors::LockError;

/// How long a contender waits for the lock owner to answer.
pub(crate) const MESSAGE_TIMEOUT: Duration = Duration::from_millis(4_000);

/// Contact details a lock owner records inside the locked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockMetadata {
    pub host: String,
    pub port: u16,
    pub token: String,
    pub owner: String,
}

impl LockMetadata {
    /// Read and parse the metadata block from an open lock file.
    pub(crate) fn read(file: &mut std::fs::File) -> io::Result<Option<Self>> {
        file.seek(SeekFrom::Start(0))?;
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        Ok(Self::parse(&text))
    }

    pub(crate) fn parse(text: &str) -> Option<Self> {
        let mut lines = text.split('\n');
        let first = lines.next()?;
        if !first.is_empty() {
            return None;
        }
        let host = lines.next()?.to_string();
        let port: u16 = lines.next()?.trim().parse().ok()?;
        let token = lines.next()?.to_string();
        let owner = lines.next().unwrap_or("").to_string();
        if host.is_empty() || token.is_empty() {
            return None;
        }
        Some(LockMetadata {
            host,
            port,
            token,
            owner,
        })
    }

    pub(crate) fn write(&self, file: &mut std::fs::File) -> io::Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        write!(
            file,
            "\n{}\n{}\n{}\n{}\n",
            self.host, self.port, self.token, self.owner
        )?;
        file.sync_all()
    }

    /// Whether this metadata names the machine we are running on. The
    /// owner's listener binds loopback only, so a different host cannot be
    /// contacted.
    pub(crate) fn is_same_host(&self) -> bool {
        self.host.eq_ignore_ascii_case(&current_host())
    }

    pub(crate) fn owner_or_none(&self) -> Option<String> {
        if self.owner.is_empty() {
            None
        } else {
            Some(self.owner.clone())
        }
    }
}

/// Deliver `message` to the lock owner named by `meta` and wait for a
/// token-verified reply.
pub(crate) fn send_lock_message(meta: &LockMetadata, message: &str) -> Result<String, LockError> {
    let contact = || -> io::Result<String> {
        let stream = TcpStream::connect(("127.0.0.1", meta.port))?;
        stream.set_read_timeout(Some(MESSAGE_TIMEOUT))?;
        stream.set_write_timeout(Some(MESSAGE_TIMEOUT))?;

        let mut writer = stream.try_clone()?;
        writeln!(writer, "{}", meta.token)?;
        writeln!(writer, "{message}")?;
        writer.flush()?;

        let mut reader = BufReader::new(stream);
        let mut reply_token = String::new();
        reader.read_line(&mut reply_token)?;
        let mut reply = String::new();
        reader.read_line(&mut reply)?;
        if reply_token.trim_end() != meta.token {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "reply token mismatch",
            ));
        }
        Ok(reply.trim_end().to_string())
    };

    contact().map_err(|e| {
        debug!(port = meta.port, error = %e, "could not reach lock owner");
        LockError::AlreadyLocked {
            owner: meta.owner_or_none(),
        }
    })
}

/// Answer one inbound contender connection on the owner side.
pub(crate) fn answer_contender(
    stream: TcpStream,
    token: &str,
    handler: &dyn super::LockMessageHandler,
) -> io::Result<()> {
    stream.set_read_timeout(Some(MESSAGE_TIMEOUT))?;
    stream.set_write_timeout(Some(MESSAGE_TIMEOUT))?;

    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut sent_token = String::new();
    reader.read_line(&mut sent_token)?;
    if sent_token.trim_end() != token {
        debug!("ignoring contender with stale token");
        return Ok(());
    }
    let mut message = String::new();
    reader.read_line(&mut message)?;
    let reply = handler.dispatch(message.trim_end());
    writeln!(writer, "{token}")?;
    writeln!(writer, "{reply}")?;
    writer.flush()
}

/// Name of the machine we are running on.
pub fn current_host() -> String {
    #[cfg(unix)]
    {
        let mut buf = [0u8; 256];
        let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
        if rc == 0 {
            let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
            if let Ok(name) = std::str::from_utf8(&buf[..end]) {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
        "localhost".to_string()
    }
    #[cfg(windows)]
    {
        std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
    }
}

/// Read lock metadata from a path without taking any lock, for contenders
/// and for holder-side validity checks.
pub(crate) fn read_metadata(path: &Path) -> io::Result<Option<LockMetadata>> {
    match std::fs::File::open(path) {
        Ok(mut file) => LockMetadata::read(&mut file),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
