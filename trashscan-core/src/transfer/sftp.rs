//! SFTP source for pulling captures off the capture host.

use std::fmt;
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ssh2::{ErrorCode, Session, Sftp};
use tracing::debug;

use super::{EntryKind, SourceConnector, SourceEntry, SourceTree};
use crate::error::{PipelineError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on any single blocking libssh2 call once connected.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens a fresh password-authenticated SFTP session for every pass.
#[derive(Clone)]
pub struct SftpConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
    io_timeout: Duration,
}

impl SftpConnector {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            io_timeout: IO_TIMEOUT,
        }
    }

    /// A stalled remote surfaces as a connection error after `timeout`.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

impl fmt::Debug for SftpConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpConnector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

fn connection_error(context: &str, err: impl fmt::Display) -> PipelineError {
    PipelineError::Connection(format!("{context}: {err}"))
}

/// SFTP status codes concern one path; session-level codes mean the link is gone.
fn path_error(context: &str, path: &Path, err: ssh2::Error) -> PipelineError {
    match err.code() {
        ErrorCode::SFTP(_) => PipelineError::io_at(path, io::Error::from(err)),
        ErrorCode::Session(_) => connection_error(&format!("{context} {}", path.display()), err),
    }
}

impl SourceConnector for SftpConnector {
    fn connect(&self) -> Result<Box<dyn SourceTree>> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| connection_error("resolve", err))?
            .next()
            .ok_or_else(|| {
                PipelineError::Connection(format!("{} resolved to no address", self.host))
            })?;

        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|err| connection_error("connect", err))?;

        let mut session = Session::new().map_err(|err| connection_error("session", err))?;
        session.set_timeout(u32::try_from(self.io_timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|err| connection_error("handshake", err))?;
        session
            .userauth_password(&self.username, &self.password)
            .map_err(|err| connection_error("authentication", err))?;
        if !session.authenticated() {
            return Err(PipelineError::Connection(format!(
                "authentication rejected for {}",
                self.username
            )));
        }

        let sftp = session.sftp().map_err(|err| connection_error("sftp", err))?;
        debug!(host = %self.host, port = self.port, "sftp session open");
        Ok(Box::new(SftpTree {
            sftp,
            _session: session,
        }))
    }

    fn describe(&self) -> String {
        format!("sftp://{}@{}:{}", self.username, self.host, self.port)
    }
}

struct SftpTree {
    sftp: Sftp,
    _session: Session,
}

impl SourceTree for SftpTree {
    fn read_dir(&mut self, path: &Path) -> Result<Vec<SourceEntry>> {
        let listing = self
            .sftp
            .readdir(path)
            .map_err(|err| path_error("readdir", path, err))?;

        let mut entries: Vec<SourceEntry> = listing
            .into_iter()
            .filter_map(|(entry_path, stat)| {
                let name = entry_path.file_name()?.to_string_lossy().into_owned();
                if name == "." || name == ".." {
                    return None;
                }
                let kind = if stat.is_dir() {
                    EntryKind::Dir
                } else if stat.is_file() {
                    EntryKind::File
                } else {
                    EntryKind::Other
                };
                Some(SourceEntry {
                    name,
                    path: entry_path,
                    kind,
                    len: stat.size.unwrap_or(0),
                    modified: stat.mtime.map(unix_time),
                })
            })
            .collect();

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_into(&mut self, path: &Path, writer: &mut dyn Write) -> Result<u64> {
        let mut remote = self
            .sftp
            .open(path)
            .map_err(|err| path_error("open", path, err))?;
        io::copy(&mut remote, writer).map_err(|err| match err.kind() {
            io::ErrorKind::TimedOut => connection_error(&format!("read {}", path.display()), err),
            _ => PipelineError::io_at(path, err),
        })
    }
}

fn unix_time(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}
