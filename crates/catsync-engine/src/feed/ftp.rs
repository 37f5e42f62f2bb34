//! FTP feed retrieval through `suppaftp`.
//!
//! The client is blocking, so each transfer runs on tokio's blocking pool.
//! Passive mode uses the NAT workaround: the data connection goes to the
//! control host, since servers behind NAT advertise private addresses.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::FtpStream;
use thiserror::Error;

pub const DEFAULT_FTP_PORT: u16 = 21;

#[derive(Debug, Error)]
pub enum FtpError {
    #[error("cannot resolve FTP host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("FTP host {0} resolved to no addresses")]
    NoAddress(String),

    #[error("FTP {step} failed: {source}")]
    Protocol {
        step: &'static str,
        #[source]
        source: suppaftp::FtpError,
    },

    #[error("FTP socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FTP transfer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct FtpLogin {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl FtpLogin {
    /// Explicit credentials, or the conventional anonymous login.
    fn credentials(&self) -> (&str, &str) {
        match self.user.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => (user, self.password.as_deref().unwrap_or("")),
            None => ("anonymous", "anonymous@"),
        }
    }

    fn address(&self) -> Result<SocketAddr, FtpError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| FtpError::Resolve {
                host: self.host.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| FtpError::NoAddress(self.host.clone()))
    }
}

fn step(step: &'static str) -> impl FnOnce(suppaftp::FtpError) -> FtpError {
    move |source| FtpError::Protocol { step, source }
}

fn retrieve_blocking(login: &FtpLogin, path: &str, timeout: Duration) -> Result<Vec<u8>, FtpError> {
    let mut ftp = FtpStream::connect_timeout(login.address()?, timeout).map_err(step("connect"))?;
    ftp.get_ref().set_read_timeout(Some(timeout))?;
    ftp.set_passive_nat_workaround(true);

    let (user, password) = login.credentials();
    ftp.login(user, password).map_err(step("login"))?;
    ftp.transfer_type(FileType::Binary).map_err(step("TYPE I"))?;
    let bytes = ftp.retr_as_buffer(path).map_err(step("RETR"))?.into_inner();

    if let Err(e) = ftp.quit() {
        tracing::debug!(host = %login.host, error = %e, "FTP QUIT failed after transfer");
    }
    Ok(bytes)
}

/// Downloads `path` and returns its bytes.
///
/// # Errors
///
/// Returns [`FtpError`] if the host cannot be reached, the login or transfer
/// is refused, or the blocking task panics.
pub async fn retrieve(login: FtpLogin, path: String, timeout: Duration) -> Result<Vec<u8>, FtpError> {
    tokio::task::spawn_blocking(move || retrieve_blocking(&login, &path, timeout)).await?
}
