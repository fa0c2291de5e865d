//! ALG-facing SIP listener.
//!
//! Every accepted connection runs, in order:
//! read one message, extract `Contact` and `Via`, answer with a 200 OK that
//! echoes them, then dial the address found in the `Contact` user-part and
//! greet it. Handlers share nothing and a failure only ends its own
//! connection.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{ResponderConfig, CALLBACK_GREETING};
use crate::error::{Error, Result};
use crate::framing::read_message;
use crate::message::{
    extract_callback, extract_contact, extract_via, render_response, CallbackAddress,
    ResponseContext,
};

/// Per-connection settings, shared read-only by every handler
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub max_message_size: Option<usize>,
    /// Bytes written to the callback address
    pub greeting: Bytes,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            max_message_size: None,
            greeting: Bytes::from_static(CALLBACK_GREETING),
        }
    }
}

impl From<&ResponderConfig> for HandlerSettings {
    fn from(config: &ResponderConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
            ..Default::default()
        }
    }
}

/// SIP responder bound to its listening socket
pub struct Responder {
    listener: TcpListener,
    settings: Arc<HandlerSettings>,
}

impl Responder {
    /// Bind the listening socket described by `config`.
    pub async fn bind(config: ResponderConfig) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::BindFailed(addr, e))?;

        info!("SIP responder listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            settings: Arc::new(HandlerSettings::from(&config)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::from)
    }

    /// Accept connections forever.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves. Handlers already running
    /// are left to finish on their own.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("SIP responder shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            info!("accepted connection from: {}", peer);
                            self.spawn_handler(stream, peer);
                        }
                        Err(e) => {
                            warn!("unable to accept connection: {}", e);
                        }
                    }
                }
            }
        }
    }

    fn spawn_handler(&self, stream: TcpStream, peer: SocketAddr) {
        let settings = self.settings.clone();

        tokio::spawn(
            async move {
                match handle_connection(stream, peer, &settings).await {
                    Ok(callback) => info!("greeted {} on behalf of {}", callback, peer),
                    Err(e) => warn!("connection from {} failed: {}", peer, e),
                }
            }
            .instrument(info_span!("connection", %peer)),
        );
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.listener.local_addr() {
            Ok(addr) => write!(f, "Responder({})", addr),
            Err(_) => write!(f, "Responder(<error>)"),
        }
    }
}

/// Run one connection through read, extract, respond and call back.
///
/// The 200 OK goes out in a single write: an ALG that sees the response split
/// across segments does not rewrite it. The stream is dropped, and therefore
/// closed, on every return path.
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    settings: &HandlerSettings,
) -> Result<CallbackAddress>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);

    let data = read_message(&mut stream, settings.max_message_size).await?;
    debug!(
        "received {} bytes from {}:\n{}",
        data.len(),
        peer,
        String::from_utf8_lossy(&data)
    );

    let contact = extract_contact(&data)?;
    let via = extract_via(&data)?;

    let response = render_response(&ResponseContext {
        via,
        contact: contact.clone(),
    })?;

    stream
        .write_all(&response)
        .await
        .map_err(|e| Error::SendFailed(peer.to_string(), e))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::SendFailed(peer.to_string(), e))?;
    debug!("sent {} byte response to {}", response.len(), peer);

    let callback = extract_callback(contact.as_bytes())?;
    info!("connecting back to: {}", callback);
    call_back(&callback, &settings.greeting).await?;

    Ok(callback)
}

/// Open a fresh connection to `callback` and write `payload` once.
pub async fn call_back(callback: &CallbackAddress, payload: &[u8]) -> Result<()> {
    let mut conn = TcpStream::connect(callback.as_str())
        .await
        .map_err(|e| Error::ConnectFailed(callback.to_string(), e))?;

    conn.write_all(payload)
        .await
        .map_err(|e| Error::SendFailed(callback.to_string(), e))?;

    if let Err(e) = conn.shutdown().await {
        debug!("shutdown of callback connection to {} failed: {}", callback, e);
    }

    Ok(())
}
