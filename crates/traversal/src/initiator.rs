//! Client behind the NAT.
//!
//! The callback listener is bound first, then the REGISTER goes out. The
//! REGISTER advertises the listener's port in its `Contact`, and the
//! responder's connect-back lands on that listener once the ALG has done its
//! rewrite.

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::InitiatorConfig;
use crate::error::{Error, Result};
use crate::message::{render_request, RequestContext};

/// What arrived on the callback listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackReceipt {
    /// Address the connect-back came from
    pub peer: SocketAddr,
    /// First line received, trailing LFs removed. Bytes that are not UTF-8
    /// are replaced.
    pub line: String,
}

/// Initiator with its callback listener already bound
pub struct Initiator {
    config: InitiatorConfig,
    listener: TcpListener,
    advertised_port: String,
}

impl Initiator {
    /// Bind the callback listener. Nothing is sent yet.
    ///
    /// A `local_port` of `"0"` binds an ephemeral port, which is then the port
    /// advertised in the REGISTER.
    pub async fn arm(config: InitiatorConfig) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::BindFailed(addr, e))?;

        let bound = listener.local_addr()?;
        info!("listening on port: {}", bound.port());

        let advertised_port = match config.local_port.parse::<u16>() {
            Ok(0) => bound.port().to_string(),
            _ => config.local_port.clone(),
        };

        Ok(Self {
            config,
            listener,
            advertised_port,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::from)
    }

    /// Fields rendered into the REGISTER
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(
            self.config.local_ip.clone(),
            self.advertised_port.clone(),
            self.config.remote_port.clone(),
        )
    }

    /// Send the REGISTER and wait for the connect-back.
    ///
    /// The listener runs as its own task. If sending fails the error is
    /// returned at once and that task is left running.
    pub async fn run(self) -> Result<CallbackReceipt> {
        let ctx = self.request_context();
        let target = self.config.target();

        let listener = tokio::spawn(
            accept_callback(self.listener).instrument(info_span!("callback_listener")),
        );

        // Held open until the callback arrives so the 200 OK can cross the ALG.
        let _registration = send_request(&target, &ctx)
            .instrument(info_span!("register", %target))
            .await?;

        listener
            .await
            .map_err(|e| Error::TaskFailed(e.to_string()))?
    }
}

impl fmt::Debug for Initiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Initiator")
            .field("config", &self.config)
            .field("advertised_port", &self.advertised_port)
            .finish()
    }
}

/// Accept exactly one connection and read one line from it.
///
/// A read failure is logged and yields whatever was read so far.
async fn accept_callback(listener: TcpListener) -> Result<CallbackReceipt> {
    let (stream, peer) = listener.accept().await.map_err(Error::AcceptFailed)?;
    info!("accepted connection from: {}", peer);

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    if let Err(e) = reader.read_until(b'\n', &mut buf).await {
        warn!("unable to read from connection: {}", e);
    }

    let line = String::from_utf8_lossy(&buf)
        .trim_end_matches('\n')
        .to_string();
    info!("received message from remote server: `{}`", line);

    Ok(CallbackReceipt { peer, line })
}

/// Dial `target` and deliver the REGISTER. Returns the open connection.
pub async fn send_request(target: &str, ctx: &RequestContext) -> Result<TcpStream> {
    let mut conn = TcpStream::connect(target)
        .await
        .map_err(|e| Error::ConnectFailed(target.to_string(), e))?;

    send_register(&mut conn, ctx, target).await?;
    Ok(conn)
}

/// Render the REGISTER and hand it to `writer` in one write.
pub async fn send_register<W>(writer: &mut W, ctx: &RequestContext, peer: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let request = render_request(ctx)?;

    writer
        .write_all(&request)
        .await
        .map_err(|e| Error::SendFailed(peer.to_string(), e))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::SendFailed(peer.to_string(), e))?;

    debug!("sent {} byte REGISTER to {}", request.len(), peer);
    Ok(())
}
