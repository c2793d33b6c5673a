//! One TCP connection to the server and the request path over it

use super::correlation::CorrelationTable;
use crate::error::{Error, Result};
use crate::protocol::{CommandKind, Message, MessageKey, SessionContext, SmbCommand};
use crate::transport::{self, FrameReader, FrameWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

type Reply = oneshot::Receiver<Result<Message>>;

struct Shared {
    table: Mutex<CorrelationTable>,
    session: Mutex<SessionContext>,
    writer: Mutex<Option<FrameWriter>>,
    closed: AtomicBool,
    reader: std::sync::Mutex<Option<AbortHandle>>,
    request_timeout: Duration,
}

impl Shared {
    /// Stop accepting requests and resolve everything still pending
    async fn shut_down(&self, reason: &Error) -> Option<FrameWriter> {
        self.closed.store(true, Ordering::SeqCst);
        let writer = self.writer.lock().await.take();
        self.table.lock().await.fail_all(reason);
        writer
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
    }
}

/// Cloneable handle to a live connection.
///
/// A background task owns the read half of the socket and feeds every
/// decoded response into the correlation table. The task stops when the
/// last handle is dropped.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Dial `host:port` and start the reader task
    pub async fn open(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        request_timeout: Duration,
        unc_path: String,
    ) -> Result<Self> {
        let stream = transport::connect(host, port, connect_timeout).await?;
        Ok(Self::from_stream(stream, request_timeout, unc_path))
    }

    pub fn from_stream(stream: TcpStream, request_timeout: Duration, unc_path: String) -> Self {
        let (reader, writer) = transport::split(stream);
        let shared = Arc::new(Shared {
            table: Mutex::new(CorrelationTable::new()),
            session: Mutex::new(SessionContext::new(unc_path)),
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
            reader: std::sync::Mutex::new(None),
            request_timeout,
        });

        let task = tokio::spawn(read_loop(reader, Arc::downgrade(&shared)));
        if let Ok(mut slot) = shared.reader.lock() {
            *slot = Some(task.abort_handle());
        }

        Self { shared }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of the negotiated session state
    pub async fn session(&self) -> SessionContext {
        self.shared.session.lock().await.clone()
    }

    /// Issue one command and wait for its correlated response
    pub async fn request<C: SmbCommand>(&self, command: &C) -> Result<C::Output> {
        let (key, rx) = self.dispatch(command).await?;
        let response = self.wait(C::KIND, key, rx).await?;
        let mut ctx = self.shared.session.lock().await;
        command.parse(&mut ctx, response)
    }

    /// Put `command` on the wire now and wait for its reply later.
    ///
    /// Requests sent through successive calls from one task reach the socket
    /// in call order with increasing message ids.
    pub async fn send_request<C: SmbCommand>(&self, command: C) -> Result<PendingResponse<C>> {
        let (key, rx) = self.dispatch(&command).await?;
        Ok(PendingResponse {
            connection: self.clone(),
            command,
            key,
            rx,
        })
    }

    /// Assign a message id, register the waiter and write the frame
    async fn dispatch<C: SmbCommand>(&self, command: &C) -> Result<(MessageKey, Reply)> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let message = {
            let mut ctx = self.shared.session.lock().await;
            command.generate(&mut ctx)?
        };
        let key = message.key();

        let (tx, rx) = oneshot::channel();
        self.shared.table.lock().await.await_response(key, tx);

        trace!("{} request {}", C::KIND, key);
        if let Err(e) = self.send(&message).await {
            self.shared.table.lock().await.evict(key);
            return Err(e);
        }
        Ok((key, rx))
    }

    async fn wait(&self, kind: CommandKind, key: MessageKey, rx: Reply) -> Result<Message> {
        let timeout = self.shared.request_timeout;
        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(_)) => return Err(Error::ConnectionClosed),
            Err(_) => {
                self.shared.table.lock().await.expire(key);
                warn!("{} request {} timed out after {:?}", kind, key, timeout);
                return Err(Error::Timeout(timeout));
            }
        };
        trace!("{} response {}: {}", kind, key, response.status());
        Ok(response)
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => writer.send(message).await,
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Close the socket and fail every request still waiting
    pub async fn close(&self) -> Result<()> {
        if let Ok(mut reader) = self.shared.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
        match self.shared.shut_down(&Error::ConnectionClosed).await {
            Some(mut writer) => {
                debug!("Closing connection");
                writer.shutdown().await
            }
            None => Ok(()),
        }
    }
}

/// A request already on the wire whose reply has not been awaited yet
pub struct PendingResponse<C: SmbCommand> {
    connection: Connection,
    command: C,
    key: MessageKey,
    rx: Reply,
}

impl<C: SmbCommand> PendingResponse<C> {
    pub fn key(&self) -> MessageKey {
        self.key
    }

    /// Wait for the reply, bounded by the request timeout, and parse it
    pub async fn response(self) -> Result<C::Output> {
        let response = self.connection.wait(C::KIND, self.key, self.rx).await?;
        let mut ctx = self.connection.shared.session.lock().await;
        self.command.parse(&mut ctx, response)
    }
}

async fn read_loop(mut reader: FrameReader, shared: Weak<Shared>) {
    let reason = loop {
        let messages = match reader.read_messages().await {
            Ok(messages) => messages,
            Err(e) => break e,
        };
        let Some(strong) = shared.upgrade() else {
            return;
        };

        let mut table = strong.table.lock().await;
        for message in messages {
            let header = message.header();
            if !header.is_response() {
                debug!("Ignoring {:?} request from server", header.command);
                continue;
            }
            if header.is_interim() {
                trace!("Interim response for {}", header.key());
                continue;
            }
            table.deliver(message);
        }
    };

    match &reason {
        Error::ConnectionClosed => debug!("Server closed the connection"),
        other => warn!("Connection failed: {}", other),
    }
    if let Some(strong) = shared.upgrade() {
        strong.shut_down(&reason).await;
    }
}
