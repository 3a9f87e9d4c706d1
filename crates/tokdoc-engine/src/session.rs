use std::net::SocketAddr;

use tokdoc_protocol::{
    DataMethod, FramingError, RawMessage, Request, Status, parse, pending_payload, read_message,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::access::AuthDecision;
use crate::handlers::{self, Reply, upload::drain_payload};
use crate::server::ServerState;

/// What happens after a response has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Await,
    Close,
}

/// Where a session is in handling the current message.
#[derive(Debug)]
enum Phase {
    /// Between messages; the next step frames one off the stream.
    AwaitingMessage,
    ChecksumCheck(RawMessage),
    Parsing(RawMessage),
    Authorizing(Request),
    Dispatching(Request),
    Responding(Reply, Next),
    Closed,
}

/// One client connection.
///
/// Requests are handled strictly in order; the next message is not read until
/// the previous response (and its payload) has been written.
pub struct Session<S> {
    stream: S,
    peer: SocketAddr,
    state: ServerState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: SocketAddr, state: ServerState) -> Self {
        Self {
            stream,
            peer,
            state,
        }
    }

    /// Serve requests until the client exits, disconnects, or the stream can
    /// no longer be trusted.
    pub async fn run(mut self) {
        let mut phase = Phase::AwaitingMessage;
        while !matches!(phase, Phase::Closed) {
            phase = self.step(phase).await;
        }

        let _ = self.stream.shutdown().await;
        info!("Connection from {} closed", self.peer);
    }

    async fn step(&mut self, phase: Phase) -> Phase {
        match phase {
            Phase::AwaitingMessage => {
                let max = self.state.limits.max_message_bytes;
                match read_message(&mut self.stream, max).await {
                    Ok(raw) => Phase::ChecksumCheck(raw),
                    Err(FramingError::ConnectionClosed) => Phase::Closed,
                    Err(e) => {
                        warn!("Framing error from {}: {}", self.peer, e);
                        Phase::Responding(Reply::empty(Status::InternalServerError), Next::Close)
                    }
                }
            }

            Phase::ChecksumCheck(raw) => {
                if raw.verify(None) {
                    Phase::Parsing(raw)
                } else {
                    warn!("Checksum mismatch from {}", self.peer);
                    Phase::Responding(Reply::empty(Status::MessageCorrupted), Next::Close)
                }
            }

            Phase::Parsing(raw) => match parse(&raw) {
                Ok(request) => match request.file_size() {
                    Some(size) if size > self.state.limits.max_upload_bytes => {
                        warn!(
                            "Upload of {} bytes from {} exceeds limit of {}",
                            size, self.peer, self.state.limits.max_upload_bytes
                        );
                        Phase::Responding(Reply::empty(Status::InvalidFormat), Next::Close)
                    }
                    _ => Phase::Authorizing(request),
                },
                Err(e) => {
                    warn!("Rejected message from {}: {}", self.peer, e);
                    match pending_payload(&raw) {
                        Some(size) if size > self.state.limits.max_upload_bytes => {
                            Phase::Responding(Reply::empty(Status::InvalidFormat), Next::Close)
                        }
                        Some(size) => self.reject_upload(size, Status::InvalidFormat).await,
                        None => Phase::Responding(Reply::empty(Status::InvalidFormat), Next::Await),
                    }
                }
            },

            Phase::Authorizing(request) => match self.state.access.authorize(&request) {
                AuthDecision::Allowed => Phase::Dispatching(request),
                decision => {
                    warn!(
                        "{:?} for {:?} from {}",
                        decision,
                        request.method(),
                        self.peer
                    );
                    match request.file_size() {
                        Some(size) => self.reject_upload(size, Status::AccessDenied).await,
                        None => Phase::Responding(Reply::empty(Status::AccessDenied), Next::Await),
                    }
                }
            },

            Phase::Dispatching(request) => self.dispatch(request).await,

            Phase::Responding(reply, next) => match self.respond(&reply).await {
                Ok(()) if next == Next::Await => Phase::AwaitingMessage,
                Ok(()) => Phase::Closed,
                Err(e) => {
                    warn!("Failed to write response to {}: {}", self.peer, e);
                    Phase::Closed
                }
            },

            Phase::Closed => Phase::Closed,
        }
    }

    async fn dispatch(&mut self, request: Request) -> Phase {
        debug!("{:?} from {}", request.method(), self.peer);

        let result = match &request {
            Request::Auth { email, password } => {
                handlers::auth::handle(&self.state, email, password).await
            }
            Request::Exit { .. } => return self.exit(),
            Request::Data(data) => match data.method {
                DataMethod::Exit => return self.exit(),
                DataMethod::List => handlers::list::handle(&self.state, data).await,
                DataMethod::Upload => {
                    handlers::upload::handle(&self.state, data, &mut self.stream).await
                }
                DataMethod::Download => handlers::download::handle(&self.state, data).await,
            },
        };

        match result {
            Ok(reply) => Phase::Responding(reply, Next::Await),
            Err(e) if e.is_transport() => {
                warn!("Connection from {} failed mid-request: {}", self.peer, e);
                Phase::Closed
            }
            Err(e) => {
                error!("{:?} from {} failed: {}", request.method(), self.peer, e);
                Phase::Responding(Reply::empty(e.status()), Next::Await)
            }
        }
    }

    /// Skip the payload of an upload that will not be handled, then answer
    /// `status` and wait for the next message.
    async fn reject_upload(&mut self, size: u64, status: Status) -> Phase {
        match drain_payload(&mut self.stream, size).await {
            Ok(()) => Phase::Responding(Reply::empty(status), Next::Await),
            Err(e) => {
                warn!("Lost {} while discarding upload: {}", self.peer, e);
                Phase::Closed
            }
        }
    }

    fn exit(&self) -> Phase {
        info!("{} exiting", self.peer);
        Phase::Responding(Reply::empty(Status::ExitingAuthorized), Next::Close)
    }

    /// Envelope, then payload, then flush.
    async fn respond(&mut self, reply: &Reply) -> std::io::Result<()> {
        self.stream.write_all(&reply.envelope()).await?;
        if !reply.payload.is_empty() {
            self.stream.write_all(&reply.payload).await?;
        }
        self.stream.flush().await
    }
}
