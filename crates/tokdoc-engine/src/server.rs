use std::sync::Arc;

use tokdoc_protocol::constants::DEFAULT_MAX_BODY;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::access::AccessController;
use crate::records::RecordStore;
use crate::session::Session;
use crate::storage::FileStore;

/// Socket buffer size for file transfers (1 MB).
const SOCKET_BUF_SIZE: usize = 1024 * 1024;

/// Size caps applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Largest envelope body accepted.
    pub max_message_bytes: usize,
    /// Largest UPLOAD payload accepted.
    pub max_upload_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_BODY,
            max_upload_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}

/// Everything sessions share.
#[derive(Clone)]
pub struct ServerState {
    pub access: Arc<AccessController>,
    pub records: Arc<dyn RecordStore>,
    pub files: Arc<FileStore>,
    pub limits: Limits,
}

impl ServerState {
    pub fn new(
        access: AccessController,
        records: Arc<dyn RecordStore>,
        files: FileStore,
        limits: Limits,
    ) -> Self {
        Self {
            access: Arc::new(access),
            records,
            files: Arc::new(files),
            limits,
        }
    }
}

/// Accept connections forever, one session task each. Runs until the task
/// is cancelled.
pub async fn serve(listener: TcpListener, state: ServerState) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                if let Err(e) = tune_socket(&stream) {
                    warn!("Failed to set socket options for {}: {}", addr, e);
                }
                let state = state.clone();
                tokio::spawn(async move {
                    Session::new(stream, addr, state).run().await;
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}

fn tune_socket(stream: &TcpStream) -> std::io::Result<()> {
    let sock_ref = socket2::SockRef::from(stream);
    sock_ref.set_nodelay(true)?;
    sock_ref.set_send_buffer_size(SOCKET_BUF_SIZE)?;
    sock_ref.set_recv_buffer_size(SOCKET_BUF_SIZE)?;
    Ok(())
}
