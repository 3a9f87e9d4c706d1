use std::io;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokdoc_protocol::{DataRequest, Status};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{info, warn};

use crate::error::HandlerError;
use crate::handlers::{Reply, blocking};
use crate::records::NewResource;
use crate::server::ServerState;

/// Socket read size while collecting an upload.
const READ_CHUNK: usize = 64 * 1024;

/// Receive an upload and record it.
///
/// The declared `FILE_SIZE` bytes are read off the connection before
/// anything else, so the stream is back on a message boundary whatever the
/// outcome. Without `AUTHORIZED` the file is public; with it the file is
/// private to the owner plus the listed users.
///
/// The payload is staged and only moved into place after the record store
/// has accepted the save, which is also where ownership of an existing name
/// is enforced.
pub async fn handle<R>(
    state: &ServerState,
    request: &DataRequest,
    reader: &mut R,
) -> Result<Reply, HandlerError>
where
    R: AsyncRead + Unpin,
{
    let size = request.file_size.unwrap_or(0);
    let payload = read_payload(reader, size)
        .await
        .map_err(HandlerError::Transport)?;

    let Some(name) = request.file_name.clone() else {
        return Ok(Reply::empty(Status::InvalidFormat));
    };
    let email = request.headers.user.clone().unwrap_or_default();

    let lookup_state = state.clone();
    let lookup_email = email.clone();
    let authorized = request.headers.authorized.clone();
    let (owner_id, grants) = blocking(move || {
        resolve_users(&lookup_state, &lookup_email, authorized.as_deref())
    })
    .await?;
    let grant_count = grants.len();

    let staged = state.files.stage(&payload).await?;

    let resource = NewResource {
        kind: extension(&name),
        resource_path: name.clone(),
        upload_date: chrono::Utc::now(),
        user_id: owner_id,
        public: request.headers.authorized.is_none(),
    };
    let save_state = state.clone();
    let saved = blocking(move || {
        save_state
            .records
            .save_resource(&resource, &grants)
            .map_err(HandlerError::from)
    })
    .await;

    match saved {
        Ok(Some(_)) => state.files.commit(staged, &name).await?,
        Ok(None) => {
            state.files.discard(staged).await;
            warn!("{} tried to overwrite {} owned by another user", email, name);
            return Ok(Reply::empty(Status::AccessDenied));
        }
        Err(e) => {
            state.files.discard(staged).await;
            return Err(e);
        }
    }

    info!(
        "Stored {} ({} bytes) for {}, {} grants",
        name,
        payload.len(),
        email,
        grant_count
    );
    Ok(Reply::empty(Status::Success))
}

/// Owner id plus the ids of every `AUTHORIZED` user; any unknown email is
/// `UserNotFound`.
fn resolve_users(
    state: &ServerState,
    email: &str,
    authorized: Option<&[String]>,
) -> Result<(i64, Vec<i64>), HandlerError> {
    let owner = state
        .records
        .find_user(email)?
        .ok_or_else(|| HandlerError::UserNotFound(email.to_string()))?;

    let mut grants = Vec::new();
    for email in authorized.unwrap_or_default() {
        let user = state
            .records
            .find_user(email)?
            .ok_or_else(|| HandlerError::UserNotFound(email.clone()))?;
        grants.push(user.user_id);
    }

    Ok((owner.user_id, grants))
}

/// Read exactly `size` bytes, looping over short reads.
///
/// EOF before `size` bytes is an error; nothing past `size` is consumed.
pub async fn read_payload<R>(reader: &mut R, size: u64) -> io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let size = usize::try_from(size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload too large"))?;

    let mut buf = BytesMut::with_capacity(size.min(READ_CHUNK));
    let mut chunk = vec![0u8; size.min(READ_CHUNK)];

    while buf.len() < size {
        let want = (size - buf.len()).min(chunk.len());
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Connection closed after {} of {} payload bytes", buf.len(), size),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(buf.freeze())
}

/// Discard `size` payload bytes of a rejected upload.
pub async fn drain_payload<R>(reader: &mut R, size: u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let copied = tokio::io::copy(&mut (&mut *reader).take(size), &mut tokio::io::sink()).await?;
    if copied < size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("Connection closed after {} of {} payload bytes", copied, size),
        ));
    }
    Ok(())
}

/// `photo.png` -> `.png`, `Makefile` -> empty.
fn extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}
