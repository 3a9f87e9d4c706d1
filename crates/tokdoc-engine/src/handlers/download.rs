use tokdoc_protocol::{DataRequest, Status};
use tracing::{info, warn};

use crate::error::HandlerError;
use crate::handlers::{Reply, blocking};
use crate::server::ServerState;

enum Lookup {
    Missing,
    Denied,
    Readable,
}

/// Send a stored file if it exists and the user may read it.
///
/// Public files are readable by anyone holding a valid key; private files by
/// their owner and the users they were shared with.
pub async fn handle(state: &ServerState, request: &DataRequest) -> Result<Reply, HandlerError> {
    let Some(name) = request.file_name.clone() else {
        return Ok(Reply::empty(Status::FileNotFound));
    };

    let lookup_state = state.clone();
    let lookup_name = name.clone();
    let user = request.headers.user.clone();
    let lookup = blocking(move || check(&lookup_state, &lookup_name, user.as_deref())).await?;

    match lookup {
        Lookup::Missing => return Ok(Reply::empty(Status::FileNotFound)),
        Lookup::Denied => {
            warn!("Denied {} to {:?}", name, request.headers.user);
            return Ok(Reply::empty(Status::AccessDenied));
        }
        Lookup::Readable => {}
    }

    match state.files.read(&name).await? {
        Some(data) => {
            info!("Sending {} ({} bytes)", name, data.len());
            Ok(Reply::with_payload(Status::Success, data))
        }
        // Record without a file on disk
        None => Ok(Reply::empty(Status::FileNotFound)),
    }
}

fn check(state: &ServerState, name: &str, email: Option<&str>) -> Result<Lookup, HandlerError> {
    let Some(resource) = state.records.find_resource(name)? else {
        return Ok(Lookup::Missing);
    };
    if resource.public {
        return Ok(Lookup::Readable);
    }

    let Some(user) = email.map(|e| state.records.find_user(e)).transpose()?.flatten() else {
        return Ok(Lookup::Denied);
    };
    if user.user_id == resource.user_id
        || state.records.has_access(user.user_id, resource.resource_id)?
    {
        Ok(Lookup::Readable)
    } else {
        Ok(Lookup::Denied)
    }
}
