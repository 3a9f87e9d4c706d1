use std::fmt::Write as _;

use tokdoc_protocol::constants::CRLF;
use tokdoc_protocol::{DataRequest, Status};
use tracing::debug;

use crate::error::HandlerError;
use crate::handlers::{Reply, blocking};
use crate::records::ResourceRow;
use crate::server::ServerState;

/// Enumerate the files the requesting user may download.
///
/// Payload: one line per file, `<name> <type> <upload date> <PUBLIC|PRIVATE>`,
/// each terminated by CRLF. An email with no account has no files.
pub async fn handle(state: &ServerState, request: &DataRequest) -> Result<Reply, HandlerError> {
    let state = state.clone();
    let user = request.headers.user.clone();
    blocking(move || list(&state, user.as_deref())).await
}

fn list(state: &ServerState, email: Option<&str>) -> Result<Reply, HandlerError> {
    let Some(user) = email.map(|e| state.records.find_user(e)).transpose()?.flatten() else {
        debug!("No account for {:?}, nothing to list", email);
        return Ok(Reply::empty(Status::NoFilesFound));
    };

    let resources = state.records.accessible_resources(Some(user.user_id))?;
    debug!("Listing {} files for {}", resources.len(), user.email);

    if resources.is_empty() {
        return Ok(Reply::empty(Status::NoFilesFound));
    }

    Ok(Reply::with_payload(
        Status::Success,
        render(&resources).into_bytes(),
    ))
}

fn render(resources: &[ResourceRow]) -> String {
    let mut out = String::new();
    for r in resources {
        let kind = if r.kind.is_empty() { "-" } else { r.kind.as_str() };
        let visibility = if r.public { "PUBLIC" } else { "PRIVATE" };
        let _ = write!(
            out,
            "{} {} {} {}{CRLF}",
            r.resource_path, kind, r.upload_date, visibility
        );
    }
    out
}
