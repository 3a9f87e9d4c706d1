use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use tokdoc_protocol::Status;
use tracing::{info, warn};

use crate::error::HandlerError;
use crate::handlers::{Reply, blocking};
use crate::server::ServerState;

/// Authenticate an existing user, or register the email on first sight.
///
/// - known user, right password: 200 with the access key
/// - known user, wrong password: 501
/// - unknown user: registered, 201 with the access key (503 if that fails)
///
/// Hashing and record lookups run on the blocking pool.
pub async fn handle(state: &ServerState, email: &str, password: &str) -> Result<Reply, HandlerError> {
    let state = state.clone();
    let email = email.to_string();
    let password = password.to_string();
    blocking(move || authenticate(&state, &email, &password)).await
}

fn authenticate(state: &ServerState, email: &str, password: &str) -> Result<Reply, HandlerError> {
    match state.records.find_user(email)? {
        Some(user) => {
            let parsed_hash = PasswordHash::new(&user.password)
                .map_err(|e| anyhow::anyhow!("Stored hash for {} is invalid: {}", email, e))?;

            if Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_err()
            {
                warn!("Incorrect credentials for {}", email);
                return Ok(Reply::with_key(Status::IncorrectCredentials, None));
            }

            info!("Authenticated {}", email);
            Ok(Reply::with_key(
                Status::SuccessfulAuthentication,
                Some(state.access.derive_key(email)),
            ))
        }
        None => register(state, email, password),
    }
}

fn register(state: &ServerState, email: &str, password: &str) -> Result<Reply, HandlerError> {
    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = match Argon2::default().hash_password(password.as_bytes(), &salt) {
        Ok(hash) => hash.to_string(),
        Err(e) => {
            warn!("Failed to hash password for {}: {}", email, e);
            return Ok(Reply::with_key(Status::SignUpError, None));
        }
    };

    if let Err(e) = state.records.create_user(email, &password_hash) {
        warn!("Failed to register {}: {}", email, e);
        return Ok(Reply::with_key(Status::SignUpError, None));
    }

    info!("Registered {}", email);
    Ok(Reply::with_key(
        Status::Success,
        Some(state.access.derive_key(email)),
    ))
}
