use std::fmt;

/// Response statuses. Two statuses share code 201 and are told apart by
/// their message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    SuccessfulAuthentication,
    Success,
    ExitingAuthorized,
    FileNotFound,
    AccessDenied,
    NoFilesFound,
    UserNotFound,
    InternalServerError,
    IncorrectCredentials,
    MessageCorrupted,
    SignUpError,
    InvalidFormat,
}

impl Status {
    pub const ALL: [Status; 12] = [
        Self::SuccessfulAuthentication,
        Self::Success,
        Self::ExitingAuthorized,
        Self::FileNotFound,
        Self::AccessDenied,
        Self::NoFilesFound,
        Self::UserNotFound,
        Self::InternalServerError,
        Self::IncorrectCredentials,
        Self::MessageCorrupted,
        Self::SignUpError,
        Self::InvalidFormat,
    ];

    pub fn code(self) -> u16 {
        match self {
            Self::SuccessfulAuthentication => 200,
            Self::Success | Self::ExitingAuthorized => 201,
            Self::FileNotFound => 301,
            Self::AccessDenied => 302,
            Self::NoFilesFound => 303,
            Self::UserNotFound => 304,
            Self::InternalServerError => 500,
            Self::IncorrectCredentials => 501,
            Self::MessageCorrupted => 502,
            Self::SignUpError => 503,
            Self::InvalidFormat => 504,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::SuccessfulAuthentication => "Successful authentication",
            Self::Success => "Success",
            Self::ExitingAuthorized => "Exiting authorized",
            Self::FileNotFound => "File not found",
            Self::AccessDenied => "Access to this file is denied",
            Self::NoFilesFound => "No files found",
            Self::UserNotFound => "User does not exist",
            Self::InternalServerError => "Internal Server Error",
            Self::IncorrectCredentials => "Incorrect credentials",
            Self::MessageCorrupted => "Corrupted",
            Self::SignUpError => "Sign up error",
            Self::InvalidFormat => "Invalid format",
        }
    }

    /// Look up a status from the code and message carried in a response.
    pub fn from_parts(code: u16, message: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code && s.message() == message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.message())
    }
}
