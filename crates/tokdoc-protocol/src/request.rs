use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::constants::*;
use crate::envelope::seal;

/// Top-level request category. EXIT is framed like AUTH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodGroup {
    Auth,
    Data,
}

/// The operation a request routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Auth,
    Exit,
    List,
    Upload,
    Download,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => AUTH,
            Self::Exit => EXIT,
            Self::List => LIST,
            Self::Upload => UPLOAD,
            Self::Download => DOWNLOAD,
        }
    }
}

/// Methods carried in the DATA group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMethod {
    List,
    Upload,
    Download,
    Exit,
}

impl DataMethod {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            LIST => Some(Self::List),
            UPLOAD => Some(Self::Upload),
            DOWNLOAD => Some(Self::Download),
            EXIT => Some(Self::Exit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.method().as_str()
    }

    pub fn method(self) -> Method {
        match self {
            Self::List => Method::List,
            Self::Upload => Method::Upload,
            Self::Download => Method::Download,
            Self::Exit => Method::Exit,
        }
    }
}

/// Headers block of a DATA request. Known keys get typed fields; anything
/// else is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    pub user: Option<String>,
    pub access_key: Option<String>,
    pub timestamp: Option<String>,
    pub authorized: Option<Vec<String>>,
    pub extra: BTreeMap<String, String>,
}

impl Headers {
    pub fn is_empty(&self) -> bool {
        self.user.is_none()
            && self.access_key.is_none()
            && self.timestamp.is_none()
            && self.authorized.is_none()
            && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    pub method: DataMethod,
    pub ip: String,
    pub port: u16,
    pub file_name: Option<String>,
    pub headers: Headers,
    pub file_size: Option<u64>,
}

impl DataRequest {
    pub fn new(method: DataMethod, ip: impl Into<String>, port: u16) -> Self {
        Self {
            method,
            ip: ip.into(),
            port,
            file_name: None,
            headers: Headers::default(),
            file_size: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Set the `USER` and `ACCESS_KEY` headers.
    pub fn with_credentials(mut self, user: impl Into<String>, access_key: impl Into<String>) -> Self {
        self.headers.user = Some(user.into());
        self.headers.access_key = Some(access_key.into());
        self
    }

    /// Set `TIMESTAMP` to the current UTC time.
    pub fn stamped(mut self) -> Self {
        self.headers.timestamp = Some(chrono::Utc::now().to_rfc3339());
        self
    }

    pub fn with_authorized(mut self, emails: Vec<String>) -> Self {
        self.headers.authorized = Some(emails);
        self
    }

    pub fn with_file_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }
}

/// A parsed TOKDOC request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Auth {
        email: String,
        password: String,
    },
    Exit {
        email: Option<String>,
        password: Option<String>,
    },
    Data(DataRequest),
}

impl Request {
    pub fn method_group(&self) -> MethodGroup {
        match self {
            Self::Auth { .. } | Self::Exit { .. } => MethodGroup::Auth,
            Self::Data(_) => MethodGroup::Data,
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Self::Auth { .. } => Method::Auth,
            Self::Exit { .. } => Method::Exit,
            Self::Data(data) => data.method.method(),
        }
    }

    pub fn headers(&self) -> Option<&Headers> {
        match self {
            Self::Data(data) => Some(&data.headers),
            _ => None,
        }
    }

    /// Declared upload size; only UPLOAD requests carry one.
    pub fn file_size(&self) -> Option<u64> {
        match self {
            Self::Data(data) => data.file_size,
            _ => None,
        }
    }

    /// Render the `{START}` ... `{END}` body.
    pub fn body(&self) -> String {
        let mut body = String::new();
        let _ = write!(body, "{START}{CRLF}{CRLF}{START_METHOD}{CRLF}");

        match self {
            Self::Auth { email, password } => {
                let _ = write!(body, "{AUTH} {email} {password}");
            }
            Self::Exit { email, password } => {
                body.push_str(EXIT);
                for token in [email, password].into_iter().flatten() {
                    let _ = write!(body, " {token}");
                }
            }
            Self::Data(data) => {
                let _ = write!(body, "{DATA} {} {}:{}", data.method.as_str(), data.ip, data.port);
                if let Some(name) = &data.file_name {
                    let _ = write!(body, " {name}");
                }
            }
        }
        let _ = write!(body, "{CRLF}{END_METHOD}{CRLF}{CRLF}");

        if let Self::Data(data) = self {
            write_headers(&mut body, &data.headers);
            if let Some(size) = data.file_size {
                let _ = write!(
                    body,
                    "{START_FILE}{CRLF}{FILE_SIZE}:{size}{CRLF}{END_FILE}{CRLF}{CRLF}"
                );
            }
        }

        body.push_str(END);
        body
    }

    /// Encode as a complete envelope, ready to write to the socket. Upload
    /// content is sent separately, after these bytes.
    pub fn encode(&self) -> Vec<u8> {
        seal(&self.body(), &[])
    }
}

fn write_headers(body: &mut String, headers: &Headers) {
    if headers.is_empty() {
        return;
    }

    let _ = write!(body, "{START_HEADERS}{CRLF}");
    let known = [
        (USER, &headers.user),
        (ACCESS_KEY, &headers.access_key),
        (TIMESTAMP, &headers.timestamp),
    ];
    for (key, value) in known {
        if let Some(value) = value {
            let _ = write!(body, "{key}:{value}{CRLF}");
        }
    }
    if let Some(emails) = &headers.authorized {
        let _ = write!(body, "{AUTHORIZED}:({}){CRLF}", emails.join(","));
    }
    for (key, value) in &headers.extra {
        let _ = write!(body, "{key}:{value}{CRLF}");
    }
    let _ = write!(body, "{END_HEADERS}{CRLF}{CRLF}");
}
