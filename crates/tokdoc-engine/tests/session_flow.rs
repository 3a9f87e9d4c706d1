//! End-to-end sessions over an in-memory duplex pipe: real parser, real
//! SQLite (in memory), real file store in a temp directory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use tokdoc_db::Database;
use tokdoc_engine::records::{NewResource, ResourceRow, UserRow};
use tokdoc_engine::{AccessController, FileStore, Limits, RecordStore, ServerState, Session};
use tokdoc_protocol::{DataMethod, DataRequest, Request, Response, Status, read_message, seal};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const SECRET: &str = "test-secret";

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "tokdoc_session_{}_{}",
        std::process::id(),
        NEXT_DIR.fetch_add(1, Ordering::SeqCst)
    ))
}

/// Shared server state plus its storage directory, removed on drop.
struct TestServer {
    state: ServerState,
    dir: PathBuf,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

impl TestServer {
    async fn start(records: Arc<dyn RecordStore>, limits: Limits) -> Arc<Self> {
        let dir = temp_dir();
        let files = FileStore::new(dir.clone()).await.unwrap();
        let state = ServerState::new(AccessController::new(SECRET), records, files, limits);
        Arc::new(Self { state, dir })
    }

    /// Open a session over a pipe holding at most `buffer` bytes in flight.
    fn connect(self: &Arc<Self>, buffer: usize) -> Client {
        let (client, server) = tokio::io::duplex(buffer);
        let peer = "127.0.0.1:40000".parse().unwrap();
        tokio::spawn(Session::new(server, peer, self.state.clone()).run());

        Client {
            stream: client,
            _server: self.clone(),
        }
    }
}

struct Client {
    stream: DuplexStream,
    _server: Arc<TestServer>,
}

// Small buffer so every large write is split into many short reads.
const SMALL_PIPE: usize = 64;

// Large enough to hold a whole request the server stops reading halfway.
const LARGE_PIPE: usize = 64 * 1024;

async fn connect_with(records: Arc<dyn RecordStore>, limits: Limits) -> Client {
    TestServer::start(records, limits).await.connect(SMALL_PIPE)
}

async fn connect() -> Client {
    connect_with(Arc::new(Database::open_in_memory().unwrap()), Limits::default()).await
}

async fn connect_large(limits: Limits) -> Client {
    TestServer::start(Arc::new(Database::open_in_memory().unwrap()), limits)
        .await
        .connect(LARGE_PIPE)
}

fn key_for(email: &str) -> String {
    AccessController::new(SECRET).derive_key(email)
}

fn data(method: DataMethod, user: &str) -> DataRequest {
    DataRequest::new(method, "127.0.0.1", 3000)
        .with_credentials(user, key_for(user))
        .stamped()
}

impl Client {
    async fn send(&mut self, request: &Request, payload: &[u8]) {
        self.send_raw(&request.encode()).await;
        self.send_raw(payload).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Read one response and its payload, checking the checksum over both.
    async fn recv(&mut self) -> (Response, Vec<u8>) {
        let raw = read_message(&mut self.stream, 1 << 16).await.unwrap();
        let response = Response::decode(&raw).unwrap();

        let mut payload = vec![0u8; response.file_size.unwrap_or(0) as usize];
        self.stream.read_exact(&mut payload).await.unwrap();
        assert!(raw.verify(Some(&payload)), "response checksum mismatch");

        (response, payload)
    }

    async fn call(&mut self, request: Request) -> (Response, Vec<u8>) {
        self.send(&request, &[]).await;
        self.recv().await
    }

    async fn auth(&mut self, email: &str, password: &str) -> Response {
        let (response, _) = self
            .call(Request::Auth {
                email: email.into(),
                password: password.into(),
            })
            .await;
        response
    }

    async fn upload(&mut self, request: DataRequest, content: &[u8]) -> Status {
        let request = Request::Data(request.with_file_size(content.len() as u64));
        self.send(&request, content).await;
        self.recv().await.0.status().unwrap()
    }

    async fn assert_closed(&mut self) {
        let mut buf = [0u8; 1];
        assert_eq!(self.stream.read(&mut buf).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn auth_registers_then_authenticates() {
    let mut client = connect().await;

    let registered = client.auth("alice@test.com", "hunter2").await;
    assert_eq!(registered.status(), Some(Status::Success));
    assert_eq!(registered.access_key.as_deref(), Some(key_for("alice@test.com").as_str()));

    let again = client.auth("alice@test.com", "hunter2").await;
    assert_eq!(again.status(), Some(Status::SuccessfulAuthentication));
    assert_eq!(again.access_key, registered.access_key);

    let wrong = client.auth("alice@test.com", "nope").await;
    assert_eq!(wrong.status(), Some(Status::IncorrectCredentials));
    assert_eq!(wrong.access_key, None);
}

#[tokio::test]
async fn corrupted_message_closes_connection() {
    let mut client = connect().await;

    let mut bytes = Request::Auth {
        email: "alice@test.com".into(),
        password: "hunter2".into(),
    }
    .encode();
    let last = bytes.len() - 10;
    bytes[last] ^= 0x01;
    client.send_raw(&bytes).await;

    let (response, payload) = client.recv().await;
    assert_eq!(response.status(), Some(Status::MessageCorrupted));
    assert!(payload.is_empty());
    client.assert_closed().await;
}

#[tokio::test]
async fn list_with_nothing_stored_is_no_files_found() {
    let mut client = connect().await;

    let (response, payload) = client
        .call(Request::Data(data(DataMethod::List, "alice@test.com")))
        .await;
    assert_eq!(response.status(), Some(Status::NoFilesFound));
    assert_eq!(response.file_size, Some(0));
    assert!(payload.is_empty());
}

#[tokio::test]
async fn download_of_missing_file_is_not_found() {
    let mut client = connect().await;

    let request = data(DataMethod::Download, "alice@test.com").with_file_name("nothing.txt");
    let (response, payload) = client.call(Request::Data(request)).await;
    assert_eq!(response.status(), Some(Status::FileNotFound));
    assert_eq!(response.file_size, Some(0));
    assert!(payload.is_empty());
}

#[tokio::test]
async fn upload_then_download_public_file() {
    let mut client = connect().await;
    client.auth("alice@test.com", "hunter2").await;

    let content: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let upload = data(DataMethod::Upload, "alice@test.com").with_file_name("photo.png");
    assert_eq!(client.upload(upload, &content).await, Status::Success);

    // Anyone with a valid key can read a public file.
    let download = data(DataMethod::Download, "bob@test.com").with_file_name("photo.png");
    let (response, payload) = client.call(Request::Data(download)).await;
    assert_eq!(response.status(), Some(Status::Success));
    assert_eq!(response.file_size, Some(content.len() as u64));
    assert_eq!(payload, content);

    let (response, listing) = client
        .call(Request::Data(data(DataMethod::List, "alice@test.com")))
        .await;
    assert_eq!(response.status(), Some(Status::Success));
    let listing = String::from_utf8(listing).unwrap();
    assert!(listing.starts_with("photo.png .png "), "{listing}");
    assert!(listing.ends_with(" PUBLIC\r\n"), "{listing}");
}

#[tokio::test]
async fn zero_byte_upload_is_accepted() {
    let mut client = connect().await;
    client.auth("alice@test.com", "hunter2").await;

    let upload = data(DataMethod::Upload, "alice@test.com").with_file_name("empty.txt");
    assert_eq!(client.upload(upload, &[]).await, Status::Success);

    let download = data(DataMethod::Download, "alice@test.com").with_file_name("empty.txt");
    let (response, payload) = client.call(Request::Data(download)).await;
    assert_eq!(response.status(), Some(Status::Success));
    assert!(payload.is_empty());
}

#[tokio::test]
async fn missing_key_is_denied_and_session_continues() {
    let mut client = connect().await;

    let mut request = DataRequest::new(DataMethod::List, "127.0.0.1", 3000);
    request.headers.user = Some("alice@test.com".into());
    let (response, _) = client.call(Request::Data(request)).await;
    assert_eq!(response.status(), Some(Status::AccessDenied));

    let wrong_key = DataRequest::new(DataMethod::List, "127.0.0.1", 3000)
        .with_credentials("alice@test.com", key_for("bob@test.com"));
    let (response, _) = client.call(Request::Data(wrong_key)).await;
    assert_eq!(response.status(), Some(Status::AccessDenied));

    let (response, _) = client
        .call(Request::Exit {
            email: None,
            password: None,
        })
        .await;
    assert_eq!(response.status(), Some(Status::ExitingAuthorized));
    client.assert_closed().await;
}

#[tokio::test]
async fn invalid_format_keeps_connection_open() {
    let mut client = connect().await;

    client.send_raw(&seal("{START}\r\nnonsense\r\n{END}", &[])).await;
    let (response, _) = client.recv().await;
    assert_eq!(response.status(), Some(Status::InvalidFormat));

    let registered = client.auth("alice@test.com", "hunter2").await;
    assert_eq!(registered.status(), Some(Status::Success));
}

#[tokio::test]
async fn private_file_is_limited_to_owner_and_grantees() {
    let mut client = connect().await;
    for user in ["alice@test.com", "bob@test.com", "carol@test.com"] {
        client.auth(user, "pw").await;
    }

    let upload = data(DataMethod::Upload, "alice@test.com")
        .with_file_name("plans.txt")
        .with_authorized(vec!["bob@test.com".into()]);
    assert_eq!(client.upload(upload, b"top secret").await, Status::Success);

    for (user, expected) in [
        ("alice@test.com", Status::Success),
        ("bob@test.com", Status::Success),
        ("carol@test.com", Status::AccessDenied),
    ] {
        let download = data(DataMethod::Download, user).with_file_name("plans.txt");
        let (response, payload) = client.call(Request::Data(download)).await;
        assert_eq!(response.status(), Some(expected), "{user}");
        if expected == Status::Success {
            assert_eq!(payload, b"top secret");
        }
    }

    let (response, _) = client
        .call(Request::Data(data(DataMethod::List, "carol@test.com")))
        .await;
    assert_eq!(response.status(), Some(Status::NoFilesFound));

    let (_, listing) = client
        .call(Request::Data(data(DataMethod::List, "bob@test.com")))
        .await;
    assert!(String::from_utf8(listing).unwrap().ends_with(" PRIVATE\r\n"));
}

#[tokio::test]
async fn only_owner_may_replace_a_file() {
    let mut client = connect().await;
    client.auth("alice@test.com", "pw").await;
    client.auth("bob@test.com", "pw").await;

    let first = data(DataMethod::Upload, "alice@test.com").with_file_name("notes.md");
    assert_eq!(client.upload(first, b"v1").await, Status::Success);

    let hijack = data(DataMethod::Upload, "bob@test.com").with_file_name("notes.md");
    assert_eq!(client.upload(hijack, b"evil").await, Status::AccessDenied);

    let second = data(DataMethod::Upload, "alice@test.com").with_file_name("notes.md");
    assert_eq!(client.upload(second, b"v2").await, Status::Success);

    let download = data(DataMethod::Download, "bob@test.com").with_file_name("notes.md");
    let (_, payload) = client.call(Request::Data(download)).await;
    assert_eq!(payload, b"v2");
}

#[tokio::test]
async fn denied_upload_payload_is_discarded() {
    let mut client = connect().await;

    let request = DataRequest::new(DataMethod::Upload, "127.0.0.1", 3000)
        .with_file_name("sneaky.bin")
        .with_credentials("alice@test.com", "0".repeat(64));
    assert_eq!(client.upload(request, &[0xAB; 5000]).await, Status::AccessDenied);

    // Stream is still aligned on the next message.
    let (response, _) = client
        .call(Request::Data(data(DataMethod::List, "alice@test.com")))
        .await;
    assert_eq!(response.status(), Some(Status::NoFilesFound));
}

#[tokio::test]
async fn unknown_grantee_is_user_not_found() {
    let mut client = connect().await;
    client.auth("alice@test.com", "pw").await;

    let upload = data(DataMethod::Upload, "alice@test.com")
        .with_file_name("plans.txt")
        .with_authorized(vec!["ghost@test.com".into()]);
    assert_eq!(client.upload(upload, b"boo").await, Status::UserNotFound);

    let (response, _) = client
        .call(Request::Data(data(DataMethod::List, "alice@test.com")))
        .await;
    assert_eq!(response.status(), Some(Status::NoFilesFound));
}

#[tokio::test]
async fn oversized_upload_is_rejected_and_closed() {
    let limits = Limits {
        max_upload_bytes: 16,
        ..Limits::default()
    };
    let mut client = connect_with(Arc::new(Database::open_in_memory().unwrap()), limits).await;

    let request = Request::Data(
        data(DataMethod::Upload, "alice@test.com")
            .with_file_name("big.bin")
            .with_file_size(17),
    );
    client.send(&request, &[]).await;
    let (response, _) = client.recv().await;
    assert_eq!(response.status(), Some(Status::InvalidFormat));
    client.assert_closed().await;
}

#[tokio::test]
async fn unregistered_email_lists_nothing() {
    let mut client = connect().await;
    client.auth("alice@test.com", "pw").await;

    let upload = data(DataMethod::Upload, "alice@test.com").with_file_name("public.txt");
    assert_eq!(client.upload(upload, b"hello").await, Status::Success);

    let (response, payload) = client
        .call(Request::Data(data(DataMethod::List, "ghost@test.com")))
        .await;
    assert_eq!(response.status(), Some(Status::NoFilesFound));
    assert!(payload.is_empty());
}

#[tokio::test]
async fn invalid_upload_payload_is_skipped() {
    let mut client = connect().await;
    client.auth("alice@test.com", "pw").await;

    // Well-framed and correctly signed, but the name is not a flat file name.
    let bad_name = data(DataMethod::Upload, "alice@test.com").with_file_name("x/y.txt");
    assert_eq!(client.upload(bad_name, &[7; 100]).await, Status::InvalidFormat);

    let bad_port = Request::Data(
        DataRequest::new(DataMethod::Upload, "127.0.0.1", 3000)
            .with_file_name("a.txt")
            .with_credentials("alice@test.com", key_for("alice@test.com"))
            .with_file_size(100),
    );
    let body = bad_port.body().replace(":3000", ":http");
    client.send_raw(&seal(&body, &[])).await;
    client.send_raw(&[7; 100]).await;
    let (response, _) = client.recv().await;
    assert_eq!(response.status(), Some(Status::InvalidFormat));

    let (response, _) = client
        .call(Request::Data(data(DataMethod::List, "alice@test.com")))
        .await;
    assert_eq!(response.status(), Some(Status::NoFilesFound));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_of_one_name_keep_a_single_owner() {
    let server = TestServer::start(
        Arc::new(Database::open_in_memory().unwrap()),
        Limits::default(),
    )
    .await;
    let mut setup = server.connect(SMALL_PIPE);
    setup.auth("alice@test.com", "pw").await;
    setup.auth("bob@test.com", "pw").await;

    let mut alice = server.connect(SMALL_PIPE);
    let mut bob = server.connect(SMALL_PIPE);
    let alice_upload = data(DataMethod::Upload, "alice@test.com").with_file_name("race.txt");
    let bob_upload = data(DataMethod::Upload, "bob@test.com").with_file_name("race.txt");
    let (from_alice, from_bob) = tokio::join!(
        alice.upload(alice_upload, b"from alice"),
        bob.upload(bob_upload, b"from bob")
    );

    let winner: &[u8] = match (from_alice, from_bob) {
        (Status::Success, Status::AccessDenied) => b"from alice",
        (Status::AccessDenied, Status::Success) => b"from bob",
        other => panic!("expected exactly one owner, got {other:?}"),
    };

    let download = data(DataMethod::Download, "carol@test.com").with_file_name("race.txt");
    let (response, payload) = setup.call(Request::Data(download)).await;
    assert_eq!(response.status(), Some(Status::Success));
    assert_eq!(payload, winner);
}

fn auth_bytes() -> Vec<u8> {
    Request::Auth {
        email: "alice@test.com".into(),
        password: "hunter2".into(),
    }
    .encode()
}

async fn assert_internal_error_then_closed(client: &mut Client) {
    let (response, payload) = client.recv().await;
    assert_eq!(response.status(), Some(Status::InternalServerError));
    assert!(payload.is_empty());
    client.assert_closed().await;
}

#[tokio::test]
async fn unparsable_size_field_closes_connection() {
    let mut client = connect_large(Limits::default()).await;

    let mut bytes = auth_bytes();
    bytes[66..82].copy_from_slice(b"12x             ");
    client.send_raw(&bytes).await;

    assert_internal_error_then_closed(&mut client).await;
}

#[tokio::test]
async fn missing_crlf_closes_connection() {
    let mut client = connect_large(Limits::default()).await;

    let mut bytes = auth_bytes();
    bytes[64] = b'X';
    client.send_raw(&bytes).await;

    assert_internal_error_then_closed(&mut client).await;
}

#[tokio::test]
async fn oversized_message_closes_connection() {
    let limits = Limits {
        max_message_bytes: 32,
        ..Limits::default()
    };
    let mut client = connect_large(limits).await;

    client.send_raw(&auth_bytes()).await;

    assert_internal_error_then_closed(&mut client).await;
}

#[tokio::test]
async fn eof_mid_message_closes_connection() {
    let mut client = connect_large(Limits::default()).await;

    let bytes = auth_bytes();
    client.send_raw(&bytes[..bytes.len() / 2]).await;
    client.stream.shutdown().await.unwrap();

    assert_internal_error_then_closed(&mut client).await;
}

struct BrokenStore;

impl RecordStore for BrokenStore {
    fn find_user(&self, _: &str) -> anyhow::Result<Option<UserRow>> {
        anyhow::bail!("database is locked")
    }

    fn create_user(&self, _: &str, _: &str) -> anyhow::Result<UserRow> {
        anyhow::bail!("database is locked")
    }

    fn find_resource(&self, _: &str) -> anyhow::Result<Option<ResourceRow>> {
        anyhow::bail!("database is locked")
    }

    fn accessible_resources(&self, _: Option<i64>) -> anyhow::Result<Vec<ResourceRow>> {
        anyhow::bail!("database is locked")
    }

    fn has_access(&self, _: i64, _: i64) -> anyhow::Result<bool> {
        anyhow::bail!("database is locked")
    }

    fn save_resource(&self, _: &NewResource, _: &[i64]) -> anyhow::Result<Option<ResourceRow>> {
        anyhow::bail!("database is locked")
    }
}

#[tokio::test]
async fn storage_failure_is_internal_error_and_session_continues() {
    let mut client = connect_with(Arc::new(BrokenStore), Limits::default()).await;

    let (response, _) = client
        .call(Request::Data(data(DataMethod::List, "alice@test.com")))
        .await;
    assert_eq!(response.status(), Some(Status::InternalServerError));

    let (response, _) = client
        .call(Request::Data(data(DataMethod::Exit, "alice@test.com")))
        .await;
    assert_eq!(response.status(), Some(Status::ExitingAuthorized));
    client.assert_closed().await;
}

/// Store whose lookups wait until the test opens the gate.
struct GatedStore {
    gate: Mutex<mpsc::Receiver<()>>,
}

impl RecordStore for GatedStore {
    fn find_user(&self, email: &str) -> anyhow::Result<Option<UserRow>> {
        let gate = self.gate.lock().unwrap();
        gate.recv_timeout(Duration::from_secs(5))?;
        Ok(Some(UserRow {
            user_id: 1,
            email: email.to_string(),
            password: String::new(),
            created_at: String::new(),
        }))
    }

    fn create_user(&self, _: &str, _: &str) -> anyhow::Result<UserRow> {
        anyhow::bail!("read only")
    }

    fn find_resource(&self, _: &str) -> anyhow::Result<Option<ResourceRow>> {
        Ok(None)
    }

    fn accessible_resources(&self, _: Option<i64>) -> anyhow::Result<Vec<ResourceRow>> {
        Ok(Vec::new())
    }

    fn has_access(&self, _: i64, _: i64) -> anyhow::Result<bool> {
        Ok(false)
    }

    fn save_resource(&self, _: &NewResource, _: &[i64]) -> anyhow::Result<Option<ResourceRow>> {
        anyhow::bail!("read only")
    }
}

// Single-threaded runtime: a lookup blocking the runtime thread would stall
// every other session until it times out.
#[tokio::test]
async fn slow_record_lookup_does_not_stall_other_sessions() {
    let (release, gate) = mpsc::channel();
    let store = GatedStore {
        gate: Mutex::new(gate),
    };
    let server = TestServer::start(Arc::new(store), Limits::default()).await;
    let mut slow = server.connect(LARGE_PIPE);
    let mut quick = server.connect(LARGE_PIPE);

    slow.send(&Request::Data(data(DataMethod::List, "alice@test.com")), &[])
        .await;

    let (response, _) = quick
        .call(Request::Data(data(DataMethod::Exit, "bob@test.com")))
        .await;
    assert_eq!(response.status(), Some(Status::ExitingAuthorized));

    release.send(()).unwrap();
    let (response, _) = slow.recv().await;
    assert_eq!(response.status(), Some(Status::NoFilesFound));
}
