//! Shared harness: a server on in-memory pipes and a RESP test client.

use cinnabar::{Config, Server};
use respite::{RespConfig, RespReader, RespValue, RespWriter};
use std::time::Duration;
use tokio::{
    io::{duplex, DuplexStream, ReadHalf, WriteHalf},
    time::timeout,
};

/// How long we wait before a test read times out.
pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Build a command argument slice out of mixed byte-string expressions.
macro_rules! cmd {
    ($($arg:expr),* $(,)?) => {
        &[$( &$arg[..] ),*][..]
    };
}
pub(crate) use cmd;

pub struct TestServer {
    server: Server,
    dir: tempfile::TempDir,
}

impl TestServer {
    pub async fn start() -> TestServer {
        Self::with(Config::default()).await
    }

    /// Start a server with `config`, pointing persistence at a fresh
    /// temp directory.
    pub async fn with(mut config: Config) -> TestServer {
        let dir = tempfile::tempdir().expect("temp dir");
        config.dir = dir.path().to_path_buf();
        TestServer {
            server: Server::start(config).await,
            dir,
        }
    }

    /// Stop this server and start a new one over the same directory, as
    /// a process restart would.
    pub async fn restart(self, mut config: Config) -> TestServer {
        let TestServer { server, dir } = self;
        drop(server);
        config.dir = dir.path().to_path_buf();
        TestServer {
            server: Server::start(config).await,
            dir,
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub async fn client(&self) -> TestClient {
        let (local, remote) = duplex(1 << 16);
        self.server.connect(remote, None);
        TestClient::new(local)
    }
}

pub struct TestClient {
    reader: RespReader<ReadHalf<DuplexStream>>,
    writer: RespWriter<WriteHalf<DuplexStream>>,
}

impl TestClient {
    pub fn new(stream: DuplexStream) -> TestClient {
        let (reader, writer) = tokio::io::split(stream);
        TestClient {
            reader: RespReader::new(reader, RespConfig::default()),
            writer: RespWriter::new(writer),
        }
    }

    /// Send one command as an array of bulk strings.
    pub async fn send(&mut self, command: &[&[u8]]) {
        self.writer
            .write_array(command.len())
            .await
            .expect("writing command header");
        for part in command {
            self.writer
                .write_blob_string(part)
                .await
                .expect("writing command argument");
        }
        self.writer.flush().await.expect("flushing command");
    }

    /// Read one reply frame.
    pub async fn read(&mut self) -> RespValue {
        timeout(TIMEOUT, self.reader.value())
            .await
            .expect("reply timed out")
            .expect("reading reply")
            .expect("connection closed")
    }

    /// Send a command and read its reply.
    pub async fn run(&mut self, command: &[&[u8]]) -> RespValue {
        self.send(command).await;
        self.read().await
    }
}

// Assertion helpers over RespValue.

pub fn string_of(value: &RespValue) -> Vec<u8> {
    match value {
        RespValue::String(s) => s.to_vec(),
        other => panic!("expected a string, got {other:?}"),
    }
}

pub fn int_of(value: &RespValue) -> i64 {
    match value {
        RespValue::Integer(n) => *n,
        other => panic!("expected an integer, got {other:?}"),
    }
}

pub fn array_of(value: RespValue) -> Vec<RespValue> {
    match value {
        RespValue::Array(items) => items,
        other => panic!("expected an array, got {other:?}"),
    }
}

pub fn error_of(value: &RespValue) -> String {
    match value {
        RespValue::Error(e) => String::from_utf8_lossy(e).into_owned(),
        other => panic!("expected an error, got {other:?}"),
    }
}

pub fn assert_str(value: &RespValue, expected: &str) {
    assert_eq!(string_of(value), expected.as_bytes());
}

pub fn assert_int(value: &RespValue, expected: i64) {
    assert_eq!(int_of(value), expected);
}

pub fn assert_nil(value: &RespValue) {
    assert!(matches!(value, RespValue::Nil), "expected nil, got {value:?}");
}
