#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tasq_client::QueueClient;

/// A running `tasq-server` instance for e2e testing.
///
/// Spawns the server binary on a random port with a temporary data directory.
/// The server is killed when this struct is dropped.
pub struct TestServer {
    child: Option<Child>,
    addr: String,
    /// Kept alive for the duration of the test. When dropped, the temp dir
    /// is cleaned up.
    _data_dir: tempfile::TempDir,
}

impl TestServer {
    /// Start a new tasq-server instance on a random port.
    pub fn start() -> Self {
        let port = free_port();
        let addr = format!("127.0.0.1:{port}");
        let data_dir = tempfile::tempdir().expect("create temp dir");

        let config_path = data_dir.path().join("tasq.toml");
        let config_content = format!(
            r#"[server]
listen_addr = "{addr}"
"#
        );
        std::fs::write(&config_path, config_content).expect("write config");

        let binary = server_binary();
        assert!(
            binary.exists(),
            "tasq-server binary not found at {binary:?}. Run `cargo build` first."
        );

        let child = Command::new(&binary)
            .env(
                "TASQ_DATA_DIR",
                data_dir.path().join("data").to_str().unwrap(),
            )
            .current_dir(data_dir.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("start tasq-server");

        // Poll TCP until the server is reachable.
        let start = std::time::Instant::now();
        let mut connected = false;
        while start.elapsed() < Duration::from_secs(10) {
            if std::net::TcpStream::connect(&addr).is_ok() {
                connected = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(
            connected,
            "tasq-server did not become reachable at {addr} within 10s"
        );

        Self {
            child: Some(child),
            addr: format!("http://{addr}"),
            _data_dir: data_dir,
        }
    }

    /// The HTTP address of the running server (e.g., "http://127.0.0.1:12345").
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// A spawned `tasq-worker` process, killed on drop.
pub struct TestWorker {
    child: Option<Child>,
}

impl TestWorker {
    /// Start a worker binary against the given server and queue.
    pub fn start(addr: &str, queue: &str, lease_secs: i64, process_ms: u64) -> Self {
        let binary = worker_binary();
        assert!(
            binary.exists(),
            "tasq-worker binary not found at {binary:?}. Run `cargo build` first."
        );

        let child = Command::new(&binary)
            .arg("--endpoint")
            .arg(addr)
            .arg("--queue")
            .arg(queue)
            .arg("--lease")
            .arg(lease_secs.to_string())
            .arg("--process-ms")
            .arg(process_ms.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("start tasq-worker");

        Self { child: Some(child) }
    }
}

impl Drop for TestWorker {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Connect a client to the given server address.
pub fn client(addr: &str) -> QueueClient {
    QueueClient::new(addr).expect("connect queue client")
}

/// Find a free TCP port.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to free port");
    listener.local_addr().unwrap().port()
}

/// Resolve the path to the tasq-server binary.
fn server_binary() -> PathBuf {
    workspace_binary("tasq-server")
}

/// Resolve the path to the tasq-worker binary.
fn worker_binary() -> PathBuf {
    workspace_binary("tasq-worker")
}

/// Resolve a binary path from the workspace target directory.
fn workspace_binary(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // crates/
    path.pop(); // workspace root
    path.push("target");
    path.push("debug");
    path.push(name);
    path
}
