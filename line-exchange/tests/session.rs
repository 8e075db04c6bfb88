//! End-to-end sessions: client and server run as two futures in one runtime.
//!
//! The first test uses real `tokio::net::UdpSocket`s on loopback with
//! file-backed items; the others run over in-memory links, optionally
//! through the fault-injecting simulator.

use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use line_exchange::{
    config::ExchangeConfig,
    connection::Connection,
    lines::{memory_sinks, DirSinks, FileSink, MemorySource},
    reassembler::Artifact,
    receiver::ReceivedItem,
    scheduler::RandomPick,
    session::{self, ServerOptions},
    simulator::{Simulator, SimulatorConfig},
    socket::Socket,
    transport::MemoryTransport,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast() -> ExchangeConfig {
    ExchangeConfig {
        ack_timeout: Duration::from_millis(25),
        grace: Duration::from_millis(250),
        max_retries: Some(200),
        ..ExchangeConfig::default()
    }
}

fn numbered(name: &str, n: usize) -> MemorySource {
    MemorySource::new(name, (1..=n).map(|i| format!("{name} line {i}")))
}

fn expected_artifact(items: &[(&str, usize)]) -> Vec<String> {
    let received: Vec<ReceivedItem> = items
        .iter()
        .map(|(name, n)| ReceivedItem {
            name: name.to_string(),
            lines: (1..=*n).map(|i| format!("{name} line {i}")).collect(),
        })
        .collect();
    Artifact::merge(&received).lines().to_vec()
}

const LIMIT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Ten files over loopback UDP: the server stores each upload and the merged
/// artifact, the client stores the artifact it gets back.
#[tokio::test]
async fn loopback_udp_with_files() {
    let client_dir = tempfile::tempdir().unwrap();
    let server_dir = tempfile::tempdir().unwrap();

    let mut paths = Vec::new();
    for i in 1..=10 {
        let path = client_dir.path().join(format!("file_{i}.txt"));
        let body: String = (1..=i).map(|n| format!("file {i} row {n}\n")).collect();
        fs::write(&path, body).unwrap();
        paths.push(path);
    }
    // An empty file has nothing to send, so the server never hears of it.
    let empty = client_dir.path().join("empty.txt");
    fs::write(&empty, "").unwrap();
    paths.push(empty);

    let server_socket = Socket::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
        .await
        .expect("bind server socket");
    let server_addr = server_socket.local_addr;
    let client_socket = Socket::connect(&server_addr.to_string())
        .await
        .expect("client socket");

    let artifact_path = server_dir.path().join("combined.txt");
    let options = ServerOptions {
        artifact_path: Some(artifact_path.clone()),
        expected_items: Vec::new(),
    };
    let output = client_dir.path().join("combined_from_server.txt");
    let out = output.clone();

    let mut server = Connection::new(server_socket, fast());
    let mut client = Connection::new(client_socket, fast());
    let sources = session::open_sources(&paths).unwrap();

    let (server_report, client_report) = tokio::time::timeout(LIMIT, async {
        let mut server_pick = RandomPick::seeded(1);
        let mut client_pick = RandomPick::seeded(2);
        tokio::join!(
            session::run_server(
                &mut server,
                DirSinks::new(server_dir.path()),
                &mut server_pick,
                &options,
            ),
            session::run_client(
                &mut client,
                sources,
                &mut client_pick,
                move |_: &str| FileSink::create(out.clone()),
            ),
        )
    })
    .await
    .expect("session timed out");
    let server_report = server_report.expect("server failed");
    let client_report = client_report.expect("client failed");

    // Every upload landed intact in the server's directory.
    for i in 1..=10 {
        let name = format!("file_{i}.txt");
        assert_eq!(
            fs::read_to_string(server_dir.path().join(&name)).unwrap(),
            fs::read_to_string(client_dir.path().join(&name)).unwrap(),
            "{name} differs"
        );
    }
    assert!(!server_dir.path().join("empty.txt").exists());
    assert_eq!(server_report.items.len(), 10);
    assert_eq!(client_report.upload.items, 11);

    // Both copies of the artifact are the same file.
    let server_copy = fs::read_to_string(&artifact_path).unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), server_copy);
    assert_eq!(client_report.artifact, server_report.artifact.lines());

    // file_1.txt, file_10.txt, file_2.txt, …
    let headers: Vec<&str> = server_copy
        .lines()
        .filter(|l| l.starts_with("file_"))
        .collect();
    assert_eq!(headers[0], "file_1.txt");
    assert_eq!(headers[1], "file_10.txt");
    assert_eq!(headers[2], "file_2.txt");
    assert_eq!(server_copy.lines().count(), 10 + (1..=10).sum::<usize>());
}

/// Loss, duplication, corruption and reordering in both directions: the
/// artifact still comes back exactly right.
#[tokio::test]
async fn lossy_link_with_fixed_seed() {
    let faults = |seed| SimulatorConfig {
        loss_rate: 0.2,
        duplicate_rate: 0.1,
        corrupt_rate: 0.05,
        delay_rate: 0.1,
        seed,
        ..SimulatorConfig::default()
    };
    let (a, b) = MemoryTransport::pair();
    let mut client = Connection::new(Simulator::new(a, faults(11)), fast());
    let mut server = Connection::new(Simulator::new(b, faults(12)), fast());

    let items = [("alpha", 9), ("beta", 4), ("gamma", 13)];
    let sources: Vec<_> = items.iter().map(|(n, c)| numbered(n, *c)).collect();

    let (server_report, client_report) = tokio::time::timeout(LIMIT, async {
        let mut server_pick = RandomPick::seeded(3);
        let mut client_pick = RandomPick::seeded(4);
        let options = ServerOptions::default();
        tokio::join!(
            session::run_server(
                &mut server,
                memory_sinks(),
                &mut server_pick,
                &options,
            ),
            session::run_client(&mut client, sources, &mut client_pick, memory_sinks()),
        )
    })
    .await
    .expect("session timed out");
    let server_report = server_report.expect("server failed");
    let client_report = client_report.expect("client failed");

    assert_eq!(client_report.artifact, expected_artifact(&items));
    assert_eq!(server_report.artifact.lines(), client_report.artifact);
    for (name, count) in items {
        let item = server_report
            .items
            .iter()
            .find(|i| i.name == name)
            .expect("item missing");
        assert_eq!(item.lines.len(), count, "{name} has duplicated or lost lines");
    }

    let faulted = |t: &[line_exchange::simulator::Fate]| {
        t.iter()
            .filter(|f| **f != line_exchange::simulator::Fate::Delivered)
            .count()
    };
    assert!(faulted(client.transport().trace()) + faulted(server.transport().trace()) > 0);
}

/// The item set may be empty: the session is then just two END handshakes.
#[tokio::test]
async fn nothing_to_send() {
    let (a, b) = MemoryTransport::pair();
    let mut client = Connection::new(a, fast());
    let mut server = Connection::new(b, fast());

    let (server_report, client_report) = tokio::time::timeout(LIMIT, async {
        let mut server_pick = RandomPick::seeded(5);
        let mut client_pick = RandomPick::seeded(6);
        let options = ServerOptions::default();
        tokio::join!(
            session::run_server(
                &mut server,
                memory_sinks(),
                &mut server_pick,
                &options,
            ),
            session::run_client(
                &mut client,
                Vec::<MemorySource>::new(),
                &mut client_pick,
                memory_sinks(),
            ),
        )
    })
    .await
    .expect("session timed out");

    let server_report = server_report.unwrap();
    let client_report = client_report.unwrap();
    assert!(server_report.items.is_empty());
    assert!(server_report.artifact.is_empty());
    assert!(client_report.artifact.is_empty());
    assert_eq!(client_report.upload.items, 0);
}
