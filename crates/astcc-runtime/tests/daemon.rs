//! End-to-end: run_daemon against an in-process fake manager.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use astcc_ami::{SessionError, SessionOptions};
use astcc_core::{DeviceId, HardwareAction};
use astcc_hw::{Actuation, HardwareConfig, Latched, MockActuator, MockJournal};
use astcc_runtime::{DaemonConfig, DaemonError, ResolverConfig, run_daemon};

const WAIT: Duration = Duration::from_secs(5);

struct FakeManager {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FakeManager {
    /// Accept one client and answer its login.
    async fn accept(listener: &TcpListener, accept_login: bool) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut manager = Self {
            reader: BufReader::new(reader),
            writer,
        };
        manager.send("Asterisk Call Manager/5.0.1\r\n").await;

        let login = manager.read_action().await;
        assert_eq!(value(&login, "Action"), Some("Login"));
        let id = value(&login, "ActionID").unwrap_or_default().to_owned();
        let reply = if accept_login {
            format!("Response: Success\r\nActionID: {id}\r\nMessage: Authentication accepted\r\n\r\n")
        } else {
            format!("Response: Error\r\nActionID: {id}\r\nMessage: Authentication failed\r\n\r\n")
        };
        manager.send(&reply).await;
        manager
    }

    async fn send(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).await.unwrap();
    }

    async fn event(&mut self, headers: &[(&str, &str)]) {
        let mut text = String::new();
        for (k, v) in headers {
            text.push_str(&format!("{k}: {v}\r\n"));
        }
        text.push_str("\r\n");
        self.send(&text).await;
    }

    async fn coin_event(&mut self, channel: &str, disposition: &str) {
        self.event(&[
            ("Event", "CoinDisposition"),
            ("Privilege", "call,all"),
            ("Channel", channel),
            ("Disposition", disposition),
        ])
        .await;
    }

    async fn read_action(&mut self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return headers;
            }
            let line = line.trim_end();
            if line.is_empty() {
                if headers.is_empty() {
                    continue;
                }
                return headers;
            }
            if let Some((k, v)) = line.split_once(':') {
                headers.push((k.trim().to_owned(), v.trim().to_owned()));
            }
        }
    }

    /// Expect a Logoff (ignoring keep-alives) and say goodbye.
    async fn expect_logoff(&mut self) {
        loop {
            let action = self.read_action().await;
            match value(&action, "Action") {
                Some("Logoff") => break,
                Some(_) => continue,
                None => panic!("connection closed without Logoff"),
            }
        }
        self.send("Response: Goodbye\r\nMessage: Thanks for all the fish.\r\n\r\n")
            .await;
    }
}

fn value<'a>(headers: &'a [(String, String)], key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

async fn setup(fail: &[HardwareAction]) -> (TcpListener, DaemonConfig, Box<Latched<MockActuator>>, MockJournal) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = DaemonConfig {
        session: SessionOptions {
            port,
            username: "astcc".to_owned(),
            password: Some("c01n".to_owned()),
            ..SessionOptions::default()
        },
        resolver: ResolverConfig::default(),
        hardware: HardwareConfig::default(),
    };
    let mock = MockActuator::new(fail.iter().copied());
    let journal = mock.journal();
    (
        listener,
        config,
        Box::new(Latched::new(mock, Duration::ZERO)),
        journal,
    )
}

async fn wait_for_entries(journal: &MockJournal, n: usize) {
    timeout(WAIT, async {
        while journal.len() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("journal did not fill in time");
}

fn actuation(device: &str, action: HardwareAction) -> Actuation {
    Actuation {
        device: DeviceId::from(device),
        action,
    }
}

#[tokio::test]
async fn coin_return_dispatched_then_clean_shutdown() {
    let (listener, config, controller, journal) = setup(&[]).await;
    let shutdown = CancellationToken::new();
    let daemon = tokio::spawn(run_daemon(config, controller, shutdown.clone()));

    let mut manager = FakeManager::accept(&listener, true).await;
    manager
        .event(&[("Event", "Hangup"), ("Channel", "DAHDI/1-1")])
        .await;
    manager.coin_event("DAHDI/1-1", "CoinReturn").await;
    wait_for_entries(&journal, 1).await;

    shutdown.cancel();
    manager.expect_logoff().await;

    let result = timeout(WAIT, daemon).await.expect("daemon exits").unwrap();
    assert!(result.is_ok(), "clean shutdown: {result:?}");
    assert_eq!(
        journal.entries(),
        vec![actuation("DAHDI/1", HardwareAction::CoinReturn)]
    );
}

#[tokio::test]
async fn failing_collect_does_not_block_release() {
    let (listener, config, controller, journal) = setup(&[HardwareAction::CoinCollect]).await;
    let shutdown = CancellationToken::new();
    let daemon = tokio::spawn(run_daemon(config, controller, shutdown.clone()));

    let mut manager = FakeManager::accept(&listener, true).await;
    manager
        .coin_event("DAHDI/2-5", "CoinCollectOperatorReleased")
        .await;
    manager.coin_event("DAHDI/3-1", "OperatorAttached").await;
    wait_for_entries(&journal, 2).await;

    shutdown.cancel();
    manager.expect_logoff().await;
    timeout(WAIT, daemon).await.expect("daemon exits").unwrap().unwrap();

    assert_eq!(
        journal.entries(),
        vec![
            actuation("DAHDI/2", HardwareAction::OperatorReleased),
            actuation("DAHDI/3", HardwareAction::OperatorAttached),
        ]
    );
}

#[tokio::test]
async fn malformed_events_are_isolated() {
    let (listener, config, controller, journal) = setup(&[]).await;
    let shutdown = CancellationToken::new();
    let daemon = tokio::spawn(run_daemon(config, controller, shutdown.clone()));

    let mut manager = FakeManager::accept(&listener, true).await;
    manager.coin_event("DAHDI1", "CoinReturn").await;
    manager.coin_event("DAHDI/1-1", "CoinSomething").await;
    manager
        .event(&[("Event", "CoinDisposition"), ("Channel", "DAHDI/1-1")])
        .await;
    manager.coin_event("DAHDI/4-1", "CoinCollect").await;
    wait_for_entries(&journal, 1).await;

    shutdown.cancel();
    manager.expect_logoff().await;
    timeout(WAIT, daemon).await.expect("daemon exits").unwrap().unwrap();

    assert_eq!(
        journal.entries(),
        vec![actuation("DAHDI/4", HardwareAction::CoinCollect)]
    );
}

#[tokio::test]
async fn forced_disconnect_is_an_error() {
    let (listener, config, controller, journal) = setup(&[]).await;
    let shutdown = CancellationToken::new();
    let daemon = tokio::spawn(run_daemon(config, controller, shutdown));

    let manager = FakeManager::accept(&listener, true).await;
    drop(manager);

    let result = timeout(WAIT, daemon).await.expect("daemon exits").unwrap();
    match result {
        Err(DaemonError::ForcedDisconnect(reason)) => {
            assert!(!reason.is_empty());
        }
        other => panic!("expected forced disconnect, got: {other:?}"),
    }
    assert!(journal.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forced_disconnect_wins_over_closed_event_queue() {
    // Dropping the manager also closes the event queue, which ends the
    // dispatch worker; the daemon must still report the disconnect.
    for round in 0..10 {
        let (listener, config, controller, _journal) = setup(&[]).await;
        let daemon = tokio::spawn(run_daemon(config, controller, CancellationToken::new()));

        drop(FakeManager::accept(&listener, true).await);

        let result = timeout(WAIT, daemon).await.expect("daemon exits").unwrap();
        assert!(
            matches!(result, Err(DaemonError::ForcedDisconnect(_))),
            "round {round}: {result:?}"
        );
    }
}

#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    fn diagnostics(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .filter(|line| matches!(line.split_whitespace().next(), Some("WARN" | "ERROR")))
            .map(str::to_owned)
            .collect()
    }
}

#[tokio::test]
async fn forced_disconnect_yields_one_diagnostic() {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .without_time()
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (listener, config, controller, _journal) = setup(&[]).await;
    let manager = async {
        drop(FakeManager::accept(&listener, true).await);
    };
    let (result, ()) = tokio::join!(
        timeout(WAIT, run_daemon(config, controller, CancellationToken::new())),
        manager
    );

    // The daemon itself stays quiet; its caller prints the returned error.
    let err = result.expect("daemon exits").unwrap_err();
    assert!(matches!(err, DaemonError::ForcedDisconnect(_)), "{err:?}");
    assert_eq!(capture.diagnostics(), Vec::<String>::new());

    let message = err.to_string();
    assert!(message.starts_with("AMI was forcibly disconnected: "), "{message}");
    assert!(!message.contains('\n'));
}

#[tokio::test]
async fn rejected_login_fails_startup() {
    let (listener, config, controller, _journal) = setup(&[]).await;
    let daemon = tokio::spawn(run_daemon(config, controller, CancellationToken::new()));

    let _manager = FakeManager::accept(&listener, false).await;

    let result = timeout(WAIT, daemon).await.expect("daemon exits").unwrap();
    assert!(
        matches!(
            result,
            Err(DaemonError::Session(SessionError::Auth { .. }))
        ),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn unreachable_manager_fails_startup() {
    let (listener, config, controller, _journal) = setup(&[]).await;
    drop(listener);

    let result = run_daemon(config, controller, CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(DaemonError::Session(SessionError::Connection { .. }))
    ));
}
