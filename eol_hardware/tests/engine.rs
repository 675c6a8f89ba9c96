use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eol_hardware::engine::{CommandRequest, CommandResponseEngine};
use eol_hardware::error::{HwError, Result};
use eol_hardware::protocol::encode;
use eol_hardware::transport::Transport;
use parking_lot::Mutex;
use rstest::rstest;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Clear,
    Write(Vec<u8>),
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<(Duration, Vec<u8>)> + Send>;

/// Answers each write with scripted frames at scripted delays.
struct ScriptedTransport {
    log: Arc<Mutex<Vec<Event>>>,
    respond: Responder,
    inbox: VecDeque<(Instant, Vec<u8>)>,
}

impl ScriptedTransport {
    fn new(respond: impl FnMut(&[u8]) -> Vec<(Duration, Vec<u8>)> + Send + 'static) -> (Self, Arc<Mutex<Vec<Event>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                log: Arc::clone(&log),
                respond: Box::new(respond),
                inbox: VecDeque::new(),
            },
            log,
        )
    }

    fn silent() -> (Self, Arc<Mutex<Vec<Event>>>) {
        Self::new(|_| Vec::new())
    }

    fn arriving(mut self, after: Duration, bytes: Vec<u8>) -> Self {
        self.inbox.push_back((Instant::now() + after, bytes));
        self
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.log.lock().push(Event::Write(bytes.to_vec()));
        let now = Instant::now();
        for (delay, reply) in (self.respond)(bytes) {
            self.inbox.push_back((now + delay, reply));
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(at) = self.inbox.front().map(|(at, _)| *at) else {
            std::future::pending::<()>().await;
            unreachable!()
        };
        tokio::time::sleep_until(at).await;
        let (_, bytes) = self.inbox.pop_front().unwrap();
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    async fn clear_input(&mut self) -> Result<usize> {
        self.log.lock().push(Event::Clear);
        let now = Instant::now();
        let before = self.inbox.len();
        self.inbox.retain(|(at, _)| *at > now);
        Ok(before - self.inbox.len())
    }
}

fn frame(code: u8, payload: &[u8]) -> Vec<u8> {
    encode(code, payload).unwrap()
}

fn writes(log: &[Event]) -> usize {
    log.iter().filter(|e| matches!(e, Event::Write(_))).count()
}

fn assert_clear_before_every_write(log: &[Event]) {
    for (i, e) in log.iter().enumerate() {
        if matches!(e, Event::Write(_)) {
            assert!(i > 0 && log[i - 1] == Event::Clear, "write #{i} not preceded by a clear: {log:?}");
        }
    }
}

#[rstest]
#[case(1, 1)]
#[case(3, 3)]
#[case(5, 5)]
#[case(0, 1)]
#[tokio::test(start_paused = true)]
async fn silent_device_exhausts_exact_attempts(#[case] retry_count: u32, #[case] expected_writes: usize) {
    let (transport, log) = ScriptedTransport::silent();
    let mut engine = CommandResponseEngine::new(transport);
    let req = CommandRequest::new(0x07, [])
        .expect(0x07)
        .timeout(Duration::from_millis(100))
        .retries(retry_count);

    match engine.send(&req).await {
        Err(HwError::CommunicationTimeout { code, attempts }) => {
            assert_eq!(code, 0x07);
            assert_eq!(attempts as usize, expected_writes);
        }
        other => panic!("expected CommunicationTimeout, got {other:?}"),
    }
    let log = log.lock();
    assert_eq!(writes(&log), expected_writes);
    assert_clear_before_every_write(&log);
    assert!(!engine.interrupted());
}

#[tokio::test(start_paused = true)]
async fn ack_then_long_terminal_status_succeeds() {
    let (transport, log) = ScriptedTransport::new(|_| {
        vec![
            (Duration::from_millis(20), frame(0x04, &[])),
            (Duration::from_secs(30), frame(0x0B, &[])),
        ]
    });
    let mut engine = CommandResponseEngine::new(transport);
    let req = CommandRequest::new(0x04, vec![0u8; 12])
        .expect(0x04)
        .then(0x0B, Duration::from_secs(60))
        .timeout(Duration::from_secs(5));

    let started = Instant::now();
    let set = engine.send(&req).await.unwrap();
    let codes: Vec<u8> = set.frames.iter().map(|f| f.code).collect();
    assert_eq!(codes, vec![0x04, 0x0B]);
    assert_eq!(set.ack().unwrap().code, 0x04);
    assert_eq!(set.terminal().unwrap().code, 0x0B);
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(writes(&log.lock()), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_terminal_status_retries_from_the_top() {
    let mut calls = 0;
    let (transport, log) = ScriptedTransport::new(move |_| {
        calls += 1;
        if calls == 1 {
            vec![(Duration::from_millis(5), frame(0x08, &[]))]
        } else {
            vec![
                (Duration::from_millis(5), frame(0x08, &[])),
                (Duration::from_millis(50), frame(0x0C, &[])),
            ]
        }
    });
    let mut engine = CommandResponseEngine::new(transport);
    let req = CommandRequest::new(0x08, [])
        .expect(0x08)
        .then(0x0C, Duration::from_secs(1))
        .timeout(Duration::from_millis(200))
        .retries(3);

    let set = engine.send(&req).await.unwrap();
    assert_eq!(set.terminal().unwrap().code, 0x0C);
    let log = log.lock();
    assert_eq!(writes(&log), 2);
    assert_clear_before_every_write(&log);
}

#[tokio::test(start_paused = true)]
async fn unexpected_codes_are_discarded() {
    let (transport, _log) = ScriptedTransport::new(|_| {
        vec![
            (Duration::from_millis(1), frame(0x09, &[])),
            (Duration::from_millis(2), frame(0x0A, &[1, 2])),
            (Duration::from_millis(3), frame(0x07, &[0x02, 0x0B])),
        ]
    });
    let mut engine = CommandResponseEngine::new(transport);
    let req = CommandRequest::new(0x07, []).expect(0x07);
    let set = engine.send(&req).await.unwrap();
    assert_eq!(set.frames.len(), 1);
    assert_eq!(set.frames[0].payload, vec![0x02, 0x0B]);
}

#[tokio::test(start_paused = true)]
async fn resyncs_past_noise_and_split_reads() {
    let reply = frame(0x05, &[]);
    let (head, tail) = reply.split_at(3);
    let mut noisy = vec![0x00, 0x13, 0xFE, 0x42];
    noisy.extend_from_slice(head);
    let tail = tail.to_vec();
    let (transport, _log) = ScriptedTransport::new(move |_| {
        vec![
            (Duration::from_millis(1), noisy.clone()),
            (Duration::from_millis(2), tail.clone()),
        ]
    });
    let mut engine = CommandResponseEngine::new(transport);
    let set = engine.send(&CommandRequest::new(0x05, [0x02, 0x0B]).expect(0x05)).await.unwrap();
    assert_eq!(set.terminal().unwrap().code, 0x05);
    assert!(engine.discarded() >= 4);
}

#[tokio::test(start_paused = true)]
async fn dropped_exchange_is_marked_and_next_send_recovers() {
    let mut calls = 0;
    let (transport, log) = ScriptedTransport::new(move |_| {
        calls += 1;
        if calls == 1 {
            // Late answer to the abandoned request.
            vec![(Duration::from_millis(80), frame(0x07, &[0, 1]))]
        } else {
            vec![(Duration::from_millis(5), frame(0x07, &[0, 2]))]
        }
    });
    let mut engine = CommandResponseEngine::new(transport);
    let req = CommandRequest::new(0x07, []).expect(0x07).timeout(Duration::from_secs(1));

    let abandoned = tokio::time::timeout(Duration::from_millis(50), engine.send(&req)).await;
    assert!(abandoned.is_err());
    assert!(engine.interrupted());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let set = engine.send(&req).await.unwrap();
    assert_eq!(set.terminal().unwrap().payload, vec![0, 2]);
    assert!(!engine.interrupted());
    assert_clear_before_every_write(&log.lock());
}

#[tokio::test(start_paused = true)]
async fn listen_waits_for_unsolicited_frame() {
    let (transport, log) = ScriptedTransport::silent();
    let transport = transport
        .arriving(Duration::from_millis(10), frame(0x09, &[]))
        .arriving(Duration::from_secs(2), frame(0x00, &[]));
    let mut engine = CommandResponseEngine::new(transport);

    let boot = engine.listen(0x00, Duration::from_secs(30)).await.unwrap();
    assert_eq!(boot.code, 0x00);
    assert!(log.lock().is_empty(), "listening must not write or clear");
}

#[tokio::test(start_paused = true)]
async fn listen_times_out() {
    let (transport, _log) = ScriptedTransport::silent();
    let mut engine = CommandResponseEngine::new(transport);
    match engine.listen(0x00, Duration::from_secs(1)).await {
        Err(HwError::CommunicationTimeout { code: 0x00, attempts: 1 }) => {}
        other => panic!("expected CommunicationTimeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn write_only_request_returns_empty_set() {
    let (transport, log) = ScriptedTransport::silent();
    let mut engine = CommandResponseEngine::new(transport);
    let set = engine.send(&CommandRequest::new(0x03, [5])).await.unwrap();
    assert!(set.frames.is_empty());
    assert_eq!(*log.lock(), vec![Event::Clear, Event::Write(frame(0x03, &[5]))]);
}
