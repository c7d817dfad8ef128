//! Full cycle against a real UDP socket standing in for the collector.

use std::collections::HashSet;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use engine_statsd::metrics::names;
use engine_statsd::statsd::encoder::parse_line;
use engine_statsd::{MetricKind, MetricValue, StatLogger, StatsdConfig, StatsdStatLogger};

fn collector() -> (UdpSocket, u16) {
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let port = sock.local_addr().unwrap().port();
    (sock, port)
}

/// Read datagrams until `expected` lines arrived or the socket times out.
fn receive_lines(sock: &UdpSocket, expected: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut buf = [0u8; 65_536];
    while lines.len() < expected {
        let Ok(n) = sock.recv(&mut buf) else { break };
        let payload = std::str::from_utf8(&buf[..n]).unwrap();
        lines.extend(payload.split('\n').map(str::to_owned));
    }
    lines
}

#[test]
fn one_cycle_reaches_the_collector() {
    let (sock, port) = collector();
    let config = StatsdConfig::new("localhost").with_port(port);
    let mut logger = StatsdStatLogger::new(&config, vec![0]).unwrap();
    let recorder = logger.recorder();

    recorder.record(names::NUM_REQUESTS_RUNNING, MetricValue::Gauge(3.0));
    recorder.record(names::PROMPT_TOKENS, MetricValue::Counter(128.0));
    std::thread::spawn(move || {
        recorder.record(
            names::TIME_TO_FIRST_TOKEN,
            MetricValue::Timer(Duration::from_millis(42)),
        );
    })
    .join()
    .unwrap();

    logger.log();

    let lines: HashSet<String> = receive_lines(&sock, 3).into_iter().collect();
    let expected: HashSet<String> = [
        "vllm.num_requests_running:3|g",
        "vllm.prompt_tokens:128|c",
        "vllm.time_to_first_token_seconds:42|ms",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();
    assert_eq!(lines, expected);
}

#[test]
fn wire_lines_parse_back_to_recorded_values() {
    let (sock, port) = collector();
    let config = StatsdConfig::new("127.0.0.1").with_port(port);
    let mut logger = StatsdStatLogger::new(&config, vec![0]).unwrap();
    let reg = logger.recorder();

    reg.registry().set_gauge("kv_cache_usage_perc", 12.5);
    reg.registry().increment_counter("generation_tokens", 7.0);
    reg.registry().observe_timer("request_queue_time_seconds", Duration::from_micros(2_500));
    reg.registry().observe_timer("request_queue_time_seconds", Duration::from_millis(3));

    let report = logger.report();
    assert_eq!(report.lines, 4);
    assert!(report.send.is_complete());

    let mut parsed: Vec<(String, MetricKind, f64)> = receive_lines(&sock, 4)
        .iter()
        .map(|l| parse_line(l).expect("collector-readable line"))
        .collect();
    parsed.sort_by(|a, b| a.0.cmp(&b.0).then(a.2.total_cmp(&b.2)));

    assert_eq!(
        parsed,
        vec![
            ("vllm.generation_tokens".to_owned(), MetricKind::Counter, 7.0),
            ("vllm.kv_cache_usage_perc".to_owned(), MetricKind::Gauge, 12.5),
            ("vllm.request_queue_time_seconds".to_owned(), MetricKind::Timer, 2.5),
            ("vllm.request_queue_time_seconds".to_owned(), MetricKind::Timer, 3.0),
        ]
    );
}

#[test]
fn large_batches_are_split_into_bounded_datagrams() {
    let (sock, port) = collector();
    let mut config = StatsdConfig::new("127.0.0.1").with_port(port);
    config.max_payload_bytes = 128;
    let mut logger = StatsdStatLogger::new(&config, vec![0]).unwrap();

    for i in 0..40 {
        logger
            .recorder()
            .registry()
            .observe_timer(names::INTER_TOKEN_LATENCY, Duration::from_millis(i));
    }
    let report = logger.report();
    assert_eq!(report.lines, 40);
    assert!(report.send.payloads_sent > 1);

    let mut buf = [0u8; 65_536];
    let mut received = 0;
    for _ in 0..report.send.payloads_sent {
        let n = sock.recv(&mut buf).unwrap();
        assert!(n <= 128);
        received += std::str::from_utf8(&buf[..n]).unwrap().split('\n').count();
    }
    assert_eq!(received, 40);
}

#[test]
fn dead_collector_does_not_stall_the_cycle() {
    // Bind then drop: nothing listens on the port any more
    let port = {
        let (sock, port) = collector();
        drop(sock);
        port
    };
    let config = StatsdConfig::new("127.0.0.1").with_port(port);
    let mut logger = StatsdStatLogger::new(&config, vec![0]).unwrap();

    for cycle in 0..5 {
        logger
            .recorder()
            .registry()
            .set_gauge(names::NUM_REQUESTS_WAITING, cycle as f64);
        let start = Instant::now();
        logger.log();
        assert!(start.elapsed() <= Duration::from_millis(50));
    }
    assert_eq!(logger.cycles(), 5);
}
