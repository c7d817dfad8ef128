//! Fire-and-forget transport for encoded batches.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::encoder;
use super::throttle::LogThrottle;
use crate::config::StatsdConfig;
use crate::error::{Result, StatsdError};

/// What happened to one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOutcome {
    pub payloads_sent: usize,
    pub payloads_dropped: usize,
    pub bytes_sent: usize,
}

impl SendOutcome {
    pub fn is_complete(&self) -> bool {
        self.payloads_dropped == 0
    }
}

/// Destination for encoded StatsD lines.
///
/// `send` must not block beyond a short bound and must not fail: a batch
/// that cannot be delivered is reported as dropped.
pub trait Emitter: Send {
    fn name(&self) -> &'static str;

    fn send(&self, lines: &[String]) -> SendOutcome;
}

// ─── UDP ─────────────────────────────────────────────────────────

/// Resolved collector address and the socket bound for its family.
struct Link {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Link {
    fn open(host: &str, port: u16, send_timeout: Duration) -> Result<Self> {
        let target = resolve(host, port)?;

        let bind_addr: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_write_timeout(Some(send_timeout))?;

        Ok(Self { socket, target })
    }
}

/// Sends newline-joined lines as UDP datagrams.
///
/// A host that does not resolve yet is not fatal: the emitter starts without
/// a link, drops every batch, and retries resolution at most once per
/// `error_log_interval`. The socket is closed when the emitter drops.
pub struct UdpEmitter {
    host: String,
    port: u16,
    send_timeout: Duration,
    max_payload_bytes: usize,
    link: Mutex<Option<Link>>,
    resolve_attempts: LogThrottle,
    failures: LogThrottle,
    total_dropped: AtomicU64,
}

impl UdpEmitter {
    /// Validate the config and try to reach the collector. Only a malformed
    /// config is an error here.
    pub fn connect(config: &StatsdConfig) -> Result<Self> {
        config.validate()?;

        let emitter = Self {
            host: config.host.clone(),
            port: config.port,
            send_timeout: config.send_timeout(),
            max_payload_bytes: config.max_payload_bytes,
            link: Mutex::new(None),
            resolve_attempts: LogThrottle::new(config.error_log_interval()),
            failures: LogThrottle::new(config.error_log_interval()),
            total_dropped: AtomicU64::new(0),
        };

        // Starts the retry interval whether or not this attempt succeeds
        let _ = emitter.resolve_attempts.check();
        match Link::open(&emitter.host, emitter.port, emitter.send_timeout) {
            Ok(link) => {
                tracing::info!(
                    host = %config.host,
                    addr = %link.target,
                    max_payload_bytes = config.max_payload_bytes,
                    "statsd emitter ready"
                );
                *emitter.link.lock() = Some(link);
            }
            Err(err @ StatsdError::Resolve { .. }) => {
                tracing::warn!(
                    host = %config.host,
                    port = config.port,
                    error = %err,
                    "statsd host did not resolve, metrics are dropped until it does"
                );
            }
            Err(err) => return Err(err),
        }

        Ok(emitter)
    }

    /// Collector address, once resolved.
    pub fn target(&self) -> Option<SocketAddr> {
        self.link.lock().as_ref().map(|link| link.target)
    }

    /// Payloads dropped over the emitter's lifetime.
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    /// Retry resolution if the throttle allows it.
    fn relink(&self, link: &mut Option<Link>) {
        if self.resolve_attempts.check().is_none() {
            return;
        }
        match Link::open(&self.host, self.port, self.send_timeout) {
            Ok(new) => {
                tracing::info!(host = %self.host, addr = %new.target, "statsd host resolved");
                *link = Some(new);
            }
            Err(err) => tracing::debug!(host = %self.host, error = %err, "statsd host still unresolved"),
        }
    }

    fn report_failure(&self, dropped: usize, payload_len: usize, err: &dyn fmt::Display) {
        self.total_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
        if let Some(suppressed) = self.failures.check() {
            tracing::warn!(
                host = %self.host,
                port = self.port,
                payload_len,
                suppressed,
                error = %err,
                "statsd send failed, dropping metrics"
            );
        }
    }
}

impl Emitter for UdpEmitter {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn send(&self, lines: &[String]) -> SendOutcome {
        let mut outcome = SendOutcome::default();
        let payloads = encoder::pack(lines, self.max_payload_bytes);
        if payloads.is_empty() {
            return outcome;
        }

        let mut link = self.link.lock();
        if link.is_none() {
            self.relink(&mut link);
        }
        let Some(link) = link.as_ref() else {
            outcome.payloads_dropped = payloads.len();
            let bytes = payloads.iter().map(Vec::len).sum();
            self.report_failure(payloads.len(), bytes, &"collector address unresolved");
            return outcome;
        };

        for payload in payloads {
            match link.socket.send_to(&payload, link.target) {
                Ok(n) => {
                    outcome.payloads_sent += 1;
                    outcome.bytes_sent += n;
                }
                Err(err) => {
                    outcome.payloads_dropped += 1;
                    self.report_failure(1, payload.len(), &err);
                }
            }
        }

        outcome
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| StatsdError::Resolve {
            host: host.to_owned(),
            source,
        })?
        .collect();

    // Collectors usually listen on IPv4 only
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| StatsdError::Resolve {
            host: host.to_owned(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn collector() -> (UdpSocket, StatsdConfig) {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let port = sock.local_addr().unwrap().port();
        (sock, StatsdConfig::new("127.0.0.1").with_port(port))
    }

    #[test]
    fn delivers_lines_as_one_datagram() {
        let (sock, cfg) = collector();
        let emitter = UdpEmitter::connect(&cfg).unwrap();

        let lines = vec!["vllm.a:1|g".to_owned(), "vllm.b:2|c".to_owned()];
        let outcome = emitter.send(&lines);
        assert_eq!(outcome.payloads_sent, 1);
        assert!(outcome.is_complete());

        let mut buf = [0u8; 1024];
        let n = sock.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"vllm.a:1|g\nvllm.b:2|c");
    }

    #[test]
    fn oversized_datagram_is_dropped_not_raised() {
        let (_sock, cfg) = collector();
        let emitter = UdpEmitter::connect(&cfg).unwrap();

        // Larger than any UDP datagram can be
        let huge = format!("vllm.{}:1|g", "x".repeat(70_000));
        let outcome = emitter.send(&[huge, "vllm.ok:1|g".to_owned()]);

        assert_eq!(outcome.payloads_dropped, 1);
        assert_eq!(outcome.payloads_sent, 1);
        assert_eq!(emitter.total_dropped(), 1);
    }

    #[test]
    fn unreachable_collector_returns_quickly() {
        // TEST-NET-1, nothing listens there
        let cfg = StatsdConfig::new("192.0.2.1");
        let emitter = UdpEmitter::connect(&cfg).unwrap();

        let lines: Vec<String> = (0..50).map(|i| format!("vllm.m{i}:1|c")).collect();
        let start = Instant::now();
        let _ = emitter.send(&lines);
        assert!(start.elapsed() <= Duration::from_millis(50));
    }

    #[test]
    fn unresolvable_host_drops_instead_of_failing() {
        let cfg = StatsdConfig::new("statsd-collector.invalid");
        let emitter = UdpEmitter::connect(&cfg).unwrap();
        assert!(emitter.target().is_none());

        let lines = vec!["vllm.a:1|g".to_owned(), "vllm.b:2|c".to_owned()];
        let outcome = emitter.send(&lines);
        assert_eq!(outcome.payloads_sent, 0);
        assert!(outcome.payloads_dropped > 0);
        assert_eq!(emitter.total_dropped(), outcome.payloads_dropped as u64);

        // Next retry waits for the interval, so this send does no lookup
        let start = Instant::now();
        assert!(!emitter.send(&lines).is_complete());
        assert!(start.elapsed() <= Duration::from_millis(50));
    }

    #[test]
    fn malformed_config_is_still_an_error() {
        let cfg = StatsdConfig::new("localhost").with_port(0);
        assert!(matches!(UdpEmitter::connect(&cfg), Err(StatsdError::Config(_))));
    }
}
