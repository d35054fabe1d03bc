// Criação e configuração de sockets de baixo nível
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::icmp::{self, decode_reply, encode_request};

/// Buffer de recepção; um Echo Reply nosso cabe com folga.
pub const RECV_BUFFER_SIZE: usize = 1024;

/// Menor timeout de leitura que o kernel ainda trata como prazo.
const MIN_READ_TIMEOUT: Duration = Duration::from_micros(1);

/// Erros que encerram o stream. Falhas locais (pacote inválido, identifier
/// de outro processo, erro de envio) viram perda, nunca `ProbeError`.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("não foi possível resolver '{host}': {source}")]
    Resolution {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error(
        "sem permissão para abrir socket RAW ICMP: {0}. Mensagens ICMP só podem ser \
         enviadas por processos root (ou com CAP_NET_RAW)"
    )]
    Permission(#[source] io::Error),
    #[error("falha ao associar o socket a {addr}: {source}")]
    Bind {
        addr: Ipv4Addr,
        #[source]
        source: io::Error,
    },
    #[error("falha ao criar socket RAW: {0}")]
    Socket(#[source] io::Error),
}

/// Uma troca Echo Request / Echo Reply.
///
/// `Ok(None)` é perda (timeout); `Err` é fatal.
pub trait Prober {
    fn probe(&mut self, seq: u16) -> Result<Option<Duration>, ProbeError>;
}

/// Identificador do processo, truncado para 16 bits (comum em pings).
pub fn process_ident() -> u16 {
    (std::process::id() & 0xFFFF) as u16
}

/// Resolve um host (IP literal ou nome) para o primeiro endereço IPv4.
pub fn resolve_ipv4(host: &str) -> Result<Ipv4Addr, ProbeError> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    let resolution = |source: io::Error| ProbeError::Resolution {
        host: host.to_string(),
        source,
    };
    let addrs = (host, 0).to_socket_addrs().map_err(resolution)?;
    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| {
            resolution(io::Error::new(
                io::ErrorKind::NotFound,
                "nenhum endereço IPv4 encontrado",
            ))
        })
}

/// Cria um socket ICMP RAW, distinguindo falta de privilégio dos demais erros.
pub fn open_socket() -> Result<Socket, ProbeError> {
    Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).map_err(classify_socket_error)
}

fn classify_socket_error(err: io::Error) -> ProbeError {
    match err.raw_os_error() {
        Some(libc::EPERM) | Some(libc::EACCES) => ProbeError::Permission(err),
        _ if err.kind() == io::ErrorKind::PermissionDenied => ProbeError::Permission(err),
        _ => ProbeError::Socket(err),
    }
}

/// Envia um Echo Request para `dst` (a porta é ignorada em ICMP).
pub fn send(sock: &Socket, dst: Ipv4Addr, ident: u16, seq: u16) -> io::Result<()> {
    let pkt = encode_request(ident, seq);
    let dst_sa = SockAddr::from(SocketAddrV4::new(dst, 0));
    sock.send_to(&pkt, &dst_sa)?;
    Ok(())
}

/// Aguarda o Echo Reply com `ident` dentro de `timeout`.
///
/// O orçamento é medido contra um prazo fixo: datagramas de outros processos
/// ou inválidos são descartados sem reiniciar a espera.
pub fn receive(sock: &mut Socket, ident: u16, timeout: Duration) -> Option<Duration> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        // socket2 trunca para microssegundos e SO_RCVTIMEO zero bloqueia para sempre
        if let Err(e) = sock.set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT))) {
            warn!(error = %e, "falha ao ajustar timeout de leitura");
            return None;
        }

        let n = match sock.read(&mut buf) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                warn!(error = %e, "erro na leitura");
                return None;
            }
        };
        let received_at = icmp::now_secs();

        match decode_reply(&buf[..n]) {
            Ok(reply) if reply.ident == ident => {
                let secs = (received_at - reply.sent_at).max(0.0);
                return Some(Duration::try_from_secs_f64(secs).unwrap_or_default());
            }
            Ok(reply) => debug!(ident = reply.ident, seq = reply.seq, "ignorando resposta alheia"),
            Err(e) => debug!(error = %e, bytes = n, "ignorando datagrama inválido"),
        }
    }
}

/// Transceptor ICMP: um socket novo por tentativa, fechado ao fim dela.
#[derive(Debug, Clone)]
pub struct Transceiver {
    source: Option<String>,
    destination: String,
    ident: u16,
    timeout: Duration,
}

impl Transceiver {
    /// `source` igual a `None` deixa a escolha do endereço de origem ao kernel.
    pub fn new(
        source: Option<String>,
        destination: impl Into<String>,
        ident: u16,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            destination: destination.into(),
            ident,
            timeout,
        }
    }

    fn open_bound(&self) -> Result<Socket, ProbeError> {
        let sock = open_socket()?;
        if let Some(ref source) = self.source {
            let addr = resolve_ipv4(source)?;
            sock.bind(&SockAddr::from(SocketAddrV4::new(addr, 0)))
                .map_err(|source| ProbeError::Bind { addr, source })?;
        }
        Ok(sock)
    }
}

impl Prober for Transceiver {
    fn probe(&mut self, seq: u16) -> Result<Option<Duration>, ProbeError> {
        let dst = resolve_ipv4(&self.destination)?;
        let mut sock = self.open_bound()?;

        if let Err(e) = send(&sock, dst, self.ident, seq) {
            // Falha de envio conta como perda; o socket cai com o escopo
            warn!(destination = %dst, seq, error = %e, "falha ao enviar");
            return Ok(None);
        }

        Ok(receive(&mut sock, self.ident, self.timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp::{IPV4_HEADER_SIZE, encode_request_at, now_secs};

    /// Socket UDP local: entrega datagramas sem exigir privilégios.
    fn udp_pair() -> (Socket, Socket, SockAddr) {
        let local = SockAddr::from(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
        let rx = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
        rx.bind(&local).unwrap();
        let addr = rx.local_addr().unwrap();
        let tx = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
        (rx, tx, addr)
    }

    fn fake_reply(ident: u16, sent_at: f64) -> Vec<u8> {
        let mut datagram = vec![0u8; IPV4_HEADER_SIZE];
        datagram[0] = 0x45;
        let mut icmp = encode_request_at(ident, 1, sent_at);
        icmp[0] = 0;
        datagram.extend_from_slice(&icmp);
        datagram
    }

    #[test]
    fn resolve_literal_and_localhost() {
        assert_eq!(resolve_ipv4("10.1.2.3").unwrap(), Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(resolve_ipv4("localhost").unwrap(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn resolve_failure_is_resolution_error() {
        let err = resolve_ipv4("does-not-exist.invalid").unwrap_err();
        assert!(matches!(err, ProbeError::Resolution { ref host, .. } if host == "does-not-exist.invalid"));
    }

    #[test]
    fn permission_errors_are_distinct() {
        let err = classify_socket_error(io::Error::from_raw_os_error(libc::EPERM));
        assert!(matches!(err, ProbeError::Permission(_)));
        assert!(err.to_string().contains("root"));
        let err = classify_socket_error(io::Error::from_raw_os_error(libc::EACCES));
        assert!(matches!(err, ProbeError::Permission(_)));
        let err = classify_socket_error(io::Error::from_raw_os_error(libc::EMFILE));
        assert!(matches!(err, ProbeError::Socket(_)));
    }

    #[test]
    fn ident_fits_16_bits() {
        assert_eq!(process_ident() as u32, std::process::id() & 0xFFFF);
    }

    #[test]
    fn receive_times_out_within_budget() {
        let (mut rx, _tx, _) = udp_pair();
        for ms in [0u64, 50, 200] {
            let timeout = Duration::from_millis(ms);
            let start = Instant::now();
            assert_eq!(receive(&mut rx, 7, timeout), None);
            assert!(start.elapsed() < timeout + Duration::from_millis(150));
        }
    }

    #[test]
    fn receive_with_sub_microsecond_budget_returns() {
        let (mut rx, _tx, _) = udp_pair();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            for ns in [1u64, 500, 900, 999] {
                let _ = done_tx.send(receive(&mut rx, 7, Duration::from_nanos(ns)));
            }
        });
        for _ in 0..4 {
            let result = done_rx.recv_timeout(Duration::from_secs(2));
            assert_eq!(result, Ok(None));
        }
    }

    #[test]
    fn receive_skips_foreign_and_invalid_datagrams() {
        let (mut rx, tx, addr) = udp_pair();
        tx.send_to(&fake_reply(999, now_secs()), &addr).unwrap();
        tx.send_to(b"garbage", &addr).unwrap();
        tx.send_to(&fake_reply(7, now_secs() - 0.05), &addr).unwrap();

        let delay = receive(&mut rx, 7, Duration::from_secs(2)).unwrap();
        assert!(delay >= Duration::from_millis(50));
        assert!(delay < Duration::from_secs(2));
    }

    #[test]
    fn foreign_datagrams_do_not_reset_budget() {
        let (mut rx, tx, addr) = udp_pair();
        let timeout = Duration::from_millis(300);
        let sender = std::thread::spawn(move || {
            for _ in 0..10 {
                let _ = tx.send_to(&fake_reply(999, now_secs()), &addr);
                std::thread::sleep(Duration::from_millis(50));
            }
        });

        let start = Instant::now();
        assert_eq!(receive(&mut rx, 7, timeout), None);
        assert!(start.elapsed() < timeout + Duration::from_millis(150));
        sender.join().unwrap();
    }

    #[test]
    #[ignore = "requer socket RAW (root ou CAP_NET_RAW)"]
    fn loopback_exchange() {
        let mut transceiver =
            Transceiver::new(None, "127.0.0.1", process_ident(), Duration::from_secs(2));
        let delay = transceiver.probe(1).unwrap();
        assert!(delay.is_some());
    }
}
