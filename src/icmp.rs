use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::checksum::checksum;

/// Echo Request ICMPv4.
pub const ECHO_REQUEST: u8 = 8;

/// Cabeçalho ICMP: type, code, checksum, identifier, sequence.
pub const HEADER_SIZE: usize = 8;

/// Largura do timestamp de envio embutido no payload (f64).
pub const TIMESTAMP_SIZE: usize = 8;

/// Payload fixo: timestamp + enchimento, 192 bytes como no ping histórico.
pub const PAYLOAD_SIZE: usize = 192;

/// Tamanho total do pacote enviado.
pub const PACKET_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE;

/// Cabeçalho IPv4 sem opções.
pub const IPV4_HEADER_SIZE: usize = 20;

const FILLER: u8 = b'Q';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagrama curto demais: {len} bytes, esperado pelo menos {needed}")]
    Truncated { len: usize, needed: usize },
    #[error("cabeçalho IP não é IPv4 (versão {0})")]
    NotIpv4(u8),
    #[error("comprimento de cabeçalho IPv4 inválido: {0} bytes")]
    BadHeaderLength(usize),
}

/// Visão decodificada de um Echo Reply recebido.
///
/// Type e code são lidos mas não validados; só o identifier decide se a
/// resposta é nossa.
#[derive(Debug, Clone, PartialEq)]
pub struct EchoReply {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub ident: u16,
    pub seq: u16,
    /// Segundos desde a época Unix, como escrito no request.
    pub sent_at: f64,
}

/// Tempo de parede atual em segundos desde a época Unix.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Monta um Echo Request com o instante atual embutido no payload.
pub fn encode_request(ident: u16, seq: u16) -> Vec<u8> {
    encode_request_at(ident, seq, now_secs())
}

/// Monta um Echo Request (type=8, code=0) com um timestamp de envio explícito.
pub fn encode_request_at(ident: u16, seq: u16, sent_at: f64) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(PACKET_SIZE);

    // Type=8, Code=0, checksum zerado durante o cálculo
    pkt.extend_from_slice(&[ECHO_REQUEST, 0, 0, 0]);
    pkt.extend_from_slice(&ident.to_be_bytes());
    pkt.extend_from_slice(&seq.to_be_bytes());

    pkt.extend_from_slice(&sent_at.to_be_bytes());
    pkt.resize(PACKET_SIZE, FILLER);

    let csum = checksum(&pkt);
    pkt[2..4].copy_from_slice(&csum.to_be_bytes());

    pkt
}

/// Decodifica um datagrama do socket RAW (cabeçalho IPv4 + ICMP).
pub fn decode_reply(datagram: &[u8]) -> Result<EchoReply, DecodeError> {
    let first = *datagram.first().ok_or(DecodeError::Truncated {
        len: 0,
        needed: IPV4_HEADER_SIZE + HEADER_SIZE + TIMESTAMP_SIZE,
    })?;

    let version = first >> 4;
    if version != 4 {
        return Err(DecodeError::NotIpv4(version));
    }
    let ihl = (first & 0x0F) as usize * 4;
    if ihl < IPV4_HEADER_SIZE {
        return Err(DecodeError::BadHeaderLength(ihl));
    }

    decode_icmp(datagram, ihl)
}

fn decode_icmp(datagram: &[u8], start: usize) -> Result<EchoReply, DecodeError> {
    let needed = start + HEADER_SIZE + TIMESTAMP_SIZE;
    if datagram.len() < needed {
        return Err(DecodeError::Truncated {
            len: datagram.len(),
            needed,
        });
    }

    let icmp = &datagram[start..];
    let mut stamp = [0u8; TIMESTAMP_SIZE];
    stamp.copy_from_slice(&icmp[HEADER_SIZE..HEADER_SIZE + TIMESTAMP_SIZE]);

    Ok(EchoReply {
        icmp_type: icmp[0],
        code: icmp[1],
        checksum: u16::from_be_bytes([icmp[2], icmp[3]]),
        ident: u16::from_be_bytes([icmp[4], icmp[5]]),
        seq: u16::from_be_bytes([icmp[6], icmp[7]]),
        sent_at: f64::from_be_bytes(stamp),
    })
}
