use anyhow::{Context, Result};
use std::time::Duration;

use crate::stream::StreamConfig;

pub const USAGE: &str =
    "Uso: pingo <src-addr> <dest-addr> [timeout-msec] [threshold-msec] [pause-msec]";

pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_THRESHOLD_MS: f64 = 200.0;
pub const DEFAULT_PAUSE_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct PingArgs {
    /// Endereço de origem como digitado; `-` não associa o socket.
    pub src: String,
    pub dst: String,
    pub timeout: Duration,
    pub threshold_ms: f64,
    pub pause: Duration,
}

impl PingArgs {
    /// Endereço para bind, se houver.
    pub fn bind_source(&self) -> Option<String> {
        (self.src != "-").then(|| self.src.clone())
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            pause: self.pause,
            limit: None,
        }
    }
}

pub fn parse() -> Result<PingArgs> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse_from(&args)
}

/// Argumentos posicionais, sem flags.
pub fn parse_from<S: AsRef<str>>(args: &[S]) -> Result<PingArgs> {
    let mut args = args.iter().map(AsRef::as_ref);

    let src = args.next().context(USAGE)?.to_string();
    let dst = args.next().context(USAGE)?.to_string();

    let timeout_ms = match args.next() {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Valor inválido para timeout-msec: {v}"))?,
        None => DEFAULT_TIMEOUT_MS,
    };
    let threshold_ms = match args.next() {
        Some(v) => v
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite() && *t >= 0.0)
            .with_context(|| format!("Valor inválido para threshold-msec: {v}"))?,
        None => DEFAULT_THRESHOLD_MS,
    };
    let pause_ms = match args.next() {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Valor inválido para pause-msec: {v}"))?,
        None => DEFAULT_PAUSE_MS,
    };

    if let Some(extra) = args.next() {
        anyhow::bail!("Argumento inesperado: {extra}\n{USAGE}");
    }

    Ok(PingArgs {
        src,
        dst,
        timeout: Duration::from_millis(timeout_ms),
        threshold_ms,
        pause: Duration::from_millis(pause_ms),
    })
}
