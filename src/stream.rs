use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::report::Reporter;
use crate::transceiver::Prober;

/// Resultado de uma tentativa. `delay` ausente é perda.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub pause: Duration,
    /// `None` roda até Ctrl+C ou erro fatal.
    pub limit: Option<u64>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pause: Duration::from_millis(100),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub attempts: u64,
    pub reported: u64,
}

/// Loop de medição: uma requisição pendente por vez, pausa entre tentativas.
pub struct PingStream<P: Prober, W: Write> {
    prober: P,
    reporter: Reporter<W>,
    config: StreamConfig,
    running: Arc<AtomicBool>,
}

impl<P: Prober, W: Write> PingStream<P, W> {
    pub fn new(prober: P, reporter: Reporter<W>, config: StreamConfig) -> Self {
        Self {
            prober,
            reporter,
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag compartilhada; `false` encerra o loop na próxima verificação.
    pub fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Roda até o limite, interrupção ou erro fatal de resolução/permissão.
    pub fn run(&mut self) -> Result<StreamSummary> {
        let mut summary = StreamSummary::default();
        info!(pause_ms = self.config.pause.as_millis() as u64, "iniciando stream");

        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if self.config.limit.is_some_and(|limit| summary.attempts >= limit) {
                break;
            }

            summary.attempts += 1;
            let seq = summary.attempts;
            let timestamp = Local::now();

            // O campo sequence do pacote tem 16 bits; o contador não
            let delay = self
                .prober
                .probe(seq as u16)
                .with_context(|| format!("tentativa {seq} falhou"))?;
            debug!(seq, delay_us = delay.map(|d| d.as_micros() as u64), "amostra");

            let sample = Sample {
                seq,
                timestamp,
                delay,
            };
            if self
                .reporter
                .report(&sample)
                .context("falha ao escrever resultado")?
            {
                summary.reported += 1;
            }

            // Sem pausa depois da última tentativa limitada
            if self.config.limit == Some(summary.attempts) {
                break;
            }
            std::thread::sleep(self.config.pause);
        }

        info!(attempts = summary.attempts, reported = summary.reported, "stream encerrado");
        Ok(summary)
    }

    pub fn into_reporter(self) -> Reporter<W> {
        self.reporter
    }
}
