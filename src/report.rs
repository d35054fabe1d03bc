use std::io::{self, Write};
use std::time::Duration;

use crate::stream::Sample;

/// Marcador de perda na coluna de threshold.
pub const LOST_MARKER: &str = "lost";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Escreve uma linha `;`-separada por amostra relevante: perdas sempre,
/// sucessos só quando o atraso atinge o threshold.
///
/// Números usam ponto decimal fixo com 4 casas, independente do locale.
pub struct Reporter<W: Write> {
    out: W,
    source: String,
    destination: String,
    timeout: Duration,
    threshold_ms: f64,
}

impl<W: Write> Reporter<W> {
    pub fn new(
        out: W,
        source: impl Into<String>,
        destination: impl Into<String>,
        timeout: Duration,
        threshold_ms: f64,
    ) -> Self {
        Self {
            out,
            source: source.into(),
            destination: destination.into(),
            timeout,
            threshold_ms,
        }
    }

    /// Devolve `true` se a amostra gerou uma linha.
    pub fn report(&mut self, sample: &Sample) -> io::Result<bool> {
        match self.format(sample) {
            Some(line) => {
                writeln!(self.out, "{line}")?;
                self.out.flush()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Linha da amostra, ou `None` se ficou abaixo do threshold.
    pub fn format(&self, sample: &Sample) -> Option<String> {
        let tail = match sample.delay {
            None => format!("{};{}", LOST_MARKER, self.timeout.as_millis()),
            Some(delay) => {
                let delay_ms = delay.as_secs_f64() * 1000.0;
                if delay_ms < self.threshold_ms {
                    return None;
                }
                format!("{:.4};{:.4}", self.threshold_ms, delay_ms)
            }
        };

        let epoch = sample.timestamp.timestamp_micros() as f64 / 1_000_000.0;
        Some(format!(
            "{};{:.4};{};{};{};{}",
            sample.timestamp.format(TIME_FORMAT),
            epoch,
            self.source,
            self.destination,
            sample.seq,
            tail
        ))
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn sample(seq: u64, delay_ms: Option<u64>) -> Sample {
        Sample {
            seq,
            timestamp: Local.timestamp_opt(1_700_000_000, 500_000_000).unwrap(),
            delay: delay_ms.map(Duration::from_millis),
        }
    }

    fn reporter() -> Reporter<Vec<u8>> {
        Reporter::new(Vec::new(), "-", "192.0.2.1", Duration::from_millis(2000), 200.0)
    }

    #[test]
    fn below_threshold_is_silent() {
        let mut r = reporter();
        assert!(!r.report(&sample(1, Some(150))).unwrap());
        assert!(r.into_inner().is_empty());
    }

    #[test]
    fn slow_sample_is_reported() {
        let mut r = reporter();
        assert!(r.report(&sample(4, Some(250))).unwrap());
        let out = String::from_utf8(r.into_inner()).unwrap();
        let fields: Vec<&str> = out.trim_end().split(';').collect();
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[1], "1700000000.5000");
        assert_eq!(&fields[2..], &["-", "192.0.2.1", "4", "200.0000", "250.0000"]);
    }

    #[test]
    fn exactly_threshold_is_reported() {
        let r = reporter();
        assert!(r.format(&sample(1, Some(200))).is_some());
    }

    #[test]
    fn loss_is_always_reported() {
        let mut r = Reporter::new(Vec::new(), "10.0.0.1", "10.0.0.2", Duration::from_millis(2000), 1e9);
        assert!(r.report(&sample(3, None)).unwrap());
        let out = String::from_utf8(r.into_inner()).unwrap();
        assert!(out.ends_with(";10.0.0.1;10.0.0.2;3;lost;2000\n"));
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn local_time_column() {
        let r = reporter();
        let s = sample(1, None);
        let line = r.format(&s).unwrap();
        let expected = s.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        assert!(line.starts_with(&format!("{expected};")));
    }
}
