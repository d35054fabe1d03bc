//! Medição contínua de latência ICMP entre dois pontos, reportando só
//! perdas e amostras acima de um threshold.

pub mod args;
pub mod checksum;
pub mod icmp;
pub mod report;
pub mod stream;
pub mod transceiver;

pub use report::Reporter;
pub use stream::{PingStream, Sample, StreamConfig, StreamSummary};
pub use transceiver::{ProbeError, Prober, Transceiver};
