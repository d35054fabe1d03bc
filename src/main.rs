// Tratamento de erros ergonômico
use anyhow::{Context, Result};

use std::sync::atomic::Ordering;

use pingo::transceiver::process_ident;
use pingo::{PingStream, Reporter, Transceiver, args};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Stream contínuo de pings; imprime só perdas e atrasos acima do threshold.
/// Requer privilégios de root (ou CAP_NET_RAW) para o socket RAW.
fn main() -> Result<()> {
    // Logs vão para stderr; stdout fica só com os registros
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,pingo=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = args::parse()?;
    let ident = process_ident();

    let transceiver = Transceiver::new(args.bind_source(), args.dst.clone(), ident, args.timeout);
    let reporter = Reporter::new(
        std::io::stdout(),
        args.src.clone(),
        args.dst.clone(),
        args.timeout,
        args.threshold_ms,
    );
    let mut stream = PingStream::new(transceiver, reporter, args.stream_config());

    // Ctrl+C encerra o loop na próxima verificação
    let running = stream.running();
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Erro ao configurar handler de Ctrl+C")?;

    tracing::info!(
        src = %args.src,
        dst = %args.dst,
        ident,
        timeout_ms = args.timeout.as_millis() as u64,
        threshold_ms = args.threshold_ms,
        "pingo"
    );

    // Erro fatal: anyhow imprime o diagnóstico no stderr e o processo sai com 1
    stream.run()?;
    Ok(())
}
