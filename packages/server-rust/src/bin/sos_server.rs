//! `sos-server`: serves the dispatch core's bindings over HTTP.
//!
//! Only the built-in `GetCapabilities` operation is installed; embedders
//! register their own operators and codecs through `SosContext::builder`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use sos_core::{CodingRepository, TieBreak};
use sos_server::binding::SoapVersion;
use sos_server::context::SosContext;
use sos_server::network::{NetworkConfig, NetworkModule, TlsConfig};
use sos_server::service::{EventDelivery, ServiceConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TieBreakArg {
    /// First registered codec wins.
    First,
    /// Last registered codec wins.
    Latest,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SoapVersionArg {
    #[value(name = "1.1")]
    V11,
    #[value(name = "1.2")]
    V12,
}

#[derive(Debug, Parser)]
#[command(name = "sos-server", version, about = "OGC SOS dispatch server")]
struct Args {
    #[arg(long, env = "SOS_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "SOS_PORT", default_value_t = 8080)]
    port: u16,

    /// PEM certificate; serving TLS requires `--tls-key` too.
    #[arg(long, env = "SOS_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    #[arg(long, env = "SOS_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    #[arg(long = "cors-origin", env = "SOS_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    #[arg(long, env = "SOS_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    #[arg(long, env = "SOS_MAX_BODY_BYTES", default_value_t = 10 * 1024 * 1024)]
    max_body_bytes: usize,

    /// Public base URL of `/service`, advertised in capabilities.
    #[arg(long, env = "SOS_SERVICE_URL", default_value = "/service")]
    service_url: String,

    #[arg(long, env = "SOS_DEFAULT_SERVICE", default_value = "SOS")]
    default_service: String,

    #[arg(long, env = "SOS_TIE_BREAK", value_enum, default_value_t = TieBreakArg::First)]
    tie_break: TieBreakArg,

    /// Deliver events on this many background workers instead of inline.
    #[arg(long, env = "SOS_EVENT_WORKERS")]
    event_workers: Option<usize>,

    #[arg(long, env = "SOS_VALIDATE_SOAP_ACTION")]
    validate_soap_action: bool,

    #[arg(long, env = "SOS_SOAP_VERSION", value_enum, default_value_t = SoapVersionArg::V12)]
    soap_version: SoapVersionArg,

    /// Log as JSON lines.
    #[arg(long, env = "SOS_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            default_service: self.default_service.clone(),
            codec_tie_break: match self.tie_break {
                TieBreakArg::First => TieBreak::RegistrationOrder,
                TieBreakArg::Latest => TieBreak::LatestRegistration,
            },
            event_delivery: match self.event_workers {
                Some(workers) if workers > 0 => EventDelivery::Asynchronous { workers },
                _ => EventDelivery::Synchronous,
            },
            validate_soap_action: self.validate_soap_action,
            default_soap_version: match self.soap_version {
                SoapVersionArg::V11 => SoapVersion::Soap11,
                SoapVersionArg::V12 => SoapVersion::Soap12,
            },
            service_url: self.service_url.clone(),
            ..ServiceConfig::default()
        }
    }

    fn network_config(&self) -> NetworkConfig {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => None,
        };
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_request_body_bytes: self.max_body_bytes,
            ..NetworkConfig::default()
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let service_config = args.service_config();
    let codecs = Arc::new(CodingRepository::new(service_config.codec_tie_break));
    let context = SosContext::builder(service_config, codecs).build()?;

    #[cfg(unix)]
    spawn_reload_on_hangup(context.clone())?;

    let mut network = NetworkModule::new(args.network_config(), context);
    let port = network.start().await?;
    info!(port, "sos-server started");

    network
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "ctrl-c handler failed; shutting down");
            }
            info!("shutdown requested");
        })
        .await?;

    info!("sos-server stopped");
    Ok(())
}

/// SIGHUP rebuilds the codec snapshots.
#[cfg(unix)]
fn spawn_reload_on_hangup(context: SosContext) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            if let Err(e) = context.reload_codecs() {
                warn!(error = %e, "codec reload failed; keeping previous codecs");
            }
        }
    });
    Ok(())
}
