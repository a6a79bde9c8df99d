//! Net Agent - Entry Point

use net_agent::{AgentConfig, AgentServer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        fmt().with_env_filter(filter).with_ansi(false).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    info!("Net Agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::from_env()?;
    let server = AgentServer::from_config(config).await?;
    server.run().await?;

    Ok(())
}

fn print_help() {
    println!("Net Agent v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: net-agent [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --help, -h   Show this help");
    println!();
    println!("Environment variables:");
    println!("  PORT                     Listening port (default: 9999)");
    println!("  BIND_ADDR                Listening address (default: 0.0.0.0)");
    println!("  QBT_URL                  qBittorrent WebUI URL (default: http://localhost:8080)");
    println!("  ALLOW_SELF_SIGNED_CERTS  'true' to skip TLS verification for QBT_URL");
    println!("  EXEC_TIMEOUT_SECS        Deadline for /exec commands (default: 60)");
    println!("  IP_LOOKUP_URL            IP geolocation endpoint (default: https://ipinfo.io/json)");
    println!("  RESOLV_CONF              Resolver config path (default: /etc/resolv.conf)");
    println!("  SPEEDTEST_BIN            Speed test executable (default: speedtest)");
    println!("  IP_BIN                   Interface lister executable (default: ip)");
    println!("  RUST_LOG                 Log filter (default: info)");
    println!("  LOG_FORMAT               'json' for JSON log lines");
}
