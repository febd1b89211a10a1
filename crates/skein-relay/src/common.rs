use std::net::SocketAddr;
use std::time::Instant;

use skein_transport::TransportConfig;

/// Run `stop` once Ctrl+C arrives.
pub fn on_ctrlc(stop: impl FnOnce() + Send + 'static) {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        eprintln!("\nCtrl+C received, shutting down...");
        stop();
    });
}

/// Transport settings shared by both subcommands.
pub fn transport_config(addr: SocketAddr, password: &str, salt: &str) -> TransportConfig {
    TransportConfig::new(addr)
        .password(password.as_bytes())
        .salt(salt.as_bytes())
}

/// Elapsed seconds since `start`.
pub fn elapsed_s(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}
