use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use pgproto_query::Application;
use pgproto_server::{cli, demo, server, tls};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::try_init().ok();

    let args = cli::Args::parse();

    let tls_acceptor = match tls::build_acceptor(args.ssl_cert.as_deref(), args.ssl_key.as_deref()) {
        Ok(acceptor) => acceptor,
        Err(e) => {
            error!(error = %e, "failed to load TLS certificate/key");
            return ExitCode::FAILURE;
        }
    };

    let listener = match TcpListener::bind(args.socket_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, addr = %args.socket_addr(), "failed to bind listen address");
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %args.socket_addr(), max_clients = args.max_clients, "pgproto-server listening");

    let app: Arc<dyn Application> = Arc::new(demo::DemoApplication::default());
    let shutdown = signal::ctrl_c();
    server::run(listener, app, tls_acceptor, args.max_clients, shutdown).await;

    ExitCode::SUCCESS
}
