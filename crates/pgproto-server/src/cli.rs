use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pgproto-server", about = "PostgreSQL wire-protocol frontend for a pluggable query backend")]
pub struct Args {
    /// Address to listen on
    #[arg(long = "listen-addr", default_value = "127.0.0.1")]
    pub listen_addr: String,

    /// Port to listen on
    #[arg(long = "port", default_value_t = 6432)]
    pub port: u16,

    /// TLS certificate (PEM) to offer when a client sends an SSLRequest
    #[arg(long = "ssl-cert", requires = "ssl_key")]
    pub ssl_cert: Option<PathBuf>,

    /// TLS private key (PEM) matching `--ssl-cert`
    #[arg(long = "ssl-key", requires = "ssl_cert")]
    pub ssl_key: Option<PathBuf>,

    /// Maximum number of concurrently connected clients
    #[arg(long = "max-clients", default_value_t = 100)]
    pub max_clients: usize,
}

impl Args {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }
}
