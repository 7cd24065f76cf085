//! Accept loop: owns the listening socket, negotiates SSL/GSSAPI/cancel
//! requests ahead of the startup message, and hands each connection off
//! to [`crate::protocol::run`].

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use pgproto_common::{PgProtoError, ProtoError, SqlState};
use pgproto_query::Application;
use pgproto_wire::{decode_startup, BackendMessage, FramedConn, FrontendStartupMessage, ACCEPT_SSL, REJECT_ENCRYPTION};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::tls::MaybeTlsStream;

struct Listener {
    listener: TcpListener,
    app: Arc<dyn Application>,
    tls_acceptor: Option<TlsAcceptor>,
    max_clients: usize,
    active_clients: Arc<AtomicUsize>,
}

impl Listener {
    async fn run(&mut self) -> io::Result<()> {
        info!("accepting inbound connections");
        let conn_id = Arc::new(AtomicU32::new(1));

        loop {
            let (conn, addr) = self.listener.accept().await?;
            debug!(%addr, "accepted connection");

            let conn_id = conn_id.fetch_add(1, Ordering::SeqCst);
            let handler = Handler {
                app: self.app.clone(),
                tls_acceptor: self.tls_acceptor.clone(),
                active_clients: self.active_clients.clone(),
                max_clients: self.max_clients,
            };

            tokio::spawn(async move {
                if let Err(e) = handler.run(conn_id, conn).await {
                    error!(conn_id, error = %e, "connection ended with an error");
                }
            });
        }
    }
}

/// Keeps one slot reserved in `active_clients`, released on drop so every
/// exit path out of `Handler::serve` (including `?`) frees it.
struct ClientSlot(Arc<AtomicUsize>);

impl Drop for ClientSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Handler {
    app: Arc<dyn Application>,
    tls_acceptor: Option<TlsAcceptor>,
    active_clients: Arc<AtomicUsize>,
    max_clients: usize,
}

impl Handler {
    async fn run(&self, conn_id: u32, mut conn: TcpStream) -> pgproto_common::Result<()> {
        loop {
            match decode_startup(&mut conn).await? {
                FrontendStartupMessage::GssEncRequest => {
                    conn.write_all(&[REJECT_ENCRYPTION]).await?;
                }
                FrontendStartupMessage::CancelRequest { conn_id, .. } => {
                    debug!(conn_id, "ignoring cancel request: no in-flight query tracking");
                    return Ok(());
                }
                FrontendStartupMessage::SslRequest => {
                    if let Some(acceptor) = &self.tls_acceptor {
                        conn.write_all(&[ACCEPT_SSL]).await?;
                        let tls_stream = acceptor
                            .accept(conn)
                            .await
                            .map_err(|e| PgProtoError::Internal(e.to_string()))?;
                        let stream = MaybeTlsStream::Tls(Box::new(tls_stream));
                        return self.await_startup_and_serve(conn_id, stream).await;
                    }
                    conn.write_all(&[REJECT_ENCRYPTION]).await?;
                }
                FrontendStartupMessage::Startup { params, .. } => {
                    let stream = MaybeTlsStream::Plain(conn);
                    return self.serve(conn_id, stream, params).await;
                }
            }
        }
    }

    /// After a successful TLS upgrade the client resends `Startup` over
    /// the encrypted channel.
    async fn await_startup_and_serve(&self, conn_id: u32, mut stream: MaybeTlsStream) -> pgproto_common::Result<()> {
        match decode_startup(&mut stream).await? {
            FrontendStartupMessage::Startup { params, .. } => self.serve(conn_id, stream, params).await,
            other => {
                warn!(conn_id, message = ?other, "expected Startup right after TLS upgrade");
                Ok(())
            }
        }
    }

    async fn serve(
        &self,
        conn_id: u32,
        stream: MaybeTlsStream,
        params: HashMap<String, String>,
    ) -> pgproto_common::Result<()> {
        let is_tls = matches!(stream, MaybeTlsStream::Tls(_));
        let mut conn = FramedConn::new(stream);

        if self.app.must_use_encryption() && !is_tls {
            let err = ProtoError::fatal_with_code(SqlState::GENERIC, "SSL/TLS is required");
            conn.send(BackendMessage::from(err)).await?;
            conn.flush().await?;
            return Ok(());
        }

        let prior = self.active_clients.fetch_add(1, Ordering::SeqCst);
        let _slot = ClientSlot(self.active_clients.clone());
        if prior >= self.max_clients {
            let err = ProtoError::fatal_with_code(SqlState::GENERIC, "max number of clients reached");
            conn.send(BackendMessage::from(err)).await?;
            conn.flush().await?;
            return Ok(());
        }

        crate::protocol::run(self.app.clone(), conn_id, &mut conn, params).await
    }
}

pub async fn run(
    listener: TcpListener,
    app: Arc<dyn Application>,
    tls_acceptor: Option<TlsAcceptor>,
    max_clients: usize,
    shutdown: impl Future,
) {
    let mut server = Listener {
        listener,
        app,
        tls_acceptor,
        max_clients,
        active_clients: Arc::new(AtomicUsize::new(0)),
    };

    tokio::select! {
        res = server.run() => {
            if let Err(err) = res {
                error!(error = %err, "failed to accept");
            }
        }
        _ = shutdown => {
            info!("shutting down");
        }
    }

    info!("exit");
}
