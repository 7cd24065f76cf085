//! Drives a single connection from `AuthenticationOk` through the
//! simple/extended query command loop until the client disconnects.

use std::collections::HashMap;
use std::sync::Arc;

use pgproto_common::{ProtoError, Result, SqlState};
use pgproto_query::{execute_query, Application, QueryResult};
use pgproto_session::{PortalResult, Session};
use pgproto_wire::{BackendMessage, ColumnDescriptor, FramedConn, FrontendMessage, ObjectKind};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument, warn};

/// The fixed `ParameterStatus` set announced right after authentication,
/// in order. `application_name` is appended separately since it's the one
/// entry the application can override.
const BOOTSTRAP_PARAMETERS: &[(&str, &str)] = &[
    ("server_version", "130000"),
    ("server_encoding", "UTF8"),
    ("client_encoding", "UTF8"),
    ("is_superuser", "off"),
    ("session_authorization", "off"),
    ("DateStyle", "ISO, MDY"),
    ("IntervalStyle", "postgres"),
    ("TimeZone", "GMT"),
    ("integer_datetimes", "on"),
    ("standard_conforming_strings", "on"),
];

#[instrument(skip(app, conn, startup_params))]
pub async fn run<A>(
    app: Arc<dyn Application>,
    conn_id: u32,
    conn: &mut FramedConn<A>,
    startup_params: HashMap<String, String>,
) -> Result<()>
where
    A: AsyncRead + AsyncWrite + Send + Sync + Unpin,
{
    let user = startup_params.get("user").cloned().unwrap_or_default();
    let database = startup_params.get("database").cloned();

    if app.is_authentication_needed(&user, database.as_deref()).await {
        conn.send(BackendMessage::AuthenticationCleartextPassword).await?;
        conn.flush().await?;
        let password = match conn.recv().await? {
            Some(FrontendMessage::PasswordMessage { password }) => password,
            _ => String::new(),
        };
        if !app.authenticate(&user, &password, database.as_deref()).await {
            let err = ProtoError::fatal_with_code(
                SqlState::INVALID_AUTHORIZATION_SPECIFICATION,
                "password authentication failed",
            );
            conn.send(BackendMessage::from(err)).await?;
            conn.flush().await?;
            return Ok(());
        }
    }
    conn.send(BackendMessage::AuthenticationOk).await?;

    for (name, value) in BOOTSTRAP_PARAMETERS {
        conn.send(BackendMessage::ParameterStatus { name: (*name).to_owned(), value: (*value).to_owned() })
            .await?;
    }
    conn.send(BackendMessage::ParameterStatus {
        name: "application_name".to_owned(),
        value: app.application_name(),
    })
    .await?;

    let session = Session::new(conn_id, startup_params);
    conn.send(BackendMessage::ReadyForQuery(session.transaction_status())).await?;
    conn.flush().await?;

    let machine = StateMachine { conn, session, app };
    machine.run().await
}

struct StateMachine<'a, A> {
    conn: &'a mut FramedConn<A>,
    session: Session,
    app: Arc<dyn Application>,
}

impl<'a, A> StateMachine<'a, A>
where
    A: AsyncRead + AsyncWrite + Send + Sync + Unpin,
{
    async fn run(mut self) -> Result<()> {
        loop {
            let message = self.conn.recv().await?;
            let keep_going = match message {
                None | Some(FrontendMessage::Terminate) => false,
                Some(FrontendMessage::Query { sql }) => self.handle_query(sql).await?,
                Some(FrontendMessage::Parse { name, query, param_types }) => {
                    self.handle_parse(name, query, param_types).await?
                }
                Some(FrontendMessage::Bind { portal, statement, param_formats, params, result_formats }) => {
                    self.handle_bind(portal, statement, param_formats, params, result_formats).await?
                }
                Some(FrontendMessage::Execute { portal, max_rows }) => self.handle_execute(portal, max_rows).await?,
                Some(FrontendMessage::Describe { kind, name }) => self.handle_describe(kind, name).await?,
                Some(FrontendMessage::Close { kind, name }) => self.handle_close(kind, name).await?,
                Some(FrontendMessage::Sync) => self.handle_sync().await?,
                Some(FrontendMessage::Flush) => true,
                Some(FrontendMessage::PasswordMessage { .. }) => {
                    warn!("unexpected password message outside authentication");
                    true
                }
                Some(FrontendMessage::Unknown { tag }) => {
                    warn!(tag, "unsupported command");
                    self.send_error(ProtoError::error_with_code(SqlState::GENERIC, "unsupported command")).await?
                }
            };
            self.conn.flush().await?;
            if !keep_going {
                return Ok(());
            }
        }
    }

    async fn send_error(&mut self, err: ProtoError) -> Result<bool> {
        let fatal = err.severity.is_fatal();
        debug!(severity = err.severity.as_str(), code = err.code.code(), message = %err.message, "protocol error");
        self.conn.send(BackendMessage::from(err)).await?;
        Ok(!fatal)
    }

    async fn handle_query(&mut self, sql: String) -> Result<bool> {
        let trimmed = sql.trim_end_matches('\0').trim().trim_end_matches(';').trim();
        let sub_queries = match pgproto_sql::split_sql_queries(trimmed) {
            Ok(qs) => qs.into_iter().filter(|q| !q.trim().is_empty()).collect::<Vec<_>>(),
            Err(e) => {
                let keep_going = self.send_error(ProtoError::syntax(e)).await?;
                self.conn.send(BackendMessage::ReadyForQuery(self.session.transaction_status())).await?;
                return Ok(keep_going);
            }
        };

        if sub_queries.is_empty() {
            self.conn.send(BackendMessage::EmptyQueryResponse).await?;
            self.conn.send(BackendMessage::ReadyForQuery(self.session.transaction_status())).await?;
            return Ok(true);
        }

        let mut keep_going = true;
        for sub_query in sub_queries {
            match execute_query(&sub_query, self.app.as_ref()).await {
                Ok(QueryResult::Rows { tag, rows, columns }) => {
                    self.conn.send(BackendMessage::RowDescription(columns)).await?;
                    for row in rows {
                        self.conn.send(BackendMessage::DataRow(row)).await?;
                    }
                    self.conn.send(BackendMessage::CommandComplete { tag }).await?;
                }
                Ok(QueryResult::TagOnly { tag }) => {
                    self.conn.send(BackendMessage::CommandComplete { tag }).await?;
                }
                Err(err) => {
                    keep_going = self.send_error(err).await?;
                    break;
                }
            }
        }

        self.conn.send(BackendMessage::ReadyForQuery(self.session.transaction_status())).await?;
        Ok(keep_going)
    }

    async fn handle_parse(&mut self, name: String, query: String, param_types: Vec<i32>) -> Result<bool> {
        self.session.declare_statement(name, query, param_types);
        self.conn.send(BackendMessage::ParseComplete).await?;
        Ok(true)
    }

    async fn handle_bind(
        &mut self,
        portal: String,
        statement: String,
        param_formats: Vec<i16>,
        params: Vec<Option<Vec<u8>>>,
        result_formats: Vec<i16>,
    ) -> Result<bool> {
        match self.session.declare_portal(portal, &statement, param_formats, params, result_formats) {
            Ok(()) => {
                self.conn.send(BackendMessage::BindComplete).await?;
                Ok(true)
            }
            Err(err) => self.send_error(err).await,
        }
    }

    async fn handle_execute(&mut self, portal: String, _max_rows: i32) -> Result<bool> {
        if self.session.get_portal(&portal).is_none() {
            return self.send_error(unknown("portal", &portal)).await;
        }
        match compute_portal_result(&mut self.session, self.app.as_ref(), &portal).await {
            Ok(PortalResult::Rows { tag, rows, .. }) => {
                for row in rows {
                    self.conn.send(BackendMessage::DataRow(row)).await?;
                }
                self.conn.send(BackendMessage::CommandComplete { tag }).await?;
            }
            Ok(PortalResult::Empty | PortalResult::Failed) => {
                self.conn.send(BackendMessage::EmptyQueryResponse).await?;
            }
            Err(err) => return self.send_error(err).await,
        }
        Ok(true)
    }

    async fn handle_describe(&mut self, kind: ObjectKind, name: String) -> Result<bool> {
        match kind {
            ObjectKind::Statement => {
                if self.session.get_statement(&name).is_none() {
                    return self.send_error(unknown("statement", &name)).await;
                }
                self.conn.send(BackendMessage::NoData).await?;
            }
            ObjectKind::Portal => {
                if self.session.get_portal(&name).is_none() {
                    return self.send_error(unknown("portal", &name)).await;
                }
                match compute_portal_result(&mut self.session, self.app.as_ref(), &name).await {
                    Ok(PortalResult::Rows { columns, .. }) if !columns.is_empty() => {
                        self.conn.send(BackendMessage::RowDescription(columns)).await?;
                    }
                    Ok(_) => self.conn.send(BackendMessage::NoData).await?,
                    Err(err) => return self.send_error(err).await,
                }
            }
        }
        Ok(true)
    }

    async fn handle_close(&mut self, kind: ObjectKind, name: String) -> Result<bool> {
        let result = match kind {
            ObjectKind::Statement => self.session.close_statement(&name),
            ObjectKind::Portal => self.session.close_portal(&name),
        };
        match result {
            Ok(()) => {
                self.conn.send(BackendMessage::CloseComplete).await?;
                Ok(true)
            }
            Err(err) => self.send_error(err).await,
        }
    }

    async fn handle_sync(&mut self) -> Result<bool> {
        self.conn.send(BackendMessage::ReadyForQuery(self.session.transaction_status())).await?;
        Ok(true)
    }
}

fn unknown(kind: &str, name: &str) -> ProtoError {
    ProtoError::error_with_code(SqlState::GENERIC, format!("unknown {kind} '{name}'"))
}

/// Computes (or returns the cached) result of executing a portal's bound
/// statement, substituting `$i` parameters textually first.
///
/// When `app.surface_execute_errors()` is false (the reference behavior),
/// a failure is swallowed into `PortalResult::Failed` and cached as such.
/// When true, the error is propagated to the caller instead, and nothing
/// is cached, so a retried `Execute` re-runs the query.
async fn compute_portal_result(
    session: &mut Session,
    app: &dyn Application,
    portal_name: &str,
) -> std::result::Result<PortalResult, ProtoError> {
    if let Some(cached) = session.get_portal(portal_name).and_then(|p| p.cached_result.clone()) {
        return Ok(cached);
    }

    let (sql_template, params) = {
        let statement = session.portal_statement(portal_name).expect("portal's statement was validated at bind time");
        let portal = session.get_portal(portal_name).expect("checked by caller");
        (statement.sql.clone(), portal.params.clone())
    };

    // Simple textual `$i` substitution: not escape-safe, matches the
    // reference server's lenient parser.
    let mut sql = sql_template;
    for (i, param) in params.iter().enumerate() {
        if let Some(bytes) = param {
            if let Ok(text) = std::str::from_utf8(bytes) {
                sql = sql.replace(&format!("${}", i + 1), text);
            }
        }
    }

    let result = if sql.trim().is_empty() {
        PortalResult::Empty
    } else {
        match execute_query(&sql, app).await {
            Ok(QueryResult::Rows { tag, rows, columns }) => PortalResult::Rows { tag, rows, columns },
            Ok(QueryResult::TagOnly { tag }) => {
                PortalResult::Rows { tag, rows: Vec::new(), columns: Vec::<ColumnDescriptor>::new() }
            }
            Err(err) if app.surface_execute_errors() => return Err(err),
            Err(_) => PortalResult::Failed,
        }
    };

    if let Some(portal) = session.get_portal_mut(portal_name) {
        portal.cached_result = Some(result.clone());
    }
    Ok(result)
}
