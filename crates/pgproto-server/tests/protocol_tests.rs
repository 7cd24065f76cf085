//! Drives [`pgproto_server::protocol::run`] over an in-memory duplex pair,
//! playing the client side by hand-encoding/decoding the same frame shape
//! `pgproto-wire`'s codec produces. `FramedConn` only speaks one direction
//! (decodes `FrontendMessage`, encodes `BackendMessage`), so the "client"
//! side here works at the raw byte level instead of reusing it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pgproto_query::{Application, Row};
use pgproto_server::protocol;
use pgproto_sql::SelectStmt;
use pgproto_wire::FramedConn;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

struct FixtureApp {
    tables: HashMap<&'static str, (Vec<&'static str>, Vec<Row>)>,
}

impl FixtureApp {
    fn new() -> Self {
        let mut tables = HashMap::new();
        tables.insert(
            "widgets",
            (
                vec!["id", "name"],
                vec![
                    Row::from([("id".to_owned(), "1".to_owned()), ("name".to_owned(), "sprocket".to_owned())]),
                    Row::from([("id".to_owned(), "2".to_owned()), ("name".to_owned(), "widget".to_owned())]),
                ],
            ),
        );
        Self { tables }
    }
}

#[async_trait]
impl Application for FixtureApp {
    async fn query_tables(&self, stmt: &SelectStmt) -> pgproto_query::Result<(Vec<Row>, Vec<String>)> {
        let table = stmt.tables.first().map(|t| t.name.as_str()).unwrap_or_default();
        match self.tables.get(table) {
            Some((cols, rows)) => Ok((rows.clone(), cols.iter().map(|c| c.to_string()).collect())),
            None => Ok((vec![], vec![])),
        }
    }

    async fn list_tables(&self) -> Vec<String> {
        self.tables.keys().map(|t| t.to_string()).collect()
    }

    async fn describe_table(&self, table_name: &str) -> Vec<String> {
        self.tables.get(table_name).map(|(cols, _)| cols.iter().map(|c| c.to_string()).collect()).unwrap_or_default()
    }
}

/// Always fails `query_tables` and opts into surfacing the failure,
/// instead of the default swallow-into-`EmptyQueryResponse` behavior.
struct FailingApp;

#[async_trait]
impl Application for FailingApp {
    async fn query_tables(&self, _stmt: &SelectStmt) -> pgproto_query::Result<(Vec<Row>, Vec<String>)> {
        Err(pgproto_common::ProtoError::error("backing store unavailable"))
    }

    async fn list_tables(&self) -> Vec<String> {
        Vec::new()
    }

    async fn describe_table(&self, _table_name: &str) -> Vec<String> {
        Vec::new()
    }

    fn surface_execute_errors(&self) -> bool {
        true
    }
}

fn cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn frame(tag: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&((payload.len() + 4) as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

fn query_message(sql: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    cstr(&mut payload, sql);
    frame(b'Q', payload)
}

fn parse_message(sql: &str, name: &str, param_types: &[i32]) -> Vec<u8> {
    let mut payload = Vec::new();
    cstr(&mut payload, name);
    cstr(&mut payload, sql);
    payload.extend_from_slice(&(param_types.len() as i16).to_be_bytes());
    for t in param_types {
        payload.extend_from_slice(&t.to_be_bytes());
    }
    frame(b'P', payload)
}

fn bind_message(portal: &str, statement: &str, params: &[Option<&[u8]>]) -> Vec<u8> {
    let mut payload = Vec::new();
    cstr(&mut payload, portal);
    cstr(&mut payload, statement);
    payload.extend_from_slice(&0i16.to_be_bytes()); // param formats
    payload.extend_from_slice(&(params.len() as i16).to_be_bytes());
    for p in params {
        match p {
            Some(bytes) => {
                payload.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                payload.extend_from_slice(bytes);
            }
            None => payload.extend_from_slice(&(-1i32).to_be_bytes()),
        }
    }
    payload.extend_from_slice(&0i16.to_be_bytes()); // result formats
    frame(b'B', payload)
}

fn execute_message(portal: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    cstr(&mut payload, portal);
    payload.extend_from_slice(&0i32.to_be_bytes());
    frame(b'E', payload)
}

fn sync_message() -> Vec<u8> {
    frame(b'S', Vec::new())
}

fn terminate_message() -> Vec<u8> {
    frame(b'X', Vec::new())
}

/// Reads one backend frame and returns its tag and raw payload.
async fn read_frame(client: &mut DuplexStream) -> (u8, Vec<u8>) {
    let mut head = [0u8; 5];
    client.read_exact(&mut head).await.unwrap();
    let tag = head[0];
    let len = u32::from_be_bytes([head[1], head[2], head[3], head[4]]) as usize - 4;
    let mut payload = vec![0u8; len];
    client.read_exact(&mut payload).await.unwrap();
    (tag, payload)
}

fn split_cstrs(payload: &[u8], n: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = payload;
    for _ in 0..n {
        let pos = rest.iter().position(|b| *b == 0).unwrap();
        out.push(String::from_utf8_lossy(&rest[..pos]).into_owned());
        rest = &rest[pos + 1..];
    }
    out
}

/// Reads frames until `CommandComplete` or `ErrorResponse`, collecting any
/// `DataRow` payloads seen along the way as raw field strings.
async fn read_until_command_complete(client: &mut DuplexStream) -> (String, Vec<Vec<String>>) {
    let mut rows = Vec::new();
    loop {
        let (tag, payload) = read_frame(client).await;
        match tag {
            b'C' => return (split_cstrs(&payload, 1).remove(0), rows),
            b'E' => panic!("unexpected ErrorResponse: {}", String::from_utf8_lossy(&payload)),
            b'D' => {
                let mut rest = &payload[2..]; // skip field count
                let mut fields = Vec::new();
                while !rest.is_empty() {
                    let len = i32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
                    rest = &rest[4..];
                    if len < 0 {
                        fields.push(String::new());
                    } else {
                        fields.push(String::from_utf8_lossy(&rest[..len as usize]).into_owned());
                        rest = &rest[len as usize..];
                    }
                }
                rows.push(fields);
            }
            _ => {}
        }
    }
}

async fn run_session(app: Arc<dyn Application>) -> DuplexStream {
    let (server_half, client_half) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let mut conn = FramedConn::new(server_half);
        let _ = protocol::run(app, 1, &mut conn, HashMap::new()).await;
    });
    client_half
}

async fn drain_startup(client: &mut DuplexStream) {
    // AuthenticationOk, 10 fixed ParameterStatus entries + application_name, ReadyForQuery.
    for _ in 0..13 {
        read_frame(client).await;
    }
}

#[tokio::test]
async fn simple_query_round_trip_returns_rows_and_ready_for_query() {
    let app: Arc<dyn Application> = Arc::new(FixtureApp::new());
    let mut client = run_session(app).await;
    drain_startup(&mut client).await;

    client.write_all(&query_message("SELECT * FROM widgets")).await.unwrap();

    let (tag, _) = read_frame(&mut client).await; // RowDescription
    assert_eq!(tag, b'T');
    let (tag, rows) = read_until_command_complete(&mut client).await;
    assert_eq!(tag, "SELECT");
    assert_eq!(rows.len(), 2);
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'Z'); // ReadyForQuery

    client.write_all(&terminate_message()).await.unwrap();
}

#[tokio::test]
async fn extended_query_cycle_parses_binds_executes_and_syncs() {
    let app: Arc<dyn Application> = Arc::new(FixtureApp::new());
    let mut client = run_session(app).await;
    drain_startup(&mut client).await;

    client.write_all(&parse_message("SELECT * FROM widgets WHERE id = $1", "s1", &[])).await.unwrap();
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'1'); // ParseComplete

    client.write_all(&bind_message("p1", "s1", &[Some(b"1")])).await.unwrap();
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'2'); // BindComplete

    client.write_all(&execute_message("p1")).await.unwrap();
    let (tag, rows) = read_until_command_complete(&mut client).await;
    assert_eq!(tag, "SELECT");
    assert_eq!(rows.len(), 2, "this server doesn't filter by WHERE, matching the reference probe semantics");

    client.write_all(&sync_message()).await.unwrap();
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'Z'); // ReadyForQuery

    client.write_all(&terminate_message()).await.unwrap();
}

#[tokio::test]
async fn unsupported_statement_type_reports_an_error_and_stays_connected() {
    let app: Arc<dyn Application> = Arc::new(FixtureApp::new());
    let mut client = run_session(app).await;
    drain_startup(&mut client).await;

    client.write_all(&query_message("VACUUM widgets")).await.unwrap();
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'E'); // ErrorResponse
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'Z'); // ReadyForQuery: non-fatal, session stays open

    client.write_all(&query_message("SELECT * FROM widgets")).await.unwrap();
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'T');
}

#[tokio::test]
async fn surfaced_execute_errors_report_on_the_portal_instead_of_going_empty() {
    let app: Arc<dyn Application> = Arc::new(FailingApp);
    let mut client = run_session(app).await;
    drain_startup(&mut client).await;

    client.write_all(&parse_message("SELECT * FROM widgets", "s1", &[])).await.unwrap();
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'1'); // ParseComplete

    client.write_all(&bind_message("p1", "s1", &[])).await.unwrap();
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'2'); // BindComplete

    client.write_all(&execute_message("p1")).await.unwrap();
    let (tag, payload) = read_frame(&mut client).await;
    assert_eq!(tag, b'E'); // ErrorResponse, not EmptyQueryResponse
    assert!(String::from_utf8_lossy(&payload).contains("backing store unavailable"));

    client.write_all(&sync_message()).await.unwrap();
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'Z'); // ReadyForQuery: non-fatal, session stays open
}

#[tokio::test]
async fn unrecognized_command_tag_reports_an_error_and_stays_connected() {
    let app: Arc<dyn Application> = Arc::new(FixtureApp::new());
    let mut client = run_session(app).await;
    drain_startup(&mut client).await;

    client.write_all(&frame(b'?', Vec::new())).await.unwrap();
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'E'); // ErrorResponse: "unsupported command"

    client.write_all(&query_message("SELECT * FROM widgets")).await.unwrap();
    let (tag, _) = read_frame(&mut client).await;
    assert_eq!(tag, b'T'); // the connection survived and keeps serving queries
}
