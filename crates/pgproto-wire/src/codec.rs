//! Encoding/decoding of messages in the PostgreSQL wire protocol. See
//! "[Frontend/Backend Protocol: Message Formats][1]" in the PostgreSQL
//! reference for the specification.
//!
//! [1]: https://www.postgresql.org/docs/13/protocol-message-formats.html

use std::collections::HashMap;
use std::fmt;
use std::io;

use byteorder::{ByteOrder, NetworkEndian};
use bytes::{Buf, BufMut, BytesMut};
use futures::{sink, SinkExt, TryStreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use pgproto_common::{PgProtoError, Result};

use crate::message::{
    BackendMessage, ColumnDescriptor, FrontendMessage, FrontendStartupMessage, ObjectKind,
    TransactionStatus,
};
use crate::version::{VERSION_CANCEL, VERSION_GSSENC, VERSION_SSL};

#[cfg(test)]
use crate::version::VERSION_3;

/// Byte sent to decline SSL/GSSAPI encryption during startup negotiation.
pub const REJECT_ENCRYPTION: u8 = b'N';
/// Byte sent to accept an `SSLRequest`.
pub const ACCEPT_SSL: u8 = b'S';
/// Byte sent to accept a `GSSENCRequest`.
pub const ACCEPT_GSSENC: u8 = b'G';

#[derive(Debug)]
enum CodecError {
    StringNoTerminator,
    UnknownObjectKind(u8),
}

impl std::error::Error for CodecError {}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::StringNoTerminator => f.write_str("the string does not have a terminator"),
            CodecError::UnknownObjectKind(b) => {
                write!(f, "unknown describe/close kind {:?}", *b as char)
            }
        }
    }
}

fn input_err(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, source.into())
}

fn parse_frame_len(src: &[u8]) -> io::Result<usize> {
    let n = NetworkEndian::read_u32(src) as usize;
    if n < 4 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid frame length"));
    }
    Ok(n - 4)
}

/// A read-only cursor over one message's payload.
///
/// Mirrors [`bytes::Buf`] but every operation returns a `Result` rather
/// than panicking: a malformed message from the client must never crash
/// the server.
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf }
    }

    fn advance(&mut self, n: usize) {
        self.buf = &self.buf[n..];
    }

    fn peek_byte(&self) -> io::Result<u8> {
        self.buf
            .first()
            .copied()
            .ok_or_else(|| input_err("no byte to read"))
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let b = self.peek_byte()?;
        self.advance(1);
        Ok(b)
    }

    fn read_cstr(&mut self) -> io::Result<String> {
        if let Some(pos) = self.buf.iter().position(|b| *b == 0) {
            let val = std::str::from_utf8(&self.buf[..pos])
                .map_err(input_err)?
                .to_owned();
            self.advance(pos + 1);
            Ok(val)
        } else {
            Err(input_err(CodecError::StringNoTerminator))
        }
    }

    fn read_i16(&mut self) -> io::Result<i16> {
        if self.buf.len() < 2 {
            return Err(input_err("not enough buffer for an Int16"));
        }
        let val = NetworkEndian::read_i16(self.buf);
        self.advance(2);
        Ok(val)
    }

    fn read_i32(&mut self) -> io::Result<i32> {
        if self.buf.len() < 4 {
            return Err(input_err("not enough buffer for an Int32"));
        }
        let val = NetworkEndian::read_i32(self.buf);
        self.advance(4);
        Ok(val)
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        if self.buf.len() < 4 {
            return Err(input_err("not enough buffer for an Int32"));
        }
        let val = NetworkEndian::read_u32(self.buf);
        self.advance(4);
        Ok(val)
    }

    fn read_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        if self.buf.len() < n {
            return Err(input_err("not enough buffer for requested bytes"));
        }
        let val = self.buf[..n].to_vec();
        self.advance(n);
        Ok(val)
    }

    fn read_object_kind(&mut self) -> io::Result<ObjectKind> {
        match self.read_byte()? {
            b'P' => Ok(ObjectKind::Portal),
            b'S' => Ok(ObjectKind::Statement),
            b => Err(input_err(CodecError::UnknownObjectKind(b))),
        }
    }
}

/// Reads and classifies the first message of a connection, which is the
/// one message in the protocol with no leading tag byte.
pub async fn decode_startup<A>(mut conn: A) -> Result<FrontendStartupMessage>
where
    A: AsyncRead + Unpin,
{
    let mut header = [0u8; 8];
    conn.read_exact(&mut header).await?;
    let len = parse_frame_len(&header[0..4])? + 4;
    let version = NetworkEndian::read_i32(&header[4..8]);

    if version == VERSION_SSL {
        return Ok(FrontendStartupMessage::SslRequest);
    }
    if version == VERSION_GSSENC {
        return Ok(FrontendStartupMessage::GssEncRequest);
    }
    if version == VERSION_CANCEL {
        let mut rest = [0u8; 8];
        conn.read_exact(&mut rest).await?;
        return Ok(FrontendStartupMessage::CancelRequest {
            conn_id: NetworkEndian::read_u32(&rest[0..4]),
            secret_key: NetworkEndian::read_u32(&rest[4..8]),
        });
    }

    let mut payload = vec![0u8; len - 8];
    conn.read_exact(&mut payload).await?;
    let mut cur = Cursor::new(&payload);
    let mut params = HashMap::new();
    while cur.peek_byte().unwrap_or(0) != 0 {
        let name = cur.read_cstr().map_err(PgProtoError::from)?;
        let value = cur.read_cstr().map_err(PgProtoError::from)?;
        params.insert(name, value);
    }
    Ok(FrontendStartupMessage::Startup { version, params })
}

/// A connection that manages encoding/decoding of post-startup frames.
pub struct FramedConn<A> {
    inner: sink::Buffer<Framed<A, Codec>, BackendMessage>,
}

impl<A> FramedConn<A>
where
    A: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: A) -> Self {
        FramedConn {
            inner: Framed::new(inner, Codec::new()).buffer(32),
        }
    }

    /// Reads and decodes one frontend message. Returns `None` on a
    /// graceful EOF (the client hung up between messages).
    pub async fn recv(&mut self) -> Result<Option<FrontendMessage>> {
        Ok(self.inner.try_next().await?)
    }

    /// Encodes and queues one backend message. Does not flush; call
    /// [`FramedConn::flush`] once a handler has finished emitting all of
    /// its responses.
    pub async fn send(&mut self, message: BackendMessage) -> Result<()> {
        self.inner.send(message).await?;
        Ok(())
    }

    pub async fn send_all(&mut self, messages: impl IntoIterator<Item = BackendMessage>) -> Result<()> {
        for m in messages {
            self.send(m).await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }
}

struct Codec {
    decode_state: DecodeState,
}

#[derive(Debug)]
enum DecodeState {
    Head,
    Data(u8, usize),
}

impl Codec {
    fn new() -> Self {
        Codec {
            decode_state: DecodeState::Head,
        }
    }
}

impl Decoder for Codec {
    type Item = FrontendMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        loop {
            match self.decode_state {
                DecodeState::Head => {
                    if src.len() < 5 {
                        return Ok(None);
                    }
                    let msg_type = src[0];
                    let frame_len = parse_frame_len(&src[1..5])?;
                    src.advance(5);
                    src.reserve(frame_len);
                    self.decode_state = DecodeState::Data(msg_type, frame_len);
                }
                DecodeState::Data(msg_type, frame_len) => {
                    if src.len() < frame_len {
                        return Ok(None);
                    }
                    let payload = src.split_to(frame_len);
                    let msg = decode_message(msg_type, &payload)?;
                    src.reserve(5);
                    self.decode_state = DecodeState::Head;
                    return Ok(Some(msg));
                }
            }
        }
    }
}

fn decode_message(msg_type: u8, payload: &[u8]) -> io::Result<FrontendMessage> {
    let mut cur = Cursor::new(payload);
    match msg_type {
        b'Q' => Ok(FrontendMessage::Query {
            sql: cur.read_cstr()?,
        }),
        b'P' => {
            let name = cur.read_cstr()?;
            let query = cur.read_cstr()?;
            let n = cur.read_i16()?;
            let mut param_types = Vec::with_capacity(n.max(0) as usize);
            for _ in 0..n {
                param_types.push(cur.read_i32()?);
            }
            Ok(FrontendMessage::Parse {
                name,
                query,
                param_types,
            })
        }
        b'B' => {
            let portal = cur.read_cstr()?;
            let statement = cur.read_cstr()?;
            let nf = cur.read_i16()?;
            let mut param_formats = Vec::with_capacity(nf.max(0) as usize);
            for _ in 0..nf {
                param_formats.push(cur.read_i16()?);
            }
            let np = cur.read_i16()?;
            let mut params = Vec::with_capacity(np.max(0) as usize);
            for _ in 0..np {
                let len = cur.read_i32()?;
                if len < 0 {
                    params.push(None);
                } else {
                    params.push(Some(cur.read_bytes(len as usize)?));
                }
            }
            let nr = cur.read_i16()?;
            let mut result_formats = Vec::with_capacity(nr.max(0) as usize);
            for _ in 0..nr {
                result_formats.push(cur.read_i16()?);
            }
            Ok(FrontendMessage::Bind {
                portal,
                statement,
                param_formats,
                params,
                result_formats,
            })
        }
        b'E' => Ok(FrontendMessage::Execute {
            portal: cur.read_cstr()?,
            max_rows: cur.read_i32()?,
        }),
        b'D' => Ok(FrontendMessage::Describe {
            kind: cur.read_object_kind()?,
            name: cur.read_cstr()?,
        }),
        b'C' => Ok(FrontendMessage::Close {
            kind: cur.read_object_kind()?,
            name: cur.read_cstr()?,
        }),
        b'S' => Ok(FrontendMessage::Sync),
        b'H' | b'F' => Ok(FrontendMessage::Flush),
        b'X' => Ok(FrontendMessage::Terminate),
        b'p' => Ok(FrontendMessage::PasswordMessage {
            password: cur.read_cstr()?,
        }),
        other => Ok(FrontendMessage::Unknown { tag: other }),
    }
}

trait Pgbuf: BufMut {
    fn put_string(&mut self, s: &str);
}

impl<B: BufMut> Pgbuf for B {
    fn put_string(&mut self, s: &str) {
        self.put(s.as_bytes());
        self.put_u8(0);
    }
}

impl Encoder<BackendMessage> for Codec {
    type Error = io::Error;

    fn encode(&mut self, msg: BackendMessage, dst: &mut BytesMut) -> io::Result<()> {
        let byte = match &msg {
            BackendMessage::AuthenticationCleartextPassword | BackendMessage::AuthenticationOk => b'R',
            BackendMessage::ParameterStatus { .. } => b'S',
            BackendMessage::ReadyForQuery(_) => b'Z',
            BackendMessage::ParseComplete => b'1',
            BackendMessage::BindComplete => b'2',
            BackendMessage::CloseComplete => b'3',
            BackendMessage::NoData => b'n',
            BackendMessage::EmptyQueryResponse => b'I',
            BackendMessage::CommandComplete { .. } => b'C',
            BackendMessage::RowDescription(_) => b'T',
            BackendMessage::DataRow(_) => b'D',
            BackendMessage::ErrorResponse(_) => b'E',
        };
        dst.put_u8(byte);
        let base = dst.len();
        dst.put_u32(0);

        match msg {
            BackendMessage::AuthenticationCleartextPassword => dst.put_i32(3),
            BackendMessage::AuthenticationOk => dst.put_i32(0),
            BackendMessage::ParameterStatus { name, value } => {
                dst.put_string(&name);
                dst.put_string(&value);
            }
            BackendMessage::ReadyForQuery(status) => dst.put_u8(status.as_byte()),
            BackendMessage::ParseComplete
            | BackendMessage::BindComplete
            | BackendMessage::CloseComplete
            | BackendMessage::NoData
            | BackendMessage::EmptyQueryResponse => {}
            BackendMessage::CommandComplete { tag } => dst.put_string(&tag),
            BackendMessage::RowDescription(cols) => {
                dst.put_i16(cols.len() as i16);
                for col in cols {
                    encode_column_descriptor(dst, &col);
                }
            }
            BackendMessage::DataRow(fields) => {
                dst.put_i16(fields.len() as i16);
                for field in fields {
                    let bytes = field.into_bytes();
                    dst.put_i32(bytes.len() as i32);
                    dst.put_slice(&bytes);
                }
            }
            BackendMessage::ErrorResponse(err) => {
                dst.put_u8(b'S');
                dst.put_string(err.severity.as_str());
                dst.put_u8(b'C');
                dst.put_string(err.code.code());
                dst.put_u8(b'M');
                dst.put_string(&err.message);
                dst.put_u8(0);
            }
        }

        let len = dst.len() - base;
        let len = i32::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "encoded message too large"))?;
        NetworkEndian::write_i32(&mut dst[base..base + 4], len);
        Ok(())
    }
}

fn encode_column_descriptor(dst: &mut BytesMut, col: &ColumnDescriptor) {
    dst.put_string(&col.name);
    dst.put_i32(0); // table OID
    dst.put_i16(0); // column attribute number
    dst.put_i32(col.type_id);
    dst.put_i16(col.type_size);
    dst.put_i32(-1); // type modifier
    dst.put_i16(0); // format code: text
}
