//! RCON wire frame.
//!
//! ## Wire format (all integers little-endian)
//!
//! ```text
//! size:  i32   (4)   byte length of everything after this field
//! id:    i32   (4)   correlation id
//! kind:  i32   (4)   see FrameKind
//! body:  [u8]  (n)   ASCII/UTF-8 text, no NUL bytes
//! 0x00         (1)   body terminator
//! 0x00         (1)   empty-string terminator
//! ```
//!
//! `size` is never stored: it is derived from the body on encode and
//! checked against the buffer on decode.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::{RconError, Result};

// ── Constants ────────────────────────────────────────────────────

/// Length of the `size` prefix.
pub const SIZE_FIELD_LEN: usize = 4;

/// Length of `size` + `id` + `kind`.
pub const HEADER_SIZE: usize = 12;

/// The two trailing NUL bytes.
pub const TERMINATOR: [u8; 2] = [0, 0];

/// Smallest valid frame (empty body).
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + TERMINATOR.len();

/// Largest body the protocol allows in a single frame.
pub const MAX_BODY_SIZE: usize = 4096;

/// Largest complete frame, prefix included. Receive buffers must hold
/// at least this many bytes.
pub const MAX_FRAME_SIZE: usize = MIN_FRAME_SIZE + MAX_BODY_SIZE;

/// Smallest legal value of the `size` field.
const MIN_SIZE_FIELD: usize = MIN_FRAME_SIZE - SIZE_FIELD_LEN;

// ── Origin ───────────────────────────────────────────────────────

/// Which side of the connection produced a frame.
///
/// The protocol reuses kind value `2` for a client request
/// (`ExecCommand`) and a server reply (`AuthResponse`), so a decoder
/// has to know who sent the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Client,
    Server,
}

// ── FrameKind ────────────────────────────────────────────────────

/// The packet type carried in the `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Client → server: password in the body.
    Auth,
    /// Server → client: id `-1` on failure, the request id on success.
    AuthResponse,
    /// Client → server: console command in the body.
    ExecCommand,
    /// Server → client: command output in the body.
    ResponseValue,
}

impl FrameKind {
    pub const AUTH: i32 = 3;
    pub const AUTH_RESPONSE: i32 = 2;
    pub const EXEC_COMMAND: i32 = 2;
    pub const RESPONSE_VALUE: i32 = 0;

    /// The value written into the `kind` field.
    pub fn wire_value(self) -> i32 {
        match self {
            FrameKind::Auth => Self::AUTH,
            FrameKind::AuthResponse => Self::AUTH_RESPONSE,
            FrameKind::ExecCommand => Self::EXEC_COMMAND,
            FrameKind::ResponseValue => Self::RESPONSE_VALUE,
        }
    }

    /// Which peer sends frames of this kind.
    pub fn origin(self) -> Origin {
        match self {
            FrameKind::Auth | FrameKind::ExecCommand => Origin::Client,
            FrameKind::AuthResponse | FrameKind::ResponseValue => Origin::Server,
        }
    }

    /// Map a raw `kind` value sent by `origin` back to a variant.
    pub fn from_wire(value: i32, origin: Origin) -> Result<Self> {
        match (origin, value) {
            (Origin::Client, Self::AUTH) => Ok(FrameKind::Auth),
            (Origin::Client, Self::EXEC_COMMAND) => Ok(FrameKind::ExecCommand),
            (Origin::Server, Self::AUTH_RESPONSE) => Ok(FrameKind::AuthResponse),
            (Origin::Server, Self::RESPONSE_VALUE) => Ok(FrameKind::ResponseValue),
            _ => Err(RconError::MalformedFrame(format!(
                "unknown kind {value} from {origin:?}"
            ))),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Auth => write!(f, "Auth"),
            FrameKind::AuthResponse => write!(f, "AuthResponse"),
            FrameKind::ExecCommand => write!(f, "ExecCommand"),
            FrameKind::ResponseValue => write!(f, "ResponseValue"),
        }
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One complete RCON message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    id: i32,
    kind: FrameKind,
    body: String,
}

impl Frame {
    /// Build a frame, rejecting bodies that cannot be put on the wire.
    pub fn new(id: i32, kind: FrameKind, body: impl Into<String>) -> Result<Self> {
        let body = body.into();
        if body.len() > MAX_BODY_SIZE {
            return Err(RconError::PayloadTooLarge {
                size: body.len(),
                max: MAX_BODY_SIZE,
            });
        }
        if let Some(pos) = body.bytes().position(|b| b == 0) {
            return Err(RconError::InvalidBody(pos));
        }
        Ok(Self { id, kind, body })
    }

    pub fn auth(id: i32, password: impl Into<String>) -> Result<Self> {
        Self::new(id, FrameKind::Auth, password)
    }

    pub fn exec_command(id: i32, command: impl Into<String>) -> Result<Self> {
        Self::new(id, FrameKind::ExecCommand, command)
    }

    pub fn auth_response(id: i32) -> Self {
        Self {
            id,
            kind: FrameKind::AuthResponse,
            body: String::new(),
        }
    }

    pub fn response_value(id: i32, body: impl Into<String>) -> Result<Self> {
        Self::new(id, FrameKind::ResponseValue, body)
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn into_body(self) -> String {
        self.body
    }

    /// Value of the `size` field: id + kind + body + terminators.
    pub fn size(&self) -> i32 {
        (MIN_SIZE_FIELD + self.body.len()) as i32
    }

    /// Total bytes on the wire, prefix included.
    pub fn encoded_len(&self) -> usize {
        MIN_FRAME_SIZE + self.body.len()
    }

    /// Append the wire representation to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_i32_le(self.size());
        dst.put_i32_le(self.id);
        dst.put_i32_le(self.kind.wire_value());
        dst.put_slice(self.body.as_bytes());
        dst.put_slice(&TERMINATOR);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.to_vec()
    }

    /// Parse exactly one frame occupying the whole of `bytes`.
    pub fn from_bytes(bytes: &[u8], origin: Origin) -> Result<Self> {
        if bytes.len() < MIN_FRAME_SIZE {
            return Err(RconError::MalformedFrame(format!(
                "{} bytes is shorter than the {MIN_FRAME_SIZE} byte minimum",
                bytes.len()
            )));
        }

        let declared = frame_len(read_i32(bytes, 0))?;
        if declared != bytes.len() {
            return Err(RconError::MalformedFrame(format!(
                "declared length {declared} does not match {} available bytes",
                bytes.len()
            )));
        }

        let id = read_i32(bytes, 4);
        let kind = FrameKind::from_wire(read_i32(bytes, 8), origin)?;

        let (body, terminator) = bytes[HEADER_SIZE..].split_at(bytes.len() - MIN_FRAME_SIZE);
        if terminator != TERMINATOR {
            return Err(RconError::MalformedFrame("missing terminator".into()));
        }
        if let Some(pos) = body.iter().position(|&b| b == 0) {
            return Err(RconError::MalformedFrame(format!(
                "premature terminator at body offset {pos}"
            )));
        }

        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({} bytes)", self.kind, self.id, self.body.len())
    }
}

/// Total frame length implied by a raw `size` field, prefix included.
///
/// Rejects values that could never describe a legal frame, so a reader
/// never buffers an oversized or negative length.
pub(crate) fn frame_len(size_field: i32) -> Result<usize> {
    let size = usize::try_from(size_field)
        .map_err(|_| RconError::MalformedFrame(format!("negative size {size_field}")))?;
    if size < MIN_SIZE_FIELD {
        return Err(RconError::MalformedFrame(format!(
            "size {size} is below the {MIN_SIZE_FIELD} byte minimum"
        )));
    }
    let total = size + SIZE_FIELD_LEN;
    if total > MAX_FRAME_SIZE {
        return Err(RconError::MalformedFrame(format!(
            "frame of {total} bytes exceeds the {MAX_FRAME_SIZE} byte maximum"
        )));
    }
    Ok(total)
}

pub(crate) fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_le_bytes(raw)
}

// ── Tests ────────────────────────────────────────────────────────
