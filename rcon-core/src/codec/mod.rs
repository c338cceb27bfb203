//! `tokio_util` codec for streamed RCON frames.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::RconError;
use crate::frame::{self, Frame, Origin, SIZE_FIELD_LEN};

/// Splits a byte stream into [`Frame`]s and serializes outgoing ones.
///
/// The codec only needs to know who sent the bytes it decodes; see
/// [`Origin`].
#[derive(Debug, Clone, Copy)]
pub struct RconCodec {
    inbound: Origin,
}

impl RconCodec {
    /// Codec for the client side: decodes server replies.
    pub fn client() -> Self {
        Self {
            inbound: Origin::Server,
        }
    }

    /// Codec for the server side: decodes client requests.
    pub fn server() -> Self {
        Self {
            inbound: Origin::Client,
        }
    }
}

impl Decoder for RconCodec {
    type Item = Frame;
    type Error = RconError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < SIZE_FIELD_LEN {
            return Ok(None);
        }

        // Validated before buffering so a bogus length cannot make us
        // wait for (or allocate) more than one maximum frame.
        let len = frame::frame_len(frame::read_i32(src, 0))?;
        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let bytes = src.split_to(len);
        Frame::from_bytes(&bytes, self.inbound).map(Some)
    }
}

impl Encoder<Frame> for RconCodec {
    type Error = RconError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}
