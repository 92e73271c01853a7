//! The relay-cell format carried inside a `RELAY`/`RELAY_EARLY` cell's
//! 509-byte payload, once every hop's encryption layer up to the
//! addressed hop has been peeled off.
//!
//! Layout: 1 byte command, 2 bytes "recognized" (zero
//! when addressed to us), 2-byte stream id, 4-byte digest, 2-byte
//! length, `length` bytes of data, then padding out to 509 bytes.

use crate::chancell::CELL_DATA_LEN;
use crate::int_enum::int_enum;
use crate::{Error, Result};
use garlic_bytes::{Reader, Writer};

/// Size of the fixed relay-cell header, before the variable-length data.
pub const RELAY_HEADER_LEN: usize = 11;
/// Maximum bytes of application data that fit in one relay DATA cell.
pub const MAX_RELAY_DATA_LEN: usize = CELL_DATA_LEN - RELAY_HEADER_LEN;

int_enum! {
    /// The command byte of a relay message.
    pub struct RelayCmd(u8) {
        /// Open a stream to a host:port.
        BEGIN = 1,
        /// Carry application data on a stream.
        DATA = 2,
        /// Close a stream.
        END = 3,
        /// Successful reply to BEGIN.
        CONNECTED = 4,
        /// Flow-control acknowledgement.
        SENDME = 5,
        /// Partially close a circuit (not used by this client).
        TRUNCATE = 8,
        /// Notification that a circuit was partially closed.
        TRUNCATED = 9,
        /// Open a directory stream.
        BEGIN_DIR = 13,
        /// Extend the circuit by one hop.
        EXTEND2 = 14,
        /// Successful reply to EXTEND2.
        EXTENDED2 = 15,
        /// Ask a rendezvous point to wait for a rendezvous.
        ESTABLISH_RENDEZVOUS = 33,
        /// Client's introduce request, sent to an introduction point.
        INTRODUCE1 = 34,
        /// Introduction point's forwarded request to the service (not
        /// produced by this client).
        INTRODUCE2 = 36,
        /// Service's completion of the rendezvous, relayed to the client.
        RENDEZVOUS2 = 37,
        /// Acknowledgement of ESTABLISH_RENDEZVOUS.
        RENDEZVOUS_ESTABLISHED = 39,
        /// Acknowledgement of INTRODUCE1.
        INTRODUCE_ACK = 40,
        /// Negotiate circuit-level padding (ignored by this client).
        PADDING_NEGOTIATED = 42,
    }
}

int_enum! {
    /// Reason code for an END or TRUNCATED relay message.
    ///
    /// Positions are 1-indexed per Tor's fixed reason list.
    pub struct Reason(u8) {
        MISC = 1,
        RESOLVEFAILED = 2,
        CONNECTREFUSED = 3,
        EXITPOLICY = 4,
        DESTROY = 5,
        DONE = 6,
        TIMEOUT = 7,
        NOROUTE = 8,
        HIBERNATING = 9,
        INTERNAL = 10,
        RESOURCELIMIT = 11,
        CONNRESET = 12,
        TORPROTOCOL = 13,
        NOTDIRECTORY = 14,
    }
}

/// A decoded relay message: the header fields plus its data payload.
#[derive(Debug, Clone)]
pub struct RelayMsg {
    /// The relay command.
    pub cmd: RelayCmd,
    /// Stream id this message applies to; zero for circuit-level
    /// messages (e.g. a circuit-level SENDME).
    pub stream_id: u16,
    /// The message body (already stripped of header and padding).
    pub data: Vec<u8>,
}

impl RelayMsg {
    /// Construct a new relay message.
    pub fn new(cmd: RelayCmd, stream_id: u16, data: Vec<u8>) -> Self {
        RelayMsg { cmd, stream_id, data }
    }

    /// Encode this message into a full 509-byte relay-cell body, with
    /// the digest field left zeroed (the caller fills it in once the
    /// hop's running digest has been updated — see
    /// [`crate::relaycell::zero_digest_region`]).
    pub fn encode(&self) -> Result<Box<[u8; CELL_DATA_LEN]>> {
        if self.data.len() > MAX_RELAY_DATA_LEN {
            return Err(Error::BadBody("relay message data too long for one cell"));
        }
        let mut w = Writer::new();
        w.write_u8(self.cmd.0);
        w.write_u16(0); // recognized
        w.write_u16(self.stream_id);
        w.write_u32(0); // digest placeholder
        w.write_u16(self.data.len() as u16);
        w.write(&self.data);
        let mut body = Box::new([0u8; CELL_DATA_LEN]);
        let bytes = w.into_vec();
        body[..bytes.len()].copy_from_slice(&bytes);
        Ok(body)
    }

    /// Decode a relay message from an already-decrypted 509-byte
    /// relay-cell body. Does not check `recognized` or the digest;
    /// callers do that as part of the per-hop decryption loop (see
    /// `garlic-proto`).
    pub fn decode(body: &[u8; CELL_DATA_LEN]) -> Result<Self> {
        let mut r = Reader::from_slice(&body[..]);
        let cmd = RelayCmd(r.take_u8()?);
        let _recognized = r.take_u16()?;
        let stream_id = r.take_u16()?;
        let _digest = r.take_array::<4>()?;
        let length = r.take_u16()? as usize;
        if length > MAX_RELAY_DATA_LEN {
            return Err(Error::BadBody("relay message length field out of range"));
        }
        let data = r.take(length)?.to_vec();
        Ok(RelayMsg { cmd, stream_id, data })
    }
}

/// Offsets within a relay-cell body, used when computing or verifying
/// the digest chain (the digest field itself must be zeroed first).
pub const RECOGNIZED_OFFSET: usize = 1;
pub const DIGEST_OFFSET: usize = 5;
pub const DIGEST_LEN: usize = 4;

/// Returns true if the "recognized" field of a decrypted relay-cell
/// body is zero, i.e. this hop may own the cell.
pub fn is_recognized(body: &[u8; CELL_DATA_LEN]) -> bool {
    body[RECOGNIZED_OFFSET] == 0 && body[RECOGNIZED_OFFSET + 1] == 0
}

/// Zero the digest field of a relay-cell body in place, as required
/// before feeding the body into a running digest for either computation
/// or verification.
pub fn zero_digest_region(body: &mut [u8; CELL_DATA_LEN]) {
    body[DIGEST_OFFSET..DIGEST_OFFSET + DIGEST_LEN].fill(0);
}

/// Read the digest field out of a relay-cell body.
pub fn read_digest(body: &[u8; CELL_DATA_LEN]) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&body[DIGEST_OFFSET..DIGEST_OFFSET + DIGEST_LEN]);
    out
}

/// Write a computed digest into a relay-cell body's digest field.
pub fn write_digest(body: &mut [u8; CELL_DATA_LEN], digest: [u8; DIGEST_LEN]) {
    body[DIGEST_OFFSET..DIGEST_OFFSET + DIGEST_LEN].copy_from_slice(&digest);
}

/// Build a `BEGIN` message body: `"host:port\0"` followed by a 4-byte
/// flags word.
pub fn begin_body(target: &str) -> Vec<u8> {
    let mut w = Writer::new();
    w.write(target.as_bytes());
    w.write_u8(0);
    w.write_u32(0);
    w.into_vec()
}

/// Build an `END` message body from a reason.
pub fn end_body(reason: Reason) -> Vec<u8> {
    vec![reason.0]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn relay_msg_roundtrip() {
        let msg = RelayMsg::new(RelayCmd::DATA, 7, b"hello".to_vec());
        let mut body = msg.encode().unwrap();
        // Simulate the digest being filled in after encoding.
        write_digest(&mut body, [1, 2, 3, 4]);
        let decoded = RelayMsg::decode(&body).unwrap();
        assert_eq!(decoded.cmd, RelayCmd::DATA);
        assert_eq!(decoded.stream_id, 7);
        assert_eq!(decoded.data, b"hello");
        assert!(is_recognized(&body));
        assert_eq!(read_digest(&body), [1, 2, 3, 4]);
    }

    #[test]
    fn begin_body_matches_wire_format() {
        let body = begin_body("example.onion:80");
        assert_eq!(&body[..17], b"example.onion:80\0");
        assert_eq!(body.len(), 17 + 4);
    }

    #[test]
    fn end_reason_round_trips_through_position() {
        assert_eq!(Reason::TORPROTOCOL.0, 13);
        assert_eq!(Reason::NOTDIRECTORY.0, 14);
        let unknown = Reason(250);
        assert_eq!(unknown.name(), None);
    }

    #[test]
    fn data_message_too_long_is_rejected() {
        let msg = RelayMsg::new(RelayCmd::DATA, 1, vec![0u8; MAX_RELAY_DATA_LEN + 1]);
        assert!(msg.encode().is_err());
    }
}
