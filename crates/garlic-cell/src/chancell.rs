//! Framing for the cells exchanged directly over a Tor link (as opposed
//! to the relay-cell format carried inside `RELAY`/`RELAY_EARLY`
//! payloads — see [`crate::relaycell`]).

use crate::int_enum::int_enum;
use crate::{Error, Result};
use garlic_bytes::{Reader, Writer};

/// Payload size of a fixed-length cell, after the circuit-id/command header.
pub const CELL_DATA_LEN: usize = 509;
/// Total size of a fixed-length cell on the wire.
pub const CELL_LEN: usize = 514;

int_enum! {
    /// The command byte of a channel (link-level) cell.
    pub struct ChanCmd(u8) {
        /// Dropped padding.
        PADDING = 0,
        /// Begin a circuit (legacy TAP handshake). Not used by this client.
        CREATE = 1,
        /// Reply to CREATE. Not used by this client.
        CREATED = 2,
        /// A relay cell, multiplexed onto a circuit.
        RELAY = 3,
        /// Tear down a circuit.
        DESTROY = 4,
        /// Begin a circuit (ntor). Not used directly; CREATE2 is used instead.
        CREATE_FAST = 5,
        /// Reply to CREATE_FAST.
        CREATED_FAST = 6,
        /// Negotiate the link protocol version.
        VERSIONS = 7,
        /// Exchange observed addresses after the TLS handshake.
        NETINFO = 8,
        /// A relay cell sent before the circuit is fully extended.
        RELAY_EARLY = 9,
        /// Begin a circuit with a modern (ntor) handshake.
        CREATE2 = 10,
        /// Reply to CREATE2.
        CREATED2 = 11,
        /// Variable-length padding.
        VPADDING = 128,
        /// Relay and auth certificates presented during link setup.
        CERTS = 129,
        /// Challenge to authenticate as a relay. Ignored by this client.
        AUTH_CHALLENGE = 130,
        /// Relay authentication. Never sent by this client.
        AUTHENTICATE = 131,
    }
}

impl ChanCmd {
    /// True if cells with this command use the variable-length framing
    /// (4-byte circuit id, 1-byte command, 2-byte length, `length` bytes),
    /// as opposed to the fixed 514-byte frame.
    ///
    /// `VERSIONS` is a further special case: see [`Framing::classify`].
    pub fn is_variable_length(&self) -> bool {
        matches!(
            *self,
            ChanCmd::VERSIONS
                | ChanCmd::NETINFO
                | ChanCmd::VPADDING
                | ChanCmd::CERTS
                | ChanCmd::AUTH_CHALLENGE
                | ChanCmd::AUTHENTICATE
        )
    }
}

/// A decoded link cell.
#[derive(Debug, Clone)]
pub enum ChanCell {
    /// `VERSIONS`: the single cell that uses a 2-byte circuit id.
    Versions { versions: Vec<u16> },
    /// `CERTS`: certificate chain presented by the peer. Contents are
    /// opaque to this client, which ignores them entirely.
    Certs { circ_id: u32, body: Vec<u8> },
    /// `AUTH_CHALLENGE`: we never authenticate as a relay, so this is
    /// parsed only far enough to be skipped.
    AuthChallenge { circ_id: u32, body: Vec<u8> },
    /// `NETINFO`: addresses observed by each side.
    Netinfo { circ_id: u32, body: Vec<u8> },
    /// `RELAY`: carries one layer-encrypted relay cell.
    Relay { circ_id: u32, body: Box<[u8; CELL_DATA_LEN]> },
    /// `RELAY_EARLY`: like `RELAY`, but only legal before a circuit has
    /// more than one hop (used for the first EXTEND2).
    RelayEarly { circ_id: u32, body: Box<[u8; CELL_DATA_LEN]> },
    /// `DESTROY`: tear down a circuit; payload's first byte is the reason.
    Destroy { circ_id: u32, body: Box<[u8; CELL_DATA_LEN]> },
    /// `CREATED2`: reply to our `CREATE2`.
    Created2 { circ_id: u32, body: Box<[u8; CELL_DATA_LEN]> },
    /// A well-formed cell whose command we don't act on; the link layer
    /// consumes it silently.
    Unknown { circ_id: u32, cmd: ChanCmd, body: Vec<u8> },
}

impl ChanCell {
    /// The command of this cell.
    pub fn cmd(&self) -> ChanCmd {
        match self {
            ChanCell::Versions { .. } => ChanCmd::VERSIONS,
            ChanCell::Certs { .. } => ChanCmd::CERTS,
            ChanCell::AuthChallenge { .. } => ChanCmd::AUTH_CHALLENGE,
            ChanCell::Netinfo { .. } => ChanCmd::NETINFO,
            ChanCell::Relay { .. } => ChanCmd::RELAY,
            ChanCell::RelayEarly { .. } => ChanCmd::RELAY_EARLY,
            ChanCell::Destroy { .. } => ChanCmd::DESTROY,
            ChanCell::Created2 { .. } => ChanCmd::CREATED2,
            ChanCell::Unknown { cmd, .. } => *cmd,
        }
    }

    /// The circuit id this cell applies to (zero for channel-wide cells
    /// like VERSIONS).
    pub fn circ_id(&self) -> u32 {
        match self {
            ChanCell::Versions { .. } => 0,
            ChanCell::Certs { circ_id, .. }
            | ChanCell::AuthChallenge { circ_id, .. }
            | ChanCell::Netinfo { circ_id, .. }
            | ChanCell::Relay { circ_id, .. }
            | ChanCell::RelayEarly { circ_id, .. }
            | ChanCell::Destroy { circ_id, .. }
            | ChanCell::Created2 { circ_id, .. }
            | ChanCell::Unknown { circ_id, .. } => *circ_id,
        }
    }

    /// Encode this cell to its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            ChanCell::Versions { versions } => {
                // 2-byte circ id (always 0), 1-byte cmd, 2-byte length, then versions.
                w.write_u16(0);
                w.write_u8(ChanCmd::VERSIONS.0);
                w.write_u16((versions.len() * 2) as u16);
                for v in versions {
                    w.write_u16(*v);
                }
            }
            ChanCell::Certs { circ_id, body } => encode_variable(&mut w, *circ_id, ChanCmd::CERTS, body),
            ChanCell::AuthChallenge { circ_id, body } => {
                encode_variable(&mut w, *circ_id, ChanCmd::AUTH_CHALLENGE, body)
            }
            ChanCell::Netinfo { circ_id, body } => encode_variable(&mut w, *circ_id, ChanCmd::NETINFO, body),
            ChanCell::Relay { circ_id, body } => encode_fixed(&mut w, *circ_id, ChanCmd::RELAY, &body[..]),
            ChanCell::RelayEarly { circ_id, body } => {
                encode_fixed(&mut w, *circ_id, ChanCmd::RELAY_EARLY, &body[..])
            }
            ChanCell::Destroy { circ_id, body } => encode_fixed(&mut w, *circ_id, ChanCmd::DESTROY, &body[..]),
            ChanCell::Created2 { circ_id, body } => {
                encode_fixed(&mut w, *circ_id, ChanCmd::CREATED2, &body[..])
            }
            ChanCell::Unknown { circ_id, cmd, body } => {
                if cmd.is_variable_length() {
                    encode_variable(&mut w, *circ_id, *cmd, body)
                } else {
                    encode_fixed(&mut w, *circ_id, *cmd, body)
                }
            }
        }
        w.into_vec()
    }
}

fn encode_fixed(w: &mut Writer, circ_id: u32, cmd: ChanCmd, payload: &[u8]) {
    w.write_u32(circ_id);
    w.write_u8(cmd.0);
    debug_assert!(payload.len() <= CELL_DATA_LEN);
    w.write(payload);
    if payload.len() < CELL_DATA_LEN {
        w.write_zeroes(CELL_DATA_LEN - payload.len());
    }
}

fn encode_variable(w: &mut Writer, circ_id: u32, cmd: ChanCmd, payload: &[u8]) {
    w.write_u32(circ_id);
    w.write_u8(cmd.0);
    w.write_u16(payload.len() as u16);
    w.write(payload);
}

/// The result of attempting to decode one cell from the front of a buffer.
pub enum Decoded<'a> {
    /// A cell was decoded; `rest` is everything after it.
    Cell(ChanCell, &'a [u8]),
    /// Not enough bytes were present yet; the caller should read more
    /// from the link and retry with a larger buffer.
    NeedMore,
}

/// Attempt to decode a single cell from the front of `buf`.
///
/// `accept_versions` should be true only while we are still waiting for
/// the initial `VERSIONS` cell, since that is the only point at which a
/// 2-byte circuit id is legal.
pub fn decode(buf: &[u8], accept_versions: bool) -> Result<Decoded<'_>> {
    if accept_versions {
        return decode_versions(buf);
    }
    if buf.len() < 5 {
        return Ok(Decoded::NeedMore);
    }
    let circ_id = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let cmd = ChanCmd(buf[4]);
    if cmd.is_variable_length() {
        decode_variable(buf, circ_id, cmd)
    } else {
        decode_fixed(buf, circ_id, cmd)
    }
}

fn decode_versions(buf: &[u8]) -> Result<Decoded<'_>> {
    if buf.len() < 5 {
        return Ok(Decoded::NeedMore);
    }
    let cmd = buf[2];
    if cmd != ChanCmd::VERSIONS.0 {
        // We already have a full 5-byte header; if it's not VERSIONS it
        // can never become one, so surface it as an unrecognized frame.
        return Err(Error::UnknownCell(cmd));
    }
    let len = u16::from_be_bytes([buf[3], buf[4]]) as usize;
    if buf.len() < 5 + len {
        return Ok(Decoded::NeedMore);
    }
    let mut r = Reader::from_slice(&buf[5..5 + len]);
    let mut versions = Vec::with_capacity(len / 2);
    while !r.is_exhausted() {
        versions.push(r.take_u16()?);
    }
    Ok(Decoded::Cell(ChanCell::Versions { versions }, &buf[5 + len..]))
}

fn decode_fixed(buf: &[u8], circ_id: u32, cmd: ChanCmd) -> Result<Decoded<'_>> {
    if buf.len() < CELL_LEN {
        return Ok(Decoded::NeedMore);
    }
    let mut body = Box::new([0u8; CELL_DATA_LEN]);
    body.copy_from_slice(&buf[5..CELL_LEN]);
    let rest = &buf[CELL_LEN..];
    let cell = match cmd {
        ChanCmd::RELAY => ChanCell::Relay { circ_id, body },
        ChanCmd::RELAY_EARLY => ChanCell::RelayEarly { circ_id, body },
        ChanCmd::DESTROY => ChanCell::Destroy { circ_id, body },
        ChanCmd::CREATED2 => ChanCell::Created2 { circ_id, body },
        other => {
            // Well-formed, but not a command this client acts on: the
            // link layer is expected to consume and ignore it.
            ChanCell::Unknown { circ_id, cmd: other, body: body.to_vec() }
        }
    };
    Ok(Decoded::Cell(cell, rest))
}

fn decode_variable(buf: &[u8], circ_id: u32, cmd: ChanCmd) -> Result<Decoded<'_>> {
    if buf.len() < 7 {
        return Ok(Decoded::NeedMore);
    }
    let len = u16::from_be_bytes([buf[5], buf[6]]) as usize;
    if buf.len() < 7 + len {
        return Ok(Decoded::NeedMore);
    }
    let body = buf[7..7 + len].to_vec();
    let rest = &buf[7 + len..];
    let cell = match cmd {
        ChanCmd::CERTS => ChanCell::Certs { circ_id, body },
        ChanCmd::AUTH_CHALLENGE => ChanCell::AuthChallenge { circ_id, body },
        ChanCmd::NETINFO => ChanCell::Netinfo { circ_id, body },
        other => ChanCell::Unknown { circ_id, cmd: other, body },
    };
    Ok(Decoded::Cell(cell, rest))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn versions_roundtrip() {
        let cell = ChanCell::Versions { versions: vec![4] };
        let enc = cell.encode();
        match decode(&enc, true).unwrap() {
            Decoded::Cell(ChanCell::Versions { versions }, rest) => {
                assert_eq!(versions, vec![4]);
                assert!(rest.is_empty());
            }
            _ => panic!("expected a Versions cell"),
        }
    }

    #[test]
    fn fixed_cell_roundtrip_and_padding() {
        let mut body = Box::new([0u8; CELL_DATA_LEN]);
        body[0] = 0xAB;
        let cell = ChanCell::Relay { circ_id: 0x8000_0001, body };
        let enc = cell.encode();
        assert_eq!(enc.len(), CELL_LEN);
        match decode(&enc, false).unwrap() {
            Decoded::Cell(ChanCell::Relay { circ_id, body }, rest) => {
                assert_eq!(circ_id, 0x8000_0001);
                assert_eq!(body[0], 0xAB);
                assert!(rest.is_empty());
            }
            _ => panic!("expected a Relay cell"),
        }
    }

    #[test]
    fn need_more_on_partial_fixed_cell() {
        let buf = [0u8; CELL_LEN - 1];
        assert!(matches!(decode(&buf, false).unwrap(), Decoded::NeedMore));
    }

    #[test]
    fn unknown_fixed_command_is_consumed_not_errored() {
        let mut raw = vec![0, 0, 0, 1, 250];
        raw.extend_from_slice(&[0u8; CELL_DATA_LEN]);
        match decode(&raw, false).unwrap() {
            Decoded::Cell(ChanCell::Unknown { cmd, .. }, rest) => {
                assert_eq!(cmd.0, 250);
                assert!(rest.is_empty());
            }
            _ => panic!("expected an Unknown cell"),
        }
    }

    #[test]
    fn two_cells_back_to_back_leave_no_remainder_issue() {
        let c1 = ChanCell::Relay { circ_id: 1, body: Box::new([1u8; CELL_DATA_LEN]) }.encode();
        let c2 = ChanCell::Relay { circ_id: 2, body: Box::new([2u8; CELL_DATA_LEN]) }.encode();
        let mut both = c1.clone();
        both.extend_from_slice(&c2);
        let (first, rest) = match decode(&both, false).unwrap() {
            Decoded::Cell(cell, rest) => (cell, rest),
            Decoded::NeedMore => panic!("should have decoded"),
        };
        assert_eq!(first.circ_id(), 1);
        assert_eq!(rest.len(), CELL_LEN);
        match decode(rest, false).unwrap() {
            Decoded::Cell(cell, rest2) => {
                assert_eq!(cell.circ_id(), 2);
                assert!(rest2.is_empty());
            }
            Decoded::NeedMore => panic!("should have decoded"),
        }
    }
}
