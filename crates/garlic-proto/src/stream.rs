//! Stream multiplexing inside a circuit.
//!
//! A circuit may carry several logical streams at once, each
//! identified by a non-zero 16-bit id chosen by the client. This
//! module holds the per-stream bookkeeping; [`crate::circuit::Circuit`]
//! owns the map of `StreamId -> StreamState` and drives the actual
//! send/receive loop.

use garlic_cell::relaycell::Reason;

/// The stream-level flow-control delivery window's initial value.
pub const INITIAL_STREAM_WINDOW: i32 = 500;
/// The stream window is replenished by a stream-level SENDME every
/// time it falls to a multiple of this many cells.
pub const STREAM_SENDME_INCREMENT: i32 = 50;
/// The maximum bytes of application data carried in one relay DATA cell.
pub const MAX_DATA_PER_CELL: usize = garlic_cell::relaycell::MAX_RELAY_DATA_LEN;

/// A stream's lifecycle state as seen by the owning circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// `BEGIN`/`BEGIN_DIR` sent, awaiting `CONNECTED` (or, for a
    /// directory stream, the first relay cell at all, which counts as
    /// implicit success).
    Opening,
    /// Open and able to carry `DATA` in both directions.
    Open,
    /// Closed by `END`, `TRUNCATED`, or circuit teardown.
    Closed,
}

/// Per-stream bookkeeping kept by the owning circuit.
pub struct StreamState {
    /// This stream's delivery window, decremented by one per inbound
    /// `DATA` cell.
    pub window: i32,
    /// Current lifecycle phase.
    pub phase: StreamPhase,
    /// True if this is a directory stream (`BEGIN_DIR`), which is
    /// implicitly connected on the first relay cell rather than
    /// requiring an explicit `CONNECTED`.
    pub is_dir: bool,
}

impl StreamState {
    /// Construct a newly-opened stream's bookkeeping.
    pub fn new(is_dir: bool) -> Self {
        StreamState { window: INITIAL_STREAM_WINDOW, phase: StreamPhase::Opening, is_dir }
    }
}

/// What happened on a stream as the circuit's receive loop processed
/// one inbound relay cell.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// `CONNECTED` (or, for a directory stream, any relay cell):
    /// the stream is now open.
    Connected,
    /// `DATA`: application bytes arrived.
    Data(Vec<u8>),
    /// `END` or `TRUNCATED`: the stream (or circuit) is closing.
    Closed(Reason),
}
