use cu29::clock::{CuDuration, CuTime};
use serde::Serialize;

/// Per-stream snapshot reported by the stream aligner.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StreamStatus {
    pub name: String,
    pub priority: i32,
    pub active: bool,
    /// Time span currently buffered on this stream (newest pushed minus
    /// oldest buffered sample).
    pub latency: CuDuration,
    pub buffer_fill: usize,
    /// 0 means unbounded.
    pub buffer_capacity: usize,
    pub samples_received: u64,
    pub samples_processed: u64,
    pub samples_dropped_buffer_full: u64,
}

/// Snapshot of the stream aligner.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StreamAlignerStatus {
    /// Wall clock time at which the snapshot was taken.
    pub time: CuTime,
    /// Timestamp of the most recently released sample, 0 if none yet.
    pub latest_time: CuTime,
    pub streams: Vec<StreamStatus>,
}

/// Per-handle snapshot, one entry per registered transformation.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TransformationStatus {
    /// The local (non-mapped) name of the source frame.
    pub source_local: String,
    /// The local (non-mapped) name of the target frame.
    pub target_local: String,
    /// The global (mapped) name of the source frame.
    pub source_global: String,
    /// The global (mapped) name of the target frame.
    pub target_global: String,
    /// Timestamp of the last generated transformation.
    pub last_generated_value: CuTime,
    /// Number of chain elements used to generate this transformation,
    /// 0 if no chain could be found so far.
    pub chain_length: i32,
    pub generated_transformations: u64,
    pub failed_no_chain: u64,
    pub failed_no_sample: u64,
    pub failed_interpolation_impossible: u64,
}

/// Status of the whole transformer.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TransformerStatus {
    pub time: CuTime,
    pub transformations: Vec<TransformationStatus>,
}
