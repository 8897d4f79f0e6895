//! Time-ordered multiplexer over N heterogeneous sample streams.
//!
//! Samples are pushed per stream in timestamp order and released globally in
//! non-decreasing timestamp order, one per [`StreamAligner::step`] call. A
//! period-0 stream with an empty buffer holds back every sample on the other
//! streams that is newer than its last released timestamp (all of them while
//! it has never released), until either a sample arrives or the timeout
//! since the last release runs out.

use crate::error::{TransformError, TransformResult};
use crate::status::{StreamAlignerStatus, StreamStatus};
use cu29::clock::{CuDuration, CuTime, RobotClock};
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Stable identifier of a registered stream. Freed slots are reused.
pub type StreamId = usize;

/// How long the aligner waits on a stalled stream before skipping it in the
/// horizon computation. 0 disables the escape.
const DEFAULT_TIMEOUT: CuDuration = CuDuration(1_000_000_000);

/// Buffer of time-ordered samples of one stream.
pub(crate) struct SampleBuffer<P> {
    samples: VecDeque<(CuTime, P)>,
    /// 0 means unbounded, otherwise the oldest sample is dropped on overflow.
    capacity: usize,
    last_pushed: Option<CuTime>,
    received: u64,
    dropped: u64,
}

impl<P> SampleBuffer<P> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity,
            last_pushed: None,
            received: 0,
            dropped: 0,
        }
    }

    pub(crate) fn push(&mut self, stream: StreamId, time: CuTime, payload: P) -> TransformResult<()> {
        if let Some(last) = self.last_pushed {
            if time < last {
                return Err(TransformError::OutOfOrderPush {
                    stream,
                    pushed: time,
                    last,
                });
            }
        }
        if self.capacity != 0 && self.samples.len() >= self.capacity {
            self.samples.pop_front();
            self.dropped += 1;
        }
        self.last_pushed = Some(time);
        self.samples.push_back((time, payload));
        self.received += 1;
        Ok(())
    }

    pub(crate) fn peek(&self) -> Option<&(CuTime, P)> {
        self.samples.front()
    }

    fn head_time(&self) -> Option<CuTime> {
        self.samples.front().map(|(t, _)| *t)
    }

    fn pop(&mut self) -> Option<(CuTime, P)> {
        self.samples.pop_front()
    }

    fn latency(&self) -> CuDuration {
        match (self.head_time(), self.last_pushed) {
            (Some(head), Some(last)) => last - head,
            _ => CuDuration::default(),
        }
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.last_pushed = None;
        self.received = 0;
        self.dropped = 0;
    }
}

type StreamCallback<P> = Box<dyn FnMut(CuTime, P) -> TransformResult<()>>;

struct StreamEntry<P: 'static> {
    buffer: Rc<RefCell<SampleBuffer<P>>>,
    callback: StreamCallback<P>,
}

/// Type-erased view of a stream, what `step` needs to order and release.
trait AlignedStream {
    fn head_time(&self) -> Option<CuTime>;
    /// Pops the oldest sample and runs the callback on it.
    fn release_next(&mut self) -> TransformResult<Option<CuTime>>;
    fn drain(&mut self);
    fn buffer_fill(&self) -> usize;
    fn buffer_capacity(&self) -> usize;
    fn latency(&self) -> CuDuration;
    fn received(&self) -> u64;
    fn dropped(&self) -> u64;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<P: 'static> AlignedStream for StreamEntry<P> {
    fn head_time(&self) -> Option<CuTime> {
        self.buffer.borrow().head_time()
    }

    fn release_next(&mut self) -> TransformResult<Option<CuTime>> {
        // The borrow is dropped before the callback runs so the callback can
        // peek this very buffer through its own handle.
        let sample = self.buffer.borrow_mut().pop();
        match sample {
            Some((time, payload)) => {
                (self.callback)(time, payload)?;
                Ok(Some(time))
            }
            None => Ok(None),
        }
    }

    fn drain(&mut self) {
        self.buffer.borrow_mut().clear();
    }

    fn buffer_fill(&self) -> usize {
        self.buffer.borrow().samples.len()
    }

    fn buffer_capacity(&self) -> usize {
        self.buffer.borrow().capacity
    }

    fn latency(&self) -> CuDuration {
        self.buffer.borrow().latency()
    }

    fn received(&self) -> u64 {
        self.buffer.borrow().received
    }

    fn dropped(&self) -> u64 {
        self.buffer.borrow().dropped
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct StreamSlot {
    name: String,
    /// Expected inter-sample interval, 0 means block until the next sample.
    period: CuDuration,
    /// Tie breaker on equal timestamps, lower values are released first.
    priority: i32,
    enabled: bool,
    last_released: Option<CuTime>,
    processed: u64,
    stream: Box<dyn AlignedStream>,
}

pub struct StreamAligner {
    streams: Vec<Option<StreamSlot>>,
    timeout: CuDuration,
    clock: RobotClock,
    last_progress: CuTime,
    latest_released: Option<CuTime>,
}

impl StreamAligner {
    pub fn new(clock: RobotClock) -> Self {
        let last_progress = clock.now();
        Self {
            streams: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            clock,
            last_progress,
            latest_released: None,
        }
    }

    /// Reserves a stream and returns its stable id.
    ///
    /// `buffer_cap` of 0 means unbounded, otherwise the oldest buffered
    /// sample is dropped when the buffer is full. A `period` of 0 makes the
    /// aligner block on this stream whenever its buffer is empty.
    pub fn register_stream<P: 'static>(
        &mut self,
        callback: impl FnMut(CuTime, P) -> TransformResult<()> + 'static,
        buffer_cap: usize,
        period: CuDuration,
        priority: i32,
        name: &str,
    ) -> StreamId {
        let slot = StreamSlot {
            name: name.to_string(),
            period,
            priority,
            enabled: true,
            last_released: None,
            processed: 0,
            stream: Box::new(StreamEntry::<P> {
                buffer: Rc::new(RefCell::new(SampleBuffer::new(buffer_cap))),
                callback: Box::new(callback),
            }),
        };
        match self.streams.iter().position(Option::is_none) {
            Some(id) => {
                self.streams[id] = Some(slot);
                id
            }
            None => {
                self.streams.push(Some(slot));
                self.streams.len() - 1
            }
        }
    }

    /// Drops the stream and its buffered samples without running callbacks.
    /// Unregistering an unknown stream is a no-op.
    pub fn unregister_stream(&mut self, id: StreamId) {
        if let Some(slot) = self.streams.get_mut(id) {
            *slot = None;
        }
    }

    /// Enqueues a sample. Timestamps on one stream must be non-decreasing.
    pub fn push<P: 'static>(
        &mut self,
        id: StreamId,
        time: CuTime,
        payload: P,
    ) -> TransformResult<()> {
        let slot = self
            .streams
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(TransformError::UnknownStream(id))?;
        let entry = slot
            .stream
            .as_any_mut()
            .downcast_mut::<StreamEntry<P>>()
            .ok_or(TransformError::PayloadTypeMismatch { stream: id })?;
        entry.buffer.borrow_mut().push(id, time, payload)
    }

    /// Peeks the next buffered sample of a stream without releasing it.
    pub fn get_next_sample<P: Clone + 'static>(
        &self,
        id: StreamId,
    ) -> TransformResult<Option<(CuTime, P)>> {
        let slot = self
            .streams
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(TransformError::UnknownStream(id))?;
        let entry = slot
            .stream
            .as_any()
            .downcast_ref::<StreamEntry<P>>()
            .ok_or(TransformError::PayloadTypeMismatch { stream: id })?;
        let buffer = entry.buffer.borrow();
        Ok(buffer.peek().cloned())
    }

    /// Hands out the shared buffer of a stream so a peer (the dynamic
    /// transformation elements) can peek it while a callback is running.
    pub(crate) fn buffer_handle<P: 'static>(
        &self,
        id: StreamId,
    ) -> TransformResult<Rc<RefCell<SampleBuffer<P>>>> {
        let slot = self
            .streams
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(TransformError::UnknownStream(id))?;
        let entry = slot
            .stream
            .as_any()
            .downcast_ref::<StreamEntry<P>>()
            .ok_or(TransformError::PayloadTypeMismatch { stream: id })?;
        Ok(entry.buffer.clone())
    }

    /// Releases the globally oldest sample and runs its callback.
    ///
    /// Returns `Ok(false)` when no progress is possible: all buffers are
    /// empty, an empty stream with a prior release still owes a sample older
    /// than every buffered head, or a period-0 stream has never been
    /// observed — in each case until the timeout runs out.
    pub fn step(&mut self) -> TransformResult<bool> {
        let now = self.clock.now();
        let expired =
            self.timeout.as_nanos() != 0 && now > self.last_progress + self.timeout;

        // The horizon a released sample must not overtake: the earliest
        // expected-but-missing sample among the drained streams.
        let mut gate: Option<CuTime> = None;
        // Best releasable candidate: smallest head, then lowest priority
        // value, then lowest id.
        let mut best: Option<(CuTime, i32, StreamId)> = None;

        for (id, slot) in self.streams.iter().enumerate() {
            let Some(slot) = slot else { continue };
            if !slot.enabled {
                continue;
            }
            match slot.stream.head_time() {
                Some(head) => {
                    let better = match best {
                        None => true,
                        Some((best_head, best_prio, best_id)) => {
                            head < best_head
                                || (head == best_head
                                    && (slot.priority < best_prio
                                        || (slot.priority == best_prio && id < best_id)))
                        }
                    };
                    if better {
                        best = Some((head, slot.priority, id));
                    }
                }
                None => {
                    if expired {
                        // Empty but expired, skipped in the horizon.
                        continue;
                    }
                    match slot.last_released {
                        Some(last) => {
                            // Monotonicity bounds this stream's next sample
                            // from below; for period 0 the bound is the last
                            // released timestamp itself.
                            let expected = last + slot.period;
                            gate = Some(gate.map_or(expected, |g| g.min(expected)));
                        }
                        None if slot.period.as_nanos() == 0 => {
                            // Never observed: unknown horizon, the next
                            // sample on this stream could be older than any
                            // buffered head.
                            return Ok(false);
                        }
                        None => {}
                    }
                }
            }
        }

        let Some((head, _, id)) = best else {
            return Ok(false);
        };
        if let Some(gate) = gate {
            if head > gate {
                // A drained stream still owes an older sample.
                return Ok(false);
            }
        }

        let slot = self.streams[id].as_mut().expect("candidate slot vanished");
        match slot.stream.release_next()? {
            Some(time) => {
                slot.processed += 1;
                slot.last_released = Some(time);
                self.latest_released = Some(self.latest_released.map_or(time, |l| l.max(time)));
                self.last_progress = self.clock.now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Bounds how long the aligner holds back younger samples while an empty
    /// stream gates the horizon. 0 disables the escape.
    pub fn set_timeout(&mut self, timeout: CuDuration) {
        self.timeout = timeout;
    }

    /// Drops all buffered samples and release bookkeeping. Registered
    /// streams and their callbacks stay in place.
    pub fn clear(&mut self) {
        for slot in self.streams.iter_mut().flatten() {
            slot.stream.drain();
            slot.last_released = None;
            slot.processed = 0;
        }
        self.latest_released = None;
        self.last_progress = self.clock.now();
    }

    pub fn enable_stream(&mut self, id: StreamId) {
        if let Some(slot) = self.streams.get_mut(id).and_then(Option::as_mut) {
            slot.enabled = true;
        }
    }

    pub fn disable_stream(&mut self, id: StreamId) {
        if let Some(slot) = self.streams.get_mut(id).and_then(Option::as_mut) {
            slot.enabled = false;
        }
    }

    pub fn is_stream_active(&self, id: StreamId) -> bool {
        self.streams
            .get(id)
            .and_then(Option::as_ref)
            .map(|slot| slot.enabled)
            .unwrap_or(false)
    }

    pub fn status(&self) -> StreamAlignerStatus {
        StreamAlignerStatus {
            time: self.clock.now(),
            latest_time: self.latest_released.unwrap_or_default(),
            streams: self
                .streams
                .iter()
                .flatten()
                .map(|slot| StreamStatus {
                    name: slot.name.clone(),
                    priority: slot.priority,
                    active: slot.enabled,
                    latency: slot.stream.latency(),
                    buffer_fill: slot.stream.buffer_fill(),
                    buffer_capacity: slot.stream.buffer_capacity(),
                    samples_received: slot.stream.received(),
                    samples_processed: slot.processed,
                    samples_dropped_buffer_full: slot.stream.dropped(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cu29::clock::RobotClock;
    use std::time::Duration;

    fn collector() -> (
        Rc<RefCell<Vec<(CuTime, u32)>>>,
        impl FnMut(CuTime, u32) -> TransformResult<()>,
    ) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |ts, value| {
            sink.borrow_mut().push((ts, value));
            Ok(())
        })
    }

    #[test]
    fn test_single_stream_in_order() {
        let (clock, _mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb) = collector();
        let id = aligner.register_stream(cb, 0, CuDuration(0), -1, "s0");

        for t in [10u64, 20, 30, 40, 50] {
            aligner.push(id, CuDuration(t), t as u32).unwrap();
        }
        while aligner.step().unwrap() {}

        let seen = seen.borrow();
        assert_eq!(seen.len(), 5);
        let times: Vec<u64> = seen.iter().map(|(t, _)| t.as_nanos()).collect();
        assert_eq!(times, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_multi_stream_global_order() {
        let (clock, mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb0) = collector();
        let sink = seen.clone();
        let cb1 = move |ts: CuTime, value: u32| {
            sink.borrow_mut().push((ts, value));
            Ok(())
        };
        let s0 = aligner.register_stream(cb0, 0, CuDuration(0), -1, "s0");
        let s1 = aligner.register_stream(cb1, 0, CuDuration(0), -1, "s1");

        for t in [10u64, 30, 50] {
            aligner.push(s0, CuDuration(t), t as u32).unwrap();
        }
        for t in [20u64, 40] {
            aligner.push(s1, CuDuration(t), t as u32).unwrap();
        }

        while aligner.step().unwrap() {}
        // s1 ran dry after 40, blocking 50 on s0 until the timeout runs out.
        assert_eq!(seen.borrow().len(), 4);

        mock.increment(Duration::from_secs(2));
        while aligner.step().unwrap() {}

        let times: Vec<u64> = seen.borrow().iter().map(|(t, _)| t.as_nanos()).collect();
        assert_eq!(times, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_priority_breaks_timestamp_ties() {
        let (clock, _mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb0) = collector();
        let sink = seen.clone();
        let cb1 = move |ts: CuTime, value: u32| {
            sink.borrow_mut().push((ts, value));
            Ok(())
        };
        let s0 = aligner.register_stream(cb0, 0, CuDuration(0), -1, "late");
        let s1 = aligner.register_stream(cb1, 0, CuDuration(0), -10, "early");

        aligner.push(s0, CuDuration(100), 0u32).unwrap();
        aligner.push(s1, CuDuration(100), 1u32).unwrap();

        assert!(aligner.step().unwrap());
        assert!(aligner.step().unwrap());

        // The lower priority value goes first.
        let values: Vec<u32> = seen.borrow().iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![1, 0]);
    }

    #[test]
    fn test_out_of_order_push_is_rejected() {
        let (clock, _mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb) = collector();
        let id = aligner.register_stream(cb, 0, CuDuration(0), -1, "s0");

        aligner.push(id, CuDuration(10), 10u32).unwrap();
        let err = aligner.push(id, CuDuration(5), 5u32).unwrap_err();
        assert!(matches!(err, TransformError::OutOfOrderPush { .. }));

        // The first sample is still delivered.
        assert!(aligner.step().unwrap());
        assert_eq!(seen.borrow().as_slice(), &[(CuDuration(10), 10)]);
    }

    #[test]
    fn test_bounded_buffer_drops_oldest() {
        let (clock, _mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb) = collector();
        let id = aligner.register_stream(cb, 2, CuDuration(0), -1, "s0");

        aligner.push(id, CuDuration(1), 1u32).unwrap();
        aligner.push(id, CuDuration(2), 2u32).unwrap();
        aligner.push(id, CuDuration(3), 3u32).unwrap();

        while aligner.step().unwrap() {}

        let values: Vec<u32> = seen.borrow().iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2, 3]);

        let status = aligner.status();
        assert_eq!(status.streams[0].samples_dropped_buffer_full, 1);
        assert_eq!(status.streams[0].samples_received, 3);
        assert_eq!(status.streams[0].samples_processed, 2);
    }

    #[test]
    fn test_empty_period_zero_stream_blocks() {
        let (clock, mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb0) = collector();
        let blocking = aligner.register_stream(
            |_ts, _value: u32| Ok(()),
            0,
            CuDuration(0),
            -10,
            "blocking",
        );
        let data = aligner.register_stream(cb0, 0, CuDuration(1_000_000_000), -1, "data");

        aligner.push(data, CuDuration(10), 10u32).unwrap();

        // The empty period-0 stream holds everything back.
        assert!(!aligner.step().unwrap());
        assert!(seen.borrow().is_empty());

        // Until the timeout runs out.
        mock.increment(Duration::from_secs(2));
        assert!(aligner.step().unwrap());
        assert_eq!(seen.borrow().len(), 1);

        // A fresh sample on the blocking stream resets the race.
        aligner.push(blocking, CuDuration(20), 20u32).unwrap();
        assert!(aligner.step().unwrap());
    }

    #[test]
    fn test_drained_period_zero_stream_bounds_by_last_release() {
        let (clock, mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb0) = collector();
        let sink = seen.clone();
        let cb1 = move |ts: CuTime, value: u32| {
            sink.borrow_mut().push((ts, value));
            Ok(())
        };
        let s0 = aligner.register_stream(cb0, 0, CuDuration(0), -1, "s0");
        let s1 = aligner.register_stream(cb1, 0, CuDuration(0), -1, "s1");

        aligner.push(s0, CuDuration(10), 0u32).unwrap();
        aligner.push(s1, CuDuration(10), 1u32).unwrap();
        aligner.push(s1, CuDuration(30), 3u32).unwrap();

        // s0 drains first on the tie; its last release still lets the
        // equal-timestamp sample on s1 through.
        assert!(aligner.step().unwrap());
        assert!(aligner.step().unwrap());
        assert_eq!(seen.borrow().len(), 2);

        // Anything strictly newer than s0's last release is gated.
        assert!(!aligner.step().unwrap());

        mock.increment(Duration::from_secs(2));
        assert!(aligner.step().unwrap());
        let times: Vec<u64> = seen.borrow().iter().map(|(t, _)| t.as_nanos()).collect();
        assert_eq!(times, vec![10, 10, 30]);
    }

    #[test]
    fn test_periodic_stream_gates_younger_samples() {
        let (clock, mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb0) = collector();
        let sink = seen.clone();
        let cb1 = move |ts: CuTime, value: u32| {
            sink.borrow_mut().push((ts, value));
            Ok(())
        };
        let periodic =
            aligner.register_stream(cb0, 0, CuDuration(1_000_000_000), -1, "periodic");
        let data = aligner.register_stream(cb1, 0, CuDuration(0), -1, "data");

        aligner.push(periodic, CuDuration(1_000_000_000), 1u32).unwrap();
        aligner
            .push(data, CuDuration(5_000_000_000), 5u32)
            .unwrap();

        // The periodic sample is older, it goes out first.
        assert!(aligner.step().unwrap());
        // Now the periodic stream expects a sample around t=2s, which gates
        // the t=5s data sample.
        assert!(!aligner.step().unwrap());

        mock.increment(Duration::from_secs(2));
        assert!(aligner.step().unwrap());
        let times: Vec<u64> = seen.borrow().iter().map(|(t, _)| t.as_nanos()).collect();
        assert_eq!(times, vec![1_000_000_000, 5_000_000_000]);
    }

    #[test]
    fn test_unregister_is_idempotent_and_drains() {
        let (clock, _mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb) = collector();
        let id = aligner.register_stream(cb, 0, CuDuration(0), -1, "s0");

        aligner.push(id, CuDuration(10), 10u32).unwrap();
        aligner.unregister_stream(id);
        aligner.unregister_stream(id);

        assert!(!aligner.step().unwrap());
        assert!(seen.borrow().is_empty());
        assert!(matches!(
            aligner.push(id, CuDuration(20), 20u32),
            Err(TransformError::UnknownStream(_))
        ));
    }

    #[test]
    fn test_get_next_sample_peeks_without_releasing() {
        let (clock, _mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb) = collector();
        let id = aligner.register_stream(cb, 0, CuDuration(0), -1, "s0");

        aligner.push(id, CuDuration(10), 10u32).unwrap();
        aligner.push(id, CuDuration(20), 20u32).unwrap();

        let peeked: Option<(CuTime, u32)> = aligner.get_next_sample(id).unwrap();
        assert_eq!(peeked, Some((CuDuration(10), 10)));

        assert!(aligner.step().unwrap());
        let peeked: Option<(CuTime, u32)> = aligner.get_next_sample(id).unwrap();
        assert_eq!(peeked, Some((CuDuration(20), 20)));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_disabled_stream_is_ignored() {
        let (clock, _mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb0) = collector();
        let sink = seen.clone();
        let cb1 = move |ts: CuTime, value: u32| {
            sink.borrow_mut().push((ts, value));
            Ok(())
        };
        let s0 = aligner.register_stream(cb0, 0, CuDuration(0), -1, "s0");
        let s1 = aligner.register_stream(cb1, 0, CuDuration(0), -1, "s1");

        aligner.push(s0, CuDuration(10), 10u32).unwrap();
        aligner.push(s1, CuDuration(20), 20u32).unwrap();
        aligner.disable_stream(s0);
        assert!(!aligner.is_stream_active(s0));

        // s0 neither gates nor releases while disabled.
        assert!(aligner.step().unwrap());
        assert_eq!(seen.borrow().as_slice(), &[(CuDuration(20), 20)]);

        aligner.enable_stream(s0);
        assert!(aligner.step().unwrap());
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_wrong_payload_type_is_rejected() {
        let (clock, _mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let id = aligner.register_stream(|_ts, _value: u32| Ok(()), 0, CuDuration(0), -1, "s0");

        let err = aligner.push(id, CuDuration(10), "oops").unwrap_err();
        assert!(matches!(err, TransformError::PayloadTypeMismatch { .. }));
    }

    #[test]
    fn test_callback_error_propagates_out_of_step() {
        let (clock, _mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let id = aligner.register_stream(
            |_ts, _value: u32| Err(TransformError::EmptyFrameName),
            0,
            CuDuration(0),
            -1,
            "s0",
        );

        aligner.push(id, CuDuration(10), 10u32).unwrap();
        assert!(matches!(aligner.step(), Err(TransformError::EmptyFrameName)));
    }

    #[test]
    fn test_clear_keeps_streams_registered() {
        let (clock, _mock) = RobotClock::mock();
        let mut aligner = StreamAligner::new(clock);
        let (seen, cb) = collector();
        let id = aligner.register_stream(cb, 0, CuDuration(0), -1, "s0");

        aligner.push(id, CuDuration(10), 10u32).unwrap();
        aligner.clear();
        assert!(!aligner.step().unwrap());
        assert!(seen.borrow().is_empty());

        // Monotonicity restarts after a clear, older timestamps are fine.
        aligner.push(id, CuDuration(5), 5u32).unwrap();
        assert!(aligner.step().unwrap());
        assert_eq!(seen.borrow().as_slice(), &[(CuDuration(5), 5)]);
    }
}
