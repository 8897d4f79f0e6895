//! Edges of the frame graph.
//!
//! An element answers "give me the transformation at time t, with or without
//! interpolation". Static elements hold one value for all time, dynamic
//! elements follow a time-stamped stream on the aligner, and inverse elements
//! are non-owning views returning the inverse of a peer element.

use crate::aligner::{SampleBuffer, StreamId};
use crate::error::{TransformError, TransformResult};
use crate::transform::RigidTransform;
use crate::FrameIdString;
use cu29::clock::CuTime;
use std::cell::RefCell;
use std::rc::Rc;

/// Callback fired when an element receives a new value.
pub type ElementChangedCallback = Rc<dyn Fn(CuTime)>;

/// Mutable core of a dynamic element, shared with the aligner callback of
/// its stream.
#[derive(Default)]
pub(crate) struct DynamicState {
    pub(crate) last_value: Option<RigidTransform>,
    pub(crate) last_time: Option<CuTime>,
    pub(crate) changed_callbacks: Vec<ElementChangedCallback>,
}

pub struct StaticElement {
    value: RigidTransform,
}

pub struct DynamicElement {
    source_frame: FrameIdString,
    target_frame: FrameIdString,
    stream: StreamId,
    state: Rc<RefCell<DynamicState>>,
    /// Shared view onto the aligner buffer of this element's stream, read to
    /// find the sample bracketing an interpolation query from above.
    next_samples: Rc<RefCell<SampleBuffer<RigidTransform>>>,
}

pub struct InverseElement {
    inner: Rc<TransformationElement>,
}

pub enum TransformationElement {
    Static(StaticElement),
    Dynamic(DynamicElement),
    Inverse(InverseElement),
}

impl TransformationElement {
    /// A time-independent edge between the frames named in `value`.
    pub fn new_static(value: RigidTransform) -> Self {
        Self::Static(StaticElement { value })
    }

    pub(crate) fn new_dynamic(
        source_frame: FrameIdString,
        target_frame: FrameIdString,
        stream: StreamId,
        state: Rc<RefCell<DynamicState>>,
        next_samples: Rc<RefCell<SampleBuffer<RigidTransform>>>,
    ) -> Self {
        Self::Dynamic(DynamicElement {
            source_frame,
            target_frame,
            stream,
            state,
            next_samples,
        })
    }

    /// A non-owning view returning the inverse of `inner` with source and
    /// target swapped.
    pub fn new_inverse(inner: Rc<TransformationElement>) -> Self {
        Self::Inverse(InverseElement { inner })
    }

    pub fn source_frame(&self) -> &str {
        match self {
            Self::Static(e) => &e.value.source_frame,
            Self::Dynamic(e) => &e.source_frame,
            Self::Inverse(e) => e.inner.target_frame(),
        }
    }

    pub fn target_frame(&self) -> &str {
        match self {
            Self::Static(e) => &e.value.target_frame,
            Self::Dynamic(e) => &e.target_frame,
            Self::Inverse(e) => e.inner.source_frame(),
        }
    }

    /// True for dynamic elements and inverse views of dynamic elements.
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Static(_) => false,
            Self::Dynamic(_) => true,
            Self::Inverse(e) => e.inner.is_dynamic(),
        }
    }

    /// The aligner stream feeding this element, if any.
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Self::Static(_) => None,
            Self::Dynamic(e) => Some(e.stream),
            Self::Inverse(e) => e.inner.stream_id(),
        }
    }

    /// Registers a callback fired every time the element receives a new
    /// value. On inverse views the callback attaches to the inner element;
    /// static elements never change and keep none.
    pub(crate) fn add_changed_callback(&self, callback: ElementChangedCallback) {
        match self {
            Self::Static(_) => {}
            Self::Dynamic(e) => e.state.borrow_mut().changed_callbacks.push(callback),
            Self::Inverse(e) => e.inner.add_changed_callback(callback),
        }
    }

    /// The transformation this edge represents at `at_time`.
    ///
    /// `Ok(None)` means no sample is available (yet); the hard
    /// `TimeBelowLastSample` error is raised when an interpolation query asks
    /// for a time older than the last released sample.
    pub fn get_transformation(
        &self,
        at_time: CuTime,
        interpolate: bool,
    ) -> TransformResult<Option<RigidTransform>> {
        match self {
            Self::Static(e) => {
                let mut tr = e.value.clone();
                tr.time = at_time;
                Ok(Some(tr))
            }
            Self::Dynamic(e) => e.get_transformation(at_time, interpolate),
            Self::Inverse(e) => match e.inner.get_transformation(at_time, interpolate)? {
                Some(tr) => {
                    let mut inverted = tr.clone();
                    inverted.set_isometry(&tr.to_isometry().inverse());
                    inverted.source_frame = tr.target_frame;
                    inverted.target_frame = tr.source_frame;
                    Ok(Some(inverted))
                }
                None => Ok(None),
            },
        }
    }
}

impl DynamicElement {
    fn get_transformation(
        &self,
        at_time: CuTime,
        interpolate: bool,
    ) -> TransformResult<Option<RigidTransform>> {
        let state = self.state.borrow();
        let (last, last_time) = match (&state.last_value, state.last_time) {
            (Some(value), Some(time)) => (value, time),
            _ => return Ok(None),
        };

        if !interpolate {
            return Ok(Some(last.clone()));
        }

        if at_time < last_time {
            return Err(TransformError::TimeBelowLastSample {
                requested: at_time,
                last: last_time,
            });
        }
        if at_time == last_time {
            return Ok(Some(last.clone()));
        }

        let next = self.next_samples.borrow().peek().cloned();
        let Some((next_time, next_value)) = next else {
            // Nothing buffered to bracket the query from above.
            return Ok(None);
        };
        if next_time <= at_time {
            return Ok(None);
        }

        let forward = (at_time - last_time).as_nanos() as f64;
        let between = (next_time - last_time).as_nanos() as f64;
        let factor = forward / between;

        let orientation = last
            .orientation
            .try_slerp(&next_value.orientation, factor, f64::EPSILON)
            .unwrap_or(if factor < 0.5 {
                last.orientation
            } else {
                next_value.orientation
            });
        // `factor` weights the older sample, not the newer one. Downstream
        // consumers depend on this exact weighting.
        let position = factor * last.position + (1.0 - factor) * next_value.position;
        let cov_position = factor * last.cov_position + (1.0 - factor) * next_value.cov_position;
        let cov_orientation =
            factor * last.cov_orientation + (1.0 - factor) * next_value.cov_orientation;

        Ok(Some(RigidTransform {
            time: at_time,
            source_frame: self.source_frame,
            target_frame: self.target_frame,
            position,
            orientation,
            cov_position,
            cov_orientation,
        }))
    }
}
