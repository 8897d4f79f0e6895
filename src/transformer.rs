//! The façade wiring the stream aligner, the frame graph and the
//! transformation handles together.

use crate::aligner::{StreamAligner, StreamId};
use crate::element::{DynamicState, TransformationElement};
use crate::error::{TransformError, TransformResult};
use crate::status::TransformerStatus;
use crate::transform::{frame_id, RigidTransform};
use crate::transformation::{Transformation, TransformationHandle};
use crate::tree::TransformationTree;
use crate::FrameIdString;
use cu29::clock::{CuDuration, CuTime, RobotClock};
use cu29::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Stream priority given to the streams auto-created for dynamic
/// transformations. Lower values win timestamp ties, so transformation
/// samples are applied before the data samples they time-align with.
const DEFAULT_DYNAMIC_PRIORITY: i32 = -10;

/// Provides transformations to time-stamped samples, ordered in time.
///
/// Clients register handles for the frame pairs they care about, bind data
/// streams to them and push samples and transformation observations. Each
/// [`step`](Transformer::step) releases the globally oldest buffered sample
/// and runs its callback.
pub struct Transformer {
    aligner: StreamAligner,
    transform_to_stream: HashMap<(FrameIdString, FrameIdString), StreamId>,
    transformations: Vec<TransformationHandle>,
    tree: TransformationTree,
    priority: i32,
    clock: RobotClock,
}

impl Transformer {
    pub fn new(clock: RobotClock) -> Self {
        Self::with_priority(clock, DEFAULT_DYNAMIC_PRIORITY)
    }

    /// `priority` is given to the streams auto-created for dynamic
    /// transformations.
    pub fn with_priority(clock: RobotClock, priority: i32) -> Self {
        Self {
            aligner: StreamAligner::new(clock.clone()),
            transform_to_stream: HashMap::new(),
            transformations: Vec::new(),
            tree: TransformationTree::new(),
            priority,
            clock,
        }
    }

    /// Registers a wanted transformation and returns its handle.
    ///
    /// The handle is returned even when no chain between the frames exists
    /// yet; it turns valid as soon as the edges show up.
    pub fn register_transformation(
        &mut self,
        source_frame: &str,
        target_frame: &str,
    ) -> TransformResult<TransformationHandle> {
        let handle = Rc::new(Transformation::new(
            frame_id(source_frame)?,
            frame_id(target_frame)?,
        ));
        if let Some(chain) = self
            .tree
            .get_transformation_chain(&handle.source_frame(), &handle.target_frame())
        {
            handle.set_transformation_chain(chain);
        }
        self.transformations.push(handle.clone());
        Ok(handle)
    }

    /// Removes a handle registered with
    /// [`register_transformation`](Self::register_transformation).
    pub fn unregister_transformation(
        &mut self,
        handle: &TransformationHandle,
    ) -> TransformResult<()> {
        let position = self
            .transformations
            .iter()
            .position(|t| Rc::ptr_eq(t, handle))
            .ok_or(TransformError::UnknownHandle)?;
        self.transformations.remove(position);
        Ok(())
    }

    pub fn registered_transformations(&self) -> &[TransformationHandle] {
        &self.transformations
    }

    /// Registers a data stream; the callback runs on every released sample.
    pub fn register_data_stream<P: 'static>(
        &mut self,
        period: CuDuration,
        callback: impl FnMut(CuTime, P) -> TransformResult<()> + 'static,
        priority: i32,
        name: &str,
    ) -> StreamId {
        self.aligner
            .register_stream(callback, 0, period, priority, name)
    }

    /// Registers a data stream whose callback additionally receives the
    /// transformation handle, ready to be queried at the sample's timestamp.
    pub fn register_data_stream_with_transform<P: 'static>(
        &mut self,
        period: CuDuration,
        handle: &TransformationHandle,
        mut callback: impl FnMut(CuTime, P, &Transformation) -> TransformResult<()> + 'static,
        priority: i32,
        name: &str,
    ) -> StreamId {
        let handle = handle.clone();
        self.aligner.register_stream(
            move |ts, value: P| callback(ts, value, handle.as_ref()),
            0,
            period,
            priority,
            name,
        )
    }

    /// Registers a callback invoked every time a new transformation is
    /// available for the given handle, i.e. whenever any edge of its chain
    /// receives a new value.
    pub fn register_transform_callback(
        &self,
        handle: &TransformationHandle,
        callback: impl Fn(CuTime, &Transformation) + 'static,
    ) {
        let weak = Rc::downgrade(handle);
        handle.register_update_callback(Rc::new(move |ts| {
            if let Some(handle) = weak.upgrade() {
                callback(ts, handle.as_ref());
            }
        }));
    }

    pub fn unregister_data_stream(&mut self, id: StreamId) {
        self.aligner.unregister_stream(id);
    }

    pub fn enable_stream(&mut self, id: StreamId) {
        self.aligner.enable_stream(id);
    }

    pub fn disable_stream(&mut self, id: StreamId) {
        self.aligner.disable_stream(id);
    }

    pub fn is_stream_active(&self, id: StreamId) -> bool {
        self.aligner.is_stream_active(id)
    }

    /// Adds a new dynamic transformation sample.
    ///
    /// The first sample of an unseen `(source, target)` pair creates the
    /// dynamic edge (backed by a period-0 aligner stream) and recomputes the
    /// chains of all registered handles.
    pub fn push_dynamic_transformation(&mut self, tr: RigidTransform) -> TransformResult<()> {
        if tr.source_frame.is_empty() || tr.target_frame.is_empty() {
            return Err(TransformError::EmptyFrameName);
        }
        if tr.time.as_nanos() == 0 {
            return Err(TransformError::NullTimestamp);
        }

        let key = (tr.source_frame, tr.target_frame);
        let stream = match self.transform_to_stream.get(&key) {
            Some(&stream) => stream,
            None => {
                let state = Rc::new(RefCell::new(DynamicState::default()));
                let callback_state = state.clone();
                let name = format!("{}2{}", tr.source_frame, tr.target_frame);
                let stream = self.aligner.register_stream::<RigidTransform>(
                    move |ts, value| {
                        let mut state = callback_state.borrow_mut();
                        state.last_time = Some(ts);
                        state.last_value = Some(value);
                        // Callbacks may query the element right away, which
                        // needs the state borrow back.
                        let callbacks = state.changed_callbacks.clone();
                        drop(state);
                        for callback in callbacks {
                            callback(ts);
                        }
                        Ok(())
                    },
                    0,
                    CuDuration(0),
                    self.priority,
                    &name,
                );
                let next_samples = self.aligner.buffer_handle::<RigidTransform>(stream)?;
                debug!(
                    "Registering new stream for transformation from {} to {}, index is {}",
                    tr.source_frame.as_str(),
                    tr.target_frame.as_str(),
                    stream as u64
                );
                self.tree
                    .add_transformation(Rc::new(TransformationElement::new_dynamic(
                        tr.source_frame,
                        tr.target_frame,
                        stream,
                        state,
                        next_samples,
                    )));
                self.transform_to_stream.insert(key, stream);
                self.recompute_available_transformations();
                stream
            }
        };

        self.aligner.push(stream, tr.time, tr)
    }

    /// Adds a static transformation, valid for all time.
    pub fn push_static_transformation(&mut self, tr: RigidTransform) -> TransformResult<()> {
        if tr.source_frame.is_empty() || tr.target_frame.is_empty() {
            return Err(TransformError::EmptyFrameName);
        }
        self.tree
            .add_transformation(Rc::new(TransformationElement::new_static(tr)));
        self.recompute_available_transformations();
        Ok(())
    }

    /// Manually installs a transformation chain on every registered handle
    /// whose (mapped) frames match.
    pub fn add_transformation_chain(
        &mut self,
        from: &str,
        to: &str,
        chain: &[Rc<TransformationElement>],
    ) {
        for handle in &self.transformations {
            if handle.source_frame().as_str() == from && handle.target_frame().as_str() == to {
                handle.set_transformation_chain(chain.to_vec());
            }
        }
    }

    /// Maps a logical frame name to a physical one on every handle and
    /// recomputes the chains.
    pub fn set_frame_mapping(&mut self, frame_name: &str, new_name: &str) -> TransformResult<()> {
        let new_name = frame_id(new_name)?;
        for handle in &self.transformations {
            handle.set_frame_mapping(frame_name, new_name);
        }
        self.recompute_available_transformations();
        Ok(())
    }

    /// Pushes a sample into a data stream.
    pub fn push_data<P: 'static>(
        &mut self,
        id: StreamId,
        time: CuTime,
        data: P,
    ) -> TransformResult<()> {
        self.aligner.push(id, time, data)
    }

    /// Pushes a dummy sample onto a `bool` stream to force its callback to
    /// fire at `time`, typically to obtain a transformation at a time where
    /// no data sample exists.
    pub fn request_transformation_at_time(
        &mut self,
        id: StreamId,
        time: CuTime,
    ) -> TransformResult<()> {
        self.aligner.push(id, time, false)
    }

    /// Processes the data streams; releases at most one sample and runs its
    /// callback. Returns `Ok(false)` when no progress was possible.
    pub fn step(&mut self) -> TransformResult<bool> {
        self.aligner.step()
    }

    pub fn set_timeout(&mut self, timeout: CuDuration) {
        self.aligner.set_timeout(timeout);
    }

    /// Deletes all dynamic and static transformations known to the
    /// transformer, along with every buffered sample. Data stream
    /// registrations and callbacks survive; every handle is reset first.
    pub fn clear(&mut self) {
        for handle in &self.transformations {
            handle.reset();
        }
        for (_, stream) in self.transform_to_stream.drain() {
            self.aligner.unregister_stream(stream);
        }
        self.tree.clear();
        self.aligner.clear();
    }

    /// Status of the stream aligner: per-stream latency and buffer fill.
    pub fn status(&self) -> crate::status::StreamAlignerStatus {
        self.aligner.status()
    }

    /// Status of every registered transformation.
    pub fn transformer_status(&self) -> TransformerStatus {
        TransformerStatus {
            time: self.clock.now(),
            transformations: self
                .transformations
                .iter()
                .map(|handle| handle.status())
                .collect(),
        }
    }

    /// Counts of (static, dynamic) edges currently in the frame graph.
    pub fn elements_count(&self) -> (usize, usize) {
        self.tree.elements_count()
    }

    /// Logs the registered edges of the frame graph.
    pub fn dump_tree(&self) {
        self.tree.dump_tree();
    }

    fn recompute_available_transformations(&self) {
        for handle in &self.transformations {
            if let Some(chain) = self
                .tree
                .get_transformation_chain(&handle.source_frame(), &handle.target_frame())
            {
                handle.set_transformation_chain(chain);
            }
        }
    }
}
