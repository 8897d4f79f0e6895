//! Client-visible transformation handles.

use crate::element::{ElementChangedCallback, TransformationElement};
use crate::error::TransformResult;
use crate::status::TransformationStatus;
use crate::transform::RigidTransform;
use crate::FrameIdString;
use cu29::clock::CuTime;
use nalgebra::Isometry3;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Shared handle to a registered transformation, owned by the
/// [`Transformer`](crate::Transformer).
pub type TransformationHandle = Rc<Transformation>;

/// A wanted transformation between a source and a target frame.
///
/// The chain backing it is installed and refreshed by the transformer as
/// edges become available; until then the handle is invalid and `get`
/// reports a soft failure. All bookkeeping is interior-mutable so shared
/// handles can be queried from inside data stream callbacks.
pub struct Transformation {
    source_frame: FrameIdString,
    target_frame: FrameIdString,
    source_frame_mapped: Cell<Option<FrameIdString>>,
    target_frame_mapped: Cell<Option<FrameIdString>>,
    valid: Cell<bool>,
    chain: RefCell<Vec<Rc<TransformationElement>>>,
    last_generated: Cell<CuTime>,
    generated_transformations: Cell<u64>,
    failed_no_chain: Cell<u64>,
    failed_no_sample: Cell<u64>,
    failed_interpolation_impossible: Cell<u64>,
    changed_callback: RefCell<Option<ElementChangedCallback>>,
}

impl Transformation {
    pub(crate) fn new(source_frame: FrameIdString, target_frame: FrameIdString) -> Self {
        Self {
            source_frame,
            target_frame,
            source_frame_mapped: Cell::new(None),
            target_frame_mapped: Cell::new(None),
            valid: Cell::new(false),
            chain: RefCell::new(Vec::new()),
            last_generated: Cell::new(CuTime::default()),
            generated_transformations: Cell::new(0),
            failed_no_chain: Cell::new(0),
            failed_no_sample: Cell::new(0),
            failed_interpolation_impossible: Cell::new(0),
            changed_callback: RefCell::new(None),
        }
    }

    /// The global source frame name, the mapped one if a mapping is set.
    pub fn source_frame(&self) -> FrameIdString {
        self.source_frame_mapped.get().unwrap_or(self.source_frame)
    }

    /// The global target frame name, the mapped one if a mapping is set.
    pub fn target_frame(&self) -> FrameIdString {
        self.target_frame_mapped.get().unwrap_or(self.target_frame)
    }

    /// The local source frame name the handle was registered with.
    pub fn source_frame_local(&self) -> FrameIdString {
        self.source_frame
    }

    /// The local target frame name the handle was registered with.
    pub fn target_frame_local(&self) -> FrameIdString {
        self.target_frame
    }

    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    pub(crate) fn set_frame_mapping(&self, frame_name: &str, new_name: FrameIdString) {
        if self.source_frame.as_str() == frame_name {
            self.source_frame_mapped.set(Some(new_name));
        }
        if self.target_frame.as_str() == frame_name {
            self.target_frame_mapped.set(Some(new_name));
        }
    }

    /// Installs the chain of links composed to compute this transformation
    /// and marks the handle valid. A registered update callback is attached
    /// to every element of the new chain.
    pub(crate) fn set_transformation_chain(&self, chain: Vec<Rc<TransformationElement>>) {
        if let Some(callback) = self.changed_callback.borrow().as_ref() {
            for element in &chain {
                element.add_changed_callback(callback.clone());
            }
        }
        *self.chain.borrow_mut() = chain;
        self.valid.set(true);
    }

    /// Registers the (single) callback fired whenever any edge of the chain
    /// receives a new value.
    pub fn register_update_callback(&self, callback: ElementChangedCallback) {
        if self.valid.get() {
            for element in self.chain.borrow().iter() {
                element.add_changed_callback(callback.clone());
            }
        }
        *self.changed_callback.borrow_mut() = Some(callback);
    }

    /// Clears all stored information and marks the transformation invalid.
    pub fn reset(&self) {
        self.valid.set(false);
        self.chain.borrow_mut().clear();
        self.last_generated.set(CuTime::default());
        self.generated_transformations.set(0);
        self.failed_no_chain.set(0);
        self.failed_no_sample.set(0);
        self.failed_interpolation_impossible.set(0);
    }

    /// The transformation from the source frame to the target frame at
    /// `at_time`.
    ///
    /// Soft failures (no chain yet, no sample yet, interpolation impossible)
    /// are counted and reported as `Ok(None)`; the pipeline keeps going.
    pub fn get(&self, at_time: CuTime, interpolate: bool) -> TransformResult<Option<RigidTransform>> {
        if !self.valid.get() {
            self.failed_no_chain
                .set(self.failed_no_chain.get() + 1);
            return Ok(None);
        }

        let mut composed = Isometry3::identity();
        for element in self.chain.borrow().iter() {
            match element.get_transformation(at_time, interpolate)? {
                Some(tr) => composed *= tr.to_isometry(),
                None => {
                    if interpolate {
                        self.failed_interpolation_impossible
                            .set(self.failed_interpolation_impossible.get() + 1);
                    } else {
                        self.failed_no_sample.set(self.failed_no_sample.get() + 1);
                    }
                    return Ok(None);
                }
            }
        }

        self.last_generated.set(at_time);
        self.generated_transformations
            .set(self.generated_transformations.get() + 1);
        Ok(Some(RigidTransform::from_isometry(
            self.source_frame,
            self.target_frame,
            at_time,
            &composed,
        )))
    }

    /// The individual edge transformations of the chain at `at_time`,
    /// in application order. `Ok(None)` when the chain is empty or an edge
    /// has no sample.
    pub fn get_chain(
        &self,
        at_time: CuTime,
        interpolate: bool,
    ) -> TransformResult<Option<Vec<RigidTransform>>> {
        let chain = self.chain.borrow();
        if chain.is_empty() {
            return Ok(None);
        }

        let mut result = Vec::with_capacity(chain.len());
        for element in chain.iter() {
            match element.get_transformation(at_time, interpolate)? {
                Some(tr) => result.push(tr),
                None => return Ok(None),
            }
        }
        Ok(Some(result))
    }

    pub fn status(&self) -> TransformationStatus {
        let mut status = TransformationStatus::default();
        self.update_status(&mut status);
        status
    }

    pub fn update_status(&self, status: &mut TransformationStatus) {
        status.source_local = self.source_frame.to_string();
        status.target_local = self.target_frame.to_string();
        status.source_global = self.source_frame().to_string();
        status.target_global = self.target_frame().to_string();
        status.last_generated_value = self.last_generated.get();
        status.chain_length = self.chain.borrow().len() as i32;
        status.generated_transformations = self.generated_transformations.get();
        status.failed_no_chain = self.failed_no_chain.get();
        status.failed_no_sample = self.failed_no_sample.get();
        status.failed_interpolation_impossible = self.failed_interpolation_impossible.get();
    }
}
