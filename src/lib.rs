#![doc = include_str!("../README.md")]

pub mod aligner;
pub mod element;
pub mod error;
pub mod status;
pub mod transform;
pub mod transformation;
pub mod transformer;
pub mod tree;

use arrayvec::ArrayString;

/// Frame identifier strings
pub type FrameIdString = ArrayString<64>;

pub use aligner::{StreamAligner, StreamId};
pub use element::TransformationElement;
pub use error::{TransformError, TransformResult};
pub use status::{StreamAlignerStatus, StreamStatus, TransformationStatus, TransformerStatus};
pub use transform::RigidTransform;
pub use transformation::{Transformation, TransformationHandle};
pub use transformer::Transformer;
pub use tree::TransformationTree;
