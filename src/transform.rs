use crate::error::{TransformError, TransformResult};
use crate::FrameIdString;
use cu29::clock::CuTime;
use nalgebra::{Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A time-stamped rigid body transformation between two named frames.
///
/// The pose maps coordinates expressed in `source_frame` into coordinates
/// expressed in `target_frame`. Position and orientation carry their own
/// 3x3 covariances, which are expected to be symmetric positive semidefinite.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RigidTransform {
    pub time: CuTime,
    pub source_frame: FrameIdString,
    pub target_frame: FrameIdString,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub cov_position: Matrix3<f64>,
    pub cov_orientation: Matrix3<f64>,
}

impl Default for RigidTransform {
    /// Identity pose with zero covariance, zero time and empty frames.
    fn default() -> Self {
        Self {
            time: CuTime::default(),
            source_frame: FrameIdString::new(),
            target_frame: FrameIdString::new(),
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            cov_position: Matrix3::zeros(),
            cov_orientation: Matrix3::zeros(),
        }
    }
}

impl RigidTransform {
    /// Identity transformation between the given frames at the given time.
    pub fn identity(source_frame: &str, target_frame: &str, time: CuTime) -> TransformResult<Self> {
        Ok(Self {
            time,
            source_frame: frame_id(source_frame)?,
            target_frame: frame_id(target_frame)?,
            ..Self::default()
        })
    }

    /// The pose as an isometry mapping source frame coordinates into target
    /// frame coordinates.
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }

    /// Replaces position and orientation from an isometry, keeping time,
    /// frames and covariances untouched.
    pub fn set_isometry(&mut self, iso: &Isometry3<f64>) {
        self.position = iso.translation.vector;
        self.orientation = iso.rotation;
    }

    pub fn from_isometry(
        source_frame: FrameIdString,
        target_frame: FrameIdString,
        time: CuTime,
        iso: &Isometry3<f64>,
    ) -> Self {
        Self {
            time,
            source_frame,
            target_frame,
            position: iso.translation.vector,
            orientation: iso.rotation,
            ..Self::default()
        }
    }

    /// The pose as a homogeneous 4x4 matrix.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        self.to_isometry().to_homogeneous()
    }

    /// Builds the pose from a homogeneous 4x4 matrix. The upper left 3x3
    /// block must be a rotation matrix.
    pub fn from_matrix(
        source_frame: FrameIdString,
        target_frame: FrameIdString,
        time: CuTime,
        mat: &Matrix4<f64>,
    ) -> Self {
        let rot: Matrix3<f64> = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let orientation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot));
        Self {
            time,
            source_frame,
            target_frame,
            position: mat.fixed_view::<3, 1>(0, 3).into_owned(),
            orientation,
            ..Self::default()
        }
    }
}

pub(crate) fn frame_id(name: &str) -> TransformResult<FrameIdString> {
    FrameIdString::from(name).map_err(|_| TransformError::FrameNameTooLong(name.to_string()))
}

impl bincode::enc::Encode for RigidTransform {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        bincode::enc::Encode::encode(&self.time, encoder)?;
        bincode::enc::Encode::encode(self.source_frame.as_str(), encoder)?;
        bincode::enc::Encode::encode(self.target_frame.as_str(), encoder)?;
        let position: [f64; 3] = self.position.into();
        bincode::enc::Encode::encode(&position, encoder)?;
        let orientation: [f64; 4] = self.orientation.coords.into();
        bincode::enc::Encode::encode(&orientation, encoder)?;
        let cov_position: [[f64; 3]; 3] = self.cov_position.into();
        bincode::enc::Encode::encode(&cov_position, encoder)?;
        let cov_orientation: [[f64; 3]; 3] = self.cov_orientation.into();
        bincode::enc::Encode::encode(&cov_orientation, encoder)?;
        Ok(())
    }
}

impl<Context> bincode::de::Decode<Context> for RigidTransform {
    fn decode<D: bincode::de::Decoder<Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        let time = <CuTime as bincode::de::Decode<Context>>::decode(decoder)?;
        let source = <String as bincode::de::Decode<Context>>::decode(decoder)?;
        let target = <String as bincode::de::Decode<Context>>::decode(decoder)?;
        let position = <[f64; 3] as bincode::de::Decode<Context>>::decode(decoder)?;
        let orientation = <[f64; 4] as bincode::de::Decode<Context>>::decode(decoder)?;
        let cov_position = <[[f64; 3]; 3] as bincode::de::Decode<Context>>::decode(decoder)?;
        let cov_orientation = <[[f64; 3]; 3] as bincode::de::Decode<Context>>::decode(decoder)?;
        let source_frame = FrameIdString::from(&source)
            .map_err(|_| bincode::error::DecodeError::OtherString("frame name too long".into()))?;
        let target_frame = FrameIdString::from(&target)
            .map_err(|_| bincode::error::DecodeError::OtherString("frame name too long".into()))?;
        Ok(Self {
            time,
            source_frame,
            target_frame,
            position: Vector3::from(position),
            orientation: UnitQuaternion::new_normalize(nalgebra::Quaternion::from(
                nalgebra::Vector4::from(orientation),
            )),
            cov_position: Matrix3::from(cov_position),
            cov_orientation: Matrix3::from(cov_orientation),
        })
    }
}

impl<'de, Context> bincode::de::BorrowDecode<'de, Context> for RigidTransform {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        bincode::de::Decode::decode(decoder)
    }
}
