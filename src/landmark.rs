use crate::error::Error;
use num_traits::{FromPrimitive, ToPrimitive};
use std::ops::Index;

/// Body joints reported by the landmark model, in output order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub(crate) enum LandmarkKind {
    Nose,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

pub(crate) const NUM_LANDMARKS: usize = 33;

// `Index<LandmarkKind>` relies on the last variant filling the last slot.
const _: () = assert!(LandmarkKind::RightFootIndex as usize == NUM_LANDMARKS - 1);

impl LandmarkKind {
    pub(crate) fn idx(self) -> Result<usize, Error> {
        self.to_usize()
            .filter(|&index| index < NUM_LANDMARKS)
            .ok_or(Error::LandmarkVariantToUSize(self))
    }

    pub(crate) fn from_idx(index: usize) -> Result<Self, Error> {
        Self::from_usize(index).ok_or(Error::ConvertUSizeToLandmarkKind(index))
    }
}

/// A landmark as the detector reports it: `x` and `y` are fractions of the
/// frame's width and height, `z` is in units of frame width.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub(crate) struct NormalizedLandmark {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) z: f32,
    pub(crate) visibility: f32,
}

pub(crate) type NormalizedLandmarks = [NormalizedLandmark; NUM_LANDMARKS];

/// A landmark in pixel space. `z` shares the scale of `x` and is relative to
/// the midpoint of the hips, so it is not a metric depth.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub(crate) struct Landmark {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) z: f32,
    pub(crate) visibility: f32,
}

impl Landmark {
    pub(crate) fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: 1.0,
        }
    }

    pub(crate) fn to_point(self) -> Result<opencv::core::Point, Error> {
        Ok(opencv::core::Point::new(
            self.x.to_i32().ok_or(Error::ConvertToI32)?,
            self.y.to_i32().ok_or(Error::ConvertToI32)?,
        ))
    }
}

/// The full landmark set of one detected person for one frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Landmarks([Landmark; NUM_LANDMARKS]);

impl Landmarks {
    pub(crate) fn new(landmarks: [Landmark; NUM_LANDMARKS]) -> Self {
        Self(landmarks)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.0.iter()
    }
}

impl Index<LandmarkKind> for Landmarks {
    type Output = Landmark;

    fn index(&self, kind: LandmarkKind) -> &Self::Output {
        // in bounds: discriminants run 0..NUM_LANDMARKS, asserted above
        &self.0[kind as usize]
    }
}

/// Scale normalized landmarks to a `width` x `height` pixel frame. Depth uses
/// the width as its scale, like `x`.
pub(crate) fn normalize(landmarks: &NormalizedLandmarks, width: u32, height: u32) -> Landmarks {
    let width = width as f32;
    let height = height as f32;
    let mut scaled = [Landmark::default(); NUM_LANDMARKS];
    for (out, &NormalizedLandmark { x, y, z, visibility }) in scaled.iter_mut().zip(landmarks) {
        *out = Landmark {
            visibility,
            ..Landmark::new(x * width, y * height, z * width)
        };
    }
    Landmarks::new(scaled)
}

pub(crate) mod constants {
    use super::LandmarkKind::{self, *};

    /// Skeleton edges drawn on annotated frames.
    pub(crate) const POSE_CONNECTIONS: [(LandmarkKind, LandmarkKind); 35] = [
        (Nose, RightEyeInner),
        (RightEyeInner, RightEye),
        (RightEye, RightEyeOuter),
        (RightEyeOuter, RightEar),
        (Nose, LeftEyeInner),
        (LeftEyeInner, LeftEye),
        (LeftEye, LeftEyeOuter),
        (LeftEyeOuter, LeftEar),
        (MouthRight, MouthLeft),
        (RightShoulder, LeftShoulder),
        (RightShoulder, RightElbow),
        (RightElbow, RightWrist),
        (RightWrist, RightPinky),
        (RightWrist, RightIndex),
        (RightWrist, RightThumb),
        (RightPinky, RightIndex),
        (LeftShoulder, LeftElbow),
        (LeftElbow, LeftWrist),
        (LeftWrist, LeftPinky),
        (LeftWrist, LeftIndex),
        (LeftWrist, LeftThumb),
        (LeftPinky, LeftIndex),
        (RightShoulder, RightHip),
        (LeftShoulder, LeftHip),
        (RightHip, LeftHip),
        (RightHip, RightKnee),
        (LeftHip, LeftKnee),
        (RightKnee, RightAnkle),
        (LeftKnee, LeftAnkle),
        (RightAnkle, RightHeel),
        (LeftAnkle, LeftHeel),
        (RightHeel, RightFootIndex),
        (LeftHeel, LeftFootIndex),
        (RightAnkle, RightFootIndex),
        (LeftAnkle, LeftFootIndex),
    ];
}
