use crate::{error::Error, landmark::NormalizedLandmarks};
use opencv::core::Mat;

mod blazepose;
pub(crate) use blazepose::BlazePose;

/// How much a detector may rely on earlier frames.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Every image is searched in full.
    Static,
    /// Each frame is searched near the person found in the previous one,
    /// falling back to the full frame after a miss.
    Video,
}

pub(crate) trait Detector {
    /// Find the landmarks of at most one person in a BGR `image`.
    ///
    /// `Ok(None)` means nobody was found; it is not an error.
    fn detect(&mut self, image: &Mat) -> Result<Option<NormalizedLandmarks>, Error>;
}
