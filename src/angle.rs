use crate::landmark::Landmark;

/// The directional angle at `b`, in degrees in `[0, 360)`, swept from the ray
/// `b -> a` to the ray `b -> c` in image coordinates. Depth is ignored.
///
/// A straight limb reads close to 180. Coincident points hit `atan2(0, 0) == 0`
/// and NaN coordinates give a NaN angle; neither is rejected here.
pub(crate) fn calculate_angle(a: Landmark, b: Landmark, c: Landmark) -> f32 {
    let angle = ((c.y - b.y).atan2(c.x - b.x) - (a.y - b.y).atan2(a.x - b.x)).to_degrees();
    if angle < 0.0 {
        angle + 360.0
    } else {
        angle
    }
}
