use crate::{
    classify::{self, PoseLabel},
    detect::Detector,
    error::Error,
    landmark::{self, Landmarks},
    render::{draw_landmarks, Overlay, Surface},
    source::{Acquisition, FrameSource, SourceKind},
};
use num_traits::cast::ToPrimitive;
use opencv::{
    core::{Mat, Size},
    imgproc::{resize, INTER_LINEAR},
    prelude::*,
};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Instantaneous frame rate from the wall-clock gap between consecutive
/// frames.
#[derive(Debug, Default)]
pub(crate) struct FrameRate {
    previous: Option<Instant>,
    rate: Option<f64>,
}

impl FrameRate {
    /// Record a frame at `now`. A zero gap keeps the previous rate.
    pub(crate) fn tick(&mut self, now: Instant) -> Option<f64> {
        if let Some(previous) = self.previous {
            let elapsed = now.saturating_duration_since(previous).as_secs_f64();
            if elapsed > 0.0 {
                self.rate = Some(1.0 / elapsed);
            }
        }
        self.previous = Some(now);
        self.rate
    }
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct Settings {
    /// Frames are scaled to this height before detection.
    pub(crate) output_height: i32,
    /// Whether to classify detected landmarks or only draw them.
    pub(crate) classify: bool,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    pub(crate) frames: usize,
    pub(crate) detections: usize,
    pub(crate) skipped: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub(crate) landmarks: Option<Landmarks>,
    pub(crate) label: Option<PoseLabel>,
}

/// Flip `frame` around its vertical axis.
pub(crate) fn mirror(frame: &Mat) -> Result<Mat, Error> {
    let mut mirrored = Mat::default();
    opencv::core::flip(frame, &mut mirrored, 1).map_err(Error::Flip)?;
    Ok(mirrored)
}

/// Scale `frame` to `height` rows, keeping its aspect ratio.
pub(crate) fn resize_to_height(frame: &Mat, height: i32) -> Result<Mat, Error> {
    let size = frame.size().map_err(Error::GetMatSize)?;
    if size.width <= 0 || size.height <= 0 || height <= 0 {
        return Err(Error::FrameSize(size.width, size.height));
    }
    let width = (i64::from(size.width) * i64::from(height) / i64::from(size.height))
        .to_i32()
        .ok_or(Error::ConvertToI32)?;
    if width <= 0 {
        return Err(Error::FrameSize(width, height));
    }

    let mut resized = Mat::default();
    resize(
        frame,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        INTER_LINEAR,
    )
    .map_err(Error::Resize)?;
    Ok(resized)
}

/// Detect landmarks in `frame`, draw them onto it, and optionally classify
/// the pose.
pub(crate) fn process_frame<D>(
    frame: &mut Mat,
    detector: &mut D,
    classify: bool,
) -> Result<Outcome, Error>
where
    D: Detector + ?Sized,
{
    let normalized = match detector.detect(frame)? {
        Some(normalized) => normalized,
        None => return Ok(Outcome::default()),
    };

    let size = frame.size().map_err(Error::GetMatSize)?;
    let landmarks = landmark::normalize(
        &normalized,
        size.width.to_u32().ok_or(Error::FrameSize(size.width, size.height))?,
        size.height.to_u32().ok_or(Error::FrameSize(size.width, size.height))?,
    );
    draw_landmarks(frame, &landmarks)?;

    let label = if classify {
        Some(classify::classify(&landmarks))
    } else {
        None
    };
    Ok(Outcome {
        landmarks: Some(landmarks),
        label,
    })
}

/// Pull frames from `source` until it is exhausted or `surface` is
/// cancelled, annotating and presenting each one.
#[instrument(name = "frame_loop", skip(source, detector, surface))]
pub(crate) fn run<S, D, R>(
    source: &mut S,
    detector: &mut D,
    surface: &mut R,
    settings: Settings,
) -> Result<Summary, Error>
where
    S: FrameSource + ?Sized,
    D: Detector + ?Sized,
    R: Surface + ?Sized,
{
    let kind = source.kind();
    let mut frame_rate = FrameRate::default();
    let mut summary = Summary::default();

    loop {
        let frame = match source.next_frame()? {
            Acquisition::Frame(frame) => frame,
            Acquisition::Failed if kind == SourceKind::File => {
                info!("end of video");
                break;
            }
            Acquisition::Failed => {
                debug!("ignoring empty camera frame");
                summary.skipped += 1;
                if surface.cancelled()? {
                    break;
                }
                continue;
            }
        };

        let frame = if kind == SourceKind::Live {
            mirror(&frame)?
        } else {
            frame
        };
        let mut frame = resize_to_height(&frame, settings.output_height)?;

        let outcome = process_frame(&mut frame, detector, settings.classify)?;
        summary.frames += 1;
        if outcome.landmarks.is_some() {
            summary.detections += 1;
        }

        let overlay = Overlay {
            label: outcome.label,
            frames_per_second: frame_rate.tick(Instant::now()),
        };
        surface.present(&mut frame, &overlay)?;

        if surface.cancelled()? {
            info!("cancelled");
            break;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        landmark::{
            LandmarkKind, LandmarkKind::*, NormalizedLandmark, NormalizedLandmarks, NUM_LANDMARKS,
        },
        source::tests::{blank, Scripted},
    };
    use assert_approx_eq::assert_approx_eq;
    use std::{collections::VecDeque, time::Duration};

    /// Returns scripted detections and records what it was shown.
    #[derive(Default)]
    struct Recorder {
        results: VecDeque<Option<NormalizedLandmarks>>,
        sizes: Vec<Size>,
        corners: Vec<u8>,
    }

    impl Recorder {
        fn returning(results: Vec<Option<NormalizedLandmarks>>) -> Self {
            Self {
                results: results.into(),
                ..Default::default()
            }
        }
    }

    impl Detector for Recorder {
        fn detect(&mut self, image: &Mat) -> Result<Option<NormalizedLandmarks>, Error> {
            self.sizes.push(image.size().unwrap());
            self.corners.push(*image.at_2d::<u8>(0, 0).unwrap());
            Ok(self.results.pop_front().flatten())
        }
    }

    /// Collects overlays and cancels after a fixed number of polls.
    struct Collector {
        overlays: Vec<Overlay>,
        polls: usize,
        cancel_after: usize,
    }

    impl Collector {
        fn cancelling_after(cancel_after: usize) -> Self {
            Self {
                overlays: Vec::new(),
                polls: 0,
                cancel_after,
            }
        }

        fn never_cancelling() -> Self {
            Self::cancelling_after(usize::MAX)
        }
    }

    impl Surface for Collector {
        fn present(&mut self, _frame: &mut Mat, overlay: &Overlay) -> Result<(), Error> {
            self.overlays.push(*overlay);
            Ok(())
        }

        fn cancelled(&mut self) -> Result<bool, Error> {
            self.polls += 1;
            Ok(self.polls >= self.cancel_after)
        }
    }

    const SETTINGS: Settings = Settings {
        output_height: 100,
        classify: true,
    };

    /// A T pose, in thousandths of the frame.
    fn t_pose() -> NormalizedLandmarks {
        let points: [(LandmarkKind, (f32, f32)); 12] = [
            (RightWrist, (100.0, 200.0)),
            (RightElbow, (200.0, 200.0)),
            (RightShoulder, (300.0, 200.0)),
            (LeftShoulder, (400.0, 200.0)),
            (LeftElbow, (500.0, 200.0)),
            (LeftWrist, (600.0, 200.0)),
            (RightHip, (310.0, 400.0)),
            (LeftHip, (390.0, 400.0)),
            (RightKnee, (310.0, 550.0)),
            (RightAnkle, (310.0, 700.0)),
            (LeftKnee, (390.0, 550.0)),
            (LeftAnkle, (390.0, 700.0)),
        ];
        let mut landmarks = [NormalizedLandmark::default(); NUM_LANDMARKS];
        for &(kind, (x, y)) in points.iter() {
            landmarks[kind.idx().unwrap()] = NormalizedLandmark {
                x: x / 1000.0,
                y: y / 1000.0,
                z: 0.0,
                visibility: 1.0,
            };
        }
        landmarks
    }

    fn frames(count: usize) -> Vec<Option<Mat>> {
        (0..count).map(|_| Some(blank(100, 100))).collect()
    }

    mod run_tests {
        use super::*;

        #[test]
        fn file_failure_ends_loop() {
            let mut source = Scripted::new(SourceKind::File, frames(2));
            let mut detector = Recorder::default();
            let mut surface = Collector::never_cancelling();
            let summary = run(&mut source, &mut detector, &mut surface, SETTINGS).unwrap();
            assert_eq!(
                summary,
                Summary {
                    frames: 2,
                    detections: 0,
                    skipped: 0
                }
            );
            assert_eq!(source.reads, 3);
        }

        #[test]
        fn live_failures_are_skipped() {
            let script = vec![None, Some(blank(100, 100)), None, Some(blank(100, 100))];
            let mut source = Scripted::new(SourceKind::Live, script);
            let mut detector = Recorder::default();
            // polls: miss, frame, miss, frame, miss, miss
            let mut surface = Collector::cancelling_after(6);
            let summary = run(&mut source, &mut detector, &mut surface, SETTINGS).unwrap();
            assert_eq!(summary.frames, 2);
            assert_eq!(summary.skipped, 4);
            assert_eq!(surface.overlays.len(), 2);
        }

        #[test]
        fn no_detection_has_no_label() {
            let mut source = Scripted::new(SourceKind::File, frames(1));
            let mut detector = Recorder::returning(vec![None]);
            let mut surface = Collector::never_cancelling();
            run(&mut source, &mut detector, &mut surface, SETTINGS).unwrap();
            assert_eq!(surface.overlays[0].label, None);
            // a single frame has no rate yet
            assert_eq!(surface.overlays[0].frames_per_second, None);
        }

        #[test]
        fn detection_is_classified() {
            let mut source = Scripted::new(SourceKind::File, frames(2));
            let mut detector = Recorder::returning(vec![Some(t_pose()), None]);
            let mut surface = Collector::never_cancelling();
            let summary = run(&mut source, &mut detector, &mut surface, SETTINGS).unwrap();
            assert_eq!(summary.detections, 1);
            assert_eq!(surface.overlays[0].label, Some(PoseLabel::T));
            assert_eq!(surface.overlays[1].label, None);
        }

        #[test]
        fn landmarks_only_skips_classification() {
            let mut source = Scripted::new(SourceKind::File, frames(1));
            let mut detector = Recorder::returning(vec![Some(t_pose())]);
            let mut surface = Collector::never_cancelling();
            let settings = Settings {
                classify: false,
                ..SETTINGS
            };
            let summary = run(&mut source, &mut detector, &mut surface, settings).unwrap();
            assert_eq!(summary.detections, 1);
            assert_eq!(surface.overlays[0].label, None);
        }

        #[test]
        fn only_live_frames_are_mirrored() {
            let marked = || {
                let mut frame = blank(4, 8);
                *frame.at_2d_mut::<u8>(0, 7).unwrap() = 255;
                Some(frame)
            };
            let settings = Settings {
                output_height: 4,
                ..SETTINGS
            };

            let mut file = Scripted::new(SourceKind::File, vec![marked()]);
            let mut detector = Recorder::default();
            run(&mut file, &mut detector, &mut Collector::never_cancelling(), settings).unwrap();
            assert_eq!(detector.corners, vec![0]);

            let mut camera = Scripted::new(SourceKind::Live, vec![marked()]);
            let mut detector = Recorder::default();
            run(&mut camera, &mut detector, &mut Collector::cancelling_after(1), settings).unwrap();
            assert_eq!(detector.corners, vec![255]);
        }

        #[test]
        fn frames_reach_detector_at_output_height() {
            let mut source = Scripted::new(SourceKind::File, vec![Some(blank(4, 8))]);
            let mut detector = Recorder::default();
            let settings = Settings {
                output_height: 8,
                ..SETTINGS
            };
            run(&mut source, &mut detector, &mut Collector::never_cancelling(), settings).unwrap();
            assert_eq!(detector.sizes, vec![Size::new(16, 8)]);
        }

        #[test]
        fn cancellation_stops_loop() {
            let mut source = Scripted::new(SourceKind::File, frames(5));
            let mut detector = Recorder::default();
            let mut surface = Collector::cancelling_after(2);
            let summary = run(&mut source, &mut detector, &mut surface, SETTINGS).unwrap();
            assert_eq!(summary.frames, 2);
            assert_eq!(source.reads, 2);
        }
    }

    mod resize_to_height_tests {
        use super::*;

        #[test]
        fn truncates_width() {
            let frame = blank(480, 640);
            let resized = resize_to_height(&frame, 640).unwrap();
            assert_eq!(resized.size().unwrap(), Size::new(853, 640));
        }

        #[test]
        fn rejects_empty_frame() {
            assert!(matches!(
                resize_to_height(&Mat::default(), 640),
                Err(Error::FrameSize(0, 0))
            ));
        }
    }

    #[test]
    fn mirror_flips_columns() {
        let mut frame = blank(1, 3);
        *frame.at_2d_mut::<u8>(0, 0).unwrap() = 7;
        let mirrored = mirror(&frame).unwrap();
        assert_eq!(*mirrored.at_2d::<u8>(0, 2).unwrap(), 7);
        assert_eq!(*mirrored.at_2d::<u8>(0, 0).unwrap(), 0);
    }

    mod frame_rate_tests {
        use super::*;

        #[test]
        fn first_frame_has_no_rate() {
            assert_eq!(FrameRate::default().tick(Instant::now()), None);
        }

        #[test]
        fn rate_is_inverse_of_gap() {
            let start = Instant::now();
            let mut frame_rate = FrameRate::default();
            frame_rate.tick(start);
            let rate = frame_rate.tick(start + Duration::from_millis(100)).unwrap();
            assert_approx_eq!(rate, 10.0);
        }

        #[test]
        fn zero_gap_keeps_previous_rate() {
            let start = Instant::now();
            let later = start + Duration::from_millis(50);
            let mut frame_rate = FrameRate::default();
            frame_rate.tick(start);
            frame_rate.tick(later);
            let rate = frame_rate.tick(later).unwrap();
            assert_approx_eq!(rate, 20.0);
        }

        #[test]
        fn zero_gap_without_rate_stays_empty() {
            let start = Instant::now();
            let mut frame_rate = FrameRate::default();
            frame_rate.tick(start);
            assert_eq!(frame_rate.tick(start), None);
        }
    }
}
