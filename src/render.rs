use crate::{
    classify::PoseLabel,
    error::Error,
    landmark::{constants::POSE_CONNECTIONS, LandmarkKind, Landmarks, NUM_LANDMARKS},
};
use indicatif::ProgressBar;
use opencv::{
    core::{Mat, Point, Scalar, Vector},
    imgcodecs::imwrite,
    imgproc::{FONT_HERSHEY_PLAIN, LINE_8, LINE_AA},
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

const GREEN: (f64, f64, f64) = (0.0, 255.0, 0.0);
const YELLOW: (f64, f64, f64) = (0.0, 255.0, 255.0);

/// Landmarks less visible than this are not drawn.
const VISIBILITY_THRESHOLD: f32 = 0.5;

/// Text written over a frame.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub(crate) struct Overlay {
    pub(crate) label: Option<PoseLabel>,
    pub(crate) frames_per_second: Option<f64>,
}

impl Overlay {
    fn lines(&self) -> impl Iterator<Item = (String, (f64, f64, f64))> {
        let label = self.label.map(|label| (label.to_string(), label.color()));
        let fps = self
            .frames_per_second
            .map(|fps| (format!("FPS: {}", fps as u64), GREEN));
        label.into_iter().chain(fps)
    }
}

impl std::fmt::Display for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = self.lines().map(|(text, _)| text).collect::<Vec<_>>();
        if text.is_empty() {
            f.write_str("no pose")
        } else {
            f.write_str(&text.join(" | "))
        }
    }
}

/// Where annotated frames go.
pub(crate) trait Surface {
    fn present(&mut self, frame: &mut Mat, overlay: &Overlay) -> Result<(), Error>;

    /// Poll, without blocking indefinitely, whether the user asked to stop.
    fn cancelled(&mut self) -> Result<bool, Error>;
}

/// Draw the skeleton of `landmarks` onto `frame`.
pub(crate) fn draw_landmarks(frame: &mut Mat, landmarks: &Landmarks) -> Result<(), Error> {
    let mut xys = [None; NUM_LANDMARKS];

    for (index, landmark) in landmarks.iter().enumerate() {
        // non-finite coordinates have no pixel to draw at
        let point = match landmark.to_point() {
            Ok(point) if landmark.visibility >= VISIBILITY_THRESHOLD => point,
            _ => continue,
        };
        xys[LandmarkKind::from_idx(index)?.idx()?] = Some(point);
        opencv::imgproc::circle(
            frame,
            point,
            4,
            Scalar::from(GREEN),
            -1,     // filled
            LINE_8, // line_type
            0,      // shift
        )
        .map_err(Error::DrawCircle)?;
    }

    for &(a, b) in POSE_CONNECTIONS.iter() {
        if let (Some(a_point), Some(b_point)) = (xys[a.idx()?], xys[b.idx()?]) {
            opencv::imgproc::line(
                frame,
                a_point,
                b_point,
                Scalar::from(YELLOW),
                2,      // thickness
                LINE_8, // line_type
                0,      // shift
            )
            .map_err(Error::DrawLine)?;
        }
    }
    Ok(())
}

/// Write the overlay's lines in the top left corner of `frame`.
pub(crate) fn draw_overlay(frame: &mut Mat, overlay: &Overlay) -> Result<(), Error> {
    for (row, (text, color)) in overlay.lines().enumerate() {
        opencv::imgproc::put_text(
            frame,
            &text,
            Point::new(10, 30 * (row as i32 + 1)),
            FONT_HERSHEY_PLAIN,
            2.0,
            Scalar::from(color),
            2,       // thickness
            LINE_AA, // line_type
            false,   // bottom_left_origin
        )
        .map_err(Error::PutText)?;
    }
    Ok(())
}

/// Write `frame` to `path`, in the format its extension names.
pub(crate) fn write_image(path: &Path, frame: &Mat) -> Result<(), Error> {
    let written = imwrite(&path.to_string_lossy(), frame, &Vector::new())
        .map_err(|e| Error::WriteImage(e, path.to_owned()))?;
    if !written {
        return Err(Error::ImageNotWritten(path.to_owned()));
    }
    Ok(())
}

/// A terminal surface: frames are dropped, the overlay goes to an optional
/// spinner, and Ctrl-C cancels.
pub(crate) struct Headless {
    running: Arc<AtomicBool>,
    progress: Option<ProgressBar>,
}

impl Headless {
    pub(crate) fn new(running: Arc<AtomicBool>, progress: Option<ProgressBar>) -> Self {
        Self { running, progress }
    }
}

impl Surface for Headless {
    fn present(&mut self, _frame: &mut Mat, overlay: &Overlay) -> Result<(), Error> {
        if let Some(progress) = self.progress.as_ref() {
            progress.set_message(overlay.to_string());
            progress.inc(1);
        }
        Ok(())
    }

    fn cancelled(&mut self) -> Result<bool, Error> {
        Ok(!self.running.load(Ordering::SeqCst))
    }
}

impl Drop for Headless {
    fn drop(&mut self) {
        if let Some(progress) = self.progress.take() {
            progress.finish_and_clear();
        }
    }
}

/// Poll for a key press until one arrives or `running` is cleared. Returns
/// whether a key was pressed.
#[cfg(any(feature = "gui", test))]
fn wait_for_key<F>(running: &AtomicBool, mut poll: F) -> Result<bool, Error>
where
    F: FnMut() -> Result<i32, Error>,
{
    while running.load(Ordering::SeqCst) {
        // negative means the wait timed out
        if poll()? >= 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(feature = "gui")]
pub(crate) use window::Window;

#[cfg(feature = "gui")]
mod window {
    use super::{draw_overlay, wait_for_key, Overlay, Surface};
    use crate::error::Error;
    use opencv::{core::Mat, highgui};
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    const ESC_KEY: i32 = 27;
    const Q_KEY: u8 = b'q';

    /// An OpenCV window. ESC or `q` in the window cancels, as does Ctrl-C.
    pub(crate) struct Window {
        name: String,
        wait_key_ms: i32,
        running: Arc<AtomicBool>,
    }

    impl Window {
        pub(crate) fn open(
            name: &str,
            wait_key_ms: i32,
            running: Arc<AtomicBool>,
        ) -> Result<Self, Error> {
            highgui::named_window(name, highgui::WINDOW_NORMAL).map_err(Error::NamedWindow)?;
            Ok(Self {
                name: name.to_owned(),
                // zero would block until a key is pressed
                wait_key_ms: wait_key_ms.max(1),
                running,
            })
        }

        /// Show `frame` until any key is pressed or Ctrl-C.
        pub(crate) fn show_until_key(&mut self, frame: &Mat) -> Result<(), Error> {
            highgui::imshow(&self.name, frame).map_err(Error::ImShow)?;
            let wait_key_ms = self.wait_key_ms;
            wait_for_key(&self.running, || {
                highgui::wait_key(wait_key_ms).map_err(Error::WaitKey)
            })?;
            Ok(())
        }
    }

    impl Surface for Window {
        fn present(&mut self, frame: &mut Mat, overlay: &Overlay) -> Result<(), Error> {
            draw_overlay(frame, overlay)?;
            highgui::imshow(&self.name, frame).map_err(Error::ImShow)
        }

        fn cancelled(&mut self) -> Result<bool, Error> {
            let key = highgui::wait_key(self.wait_key_ms).map_err(Error::WaitKey)? & 0xFF;
            Ok(key == ESC_KEY || key == i32::from(Q_KEY) || !self.running.load(Ordering::SeqCst))
        }
    }

    impl Drop for Window {
        fn drop(&mut self) {
            let _ = highgui::destroy_window(&self.name);
        }
    }
}
