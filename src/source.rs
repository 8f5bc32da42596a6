use crate::error::Error;
use crossbeam::channel::{bounded, Receiver};
use opencv::{
    core::Mat,
    imgcodecs::{imread, IMREAD_COLOR},
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use std::{path::Path, thread::JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SourceKind {
    /// A capture device. Failed reads are hiccups.
    Live,
    /// A recording. A failed read means the stream is exhausted.
    File,
}

pub(crate) enum Acquisition {
    Frame(Mat),
    Failed,
}

pub(crate) trait FrameSource {
    fn kind(&self) -> SourceKind;

    /// Block until the next frame is available or the read fails.
    fn next_frame(&mut self) -> Result<Acquisition, Error>;
}

fn read(capture: &mut VideoCapture) -> Result<Acquisition, Error> {
    let mut frame = Mat::default();
    if !capture.read(&mut frame).map_err(Error::ReadFrame)?
        || frame.empty().map_err(Error::ReadFrame)?
    {
        return Ok(Acquisition::Failed);
    }
    Ok(Acquisition::Frame(frame))
}

/// A camera that errors on a read may recover on the next one.
fn tolerate_read_error(acquisition: Result<Acquisition, Error>) -> Result<Acquisition, Error> {
    match acquisition {
        Err(Error::ReadFrame(e)) => {
            warn!(error = %e, "camera read failed");
            Ok(Acquisition::Failed)
        }
        acquisition => acquisition,
    }
}

pub(crate) struct Camera {
    capture: VideoCapture,
}

impl Camera {
    pub(crate) fn open(
        device: i32,
        frame_width: Option<u16>,
        frame_height: Option<u16>,
    ) -> Result<Self, Error> {
        let mut capture = VideoCapture::new(device, CAP_ANY).map_err(Error::OpenCapture)?;
        if !capture.is_opened().map_err(Error::OpenCapture)? {
            return Err(Error::CaptureNotOpened(format!("/dev/video{}", device)));
        }

        for (property, value) in [
            (CAP_PROP_FRAME_WIDTH, frame_width),
            (CAP_PROP_FRAME_HEIGHT, frame_height),
        ]
        .iter()
        {
            if let Some(value) = value.map(f64::from) {
                capture
                    .set(*property, value)
                    .map_err(|e| Error::SetCaptureProperty(*property, e))?;
            }
        }

        info!(
            message = "opened camera",
            device,
            width = capture.get(CAP_PROP_FRAME_WIDTH).unwrap_or_default(),
            height = capture.get(CAP_PROP_FRAME_HEIGHT).unwrap_or_default(),
        );
        Ok(Self { capture })
    }
}

impl FrameSource for Camera {
    fn kind(&self) -> SourceKind {
        SourceKind::Live
    }

    fn next_frame(&mut self) -> Result<Acquisition, Error> {
        tolerate_read_error(read(&mut self.capture))
    }
}

pub(crate) struct VideoFile {
    capture: VideoCapture,
}

impl VideoFile {
    pub(crate) fn open(path: &Path) -> Result<Self, Error> {
        let name = path.to_string_lossy();
        let capture = VideoCapture::from_file(&name, CAP_ANY).map_err(Error::OpenCapture)?;
        if !capture.is_opened().map_err(Error::OpenCapture)? {
            return Err(Error::CaptureNotOpened(name.into_owned()));
        }
        info!(message = "opened video file", path = %path.display());
        Ok(Self { capture })
    }
}

impl FrameSource for VideoFile {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn next_frame(&mut self) -> Result<Acquisition, Error> {
        read(&mut self.capture)
    }
}

/// Load the still image at `path` as a BGR frame.
pub(crate) fn read_image(path: &Path) -> Result<Mat, Error> {
    let image = imread(&path.to_string_lossy(), IMREAD_COLOR)
        .map_err(|e| Error::ReadImage(e, path.to_owned()))?;
    if image.empty().map_err(|e| Error::ReadImage(e, path.to_owned()))? {
        return Err(Error::EmptyImage(path.to_owned()));
    }
    Ok(image)
}

/// Reads frames from `source` on a producer thread, holding at most `depth`
/// of them in a bounded queue.
pub(crate) struct Prefetch {
    kind: SourceKind,
    frames: Option<Receiver<Result<Acquisition, Error>>>,
    producer: Option<JoinHandle<()>>,
}

impl Prefetch {
    pub(crate) fn spawn<S>(mut source: S, depth: usize) -> Self
    where
        S: FrameSource + Send + 'static,
    {
        let kind = source.kind();
        let (frames_tx, frames_rx) = bounded(depth);
        let producer = std::thread::spawn(move || loop {
            let acquisition = source.next_frame();
            let last = match acquisition {
                Ok(Acquisition::Failed) => kind == SourceKind::File,
                Ok(Acquisition::Frame(_)) => false,
                Err(_) => true,
            };
            // the consumer hung up
            if frames_tx.send(acquisition).is_err() {
                break;
            }
            if last {
                debug!("frame producer finished");
                break;
            }
        });
        Self {
            kind,
            frames: Some(frames_rx),
            producer: Some(producer),
        }
    }
}

impl FrameSource for Prefetch {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn next_frame(&mut self) -> Result<Acquisition, Error> {
        self.frames
            .as_ref()
            .and_then(|frames| frames.recv().ok())
            .unwrap_or(Err(Error::PrefetchDisconnected))
    }
}

impl Drop for Prefetch {
    fn drop(&mut self) {
        // hang up first so a producer blocked on a full queue wakes up
        self.frames.take();
        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                debug!("frame producer panicked");
            }
        }
    }
}
