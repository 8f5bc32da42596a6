use crate::{
    detect::{Detector, Mode},
    error::Error,
    landmark::{NormalizedLandmark, NormalizedLandmarks, NUM_LANDMARKS},
    tflite,
};
use ndarray::{ArrayView2, Axis};
use num_traits::cast::ToPrimitive;
use opencv::{
    core::{Mat, Rect, Size, CV_32FC3},
    imgproc::{cvt_color, resize, COLOR_BGR2RGB, INTER_LINEAR},
    prelude::*,
};
use std::{
    path::Path,
    time::{Duration, Instant},
};
use tracing::{debug, instrument, trace};

const LANDMARKS_OUTPUT: usize = 0;
const PRESENCE_OUTPUT: usize = 1;
/// x, y, z, visibility logit, presence logit
const VALUES_PER_LANDMARK: usize = 5;
/// Growth of the landmark bounding box when it becomes the next search region.
const ROI_SCALE: f32 = 1.25;

#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct Timing {
    pub(crate) inference: Duration,
    pub(crate) invocations: u32,
}

impl Timing {
    pub(crate) fn mean_inference(&self) -> Option<Duration> {
        self.inference.checked_div(self.invocations)
    }
}

/// MediaPipe BlazePose landmark model run through TensorFlow Lite.
pub(crate) struct BlazePose {
    interpreter: tflite::Interpreter,
    input_size: Size,
    mode: Mode,
    min_detection_confidence: f32,
    roi: Option<Rect>,
    pub(crate) timing: Timing,
}

impl BlazePose {
    pub(crate) fn new<P>(
        model_path: P,
        mode: Mode,
        min_detection_confidence: f32,
        num_threads: usize,
    ) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let mut interpreter = tflite::Interpreter::new(model_path, num_threads)?;

        let output_tensor_count = interpreter.get_output_tensor_count()?;
        if output_tensor_count <= PRESENCE_OUTPUT {
            return Err(Error::GetExpectedNumOutputs(
                PRESENCE_OUTPUT + 1,
                output_tensor_count,
            ));
        }
        {
            let landmarks = interpreter.get_output_tensor(LANDMARKS_OUTPUT)?;
            let presence = interpreter.get_output_tensor(PRESENCE_OUTPUT)?;
            debug!(
                landmarks = landmarks.name()?,
                landmarks_shape = ?landmarks.shape()?,
                presence = presence.name()?,
            );
        }

        let shape = interpreter.get_input_tensor(0)?.shape()?;
        let input_size = match shape[..] {
            [1, height, width, 3] => Size::new(
                width.to_i32().ok_or(Error::ConvertToI32)?,
                height.to_i32().ok_or(Error::ConvertToI32)?,
            ),
            _ => return Err(Error::InputTensorShape(shape)),
        };

        Ok(Self {
            interpreter,
            input_size,
            mode,
            min_detection_confidence,
            roi: None,
            timing: Default::default(),
        })
    }

    fn search_region(&self, frame: Size) -> Rect {
        match (self.mode, self.roi) {
            (Mode::Video, Some(roi)) => roi,
            _ => Rect::new(0, 0, frame.width, frame.height),
        }
    }

    fn infer(&mut self, input: &[f32]) -> Result<f32, Error> {
        self.interpreter.get_input_tensor(0)?.copy_from_f32(input)?;

        let start_inference = Instant::now();
        self.interpreter.invoke()?;
        self.timing.inference += start_inference.elapsed();
        self.timing.invocations += 1;

        self.interpreter
            .get_output_tensor(PRESENCE_OUTPUT)?
            .as_f32_slice()?
            .first()
            .copied()
            .ok_or(Error::EmptyOutputTensor(PRESENCE_OUTPUT))
    }
}

impl Detector for BlazePose {
    #[instrument(name = "BlazePose::detect", skip(self, image), level = "debug")]
    fn detect(&mut self, image: &Mat) -> Result<Option<NormalizedLandmarks>, Error> {
        let frame = image.size().map_err(Error::GetMatSize)?;
        if frame.width <= 0 || frame.height <= 0 {
            return Err(Error::FrameSize(frame.width, frame.height));
        }
        let roi = self.search_region(frame);
        let input = preprocess(image, roi, self.input_size)?;

        let presence = self.infer(&input)?;
        // NaN scores count as a miss
        if !(presence >= self.min_detection_confidence) {
            trace!(presence, "no person detected");
            self.roi = None;
            return Ok(None);
        }

        let output = self.interpreter.get_output_tensor(LANDMARKS_OUTPUT)?;
        let raw = landmark_rows(output.as_f32_slice()?)?;
        let landmarks = decode_landmarks(raw, self.input_size, roi, frame)?;

        if self.mode == Mode::Video {
            self.roi = region_around(&landmarks, frame);
        }
        trace!(presence, roi = ?self.roi);
        Ok(Some(landmarks))
    }
}

/// Crop `image` to `roi` and lay it out as the model's RGB float input in [0, 1].
fn preprocess(image: &Mat, roi: Rect, input_size: Size) -> Result<Vec<f32>, Error> {
    let cropped = Mat::roi(image, roi).map_err(Error::Crop)?;

    let mut rgb = Mat::default();
    cvt_color(&cropped, &mut rgb, COLOR_BGR2RGB, 0).map_err(Error::ConvertColor)?;

    let mut resized = Mat::default();
    resize(&rgb, &mut resized, input_size, 0.0, 0.0, INTER_LINEAR).map_err(Error::Resize)?;

    let mut scaled = Mat::default();
    resized
        .convert_to(&mut scaled, CV_32FC3, 1.0 / 255.0, 0.0)
        .map_err(Error::ConvertElementType)?;

    Ok(scaled
        .reshape(1, 0)
        .map_err(Error::Reshape)?
        .data_typed::<f32>()
        .map_err(Error::GetMatData)?
        .to_vec())
}

/// View the flat landmark output as one row per landmark. Trailing auxiliary
/// rows are kept; fewer than a full set is an error.
fn landmark_rows(values: &[f32]) -> Result<ArrayView2<'_, f32>, Error> {
    let rows = values.len() / VALUES_PER_LANDMARK;
    if rows < NUM_LANDMARKS {
        return Err(Error::LandmarkCount(NUM_LANDMARKS, rows));
    }
    ArrayView2::from_shape(
        (rows, VALUES_PER_LANDMARK),
        &values[..rows * VALUES_PER_LANDMARK],
    )
    .map_err(Error::ConstructArrayView)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Map raw model rows, in model input pixels over `roi`, to landmarks
/// normalized against the whole `frame`.
fn decode_landmarks(
    raw: ArrayView2<f32>,
    input_size: Size,
    roi: Rect,
    frame: Size,
) -> Result<NormalizedLandmarks, Error> {
    let to_f32 = |value: i32| value.to_f32().ok_or(Error::ConvertToF32);
    let (input_width, input_height) = (to_f32(input_size.width)?, to_f32(input_size.height)?);
    let (roi_x, roi_y) = (to_f32(roi.x)?, to_f32(roi.y)?);
    let (roi_width, roi_height) = (to_f32(roi.width)?, to_f32(roi.height)?);
    let (frame_width, frame_height) = (to_f32(frame.width)?, to_f32(frame.height)?);

    let mut landmarks = [NormalizedLandmark::default(); NUM_LANDMARKS];
    for (landmark, row) in landmarks.iter_mut().zip(raw.axis_iter(Axis(0))) {
        *landmark = NormalizedLandmark {
            x: (roi_x + row[0] / input_width * roi_width) / frame_width,
            y: (roi_y + row[1] / input_height * roi_height) / frame_height,
            z: row[2] / input_width * roi_width / frame_width,
            visibility: sigmoid(row[3]),
        };
    }
    Ok(landmarks)
}

/// The square search region for the next frame: the landmarks' bounding box,
/// grown by `ROI_SCALE` around its centre and clipped to the frame.
fn region_around(landmarks: &NormalizedLandmarks, frame: Size) -> Option<Rect> {
    let (frame_width, frame_height) = (frame.width as f32, frame.height as f32);
    let (min_x, min_y, max_x, max_y) = landmarks.iter().fold(
        (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        |(min_x, min_y, max_x, max_y), landmark| {
            let (x, y) = (landmark.x * frame_width, landmark.y * frame_height);
            (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
        },
    );
    let half_side = (max_x - min_x).max(max_y - min_y) * ROI_SCALE / 2.0;
    let (center_x, center_y) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    let left = (center_x - half_side).max(0.0).floor().to_i32()?;
    let top = (center_y - half_side).max(0.0).floor().to_i32()?;
    let right = (center_x + half_side).min(frame_width).ceil().to_i32()?;
    let bottom = (center_y + half_side).min(frame_height).ceil().to_i32()?;

    if right - left < 1 || bottom - top < 1 {
        return None;
    }
    Some(Rect::new(left, top, right - left, bottom - top))
}
