use crate::tflite_sys;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("expected {0} landmarks, got {1}")]
    LandmarkCount(usize, usize),

    #[error("failed to convert usize value to landmark kind: {0}")]
    ConvertUSizeToLandmarkKind(usize),

    #[error("failed to convert landmark variant to usize: {0:?}")]
    LandmarkVariantToUSize(crate::landmark::LandmarkKind),

    #[error("failed to convert value to f32")]
    ConvertToF32,

    #[error("failed to convert value to i32")]
    ConvertToI32,

    #[error("invalid frame dimensions: {0}x{1}")]
    FrameSize(i32, i32),

    #[error("failed to open video capture")]
    OpenCapture(#[source] opencv::Error),

    #[error("video capture is not opened: {0}")]
    CaptureNotOpened(String),

    #[error("failed to set video capture property {0}")]
    SetCaptureProperty(i32, #[source] opencv::Error),

    #[error("failed to read frame")]
    ReadFrame(#[source] opencv::Error),

    #[error("frame prefetch thread exited unexpectedly")]
    PrefetchDisconnected,

    #[error("failed to flip frame")]
    Flip(#[source] opencv::Error),

    #[error("failed to resize frame")]
    Resize(#[source] opencv::Error),

    #[error("failed to convert frame color")]
    ConvertColor(#[source] opencv::Error),

    #[error("failed to convert frame element type")]
    ConvertElementType(#[source] opencv::Error),

    #[error("failed to crop frame to region of interest")]
    Crop(#[source] opencv::Error),

    #[error("failed to reshape Mat")]
    Reshape(#[source] opencv::Error),

    #[error("failed to get Mat data")]
    GetMatData(#[source] opencv::Error),

    #[error("failed to get Mat size")]
    GetMatSize(#[source] opencv::Error),

    #[error("failed to read image: {1:?}")]
    ReadImage(#[source] opencv::Error, PathBuf),

    #[error("image is empty or unreadable: {0:?}")]
    EmptyImage(PathBuf),

    #[error("failed to write image: {1:?}")]
    WriteImage(#[source] opencv::Error, PathBuf),

    #[error("image encoder declined to write {0:?}")]
    ImageNotWritten(PathBuf),

    #[error("failed to draw line")]
    DrawLine(#[source] opencv::Error),

    #[error("failed to draw circle")]
    DrawCircle(#[source] opencv::Error),

    #[error("failed to draw text")]
    PutText(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed to create window")]
    NamedWindow(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed to show image")]
    ImShow(#[source] opencv::Error),

    #[cfg(feature = "gui")]
    #[error("failed to poll for key press")]
    WaitKey(#[source] opencv::Error),

    #[error("failed to convert Path to CString")]
    PathToCString(#[source] std::ffi::NulError),

    #[error("failed to construct model from file: C API returned null pointer")]
    GetModelFromFile,

    #[error("failed to create TfLiteInterpreterOptions structure")]
    CreateOptions,

    #[error("failed to create interpreter, got null pointer")]
    CreateInterpreter,

    #[error("tflite error: {0}")]
    TfLite(&'static str),

    #[error("failed to convert usize to i32")]
    GetFfiIndex(#[source] std::num::TryFromIntError),

    #[error("failed to get input tensor: got null pointer instead")]
    GetInputTensor,

    #[error("failed to get output tensor: got null pointer instead")]
    GetOutputTensor,

    #[error("got null pointer when constructing Tensor")]
    CreateTensor,

    #[error("dimension index {0} is out of bounds for tensor with dimensions {1}")]
    GetDim(usize, usize),

    #[error("failed to convert usize index to i32 index")]
    ConvertUSizeToI32Index(#[source] std::num::TryFromIntError),

    #[error("failed to convert dim i32 to usize")]
    ConvertDimI32ToUSize(#[source] std::num::TryFromIntError),

    #[error("failed to convert number of dims i32 to usize")]
    GetNumDims(#[source] std::num::TryFromIntError),

    #[error("failed to get tensor name")]
    GetTensorName(#[source] std::str::Utf8Error),

    #[error("tensor type is not valid for this operation: {0:?}")]
    GetTensorSlice(tflite_sys::TfLiteType),

    #[error("tensor holds {0} bytes, buffer holds {1}")]
    TensorByteSize(usize, usize),

    #[error("output tensor {0} is empty")]
    EmptyOutputTensor(usize),

    #[error("expected at least {0} output tensors, got {1}")]
    GetExpectedNumOutputs(usize, usize),

    #[error("expected a 4-d NHWC input tensor with 3 channels, got {0:?}")]
    InputTensorShape(Vec<usize>),

    #[error("failed to construct array view from tensor data")]
    ConstructArrayView(#[source] ndarray::ShapeError),
}

/// Check whether a pointer to const T is null.
pub(crate) fn check_null<T>(ptr: *const T) -> Option<*const T> {
    if ptr.is_null() {
        None
    } else {
        Some(ptr)
    }
}

/// Check whether a pointer to mut T is null.
pub(crate) fn check_null_mut<T>(ptr: *mut T) -> Option<*mut T> {
    if ptr.is_null() {
        None
    } else {
        Some(ptr)
    }
}

/// Turn a TfLiteStatus into a Result, attaching `message` on failure.
pub(crate) fn tflite_status_to_result(
    status: tflite_sys::TfLiteStatus,
    message: &'static str,
) -> Result<(), Error> {
    if status == tflite_sys::TfLiteStatus::kTfLiteOk {
        Ok(())
    } else {
        Err(Error::TfLite(message))
    }
}
