use crate::{
    error::{check_null_mut, Error},
    tflite_sys,
};
use std::{ffi::CString, os::unix::ffi::OsStrExt, path::Path};

/// An owned, immutable flatbuffer model loaded from disk.
pub(crate) struct Model {
    /// SAFETY: `model` is owned and never mutated after construction.
    model: *mut tflite_sys::TfLiteModel,
}

fn path_to_c_string(path: &Path) -> Result<CString, Error> {
    CString::new(path.as_os_str().as_bytes()).map_err(Error::PathToCString)
}

impl Model {
    pub(crate) fn new<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let path = path_to_c_string(path.as_ref())?;
        // SAFETY: `path` is a valid nul-terminated string for the duration of the call
        let model = check_null_mut(unsafe { tflite_sys::TfLiteModelCreateFromFile(path.as_ptr()) })
            .ok_or(Error::GetModelFromFile)?;
        Ok(Self { model })
    }

    pub(super) fn as_ptr(&self) -> *const tflite_sys::TfLiteModel {
        self.model
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        // SAFETY: self.model was created by TfLiteModelCreateFromFile and is deleted once
        unsafe {
            tflite_sys::TfLiteModelDelete(self.model);
        }
    }
}
