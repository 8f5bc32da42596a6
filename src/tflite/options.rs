use crate::{
    error::{check_null_mut, Error},
    tflite_sys,
};
use std::convert::TryFrom;

/// Interpreter construction options. Only needed until the interpreter exists.
pub(crate) struct Options {
    options: *mut tflite_sys::TfLiteInterpreterOptions,
}

impl Options {
    pub(crate) fn new() -> Result<Self, Error> {
        Ok(Self {
            options: check_null_mut(
                // SAFETY: API is guaranteed to return a valid pointer or null
                unsafe { tflite_sys::TfLiteInterpreterOptionsCreate() },
            )
            .ok_or(Error::CreateOptions)?,
        })
    }

    pub(crate) fn set_num_threads(&mut self, num_threads: usize) -> Result<(), Error> {
        let num_threads = i32::try_from(num_threads).map_err(Error::GetFfiIndex)?;
        // SAFETY: self.options is a valid pointer
        unsafe {
            tflite_sys::TfLiteInterpreterOptionsSetNumThreads(self.options, num_threads);
        }
        Ok(())
    }

    pub(super) fn as_ptr(&self) -> *const tflite_sys::TfLiteInterpreterOptions {
        self.options
    }
}

impl Drop for Options {
    fn drop(&mut self) {
        // SAFETY: self.options is guaranteed to be valid
        unsafe {
            tflite_sys::TfLiteInterpreterOptionsDelete(self.options);
        }
    }
}
