use crate::{
    error::{check_null, check_null_mut, tflite_status_to_result, Error},
    tflite::{InputTensor, Model, Options, Tensor},
    tflite_sys,
};
use std::{convert::TryFrom, path::Path};
use tracing::debug;

pub(crate) struct Interpreter {
    interpreter: *mut tflite_sys::TfLiteInterpreter,
    // Never read. The model must outlive the interpreter built from it.
    _model: Model,
}

impl Interpreter {
    /// Load the model at `path` and allocate its tensors.
    pub(crate) fn new<P>(path: P, num_threads: usize) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let mut options = Options::new()?;
        options.set_num_threads(num_threads)?;

        let model = Model::new(&path)?;
        let interpreter = check_null_mut(
            // SAFETY: model and options are both valid pointers; options may be
            // dropped once the interpreter exists
            unsafe { tflite_sys::TfLiteInterpreterCreate(model.as_ptr(), options.as_ptr()) },
        )
        .ok_or(Error::CreateInterpreter)?;

        let mut interpreter = Self {
            interpreter,
            _model: model,
        };
        interpreter.allocate_tensors()?;

        debug!(
            message = "loaded model",
            path = %path.as_ref().display(),
            outputs = interpreter.get_output_tensor_count()?,
        );
        Ok(interpreter)
    }

    fn allocate_tensors(&mut self) -> Result<(), Error> {
        tflite_status_to_result(
            // SAFETY: self.interpreter is valid
            unsafe { tflite_sys::TfLiteInterpreterAllocateTensors(self.interpreter) },
            "failed to allocate tensors",
        )
    }

    pub(crate) fn invoke(&mut self) -> Result<(), Error> {
        tflite_status_to_result(
            // SAFETY: self.interpreter is valid and its tensors are allocated
            unsafe { tflite_sys::TfLiteInterpreterInvoke(self.interpreter) },
            "model invocation failed",
        )
    }

    pub(crate) fn get_input_tensor(&mut self, index: usize) -> Result<InputTensor<'_>, Error> {
        let index = i32::try_from(index).map_err(Error::GetFfiIndex)?;
        InputTensor::new(
            check_null_mut(unsafe {
                tflite_sys::TfLiteInterpreterGetInputTensor(self.interpreter, index)
            })
            .ok_or(Error::GetInputTensor)?,
        )
    }

    pub(crate) fn get_output_tensor_count(&self) -> Result<usize, Error> {
        usize::try_from(unsafe {
            tflite_sys::TfLiteInterpreterGetOutputTensorCount(self.interpreter)
        })
        .map_err(Error::GetFfiIndex)
    }

    pub(crate) fn get_output_tensor(&self, index: usize) -> Result<Tensor<'_>, Error> {
        let index = i32::try_from(index).map_err(Error::GetFfiIndex)?;
        Tensor::new(
            check_null(unsafe {
                tflite_sys::TfLiteInterpreterGetOutputTensor(self.interpreter, index)
            })
            .ok_or(Error::GetOutputTensor)?,
        )
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        // SAFETY: self.interpreter is guaranteed to be valid.
        unsafe {
            tflite_sys::TfLiteInterpreterDelete(self.interpreter);
        };
    }
}
