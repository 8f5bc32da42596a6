use crate::{
    error::{check_null, check_null_mut, tflite_status_to_result, Error},
    tflite_sys,
};
use std::{convert::TryFrom, ffi::CStr, marker::PhantomData};

fn dim(tensor: *const tflite_sys::TfLiteTensor, index: usize) -> Result<usize, Error> {
    let dims = num_dims(tensor)?;
    if index >= dims {
        return Err(Error::GetDim(index, dims));
    }

    let index = i32::try_from(index).map_err(Error::ConvertUSizeToI32Index)?;
    // SAFETY: tensor is non-null and owned by a live interpreter
    usize::try_from(unsafe { tflite_sys::TfLiteTensorDim(tensor, index) })
        .map_err(Error::ConvertDimI32ToUSize)
}

fn num_dims(tensor: *const tflite_sys::TfLiteTensor) -> Result<usize, Error> {
    // SAFETY: tensor is non-null and owned by a live interpreter
    usize::try_from(unsafe { tflite_sys::TfLiteTensorNumDims(tensor) }).map_err(Error::GetNumDims)
}

fn shape(tensor: *const tflite_sys::TfLiteTensor) -> Result<Vec<usize>, Error> {
    (0..num_dims(tensor)?).map(|d| dim(tensor, d)).collect()
}

fn r#type(tensor: *const tflite_sys::TfLiteTensor) -> tflite_sys::TfLiteType {
    // SAFETY: tensor is non-null and owned by a live interpreter
    unsafe { tflite_sys::TfLiteTensorType(tensor) }
}

fn byte_size(tensor: *const tflite_sys::TfLiteTensor) -> usize {
    // SAFETY: tensor is non-null and owned by a live interpreter
    unsafe { tflite_sys::TfLiteTensorByteSize(tensor) }
}

/// A read-only view of an interpreter's output tensor.
pub(crate) struct Tensor<'interp> {
    tensor: *const tflite_sys::TfLiteTensor,
    // Data are owned by the interpreter that allocated the tensor.
    _p: PhantomData<&'interp ()>,
}

impl<'interp> Tensor<'interp> {
    pub(super) fn new(tensor: *const tflite_sys::TfLiteTensor) -> Result<Self, Error> {
        Ok(Self {
            tensor: check_null(tensor).ok_or(Error::CreateTensor)?,
            _p: PhantomData,
        })
    }

    pub(crate) fn name(&self) -> Result<&str, Error> {
        // SAFETY: the C API returns a nul-terminated string owned by the tensor
        unsafe { CStr::from_ptr(tflite_sys::TfLiteTensorName(self.tensor)) }
            .to_str()
            .map_err(Error::GetTensorName)
    }

    pub(crate) fn shape(&self) -> Result<Vec<usize>, Error> {
        shape(self.tensor)
    }

    /// View the tensor's data as a slice of f32 values.
    pub(crate) fn as_f32_slice(&self) -> Result<&'interp [f32], Error> {
        let typ = r#type(self.tensor);
        if typ != tflite_sys::TfLiteType::kTfLiteFloat32 {
            return Err(Error::GetTensorSlice(typ));
        }
        let len = byte_size(self.tensor) / std::mem::size_of::<f32>();
        // SAFETY: the tensor is float32, so its data buffer holds `len` f32 values
        // that live as long as the interpreter.
        Ok(unsafe {
            std::slice::from_raw_parts(
                tflite_sys::TfLiteTensorData(self.tensor) as *const f32,
                len,
            )
        })
    }
}

/// A writable handle to an interpreter's input tensor.
pub(crate) struct InputTensor<'interp> {
    tensor: *mut tflite_sys::TfLiteTensor,
    _p: PhantomData<&'interp mut ()>,
}

impl<'interp> InputTensor<'interp> {
    pub(super) fn new(tensor: *mut tflite_sys::TfLiteTensor) -> Result<Self, Error> {
        Ok(Self {
            tensor: check_null_mut(tensor).ok_or(Error::CreateTensor)?,
            _p: PhantomData,
        })
    }

    pub(crate) fn shape(&self) -> Result<Vec<usize>, Error> {
        shape(self.tensor)
    }

    /// Copy `values` into the tensor, which must be float32 and exactly as large.
    pub(crate) fn copy_from_f32(&mut self, values: &[f32]) -> Result<(), Error> {
        let typ = r#type(self.tensor);
        if typ != tflite_sys::TfLiteType::kTfLiteFloat32 {
            return Err(Error::GetTensorSlice(typ));
        }
        let num_bytes = std::mem::size_of_val(values);
        let expected = byte_size(self.tensor);
        if num_bytes != expected {
            return Err(Error::TensorByteSize(expected, num_bytes));
        }
        tflite_status_to_result(
            // SAFETY: `values` is valid for `num_bytes` bytes and the sizes match
            unsafe {
                tflite_sys::TfLiteTensorCopyFromBuffer(
                    self.tensor,
                    values.as_ptr().cast(),
                    num_bytes,
                )
            },
            "failed to copy input into tensor",
        )
    }
}
