mod model;
pub(crate) use model::Model;

mod tensor;
pub(crate) use tensor::{InputTensor, Tensor};

mod interpreter;
pub(crate) use interpreter::Interpreter;

mod options;
pub(crate) use options::Options;
