mod safetensors_file;
mod torch_checkpoint;

use half::{bf16, f16};
use machine_learning::{ParameterMapping, Tensor};
use ndarray::IxDyn;

pub use self::{safetensors_file::SafetensorsDeserializer, torch_checkpoint::TorchDeserializer};
use crate::error::{LoaderErr, Result};

/// Parses the raw bytes of an artifact into named parameter tensors.
pub trait ParamDeserializer {
    fn deserialize(&self, bytes: &[u8]) -> Result<ParameterMapping>;
}

impl<T: ParamDeserializer + ?Sized> ParamDeserializer for &T {
    fn deserialize(&self, bytes: &[u8]) -> Result<ParameterMapping> {
        (**self).deserialize(bytes)
    }
}

/// The floating point encodings a stored parameter may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precision {
    F16,
    BF16,
    F32,
    F64,
}

impl Precision {
    fn size(self) -> usize {
        match self {
            Precision::F16 | Precision::BF16 => 2,
            Precision::F32 => 4,
            Precision::F64 => 8,
        }
    }
}

/// Builds a parameter tensor out of little endian `data`, widening it to `f32`.
fn to_tensor(name: &str, precision: Precision, shape: &[usize], data: &[u8]) -> Result<Tensor> {
    if !(1..=2).contains(&shape.len()) {
        return Err(LoaderErr::CorruptArtifact(format!(
            "`{name}` has rank {}, parameters must have rank 1 or 2",
            shape.len()
        )));
    }

    let values: Vec<f32> = match precision {
        Precision::F32 => bytemuck::pod_collect_to_vec(data),
        Precision::F64 => bytemuck::pod_collect_to_vec::<u8, f64>(data)
            .into_iter()
            .map(|v| v as f32)
            .collect(),
        Precision::F16 => bytemuck::pod_collect_to_vec::<u8, f16>(data)
            .into_iter()
            .map(f16::to_f32)
            .collect(),
        Precision::BF16 => bytemuck::pod_collect_to_vec::<u8, bf16>(data)
            .into_iter()
            .map(bf16::to_f32)
            .collect(),
    };

    Tensor::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| LoaderErr::CorruptArtifact(format!("`{name}`: {e}")))
}
