use log::debug;
use machine_learning::ParameterMapping;
use safetensors::{Dtype, SafeTensorError, SafeTensors};

use super::{ParamDeserializer, Precision, to_tensor};
use crate::error::{LoaderErr, Result};

/// Reads `safetensors` files holding rank 1 and rank 2 floating point tensors.
///
/// Entries are returned in the order their data is laid out in the file. Writers lay data out
/// by dtype and then by name, so this is not the order the parameters were exported in.
#[derive(Debug, Default, Clone, Copy)]
pub struct SafetensorsDeserializer;

impl ParamDeserializer for SafetensorsDeserializer {
    fn deserialize(&self, bytes: &[u8]) -> Result<ParameterMapping> {
        let tensors = SafeTensors::deserialize(bytes).map_err(corrupt)?;
        let (_, metadata) = SafeTensors::read_metadata(bytes).map_err(corrupt)?;
        let infos = metadata.tensors();

        let mut entries = tensors.tensors();
        entries.sort_by_key(|(name, _)| infos.get(name).map(|info| info.data_offsets.0));

        let params = entries
            .into_iter()
            .map(|(name, view)| {
                let precision = precision(&name, view.dtype())?;
                let tensor = to_tensor(&name, precision, view.shape(), view.data())?;
                Ok((name, tensor))
            })
            .collect::<Result<ParameterMapping>>()?;

        debug!(tensors = params.len(); "deserialized safetensors parameters");
        Ok(params)
    }
}

fn corrupt(e: SafeTensorError) -> LoaderErr {
    LoaderErr::CorruptArtifact(e.to_string())
}

fn precision(name: &str, dtype: Dtype) -> Result<Precision> {
    match dtype {
        Dtype::F16 => Ok(Precision::F16),
        Dtype::BF16 => Ok(Precision::BF16),
        Dtype::F32 => Ok(Precision::F32),
        Dtype::F64 => Ok(Precision::F64),
        other => Err(LoaderErr::CorruptArtifact(format!(
            "`{name}` has dtype {other:?}, expected a floating point type"
        ))),
    }
}
