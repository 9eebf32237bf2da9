//! Checkpointing and Serialization.
//!
//! Named `f32` tensors are stored in the `safetensors` format. Model
//! parameters and cached feature sets both go through here.

use crate::error::{DdpError, Result};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// A flat `f32` buffer with its logical shape.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl NamedTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(DdpError::ShapeMismatch {
                expected: shape,
                got: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }
}

/// Saves a map of tensors to a safetensors file.
pub fn save_checkpoint<P: AsRef<Path>>(
    path: P,
    tensors: &BTreeMap<String, NamedTensor>,
    metadata: Option<HashMap<String, String>>,
) -> Result<()> {
    // The views borrow these byte buffers, so they must outlive serialization.
    let bytes: BTreeMap<&str, Vec<u8>> = tensors
        .iter()
        .map(|(name, t)| {
            let raw: Vec<u8> = t.data.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.as_str(), raw)
        })
        .collect();

    let mut views = HashMap::new();
    for (name, tensor) in tensors {
        let data = &bytes[name.as_str()];
        let view = TensorView::new(Dtype::F32, tensor.shape.clone(), data)
            .map_err(|e| DdpError::Checkpoint(format!("tensor {name}: {e:?}")))?;
        views.insert(name.clone(), view);
    }

    safetensors::serialize_to_file(&views, metadata, path.as_ref()).map_err(|e| {
        DdpError::Checkpoint(format!(
            "failed to save {}: {e:?}",
            path.as_ref().display()
        ))
    })
}

/// Loads a map of tensors from a safetensors file.
///
/// Only `F32` tensors are accepted.
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, NamedTensor>> {
    let path = path.as_ref();
    let file_content = std::fs::read(path)
        .map_err(|e| DdpError::io(format!("reading checkpoint {}", path.display()), e))?;

    let safetensors = SafeTensors::deserialize(&file_content).map_err(|e| {
        DdpError::Checkpoint(format!("failed to deserialize {}: {e:?}", path.display()))
    })?;

    let mut tensors = BTreeMap::new();
    for (name, view) in safetensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(DdpError::Checkpoint(format!(
                "tensor {name} has dtype {:?}, expected F32",
                view.dtype()
            )));
        }
        let data: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let tensor = NamedTensor::new(view.shape().to_vec(), data)?;
        tensors.insert(name, tensor);
    }

    Ok(tensors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_tensor_shape_check() {
        assert!(NamedTensor::new(vec![2, 2], vec![0.0; 4]).is_ok());
        assert!(matches!(
            NamedTensor::new(vec![2, 3], vec![0.0; 4]),
            Err(DdpError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_save_load_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("model.safetensors");

        let mut tensors = BTreeMap::new();
        tensors.insert(
            "classifier.weight".to_string(),
            NamedTensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        );
        tensors.insert(
            "classifier.bias".to_string(),
            NamedTensor::new(vec![2], vec![-0.5, 0.25]).unwrap(),
        );

        save_checkpoint(&file_path, &tensors, None).unwrap();
        let loaded = load_checkpoint(&file_path).unwrap();
        assert_eq!(loaded, tensors);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_checkpoint(dir.path().join("absent.safetensors"));
        assert!(matches!(err, Err(DdpError::Io { .. })));
    }
}
