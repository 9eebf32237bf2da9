//! Fixed-width feature extraction and the cached feature file.

use super::Dataset;
use super::examples::{InputExample, Split};
use super::tasks::TaskSpec;
use crate::checkpoint::{NamedTensor, load_checkpoint, save_checkpoint};
use crate::error::{DdpError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One example after feature extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub features: Vec<f32>,
    pub label: f32,
}

/// Turns a raw example into a fixed-width numeric vector.
pub trait FeatureExtractor: Send + Sync {
    /// Length of every vector returned by [`extract`](Self::extract).
    fn width(&self) -> usize;

    fn extract(&self, example: &InputExample) -> Vec<f32>;
}

/// Feature hashing of lower-cased whitespace tokens into `width` buckets.
///
/// Tokens of the second segment are hashed in their own namespace. The vector
/// is L2-normalized. Hashing is FNV-1a, stable across processes and platforms.
#[derive(Debug, Clone)]
pub struct HashingExtractor {
    width: usize,
}

impl HashingExtractor {
    pub fn new(width: usize) -> Result<Self> {
        if width == 0 {
            return Err(DdpError::config("feature_width", "must be at least 1"));
        }
        Ok(Self { width })
    }

    fn add_tokens(&self, text: &str, namespace: &[u8], out: &mut [f32]) {
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let hash = fnv1a(namespace.iter().chain(token.as_bytes()));
            out[(hash % self.width as u64) as usize] += 1.0;
        }
    }
}

fn fnv1a<'a>(bytes: impl Iterator<Item = &'a u8>) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl FeatureExtractor for HashingExtractor {
    fn width(&self) -> usize {
        self.width
    }

    fn extract(&self, example: &InputExample) -> Vec<f32> {
        let mut out = vec![0.0f32; self.width];
        self.add_tokens(&example.text_a, b"a:", &mut out);
        if let Some(b) = &example.text_b {
            self.add_tokens(b, b"b:", &mut out);
        }
        let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            out.iter_mut().for_each(|v| *v /= norm);
        }
        out
    }
}

/// Extracted features of one split, row-major `[len, width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    width: usize,
    inputs: Vec<f32>,
    labels: Vec<f32>,
}

impl FeatureSet {
    pub fn new(width: usize, inputs: Vec<f32>, labels: Vec<f32>) -> Result<Self> {
        if width == 0 || inputs.len() != width * labels.len() {
            return Err(DdpError::ShapeMismatch {
                expected: vec![labels.len(), width],
                got: vec![inputs.len()],
            });
        }
        Ok(Self {
            width,
            inputs,
            labels,
        })
    }

    pub fn from_examples(
        extractor: &dyn FeatureExtractor,
        task: &TaskSpec,
        examples: &[InputExample],
    ) -> Result<Self> {
        let width = extractor.width();
        let mut inputs = Vec::with_capacity(width * examples.len());
        let mut labels = Vec::with_capacity(examples.len());
        for ex in examples {
            let features = extractor.extract(ex);
            if features.len() != width {
                return Err(DdpError::ShapeMismatch {
                    expected: vec![width],
                    got: vec![features.len()],
                });
            }
            inputs.extend(features);
            labels.push(task.label_value(&ex.label)?);
        }
        Self::new(width, inputs, labels)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn labels(&self) -> &[f32] {
        &self.labels
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut tensors = BTreeMap::new();
        tensors.insert(
            "inputs".to_string(),
            NamedTensor::new(vec![self.labels.len(), self.width], self.inputs.clone())?,
        );
        tensors.insert(
            "labels".to_string(),
            NamedTensor::new(vec![self.labels.len()], self.labels.clone())?,
        );
        save_checkpoint(path, &tensors, None)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut tensors = load_checkpoint(path)?;
        let missing = |name: &str| {
            DdpError::Checkpoint(format!("{} has no {name} tensor", path.display()))
        };
        let inputs = tensors.remove("inputs").ok_or_else(|| missing("inputs"))?;
        let labels = tensors.remove("labels").ok_or_else(|| missing("labels"))?;
        let [_, width] = inputs.shape[..] else {
            return Err(DdpError::ShapeMismatch {
                expected: vec![labels.data.len(), 0],
                got: inputs.shape,
            });
        };
        Self::new(width, inputs.data, labels.data)
    }
}

impl Dataset<FeatureRow> for FeatureSet {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> FeatureRow {
        FeatureRow {
            features: self.inputs[index * self.width..(index + 1) * self.width].to_vec(),
            label: self.labels[index],
        }
    }
}

/// `<data_dir>/cached_<split>_<model>_<width>_<task>`.
pub fn cached_features_file(
    data_dir: &Path,
    split: Split,
    model: &str,
    width: usize,
    task: &str,
) -> PathBuf {
    data_dir.join(format!("cached_{split}_{model}_{width}_{task}"))
}
