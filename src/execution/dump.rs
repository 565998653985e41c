//! Request tensor dumps for offline debugging.
//!
//! When a dump directory is configured, every tensor of a request is
//! written as raw bytes next to a JSON sidecar describing it. Dumping is
//! best-effort: failures are logged and never fail the request.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::binding::{InputTensor, OutputTensor};
use crate::model::{OperandType, TensorInfo};
use crate::runtime::NetworkId;

/// Summary statistics of a floating point tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TensorStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

#[derive(Debug, Serialize)]
struct DumpRecord<'a> {
    network_id: u32,
    request: u32,
    tensor: &'a str,
    dimensions: &'a [u32],
    data_type: OperandType,
    num_bytes: usize,
    stats: Option<TensorStats>,
}

/// Writes the tensors of one request into a dump directory.
#[derive(Debug, Clone)]
pub struct TensorDumper {
    dir: PathBuf,
    network_id: NetworkId,
    request: u32,
}

impl TensorDumper {
    pub fn new(dir: impl Into<PathBuf>, network_id: NetworkId, request: u32) -> Self {
        Self { dir: dir.into(), network_id, request }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dump_inputs(&self, tensors: &[InputTensor<'_>]) {
        for t in tensors {
            self.dump("input", t.index(), t.info(), t.as_bytes());
        }
    }

    pub fn dump_outputs(&self, tensors: &[OutputTensor<'_>]) {
        for t in tensors {
            self.dump("output", t.index(), t.info(), t.as_bytes());
        }
    }

    /// Base file name, without extension, for one tensor.
    pub fn file_stem(&self, prefix: &str, index: usize) -> String {
        format!("{}_{}.dump_{prefix}{index}", self.network_id, self.request)
    }

    fn dump(&self, prefix: &str, index: usize, info: &TensorInfo, bytes: &[u8]) {
        let stem = self.file_stem(prefix, index);
        if let Err(e) = self.write(&stem, info, bytes) {
            tracing::warn!(
                network_id = %self.network_id,
                tensor = %stem,
                error = %e,
                "failed to dump tensor"
            );
        }
    }

    fn write(&self, stem: &str, info: &TensorInfo, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.dir.join(format!("{stem}.bin")), bytes)?;

        let record = DumpRecord {
            network_id: self.network_id.0,
            request: self.request,
            tensor: stem,
            dimensions: &info.dimensions,
            data_type: info.data_type,
            num_bytes: bytes.len(),
            stats: tensor_stats(info.data_type, bytes),
        };
        let json = serde_json::to_vec_pretty(&record)?;
        std::fs::write(self.dir.join(format!("{stem}.json")), json)
    }
}

/// Decode a floating point tensor to f32 values.
pub fn decode_f32(data_type: OperandType, bytes: &[u8]) -> Option<Vec<f32>> {
    match data_type {
        OperandType::Float32 => Some(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        OperandType::Float16 => Some(
            bytes
                .chunks_exact(2)
                .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
        ),
        _ => None,
    }
}

/// Min/max/mean of a floating point tensor, `None` for other types.
pub fn tensor_stats(data_type: OperandType, bytes: &[u8]) -> Option<TensorStats> {
    let values = decode_f32(data_type, bytes)?;
    if values.is_empty() {
        return None;
    }
    let (min, max, sum) = values.iter().fold(
        (f32::INFINITY, f32::NEG_INFINITY, 0f64),
        |(min, max, sum), &v| (min.min(v), max.max(v), sum + f64::from(v)),
    );
    Some(TensorStats { min, max, mean: (sum / values.len() as f64) as f32 })
}
