use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{Array, Dimension};

use crate::{MlError, MlResult};

/// Dense `f32` tensor in row-major order.
///
/// The element count always matches the product of `shape`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> MlResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(MlError::InferenceError(format!(
                "tensor of shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }

        Ok(Tensor { shape, data })
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn from_array<D: Dimension>(array: Array<f32, D>) -> Self {
        let shape = array.shape().to_vec();
        // iter() walks in logical order regardless of the memory layout
        let data = array.iter().copied().collect();

        Tensor { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serializes the elements as little-endian `f32` without a header.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() * 4);
        for value in &self.data {
            // writing into a Vec cannot fail
            let _ = bytes.write_f32::<LittleEndian>(*value);
        }
        bytes
    }

    /// Reads little-endian `f32` elements written by [`Tensor::to_le_bytes`].
    pub fn from_le_bytes(shape: Vec<usize>, bytes: &[u8]) -> MlResult<Self> {
        if bytes.len() % 4 != 0 {
            return Err(MlError::InferenceError(format!(
                "raw tensor length {} is not a multiple of 4 bytes",
                bytes.len()
            )));
        }

        let data = bytes
            .chunks(4)
            .map(|c| Cursor::new(c).read_f32::<LittleEndian>())
            .collect::<std::io::Result<Vec<f32>>>()
            .map_err(|e| MlError::InferenceError(e.to_string()))?;

        Tensor::new(shape, data)
    }
}
