pub mod active_set;

use nalgebra::DVector;
use std::ops::{Index, IndexMut};

pub use active_set::ActiveSet;

/// A control-space vector: one dense block per control space.
///
/// Block count and block sizes are fixed at construction. All arithmetic
/// helpers assume both operands share the same layout.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlVector {
    blocks: Vec<DVector<f64>>,
}

impl ControlVector {
    pub fn zeros(dims: &[usize]) -> Self {
        Self {
            blocks: dims.iter().map(|&n| DVector::zeros(n)).collect(),
        }
    }

    pub fn from_blocks(blocks: Vec<DVector<f64>>) -> Self {
        Self { blocks }
    }

    /// Single-block vector from a slice, mostly for tests and small problems.
    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            blocks: vec![DVector::from_column_slice(values)],
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn dims(&self) -> Vec<usize> {
        self.blocks.iter().map(|b| b.len()).collect()
    }

    pub fn has_layout(&self, dims: &[usize]) -> bool {
        self.blocks.len() == dims.len() && self.blocks.iter().zip(dims).all(|(b, &n)| b.len() == n)
    }

    pub fn block(&self, i: usize) -> &DVector<f64> {
        &self.blocks[i]
    }

    pub fn block_mut(&mut self, i: usize) -> &mut DVector<f64> {
        &mut self.blocks[i]
    }

    pub fn set_zero(&mut self) {
        for b in &mut self.blocks {
            b.fill(0.0);
        }
    }

    pub fn copy_from(&mut self, other: &ControlVector) {
        debug_assert_eq!(self.dims(), other.dims());
        for (dst, src) in self.blocks.iter_mut().zip(&other.blocks) {
            dst.copy_from(src);
        }
    }

    /// `self += alpha * x`
    pub fn axpy(&mut self, alpha: f64, x: &ControlVector) {
        debug_assert_eq!(self.dims(), x.dims());
        for (dst, src) in self.blocks.iter_mut().zip(&x.blocks) {
            dst.axpy(alpha, src, 1.0);
        }
    }

    /// `self = x + beta * self`
    pub fn scale_add(&mut self, beta: f64, x: &ControlVector) {
        debug_assert_eq!(self.dims(), x.dims());
        for (dst, src) in self.blocks.iter_mut().zip(&x.blocks) {
            dst.axpy(1.0, src, beta);
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for b in &mut self.blocks {
            *b *= factor;
        }
    }

    /// Euclidean dot product over all blocks. Problem-specific inner products
    /// go through [`crate::physics::FormHandler::scalar_product`].
    pub fn dot(&self, other: &ControlVector) -> f64 {
        self.blocks
            .iter()
            .zip(&other.blocks)
            .map(|(a, b)| a.dot(b))
            .sum()
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Values of `block` at `indices`.
    pub fn gather(&self, block: usize, indices: &[usize]) -> DVector<f64> {
        let src = &self.blocks[block];
        DVector::from_iterator(indices.len(), indices.iter().map(|&i| src[i]))
    }
}

impl Index<usize> for ControlVector {
    type Output = DVector<f64>;

    fn index(&self, i: usize) -> &Self::Output {
        &self.blocks[i]
    }
}

impl IndexMut<usize> for ControlVector {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        &mut self.blocks[i]
    }
}
