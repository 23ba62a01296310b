use crate::control::ControlVector;
use crate::numerics::solver::SolverError;

/// Per-block set of control DOFs pinned at a bound.
///
/// The inactive set is always the exact complement, so only the active
/// indices (plus a lookup mask) are stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveSet {
    indices: Vec<Vec<usize>>,
    masks: Vec<Vec<bool>>,
}

impl ActiveSet {
    /// Build from explicit index lists. Indices are sorted and deduplicated.
    pub fn new(dims: &[usize], mut indices: Vec<Vec<usize>>) -> Result<Self, SolverError> {
        if indices.len() != dims.len() {
            return Err(SolverError::InvalidActiveSet(format!(
                "expected {} blocks, got {}",
                dims.len(),
                indices.len()
            )));
        }

        let mut masks = Vec::with_capacity(dims.len());
        for (block, (idx, &n)) in indices.iter_mut().zip(dims).enumerate() {
            idx.sort_unstable();
            idx.dedup();
            if let Some(&last) = idx.last() {
                if last >= n {
                    return Err(SolverError::InvalidActiveSet(format!(
                        "index {last} out of range for block {block} of size {n}"
                    )));
                }
            }
            let mut mask = vec![false; n];
            for &i in idx.iter() {
                mask[i] = true;
            }
            masks.push(mask);
        }

        Ok(Self { indices, masks })
    }

    /// Nothing active.
    pub fn empty(dims: &[usize]) -> Self {
        Self {
            indices: vec![Vec::new(); dims.len()],
            masks: dims.iter().map(|&n| vec![false; n]).collect(),
        }
    }

    pub fn from_masks(masks: Vec<Vec<bool>>) -> Self {
        let indices = masks
            .iter()
            .map(|m| {
                m.iter()
                    .enumerate()
                    .filter_map(|(i, &a)| a.then_some(i))
                    .collect()
            })
            .collect();
        Self { indices, masks }
    }

    pub fn dims(&self) -> Vec<usize> {
        self.masks.iter().map(|m| m.len()).collect()
    }

    pub fn num_blocks(&self) -> usize {
        self.masks.len()
    }

    pub fn active_indices(&self, block: usize) -> &[usize] {
        &self.indices[block]
    }

    pub fn inactive_indices(&self, block: usize) -> Vec<usize> {
        self.masks[block]
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| (!a).then_some(i))
            .collect()
    }

    pub fn is_active(&self, block: usize, dof: usize) -> bool {
        self.masks[block][dof]
    }

    pub fn num_active(&self) -> usize {
        self.indices.iter().map(Vec::len).sum()
    }

    /// `out = v` on active DOFs, zero elsewhere.
    pub fn restrict_to_active_set(&self, v: &ControlVector, out: &mut ControlVector) {
        self.restrict(v, out, true);
    }

    /// `out = v` on inactive DOFs, zero elsewhere.
    pub fn restrict_to_inactive_set(&self, v: &ControlVector, out: &mut ControlVector) {
        self.restrict(v, out, false);
    }

    /// Zero the active DOFs of `v` in place.
    pub fn zero_active(&self, v: &mut ControlVector) {
        for (block, idx) in self.indices.iter().enumerate() {
            let dst = v.block_mut(block);
            for &i in idx {
                dst[i] = 0.0;
            }
        }
    }

    fn restrict(&self, v: &ControlVector, out: &mut ControlVector, keep_active: bool) {
        debug_assert!(v.has_layout(&self.dims()));
        for (block, mask) in self.masks.iter().enumerate() {
            let src = v.block(block);
            let dst = out.block_mut(block);
            for (i, &active) in mask.iter().enumerate() {
                dst[i] = if active == keep_active { src[i] } else { 0.0 };
            }
        }
    }
}
