//! Student-side projections aligning feature widths with the teacher

use crate::autograd::Tensor;
use crate::network::{linear, xavier_uniform, FeatureMap};
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: usize,
    in_dim: usize,
    out_dim: usize,
}

/// Linear regressors mapping student hint features to the teacher's width
///
/// One slot per hint pair. A slot is only populated when the student and
/// teacher widths differ; otherwise the student feature is compared as is.
/// All adapter weights live in one parameter list so a single optimizer can
/// train them alongside the student.
pub struct HintAdapters {
    slots: Vec<Option<Slot>>,
    params: Vec<Tensor>,
}

impl HintAdapters {
    /// Build adapters for `(student_width, teacher_width)` pairs
    pub fn new(pairs: &[(usize, usize)], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut params = Vec::new();
        let slots = pairs
            .iter()
            .map(|&(in_dim, out_dim)| {
                if in_dim == out_dim {
                    return None;
                }
                let offset = params.len();
                params.push(Tensor::from_vec(
                    xavier_uniform(&mut rng, in_dim, out_dim),
                    true,
                ));
                params.push(Tensor::zeros(out_dim, true));
                Some(Slot {
                    offset,
                    in_dim,
                    out_dim,
                })
            })
            .collect();

        Self { slots, params }
    }

    /// Number of hint pairs covered
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether pair `index` goes through a projection
    pub fn is_projected(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Align the student feature of pair `index` with the teacher width
    pub fn forward(&self, index: usize, student: &FeatureMap) -> Result<FeatureMap> {
        let slot = self.slots.get(index).ok_or_else(|| {
            Error::InvalidParameter(format!("no hint adapter for pair {index}"))
        })?;

        match slot {
            None => Ok(student.clone()),
            Some(slot) => {
                if student.cols != slot.in_dim {
                    return Err(Error::ShapeMismatch {
                        expected: vec![student.rows, slot.in_dim],
                        got: vec![student.rows, student.cols],
                    });
                }
                let projected = linear(
                    &student.data,
                    &self.params[slot.offset],
                    &self.params[slot.offset + 1],
                    student.rows,
                    slot.in_dim,
                    slot.out_dim,
                );
                Ok(FeatureMap::new(projected, student.rows, slot.out_dim))
            }
        }
    }

    pub fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    /// Parameters paired with checkpoint names
    pub fn named_parameters(&self) -> Vec<(String, Tensor)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|s| (i, s)))
            .flat_map(|(i, slot)| {
                [
                    (format!("hint_adapter.{i}.weight"), self.params[slot.offset].clone()),
                    (format!("hint_adapter.{i}.bias"), self.params[slot.offset + 1].clone()),
                ]
            })
            .collect()
    }

    /// Overwrite projection weights from `(name, values)` pairs
    ///
    /// Every projected pair must be present with matching sizes.
    pub fn load_named(&mut self, named: &[(String, Tensor)]) -> Result<()> {
        let targets: Vec<(String, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|s| (i, s)))
            .flat_map(|(i, slot)| {
                [
                    (format!("hint_adapter.{i}.weight"), slot.offset),
                    (format!("hint_adapter.{i}.bias"), slot.offset + 1),
                ]
            })
            .collect();

        for (name, index) in targets {
            let (_, source) = named
                .iter()
                .find(|(n, _)| *n == name)
                .ok_or_else(|| Error::Checkpoint(format!("missing parameter '{name}'")))?;
            let param = &mut self.params[index];
            if source.len() != param.len() {
                return Err(Error::ShapeMismatch {
                    expected: vec![param.len()],
                    got: vec![source.len()],
                });
            }
            param.data_mut().assign(source.data());
        }
        Ok(())
    }
}
