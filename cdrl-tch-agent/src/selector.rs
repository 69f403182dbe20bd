//! Action selection over per-action values with an availability mask.
use anyhow::Result;
use cdrl_core::error::CoreError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use tch::{Kind, Tensor};

/// Margin below the row minimum given to masked actions by greedy selection.
pub const MASK_MARGIN: f64 = 10.0;

/// Policy used to pick actions from per-action values.
///
/// The same policy selects next actions for double-Q targets and answers
/// serving requests.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ActionSelection {
    /// Argmax over available actions.
    Greedy,

    /// Sampling from the softmax restricted to available actions.
    Boltzmann,

    /// Argmax over all actions, ignoring availability.
    NoLimit,
}

impl Default for ActionSelection {
    fn default() -> Self {
        Self::Greedy
    }
}

impl ActionSelection {
    /// Selects one action per row.
    ///
    /// `values` and `avail` are `[batch, n_actions]`; the result is `[batch]` of `i64`.
    /// Rows without any available action choose among all actions.
    pub fn select(&self, values: &Tensor, avail: &Tensor) -> Result<Tensor> {
        match self {
            Self::Greedy => Ok(greedy(values, avail)),
            Self::Boltzmann => boltzmann(values, &open_masked_rows(avail)),
            Self::NoLimit => Ok(values.argmax(-1, false)),
        }
    }

    /// Picks an action for a single state with probability `epsilon` of exploring.
    ///
    /// `values` is `[1, n_actions]` and `avail` is `[n_actions]`. Greedy selection
    /// explores among available actions and no_limit among all of them; Boltzmann
    /// selection samples regardless of `epsilon`.
    pub fn e_greedy(&self, values: &Tensor, avail: &Tensor, epsilon: f64) -> Result<i64> {
        let avail = avail.view([1, -1]);
        match self {
            Self::Boltzmann => Ok(boltzmann(values, &avail)?.int64_value(&[0])),
            Self::Greedy if fastrand::f64() < epsilon => random_available(&avail),
            Self::Greedy => Ok(greedy(values, &avail).int64_value(&[0])),
            Self::NoLimit if fastrand::f64() < epsilon => {
                Ok(fastrand::i64(0..values.size()[1]))
            }
            Self::NoLimit => Ok(values.argmax(-1, false).int64_value(&[0])),
        }
    }
}

/// Uniform choice among the actions flagged in a single availability row.
pub fn random_available(avail: &Tensor) -> Result<i64> {
    let avail = Vec::<f32>::try_from(&avail.view([-1]).to_kind(Kind::Float))?;
    let ixs = avail
        .iter()
        .enumerate()
        .filter(|(_, &a)| a != 0.0)
        .map(|(i, _)| i as i64)
        .collect::<Vec<_>>();
    if ixs.is_empty() {
        return Err(CoreError::NoAvailableAction(0).into());
    }
    Ok(ixs[fastrand::usize(..ixs.len())])
}

/// Marks every action available in rows where none is.
fn open_masked_rows(avail: &Tensor) -> Tensor {
    let avail = avail.to_kind(Kind::Float);
    let none = avail.eq(0.0).all_dim(-1, true);
    avail.ones_like().where_self(&none, &avail)
}

/// Argmax after pushing masked actions below the row minimum.
///
/// Rows whose actions are all masked are left untouched.
pub fn greedy(values: &Tensor, avail: &Tensor) -> Tensor {
    let avail = avail.to_kind(Kind::Float);
    let v = values * &avail;
    let masked = avail.eq(0.0);
    let any_avail = masked.logical_not().any_dim(-1, true);
    let fill = v.amin([-1].as_slice(), true) - MASK_MARGIN;
    let keep = masked.logical_and(&any_avail).logical_not();
    v.where_self(&keep, &fill.expand_as(&v)).argmax(-1, false)
}

/// Samples from the softmax of `values` restricted to available actions.
///
/// Rows where all available actions have zero probability fall back to a uniform
/// choice over the available actions.
pub fn boltzmann(values: &Tensor, avail: &Tensor) -> Result<Tensor> {
    let avail = avail.to_kind(Kind::Float);
    let n_avail = avail.sum_dim_intlist(Some([-1].as_slice()), true, Kind::Float);
    let counts = Vec::<f32>::try_from(&n_avail.view([-1]))?;
    if let Some(row) = counts.iter().position(|&c| c == 0.0) {
        return Err(CoreError::NoAvailableAction(row).into());
    }

    let probs = values.softmax(-1, Kind::Float) * &avail;
    let mass = probs.sum_dim_intlist(Some([-1].as_slice()), true, Kind::Float);
    let zero_mass = mass.eq(0.0);
    if zero_mass.any().int64_value(&[]) != 0 {
        warn!("Zero probabilities for all available actions, sampling uniformly");
    }
    let uniform = &avail / &n_avail;
    let probs = uniform.where_self(&zero_mass, &(probs / mass));

    Ok(probs.multinomial(1, true).squeeze_dim(-1))
}

/// One-hot encodes action indices, mapping `-1` to an all-zero row.
///
/// `indices` of any shape gives a float tensor with an extra trailing axis of
/// `num_classes`. Indices outside `[-1, num_classes)` are an error.
pub fn to_one_hot(indices: &Tensor, num_classes: i64) -> Result<Tensor> {
    let indices = indices.to_kind(Kind::Int64);
    if indices.numel() > 0 {
        for index in [indices.min().int64_value(&[]), indices.max().int64_value(&[])] {
            if index < -1 || index >= num_classes {
                return Err(CoreError::OneHotIndex { index, num_classes }.into());
            }
        }
    }

    // -1 is moved to an extra class which is then dropped.
    let extra = indices.eq(-1i64).to_kind(Kind::Int64) * (num_classes + 1);
    let one_hot = (indices + extra)
        .one_hot(num_classes + 1)
        .narrow(-1, 0, num_classes);

    Ok(one_hot.to_kind(Kind::Float))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_vec(t: &Tensor) -> Vec<i64> {
        Vec::<i64>::try_from(t).unwrap()
    }

    #[test]
    fn greedy_skips_masked_actions() {
        let values = Tensor::from_slice(&[1f32, 5.0, 3.0, -2.0, -1.0, -4.0]).view([2, 3]);
        let avail = Tensor::from_slice(&[1f32, 0.0, 1.0, 0.0, 0.0, 1.0]).view([2, 3]);
        let a = ActionSelection::Greedy.select(&values, &avail).unwrap();
        assert_eq!(to_vec(&a), vec![2, 2]);
    }

    #[test]
    fn no_limit_ignores_mask() {
        let values = Tensor::from_slice(&[1f32, 5.0, 3.0]).view([1, 3]);
        let avail = Tensor::from_slice(&[1f32, 0.0, 1.0]).view([1, 3]);
        let a = ActionSelection::NoLimit.select(&values, &avail).unwrap();
        assert_eq!(to_vec(&a), vec![1]);
    }

    #[test]
    fn boltzmann_samples_available_actions_only() {
        tch::manual_seed(0);
        let values = Tensor::zeros([256, 4], (Kind::Float, tch::Device::Cpu));
        let avail = Tensor::from_slice(&[0f32, 1.0, 0.0, 1.0])
            .view([1, 4])
            .repeat([256, 1]);
        let a = ActionSelection::Boltzmann.select(&values, &avail).unwrap();
        assert!(to_vec(&a).iter().all(|&a| a == 1 || a == 3));
    }

    #[test]
    fn boltzmann_falls_back_to_uniform() {
        tch::manual_seed(1);
        // Softmax underflows to zero on the available actions.
        let values = Tensor::from_slice(&[0f32, -1e4, 0.0, -1e4])
            .view([1, 4])
            .repeat([4000, 1]);
        let avail = Tensor::from_slice(&[0f32, 1.0, 0.0, 1.0])
            .view([1, 4])
            .repeat([4000, 1]);
        let a = to_vec(&boltzmann(&values, &avail).unwrap());
        assert!(a.iter().all(|&a| a == 1 || a == 3));
        let ones = a.iter().filter(|&&a| a == 1).count() as f64 / a.len() as f64;
        assert!((ones - 0.5).abs() < 0.05);
    }

    #[test]
    fn boltzmann_without_any_available_action_fails() {
        let values = Tensor::zeros([2, 3], (Kind::Float, tch::Device::Cpu));
        let avail = Tensor::from_slice(&[1f32, 0.0, 0.0, 0.0, 0.0, 0.0]).view([2, 3]);
        assert!(boltzmann(&values, &avail).is_err());
    }

    #[test]
    fn batched_boltzmann_opens_fully_masked_rows() {
        tch::manual_seed(2);
        // Row 0 has no available action, row 1 allows action 1 only.
        let values = Tensor::from_slice(&[0f32, 0.0, 0.0, 0.0, 0.0, 0.0])
            .view([1, 6])
            .repeat([200, 1])
            .view([400, 3]);
        let avail = Tensor::from_slice(&[0f32, 0.0, 0.0, 0.0, 1.0, 0.0])
            .view([1, 6])
            .repeat([200, 1])
            .view([400, 3]);
        assert!(boltzmann(&values, &avail).is_err());

        let a = to_vec(&ActionSelection::Boltzmann.select(&values, &avail).unwrap());
        let (open, single): (Vec<_>, Vec<_>) = a.chunks(2).map(|r| (r[0], r[1])).unzip();
        assert!(single.iter().all(|&a| a == 1));
        assert!((0..3).all(|k| open.contains(&k)));
    }

    #[test]
    fn one_hot_encodes_sentinel_as_zero_row() {
        let indices = Tensor::from_slice(&[-1i64, 0, 2]);
        let one_hot = to_one_hot(&indices, 3).unwrap();
        assert_eq!(one_hot.size(), vec![3, 3]);
        let v = Vec::<f32>::try_from(&one_hot.view([-1])).unwrap();
        assert_eq!(v, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn one_hot_rejects_out_of_range() {
        assert!(to_one_hot(&Tensor::from_slice(&[3i64]), 3).is_err());
        assert!(to_one_hot(&Tensor::from_slice(&[-2i64]), 3).is_err());
    }

    #[test]
    fn e_greedy_explores_available_actions() {
        let values = Tensor::from_slice(&[9f32, 1.0, 2.0]).view([1, 3]);
        let avail = Tensor::from_slice(&[0f32, 1.0, 1.0]);
        for _ in 0..50 {
            let a = ActionSelection::Greedy.e_greedy(&values, &avail, 1.0).unwrap();
            assert!(a == 1 || a == 2);
        }
        let a = ActionSelection::Greedy.e_greedy(&values, &avail, 0.0).unwrap();
        assert_eq!(a, 2);
        let a = ActionSelection::NoLimit.e_greedy(&values, &avail, 0.0).unwrap();
        assert_eq!(a, 0);
    }

    #[test]
    fn action_selection_from_yaml() {
        let s: ActionSelection = serde_yaml::from_str("no_limit").unwrap();
        assert_eq!(s, ActionSelection::NoLimit);
    }
}
