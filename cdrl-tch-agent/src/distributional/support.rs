use anyhow::Result;
use cdrl_core::error::CoreError;
use log::trace;
use tch::{Device, Kind, Tensor};

/// Fixed atoms of a categorical return distribution, evenly spaced on `[v_min, v_max]`.
#[derive(Debug)]
pub struct Support {
    v_min: f64,
    v_max: f64,
    atoms: i64,
    delta_z: f64,
    z: Tensor,
}

impl Support {
    /// Creates the support on `device`.
    ///
    /// Fails when `atoms < 2` or `v_min >= v_max`.
    pub fn new(v_min: f64, v_max: f64, atoms: i64, device: Device) -> Result<Self> {
        if atoms < 2 || v_min >= v_max {
            return Err(CoreError::InvalidSupport {
                atoms,
                v_min,
                v_max,
            }
            .into());
        }
        let z = Tensor::linspace(v_min, v_max, atoms, (Kind::Float, device));
        Ok(Self {
            v_min,
            v_max,
            atoms,
            delta_z: (v_max - v_min) / (atoms - 1) as f64,
            z,
        })
    }

    /// Atom values, `[atoms]`.
    pub fn values(&self) -> &Tensor {
        &self.z
    }

    /// Number of atoms.
    pub fn atoms(&self) -> i64 {
        self.atoms
    }

    /// Spacing between neighboring atoms.
    pub fn delta_z(&self) -> f64 {
        self.delta_z
    }

    /// Lower end of the support.
    pub fn v_min(&self) -> f64 {
        self.v_min
    }

    /// Upper end of the support.
    pub fn v_max(&self) -> f64 {
        self.v_max
    }

    /// Expected value over the last axis, `[.., atoms] -> [..]`.
    pub fn expectation(&self, dist: &Tensor) -> Tensor {
        (dist * &self.z).sum_dim_intlist(Some([-1].as_slice()), false, Kind::Float)
    }

    /// Lower and upper bin indices of fractional positions `b` on the support.
    ///
    /// When `b` is integral both bounds would coincide; they are moved apart so that
    /// the projected mass is never dropped.
    pub fn bounds(&self, b: &Tensor) -> (Tensor, Tensor) {
        let l = b.floor().to_kind(Kind::Int64);
        let u = b.ceil().to_kind(Kind::Int64);

        let shift_l = u.gt(0i64).logical_and(&l.eq_tensor(&u));
        let l = &l - shift_l.to_kind(Kind::Int64);
        let shift_u = l.lt(self.atoms - 1).logical_and(&l.eq_tensor(&u));
        let u = &u + shift_u.to_kind(Kind::Int64);

        (l, u)
    }

    /// Projects the n-step target distribution onto the support.
    ///
    /// * `returns` - n-step returns, `[batch]`.
    /// * `nonterminals` - 0 if the episode ended within n steps, `[batch]`.
    /// * `discount_n` - discount factor raised to the n-th power.
    /// * `next_dist` - target distribution at the selected next actions, `[batch, atoms]`.
    ///
    /// Returns `m` of shape `[batch, atoms]` whose rows sum to the rows of `next_dist`.
    pub fn project(
        &self,
        returns: &Tensor,
        nonterminals: &Tensor,
        discount_n: f64,
        next_dist: &Tensor,
    ) -> Result<Tensor> {
        let size = next_dist.size();
        if size.len() != 2 || size[1] != self.atoms {
            return Err(CoreError::ShapeMismatch(format!(
                "next distribution must be [batch, {}], got {:?}",
                self.atoms, size
            ))
            .into());
        }
        let batch_size = size[0];
        if returns.numel() as i64 != batch_size || nonterminals.numel() as i64 != batch_size {
            return Err(CoreError::ShapeMismatch(format!(
                "{} returns and {} nonterminals for a batch of {}",
                returns.numel(),
                nonterminals.numel(),
                batch_size
            ))
            .into());
        }

        let returns = returns.to_kind(Kind::Float).view([-1, 1]);
        let nonterminals = nonterminals.to_kind(Kind::Float).view([-1, 1]);
        let tz = (returns + nonterminals * discount_n * self.z.unsqueeze(0))
            .clamp(self.v_min, self.v_max);
        let b = (tz - self.v_min) / self.delta_z;
        let (l, u) = self.bounds(&b);

        if batch_size > 0 {
            let min = l.min().int64_value(&[]);
            let max = u.max().int64_value(&[]);
            if min < 0 || max > self.atoms - 1 {
                return Err(CoreError::ProjectionOutOfBounds {
                    min,
                    max,
                    atoms: self.atoms,
                }
                .into());
            }
        }

        let device = next_dist.device();
        let offset = Tensor::arange_start_step(
            0,
            batch_size * self.atoms,
            self.atoms,
            (Kind::Int64, device),
        )
        .unsqueeze(1)
        .expand([batch_size, self.atoms], false);

        let mass_l = next_dist * (u.to_kind(Kind::Float) - &b);
        let mass_u = next_dist * (&b - l.to_kind(Kind::Float));
        let m = Tensor::zeros([batch_size * self.atoms], (Kind::Float, device))
            .index_add(0, &(&l + &offset).view([-1]), &mass_l.view([-1]))
            .index_add(0, &(&u + &offset).view([-1]), &mass_u.view([-1]))
            .view([batch_size, self.atoms]);
        trace!("Projected target distribution of {} rows", batch_size);

        Ok(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    fn row_sums(m: &Tensor) -> Vec<f32> {
        Vec::<f32>::try_from(&m.sum_dim_intlist(Some([-1].as_slice()), false, Kind::Float))
            .unwrap()
    }

    #[test]
    fn rejects_invalid_support() {
        assert!(Support::new(-1.0, 1.0, 1, Device::Cpu).is_err());
        assert!(Support::new(1.0, 1.0, 51, Device::Cpu).is_err());
        let support = Support::new(-10.0, 10.0, 51, Device::Cpu).unwrap();
        assert!((support.delta_z() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn projection_conserves_mass() {
        tch::manual_seed(42);
        let support = Support::new(-10.0, 10.0, 51, Device::Cpu).unwrap();
        let batch_size = 64;
        let next_dist = Tensor::randn([batch_size, 51], (Kind::Float, Device::Cpu))
            .softmax(-1, Kind::Float);
        let returns = Tensor::randn([batch_size], (Kind::Float, Device::Cpu)) * 8.0;
        let nonterminals = Tensor::rand([batch_size], (Kind::Float, Device::Cpu))
            .gt(0.3)
            .to_kind(Kind::Float);

        let m = support
            .project(&returns, &nonterminals, 0.99f64.powi(3), &next_dist)
            .unwrap();
        assert_eq!(m.size(), vec![batch_size, 51]);
        assert!(row_sums(&m).iter().all(|s| (s - 1.0).abs() < 1e-5));
        assert!(m.min().double_value(&[]) >= 0.0);
    }

    #[test]
    fn out_of_range_targets_land_on_boundary_atoms() {
        let support = Support::new(-1.0, 1.0, 5, Device::Cpu).unwrap();
        let next_dist = Tensor::full([2, 5], 0.2, (Kind::Float, Device::Cpu));
        let returns = Tensor::from_slice(&[50f32, -50.0]);
        let nonterminals = Tensor::from_slice(&[1f32, 1.0]);

        let m = support.project(&returns, &nonterminals, 0.9, &next_dist).unwrap();
        let m = Vec::<f32>::try_from(&m.view([-1])).unwrap();
        assert!((m[4] - 1.0).abs() < 1e-6);
        assert!(m[..4].iter().all(|&v| v.abs() < 1e-6));
        assert!((m[5] - 1.0).abs() < 1e-6);
        assert!(m[6..].iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn integral_positions_get_distinct_bins() {
        let support = Support::new(-1.0, 1.0, 3, Device::Cpu).unwrap();
        let b = Tensor::from_slice(&[0f32, 1.0, 2.0, 0.5]);
        let (l, u) = support.bounds(&b);
        assert_eq!(Vec::<i64>::try_from(&l).unwrap(), vec![0, 0, 1, 0]);
        assert_eq!(Vec::<i64>::try_from(&u).unwrap(), vec![1, 1, 2, 1]);
    }

    #[test]
    fn three_atom_scenario() {
        let support = Support::new(-1.0, 1.0, 3, Device::Cpu).unwrap();
        let next_dist = Tensor::from_slice(&[0f32, 1.0, 0.0]).view([1, 3]);
        let returns = Tensor::from_slice(&[0f32]);
        let nonterminals = Tensor::from_slice(&[1f32]);

        let m = support.project(&returns, &nonterminals, 0.9, &next_dist).unwrap();
        let m = Vec::<f32>::try_from(&m.view([-1])).unwrap();
        assert!((m.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((m[1] - 1.0).abs() < 1e-6);

        // Spread mass over all atoms to exercise the fractional bins too.
        let next_dist = Tensor::from_slice(&[0.25f32, 0.5, 0.25]).view([1, 3]);
        let m = support.project(&returns, &nonterminals, 0.9, &next_dist).unwrap();
        let m = Vec::<f32>::try_from(&m.view([-1])).unwrap();
        // b = [0.1, 1, 1.9]
        let expected = [0.25 * 0.9, 0.25 * 0.1 + 0.5 + 0.25 * 0.1, 0.25 * 0.9];
        for (got, want) in m.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-5, "{:?}", m);
        }
    }

    #[test]
    fn terminal_transitions_collapse_onto_return() {
        let support = Support::new(-2.0, 2.0, 5, Device::Cpu).unwrap();
        let next_dist = Tensor::full([1, 5], 0.2, (Kind::Float, Device::Cpu));
        let m = support
            .project(
                &Tensor::from_slice(&[0.5f32]),
                &Tensor::from_slice(&[0f32]),
                0.9,
                &next_dist,
            )
            .unwrap();
        let m = Vec::<f32>::try_from(&m.view([-1])).unwrap();
        assert!((m[2] - 0.5).abs() < 1e-5);
        assert!((m[3] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let support = Support::new(-1.0, 1.0, 3, Device::Cpu).unwrap();
        let next_dist = Tensor::full([2, 4], 0.25, (Kind::Float, Device::Cpu));
        let r = Tensor::from_slice(&[0f32, 0.0]);
        assert!(support.project(&r, &r, 0.9, &next_dist).is_err());
    }
}
