use log::debug;
use tch::{Kind, Tensor};

const FLOOR: f64 = -1.0;

/// Running estimate of the average reward per step for continuing tasks.
///
/// Updated as an exponential moving average of the distributional TD residual and
/// clamped from below at -1.
#[derive(Debug, Clone, PartialEq)]
pub struct AverageReward {
    value: f64,
    rate: f64,
}

impl AverageReward {
    /// Starts the estimate at zero.
    pub fn new(rate: f64) -> Self {
        Self { value: 0.0, rate }
    }

    /// The current estimate.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Resets the estimate to zero.
    pub fn reset(&mut self) {
        self.value = 0.0;
    }

    /// Moves the estimate by `rate * residual` and returns the new value.
    pub fn update(&mut self, residual: f64) -> f64 {
        self.value += self.rate * residual;
        if self.value < FLOOR {
            debug!("Average reward {} clamped to {}", self.value, FLOOR);
            self.value = FLOOR;
        }
        self.value
    }

    /// Updates with the batch mean of `returns + target_value - online_value`.
    pub fn update_with(
        &mut self,
        returns: &Tensor,
        target_value: &Tensor,
        online_value: &Tensor,
    ) -> f64 {
        let residual = (returns + target_value - online_value)
            .mean(Kind::Float)
            .double_value(&[]);
        self.update(residual)
    }
}
