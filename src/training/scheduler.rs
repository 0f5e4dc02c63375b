// Learning-rate schedules
//
// The schedule is queried once per batch; the trainer pushes the returned
// rate into the optimizer.

use crate::config::{CyclicMode, SchedulerConfig};

pub trait LrScheduler: Send {
    /// Advance one iteration and return the new learning rate
    fn step(&mut self) -> f64;
    /// Rate for the current iteration
    fn learning_rate(&self) -> f64;
    /// First-moment coefficient (Adam beta1) for the current iteration, if cycled
    fn momentum(&self) -> Option<f64> {
        None
    }
}

/// Cyclical learning rate oscillating between `base_lr` and `max_lr`
#[derive(Debug, Clone)]
pub struct CyclicLr {
    base_lr: f64,
    max_lr: f64,
    total_size: f64,
    step_ratio: f64,
    mode: CyclicMode,
    gamma: f64,
    /// (base, max) beta1 when momentum is cycled
    momentum_bounds: Option<(f64, f64)>,
    iteration: u64,
    current_lr: f64,
    current_momentum: Option<f64>,
}

impl CyclicLr {
    pub fn new(config: &SchedulerConfig) -> Self {
        let up = config.step_size_up.max(1) as f64;
        let down = config.step_size_down.unwrap_or(config.step_size_up).max(1) as f64;
        let mut scheduler = Self {
            base_lr: config.base_lr,
            max_lr: config.max_lr,
            total_size: up + down,
            step_ratio: up / (up + down),
            mode: config.mode,
            gamma: config.gamma,
            momentum_bounds: config
                .cycle_momentum
                .then_some((config.base_momentum, config.max_momentum)),
            iteration: 0,
            current_lr: config.base_lr,
            current_momentum: None,
        };
        scheduler.update(0);
        scheduler
    }

    /// Iterations taken so far
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    fn update(&mut self, iteration: u64) {
        let height = self.scaled_height(iteration);
        self.current_lr = self.base_lr + (self.max_lr - self.base_lr) * height;
        // beta1 falls while the rate rises
        self.current_momentum = self
            .momentum_bounds
            .map(|(base, max)| max - (max - base) * height);
    }

    /// Position within the cycle in [0, 1], scaled by the mode's amplitude
    fn scaled_height(&self, iteration: u64) -> f64 {
        let it = iteration as f64;
        let cycle = (1.0 + it / self.total_size).floor();
        let x = 1.0 + it / self.total_size - cycle;
        let scale = if x <= self.step_ratio {
            x / self.step_ratio
        } else {
            (x - 1.0) / (self.step_ratio - 1.0)
        };
        let amplitude = match self.mode {
            CyclicMode::Triangular => 1.0,
            CyclicMode::Triangular2 => 1.0 / 2f64.powf(cycle - 1.0),
            CyclicMode::ExpRange => self.gamma.powf(it),
        };
        scale * amplitude
    }
}

impl LrScheduler for CyclicLr {
    fn step(&mut self) -> f64 {
        self.iteration += 1;
        self.update(self.iteration);
        self.current_lr
    }

    fn learning_rate(&self) -> f64 {
        self.current_lr
    }

    fn momentum(&self) -> Option<f64> {
        self.current_momentum
    }
}
