//! Pop-out drop animation
//!
//! When content is dropped into the scene it eases from a compressed
//! perspective divide up to the natural one, reading as the element
//! popping out toward its resting depth.

use glam::{DMat4, DVec4};

use crate::scene::config::EngineConfig;

/// A running pop-out animation.
#[derive(Clone, Copy, Debug)]
pub struct PopOut {
    elapsed: u32,
    duration: u32,
    start: f64,
    end: f64,
}

impl PopOut {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            elapsed: 0,
            duration: config.popout_ticks.max(1),
            start: config.popout_start_divide,
            end: config.popout_end_divide,
        }
    }

    /// Advance one tick.
    pub fn advance(&mut self) {
        if self.elapsed < self.duration {
            self.elapsed += 1;
        }
    }

    /// Current perspective-divide factor, quadratic ease-out.
    pub fn value(&self) -> f64 {
        let t = self.elapsed as f64 / self.duration as f64;
        let eased = 1.0 - (1.0 - t) * (1.0 - t);
        self.start + (self.end - self.start) * eased
    }

    pub fn finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Apply the current divide factor to a final matrix.
    pub fn apply(&self, final_matrix: &DMat4) -> DMat4 {
        DMat4::from_diagonal(DVec4::new(1.0, 1.0, 1.0, self.value())) * *final_matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_compressed_ends_natural() {
        let config = EngineConfig::default();
        let mut popout = PopOut::new(&config);
        assert!((popout.value() - config.popout_start_divide).abs() < 1e-12);

        for _ in 0..config.popout_ticks {
            popout.advance();
        }
        assert!(popout.finished());
        assert!((popout.value() - config.popout_end_divide).abs() < 1e-12);
    }

    #[test]
    fn test_eases_out() {
        let config = EngineConfig::default();
        let mut popout = PopOut::new(&config);

        let mut deltas = Vec::new();
        let mut prev = popout.value();
        for _ in 0..config.popout_ticks {
            popout.advance();
            deltas.push(popout.value() - prev);
            prev = popout.value();
        }
        // Monotonic growth with shrinking steps
        for pair in deltas.windows(2) {
            assert!(pair[0] > 0.0);
            assert!(pair[1] < pair[0] + 1e-12);
        }
    }

    #[test]
    fn test_apply_scales_w_row() {
        let config = EngineConfig::default();
        let popout = PopOut::new(&config);
        let applied = popout.apply(&DMat4::IDENTITY);
        let v = applied * DVec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((v.w - config.popout_start_divide).abs() < 1e-12);
    }

    #[test]
    fn test_advance_past_end_is_stable() {
        let config = EngineConfig::default();
        let mut popout = PopOut::new(&config);
        for _ in 0..1000 {
            popout.advance();
        }
        assert!((popout.value() - config.popout_end_divide).abs() < 1e-12);
    }
}
