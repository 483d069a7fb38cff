/// One-pole smoothing filter suitable for real-time parameter transitions.
#[derive(Clone, Copy, Debug)]
pub struct OnePole {
    coeff: f32,
    state: f32,
}

impl OnePole {
    #[inline]
    pub fn new(sample_rate: f32, time_ms: f32) -> Self {
        let mut s = Self {
            coeff: 0.0,
            state: 0.0,
        };
        s.set_time_ms(sample_rate, time_ms);
        s
    }

    #[inline]
    pub fn set_time_ms(&mut self, sample_rate: f32, time_ms: f32) {
        let rate = sample_rate.max(1.0);
        let time = time_ms.max(0.01) * 0.001;
        let tau = time * rate;
        let coeff = if tau <= 1.0 {
            1.0
        } else {
            1.0 - (-1.0 / tau).exp()
        };
        self.coeff = coeff.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn reset(&mut self, value: f32) {
        self.state = value;
    }

    #[inline]
    pub fn next(&mut self, target: f32) -> f32 {
        self.state += self.coeff * (target - self.state);
        self.state
    }

    #[inline]
    pub fn state(&self) -> f32 {
        self.state
    }

    /// One-pole coefficient from a smoothing time constant `tau` (seconds)
    /// and sample rate: `1 - exp(-1 / max(tau * fs, 1e-6))`.
    #[inline]
    pub fn coeff_from_tau(sample_rate: f32, tau_seconds: f32) -> f32 {
        let denom = (tau_seconds * sample_rate).max(1e-6);
        1.0 - (-1.0 / denom).exp()
    }
}

/// A linear ramp from `current` toward `target` over a fixed number of ticks.
///
/// Invariant: once `ticks_to_completion` reaches zero, `current == target`
/// exactly (no residual error from repeated float addition).
#[derive(Clone, Copy, Debug)]
pub struct RampedValue<T> {
    current: T,
    target: T,
    increment: T,
    ticks_to_completion: u32,
}

macro_rules! impl_ramped_value {
    ($t:ty, $zero:expr) => {
        impl RampedValue<$t> {
            pub fn new(initial: $t) -> Self {
                Self {
                    current: initial,
                    target: initial,
                    increment: $zero,
                    ticks_to_completion: 0,
                }
            }

            pub fn current(&self) -> $t {
                self.current
            }

            pub fn target(&self) -> $t {
                self.target
            }

            pub fn is_ramping(&self) -> bool {
                self.ticks_to_completion > 0
            }

            /// Begins a linear ramp toward `target` completing after `ticks`
            /// calls to [`tick`](Self::tick). `ticks == 0` snaps immediately.
            pub fn ramp_to(&mut self, target: $t, ticks: u32) {
                self.target = target;
                if ticks == 0 {
                    self.current = target;
                    self.increment = $zero;
                    self.ticks_to_completion = 0;
                } else {
                    self.increment = (target - self.current) / ticks as $t;
                    self.ticks_to_completion = ticks;
                }
            }

            /// Forces the value to `v` immediately, cancelling any ramp.
            pub fn set_value(&mut self, v: $t) {
                self.current = v;
                self.target = v;
                self.increment = $zero;
                self.ticks_to_completion = 0;
            }

            /// Advances the ramp by one sample, returning the new current value.
            pub fn tick(&mut self) -> $t {
                if self.ticks_to_completion == 0 {
                    return self.current;
                }
                self.ticks_to_completion -= 1;
                if self.ticks_to_completion == 0 {
                    self.current = self.target;
                } else {
                    self.current += self.increment;
                }
                self.current
            }
        }
    };
}

impl_ramped_value!(f32, 0.0f32);
impl_ramped_value!(f64, 0.0f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_reaches_target_exactly() {
        let mut ramp = RampedValue::<f32>::new(1.0);
        ramp.ramp_to(0.0, 10);
        for _ in 0..10 {
            ramp.tick();
        }
        assert_eq!(ramp.current(), 0.0);
        assert_eq!(ramp.target(), 0.0);
        assert!(!ramp.is_ramping());
    }

    #[test]
    fn set_value_cancels_ramp() {
        let mut ramp = RampedValue::<f32>::new(1.0);
        ramp.ramp_to(0.0, 100);
        ramp.set_value(0.5);
        assert_eq!(ramp.current(), 0.5);
        assert_eq!(ramp.target(), 0.5);
        assert!(!ramp.is_ramping());
    }

    #[test]
    fn coeff_from_tau_is_bounded() {
        let coeff = OnePole::coeff_from_tau(48_000.0, 0.01);
        assert!(coeff > 0.0 && coeff < 1.0);
    }
}
