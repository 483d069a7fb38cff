//! Harmoniq DSP
//! =============
//! Small numeric primitives shared by the scheduling core: equal-power pan
//! gains and one-pole/linear value smoothing. Kept deliberately free of
//! allocation so it can be called from the real-time audio path.

pub mod pan;
pub mod smoothing;

pub use smoothing::{OnePole, RampedValue};
