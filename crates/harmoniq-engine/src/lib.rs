//! Harmoniq Engine
//! ===============
//! The fan-out/fan-in real-time audio scheduler and work-stealing parallel
//! sine bank: a headless scheduling core intended to be driven by a
//! platform audio callback and observed from a UI thread.

pub mod busy;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fade;
pub mod host;
pub mod measurement;
pub mod partial;
pub mod sem;
pub mod sine_bank;
pub mod spsc;

pub use config::{classify, optimal_preset, standard_preset, AudioConfig, BusyConfig, EngineConfig, PresetLabel};
pub use driver::{Driver, DriverStatus, IoBuffers, NullDriver, RenderCallback};
pub use engine::Engine;
pub use error::EngineError;
pub use fade::{FadeCommand, VolumeFader};
pub use host::{AudioHost, Stats, Status};
pub use measurement::{DriveMeasurement, MAX_NUM_THREADS};
pub use partial::Partial;
pub use sine_bank::ParallelSineBank;
pub use spsc::FixedSpscQueue;

#[cfg(feature = "native")]
pub use driver::CpalDriver;
