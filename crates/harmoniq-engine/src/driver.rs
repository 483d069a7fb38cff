//! The audio driver boundary: the external collaborator that owns the
//! platform I/O unit and fires the render callback.

use std::time::Duration;

use crate::error::EngineError;

/// Driver lifecycle status, observable from a non-real-time thread.
/// `Invalid` is terminal: once reached, `start()` is a no-op and the
/// render callback never fires again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Uninitialized,
    Running,
    Stopped,
    Invalid,
}

/// Borrowed input/output channel buffers for one render callback.
pub struct IoBuffers<'a> {
    pub input_left: &'a [f32],
    pub input_right: &'a [f32],
    pub output_left: &'a mut [f32],
    pub output_right: &'a mut [f32],
}

impl IoBuffers<'_> {
    pub fn num_frames(&self) -> usize {
        self.output_left.len().min(self.output_right.len())
    }
}

/// The render callback signature. Must never allocate, block on a lock
/// other than a try-lock, or log at real-time priority.
pub type RenderCallback = Box<dyn FnMut(&mut IoBuffers<'_>) + Send>;

/// Abstracts the platform audio I/O unit away from the scheduling core, the
/// same way the reference implementation treats its I/O unit as an external
/// collaborator whose construction and lifecycle are outside the scheduler's
/// control.
pub trait Driver: Send {
    fn sample_rate(&self) -> f64;
    fn nominal_buffer_duration(&self) -> Duration;
    fn status(&self) -> DriverStatus;
    fn start(&mut self, callback: RenderCallback) -> Result<(), EngineError>;
    fn stop(&mut self);
    fn set_preferred_buffer_size(&mut self, frames: u32) -> Result<(), EngineError>;
    fn set_is_input_enabled(&mut self, enabled: bool);

    /// Lets tests drive a concrete driver (e.g. [`NullDriver::pump`]) after
    /// it has been handed to `AudioHost` as a trait object.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// A no-IO double used in tests and headless embeddings: it never fires the
/// render callback on its own, but exposes a `pump()` for tests to drive it
/// deterministically.
pub struct NullDriver {
    sample_rate: f64,
    buffer_frames: u32,
    status: DriverStatus,
    is_input_enabled: bool,
    callback: Option<RenderCallback>,
    last_output: Option<(Vec<f32>, Vec<f32>)>,
}

impl NullDriver {
    pub fn new(sample_rate: f64, buffer_frames: u32) -> Self {
        Self {
            sample_rate,
            buffer_frames,
            status: DriverStatus::Uninitialized,
            is_input_enabled: false,
            callback: None,
            last_output: None,
        }
    }

    /// Forces the driver into the terminal `Invalid` state, simulating a
    /// device-level failure (category refused, IO unit construction
    /// failed). Subsequent `start()` calls become no-ops.
    pub fn force_invalid(&mut self) {
        self.status = DriverStatus::Invalid;
    }

    /// Synchronously fires the render callback once, as if the platform had
    /// delivered one buffer. No-op when not running.
    pub fn pump(&mut self) {
        if self.status != DriverStatus::Running {
            return;
        }
        let frames = self.buffer_frames as usize;
        let input_left = vec![0.0; frames];
        let input_right = vec![0.0; frames];
        let mut output_left = vec![0.0; frames];
        let mut output_right = vec![0.0; frames];
        if let Some(callback) = self.callback.as_mut() {
            let mut io = IoBuffers {
                input_left: &input_left,
                input_right: &input_right,
                output_left: &mut output_left,
                output_right: &mut output_right,
            };
            callback(&mut io);
        }
        self.last_output = Some((output_left, output_right));
    }

    /// Peak absolute sample of the last buffer rendered by `pump`, for
    /// tests that need to observe the output without a real audio sink.
    pub fn last_output_peak(&self) -> f32 {
        match &self.last_output {
            Some((left, right)) => left
                .iter()
                .chain(right.iter())
                .fold(0.0f32, |peak, &s| peak.max(s.abs())),
            None => 0.0,
        }
    }
}

impl Driver for NullDriver {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn nominal_buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_frames as f64 / self.sample_rate)
    }

    fn status(&self) -> DriverStatus {
        self.status
    }

    fn start(&mut self, callback: RenderCallback) -> Result<(), EngineError> {
        if self.status == DriverStatus::Invalid {
            return Ok(());
        }
        self.callback = Some(callback);
        self.status = DriverStatus::Running;
        Ok(())
    }

    fn stop(&mut self) {
        if self.status == DriverStatus::Invalid {
            return;
        }
        self.callback = None;
        self.status = DriverStatus::Stopped;
    }

    fn set_preferred_buffer_size(&mut self, frames: u32) -> Result<(), EngineError> {
        if frames == 0 || !frames.is_power_of_two() {
            return Err(EngineError::InvalidConfig(format!(
                "buffer size {frames} must be a nonzero power of two"
            )));
        }
        self.buffer_frames = frames;
        Ok(())
    }

    fn set_is_input_enabled(&mut self, enabled: bool) {
        self.is_input_enabled = enabled;
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(feature = "native")]
pub use cpal_driver::CpalDriver;

#[cfg(feature = "native")]
mod cpal_driver {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// A `cpal`-backed driver for desktop targets. Holds the stream behind
    /// `try_lock` at the render-callback boundary so a concurrent
    /// `stop()`/`start()` from the control thread can never block the audio
    /// thread; a contended try-lock simply skips the buffer, a one-buffer
    /// glitch being preferable to a priority inversion.
    pub struct CpalDriver {
        host: cpal::Host,
        sample_rate: f64,
        buffer_frames: u32,
        status: DriverStatus,
        is_input_enabled: bool,
        stream: Option<cpal::Stream>,
        callback: Arc<Mutex<Option<RenderCallback>>>,
    }

    impl CpalDriver {
        pub fn new(sample_rate: f64, buffer_frames: u32) -> Self {
            Self {
                host: cpal::default_host(),
                sample_rate,
                buffer_frames,
                status: DriverStatus::Uninitialized,
                is_input_enabled: false,
                stream: None,
                callback: Arc::new(Mutex::new(None)),
            }
        }
    }

    impl Driver for CpalDriver {
        fn sample_rate(&self) -> f64 {
            self.sample_rate
        }

        fn nominal_buffer_duration(&self) -> Duration {
            Duration::from_secs_f64(self.buffer_frames as f64 / self.sample_rate)
        }

        fn status(&self) -> DriverStatus {
            self.status
        }

        fn start(&mut self, callback: RenderCallback) -> Result<(), EngineError> {
            if self.status == DriverStatus::Invalid {
                return Ok(());
            }

            let device = self
                .host
                .default_output_device()
                .ok_or_else(|| EngineError::Device("no default output device".into()))?;
            let config = cpal::StreamConfig {
                channels: 2,
                sample_rate: cpal::SampleRate(self.sample_rate as u32),
                buffer_size: cpal::BufferSize::Fixed(self.buffer_frames),
            };

            *self.callback.lock() = Some(callback);
            let callback_handle = Arc::clone(&self.callback);

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let Some(mut guard) = callback_handle.try_lock() else {
                            data.fill(0.0);
                            return;
                        };
                        let Some(cb) = guard.as_mut() else {
                            data.fill(0.0);
                            return;
                        };
                        let frames = data.len() / 2;
                        let input_left = vec![0.0; frames];
                        let input_right = vec![0.0; frames];
                        let mut output_left = vec![0.0; frames];
                        let mut output_right = vec![0.0; frames];
                        let mut io = IoBuffers {
                            input_left: &input_left,
                            input_right: &input_right,
                            output_left: &mut output_left,
                            output_right: &mut output_right,
                        };
                        cb(&mut io);
                        for i in 0..frames {
                            data[i * 2] = output_left[i];
                            data[i * 2 + 1] = output_right[i];
                        }
                    },
                    move |err| {
                        tracing::error!(?err, "cpal output stream error");
                    },
                    None,
                )
                .map_err(|err| EngineError::Device(err.to_string()))?;

            stream
                .play()
                .map_err(|err| EngineError::Device(err.to_string()))?;

            self.stream = Some(stream);
            self.status = DriverStatus::Running;
            Ok(())
        }

        fn stop(&mut self) {
            if self.status == DriverStatus::Invalid {
                return;
            }
            if let Some(stream) = self.stream.take() {
                let _ = stream.pause();
            }
            *self.callback.lock() = None;
            self.status = DriverStatus::Stopped;
        }

        fn set_preferred_buffer_size(&mut self, frames: u32) -> Result<(), EngineError> {
            if frames == 0 || !frames.is_power_of_two() {
                return Err(EngineError::InvalidConfig(format!(
                    "buffer size {frames} must be a nonzero power of two"
                )));
            }
            self.buffer_frames = frames;
            Ok(())
        }

        fn set_is_input_enabled(&mut self, enabled: bool) {
            self.is_input_enabled = enabled;
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized_and_transitions_to_running() {
        let mut driver = NullDriver::new(48_000.0, 128);
        assert_eq!(driver.status(), DriverStatus::Uninitialized);
        driver.start(Box::new(|_| {})).unwrap();
        assert_eq!(driver.status(), DriverStatus::Running);
    }

    #[test]
    fn invalid_driver_ignores_start() {
        let mut driver = NullDriver::new(48_000.0, 128);
        driver.force_invalid();
        driver.start(Box::new(|_| {})).unwrap();
        assert_eq!(driver.status(), DriverStatus::Invalid);
    }

    #[test]
    fn non_power_of_two_buffer_size_is_rejected() {
        let mut driver = NullDriver::new(48_000.0, 128);
        assert!(driver.set_preferred_buffer_size(100).is_err());
        assert!(driver.set_preferred_buffer_size(256).is_ok());
    }

    #[test]
    fn pump_invokes_the_callback_with_requested_frame_count() {
        let mut driver = NullDriver::new(48_000.0, 64);
        driver
            .start(Box::new(|io| {
                assert_eq!(io.num_frames(), 64);
            }))
            .unwrap();
        driver.pump();
    }
}
