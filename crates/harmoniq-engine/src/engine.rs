//! `Engine`: the embedding API consumed by an application shell.

use anyhow::{anyhow, Result};

use crate::busy::BusyThreads;
use crate::config::{classify, optimal_preset, standard_preset, AudioConfig, EngineConfig, PresetLabel};
use crate::driver::Driver;
use crate::host::{AudioHost, Stats, Status};
use crate::measurement::DriveMeasurement;
use crate::partial::Partial;

/// Top-level handle an application shell embeds. Wraps an [`AudioHost`] and
/// a [`BusyThreads`] pool under one configuration surface, matching the
/// embedding API's field/method list.
pub struct Engine {
    host: AudioHost,
    busy: BusyThreads,
    config: EngineConfig,
    max_num_sines: u32,
}

impl Engine {
    pub fn new(driver: Box<dyn Driver>, config: EngineConfig, partials: Vec<Partial>) -> Result<Self> {
        let max_num_sines = partials.len() as u32;
        let host = AudioHost::new(driver, config.audio, partials)
            .map_err(|err| anyhow!("failed to construct audio host: {err}"))?;
        let busy = BusyThreads::new(
            config.busy.num_busy_threads,
            std::time::Duration::from_secs_f64(config.busy.period_ms / 1000.0),
            config.busy.cpu_usage,
        );
        Ok(Self {
            host,
            busy,
            config,
            max_num_sines,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        self.host
            .start()
            .map_err(|err| anyhow!("failed to start audio host: {err}"))
    }

    pub fn stop(&mut self) {
        self.host.stop();
    }

    pub fn status(&self) -> Status {
        self.host.status()
    }

    pub fn sample_rate(&self) -> f64 {
        self.host.sample_rate()
    }

    pub fn preferred_buffer_size(&self) -> u32 {
        self.host.preferred_buffer_size()
    }

    pub fn set_preferred_buffer_size(&mut self, frames: u32) -> Result<()> {
        self.host
            .set_preferred_buffer_size(frames)
            .map_err(|err| anyhow!("failed to set buffer size: {err}"))
    }

    pub fn num_processing_threads(&self) -> u32 {
        self.config.audio.num_processing_threads
    }

    /// Changes the total processing-thread count. Affects thread setup, so
    /// per spec.md §4.3 this stops the host, applies the change, and
    /// restarts iff the host was previously started.
    pub fn set_num_processing_threads(&mut self, n: u32) -> Result<()> {
        let mut audio = self.config.audio;
        audio.num_processing_threads = n;
        self.restart_with_audio_config(audio)
    }

    pub fn num_worker_threads(&self) -> u32 {
        self.config.audio.num_processing_threads
            - if self.config.audio.process_in_driver_thread { 1 } else { 0 }
    }

    pub fn process_in_driver_thread(&self) -> bool {
        self.config.audio.process_in_driver_thread
    }

    pub fn set_process_in_driver_thread(&mut self, enabled: bool) {
        self.config.audio.process_in_driver_thread = enabled;
        self.host.set_process_in_driver_thread(enabled);
    }

    pub fn is_work_interval_on(&self) -> bool {
        self.config.audio.is_work_interval_on
    }

    /// Toggles workgroup membership. May require a restart (spec.md §6), so
    /// this applies the same stop/apply/restart dance as
    /// `set_num_processing_threads`.
    pub fn set_is_work_interval_on(&mut self, enabled: bool) -> Result<()> {
        let mut audio = self.config.audio;
        audio.is_work_interval_on = enabled;
        self.restart_with_audio_config(audio)
    }

    pub fn is_audio_input_enabled(&self) -> bool {
        self.host.is_audio_input_enabled()
    }

    pub fn set_is_audio_input_enabled(&mut self, enabled: bool) {
        self.host.set_is_audio_input_enabled(enabled);
    }

    pub fn minimum_load(&self) -> f64 {
        self.config.audio.minimum_load
    }

    pub fn set_minimum_load(&mut self, fraction: f64) {
        self.config.audio.minimum_load = fraction;
        self.host.set_minimum_load(fraction);
    }

    pub fn output_volume(&self) -> f32 {
        self.host.output_volume()
    }

    pub fn set_output_volume(&self, volume: f32, fade_seconds: f64) {
        self.host.set_output_volume(volume, fade_seconds);
    }

    pub fn num_busy_threads(&self) -> u32 {
        self.busy.count() as u32
    }

    pub fn set_num_busy_threads(&mut self, count: u32) {
        self.config.busy.num_busy_threads = count;
        self.busy.set_count(count);
    }

    pub fn busy_thread_period(&self) -> std::time::Duration {
        self.busy.period()
    }

    pub fn set_busy_thread_period(&mut self, period: std::time::Duration) {
        self.config.busy.period_ms = period.as_secs_f64() * 1000.0;
        self.busy.set_period(period);
    }

    pub fn busy_thread_cpu_usage(&self) -> f32 {
        self.busy.cpu_usage()
    }

    pub fn set_busy_thread_cpu_usage(&mut self, cpu_usage: f32) {
        self.config.busy.cpu_usage = cpu_usage;
        self.busy.set_cpu_usage(cpu_usage);
    }

    pub fn num_sines(&self) -> u32 {
        self.host.num_active_partials()
    }

    pub fn set_num_sines(&self, n: u32) {
        self.host.set_num_active_partials(n.min(self.max_num_sines));
    }

    pub fn max_num_sines(&self) -> u32 {
        self.max_num_sines
    }

    pub fn play_sine_burst(&self, duration_seconds: f64, additional_sines: u32) {
        self.host.play_sine_burst(duration_seconds, additional_sines);
    }

    pub fn fetch_measurements(&self, callback: impl FnMut(DriveMeasurement)) {
        self.host.fetch_measurements(callback);
    }

    /// Timing-health snapshot: overrun count plus last/max callback wall
    /// time, for a UI or benchmark harness to poll outside the audio path.
    pub fn stats(&self) -> Stats {
        self.host.stats()
    }

    pub fn apply_preset(&mut self, label: PresetLabel) -> Result<()> {
        let new_config = match label {
            PresetLabel::Standard => standard_preset(),
            PresetLabel::Optimal => optimal_preset(),
            PresetLabel::Custom => return Err(anyhow!("Custom is not an applicable preset")),
        };
        self.restart_with_audio_config(new_config.audio)?;
        self.config.busy = new_config.busy;
        self.busy.set_count(new_config.busy.num_busy_threads);
        self.busy
            .set_period(std::time::Duration::from_secs_f64(new_config.busy.period_ms / 1000.0));
        self.busy.set_cpu_usage(new_config.busy.cpu_usage);
        Ok(())
    }

    /// Stops the host (if running), applies a new thread-count/work-interval
    /// shape, and restarts iff the host was previously started — the
    /// stop/apply/restart helper spec.md §4.3 requires for any mutator that
    /// affects thread setup. Shared by `set_num_processing_threads`,
    /// `set_is_work_interval_on`, and `apply_preset`.
    fn restart_with_audio_config(&mut self, audio: AudioConfig) -> Result<()> {
        let was_started = self.status() == Status::Started;
        if was_started {
            self.stop();
        }
        self.host
            .reconfigure(audio)
            .map_err(|err| anyhow!("failed to reconfigure audio host: {err}"))?;
        self.config.audio = audio;
        if was_started {
            self.start()?;
        }
        Ok(())
    }

    pub fn current_preset_label(&self) -> PresetLabel {
        classify(&self.config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Exposes the underlying driver for tests that need to drive a
    /// [`crate::driver::NullDriver`] by hand.
    pub fn driver_mut(&mut self) -> &mut dyn Driver {
        self.host.driver_mut()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
