//! Configuration system for the note splitter

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub detection: DetectionConfig,
    pub pitch: PitchConfig,
    pub export: ExportConfig,
    pub trim: TrimConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            detection: DetectionConfig::default(),
            pitch: PitchConfig::default(),
            export: ExportConfig::default(),
            trim: TrimConfig::default(),
        }
    }
}

/// How the onset refiner picks the start of a note behind its trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnsetRule {
    /// Nearest quiet, locally flat sample behind the trigger
    Flat,
    /// Nth positive-slope zero crossing behind the trigger
    ZeroCrossing,
}

/// Note boundary detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Absolute trigger level in dBFS
    pub trigger_db: f32,
    /// Margin above the measured noise floor that counts as "note ended"
    pub noise_delta_db: f32,
    /// Noise level used until the first successful measurement
    pub default_noise_db: f32,
    pub measure_noise: bool,
    /// Onset threshold = noise level (linear) x this factor
    pub noise_multiplier: f32,
    /// How far behind the trigger the onset search may go
    pub onset_window_s: f32,
    pub onset_rule: OnsetRule,
    pub lead_zero_crossings: usize,
    pub lead_time_s: f32,
    /// Audio kept after the acoustic end for the decay tail
    pub dwell_time_s: f32,
    pub min_duration_s: f32,
    pub max_duration_s: f32,
    /// RMS checks per second while looking for the end of a note
    pub calcs_per_sec: u32,
    pub rms_window_s: f32,
    /// The end threshold is never allowed below this level
    pub end_threshold_floor_db: f32,
    pub noise_lookback_s: f32,
    pub noise_probe_s: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            trigger_db: -36.0,
            noise_delta_db: 2.0,
            default_noise_db: -60.0,
            measure_noise: true,
            noise_multiplier: 8.0,
            onset_window_s: 0.1,
            onset_rule: OnsetRule::Flat,
            lead_zero_crossings: 2,
            lead_time_s: 0.0,
            dwell_time_s: 0.1,
            min_duration_s: 1.0,
            max_duration_s: 10.5,
            calcs_per_sec: 5,
            rms_window_s: 0.04,
            end_threshold_floor_db: -60.0,
            noise_lookback_s: 1.0,
            noise_probe_s: 0.5,
        }
    }
}

impl DetectionConfig {
    /// Samples between two RMS checks in the end-of-note scan
    pub fn calc_interval(&self, sr: u32) -> usize {
        (sr / self.calcs_per_sec.max(1)).max(1) as usize
    }

    /// Length of the sliding RMS window in samples
    pub fn rms_window(&self, sr: u32) -> usize {
        seconds_to_samples(self.rms_window_s, sr).max(1)
    }
}

/// Autocorrelation pitch estimator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub enabled: bool,
    /// Lowest detectable fundamental; bounds the largest lag searched
    pub min_freq_hz: f32,
    pub max_freq_hz: f32,
    /// First lag evaluated, in samples
    pub initial_lag: usize,
    /// Lag steps per octave in the coarse search
    pub autocorrelation_step: f32,
    /// Lag distance (samples) an extremum must hold before it latches
    pub latch_count: usize,
    /// Attack transient skipped before the analysis buffer starts
    pub attack_skip_s: f32,
    pub analysis_window_s: f32,
    /// The period minimum must fall below max / this divisor
    pub max_ratio_divisor: f32,
    /// Refine the coarse lag with an integer scan and parabolic interpolation
    pub refine_period: bool,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_freq_hz: 27.0,
            max_freq_hz: 4410.0,
            initial_lag: 4,
            autocorrelation_step: 12.0,
            latch_count: 3,
            attack_skip_s: 0.25,
            analysis_window_s: 4.0,
            max_ratio_divisor: 3.0,
            refine_period: true,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Run detection and logging only; write nothing
    pub dry_run: bool,
    pub write_log: bool,
    pub write_report: bool,
    pub write_midi: bool,
    pub maybe_suffix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            write_log: true,
            write_report: true,
            write_midi: true,
            maybe_suffix: "_maybe".to_string(),
        }
    }
}

/// Single-note lead trimming configuration. Levels are relative to the file peak.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    pub trigger_db: f32,
    pub noise_db: f32,
    pub fade_in_s: f32,
    /// Peak scan stops after this long without a new peak
    pub peak_hold_s: f32,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            trigger_db: -30.0,
            noise_db: -40.0,
            fade_in_s: 0.001,
            peak_hold_s: 1.0,
        }
    }
}

/// Convert a duration in seconds to whole samples (never negative)
pub fn seconds_to_samples(seconds: f32, sr: u32) -> usize {
    (seconds.max(0.0) as f64 * sr as f64).round() as usize
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let d = &config.detection;
    let p = &config.pitch;

    if d.calcs_per_sec == 0 {
        anyhow::bail!("detection.calcs_per_sec must be > 0");
    }
    if d.rms_window_s <= 0.0 {
        anyhow::bail!("detection.rms_window_s must be > 0");
    }
    if d.min_duration_s < 0.0 || d.max_duration_s <= 0.0 {
        anyhow::bail!("detection durations must be non-negative (max > 0)");
    }
    if d.min_duration_s > d.max_duration_s {
        anyhow::bail!(
            "detection.min_duration_s ({}) must not exceed max_duration_s ({})",
            d.min_duration_s,
            d.max_duration_s
        );
    }
    if d.noise_multiplier <= 0.0 {
        anyhow::bail!("detection.noise_multiplier must be > 0");
    }
    if d.onset_window_s <= 0.0 {
        anyhow::bail!("detection.onset_window_s must be > 0");
    }
    if d.onset_rule == OnsetRule::ZeroCrossing && d.lead_zero_crossings == 0 {
        anyhow::bail!("detection.lead_zero_crossings must be >= 1 for the zero_crossing rule");
    }
    if d.trigger_db >= 0.0 {
        anyhow::bail!("detection.trigger_db must be below 0 dBFS");
    }

    if p.min_freq_hz <= 0.0 || p.max_freq_hz <= p.min_freq_hz {
        anyhow::bail!("pitch frequency range must satisfy 0 < min_freq_hz < max_freq_hz");
    }
    if p.autocorrelation_step <= 0.0 {
        anyhow::bail!("pitch.autocorrelation_step must be > 0");
    }
    if p.initial_lag == 0 {
        anyhow::bail!("pitch.initial_lag must be >= 1");
    }
    if p.latch_count == 0 {
        anyhow::bail!("pitch.latch_count must be >= 1");
    }
    if p.max_ratio_divisor <= 0.0 {
        anyhow::bail!("pitch.max_ratio_divisor must be > 0");
    }
    if p.analysis_window_s <= 0.0 {
        anyhow::bail!("pitch.analysis_window_s must be > 0");
    }

    if config.trim.fade_in_s < 0.0 || config.trim.peak_hold_s <= 0.0 {
        anyhow::bail!("trim.fade_in_s must be >= 0 and trim.peak_hold_s > 0");
    }

    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
