//! Calibration snapshot for one scintillator plane.
//!
//! A [`Calibration`] is loaded once per run (or calibration epoch) and
//! shared read-only between pipeline stages through an `Arc`. It is never
//! edited while events are processed; recalibration builds a new snapshot
//! and swaps it in between runs.
#![allow(clippy::doc_markdown)]

use crate::error::{Error, Result};
use crate::paddle::Side;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// Per-PMT constants for one side of the plane.
///
/// Entries are `None` when the calibration has no value for that paddle.
/// A missing gain or offset disables corrections for that PMT only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SideCalibration {
    /// TDC offsets (time units).
    pub tdc_offset: Vec<Option<f64>>,
    /// ADC pedestals (ADC counts per sample).
    pub pedestal: Vec<Option<f64>>,
    /// ADC gains (ADC counts per amplitude unit).
    pub gain: Vec<Option<f64>>,
}

impl SideCalibration {
    /// Uniform constants for `n_paddles` PMTs.
    #[must_use]
    pub fn uniform(n_paddles: usize, tdc_offset: f64, pedestal: f64, gain: f64) -> Self {
        Self {
            tdc_offset: vec![Some(tdc_offset); n_paddles],
            pedestal: vec![Some(pedestal); n_paddles],
            gain: vec![Some(gain); n_paddles],
        }
    }

    fn validate(&self, side: Side, n_paddles: usize) -> Result<()> {
        check_len(&format!("{side}.tdc_offset"), self.tdc_offset.len(), n_paddles)?;
        check_len(&format!("{side}.pedestal"), self.pedestal.len(), n_paddles)?;
        check_len(&format!("{side}.gain"), self.gain.len(), n_paddles)?;
        Ok(())
    }
}

/// FADC readout window and pulse-finding parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadcWindow {
    /// Samples at the start of the window averaged into the pedestal (NPED).
    pub n_pedestal: usize,
    /// Samples kept after the threshold crossing (NSA).
    pub samples_after: usize,
    /// Samples kept before the threshold crossing (NSB).
    pub samples_before: usize,
    /// Total samples in the readout window (WIN).
    pub window: usize,
    /// Search for a threshold crossing; otherwise the whole window is used.
    pub threshold_mode: bool,
    /// Crossing threshold above pedestal (ADC counts).
    pub threshold: f64,
    /// Time per FADC sample (time units).
    pub sample_period: f64,
    /// Samples at or above this value are overflows.
    pub overflow_level: u16,
    /// Samples at or below this value are underflows.
    pub underflow_level: u16,
    /// Maximum spread of the pedestal samples for a good pedestal.
    pub pedestal_tolerance: f64,
}

impl Default for FadcWindow {
    /// FADC250 defaults: 12-bit samples at 4 ns.
    fn default() -> Self {
        Self {
            n_pedestal: 4,
            samples_after: 10,
            samples_before: 3,
            window: 50,
            threshold_mode: true,
            threshold: 20.0,
            sample_period: 4.0,
            overflow_level: 4095,
            underflow_level: 0,
            pedestal_tolerance: 10.0,
        }
    }
}

impl FadcWindow {
    fn validate(&self) -> Result<()> {
        if self.n_pedestal == 0 {
            return Err(invalid("fadc.n_pedestal", "must be at least 1"));
        }
        if self.window == 0 {
            return Err(invalid("fadc.window", "must be at least 1"));
        }
        if self.n_pedestal >= self.window {
            return Err(invalid(
                "fadc.n_pedestal",
                "pedestal samples must leave room in the window",
            ));
        }
        check_positive("fadc.sample_period", self.sample_period)?;
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(invalid("fadc.threshold", "must be a non-negative number"));
        }
        if self.underflow_level >= self.overflow_level {
            return Err(invalid(
                "fadc.underflow_level",
                "must be below fadc.overflow_level",
            ));
        }
        Ok(())
    }
}

/// Path-length correction coefficients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathLengthCoefficients {
    /// Coefficient for the track position.
    pub x: f64,
    /// Coefficient for the dispersive angle.
    pub theta: f64,
    /// Coefficient for the transverse angle.
    pub phi: f64,
}

/// How the two corrected side amplitudes combine into the paddle amplitude.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmplitudeCombination {
    /// `sqrt(left * right)`, independent of the hit position along the bar.
    #[default]
    GeometricMean,
    /// `(left + right) / 2`.
    ArithmeticMean,
    /// `left + right`.
    Sum,
}

/// Timewalk coefficient and reference amplitude for one PMT.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimewalkParameters {
    /// Coefficient of the `1/sqrt(A/MIP)` term.
    pub coefficient: f64,
    /// Amplitude at which the correction vanishes.
    pub reference: f64,
}

/// Immutable calibration snapshot for a plane of `n_paddles` paddles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Number of paddles in the plane.
    pub n_paddles: usize,
    /// Left PMT constants.
    pub left: SideCalibration,
    /// Right PMT constants.
    pub right: SideCalibration,
    /// Trigger-induced time offset per paddle.
    pub trigger_offset: Vec<f64>,
    /// TDC channel to time conversion (time units per channel).
    pub tdc_to_time: f64,
    /// Signal propagation speed in the scintillator (length per time unit).
    pub speed_in_material: f64,
    /// Attenuation coefficient of the material (inverse length).
    pub attenuation: f64,
    /// Nominal corrected amplitude of a minimum-ionizing particle.
    pub adc_mip: f64,
    /// Average time resolution of a single PMT.
    pub resolution: f64,
    /// Timewalk parameter vector.
    ///
    /// Empty disables the correction; one entry is a plane-wide coefficient;
    /// `2N` entries are per-PMT coefficients at `2 * paddle + side`; `2N + 1`
    /// entries add a reference amplitude as the last element. Without a
    /// reference the correction vanishes at `adc_mip`.
    pub timewalk: Vec<f64>,
    /// Path-length correction coefficients.
    pub path_length: PathLengthCoefficients,
    /// FADC window parameters.
    pub fadc: FadcWindow,
    /// Paddle amplitude combination.
    pub amplitude_combination: AmplitudeCombination,
}

impl Calibration {
    /// Neutral calibration: zero offsets and pedestals, unit gains and
    /// unit scale factors, timewalk disabled.
    #[must_use]
    pub fn neutral(n_paddles: usize) -> Self {
        Self {
            n_paddles,
            left: SideCalibration::uniform(n_paddles, 0.0, 0.0, 1.0),
            right: SideCalibration::uniform(n_paddles, 0.0, 0.0, 1.0),
            trigger_offset: vec![0.0; n_paddles],
            tdc_to_time: 1.0,
            speed_in_material: 1.0,
            attenuation: 1.0,
            adc_mip: 1.0,
            resolution: 1.0,
            timewalk: Vec::new(),
            path_length: PathLengthCoefficients::default(),
            fadc: FadcWindow::default(),
            amplitude_combination: AmplitudeCombination::default(),
        }
    }

    /// Set the TDC conversion factor.
    #[must_use]
    pub fn with_tdc_to_time(mut self, tdc_to_time: f64) -> Self {
        self.tdc_to_time = tdc_to_time;
        self
    }

    /// Set the propagation speed.
    #[must_use]
    pub fn with_speed_in_material(mut self, speed: f64) -> Self {
        self.speed_in_material = speed;
        self
    }

    /// Set the attenuation coefficient.
    #[must_use]
    pub fn with_attenuation(mut self, attenuation: f64) -> Self {
        self.attenuation = attenuation;
        self
    }

    /// Set the per-PMT time resolution.
    #[must_use]
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the MIP amplitude.
    #[must_use]
    pub fn with_adc_mip(mut self, adc_mip: f64) -> Self {
        self.adc_mip = adc_mip;
        self
    }

    /// Set the timewalk parameter vector.
    #[must_use]
    pub fn with_timewalk(mut self, timewalk: Vec<f64>) -> Self {
        self.timewalk = timewalk;
        self
    }

    /// Set the path-length coefficients.
    #[must_use]
    pub fn with_path_length(mut self, path_length: PathLengthCoefficients) -> Self {
        self.path_length = path_length;
        self
    }

    /// Set the FADC window.
    #[must_use]
    pub fn with_fadc(mut self, fadc: FadcWindow) -> Self {
        self.fadc = fadc;
        self
    }

    /// Constants for one side.
    #[inline]
    #[must_use]
    pub fn side(&self, side: Side) -> &SideCalibration {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Timewalk parameters for one PMT, or `None` if the correction is
    /// disabled.
    #[must_use]
    pub fn timewalk_parameters(&self, paddle: usize, side: Side) -> Option<TimewalkParameters> {
        let n = self.n_paddles;
        let (coefficient, reference) = match self.timewalk.len() {
            0 => return None,
            1 => (self.timewalk[0], self.adc_mip),
            len if len == 2 * n => (self.timewalk[2 * paddle + side.index()], self.adc_mip),
            len if len == 2 * n + 1 => (
                self.timewalk[2 * paddle + side.index()],
                self.timewalk[2 * n],
            ),
            _ => return None,
        };
        Some(TimewalkParameters {
            coefficient,
            reference,
        })
    }

    /// Check lengths and scale factors.
    ///
    /// # Errors
    /// Returns a configuration error describing the first bad parameter.
    pub fn validate(&self) -> Result<()> {
        let n = self.n_paddles;
        if n == 0 {
            return Err(Error::InvalidPaddleCount(n));
        }
        self.left.validate(Side::Left, n)?;
        self.right.validate(Side::Right, n)?;
        check_len("trigger_offset", self.trigger_offset.len(), n)?;

        check_positive("tdc_to_time", self.tdc_to_time)?;
        check_positive("speed_in_material", self.speed_in_material)?;
        check_positive("attenuation", self.attenuation)?;
        check_positive("adc_mip", self.adc_mip)?;
        check_positive("resolution", self.resolution)?;

        let tw = self.timewalk.len();
        if !(tw == 0 || tw == 1 || tw == 2 * n || tw == 2 * n + 1) {
            return Err(invalid(
                "timewalk",
                &format!("expected 0, 1, {} or {} entries, got {tw}", 2 * n, 2 * n + 1),
            ));
        }
        if tw == 2 * n + 1 {
            check_positive("timewalk reference", self.timewalk[2 * n])?;
        }

        self.fadc.validate()
    }

    /// Load a single calibration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, a mandatory key is
    /// missing, or validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let json: JsonCalibration = serde_json::from_reader(BufReader::new(file))?;
        json.into_calibration()
    }

    /// Load a single calibration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if a mandatory key is missing or validation fails.
    pub fn from_json(json: &str) -> Result<Self> {
        let json: JsonCalibration = serde_json::from_str(json)?;
        json.into_calibration()
    }
}

/// A calibration valid for an inclusive range of runs.
#[derive(Clone, Debug)]
pub struct CalibrationEpoch {
    /// First run covered.
    pub first_run: u32,
    /// Last run covered, open-ended when `None`.
    pub last_run: Option<u32>,
    /// Snapshot shared by every detector instance processing these runs.
    pub calibration: Arc<Calibration>,
}

impl CalibrationEpoch {
    /// True if `run` falls inside this epoch.
    #[must_use]
    pub fn covers(&self, run: u32) -> bool {
        run >= self.first_run && self.last_run.map_or(true, |last| run <= last)
    }
}

/// Calibration epochs keyed by run validity interval.
#[derive(Clone, Debug, Default)]
pub struct CalibrationDatabase {
    epochs: Vec<CalibrationEpoch>,
}

impl CalibrationDatabase {
    /// Database with a single epoch valid for every run.
    #[must_use]
    pub fn single(calibration: Calibration) -> Self {
        Self {
            epochs: vec![CalibrationEpoch {
                first_run: 0,
                last_run: None,
                calibration: Arc::new(calibration),
            }],
        }
    }

    /// Loaded epochs, in file order.
    #[must_use]
    pub fn epochs(&self) -> &[CalibrationEpoch] {
        &self.epochs
    }

    /// Calibration for `run`. When several epochs cover the run, the one
    /// starting latest wins.
    ///
    /// # Errors
    /// Returns [`Error::NoEpochForRun`] if no epoch covers the run.
    pub fn for_run(&self, run: u32) -> Result<Arc<Calibration>> {
        self.epochs
            .iter()
            .filter(|epoch| epoch.covers(run))
            .max_by_key(|epoch| epoch.first_run)
            .map(|epoch| Arc::clone(&epoch.calibration))
            .ok_or(Error::NoEpochForRun(run))
    }

    /// Load from a JSON file holding either one calibration or an
    /// `"epochs"` list.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or any epoch is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;
        let db = Self::from_value(value)?;
        tracing::info!(
            path = %path.as_ref().display(),
            epochs = db.epochs.len(),
            "loaded calibration database"
        );
        Ok(db)
    }

    /// Load from a JSON string holding either one calibration or an
    /// `"epochs"` list.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or any epoch is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    fn from_value(value: serde_json::Value) -> Result<Self> {
        if value.get("epochs").is_none() {
            let json: JsonCalibration = serde_json::from_value(value)?;
            return Ok(Self::single(json.into_calibration()?));
        }

        let json: JsonDatabase = serde_json::from_value(value)?;
        let mut epochs = Vec::with_capacity(json.epochs.len());
        for epoch in json.epochs {
            if epoch.last_run.is_some_and(|last| last < epoch.first_run) {
                return Err(invalid(
                    "epochs.last_run",
                    &format!("epoch starting at run {} ends before it starts", epoch.first_run),
                ));
            }
            epochs.push(CalibrationEpoch {
                first_run: epoch.first_run,
                last_run: epoch.last_run,
                calibration: Arc::new(epoch.calibration.into_calibration()?),
            });
        }
        Ok(Self { epochs })
    }
}

// Intermediate structs for the on-disk schema. Mandatory keys are
// `Option` so a missing key reports its name instead of a serde message.
#[derive(Deserialize)]
struct JsonDatabase {
    epochs: Vec<JsonEpoch>,
}

#[derive(Deserialize)]
struct JsonEpoch {
    first_run: u32,
    #[serde(default)]
    last_run: Option<u32>,
    calibration: JsonCalibration,
}

#[derive(Deserialize, Default)]
struct JsonSide {
    tdc_offset: Option<Vec<Option<f64>>>,
    pedestal: Option<Vec<Option<f64>>>,
    gain: Option<Vec<Option<f64>>>,
}

impl JsonSide {
    fn into_side(self, side: Side) -> Result<SideCalibration> {
        Ok(SideCalibration {
            tdc_offset: self
                .tdc_offset
                .ok_or_else(|| missing(&format!("{side}.tdc_offset")))?,
            pedestal: self
                .pedestal
                .ok_or_else(|| missing(&format!("{side}.pedestal")))?,
            gain: self.gain.ok_or_else(|| missing(&format!("{side}.gain")))?,
        })
    }
}

#[derive(Deserialize)]
struct JsonCalibration {
    n_paddles: Option<usize>,
    left: Option<JsonSide>,
    right: Option<JsonSide>,
    tdc_to_time: Option<f64>,
    speed_in_material: Option<f64>,
    attenuation: Option<f64>,
    adc_mip: Option<f64>,
    resolution: Option<f64>,
    #[serde(default)]
    trigger_offset: Option<Vec<f64>>,
    #[serde(default)]
    timewalk: Vec<f64>,
    #[serde(default)]
    path_length: PathLengthCoefficients,
    #[serde(default)]
    fadc: FadcWindow,
    #[serde(default)]
    amplitude_combination: AmplitudeCombination,
}

impl JsonCalibration {
    fn into_calibration(self) -> Result<Calibration> {
        let n_paddles = self.n_paddles.ok_or_else(|| missing("n_paddles"))?;
        let calibration = Calibration {
            n_paddles,
            left: self
                .left
                .ok_or_else(|| missing("left"))?
                .into_side(Side::Left)?,
            right: self
                .right
                .ok_or_else(|| missing("right"))?
                .into_side(Side::Right)?,
            trigger_offset: self
                .trigger_offset
                .unwrap_or_else(|| vec![0.0; n_paddles]),
            tdc_to_time: self.tdc_to_time.ok_or_else(|| missing("tdc_to_time"))?,
            speed_in_material: self
                .speed_in_material
                .ok_or_else(|| missing("speed_in_material"))?,
            attenuation: self.attenuation.ok_or_else(|| missing("attenuation"))?,
            adc_mip: self.adc_mip.ok_or_else(|| missing("adc_mip"))?,
            resolution: self.resolution.ok_or_else(|| missing("resolution"))?,
            timewalk: self.timewalk,
            path_length: self.path_length,
            fadc: self.fadc,
            amplitude_combination: self.amplitude_combination,
        };

        // Validate once at load time, never per event.
        calibration.validate()?;
        Ok(calibration)
    }
}

fn missing(name: &str) -> Error {
    Error::MissingParameter(name.to_string())
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn check_len(name: &str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::LengthMismatch {
            name: name.to_string(),
            expected,
            actual,
        })
    }
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, &format!("must be a positive number, got {value}")))
    }
}
