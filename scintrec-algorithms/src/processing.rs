//! Per-event reconstruction driver.
//!
//! [`Reconstructor`] owns one detector instance's buffers and runs
//! Decode, Correct, Match and Estimate once per event, enforcing the
//! phase order of [`PipelineState`]. Track-dependent corrections are a
//! separate, later phase that needs track data attached first.

use crate::correction::{CorrectionEngine, CorrectionSummary};
use crate::matching::{MatchSummary, PaddleMatcher};
use crate::position::PositionEstimator;
use rayon::prelude::*;
use scintrec_core::buffer::{ChannelBuffer, DecodeAnomaly};
use scintrec_core::calibration::Calibration;
use scintrec_core::error::{Error, Result};
use scintrec_core::paddle::Side;
use scintrec_core::registry::Variable;
use scintrec_core::state::PipelineState;
use scintrec_core::track::TrackIntercept;
use scintrec_fadc::{DecodeSummary, EventRecords, HitDecoder};
use serde::Serialize;
use std::sync::Arc;

/// Stages and buffers built from one calibration snapshot.
#[derive(Debug)]
struct Pipeline {
    calibration: Arc<Calibration>,
    decoder: HitDecoder,
    corrector: CorrectionEngine,
    matcher: PaddleMatcher,
    estimator: PositionEstimator,
    buffer: ChannelBuffer,
}

/// One paddle hit of a reconstructed event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PaddleHit {
    /// Paddle index.
    pub paddle: usize,
    /// Combined corrected time.
    pub time: f64,
    /// Uncertainty of the combined time.
    pub time_uncertainty: f64,
    /// Combined amplitude.
    pub amplitude: f64,
    /// Position along the bar from the time difference.
    pub y_time: f64,
    /// Position along the bar from the amplitude ratio.
    pub y_amplitude: f64,
}

/// Serializable result of one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    /// Event number reported by the event source.
    pub event_number: u64,
    /// Number of complete hits.
    pub n_hit: usize,
    /// Complete hits, in increasing paddle order.
    pub hits: Vec<PaddleHit>,
    /// Paddles timed on one side only.
    pub partial_hits: usize,
    /// Decode anomalies recorded for the event.
    pub anomalies: usize,
}

/// Event reconstructor for one scintillator plane.
#[derive(Debug)]
pub struct Reconstructor {
    pipeline: Option<Pipeline>,
    state: PipelineState,
    event_number: u64,
    tracks: Option<Vec<TrackIntercept>>,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconstructor {
    /// Creates an uninitialized reconstructor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipeline: None,
            state: PipelineState::Uninitialized,
            event_number: 0,
            tracks: None,
        }
    }

    /// Creates a reconstructor ready for events.
    ///
    /// # Errors
    /// Returns a configuration error if the calibration is invalid.
    pub fn with_calibration(calibration: Arc<Calibration>) -> Result<Self> {
        let mut reconstructor = Self::new();
        reconstructor.init(calibration)?;
        Ok(reconstructor)
    }

    /// Load (or replace) the calibration snapshot.
    ///
    /// Buffers are reused when the paddle count is unchanged. On error the
    /// previous state is left untouched.
    ///
    /// # Errors
    /// Returns a configuration error if the calibration is invalid.
    pub fn init(&mut self, calibration: Arc<Calibration>) -> Result<()> {
        calibration.validate()?;

        let buffer = match self.pipeline.take() {
            Some(previous) if previous.buffer.n_paddles() == calibration.n_paddles => {
                previous.buffer
            }
            _ => ChannelBuffer::new(calibration.n_paddles)?,
        };

        tracing::info!(
            n_paddles = calibration.n_paddles,
            timewalk_parameters = calibration.timewalk.len(),
            "calibration loaded"
        );

        self.pipeline = Some(Pipeline {
            decoder: HitDecoder::new(calibration.fadc.clone()),
            corrector: CorrectionEngine::new(Arc::clone(&calibration)),
            matcher: PaddleMatcher::from_calibration(&calibration),
            estimator: PositionEstimator::from_calibration(&calibration),
            calibration,
            buffer,
        });
        self.reset();
        Ok(())
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Calibration in use.
    #[must_use]
    pub fn calibration(&self) -> Option<&Arc<Calibration>> {
        self.pipeline.as_ref().map(|p| &p.calibration)
    }

    /// Per-event buffers, for diagnostic consumers.
    #[must_use]
    pub fn buffer(&self) -> Option<&ChannelBuffer> {
        self.pipeline.as_ref().map(|p| &p.buffer)
    }

    /// Exported variables of the current event.
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`] without a calibration.
    pub fn variables(&self) -> Result<Vec<Variable<'_>>> {
        Ok(self.pipeline()?.buffer.variables())
    }

    /// Start a new event: clear every per-event array.
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`] without a calibration.
    pub fn clear(&mut self) -> Result<()> {
        self.pipeline()?;
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.buffer.clear();
            self.state = PipelineState::Ready;
        }
        self.event_number = 0;
        self.tracks = None;
    }

    /// Decode the raw records of an event into the cleared buffers.
    ///
    /// # Errors
    /// Fails unless the buffers were just cleared.
    pub fn decode<E: EventRecords + ?Sized>(&mut self, event: &E) -> Result<DecodeSummary> {
        self.require_state("decode", PipelineState::Ready)?;
        let pipeline = self.pipeline_mut()?;
        let summary = pipeline.decoder.decode(event, &mut pipeline.buffer);
        self.event_number = event.event_number();
        self.state = PipelineState::Decoded;
        Ok(summary)
    }

    /// Apply calibration corrections.
    ///
    /// # Errors
    /// Fails unless the event was decoded.
    pub fn correct(&mut self) -> Result<CorrectionSummary> {
        self.require_state("correct", PipelineState::Decoded)?;
        let pipeline = self.pipeline_mut()?;
        let summary = pipeline.corrector.apply(&mut pipeline.buffer)?;
        self.state = PipelineState::Corrected;
        Ok(summary)
    }

    /// Pair left and right channels into the hit list.
    ///
    /// # Errors
    /// Fails unless the event was corrected.
    pub fn match_paddles(&mut self) -> Result<MatchSummary> {
        self.require_state("match_paddles", PipelineState::Corrected)?;
        let pipeline = self.pipeline_mut()?;
        let summary = pipeline.matcher.match_paddles(&mut pipeline.buffer)?;
        self.state = PipelineState::Matched;
        Ok(summary)
    }

    /// Compute the hit positions.
    ///
    /// # Errors
    /// Fails unless the paddles were matched.
    pub fn estimate(&mut self) -> Result<()> {
        self.require_state("estimate", PipelineState::Matched)?;
        let pipeline = self.pipeline_mut()?;
        pipeline.estimator.estimate(&mut pipeline.buffer);
        self.state = PipelineState::Estimated;
        Ok(())
    }

    /// Run the hit-level pipeline for one event.
    ///
    /// # Errors
    /// Returns [`Error::NotInitialized`] without a calibration.
    pub fn process_event<E: EventRecords + ?Sized>(&mut self, event: &E) -> Result<()> {
        self.clear()?;
        self.decode(event)?;
        self.correct()?;
        self.match_paddles()?;
        self.estimate()
    }

    /// Attach the tracks found for this event and count matches per hit.
    ///
    /// # Errors
    /// Fails unless the event was estimated, or if a track names a paddle
    /// outside the plane.
    pub fn attach_tracks(&mut self, tracks: &[TrackIntercept]) -> Result<()> {
        self.require_state("attach_tracks", PipelineState::Estimated)?;
        let buffer = &mut self.pipeline_mut()?.buffer;
        let n_paddles = buffer.n_paddles();

        if let Some(bad) = tracks.iter().find(|t| t.paddle >= n_paddles) {
            return Err(Error::PaddleOutOfRange {
                paddle: bad.paddle,
                n_paddles,
            });
        }

        buffer.plane.matches.fill(0);
        for track in tracks {
            buffer.plane.matches[track.paddle] += 1;
        }
        let plane_matches = &buffer.plane.matches;
        let paddles = buffer.hits.paddles().to_vec();
        for (slot, paddle) in buffer.hits.matches_mut().iter_mut().zip(paddles) {
            *slot = plane_matches[paddle];
        }

        self.tracks = Some(tracks.to_vec());
        Ok(())
    }

    /// Track-dependent phase: path-length corrections.
    ///
    /// # Errors
    /// [`Error::PhaseOrder`] unless the event was estimated and not yet
    /// path-corrected; [`Error::MissingTrackData`] without attached tracks.
    pub fn apply_corrections(&mut self) -> Result<()> {
        self.require_state("apply_corrections", PipelineState::Estimated)?;
        let Some(tracks) = self.tracks.take() else {
            return Err(Error::MissingTrackData);
        };
        let pipeline = self.pipeline_mut()?;
        pipeline
            .estimator
            .apply_track_corrections(&mut pipeline.buffer, &tracks);
        self.tracks = Some(tracks);
        self.state = PipelineState::PathCorrected;
        Ok(())
    }

    /// Number of complete hits.
    ///
    /// # Errors
    /// Fails before matching.
    pub fn n_hit(&self) -> Result<usize> {
        let stage = PipelineState::Matched;
        let buffer = self.require_reached("n_hit", stage)?;
        Ok(buffer.hits.len())
    }

    /// Paddles of the complete hits, increasing.
    ///
    /// # Errors
    /// Fails before matching.
    pub fn hit_paddles(&self) -> Result<&[usize]> {
        let stage = PipelineState::Matched;
        let buffer = self.require_reached("hit_paddles", stage)?;
        Ok(buffer.hits.paddles())
    }

    /// Combined times, in hit order.
    ///
    /// # Errors
    /// Fails before matching.
    pub fn times(&self) -> Result<&[f64]> {
        let stage = PipelineState::Matched;
        let buffer = self.require_reached("times", stage)?;
        Ok(buffer.hits.times())
    }

    /// Time uncertainties, in hit order.
    ///
    /// # Errors
    /// Fails before matching.
    pub fn time_uncertainties(&self) -> Result<&[f64]> {
        let stage = PipelineState::Matched;
        let buffer = self.require_reached("time_uncertainties", stage)?;
        Ok(buffer.hits.time_uncertainties())
    }

    /// Combined amplitudes, in hit order.
    ///
    /// # Errors
    /// Fails before matching.
    pub fn amplitudes(&self) -> Result<&[f64]> {
        let stage = PipelineState::Matched;
        let buffer = self.require_reached("amplitudes", stage)?;
        Ok(buffer.hits.amplitudes())
    }

    /// Timing-based positions, in hit order.
    ///
    /// # Errors
    /// Fails before estimation.
    pub fn y_from_time(&self) -> Result<&[f64]> {
        let stage = PipelineState::Estimated;
        let buffer = self.require_reached("y_from_time", stage)?;
        Ok(buffer.hits.y_from_time())
    }

    /// Amplitude-based positions, in hit order.
    ///
    /// # Errors
    /// Fails before estimation.
    pub fn y_from_amplitude(&self) -> Result<&[f64]> {
        let stage = PipelineState::Estimated;
        let buffer = self.require_reached("y_from_amplitude", stage)?;
        Ok(buffer.hits.y_from_amplitude())
    }

    /// Path-length-corrected times, in hit order.
    ///
    /// # Errors
    /// Fails before the track-dependent phase.
    pub fn path_corrected_times(&self) -> Result<&[f64]> {
        let stage = PipelineState::PathCorrected;
        let buffer = self.require_reached("path_corrected_times", stage)?;
        Ok(buffer.hits.path_corrected_times())
    }

    /// Track matches per hit, in hit order.
    ///
    /// # Errors
    /// Fails before matching.
    pub fn hit_matches(&self) -> Result<&[u32]> {
        let stage = PipelineState::Matched;
        let buffer = self.require_reached("hit_matches", stage)?;
        Ok(buffer.hits.matches())
    }

    /// Paddles timed on one side only.
    ///
    /// # Errors
    /// Fails before matching.
    pub fn partial_hits(&self) -> Result<&[(usize, Side)]> {
        let stage = PipelineState::Matched;
        let buffer = self.require_reached("partial_hits", stage)?;
        Ok(&buffer.partial)
    }

    /// Decode anomalies of the current event.
    ///
    /// # Errors
    /// Fails before decoding.
    pub fn anomalies(&self) -> Result<&[DecodeAnomaly]> {
        let stage = PipelineState::Decoded;
        let buffer = self.require_reached("anomalies", stage)?;
        Ok(&buffer.anomalies)
    }

    /// Serializable summary of the current event.
    ///
    /// # Errors
    /// Fails before estimation.
    pub fn summary(&self) -> Result<EventSummary> {
        let stage = PipelineState::Estimated;
        let buffer = self.require_reached("summary", stage)?;
        let hits = &buffer.hits;
        let paddle_hits = (0..hits.len())
            .map(|i| PaddleHit {
                paddle: hits.paddles()[i],
                time: hits.times()[i],
                time_uncertainty: hits.time_uncertainties()[i],
                amplitude: hits.amplitudes()[i],
                y_time: hits.y_from_time()[i],
                y_amplitude: hits.y_from_amplitude()[i],
            })
            .collect();
        Ok(EventSummary {
            event_number: self.event_number,
            n_hit: hits.len(),
            hits: paddle_hits,
            partial_hits: buffer.partial.len(),
            anomalies: buffer.anomalies.len(),
        })
    }

    fn pipeline(&self) -> Result<&Pipeline> {
        self.pipeline.as_ref().ok_or(Error::NotInitialized)
    }

    fn pipeline_mut(&mut self) -> Result<&mut Pipeline> {
        self.pipeline.as_mut().ok_or(Error::NotInitialized)
    }

    /// Require exactly `expected` as the current state.
    fn require_state(&self, operation: &'static str, expected: PipelineState) -> Result<()> {
        self.pipeline()?;
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::PhaseOrder {
                operation,
                expected,
                actual: self.state,
            })
        }
    }

    /// Require at least `stage`, returning the buffers.
    fn require_reached(
        &self,
        operation: &'static str,
        stage: PipelineState,
    ) -> Result<&ChannelBuffer> {
        let pipeline = self.pipeline()?;
        if self.state.reached(stage) {
            Ok(&pipeline.buffer)
        } else {
            Err(Error::PhaseOrder {
                operation,
                expected: stage,
                actual: self.state,
            })
        }
    }
}

/// Reconstruct many events in parallel.
///
/// Events are split into chunks of `chunk_size`; each rayon task owns a
/// private [`Reconstructor`] sharing the calibration snapshot. Results keep
/// the input order.
///
/// # Errors
/// Returns the first configuration error encountered.
pub fn reconstruct_events<E>(
    calibration: &Arc<Calibration>,
    events: &[E],
    chunk_size: usize,
) -> Result<Vec<EventSummary>>
where
    E: EventRecords + Sync,
{
    calibration.validate()?;
    let chunks: Vec<Vec<EventSummary>> = events
        .par_chunks(chunk_size.max(1))
        .map(|chunk| {
            let mut reconstructor = Reconstructor::with_calibration(Arc::clone(calibration))?;
            chunk
                .iter()
                .map(|event| {
                    reconstructor.process_event(event)?;
                    reconstructor.summary()
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(chunks.into_iter().flatten().collect())
}

/// Reconstruct events one after another on a single instance.
///
/// # Errors
/// Returns the first configuration error encountered.
pub fn reconstruct_events_sequential<'a, E, I>(
    calibration: &Arc<Calibration>,
    events: I,
) -> Result<Vec<EventSummary>>
where
    E: EventRecords + 'a,
    I: IntoIterator<Item = &'a E>,
{
    let mut reconstructor = Reconstructor::with_calibration(Arc::clone(calibration))?;
    events
        .into_iter()
        .map(|event| {
            reconstructor.process_event(event)?;
            reconstructor.summary()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scintrec_fadc::RawEvent;

    fn reconstructor(n: usize) -> Reconstructor {
        let calibration = Arc::new(Calibration::neutral(n));
        Reconstructor::with_calibration(calibration).unwrap()
    }

    #[test]
    fn test_uninitialized_rejects_events() {
        let mut rec = Reconstructor::new();
        assert_eq!(rec.state(), PipelineState::Uninitialized);
        assert!(matches!(
            rec.process_event(&RawEvent::new(1)),
            Err(Error::NotInitialized)
        ));
        assert!(matches!(rec.n_hit(), Err(Error::NotInitialized)));
    }

    #[test]
    fn test_init_rejects_bad_calibration() {
        let mut cal = Calibration::neutral(3);
        cal.trigger_offset.pop();
        let err = Reconstructor::with_calibration(Arc::new(cal)).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { .. }));
    }

    #[test]
    fn test_phase_order_enforced() {
        let mut rec = reconstructor(2);
        assert!(matches!(
            rec.correct(),
            Err(Error::PhaseOrder {
                operation: "correct",
                ..
            })
        ));
        rec.decode(&RawEvent::new(1)).unwrap();
        assert!(rec.decode(&RawEvent::new(1)).is_err());
        assert!(rec.match_paddles().is_err());
        assert!(rec.times().is_err());
        rec.correct().unwrap();
        rec.match_paddles().unwrap();
        assert!(rec.times().is_ok());
        assert!(rec.y_from_time().is_err());
        rec.estimate().unwrap();
        assert_eq!(rec.state(), PipelineState::Estimated);
    }

    #[test]
    fn test_track_phase_guards() {
        let mut rec = reconstructor(2);
        rec.decode(&RawEvent::new(1)).unwrap();
        assert!(matches!(rec.apply_corrections(), Err(Error::PhaseOrder { .. })));

        rec.correct().unwrap();
        rec.match_paddles().unwrap();
        rec.estimate().unwrap();
        assert!(matches!(rec.apply_corrections(), Err(Error::MissingTrackData)));

        rec.attach_tracks(&[]).unwrap();
        rec.apply_corrections().unwrap();
        assert_eq!(rec.state(), PipelineState::PathCorrected);
        // A second pass would subtract twice.
        assert!(rec.apply_corrections().is_err());
    }

    #[test]
    fn test_accessors_follow_phases() {
        let mut rec = reconstructor(2);
        let event = RawEvent::new(1)
            .with_tdc(0, Side::Left, 10)
            .with_tdc(0, Side::Right, 10);
        rec.process_event(&event).unwrap();

        assert_eq!(rec.time_uncertainties().unwrap().len(), 1);
        assert_eq!(rec.y_from_amplitude().unwrap().len(), 1);
        assert!(matches!(
            rec.path_corrected_times(),
            Err(Error::PhaseOrder {
                operation: "path_corrected_times",
                ..
            })
        ));

        rec.attach_tracks(&[TrackIntercept::new(0, 0.0, 0.0, 0.0)])
            .unwrap();
        rec.apply_corrections().unwrap();
        assert_eq!(rec.path_corrected_times().unwrap().len(), 1);
    }

    #[test]
    fn test_clear_drops_tracks() {
        let mut rec = reconstructor(2);
        rec.process_event(&RawEvent::new(1)).unwrap();
        rec.attach_tracks(&[TrackIntercept::new(0, 0.0, 0.0, 0.0)])
            .unwrap();
        rec.process_event(&RawEvent::new(2)).unwrap();
        assert!(matches!(rec.apply_corrections(), Err(Error::MissingTrackData)));
    }

    #[test]
    fn test_attach_tracks_rejects_bad_paddle() {
        let mut rec = reconstructor(2);
        rec.process_event(&RawEvent::new(1)).unwrap();
        assert!(matches!(
            rec.attach_tracks(&[TrackIntercept::new(7, 0.0, 0.0, 0.0)]),
            Err(Error::PaddleOutOfRange { paddle: 7, .. })
        ));
    }

    #[test]
    fn test_reinit_resizes_buffers() {
        let mut rec = reconstructor(2);
        rec.process_event(&RawEvent::new(1)).unwrap();
        rec.init(Arc::new(Calibration::neutral(5))).unwrap();
        assert_eq!(rec.state(), PipelineState::Ready);
        assert_eq!(rec.buffer().unwrap().n_paddles(), 5);
    }
}
