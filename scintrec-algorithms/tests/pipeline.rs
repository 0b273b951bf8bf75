#![allow(clippy::float_cmp)]
use approx::assert_relative_eq;
use scintrec_algorithms::{
    reconstruct_events, reconstruct_events_sequential, Error, PipelineState, Reconstructor,
    TrackIntercept,
};
use scintrec_core::{Calibration, PathLengthCoefficients, VariableView};
use scintrec_fadc::{RawEvent, Side};
use std::sync::Arc;

fn calibration() -> Arc<Calibration> {
    Arc::new(
        Calibration::neutral(4)
            .with_tdc_to_time(0.1)
            .with_speed_in_material(0.15),
    )
}

fn float(rec: &Reconstructor, name: &str) -> Vec<f64> {
    match rec.buffer().unwrap().variable(name) {
        Some(VariableView::Float(values)) => values.to_vec(),
        other => panic!("{name} is not a float array: {other:?}"),
    }
}

#[test]
fn test_two_sided_paddle_is_a_hit() {
    let mut rec = Reconstructor::with_calibration(calibration()).unwrap();
    let event = RawEvent::new(7)
        .with_tdc(2, Side::Left, 1000)
        .with_tdc(2, Side::Right, 1050);

    rec.process_event(&event).unwrap();

    assert_eq!(rec.n_hit().unwrap(), 1);
    assert_eq!(rec.hit_paddles().unwrap(), &[2]);
    assert_relative_eq!(rec.times().unwrap()[0], 102.5);
    assert_relative_eq!(rec.time_uncertainties().unwrap()[0], 1.0 / 2f64.sqrt());
    assert_relative_eq!(rec.y_from_time().unwrap()[0], 0.5 * 0.15 * 5.0);
    assert_eq!(rec.summary().unwrap().event_number, 7);
}

#[test]
fn test_single_sided_paddle_stays_diagnostic() {
    let mut rec = Reconstructor::with_calibration(calibration()).unwrap();
    let event = RawEvent::new(1).with_tdc(1, Side::Left, 800);

    rec.process_event(&event).unwrap();

    assert_eq!(rec.n_hit().unwrap(), 0);
    assert_eq!(rec.partial_hits().unwrap(), &[(1, Side::Left)]);
    assert_relative_eq!(float(&rec, "lt_c")[1], 80.0);
    assert!(float(&rec, "rt_c")[1].is_nan());
    assert!(float(&rec, "time")[1].is_nan());
}

#[test]
fn test_overflow_waveform_has_no_amplitude_or_timewalk() {
    let cal = Calibration::neutral(1)
        .with_adc_mip(300.0)
        .with_timewalk(vec![5.0]);
    let mut rec = Reconstructor::with_calibration(Arc::new(cal)).unwrap();
    let event = RawEvent::new(1)
        .with_tdc(0, Side::Left, 500)
        .with_tdc(0, Side::Right, 500)
        .with_fadc(0, Side::Left, vec![4095; 20]);

    rec.process_event(&event).unwrap();

    assert!(float(&rec, "la_c")[0].is_nan());
    assert_eq!(float(&rec, "ltw")[0], 0.0);
    assert_eq!(float(&rec, "lt_c")[0], 500.0);
    assert!(rec.amplitudes().unwrap()[0].is_nan());
    assert!(!rec.anomalies().unwrap().is_empty());
}

#[test]
fn test_measured_pedestal_feeds_amplitude_position() {
    let mut cal = Calibration::neutral(1).with_attenuation(0.5);
    cal.left.pedestal[0] = None;
    cal.right.pedestal[0] = None;
    let mut rec = Reconstructor::with_calibration(Arc::new(cal)).unwrap();
    let left = vec![100, 100, 100, 100, 300, 500, 300, 100];
    let right = vec![100, 100, 100, 100, 200, 200, 150, 100];
    let event = RawEvent::new(1)
        .with_tdc(0, Side::Left, 100)
        .with_tdc(0, Side::Right, 100)
        .with_fadc(0, Side::Left, left)
        .with_fadc(0, Side::Right, right);

    rec.process_event(&event).unwrap();

    assert_eq!(float(&rec, "lped_fadc")[0], 100.0);
    assert_eq!(float(&rec, "la_p")[0], 400.0);
    assert_eq!(float(&rec, "ra_p")[0], 100.0);
    assert_relative_eq!(rec.amplitudes().unwrap()[0], 200.0);
    assert_relative_eq!(rec.y_from_amplitude().unwrap()[0], 4f64.ln());
}

#[test]
fn test_empty_event_leaves_no_data_everywhere() {
    let mut rec = Reconstructor::with_calibration(calibration()).unwrap();
    let first = RawEvent::new(1)
        .with_tdc(0, Side::Left, 10)
        .with_tdc(0, Side::Right, 10);
    rec.process_event(&first).unwrap();
    rec.process_event(&RawEvent::new(2)).unwrap();

    assert_eq!(rec.n_hit().unwrap(), 0);
    for variable in rec.variables().unwrap() {
        if let VariableView::Float(values) = variable.view {
            assert!(
                values.iter().all(|v| v.is_nan()),
                "{} kept data from the previous event",
                variable.name
            );
        }
    }
}

#[test]
fn test_identical_events_identical_outputs() {
    let left = vec![100, 101, 99, 100, 180, 420, 380, 200, 120, 100];
    let right = vec![98, 100, 102, 100, 150, 300, 260, 160, 110, 100];
    let event = RawEvent::new(3)
        .with_tdc(0, Side::Left, 1234)
        .with_tdc(0, Side::Right, 1300)
        .with_fadc(0, Side::Left, left)
        .with_fadc(0, Side::Right, right);
    let cal = Arc::new(
        Calibration::neutral(2)
            .with_tdc_to_time(0.05)
            .with_adc_mip(200.0)
            .with_timewalk(vec![1.5]),
    );

    let mut a = Reconstructor::with_calibration(Arc::clone(&cal)).unwrap();
    let mut b = Reconstructor::with_calibration(cal).unwrap();
    a.process_event(&event).unwrap();
    b.process_event(&event).unwrap();

    let bits = |rec: &Reconstructor| -> Vec<u64> {
        let times = rec.times().unwrap();
        let amplitudes = rec.amplitudes().unwrap();
        let positions = rec.y_from_amplitude().unwrap();
        times
            .iter()
            .chain(amplitudes)
            .chain(positions)
            .map(|v| v.to_bits())
            .collect()
    };
    assert_eq!(bits(&a), bits(&b));
}

#[test]
fn test_side_swap_negates_position() {
    let mut rec = Reconstructor::with_calibration(calibration()).unwrap();
    rec.process_event(
        &RawEvent::new(1)
            .with_tdc(3, Side::Left, 900)
            .with_tdc(3, Side::Right, 960),
    )
    .unwrap();
    let forward = rec.y_from_time().unwrap()[0];

    rec.process_event(
        &RawEvent::new(2)
            .with_tdc(3, Side::Left, 960)
            .with_tdc(3, Side::Right, 900),
    )
    .unwrap();
    let swapped = rec.y_from_time().unwrap()[0];

    assert_relative_eq!(forward, -swapped);
}

#[test]
fn test_track_phase() {
    let coefficients = PathLengthCoefficients {
        x: 2.0,
        theta: 0.0,
        phi: 0.0,
    };
    let cal = Calibration::neutral(3).with_path_length(coefficients);
    let mut rec = Reconstructor::with_calibration(Arc::new(cal)).unwrap();
    rec.process_event(
        &RawEvent::new(1)
            .with_tdc(0, Side::Left, 10)
            .with_tdc(0, Side::Right, 20)
            .with_tdc(2, Side::Left, 30)
            .with_tdc(2, Side::Right, 30),
    )
    .unwrap();

    assert!(matches!(rec.apply_corrections(), Err(Error::MissingTrackData)));
    assert!(rec.path_corrected_times().is_err());

    rec.attach_tracks(&[
        TrackIntercept::new(2, 1.5, 0.0, 0.0),
        TrackIntercept::new(2, 0.1, 0.0, 0.0),
    ])
    .unwrap();
    rec.apply_corrections().unwrap();

    assert_eq!(rec.state(), PipelineState::PathCorrected);
    assert_eq!(rec.hit_matches().unwrap(), &[0, 2]);
    let corrected = rec.path_corrected_times().unwrap();
    assert!(corrected[0].is_nan());
    assert_relative_eq!(corrected[1], 30.0 - 3.0);
}

#[test]
fn test_parallel_batch_matches_sequential() {
    let events: Vec<RawEvent> = (0..200u32)
        .map(|i| {
            let paddle = (i % 4) as usize;
            RawEvent::new(u64::from(i))
                .with_tdc(paddle, Side::Left, 1000 + i)
                .with_tdc(paddle, Side::Right, 1100 - i)
        })
        .collect();
    let cal = calibration();

    let parallel = reconstruct_events(&cal, &events, 16).unwrap();
    let sequential = reconstruct_events_sequential(&cal, &events).unwrap();

    assert_eq!(parallel.len(), events.len());
    for (p, s) in parallel.iter().zip(&sequential) {
        assert_eq!(p.event_number, s.event_number);
        assert_eq!(p.n_hit, s.n_hit);
        for (hp, hs) in p.hits.iter().zip(&s.hits) {
            assert_eq!(hp.paddle, hs.paddle);
            assert_eq!(hp.time.to_bits(), hs.time.to_bits());
            assert_eq!(hp.y_time.to_bits(), hs.y_time.to_bits());
        }
    }
    assert_eq!(parallel[5].event_number, 5);
    assert_eq!(parallel[5].hits[0].paddle, 1);
}
