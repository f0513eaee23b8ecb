use proptest::prelude::*;
use vkeys_core::{
    AppConfig, Beat, EventLoop, HitRating, ManualClock, Metronome, PlaybackState, Recorder,
    SystemClock, TimeSignature, VisualConfig, Visualizer,
};

const EPS: f64 = 1e-9;

type Recorded = Metronome<ManualClock, Recorder<ManualClock>>;

fn recorded(clock: &ManualClock) -> Recorded {
    Metronome::with_listener(clock.clone(), Recorder::new(clock.clone()))
}

fn run(metronome: &mut Recorded, end: f64) {
    EventLoop::new(0.025, None)
        .run_until(metronome, end, |_, _| {})
        .unwrap();
}

#[test]
fn delayed_start_at_120_bpm() {
    let clock = ManualClock::new();
    let mut metronome = recorded(&clock);
    metronome.set_time_signature(TimeSignature::new(4).unwrap());
    metronome.start(true).unwrap();

    let first = metronome.listener().scheduled().next().unwrap();
    assert_eq!((first.number, first.is_downbeat), (1, true));
    assert!((first.target_time - 0.5).abs() < EPS);

    run(&mut metronome, 1.6);

    let scheduled: Vec<Beat> = metronome.listener().scheduled().collect();
    let numbers: Vec<u32> = scheduled.iter().map(|beat| beat.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert!(!scheduled[1].is_downbeat);
    assert!((scheduled[1].target_time - 1.0).abs() < EPS);
    assert!((scheduled[2].target_time - 1.5).abs() < EPS);

    let ticks: Vec<_> = metronome.listener().ticks().collect();
    assert_eq!(ticks.len(), 3);
    let (fired_at, beat) = ticks[0];
    assert_eq!(beat.number, 1);
    assert!(fired_at.unwrap() >= 0.5);
}

#[test]
fn stop_before_the_first_tick_silences_it() {
    let clock = ManualClock::new();
    let mut metronome = recorded(&clock);
    metronome.start(true).unwrap();

    run(&mut metronome, 0.3);
    metronome.stop();
    run(&mut metronome, 1.0);
    assert_eq!(metronome.listener().ticks().count(), 0);
}

#[test]
fn stop_cancels_an_armed_tick() {
    let clock = ManualClock::new();
    let mut metronome = recorded(&clock);
    metronome.start(true).unwrap();

    run(&mut metronome, 0.45);
    assert_eq!(metronome.pending_ticks(), 1);

    metronome.stop();
    metronome.stop();
    assert_eq!(metronome.state(), PlaybackState::Stopped);
    assert_eq!(metronome.pending_ticks(), 0);

    run(&mut metronome, 2.0);
    assert_eq!(metronome.listener().ticks().count(), 0);
    assert_eq!(metronome.dispatch_stats().canceled, 1);
}

#[test]
fn hit_fifty_milliseconds_after_the_anchor_is_good() {
    let clock = ManualClock::starting_at(3.0);
    let mut metronome = recorded(&clock);
    metronome.start(true).unwrap();

    let report = metronome.report_hit(3.05);
    assert!((report.score - 0.8).abs() < EPS);
    assert_eq!(report.rating, HitRating::Good);

    metronome.stop();
    assert_eq!(metronome.hit_accuracy(3.5), 0.0);
}

#[test]
fn restart_after_stop_begins_a_new_measure() {
    let clock = ManualClock::new();
    let mut metronome = recorded(&clock);
    metronome.start(true).unwrap();
    run(&mut metronome, 1.2);
    metronome.stop();

    metronome.listener_mut().clear();
    metronome.start(true).unwrap();
    let anchor = metronome.listener().scheduled().next().unwrap();
    assert_eq!(anchor.number, 1);
    assert!((anchor.target_time - 1.7).abs() < EPS);
}

#[test]
fn beat_marker_sits_on_the_hit_line_when_its_tick_fires() {
    let clock = ManualClock::new();
    let config = AppConfig::default();
    let visualizer = Visualizer::new(config.visual.clone(), config.metronome.bpm);
    let mut metronome = Metronome::from_config(
        clock.clone(),
        (Recorder::new(clock.clone()), visualizer),
        &config.metronome,
    );
    metronome.start(true).unwrap();

    let event_loop = EventLoop::from_config(&config);
    let mut frames = 0;
    event_loop
        .run_until(&mut metronome, 1.0, |metronome, now| {
            if metronome.listener_mut().1.render_frame(now).is_some() {
                frames += 1;
            }
        })
        .unwrap();
    assert!(frames >= 60);

    let (recorder, visualizer) = metronome.listener_mut();
    assert_eq!(recorder.ticks().count(), 2);

    let snapshot = visualizer.render_frame(1.0).unwrap();
    let marker = snapshot
        .beat_markers
        .iter()
        .find(|marker| marker.beat_number == 2)
        .unwrap();
    assert!(!marker.pinned);
    assert!((marker.position - snapshot.hit_line).abs() < 1e-6);
}

#[test]
fn anchor_marker_stays_pinned_until_it_sounds() {
    let clock = ManualClock::new();
    let visualizer = Visualizer::new(VisualConfig::default(), Default::default());
    let mut metronome = Metronome::with_listener(clock.clone(), visualizer);
    metronome.start(true).unwrap();

    EventLoop::new(0.025, Some(1.0 / 60.0))
        .run_until(&mut metronome, 0.49, |metronome, now| {
            let snapshot = metronome.listener_mut().render_frame(now).unwrap();
            assert_eq!(snapshot.beat_markers.len(), 1);
            assert!(snapshot.beat_markers[0].pinned);
            assert_eq!(snapshot.beat_markers[0].position, snapshot.hit_line);
        })
        .unwrap();
}

#[test]
fn system_clock_never_fires_early() {
    let clock = SystemClock::new();
    let mut metronome = Metronome::with_listener(clock.clone(), Recorder::new(clock.clone()));
    metronome.set_tempo(300.0).unwrap();
    metronome.start(true).unwrap();

    let end = clock_now(&clock) + 0.5;
    EventLoop::new(0.025, None)
        .run_until(&mut metronome, end, |_, _| {})
        .unwrap();
    metronome.stop();

    let ticks: Vec<_> = metronome.listener().ticks().collect();
    assert!(!ticks.is_empty());
    for (fired_at, beat) in ticks {
        assert!(fired_at.unwrap() >= beat.target_time);
    }
}

fn clock_now(clock: &SystemClock) -> f64 {
    use vkeys_core::ClockSource;
    clock.current_time().unwrap()
}

proptest! {
    #[test]
    fn consecutive_beats_are_one_interval_apart(bpm in 30.0f64..=300.0) {
        let clock = ManualClock::new();
        let mut metronome = recorded(&clock);
        metronome.set_tempo(bpm).unwrap();
        metronome.start(true).unwrap();
        run(&mut metronome, 10.0);

        let targets: Vec<f64> = metronome.listener().scheduled().map(|beat| beat.target_time).collect();
        prop_assert!(targets.len() >= 4);
        for pair in targets.windows(2) {
            prop_assert!((pair[1] - pair[0] - 60.0 / bpm).abs() < 1e-9);
        }
    }

    #[test]
    fn beat_numbers_cycle_through_the_measure(
        beats in prop::sample::select(TimeSignature::SUPPORTED.to_vec()),
        bpm in 60.0f64..=240.0,
    ) {
        let clock = ManualClock::new();
        let mut metronome = recorded(&clock);
        metronome.set_tempo(bpm).unwrap();
        metronome.set_time_signature(TimeSignature::new(beats).unwrap());
        metronome.start(true).unwrap();
        run(&mut metronome, 8.0);

        for (index, beat) in metronome.listener().scheduled().enumerate() {
            prop_assert_eq!(beat.number, index as u32 % beats + 1);
            prop_assert_eq!(beat.is_downbeat, beat.number == 1);
        }
    }

    #[test]
    fn time_signature_change_forces_a_downbeat(
        beats in prop::sample::select(TimeSignature::SUPPORTED.to_vec()),
        stop_at in 0.6f64..4.0,
    ) {
        let clock = ManualClock::new();
        let mut metronome = recorded(&clock);
        metronome.start(true).unwrap();
        run(&mut metronome, stop_at);

        let before = metronome.listener().scheduled().count();
        metronome.set_time_signature(TimeSignature::new(beats).unwrap());
        run(&mut metronome, stop_at + 0.6);

        let next = metronome.listener().scheduled().nth(before).unwrap();
        prop_assert_eq!(next.number, 1);
        prop_assert!(next.is_downbeat);
    }

    #[test]
    fn accuracy_is_symmetric_around_beats(offset in 0.0f64..0.25, beat in 0u32..16) {
        let clock = ManualClock::new();
        let mut metronome = recorded(&clock);
        metronome.start(true).unwrap();

        let on_beat = beat as f64 * 0.5;
        let early = metronome.hit_accuracy(on_beat - offset);
        let late = metronome.hit_accuracy(on_beat + offset);
        prop_assert!((early - late).abs() < 1e-9);
        prop_assert!((0.0..=1.0).contains(&early));
    }
}
