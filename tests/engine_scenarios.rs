//! End-to-end coverage of spec §8's concrete scenarios through the public
//! `Engine` API, as opposed to `filly-vm`'s/`filly-midi`'s own unit tests
//! against their internal types. Scenario 5 (tempo-change tick accounting)
//! already has dedicated, more precise coverage in
//! `filly-midi`'s `tick_generator` tests and isn't duplicated here.

use filly::{Engine, NullRenderer, NullSynth};
use filly_assets::FsAssetLoader;
use filly_audio::NullAudioSink;
use filly_core::{EventType, MesParams, RawArg, RawHandler, RawOp, RawProgram, Value};

fn engine_in(dir: &std::path::Path) -> Engine {
    Engine::new(
        480,
        44_100,
        true,
        None,
        Box::new(FsAssetLoader::new(dir)),
        Box::new(NullRenderer::new()),
        Box::new(NullAudioSink::new()),
    )
}

fn lit(n: i64) -> RawArg {
    RawArg::Op(RawOp::new("literal", vec![RawArg::Lit(Value::Int(n))]))
}

fn var_ref(name: &str) -> RawArg {
    RawArg::Op(RawOp::new("var-ref", vec![RawArg::Var(name.to_string())]))
}

fn assign(name: &str, value: RawArg) -> RawOp {
    RawOp::new("assign", vec![RawArg::Var(name.to_string()), value])
}

fn wait(k: i64) -> RawOp {
    RawOp::new("wait", vec![lit(k)])
}

fn call0(name: &str) -> RawOp {
    RawOp::new("call", vec![RawArg::Lit(Value::Str(name.to_string()))])
}

#[test]
fn scenario_1_serial_assigns_complete_in_one_frame_tick() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    engine
        .load_program(vec![assign("x", lit(1)), assign("y", lit(2)), assign("z", lit(3))])
        .unwrap();

    engine.tick_frame().unwrap();

    assert_eq!(engine.global_var("x"), Value::Int(1));
    assert_eq!(engine.global_var("y"), Value::Int(2));
    assert_eq!(engine.global_var("z"), Value::Int(3));
}

#[test]
fn scenario_2_wait_in_time_mode_resumes_after_n_times_default_step() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    // default ticks_per_step = 3; wait(2) => wait_count = 6, so y lands on
    // the 8th frame tick (1 to run assign+wait, 6 counting down, 1 more to
    // run assign(y, 2)).
    engine
        .load_program(vec![assign("x", lit(1)), wait(2), assign("y", lit(2))])
        .unwrap();

    engine.tick_frame().unwrap();
    assert_eq!(engine.global_var("x"), Value::Int(1));
    assert_eq!(engine.global_var("y"), Value::Int(0));

    for _ in 0..6 {
        engine.tick_frame().unwrap();
        assert_eq!(engine.global_var("y"), Value::Int(0));
    }

    engine.tick_frame().unwrap();
    assert_eq!(engine.global_var("y"), Value::Int(2));
}

#[test]
fn scenario_4_event_independence_across_two_triggers() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    engine
        .load(RawProgram {
            top_level: Vec::new(),
            handlers: vec![RawHandler {
                event_type: "KEY".to_string(),
                mode: "TIME".to_string(),
                commands: vec![assign("x", var_ref("MesP1"))],
                user_id: None,
            }],
        })
        .unwrap();

    let before = engine.sequencer_count();
    engine.trigger_event(EventType::Key, MesParams(100, 0, 0, 0));
    engine.tick_frame().unwrap();
    assert_eq!(engine.global_var("x"), Value::Int(100));

    engine.trigger_event(EventType::Key, MesParams(200, 0, 0, 0));
    engine.tick_frame().unwrap();
    assert_eq!(engine.global_var("x"), Value::Int(200));

    // Two independent sequencers were instantiated, one per trigger; the
    // global mirror only ever shows the most recent writer (P1's
    // independence is about each instance's own `vars`, tested directly
    // against `filly_vm::Vm` in that crate's own test suite).
    assert_eq!(engine.sequencer_count(), before + 2);
}

#[test]
fn scenario_6_del_me_does_not_terminate_with_surviving_midi_handler() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    engine
        .load(RawProgram {
            top_level: Vec::new(),
            handlers: vec![
                RawHandler {
                    event_type: "MIDI_TIME".to_string(),
                    mode: "MIDI_TIME".to_string(),
                    commands: vec![call0("del_me")],
                    user_id: None,
                },
                RawHandler {
                    event_type: "MIDI_TIME".to_string(),
                    mode: "MIDI_TIME".to_string(),
                    commands: vec![assign("heartbeat", lit(1))],
                    user_id: None,
                },
            ],
        })
        .unwrap();

    engine.trigger_event(EventType::MidiTime, MesParams::ZERO);
    assert!(!engine.is_terminated());
}

#[test]
fn scenario_3_wait_in_midi_time_mode_fires_after_enough_ticks() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("song.mid"), smf_bytes()).unwrap();
    let engine = engine_in(dir.path());
    engine.set_synth(Box::new(NullSynth::new(vec![], 44_100)));

    // The TIME-mode top level starts MIDI playback and spawns a MIDI_TIME
    // child in the same tick; the child's `set-step(8); wait(1);
    // assign(done,1)` (ticks_per_step = ppq/8*8 = ppq) only advances once
    // `pump_audio` starts delivering MIDI ticks.
    let play_midi = RawOp::new(
        "call",
        vec![
            RawArg::Lit(Value::Str("play-midi".to_string())),
            RawArg::Lit(Value::Str("song.mid".to_string())),
        ],
    );
    let child_body = vec![RawOp::new("set-step", vec![lit(8)]), wait(1), assign("done", lit(1))];
    let register_child = RawOp::new(
        "register-sequence",
        vec![RawArg::Lit(Value::Str("MIDI_TIME".to_string())), RawArg::Body(child_body)],
    );
    engine.load_program(vec![play_midi, register_child]).unwrap();

    engine.tick_frame().unwrap();
    assert_eq!(engine.global_var("done"), Value::Int(0));

    // Pump audio in small chunks until enough MIDI ticks have accumulated
    // (ticks_per_step = 480 at PPQ 480) or the scenario's generous budget
    // runs out.
    for _ in 0..200 {
        engine.pump_audio(512).unwrap();
        if engine.global_var("done") == Value::Int(1) {
            break;
        }
    }
    assert_eq!(engine.global_var("done"), Value::Int(1));
}

fn smf_bytes() -> Vec<u8> {
    use midly::{Header, MetaMessage, Smf, Timing, TrackEvent, TrackEventKind};
    let mut smf = Smf::new(Header::new(midly::Format::SingleTrack, Timing::Metrical(480.into())));
    smf.tracks.push(vec![
        TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(500_000.into())),
        },
        TrackEvent {
            delta: 2_000.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);
    let mut buf = Vec::new();
    smf.write(&mut buf).unwrap();
    buf
}
