use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use filly::{Engine, NullRenderer, NullSynth};
use filly_assets::FsAssetLoader;
use filly_audio::NullAudioSink;
use filly_core::RawProgram;

/// A runtime for FILLY, a legacy interactive scripting language compiled to
/// bytecode.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON-serialized program (top-level opcode stream plus
    /// event-handler blocks) produced by the upstream FILLY compiler (spec
    /// §6 "Bytecode input").
    #[arg(long)]
    bytecode: PathBuf,

    /// SoundFont bytes. Loaded and handed to the synth backend, but this
    /// build ships only a silent `NullSynth` (spec §6 treats the real
    /// SoundFont synth as an external collaborator, same as the renderer).
    #[arg(short = 'f', long = "soundfont", alias = "sf", value_name = "PATH")]
    soundfont: Option<PathBuf>,

    /// Run without a real audio device or graphics backend.
    #[arg(long)]
    headless: bool,

    /// Stop after this many seconds regardless of program state.
    #[arg(long)]
    timeout: Option<u64>,

    /// Base directory asset paths resolve against (spec §6 AssetLoader).
    #[arg(long, default_value = ".")]
    assets: PathBuf,

    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,

    #[arg(long, default_value_t = 480)]
    ppq: u32,

    /// Print the validated opcode tree instead of running it.
    #[arg(long)]
    dump_opcodes: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let bytecode_json = std::fs::read_to_string(&args.bytecode)
        .with_context(|| format!("reading bytecode file {}", args.bytecode.display()))?;
    let program: RawProgram =
        serde_json::from_str(&bytecode_json).context("parsing bytecode file as JSON")?;

    let assets = Box::new(FsAssetLoader::new(&args.assets));
    let renderer = Box::new(NullRenderer::new());
    let audio_sink = build_audio_sink(args.headless);

    let timeout = args.timeout.map(Duration::from_secs);
    let engine = Engine::new(
        args.ppq,
        args.sample_rate,
        args.headless,
        timeout,
        assets,
        renderer,
        audio_sink,
    );

    engine.load(program)?;

    if args.dump_opcodes {
        print!("{}", engine.dump_opcodes());
        return Ok(());
    }

    if let Some(soundfont_path) = &args.soundfont {
        let bytes = std::fs::read(soundfont_path)
            .with_context(|| format!("reading soundfont {}", soundfont_path.display()))?;
        engine.set_synth(Box::new(NullSynth::new(bytes, args.sample_rate)));
    }

    drive(&engine, &args)?;
    engine.shutdown()
}

#[cfg(feature = "cpal-audio")]
fn build_audio_sink(headless: bool) -> Box<dyn filly_core::traits::AudioSink> {
    if headless {
        Box::new(NullAudioSink::new())
    } else {
        Box::new(filly_audio::CpalAudioSink::new())
    }
}

#[cfg(not(feature = "cpal-audio"))]
fn build_audio_sink(headless: bool) -> Box<dyn filly_core::traits::AudioSink> {
    if !headless {
        log::warn!("built without the cpal-audio feature; falling back to a null audio sink");
    }
    Box::new(NullAudioSink::new())
}

/// The host/game-thread loop (spec §5): tick TIME once per frame, pump one
/// frame's worth of MIDI_TIME, and stop on termination or timeout.
fn drive(engine: &Engine, args: &Args) -> Result<()> {
    let frame_duration = Duration::from_secs_f64(1.0 / 60.0);
    let frames_per_tick = (args.sample_rate / 60).max(1);
    loop {
        if engine.timeout_expired() {
            log::info!("timeout expired, shutting down");
            engine.request_shutdown();
        }
        engine.tick_frame()?;
        engine.pump_audio(frames_per_tick)?;
        if engine.is_terminated() || engine.all_sequences_complete() {
            break;
        }
        if !args.headless {
            std::thread::sleep(frame_duration);
        }
    }
    Ok(())
}
