//! The external-collaborator contracts named, but not designed, by spec §6.
//! The runtime is generic over these traits; `filly-audio` and `filly-assets`
//! supply concrete implementations, and tests use trivial no-op ones.

use crate::graphics::{CastId, FillMode, PictureId, Rgb, RopMode, WindowId};

/// Pulls or receives PCM samples for playback. The MIDI Player renders into
/// an `AudioSink` during normal playback; headless mode never calls one.
pub trait AudioSink: Send {
    fn open(&mut self, sample_rate: u32, channels: u16) -> anyhow::Result<()>;

    /// Push a chunk of interleaved samples for playback.
    fn push(&mut self, samples: &[f32]) -> anyhow::Result<()>;

    fn close(&mut self) -> anyhow::Result<()>;

    fn set_volume(&mut self, volume: f32);

    /// True once every pushed sample has finished playing.
    fn is_finished(&self) -> bool;
}

/// The graphics backend. The core never touches pixel buffers directly
/// except via picture/window/cast handles the intrinsic layer allocates.
pub trait Renderer: Send {
    fn render_frame(&mut self, snapshot: &FrameSnapshot);

    fn measure_text(&self, font: &str, text: &str) -> (u32, u32);

    fn load_picture(&mut self, path: &str) -> anyhow::Result<PictureId>;

    fn create_picture(&mut self, width: u32, height: u32) -> PictureId;

    fn delete_picture(&mut self, id: PictureId);

    fn open_window(&mut self, x: i32, y: i32, width: u32, height: u32) -> WindowId;

    fn move_window(&mut self, id: WindowId, x: i32, y: i32);

    fn close_window(&mut self, id: WindowId);

    fn put_cast(&mut self, window: WindowId, picture: PictureId, x: i32, y: i32, key: Rgb)
        -> CastId;

    fn move_cast(&mut self, cast: CastId, x: i32, y: i32);

    fn draw_line(&mut self, picture: PictureId, x0: i32, y0: i32, x1: i32, y1: i32, rop: RopMode);

    fn draw_rect(
        &mut self,
        picture: PictureId,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        fill: FillMode,
        rop: RopMode,
    );

    fn draw_circle(
        &mut self,
        picture: PictureId,
        cx: i32,
        cy: i32,
        radius: u32,
        fill: FillMode,
        rop: RopMode,
    );
}

/// A snapshot of the graphics state handed to the renderer once per frame.
/// Deliberately opaque here; `Engine` owns the real representation and the
/// renderer downcasts or pattern-matches on whatever concrete type it was
/// built to understand. Kept as a marker so `filly-core` doesn't need to
/// depend on the engine's picture/window/cast storage.
pub struct FrameSnapshot<'a> {
    pub generation: u64,
    pub opaque: &'a dyn std::any::Any,
}

/// A black-box MIDI sample generator fed MIDI messages (spec §1, §6). Takes
/// raw SoundFont bytes at construction; never inspects them beyond handing
/// them to the underlying synthesis library.
pub trait Synth: Send {
    fn send(&mut self, message: &[u8]);

    /// Renders into an interleaved stereo buffer, returning the number of
    /// sample frames actually written.
    fn render(&mut self, buffer: &mut [f32]) -> usize;

    fn active_voice_count(&self) -> usize;
}

/// Case-insensitive asset resolution within a configured base directory
/// (spec §6).
pub trait AssetLoader: Send {
    fn read(&self, path: &str) -> anyhow::Result<Vec<u8>>;

    fn exists(&self, path: &str) -> bool;

    fn list(&self, glob: &str) -> anyhow::Result<Vec<String>>;
}
