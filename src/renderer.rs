//! The only `Renderer` this crate ships: a headless stand-in that allocates
//! real picture/window/cast handles but draws nothing. A windowed backend is
//! external to this runtime (spec §1 Non-goals), so `--headless` and every
//! test drive this implementation.

use filly_core::graphics::{CastId, FillMode, PictureId, Rgb, RopMode, WindowId};
use filly_core::traits::{FrameSnapshot, Renderer};
use log::debug;

#[derive(Default)]
pub struct NullRenderer {
    next_picture: u32,
    next_window: u32,
    next_cast: u32,
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for NullRenderer {
    fn render_frame(&mut self, snapshot: &FrameSnapshot) {
        debug!("headless render_frame generation {}", snapshot.generation);
    }

    fn measure_text(&self, _font: &str, text: &str) -> (u32, u32) {
        // No font metrics available headless; approximate a monospace cell
        // so layout intrinsics get a stable, non-zero answer.
        (text.chars().count() as u32 * 8, 16)
    }

    fn load_picture(&mut self, path: &str) -> anyhow::Result<PictureId> {
        debug!("headless load_picture {path}");
        let id = PictureId(self.next_picture);
        self.next_picture += 1;
        Ok(id)
    }

    fn create_picture(&mut self, _width: u32, _height: u32) -> PictureId {
        let id = PictureId(self.next_picture);
        self.next_picture += 1;
        id
    }

    fn delete_picture(&mut self, _id: PictureId) {}

    fn open_window(&mut self, _x: i32, _y: i32, _width: u32, _height: u32) -> WindowId {
        let id = WindowId(self.next_window);
        self.next_window += 1;
        id
    }

    fn move_window(&mut self, _id: WindowId, _x: i32, _y: i32) {}

    fn close_window(&mut self, _id: WindowId) {}

    fn put_cast(
        &mut self,
        _window: WindowId,
        _picture: PictureId,
        _x: i32,
        _y: i32,
        _key: Rgb,
    ) -> CastId {
        let id = CastId(self.next_cast);
        self.next_cast += 1;
        id
    }

    fn move_cast(&mut self, _cast: CastId, _x: i32, _y: i32) {}

    fn draw_line(&mut self, _picture: PictureId, _x0: i32, _y0: i32, _x1: i32, _y1: i32, _rop: RopMode) {}

    fn draw_rect(
        &mut self,
        _picture: PictureId,
        _x: i32,
        _y: i32,
        _w: u32,
        _h: u32,
        _fill: FillMode,
        _rop: RopMode,
    ) {
    }

    fn draw_circle(
        &mut self,
        _picture: PictureId,
        _cx: i32,
        _cy: i32,
        _radius: u32,
        _fill: FillMode,
        _rop: RopMode,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_allocation_never_repeats() {
        let mut r = NullRenderer::new();
        let a = r.create_picture(4, 4);
        let b = r.create_picture(4, 4);
        assert_ne!(a.0, b.0);
    }
}
