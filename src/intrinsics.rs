//! Implements the non-lifecycle, non-array half of `call`'s dispatch table
//! (spec §4.9): graphics, text, audio, filesystem, bitops, time, PRNG, and
//! the virtual-desktop query. Lifecycle and array intrinsics never reach
//! here — `filly_vm::interpreter` intercepts those directly against `Vm`.
//!
//! Names are matched case-insensitively with `_`/`-` treated as the same
//! separator, since the upstream compiler's exact casing convention for a
//! given intrinsic isn't specified.

use anyhow::{bail, Result};
use filly_core::graphics::{CastId, PictureId, WindowId, VIRTUAL_DESKTOP_HEIGHT, VIRTUAL_DESKTOP_WIDTH};
use filly_core::Value;
use log::warn;

use crate::engine::{fill_from_value, id_u32, rop_from_value, Engine};

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase().replace('_', "-")
}

fn arg_int(args: &[Value], i: usize) -> i64 {
    args.get(i).map(Value::as_int).unwrap_or(0)
}

fn arg_str(args: &[Value], i: usize) -> String {
    args.get(i).map(Value::as_str).unwrap_or_default()
}

pub(crate) fn dispatch(engine: &Engine, name: &str, args: &[Value]) -> Result<Value> {
    match normalize(name).as_str() {
        // -- Graphics (spec §4.9) -------------------------------------------
        "load-picture" => load_picture(engine, args),
        "create-picture" => {
            let mut render = engine.render.lock().unwrap();
            let id = render
                .renderer
                .create_picture(arg_int(args, 0).max(0) as u32, arg_int(args, 1).max(0) as u32);
            Ok(Value::Int(id.0 as i64))
        }
        "delete-picture" => {
            engine
                .render
                .lock()
                .unwrap()
                .renderer
                .delete_picture(PictureId(id_u32(args, 0)));
            Ok(Value::ZERO)
        }
        "open-window" => {
            let mut render = engine.render.lock().unwrap();
            let id = render.renderer.open_window(
                arg_int(args, 0) as i32,
                arg_int(args, 1) as i32,
                arg_int(args, 2).max(0) as u32,
                arg_int(args, 3).max(0) as u32,
            );
            Ok(Value::Int(id.0 as i64))
        }
        "move-window" => {
            engine.render.lock().unwrap().renderer.move_window(
                WindowId(id_u32(args, 0)),
                arg_int(args, 1) as i32,
                arg_int(args, 2) as i32,
            );
            Ok(Value::ZERO)
        }
        "close-window" => {
            engine
                .render
                .lock()
                .unwrap()
                .renderer
                .close_window(WindowId(id_u32(args, 0)));
            Ok(Value::ZERO)
        }
        "put-cast" => {
            let mut render = engine.render.lock().unwrap();
            let key = filly_core::graphics::Rgb::new(
                arg_int(args, 4).clamp(0, 255) as u8,
                arg_int(args, 5).clamp(0, 255) as u8,
                arg_int(args, 6).clamp(0, 255) as u8,
            );
            let id = render.renderer.put_cast(
                WindowId(id_u32(args, 0)),
                PictureId(id_u32(args, 1)),
                arg_int(args, 2) as i32,
                arg_int(args, 3) as i32,
                key,
            );
            Ok(Value::Int(id.0 as i64))
        }
        "move-cast" => {
            engine.render.lock().unwrap().renderer.move_cast(
                CastId(id_u32(args, 0)),
                arg_int(args, 1) as i32,
                arg_int(args, 2) as i32,
            );
            Ok(Value::ZERO)
        }
        "draw-line" => {
            let mut render = engine.render.lock().unwrap();
            let rop = rop_from_value(args.get(5).unwrap_or(&Value::ZERO));
            render.renderer.draw_line(
                PictureId(id_u32(args, 0)),
                arg_int(args, 1) as i32,
                arg_int(args, 2) as i32,
                arg_int(args, 3) as i32,
                arg_int(args, 4) as i32,
                rop,
            );
            Ok(Value::ZERO)
        }
        "draw-rect" => {
            let mut render = engine.render.lock().unwrap();
            let fill = fill_from_value(args.get(5).unwrap_or(&Value::ZERO));
            let rop = rop_from_value(args.get(6).unwrap_or(&Value::ZERO));
            render.renderer.draw_rect(
                PictureId(id_u32(args, 0)),
                arg_int(args, 1) as i32,
                arg_int(args, 2) as i32,
                arg_int(args, 3).max(0) as u32,
                arg_int(args, 4).max(0) as u32,
                fill,
                rop,
            );
            Ok(Value::ZERO)
        }
        "draw-circle" => {
            let mut render = engine.render.lock().unwrap();
            let fill = fill_from_value(args.get(4).unwrap_or(&Value::ZERO));
            let rop = rop_from_value(args.get(5).unwrap_or(&Value::ZERO));
            render.renderer.draw_circle(
                PictureId(id_u32(args, 0)),
                arg_int(args, 1) as i32,
                arg_int(args, 2) as i32,
                arg_int(args, 3).max(0) as u32,
                fill,
                rop,
            );
            Ok(Value::ZERO)
        }
        "win-info" => {
            let axis = arg_int(args, 0);
            Ok(Value::Int(if axis == 0 {
                VIRTUAL_DESKTOP_WIDTH
            } else {
                VIRTUAL_DESKTOP_HEIGHT
            }))
        }

        // -- Text (spec §4.9) -------------------------------------------------
        "font" => {
            engine.render.lock().unwrap().font = arg_str(args, 0);
            Ok(Value::ZERO)
        }
        "colour" | "color" => {
            let mut render = engine.render.lock().unwrap();
            render.colour = filly_core::graphics::Rgb::new(
                arg_int(args, 0).clamp(0, 255) as u8,
                arg_int(args, 1).clamp(0, 255) as u8,
                arg_int(args, 2).clamp(0, 255) as u8,
            );
            Ok(Value::ZERO)
        }
        "back-mode" => {
            engine.render.lock().unwrap().back_mode = arg_int(args, 0) != 0;
            Ok(Value::ZERO)
        }
        "write" => {
            let text = arg_str(args, 3);
            let render = engine.render.lock().unwrap();
            let (w, h) = render.renderer.measure_text(&render.font, &text);
            drop(render);
            // No Renderer method draws text onto a picture; measuring is all
            // the core can do without a backend (spec §1 Non-goals).
            log::debug!("write({w}x{h}): {text:?}");
            Ok(Value::ZERO)
        }

        // -- Audio (spec §4.9) ------------------------------------------------
        "play-wave" => play_wave(engine, &arg_str(args, 0)),
        "play-midi" => play_midi(engine, &arg_str(args, 0)),
        "load-rsc" => load_rsc(engine, &arg_str(args, 0)),
        "play-rsc" => play_rsc(engine, arg_int(args, 0)),
        "del-rsc" => {
            let deleted = engine.resources.lock().unwrap().delete(arg_int(args, 0));
            Ok(Value::Int(if deleted { 0 } else { -1 }))
        }

        // -- Filesystem (spec §4.9) -------------------------------------------
        "file-open" => file_open(engine, &arg_str(args, 0), arg_int(args, 1)),
        "file-close" => {
            engine.bin_files.lock().unwrap().close(arg_int(args, 0))?;
            Ok(Value::ZERO)
        }
        "file-seek" => {
            engine
                .bin_files
                .lock()
                .unwrap()
                .seek(arg_int(args, 0), arg_int(args, 1).max(0) as u64)?;
            Ok(Value::ZERO)
        }
        "file-read-int" => {
            let v = engine
                .bin_files
                .lock()
                .unwrap()
                .read_int(arg_int(args, 0), arg_int(args, 1).clamp(1, 4) as u8)?;
            Ok(Value::Int(v))
        }
        "file-write-int" => {
            engine.bin_files.lock().unwrap().write_int(
                arg_int(args, 0),
                arg_int(args, 1),
                arg_int(args, 2).clamp(1, 4) as u8,
            )?;
            Ok(Value::ZERO)
        }
        "file-read-str" => {
            let s = engine.bin_files.lock().unwrap().read_cstr(arg_int(args, 0))?;
            Ok(Value::Str(s))
        }
        "file-write-str" => {
            engine
                .bin_files
                .lock()
                .unwrap()
                .write_cstr(arg_int(args, 0), &arg_str(args, 1))?;
            Ok(Value::ZERO)
        }
        "ini-read-int" => {
            let ini = crate::persistence::ini::IniFile::open(arg_str(args, 0));
            Ok(Value::Int(ini.get_int(&arg_str(args, 1), &arg_str(args, 2), arg_int(args, 3))))
        }
        "ini-read-str" => {
            let ini = crate::persistence::ini::IniFile::open(arg_str(args, 0));
            Ok(Value::Str(ini.get_str(&arg_str(args, 1), &arg_str(args, 2), &arg_str(args, 3))))
        }
        "ini-write-int" => {
            let mut ini = crate::persistence::ini::IniFile::open(arg_str(args, 0));
            ini.set_int(&arg_str(args, 1), &arg_str(args, 2), arg_int(args, 3));
            ini.save()?;
            Ok(Value::ZERO)
        }
        "ini-write-str" => {
            let mut ini = crate::persistence::ini::IniFile::open(arg_str(args, 0));
            ini.set_str(&arg_str(args, 1), &arg_str(args, 2), &arg_str(args, 3));
            ini.save()?;
            Ok(Value::ZERO)
        }
        "file-copy" => {
            std::fs::copy(arg_str(args, 0), arg_str(args, 1))?;
            Ok(Value::ZERO)
        }
        "file-delete" => {
            std::fs::remove_file(arg_str(args, 0))?;
            Ok(Value::ZERO)
        }
        "mkdir" => {
            std::fs::create_dir_all(arg_str(args, 0))?;
            Ok(Value::ZERO)
        }
        "rmdir" => {
            std::fs::remove_dir(arg_str(args, 0))?;
            Ok(Value::ZERO)
        }
        "chdir" => {
            std::env::set_current_dir(arg_str(args, 0))?;
            Ok(Value::ZERO)
        }
        "getcwd" => Ok(Value::Str(
            std::env::current_dir()?.to_string_lossy().into_owned(),
        )),

        // -- Bitops (spec §4.9) -----------------------------------------------
        "make-long" => {
            let hi = (arg_int(args, 0) as u32 & 0xFFFF) << 16;
            let lo = arg_int(args, 1) as u32 & 0xFFFF;
            Ok(Value::Int((hi | lo) as i64))
        }
        "hi-word" => Ok(Value::Int((arg_int(args, 0) as u32 >> 16) as i64 & 0xFFFF)),
        "low-word" => Ok(Value::Int(arg_int(args, 0) & 0xFFFF)),

        // -- Time (spec §4.9) -------------------------------------------------
        "sys-time" => Ok(Value::Int(chrono::Utc::now().timestamp())),
        "day" => Ok(Value::Int(chrono::Utc::now().format("%d").to_string().parse().unwrap_or(0))),
        "hour" => Ok(Value::Int(chrono::Utc::now().format("%H").to_string().parse().unwrap_or(0))),
        "min" => Ok(Value::Int(chrono::Utc::now().format("%M").to_string().parse().unwrap_or(0))),
        "sec" => Ok(Value::Int(chrono::Utc::now().format("%S").to_string().parse().unwrap_or(0))),

        // -- PRNG (spec §4.9) -------------------------------------------------
        "random" => {
            let max = arg_int(args, 0);
            if max <= 0 {
                return Ok(Value::ZERO);
            }
            use rand::Rng;
            Ok(Value::Int(rand::thread_rng().gen_range(0..max)))
        }

        _ => bail!("unknown intrinsic `{name}`"),
    }
}

fn load_picture(engine: &Engine, args: &[Value]) -> Result<Value> {
    let path = arg_str(args, 0);
    if !engine.assets.exists(&path) {
        warn!("missing asset for load-picture: {path}");
        return Ok(Value::Int(-1));
    }
    let mut render = engine.render.lock().unwrap();
    match render.renderer.load_picture(&path) {
        Ok(id) => Ok(Value::Int(id.0 as i64)),
        Err(e) => {
            warn!("load-picture {path} failed: {e}");
            Ok(Value::Int(-1))
        }
    }
}

fn play_wave(engine: &Engine, path: &str) -> Result<Value> {
    let Ok(bytes) = engine.assets.read(path) else {
        warn!("missing asset for play-wave: {path}");
        return Ok(Value::Int(-1));
    };
    match crate::resources::decode_wav(&bytes) {
        Ok(wav) => {
            engine.audio.lock().unwrap().push(&wav.samples)?;
            Ok(Value::ZERO)
        }
        Err(e) => {
            warn!("play-wave {path} failed to decode: {e}");
            Ok(Value::Int(-1))
        }
    }
}

fn play_midi(engine: &Engine, path: &str) -> Result<Value> {
    let Ok(bytes) = engine.assets.read(path) else {
        warn!("missing asset for play-midi: {path}");
        return Ok(Value::Int(-1));
    };
    match engine.midi.lock().unwrap().play(&bytes, engine.headless) {
        Ok(()) => Ok(Value::ZERO),
        Err(e) => {
            warn!("play-midi {path} failed: {e}");
            Ok(Value::Int(-1))
        }
    }
}

fn load_rsc(engine: &Engine, path: &str) -> Result<Value> {
    let Ok(bytes) = engine.assets.read(path) else {
        warn!("missing asset for load-rsc: {path}");
        return Ok(Value::Int(-1));
    };
    match crate::resources::decode_wav(&bytes) {
        Ok(wav) => Ok(Value::Int(engine.resources.lock().unwrap().insert(wav))),
        Err(e) => {
            warn!("load-rsc {path} failed to decode: {e}");
            Ok(Value::Int(-1))
        }
    }
}

fn play_rsc(engine: &Engine, handle: i64) -> Result<Value> {
    let resources = engine.resources.lock().unwrap();
    let Some(wav) = resources.get(handle) else {
        warn!("play-rsc: unknown resource handle {handle}");
        return Ok(Value::Int(-1));
    };
    let samples = wav.samples.clone();
    drop(resources);
    engine.audio.lock().unwrap().push(&samples)?;
    Ok(Value::ZERO)
}

fn file_open(engine: &Engine, path: &str, mode: i64) -> Result<Value> {
    use crate::persistence::binfile::OpenMode;
    let mode = match mode {
        0 => OpenMode::Read,
        1 => OpenMode::Write,
        _ => OpenMode::ReadWrite,
    };
    let handle = engine.bin_files.lock().unwrap().open(path, mode)?;
    Ok(Value::Int(handle))
}
