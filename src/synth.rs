//! The only `Synth` this crate ships. A real SoundFont-backed synthesizer is
//! an external collaborator per spec §6 ("treated as a black-box sample
//! generator... the spec names the interface but does not design it") — the
//! same treatment as `Renderer`/`NullRenderer`. This implementation loads
//! and keeps the raw SoundFont bytes (so a future backend swap has
//! somewhere to read them from) but renders silence.

use filly_core::traits::Synth;
use log::debug;

pub struct NullSynth {
    _soundfont: Vec<u8>,
    sample_rate: u32,
}

impl NullSynth {
    pub fn new(soundfont: Vec<u8>, sample_rate: u32) -> Self {
        debug!("null synth loaded {} soundfont bytes", soundfont.len());
        Self {
            _soundfont: soundfont,
            sample_rate,
        }
    }
}

impl Synth for NullSynth {
    fn send(&mut self, _message: &[u8]) {}

    fn render(&mut self, buffer: &mut [f32]) -> usize {
        buffer.fill(0.0);
        buffer.len() / 2
    }

    fn active_voice_count(&self) -> usize {
        0
    }
}

impl NullSynth {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_silence_and_reports_no_active_voices() {
        let mut synth = NullSynth::new(vec![1, 2, 3], 44_100);
        let mut buf = vec![1.0f32; 8];
        let written = synth.render(&mut buf);
        assert_eq!(written, 4);
        assert!(buf.iter().all(|&s| s == 0.0));
        assert_eq!(synth.active_voice_count(), 0);
    }
}
