use filly_core::traits::AudioSink;
use log::debug;

/// Discards every sample pushed to it. Used for `--headless` runs and for
/// tests that exercise the MIDI Player without a real output device.
#[derive(Default)]
pub struct NullAudioSink {
    open: bool,
    volume: f32,
}

impl NullAudioSink {
    pub fn new() -> Self {
        Self {
            open: false,
            volume: 1.0,
        }
    }
}

impl AudioSink for NullAudioSink {
    fn open(&mut self, sample_rate: u32, channels: u16) -> anyhow::Result<()> {
        debug!("null audio sink opened at {sample_rate}Hz, {channels}ch");
        self.open = true;
        Ok(())
    }

    fn push(&mut self, _samples: &[f32]) -> anyhow::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.open = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn is_finished(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_without_open_never_panics() {
        let mut sink = NullAudioSink::new();
        assert!(sink.push(&[0.0; 16]).is_ok());
        assert!(sink.is_finished());
    }
}
