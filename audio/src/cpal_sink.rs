use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, Stream, StreamConfig};
use crossbeam::queue::ArrayQueue;
use filly_core::traits::AudioSink;
use log::{debug, warn};

/// Holds roughly a quarter second of interleaved stereo samples at 44.1kHz;
/// generous enough that `push` rarely has to spin-wait on the cpal callback
/// draining it.
const QUEUE_CAPACITY: usize = 44_100 / 2;

/// A real output device, consuming samples `push`ed onto a lock-free queue
/// from the cpal render-thread callback (spec §6 `AudioSink`). Grounded on
/// the engine's `cpal` stream setup, adapted from that producer/consumer
/// queue design to this crate's push-based sink contract.
pub struct CpalAudioSink {
    stream: Option<Stream>,
    queue: Option<Arc<ArrayQueue<f32>>>,
    volume_bits: Arc<AtomicU32>,
}

impl Default for CpalAudioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalAudioSink {
    pub fn new() -> Self {
        Self {
            stream: None,
            queue: None,
            volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
        }
    }

    fn host_device_setup() -> anyhow::Result<(cpal::Device, cpal::SupportedStreamConfig)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("default output device is not available"))?;
        let config = device.default_output_config()?;
        Ok((device, config))
    }

    fn build_stream(
        device: &cpal::Device,
        config: &cpal::SupportedStreamConfig,
        queue: &Arc<ArrayQueue<f32>>,
        volume_bits: &Arc<AtomicU32>,
    ) -> anyhow::Result<Stream> {
        let stream_config: StreamConfig = config.clone().into();
        match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::stream_make::<f32>(&stream_config, device, queue, volume_bits)
            }
            other => anyhow::bail!("unsupported output sample format {other:?}"),
        }
    }

    fn stream_make<T>(
        config: &StreamConfig,
        device: &cpal::Device,
        queue: &Arc<ArrayQueue<f32>>,
        volume_bits: &Arc<AtomicU32>,
    ) -> anyhow::Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let queue = Arc::clone(queue);
        let volume_bits = Arc::clone(volume_bits);
        let err_fn = |err| warn!("output stream error: {err}");
        let stream = device.build_output_stream(
            config,
            move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
                let volume = f32::from_bits(volume_bits.load(Ordering::Relaxed));
                for slot in output.iter_mut() {
                    let sample = queue.pop().unwrap_or(0.0) * volume;
                    *slot = T::from_sample(sample);
                }
            },
            err_fn,
            None,
        )?;
        Ok(stream)
    }
}

impl AudioSink for CpalAudioSink {
    fn open(&mut self, sample_rate: u32, channels: u16) -> anyhow::Result<()> {
        let (device, config) = Self::host_device_setup()?;
        let device_rate = config.sample_rate().0;
        if device_rate != sample_rate {
            warn!(
                "output device runs at {device_rate}Hz, caller rendered at {sample_rate}Hz; no resampling is performed"
            );
        }
        let device_channels = config.channels();
        if device_channels != channels {
            warn!("output device has {device_channels} channels, caller rendered {channels}");
        }
        let queue = Arc::new(ArrayQueue::new(QUEUE_CAPACITY));
        let stream = Self::build_stream(&device, &config, &queue, &self.volume_bits)?;
        stream.play()?;
        debug!("cpal audio sink opened at {device_rate}Hz, {device_channels}ch");
        self.queue = Some(queue);
        self.stream = Some(stream);
        Ok(())
    }

    fn push(&mut self, samples: &[f32]) -> anyhow::Result<()> {
        let Some(queue) = &self.queue else {
            anyhow::bail!("push called before open");
        };
        for &sample in samples {
            let mut remaining = sample;
            let mut attempts = 0;
            while let Err(rejected) = queue.push(remaining) {
                remaining = rejected;
                attempts += 1;
                if attempts > 1000 {
                    anyhow::bail!("audio output queue stayed full; device may be stalled");
                }
                sleep(Duration::from_micros(500));
            }
        }
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.pause()?;
        }
        self.queue = None;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.queue.as_ref().map(|q| q.is_empty()).unwrap_or(true)
    }
}
