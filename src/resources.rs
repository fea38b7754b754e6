//! `play-wave`/`load-rsc`/`play-rsc`/`del-rsc` (spec §4.9 "audio"): a tiny
//! RIFF/WAVE PCM16 decoder and a handle-keyed cache of the decoded samples,
//! since the asset loader only hands back raw bytes. Decoded samples are fed
//! straight to the configured `AudioSink` at its already-open sample rate;
//! no resampling or mixing with concurrent MIDI playback is attempted, the
//! same narrow, no-ecosystem-crate-fits scope as the INI/binary persistence.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use log::debug;

#[derive(Clone, Debug)]
pub struct DecodedWav {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

/// Parses a canonical `RIFF....WAVEfmt ....data....` container with a
/// 16-bit PCM `fmt ` chunk. Anything else (float PCM, ADPCM, extended fmt
/// chunks) is rejected rather than silently mis-decoded.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedWav> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        bail!("not a RIFF/WAVE file");
    }
    let mut pos = 12;
    let mut sample_rate = None;
    let mut channels = None;
    let mut bits_per_sample = None;
    let mut format_tag = None;
    let mut samples = None;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_size = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
        let body_start = pos + 8;
        let body_end = (body_start + chunk_size).min(bytes.len());
        let body = &bytes[body_start..body_end];

        match chunk_id {
            b"fmt " => {
                if body.len() < 16 {
                    bail!("fmt chunk too short");
                }
                format_tag = Some(u16::from_le_bytes(body[0..2].try_into().unwrap()));
                channels = Some(u16::from_le_bytes(body[2..4].try_into().unwrap()));
                sample_rate = Some(u32::from_le_bytes(body[4..8].try_into().unwrap()));
                bits_per_sample = Some(u16::from_le_bytes(body[14..16].try_into().unwrap()));
            }
            b"data" => {
                samples = Some(body.to_vec());
            }
            _ => {}
        }
        // Chunks are padded to an even byte boundary.
        pos = body_start + chunk_size + (chunk_size % 2);
    }

    let format_tag = format_tag.context("missing fmt chunk")?;
    if format_tag != 1 {
        bail!("unsupported WAVE format tag {format_tag}, only PCM (1) is supported");
    }
    let bits = bits_per_sample.context("missing fmt chunk")?;
    if bits != 16 {
        bail!("unsupported bits-per-sample {bits}, only 16-bit PCM is supported");
    }
    let channels = channels.context("missing fmt chunk")?;
    let sample_rate = sample_rate.context("missing fmt chunk")?;
    let data = samples.context("missing data chunk")?;

    let samples: Vec<f32> = data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect();

    Ok(DecodedWav {
        sample_rate,
        channels,
        samples,
    })
}

/// Handle-keyed cache backing `load-rsc`/`play-rsc`/`del-rsc`.
#[derive(Default)]
pub struct ResourceCache {
    next_handle: i64,
    resources: HashMap<i64, DecodedWav>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            resources: HashMap::new(),
        }
    }

    pub fn insert(&mut self, wav: DecodedWav) -> i64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        debug!(
            "cached resource {handle}: {} samples at {}Hz",
            wav.samples.len(),
            wav.sample_rate
        );
        self.resources.insert(handle, wav);
        handle
    }

    pub fn get(&self, handle: i64) -> Option<&DecodedWav> {
        self.resources.get(&handle)
    }

    pub fn delete(&mut self, handle: i64) -> bool {
        self.resources.remove(&handle).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_wav(samples: &[i16]) -> Vec<u8> {
        let mut data = Vec::new();
        for s in samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&1u16.to_le_bytes()); // PCM
        fmt.extend_from_slice(&1u16.to_le_bytes()); // mono
        fmt.extend_from_slice(&44_100u32.to_le_bytes());
        fmt.extend_from_slice(&(44_100u32 * 2).to_le_bytes()); // byte rate
        fmt.extend_from_slice(&2u16.to_le_bytes()); // block align
        fmt.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&0u32.to_le_bytes()); // size placeholder
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
        out.extend_from_slice(&fmt);
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&data);
        out
    }

    #[test]
    fn decodes_pcm16_mono() {
        let bytes = make_wav(&[0, i16::MAX, i16::MIN]);
        let wav = decode_wav(&bytes).unwrap();
        assert_eq!(wav.channels, 1);
        assert_eq!(wav.sample_rate, 44_100);
        assert_eq!(wav.samples.len(), 3);
        assert!((wav.samples[1] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn rejects_non_riff_bytes() {
        assert!(decode_wav(b"not a wave file").is_err());
    }

    #[test]
    fn cache_round_trips_by_handle() {
        let mut cache = ResourceCache::new();
        let handle = cache.insert(decode_wav(&make_wav(&[1, 2, 3])).unwrap());
        assert!(cache.get(handle).is_some());
        assert!(cache.delete(handle));
        assert!(cache.get(handle).is_none());
    }
}
