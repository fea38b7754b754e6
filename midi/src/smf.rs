//! Standard MIDI File parsing: tempo-map extraction and the absolute-tick
//! event list the [`MidiPlayer`](crate::player::MidiPlayer) feeds to the
//! synth (spec §4.7 steps 1-2).

use anyhow::{bail, Context, Result};
use midly::{MetaMessage, Smf, Timing, TrackEventKind};

use crate::tempo::{TempoEvent, TempoMap};

/// A MIDI channel-voice message at an absolute tick, already resolved from
/// the file's relative-delta encoding.
#[derive(Clone, Debug)]
pub struct ScheduledEvent {
    pub tick: u32,
    pub channel: u8,
    /// Raw channel-voice bytes (status, data1, data2) ready for `Synth::send`.
    pub message: Vec<u8>,
}

#[derive(Debug)]
pub struct ParsedSmf {
    pub ppq: u32,
    pub tempo_map: TempoMap,
    pub events: Vec<ScheduledEvent>,
    pub last_tick: u32,
}

/// Parses raw SMF bytes. A malformed header is a fatal parse error (spec §7,
/// §4.7 step 1).
pub fn parse(bytes: &[u8]) -> Result<ParsedSmf> {
    let smf = Smf::parse(bytes).context("malformed MIDI file header")?;
    let ppq = match smf.header.timing {
        Timing::Metrical(ticks_per_beat) => ticks_per_beat.as_int() as u32,
        Timing::Timecode(..) => bail!("SMPTE timecode timing is not supported"),
    };

    let mut tempo_events = Vec::new();
    let mut events = Vec::new();
    let mut last_tick = 0u32;

    for track in &smf.tracks {
        let mut tick: u32 = 0;
        for ev in track {
            tick += ev.delta.as_int();
            match &ev.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(micros_per_beat)) => {
                    tempo_events.push(TempoEvent {
                        tick,
                        micros_per_beat: micros_per_beat.as_int(),
                    });
                }
                TrackEventKind::Midi { channel, message } => {
                    let mut bytes = Vec::with_capacity(3);
                    message.write(*channel, &mut bytes).ok();
                    events.push(ScheduledEvent {
                        tick,
                        channel: channel.as_int(),
                        message: bytes,
                    });
                    last_tick = last_tick.max(tick);
                }
                _ => {}
            }
        }
        last_tick = last_tick.max(tick);
    }

    events.sort_by_key(|e| e.tick);

    Ok(ParsedSmf {
        ppq,
        tempo_map: TempoMap::new(tempo_events),
        events,
        last_tick,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_smf_bytes() -> Vec<u8> {
        // One track, PPQ 480, a single tempo meta event (120 BPM) followed
        // by a note-on/note-off pair and an end-of-track marker.
        let mut smf = Smf::new(midly::Header::new(
            midly::Format::SingleTrack,
            Timing::Metrical(480.into()),
        ));
        let track = vec![
            midly::TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(500_000.into())),
            },
            midly::TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Midi {
                    channel: 0.into(),
                    message: midly::MidiMessage::NoteOn {
                        key: 60.into(),
                        vel: 100.into(),
                    },
                },
            },
            midly::TrackEvent {
                delta: 480.into(),
                kind: TrackEventKind::Midi {
                    channel: 0.into(),
                    message: midly::MidiMessage::NoteOff {
                        key: 60.into(),
                        vel: 0.into(),
                    },
                },
            },
            midly::TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ];
        smf.tracks.push(track);
        let mut buf = Vec::new();
        smf.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn parses_ppq_tempo_and_events() {
        let bytes = minimal_smf_bytes();
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.ppq, 480);
        assert_eq!(parsed.tempo_map.micros_per_beat_at(0), 500_000);
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.events[0].tick, 0);
        assert_eq!(parsed.events[1].tick, 480);
        assert_eq!(parsed.last_tick, 480);
    }

    #[test]
    fn malformed_header_is_an_error() {
        assert!(parse(b"not a midi file").is_err());
    }
}
