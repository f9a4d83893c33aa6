//! Opus packet decoding for Ogg and WebM tracks.
//!
//! symphonia demuxes both containers but ships no Opus codec, so tracks
//! tagged `CODEC_TYPE_OPUS` are decoded here through libopus.

use opus::{Channels, Decoder};

use super::AudioValidationError;

/// Opus streams always decode at 48 kHz
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Longest Opus packet: 120 ms at 48 kHz
const MAX_PACKET_SAMPLES: usize = 5760;

/// Decodes one Opus track to mono, dropping the encoder's pre-skip
pub struct OpusStream {
    decoder: Decoder,
    pcm: Vec<f32>,
    pending_skip: usize,
}

impl OpusStream {
    pub fn new(pre_skip: u32) -> Result<Self, AudioValidationError> {
        // libopus downmixes stereo streams when asked for mono output
        let decoder = Decoder::new(OPUS_SAMPLE_RATE, Channels::Mono)
            .map_err(|e| AudioValidationError::CorruptAudio(format!("opus init: {}", e)))?;

        Ok(Self {
            decoder,
            pcm: vec![0.0; MAX_PACKET_SAMPLES],
            pending_skip: pre_skip as usize,
        })
    }

    /// Decode one packet onto `out`, returning how many samples were appended
    pub fn decode_packet(&mut self, packet: &[u8], out: &mut Vec<f32>) -> Result<usize, opus::Error> {
        let decoded = self.decoder.decode_float(packet, &mut self.pcm, false)?;
        let skip = self.pending_skip.min(decoded);
        self.pending_skip -= skip;
        out.extend_from_slice(&self.pcm[skip..decoded]);
        Ok(decoded - skip)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{tone_packets, PRE_SKIP};
    use super::*;

    #[test]
    fn test_decodes_packets_and_drops_pre_skip() {
        let packets = tone_packets(220.0, 0.2);
        let mut stream = OpusStream::new(PRE_SKIP as u32).unwrap();
        let mut out = Vec::new();

        let first = stream.decode_packet(&packets[0], &mut out).unwrap();
        assert_eq!(first, 960 - PRE_SKIP as usize);

        for packet in &packets[1..] {
            assert_eq!(stream.decode_packet(packet, &mut out).unwrap(), 960);
        }
        assert_eq!(out.len(), packets.len() * 960 - PRE_SKIP as usize);

        let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.2 && peak < 1.0, "peak {}", peak);
    }

    #[test]
    fn test_garbage_packet_is_an_error() {
        let mut stream = OpusStream::new(0).unwrap();
        let mut out = Vec::new();
        // Code 3 packet claiming 0 frames is malformed
        assert!(stream.decode_packet(&[0xfb, 0x00], &mut out).is_err());
        assert!(out.is_empty());
    }
}
