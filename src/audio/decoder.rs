use std::io::Cursor;
use std::sync::atomic::AtomicBool;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL, CODEC_TYPE_OPUS};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use super::opus_stream::{OpusStream, OPUS_SAMPLE_RATE};
use super::{stop_requested, AudioAsset, AudioSource, AudioValidationError};

/// Mono PCM at the container's native sample rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count before downmixing
    pub channels: usize,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Codec for the selected track
enum TrackDecoder {
    Native {
        decoder: Box<dyn Decoder>,
        sample_buf: Option<SampleBuffer<f32>>,
    },
    Opus(OpusStream),
}

fn corrupt(stage: &str, e: impl std::fmt::Display) -> AudioValidationError {
    AudioValidationError::CorruptAudio(format!("{}: {}", stage, e))
}

/// Decode every packet of the asset's first audio track, downmixing to mono.
///
/// `stop_flag` is polled once per packet; when raised, decoding is abandoned.
pub fn decode(
    asset: &AudioAsset,
    stop_flag: Option<&AtomicBool>,
) -> Result<DecodedAudio, AudioValidationError> {
    let source: Box<dyn MediaSource> = match &asset.source {
        AudioSource::Path(path) => {
            if !path.exists() {
                return Err(AudioValidationError::NotFound(path.clone()));
            }
            Box::new(std::fs::File::open(path)?)
        }
        AudioSource::Buffer { data, .. } => Box::new(Cursor::new(data.clone())),
    };
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = asset.extension() {
        hint.with_extension(&ext);
    }
    if let Some(ref content_type) = asset.content_type {
        hint.mime_type(content_type);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| corrupt("probe", e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioValidationError::CorruptAudio("no audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let mut sample_rate = codec_params.sample_rate;
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut track_decoder = if codec_params.codec == CODEC_TYPE_OPUS {
        sample_rate = Some(OPUS_SAMPLE_RATE);
        TrackDecoder::Opus(OpusStream::new(codec_params.delay.unwrap_or(0))?)
    } else {
        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| corrupt("codec", e))?;
        TrackDecoder::Native {
            decoder,
            sample_buf: None,
        }
    };

    let mut mono: Vec<f32> = Vec::new();
    let mut skipped_frames = 0usize;

    loop {
        if stop_requested(stop_flag) {
            return Err(AudioValidationError::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(corrupt("packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match &mut track_decoder {
            TrackDecoder::Opus(stream) => {
                if let Err(e) = stream.decode_packet(packet.buf(), &mut mono) {
                    warn!(error = %e, "Skipping corrupt Opus packet");
                    skipped_frames += 1;
                }
            }
            TrackDecoder::Native {
                decoder,
                sample_buf,
            } => {
                let decoded = match decoder.decode(&packet) {
                    Ok(d) => d,
                    Err(SymphoniaError::DecodeError(e)) => {
                        warn!(error = %e, "Skipping corrupt audio frame");
                        skipped_frames += 1;
                        continue;
                    }
                    Err(e) => return Err(corrupt("decode", e)),
                };

                let spec = *decoded.spec();
                let num_frames = decoded.frames();
                if num_frames == 0 {
                    continue;
                }
                if sample_rate.is_none() {
                    sample_rate = Some(spec.rate);
                }
                let packet_channels = spec.channels.count().max(1);
                if channels == 0 {
                    channels = packet_channels;
                }

                let needs_alloc = sample_buf
                    .as_ref()
                    .map_or(true, |buf| buf.capacity() < num_frames * packet_channels);
                if needs_alloc {
                    *sample_buf = Some(SampleBuffer::<f32>::new(num_frames as u64, spec));
                }
                let Some(buf) = sample_buf.as_mut() else {
                    continue;
                };
                buf.copy_interleaved_ref(decoded);

                if packet_channels > 1 {
                    for frame in buf.samples().chunks(packet_channels) {
                        mono.push(frame.iter().sum::<f32>() / packet_channels as f32);
                    }
                } else {
                    mono.extend_from_slice(buf.samples());
                }
            }
        }
    }

    if mono.is_empty() {
        return Err(AudioValidationError::CorruptAudio(
            "no audio samples decoded".to_string(),
        ));
    }

    let sample_rate = sample_rate
        .ok_or_else(|| AudioValidationError::CorruptAudio("unknown sample rate".to_string()))?;

    debug!(
        samples = mono.len(),
        sample_rate,
        channels,
        skipped_frames,
        "Decoded {}",
        asset.display_name()
    );

    Ok(DecodedAudio {
        samples: mono,
        sample_rate,
        channels: channels.max(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::opus_stream::test_support::{expected_samples, ogg_opus_tone};
    use std::f32::consts::PI;

    fn wav_bytes(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let n = (sample_rate as f32 * seconds) as usize;
            for i in 0..n {
                let t = i as f32 / sample_rate as f32;
                let s = ((2.0 * PI * 220.0 * t).sin() * 0.5 * i16::MAX as f32) as i16;
                for _ in 0..channels {
                    writer.write_sample(s).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav_buffer() {
        let asset = AudioAsset::from_bytes(wav_bytes(16000, 1, 1.0), Some("tone.wav".into()));
        let decoded = decode(&asset, None).unwrap();

        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), 16000);
        assert!((decoded.duration_secs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_downmixes_stereo() {
        let asset = AudioAsset::from_bytes(wav_bytes(8000, 2, 0.5), Some("stereo.wav".into()));
        let decoded = decode(&asset, None).unwrap();

        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples.len(), 4000);
        let peak = decoded.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.01, "peak {}", peak);
    }

    #[test]
    fn test_decode_garbage_is_corrupt() {
        let asset = AudioAsset::from_bytes(vec![0x42u8; 4096], Some("noise.wav".into()));
        let err = decode(&asset, None).unwrap_err();
        assert!(matches!(err, AudioValidationError::CorruptAudio(_)));
    }

    #[test]
    fn test_decode_missing_path() {
        let asset = AudioAsset::from_path("/definitely/not/here.wav");
        let err = decode(&asset, None).unwrap_err();
        assert!(matches!(err, AudioValidationError::NotFound(_)));
    }

    #[test]
    fn test_decode_honours_stop_flag() {
        let flag = AtomicBool::new(true);
        let asset = AudioAsset::from_bytes(wav_bytes(16000, 1, 1.0), Some("tone.wav".into()));
        assert!(matches!(
            decode(&asset, Some(&flag)),
            Err(AudioValidationError::Cancelled)
        ));
    }

    #[test]
    fn test_decode_ogg_opus() {
        let asset = AudioAsset::from_bytes(ogg_opus_tone(220.0, 2.0), Some("voice.ogg".into()));
        let decoded = decode(&asset, None).unwrap();

        assert_eq!(decoded.sample_rate, OPUS_SAMPLE_RATE);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), expected_samples(2.0));

        let peak = decoded.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.2, "peak {}", peak);
    }

    #[test]
    fn test_decode_opus_upload_by_content_type() {
        let asset = AudioAsset::from_bytes(ogg_opus_tone(180.0, 1.0), None)
            .with_content_type("audio/ogg;codecs=opus");
        let decoded = decode(&asset, None).unwrap();
        assert_eq!(decoded.samples.len(), expected_samples(1.0));
    }
}
