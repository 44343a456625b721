//! WAV encoding of finished utterances, plus the optional on-disk archive.
//!
//! Recorded audio is handed to the speech-to-text engine as a complete,
//! playable 16-bit PCM mono WAV file held in memory.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("WAV codec error: {0}")]
    Codec(#[from] hound::Error),

    #[error("unsupported WAV layout: {0}")]
    Unsupported(String),

    #[error("failed to write recording: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode mono 16-bit samples as an in-memory WAV file.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, WavError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Decode a 16-bit integer PCM WAV into mono samples and its sample rate.
///
/// Multi-channel input is averaged down to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<i16>, u32), WavError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(WavError::Unsupported(format!(
            "{:?} at {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let interleaved = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()?;

    let channels = spec.channels.max(1) as usize;
    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

/// Write `wav` into `dir` as `utterance-<unix-ms>.wav`, creating the
/// directory when needed.  Returns the path written.
pub fn archive_recording(dir: &Path, wav: &[u8]) -> Result<PathBuf, WavError> {
    std::fs::create_dir_all(dir)?;
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let path = dir.join(format!("utterance-{millis}.wav"));
    std::fs::write(&path, wav)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_wav_has_riff_header_and_decodes() {
        let samples: Vec<i16> = (0..1600).map(|i| ((i % 200) as i16 - 100) * 50).collect();
        let wav = encode_wav(&samples, 16_000).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte canonical header + 2 bytes per sample.
        assert_eq!(wav.len(), 44 + samples.len() * 2);

        let (decoded, rate) = decode_wav(&wav).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(decoded, samples);
    }

    #[test]
    fn empty_recording_is_still_a_valid_file() {
        let wav = encode_wav(&[], 16_000).unwrap();
        let (decoded, _) = decode_wav(&wav).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn stereo_input_is_downmixed() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [100_i16, 300, -200, -400] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let (mono, rate) = decode_wav(&cursor.into_inner()).unwrap();
        assert_eq!(rate, 8_000);
        assert_eq!(mono, vec![200, -300]);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(decode_wav(b"not a wav file"), Err(WavError::Codec(_))));
    }

    #[test]
    fn archive_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("recordings");
        let wav = encode_wav(&[1, 2, 3], 16_000).unwrap();

        let path = archive_recording(&target, &wav).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("utterance-") && name.ends_with(".wav"), "{name}");
        assert_eq!(std::fs::read(&path).unwrap(), wav);
    }
}
