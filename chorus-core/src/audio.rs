//! Audio loading: decode to mono PCM at the pipeline rate.

use crate::error::{AudioError, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Pipeline sample rate (32kHz).
pub const SAMPLE_RATE: u32 = 32_000;

/// Recognized audio file extensions.
pub const AUDIO_EXTENSIONS: &[&str] = &["ogg", "wav", "flac", "mp3", "aiff", "aif"];

/// True if the path carries a recognized audio extension.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an audio file to mono f32 samples at 32kHz.
///
/// Multi-channel sources are mixed down by averaging. Sources at a different
/// rate are resampled; inputs are nominally pre-resampled to 32kHz, but the
/// rate is validated rather than trusted.
///
/// # Errors
///
/// Returns [`AudioError`] if the file cannot be probed or decoded, holds no
/// audio track, or yields no samples.
pub fn decode_file(path: impl AsRef<Path>) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let (samples, rate, channels) = decode_native(path)?;

    let mono = mix_to_mono(&samples, channels);
    if mono.is_empty() {
        return Err(AudioError::Empty {
            path: path.display().to_string(),
        }
        .into());
    }

    if rate == SAMPLE_RATE {
        return Ok(mono);
    }

    warn!(
        path = %path.display(),
        rate,
        expected = SAMPLE_RATE,
        "unexpected sample rate, resampling"
    );
    let resampled = resample(&mono, rate, path)?;
    Ok(resampled)
}

/// Duration in seconds of a mono sample sequence at the pipeline rate.
pub fn duration_secs(samples: &[f32]) -> f32 {
    samples.len() as f32 / SAMPLE_RATE as f32
}

/// Decode a file to interleaved f32 samples at its native rate.
fn decode_native(path: &Path) -> std::result::Result<(Vec<f32>, u32, u16), AudioError> {
    let path_str = path.display().to_string();
    let decode_err = |reason: String| AudioError::Decode {
        path: path_str.clone(),
        reason,
    };

    let file = File::open(path).map_err(|e| decode_err(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err(format!("probe failed: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::NoTrack {
            path: path_str.clone(),
        })?;
    let track_id = track.id;

    let rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| decode_err("sample rate missing from codec parameters".into()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| decode_err("channel layout missing from codec parameters".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                if samples.is_empty() {
                    return Err(decode_err(format!("packet read failed: {e}")));
                }
                warn!(path = %path_str, error = %e, "truncated stream, keeping decoded prefix");
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if sample_buf.is_none() {
                    let spec = *decoded.spec();
                    sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // Bad packet inside an otherwise good stream
                warn!(path = %path_str, error = %e, "skipping undecodable packet");
                continue;
            }
            Err(e) => {
                if samples.is_empty() {
                    return Err(decode_err(format!("decode failed: {e}")));
                }
                warn!(path = %path_str, error = %e, "decoder stopped, keeping decoded prefix");
                break;
            }
        }
    }

    debug!(
        path = %path_str,
        rate,
        channels,
        frames = samples.len() / channels.max(1) as usize,
        "decoded audio"
    );

    Ok((samples, rate, channels))
}

/// Average interleaved channels down to mono.
fn mix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 | 1 => samples.to_vec(),
        n => samples
            .chunks(n as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect(),
    }
}

/// Resample mono audio to the pipeline rate.
fn resample(input: &[f32], from: u32, path: &Path) -> std::result::Result<Vec<f32>, AudioError> {
    let resample_err = |reason: String| AudioError::Resample {
        path: path.display().to_string(),
        from,
        reason,
    };

    let ratio = SAMPLE_RATE as f64 / from as f64;
    let mut resampler =
        FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, input.len(), 1)
            .map_err(|e| resample_err(e.to_string()))?;

    let mut output = resampler
        .process(&[input], None)
        .map_err(|e| resample_err(e.to_string()))?;

    output
        .pop()
        .filter(|channel| !channel.is_empty())
        .ok_or_else(|| resample_err("resampler produced no output".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use rustfft::{num_complex::Complex, FftPlanner};
    use std::f32::consts::PI;
    use std::path::PathBuf;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[f32]) {
        let spec = WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &sample in samples {
            writer.write_sample((sample * 32768.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn sine(freq: f32, rate: u32, secs: f32) -> Vec<f32> {
        let n = (rate as f32 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin() * 0.8)
            .collect()
    }

    /// Frequency of the strongest FFT bin over the first `n_fft` samples.
    fn dominant_frequency(samples: &[f32], n_fft: usize) -> f32 {
        let mut buffer: Vec<Complex<f32>> = samples[..n_fft]
            .iter()
            .map(|&s| Complex::new(s, 0.0))
            .collect();
        FftPlanner::new().plan_fft_forward(n_fft).process(&mut buffer);

        let peak = buffer[..n_fft / 2]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(i, _)| i)
            .unwrap();
        peak as f32 * SAMPLE_RATE as f32 / n_fft as f32
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(name)
    }

    #[test]
    fn round_trips_sine_fundamental() {
        let path = temp_path("chorus_sine_32k.wav");
        write_wav(&path, SAMPLE_RATE, 1, &sine(440.0, SAMPLE_RATE, 2.0));

        let decoded = decode_file(&path).unwrap();

        let n_fft = 32768;
        let bin_width = SAMPLE_RATE as f32 / n_fft as f32;
        let peak = dominant_frequency(&decoded, n_fft);
        assert!(
            (peak - 440.0).abs() <= bin_width,
            "peak {peak}Hz off by more than one bin"
        );

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn mixes_stereo_to_mono() {
        let path = temp_path("chorus_stereo.wav");
        // Left 0.4, right 0.0 → mono 0.2
        let interleaved: Vec<f32> = (0..2000).flat_map(|_| [0.4, 0.0]).collect();
        write_wav(&path, SAMPLE_RATE, 2, &interleaved);

        let decoded = decode_file(&path).unwrap();

        assert_eq!(decoded.len(), 2000);
        assert!((decoded[1000] - 0.2).abs() < 0.01);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn resamples_deviant_rate() {
        let path = temp_path("chorus_16k.wav");
        write_wav(&path, 16_000, 1, &sine(440.0, 16_000, 1.0));

        let decoded = decode_file(&path).unwrap();

        // 1s of audio at any source rate is ~32000 samples after resampling
        let expected = SAMPLE_RATE as usize;
        assert!(
            (decoded.len() as i64 - expected as i64).unsigned_abs() < expected as u64 / 20,
            "got {} samples, expected about {}",
            decoded.len(),
            expected
        );

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_corrupt_file() {
        let path = temp_path("chorus_corrupt.ogg");
        std::fs::write(&path, b"this is not an audio container").unwrap();

        let result = decode_file(&path);

        assert!(matches!(result, Err(crate::error::Error::Audio(_))));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn recognizes_audio_extensions() {
        assert!(is_audio_file(Path::new("a/b/XC12345.ogg")));
        assert!(is_audio_file(Path::new("clip.WAV")));
        assert!(!is_audio_file(Path::new("train.csv")));
        assert!(!is_audio_file(Path::new("noext")));
    }
}
