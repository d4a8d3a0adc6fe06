//! Microphone capture. The cpal callback thread reduces every input buffer
//! to one normalized loudness scalar and publishes it through a mutex; the
//! game loop polls the latest value once per frame and never blocks on it.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SizedSample, Stream, StreamConfig};
use log::{info, warn};

pub struct Microphone {
    stream: Option<Stream>,
    level: Arc<Mutex<f32>>,
}

impl Microphone {
    /// Open the default input device and start streaming. Fails when no
    /// device is present or the backend refuses the stream; the caller
    /// treats that as retryable, never fatal.
    pub fn acquire() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("no input device available"))?;
        info!(
            "input device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let supported = device.default_input_config()?;
        let config: StreamConfig = supported.config();
        let level = Arc::new(Mutex::new(0.0f32));

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, level.clone())?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, level.clone())?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, level.clone())?,
            cpal::SampleFormat::I8 => build_stream::<i8>(&device, &config, level.clone())?,
            cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, level.clone())?,
            cpal::SampleFormat::U8 => build_stream::<u8>(&device, &config, level.clone())?,
            cpal::SampleFormat::F64 => build_stream::<f64>(&device, &config, level.clone())?,
            other => return Err(anyhow!("unsupported input sample format '{other}'")),
        };
        stream.play()?;

        Ok(Self {
            stream: Some(stream),
            level,
        })
    }

    /// Latest loudness in [0, 1]. A poisoned lock reads as silence.
    pub fn level(&self) -> f32 {
        self.level.lock().map(|l| *l).unwrap_or(0.0)
    }

    /// Kick a paused pipeline back into motion. Safe to call on a stream
    /// that is already running.
    pub fn resume(&self) {
        if let Some(stream) = &self.stream {
            if let Err(err) = stream.play() {
                warn!("could not resume input stream: {err}");
            }
        }
    }

    /// Drop the stream. Idempotent; also runs on Drop.
    pub fn release(&mut self) {
        if self.stream.take().is_some() {
            info!("microphone released");
        }
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.release();
    }
}

fn build_stream<T>(device: &Device, config: &StreamConfig, level: Arc<Mutex<f32>>) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let err_fn = |err| warn!("input stream error: {err}");
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let loud = loudness(data);
            if let Ok(mut l) = level.lock() {
                *l = loud;
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Reduce a buffer to normalized loudness: RMS scaled so a full-scale sine
/// reads 1.0, clamped into [0, 1].
fn loudness<T>(data: &[T]) -> f32
where
    T: SizedSample,
    f32: FromSample<T>,
{
    if data.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for &s in data {
        let v = f32::from_sample(s) as f64;
        sum += v * v;
    }
    let rms = (sum / data.len() as f64).sqrt() as f32;
    (rms * std::f32::consts::SQRT_2).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_zero() {
        assert_eq!(loudness::<f32>(&[]), 0.0);
        assert_eq!(loudness(&[0.0f32; 256]), 0.0);
    }

    #[test]
    fn full_scale_sine_reads_one() {
        let buf: Vec<f32> = (0..4800)
            .map(|i| (2.0 * std::f32::consts::PI * i as f32 / 100.0).sin())
            .collect();
        let l = loudness(&buf);
        assert!((l - 1.0).abs() < 0.01, "got {l}");
    }

    #[test]
    fn loudness_is_clamped_and_monotonic_in_amplitude() {
        let quiet = loudness(&[0.05f32; 256]);
        let mid = loudness(&[0.3f32; 256]);
        let blown = loudness(&[4.0f32; 256]);
        assert!(quiet < mid);
        assert!(mid < 1.0);
        assert_eq!(blown, 1.0);
    }

    #[test]
    fn integer_samples_normalize_like_floats() {
        let l = loudness(&[i16::MAX / 2; 256]);
        assert!((l - loudness(&[0.5f32; 256])).abs() < 0.01);
    }
}
