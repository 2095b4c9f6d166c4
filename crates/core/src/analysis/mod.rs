use std::{
    collections::VecDeque,
    f32::consts::PI,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{AudioConfig, CeremonyError, Result};

/// Magnitudes of one analysis window, one byte per frequency bin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyFrame {
    pub bins: Vec<u8>,
}

impl FrequencyFrame {
    /// Full-scale magnitude. Bar heights are normalised against this.
    pub const MAX_MAGNITUDE: u8 = u8::MAX;

    pub fn silent(bin_count: usize) -> Self {
        Self {
            bins: vec![0; bin_count],
        }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Analyser node of the audio graph: keeps the most recent window of samples
/// that went to the destination. Written by the audio output, read by
/// [`FrequencySampler`].
#[derive(Clone)]
pub struct SignalTap {
    shared: Arc<Mutex<VecDeque<f32>>>,
    window_size: usize,
}

impl SignalTap {
    pub fn new(window_size: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(VecDeque::with_capacity(window_size))),
            window_size,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn write(&self, samples: &[f32]) -> Result<()> {
        let mut window = self.lock()?;
        let keep = samples.len().min(self.window_size);
        let overflow = (window.len() + keep).saturating_sub(self.window_size);
        window.drain(..overflow);
        window.extend(&samples[samples.len() - keep..]);
        Ok(())
    }

    /// Copies the current window into `out`, zero-filling the front when
    /// fewer samples than the window size have been written.
    fn read_into(&self, out: &mut [f32]) -> Result<()> {
        let window = self.lock()?;
        let offset = out.len().saturating_sub(window.len());
        out[..offset].fill(0.0);
        for (slot, sample) in out[offset..].iter_mut().zip(window.iter()) {
            *slot = *sample;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<f32>>> {
        self.shared
            .lock()
            .map_err(|_| CeremonyError::msg("signal tap has been poisoned"))
    }
}

impl fmt::Debug for SignalTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTap")
            .field("window_size", &self.window_size)
            .finish()
    }
}

/// Pull-based spectrum reader over a [`SignalTap`]. Each call reflects the
/// tap contents at call time; nothing is accumulated between calls.
pub struct FrequencySampler {
    tap: SignalTap,
    min_decibels: f32,
    max_decibels: f32,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    window: Vec<f32>,
}

impl FrequencySampler {
    pub fn new(tap: SignalTap, config: &AudioConfig) -> Result<Self> {
        let size = tap.window_size();
        if size < 2 || size % 2 != 0 {
            return Err(CeremonyError::InvalidInput(
                "analysis window must be an even size of at least two samples",
            ));
        }
        if config.max_decibels <= config.min_decibels {
            return Err(CeremonyError::InvalidInput(
                "max_decibels must exceed min_decibels",
            ));
        }

        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let window = (0..size).map(|index| blackman_value(index, size)).collect();

        Ok(Self {
            tap,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            plan,
            input,
            spectrum,
            scratch,
            window,
        })
    }

    /// Number of bins per frame: half the analysis window.
    pub fn bin_count(&self) -> usize {
        self.input.len() / 2
    }

    pub fn sample(&mut self) -> Result<FrequencyFrame> {
        self.tap.read_into(&mut self.input)?;
        for (sample, weight) in self.input.iter_mut().zip(&self.window) {
            *sample *= weight;
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .map_err(|err| CeremonyError::Fft(err.to_string()))?;

        let size = self.input.len() as f32;
        let range = self.max_decibels - self.min_decibels;
        let bins = self
            .spectrum
            .iter()
            .take(self.bin_count())
            .map(|bin| {
                let decibels = 20.0 * (bin.norm() / size).log10();
                let scaled = (decibels - self.min_decibels) / range * f32::from(u8::MAX);
                scaled.clamp(0.0, f32::from(u8::MAX)) as u8
            })
            .collect();

        Ok(FrequencyFrame { bins })
    }
}

impl fmt::Debug for FrequencySampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrequencySampler")
            .field("tap", &self.tap)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a2 = 0.5 * ALPHA;
    let phase = 2.0 * PI * index as f32 / len as f32;

    a0 - 0.5 * phase.cos() + a2 * (2.0 * phase).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(window: usize) -> (SignalTap, FrequencySampler) {
        let tap = SignalTap::new(window);
        let sampler = FrequencySampler::new(tap.clone(), &AudioConfig::default()).unwrap();
        (tap, sampler)
    }

    fn sine(frequency: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * frequency * n as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn silence_yields_zero_frame_of_half_window() {
        let (tap, mut sampler) = sampler(128);
        tap.write(&[0.0; 256]).unwrap();

        let frame = sampler.sample().unwrap();
        assert_eq!(frame, FrequencyFrame::silent(64));
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let (tap, mut sampler) = sampler(128);
        // 48 kHz / 128 = 375 Hz per bin, so 3 kHz lands on bin 8.
        tap.write(&sine(3_000.0, 48_000.0, 128)).unwrap();

        let frame = sampler.sample().unwrap();
        assert_eq!(frame.bins[8], FrequencyFrame::MAX_MAGNITUDE);
        assert!(frame.bins[40] < frame.bins[8]);
    }

    #[test]
    fn sampling_does_not_consume_the_tap() {
        let (tap, mut sampler) = sampler(64);
        tap.write(&sine(6_000.0, 48_000.0, 64)).unwrap();

        let first = sampler.sample().unwrap();
        let second = sampler.sample().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tap_keeps_only_latest_window() {
        let tap = SignalTap::new(4);
        tap.write(&[1.0, 2.0, 3.0]).unwrap();
        tap.write(&[4.0, 5.0]).unwrap();

        let mut out = [0.0; 4];
        tap.read_into(&mut out).unwrap();
        assert_eq!(out, [2.0, 3.0, 4.0, 5.0]);

        tap.write(&[6.0, 7.0, 8.0, 9.0, 10.0]).unwrap();
        tap.read_into(&mut out).unwrap();
        assert_eq!(out, [7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn rejects_odd_windows() {
        let tap = SignalTap::new(127);
        assert!(FrequencySampler::new(tap, &AudioConfig::default()).is_err());
    }
}
