//! Sliding-window peak tracker for auto-mute metering.
//!
//! [`PeakWindow`] keeps the last `len` per-frame peak magnitudes in a ring
//! and mirrors them in a counted multiset (`BTreeMap<key, count>`), so the
//! window maximum is answered in O(log n) instead of rescanning the ring.
//!
//! ## Invariant
//!
//! The multiset holds exactly `len` entries at all times, one per ring slot.
//! Slots start at 0.0 and the multiset is seeded with `len` zeros, so the
//! window is "full" from construction. Every [`PeakWindow::push`] removes one
//! instance of the evicted slot value and inserts the new one.
//!
//! ## Keys
//!
//! Peaks are stored as the raw bit pattern of a non-negative finite `f32`.
//! For such values IEEE 754 ordering matches unsigned integer ordering of the
//! bits, which gives a total order without a float wrapper type. Non-finite
//! input is replaced with [`NON_FINITE_PEAK`] before it reaches the tree.

use std::collections::BTreeMap;

/// Stand-in peak for `NaN` / `±Infinity` frames.
///
/// Only meant to be louder than any legitimate peak, so a blown-up generator
/// trips the mute decision instead of poisoning the statistic.
pub const NON_FINITE_PEAK: f32 = 100.0;

/// Longest window [`PeakWindow::for_duration`] accepts, in seconds.
pub const MAX_WINDOW_SECONDS: f32 = 60.0;

/// Largest number of slots a window holds.
pub const MAX_WINDOW_LEN: usize = 1 << 26;

/// Map an arbitrary sample value to a non-negative finite peak magnitude.
#[inline]
pub fn sanitize_peak(value: f32) -> f32 {
    if value.is_finite() {
        value.abs()
    } else {
        NON_FINITE_PEAK
    }
}

/// Fixed-length sliding window of peak magnitudes with O(log n) max queries.
#[derive(Debug, Clone)]
pub struct PeakWindow {
    ring: Vec<f32>,
    cursor: usize,
    counts: BTreeMap<u32, u32>,
}

impl PeakWindow {
    /// Create a window holding `len` peaks, clamped to `1..=MAX_WINDOW_LEN`.
    pub fn new(len: usize) -> Self {
        let len = len.clamp(1, MAX_WINDOW_LEN);
        let mut counts = BTreeMap::new();
        counts.insert(0.0f32.to_bits(), len as u32);
        Self {
            ring: vec![0.0; len],
            cursor: 0,
            counts,
        }
    }

    /// Create a window spanning `seconds` of frames at `sample_rate`.
    ///
    /// Returns `None` when the duration is not a positive finite number of at
    /// most [`MAX_WINDOW_SECONDS`], or spans more than [`MAX_WINDOW_LEN`]
    /// frames.
    pub fn for_duration(sample_rate: u32, seconds: f32) -> Option<Self> {
        let len = Self::duration_len(sample_rate, seconds)?;
        Some(Self::new(len))
    }

    /// Slot count [`for_duration`](Self::for_duration) would allocate,
    /// without allocating.
    pub fn duration_len(sample_rate: u32, seconds: f32) -> Option<usize> {
        if !seconds.is_finite() || seconds <= 0.0 || seconds > MAX_WINDOW_SECONDS {
            return None;
        }
        let len = (f64::from(sample_rate) * f64::from(seconds)).round();
        if len > MAX_WINDOW_LEN as f64 {
            return None;
        }
        Some((len as usize).max(1))
    }

    /// Number of slots in the window.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Always false; a window has at least one slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Push a new peak, evicting the oldest one.
    pub fn push(&mut self, peak: f32) {
        let peak = sanitize_peak(peak);
        let evicted = std::mem::replace(&mut self.ring[self.cursor], peak);
        self.remove(evicted);
        *self.counts.entry(peak.to_bits()).or_insert(0) += 1;
        self.cursor += 1;
        if self.cursor == self.ring.len() {
            self.cursor = 0;
        }
    }

    /// Largest peak currently in the window.
    pub fn max(&self) -> f32 {
        self.counts
            .last_key_value()
            .map(|(&bits, _)| f32::from_bits(bits))
            .unwrap_or(0.0)
    }

    /// Clear the window back to all-zero slots.
    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.cursor = 0;
        self.counts.clear();
        self.counts.insert(0.0f32.to_bits(), self.ring.len() as u32);
    }

    fn remove(&mut self, value: f32) {
        let key = value.to_bits();
        let Some(count) = self.counts.get_mut(&key) else {
            unreachable!("evicted peak {value} missing from multiset");
        };
        if *count > 1 {
            *count -= 1;
        } else {
            self.counts.remove(&key);
        }
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.counts.values().map(|&c| c as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full_of_zeros() {
        let window = PeakWindow::new(8);
        assert_eq!(window.len(), 8);
        assert_eq!(window.max(), 0.0);
        assert_eq!(window.entry_count(), 8);
    }

    #[test]
    fn zero_length_is_promoted_to_one() {
        let mut window = PeakWindow::new(0);
        assert_eq!(window.len(), 1);
        window.push(0.3);
        assert_eq!(window.max(), 0.3);
        window.push(0.1);
        assert_eq!(window.max(), 0.1);
    }

    #[test]
    fn duration_rounds_to_frames() {
        let window = PeakWindow::for_duration(44100, 0.5).unwrap();
        assert_eq!(window.len(), 22050);
        let window = PeakWindow::for_duration(1000, 0.0015).unwrap();
        assert_eq!(window.len(), 2);
        assert!(PeakWindow::for_duration(44100, 0.0).is_none());
        assert!(PeakWindow::for_duration(44100, f32::NAN).is_none());
    }

    #[test]
    fn oversized_windows_are_refused() {
        assert!(PeakWindow::for_duration(44100, 1.0e9).is_none());
        assert!(PeakWindow::for_duration(44100, MAX_WINDOW_SECONDS * 2.0).is_none());
        assert!(PeakWindow::duration_len(u32::MAX, MAX_WINDOW_SECONDS).is_none());
        assert_eq!(
            PeakWindow::duration_len(48000, MAX_WINDOW_SECONDS),
            Some(48000 * 60)
        );
    }

    #[test]
    fn max_forgets_evicted_peaks() {
        let mut window = PeakWindow::new(3);
        window.push(0.9);
        window.push(0.2);
        window.push(0.1);
        assert_eq!(window.max(), 0.9);
        window.push(0.05);
        assert_eq!(window.max(), 0.2);
        window.push(0.05);
        window.push(0.05);
        assert_eq!(window.max(), 0.05);
        assert_eq!(window.entry_count(), 3);
    }

    #[test]
    fn duplicates_are_counted() {
        let mut window = PeakWindow::new(4);
        for _ in 0..4 {
            window.push(0.5);
        }
        assert_eq!(window.max(), 0.5);
        window.push(0.25);
        assert_eq!(window.max(), 0.5);
        window.push(0.25);
        window.push(0.25);
        assert_eq!(window.max(), 0.5);
        window.push(0.25);
        assert_eq!(window.max(), 0.25);
        assert_eq!(window.entry_count(), 4);
    }

    #[test]
    fn non_finite_peaks_use_sentinel() {
        let mut window = PeakWindow::new(2);
        window.push(f32::NAN);
        assert_eq!(window.max(), NON_FINITE_PEAK);
        window.push(f32::NEG_INFINITY);
        assert_eq!(window.max(), NON_FINITE_PEAK);
        window.push(0.5);
        window.push(0.5);
        assert_eq!(window.max(), 0.5);
    }

    #[test]
    fn negative_input_is_magnitude() {
        let mut window = PeakWindow::new(2);
        window.push(-0.75);
        assert_eq!(window.max(), 0.75);
    }

    #[test]
    fn reset_restores_invariant() {
        let mut window = PeakWindow::new(5);
        window.push(0.4);
        window.push(0.8);
        window.reset();
        assert_eq!(window.max(), 0.0);
        assert_eq!(window.entry_count(), 5);
    }
}
