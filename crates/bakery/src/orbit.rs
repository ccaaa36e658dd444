use std::f64::consts::PI;
use std::iter::FusedIterator;

use crate::error::SamplingError;

/// Atlas cell a sample is rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub u: u32,
    pub v: u32,
}

/// One camera position on the orbit and the cell it fills.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub position: [f32; 3],
    pub cell: Cell,
}

/// Camera positions around the origin, one per atlas cell.
///
/// Columns sweep the azimuth clockwise; rows sweep the elevation from the
/// top of the orbit down to the horizon and back up again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitSampler {
    n_row: u32,
    distance: f64,
}

impl OrbitSampler {
    pub fn new(n_row: u32, distance: f64) -> Result<Self, SamplingError> {
        if n_row == 0 {
            return Err(SamplingError::ZeroRows);
        }
        if !distance.is_finite() || distance <= 0.0 {
            return Err(SamplingError::Distance(distance));
        }
        Ok(Self { n_row, distance })
    }

    pub fn n_row(&self) -> u32 {
        self.n_row
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Number of samples in one full pass.
    pub fn len(&self) -> usize {
        (self.n_row as usize) * (self.n_row as usize)
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Sample `index` of the pass, without bounds checking.
    pub fn sample(&self, index: usize) -> Sample {
        let n = f64::from(self.n_row);
        let half = 0.5 / n;
        let u = (index % self.n_row as usize) as u32;
        let v = (index / self.n_row as usize) as u32;

        let ur = f64::from(u) / n + half;
        let vr = f64::from(v) / n + half;
        let yr = (0.5 - vr).abs() * 2.0;
        let xzr = yr.atan2(1.0).cos();
        let ra = -2.0 * PI * ur;

        Sample {
            position: [
                (ra.cos() * self.distance * xzr) as f32,
                (yr * self.distance) as f32,
                (ra.sin() * self.distance * xzr) as f32,
            ],
            cell: Cell { u, v },
        }
    }

    /// A fresh pass over every cell; call again to restart.
    pub fn samples(&self) -> Samples {
        Samples {
            sampler: *self,
            next: 0,
        }
    }
}

impl IntoIterator for &OrbitSampler {
    type Item = Sample;
    type IntoIter = Samples;

    fn into_iter(self) -> Samples {
        self.samples()
    }
}

/// Lazy iterator over one orbit pass.
#[derive(Debug, Clone)]
pub struct Samples {
    sampler: OrbitSampler,
    next: usize,
}

impl Iterator for Samples {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.next >= self.sampler.len() {
            return None;
        }
        let sample = self.sampler.sample(self.next);
        self.next += 1;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.sampler.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Samples {}
impl FusedIterator for Samples {}
