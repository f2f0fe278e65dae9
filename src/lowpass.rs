use nalgebra::SMatrix;

/// First-order low-pass filter that starts from an accumulated average.
///
/// The first `warmup_samples` inputs are summed with weight
/// `1 / warmup_samples`, so after exactly that many samples the output is
/// their arithmetic mean. From then on every input is blended in with weight
/// `alpha`. The sample counter saturates at `warmup_samples`; interrupting the
/// input stream does not restart the warm-up.
#[derive(Debug, Clone, PartialEq)]
pub struct WarmStartLowPass<const N: usize, const M: usize> {
    sample_count: u32,
    warmup_samples: u32,
    alpha: f32,
    pub last_output: SMatrix<f32, N, M>,
}

impl<const N: usize, const M: usize> WarmStartLowPass<N, M> {
    #[must_use]
    pub fn new(warmup_samples: u32, alpha: f32) -> Self {
        Self {
            sample_count: 0,
            warmup_samples,
            alpha,
            last_output: SMatrix::zeros(),
        }
    }

    #[inline]
    pub fn filter(&mut self, x: SMatrix<f32, N, M>) -> SMatrix<f32, N, M> {
        if !self.is_initialized() {
            return self.accumulate(x);
        }

        self.last_output = self.last_output * (1.0 - self.alpha) + x * self.alpha;
        self.last_output
    }

    #[inline]
    #[allow(clippy::cast_precision_loss)]
    fn accumulate(&mut self, x: SMatrix<f32, N, M>) -> SMatrix<f32, N, M> {
        self.last_output += x / self.warmup_samples as f32;
        self.sample_count += 1;
        self.last_output
    }

    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.sample_count >= self.warmup_samples
    }

    #[inline]
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::SMatrix;

    #[test]
    fn test_warmup_reaches_mean() {
        let mut filter = WarmStartLowPass::<1, 1>::new(4, 0.5);

        for value in [1.0, 2.0, 3.0] {
            let _ = filter.filter(SMatrix::from_element(value));
            assert!(!filter.is_initialized());
        }
        let output = filter.filter(SMatrix::from_element(6.0));

        assert!(filter.is_initialized());
        assert_eq!(filter.sample_count(), 4);
        assert_relative_eq!(output[(0, 0)], 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_partial_warmup_is_scaled_sum() {
        let mut filter = WarmStartLowPass::<1, 1>::new(10, 0.5);
        let output = filter.filter(SMatrix::from_element(5.0));
        assert_relative_eq!(output[(0, 0)], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_exponential_after_warmup() {
        let mut filter = WarmStartLowPass::<1, 1>::new(1, 0.25);
        let _ = filter.filter(SMatrix::from_element(4.0));

        let output = filter.filter(SMatrix::from_element(0.0));
        assert_relative_eq!(output[(0, 0)], 3.0, epsilon = 1e-6);

        let output = filter.filter(SMatrix::from_element(0.0));
        assert_relative_eq!(output[(0, 0)], 2.25, epsilon = 1e-6);
        assert_eq!(filter.sample_count(), 1);
    }
}
