//! Where training and test samples come from

use std::marker::PhantomData;

use ndarray::Array1;

/// One `(input, target)` pair
pub type Sample = (Array1<f64>, Array1<f64>);

/// A finite sequence of samples that can be walked again from the start
///
/// Every call to [`SampleSource::samples`] starts a fresh pass, which is how
/// training restarts the data once per epoch.
pub trait SampleSource {
    fn samples(&self) -> Box<dyn Iterator<Item = Sample> + '_>;

    /// Number of samples in one pass, when known up front
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

impl SampleSource for [Sample] {
    fn samples(&self) -> Box<dyn Iterator<Item = Sample> + '_> {
        Box::new(self.iter().cloned())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl SampleSource for Vec<Sample> {
    fn samples(&self) -> Box<dyn Iterator<Item = Sample> + '_> {
        self.as_slice().samples()
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}

/// Wraps a closure that recreates a sample iterator on every pass
///
/// The iterator may borrow from the closure's environment; the source then
/// lives no longer than what it borrows.
pub struct FromFn<F, I> {
    make: F,
    len: Option<usize>,
    iter: PhantomData<I>,
}

impl<F, I> FromFn<F, I>
where
    F: Fn() -> I,
    I: Iterator<Item = Sample>,
{
    pub fn new(make: F) -> Self {
        FromFn {
            make,
            len: None,
            iter: PhantomData,
        }
    }

    pub fn with_len(mut self, len: usize) -> Self {
        self.len = Some(len);
        self
    }
}

impl<F, I> SampleSource for FromFn<F, I>
where
    F: Fn() -> I,
    I: Iterator<Item = Sample>,
{
    fn samples(&self) -> Box<dyn Iterator<Item = Sample> + '_> {
        Box::new((self.make)())
    }

    fn len_hint(&self) -> Option<usize> {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_vec_source_restarts() {
        let data: Vec<Sample> = vec![
            (array![0.0], array![1.0]),
            (array![1.0], array![0.0]),
        ];

        assert_eq!(data.samples().count(), 2);
        assert_eq!(data.samples().count(), 2);
        assert_eq!(data.len_hint(), Some(2));
    }

    #[test]
    fn test_closure_source() {
        let source = FromFn::new(|| (0..3).map(|i| (array![i as f64], array![0.0]))).with_len(3);

        let firsts: Vec<f64> = source.samples().map(|(x, _)| x[0]).collect();
        assert_eq!(firsts, vec![0.0, 1.0, 2.0]);
        assert_eq!(source.samples().count(), 3);
        assert_eq!(source.len_hint(), Some(3));
    }

    #[test]
    fn test_closure_source_borrowing_local_data() {
        let data: Vec<Sample> = vec![
            (array![0.5], array![1.0]),
            (array![1.5], array![0.0]),
        ];
        let source = FromFn::new(|| data.iter().rev().cloned());

        let firsts: Vec<f64> = source.samples().map(|(x, _)| x[0]).collect();
        assert_eq!(firsts, vec![1.5, 0.5]);
        assert_eq!(source.len_hint(), None);
    }
}
