/// Row-major two-dimensional array of `f64`.
///
/// Rows index atoms, edges, or structures; columns index the components of
/// the field's irreps in their flat layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tensor {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl Tensor {
    /// Creates a tensor from flat data.
    ///
    /// Returns `None` if `data.len() != rows * cols`.
    pub fn new(data: Vec<f64>, rows: usize, cols: usize) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { data, rows, cols })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    pub fn from_rows<const N: usize>(rows: &[[f64; N]]) -> Self {
        Self {
            data: rows.iter().flatten().copied().collect(),
            rows: rows.len(),
            cols: N,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_checks_length() {
        assert!(Tensor::new(vec![1.0, 2.0, 3.0], 1, 3).is_some());
        assert!(Tensor::new(vec![1.0, 2.0], 1, 3).is_none());
    }

    #[test]
    fn rows_are_contiguous() {
        let t = Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(t.rows(), 2);
        assert_eq!(t.cols(), 2);
        assert_eq!(t.row(1), &[3.0, 4.0]);
        assert_eq!(t.sum(), 10.0);
    }

    #[test]
    fn row_mut_writes_in_place() {
        let mut t = Tensor::zeros(2, 3);
        t.row_mut(1)[2] = 5.0;
        assert_eq!(t.as_slice(), &[0.0, 0.0, 0.0, 0.0, 0.0, 5.0]);
    }
}
