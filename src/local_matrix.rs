//! Column-major local storage
//!
//! Entry `(i, j)` of a local matrix lives at position `i + j * ldim` of its buffer. A
//! matrix either owns its buffer or borrows a window of another matrix's buffer, in
//! which case it may be locked against writes.
use crate::types::{Base, Element, Scalar};
use cauchy::Scalar as _;
use std::ops::Range;

#[derive(Debug)]
enum Storage<'a, T> {
    Owned(Vec<T>),
    View(&'a mut [T]),
    Locked(&'a [T]),
}

/// A dense column-major matrix held by one process.
#[derive(Debug)]
pub struct LocalMatrix<'a, T> {
    storage: Storage<'a, T>,
    height: usize,
    width: usize,
    ldim: usize,
}

fn window_len(height: usize, width: usize, ldim: usize) -> usize {
    if height == 0 || width == 0 {
        0
    } else {
        (width - 1) * ldim + height
    }
}

impl<T: Element> Default for LocalMatrix<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Element> LocalMatrix<'a, T> {
    /// An empty owning matrix
    pub fn new() -> Self {
        Self {
            storage: Storage::Owned(Vec::new()),
            height: 0,
            width: 0,
            ldim: 1,
        }
    }

    /// An owning matrix of zeros
    pub fn zeros(height: usize, width: usize) -> Self {
        Self::with_ldim(height, width, height)
    }

    /// An owning matrix of zeros with leading dimension at least `ldim`
    pub fn with_ldim(height: usize, width: usize, ldim: usize) -> Self {
        let ldim = ldim.max(height).max(1);
        Self {
            storage: Storage::Owned(vec![T::default(); ldim * width]),
            height,
            width,
            ldim,
        }
    }

    /// Take ownership of a column-major buffer with leading dimension `height`
    pub fn from_column_major(height: usize, width: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            height * width,
            "Buffer does not hold a {height} x {width} matrix"
        );
        Self {
            storage: Storage::Owned(data),
            height,
            width,
            ldim: height.max(1),
        }
    }

    /// View foreign storage
    pub fn attach(height: usize, width: usize, data: &'a mut [T], ldim: usize) -> Self {
        assert!(ldim >= height.max(1), "Leading dimension is too small");
        assert!(data.len() >= window_len(height, width, ldim));
        Self {
            storage: Storage::View(data),
            height,
            width,
            ldim,
        }
    }

    /// View foreign storage without write access
    pub fn locked_attach(height: usize, width: usize, data: &'a [T], ldim: usize) -> Self {
        assert!(ldim >= height.max(1), "Leading dimension is too small");
        assert!(data.len() >= window_len(height, width, ldim));
        Self {
            storage: Storage::Locked(data),
            height,
            width,
            ldim,
        }
    }

    /// Resize an owning matrix. The contents are zeroed unless the shape is unchanged.
    ///
    /// Panics for a view whose shape would change.
    pub fn resize(&mut self, height: usize, width: usize) {
        let ldim = if height <= self.ldim && self.height == height {
            self.ldim
        } else {
            height
        };
        self.resize_with_ldim(height, width, ldim);
    }

    /// Resize an owning matrix with leading dimension at least `ldim`.
    pub fn resize_with_ldim(&mut self, height: usize, width: usize, ldim: usize) {
        let ldim = ldim.max(height).max(1);
        if height == self.height && width == self.width && ldim == self.ldim {
            return;
        }
        match &mut self.storage {
            Storage::Owned(data) => {
                data.clear();
                data.resize(ldim * width, T::default());
            }
            _ => panic!(
                "Cannot resize a {} x {} view to {height} x {width}",
                self.height, self.width
            ),
        }
        self.height = height;
        self.width = width;
        self.ldim = ldim;
    }

    /// Drop the contents. Owners release their buffer; views keep pointing at theirs.
    pub fn empty(&mut self) {
        if let Storage::Owned(data) = &mut self.storage {
            *data = Vec::new();
            self.ldim = 1;
        }
        self.height = 0;
        self.width = 0;
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.height
    }
    /// Number of columns
    pub fn width(&self) -> usize {
        self.width
    }
    /// Leading dimension
    pub fn ldim(&self) -> usize {
        self.ldim
    }

    /// Does the matrix borrow its storage?
    pub fn is_view(&self) -> bool {
        !matches!(self.storage, Storage::Owned(_))
    }

    /// Is writing forbidden?
    pub fn is_locked(&self) -> bool {
        matches!(self.storage, Storage::Locked(_))
    }

    /// Number of entries allocated by this matrix
    pub fn allocated_memory(&self) -> usize {
        match &self.storage {
            Storage::Owned(data) => data.capacity(),
            _ => 0,
        }
    }

    /// The underlying buffer
    pub fn data(&self) -> &[T] {
        match &self.storage {
            Storage::Owned(data) => data,
            Storage::View(data) => data,
            Storage::Locked(data) => data,
        }
    }

    /// The underlying buffer for writing. Panics for a locked view.
    pub fn data_mut(&mut self) -> &mut [T] {
        match &mut self.storage {
            Storage::Owned(data) => data,
            Storage::View(data) => data,
            Storage::Locked(_) => panic!("Attempted to modify a locked view"),
        }
    }

    fn index(&self, i: usize, j: usize) -> usize {
        assert!(
            i < self.height && j < self.width,
            "Entry ({i}, {j}) is out of bounds of a {} x {} matrix",
            self.height,
            self.width
        );
        i + j * self.ldim
    }

    /// Entry `(i, j)`
    pub fn get(&self, i: usize, j: usize) -> T {
        self.data()[self.index(i, j)]
    }

    /// Overwrite entry `(i, j)`
    pub fn set(&mut self, i: usize, j: usize, value: T) {
        let index = self.index(i, j);
        self.data_mut()[index] = value;
    }

    /// Add to entry `(i, j)`
    pub fn update(&mut self, i: usize, j: usize, value: T) {
        let index = self.index(i, j);
        self.data_mut()[index] += value;
    }

    /// Column `j`
    pub fn column(&self, j: usize) -> &[T] {
        assert!(j < self.width, "Column {j} is out of bounds");
        if self.height == 0 {
            return &[];
        }
        let start = j * self.ldim;
        &self.data()[start..start + self.height]
    }

    /// Column `j` for writing
    pub fn column_mut(&mut self, j: usize) -> &mut [T] {
        assert!(j < self.width, "Column {j} is out of bounds");
        if self.height == 0 {
            return &mut [];
        }
        let start = j * self.ldim;
        let height = self.height;
        &mut self.data_mut()[start..start + height]
    }

    /// Iterate over the columns for writing
    pub fn columns_mut(&mut self) -> impl Iterator<Item = &mut [T]> {
        let (height, width, ldim) = (self.height, self.width, self.ldim);
        self.data_mut()
            .chunks_mut(ldim)
            .take(width)
            .map(move |c| &mut c[..height])
    }

    /// Set every entry to `value`
    pub fn fill(&mut self, value: T) {
        for column in self.columns_mut() {
            column.fill(value);
        }
    }

    /// Swap rows `a` and `b`
    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for column in self.columns_mut() {
            column.swap(a, b);
        }
    }

    /// Copy the entries into a contiguous column-major vector
    pub fn to_column_major(&self) -> Vec<T> {
        (0..self.width)
            .flat_map(|j| self.column(j).iter().copied())
            .collect()
    }

    /// An owning copy
    pub fn to_owned(&self) -> LocalMatrix<'static, T> {
        LocalMatrix::from_column_major(self.height, self.width, self.to_column_major())
    }

    fn window(&self, rows: &Range<usize>, cols: &Range<usize>) -> Range<usize> {
        assert!(
            rows.start <= rows.end
                && rows.end <= self.height
                && cols.start <= cols.end
                && cols.end <= self.width,
            "Submatrix [{rows:?}, {cols:?}] is out of bounds of a {} x {} matrix",
            self.height,
            self.width
        );
        let len = self.data().len();
        let start = (rows.start + cols.start * self.ldim).min(len);
        start..start + window_len(rows.len(), cols.len(), self.ldim)
    }

    /// A locked view of a submatrix
    pub fn view(&self, rows: Range<usize>, cols: Range<usize>) -> LocalMatrix<'_, T> {
        let window = self.window(&rows, &cols);
        LocalMatrix {
            storage: Storage::Locked(&self.data()[window]),
            height: rows.len(),
            width: cols.len(),
            ldim: self.ldim,
        }
    }

    /// A writable view of a submatrix. Panics for a locked view.
    pub fn view_mut(&mut self, rows: Range<usize>, cols: Range<usize>) -> LocalMatrix<'_, T> {
        let window = self.window(&rows, &cols);
        let ldim = self.ldim;
        LocalMatrix {
            storage: Storage::View(&mut self.data_mut()[window]),
            height: rows.len(),
            width: cols.len(),
            ldim,
        }
    }
}

impl<T: Scalar> LocalMatrix<'_, T> {
    /// Real part of entry `(i, j)`
    pub fn get_real_part(&self, i: usize, j: usize) -> Base<T> {
        self.get(i, j).re()
    }

    /// Imaginary part of entry `(i, j)`
    pub fn get_imag_part(&self, i: usize, j: usize) -> Base<T> {
        self.get(i, j).im()
    }

    /// Overwrite the real part of entry `(i, j)`
    pub fn set_real_part(&mut self, i: usize, j: usize, value: Base<T>) {
        let old = self.get(i, j);
        self.set(i, j, T::from_parts(value, old.im()));
    }

    /// Overwrite the imaginary part of entry `(i, j)`. Ignored for real scalars.
    pub fn set_imag_part(&mut self, i: usize, j: usize, value: Base<T>) {
        let old = self.get(i, j);
        self.set(i, j, T::from_parts(old.re(), value));
    }

    /// Add to the real part of entry `(i, j)`
    pub fn update_real_part(&mut self, i: usize, j: usize, value: Base<T>) {
        self.update(i, j, T::from_real(value));
    }

    /// Add to the imaginary part of entry `(i, j)`. Ignored for real scalars.
    pub fn update_imag_part(&mut self, i: usize, j: usize, value: Base<T>) {
        self.update(i, j, T::from_parts(<Base<T> as num::Zero>::zero(), value));
    }

    /// Drop the imaginary part of entry `(i, j)`
    pub fn make_real(&mut self, i: usize, j: usize) {
        let value = self.get(i, j);
        self.set(i, j, T::from_real(value.re()));
    }

    /// Conjugate entry `(i, j)`
    pub fn conjugate(&mut self, i: usize, j: usize) {
        let value = self.get(i, j);
        self.set(i, j, value.conj());
    }

    /// Multiply every entry by `alpha`
    pub fn scale(&mut self, alpha: T) {
        for column in self.columns_mut() {
            for value in column.iter_mut() {
                *value *= alpha;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use num::complex::Complex;

    fn counting(height: usize, width: usize) -> LocalMatrix<'static, f64> {
        LocalMatrix::from_column_major(
            height,
            width,
            (0..height * width).map(|x| x as f64).collect(),
        )
    }

    #[test]
    fn test_layout() {
        let mut m = LocalMatrix::<f64>::with_ldim(2, 3, 4);
        assert_eq!(m.ldim(), 4);
        m.set(1, 2, 5.0);
        assert_eq!(m.data()[9], 5.0);
        m.update(1, 2, 1.5);
        assert_relative_eq!(m.get(1, 2), 6.5);
        assert_eq!(m.allocated_memory(), 12);
    }

    #[test]
    fn test_views_share_storage() {
        let mut m = counting(4, 3);
        {
            let mut v = m.view_mut(1..3, 1..3);
            assert_eq!(v.height(), 2);
            assert_eq!(v.get(0, 0), 5.0);
            v.set(1, 1, -1.0);
            assert!(v.is_view());
            assert!(!v.is_locked());
        }
        assert_eq!(m.get(2, 2), -1.0);
        let v = m.view(0..4, 2..3);
        assert!(v.is_locked());
        assert_eq!(v.to_column_major(), vec![8.0, 9.0, -1.0, 11.0]);
    }

    #[test]
    fn test_empty_views() {
        let m = counting(3, 3);
        let v = m.view(3..3, 3..3);
        assert_eq!((v.height(), v.width()), (0, 0));
        let v = m.view(1..1, 0..3);
        assert!(v.to_column_major().is_empty());
    }

    #[test]
    #[should_panic]
    fn test_locked_write_panics() {
        let m = counting(2, 2);
        let mut v = LocalMatrix::locked_attach(2, 2, m.data(), 2);
        v.set(0, 0, 1.0);
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds_panics() {
        let m = counting(2, 2);
        m.get(2, 0);
    }

    #[test]
    fn test_resize() {
        let mut m = counting(2, 2);
        m.resize(2, 2);
        assert_eq!(m.get(1, 1), 3.0);
        m.resize(3, 1);
        assert_eq!((m.height(), m.width(), m.ldim()), (3, 1, 3));
        assert_eq!(m.get(2, 0), 0.0);
        m.empty();
        assert_eq!((m.height(), m.width()), (0, 0));
        assert_eq!(m.allocated_memory(), 0);
    }

    #[test]
    fn test_complex_parts() {
        let mut m = LocalMatrix::<Complex<f64>>::zeros(2, 2);
        m.set(0, 1, Complex::new(1.0, 2.0));
        m.update_imag_part(0, 1, 1.0);
        assert_relative_eq!(m.get_imag_part(0, 1), 3.0);
        m.conjugate(0, 1);
        assert_relative_eq!(m.get_imag_part(0, 1), -3.0);
        m.set_real_part(0, 1, 4.0);
        m.make_real(0, 1);
        assert_eq!(m.get(0, 1), Complex::new(4.0, 0.0));
        m.scale(Complex::new(0.0, 1.0));
        assert_eq!(m.get(0, 1), Complex::new(0.0, 4.0));
    }

    #[test]
    fn test_swap_rows() {
        let mut m = counting(3, 2);
        m.swap_rows(0, 2);
        assert_eq!(m.to_column_major(), vec![2.0, 1.0, 0.0, 5.0, 4.0, 3.0]);
    }
}
