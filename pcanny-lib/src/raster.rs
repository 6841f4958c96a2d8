//! Row-major single-channel raster shared by every stage of the pipeline.

use std::ops::Range;

use anyhow::{anyhow, ensure, Result};

/// A `rows x cols` image stored row-major, `pos = r * cols + c`.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

fn checked_len(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols)
        .ok_or_else(|| anyhow!("raster size {rows}x{cols} overflows"))
}

impl<T: Copy + Default> Raster<T> {
    /// Zero-filled raster. Allocation failure is reported instead of aborting.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        Self::filled(rows, cols, T::default())
    }

    pub fn filled(rows: usize, cols: usize, value: T) -> Result<Self> {
        let len = checked_len(rows, cols)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| anyhow!("failed to allocate a {rows}x{cols} raster: {e}"))?;
        data.resize(len, value);
        Ok(Self { rows, cols, data })
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        let len = checked_len(rows, cols)?;
        ensure!(
            data.len() == len,
            "raster {rows}x{cols} needs {len} samples, got {}",
            data.len()
        );
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn pos(&self, r: usize, c: usize) -> usize {
        r * self.cols + c
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> T {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: T) {
        let pos = r * self.cols + c;
        self.data[pos] = value;
    }

    pub fn row(&self, r: usize) -> &[T] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// The contiguous samples of a range of whole rows.
    pub fn row_block(&self, rows: Range<usize>) -> &[T] {
        &self.data[rows.start * self.cols..rows.end * self.cols]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn map<U, F>(&self, f: F) -> Raster<U>
    where
        F: FnMut(T) -> U,
    {
        Raster {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().copied().map(f).collect(),
        }
    }

    /// True when `(r, c)` lies on the outermost one-pixel frame.
    #[inline]
    pub fn is_border(&self, r: usize, c: usize) -> bool {
        r == 0 || c == 0 || r + 1 == self.rows || c + 1 == self.cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_is_row_major() {
        let raster = Raster::from_vec(2, 3, vec![0u8, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(raster.pos(1, 2), 5);
        assert_eq!(raster.get(1, 0), 3);
        assert_eq!(raster.row(1), &[3, 4, 5]);
        assert_eq!(raster.row_block(0..1), &[0, 1, 2]);
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        assert!(Raster::from_vec(2, 2, vec![0i16; 3]).is_err());
    }

    #[test]
    fn oversized_raster_is_an_error() {
        assert!(Raster::<u8>::zeros(usize::MAX, 2).is_err());
    }

    #[test]
    fn border_frame() {
        let raster = Raster::<u8>::zeros(3, 4).unwrap();
        assert!(raster.is_border(0, 2));
        assert!(raster.is_border(2, 1));
        assert!(raster.is_border(1, 3));
        assert!(!raster.is_border(1, 1));
        assert!(!raster.is_border(1, 2));
    }
}
