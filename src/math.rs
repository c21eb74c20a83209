use std::io::{self, Read, Write};
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;

/// A single f32 parameter cell that may be read and written concurrently.
///
/// All access is `Ordering::Relaxed`; `add` is a plain read-modify-write
/// with no compare-exchange, so concurrent increments may lose updates.
/// That is the intended Hogwild behaviour for the shared parameter
/// matrices.
#[derive(Default)]
#[repr(transparent)]
pub struct Real {
    bits: AtomicU32,
}

impl std::fmt::Debug for Real {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl Real {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn add(&self, x: f32) {
        self.set(self.get() + x);
    }
}

/// Owned scratch vector. One per worker engine; never shared.
#[derive(Clone, Debug, Default)]
pub struct Vector {
    pub data: Vec<f32>,
}

impl Vector {
    pub fn new(n: usize) -> Self {
        Vector { data: vec![0.0; n] }
    }

    pub fn from_vec(v: Vec<f32>) -> Self {
        Vector { data: v }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn zero(&mut self) {
        for v in self.data.iter_mut() {
            *v = 0.0;
        }
    }

    /// Multiply every element by `a` in place.
    pub fn mul(&mut self, a: f32) {
        for v in self.data.iter_mut() {
            *v *= a;
        }
    }

    /// `self += a * m[row]`.
    pub fn add_row(&mut self, m: &Matrix, row: usize, a: f32) {
        debug_assert!(row < m.rows);
        debug_assert_eq!(self.data.len(), m.cols);
        let src = &m.data[row * m.cols..(row + 1) * m.cols];
        for (v, c) in self.data.iter_mut().zip(src.iter()) {
            *v += a * c.get();
        }
    }

    /// `self = m * v`, with `self.len() == m.rows` and `v.len() == m.cols`.
    pub fn mul_matrix(&mut self, m: &Matrix, v: &Vector) {
        assert_eq!(self.data.len(), m.rows);
        assert_eq!(v.data.len(), m.cols);

        const PAR_THRESHOLD: usize = 128 * 128; // use rayon when the product is reasonably large

        if m.rows * m.cols > PAR_THRESHOLD {
            use rayon::prelude::*;
            self.data
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, out)| *out = m.dot_row(v, i));
        } else {
            for i in 0..m.rows {
                self.data[i] = m.dot_row(v, i);
            }
        }
    }

    /// `self += a * v`.
    pub fn add_vector(&mut self, v: &Vector, a: f32) {
        debug_assert_eq!(self.data.len(), v.data.len());
        for (x, &y) in self.data.iter_mut().zip(v.data.iter()) {
            *x += a * y;
        }
    }

    pub fn dot(&self, other: &Vector) -> f32 {
        debug_assert_eq!(self.data.len(), other.data.len());
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| a * b)
            .sum()
    }

    pub fn l1(&self) -> f32 {
        self.data.iter().map(|v| v.abs()).sum()
    }

    /// Index of the largest element; ties go to the lowest index.
    pub fn argmax(&self) -> usize {
        let mut best_idx = 0usize;
        let mut best_val = f32::NEG_INFINITY;
        for (i, &v) in self.data.iter().enumerate() {
            if v > best_val {
                best_val = v;
                best_idx = i;
            }
        }
        best_idx
    }

    /// Write the vector as its dimension (u64) followed by the raw f32
    /// values, native endianness. No header or versioning; the surrounding
    /// model file owns those.
    pub fn save<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&(self.data.len() as u64).to_ne_bytes())?;
        for &v in &self.data {
            w.write_all(&v.to_ne_bytes())?;
        }
        Ok(())
    }

    /// Read a vector previously written with [`Vector::save`].
    pub fn load<R: Read>(r: &mut R) -> io::Result<Vector> {
        let mut len_buf = [0u8; 8];
        r.read_exact(&mut len_buf)?;
        let n = u64::from_ne_bytes(len_buf) as usize;
        let mut data = Vec::with_capacity(n);
        let mut buf = [0u8; 4];
        for _ in 0..n {
            r.read_exact(&mut buf)?;
            data.push(f32::from_ne_bytes(buf));
        }
        Ok(Vector { data })
    }
}

impl std::fmt::Display for Vector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for v in &self.data {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{v}")?;
            first = false;
        }
        Ok(())
    }
}

impl Index<usize> for Vector {
    type Output = f32;

    fn index(&self, i: usize) -> &f32 {
        &self.data[i]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.data[i]
    }
}

/// Dense row-major parameter matrix shared by all worker engines.
///
/// Mutating methods take `&self`: every cell is a [`Real`], so workers
/// update rows concurrently without locks. Races tear at single-cell
/// granularity at worst, which stochastic gradient descent tolerates.
#[derive(Debug)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<Real>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: (0..rows * cols).map(|_| Real::default()).collect(),
        }
    }

    pub fn from_vec(rows: usize, cols: usize, v: Vec<f32>) -> Self {
        assert_eq!(v.len(), rows * cols);
        Matrix {
            rows,
            cols,
            data: v.into_iter().map(Real::new).collect(),
        }
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c].get()
    }

    pub fn set(&self, r: usize, c: usize, v: f32) {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c].set(v);
    }

    pub fn add(&self, r: usize, c: usize, delta: f32) {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c].add(delta);
    }

    /// Fill with i.i.d. uniform values in `[-a, a]`.
    pub fn uniform<R: Rng>(&self, rng: &mut R, a: f32) {
        for cell in &self.data {
            cell.set(rng.gen_range(-a..=a));
        }
    }

    /// `<self[row], v>`.
    pub fn dot_row(&self, v: &Vector, row: usize) -> f32 {
        debug_assert!(row < self.rows);
        debug_assert_eq!(v.len(), self.cols);
        let src = &self.data[row * self.cols..(row + 1) * self.cols];
        src.iter()
            .zip(v.data.iter())
            .map(|(c, &x)| c.get() * x)
            .sum()
    }

    /// `self[row] += a * v`.
    pub fn add_row(&self, v: &Vector, row: usize, a: f32) {
        debug_assert!(row < self.rows);
        debug_assert_eq!(v.len(), self.cols);
        let dst = &self.data[row * self.cols..(row + 1) * self.cols];
        for (c, &x) in dst.iter().zip(v.data.iter()) {
            c.add(a * x);
        }
    }

    /// Snapshot of the current values, row-major.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().map(Real::get).collect()
    }
}

/// Shared 1-D parameter array, same access rules as [`Matrix`].
#[derive(Debug)]
pub struct ParamVector {
    data: Vec<Real>,
}

impl ParamVector {
    pub fn new(n: usize) -> Self {
        ParamVector {
            data: (0..n).map(|_| Real::default()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, i: usize) -> f32 {
        debug_assert!(i < self.data.len());
        self.data[i].get()
    }

    pub fn set(&self, i: usize, v: f32) {
        debug_assert!(i < self.data.len());
        self.data[i].set(v);
    }

    pub fn add(&self, i: usize, delta: f32) {
        debug_assert!(i < self.data.len());
        self.data[i].add(delta);
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().map(Real::get).collect()
    }
}
