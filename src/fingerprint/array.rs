//! Dense numeric n-d arrays handed to training callbacks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Element type of an [`Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// Unsigned bytes
    U8,
    /// 32-bit signed integers
    I32,
    /// 64-bit signed integers
    I64,
    /// 32-bit floats
    F32,
    /// 64-bit floats
    F64,
}

impl DType {
    /// Stable tag mixed into fingerprints.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Memory layout of an [`Array`]'s buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Layout {
    /// Last axis varies fastest (C order)
    #[default]
    RowMajor,
    /// First axis varies fastest (Fortran order)
    ColumnMajor,
}

/// Typed element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    /// `u8` elements
    U8(Vec<u8>),
    /// `i32` elements
    I32(Vec<i32>),
    /// `i64` elements
    I64(Vec<i64>),
    /// `f32` elements
    F32(Vec<f32>),
    /// `f64` elements
    F64(Vec<f64>),
}

impl Buffer {
    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    /// Check if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::U8(_) => DType::U8,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn get_f64(&self, offset: usize) -> Option<f64> {
        match self {
            Self::U8(v) => v.get(offset).map(|x| f64::from(*x)),
            Self::I32(v) => v.get(offset).map(|x| f64::from(*x)),
            Self::I64(v) => v.get(offset).map(|x| *x as f64),
            Self::F32(v) => v.get(offset).map(|x| f64::from(*x)),
            Self::F64(v) => v.get(offset).copied(),
        }
    }

    fn reorder(&self, order: &[usize]) -> Self {
        fn pick<T: Copy>(data: &[T], order: &[usize]) -> Vec<T> {
            order.iter().map(|&i| data[i]).collect()
        }
        match self {
            Self::U8(v) => Self::U8(pick(v, order)),
            Self::I32(v) => Self::I32(pick(v, order)),
            Self::I64(v) => Self::I64(pick(v, order)),
            Self::F32(v) => Self::F32(pick(v, order)),
            Self::F64(v) => Self::F64(pick(v, order)),
        }
    }

    /// Little-endian element bytes in buffer order.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::U8(v) => v.clone(),
            Self::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::I64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::F64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        }
    }
}

/// Element types an [`Array`] can be built from.
pub trait Element: Copy + Send + Sync + 'static {
    /// Wrap a vector of elements.
    fn into_buffer(data: Vec<Self>) -> Buffer;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                fn into_buffer(data: Vec<Self>) -> Buffer {
                    Buffer::$variant(data)
                }
            }
        )*
    };
}

impl_element!(u8 => U8, i32 => I32, i64 => I64, f32 => F32, f64 => F64);

/// Dense numeric n-d array.
///
/// ```rust
/// use trueno_pipeline::fingerprint::{Array, Layout};
///
/// # fn main() -> trueno_pipeline::Result<()> {
/// let a = Array::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]])?;
/// let f = Array::with_layout(vec![2, 2], vec![1.0, 3.0, 2.0, 4.0], Layout::ColumnMajor)?;
/// assert_eq!(a.get_f64(&[0, 1]), Some(2.0));
/// assert_eq!(f.get_f64(&[0, 1]), Some(2.0));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    shape: Vec<usize>,
    layout: Layout,
    buffer: Buffer,
}

impl Array {
    /// Build a row-major array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `data` does not hold exactly
    /// `shape.iter().product()` elements.
    pub fn new<T: Element>(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        Self::with_layout(shape, data, Layout::RowMajor)
    }

    /// Build an array whose buffer is in the given layout.
    ///
    /// # Errors
    ///
    /// Same as [`Array::new`].
    pub fn with_layout<T: Element>(shape: Vec<usize>, data: Vec<T>, layout: Layout) -> Result<Self> {
        Self::from_buffer(shape, T::into_buffer(data), layout)
    }

    /// Build an array from an already typed buffer.
    ///
    /// # Errors
    ///
    /// Same as [`Array::new`].
    pub fn from_buffer(shape: Vec<usize>, buffer: Buffer, layout: Layout) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if buffer.len() != expected {
            return Err(Error::TypeMismatch(format!(
                "array of shape {shape:?} needs {expected} elements, got {}",
                buffer.len()
            )));
        }
        Ok(Self {
            shape,
            layout,
            buffer,
        })
    }

    /// One-dimensional array.
    #[must_use]
    pub fn vector<T: Element>(data: Vec<T>) -> Self {
        Self {
            shape: vec![data.len()],
            layout: Layout::RowMajor,
            buffer: T::into_buffer(data),
        }
    }

    /// Two-dimensional array from equally long rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the rows are ragged.
    pub fn from_rows<T: Element>(rows: Vec<Vec<T>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
            return Err(Error::TypeMismatch(format!(
                "ragged rows: row {bad} has {} columns, expected {cols}",
                rows[bad].len()
            )));
        }
        let shape = vec![rows.len(), cols];
        Self::new(shape, rows.into_iter().flatten().collect())
    }

    /// Array dimensions.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the array has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Element type.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.buffer.dtype()
    }

    /// Buffer layout.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Raw buffer in [`Array::layout`] order.
    #[must_use]
    pub const fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.shape.len()];
        match self.layout {
            Layout::RowMajor => {
                for axis in (0..self.shape.len().saturating_sub(1)).rev() {
                    strides[axis] = strides[axis + 1] * self.shape[axis + 1];
                }
            }
            Layout::ColumnMajor => {
                for axis in 1..self.shape.len() {
                    strides[axis] = strides[axis - 1] * self.shape[axis - 1];
                }
            }
        }
        strides
    }

    /// Element at a multi-index, widened to `f64`.
    #[must_use]
    pub fn get_f64(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, n)| i >= n) {
            return None;
        }
        let offset = index.iter().zip(self.strides()).map(|(i, s)| i * s).sum();
        self.buffer.get_f64(offset)
    }

    /// Copy of this array with a row-major buffer.
    #[must_use]
    pub fn to_contiguous(&self) -> Self {
        if self.layout == Layout::RowMajor || self.shape.len() < 2 {
            return Self {
                shape: self.shape.clone(),
                layout: Layout::RowMajor,
                buffer: self.buffer.clone(),
            };
        }
        let strides = self.strides();
        let mut index = vec![0usize; self.shape.len()];
        let mut order = Vec::with_capacity(self.len());
        for _ in 0..self.len() {
            order.push(index.iter().zip(&strides).map(|(i, s)| i * s).sum());
            // Advance the multi-index in row-major order.
            for axis in (0..index.len()).rev() {
                index[axis] += 1;
                if index[axis] < self.shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        Self {
            shape: self.shape.clone(),
            layout: Layout::RowMajor,
            buffer: self.buffer.reorder(&order),
        }
    }

    /// All elements widened to `f64`, in row-major order.
    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let contiguous = self.to_contiguous();
        (0..contiguous.len())
            .filter_map(|i| contiguous.buffer.get_f64(i))
            .collect()
    }

    /// Row `i` of a two-dimensional array, widened to `f64`.
    #[must_use]
    pub fn row(&self, i: usize) -> Option<Vec<f64>> {
        let &[rows, cols] = self.shape.as_slice() else {
            return None;
        };
        if i >= rows {
            return None;
        }
        (0..cols).map(|j| self.get_f64(&[i, j])).collect()
    }
}
