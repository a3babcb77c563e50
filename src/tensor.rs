//! Dense tensor buffer and strided views
//!
//! [`Tensor`] is the unit every other component operates on: a shape plus
//! contiguous row-major storage, with the invariant
//! `data.len() == shape.iter().product()` enforced at construction.
//!
//! [`TensorView`] is a non-owning 2-D shape+stride descriptor over a slice
//! of some buffer's storage. It is how per-head sub-tensors are carved out
//! of a projected `(batch * seq, hidden)` buffer without copying: a head is
//! a `(seq, head_size)` view whose rows are `hidden` elements apart. The
//! borrow checker guarantees a view never outlives the buffer it slices.

use crate::error::{AtentoError, Result};

/// Dense multi-dimensional buffer with contiguous row-major storage
///
/// # Examples
///
/// ```
/// use atento::Tensor;
///
/// let t = Tensor::from_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
/// assert_eq!(t.shape(), &[2, 3]);
/// assert_eq!(t.data().len(), 6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    /// Dimension sizes, outermost first
    shape: Vec<usize>,
    /// Contiguous row-major storage, length == product(shape)
    data: Vec<T>,
}

impl<T: Copy> Tensor<T> {
    /// Create a tensor from a shape and matching flat data
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::InvalidShape`] if the shape is empty, any
    /// dimension is zero, or `data.len()` does not equal the shape product.
    pub fn from_vec(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        if shape.is_empty() {
            return Err(AtentoError::InvalidShape {
                reason: "shape must have at least one dimension".to_string(),
            });
        }
        if shape.contains(&0) {
            return Err(AtentoError::InvalidShape {
                reason: format!("shape {shape:?} contains a zero dimension"),
            });
        }
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(AtentoError::InvalidShape {
                reason: format!(
                    "data length {} doesn't match shape {:?} (expected {})",
                    data.len(),
                    shape,
                    expected
                ),
            });
        }
        Ok(Self { shape, data })
    }

    /// Get the shape
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the flat data slice
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Get the flat data slice mutably
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Total number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a constructed tensor (zero dims are rejected)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the tensor, returning its flat storage
    #[must_use]
    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// View the tensor flattened to 2-D as `(rows, cols)`
    ///
    /// The trailing dimension becomes `cols`; all leading dimensions are
    /// collapsed into `rows`. Used to treat a `(batch, seq, hidden)` input
    /// as a `(batch * seq, hidden)` matrix for batched projection.
    #[must_use]
    pub fn as_matrix(&self) -> TensorView<'_, T> {
        let cols = *self.shape.last().expect("shape is non-empty");
        let rows = self.data.len() / cols;
        TensorView {
            data: &self.data,
            rows,
            cols,
            row_stride: cols,
        }
    }
}

impl<T: Copy + Default> Tensor<T> {
    /// Create a zero-filled tensor
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::InvalidShape`] for empty or zero-dim shapes.
    pub fn zeros(shape: Vec<usize>) -> Result<Self> {
        let len: usize = shape.iter().product();
        Self::from_vec(shape, vec![T::default(); len])
    }
}

/// Non-owning 2-D view: shape + row stride over borrowed storage
///
/// Rows are `row_stride` elements apart in the underlying slice; each row
/// is `cols` contiguous elements. `row_stride >= cols` allows a view to
/// select a column band out of a wider matrix, which is exactly the
/// per-head split of a `(tokens, hidden)` buffer.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, T> {
    data: &'a [T],
    rows: usize,
    cols: usize,
    row_stride: usize,
}

impl<'a, T> TensorView<'a, T> {
    /// Create a strided view over `data`
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::InvalidShape`] if the last row would read
    /// past the end of `data` or if `row_stride < cols`.
    pub fn new(data: &'a [T], rows: usize, cols: usize, row_stride: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(AtentoError::InvalidShape {
                reason: format!("view dimensions ({rows}, {cols}) must be non-zero"),
            });
        }
        if row_stride < cols {
            return Err(AtentoError::InvalidShape {
                reason: format!("row stride {row_stride} is smaller than row length {cols}"),
            });
        }
        let last_end = (rows - 1) * row_stride + cols;
        if last_end > data.len() {
            return Err(AtentoError::InvalidShape {
                reason: format!(
                    "view of {rows}x{cols} with stride {row_stride} needs {last_end} elements, buffer has {}",
                    data.len()
                ),
            });
        }
        Ok(Self {
            data,
            rows,
            cols,
            row_stride,
        })
    }

    /// Number of rows
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Row length
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Get row `i` as a contiguous slice of the underlying buffer
    ///
    /// # Panics
    ///
    /// Panics if `i >= rows` (an internal indexing bug, not a caller
    /// condition; all public entry points validate dimensions first).
    #[must_use]
    pub fn row(&self, i: usize) -> &'a [T] {
        let start = i * self.row_stride;
        &self.data[start..start + self.cols]
    }
}

impl<'a, T> TensorView<'a, T> {
    /// View one attention head of a projected `(tokens, hidden)` buffer
    ///
    /// Selects the `(seq, head_size)` sub-tensor for `(batch_idx, head_idx)`
    /// by offset and stride alone; no data is moved.
    ///
    /// # Errors
    ///
    /// Returns [`AtentoError::InvalidShape`] if the head's offset or extent
    /// falls outside the buffer.
    pub fn head(
        data: &'a [T],
        batch_idx: usize,
        head_idx: usize,
        seq: usize,
        hidden: usize,
        head_size: usize,
    ) -> Result<Self> {
        let offset = batch_idx * seq * hidden + head_idx * head_size;
        if offset >= data.len() {
            return Err(AtentoError::InvalidShape {
                reason: format!(
                    "head offset {offset} out of range for buffer of {}",
                    data.len()
                ),
            });
        }
        Self::new(&data[offset..], seq, head_size, hidden)
    }
}
