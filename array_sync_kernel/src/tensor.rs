//! Tensor Value — shape, element type and a row-major byte buffer.
//!
//! A TensorValue is immutable once constructed. "Changing" an array always
//! means building a new value (`with_element`, `splice_segment`) and
//! installing it; the buffer of a published value is never written again.
//! That is what lets the encoder read without taking a lock.

use bytes::{Bytes, BytesMut};

use crate::dtype::ElementType;
use crate::error::ArrayError;
use crate::shape::Shape;

mod sealed {
    /// Byte conversions, reachable only from inside the crate.
    pub trait Sealed: Sized {
        /// Append the native-endian bytes of `self`.
        fn extend_ne(self, out: &mut Vec<u8>);

        /// Read a value from native-endian bytes. `raw` must be exactly the
        /// element width long; callers slice it from a checked buffer.
        fn from_ne(raw: &[u8]) -> Self;
    }
}

/// Native scalar types that map onto a registry element type.
pub trait Element: Copy + sealed::Sealed {
    const DTYPE: ElementType;
}

macro_rules! impl_element {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: ElementType = ElementType::$kind;
            }

            impl sealed::Sealed for $t {
                fn extend_ne(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }

                fn from_ne(raw: &[u8]) -> Self {
                    let mut bytes = [0u8; std::mem::size_of::<$t>()];
                    bytes.copy_from_slice(raw);
                    <$t>::from_ne_bytes(bytes)
                }
            }
        )*
    };
}

impl_element! {
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
}

impl Element for bool {
    const DTYPE: ElementType = ElementType::Bool;
}

impl sealed::Sealed for bool {
    fn extend_ne(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn from_ne(raw: &[u8]) -> Self {
        raw[0] != 0
    }
}

/// An immutable N-dimensional array snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorValue {
    shape: Shape,
    dtype: ElementType,
    buffer: Bytes,
}

impl TensorValue {
    /// Build a value, rejecting any buffer whose length is not
    /// `product(shape) * width(dtype)`.
    pub fn new(
        shape: impl Into<Shape>,
        dtype: ElementType,
        buffer: impl Into<Bytes>,
    ) -> Result<Self, ArrayError> {
        let shape = shape.into();
        let buffer = buffer.into();
        let expected = shape.byte_len(dtype.width());
        if expected != Some(buffer.len()) {
            return Err(ArrayError::ShapeBufferMismatch {
                shape: shape.dims().to_vec(),
                dtype,
                expected,
                actual: buffer.len(),
            });
        }
        Ok(Self {
            shape,
            dtype,
            buffer,
        })
    }

    /// All-zero array of the given shape.
    pub fn zeros(shape: impl Into<Shape>, dtype: ElementType) -> Result<Self, ArrayError> {
        let shape = shape.into();
        let len = shape
            .byte_len(dtype.width())
            .ok_or_else(|| ArrayError::ShapeBufferMismatch {
                shape: shape.dims().to_vec(),
                dtype,
                expected: None,
                actual: 0,
            })?;
        Self::new(shape, dtype, vec![0u8; len])
    }

    /// Pack typed elements (row-major) into a new value.
    pub fn from_elements<T: Element>(
        shape: impl Into<Shape>,
        elements: &[T],
    ) -> Result<Self, ArrayError> {
        let mut raw = Vec::with_capacity(elements.len() * T::DTYPE.width());
        for &e in elements {
            e.extend_ne(&mut raw);
        }
        Self::new(shape, T::DTYPE, raw)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> ElementType {
        self.dtype
    }

    /// Raw row-major bytes in native byte order.
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    pub fn element_count(&self) -> usize {
        self.buffer.len() / self.dtype.width()
    }

    pub fn byte_len(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes of the element at flat (row-major) `index`.
    pub fn element_bytes(&self, index: usize) -> Result<&[u8], ArrayError> {
        let len = self.element_count();
        if index >= len {
            return Err(ArrayError::IndexOutOfBounds { index, len });
        }
        let width = self.dtype.width();
        Ok(&self.buffer[index * width..(index + 1) * width])
    }

    /// Typed read of the element at flat `index`.
    pub fn get<T: Element>(&self, index: usize) -> Result<T, ArrayError> {
        self.check_dtype(T::DTYPE)?;
        self.element_bytes(index).map(T::from_ne)
    }

    /// A new value equal to this one except at flat `index`.
    pub fn with_element<T: Element>(&self, index: usize, value: T) -> Result<Self, ArrayError> {
        self.check_dtype(T::DTYPE)?;
        let len = self.element_count();
        if index >= len {
            return Err(ArrayError::IndexOutOfBounds { index, len });
        }
        let mut raw = Vec::with_capacity(T::DTYPE.width());
        value.extend_ne(&mut raw);
        self.splice_segment(index, &raw)
    }

    /// Raw bytes of the flat element range `start..stop`. Zero-copy.
    pub fn segment_bytes(&self, start: usize, stop: usize) -> Result<Bytes, ArrayError> {
        let len = self.element_count();
        if start > stop || stop > len {
            return Err(ArrayError::SegmentOutOfRange { start, stop, len });
        }
        let width = self.dtype.width();
        Ok(self.buffer.slice(start * width..stop * width))
    }

    /// A new value with `data` written over the elements starting at flat
    /// `start`. `data` must hold a whole number of elements.
    pub fn splice_segment(&self, start: usize, data: &[u8]) -> Result<Self, ArrayError> {
        let width = self.dtype.width();
        let len = self.element_count();
        let count = data.len() / width;
        let stop = start.saturating_add(count);
        if data.len() % width != 0 || stop > len {
            return Err(ArrayError::SegmentOutOfRange { start, stop, len });
        }
        let mut next = BytesMut::from(&self.buffer[..]);
        next[start * width..stop * width].copy_from_slice(data);
        Ok(Self {
            shape: self.shape.clone(),
            dtype: self.dtype,
            buffer: next.freeze(),
        })
    }

    fn check_dtype(&self, actual: ElementType) -> Result<(), ArrayError> {
        if self.dtype != actual {
            return Err(ArrayError::ElementTypeMismatch {
                expected: self.dtype,
                actual,
            });
        }
        Ok(())
    }
}
