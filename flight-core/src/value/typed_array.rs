// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::fmt;
use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use paste::paste;

use crate::ensure;
use crate::error::Error;
use crate::types::TypedArrayKind;

struct TypedArrayInner {
    kind: TypedArrayKind,
    bytes: Bytes,
}

/// A typed array, `ArrayBuffer` or `DataView`: raw bytes plus an element kind.
///
/// Elements are little endian on the wire.
#[derive(Clone)]
pub struct TypedArray(Rc<TypedArrayInner>);

impl TypedArray {
    /// Wraps `bytes`, checking they hold a whole number of elements.
    pub fn new(kind: TypedArrayKind, bytes: impl Into<Bytes>) -> Result<Self, Error> {
        let bytes = bytes.into();
        ensure!(
            bytes.len() % kind.element_size() == 0,
            Error::invalid_data(format!(
                "Byte length {} is not a multiple of the {:?} element size {}",
                bytes.len(),
                kind,
                kind.element_size()
            ))
        );
        Ok(TypedArray(Rc::new(TypedArrayInner { kind, bytes })))
    }

    pub fn array_buffer(bytes: impl Into<Bytes>) -> Self {
        TypedArray(Rc::new(TypedArrayInner {
            kind: TypedArrayKind::ArrayBuffer,
            bytes: bytes.into(),
        }))
    }

    pub fn data_view(bytes: impl Into<Bytes>) -> Self {
        TypedArray(Rc::new(TypedArrayInner {
            kind: TypedArrayKind::DataView,
            bytes: bytes.into(),
        }))
    }

    pub fn from_u8(items: &[u8]) -> Self {
        TypedArray(Rc::new(TypedArrayInner {
            kind: TypedArrayKind::Uint8,
            bytes: Bytes::copy_from_slice(items),
        }))
    }

    pub fn from_u8_clamped(items: &[u8]) -> Self {
        TypedArray(Rc::new(TypedArrayInner {
            kind: TypedArrayKind::Uint8Clamped,
            bytes: Bytes::copy_from_slice(items),
        }))
    }

    pub fn from_i8(items: &[i8]) -> Self {
        let bytes: Vec<u8> = items.iter().map(|v| *v as u8).collect();
        TypedArray(Rc::new(TypedArrayInner {
            kind: TypedArrayKind::Int8,
            bytes: Bytes::from(bytes),
        }))
    }

    #[inline(always)]
    pub fn kind(&self) -> TypedArrayKind {
        self.0.kind
    }

    #[inline(always)]
    pub fn bytes(&self) -> &Bytes {
        &self.0.bytes
    }

    #[inline(always)]
    pub fn byte_len(&self) -> usize {
        self.0.bytes.len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.bytes.len() / self.0.kind.element_size()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    /// Same bytes viewed as another kind.
    pub fn with_kind(&self, kind: TypedArrayKind) -> Result<Self, Error> {
        TypedArray::new(kind, self.0.bytes.clone())
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &TypedArray) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[inline(always)]
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

macro_rules! impl_typed_array_elements {
    ($($kind:ident => $ty:ident),* $(,)?) => {
        paste! {
            impl TypedArray {
                $(
                    #[doc = concat!("Builds a `", stringify!($kind), "` array.")]
                    pub fn [<from_ $ty>](items: &[$ty]) -> Self {
                        let mut bytes = vec![0u8; items.len() * std::mem::size_of::<$ty>()];
                        LittleEndian::[<write_ $ty _into>](items, &mut bytes);
                        TypedArray(Rc::new(TypedArrayInner {
                            kind: TypedArrayKind::$kind,
                            bytes: Bytes::from(bytes),
                        }))
                    }

                    #[doc = concat!("Reads the elements of a `", stringify!($kind), "` array.")]
                    pub fn [<to_ $ty _vec>](&self) -> Option<Vec<$ty>> {
                        if self.0.kind != TypedArrayKind::$kind {
                            return None;
                        }
                        let mut items = vec![<$ty>::default(); self.len()];
                        LittleEndian::[<read_ $ty _into>](&self.0.bytes, &mut items);
                        Some(items)
                    }
                )*
            }
        }
    };
}

impl_typed_array_elements!(
    Int16 => i16,
    Uint16 => u16,
    Int32 => i32,
    Uint32 => u32,
    Float32 => f32,
    Float64 => f64,
    BigInt64 => i64,
    BigUint64 => u64,
);

impl PartialEq for TypedArray {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.0.kind == other.0.kind && self.0.bytes == other.0.bytes)
    }
}

impl fmt::Debug for TypedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedArray")
            .field("kind", &self.0.kind)
            .field("bytes", &self.0.bytes)
            .finish()
    }
}

struct BlobInner {
    mime_type: String,
    bytes: Bytes,
}

/// Immutable bytes with a MIME type.
#[derive(Clone)]
pub struct Blob(Rc<BlobInner>);

impl Blob {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Blob(Rc::new(BlobInner {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }))
    }

    pub fn mime_type(&self) -> &str {
        &self.0.mime_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0.bytes
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &Blob) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[inline(always)]
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.mime_type == other.0.mime_type && self.0.bytes == other.0.bytes)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("type", &self.0.mime_type)
            .field("size", &self.0.bytes.len())
            .finish()
    }
}
