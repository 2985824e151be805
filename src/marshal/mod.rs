//! Bidirectional value conversion between script values and native slots.
//!
//! Lowering ([`Marshaler::to_native`]) turns a [`Value`] into an
//! [`Argument`], allocating native memory where the type needs it. Lifting
//! ([`Marshaler::to_script`]) goes the other way. [`Marshaler::free`] releases
//! whatever the ownership transfer leaves with the bridge.
//!
//! Conversions dispatch on a [`TypeDescriptor`]; callers classify the
//! metadata once and reuse the descriptor.
//!
//! [`Value`]: crate::value::Value
//! [`Argument`]: crate::native::Argument

mod callback;
mod error;
mod free;
mod lift;
mod lower;

pub use callback::{
    DESTROY_NOTIFY_ADDR, Release, TRAMPOLINE_BASE, Trampoline, TrampolineTable, call_trampoline,
    release_for,
};
pub use error::MarshalError;

use crate::native::{Argument, NativeContext};
use crate::repository::{Repository, TypeInfo};
use crate::types::{Category, TypeDescriptor, classify, int_layout};

/// Converts values for one runtime.
#[derive(Clone, Copy)]
pub struct Marshaler<'a> {
    repo: &'a dyn Repository,
    native: &'a NativeContext,
}

impl<'a> Marshaler<'a> {
    pub fn new(repo: &'a dyn Repository, native: &'a NativeContext) -> Self {
        Self { repo, native }
    }

    pub fn repository(&self) -> &'a dyn Repository {
        self.repo
    }

    pub fn native(&self) -> &'a NativeContext {
        self.native
    }

    /// Classify a type occurrence against this marshaler's repository.
    pub fn classify(&self, ty: &TypeInfo) -> Result<TypeDescriptor, MarshalError> {
        Ok(classify(self.repo, ty)?)
    }

    /// Read an array length out of an integer slot. Negative counts are
    /// treated as empty.
    pub fn length_value(&self, ty: &TypeDescriptor, slot: Argument) -> usize {
        let layout = match &ty.category {
            Category::Integer { bits, signed } => Some((*bits, *signed)),
            Category::EnumLike { storage, .. } => int_layout(*storage),
            _ => None,
        };
        let (bits, signed) = layout.unwrap_or((64, false));
        usize::try_from(slot.as_int(bits, signed)).unwrap_or(0)
    }
}

/// Address of element `index` in a buffer of `size`-byte elements at `base`.
///
/// Counts and pointers come from native code, so the arithmetic is checked.
pub(crate) fn element_addr(base: u64, index: usize, size: usize) -> Result<u64, MarshalError> {
    index
        .checked_mul(size)
        .and_then(|offset| u64::try_from(offset).ok())
        .and_then(|offset| base.checked_add(offset))
        .ok_or(MarshalError::AddressOverflow { base, index })
}
