//! Script value to native slot.

use super::{Marshaler, MarshalError, Release, release_for};
use crate::config::UnscopedCallbackPolicy;
use crate::logging::{debug, trace};
use crate::native::{Argument, LIST_NODE_SIZE, NODE_NEXT, NODE_PREV, SLIST_NODE_SIZE};
use crate::repository::{ArrayType, Direction, Transfer};
use crate::types::{ArrayLength, Category, TypeDescriptor, int_layout};
use crate::value::{NativeObject, Value};

/// Truncate a script number to `bits`. Out of range values wrap; this is
/// the documented narrowing behavior, not an error.
pub(crate) fn truncate(n: f64, bits: u8) -> u64 {
    let raw = if n < 0.0 { n as i64 as u64 } else { n as u64 };
    if bits >= 64 {
        raw
    } else {
        raw & ((1u64 << bits) - 1)
    }
}

/// Types whose slot is a pointer and can therefore be NULL.
fn accepts_null(ty: &TypeDescriptor) -> bool {
    match ty.category {
        Category::String { .. }
        | Category::Object
        | Category::Callback { .. }
        | Category::Array { .. }
        | Category::List { .. }
        | Category::Hash { .. }
        | Category::Error => true,
        Category::Structured { .. } => !ty.is_inline_struct(),
        Category::Void => ty.is_pointer,
        _ => false,
    }
}

impl Marshaler<'_> {
    pub(crate) fn mismatch(&self, ty: &TypeDescriptor, value: &Value) -> MarshalError {
        MarshalError::TypeMismatch {
            expected: ty.display_name(),
            got: value.describe(),
        }
    }

    fn instance_of(&self, ty: &TypeDescriptor, obj: &NativeObject) -> bool {
        ty.interface
            .as_deref()
            .is_some_and(|expected| self.repo.is_a(obj.type_name(), expected))
    }

    /// Whether `value` can be lowered to `ty`. Pure; allocates nothing.
    pub fn can_convert(&self, ty: &TypeDescriptor, value: &Value, nullable: bool) -> bool {
        if value.is_nullish() && !matches!(ty.category, Category::Boolean) {
            return nullable && accepts_null(ty);
        }
        match (&ty.category, value) {
            (Category::Boolean, _) => true,
            (
                Category::Integer { .. }
                | Category::Float { .. }
                | Category::GType
                | Category::EnumLike { .. }
                | Category::Unichar,
                Value::Number(_),
            ) => true,
            (Category::Unichar, Value::String(s)) => s.chars().count() == 1,
            (Category::String { .. }, Value::String(_)) => true,
            (Category::Structured { .. } | Category::Object, Value::Object(obj)) => {
                self.instance_of(ty, obj)
            }
            (Category::Callback { .. }, Value::Function(_)) => true,
            (
                Category::Array {
                    element,
                    length,
                    array_type,
                },
                Value::Array(items),
            ) => {
                let fixed_ok = match length {
                    ArrayLength::Fixed(n) => items.len() == *n,
                    _ => true,
                };
                *array_type == ArrayType::C
                    && fixed_ok
                    && items.iter().all(|item| self.can_convert(element, item, false))
            }
            (Category::List { element, .. }, Value::Array(items)) => {
                items.iter().all(|item| self.can_convert(element, item, false))
            }
            (Category::Void, Value::Object(_) | Value::Number(_)) => ty.is_pointer,
            _ => false,
        }
    }

    /// Lower a value into a native slot.
    ///
    /// Strings, arrays, lists and by-value structs are copied into fresh
    /// native blocks; release them with [`Marshaler::free`] according to the
    /// transfer. Wrapped pointers are passed through as is.
    pub fn to_native(
        &self,
        ty: &TypeDescriptor,
        value: &Value,
        nullable: bool,
        transfer: Transfer,
    ) -> Result<Argument, MarshalError> {
        if value.is_nullish() && !matches!(ty.category, Category::Boolean) {
            if nullable && accepts_null(ty) {
                return Ok(Argument::NULL);
            }
            return Err(self.mismatch(ty, value));
        }

        let number = || value.as_number().ok_or_else(|| self.mismatch(ty, value));

        let arg = match &ty.category {
            Category::Boolean => Argument::from_bool(value.is_truthy()),
            Category::Integer { bits, .. } => Argument::from_u64(truncate(number()?, *bits)),
            Category::Float { bits: 32 } => Argument::from_f32(number()? as f32),
            Category::Float { .. } => Argument::from_f64(number()?),
            Category::GType => Argument::from_u64(truncate(number()?, 64)),
            Category::EnumLike { storage, .. } => {
                let (bits, _) = int_layout(*storage).unwrap_or((32, false));
                Argument::from_u64(truncate(number()?, bits))
            }
            Category::Unichar => self.lower_unichar(ty, value)?,
            Category::String { .. } => {
                let s = value.as_str().ok_or_else(|| self.mismatch(ty, value))?;
                Argument::from_ptr(self.native.strdup(s)?)
            }
            Category::Structured { size, .. } => {
                let obj = self.expect_instance(ty, value)?;
                if ty.is_inline_struct() {
                    let size = size.ok_or_else(|| {
                        MarshalError::Unsupported(format!("{} has no known size", ty.display_name()))
                    })?;
                    Argument::from_ptr(self.native.copy_block(obj.ptr(), size)?)
                } else {
                    Argument::from_ptr(obj.ptr())
                }
            }
            Category::Object => Argument::from_ptr(self.expect_instance(ty, value)?.ptr()),
            Category::Callback { .. } => {
                let release = release_unscoped(self.native.unscoped_policy());
                self.lower_callback(ty, value, nullable, release)?
            }
            Category::Array { .. } => self.lower_array(ty, value, nullable, transfer)?.0,
            Category::List { .. } => self.lower_list(ty, value, transfer)?,
            Category::Void if ty.is_pointer => match value {
                Value::Object(obj) => Argument::from_ptr(obj.ptr()),
                Value::Number(n) => Argument::from_u64(truncate(*n, 64)),
                _ => return Err(self.mismatch(ty, value)),
            },
            Category::Void | Category::Hash { .. } | Category::Error => {
                return Err(MarshalError::Unsupported(format!(
                    "cannot pass {} from script",
                    ty.display_name()
                )));
            }
        };
        trace!(ty = %ty.display_name(), slot = arg.0, "lowered");
        Ok(arg)
    }

    fn expect_instance<'v>(
        &self,
        ty: &TypeDescriptor,
        value: &'v Value,
    ) -> Result<&'v NativeObject, MarshalError> {
        match value {
            Value::Object(obj) if self.instance_of(ty, obj) => Ok(obj),
            _ => Err(self.mismatch(ty, value)),
        }
    }

    fn lower_unichar(&self, ty: &TypeDescriptor, value: &Value) -> Result<Argument, MarshalError> {
        match value {
            Value::Number(n) => Ok(Argument::from_u64(truncate(*n, 32))),
            Value::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Argument::from_u64(u64::from(u32::from(c)))),
                    _ => Err(self.mismatch(ty, value)),
                }
            }
            _ => Err(self.mismatch(ty, value)),
        }
    }

    /// Register a script function as a native function pointer.
    ///
    /// The returned address doubles as the closure token: native code hands
    /// it back as user data, and the destroy notifier releases by it.
    pub fn lower_callback(
        &self,
        ty: &TypeDescriptor,
        value: &Value,
        nullable: bool,
        release: Release,
    ) -> Result<Argument, MarshalError> {
        if value.is_nullish() && nullable {
            return Ok(Argument::NULL);
        }
        let (Category::Callback { name }, Value::Function(function)) = (&ty.category, value) else {
            return Err(self.mismatch(ty, value));
        };
        let signature = self
            .repo
            .resolve(name)
            .and_then(|info| info.signature.clone())
            .ok_or_else(|| MarshalError::Unsupported(format!("callback {name} has no signature")))?;
        let plan = crate::function::CallPlan::derive(self.repo, &signature)?;
        let addr = self
            .native
            .trampolines_mut()
            .register(function.clone(), plan, release);
        debug!(callback = %name, addr, ?release, "registered trampoline");
        Ok(Argument::from_ptr(addr))
    }

    /// Pack a script array into a native buffer.
    ///
    /// Returns the buffer and the element count, which travels out of band
    /// when the array has a length parameter. Zero-terminated arrays get an
    /// extra zeroed element.
    pub fn lower_array(
        &self,
        ty: &TypeDescriptor,
        value: &Value,
        nullable: bool,
        transfer: Transfer,
    ) -> Result<(Argument, usize), MarshalError> {
        let Category::Array {
            element,
            length,
            array_type,
        } = &ty.category
        else {
            return Err(self.mismatch(ty, value));
        };
        if value.is_nullish() && nullable {
            return Ok((Argument::NULL, 0));
        }
        let items = value.as_array().ok_or_else(|| self.mismatch(ty, value))?;
        if *array_type != ArrayType::C {
            return Err(MarshalError::Unsupported(format!("{array_type:?} arrays")));
        }
        if let ArrayLength::Fixed(expected) = length {
            if items.len() != *expected {
                return Err(MarshalError::FixedSizeMismatch {
                    expected: *expected,
                    got: items.len(),
                });
            }
        }

        let count = items.len();
        let esize = element.size();
        let slots = count + usize::from(*length == ArrayLength::ZeroTerminated);
        let ptr = self.native.alloc(slots * esize, element.align());

        for (i, item) in items.iter().enumerate() {
            let addr = ptr + (i * esize) as u64;
            if let Err(err) = self.store_element(element, addr, item, transfer) {
                self.discard_elements(element, ptr, i);
                self.native.free(ptr)?;
                return Err(err);
            }
        }
        trace!(ty = %ty.display_name(), count, "packed array");
        Ok((Argument::from_ptr(ptr), count))
    }

    fn store_element(
        &self,
        element: &TypeDescriptor,
        addr: u64,
        item: &Value,
        transfer: Transfer,
    ) -> Result<(), MarshalError> {
        if element.is_inline_struct() {
            let obj = self.expect_instance(element, item)?;
            let bytes = self.native.heap().read(obj.ptr(), element.size())?.to_vec();
            self.native.heap_mut().write(addr, &bytes)?;
        } else {
            let arg = self.to_native(element, item, false, transfer)?;
            self.native.store(addr, element.size(), arg)?;
        }
        Ok(())
    }

    /// Best-effort release of the first `count` elements of a buffer being
    /// abandoned half way through packing.
    fn discard_elements(&self, element: &TypeDescriptor, ptr: u64, count: usize) {
        if element.is_inline_struct() {
            return;
        }
        let esize = element.size();
        for i in 0..count {
            if let Ok(slot) = self.native.load(ptr + (i * esize) as u64, esize) {
                let _ = self.free(element, slot, Transfer::Nothing, Direction::In, None);
            }
        }
    }

    /// Build a `GList`/`GSList` from a script array. Elements are stored in
    /// the node's pointer-sized data field.
    pub fn lower_list(
        &self,
        ty: &TypeDescriptor,
        value: &Value,
        transfer: Transfer,
    ) -> Result<Argument, MarshalError> {
        let Category::List {
            element,
            singly_linked,
        } = &ty.category
        else {
            return Err(self.mismatch(ty, value));
        };
        let items = value.as_array().ok_or_else(|| self.mismatch(ty, value))?;
        let node_size = if *singly_linked {
            SLIST_NODE_SIZE
        } else {
            LIST_NODE_SIZE
        };

        let mut head = 0u64;
        for item in items.iter().rev() {
            let data = match self.to_native(element, item, false, transfer) {
                Ok(data) => data,
                Err(err) => {
                    let _ = self.free(
                        ty,
                        Argument::from_ptr(head),
                        Transfer::Nothing,
                        Direction::In,
                        None,
                    );
                    return Err(err);
                }
            };
            let node = self.native.alloc(node_size, 8);
            self.native.store(node, 8, data)?;
            self.native.store_ptr(node + NODE_NEXT, head)?;
            if !*singly_linked && head != 0 {
                self.native.store_ptr(head + NODE_PREV, node)?;
            }
            head = node;
        }
        Ok(Argument::from_ptr(head))
    }
}

/// Release policy for callbacks lowered outside of a call plan.
fn release_unscoped(policy: UnscopedCallbackPolicy) -> Release {
    release_for(None, None, policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_wraps() {
        assert_eq!(truncate(300.0, 8), 44);
        assert_eq!(truncate(-1.0, 8), 0xff);
        assert_eq!(truncate(-1.0, 64), u64::MAX);
        assert_eq!(truncate(3.9, 32), 3);
        assert_eq!(truncate(f64::NAN, 32), 0);
        assert_eq!(truncate(65536.0 + 7.0, 16), 7);
    }
}
