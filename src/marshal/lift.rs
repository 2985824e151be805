//! Native slot to script value.

use super::{Marshaler, MarshalError, element_addr};
use crate::logging::trace;
use crate::native::{Argument, NODE_NEXT};
use crate::types::{ArrayLength, Category, TypeDescriptor, int_layout};
use crate::value::Value;

impl Marshaler<'_> {
    /// Lift a native slot into a script value.
    ///
    /// `length` is required for arrays that do not terminate themselves;
    /// exactly that many elements are read. With `force_copy`, structured
    /// values are duplicated because the native side keeps (and will free)
    /// the original; otherwise the new wrapper adopts the pointer. A pointer
    /// already backing a live wrapper always yields that wrapper.
    pub fn to_script(
        &self,
        ty: &TypeDescriptor,
        slot: Argument,
        length: Option<usize>,
        force_copy: bool,
    ) -> Result<Value, MarshalError> {
        let value = match &ty.category {
            Category::Void if ty.is_pointer => match slot.as_ptr() {
                0 => Value::Null,
                ptr => Value::Number(ptr as f64),
            },
            Category::Void => Value::Undefined,
            Category::Boolean => Value::Bool(slot.as_bool()),
            Category::Integer { bits, signed } => Value::Number(slot.as_int(*bits, *signed) as f64),
            Category::Float { bits: 32 } => Value::Number(f64::from(slot.as_f32())),
            Category::Float { .. } => Value::Number(slot.as_f64()),
            Category::GType => Value::Number(slot.as_u64() as f64),
            Category::EnumLike { storage, .. } => {
                let (bits, signed) = int_layout(*storage).unwrap_or((32, false));
                Value::Number(slot.as_int(bits, signed) as f64)
            }
            Category::Unichar => {
                let code = slot.as_u32();
                let c = char::from_u32(code).ok_or(MarshalError::InvalidChar(code))?;
                Value::from(c.to_string())
            }
            Category::String { .. } => match slot.as_ptr() {
                0 => Value::Null,
                ptr => Value::from(self.native.read_cstr(ptr)?),
            },
            Category::Structured { .. } | Category::Object => {
                self.lift_instance(ty, slot.as_ptr(), force_copy)?
            }
            Category::Callback { .. } => match slot.as_ptr() {
                0 => Value::Null,
                addr => {
                    let table = self.native.trampolines();
                    let trampoline = table
                        .get(addr)
                        .ok_or(MarshalError::UnknownTrampoline(addr))?;
                    Value::Function(trampoline.function.clone())
                }
            },
            Category::Array { .. } => match slot.as_ptr() {
                0 => Value::Null,
                ptr => {
                    let count = self.array_length(ty, ptr, length)?;
                    self.array_to_script(ty, ptr, count, force_copy)?
                }
            },
            Category::List { element, .. } => {
                let mut items = Vec::new();
                let mut node = slot.as_ptr();
                while node != 0 {
                    let data = self.native.load(node, 8)?;
                    items.push(self.to_script(element, data, None, force_copy)?);
                    node = self.native.load_ptr(element_addr(node, 1, NODE_NEXT as usize)?)?;
                }
                Value::from(items)
            }
            Category::Hash { .. } | Category::Error => {
                return Err(MarshalError::Unsupported(format!(
                    "cannot convert {} to a script value",
                    ty.display_name()
                )));
            }
        };
        Ok(value)
    }

    fn lift_instance(&self, ty: &TypeDescriptor, ptr: u64, force_copy: bool) -> Result<Value, MarshalError> {
        if ptr == 0 {
            return Ok(Value::Null);
        }
        if let Some(obj) = self.native.cached_wrapper(ptr) {
            trace!(ptr, "returning existing wrapper");
            return Ok(Value::Object(obj));
        }
        let type_name = ty.display_name();
        let obj = match ty.category {
            Category::Structured { size, .. } if force_copy || ty.is_inline_struct() => {
                let size = size.ok_or_else(|| {
                    MarshalError::Unsupported(format!("cannot copy {type_name} of unknown size"))
                })?;
                let copy = self.native.copy_block(ptr, size)?;
                self.native.wrap(copy, &type_name, true)
            }
            Category::Structured { .. } => self.native.wrap(ptr, &type_name, true),
            // Objects are shared, never copied; without a transferred
            // reference the wrapper does not own one.
            _ => self.native.wrap(ptr, &type_name, !force_copy),
        };
        Ok(Value::Object(obj))
    }

    /// Element count of a native array: the supplied length, else the
    /// declared fixed size, else a scan for the terminator.
    pub(crate) fn array_length(
        &self,
        ty: &TypeDescriptor,
        ptr: u64,
        length: Option<usize>,
    ) -> Result<usize, MarshalError> {
        let Category::Array {
            element,
            length: mode,
            ..
        } = &ty.category
        else {
            return Err(MarshalError::Unsupported(ty.display_name()));
        };
        match (length, mode) {
            (Some(n), _) => Ok(n),
            (None, ArrayLength::Fixed(n)) => Ok(*n),
            (None, ArrayLength::ZeroTerminated) => self.terminated_length(element, ptr),
            (None, ArrayLength::Parameter(_) | ArrayLength::Unspecified) => {
                Err(MarshalError::LengthRequired(ty.display_name()))
            }
        }
    }

    fn terminated_length(&self, element: &TypeDescriptor, ptr: u64) -> Result<usize, MarshalError> {
        let esize = element.size();
        let mut count = 0;
        loop {
            let heap = self.native.heap();
            let bytes = heap.read(element_addr(ptr, count, esize)?, esize)?;
            if bytes.iter().all(|b| *b == 0) {
                return Ok(count);
            }
            count += 1;
        }
    }

    /// Convert `length` elements of a C array buffer.
    ///
    /// Inline struct elements live in the buffer itself and are always
    /// copied out.
    pub fn array_to_script(
        &self,
        ty: &TypeDescriptor,
        data: u64,
        length: usize,
        force_copy: bool,
    ) -> Result<Value, MarshalError> {
        let Category::Array { element, .. } = &ty.category else {
            return Err(MarshalError::Unsupported(ty.display_name()));
        };
        let esize = element.size();
        // Not pre-sized: `length` is native data and may be implausible.
        let mut items = Vec::new();
        for i in 0..length {
            let addr = element_addr(data, i, esize)?;
            let item = if element.is_inline_struct() {
                self.lift_instance(element, addr, true)?
            } else {
                let slot = self.native.load(addr, esize)?;
                self.to_script(element, slot, None, force_copy)?
            };
            items.push(item);
        }
        trace!(ty = %ty.display_name(), length, "lifted array");
        Ok(Value::from(items))
    }
}
