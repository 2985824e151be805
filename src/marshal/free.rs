//! Ownership-aware release of native values.

use super::{Marshaler, MarshalError, element_addr};
use crate::logging::trace;
use crate::native::{Argument, NODE_NEXT};
use crate::repository::{Direction, Transfer};
use crate::types::{Category, TypeDescriptor};

/// What a release pass frees.
#[derive(Debug, Clone, Copy)]
struct Ownership {
    /// The block the slot points at.
    container: bool,
    /// Memory owned by container elements.
    elements: bool,
    /// Struct and object pointers that came from script wrappers or were
    /// adopted by them.
    references: bool,
}

impl Ownership {
    /// Which parts the bridge holds after a value crossed in `direction`.
    ///
    /// Outbound, the transfer says what the caller received. Inbound, the
    /// bridge allocated everything and keeps what the callee did not take.
    fn held(transfer: Transfer, direction: Direction) -> Self {
        let (container, elements) = match (direction, transfer) {
            (Direction::In, Transfer::Nothing) => (true, true),
            (Direction::In, Transfer::Container) => (false, true),
            (Direction::In, Transfer::Everything) => (false, false),
            (_, Transfer::Nothing) => (false, false),
            (_, Transfer::Container) => (true, false),
            (_, Transfer::Everything) => (true, true),
        };
        Self {
            container,
            elements,
            references: direction != Direction::In,
        }
    }

    fn nested(self) -> Self {
        Self {
            container: true,
            elements: true,
            references: self.references,
        }
    }
}

/// Whether array elements of this type hold memory a release pass must visit.
fn element_holds_memory(element: &TypeDescriptor, references: bool) -> bool {
    match element.category {
        Category::String { .. } | Category::Array { .. } | Category::List { .. } | Category::Error => true,
        Category::Structured { .. } if element.is_inline_struct() => false,
        Category::Structured { .. } | Category::Object => references,
        _ => false,
    }
}

impl Marshaler<'_> {
    /// Release what the bridge owns of `slot` after it crossed the boundary.
    ///
    /// For outbound values (`Out`, `Inout`) this frees what the transfer
    /// handed to the caller: nothing, the container, or everything. For
    /// inbound values it frees the bridge's own copies the callee did not
    /// take over. `length` is the element count for arrays that do not
    /// carry their own.
    pub fn free(
        &self,
        ty: &TypeDescriptor,
        slot: Argument,
        transfer: Transfer,
        direction: Direction,
        length: Option<usize>,
    ) -> Result<(), MarshalError> {
        self.release(ty, slot, Ownership::held(transfer, direction), length)
    }

    /// Success-path release of an output that was just lifted with
    /// `force_copy = transfer != Everything`. Pointers adopted by wrappers
    /// are left alone; strings and containers are freed per the transfer.
    pub fn release_after_lift(
        &self,
        ty: &TypeDescriptor,
        slot: Argument,
        transfer: Transfer,
        length: Option<usize>,
    ) -> Result<(), MarshalError> {
        let mut own = Ownership::held(transfer, Direction::Out);
        own.references = false;
        self.release(ty, slot, own, length)
    }

    fn release(
        &self,
        ty: &TypeDescriptor,
        slot: Argument,
        own: Ownership,
        length: Option<usize>,
    ) -> Result<(), MarshalError> {
        let ptr = slot.as_ptr();
        if ptr == 0 {
            return Ok(());
        }
        match &ty.category {
            Category::String { .. } => {
                if own.container {
                    self.native.free(ptr)?;
                }
            }
            // By-value structs are always a block of their own copy.
            Category::Structured { .. } if ty.is_inline_struct() => {
                if own.container {
                    self.native.free(ptr)?;
                }
            }
            Category::Structured { .. } | Category::Object => {
                if own.container && own.references {
                    self.native.free(ptr)?;
                }
            }
            Category::Error => {
                if own.container {
                    self.native.heap_mut().free_error(ptr)?;
                }
            }
            Category::Array { element, .. } => {
                if own.elements && element_holds_memory(element, own.references) {
                    let count = self.array_length(ty, ptr, length)?;
                    let esize = element.size();
                    for i in 0..count {
                        let item = self.native.load(element_addr(ptr, i, esize)?, esize)?;
                        self.release(element, item, own.nested(), None)?;
                    }
                }
                if own.container {
                    self.native.free(ptr)?;
                }
            }
            Category::List { element, .. } => {
                let mut node = ptr;
                while node != 0 {
                    let next = self.native.load_ptr(element_addr(node, 1, NODE_NEXT as usize)?)?;
                    if own.elements {
                        let data = self.native.load(node, 8)?;
                        self.release(element, data, own.nested(), None)?;
                    }
                    if own.container {
                        self.native.free(node)?;
                    }
                    node = next;
                }
            }
            _ => {}
        }
        trace!(ty = %ty.display_name(), ptr, ?own, "released");
        Ok(())
    }
}
