//! Type descriptor queries over introspection metadata.
//!
//! [`classify`] turns a [`TypeInfo`] occurrence into a [`TypeDescriptor`]
//! with its interface resolved and container elements classified, which is
//! what the marshaler dispatches on. Sizes follow the native storage of one
//! occurrence: anything held by reference is pointer sized.

use thiserror::Error;

use crate::repository::{ArrayType, InfoType, Repository, TypeInfo, TypeTag};

/// Size of a native pointer.
pub const POINTER_SIZE: usize = 8;

/// Metadata the bridge cannot work with. These indicate broken metadata or
/// bindings, not bad script input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Unhandled tag type: {0}")]
    NoFixedSize(TypeTag),

    #[error("Unresolved interface type: {0}")]
    UnresolvedInterface(String),

    #[error("Interface occurrence without a type name")]
    MissingInterfaceName,

    #[error("Unsupported info type {kind} for {name}")]
    UnsupportedInfo { name: String, kind: InfoType },

    #[error("Container type {0} has no element type")]
    MissingElementType(TypeTag),

    #[error("Enum {0} has an invalid storage type")]
    InvalidStorage(String),
}

/// How the element count of an array is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayLength {
    /// Carried by another argument.
    Parameter(usize),
    /// Declared by the metadata.
    Fixed(usize),
    /// Terminated by a zeroed element.
    ZeroTerminated,
    /// Must be supplied by the caller.
    Unspecified,
}

/// Category of a type occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum Category {
    Void,
    Boolean,
    Integer { bits: u8, signed: bool },
    Float { bits: u8 },
    GType,
    Unichar,
    String { filename: bool },
    /// Enums and flags, stored as an integer of the given tag.
    EnumLike { storage: TypeTag, flags: bool },
    /// Structs, unions and boxed types.
    Structured { size: Option<usize>, by_value: bool },
    /// Objects and interfaces.
    Object,
    /// Callback types; `name` is the qualified callback name.
    Callback { name: String },
    Array {
        element: Box<TypeDescriptor>,
        length: ArrayLength,
        array_type: ArrayType,
    },
    List {
        element: Box<TypeDescriptor>,
        singly_linked: bool,
    },
    Hash {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Error,
}

/// A classified type occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub category: Category,
    pub is_pointer: bool,
    /// Qualified interface name for interface categories.
    pub interface: Option<String>,
}

impl TypeDescriptor {
    fn plain(category: Category, is_pointer: bool) -> Self {
        Self {
            category,
            is_pointer,
            interface: None,
        }
    }

    /// Whether values of this type reference native memory that someone must
    /// release.
    pub fn owns_memory(&self) -> bool {
        match &self.category {
            Category::String { .. }
            | Category::Array { .. }
            | Category::List { .. }
            | Category::Hash { .. }
            | Category::Error
            | Category::Object => true,
            Category::Structured { by_value, .. } => !by_value || self.is_pointer,
            _ => false,
        }
    }

    /// Structs and unions stored inline rather than behind a pointer.
    pub fn is_inline_struct(&self) -> bool {
        matches!(self.category, Category::Structured { by_value: true, .. }) && !self.is_pointer
    }

    /// Pointer-carrying structured or object values.
    pub fn is_reference(&self) -> bool {
        match self.category {
            Category::Object => true,
            Category::Structured { .. } => !self.is_inline_struct(),
            _ => false,
        }
    }

    /// Storage size of one occurrence.
    pub fn size(&self) -> usize {
        match &self.category {
            Category::Void => POINTER_SIZE,
            Category::Boolean => 4,
            Category::Integer { bits, .. } | Category::Float { bits } => usize::from(*bits / 8),
            Category::GType => 8,
            Category::Unichar => 4,
            Category::EnumLike { storage, .. } if !self.is_pointer => {
                tag_size(*storage).unwrap_or(4)
            }
            Category::Structured {
                size: Some(size),
                by_value: true,
            } if !self.is_pointer => *size,
            _ => POINTER_SIZE,
        }
    }

    /// Size of the value as held in an argument slot or out cell. Inline
    /// structs travel as a pointer to their block.
    pub fn slot_size(&self) -> usize {
        if self.is_inline_struct() {
            POINTER_SIZE
        } else {
            self.size()
        }
    }

    /// Diagnostic name: "Number", "String", `Namespace.Name`, `Element[]`.
    pub fn display_name(&self) -> String {
        match &self.category {
            Category::Boolean => "Boolean".to_string(),
            Category::Integer { .. } | Category::Float { .. } => "Number".to_string(),
            Category::GType => "GType".to_string(),
            Category::Unichar => "Char".to_string(),
            Category::String { .. } => "String".to_string(),
            Category::Array { element, .. } | Category::List { element, .. } => {
                format!("{}[]", element.display_name())
            }
            Category::Void => TypeTag::Void.to_string(),
            Category::Hash { .. } => TypeTag::Ghash.to_string(),
            Category::Error => TypeTag::Error.to_string(),
            Category::EnumLike { .. }
            | Category::Structured { .. }
            | Category::Object
            | Category::Callback { .. } => self
                .interface
                .clone()
                .unwrap_or_else(|| TypeTag::Interface.to_string()),
        }
    }

    /// Alignment used when storing one occurrence.
    pub fn align(&self) -> usize {
        self.size().clamp(1, POINTER_SIZE).next_power_of_two()
    }
}

/// Size of a fixed-size tag.
pub fn tag_size(tag: TypeTag) -> Result<usize, TypeError> {
    match tag {
        TypeTag::Boolean => Ok(4),
        TypeTag::Int8 | TypeTag::Uint8 => Ok(1),
        TypeTag::Int16 | TypeTag::Uint16 => Ok(2),
        TypeTag::Int32 | TypeTag::Uint32 => Ok(4),
        TypeTag::Int64 | TypeTag::Uint64 => Ok(8),
        TypeTag::Float => Ok(4),
        TypeTag::Double => Ok(8),
        TypeTag::Gtype => Ok(8),
        TypeTag::Unichar => Ok(4),
        TypeTag::Void
        | TypeTag::Utf8
        | TypeTag::Filename
        | TypeTag::Array
        | TypeTag::Interface
        | TypeTag::Glist
        | TypeTag::Gslist
        | TypeTag::Ghash
        | TypeTag::Error => Err(TypeError::NoFixedSize(tag)),
    }
}

/// Storage size of one occurrence of `ty`.
pub fn byte_size(repo: &dyn Repository, ty: &TypeInfo) -> Result<usize, TypeError> {
    Ok(classify(repo, ty)?.size())
}

/// Width in bits and signedness of an integer tag.
pub fn int_layout(tag: TypeTag) -> Option<(u8, bool)> {
    let layout = match tag {
        TypeTag::Int8 => (8, true),
        TypeTag::Uint8 => (8, false),
        TypeTag::Int16 => (16, true),
        TypeTag::Uint16 => (16, false),
        TypeTag::Int32 => (32, true),
        TypeTag::Uint32 => (32, false),
        TypeTag::Int64 => (64, true),
        TypeTag::Uint64 => (64, false),
        _ => return None,
    };
    Some(layout)
}

fn integer(tag: TypeTag) -> Option<Category> {
    int_layout(tag).map(|(bits, signed)| Category::Integer { bits, signed })
}

fn element(repo: &dyn Repository, ty: &TypeInfo, n: usize) -> Result<Box<TypeDescriptor>, TypeError> {
    let param = ty
        .param_type(n)
        .ok_or(TypeError::MissingElementType(ty.tag))?;
    Ok(Box::new(classify(repo, param)?))
}

/// Classify a type occurrence.
pub fn classify(repo: &dyn Repository, ty: &TypeInfo) -> Result<TypeDescriptor, TypeError> {
    let category = match ty.tag {
        TypeTag::Void => Category::Void,
        TypeTag::Boolean => Category::Boolean,
        TypeTag::Float => Category::Float { bits: 32 },
        TypeTag::Double => Category::Float { bits: 64 },
        TypeTag::Gtype => Category::GType,
        TypeTag::Unichar => Category::Unichar,
        TypeTag::Utf8 => Category::String { filename: false },
        TypeTag::Filename => Category::String { filename: true },
        TypeTag::Error => Category::Error,
        TypeTag::Array => {
            let length = match (ty.array_length, ty.fixed_size) {
                (Some(index), _) => ArrayLength::Parameter(index),
                (None, Some(size)) => ArrayLength::Fixed(size),
                (None, None) if ty.zero_terminated => ArrayLength::ZeroTerminated,
                (None, None) => ArrayLength::Unspecified,
            };
            Category::Array {
                element: element(repo, ty, 0)?,
                length,
                array_type: ty.array_type,
            }
        }
        TypeTag::Glist | TypeTag::Gslist => Category::List {
            element: element(repo, ty, 0)?,
            singly_linked: ty.tag == TypeTag::Gslist,
        },
        TypeTag::Ghash => Category::Hash {
            key: element(repo, ty, 0)?,
            value: element(repo, ty, 1)?,
        },
        TypeTag::Interface => return classify_interface(repo, ty),
        tag => integer(tag).ok_or(TypeError::NoFixedSize(tag))?,
    };
    Ok(TypeDescriptor::plain(category, ty.pointer))
}

fn classify_interface(repo: &dyn Repository, ty: &TypeInfo) -> Result<TypeDescriptor, TypeError> {
    let name = ty.interface.as_deref().ok_or(TypeError::MissingInterfaceName)?;
    let info = repo
        .resolve(name)
        .ok_or_else(|| TypeError::UnresolvedInterface(name.to_string()))?;

    let category = match info.kind {
        InfoType::Struct | InfoType::Union => Category::Structured {
            size: info.size,
            by_value: true,
        },
        InfoType::Boxed => Category::Structured {
            size: info.size,
            by_value: false,
        },
        InfoType::Enum | InfoType::Flags => {
            let storage = info.storage.unwrap_or(TypeTag::Uint32);
            if integer(storage).is_none() {
                return Err(TypeError::InvalidStorage(name.to_string()));
            }
            Category::EnumLike {
                storage,
                flags: info.kind == InfoType::Flags,
            }
        }
        InfoType::Object | InfoType::Interface => Category::Object,
        InfoType::Callback => Category::Callback {
            name: info.qualified_name(),
        },
        kind => {
            return Err(TypeError::UnsupportedInfo {
                name: name.to_string(),
                kind,
            });
        }
    };

    Ok(TypeDescriptor {
        category,
        is_pointer: ty.pointer,
        interface: Some(info.qualified_name()),
    })
}

/// Human readable type name used in diagnostics.
pub fn display_name(repo: &dyn Repository, ty: &TypeInfo) -> String {
    match classify(repo, ty) {
        Ok(desc) => desc.display_name(),
        Err(_) => ty
            .interface
            .clone()
            .unwrap_or_else(|| ty.tag.to_string()),
    }
}
