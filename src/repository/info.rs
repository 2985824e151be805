//! Introspection metadata records.
//!
//! These mirror what an introspection repository knows about a native
//! library: type occurrences, argument descriptions, callables and named
//! infos (structs, objects, enums, callbacks).

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Basic tag of a type occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Void,
    Boolean,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float,
    Double,
    Gtype,
    Utf8,
    Filename,
    Array,
    Interface,
    Glist,
    Gslist,
    Ghash,
    Error,
    Unichar,
}

impl TypeTag {
    /// Native name of the tag, as used in diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Void => "void",
            TypeTag::Boolean => "gboolean",
            TypeTag::Int8 => "gint8",
            TypeTag::Uint8 => "guint8",
            TypeTag::Int16 => "gint16",
            TypeTag::Uint16 => "guint16",
            TypeTag::Int32 => "gint32",
            TypeTag::Uint32 => "guint32",
            TypeTag::Int64 => "gint64",
            TypeTag::Uint64 => "guint64",
            TypeTag::Float => "gfloat",
            TypeTag::Double => "gdouble",
            TypeTag::Gtype => "GType",
            TypeTag::Utf8 => "utf8",
            TypeTag::Filename => "filename",
            TypeTag::Array => "array",
            TypeTag::Interface => "interface",
            TypeTag::Glist => "GList",
            TypeTag::Gslist => "GSList",
            TypeTag::Ghash => "GHashTable",
            TypeTag::Error => "GError",
            TypeTag::Unichar => "gunichar",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a named info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoType {
    Function,
    Callback,
    Struct,
    Boxed,
    Enum,
    Flags,
    Object,
    Interface,
    Constant,
    Union,
    Value,
    Signal,
    Vfunc,
    Property,
    Field,
    Arg,
    Type,
    Unresolved,
}

impl InfoType {
    pub fn as_str(self) -> &'static str {
        match self {
            InfoType::Function => "function",
            InfoType::Callback => "callback",
            InfoType::Struct => "struct",
            InfoType::Boxed => "boxed",
            InfoType::Enum => "enum",
            InfoType::Flags => "flags",
            InfoType::Object => "object",
            InfoType::Interface => "interface",
            InfoType::Constant => "constant",
            InfoType::Union => "union",
            InfoType::Value => "value",
            InfoType::Signal => "signal",
            InfoType::Vfunc => "vfunc",
            InfoType::Property => "property",
            InfoType::Field => "field",
            InfoType::Arg => "arg",
            InfoType::Type => "type",
            InfoType::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flavor of an array occurrence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArrayType {
    #[default]
    C,
    Array,
    PtrArray,
    ByteArray,
}

/// Direction of an argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    In,
    Out,
    #[serde(alias = "in-out")]
    Inout,
}

impl Direction {
    /// True for `In` and `Inout`.
    pub fn is_in(self) -> bool {
        matches!(self, Direction::In | Direction::Inout)
    }

    /// True for `Out` and `Inout`.
    pub fn is_out(self) -> bool {
        matches!(self, Direction::Out | Direction::Inout)
    }
}

/// Ownership transfer of a value crossing the boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transfer {
    #[default]
    Nothing,
    Container,
    Everything,
}

/// Lifetime scope of a callback argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Call,
    Async,
    Notified,
    Forever,
}

/// One type occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub tag: TypeTag,
    /// Passed or stored by reference even if the kind is normally by value.
    #[serde(default)]
    pub pointer: bool,
    /// Qualified name (`Namespace.Name`) for interface occurrences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Element types for containers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<TypeInfo>,
    /// Index of the argument carrying this array's length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_size: Option<usize>,
    #[serde(default)]
    pub zero_terminated: bool,
    #[serde(default)]
    pub array_type: ArrayType,
}

impl TypeInfo {
    pub fn new(tag: TypeTag) -> Self {
        Self {
            tag,
            pointer: false,
            interface: None,
            params: Vec::new(),
            array_length: None,
            fixed_size: None,
            zero_terminated: false,
            array_type: ArrayType::C,
        }
    }

    pub fn void() -> Self {
        Self::new(TypeTag::Void)
    }

    /// `gpointer`.
    pub fn gpointer() -> Self {
        Self::new(TypeTag::Void).by_pointer()
    }

    pub fn utf8() -> Self {
        Self::new(TypeTag::Utf8).by_pointer()
    }

    /// Occurrence of a named interface type.
    pub fn interface(name: impl Into<String>) -> Self {
        let mut ty = Self::new(TypeTag::Interface);
        ty.interface = Some(name.into());
        ty
    }

    /// C array of `element`.
    pub fn c_array(element: TypeInfo) -> Self {
        let mut ty = Self::new(TypeTag::Array).by_pointer();
        ty.params.push(element);
        ty
    }

    pub fn list(element: TypeInfo) -> Self {
        let mut ty = Self::new(TypeTag::Glist).by_pointer();
        ty.params.push(element);
        ty
    }

    pub fn slist(element: TypeInfo) -> Self {
        let mut ty = Self::new(TypeTag::Gslist).by_pointer();
        ty.params.push(element);
        ty
    }

    pub fn by_pointer(mut self) -> Self {
        self.pointer = true;
        self
    }

    pub fn with_length(mut self, index: usize) -> Self {
        self.array_length = Some(index);
        self
    }

    pub fn with_fixed_size(mut self, size: usize) -> Self {
        self.fixed_size = Some(size);
        self
    }

    pub fn zero_terminated(mut self) -> Self {
        self.zero_terminated = true;
        self
    }

    /// Element type `n` of a container occurrence.
    pub fn param_type(&self, n: usize) -> Option<&TypeInfo> {
        self.params.get(n)
    }
}

/// One declared argument of a callable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeInfo,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub transfer: Transfer,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub caller_allocates: bool,
    /// Index of the user-data argument of a callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure: Option<usize>,
    /// Index of the destroy-notify argument of a callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destroy: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeType>,
}

impl ArgInfo {
    pub fn new(name: impl Into<String>, ty: TypeInfo) -> Self {
        Self {
            name: name.into(),
            ty,
            direction: Direction::In,
            transfer: Transfer::Nothing,
            nullable: false,
            caller_allocates: false,
            closure: None,
            destroy: None,
            scope: None,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn transfer(mut self, transfer: Transfer) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn caller_allocates(mut self) -> Self {
        self.caller_allocates = true;
        self
    }

    pub fn closure(mut self, index: usize) -> Self {
        self.closure = Some(index);
        self
    }

    pub fn destroy(mut self, index: usize) -> Self {
        self.destroy = Some(index);
        self
    }

    pub fn scope(mut self, scope: ScopeType) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// A function, method or callback signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallableInfo {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    /// Name of the type this callable is declared on, for methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Native symbol; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgInfo>,
    #[serde(default = "TypeInfo::void")]
    pub return_type: TypeInfo,
    #[serde(default)]
    pub return_transfer: Transfer,
    #[serde(default)]
    pub may_return_null: bool,
    #[serde(default)]
    pub skip_return: bool,
    #[serde(default)]
    pub is_method: bool,
    #[serde(default)]
    pub is_constructor: bool,
    #[serde(default)]
    pub throws: bool,
}

impl CallableInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            container: None,
            symbol: None,
            args: Vec::new(),
            return_type: TypeInfo::void(),
            return_transfer: Transfer::Nothing,
            may_return_null: false,
            skip_return: false,
            is_method: false,
            is_constructor: false,
            throws: false,
        }
    }

    pub fn arg(mut self, arg: ArgInfo) -> Self {
        self.args.push(arg);
        self
    }

    pub fn returns(mut self, ty: TypeInfo, transfer: Transfer) -> Self {
        self.return_type = ty;
        self.return_transfer = transfer;
        self
    }

    pub fn method_of(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self.is_method = true;
        self
    }

    pub fn throws(mut self) -> Self {
        self.throws = true;
        self
    }

    pub fn symbol_name(&self) -> &str {
        self.symbol.as_deref().unwrap_or(&self.name)
    }

    /// `Namespace.name` or `Namespace.Container.name`.
    pub fn qualified_name(&self) -> String {
        match &self.container {
            Some(container) => format!("{}.{}.{}", self.namespace, container, self.name),
            None => format!("{}.{}", self.namespace, self.name),
        }
    }

    /// Methods take an implicit receiver; constructors never do.
    pub fn takes_receiver(&self) -> bool {
        self.is_method && !self.is_constructor
    }
}

/// A named entry of a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseInfo {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub kind: InfoType,
    /// Byte size of structs and unions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Storage tag of enums and flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<TypeTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtype: Option<u64>,
    /// Qualified name of the parent type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<Rc<CallableInfo>>,
    /// Signature of callback types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Rc<CallableInfo>>,
}

impl BaseInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, kind: InfoType) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind,
            size: None,
            storage: None,
            gtype: None,
            parent: None,
            methods: Vec::new(),
            signature: None,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    pub fn find_method(&self, name: &str) -> Option<&Rc<CallableInfo>> {
        self.methods.iter().find(|m| m.name == name)
    }
}
