//! Calling-convention derivation.
//!
//! One script argument can stand for several native ones: an array and its
//! length, or a callback with its user data and destroy notifier. The plan
//! records, per declared argument, which role it plays so the invoker never
//! has to re-derive the aliasing.

use thiserror::Error;

use crate::logging::debug;
use crate::repository::{
    CallableInfo, DESTROY_NOTIFY, Direction, Repository, ScopeType, Transfer,
};
use crate::types::{ArrayLength, Category, TypeDescriptor, TypeError, classify};

/// Errors that leave a callable permanently unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Function {callable} has a GDestroyNotify but no user_data, not supported")]
    UnsupportedCallableShape { callable: String },

    #[error("Function {callable}: {source}")]
    Type { callable: String, source: TypeError },

    #[error("Function {callable}: argument {arg} refers to argument {index}, which does not exist")]
    DanglingIndex {
        callable: String,
        arg: String,
        index: usize,
    },

    #[error("Symbol {symbol} for {callable} not found")]
    SymbolNotFound { callable: String, symbol: String },
}

/// How a declared argument maps to script arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterRole {
    /// An ordinary logical input or output.
    Normal,
    /// An array whose element count lives in argument `length`.
    Array { length: usize },
    /// Not visible to the script; filled in from another argument.
    Skip,
    /// A script function bridged to a native function pointer.
    Callback {
        closure: Option<usize>,
        destroy: Option<usize>,
    },
}

/// One declared argument of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub role: ParameterRole,
    pub direction: Direction,
    pub transfer: Transfer,
    pub nullable: bool,
    pub caller_allocates: bool,
    pub scope: Option<ScopeType>,
    pub ty: TypeDescriptor,
    /// Expected type as shown in mismatch messages.
    pub type_name: String,
}

impl Parameter {
    /// Visible to the script as an input.
    pub fn is_logical_input(&self) -> bool {
        self.role != ParameterRole::Skip && self.direction.is_in()
    }

    /// Visible to the script as an output.
    pub fn is_logical_output(&self) -> bool {
        self.role != ParameterRole::Skip && self.direction.is_out()
    }
}

/// The derived calling convention of one callable.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPlan {
    /// Qualified name, for diagnostics.
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: TypeDescriptor,
    pub return_transfer: Transfer,
    pub may_return_null: bool,
    /// Argument carrying the element count of an array return value.
    pub return_length: Option<usize>,
    pub skip_return: bool,
    /// An implicit receiver precedes the declared arguments.
    pub is_method: bool,
    /// An implicit `GError **` follows the declared arguments.
    pub can_throw: bool,
    /// Script arguments required.
    pub n_in: usize,
    /// Values the call produces: the return unless skipped, plus outputs.
    pub n_out: usize,
}

impl CallPlan {
    /// Derive the plan of `info`.
    pub fn derive(repo: &dyn Repository, info: &CallableInfo) -> Result<Self, PlanError> {
        let callable = info.qualified_name();
        let type_error = |source: TypeError| PlanError::Type {
            callable: callable.clone(),
            source,
        };
        let n_args = info.args.len();
        let check_index = |arg: &str, index: usize| {
            if index < n_args {
                Ok(index)
            } else {
                Err(PlanError::DanglingIndex {
                    callable: callable.clone(),
                    arg: arg.to_string(),
                    index,
                })
            }
        };

        let mut parameters = Vec::with_capacity(n_args);
        for arg in &info.args {
            let ty = classify(repo, &arg.ty).map_err(type_error)?;
            parameters.push(Parameter {
                name: arg.name.clone(),
                role: ParameterRole::Normal,
                direction: arg.direction,
                transfer: arg.transfer,
                nullable: arg.nullable,
                caller_allocates: arg.caller_allocates,
                scope: arg.scope,
                type_name: ty.display_name(),
                ty,
            });
        }
        let return_type = classify(repo, &info.return_type).map_err(type_error)?;

        // Roles by the argument's own type, then the arguments they absorb.
        let mut absorbed = Vec::new();
        for (i, (arg, param)) in info.args.iter().zip(parameters.iter_mut()).enumerate() {
            match &param.ty.category {
                Category::Array {
                    length: ArrayLength::Parameter(length),
                    ..
                } => {
                    let length = check_index(&arg.name, *length)?;
                    param.role = ParameterRole::Array { length };
                    absorbed.push(length);
                }
                Category::Callback { name } if name == DESTROY_NOTIFY => {
                    param.role = ParameterRole::Skip;
                }
                Category::Callback { .. } => {
                    if arg.destroy.is_some() && arg.closure.is_none() {
                        return Err(PlanError::UnsupportedCallableShape {
                            callable: callable.clone(),
                        });
                    }
                    let closure = arg.closure.map(|c| check_index(&arg.name, c)).transpose()?;
                    let destroy = arg.destroy.map(|d| check_index(&arg.name, d)).transpose()?;
                    param.role = ParameterRole::Callback { closure, destroy };
                    absorbed.extend(closure.into_iter().chain(destroy));
                }
                // User data pointing at itself, as in callback signatures.
                _ if arg.closure == Some(i) => param.role = ParameterRole::Skip,
                _ => {}
            }
        }

        // Any void tag, `gpointer` included, produces no script value.
        let skip_return = info.skip_return || matches!(return_type.category, Category::Void);
        let return_length = match &return_type.category {
            Category::Array {
                length: ArrayLength::Parameter(length),
                ..
            } if !skip_return => Some(check_index("return value", *length)?),
            _ => None,
        };
        absorbed.extend(return_length);

        for index in absorbed {
            if let Some(param) = parameters.get_mut(index) {
                param.role = ParameterRole::Skip;
            }
        }

        let n_in = parameters
            .iter()
            .filter(|p| p.is_logical_input() && !p.nullable)
            .count();
        let n_out = parameters.iter().filter(|p| p.is_logical_output()).count()
            + usize::from(!skip_return);

        debug!(callable = %callable, n_in, n_out, "derived call plan");

        Ok(Self {
            name: callable,
            parameters,
            return_type,
            return_transfer: info.return_transfer,
            may_return_null: info.may_return_null,
            return_length,
            skip_return,
            is_method: info.takes_receiver(),
            can_throw: info.throws,
            n_in,
            n_out,
        })
    }

    /// Number of native argument slots, including the implicit receiver and
    /// error cell.
    pub fn total_args(&self) -> usize {
        self.parameters.len() + usize::from(self.is_method) + usize::from(self.can_throw)
    }

    pub fn parameter(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index)
    }

    /// Parameters the script supplies, in order.
    pub fn inputs(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_logical_input())
    }

    /// Parameters the script receives back, in order.
    pub fn outputs(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_logical_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{ArgInfo, BaseInfo, InfoType, MetadataStore, TypeInfo, TypeTag};

    fn store() -> MetadataStore {
        let mut store = MetadataStore::new();
        let mut callback = BaseInfo::new("Demo", "Callback", InfoType::Callback);
        callback.signature = Some(std::rc::Rc::new(
            CallableInfo::new("Demo", "Callback")
                .arg(ArgInfo::new("value", TypeInfo::new(TypeTag::Int32)))
                .arg(ArgInfo::new("user_data", TypeInfo::gpointer()).closure(1)),
        ));
        store.insert_info(callback);
        store
    }

    fn int() -> TypeInfo {
        TypeInfo::new(TypeTag::Int32)
    }

    #[test]
    fn test_array_absorbs_length() -> Result<(), PlanError> {
        let info = CallableInfo::new("Demo", "sum")
            .arg(ArgInfo::new("values", TypeInfo::c_array(int()).with_length(1)))
            .arg(ArgInfo::new("n_values", int()))
            .returns(int(), Transfer::Nothing);
        let plan = CallPlan::derive(&store(), &info)?;
        assert_eq!(plan.parameters.first().map(|p| p.role), Some(ParameterRole::Array { length: 1 }));
        assert_eq!(plan.parameters.get(1).map(|p| p.role), Some(ParameterRole::Skip));
        assert_eq!(plan.n_in, 1);
        assert_eq!(plan.n_out, 1);
        Ok(())
    }

    #[test]
    fn test_length_before_array() -> Result<(), PlanError> {
        let info = CallableInfo::new("Demo", "fill")
            .arg(ArgInfo::new("n", int()))
            .arg(ArgInfo::new("values", TypeInfo::c_array(int()).with_length(0)));
        let plan = CallPlan::derive(&store(), &info)?;
        assert_eq!(plan.parameters.first().map(|p| p.role), Some(ParameterRole::Skip));
        assert_eq!(plan.n_in, 1);
        assert_eq!(plan.n_out, 0);
        assert!(plan.skip_return);
        Ok(())
    }

    #[test]
    fn test_gpointer_return_is_skipped() -> Result<(), PlanError> {
        let info = CallableInfo::new("Demo", "get_data").returns(TypeInfo::gpointer(), Transfer::Nothing);
        let plan = CallPlan::derive(&store(), &info)?;
        assert!(plan.skip_return);
        assert_eq!(plan.n_out, 0);
        Ok(())
    }

    #[test]
    fn test_callback_absorbs_closure_and_destroy() -> Result<(), PlanError> {
        let info = CallableInfo::new("Demo", "watch")
            .arg(
                ArgInfo::new("func", TypeInfo::interface("Demo.Callback"))
                    .closure(1)
                    .destroy(2)
                    .scope(ScopeType::Notified),
            )
            .arg(ArgInfo::new("data", TypeInfo::gpointer()))
            .arg(ArgInfo::new("notify", TypeInfo::interface(DESTROY_NOTIFY)));
        let plan = CallPlan::derive(&store(), &info)?;
        assert_eq!(
            plan.parameters.first().map(|p| p.role),
            Some(ParameterRole::Callback {
                closure: Some(1),
                destroy: Some(2)
            })
        );
        assert!(plan.parameters.iter().skip(1).all(|p| p.role == ParameterRole::Skip));
        assert_eq!(plan.n_in, 1);
        Ok(())
    }

    #[test]
    fn test_destroy_without_closure_is_unsupported() {
        let info = CallableInfo::new("Demo", "bad")
            .arg(ArgInfo::new("func", TypeInfo::interface("Demo.Callback")).destroy(1))
            .arg(ArgInfo::new("notify", TypeInfo::interface(DESTROY_NOTIFY)));
        let result = CallPlan::derive(&store(), &info);
        assert_eq!(
            result,
            Err(PlanError::UnsupportedCallableShape {
                callable: "Demo.bad".to_string()
            })
        );
        assert_eq!(
            result.map_err(|e| e.to_string()),
            Err("Function Demo.bad has a GDestroyNotify but no user_data, not supported".to_string())
        );
    }

    #[test]
    fn test_callback_signature_skips_user_data() -> Result<(), PlanError> {
        let store = store();
        let signature = store
            .resolve("Demo.Callback")
            .and_then(|info| info.signature.clone())
            .ok_or(PlanError::SymbolNotFound {
                callable: "Demo.Callback".to_string(),
                symbol: String::new(),
            })?;
        let plan = CallPlan::derive(&store, &signature)?;
        assert_eq!(plan.parameters.get(1).map(|p| p.role), Some(ParameterRole::Skip));
        assert_eq!(plan.n_in, 1);
        Ok(())
    }

    #[test]
    fn test_outputs_and_return() -> Result<(), PlanError> {
        let info = CallableInfo::new("Demo", "divide")
            .arg(ArgInfo::new("a", int()))
            .arg(ArgInfo::new("b", int()))
            .arg(ArgInfo::new("quotient", int()).direction(Direction::Out))
            .arg(ArgInfo::new("remainder", int()).direction(Direction::Out))
            .returns(TypeInfo::new(TypeTag::Boolean), Transfer::Nothing)
            .throws();
        let plan = CallPlan::derive(&store(), &info)?;
        assert_eq!(plan.n_in, 2);
        assert_eq!(plan.n_out, 3);
        assert_eq!(plan.total_args(), 5);
        assert_eq!(plan.outputs().count(), 2);
        Ok(())
    }

    #[test]
    fn test_return_length_is_skipped() -> Result<(), PlanError> {
        let info = CallableInfo::new("Demo", "get_values")
            .arg(ArgInfo::new("n", int()).direction(Direction::Out))
            .returns(TypeInfo::c_array(int()).with_length(0), Transfer::Everything);
        let plan = CallPlan::derive(&store(), &info)?;
        assert_eq!(plan.return_length, Some(0));
        assert_eq!(plan.parameters.first().map(|p| p.role), Some(ParameterRole::Skip));
        assert_eq!(plan.n_out, 1);
        Ok(())
    }

    #[test]
    fn test_nullable_inputs_are_optional() -> Result<(), PlanError> {
        let info = CallableInfo::new("Demo", "greet")
            .arg(ArgInfo::new("name", TypeInfo::utf8()))
            .arg(ArgInfo::new("suffix", TypeInfo::utf8()).nullable());
        let plan = CallPlan::derive(&store(), &info)?;
        assert_eq!(plan.n_in, 1);
        assert_eq!(plan.inputs().count(), 2);
        Ok(())
    }

    #[test]
    fn test_method_receiver_is_implicit() -> Result<(), PlanError> {
        let info = CallableInfo::new("Demo", "get_name")
            .method_of("Widget")
            .returns(TypeInfo::utf8(), Transfer::Nothing);
        let plan = CallPlan::derive(&store(), &info)?;
        assert!(plan.is_method);
        assert_eq!(plan.n_in, 0);
        assert_eq!(plan.total_args(), 1);
        Ok(())
    }

    #[test]
    fn test_dangling_length() {
        let info = CallableInfo::new("Demo", "broken")
            .arg(ArgInfo::new("values", TypeInfo::c_array(int()).with_length(4)));
        assert!(matches!(
            CallPlan::derive(&store(), &info),
            Err(PlanError::DanglingIndex { index: 4, .. })
        ));
    }

    #[test]
    fn test_unresolved_type_is_fatal() {
        let info = CallableInfo::new("Demo", "take")
            .arg(ArgInfo::new("thing", TypeInfo::interface("Demo.Missing")));
        assert!(matches!(
            CallPlan::derive(&store(), &info),
            Err(PlanError::Type {
                source: TypeError::UnresolvedInterface(_),
                ..
            })
        ));
    }
}
