//! Per-callable descriptor with lazily prepared state.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use super::{CallPlan, PlanError};
use crate::error::{Error, Result};
use crate::logging::{debug, error};
use crate::marshal::Marshaler;
use crate::native::NativeFunction;
use crate::repository::CallableInfo;
use crate::runtime::Runtime;
use crate::value::Value;

/// Readiness of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorState {
    /// Not used yet; nothing derived.
    Uninitialized,
    /// Plan derived and native symbol resolved.
    Ready,
    /// Preparation failed. Terminal: every use reports the same error.
    Failed,
}

pub(crate) struct Prepared {
    pub(crate) plan: CallPlan,
    pub(crate) function: Rc<dyn NativeFunction>,
}

/// A bound native callable.
///
/// Created eagerly, prepared on first use. Preparation derives the
/// [`CallPlan`] and resolves the native symbol; its outcome, success or
/// failure, is cached for the life of the descriptor.
pub struct CallableDescriptor {
    info: Rc<CallableInfo>,
    state: OnceCell<std::result::Result<Prepared, PlanError>>,
}

impl CallableDescriptor {
    pub fn new(info: Rc<CallableInfo>) -> Self {
        Self {
            info,
            state: OnceCell::new(),
        }
    }

    pub fn info(&self) -> &CallableInfo {
        &self.info
    }

    pub fn name(&self) -> String {
        self.info.qualified_name()
    }

    pub fn state(&self) -> DescriptorState {
        match self.state.get() {
            None => DescriptorState::Uninitialized,
            Some(Ok(_)) => DescriptorState::Ready,
            Some(Err(_)) => DescriptorState::Failed,
        }
    }

    pub(crate) fn prepare(&self, rt: &Runtime) -> std::result::Result<&Prepared, PlanError> {
        self.state
            .get_or_init(|| {
                let prepared = Self::build(rt, &self.info);
                match &prepared {
                    Ok(_) => {
                        debug!(callable = %self.info.qualified_name(), "descriptor ready");
                    }
                    Err(err) => {
                        error!(error = %err, "descriptor failed");
                    }
                }
                prepared
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    fn build(rt: &Runtime, info: &CallableInfo) -> std::result::Result<Prepared, PlanError> {
        let plan = CallPlan::derive(rt.repository(), info)?;
        let symbol = info.symbol_name();
        let function = rt
            .library()
            .resolve(symbol)
            .ok_or_else(|| PlanError::SymbolNotFound {
                callable: plan.name.clone(),
                symbol: symbol.to_string(),
            })?;
        Ok(Prepared { plan, function })
    }

    /// The derived plan, preparing the descriptor if needed.
    pub fn plan(&self, rt: &Runtime) -> Result<&CallPlan> {
        Ok(&self.prepare(rt)?.plan)
    }

    /// Validate script arguments without touching native memory.
    pub fn type_check(&self, rt: &Runtime, args: &[Value]) -> Result<()> {
        let prepared = self.prepare(rt)?;
        check_arguments(&rt.marshaler(), &prepared.plan, args)
    }
}

impl fmt::Debug for CallableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableDescriptor")
            .field("callable", &self.info.qualified_name())
            .field("state", &self.state())
            .finish()
    }
}

/// Arity check, then one supplied argument per logical input in declaration
/// order. Missing trailing arguments are undefined, which only nullable
/// parameters accept.
pub(crate) fn check_arguments(marshaler: &Marshaler<'_>, plan: &CallPlan, args: &[Value]) -> Result<()> {
    if args.len() < plan.n_in {
        return Err(Error::Arity {
            expected: plan.n_in,
            actual: args.len(),
        });
    }
    let undefined = Value::Undefined;
    let mut supplied = args.iter();
    for param in plan.inputs() {
        let value = supplied.next().unwrap_or(&undefined);
        if !marshaler.can_convert(&param.ty, value, param.nullable) {
            return Err(Error::TypeMismatch {
                parameter: param.name.clone(),
                expected: param.type_name.clone(),
                got: value.describe(),
            });
        }
    }
    Ok(())
}
