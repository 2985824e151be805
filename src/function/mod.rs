//! Callable descriptors: plan derivation and invocation.
//!
//! A [`CallableDescriptor`] wraps one function or method from the
//! repository. On first use it derives a [`CallPlan`] (which parameters the
//! script sees, which are filled in by the bridge, how many native slots are
//! needed) and resolves the native symbol. Invocation lowers the script
//! arguments per the plan, calls the native function and lifts the results.

mod descriptor;
mod invoke;
mod plan;

pub use descriptor::{CallableDescriptor, DescriptorState};
pub use plan::{CallPlan, Parameter, ParameterRole, PlanError};
