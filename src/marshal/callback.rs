//! Callback trampolines.
//!
//! A script function passed where native code expects a function pointer is
//! registered in the [`TrampolineTable`] and represented by a synthetic
//! address. Native code calls it through [`call_trampoline`], which re-enters
//! the script synchronously. The same address serves as the closure token, so
//! a `GDestroyNotify` call with it as user data releases the trampoline.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::{Marshaler, MarshalError};
use crate::config::UnscopedCallbackPolicy;
use crate::error::Error;
use crate::function::{CallPlan, ParameterRole};
use crate::logging::{debug, warn};
use crate::native::{Argument, NativeContext};
use crate::repository::{Direction, Repository, ScopeType, Transfer};
use crate::types::Category;
use crate::value::ScriptFunction;

/// First trampoline address. Far above anything the heap hands out.
pub const TRAMPOLINE_BASE: u64 = 0x7f00_0000_0000;

const TRAMPOLINE_STRIDE: u64 = 16;

/// Address passed as the `GDestroyNotify` of bridged callbacks.
pub const DESTROY_NOTIFY_ADDR: u64 = 0x7eff_ffff_0000;

/// When a trampoline is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// When the native call it was passed to returns.
    AfterCall,
    /// After native code invokes it once.
    AfterFirstInvocation,
    /// When native code calls the destroy notifier with its token.
    OnDestroyNotify,
    /// Never; pinned for the life of the runtime.
    Never,
}

/// Pick the release point of a callback argument.
///
/// A destroy notifier wins over any scope. Callbacks with neither (or with
/// `notified` scope but no notifier) have no release point of their own and
/// follow the configured policy.
pub fn release_for(
    destroy: Option<usize>,
    scope: Option<ScopeType>,
    policy: UnscopedCallbackPolicy,
) -> Release {
    if destroy.is_some() {
        return Release::OnDestroyNotify;
    }
    match scope {
        Some(ScopeType::Call) => Release::AfterCall,
        Some(ScopeType::Async) => Release::AfterFirstInvocation,
        Some(ScopeType::Forever) => Release::Never,
        Some(ScopeType::Notified) | None => match policy {
            UnscopedCallbackPolicy::Pin => {
                warn!("callback has no release point; pinning it for the runtime's lifetime");
                Release::Never
            }
            UnscopedCallbackPolicy::ReleaseAfterFirstCall => Release::AfterFirstInvocation,
        },
    }
}

/// A registered script callback.
pub struct Trampoline {
    pub(crate) function: Rc<dyn ScriptFunction>,
    pub(crate) plan: CallPlan,
    release: Release,
    invocations: usize,
    /// Returned values lowered for native code that the bridge still owns.
    retained: Vec<Argument>,
}

impl Trampoline {
    pub fn release(&self) -> Release {
        self.release
    }

    pub fn invocations(&self) -> usize {
        self.invocations
    }

    pub fn plan(&self) -> &CallPlan {
        &self.plan
    }
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("release", &self.release)
            .field("invocations", &self.invocations)
            .field("retained", &self.retained.len())
            .finish_non_exhaustive()
    }
}

/// Live trampolines keyed by address.
#[derive(Debug, Default)]
pub struct TrampolineTable {
    next: u64,
    entries: BTreeMap<u64, Trampoline>,
}

impl TrampolineTable {
    pub fn register(&mut self, function: Rc<dyn ScriptFunction>, plan: CallPlan, release: Release) -> u64 {
        let addr = TRAMPOLINE_BASE + self.next * TRAMPOLINE_STRIDE;
        self.next += 1;
        self.entries.insert(
            addr,
            Trampoline {
                function,
                plan,
                release,
                invocations: 0,
                retained: Vec::new(),
            },
        );
        addr
    }

    pub fn get(&self, addr: u64) -> Option<&Trampoline> {
        self.entries.get(&addr)
    }

    pub fn remove(&mut self, addr: u64) -> Option<Trampoline> {
        self.entries.remove(&addr)
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.entries.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep a returned value alive until the trampoline is released.
    fn retain(&mut self, addr: u64, slot: Argument) {
        if let Some(t) = self.entries.get_mut(&addr) {
            t.retained.push(slot);
        }
    }

    /// Count an invocation, returning true when the trampoline is now spent.
    fn record_invocation(&mut self, addr: u64) -> bool {
        match self.entries.get_mut(&addr) {
            Some(t) => {
                t.invocations += 1;
                t.release == Release::AfterFirstInvocation
            }
            None => false,
        }
    }
}

/// Whether a callback return lowered under this plan leaves memory with the
/// bridge.
fn return_holds_memory(plan: &CallPlan) -> bool {
    plan.return_transfer != Transfer::Everything
        && match plan.return_type.category {
            Category::String { .. } | Category::Array { .. } | Category::List { .. } => true,
            Category::Structured { .. } => plan.return_type.is_inline_struct(),
            _ => false,
        }
}

impl Marshaler<'_> {
    /// Drop the trampoline at `addr` along with the values it returned to
    /// native code. Returns false when nothing was registered there.
    pub fn release_trampoline(&self, addr: u64) -> Result<bool, MarshalError> {
        let Some(trampoline) = self.native.trampolines_mut().remove(addr) else {
            return Ok(false);
        };
        let plan = &trampoline.plan;
        for slot in &trampoline.retained {
            self.free(&plan.return_type, *slot, plan.return_transfer, Direction::In, None)?;
        }
        Ok(true)
    }
}

/// Invoke the function pointer `addr` from native code.
///
/// Arguments are lifted per the callback's plan (user data and array
/// lengths are not passed to the script), the script function is called,
/// and its result is lowered back. A string or container the bridge lowers
/// without transferring it stays allocated until the trampoline is
/// released; for a trampoline released after its first call that is never,
/// since native code is still reading the value. The destroy-notify
/// address releases the trampoline whose token is the first argument.
pub fn call_trampoline(
    repo: &dyn Repository,
    native: &NativeContext,
    addr: u64,
    args: &[Argument],
) -> Result<Argument, Error> {
    let marshaler = Marshaler::new(repo, native);
    if addr == DESTROY_NOTIFY_ADDR {
        let token = args.first().copied().unwrap_or_default().as_ptr();
        if marshaler.release_trampoline(token)? {
            debug!(addr = token, "trampoline released by destroy notify");
        }
        return Ok(Argument::NULL);
    }

    let (function, plan) = {
        let table = native.trampolines();
        let trampoline = table.get(addr).ok_or(MarshalError::UnknownTrampoline(addr))?;
        (trampoline.function.clone(), trampoline.plan.clone())
    };

    let mut script_args = Vec::with_capacity(plan.n_in);
    for (i, param) in plan.parameters.iter().enumerate() {
        if param.role == ParameterRole::Skip {
            continue;
        }
        if param.direction.is_out() {
            return Err(MarshalError::Unsupported(format!(
                "out argument {} of callback {}",
                param.name, plan.name
            ))
            .into());
        }
        let slot = args.get(i).copied().unwrap_or_default();
        let force_copy = param.transfer != Transfer::Everything;
        let length = match param.role {
            ParameterRole::Array { length } => {
                let len_slot = args.get(length).copied().unwrap_or_default();
                plan.parameters
                    .get(length)
                    .map(|p| marshaler.length_value(&p.ty, len_slot))
            }
            _ => None,
        };
        script_args.push(marshaler.to_script(&param.ty, slot, length, force_copy)?);
    }

    let result = function.call(&script_args);

    let spent = native.trampolines_mut().record_invocation(addr);
    if spent {
        marshaler.release_trampoline(addr)?;
        debug!(addr, "trampoline released after first invocation");
    }

    let result = result?;
    if plan.skip_return {
        return Ok(Argument::NULL);
    }
    let slot = marshaler.to_native(&plan.return_type, &result, plan.may_return_null, plan.return_transfer)?;
    if !slot.is_null() && return_holds_memory(&plan) {
        native.trampolines_mut().retain(addr, slot);
    }
    Ok(slot)
}
