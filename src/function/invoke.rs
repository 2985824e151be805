//! Invocation: lowering, the native call and return assembly.

use std::collections::HashMap;

use super::descriptor::{Prepared, check_arguments};
use super::{CallPlan, CallableDescriptor, Parameter, ParameterRole};
use crate::error::{Error, Result};
use crate::logging::{debug, error};
use crate::marshal::{DESTROY_NOTIFY_ADDR, Marshaler, Release, release_for};
use crate::native::{Argument, CallContext};
use crate::repository::{Direction, Transfer};
use crate::runtime::Runtime;
use crate::types::Category;
use crate::value::Value;

/// Native storage behind an out or inout argument.
#[derive(Debug, Clone, Copy)]
enum Cell {
    /// Pointer-sized cell the callee writes its output into.
    Value(u64),
    /// Caller-allocated struct block the callee fills in.
    Block(u64),
}

impl Cell {
    fn ptr(self) -> u64 {
        match self {
            Cell::Value(ptr) | Cell::Block(ptr) => ptr,
        }
    }
}

/// A lowered input and its element count, kept for release after the call.
#[derive(Debug)]
struct Lowered {
    index: usize,
    slot: Argument,
    count: Option<usize>,
}

/// Per-call scratch state.
#[derive(Debug, Default)]
struct Frame {
    slots: Vec<Argument>,
    inputs: Vec<Lowered>,
    cells: Vec<Option<Cell>>,
    /// Element counts destined for length arguments, by argument index.
    counts: HashMap<usize, usize>,
    /// Closure tokens and destroy notifiers, by argument index.
    tokens: HashMap<usize, Argument>,
    call_scoped: Vec<u64>,
    error_cell: Option<u64>,
}

impl CallableDescriptor {
    /// Call the native function with script arguments.
    ///
    /// `receiver` is the instance for methods. Returns `Undefined` when the
    /// call produces nothing, the bare value for one output and an array in
    /// declaration order (return value first) for more.
    pub fn invoke(&self, rt: &Runtime, receiver: Option<&Value>, args: &[Value]) -> Result<Value> {
        let prepared = self.prepare(rt)?;
        let plan = &prepared.plan;
        let marshaler = rt.marshaler();
        check_arguments(&marshaler, plan, args)?;

        let receiver_ptr = if plan.is_method {
            let ptr = receiver
                .and_then(Value::native_pointer)
                .ok_or_else(|| Error::MissingReceiver {
                    callable: plan.name.clone(),
                })?;
            Some(ptr)
        } else {
            None
        };

        let mut frame = Frame::new(plan.parameters.len());
        let outcome = frame.execute(rt, &marshaler, prepared, receiver_ptr, receiver, args);
        let released = frame.release(&marshaler, plan);
        let value = outcome?;
        released?;
        Ok(value)
    }
}

impl Frame {
    fn new(n_args: usize) -> Self {
        Self {
            slots: vec![Argument::NULL; n_args],
            cells: vec![None; n_args],
            ..Self::default()
        }
    }

    fn execute(
        &mut self,
        rt: &Runtime,
        marshaler: &Marshaler<'_>,
        prepared: &Prepared,
        receiver_ptr: Option<u64>,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Value> {
        let plan = &prepared.plan;
        let native = rt.native();
        self.lower(marshaler, plan, args)?;

        let mut native_args = Vec::with_capacity(plan.total_args());
        native_args.extend(receiver_ptr.map(Argument::from_ptr));
        native_args.extend(self.slots.iter().copied());
        if plan.can_throw {
            let cell = native.alloc(8, 8);
            self.error_cell = Some(cell);
            native_args.push(Argument::from_ptr(cell));
        }

        debug!(callable = %plan.name, n_args = native_args.len(), "invoking");
        let cx = CallContext::new(rt.repository(), native);
        let ret = prepared.function.call(&cx, &native_args)?;

        // The error cell is drained first so a pending script exception
        // does not strand a native error.
        let native_error = match self.error_cell {
            Some(cell) => match native.load_ptr(cell)? {
                0 => None,
                err_ptr => {
                    let native_error = native.heap().read_error(err_ptr)?;
                    native.heap_mut().free_error(err_ptr)?;
                    Some(native_error)
                }
            },
            None => None,
        };

        if let Some(err) = native.take_pending() {
            if native_error.is_some() {
                debug!(callable = %plan.name, "native error superseded by script exception");
            }
            self.discard_outputs(marshaler, plan, ret, 0)?;
            return Err(err);
        }

        if let Some(native_error) = native_error {
            self.discard_outputs(marshaler, plan, ret, 0)?;
            error!(callable = %plan.name, message = %native_error.message, "native call failed");
            return Err(Error::NativeInvocation {
                domain: native_error.domain,
                code: native_error.code,
                message: native_error.message,
            });
        }

        self.assemble_return(marshaler, plan, ret, receiver)
    }

    /// Fill every argument slot. Script-visible parameters first, consuming
    /// script arguments in order; then the skipped ones, from the counts and
    /// tokens the first pass recorded.
    fn lower(&mut self, marshaler: &Marshaler<'_>, plan: &CallPlan, args: &[Value]) -> Result<()> {
        let native = marshaler.native();
        let undefined = Value::Undefined;
        let mut supplied = args.iter();

        for (i, param) in plan.parameters.iter().enumerate() {
            if param.role == ParameterRole::Skip {
                continue;
            }
            if param.direction == Direction::Out {
                self.alloc_out_cell(marshaler, i, param);
                continue;
            }
            let value = supplied.next().unwrap_or(&undefined);
            let (slot, count) = match param.role {
                ParameterRole::Callback { closure, destroy } => {
                    let release = release_for(destroy, param.scope, native.unscoped_policy());
                    let slot = marshaler.lower_callback(&param.ty, value, param.nullable, release)?;
                    if !slot.is_null() && release == Release::AfterCall {
                        self.call_scoped.push(slot.as_ptr());
                    }
                    if let Some(closure) = closure {
                        self.tokens.insert(closure, slot);
                    }
                    if let Some(destroy) = destroy {
                        let notify = if slot.is_null() {
                            Argument::NULL
                        } else {
                            Argument::from_ptr(DESTROY_NOTIFY_ADDR)
                        };
                        self.tokens.insert(destroy, notify);
                    }
                    (slot, None)
                }
                _ if matches!(param.ty.category, Category::Array { .. }) => {
                    let (slot, count) =
                        marshaler.lower_array(&param.ty, value, param.nullable, param.transfer)?;
                    if let ParameterRole::Array { length } = param.role {
                        self.counts.insert(length, count);
                    }
                    (slot, Some(count))
                }
                _ => (
                    marshaler.to_native(&param.ty, value, param.nullable, param.transfer)?,
                    None,
                ),
            };
            self.inputs.push(Lowered {
                index: i,
                slot,
                count,
            });
            self.set_slot(marshaler, i, param, slot)?;
        }

        for (i, param) in plan.parameters.iter().enumerate() {
            if param.role != ParameterRole::Skip {
                continue;
            }
            if param.direction == Direction::Out {
                self.alloc_out_cell(marshaler, i, param);
                continue;
            }
            let slot = match self.counts.get(&i) {
                Some(count) => marshaler.to_native(
                    &param.ty,
                    &Value::Number(*count as f64),
                    false,
                    Transfer::Nothing,
                )?,
                None => self.tokens.get(&i).copied().unwrap_or_default(),
            };
            self.set_slot(marshaler, i, param, slot)?;
        }
        Ok(())
    }

    fn set_slot(&mut self, marshaler: &Marshaler<'_>, i: usize, param: &Parameter, slot: Argument) -> Result<()> {
        let value = if param.direction == Direction::Inout {
            let native = marshaler.native();
            let cell = native.alloc(8, 8);
            native.store(cell, param.ty.slot_size(), slot)?;
            if let Some(entry) = self.cells.get_mut(i) {
                *entry = Some(Cell::Value(cell));
            }
            Argument::from_ptr(cell)
        } else {
            slot
        };
        if let Some(entry) = self.slots.get_mut(i) {
            *entry = value;
        }
        Ok(())
    }

    fn alloc_out_cell(&mut self, marshaler: &Marshaler<'_>, i: usize, param: &Parameter) {
        let native = marshaler.native();
        let cell = match (&param.ty.category, param.caller_allocates) {
            (Category::Structured { size: Some(size), .. }, true) => Cell::Block(native.alloc(*size, 8)),
            _ => Cell::Value(native.alloc(8, 8)),
        };
        if let Some(entry) = self.slots.get_mut(i) {
            *entry = Argument::from_ptr(cell.ptr());
        }
        if let Some(entry) = self.cells.get_mut(i) {
            *entry = Some(cell);
        }
    }

    /// Current value of argument `index`: its cell's content for outputs,
    /// the lowered slot otherwise.
    fn current(&self, marshaler: &Marshaler<'_>, param: &Parameter, index: usize) -> Result<Argument> {
        match self.cells.get(index).copied().flatten() {
            Some(Cell::Value(cell)) => Ok(marshaler.native().load(cell, param.ty.slot_size())?),
            Some(Cell::Block(block)) => Ok(Argument::from_ptr(block)),
            None => Ok(self.slots.get(index).copied().unwrap_or_default()),
        }
    }

    fn length_of(&self, marshaler: &Marshaler<'_>, plan: &CallPlan, index: usize) -> Result<Option<usize>> {
        let Some(param) = plan.parameter(index) else {
            return Ok(None);
        };
        let raw = self.current(marshaler, param, index)?;
        Ok(Some(marshaler.length_value(&param.ty, raw)))
    }

    fn output_length(&self, marshaler: &Marshaler<'_>, plan: &CallPlan, param: &Parameter) -> Result<Option<usize>> {
        match param.role {
            ParameterRole::Array { length } => self.length_of(marshaler, plan, length),
            _ => Ok(None),
        }
    }

    fn return_length(&self, marshaler: &Marshaler<'_>, plan: &CallPlan) -> Result<Option<usize>> {
        match plan.return_length {
            Some(index) => self.length_of(marshaler, plan, index),
            None => Ok(None),
        }
    }

    /// Build the script result: the return value, then every output in
    /// declaration order.
    ///
    /// If an output fails to lift, the ones the script never received are
    /// released before the error is returned.
    fn assemble_return(
        &mut self,
        marshaler: &Marshaler<'_>,
        plan: &CallPlan,
        ret: Argument,
        receiver: Option<&Value>,
    ) -> Result<Value> {
        let mut outputs = Vec::with_capacity(plan.n_out);
        if let Err(err) = self.lift_outputs(marshaler, plan, ret, receiver, &mut outputs) {
            // The lift error is the one reported.
            if let Err(_release_err) = self.discard_outputs(marshaler, plan, ret, outputs.len()) {
                error!(callable = %plan.name, error = %_release_err, "releasing unlifted outputs failed");
            }
            return Err(err);
        }

        Ok(match outputs.len() {
            0 => Value::Undefined,
            1 => outputs.pop().unwrap_or_default(),
            _ => Value::from(outputs),
        })
    }

    /// Lift outputs into `outputs`, in order. An output counts as lifted
    /// once its value exists, so `outputs.len()` is where a retry of the
    /// release has to start.
    fn lift_outputs(
        &mut self,
        marshaler: &Marshaler<'_>,
        plan: &CallPlan,
        ret: Argument,
        receiver: Option<&Value>,
        outputs: &mut Vec<Value>,
    ) -> Result<()> {
        if !plan.skip_return {
            let length = self.return_length(marshaler, plan)?;
            let is_receiver = plan.is_method
                && matches!(plan.return_type.category, Category::Object | Category::Structured { .. })
                && !ret.is_null()
                && receiver.and_then(Value::native_pointer) == Some(ret.as_ptr());
            let value = match receiver {
                Some(receiver) if is_receiver => receiver.clone(),
                _ => marshaler.to_script(
                    &plan.return_type,
                    ret,
                    length,
                    plan.return_transfer != Transfer::Everything,
                )?,
            };
            outputs.push(value);
            marshaler.release_after_lift(&plan.return_type, ret, plan.return_transfer, length)?;
        }

        for (i, param) in plan.parameters.iter().enumerate() {
            if !param.is_logical_output() {
                continue;
            }
            let length = self.output_length(marshaler, plan, param)?;
            match self.cells.get(i).copied().flatten() {
                Some(Cell::Block(block)) => {
                    let mut ty = param.ty.clone();
                    ty.is_pointer = true;
                    outputs.push(marshaler.to_script(&ty, Argument::from_ptr(block), None, false)?);
                    // The wrapper adopted the caller-allocated block.
                    if let Some(entry) = self.cells.get_mut(i) {
                        *entry = None;
                    }
                }
                _ => {
                    let raw = self.current(marshaler, param, i)?;
                    outputs.push(marshaler.to_script(
                        &param.ty,
                        raw,
                        length,
                        param.transfer != Transfer::Everything,
                    )?);
                    marshaler.release_after_lift(&param.ty, raw, param.transfer, length)?;
                }
            }
        }
        Ok(())
    }

    /// Error path: release every output from the `from`th on (the return
    /// value is the first when it is not skipped), as if the caller had
    /// received and dropped them.
    fn discard_outputs(&mut self, marshaler: &Marshaler<'_>, plan: &CallPlan, ret: Argument, from: usize) -> Result<()> {
        let mut position = 0;
        if !plan.skip_return {
            if from == 0 {
                let length = self.return_length(marshaler, plan)?;
                marshaler.free(&plan.return_type, ret, plan.return_transfer, Direction::Out, length)?;
            }
            position += 1;
        }
        for (i, param) in plan.parameters.iter().enumerate() {
            if !param.is_logical_output() {
                continue;
            }
            position += 1;
            if position <= from {
                continue;
            }
            match self.cells.get(i).copied().flatten() {
                Some(Cell::Block(block)) => {
                    if let Some(entry) = self.cells.get_mut(i) {
                        *entry = None;
                    }
                    marshaler.native().free(block)?;
                }
                Some(Cell::Value(_)) => {
                    let length = self.output_length(marshaler, plan, param)?;
                    let raw = self.current(marshaler, param, i)?;
                    marshaler.free(&param.ty, raw, param.transfer, Direction::Out, length)?;
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Release the bridge's temporaries: lowered inputs the callee did not
    /// take, out cells, the error cell and call-scoped trampolines. Runs on
    /// every path; the first failure is reported after everything was tried.
    fn release(&mut self, marshaler: &Marshaler<'_>, plan: &CallPlan) -> Result<()> {
        let native = marshaler.native();
        let mut result = Ok(());
        let mut keep_first = |r: Result<()>| {
            if result.is_ok() {
                result = r;
            }
        };

        for input in self.inputs.drain(..) {
            if let Some(param) = plan.parameter(input.index) {
                keep_first(
                    marshaler
                        .free(&param.ty, input.slot, param.transfer, Direction::In, input.count)
                        .map_err(Error::from),
                );
            }
        }
        for cell in self.cells.iter_mut().filter_map(Option::take) {
            keep_first(native.free(cell.ptr()).map_err(Error::from));
        }
        if let Some(cell) = self.error_cell.take() {
            keep_first(native.free(cell).map_err(Error::from));
        }
        for addr in self.call_scoped.drain(..) {
            match marshaler.release_trampoline(addr) {
                Ok(true) => {
                    debug!(addr, "call-scoped trampoline released");
                }
                Ok(false) => {}
                Err(err) => keep_first(Err(err.into())),
            }
        }
        result
    }
}
