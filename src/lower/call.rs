// Calls use fixed per-function slots instead of a stack. A call site emits the
// argument stores, a store of the return address, the jump to the callee and a
// copy out of the callee's return-value cell. None of the callee's slots or its
// start offset are known while the caller is lowered, so the sequence is
// emitted with zero fields and queued as a CallSite; the assembler rewrites
// every queued site exactly once after layout. Returns store into the
// function's own return-value cell and jump through its return-address cell.

use super::{cell_address, store_to_cell, CodePosition, FunctionLowering};
use crate::core::{AddressDescriptor, CallSite, CompileError, CompileResult};
use crate::ir::{FuncId, InstId, Value};
use crate::target::{Instruction, Opcode, Operand};

impl FunctionLowering<'_, '_, '_> {
    pub(super) fn lower_call(
        &mut self,
        id: InstId,
        callee: FuncId,
        args: &[Value],
    ) -> CompileResult<()> {
        let module = self.module;
        let target = module.function(callee);
        if target.is_intrinsic() {
            log::trace!("skipping call to intrinsic @{}", target.name);
            return Ok(());
        }
        if target.declaration {
            return Err(CompileError::unsupported(format!(
                "call to external function @{}",
                target.name
            )));
        }
        if args.len() != target.params.len() {
            return Err(CompileError::unsupported(format!(
                "call to @{} with {} argument(s), expected {}",
                target.name,
                args.len(),
                target.params.len()
            )));
        }
        log::trace!("compiling call to @{}", target.name);

        let position = self.code.len() as u32;
        for arg in args {
            let src = self.resolve(arg)?;
            self.emit(store_to_cell(Operand::ZERO, src));
        }
        let result = self.session.alloc_cell(target.ret.pointer_depth())?;
        self.emit(Instruction::new(
            Opcode::StoreConst,
            Operand::ZERO,
            Operand::ZERO,
            Operand::ZERO,
        ));
        self.emit(Instruction::jmp(0));
        self.emit(Instruction::new(
            Opcode::Mov,
            cell_address(result),
            Operand::ZERO,
            Operand::ZERO,
        ));

        self.session.queue_call(CallSite {
            caller: self.func,
            block: self.block,
            position,
            callee,
            arg_count: args.len() as u32,
        });
        self.bind(id, result)
    }

    pub(super) fn lower_ret(&mut self, value: Option<&Value>) -> CompileResult<()> {
        if let Some(value) = value {
            let src = self.resolve(value)?;
            let dest = cell_address(self.frame.return_value);
            self.emit(store_to_cell(Operand::from(dest), src));
        }
        let index = self.code.len() as u32;
        self.emit(Instruction::jmp_ind(AddressDescriptor::cell(
            self.frame.return_address,
            0,
        )));
        self.exits.push(CodePosition {
            block: self.block,
            index,
        });
        Ok(())
    }
}
