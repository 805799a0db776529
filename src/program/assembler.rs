// This module implements whole-program assembly. It validates the call graph before any
// code is produced (no calls into undefined functions, matching arity, no recursion,
// since every function owns exactly one set of frame slots), reserves the global slots
// at the front of the slot space, lowers and lays out each defined function in
// declaration order, and then runs the link passes once every function's start index
// is known: block transfers first, then the queued call sites. Finally it selects the
// entry function and rewrites its returns into a jump one past the end of the program.

//! Whole-program assembly.

use crate::core::{
    AddressDescriptor, CompilationSession, CompileError, CompileResult, Location, ValueKey,
};
use crate::ir::{FuncId, GlobalId, Initializer, InstKind, Module};
use crate::linearize::ControlFlowLinearizer;
use crate::lower::{cell_address, CodePosition, FunctionLowering, LoweredFunction};
use crate::target::{Instruction, Opcode, Operand};

use super::Program;

/// Outcome cell reported when the module has no function named as entry.
pub const DEFAULT_CHECK_SLOT: u32 = 2;

/// Caller-supplied assembly options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Floor for the reported slot count.
    pub min_slots: u32,
    /// Name of the function whose return value is the program's outcome.
    pub entry: String,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            min_slots: 0,
            entry: "main".to_string(),
        }
    }
}

pub struct ProgramAssembler<'s, 'arena, 'm> {
    session: &'s mut CompilationSession<'arena>,
    module: &'m Module,
    options: AssembleOptions,
}

impl<'s, 'arena, 'm> ProgramAssembler<'s, 'arena, 'm> {
    pub fn new(
        session: &'s mut CompilationSession<'arena>,
        module: &'m Module,
        options: AssembleOptions,
    ) -> Self {
        Self {
            session,
            module,
            options,
        }
    }

    pub fn assemble(mut self) -> CompileResult<Program<'arena>> {
        self.check_call_graph()?;
        let n_global_vars = self.allocate_globals()?;

        let mut functions = Vec::new();
        for func in self.module.func_ids() {
            if self.module.function(func).declaration {
                continue;
            }
            let mut lowered = FunctionLowering::new(self.session, self.module, func)?.lower()?;
            ControlFlowLinearizer::layout(&mut lowered, self.module, self.session)?;
            functions.push(lowered);
        }
        if functions.is_empty() {
            return Err(CompileError::unsupported("module without function definitions"));
        }

        let mut start = 0u32;
        for function in &mut functions {
            function.start = start;
            start += function.len;
            ControlFlowLinearizer::link(function, self.session)?;
        }
        let length = start;

        self.patch_calls(&mut functions)?;
        let (entry, check) = self.select_entry(&mut functions, length)?;

        let allocated = self.session.slots().allocated();
        let program = Program {
            start: functions[entry].start,
            check,
            n_vars: allocated.max(self.options.min_slots),
            n_global_vars,
            functions,
        };
        log::debug!(
            "program assembled: {} instruction(s), {} slot(s), entry at {}",
            length,
            program.n_vars,
            program.start
        );
        log::info!("{}", self.session.stats());
        Ok(program)
    }

    /// Reject calls the fixed-slot calling convention cannot express.
    fn check_call_graph(&self) -> CompileResult<()> {
        let module = self.module;
        let mut callees: Vec<Vec<FuncId>> = vec![Vec::new(); module.functions.len()];

        for caller in module.func_ids() {
            let function = module.function(caller);
            for block in &function.blocks {
                for &inst_id in &block.insts {
                    let inst = module.inst(inst_id);
                    let InstKind::Call { callee, args } = &inst.kind else {
                        continue;
                    };
                    let target = module.function(*callee);
                    if target.is_intrinsic() {
                        continue;
                    }
                    let at = Location::in_function(&function.name).at_line(inst.line);
                    if target.declaration {
                        return Err(CompileError::unsupported(format!(
                            "call to external function @{}",
                            target.name
                        ))
                        .located(&at));
                    }
                    if args.len() != target.params.len() {
                        return Err(CompileError::unsupported(format!(
                            "call to @{} with {} argument(s), expected {}",
                            target.name,
                            args.len(),
                            target.params.len()
                        ))
                        .located(&at));
                    }
                    let edges = &mut callees[caller.0 as usize];
                    if !edges.contains(callee) {
                        edges.push(*callee);
                    }
                }
            }
        }

        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; module.functions.len()];
        for root in module.func_ids() {
            if marks[root.0 as usize] != Mark::Unvisited {
                continue;
            }
            // Iterative depth-first search; the stack holds the active call path.
            let mut stack: Vec<(FuncId, usize)> = vec![(root, 0)];
            marks[root.0 as usize] = Mark::Active;
            while let Some(top) = stack.last_mut() {
                let (func, next) = *top;
                let edges = &callees[func.0 as usize];
                if next == edges.len() {
                    marks[func.0 as usize] = Mark::Done;
                    stack.pop();
                    continue;
                }
                top.1 += 1;
                let callee = edges[next];
                match marks[callee.0 as usize] {
                    Mark::Unvisited => {
                        marks[callee.0 as usize] = Mark::Active;
                        stack.push((callee, 0));
                    }
                    Mark::Active => {
                        let cycle_start = stack.iter().position(|&(f, _)| f == callee).unwrap_or(0);
                        let mut names: Vec<String> = stack[cycle_start..]
                            .iter()
                            .map(|&(f, _)| format!("@{}", module.function(f).name))
                            .collect();
                        names.push(format!("@{}", module.function(callee).name));
                        return Err(CompileError::unsupported(format!(
                            "recursion ({})",
                            names.join(" -> ")
                        )));
                    }
                    Mark::Done => {}
                }
            }
        }
        Ok(())
    }

    /// Reserve slots for every writable global. Returns the global slot count.
    fn allocate_globals(&mut self) -> CompileResult<u32> {
        for (idx, global) in self.module.globals.iter().enumerate() {
            if global.constant {
                log::debug!("constant global @{} gets no slot", global.name);
                continue;
            }
            match &global.init {
                Initializer::Zero | Initializer::Int(0) => {}
                Initializer::Int(_) => {
                    return Err(CompileError::unsupported(format!(
                        "variable initialization of @{}",
                        global.name
                    )))
                }
                Initializer::Array(_) => {
                    return Err(CompileError::unsupported(format!(
                        "array initialization of @{}",
                        global.name
                    )))
                }
                Initializer::Opaque => {
                    return Err(CompileError::unsupported(format!(
                        "unknown initialization of @{}",
                        global.name
                    )))
                }
            }
            let desc = self.session.alloc_object(&global.ty)?;
            log::debug!("global @{} at {}", global.name, desc);
            self.session
                .bind(ValueKey::Global(GlobalId(idx as u32)), desc)?;
        }
        Ok(self.session.slots().allocated())
    }

    /// Rewrite every queued call sequence now that layout is final.
    fn patch_calls(&mut self, functions: &mut [LoweredFunction<'arena>]) -> CompileResult<()> {
        let mut index = vec![None; self.module.functions.len()];
        for (i, function) in functions.iter().enumerate() {
            index[function.id.0 as usize] = Some(i);
        }
        let lookup = |func: FuncId| {
            index[func.0 as usize].ok_or_else(|| {
                CompileError::invariant(format!("call site refers to unlowered function #{}", func.0))
            })
        };

        for site in self.session.take_calls() {
            let callee = &functions[lookup(site.callee)?];
            let frame = callee.frame.clone();
            let callee_start = callee.start;
            if frame.args.len() != site.arg_count as usize {
                return Err(CompileError::invariant(format!(
                    "call site passes {} argument(s) to @{} which takes {}",
                    site.arg_count,
                    callee.name,
                    frame.args.len()
                )));
            }

            let caller = &mut functions[lookup(site.caller)?];
            let at = |offset: u32| CodePosition {
                block: site.block,
                index: site.position + offset,
            };
            let n = site.arg_count;
            let return_to = caller.absolute(at(n + 2)).ok_or_else(|| {
                CompileError::invariant(format!("call site in @{} has no layout", caller.name))
            })?;
            let location = Location::in_function(caller.name);

            for (i, arg) in frame.args.iter().enumerate() {
                let store = placeholder(caller, at(i as u32), &[Opcode::StoreConst, Opcode::Mov])
                    .map_err(|e| e.located(&location))?;
                store.dest = Operand::from(cell_address(*arg));
            }
            let ret_store = placeholder(caller, at(n), &[Opcode::StoreConst])
                .map_err(|e| e.located(&location))?;
            ret_store.dest = Operand::from(AddressDescriptor::address_of(frame.return_address));
            ret_store.a = Operand::from(return_to);
            let jump = placeholder(caller, at(n + 1), &[Opcode::Jmp])
                .map_err(|e| e.located(&location))?;
            jump.dest = Operand::from(callee_start);
            let copy = placeholder(caller, at(n + 2), &[Opcode::Mov])
                .map_err(|e| e.located(&location))?;
            copy.a = Operand::from(frame.return_value);

            log::trace!(
                "patched call in @{}: returns to {}, enters at {}",
                caller.name,
                return_to,
                callee_start
            );
            self.session.stats_mut().calls_patched += 1;
        }
        Ok(())
    }

    /// Pick the entry function and turn its returns into a program exit.
    ///
    /// Returns the entry's index in `functions` and the outcome cell.
    fn select_entry(
        &self,
        functions: &mut [LoweredFunction<'arena>],
        length: u32,
    ) -> CompileResult<(usize, u32)> {
        let named = functions
            .iter()
            .position(|f| f.name == self.options.entry);
        let (entry, check) = match named {
            Some(idx) => {
                let slot = u32::try_from(functions[idx].frame.return_value.slot)
                    .map_err(|_| CompileError::invariant("negative return-value slot"))?;
                (idx, slot)
            }
            None => {
                log::debug!(
                    "no function named @{}; entering @{}",
                    self.options.entry,
                    functions[0].name
                );
                (0, DEFAULT_CHECK_SLOT)
            }
        };

        let function = &mut functions[entry];
        let location = Location::in_function(function.name);
        for exit in function.exits.clone() {
            let inst = placeholder(function, exit, &[Opcode::JmpInd])
                .map_err(|e| e.located(&location))?;
            *inst = Instruction::jmp(length);
        }
        Ok((entry, check))
    }
}

/// The instruction at `at`, checked to be one of the expected opcodes.
fn placeholder<'f>(
    function: &'f mut LoweredFunction<'_>,
    at: CodePosition,
    expected: &[Opcode],
) -> CompileResult<&'f mut Instruction> {
    let inst = function.instruction_mut(at).ok_or_else(|| {
        CompileError::invariant(format!("patch point {}:{} out of range", at.block.0, at.index))
    })?;
    if !expected.contains(&inst.opcode) {
        return Err(CompileError::invariant(format!(
            "patch point holds '{}', expected '{}'",
            inst.opcode, expected[0]
        )));
    }
    Ok(inst)
}
