use crate::jvm::code::{BranchInstruction, Instruction, SynLabel};
use crate::jvm::verifier::{EvaluationContext, Frame, FrameState, FrameType};
use crate::jvm::{BinaryName, VerifierError};
use std::collections::BTreeMap;

/// A JVM method code body is made up of a linear sequence of basic blocks.
///
/// Blocks don't store their computed entry frame: that is the output of the frame computation
/// in [`crate::jvm::code::Code::compute_frames`]. They can however carry a declared frame, which
/// plays the role of a stack map frame.
#[derive(Debug, PartialEq, Clone)]
pub struct BasicBlock {
    /// Frame explicitly declared at the start of the block
    pub declared_frame: Option<Frame>,

    /// Straight-line instructions in the block
    pub instructions: Vec<Instruction>,

    /// Branch instruction to close the block
    pub branch_end: BranchInstruction<SynLabel, SynLabel>,

    /// Handlers for exceptions thrown by any instruction in the block
    pub exception_handlers: Vec<ExceptionHandler>,
}

/// Entry in the exception table covering a block
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ExceptionHandler {
    /// Class of exception caught (`None` catches everything)
    pub catch_type: Option<BinaryName>,

    pub handler: SynLabel,
}

impl ExceptionHandler {
    /// Frame on entry to the handler, given the locals that could be live when the exception is
    /// thrown and whether `this` could still be uninitialized at that point
    pub fn entry_frame(&self, locals: BTreeMap<u16, FrameType>, this_uninitialized: bool) -> Frame {
        let caught = self
            .catch_type
            .clone()
            .unwrap_or(BinaryName::THROWABLE);
        Frame {
            locals,
            stack: vec![FrameType::object(caught)],
            this_uninitialized,
        }
    }
}

/// Result of running a block from its entry frame
#[derive(Debug, Clone, PartialEq)]
pub struct BlockExit {
    /// Frame after the branch instruction (the one passed to successors)
    pub frame: Frame,

    /// Join of the locals before every instruction in the block
    pub handler_locals: BTreeMap<u16, FrameType>,
}

impl BasicBlock {
    /// All blocks control can flow to next (excluding exception handlers)
    pub fn successors(&self) -> Vec<SynLabel> {
        let mut successors = self.branch_end.jump_targets();
        successors.extend(self.branch_end.fallthrough_target());
        successors
    }

    /// Run every instruction in the block, starting from the given frame
    pub fn evaluate(
        &self,
        entry_frame: &Frame,
        ctx: &EvaluationContext,
    ) -> Result<BlockExit, VerifierError> {
        let mut frame = entry_frame.clone();
        let mut handler_locals = entry_frame.locals.clone();

        for insn in &self.instructions {
            frame
                .verify_instruction(insn, ctx)
                .map_err(|kind| VerifierError {
                    instruction: format!("{:?}", insn),
                    kind,
                })?;
            log::trace!("{:?} => {}", insn, frame);

            if !self.exception_handlers.is_empty() {
                handler_locals = Frame::join_locals(&handler_locals, &frame.locals, ctx.hierarchy)
                    .map_err(|kind| VerifierError {
                        instruction: format!("exception handler locals after {:?}", insn),
                        kind,
                    })?;
            }
        }

        frame
            .verify_branch_instruction(&self.branch_end, ctx)
            .map_err(|kind| VerifierError {
                instruction: format!("{:?}", self.branch_end),
                kind,
            })?;

        Ok(BlockExit {
            frame,
            handler_locals,
        })
    }

    /// State at every instruction boundary in the block
    ///
    /// The first state is the entry frame and the last one is the state after the branch
    /// instruction. Once an instruction fails, all the states after it are errors.
    pub fn instruction_frames(
        &self,
        entry_frame: &Frame,
        ctx: &EvaluationContext,
    ) -> Vec<FrameState> {
        let mut states = vec![FrameState::Concrete(entry_frame.clone())];
        let mut state = FrameState::Concrete(entry_frame.clone());
        for insn in &self.instructions {
            state = state.evaluate(insn, ctx);
            states.push(state.clone());
        }
        states.push(state.evaluate_branch(&self.branch_end, ctx));
        states
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::ClassGraph;
    use crate::jvm::code::{AllocationSites, ConstantData, LabelGenerator, SynLabelGenerator};
    use crate::jvm::descriptors::ParseDescriptor;
    use crate::jvm::verifier::MethodContext;
    use crate::jvm::{
        MethodAccessFlags, MethodDescriptor, Name, UnqualifiedName, VerifierErrorKind,
    };

    fn method() -> MethodContext {
        MethodContext::new(
            BinaryName::from_str("me/Example").unwrap(),
            UnqualifiedName::from_str("run").unwrap(),
            MethodDescriptor::parse("(I)V").unwrap(),
            MethodAccessFlags::STATIC,
        )
    }

    #[test]
    fn handler_locals_cover_every_instruction() {
        let g = ClassGraph::new();
        g.insert_java_library_types();
        let method = method();
        let allocation_sites = AllocationSites::new();
        let ctx = EvaluationContext {
            method: &method,
            hierarchy: &g,
            allocation_sites: &allocation_sites,
        };

        let mut labels = SynLabelGenerator::new(SynLabel::START);
        let _ = labels.fresh_label();
        let handler = labels.fresh_label();
        let next = labels.fresh_label();

        let block = BasicBlock {
            declared_frame: None,
            instructions: vec![
                Instruction::Ldc(ConstantData::String(String::from("a"))),
                Instruction::AStore(1),
                Instruction::FConst0,
                Instruction::FStore(0),
            ],
            branch_end: BranchInstruction::FallThrough(next),
            exception_handlers: vec![ExceptionHandler {
                catch_type: Some(BinaryName::ARITHMETICEXCEPTION),
                handler,
            }],
        };

        let exit = block.evaluate(&method.entry_frame(), &ctx).unwrap();
        assert_eq!(
            exit.frame,
            Frame::new(
                [
                    (0, FrameType::float()),
                    (1, FrameType::object(BinaryName::STRING))
                ],
                []
            )
        );

        // Local 0 is `int` then `float`, local 1 is only set partway through
        assert!(exit.handler_locals.is_empty());
        assert_eq!(
            block.exception_handlers[0].entry_frame(exit.handler_locals, false),
            Frame::new([], [FrameType::object(BinaryName::ARITHMETICEXCEPTION)])
        );
        assert_eq!(block.successors(), vec![next]);
    }

    #[test]
    fn instruction_frames_stop_at_errors() {
        let g = ClassGraph::new();
        let method = method();
        let allocation_sites = AllocationSites::new();
        let ctx = EvaluationContext {
            method: &method,
            hierarchy: &g,
            allocation_sites: &allocation_sites,
        };

        let block = BasicBlock {
            declared_frame: None,
            instructions: vec![Instruction::ILoad(0), Instruction::JsrRet(2), Instruction::Nop],
            branch_end: BranchInstruction::Return,
            exception_handlers: vec![],
        };

        let states = block.instruction_frames(&method.entry_frame(), &ctx);
        assert_eq!(states.len(), 5);
        assert_eq!(
            states[1],
            FrameState::Concrete(Frame::new([(0, FrameType::int())], [FrameType::int()]))
        );
        for state in &states[2..] {
            match state {
                FrameState::Error(err) => assert_eq!(err.kind, VerifierErrorKind::UnexpectedJsrRet),
                other => panic!("Expected an error, but got {:?}", other),
            }
        }

        let err = block.evaluate(&method.entry_frame(), &ctx).unwrap_err();
        assert_eq!(err.kind, VerifierErrorKind::UnexpectedJsrRet);
    }
}
