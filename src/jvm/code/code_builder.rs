use crate::jvm::code::{
    AllocationSites, BasicBlock, BranchInstruction, Code, ExceptionHandler, Instruction,
    LabelGenerator, SynLabel, SynLabelGenerator,
};
use crate::jvm::verifier::{AllocationSite, Frame, MethodContext};
use crate::jvm::{BinaryName, Error};
use std::collections::{HashMap, HashSet};

/// This provides a very slightly simplified interface for building up method bodies. It does
/// internal bookeeping to track labels, reachability, and allocation sites.
///
/// ### Computing frames
///
/// The builder only records the structure of the code. Frames are computed afterwards over the
/// whole CFG (see [`Code::compute_frames`]), since blocks jumping to the same label have their
/// frames merged and that information must then be propagated further through the CFG.
///
/// ### Tracking reachability
///
/// Labels cannot be placed unless they are reachable (either with a fall-through from above, or
/// there has already been a jump to the label or a handler registered for it) or they come with
/// a declared frame. Instructions pushed while there is no current block (eg. right after a
/// `goto`) are dead code and get dropped.
pub struct CodeBuilder {
    /// Method code under construction
    code: Code,

    /// Labels which have been referenced in blocks so far, but not placed yet (does not overlap
    /// with keys of `code.blocks`)
    unplaced_labels: HashSet<SynLabel>,

    /// Block currently under construction (label is not in `blocks` _or_ `unplaced_labels`)
    current_block: Option<CurrentBlock>,
}

impl CodeBuilder {
    /// Create a builder for a new method
    pub fn new(method: MethodContext) -> Self {
        let mut label_generator = SynLabelGenerator::new(SynLabel::START);
        let current_block = Some(CurrentBlock::new(label_generator.fresh_label(), None));

        let code = Code {
            method,
            blocks: HashMap::new(),
            block_order: vec![],
            allocation_sites: AllocationSites::new(),
            label_generator,
        };

        CodeBuilder {
            code,
            unplaced_labels: HashSet::new(),
            current_block,
        }
    }

    /// Turn the builder into the method code
    pub fn result(self) -> Result<Code, Error> {
        // Weed out some error cases early
        if self.current_block.is_some() || !self.unplaced_labels.is_empty() {
            let mut unplaced_labels: Vec<SynLabel> =
                self.unplaced_labels.iter().copied().collect();
            unplaced_labels.sort();
            return Err(Error::MethodCodeNotFinished {
                pending_block: self
                    .current_block
                    .as_ref()
                    .map(|current_block| current_block.label),
                unplaced_labels,
            });
        }

        Ok(self.code)
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> SynLabel {
        self.code.label_generator.fresh_label()
    }

    /// Method whose body is being built
    pub fn method(&self) -> &MethodContext {
        &self.code.method
    }

    /// Label of the block under construction
    pub fn current_label(&self) -> Option<SynLabel> {
        self.current_block.as_ref().map(|block| block.label)
    }

    fn is_placed(&self, label: SynLabel) -> bool {
        self.code.blocks.contains_key(&label) || self.current_label() == Some(label)
    }

    /// Mark a label as used, so that it can be placed later
    fn reference_label(&mut self, label: SynLabel) {
        if !self.is_placed(label) {
            self.unplaced_labels.insert(label);
        }
    }

    /// Push a new instruction to the current block
    pub fn push_instruction(&mut self, insn: Instruction) -> Result<(), Error> {
        if let Some(current_block) = self.current_block.as_mut() {
            current_block.instructions.push(insn);
        }
        Ok(())
    }

    /// Push a `new` instruction for the given class, registering a fresh allocation site
    pub fn new_object(&mut self, class: BinaryName) -> Result<AllocationSite, Error> {
        let site = self.code.allocation_sites.alloc(class);
        self.push_instruction(Instruction::New(site))?;
        Ok(site)
    }

    /// Register a handler for exceptions thrown in the current block
    pub fn add_exception_handler(
        &mut self,
        catch_type: Option<BinaryName>,
        handler: SynLabel,
    ) -> Result<(), Error> {
        if self.current_block.is_some() {
            self.reference_label(handler);
        }
        if let Some(current_block) = self.current_block.as_mut() {
            current_block.exception_handlers.push(ExceptionHandler {
                catch_type,
                handler,
            });
        }
        Ok(())
    }

    /// Push a new branch instruction to close the current block and possibly open a new one
    pub fn push_branch_instruction(
        &mut self,
        insn: BranchInstruction<SynLabel, ()>,
    ) -> Result<(), Error> {
        if let Some(current_block) = self.current_block.take() {
            for jump_label in insn.jump_targets() {
                if jump_label != current_block.label {
                    self.reference_label(jump_label);
                }
            }

            let next_label = insn.fallthrough_target().map(|()| self.fresh_label());
            let branch_end = insn.map_labels(|lbl| *lbl, |()| next_label.unwrap_or(current_block.label));
            self.close_block(current_block, branch_end)?;
        }
        Ok(())
    }

    /// Start a new block with the given label, ending the current block (if there is one) with a
    /// fallthrough. This can fail if:
    ///
    ///   * the label was already placed
    ///   * the label was not ever been jumped to and there is no fallthrough (so the block would
    ///     be unreachable)
    ///
    pub fn place_label(&mut self, label: SynLabel) -> Result<(), Error> {
        self.place_label_inner(label, None)
    }

    /// Like `place_label`, but declares the frame at the start of the block. The block is
    /// allowed to be unreachable, and every frame flowing into it must be assignable to the
    /// declared frame.
    pub fn place_label_with_frame(&mut self, label: SynLabel, frame: Frame) -> Result<(), Error> {
        self.place_label_inner(label, Some(frame))
    }

    fn place_label_inner(&mut self, label: SynLabel, frame: Option<Frame>) -> Result<(), Error> {
        if self.is_placed(label) {
            return Err(Error::DuplicateLabel(label));
        }

        if let Some(current_block) = self.current_block.take() {
            self.close_block(current_block, BranchInstruction::FallThrough(label))?;
            if let Some(next_block) = self.current_block.as_mut() {
                next_block.declared_frame = frame;
            }
        } else if self.unplaced_labels.contains(&label) || frame.is_some() {
            self.current_block = Some(CurrentBlock::new(label, frame));
        } else {
            return Err(Error::PlacingLabelBeforeReference(label));
        }

        let _ = self.unplaced_labels.remove(&label);
        Ok(())
    }

    /// Seal the current block into a basic block, and open a next block if there is a
    /// fall-through
    fn close_block(
        &mut self,
        current_block: CurrentBlock,
        branch_end: BranchInstruction<SynLabel, SynLabel>,
    ) -> Result<(), Error> {
        let block_label = current_block.label;
        let fallthrough_target = branch_end.fallthrough_target();

        let basic_block = BasicBlock {
            declared_frame: current_block.declared_frame,
            instructions: current_block.instructions,
            branch_end,
            exception_handlers: current_block.exception_handlers,
        };

        self.code.block_order.push(block_label);
        if self.code.blocks.insert(block_label, basic_block).is_some() {
            return Err(Error::DuplicateLabel(block_label));
        }

        self.current_block = fallthrough_target.map(|label| CurrentBlock::new(label, None));
        Ok(())
    }
}

/// Just like `BasicBlock`, but not closed off yet
struct CurrentBlock {
    label: SynLabel,
    declared_frame: Option<Frame>,

    /// Accumulated instructions
    instructions: Vec<Instruction>,
    exception_handlers: Vec<ExceptionHandler>,
}

impl CurrentBlock {
    fn new(label: SynLabel, declared_frame: Option<Frame>) -> CurrentBlock {
        CurrentBlock {
            label,
            declared_frame,
            instructions: vec![],
            exception_handlers: vec![],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::OrdComparison;
    use crate::jvm::descriptors::ParseDescriptor;
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, Name, UnqualifiedName};

    fn builder() -> CodeBuilder {
        CodeBuilder::new(MethodContext::new(
            BinaryName::from_str("me/Example").unwrap(),
            UnqualifiedName::from_str("run").unwrap(),
            MethodDescriptor::parse("(I)I").unwrap(),
            MethodAccessFlags::STATIC,
        ))
    }

    #[test]
    fn blocks_and_fallthrough() {
        let mut builder = builder();
        let end = builder.fresh_label();

        builder.push_instruction(Instruction::ILoad(0)).unwrap();
        builder
            .push_branch_instruction(BranchInstruction::If(OrdComparison::EQ, end, ()))
            .unwrap();
        let middle = builder.current_label().unwrap();
        builder.push_instruction(Instruction::IConst1).unwrap();
        builder
            .push_branch_instruction(BranchInstruction::IReturn)
            .unwrap();

        // Dead code is dropped
        builder.push_instruction(Instruction::Nop).unwrap();

        builder.place_label(end).unwrap();
        builder.push_instruction(Instruction::IConst0).unwrap();
        builder
            .push_branch_instruction(BranchInstruction::IReturn)
            .unwrap();

        let code = builder.result().unwrap();
        assert_eq!(code.block_order, vec![SynLabel::START, middle, end]);
        assert_eq!(
            code.blocks[&SynLabel::START].branch_end,
            BranchInstruction::If(OrdComparison::EQ, end, middle)
        );
        assert_eq!(code.blocks[&middle].instructions, vec![Instruction::IConst1]);
    }

    #[test]
    fn label_errors() {
        let mut builder = builder();
        let unused = builder.fresh_label();
        builder
            .push_branch_instruction(BranchInstruction::Return)
            .unwrap();
        assert!(matches!(
            builder.place_label(unused),
            Err(Error::PlacingLabelBeforeReference(label)) if label == unused
        ));
        assert!(matches!(
            builder.place_label(SynLabel::START),
            Err(Error::DuplicateLabel(_))
        ));

        let mut builder = self::builder();
        let dangling = builder.fresh_label();
        builder
            .push_branch_instruction(BranchInstruction::Goto(dangling))
            .unwrap();
        match builder.result() {
            Err(Error::MethodCodeNotFinished {
                pending_block,
                unplaced_labels,
            }) => {
                assert_eq!(pending_block, None);
                assert_eq!(unplaced_labels, vec![dangling]);
            }
            _ => panic!("Expected unfinished method code"),
        }
    }

    #[test]
    fn allocation_sites_are_distinct() {
        let mut builder = builder();
        let site1 = builder.new_object(BinaryName::STRING).unwrap();
        let site2 = builder.new_object(BinaryName::STRING).unwrap();
        assert_ne!(site1, site2);
        builder
            .push_branch_instruction(BranchInstruction::Return)
            .unwrap();

        let code = builder.result().unwrap();
        assert_eq!(
            code.blocks[&SynLabel::START].instructions,
            vec![Instruction::New(site1), Instruction::New(site2)]
        );
        assert_eq!(code.allocation_sites.class_of(site1), &BinaryName::STRING);
    }
}
