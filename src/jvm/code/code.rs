use crate::jvm::class_graph::TypeHierarchy;
use crate::jvm::code::{BasicBlock, SynLabel, SynLabelGenerator};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::verifier::{
    is_frame_assignable, AllocationSite, AssignabilityResult, EvaluationContext, Frame,
    MethodContext,
};
use crate::jvm::{BinaryName, Error, VerifierError, VerifierErrorKind};
use crate::settings::Settings;
use std::collections::{HashMap, HashSet, VecDeque};

/// Classes instantiated by the `new` instructions of a method
///
/// Each `new` gets its own site, so that two objects of the same class can be told apart while
/// they are still uninitialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationSites {
    classes: Vec<BinaryName>,
}

impl AllocationSites {
    pub fn new() -> AllocationSites {
        AllocationSites::default()
    }

    /// Register a new allocation of the given class
    pub fn alloc(&mut self, class: BinaryName) -> AllocationSite {
        let site = AllocationSite(self.classes.len() as u32);
        self.classes.push(class);
        site
    }

    /// Class allocated at a site
    ///
    /// Panics if the site was not produced by this arena.
    pub fn class_of(&self, site: AllocationSite) -> &BinaryName {
        match self.classes.get(site.0 as usize) {
            Some(class) => class,
            None => panic!("Unknown allocation site {:?}", site),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Semantic representation of a method body
#[derive(Debug, Clone)]
pub struct Code {
    /// Method to which the code belongs
    pub method: MethodContext,

    /// Basic blocks in the code
    pub blocks: HashMap<SynLabel, BasicBlock>,

    /// Order of basic blocks in the code (elements are unique and exactly match keys of `blocks`)
    pub block_order: Vec<SynLabel>,

    /// Classes of the objects allocated in the code
    pub allocation_sites: AllocationSites,

    /// Generator to produce the next label
    pub label_generator: SynLabelGenerator,
}

impl Code {
    pub fn evaluation_context<'a>(
        &'a self,
        hierarchy: &'a dyn TypeHierarchy,
    ) -> EvaluationContext<'a> {
        EvaluationContext {
            method: &self.method,
            hierarchy,
            allocation_sites: &self.allocation_sites,
        }
    }

    /// Compute the frame at the start of every reachable block
    ///
    /// This is a worklist fixpoint: blocks get re-analyzed every time the frame flowing into them
    /// is widened by a join. Blocks with a declared frame always start with that frame (and are
    /// analyzed even when unreachable), but every frame flowing into them must be assignable to
    /// the declared one.
    pub fn compute_frames(
        &self,
        hierarchy: &dyn TypeHierarchy,
        settings: &Settings,
    ) -> Result<HashMap<SynLabel, Frame>, Error> {
        let mut fixpoint = FrameFixpoint {
            code: self,
            hierarchy,
            settings,
            entry_frames: HashMap::new(),
            worklist: VecDeque::new(),
            queued: HashSet::new(),
        };

        fixpoint.flow_into(SynLabel::START, self.method.entry_frame())?;
        for label in &self.block_order {
            if let Some(declared_frame) = self.block(*label)?.declared_frame.as_ref() {
                fixpoint.entry_frames.insert(*label, declared_frame.clone());
                fixpoint.enqueue(*label);
            }
        }
        fixpoint.run()?;

        Ok(fixpoint.entry_frames)
    }

    /// Check that the method body is verifiable
    pub fn verify(&self, hierarchy: &dyn TypeHierarchy, settings: &Settings) -> Result<(), Error> {
        let frames = self.compute_frames(hierarchy, settings)?;
        log::debug!(
            "Verified {}{} ({} of {} blocks reachable)",
            self.method.name,
            self.method.descriptor.render(),
            frames.len(),
            self.blocks.len()
        );
        Ok(())
    }

    fn block(&self, label: SynLabel) -> Result<&BasicBlock, Error> {
        self.blocks.get(&label).ok_or(Error::MissingLabel(label))
    }
}

struct FrameFixpoint<'a> {
    code: &'a Code,
    hierarchy: &'a dyn TypeHierarchy,
    settings: &'a Settings,

    /// Frame at the start of each block reached so far
    entry_frames: HashMap<SynLabel, Frame>,

    /// Blocks whose entry frame changed since they were last analyzed
    worklist: VecDeque<SynLabel>,
    queued: HashSet<SynLabel>,
}

impl<'a> FrameFixpoint<'a> {
    fn enqueue(&mut self, label: SynLabel) {
        if self.queued.insert(label) {
            self.worklist.push_back(label);
        }
    }

    fn run(&mut self) -> Result<(), Error> {
        let code = self.code;
        let ctx = code.evaluation_context(self.hierarchy);
        let mut visits: usize = 0;

        while let Some(label) = self.worklist.pop_front() {
            self.queued.remove(&label);
            visits += 1;
            if visits > self.settings.max_fixpoint_iterations {
                return Err(Error::Verifier(VerifierError {
                    instruction: format!("block {}", label),
                    kind: VerifierErrorKind::FixpointDiverged(self.settings.max_fixpoint_iterations),
                }));
            }

            let block = code.block(label)?;
            let entry_frame = match self.entry_frames.get(&label) {
                Some(frame) => frame.clone(),
                None => continue,
            };
            log::debug!("Analyzing block {} from {}", label, entry_frame);

            let exit = block.evaluate(&entry_frame, &ctx)?;
            for handler in &block.exception_handlers {
                let handler_frame = handler
                    .entry_frame(exit.handler_locals.clone(), entry_frame.this_uninitialized);
                self.flow_into(handler.handler, handler_frame)?;
            }
            for successor in block.successors() {
                self.flow_into(successor, exit.frame.clone())?;
            }
        }

        Ok(())
    }

    /// Merge a frame flowing along an edge into the entry frame of the target block
    fn flow_into(&mut self, target: SynLabel, incoming: Frame) -> Result<(), Error> {
        let code = self.code;
        let block = code.block(target)?;

        if let Some(declared_frame) = &block.declared_frame {
            if self.settings.check_declared_frames {
                if let AssignabilityResult::Failed(failed) =
                    is_frame_assignable(&incoming, declared_frame, self.hierarchy)
                {
                    log::warn!("Declared frame at {} rejected: {}", target, failed);
                    return Err(Error::IncompatibleFrames(target, failed));
                }
            }
            return Ok(());
        }

        let updated = match self.entry_frames.get(&target) {
            None => incoming,
            Some(existing) => {
                let joined =
                    existing
                        .join(&incoming, self.hierarchy)
                        .map_err(|kind| VerifierError {
                            instruction: format!("join at block {}", target),
                            kind,
                        })?;
                if &joined == existing {
                    return Ok(());
                }
                log::debug!("Widened entry frame of {} to {}", target, joined);
                joined
            }
        };

        self.entry_frames.insert(target, updated);
        self.enqueue(target);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allocation_sites() {
        let mut sites = AllocationSites::new();
        let site1 = sites.alloc(BinaryName::STRING);
        let site2 = sites.alloc(BinaryName::STRING);
        assert_ne!(site1, site2);
        assert_eq!(sites.class_of(site2), &BinaryName::STRING);
        assert_eq!(sites.len(), 2);
    }

    #[test]
    #[should_panic(expected = "Unknown allocation site")]
    fn unknown_allocation_site() {
        AllocationSites::new().class_of(AllocationSite(3));
    }
}
