//! Frame computation for many methods at once
//!
//! Methods are independent units of work: each worker thread repeatedly claims the next method
//! that hasn't been processed yet. The only state shared between workers is the (read-only) type
//! hierarchy, whose memoized supertype sets are safe to fill in from several threads at once.

use crate::jvm::class_graph::TypeHierarchy;
use crate::jvm::code::{Code, SynLabel};
use crate::jvm::verifier::Frame;
use crate::jvm::Error;
use crate::settings::Settings;
use std::collections::HashMap;
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

/// Frames at the start of every reachable block of a method
pub type MethodFrames = HashMap<SynLabel, Frame>;

/// Compute the frames of every method, reporting failures per method
///
/// Results are in the same order as the input methods.
pub fn compute_frames<H: TypeHierarchy + Sync>(
    methods: &[Code],
    hierarchy: &H,
    settings: &Settings,
) -> Vec<Result<MethodFrames, Error>> {
    let abandoned = AtomicBool::new(false);
    run_workers(methods, hierarchy, settings, &abandoned, false)
        .into_iter()
        .flatten()
        .collect()
}

/// Compute the frames of every method, stopping at the first failure
///
/// Once one method fails, workers stop picking up new methods and all frames computed so far
/// are discarded.
pub fn compute_all_frames<H: TypeHierarchy + Sync>(
    methods: &[Code],
    hierarchy: &H,
    settings: &Settings,
) -> Result<Vec<MethodFrames>, Error> {
    let abandoned = AtomicBool::new(false);
    let results = run_workers(methods, hierarchy, settings, &abandoned, true);

    let mut all_frames = Vec::with_capacity(methods.len());
    let mut first_error = None;
    for result in results.into_iter().flatten() {
        match result {
            Ok(frames) => all_frames.push(frames),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    match first_error {
        Some(err) => {
            log::debug!("Abandoning frame computation: {}", err);
            Err(err)
        }
        None => Ok(all_frames),
    }
}

/// Run the workers, returning `None` for the methods which were never processed
fn run_workers<H: TypeHierarchy + Sync>(
    methods: &[Code],
    hierarchy: &H,
    settings: &Settings,
    abandoned: &AtomicBool,
    fail_fast: bool,
) -> Vec<Option<Result<MethodFrames, Error>>> {
    let next_method = AtomicUsize::new(0);
    let worker_count = settings.worker_threads.clamp(1, methods.len().max(1));
    log::debug!(
        "Computing frames of {} methods on {} threads",
        methods.len(),
        worker_count
    );

    let worker = || {
        let mut processed = vec![];
        while !abandoned.load(Ordering::Acquire) {
            let index = next_method.fetch_add(1, Ordering::Relaxed);
            let code = match methods.get(index) {
                Some(code) => code,
                None => break,
            };

            let result = code.compute_frames(hierarchy, settings);
            match &result {
                Ok(frames) => log::debug!(
                    "Computed {} frames for {}.{}",
                    frames.len(),
                    code.method.class,
                    code.method.name
                ),
                Err(err) => {
                    log::debug!(
                        "Failed to compute frames for {}.{}: {}",
                        code.method.class,
                        code.method.name,
                        err
                    );
                    if fail_fast {
                        abandoned.store(true, Ordering::Release);
                    }
                }
            }
            processed.push((index, result));
        }
        processed
    };

    let mut results: Vec<Option<Result<MethodFrames, Error>>> =
        methods.iter().map(|_| None).collect();
    thread::scope(|scope| {
        let handles: Vec<_> = (0..worker_count).map(|_| scope.spawn(worker)).collect();
        for handle in handles {
            let processed = handle
                .join()
                .unwrap_or_else(|payload| panic::resume_unwind(payload));
            for (index, result) in processed {
                results[index] = Some(result);
            }
        }
    });
    results
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::ClassGraph;
    use crate::jvm::code::{BranchInstruction, CodeBuilder, Instruction};
    use crate::jvm::verifier::MethodContext;
    use crate::jvm::{
        BinaryName, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName,
    };

    fn method_code(index: usize, broken: bool) -> Code {
        let method = MethodContext::new(
            BinaryName::from_str("me/Example").unwrap(),
            UnqualifiedName::from_string(format!("method{}", index)).unwrap(),
            MethodDescriptor::parse("(J)J").unwrap(),
            MethodAccessFlags::STATIC,
        );
        let mut builder = CodeBuilder::new(method);
        let load = if broken {
            Instruction::ILoad(0)
        } else {
            Instruction::LLoad(0)
        };
        builder.push_instruction(load).unwrap();
        builder
            .push_branch_instruction(BranchInstruction::LReturn)
            .unwrap();
        builder.result().unwrap()
    }

    #[test]
    fn results_keep_method_order() {
        let graph = ClassGraph::new();
        graph.insert_java_library_types();
        let settings = Settings {
            worker_threads: 3,
            ..Settings::default()
        };

        let methods: Vec<Code> = (0..20).map(|i| method_code(i, i % 7 == 3)).collect();
        let results = compute_frames(&methods, &graph, &settings);
        assert_eq!(results.len(), 20);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.is_err(), i % 7 == 3, "method{}", i);
        }
    }

    #[test]
    fn fail_fast_discards_frames() {
        let graph = ClassGraph::new();
        let settings = Settings {
            worker_threads: 2,
            ..Settings::default()
        };

        let methods: Vec<Code> = (0..10).map(|i| method_code(i, i == 5)).collect();
        assert!(compute_all_frames(&methods, &graph, &settings).is_err());

        let methods: Vec<Code> = (0..10).map(|i| method_code(i, false)).collect();
        let frames = compute_all_frames(&methods, &graph, &settings).unwrap();
        assert_eq!(frames.len(), 10);
    }

    #[test]
    fn no_methods() {
        let graph = ClassGraph::new();
        let frames = compute_all_frames(&[], &graph, &Settings::default()).unwrap();
        assert!(frames.is_empty());
    }
}
