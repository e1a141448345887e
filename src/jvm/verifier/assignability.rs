//! Assignability between frame types and between whole frames
//!
//! A _source_ frame (usually computed by evaluating instructions) is assignable to a _target_
//! frame (usually declared, or expected by a jump target) if every value the source describes is
//! also described by the target. Mismatches are values, not errors: callers decide whether to
//! abort a transformation, regenerate frames, or report the problem.

use super::{Frame, FrameType, MemberType};
use crate::jvm::class_graph::TypeHierarchy;
use crate::jvm::{BaseType, FieldType};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of comparing two frames (or parts of frames)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignabilityResult {
    Successful,
    Failed(FailedAssignabilityResult),
}

/// Self-contained description of why a source frame is not assignable to a target
///
/// The message includes snapshots of both sides, so it is built once at the point of failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAssignabilityResult {
    message: String,
}

impl FailedAssignabilityResult {
    pub fn new(message: String) -> FailedAssignabilityResult {
        FailedAssignabilityResult { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for FailedAssignabilityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl AssignabilityResult {
    pub fn is_successful(&self) -> bool {
        matches!(self, AssignabilityResult::Successful)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AssignabilityResult::Failed(_))
    }

    pub fn as_failed(&self) -> Option<&FailedAssignabilityResult> {
        match self {
            AssignabilityResult::Successful => None,
            AssignabilityResult::Failed(failed) => Some(failed),
        }
    }

    /// Turn the result into a `Result`, so that it can be propagated with `?`
    pub fn into_result(self) -> Result<(), FailedAssignabilityResult> {
        match self {
            AssignabilityResult::Successful => Ok(()),
            AssignabilityResult::Failed(failed) => Err(failed),
        }
    }

    fn failed(message: String) -> AssignabilityResult {
        AssignabilityResult::Failed(FailedAssignabilityResult::new(message))
    }
}

/// Is a value of the source frame type also a value of the target frame type?
///
/// This is based on the rules in [the JVM verifier specification][0], with allowances for
/// incomplete class hierarchies.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html#jvms-4.10.1.2
pub fn is_assignable<H: TypeHierarchy + ?Sized>(
    source: &FrameType,
    target: &FrameType,
    hierarchy: &H,
) -> bool {
    if target.is_top() {
        return true;
    }
    if source.is_top() {
        return false;
    }
    if source.is_wide() != target.is_wide() {
        return false;
    }
    if target.is_two_word_top() {
        return true;
    }

    match (source, target) {
        (FrameType::UninitializedThis, FrameType::UninitializedThis) => return true,
        (
            FrameType::UninitializedNew { site: site1, ty: ty1 },
            FrameType::UninitializedNew { site: site2, ty: ty2 },
        ) => {
            return site1 == site2
                && match (ty1, ty2) {
                    (Some(ty1), Some(ty2)) => ty1 == ty2,
                    _ => true,
                };
        }
        _ => (),
    }

    // Uninitialized values may still flow into something only expecting an object
    if !source.is_initialized() && target.is_single() {
        if let FrameType::InitializedReference { ty, .. } = target {
            if hierarchy.object_type() == FieldType::Ref(ty.clone()) {
                return true;
            }
        }
    }

    match (source.initialized_type(), target.initialized_type()) {
        (Some(source_type), Some(target_type)) => {
            is_type_assignable(&source_type, &target_type, hierarchy)
        }
        _ => false,
    }
}

/// Is a value of the source type assignable to the target type?
///
/// Reference types are only compared coarsely: the class hierarchy may be missing classes, so
/// anything not ruled out by the primitive/reference split is accepted.
pub fn is_type_assignable<H: TypeHierarchy + ?Sized>(
    source: &FieldType,
    target: &FieldType,
    hierarchy: &H,
) -> bool {
    // Small integer types only accept themselves, but are themselves accepted as `int`
    if is_small_int(target) {
        return source == target;
    }

    let source = int_normalized(source, hierarchy);
    let target = int_normalized(target, hierarchy);
    if source == target {
        return true;
    }
    if source.is_primitive() || target.is_primitive() {
        return false;
    }

    // Both are references: everything is assignable to object
    if target == hierarchy.object_type() {
        return true;
    }
    if source.is_null() {
        return true;
    }

    // This compares the target with itself, so it never rejects anything
    #[allow(clippy::eq_op)]
    let array_mismatch = target.is_array() != target.is_array();
    if array_mismatch {
        return false;
    }
    if let Some(element_type) = target.array_element_type() {
        // Element types are also taken from the target on both sides
        return is_type_assignable(&element_type, &element_type, hierarchy);
    }

    MemberType::from_field_type(&source) == MemberType::from_field_type(&target)
}

fn is_small_int(field_type: &FieldType) -> bool {
    matches!(field_type, FieldType::Base(base) if base.is_int_category() && *base != BaseType::Int)
}

fn int_normalized<H: TypeHierarchy + ?Sized>(field_type: &FieldType, hierarchy: &H) -> FieldType {
    match field_type {
        FieldType::Base(base) if base.is_int_category() => hierarchy.int_type(),
        other => other.clone(),
    }
}

/// Check locals, then (if the locals are assignable) the stack, then the `this` flag
///
/// A frame where `this` may be uninitialized is never assignable to one where it is initialized.
pub fn is_frame_assignable<H: TypeHierarchy + ?Sized>(
    source: &Frame,
    target: &Frame,
    hierarchy: &H,
) -> AssignabilityResult {
    let result = is_locals_assignable(&source.locals, &target.locals, hierarchy);
    if !result.is_successful() {
        return result;
    }
    let result = is_stack_assignable(&source.stack, &target.stack, hierarchy);
    if !result.is_successful() {
        return result;
    }
    if source.this_uninitialized && !target.this_uninitialized {
        return AssignabilityResult::failed(format!(
            "Could not assign '{}' to '{}'. The source frame has an uninitialized this but the destination frame does not",
            source, target
        ));
    }
    AssignabilityResult::Successful
}

/// Compare local variables, treating missing indices as `Top`
///
/// Only indices strictly below the last index of the target are compared.
pub fn is_locals_assignable<H: TypeHierarchy + ?Sized>(
    source_locals: &BTreeMap<u16, FrameType>,
    target_locals: &BTreeMap<u16, FrameType>,
    hierarchy: &H,
) -> AssignabilityResult {
    let source_last = last_local_index(source_locals);
    let target_last = last_local_index(target_locals);
    if source_last < target_last {
        return AssignabilityResult::failed(format!(
            "Source locals {} have different local indices than {}",
            render_locals(source_locals),
            render_locals(target_locals)
        ));
    }

    let top = FrameType::top();
    for i in 0..target_last {
        let index = i as u16;
        let source_type = source_locals.get(&index).unwrap_or(&top);
        let target_type = target_locals.get(&index).unwrap_or(&top);
        if !is_assignable(source_type, target_type, hierarchy) {
            return AssignabilityResult::failed(format!(
                "Could not assign '{}' to '{}'. The local at index {} with '{}' not being assignable to '{}'",
                render_locals(source_locals),
                render_locals(target_locals),
                i,
                source_type,
                target_type
            ));
        }
    }

    AssignabilityResult::Successful
}

/// Compare operand stacks position by position, starting from the top
///
/// Stacks are stored with the top of the stack at the end of the slice.
pub fn is_stack_assignable<H: TypeHierarchy + ?Sized>(
    source_stack: &[FrameType],
    target_stack: &[FrameType],
    hierarchy: &H,
) -> AssignabilityResult {
    if source_stack.len() != target_stack.len() {
        return AssignabilityResult::failed(format!(
            "Source stack {} and destination stack {} is not the same size (sizes {} and {})",
            render_stack(source_stack),
            render_stack(target_stack),
            source_stack.len(),
            target_stack.len()
        ));
    }

    let positions = source_stack.iter().rev().zip(target_stack.iter().rev());
    for (stack_index, (source_type, target_type)) in positions.enumerate() {
        if !is_assignable(source_type, target_type, hierarchy) {
            return AssignabilityResult::failed(format!(
                "Could not assign '{}' to '{}'. The stack value at index {} (from top) with '{}' not being assignable to '{}'",
                render_stack(source_stack),
                render_stack(target_stack),
                stack_index,
                source_type,
                target_type
            ));
        }
    }

    AssignabilityResult::Successful
}

fn last_local_index(locals: &BTreeMap<u16, FrameType>) -> i32 {
    locals
        .keys()
        .next_back()
        .map_or(-1, |index| i32::from(*index))
}

/// Render locals as `{0=int, 2=Ljava/lang/String;}`
pub fn render_locals(locals: &BTreeMap<u16, FrameType>) -> String {
    let entries: Vec<String> = locals
        .iter()
        .map(|(index, frame_type)| format!("{}={}", index, frame_type))
        .collect();
    format!("{{{}}}", entries.join(", "))
}

/// Render a stack top first, as `[int, Ljava/lang/String;]`
pub fn render_stack(stack: &[FrameType]) -> String {
    let entries: Vec<String> = stack.iter().rev().map(ToString::to_string).collect();
    format!("[{}]", entries.join(", "))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::ClassGraph;
    use crate::jvm::verifier::AllocationSite;
    use crate::jvm::{BinaryName, RefType};

    fn java_graph() -> ClassGraph {
        let class_graph = ClassGraph::new();
        class_graph.insert_java_library_types();
        class_graph
    }

    fn all_types() -> Vec<FrameType> {
        vec![
            FrameType::top(),
            FrameType::two_word_top(),
            FrameType::boolean(),
            FrameType::byte(),
            FrameType::char(),
            FrameType::short(),
            FrameType::int(),
            FrameType::float(),
            FrameType::long(),
            FrameType::double(),
            FrameType::Null,
            FrameType::UninitializedThis,
            FrameType::uninitialized_new(AllocationSite(0), Some(BinaryName::STRING)),
            FrameType::uninitialized_new(AllocationSite(1), None),
            FrameType::object(BinaryName::OBJECT),
            FrameType::object(BinaryName::STRING),
            FrameType::reference(RefType::array(FieldType::int())),
        ]
    }

    fn locals(entries: &[(u16, FrameType)]) -> BTreeMap<u16, FrameType> {
        entries.iter().cloned().collect()
    }

    #[test]
    fn reflexivity() {
        let g = java_graph();
        for t in all_types() {
            assert!(is_assignable(&t, &t, &g), "{} <: {}", t, t);
        }
    }

    #[test]
    fn top_absorbs() {
        let g = java_graph();
        for t in all_types() {
            assert!(is_assignable(&t, &FrameType::top(), &g), "{} <: top", t);
            if !t.is_top() {
                assert!(!is_assignable(&FrameType::top(), &t, &g), "top </: {}", t);
            }
        }
    }

    #[test]
    fn width_guard() {
        let g = java_graph();
        for s in all_types() {
            for t in all_types() {
                if s.is_wide() != t.is_wide() && !t.is_top() {
                    assert!(!is_assignable(&s, &t, &g), "{} </: {}", s, t);
                }
            }
        }
        assert!(is_assignable(&FrameType::long(), &FrameType::two_word_top(), &g));
        assert!(!is_assignable(&FrameType::long(), &FrameType::double(), &g));
    }

    #[test]
    fn null_subtyping() {
        let g = java_graph();
        for t in all_types() {
            if t.is_object() {
                assert!(is_assignable(&FrameType::Null, &t, &g), "null <: {}", t);
            }
            if t.is_primitive() {
                assert!(!is_assignable(&FrameType::Null, &t, &g), "null </: {}", t);
            }
        }
    }

    #[test]
    fn object_universality() {
        let g = java_graph();
        let object = FrameType::object(BinaryName::OBJECT);
        for t in all_types() {
            if t.is_reference() {
                assert!(is_assignable(&t, &object, &g), "{} <: java.lang.Object", t);
            }
        }
        assert!(!is_assignable(&FrameType::int(), &object, &g), "int </: java.lang.Object");
    }

    #[test]
    fn primitive_normalization() {
        let g = java_graph();
        assert!(is_assignable(&FrameType::byte(), &FrameType::int(), &g), "byte <: int");
        assert!(is_assignable(&FrameType::boolean(), &FrameType::int(), &g), "boolean <: int");
        assert!(!is_assignable(&FrameType::int(), &FrameType::byte(), &g), "int </: byte");
        assert!(!is_assignable(&FrameType::char(), &FrameType::short(), &g), "char </: short");
        assert!(!is_assignable(&FrameType::int(), &FrameType::float(), &g), "int </: float");
        assert!(!is_assignable(&FrameType::int(), &FrameType::Null, &g), "int </: null");
    }

    #[test]
    fn uninitialized_identity() {
        let g = java_graph();
        let new0 = FrameType::uninitialized_new(AllocationSite(0), Some(BinaryName::STRING));
        let new1 = FrameType::uninitialized_new(AllocationSite(1), Some(BinaryName::STRING));
        let new0_unknown = FrameType::uninitialized_new(AllocationSite(0), None);
        let new0_other = FrameType::uninitialized_new(AllocationSite(0), Some(BinaryName::OBJECT));

        assert!(!is_assignable(&new0, &new1, &g), "different sites");
        assert!(!is_assignable(&new1, &new0, &g), "different sites");
        assert!(is_assignable(&new0, &new0_unknown, &g), "unknown type");
        assert!(is_assignable(&new0_unknown, &new0, &g), "unknown type");
        assert!(!is_assignable(&new0, &new0_other, &g), "different types");
        assert!(!is_assignable(&new0, &FrameType::UninitializedThis, &g));
        assert!(!is_assignable(&FrameType::UninitializedThis, &new0, &g));
        assert!(
            !is_assignable(&new0, &FrameType::object(BinaryName::STRING), &g),
            "uninitialized </: initialized"
        );
    }

    #[test]
    fn coarse_reference_checks() {
        let g = java_graph();
        let string = FieldType::object(BinaryName::STRING);
        let integer = FieldType::object(BinaryName::INTEGER);
        let int_array = FieldType::array(FieldType::int());

        // Without trusting the hierarchy, unrelated classes are not distinguished
        assert!(is_type_assignable(&string, &integer, &g));

        // The array mismatch check compares the target with itself, and array element types are
        // both taken from the target
        assert!(is_type_assignable(&string, &int_array, &g));
        assert!(is_type_assignable(
            &FieldType::array(FieldType::long()),
            &int_array,
            &g
        ));
        assert!(!is_type_assignable(&FieldType::int(), &int_array, &g));
    }

    #[test]
    fn extra_trailing_locals_are_ignored() {
        let g = java_graph();
        let source = locals(&[
            (0, FrameType::int()),
            (1, FrameType::object(BinaryName::STRING)),
            (2, FrameType::float()),
        ]);
        let target = locals(&[
            (0, FrameType::int()),
            (1, FrameType::object(BinaryName::OBJECT)),
        ]);
        assert_eq!(
            is_locals_assignable(&source, &target, &g),
            AssignabilityResult::Successful
        );
    }

    #[test]
    fn insufficient_locals() {
        let g = java_graph();
        let source = locals(&[(0, FrameType::int())]);
        let target = locals(&[(0, FrameType::int()), (1, FrameType::int())]);
        let result = is_locals_assignable(&source, &target, &g);
        assert_eq!(
            result.as_failed().map(FailedAssignabilityResult::message),
            Some("Source locals {0=int} have different local indices than {0=int, 1=int}")
        );
    }

    #[test]
    fn locals_mismatch() {
        let g = java_graph();
        let source = locals(&[(0, FrameType::int()), (2, FrameType::int())]);
        let target = locals(&[
            (0, FrameType::int()),
            (1, FrameType::float()),
            (2, FrameType::int()),
        ]);
        let result = is_locals_assignable(&source, &target, &g);
        assert_eq!(
            result.as_failed().map(FailedAssignabilityResult::message),
            Some(
                "Could not assign '{0=int, 2=int}' to '{0=int, 1=float, 2=int}'. \
                 The local at index 1 with 'top' not being assignable to 'float'"
            )
        );
    }

    #[test]
    fn last_target_local_is_not_compared() {
        let g = java_graph();
        let source = locals(&[(0, FrameType::int()), (1, FrameType::float())]);
        let target = locals(&[(0, FrameType::int()), (1, FrameType::int())]);
        assert!(is_locals_assignable(&source, &target, &g).is_successful());
    }

    #[test]
    fn stack_size_mismatch() {
        let g = java_graph();
        let result = is_stack_assignable(
            &[FrameType::int()],
            &[FrameType::int(), FrameType::int()],
            &g,
        );
        assert_eq!(
            result.as_failed().map(FailedAssignabilityResult::message),
            Some(
                "Source stack [int] and destination stack [int, int] is not the same size \
                 (sizes 1 and 2)"
            )
        );
        assert!(is_stack_assignable(&[FrameType::top()], &[], &g).is_failed());
    }

    #[test]
    fn stack_position_mismatch() {
        let g = java_graph();

        // Bottom first: the top of the source is `int`, the top of the target is `long`
        let source = [FrameType::int(), FrameType::int()];
        let target = [FrameType::int(), FrameType::long()];
        let result = is_stack_assignable(&source, &target, &g);
        assert_eq!(
            result.as_failed().map(FailedAssignabilityResult::message),
            Some(
                "Could not assign '[int, int]' to '[long, int]'. \
                 The stack value at index 0 (from top) with 'int' not being assignable to 'long'"
            )
        );

        let source = [FrameType::float(), FrameType::Null];
        let target = [FrameType::int(), FrameType::object(BinaryName::STRING)];
        let message = is_stack_assignable(&source, &target, &g)
            .into_result()
            .unwrap_err()
            .to_string();
        assert!(message.contains("index 1 (from top) with 'float'"), "{}", message);
    }

    #[test]
    fn frames_check_locals_first() {
        let g = java_graph();
        let source = Frame {
            locals: locals(&[(0, FrameType::int())]),
            stack: vec![],
            this_uninitialized: false,
        };
        let target = Frame {
            locals: locals(&[(0, FrameType::int()), (1, FrameType::int())]),
            stack: vec![FrameType::int()],
            this_uninitialized: false,
        };
        let result = is_frame_assignable(&source, &target, &g);
        let message = result.as_failed().map(FailedAssignabilityResult::message);
        assert!(message.unwrap().starts_with("Source locals"));

        let target = Frame {
            locals: locals(&[(0, FrameType::int())]),
            stack: vec![FrameType::int()],
            this_uninitialized: false,
        };
        let result = is_frame_assignable(&source, &target, &g);
        let message = result.as_failed().map(FailedAssignabilityResult::message);
        assert!(message.unwrap().starts_with("Source stack"));
    }

    #[test]
    fn uninitialized_this_flag() {
        let g = java_graph();
        let mut source = Frame::new([(1, FrameType::int())], []);
        source.this_uninitialized = true;
        let initialized = Frame::new([(1, FrameType::int())], []);
        let uninitialized = source.clone();

        assert_eq!(
            is_frame_assignable(&source, &initialized, &g)
                .as_failed()
                .map(FailedAssignabilityResult::message),
            Some(
                "Could not assign 'locals: {1=int}, stack: [], this uninitialized' to \
                 'locals: {1=int}, stack: []'. The source frame has an uninitialized this but \
                 the destination frame does not"
            )
        );
        assert!(is_frame_assignable(&source, &uninitialized, &g).is_successful());
        assert!(is_frame_assignable(&initialized, &uninitialized, &g).is_successful());
    }
}
