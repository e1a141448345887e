use super::TypeHierarchy;
use crate::jvm::{BinaryName, FieldType, RefType};
use std::cmp::Ordering;

/// Subtyping relationship between types
pub trait Assignable {
    /// Is the first type assignable to the second?
    fn is_assignable<H: TypeHierarchy + ?Sized>(&self, super_type: &Self, hierarchy: &H) -> bool;
}

/// Classes are assignable if there is a path of super type edges between them
impl Assignable for BinaryName {
    fn is_assignable<H: TypeHierarchy + ?Sized>(&self, super_type: &Self, hierarchy: &H) -> bool {
        self == super_type || hierarchy.is_assignable_class(self, super_type)
    }
}

/// This matches the semantics of the prolog predicate `isJavaAssignable(sub_type, super_type)` in
/// the JVM verifier specification.
impl Assignable for RefType {
    fn is_assignable<H: TypeHierarchy + ?Sized>(&self, super_type: &Self, hierarchy: &H) -> bool {
        match (self, super_type) {
            // `null` inhabits every reference type
            (RefType::Null, _) => true,
            (_, RefType::Null) => false,

            // Special superclass and interfaces of all arrays
            (
                RefType::PrimitiveArray(_) | RefType::ObjectArray(_),
                RefType::Object(object_type),
            ) => is_array_type_assignable(object_type),

            // Primitive arrays must match in dimension and type
            (RefType::PrimitiveArray(arr1), RefType::PrimitiveArray(arr2)) => arr1 == arr2,

            // Higher dimensional primitive arrays can be subtypes of object arrays
            (RefType::PrimitiveArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less | Ordering::Equal => false,
                    Ordering::Greater => is_array_type_assignable(&arr2.element_type),
                }
            }

            // Cursed (unsound) covariance of arrays
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less => false,
                    Ordering::Equal => arr1
                        .element_type
                        .is_assignable(&arr2.element_type, hierarchy),
                    Ordering::Greater => is_array_type_assignable(&arr2.element_type),
                }
            }

            (RefType::Object(cls1), RefType::Object(cls2)) => cls1.is_assignable(cls2, hierarchy),

            _ => false,
        }
    }
}

impl Assignable for FieldType {
    fn is_assignable<H: TypeHierarchy + ?Sized>(&self, super_type: &Self, hierarchy: &H) -> bool {
        match (self, super_type) {
            (FieldType::Base(base1), FieldType::Base(base2)) => base1 == base2,
            (FieldType::Ref(ref1), FieldType::Ref(ref2)) => ref1.is_assignable(ref2, hierarchy),
            _ => false,
        }
    }
}

/// Check if arrays can be assigned to a super type
///
/// This bakes in knowledge of the small, finite set of super types arrays have.
fn is_array_type_assignable(super_type: &BinaryName) -> bool {
    super_type == &BinaryName::OBJECT
        || super_type == &BinaryName::CLONEABLE
        || super_type == &BinaryName::SERIALIZABLE
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{Assignable, ClassGraph};
    use crate::jvm::{BinaryName, FieldType, RefType};

    fn java_graph() -> ClassGraph {
        let class_graph = ClassGraph::new();
        class_graph.insert_java_library_types();
        class_graph
    }

    #[test]
    fn simple_classes() {
        let g = java_graph();

        let object_cls = &BinaryName::OBJECT;
        let string_cls = &BinaryName::STRING;

        assert!(
            object_cls.is_assignable(object_cls, &g),
            "java.lang.Object <: java.lang.Object"
        );
        assert!(
            string_cls.is_assignable(string_cls, &g),
            "java.lang.String <: java.lang.String"
        );
        assert!(
            string_cls.is_assignable(object_cls, &g),
            "java.lang.String <: java.lang.Object"
        );
        assert!(
            !object_cls.is_assignable(string_cls, &g),
            "java.lang.Object </: java.lang.String"
        );
    }

    #[test]
    fn transitive_classes() {
        let g = java_graph();

        let object_cls = &BinaryName::OBJECT;
        let number_cls = &BinaryName::NUMBER;
        let integer_cls = &BinaryName::INTEGER;

        assert!(
            integer_cls.is_assignable(number_cls, &g),
            "java.lang.Integer <: java.lang.Number"
        );
        assert!(
            integer_cls.is_assignable(object_cls, &g),
            "java.lang.Integer <: java.lang.Object"
        );
        assert!(
            !number_cls.is_assignable(integer_cls, &g),
            "java.lang.Number </: java.lang.Integer"
        );
        assert!(
            !object_cls.is_assignable(integer_cls, &g),
            "java.lang.Object </: java.lang.Integer"
        );
    }

    #[test]
    fn simple_interfaces() {
        let g = java_graph();

        let string_cls = &BinaryName::STRING;
        let charsequence_cls = &BinaryName::CHARSEQUENCE;

        assert!(
            string_cls.is_assignable(charsequence_cls, &g),
            "java.lang.String <: java.lang.CharSequence"
        );
        assert!(
            charsequence_cls.is_assignable(&BinaryName::OBJECT, &g),
            "java.lang.CharSequence <: java.lang.Object"
        );
        assert!(
            !charsequence_cls.is_assignable(string_cls, &g),
            "java.lang.CharSequence </: java.lang.String"
        );
    }

    #[test]
    fn null_type() {
        let g = java_graph();

        let string = &RefType::STRING;
        let int_array = &RefType::array(FieldType::int());

        assert!(RefType::Null.is_assignable(string, &g), "null <: java.lang.String");
        assert!(RefType::Null.is_assignable(int_array, &g), "null <: []int");
        assert!(!string.is_assignable(&RefType::Null, &g), "java.lang.String </: null");
        assert!(
            !FieldType::NULL.is_assignable(&FieldType::int(), &g),
            "null </: int"
        );
    }

    #[test]
    fn primitive_arrays() {
        let g = java_graph();

        let object_cls = &RefType::OBJECT;
        let int_array = &RefType::array(FieldType::int());
        let long_array = &RefType::array(FieldType::long());

        assert!(
            int_array.is_assignable(object_cls, &g),
            "[]int <: java.lang.Object"
        );
        assert!(
            int_array.is_assignable(&RefType::Object(BinaryName::CLONEABLE), &g),
            "[]int <: java.lang.Cloneable"
        );
        assert!(
            !object_cls.is_assignable(int_array, &g),
            "java.lang.Object </: []int"
        );
        assert!(int_array.is_assignable(int_array, &g), "[]int <: []int");
        assert!(!int_array.is_assignable(long_array, &g), "[]int </: []long");
    }

    #[test]
    fn object_arrays() {
        let g = java_graph();

        let int_array = &RefType::array(FieldType::int());
        let integer_array = &RefType::array(FieldType::object(BinaryName::INTEGER));
        let number_array = &RefType::array(FieldType::object(BinaryName::NUMBER));

        assert!(
            !int_array.is_assignable(integer_array, &g),
            "[]int </: []java.lang.Integer"
        );
        assert!(
            integer_array.is_assignable(&RefType::OBJECT, &g),
            "[]java.lang.Integer <: java.lang.Object"
        );
        assert!(
            integer_array.is_assignable(number_array, &g),
            "[]java.lang.Integer <: []java.lang.Number"
        );
        assert!(
            !number_array.is_assignable(integer_array, &g),
            "[]java.lang.Number </: []java.lang.Integer"
        );
    }

    #[test]
    fn nested_arrays() {
        let g = java_graph();

        let object_array = &RefType::array(FieldType::OBJECT);
        let nested_int_array = &RefType::array(FieldType::array(FieldType::int()));
        let nested_integer_array = &RefType::array(FieldType::array(FieldType::object(
            BinaryName::INTEGER,
        )));

        assert!(
            nested_int_array.is_assignable(object_array, &g),
            "[][]int <: []java.lang.Object"
        );
        assert!(
            nested_integer_array.is_assignable(object_array, &g),
            "[][]java.lang.Integer <: []java.lang.Object"
        );
        assert!(
            !object_array.is_assignable(nested_int_array, &g),
            "[]java.lang.Object </: [][]int"
        );
    }
}
