//! Class hierarchy information needed during verification
//!
//! Verification only ever _reads_ the class hierarchy: it needs to know which classes are
//! supertypes of which others (to check assignability and to join frames at control-flow merge
//! points). [`TypeHierarchy`] is that read-only capability. [`ClassGraph`] is an in-memory
//! implementation which can be shared between threads verifying different methods.
//!
//! Hierarchies are allowed to be incomplete (classes on a missing classpath simply aren't in the
//! graph). Queries about missing classes answer conservatively rather than failing.

use super::{BinaryName, ClassAccessFlags, FieldType, RefType};
use elsa::sync::FrozenMap;
use std::collections::HashSet;
use std::fmt;

mod assignable;
mod java_classes;

pub use assignable::*;

/// Read-only view of a class hierarchy
pub trait TypeHierarchy {
    /// Direct superclass of a class
    ///
    /// This is `None` for `java/lang/Object` and for classes which are missing from the hierarchy.
    fn resolve_supertype(&self, class: &BinaryName) -> Option<BinaryName>;

    /// Is the class an interface? (`None` if the class is missing from the hierarchy)
    fn is_interface(&self, class: &BinaryName) -> Option<bool>;

    /// Is the first class a subclass (or implementor) of the second?
    fn is_assignable_class(&self, sub_type: &BinaryName, super_type: &BinaryName) -> bool;

    /// The root of the reference type hierarchy
    fn object_type(&self) -> FieldType {
        FieldType::OBJECT
    }

    /// The type the verifier uses for all integer-like values
    fn int_type(&self) -> FieldType {
        FieldType::int()
    }

    /// Closest common superclass of two classes
    ///
    /// Interfaces are treated like `java/lang/Object`, matching the JVM verifier. This is `None`
    /// if the superclass chain of either class is incomplete.
    fn common_superclass(&self, class1: &BinaryName, class2: &BinaryName) -> Option<BinaryName> {
        let chain1 = self.superclass_chain(class1)?;
        let chain2 = self.superclass_chain(class2)?;
        let chain2: HashSet<&BinaryName> = chain2.iter().collect();
        chain1.into_iter().find(|class| chain2.contains(class))
    }

    /// Superclass chain of a class, starting with the class itself and ending with
    /// `java/lang/Object` (or `None` if the chain is incomplete)
    fn superclass_chain(&self, class: &BinaryName) -> Option<Vec<BinaryName>> {
        if self.is_interface(class)? {
            return Some(vec![BinaryName::OBJECT]);
        }
        let mut chain = vec![class.clone()];
        let mut current = class.clone();
        while current != BinaryName::OBJECT {
            current = self.resolve_supertype(&current)?;
            chain.push(current.clone());
        }
        Some(chain)
    }

    /// Is this object type throwable?
    fn is_throwable(&self, class: &BinaryName) -> bool {
        self.is_assignable_class(class, &BinaryName::THROWABLE)
    }
}

/// Tracks the relationships between classes and interfaces
///
/// Classes are added through a shared reference, so a graph can be built up incrementally. The
/// graph must be complete before verification starts reading from it: the supertype sets are
/// memoized on first use and are not recomputed when more classes are added afterwards.
pub struct ClassGraph {
    classes: FrozenMap<BinaryName, Box<ClassData>>,

    /// Memoized transitive supertypes (including the class itself)
    ///
    /// Two threads may race to fill in the same entry. Both compute the same set from the same
    /// immutable classes, and whichever is inserted first is kept.
    supertypes: FrozenMap<BinaryName, Box<[BinaryName]>>,
}

impl ClassGraph {
    /// New empty graph
    pub fn new() -> Self {
        ClassGraph {
            classes: FrozenMap::new(),
            supertypes: FrozenMap::new(),
        }
    }

    /// Add a new class to the class graph
    ///
    /// If a class by the same name is already present, the existing data is kept.
    pub fn add_class(&self, data: ClassData) -> &ClassData {
        self.classes.insert(data.name.clone(), Box::new(data))
    }

    /// Lookup a class by its name
    pub fn lookup_class(&self, name: &BinaryName) -> Option<&ClassData> {
        self.classes.get(name)
    }

    /// Add standard types to the class graph
    pub fn insert_java_library_types(&self) {
        java_classes::add_to_graph(self)
    }

    /// All of the supertypes of a class (including itself)
    ///
    /// Missing classes contribute no supertypes, so the result for a class whose hierarchy is
    /// incomplete is only the part of the hierarchy which is known.
    pub fn supertypes(&self, class: &BinaryName) -> &[BinaryName] {
        if let Some(supertypes) = self.supertypes.get(class) {
            return supertypes;
        }

        let mut supertypes_to_visit: Vec<BinaryName> = vec![class.clone()];
        let mut dont_revisit: HashSet<BinaryName> = HashSet::new();
        dont_revisit.insert(class.clone());
        let mut found: Vec<BinaryName> = vec![];

        while let Some(class_name) = supertypes_to_visit.pop() {
            if let Some(class_data) = self.lookup_class(&class_name) {
                if let Some(superclass) = &class_data.superclass {
                    if dont_revisit.insert(superclass.clone()) {
                        supertypes_to_visit.push(superclass.clone());
                    }
                }
                for interface in &class_data.interfaces {
                    if dont_revisit.insert(interface.clone()) {
                        supertypes_to_visit.push(interface.clone());
                    }
                }
            }
            found.push(class_name);
        }

        log::trace!("Supertypes of {}: {:?}", class, found);
        self.supertypes
            .insert(class.clone(), found.into_boxed_slice())
    }
}

impl Default for ClassGraph {
    fn default() -> Self {
        ClassGraph::new()
    }
}

impl TypeHierarchy for ClassGraph {
    fn resolve_supertype(&self, class: &BinaryName) -> Option<BinaryName> {
        self.lookup_class(class)
            .and_then(|class_data| class_data.superclass.clone())
    }

    fn is_interface(&self, class: &BinaryName) -> Option<bool> {
        self.lookup_class(class)
            .map(|class_data| class_data.is_interface())
    }

    fn is_assignable_class(&self, sub_type: &BinaryName, super_type: &BinaryName) -> bool {
        super_type == &BinaryName::OBJECT || self.supertypes(sub_type).contains(super_type)
    }
}

pub struct ClassData {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<BinaryName>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: Vec<BinaryName>,

    /// Access flags
    pub access_flags: ClassAccessFlags,
}

impl ClassData {
    pub fn new(
        name: BinaryName,
        superclass: BinaryName,
        access_flags: ClassAccessFlags,
    ) -> ClassData {
        ClassData {
            name,
            superclass: Some(superclass),
            interfaces: vec![],
            access_flags,
        }
    }

    /// Add an implemented interface
    pub fn implementing(mut self, interface: BinaryName) -> ClassData {
        self.interfaces.push(interface);
        self
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Reference type for instances of this class
    pub fn ref_type(&self) -> RefType {
        RefType::Object(self.name.clone())
    }
}

impl PartialEq for ClassData {
    fn eq(&self, other: &ClassData) -> bool {
        self.name == other.name
    }
}

impl Eq for ClassData {}

impl fmt::Debug for ClassData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_ref())
    }
}
