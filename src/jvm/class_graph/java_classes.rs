use super::{BinaryName, ClassAccessFlags, ClassData, ClassGraph};

/// Add the parts of `java.lang.*` (and friends) which verification needs to know about
///
/// This is far from the whole standard library: just enough of the hierarchy to type check
/// string constants, class literals, method handles, boxed integers, and exception handling.
pub fn add_to_graph(class_graph: &ClassGraph) {
    let class = ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER;
    let final_class = class | ClassAccessFlags::FINAL;
    let abstract_class = class | ClassAccessFlags::ABSTRACT;
    let interface =
        ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT;

    class_graph.add_class(ClassData {
        name: BinaryName::OBJECT,
        superclass: None,
        interfaces: vec![],
        access_flags: class,
    });

    // Interfaces
    for name in [
        BinaryName::CHARSEQUENCE,
        BinaryName::CLONEABLE,
        BinaryName::SERIALIZABLE,
    ] {
        class_graph.add_class(ClassData::new(name, BinaryName::OBJECT, interface));
    }

    class_graph.add_class(
        ClassData::new(BinaryName::STRING, BinaryName::OBJECT, final_class)
            .implementing(BinaryName::CHARSEQUENCE)
            .implementing(BinaryName::SERIALIZABLE),
    );
    class_graph.add_class(
        ClassData::new(BinaryName::CLASS, BinaryName::OBJECT, final_class)
            .implementing(BinaryName::SERIALIZABLE),
    );
    class_graph.add_class(
        ClassData::new(BinaryName::NUMBER, BinaryName::OBJECT, abstract_class)
            .implementing(BinaryName::SERIALIZABLE),
    );
    class_graph.add_class(ClassData::new(
        BinaryName::INTEGER,
        BinaryName::NUMBER,
        final_class,
    ));

    // `java.lang.invoke.*`
    class_graph.add_class(ClassData::new(
        BinaryName::METHODHANDLE,
        BinaryName::OBJECT,
        abstract_class,
    ));
    class_graph.add_class(
        ClassData::new(BinaryName::METHODTYPE, BinaryName::OBJECT, final_class)
            .implementing(BinaryName::SERIALIZABLE),
    );

    // Exceptions
    class_graph.add_class(
        ClassData::new(BinaryName::THROWABLE, BinaryName::OBJECT, class)
            .implementing(BinaryName::SERIALIZABLE),
    );
    class_graph.add_class(ClassData::new(
        BinaryName::ERROR,
        BinaryName::THROWABLE,
        class,
    ));
    class_graph.add_class(ClassData::new(
        BinaryName::EXCEPTION,
        BinaryName::THROWABLE,
        class,
    ));
    class_graph.add_class(ClassData::new(
        BinaryName::RUNTIMEEXCEPTION,
        BinaryName::EXCEPTION,
        class,
    ));
    class_graph.add_class(ClassData::new(
        BinaryName::ARITHMETICEXCEPTION,
        BinaryName::RUNTIMEEXCEPTION,
        class,
    ));
}
