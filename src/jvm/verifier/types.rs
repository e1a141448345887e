use crate::jvm::class_graph::{Assignable, TypeHierarchy};
use crate::jvm::descriptors::{ParseDescriptor, RenderDescriptor};
use crate::jvm::{ArrayType, BaseType, BinaryName, FieldType, RefType};
use crate::util::Width;
use std::fmt;
use std::str::FromStr;

/// These types are from [this hierarchy][0], extended with explicit placeholders for unused or
/// padding slots
///
/// Values of this type are immutable: merging two frame types always produces a new one.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum FrameType {
    /// Unconstrained slot (unused local, or the second half of a wide value)
    Top(TopWidth),

    /// Primitive value
    ///
    /// Frames built from instructions only ever contain `int`, `float`, `long`, and `double`. The
    /// small integer kinds can still be constructed (eg. for a declared frame) and are normalized
    /// to `int` whenever they are compared.
    Primitive(PrimitiveKind),

    /// Initialized non-null reference
    InitializedReference {
        ty: RefType,

        /// Imprecise references are the result of joins: the value is _at least_ this type
        precise: bool,
    },

    /// Type of the `null` literal
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    /// Two values are the same object exactly when they share an allocation site. The type to
    /// initialize is not always known (eg. in a declared frame which names only the site).
    UninitializedNew {
        site: AllocationSite,
        ty: Option<BinaryName>,
    },
}

/// Width of a `Top` placeholder
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum TopWidth {
    One,
    Two,
}

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Float,
    Long,
    Double,
}

/// Identity of a `new` instruction inside a method body
///
/// Allocation sites are handed out by the code builder (see [`crate::jvm::code::CodeBuilder`]),
/// and are indices into the allocation site table of the method.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct AllocationSite(pub u32);

impl fmt::Debug for AllocationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "new#{}", self.0)
    }
}

/// Coarse classification of values, as used for member (field, array element) types
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum MemberType {
    Object,
    BooleanOrByte,
    Char,
    Short,
    Int,
    Float,
    Long,
    Double,
}

impl MemberType {
    pub fn from_field_type(field_type: &FieldType) -> MemberType {
        match field_type {
            FieldType::Ref(_) => MemberType::Object,
            FieldType::Base(BaseType::Boolean | BaseType::Byte) => MemberType::BooleanOrByte,
            FieldType::Base(BaseType::Char) => MemberType::Char,
            FieldType::Base(BaseType::Short) => MemberType::Short,
            FieldType::Base(BaseType::Int) => MemberType::Int,
            FieldType::Base(BaseType::Float) => MemberType::Float,
            FieldType::Base(BaseType::Long) => MemberType::Long,
            FieldType::Base(BaseType::Double) => MemberType::Double,
        }
    }
}

impl PrimitiveKind {
    pub fn base_type(self) -> BaseType {
        match self {
            PrimitiveKind::Boolean => BaseType::Boolean,
            PrimitiveKind::Byte => BaseType::Byte,
            PrimitiveKind::Char => BaseType::Char,
            PrimitiveKind::Short => BaseType::Short,
            PrimitiveKind::Int => BaseType::Int,
            PrimitiveKind::Float => BaseType::Float,
            PrimitiveKind::Long => BaseType::Long,
            PrimitiveKind::Double => BaseType::Double,
        }
    }

    pub fn from_base_type(base_type: BaseType) -> PrimitiveKind {
        match base_type {
            BaseType::Boolean => PrimitiveKind::Boolean,
            BaseType::Byte => PrimitiveKind::Byte,
            BaseType::Char => PrimitiveKind::Char,
            BaseType::Short => PrimitiveKind::Short,
            BaseType::Int => PrimitiveKind::Int,
            BaseType::Float => PrimitiveKind::Float,
            BaseType::Long => PrimitiveKind::Long,
            BaseType::Double => PrimitiveKind::Double,
        }
    }

    /// `byte`, `char`, `short`, and `boolean` are tracked as `int` by the verifier
    pub fn normalize(self) -> PrimitiveKind {
        if self.base_type().is_int_category() {
            PrimitiveKind::Int
        } else {
            self
        }
    }
}

impl FrameType {
    pub const fn top() -> FrameType {
        FrameType::Top(TopWidth::One)
    }

    pub const fn two_word_top() -> FrameType {
        FrameType::Top(TopWidth::Two)
    }

    pub const fn boolean() -> FrameType {
        FrameType::Primitive(PrimitiveKind::Boolean)
    }

    pub const fn byte() -> FrameType {
        FrameType::Primitive(PrimitiveKind::Byte)
    }

    pub const fn char() -> FrameType {
        FrameType::Primitive(PrimitiveKind::Char)
    }

    pub const fn short() -> FrameType {
        FrameType::Primitive(PrimitiveKind::Short)
    }

    pub const fn int() -> FrameType {
        FrameType::Primitive(PrimitiveKind::Int)
    }

    pub const fn float() -> FrameType {
        FrameType::Primitive(PrimitiveKind::Float)
    }

    pub const fn long() -> FrameType {
        FrameType::Primitive(PrimitiveKind::Long)
    }

    pub const fn double() -> FrameType {
        FrameType::Primitive(PrimitiveKind::Double)
    }

    pub const fn null() -> FrameType {
        FrameType::Null
    }

    pub const fn uninitialized_this() -> FrameType {
        FrameType::UninitializedThis
    }

    pub const fn uninitialized_new(site: AllocationSite, ty: Option<BinaryName>) -> FrameType {
        FrameType::UninitializedNew { site, ty }
    }

    /// Precise, initialized reference (the null type is always [`FrameType::Null`])
    pub fn reference(ty: RefType) -> FrameType {
        match ty {
            RefType::Null => FrameType::Null,
            ty => FrameType::InitializedReference { ty, precise: true },
        }
    }

    pub fn object(class_name: BinaryName) -> FrameType {
        FrameType::reference(RefType::Object(class_name))
    }

    /// Frame type of an initialized value of the given type
    ///
    /// Primitive types keep their exact kind (see [`FrameType::verification`] for the normalized
    /// version which frames computed from instructions use).
    pub fn initialized(field_type: FieldType) -> FrameType {
        match field_type {
            FieldType::Base(base_type) => {
                FrameType::Primitive(PrimitiveKind::from_base_type(base_type))
            }
            FieldType::Ref(RefType::Null) => FrameType::Null,
            FieldType::Ref(ref_type) => FrameType::reference(ref_type),
        }
    }

    /// Frame type of a value of the given type, as the verifier tracks it
    pub fn verification(field_type: FieldType) -> FrameType {
        match FrameType::initialized(field_type) {
            FrameType::Primitive(kind) => FrameType::Primitive(kind.normalize()),
            other => other,
        }
    }

    /// Map a single-character primitive descriptor onto its frame type
    ///
    /// Callers only ever pass along characters of primitive descriptors, so anything else is a
    /// bug and panics.
    pub fn primitive_from_descriptor_char(c: char) -> FrameType {
        let kind = match c {
            'Z' => PrimitiveKind::Boolean,
            'B' => PrimitiveKind::Byte,
            'C' => PrimitiveKind::Char,
            'S' => PrimitiveKind::Short,
            'I' => PrimitiveKind::Int,
            'F' => PrimitiveKind::Float,
            'J' => PrimitiveKind::Long,
            'D' => PrimitiveKind::Double,
            _ => unreachable!("Invalid primitive descriptor character '{}'", c),
        };
        FrameType::Primitive(kind)
    }

    pub fn is_top(&self) -> bool {
        matches!(self, FrameType::Top(TopWidth::One))
    }

    pub fn is_two_word_top(&self) -> bool {
        matches!(self, FrameType::Top(TopWidth::Two))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, FrameType::Primitive(_))
    }

    /// Is this type is a reference type? (including `null` and uninitialized references)
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            FrameType::InitializedReference { .. }
                | FrameType::Null
                | FrameType::UninitializedThis
                | FrameType::UninitializedNew { .. }
        )
    }

    /// Is this an initialized non-null reference?
    pub fn is_object(&self) -> bool {
        matches!(self, FrameType::InitializedReference { .. })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FrameType::Null)
    }

    pub fn is_wide(&self) -> bool {
        self.width() == 2
    }

    pub fn is_single(&self) -> bool {
        self.width() == 1
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(
            self,
            FrameType::UninitializedThis | FrameType::UninitializedNew { .. }
        )
    }

    pub fn is_uninitialized_this(&self) -> bool {
        matches!(self, FrameType::UninitializedThis)
    }

    pub fn is_uninitialized_new(&self) -> bool {
        matches!(self, FrameType::UninitializedNew { .. })
    }

    /// Initialized values are primitives, `null`, and initialized references
    pub fn is_initialized(&self) -> bool {
        matches!(
            self,
            FrameType::Primitive(_) | FrameType::Null | FrameType::InitializedReference { .. }
        )
    }

    /// Does the type describe exactly the values it holds? (`Top` and joined references don't)
    pub fn is_precise(&self) -> bool {
        match self {
            FrameType::Top(_) => false,
            FrameType::InitializedReference { precise, .. } => *precise,
            _ => true,
        }
    }

    pub fn as_primitive(&self) -> PrimitiveKind {
        match self {
            FrameType::Primitive(kind) => *kind,
            other => panic!("Expected a primitive frame type, but got {}", other),
        }
    }

    pub fn as_initialized_reference(&self) -> &RefType {
        match self {
            FrameType::InitializedReference { ty, .. } => ty,
            other => panic!("Expected an initialized reference, but got {}", other),
        }
    }

    pub fn as_uninitialized_new(&self) -> (AllocationSite, Option<&BinaryName>) {
        match self {
            FrameType::UninitializedNew { site, ty } => (*site, ty.as_ref()),
            other => panic!("Expected an uninitialized new, but got {}", other),
        }
    }

    /// Underlying type of an initialized value
    pub fn initialized_type(&self) -> Option<FieldType> {
        match self {
            FrameType::Primitive(kind) => Some(FieldType::Base(kind.base_type())),
            FrameType::Null => Some(FieldType::NULL),
            FrameType::InitializedReference { ty, .. } => Some(FieldType::Ref(ty.clone())),
            _ => None,
        }
    }

    /// Rename the classes in an imprecise type
    ///
    /// Precise types must be rewritten through [`crate::jvm::verifier::Frame::rewrite_types`],
    /// which also keeps track of the allocation site of uninitialized values. Calling this on a
    /// precise type panics.
    pub fn map(&self, rename: &impl Fn(&BinaryName) -> BinaryName) -> FrameType {
        assert!(
            !self.is_precise(),
            "Precise frame type {} cannot be mapped",
            self
        );
        self.map_unchecked(rename)
    }

    pub(crate) fn map_unchecked(&self, rename: &impl Fn(&BinaryName) -> BinaryName) -> FrameType {
        match self {
            FrameType::InitializedReference { ty, precise } => FrameType::InitializedReference {
                ty: ty.map_classes(rename),
                precise: *precise,
            },
            FrameType::UninitializedNew { site, ty } => FrameType::UninitializedNew {
                site: *site,
                ty: ty.as_ref().map(rename),
            },
            other => other.clone(),
        }
    }

    /// Least upper bound of two frame types
    ///
    /// Types without a common representation join to `Top`. The only failure is when two
    /// reference types need a common superclass which the hierarchy can't provide.
    pub fn join<H: TypeHierarchy + ?Sized>(
        &self,
        other: &FrameType,
        hierarchy: &H,
    ) -> Result<FrameType, String> {
        let joined = match (self, other) {
            (FrameType::Top(_), _) | (_, FrameType::Top(_)) => top_of_width(self, other),

            (FrameType::Primitive(kind1), FrameType::Primitive(kind2)) => {
                if kind1 == kind2 {
                    self.clone()
                } else if kind1.normalize() == PrimitiveKind::Int
                    && kind2.normalize() == PrimitiveKind::Int
                {
                    FrameType::int()
                } else {
                    top_of_width(self, other)
                }
            }

            (FrameType::Null, FrameType::Null) => FrameType::Null,
            (FrameType::Null, FrameType::InitializedReference { .. }) => other.clone(),
            (FrameType::InitializedReference { .. }, FrameType::Null) => self.clone(),

            (
                FrameType::InitializedReference {
                    ty: ty1,
                    precise: precise1,
                },
                FrameType::InitializedReference {
                    ty: ty2,
                    precise: precise2,
                },
            ) => {
                if ty1 == ty2 {
                    FrameType::InitializedReference {
                        ty: ty1.clone(),
                        precise: *precise1 && *precise2,
                    }
                } else {
                    FrameType::InitializedReference {
                        ty: join_ref_types(ty1, ty2, hierarchy)?,
                        precise: false,
                    }
                }
            }

            (FrameType::UninitializedThis, FrameType::UninitializedThis) => self.clone(),
            (
                FrameType::UninitializedNew { site: site1, ty: ty1 },
                FrameType::UninitializedNew { site: site2, ty: ty2 },
            ) if site1 == site2 => FrameType::UninitializedNew {
                site: *site1,
                ty: ty1.clone().or_else(|| ty2.clone()),
            },

            _ => top_of_width(self, other),
        };
        Ok(joined)
    }
}

fn top_of_width(type1: &FrameType, type2: &FrameType) -> FrameType {
    if type1.is_wide() && type2.is_wide() {
        FrameType::two_word_top()
    } else {
        FrameType::top()
    }
}

/// Closest common supertype of two different reference types
fn join_ref_types<H: TypeHierarchy + ?Sized>(
    ty1: &RefType,
    ty2: &RefType,
    hierarchy: &H,
) -> Result<RefType, String> {
    if ty1.is_assignable(ty2, hierarchy) {
        return Ok(ty2.clone());
    } else if ty2.is_assignable(ty1, hierarchy) {
        return Ok(ty1.clone());
    }

    match (ty1, ty2) {
        (RefType::Object(cls1), RefType::Object(cls2)) => hierarchy
            .common_superclass(cls1, cls2)
            .map(RefType::Object)
            .ok_or_else(|| {
                format!(
                    "Cannot join '{}' and '{}': the superclass hierarchy is incomplete",
                    ty1.render(),
                    ty2.render()
                )
            }),
        (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2))
            if arr1.additional_dimensions == arr2.additional_dimensions =>
        {
            let element = join_ref_types(
                &RefType::Object(arr1.element_type.clone()),
                &RefType::Object(arr2.element_type.clone()),
                hierarchy,
            )?;
            match element {
                RefType::Object(element_type) => Ok(RefType::ObjectArray(ArrayType {
                    additional_dimensions: arr1.additional_dimensions,
                    element_type,
                })),
                _ => Ok(hierarchy_object(hierarchy)),
            }
        }
        _ => Ok(hierarchy_object(hierarchy)),
    }
}

fn hierarchy_object<H: TypeHierarchy + ?Sized>(hierarchy: &H) -> RefType {
    match hierarchy.object_type() {
        FieldType::Ref(object) => object,
        FieldType::Base(_) => RefType::OBJECT,
    }
}

impl Width for FrameType {
    fn width(&self) -> usize {
        match self {
            FrameType::Top(TopWidth::Two)
            | FrameType::Primitive(PrimitiveKind::Long | PrimitiveKind::Double) => 2,
            _ => 1,
        }
    }
}

impl From<FieldType> for FrameType {
    fn from(field_type: FieldType) -> Self {
        FrameType::verification(field_type)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Top(TopWidth::One) => f.write_str("top"),
            FrameType::Top(TopWidth::Two) => f.write_str("top2"),
            FrameType::Primitive(kind) => write!(f, "{}", FieldType::Base(kind.base_type())),
            FrameType::InitializedReference { ty, .. } => f.write_str(&ty.render()),
            FrameType::Null => f.write_str("null"),
            FrameType::UninitializedThis => f.write_str("uninitializedThis"),
            FrameType::UninitializedNew { site, ty: None } => write!(f, "{:?}", site),
            FrameType::UninitializedNew { site, ty: Some(ty) } => {
                write!(f, "{:?}:{}", site, ty.render())
            }
        }
    }
}

/// Parses the compact textual syntax produced by the `Display` implementation, with primitives
/// also accepted as descriptor characters (eg. `I` or `J`)
impl FromStr for FrameType {
    type Err = String;

    fn from_str(token: &str) -> Result<FrameType, String> {
        match token {
            "top" => return Ok(FrameType::top()),
            "top2" => return Ok(FrameType::two_word_top()),
            "null" => return Ok(FrameType::Null),
            "uninitializedThis" => return Ok(FrameType::UninitializedThis),
            _ => (),
        }

        if let Some(rest) = token.strip_prefix("new#") {
            let (site, ty) = match rest.split_once(':') {
                Some((site, ty)) => (site, Some(ty)),
                None => (rest, None),
            };
            let site = site
                .parse::<u32>()
                .map_err(|err| format!("Invalid allocation site in '{}': {}", token, err))?;
            let ty = match ty {
                None => None,
                Some(ty) => Some(
                    BinaryName::parse(ty)
                        .map_err(|err| format!("Invalid type in '{}': {}", token, err))?,
                ),
            };
            return Ok(FrameType::uninitialized_new(AllocationSite(site), ty));
        }

        let field_type = match token {
            "boolean" => FieldType::boolean(),
            "byte" => FieldType::byte(),
            "char" => FieldType::char(),
            "short" => FieldType::short(),
            "int" => FieldType::int(),
            "float" => FieldType::float(),
            "long" => FieldType::long(),
            "double" => FieldType::double(),
            descriptor => FieldType::parse(descriptor)
                .map_err(|err| format!("Invalid frame type '{}': {}", token, err))?,
        };
        Ok(FrameType::initialized(field_type))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassData, ClassGraph};
    use crate::jvm::{ClassAccessFlags, Name};

    fn java_graph() -> ClassGraph {
        let class_graph = ClassGraph::new();
        class_graph.insert_java_library_types();
        class_graph
    }

    #[test]
    fn widths() {
        assert_eq!(FrameType::long().width(), 2);
        assert_eq!(FrameType::double().width(), 2);
        assert_eq!(FrameType::two_word_top().width(), 2);
        assert_eq!(FrameType::int().width(), 1);
        assert_eq!(FrameType::top().width(), 1);
        assert_eq!(FrameType::Null.width(), 1);
        assert_eq!(FrameType::uninitialized_new(AllocationSite(0), None).width(), 1);
        assert_eq!(FrameType::object(BinaryName::STRING).width(), 1);
    }

    #[test]
    fn initialized_dispatches_on_primitives() {
        assert_eq!(FrameType::initialized(FieldType::byte()), FrameType::byte());
        assert_eq!(FrameType::verification(FieldType::byte()), FrameType::int());
        assert_eq!(FrameType::initialized(FieldType::NULL), FrameType::Null);
        assert_eq!(
            FrameType::initialized(FieldType::object(BinaryName::STRING)),
            FrameType::object(BinaryName::STRING)
        );
    }

    #[test]
    fn descriptor_chars() {
        assert_eq!(FrameType::primitive_from_descriptor_char('J'), FrameType::long());
        assert_eq!(FrameType::primitive_from_descriptor_char('Z'), FrameType::boolean());
    }

    #[test]
    #[should_panic]
    fn non_primitive_descriptor_char() {
        FrameType::primitive_from_descriptor_char('L');
    }

    #[test]
    fn classification() {
        let site = AllocationSite(1);
        assert!(FrameType::top().is_top());
        assert!(!FrameType::two_word_top().is_top());
        assert!(FrameType::Null.is_reference() && FrameType::Null.is_initialized());
        assert!(FrameType::UninitializedThis.is_reference());
        assert!(FrameType::uninitialized_new(site, None).is_uninitialized());
        assert!(!FrameType::uninitialized_new(site, None).is_initialized());
        assert!(!FrameType::int().is_reference());
        assert!(!FrameType::top().is_precise());
        assert!(FrameType::object(BinaryName::OBJECT).is_precise());
    }

    #[test]
    fn null_reference() {
        assert_eq!(FrameType::reference(RefType::Null), FrameType::Null);
        assert_eq!(FrameType::reference(RefType::Null).to_string(), "null");
        let string = FrameType::object(BinaryName::STRING);
        assert_eq!(
            FrameType::reference(RefType::Null).join(&string, &java_graph()),
            Ok(string)
        );
    }

    #[test]
    fn map_imprecise_reference() {
        let joined = FrameType::InitializedReference {
            ty: RefType::Object(BinaryName::NUMBER),
            precise: false,
        };
        let renamed = joined.map(&|_| BinaryName::OBJECT);
        assert_eq!(renamed.as_initialized_reference(), &RefType::OBJECT);
        assert_eq!(FrameType::top().map(&|c| c.clone()), FrameType::top());
    }

    #[test]
    #[should_panic]
    fn map_precise_reference() {
        FrameType::object(BinaryName::STRING).map(&|c| c.clone());
    }

    #[test]
    #[should_panic]
    fn bad_downcast() {
        FrameType::int().as_initialized_reference();
    }

    #[test]
    fn joins() {
        let g = java_graph();
        let integer = FrameType::object(BinaryName::INTEGER);
        let number = FrameType::object(BinaryName::NUMBER);
        let string = FrameType::object(BinaryName::STRING);

        assert_eq!(integer.join(&integer, &g), Ok(integer.clone()));
        assert_eq!(FrameType::Null.join(&string, &g), Ok(string.clone()));
        assert_eq!(
            FrameType::byte().join(&FrameType::char(), &g),
            Ok(FrameType::int())
        );
        assert_eq!(
            FrameType::int().join(&FrameType::float(), &g),
            Ok(FrameType::top())
        );
        assert_eq!(
            FrameType::long().join(&FrameType::double(), &g),
            Ok(FrameType::two_word_top())
        );

        let joined = integer.join(&number, &g).unwrap();
        assert_eq!(joined.as_initialized_reference(), &RefType::Object(BinaryName::NUMBER));
        assert!(!joined.is_precise());

        let joined = integer.join(&string, &g).unwrap();
        assert_eq!(joined.as_initialized_reference(), &RefType::OBJECT);
    }

    #[test]
    fn join_arrays() {
        let g = java_graph();
        let integers = FrameType::reference(RefType::array(FieldType::object(BinaryName::INTEGER)));
        let strings = FrameType::reference(RefType::array(FieldType::object(BinaryName::STRING)));
        let ints = FrameType::reference(RefType::array(FieldType::int()));

        let joined = integers.join(&strings, &g).unwrap();
        assert_eq!(
            joined.as_initialized_reference(),
            &RefType::array(FieldType::OBJECT)
        );
        let joined = integers.join(&ints, &g).unwrap();
        assert_eq!(joined.as_initialized_reference(), &RefType::OBJECT);
    }

    #[test]
    fn join_uninitialized() {
        let g = java_graph();
        let new1 = FrameType::uninitialized_new(AllocationSite(1), Some(BinaryName::OBJECT));
        let new2 = FrameType::uninitialized_new(AllocationSite(2), Some(BinaryName::OBJECT));

        assert_eq!(new1.join(&new1, &g), Ok(new1.clone()));
        assert_eq!(new1.join(&new2, &g), Ok(FrameType::top()));
        assert_eq!(
            new1.join(&FrameType::UninitializedThis, &g),
            Ok(FrameType::top())
        );
    }

    #[test]
    fn join_incomplete_hierarchy() {
        let g = java_graph();
        let foo = BinaryName::from_str("foo/Foo").unwrap();
        g.add_class(ClassData::new(
            foo.clone(),
            BinaryName::from_str("foo/Missing").unwrap(),
            ClassAccessFlags::PUBLIC,
        ));

        let error = FrameType::object(foo)
            .join(&FrameType::object(BinaryName::STRING), &g)
            .unwrap_err();
        assert!(error.contains("Lfoo/Foo;"), "{}", error);
        assert!(error.contains("Ljava/lang/String;"), "{}", error);
    }

    #[test]
    fn parse_tokens() {
        assert_eq!("I".parse::<FrameType>(), Ok(FrameType::int()));
        assert_eq!("long".parse::<FrameType>(), Ok(FrameType::long()));
        assert_eq!("top2".parse::<FrameType>(), Ok(FrameType::two_word_top()));
        assert_eq!(
            "Ljava/lang/String;".parse::<FrameType>(),
            Ok(FrameType::object(BinaryName::STRING))
        );
        assert_eq!(
            "new#3:Ljava/lang/Object;".parse::<FrameType>(),
            Ok(FrameType::uninitialized_new(
                AllocationSite(3),
                Some(BinaryName::OBJECT)
            ))
        );
        assert_eq!(
            "new#3".parse::<FrameType>(),
            Ok(FrameType::uninitialized_new(AllocationSite(3), None))
        );
        assert!("new#x".parse::<FrameType>().is_err());
        assert!("V".parse::<FrameType>().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(FrameType::int().to_string(), "int");
        assert_eq!(FrameType::top().to_string(), "top");
        assert_eq!(
            FrameType::object(BinaryName::OBJECT).to_string(),
            "Ljava/lang/Object;"
        );
        assert_eq!(
            FrameType::uninitialized_new(AllocationSite(3), Some(BinaryName::OBJECT)).to_string(),
            "new#3:Ljava/lang/Object;"
        );
        assert_eq!(
            MemberType::from_field_type(&FieldType::boolean()),
            MemberType::BooleanOrByte
        );
    }
}
