use super::{BinaryName, Name};
use crate::util::Width;
use std::fmt;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => {
                let msg = format!("Unexpected leftover input '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// The verifier tracks `byte`, `char`, `short`, and `boolean` uniformly as `int`
    pub fn is_int_category(&self) -> bool {
        matches!(
            self,
            BaseType::Byte | BaseType::Char | BaseType::Short | BaseType::Boolean | BaseType::Int
        )
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Byte
            | BaseType::Char
            | BaseType::Float
            | BaseType::Int
            | BaseType::Short
            | BaseType::Boolean => 1,
            BaseType::Double | BaseType::Long => 2,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                let msg = format!("Invalid base type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing base type character";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        };
        Ok(typ)
    }
}

/// Reference type
///
/// `Null` never appears in a class file descriptor: it is the type of the `null` literal, which
/// verification needs to be able to name.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    ObjectArray(ArrayType<BinaryName>),
    PrimitiveArray(ArrayType<BaseType>),
    Null,
}

/// Generic array type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T> ArrayType<T> {
    pub fn map<T2>(&self, map_element: impl FnOnce(&T) -> T2) -> ArrayType<T2> {
        ArrayType {
            additional_dimensions: self.additional_dimensions,
            element_type: map_element(&self.element_type),
        }
    }

    /// Total number of dimensions in the array type
    ///
    /// This is always just `additional_dimensions + 1`
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if let Some('L') = source.next() {
            let mut class_name = String::new();
            loop {
                let c: char = source.next().ok_or_else(|| {
                    let msg = format!("Missing terminator for 'L{}'", class_name);
                    Error::new(ErrorKind::UnexpectedEof, msg)
                })?;
                if c == ';' {
                    return BinaryName::from_string(class_name)
                        .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg));
                } else {
                    class_name.push(c)
                }
            }
        } else {
            Err(Error::new(
                ErrorKind::InvalidInput,
                "Expected object type to start with `L`",
            ))
        }
    }
}

impl RenderDescriptor for RefType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
            RefType::Null => write_to.push('N'),
        }
    }
}

impl ParseDescriptor for RefType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        Ok(match source.peek().copied() {
            Some('L') => RefType::Object(BinaryName::parse_from(source)?),
            Some('[') => {
                source.next();
                let mut additional_dimensions = 0;
                while let Some('[') = source.peek().copied() {
                    additional_dimensions += 1;
                    source.next();
                }
                if let Some('L') = source.peek().copied() {
                    RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: BinaryName::parse_from(source)?,
                    })
                } else {
                    RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::parse_from(source)?,
                    })
                }
            }
            Some(c) => {
                let msg = format!("Invalid reference type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing field type";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        })
    }
}

impl RefType {
    pub const OBJECT: RefType = RefType::Object(BinaryName::OBJECT);
    pub const STRING: RefType = RefType::Object(BinaryName::STRING);

    /// Array whose elements have the given type
    pub fn array(field_type: FieldType) -> RefType {
        match field_type {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            FieldType::Ref(RefType::Null) => {
                unreachable!("arrays of the null type cannot be constructed")
            }
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, RefType::ObjectArray(_) | RefType::PrimitiveArray(_))
    }

    /// Type of the elements of an array (`None` if this is not an array)
    pub fn array_element_type(&self) -> Option<FieldType> {
        match self {
            RefType::ObjectArray(arr) => Some(match arr.additional_dimensions {
                0 => FieldType::object(arr.element_type.clone()),
                n => FieldType::Ref(RefType::ObjectArray(ArrayType {
                    additional_dimensions: n - 1,
                    element_type: arr.element_type.clone(),
                })),
            }),
            RefType::PrimitiveArray(arr) => Some(match arr.additional_dimensions {
                0 => FieldType::Base(arr.element_type),
                n => FieldType::Ref(RefType::PrimitiveArray(ArrayType {
                    additional_dimensions: n - 1,
                    element_type: arr.element_type,
                })),
            }),
            RefType::Object(_) | RefType::Null => None,
        }
    }

    /// Rename the classes mentioned in the type
    pub fn map_classes(&self, rename: &impl Fn(&BinaryName) -> BinaryName) -> RefType {
        match self {
            RefType::Object(cls) => RefType::Object(rename(cls)),
            RefType::ObjectArray(arr) => RefType::ObjectArray(arr.map(rename)),
            RefType::PrimitiveArray(arr) => RefType::PrimitiveArray(*arr),
            RefType::Null => RefType::Null,
        }
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl FieldType {
    pub fn array(field_type: FieldType) -> FieldType {
        FieldType::Ref(RefType::array(field_type))
    }

    pub const fn object(class_name: BinaryName) -> FieldType {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const NULL: FieldType = FieldType::Ref(RefType::Null);
    pub const OBJECT: FieldType = FieldType::Ref(RefType::OBJECT);

    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType {
        FieldType::Base(BaseType::Double)
    }

    pub const fn char() -> FieldType {
        FieldType::Base(BaseType::Char)
    }

    pub const fn short() -> FieldType {
        FieldType::Base(BaseType::Short)
    }

    pub const fn byte() -> FieldType {
        FieldType::Base(BaseType::Byte)
    }

    pub const fn boolean() -> FieldType {
        FieldType::Base(BaseType::Boolean)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, FieldType::Base(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Ref(ref_type) if ref_type.is_array())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldType::Ref(RefType::Null))
    }

    pub fn array_element_type(&self) -> Option<FieldType> {
        match self {
            FieldType::Ref(ref_type) => ref_type.array_element_type(),
            FieldType::Base(_) => None,
        }
    }

    /// Rename the classes mentioned in the type
    pub fn map_classes(&self, rename: &impl Fn(&BinaryName) -> BinaryName) -> FieldType {
        match self {
            FieldType::Base(base_type) => FieldType::Base(*base_type),
            FieldType::Ref(ref_type) => FieldType::Ref(ref_type.map_classes(rename)),
        }
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type")),
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) => {
                let msg = format!("Invalid field type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(BaseType::Byte) => f.write_str("byte"),
            FieldType::Base(BaseType::Char) => f.write_str("char"),
            FieldType::Base(BaseType::Double) => f.write_str("double"),
            FieldType::Base(BaseType::Float) => f.write_str("float"),
            FieldType::Base(BaseType::Int) => f.write_str("int"),
            FieldType::Base(BaseType::Long) => f.write_str("long"),
            FieldType::Base(BaseType::Short) => f.write_str("short"),
            FieldType::Base(BaseType::Boolean) => f.write_str("boolean"),
            FieldType::Ref(RefType::Null) => f.write_str("null"),
            FieldType::Ref(ref_type) => f.write_str(&ref_type.render()),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>, // `None` is for `void` (ie. no return)
}

impl MethodDescriptor {
    /// Total length of parameters (not the same as the length of the vector),
    /// which must be 255 or less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let mut len = if has_this_param { 1 } else { 0 };
        for parameter in &self.parameters {
            len += parameter.width();
        }
        len
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        // Assert open paren
        if let Some('(') = source.next() {
        } else {
            let msg = "Expected '(' for method";
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }

        // Parse parameters
        let mut parameters = vec![];
        while source.peek().copied() != Some(')') {
            parameters.push(FieldType::parse_from(source)?);
        }

        // Assert close paren
        if let Some(')') = source.next() {
        } else {
            let msg = "Expected ')' for method";
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }

        // Parse return
        let return_type = if let Some('V') = source.peek().copied() {
            let _ = source.next();
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const INT: FieldType = FieldType::Base(BaseType::Int);
    const DOUBLE: FieldType = FieldType::Base(BaseType::Double);
    const OBJECT: FieldType = FieldType::object(BinaryName::OBJECT);
    const STRING: FieldType = FieldType::object(BinaryName::STRING);
    const INTEGER: FieldType = FieldType::object(BinaryName::INTEGER);

    #[test]
    fn field_types() {
        assert_eq!(FieldType::parse("I").unwrap(), INT);
        assert_eq!(FieldType::parse("Ljava/lang/Object;").unwrap(), OBJECT);
        assert_eq!(
            FieldType::parse("[[[D").unwrap(),
            FieldType::array(FieldType::array(FieldType::array(DOUBLE)))
        );
        assert_eq!(FieldType::array(STRING).render(), "[Ljava/lang/String;");
        assert!(FieldType::parse("V").is_err(), "void is not a field type");
        assert!(FieldType::parse("II").is_err(), "leftover input");
    }

    #[test]
    fn method_descriptors() {
        let desc = MethodDescriptor::parse("(IDLjava/lang/Integer;)Ljava/lang/Object;").unwrap();
        assert_eq!(
            desc,
            MethodDescriptor {
                parameters: vec![INT, DOUBLE, INTEGER],
                return_type: Some(OBJECT),
            }
        );
        assert_eq!(desc.parameter_length(false), 4);
        assert_eq!(desc.parameter_length(true), 5);
        assert_eq!(MethodDescriptor::parse("()V").unwrap().render(), "()V");
    }

    #[test]
    fn array_element_types() {
        let nested = FieldType::parse("[[I").unwrap();
        assert_eq!(nested.array_element_type(), Some(FieldType::parse("[I").unwrap()));
        assert_eq!(
            FieldType::parse("[I").unwrap().array_element_type(),
            Some(INT)
        );
        assert_eq!(
            FieldType::array(STRING).array_element_type(),
            Some(STRING)
        );
        assert_eq!(STRING.array_element_type(), None);
        assert_eq!(FieldType::NULL.array_element_type(), None);
    }

    #[test]
    fn display() {
        assert_eq!(INT.to_string(), "int");
        assert_eq!(FieldType::NULL.to_string(), "null");
        assert_eq!(STRING.to_string(), "Ljava/lang/String;");
    }
}
