use super::code::SynLabel;
use super::verifier::{FailedAssignabilityResult, FrameType};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Error evaluating an instruction (or joining frames)
    Verifier(VerifierError),

    /// A block was reached with a frame that isn't assignable to the frame declared for it
    IncompatibleFrames(SynLabel, FailedAssignabilityResult),

    /// A label is used as a jump target but never placed
    MissingLabel(SynLabel),

    /// Two blocks claim to have the same label (indicates a bug)
    DuplicateLabel(SynLabel),

    /// A label is placed without any way to reach it and without a declared frame
    PlacingLabelBeforeReference(SynLabel),

    MethodCodeNotFinished {
        pending_block: Option<SynLabel>,
        unplaced_labels: Vec<SynLabel>,
    },

    MalformedName(String),
    MalformedDescriptor(std::io::Error),
    MalformedFrameType(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Verifier(err) => err.fmt(f),
            Error::IncompatibleFrames(label, failed) => {
                write!(f, "Incompatible frames at {}: {}", label, failed)
            }
            Error::MissingLabel(label) => write!(f, "Label {} is never placed", label),
            Error::DuplicateLabel(label) => write!(f, "Label {} is placed twice", label),
            Error::PlacingLabelBeforeReference(label) => {
                write!(f, "Label {} is placed before any reference to it", label)
            }
            Error::MethodCodeNotFinished {
                pending_block,
                unplaced_labels,
            } => write!(
                f,
                "Method code is not finished (pending block: {:?}, unplaced labels: {:?})",
                pending_block, unplaced_labels
            ),
            Error::MalformedName(msg) => write!(f, "Malformed name: {}", msg),
            Error::MalformedDescriptor(err) => write!(f, "Malformed descriptor: {}", err),
            Error::MalformedFrameType(msg) => write!(f, "Malformed frame type: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Verifier(err) => Some(err),
            Error::MalformedDescriptor(err) => Some(err),
            _ => None,
        }
    }
}

impl From<VerifierError> for Error {
    fn from(err: VerifierError) -> Error {
        Error::Verifier(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::MalformedDescriptor(err)
    }
}

/// Instruction that could not be evaluated, along with the reason why
#[derive(Debug, Clone, PartialEq)]
pub struct VerifierError {
    /// Rendered instruction (or other program point)
    pub instruction: String,
    pub kind: VerifierErrorKind,
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.kind, self.instruction)
    }
}

impl std::error::Error for VerifierError {}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),

    /// Local variable is not set (or is `top`)
    InvalidIndex(u16),

    /// Found the first type where the second was expected
    IncompatibleTypes(FrameType, FrameType),

    ExpectedReference(FrameType),
    ExpectedUninitialized(FrameType),
    NotArrayType(FrameType),

    /// Constant has a width which doesn't match the `ldc` variant used
    InvalidConstantWidth(usize),

    /// Return instruction doesn't match the method return type
    InvalidReturn(String),

    /// `return` from a constructor before `this` has been initialized
    UninitializedThisOnReturn,

    /// `jsr`/`ret` are never verifiable
    UnexpectedJsrRet,

    StackSizeMismatch(usize, usize),
    IncompatibleJoin(String),

    /// Frames still hadn't stabilized after this many block visits
    FixpointDiverged(usize),
}

impl fmt::Display for VerifierErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierErrorKind::EmptyStack => f.write_str("Empty stack"),
            VerifierErrorKind::InvalidWidth(width) => write!(f, "Invalid width {}", width),
            VerifierErrorKind::InvalidIndex(index) => {
                write!(f, "No value in local at index {}", index)
            }
            VerifierErrorKind::IncompatibleTypes(found, expected) => {
                write!(f, "Found '{}' but expected '{}'", found, expected)
            }
            VerifierErrorKind::ExpectedReference(found) => {
                write!(f, "Found '{}' but expected a reference", found)
            }
            VerifierErrorKind::ExpectedUninitialized(found) => {
                write!(f, "Found '{}' but expected an uninitialized reference", found)
            }
            VerifierErrorKind::NotArrayType(found) => {
                write!(f, "Found '{}' but expected an array", found)
            }
            VerifierErrorKind::InvalidConstantWidth(width) => {
                write!(f, "Constant of width {} cannot be loaded here", width)
            }
            VerifierErrorKind::InvalidReturn(msg) => write!(f, "Invalid return: {}", msg),
            VerifierErrorKind::UninitializedThisOnReturn => {
                f.write_str("Returning from a constructor before `this` is initialized")
            }
            VerifierErrorKind::UnexpectedJsrRet => f.write_str("Unexpected JSR/RET instruction"),
            VerifierErrorKind::StackSizeMismatch(size1, size2) => {
                write!(f, "Cannot join stacks of sizes {} and {}", size1, size2)
            }
            VerifierErrorKind::IncompatibleJoin(msg) => f.write_str(msg),
            VerifierErrorKind::FixpointDiverged(visits) => {
                write!(f, "Frames did not stabilize after {} block visits", visits)
            }
        }
    }
}
