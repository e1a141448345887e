//! Bytecode verification utilities
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _frame_
//! (represented using [`Frame`]).
//!
//! Knowing the frame at a point in the code makes it possible to verify that the next
//! instruction makes sense (eg. `dadd` only makes sense if the top two elements on the stack are
//! of type `double`). The "types" used in verification (represented using [`FrameType`]) are
//! slightly augumented to take into account initialization, null, and unused slots.
//!
//! The process of verifying a program is referred to as [verification by type-checking][0].
//! Verifying straight-line instructions is pretty simple (see [`Frame::verify_instruction`]), and
//! when an instruction can be reached from multiple locations the frames are unified with
//! [`Frame::join`]. Frames declared explicitly in the code (the equivalent of stack map frames)
//! are checked with [`is_frame_assignable`], which produces an [`AssignabilityResult`] describing
//! exactly where the frames disagree.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod assignability;
mod frame;
mod types;

pub use assignability::*;
pub use frame::*;
pub use types::*;
