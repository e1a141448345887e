//! Types and frames of JVM bytecode, as seen by the verifier
//!
//! The core of this crate is the lattice of [verification types][jvm::verifier::FrameType] used in
//! stack map frames, along with:
//!
//!   - assignability checks between types, between local variables, between stacks, and between
//!     whole frames (failures come with a message explaining exactly where frames disagree)
//!   - an abstract interpreter which threads frames through JVM instructions
//!   - a fixpoint computation of the frames at the start of every block of a method body
//!
//! Computing frames only ever _reads_ the class hierarchy, so many methods can be processed in
//! parallel (see [`driver`]).

pub mod driver;
pub mod jvm;
pub mod settings;
mod util;
