//! Model JVM method bodies and the frames flowing through them
//!
//! ### Simple example
//!
//! Consider the following Java method:
//!
//! ```java,ignore,no_run
//! public class Point {
//!     public static Object box(int x) {
//!         return new Integer(x);
//!     }
//! }
//! ```
//!
//! Computing the frames of its body can be done as follows:
//!
//! ```
//! use cf_frames::jvm::class_graph::*;
//! use cf_frames::jvm::code::{CodeBuilder, InvokeType, MethodRef, Instruction::*, BranchInstruction::*};
//! use cf_frames::jvm::verifier::*;
//! use cf_frames::jvm::*;
//! use cf_frames::settings::Settings;
//!
//! # fn compute_frames() -> Result<(), Error> {
//! // Setup the class graph, add in Java standard library types
//! let class_graph = ClassGraph::new();
//! class_graph.insert_java_library_types();
//!
//! let method = MethodContext::new(
//!     BinaryName::from_string(String::from("me/alec/Point")).map_err(Error::MalformedName)?,
//!     UnqualifiedName::from_string(String::from("box")).map_err(Error::MalformedName)?,
//!     MethodDescriptor::parse("(I)Ljava/lang/Object;")?,
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//! );
//! let integer_init = MethodRef {
//!     class: BinaryName::INTEGER,
//!     name: UnqualifiedName::INIT,
//!     descriptor: MethodDescriptor::parse("(I)V")?,
//! };
//!
//! // Generate the method body
//! let mut code = CodeBuilder::new(method);
//! code.new_object(BinaryName::INTEGER)?;
//! code.push_instruction(Dup)?;
//! code.push_instruction(ILoad(0))?;
//! code.push_instruction(Invoke(InvokeType::Special, integer_init))?;
//! code.push_branch_instruction(AReturn)?;
//! let code = code.result()?;
//!
//! // Run the verifier over the body
//! let frames = code.compute_frames(&class_graph, &Settings::default())?;
//! assert_eq!(
//!     frames.values().next().map(|frame| frame.to_string()),
//!     Some(String::from("locals: {0=int}, stack: []")),
//! );
//! # Ok(())
//! # }
//! # compute_frames().unwrap();
//! ```

mod access_flags;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
