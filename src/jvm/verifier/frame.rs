use super::*;
use crate::jvm::class_graph::TypeHierarchy;
use crate::jvm::code::{AllocationSites, BranchInstruction, ConstantData, Instruction, InvokeType};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::{
    ArrayType, BaseType, BinaryName, FieldType, MethodAccessFlags, MethodDescriptor, RefType,
    UnqualifiedName, VerifierError, VerifierErrorKind,
};
use crate::util::Width;
use std::collections::BTreeMap;
use std::fmt;

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Locals are keyed by slot index. Missing slots are implicitly `top`, which is also how the
/// second slot of a `long` or `double` local is represented. The stack has exactly one entry per
/// value (wide values included), with the top of the stack at the end of the vector.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    /// Local variables in scope
    pub locals: BTreeMap<u16, FrameType>,

    /// Types of values on the stack
    pub stack: Vec<FrameType>,

    /// In a constructor, whether `super(...)` or `this(...)` might not have been called yet
    ///
    /// Unlike an `uninitializedThis` local, this can't be overwritten or lost in a join.
    pub this_uninitialized: bool,
}

/// State of the frame at some program point during analysis
#[derive(Debug, Clone, PartialEq)]
pub enum FrameState {
    /// Program point not (yet) reached
    Bottom,

    Concrete(Frame),

    /// Evaluation failed at or before this program point
    Error(VerifierError),
}

/// The method whose body is being analyzed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodContext {
    /// Class holding the method
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,
}

/// Everything besides the frame itself needed to evaluate an instruction
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub method: &'a MethodContext,
    pub hierarchy: &'a dyn TypeHierarchy,
    pub allocation_sites: &'a AllocationSites,
}

impl MethodContext {
    pub fn new(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
        access_flags: MethodAccessFlags,
    ) -> MethodContext {
        MethodContext {
            class,
            name,
            descriptor,
            access_flags,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_instance_initializer(&self) -> bool {
        self.name.is_init() && !self.is_static()
    }

    /// Frame on entry to the method
    ///
    /// Constructors start with an uninitialized `this`, except for the constructor of
    /// `java/lang/Object` (which has no superclass constructor to call).
    pub fn entry_frame(&self) -> Frame {
        let mut frame = Frame::default();
        let mut index: u16 = 0;

        if !self.is_static() {
            let this_type = if self.is_instance_initializer() && self.class != BinaryName::OBJECT
            {
                frame.this_uninitialized = true;
                FrameType::UninitializedThis
            } else {
                FrameType::object(self.class.clone())
            };
            frame.locals.insert(index, this_type);
            index += 1;
        }

        for parameter in &self.descriptor.parameters {
            let parameter_type = FrameType::verification(parameter.clone());
            let width = parameter_type.width() as u16;
            frame.locals.insert(index, parameter_type);
            index += width;
        }

        frame
    }
}

impl Frame {
    /// Build a frame from its locals and its stack (listed bottom first)
    ///
    /// `this` is considered uninitialized if one of the locals is `uninitializedThis`.
    pub fn new(
        locals: impl IntoIterator<Item = (u16, FrameType)>,
        stack: impl IntoIterator<Item = FrameType>,
    ) -> Frame {
        let locals: BTreeMap<u16, FrameType> = locals.into_iter().collect();
        let this_uninitialized = locals.values().any(FrameType::is_uninitialized_this);
        Frame {
            locals,
            stack: stack.into_iter().collect(),
            this_uninitialized,
        }
    }

    /// Frame after the given (non-branching) instruction
    ///
    /// The frame itself is left untouched.
    pub fn evaluate(&self, insn: &Instruction, ctx: &EvaluationContext) -> FrameState {
        let mut frame = self.clone();
        match frame.verify_instruction(insn, ctx) {
            Ok(()) => {
                log::trace!("{:?} => {}", insn, frame);
                FrameState::Concrete(frame)
            }
            Err(kind) => FrameState::Error(VerifierError {
                instruction: format!("{:?}", insn),
                kind,
            }),
        }
    }

    /// Frame after the given branch instruction (shared by all successors)
    pub fn evaluate_branch<Lbl: fmt::Debug, LblNext: fmt::Debug>(
        &self,
        insn: &BranchInstruction<Lbl, LblNext>,
        ctx: &EvaluationContext,
    ) -> FrameState {
        let mut frame = self.clone();
        match frame.verify_branch_instruction(insn, ctx) {
            Ok(()) => {
                log::trace!("{:?} => {}", insn, frame);
                FrameState::Concrete(frame)
            }
            Err(kind) => FrameState::Error(VerifierError {
                instruction: format!("{:?}", insn),
                kind,
            }),
        }
    }

    /// Update the frame to reflect the effects of the given (non-branching) instruction
    pub fn verify_instruction(
        &mut self,
        insn: &Instruction,
        ctx: &EvaluationContext,
    ) -> Result<(), VerifierErrorKind> {
        use Instruction::*;

        let int = FrameType::int();
        let long = FrameType::long();
        let float = FrameType::float();
        let double = FrameType::double();

        match insn {
            Nop => (),
            AConstNull => self.push(FrameType::Null),
            IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
                self.push(int)
            }
            LConst0 | LConst1 => self.push(long),
            FConst0 | FConst1 | FConst2 => self.push(float),
            DConst0 | DConst1 => self.push(double),
            BiPush(_) | SiPush(_) => self.push(int),
            Ldc(constant) => {
                let constant_type = constant_type(constant);
                if constant_type.width() != 1 {
                    return Err(VerifierErrorKind::InvalidConstantWidth(constant_type.width()));
                }
                self.push(constant_type);
            }
            Ldc2(constant) => {
                let constant_type = constant_type(constant);
                if constant_type.width() != 2 {
                    return Err(VerifierErrorKind::InvalidConstantWidth(constant_type.width()));
                }
                self.push(constant_type);
            }

            ILoad(index) => {
                self.load_local_expecting(*index, &int, ctx)?;
                self.push(int);
            }
            LLoad(index) => {
                self.load_local_expecting(*index, &long, ctx)?;
                self.push(long);
            }
            FLoad(index) => {
                self.load_local_expecting(*index, &float, ctx)?;
                self.push(float);
            }
            DLoad(index) => {
                self.load_local_expecting(*index, &double, ctx)?;
                self.push(double);
            }
            ALoad(index) => {
                let typ = self.load_local(*index)?;
                if !typ.is_reference() {
                    return Err(VerifierErrorKind::ExpectedReference(typ));
                }
                self.push(typ);
            }

            IALoad => {
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Int])?;
                self.push(int);
            }
            LALoad => {
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Long])?;
                self.push(long);
            }
            FALoad => {
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Float])?;
                self.push(float);
            }
            DALoad => {
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Double])?;
                self.push(double);
            }
            AALoad => {
                self.pop_expecting(&int, ctx)?;
                match self.pop_array()? {
                    None => self.push(FrameType::Null),
                    Some(array_type) => match array_type.array_element_type() {
                        Some(FieldType::Ref(element_type)) => {
                            self.push(FrameType::reference(element_type))
                        }
                        _ => {
                            return Err(VerifierErrorKind::IncompatibleTypes(
                                FrameType::reference(array_type),
                                FrameType::reference(RefType::array(FieldType::OBJECT)),
                            ))
                        }
                    },
                }
            }
            BALoad => {
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Byte, BaseType::Boolean])?;
                self.push(int);
            }
            CALoad => {
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Char])?;
                self.push(int);
            }
            SALoad => {
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Short])?;
                self.push(int);
            }

            IStore(index) => {
                self.pop_expecting(&int, ctx)?;
                self.store_local(*index, int)?;
            }
            FStore(index) => {
                self.pop_expecting(&float, ctx)?;
                self.store_local(*index, float)?;
            }
            LStore(index) => {
                self.pop_expecting(&long, ctx)?;
                self.store_local(*index, long)?;
            }
            DStore(index) => {
                self.pop_expecting(&double, ctx)?;
                self.store_local(*index, double)?;
            }
            AStore(index) => {
                let popped_type = self.pop_reference()?;
                self.store_local(*index, popped_type)?;
            }

            IAStore => {
                self.pop_expecting(&int, ctx)?;
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Int])?;
            }
            LAStore => {
                self.pop_expecting(&long, ctx)?;
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Long])?;
            }
            FAStore => {
                self.pop_expecting(&float, ctx)?;
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Float])?;
            }
            DAStore => {
                self.pop_expecting(&double, ctx)?;
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Double])?;
            }
            AAStore => {
                let elem_type = self.pop_reference()?;
                if !elem_type.is_initialized() {
                    return Err(VerifierErrorKind::IncompatibleTypes(
                        elem_type,
                        FrameType::object(BinaryName::OBJECT),
                    ));
                }
                self.pop_expecting(&int, ctx)?;
                match self.pop_array()? {
                    None | Some(RefType::ObjectArray(_)) => (),
                    Some(RefType::PrimitiveArray(array_type))
                        if array_type.additional_dimensions > 0 => {}
                    Some(array_type) => {
                        return Err(VerifierErrorKind::IncompatibleTypes(
                            FrameType::reference(array_type),
                            FrameType::reference(RefType::array(FieldType::OBJECT)),
                        ))
                    }
                }
            }
            BAStore => {
                self.pop_expecting(&int, ctx)?;
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Byte, BaseType::Boolean])?;
            }
            CAStore => {
                self.pop_expecting(&int, ctx)?;
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Char])?;
            }
            SAStore => {
                self.pop_expecting(&int, ctx)?;
                self.pop_expecting(&int, ctx)?;
                self.pop_primitive_array(&[BaseType::Short])?;
            }

            Pop => {
                let _ = self.pop_expecting_width(1)?;
            }

            Pop2 => {
                let arg1 = self.pop()?;
                match arg1.width() {
                    // Form 1
                    1 => {
                        let _ = self.pop_expecting_width(1)?;
                    }

                    // Form 2
                    _ => (),
                }
            }

            Dup => {
                let arg1 = self.pop_expecting_width(1)?;
                self.push(arg1.clone());
                self.push(arg1);
            }

            DupX1 => {
                let arg1 = self.pop_expecting_width(1)?;
                let arg2 = self.pop_expecting_width(1)?;
                self.push(arg1.clone());
                self.push(arg2);
                self.push(arg1);
            }

            DupX2 => {
                let arg1 = self.pop_expecting_width(1)?;
                let arg2 = self.pop()?;
                match arg2.width() {
                    // Form 1
                    1 => {
                        let arg3 = self.pop_expecting_width(1)?;
                        self.push(arg1.clone());
                        self.push(arg3);
                        self.push(arg2);
                        self.push(arg1);
                    }

                    // Form 2
                    _ => {
                        self.push(arg1.clone());
                        self.push(arg2);
                        self.push(arg1);
                    }
                }
            }

            Dup2 => {
                let arg1 = self.pop()?;
                match arg1.width() {
                    // Form 1
                    1 => {
                        let arg2 = self.pop_expecting_width(1)?;
                        self.push(arg2.clone());
                        self.push(arg1.clone());
                        self.push(arg2);
                        self.push(arg1);
                    }

                    // Form 2
                    _ => {
                        self.push(arg1.clone());
                        self.push(arg1);
                    }
                }
            }

            Dup2X1 => {
                let arg1 = self.pop()?;
                let arg2 = self.pop_expecting_width(1)?;
                match arg1.width() {
                    // Form 1
                    1 => {
                        let arg3 = self.pop_expecting_width(1)?;
                        self.push(arg2.clone());
                        self.push(arg1.clone());
                        self.push(arg3);
                        self.push(arg2);
                        self.push(arg1);
                    }

                    // Form 2
                    _ => {
                        self.push(arg1.clone());
                        self.push(arg2);
                        self.push(arg1);
                    }
                }
            }

            Dup2X2 => {
                let arg1 = self.pop()?;
                match arg1.width() {
                    1 => {
                        let arg2 = self.pop_expecting_width(1)?;
                        let arg3 = self.pop()?;
                        match arg3.width() {
                            // Form 1
                            1 => {
                                let arg4 = self.pop_expecting_width(1)?;
                                self.push(arg2.clone());
                                self.push(arg1.clone());
                                self.push(arg4);
                                self.push(arg3);
                                self.push(arg2);
                                self.push(arg1);
                            }

                            // Form 3
                            _ => {
                                self.push(arg2.clone());
                                self.push(arg1.clone());
                                self.push(arg3);
                                self.push(arg2);
                                self.push(arg1);
                            }
                        }
                    }

                    _ => {
                        let arg2 = self.pop()?;
                        match arg2.width() {
                            // Form 2
                            1 => {
                                let arg3 = self.pop_expecting_width(1)?;
                                self.push(arg1.clone());
                                self.push(arg3);
                                self.push(arg2);
                                self.push(arg1);
                            }

                            // Form 4
                            _ => {
                                self.push(arg1.clone());
                                self.push(arg2);
                                self.push(arg1);
                            }
                        }
                    }
                }
            }

            Swap => {
                let arg1 = self.pop_expecting_width(1)?;
                let arg2 = self.pop_expecting_width(1)?;
                self.push(arg1);
                self.push(arg2);
            }

            IAdd | ISub | IDiv | IMul | IRem | IAnd | IOr | IXor | ISh(_) => {
                self.pop_expecting(&int, ctx)?;
                self.pop_expecting(&int, ctx)?;
                self.push(int);
            }

            LAdd | LSub | LDiv | LMul | LRem | LAnd | LOr | LXor => {
                self.pop_expecting(&long, ctx)?;
                self.pop_expecting(&long, ctx)?;
                self.push(long);
            }

            FAdd | FSub | FDiv | FMul | FRem => {
                self.pop_expecting(&float, ctx)?;
                self.pop_expecting(&float, ctx)?;
                self.push(float);
            }

            DAdd | DSub | DDiv | DMul | DRem => {
                self.pop_expecting(&double, ctx)?;
                self.pop_expecting(&double, ctx)?;
                self.push(double);
            }

            INeg | I2B | I2C | I2S => {
                self.pop_expecting(&int, ctx)?;
                self.push(int);
            }
            LNeg => {
                self.pop_expecting(&long, ctx)?;
                self.push(long);
            }
            FNeg => {
                self.pop_expecting(&float, ctx)?;
                self.push(float);
            }
            DNeg => {
                self.pop_expecting(&double, ctx)?;
                self.push(double);
            }

            LSh(_) => {
                self.pop_expecting(&int, ctx)?;
                self.pop_expecting(&long, ctx)?;
                self.push(long);
            }

            IInc(index, _) => {
                self.load_local_expecting(*index, &int, ctx)?;
            }

            I2L | F2L | D2L => {
                self.pop_expecting(&conversion_source(insn), ctx)?;
                self.push(long);
            }
            I2F | L2F | D2F => {
                self.pop_expecting(&conversion_source(insn), ctx)?;
                self.push(float);
            }
            I2D | L2D | F2D => {
                self.pop_expecting(&conversion_source(insn), ctx)?;
                self.push(double);
            }
            L2I | F2I | D2I => {
                self.pop_expecting(&conversion_source(insn), ctx)?;
                self.push(int);
            }

            LCmp => {
                self.pop_expecting(&long, ctx)?;
                self.pop_expecting(&long, ctx)?;
                self.push(int);
            }
            FCmp(_) => {
                self.pop_expecting(&float, ctx)?;
                self.pop_expecting(&float, ctx)?;
                self.push(int);
            }
            DCmp(_) => {
                self.pop_expecting(&double, ctx)?;
                self.pop_expecting(&double, ctx)?;
                self.push(int);
            }

            GetStatic(field) => {
                self.push(FrameType::verification(field.descriptor.clone()));
            }
            PutStatic(field) => {
                self.pop_expecting(&FrameType::verification(field.descriptor.clone()), ctx)?;
            }
            GetField(field) => {
                self.pop_expecting(&FrameType::object(field.class.clone()), ctx)?;
                self.push(FrameType::verification(field.descriptor.clone()));
            }
            PutField(field) => {
                self.pop_expecting(&FrameType::verification(field.descriptor.clone()), ctx)?;

                // Fields of the class being constructed may be set before calling `super(...)`
                let object_type_found = self.pop()?;
                let is_own_field_in_constructor = object_type_found.is_uninitialized_this()
                    && field.class == ctx.method.class;
                let expected = FrameType::object(field.class.clone());
                if !is_own_field_in_constructor
                    && !is_assignable(&object_type_found, &expected, ctx.hierarchy)
                {
                    return Err(VerifierErrorKind::IncompatibleTypes(
                        object_type_found,
                        expected,
                    ));
                }
            }

            Invoke(invoke_type, method) => {
                let desc = &method.descriptor;

                // Check that all the arguments match
                for expected_arg_type in desc.parameters.iter().rev() {
                    let expected = FrameType::verification(expected_arg_type.clone());
                    let found_arg_type = self.pop()?;
                    if !is_assignable(&found_arg_type, &expected, ctx.hierarchy) {
                        log::error!(
                            "Incompatible argument types: found {} but expected {} (for {})",
                            found_arg_type,
                            expected,
                            desc.render(),
                        );
                        return Err(VerifierErrorKind::IncompatibleTypes(
                            found_arg_type,
                            expected,
                        ));
                    }
                }

                if let (InvokeType::Special, true) = (invoke_type, method.is_init()) {
                    // Initialize every copy of the receiver
                    let receiver = self.pop()?;
                    let initialized = match &receiver {
                        FrameType::UninitializedThis => FrameType::object(ctx.method.class.clone()),
                        FrameType::UninitializedNew { ty, .. } => {
                            FrameType::object(ty.clone().unwrap_or_else(|| method.class.clone()))
                        }
                        _ => return Err(VerifierErrorKind::ExpectedUninitialized(receiver)),
                    };
                    log::trace!("Initializing {} to {}", receiver, initialized);
                    self.initialize(&receiver, initialized);
                } else {
                    // Pop off the receiver type
                    if *invoke_type != InvokeType::Static {
                        let found_receiver = self.pop()?;
                        let expected = FrameType::object(method.class.clone());
                        if !is_assignable(&found_receiver, &expected, ctx.hierarchy) {
                            log::error!(
                                "Incompatible receiver: found {} but expected {} (for {})",
                                found_receiver,
                                expected,
                                desc.render(),
                            );
                            return Err(VerifierErrorKind::IncompatibleTypes(
                                found_receiver,
                                expected,
                            ));
                        }
                    }

                    if let Some(return_type) = &desc.return_type {
                        self.push(FrameType::verification(return_type.clone()));
                    }
                }
            }

            InvokeDynamic(invoke_dynamic) => {
                for expected_arg_type in invoke_dynamic.descriptor.parameters.iter().rev() {
                    let expected = FrameType::verification(expected_arg_type.clone());
                    self.pop_expecting(&expected, ctx)?;
                }
                if let Some(return_type) = &invoke_dynamic.descriptor.return_type {
                    self.push(FrameType::verification(return_type.clone()));
                }
            }

            New(site) => {
                let class = ctx.allocation_sites.class_of(*site).clone();
                self.push(FrameType::uninitialized_new(*site, Some(class)));
            }
            NewArray(base_type) => {
                self.pop_expecting(&int, ctx)?;
                self.push(FrameType::reference(RefType::array(FieldType::Base(
                    *base_type,
                ))));
            }
            ANewArray(ref_type) => {
                self.pop_expecting(&int, ctx)?;
                self.push(FrameType::reference(RefType::array(FieldType::Ref(
                    ref_type.clone(),
                ))));
            }
            MultiANewArray(array_type, dimensions) => {
                if !array_type.is_array() {
                    return Err(VerifierErrorKind::NotArrayType(FrameType::reference(
                        array_type.clone(),
                    )));
                }
                for _ in 0..*dimensions {
                    self.pop_expecting(&int, ctx)?;
                }
                self.push(FrameType::reference(array_type.clone()));
            }
            ArrayLength => {
                self.pop_array()?;
                self.push(int);
            }

            CheckCast(ref_type) => {
                self.pop_initialized_reference()?;
                self.push(FrameType::reference(ref_type.clone()));
            }
            InstanceOf(_) => {
                self.pop_initialized_reference()?;
                self.push(int);
            }

            MonitorEnter | MonitorExit => {
                self.pop_initialized_reference()?;
            }

            JsrRet(_) => {
                log::error!("Unexpected JSR/RET instruction in {}", ctx.method.name);
                return Err(VerifierErrorKind::UnexpectedJsrRet);
            }
        }

        Ok(())
    }

    /// Update the frame to reflect the effects of the given branching instruction
    pub fn verify_branch_instruction<Lbl, LblNext>(
        &mut self,
        insn: &BranchInstruction<Lbl, LblNext>,
        ctx: &EvaluationContext,
    ) -> Result<(), VerifierErrorKind> {
        use BranchInstruction::*;

        let int = FrameType::int();
        let return_type = ctx.method.descriptor.return_type.as_ref();

        match insn {
            If(_, _, _) | TableSwitch { .. } | LookupSwitch { .. } => {
                self.pop_expecting(&int, ctx)?;
            }
            IfICmp(_, _, _) => {
                self.pop_expecting(&int, ctx)?;
                self.pop_expecting(&int, ctx)?;
            }
            IfACmp(_, _, _) => {
                self.pop_reference()?;
                self.pop_reference()?;
            }
            IfNull(_, _, _) => {
                self.pop_reference()?;
            }
            Goto(_) | FallThrough(_) => (),

            IReturn | LReturn | FReturn | DReturn => {
                let expected = match insn {
                    IReturn => int,
                    LReturn => FrameType::long(),
                    FReturn => FrameType::float(),
                    _ => FrameType::double(),
                };
                self.pop_expecting(&expected, ctx)?;
                let matches_return_type = match return_type {
                    Some(FieldType::Base(base_type)) => {
                        FrameType::verification(FieldType::Base(*base_type)) == expected
                    }
                    _ => false,
                };
                if !matches_return_type {
                    return Err(VerifierErrorKind::InvalidReturn(format!(
                        "returning '{}' from a method returning '{}'",
                        expected,
                        render_return_type(return_type)
                    )));
                }
            }
            AReturn => {
                let found = self.pop_reference()?;
                match return_type {
                    Some(ret_type @ FieldType::Ref(_)) => {
                        let expected = FrameType::verification(ret_type.clone());
                        if !is_assignable(&found, &expected, ctx.hierarchy) {
                            return Err(VerifierErrorKind::IncompatibleTypes(found, expected));
                        }
                    }
                    _ => {
                        return Err(VerifierErrorKind::InvalidReturn(format!(
                            "returning '{}' from a method returning '{}'",
                            found,
                            render_return_type(return_type)
                        )))
                    }
                }
            }
            Return => {
                if return_type.is_some() {
                    return Err(VerifierErrorKind::InvalidReturn(format!(
                        "returning 'void' from a method returning '{}'",
                        render_return_type(return_type)
                    )));
                }
                if ctx.method.is_instance_initializer() && self.this_uninitialized {
                    return Err(VerifierErrorKind::UninitializedThisOnReturn);
                }
            }
            AThrow => {
                let found = self.pop()?;
                let throwable = FrameType::object(BinaryName::THROWABLE);
                match &found {
                    FrameType::Null => (),
                    FrameType::InitializedReference {
                        ty: RefType::Object(class),
                        ..
                    } => {
                        // Classes missing from the hierarchy get the benefit of the doubt
                        let is_known = ctx.hierarchy.superclass_chain(class).is_some();
                        if is_known && !ctx.hierarchy.is_throwable(class) {
                            return Err(VerifierErrorKind::IncompatibleTypes(found, throwable));
                        }
                    }
                    _ => return Err(VerifierErrorKind::IncompatibleTypes(found, throwable)),
                }
            }
        }

        Ok(())
    }

    /// Replace every occurrence of an uninitialized value with its initialized type
    ///
    /// Uninitialized values are matched by identity: `this`, or the allocation site of a `new`.
    pub fn initialize(&mut self, uninitialized: &FrameType, initialized: FrameType) {
        let is_same_value = |typ: &FrameType| match (typ, uninitialized) {
            (FrameType::UninitializedThis, FrameType::UninitializedThis) => true,
            (
                FrameType::UninitializedNew { site: site1, .. },
                FrameType::UninitializedNew { site: site2, .. },
            ) => site1 == site2,
            _ => false,
        };

        for typ in self.stack.iter_mut().chain(self.locals.values_mut()) {
            if is_same_value(typ) {
                *typ = initialized.clone();
            }
        }
        if uninitialized.is_uninitialized_this() {
            self.this_uninitialized = false;
        }
    }

    /// Merge two frames reaching the same program point
    ///
    /// Stacks must have the same size and every position must have a common representation.
    /// Locals without a common representation become `top` (so are dropped).
    pub fn join<H: TypeHierarchy + ?Sized>(
        &self,
        other: &Frame,
        hierarchy: &H,
    ) -> Result<Frame, VerifierErrorKind> {
        if self.stack.len() != other.stack.len() {
            return Err(VerifierErrorKind::StackSizeMismatch(
                self.stack.len(),
                other.stack.len(),
            ));
        }

        let stack = self
            .stack
            .iter()
            .zip(other.stack.iter())
            .map(|(type1, type2)| {
                let joined = type1
                    .join(type2, hierarchy)
                    .map_err(VerifierErrorKind::IncompatibleJoin)?;
                if let FrameType::Top(_) = joined {
                    Err(VerifierErrorKind::IncompatibleJoin(format!(
                        "Cannot join stack values '{}' and '{}'",
                        type1, type2
                    )))
                } else {
                    Ok(joined)
                }
            })
            .collect::<Result<Vec<FrameType>, VerifierErrorKind>>()?;

        Ok(Frame {
            locals: Frame::join_locals(&self.locals, &other.locals, hierarchy)?,
            stack,
            this_uninitialized: self.this_uninitialized || other.this_uninitialized,
        })
    }

    /// Merge local variables, dropping those without a common representation
    pub fn join_locals<H: TypeHierarchy + ?Sized>(
        locals1: &BTreeMap<u16, FrameType>,
        locals2: &BTreeMap<u16, FrameType>,
        hierarchy: &H,
    ) -> Result<BTreeMap<u16, FrameType>, VerifierErrorKind> {
        let mut joined = BTreeMap::new();
        for (index, type1) in locals1 {
            if let Some(type2) = locals2.get(index) {
                let typ = type1.join(type2, hierarchy).map_err(|msg| {
                    VerifierErrorKind::IncompatibleJoin(format!(
                        "Cannot join locals at index {}: {}",
                        index, msg
                    ))
                })?;
                if !matches!(typ, FrameType::Top(_)) {
                    joined.insert(*index, typ);
                }
            }
        }
        Ok(joined)
    }

    /// Rename the classes mentioned anywhere in the frame
    ///
    /// Unlike [`FrameType::map`], this also handles precise types. Uninitialized values keep
    /// their allocation site, so they still get initialized by the right constructor call.
    pub fn rewrite_types(&self, rename: &impl Fn(&BinaryName) -> BinaryName) -> Frame {
        Frame {
            locals: self
                .locals
                .iter()
                .map(|(index, typ)| (*index, typ.map_unchecked(rename)))
                .collect(),
            stack: self
                .stack
                .iter()
                .map(|typ| typ.map_unchecked(rename))
                .collect(),
            this_uninitialized: self.this_uninitialized,
        }
    }

    pub fn push(&mut self, typ: FrameType) {
        self.stack.push(typ);
    }

    pub fn pop(&mut self) -> Result<FrameType, VerifierErrorKind> {
        self.stack.pop().ok_or(VerifierErrorKind::EmptyStack)
    }

    fn pop_expecting_width(&mut self, expected_width: usize) -> Result<FrameType, VerifierErrorKind> {
        let typ = self.pop()?;
        let found_width = typ.width();
        if found_width == expected_width {
            Ok(typ)
        } else {
            Err(VerifierErrorKind::InvalidWidth(found_width))
        }
    }

    fn pop_expecting(
        &mut self,
        expected_type: &FrameType,
        ctx: &EvaluationContext,
    ) -> Result<FrameType, VerifierErrorKind> {
        let typ = self.pop()?;
        if is_assignable(&typ, expected_type, ctx.hierarchy) {
            Ok(typ)
        } else {
            Err(VerifierErrorKind::IncompatibleTypes(
                typ,
                expected_type.clone(),
            ))
        }
    }

    fn pop_reference(&mut self) -> Result<FrameType, VerifierErrorKind> {
        let typ = self.pop()?;
        if typ.is_reference() {
            Ok(typ)
        } else {
            Err(VerifierErrorKind::ExpectedReference(typ))
        }
    }

    fn pop_initialized_reference(&mut self) -> Result<FrameType, VerifierErrorKind> {
        let typ = self.pop_reference()?;
        if typ.is_initialized() {
            Ok(typ)
        } else {
            Err(VerifierErrorKind::IncompatibleTypes(
                typ,
                FrameType::object(BinaryName::OBJECT),
            ))
        }
    }

    /// Pop an array (or `null`, in which case this returns `None`)
    fn pop_array(&mut self) -> Result<Option<RefType>, VerifierErrorKind> {
        match self.pop()? {
            FrameType::Null => Ok(None),
            FrameType::InitializedReference { ty, .. } if ty.is_array() => Ok(Some(ty)),
            other => Err(VerifierErrorKind::NotArrayType(other)),
        }
    }

    /// Pop a one-dimensional primitive array of one of the given element types
    fn pop_primitive_array(&mut self, element_types: &[BaseType]) -> Result<(), VerifierErrorKind> {
        match self.pop_array()? {
            None => Ok(()),
            Some(RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            })) if element_types.contains(&element_type) => Ok(()),
            Some(array_type) => Err(VerifierErrorKind::IncompatibleTypes(
                FrameType::reference(array_type),
                FrameType::reference(RefType::array(FieldType::Base(element_types[0]))),
            )),
        }
    }

    fn load_local(&self, index: u16) -> Result<FrameType, VerifierErrorKind> {
        match self.locals.get(&index) {
            Some(typ) if !matches!(typ, FrameType::Top(_)) => Ok(typ.clone()),
            _ => Err(VerifierErrorKind::InvalidIndex(index)),
        }
    }

    fn load_local_expecting(
        &self,
        index: u16,
        expected_type: &FrameType,
        ctx: &EvaluationContext,
    ) -> Result<(), VerifierErrorKind> {
        let typ = self.load_local(index)?;
        if is_assignable(&typ, expected_type, ctx.hierarchy) {
            Ok(())
        } else {
            Err(VerifierErrorKind::IncompatibleTypes(
                typ,
                expected_type.clone(),
            ))
        }
    }

    /// Set a local, invalidating any wide value whose second slot gets overwritten
    ///
    /// Wide values occupy `index` and (implicitly, as `top`) `index + 1`.
    fn store_local(&mut self, index: u16, typ: FrameType) -> Result<(), VerifierErrorKind> {
        if typ.is_wide() {
            let second_slot = index
                .checked_add(1)
                .ok_or(VerifierErrorKind::InvalidIndex(index))?;
            self.locals.remove(&second_slot);
        }
        if let Some(previous_slot) = index.checked_sub(1) {
            if self.locals.get(&previous_slot).map_or(false, FrameType::is_wide) {
                self.locals.remove(&previous_slot);
            }
        }
        self.locals.insert(index, typ);
        Ok(())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "locals: {}, stack: {}",
            render_locals(&self.locals),
            render_stack(&self.stack)
        )?;
        if self.this_uninitialized {
            f.write_str(", this uninitialized")?;
        }
        Ok(())
    }
}

impl FrameState {
    pub fn is_bottom(&self) -> bool {
        matches!(self, FrameState::Bottom)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FrameState::Error(_))
    }

    pub fn as_concrete(&self) -> Option<&Frame> {
        match self {
            FrameState::Concrete(frame) => Some(frame),
            _ => None,
        }
    }

    /// State after the given (non-branching) instruction
    pub fn evaluate(&self, insn: &Instruction, ctx: &EvaluationContext) -> FrameState {
        match self {
            FrameState::Bottom => FrameState::Bottom,
            FrameState::Concrete(frame) => frame.evaluate(insn, ctx),
            FrameState::Error(err) => FrameState::Error(err.clone()),
        }
    }

    /// State after the given branch instruction
    pub fn evaluate_branch<Lbl: fmt::Debug, LblNext: fmt::Debug>(
        &self,
        insn: &BranchInstruction<Lbl, LblNext>,
        ctx: &EvaluationContext,
    ) -> FrameState {
        match self {
            FrameState::Bottom => FrameState::Bottom,
            FrameState::Concrete(frame) => frame.evaluate_branch(insn, ctx),
            FrameState::Error(err) => FrameState::Error(err.clone()),
        }
    }

    /// Least upper bound of two states
    pub fn join<H: TypeHierarchy + ?Sized>(&self, other: &FrameState, hierarchy: &H) -> FrameState {
        match (self, other) {
            (FrameState::Error(err), _) | (_, FrameState::Error(err)) => {
                FrameState::Error(err.clone())
            }
            (FrameState::Bottom, state) | (state, FrameState::Bottom) => state.clone(),
            (FrameState::Concrete(frame1), FrameState::Concrete(frame2)) => {
                match frame1.join(frame2, hierarchy) {
                    Ok(frame) => FrameState::Concrete(frame),
                    Err(kind) => FrameState::Error(VerifierError {
                        instruction: format!("join of [{}] and [{}]", frame1, frame2),
                        kind,
                    }),
                }
            }
        }
    }

    /// Extract the frame (if the program point was reached)
    pub fn into_result(self) -> Result<Option<Frame>, VerifierError> {
        match self {
            FrameState::Bottom => Ok(None),
            FrameState::Concrete(frame) => Ok(Some(frame)),
            FrameState::Error(err) => Err(err),
        }
    }
}

fn constant_type(constant: &ConstantData) -> FrameType {
    match constant {
        ConstantData::String(_) => FrameType::object(BinaryName::STRING),
        ConstantData::Class(_) => FrameType::object(BinaryName::CLASS),
        ConstantData::Integer(_) => FrameType::int(),
        ConstantData::Float(_) => FrameType::float(),
        ConstantData::Long(_) => FrameType::long(),
        ConstantData::Double(_) => FrameType::double(),
        ConstantData::MethodHandle => FrameType::object(BinaryName::METHODHANDLE),
        ConstantData::MethodType(_) => FrameType::object(BinaryName::METHODTYPE),
        ConstantData::Dynamic(_) => FrameType::object(BinaryName::CLASS),
    }
}

fn conversion_source(insn: &Instruction) -> FrameType {
    match insn {
        Instruction::I2L | Instruction::I2F | Instruction::I2D => FrameType::int(),
        Instruction::L2I | Instruction::L2F | Instruction::L2D => FrameType::long(),
        Instruction::F2I | Instruction::F2L | Instruction::F2D => FrameType::float(),
        _ => FrameType::double(),
    }
}

fn render_return_type(return_type: Option<&FieldType>) -> String {
    match return_type {
        None => String::from("void"),
        Some(typ) => typ.to_string(),
    }
}
