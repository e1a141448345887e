//! This module contains the AST of JVM bytecode, as far as frames are concerned. The
//! representation is slightly different from the usual presentation:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches.
//!
//!   - Constant pool indices are replaced with the constants they point to
//!
//!   - `jsr`/`ret` are collapsed into one instruction, which never verifies
//!

use crate::jvm::verifier::AllocationSite;
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantData), // covers both `ldc` and `ldc_w`
    Ldc2(ConstantData),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    InvokeDynamic(InvokeDynamicRef),
    New(AllocationSite), // the class is recorded in the allocation site table of the method
    NewArray(BaseType),
    ANewArray(RefType),
    MultiANewArray(RefType, u8), // array type and number of dimensions to pop
    ArrayLength,
    CheckCast(RefType),
    InstanceOf(RefType),
    MonitorEnter,
    MonitorExit,
    JsrRet(u16), // `jsr`, `jsr_w`, and `ret`, which are not supported
}

/// Loadable constants
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantData {
    String(String),
    Class(RefType),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    MethodHandle,
    MethodType(MethodDescriptor),

    /// Dynamically-computed constant, of the given declared type
    ///
    /// Frames only ever see these as `java/lang/Class` values.
    Dynamic(FieldType),
}

/// Reference to a field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

/// Reference to a method
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

impl MethodRef {
    pub fn is_init(&self) -> bool {
        self.name.is_init()
    }
}

/// Call site of an `invokedynamic`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InvokeDynamicRef {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

/// Block-ending JVM bytecode instruction
///
/// The type parameters let us abstract over the representation of
///
///   * __jump targets__: used in all branch instructions which jump
///   * __fallthough targets__: used in all instructions that fall through
///
/// While a block is being built, the fallthrough target is unit (it is whatever block gets placed
/// next). Once the block is closed, both become labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl, LblNext> {
    If(OrdComparison, Lbl, LblNext), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl, LblNext), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl, LblNext),  // covers `if_acmpeq`, `if_acmpne`
    Goto(Lbl),                           // covers `goto` and `goto_w`
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
    IfNull(EqComparison, Lbl, LblNext), // covers `ifnull`, `ifnonnull`

    /// This is a synthetic marker used to explicitly end a block which just falls through to the
    /// next block. In the JVM, this is implicit when a block ends without a jump. Making it
    /// explicit allows us to enforce that all blocks end in a branch instruction.
    FallThrough(LblNext),
}

impl<Lbl: Copy, LblNext: Copy> BranchInstruction<Lbl, LblNext> {
    /// If the instruction can fall through to the next block, get that next block
    pub fn fallthrough_target(&self) -> Option<LblNext> {
        match self {
            BranchInstruction::Goto(_)
            | BranchInstruction::TableSwitch { .. }
            | BranchInstruction::LookupSwitch { .. }
            | BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => None,

            BranchInstruction::If(_, _, lbl)
            | BranchInstruction::IfICmp(_, _, lbl)
            | BranchInstruction::IfACmp(_, _, lbl)
            | BranchInstruction::IfNull(_, _, lbl)
            | BranchInstruction::FallThrough(lbl) => Some(*lbl),
        }
    }

    /// If the instruction can jump to other blocks (non-fallthrough), get those blocks
    pub fn jump_targets(&self) -> Vec<Lbl> {
        match self {
            BranchInstruction::If(_, lbl, _)
            | BranchInstruction::IfICmp(_, lbl, _)
            | BranchInstruction::IfACmp(_, lbl, _)
            | BranchInstruction::IfNull(_, lbl, _)
            | BranchInstruction::Goto(lbl) => vec![*lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                ts
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                ts
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow
            | BranchInstruction::FallThrough(_) => vec![],
        }
    }

    pub fn map_labels<Lbl2, LblNext2>(
        &self,
        map_label: impl Fn(&Lbl) -> Lbl2,
        map_next_label: impl FnOnce(&LblNext) -> LblNext2,
    ) -> BranchInstruction<Lbl2, LblNext2> {
        use BranchInstruction::*;

        match self {
            If(op, lbl, next) => If(*op, map_label(lbl), map_next_label(next)),
            IfICmp(op, lbl, next) => IfICmp(*op, map_label(lbl), map_next_label(next)),
            IfACmp(op, lbl, next) => IfACmp(*op, map_label(lbl), map_next_label(next)),
            Goto(lbl) => Goto(map_label(lbl)),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(default),
                low: *low,
                targets: targets.iter().map(&map_label).collect(),
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(default),
                targets: targets
                    .iter()
                    .map(|(key, lbl)| (*key, map_label(lbl)))
                    .collect(),
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
            IfNull(op, lbl, next) => IfNull(*op, map_label(lbl), map_next_label(next)),
            FallThrough(next) => FallThrough(map_next_label(next)),
        }
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because it doesn't refer to a method.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::SynLabel;

    #[test]
    fn branch_targets() {
        let l1 = SynLabel::START.next();
        let l2 = l1.next();
        let l3 = l2.next();

        let insn: BranchInstruction<SynLabel, SynLabel> =
            BranchInstruction::If(OrdComparison::EQ, l1, l2);
        assert_eq!(insn.jump_targets(), vec![l1]);
        assert_eq!(insn.fallthrough_target(), Some(l2));

        let insn: BranchInstruction<SynLabel, SynLabel> = BranchInstruction::LookupSwitch {
            default: l1,
            targets: vec![(0, l2), (10, l3)],
        };
        assert_eq!(insn.jump_targets(), vec![l1, l2, l3]);
        assert_eq!(insn.fallthrough_target(), None);

        let insn: BranchInstruction<SynLabel, ()> = BranchInstruction::FallThrough(());
        assert_eq!(insn.map_labels(|l| *l, |()| l3).fallthrough_target(), Some(l3));
    }
}
