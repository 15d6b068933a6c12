/// This enum represents a single opcode.
/// Under the hood, it's just a byte.
/// This allows non opcode bytes (operands) to be inserted in bytecode streams.
///
/// Unless noted otherwise, operands are varints (see `common::number`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Push `null`.
    LoadNull = 0,
    /// Push `true`.
    LoadTrue,
    /// Push `false`.
    LoadFalse,
    /// Push an integer, operand is an 8-byte little-endian `i64`.
    LoadInteger,
    LoadInteger0,
    LoadInteger1,
    LoadInteger2,
    LoadInteger3,
    LoadInteger4,
    LoadInteger5,
    LoadInteger6,
    LoadInteger7,
    LoadInteger8,
    /// Push a float, operand is an 8-byte little-endian `f64`.
    LoadFloat,
    LoadFloat0,
    LoadFloat0_25,
    LoadFloat0_5,
    LoadFloat0_75,
    LoadFloat1,
    LoadFloat1_25,
    LoadFloat1_5,
    LoadFloat1_75,
    LoadFloat2,
    LoadFloat2_25,
    LoadFloat2_5,
    LoadFloat2_75,
    LoadFloat3,
    LoadFloat3_25,
    LoadFloat3_5,
    LoadFloat3_75,
    LoadFloat4,
    LoadFloat4_25,
    LoadFloat4_5,
    LoadFloat4_75,
    LoadFloat5,
    LoadFloat5_25,
    LoadFloat5_5,
    LoadFloat5_75,
    /// Push a string from the string pool, operand is the pool index.
    LoadString,
    /// Push a translatable string, operand is the translation id.
    LoadTranslatable,
    /// Pop a name, push the value bound to it (or `null`).
    LoadVariable,
    /// Pop a name, push the value of the constant bound to it (or `null`).
    LoadConstant,
    /// Pop a name and a value, bind the value to the name.
    StoreVariable,
    /// Pop a name and a value, bind the value to the name as a constant.
    StoreConstant,
    /// Pop a name, push whether the active scope itself binds it.
    HasArgument,
    /// Pop a name and a value, bind the value in the active scope itself,
    /// shadowing any outer binding.
    BindArgument,
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Equal,
    Greater,
    Lesser,
    NotLesser,
    NotGreater,
    PickChild,
    /// Coerce the topmost value to a boolean.
    ToBoolean,
    /// Enter a new lexical scope.
    Scope,
    /// Leave the current lexical scope.
    Leave,
    /// Jump to a label, operand is the label id.
    Branch,
    /// Pop a value, jump to a label if it is falsy.
    BranchIfFalse,
    /// Capture the active scope as a function entering at a label.
    Closure,
    /// Call a function with named parameters.
    Call,
    /// Return from a function or a script.
    Return,
    /// Call out to a native plugin with named parameters.
    Plugin,
    /// Dialogue shorthand, calls the dialogue plugin.
    Dialogue,
    /// Run another script, push an object of its exports.
    Load,
    /// Pop a name and a value, export the value under the name.
    Export,
    /// Pop a language tag and switch the active language.
    Language,
    /// Delete a value off the stack. Must always be last.
    Pop,
}

/// What follows an opcode in the code stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Varint,
    Integer,
    Float,
}

impl Opcode {
    /// Every opcode, indexed by its byte.
    pub const ALL: [Opcode; Opcode::Pop as usize + 1] = {
        use Opcode::*;
        [
            LoadNull, LoadTrue, LoadFalse,
            LoadInteger, LoadInteger0, LoadInteger1, LoadInteger2, LoadInteger3,
            LoadInteger4, LoadInteger5, LoadInteger6, LoadInteger7, LoadInteger8,
            LoadFloat, LoadFloat0, LoadFloat0_25, LoadFloat0_5, LoadFloat0_75,
            LoadFloat1, LoadFloat1_25, LoadFloat1_5, LoadFloat1_75,
            LoadFloat2, LoadFloat2_25, LoadFloat2_5, LoadFloat2_75,
            LoadFloat3, LoadFloat3_25, LoadFloat3_5, LoadFloat3_75,
            LoadFloat4, LoadFloat4_25, LoadFloat4_5, LoadFloat4_75,
            LoadFloat5, LoadFloat5_25, LoadFloat5_5, LoadFloat5_75,
            LoadString, LoadTranslatable,
            LoadVariable, LoadConstant, StoreVariable, StoreConstant, HasArgument, BindArgument,
            Add, Subtract, Multiply, Divide, Negate,
            Equal, Greater, Lesser, NotLesser, NotGreater, PickChild, ToBoolean,
            Scope, Leave, Branch, BranchIfFalse, Closure, Call, Return,
            Plugin, Dialogue, Load, Export, Language, Pop,
        ]
    };

    /// Convert a raw byte to an opcode,
    /// performing a bounds check first.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Opcode::ALL.get(byte as usize).copied()
    }

    /// The single-byte opcode for a small integer literal, if any.
    pub fn small_integer(n: i64) -> Option<Opcode> {
        if (0..=8).contains(&n) {
            Opcode::from_byte(Opcode::LoadInteger0 as u8 + n as u8)
        } else {
            None
        }
    }

    /// The single-byte opcode for a small float literal, if any.
    /// Covers `0.0..=5.75` in steps of `0.25`.
    pub fn small_float(f: f64) -> Option<Opcode> {
        let quarters = f * 4.0;
        let is_step = quarters.fract() == 0.0 && (0.0..=23.0).contains(&quarters);
        // `-0.0` must keep its sign, so it takes the long form
        if is_step && f.is_sign_positive() {
            Opcode::from_byte(Opcode::LoadFloat0 as u8 + quarters as u8)
        } else {
            None
        }
    }

    /// The value of a single-byte integer literal opcode.
    pub fn integer_value(self) -> Option<i64> {
        let byte = self as u8;
        if (Opcode::LoadInteger0 as u8..=Opcode::LoadInteger8 as u8).contains(&byte) {
            Some((byte - Opcode::LoadInteger0 as u8) as i64)
        } else {
            None
        }
    }

    /// The value of a single-byte float literal opcode.
    pub fn float_value(self) -> Option<f64> {
        let byte = self as u8;
        if (Opcode::LoadFloat0 as u8..=Opcode::LoadFloat5_75 as u8).contains(&byte) {
            Some((byte - Opcode::LoadFloat0 as u8) as f64 * 0.25)
        } else {
            None
        }
    }

    /// What follows this opcode in the code stream.
    pub fn operand(self) -> Operand {
        match self {
            Opcode::LoadInteger => Operand::Integer,
            Opcode::LoadFloat => Operand::Float,
            Opcode::LoadString
            | Opcode::LoadTranslatable
            | Opcode::Branch
            | Opcode::BranchIfFalse
            | Opcode::Closure => Operand::Varint,
            _ => Operand::None,
        }
    }
}
