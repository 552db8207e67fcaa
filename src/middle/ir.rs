//! Mx IR definitions
//!
//! Three-address code IR. Registers are defined once per function; mutable
//! variables live in `alloca` slots and are accessed through `load`/`store`.

use std::collections::HashSet;
use std::fmt;

use crate::utils::{Error, Result};

/// IR Struct definition (object layout of a class)
#[derive(Debug, Clone)]
pub struct IRStruct {
    pub name: String,
    pub fields: Vec<(String, IRType)>,
}

/// Global variable
#[derive(Debug, Clone)]
pub struct IRGlobal {
    pub name: String,
    pub ty: IRType,
    /// Constant initializer; `None` is zero-initialized
    pub init: Option<Constant>,
}

/// IR Module - contains all functions
#[derive(Debug, Clone)]
pub struct IRModule {
    pub name: String,
    pub structs: Vec<IRStruct>,
    pub globals: Vec<IRGlobal>,
    pub externs: Vec<IRExtern>,
    pub functions: Vec<IRFunction>,
}

/// External function declaration
#[derive(Debug, Clone)]
pub struct IRExtern {
    pub name: String,
    pub params: Vec<IRType>,
    pub ret_type: IRType,
}

impl IRModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            structs: Vec::new(),
            globals: Vec::new(),
            externs: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn add_struct(&mut self, name: &str, fields: Vec<(String, IRType)>) {
        self.structs.push(IRStruct {
            name: name.to_string(),
            fields,
        });
    }

    pub fn add_extern(&mut self, name: &str, params: Vec<IRType>, ret_type: IRType) {
        self.externs.push(IRExtern {
            name: name.to_string(),
            params,
            ret_type,
        });
    }

    pub fn function(&self, name: &str) -> Option<&IRFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Verify every function of the module and that function names are unique
    pub fn verify(&self) -> Result<()> {
        let mut names: HashSet<&str> = self.externs.iter().map(|e| e.name.as_str()).collect();
        for func in &self.functions {
            if !names.insert(func.name.as_str()) {
                return Err(Error::internal(format!("function \"{}\" is defined more than once", func.name)));
            }
            func.verify()?;
        }
        Ok(())
    }
}

/// IR Function
#[derive(Debug, Clone)]
pub struct IRFunction {
    pub name: String,
    pub params: Vec<(String, IRType)>,
    pub ret_type: IRType,
    pub blocks: Vec<BasicBlock>,
    pub entry_block: BlockId,
}

impl IRFunction {
    pub fn new(name: &str, params: Vec<(String, IRType)>, ret_type: IRType) -> Self {
        Self {
            name: name.to_string(),
            params,
            ret_type,
            blocks: Vec::new(),
            entry_block: BlockId(0),
        }
    }

    pub fn add_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(id, label));
        id
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.0)
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0)
    }

    pub fn block_by_label(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.label == label)
    }

    /// Check structural invariants: every block is terminated, every jump
    /// target exists, every register is defined once
    pub fn verify(&self) -> Result<()> {
        let mut defined = HashSet::new();
        for block in &self.blocks {
            let Some(term) = &block.terminator else {
                return Err(Error::internal(format!(
                    "block \"{}\" of \"{}\" has no terminator",
                    block.label, self.name
                )));
            };
            for target in term.targets() {
                if self.block(target).is_none() {
                    return Err(Error::internal(format!(
                        "block \"{}\" of \"{}\" jumps to a missing block",
                        block.label, self.name
                    )));
                }
            }
            for dest in block.instructions.iter().filter_map(Instruction::dest) {
                if !defined.insert(dest) {
                    return Err(Error::internal(format!(
                        "register {} defined twice in \"{}\"",
                        dest, self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Basic Block - a sequence of instructions with single entry/exit
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(id: BlockId, label: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
            instructions: Vec::new(),
            terminator: None,
        }
    }

    pub fn push(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    pub fn set_terminator(&mut self, term: Terminator) {
        self.terminator = Some(term);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }
}

/// Block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// Virtual register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(pub usize);

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// IR Instruction (non-terminating)
#[derive(Debug, Clone)]
pub enum Instruction {
    /// dest = left op right
    BinOp { dest: Register, op: BinOp, left: Value, right: Value },

    /// dest = op value
    UnaryOp { dest: Register, op: UnaryOp, value: Value },

    /// dest = func(args...)
    Call { dest: Option<Register>, func: String, args: Vec<Value> },

    /// dest = alloca type
    Alloca { dest: Register, ty: IRType },

    /// dest = load ptr
    Load { dest: Register, ptr: Value, ty: IRType },

    /// store value, ptr
    Store { ptr: Value, value: Value },

    /// dest = address of element `index` of array `ptr`
    GetElementPtr { dest: Register, ptr: Value, index: Value, elem_ty: IRType },

    /// dest = address of field `index` of `object`
    FieldPtr { dest: Register, object: Value, class: String, index: usize },

    /// dest = phi [(val1, block1), (val2, block2), ...]
    Phi { dest: Register, ty: IRType, incoming: Vec<(Value, BlockId)> },

    /// dest = fresh object of `class`, fields zeroed
    NewObject { dest: Register, class: String },

    /// dest = fresh array of `length` elements, zeroed
    NewArray { dest: Register, elem_ty: IRType, length: Value },

    /// dest = number of elements of `array`
    ArrayLength { dest: Register, array: Value },
}

impl Instruction {
    /// Register defined by this instruction
    pub fn dest(&self) -> Option<Register> {
        match self {
            Instruction::BinOp { dest, .. }
            | Instruction::UnaryOp { dest, .. }
            | Instruction::Alloca { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::GetElementPtr { dest, .. }
            | Instruction::FieldPtr { dest, .. }
            | Instruction::Phi { dest, .. }
            | Instruction::NewObject { dest, .. }
            | Instruction::NewArray { dest, .. }
            | Instruction::ArrayLength { dest, .. } => Some(*dest),
            Instruction::Call { dest, .. } => *dest,
            Instruction::Store { .. } => None,
        }
    }
}

/// Block terminator
#[derive(Debug, Clone)]
pub enum Terminator {
    /// return value
    Return { value: Option<Value> },

    /// br target
    Jump { target: BlockId },

    /// br cond, then_target, else_target
    Branch { cond: Value, then_target: BlockId, else_target: BlockId },
}

impl Terminator {
    /// Successor blocks
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            Terminator::Return { .. } => Vec::new(),
            Terminator::Jump { target } => vec![*target],
            Terminator::Branch { then_target, else_target, .. } => vec![*then_target, *else_target],
        }
    }
}

/// IR Value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Register(Register),
    Constant(Constant),
    Parameter(usize),
    /// Address of a global variable
    Global(String),
    /// Result of an expression of type void
    Unit,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Register(r) => write!(f, "{}", r),
            Value::Constant(c) => write!(f, "{}", c),
            Value::Parameter(i) => write!(f, "%arg{}", i),
            Value::Global(name) => write!(f, "@{}", name),
            Value::Unit => write!(f, "void"),
        }
    }
}

/// Constant value
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    String(String),
    Null,
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::String(s) => write!(f, "c\"{}\\00\"", escape_bytes(s)),
            Constant::Null => write!(f, "null"),
        }
    }
}

/// Printable ASCII other than `"` and `\` as is, every other byte as `\XX`
fn escape_bytes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'"' | b'\\' => out.push_str(&format!("\\{:02X}", byte)),
            0x20..=0x7e => out.push(char::from(byte)),
            _ => out.push_str(&format!("\\{:02X}", byte)),
        }
    }
    out
}

/// Binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod,
    // Comparison
    Eq, Ne, Lt, Le, Gt, Ge,
    // Bitwise
    And, Or, Xor, Shl, Shr, UShr,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "sdiv",
            BinOp::Mod => "srem",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "slt",
            BinOp::Le => "sle",
            BinOp::Gt => "sgt",
            BinOp::Ge => "sge",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "ashr",
            BinOp::UShr => "lshr",
        };
        write!(f, "{}", s)
    }
}

/// Unary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
            UnaryOp::BitNot => "bitnot",
        };
        write!(f, "{}", s)
    }
}

/// IR Type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IRType {
    Void,
    Bool,
    I8,
    I32,
    Ptr(Box<IRType>),
    Struct(String),
}

impl IRType {
    pub fn ptr_to(inner: IRType) -> IRType {
        IRType::Ptr(Box::new(inner))
    }
}

impl fmt::Display for IRType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IRType::Void => write!(f, "void"),
            IRType::Bool => write!(f, "i1"),
            IRType::I8 => write!(f, "i8"),
            IRType::I32 => write!(f, "i32"),
            IRType::Ptr(inner) => write!(f, "{}*", inner),
            IRType::Struct(name) => write!(f, "%{}", name),
        }
    }
}
