//! Abstract Syntax Tree definitions for MxLang
//!
//! The parser leaves every `ty` and `symbol` slot empty; the semantic
//! analyzer fills them in and never touches anything else.

use crate::frontend::symbols::SymbolId;
use crate::types::Type;
use crate::utils::Location;

/// A complete program (compilation unit)
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub decls: Vec<Decl>,
}

/// Top-level declarations
#[derive(Debug, Clone)]
pub enum Decl {
    Class(ClassDecl),
    Function(FunctionDecl),
    Variable(VarDecl),
}

/// Class definition
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: Ident,
    pub fields: Vec<VarDecl>,
    pub methods: Vec<FunctionDecl>,
    pub constructors: Vec<FunctionDecl>,
    pub location: Location,
}

/// Function, method or constructor definition
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    /// `None` for constructors
    pub ret_type: Option<TypeNode>,
    pub name: Ident,
    pub params: Vec<Param>,
    pub body: Block,
    pub location: Location,
    pub symbol: Option<SymbolId>,
}

/// Function parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub ty: TypeNode,
    pub name: Ident,
    pub symbol: Option<SymbolId>,
}

/// `T a = 1, b;`
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub ty: TypeNode,
    pub declarators: Vec<Declarator>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: Ident,
    pub init: Option<Expr>,
    pub symbol: Option<SymbolId>,
}

/// A written type: base name plus array dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode {
    pub base: BaseType,
    pub dims: usize,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseType {
    Int,
    Bool,
    String,
    Void,
    Named(String),
}

/// Code block
#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub location: Location,
}

/// Statement
#[derive(Debug, Clone)]
pub enum Stmt {
    Block(Block),
    Var(VarDecl),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        location: Location,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        location: Location,
    },
    For {
        init: Option<ForInit>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
        location: Location,
    },
    Return {
        value: Option<Expr>,
        location: Location,
    },
    Break { location: Location },
    Continue { location: Location },
    Expr(Expr),
    /// Empty statement (;)
    Empty { location: Location },
}

#[derive(Debug, Clone)]
pub enum ForInit {
    Var(VarDecl),
    Expr(Expr),
}

/// Expression node with its analysis result
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, location: Location) -> Self {
        Self { kind, location, ty: None }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i64),
    BoolLit(bool),
    StringLit(String),
    Null,
    This,
    Ident {
        name: String,
        symbol: Option<SymbolId>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `target = value` or `target op= value`
    Assign {
        op: Option<BinOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Prefix {
        op: PrefixOp,
        operand: Box<Expr>,
    },
    Suffix {
        op: SuffixOp,
        operand: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// `f(args)`; inside a class `f` may be a method of `this`
    Call {
        name: Ident,
        args: Vec<Expr>,
        symbol: Option<SymbolId>,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: Ident,
        args: Vec<Expr>,
        symbol: Option<SymbolId>,
    },
    Member {
        object: Box<Expr>,
        field: Ident,
        symbol: Option<SymbolId>,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    /// `new A` or `new A(args)`; `symbol` is the constructor
    NewObject {
        class: TypeNode,
        args: Vec<Expr>,
        symbol: Option<SymbolId>,
    },
    /// `new T[n][m][]`; `elem.dims` is zero, `dims` counts every bracket pair
    NewArray {
        elem: TypeNode,
        lengths: Vec<Expr>,
        dims: usize,
    },
}

/// Identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub location: Location,
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::UShr => ">>>",
        }
    }

    /// `+ - * / %`
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod)
    }

    /// `& | ^ << >> >>>`
    pub fn is_bitwise(&self) -> bool {
        matches!(
            self,
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr | BinOp::UShr
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    /// ++x
    Inc,
    /// --x
    Dec,
    /// +x
    Plus,
    /// -x
    Neg,
    /// !x
    Not,
    /// ~x
    BitNot,
}

impl PrefixOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            PrefixOp::Inc => "++",
            PrefixOp::Dec => "--",
            PrefixOp::Plus => "+",
            PrefixOp::Neg => "-",
            PrefixOp::Not => "!",
            PrefixOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixOp {
    Inc,
    Dec,
}

impl SuffixOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            SuffixOp::Inc => "++",
            SuffixOp::Dec => "--",
        }
    }
}
