//! Token definitions for MxLang

use crate::utils::Location;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, location: Location) -> Self {
        Self { kind, location }
    }

    pub fn eof(location: Location) -> Self {
        Self { kind: TokenKind::Eof, location }
    }
}

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ============ Keywords ============
    /// int
    Int,
    /// bool
    Bool,
    /// string
    String,
    /// void
    Void,
    /// null
    Null,
    /// true
    True,
    /// false
    False,
    /// if
    If,
    /// else
    Else,
    /// for
    For,
    /// while
    While,
    /// break
    Break,
    /// continue
    Continue,
    /// return
    Return,
    /// new
    New,
    /// class
    Class,
    /// this
    This,

    // ============ Identifiers and Literals ============
    /// Identifier (variable name, function name, class name)
    Ident(String),
    /// Integer literal
    IntLit(i64),
    /// String literal, escapes already decoded
    StringLit(String),

    // ============ Operators ============
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// ++
    PlusPlus,
    /// --
    MinusMinus,
    /// =
    Eq,
    /// ==
    EqEq,
    /// !=
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
    /// &&
    AndAnd,
    /// ||
    OrOr,
    /// !
    Not,
    /// &
    And,
    /// |
    Or,
    /// ^
    Caret,
    /// ~
    Tilde,
    /// <<
    Shl,
    /// >>
    Shr,
    /// >>>
    UShr,
    /// +=
    PlusEq,
    /// -=
    MinusEq,
    /// *=
    StarEq,
    /// /=
    SlashEq,
    /// %=
    PercentEq,
    /// &=
    AndEq,
    /// |=
    OrEq,
    /// ^=
    CaretEq,
    /// <<=
    ShlEq,
    /// >>=
    ShrEq,
    /// >>>=
    UShrEq,
    /// ?
    Question,
    /// :
    Colon,
    /// .
    Dot,

    // ============ Delimiters ============
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// ,
    Comma,
    /// ;
    Semicolon,

    // ============ Special ============
    /// End of file
    Eof,
    /// Unknown/invalid character
    Unknown(char),
}

impl TokenKind {
    /// Try to convert an identifier to a keyword
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "int" => Some(TokenKind::Int),
            "bool" => Some(TokenKind::Bool),
            "string" => Some(TokenKind::String),
            "void" => Some(TokenKind::Void),
            "null" => Some(TokenKind::Null),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "for" => Some(TokenKind::For),
            "while" => Some(TokenKind::While),
            "break" => Some(TokenKind::Break),
            "continue" => Some(TokenKind::Continue),
            "return" => Some(TokenKind::Return),
            "new" => Some(TokenKind::New),
            "class" => Some(TokenKind::Class),
            "this" => Some(TokenKind::This),
            _ => None,
        }
    }

    /// Tokens that can start a type
    pub fn starts_type(&self) -> bool {
        matches!(
            self,
            TokenKind::Int | TokenKind::Bool | TokenKind::String | TokenKind::Void | TokenKind::Ident(_)
        )
    }

    /// Get the precedence of a binary operator (for Pratt parsing)
    /// Returns None if not a binary operator
    pub fn binary_precedence(&self) -> Option<u8> {
        match self {
            // Assignment (lowest)
            TokenKind::Eq
            | TokenKind::PlusEq
            | TokenKind::MinusEq
            | TokenKind::StarEq
            | TokenKind::SlashEq
            | TokenKind::PercentEq
            | TokenKind::AndEq
            | TokenKind::OrEq
            | TokenKind::CaretEq
            | TokenKind::ShlEq
            | TokenKind::ShrEq
            | TokenKind::UShrEq => Some(1),

            // Conditional (?:)
            TokenKind::Question => Some(2),

            // Logical OR
            TokenKind::OrOr => Some(3),

            // Logical AND
            TokenKind::AndAnd => Some(4),

            // Bitwise OR
            TokenKind::Or => Some(5),

            // Bitwise XOR
            TokenKind::Caret => Some(6),

            // Bitwise AND
            TokenKind::And => Some(7),

            // Equality
            TokenKind::EqEq | TokenKind::Ne => Some(8),

            // Comparison
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => Some(9),

            // Shift
            TokenKind::Shl | TokenKind::Shr | TokenKind::UShr => Some(10),

            // Additive
            TokenKind::Plus | TokenKind::Minus => Some(11),

            // Multiplicative (highest for binary)
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(12),

            _ => None,
        }
    }

    /// Text of the token as it appears in source, for diagnostics
    pub fn describe(&self) -> String {
        let s = match self {
            TokenKind::Ident(name) => return format!("identifier \"{}\"", name),
            TokenKind::IntLit(n) => return format!("integer {}", n),
            TokenKind::StringLit(_) => return "string literal".to_string(),
            TokenKind::Unknown(c) => return format!("\"{}\"", c),
            TokenKind::Eof => return "end of file".to_string(),
            TokenKind::Int => "int",
            TokenKind::Bool => "bool",
            TokenKind::String => "string",
            TokenKind::Void => "void",
            TokenKind::Null => "null",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::While => "while",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Return => "return",
            TokenKind::New => "new",
            TokenKind::Class => "class",
            TokenKind::This => "this",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Eq => "=",
            TokenKind::EqEq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Not => "!",
            TokenKind::And => "&",
            TokenKind::Or => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::Shl => "<<",
            TokenKind::Shr => ">>",
            TokenKind::UShr => ">>>",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::AndEq => "&=",
            TokenKind::OrEq => "|=",
            TokenKind::CaretEq => "^=",
            TokenKind::ShlEq => "<<=",
            TokenKind::ShrEq => ">>=",
            TokenKind::UShrEq => ">>>=",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
        };
        format!("\"{}\"", s)
    }
}
