//! Parser for MxLang
//!
//! Recursive descent parser with Pratt parsing for expressions. Syntax
//! errors are recorded and the parser resynchronizes at the next statement
//! or declaration boundary, so one run reports several independent errors.

use thiserror::Error;

use crate::diagnostics::{ErrorRecorder, Phase};
use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::Location;

/// A syntax error; the parser records it and recovers
#[derive(Error, Debug, Clone)]
#[error("{message}")]
struct SyntaxError {
    message: String,
    location: Location,
}

type PResult<T> = std::result::Result<T, SyntaxError>;

/// The parser
pub struct Parser<'r> {
    tokens: Vec<Token>,
    pos: usize,
    recorder: &'r mut ErrorRecorder,
}

impl<'r> Parser<'r> {
    /// Create a new parser from a lexer; lexical errors are recorded right away
    pub fn new(mut lexer: Lexer, recorder: &'r mut ErrorRecorder) -> Self {
        let tokens = lexer.tokenize();
        for (location, message) in lexer.take_errors() {
            recorder.record(Phase::Parser, location, message);
        }
        Self { tokens, pos: 0, recorder }
    }

    // ==================== Helper Methods ====================

    fn current(&self) -> &Token {
        // tokenize() always ends with Eof, so the last token exists
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn expect(&mut self, expected: TokenKind) -> PResult<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&expected.describe()))
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        SyntaxError {
            message: format!("expected {}, found {}", expected, self.current_kind().describe()),
            location: self.current().location,
        }
    }

    fn report(&mut self, err: SyntaxError) {
        self.recorder.record(Phase::Parser, err.location, err.message);
    }

    /// Skip to just after the next `;`, or up to the closing `}` of the
    /// enclosing block
    fn recover_statement(&mut self) {
        loop {
            match self.current_kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace | TokenKind::Eof => return,
                TokenKind::LBrace => self.skip_braced(),
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip to just after the next top-level `;` or `}`
    fn recover_declaration(&mut self) {
        loop {
            match self.current_kind() {
                TokenKind::Semicolon | TokenKind::RBrace => {
                    self.advance();
                    return;
                }
                TokenKind::Eof => return,
                TokenKind::LBrace => {
                    self.skip_braced();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip a balanced `{ ... }` group
    fn skip_braced(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current_kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ==================== Declarations ====================

    /// Parse a complete program
    pub fn parse_program(&mut self) -> Program {
        let mut decls = Vec::new();

        while !self.is_at_end() {
            match self.parse_decl() {
                Ok(decl) => decls.push(decl),
                Err(err) => {
                    self.report(err);
                    self.recover_declaration();
                }
            }
        }

        Program { decls }
    }

    fn parse_decl(&mut self) -> PResult<Decl> {
        if self.check(&TokenKind::Class) {
            return Ok(Decl::Class(self.parse_class()?));
        }
        let ty = self.parse_type()?;
        let name = self.parse_ident()?;
        if self.check(&TokenKind::LParen) {
            Ok(Decl::Function(self.parse_function_rest(Some(ty), name)?))
        } else {
            Ok(Decl::Variable(self.parse_var_decl_rest(ty, name, true)?))
        }
    }

    fn parse_class(&mut self) -> PResult<ClassDecl> {
        let start = self.expect(TokenKind::Class)?.location;
        let name = self.parse_ident()?;
        self.expect(TokenKind::LBrace)?;

        let mut class = ClassDecl {
            name,
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            location: start,
        };

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if let Err(err) = self.parse_class_member(&mut class) {
                self.report(err);
                self.recover_statement();
            }
        }
        self.expect(TokenKind::RBrace)?;
        self.consume(&TokenKind::Semicolon);

        Ok(class)
    }

    fn parse_class_member(&mut self, class: &mut ClassDecl) -> PResult<()> {
        // Constructor: `Name(`
        if let TokenKind::Ident(name) = self.current_kind() {
            if matches!(self.peek_kind(1), TokenKind::LParen) {
                let is_own_name = *name == class.name.name;
                let ident = self.parse_ident()?;
                if !is_own_name {
                    return Err(SyntaxError {
                        message: format!(
                            "constructor name \"{}\" does not match class \"{}\"",
                            ident.name, class.name.name
                        ),
                        location: ident.location,
                    });
                }
                class.constructors.push(self.parse_function_rest(None, ident)?);
                return Ok(());
            }
        }

        let ty = self.parse_type()?;
        let name = self.parse_ident()?;
        if self.check(&TokenKind::LParen) {
            class.methods.push(self.parse_function_rest(Some(ty), name)?);
        } else {
            class.fields.push(self.parse_var_decl_rest(ty, name, false)?);
        }
        Ok(())
    }

    /// Parameters and body, after the function name
    fn parse_function_rest(&mut self, ret_type: Option<TypeNode>, name: Ident) -> PResult<FunctionDecl> {
        let location = ret_type.as_ref().map(|t| t.location).unwrap_or(name.location);
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            let ty = self.parse_type()?;
            let name = self.parse_ident()?;
            params.push(Param { ty, name, symbol: None });
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;

        Ok(FunctionDecl {
            ret_type,
            name,
            params,
            body,
            location,
            symbol: None,
        })
    }

    /// Declarators after the type and first name, through the `;`
    fn parse_var_decl_rest(&mut self, ty: TypeNode, first: Ident, allow_init: bool) -> PResult<VarDecl> {
        let location = ty.location;
        let mut declarators = Vec::new();
        let mut name = first;
        loop {
            let init = if self.check(&TokenKind::Eq) {
                if !allow_init {
                    return Err(SyntaxError {
                        message: format!("field \"{}\" cannot have an initializer", name.name),
                        location: self.current().location,
                    });
                }
                self.advance();
                Some(self.parse_expr()?)
            } else {
                None
            };
            declarators.push(Declarator { name, init, symbol: None });

            if !self.consume(&TokenKind::Comma) {
                break;
            }
            name = self.parse_ident()?;
        }
        self.expect(TokenKind::Semicolon)?;

        Ok(VarDecl { ty, declarators, location })
    }

    fn parse_ident(&mut self) -> PResult<Ident> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Ident { name, location: token.location })
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn parse_base_type(&mut self) -> PResult<(BaseType, Location)> {
        let token = self.current().clone();
        let base = match token.kind {
            TokenKind::Int => BaseType::Int,
            TokenKind::Bool => BaseType::Bool,
            TokenKind::String => BaseType::String,
            TokenKind::Void => BaseType::Void,
            TokenKind::Ident(name) => BaseType::Named(name),
            _ => return Err(self.unexpected("type")),
        };
        self.advance();
        Ok((base, token.location))
    }

    fn parse_type(&mut self) -> PResult<TypeNode> {
        let (base, location) = self.parse_base_type()?;
        let mut dims = 0;
        while self.check(&TokenKind::LBracket) {
            self.advance();
            self.expect(TokenKind::RBracket)?;
            dims += 1;
        }
        Ok(TypeNode { base, dims, location })
    }

    // ==================== Statements ====================

    fn parse_block(&mut self) -> PResult<Block> {
        let location = self.expect(TokenKind::LBrace)?.location;

        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    self.report(err);
                    self.recover_statement();
                }
            }
        }
        self.expect(TokenKind::RBrace)?;

        Ok(Block { stmts, location })
    }

    /// A declaration starts with a type followed by a name
    fn at_var_decl(&self) -> bool {
        match self.current_kind() {
            TokenKind::Int | TokenKind::Bool | TokenKind::String | TokenKind::Void => true,
            TokenKind::Ident(_) => matches!(
                (self.peek_kind(1), self.peek_kind(2)),
                (TokenKind::Ident(_), _) | (TokenKind::LBracket, TokenKind::RBracket)
            ),
            _ => false,
        }
    }

    fn parse_var_decl(&mut self) -> PResult<VarDecl> {
        let ty = self.parse_type()?;
        let name = self.parse_ident()?;
        self.parse_var_decl_rest(ty, name, true)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let location = self.current().location;
        match self.current_kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::If => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.consume(&TokenKind::Else) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If { cond, then_branch, else_branch, location })
            }
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While { cond, body, location })
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Return { value, location })
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Break { location })
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Continue { location })
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Empty { location })
            }
            _ if self.at_var_decl() => Ok(Stmt::Var(self.parse_var_decl()?)),
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let location = self.expect(TokenKind::For)?.location;
        self.expect(TokenKind::LParen)?;

        let init = if self.consume(&TokenKind::Semicolon) {
            None
        } else if self.at_var_decl() {
            // consumes the `;`
            Some(ForInit::Var(self.parse_var_decl()?))
        } else {
            let expr = self.parse_expr()?;
            self.expect(TokenKind::Semicolon)?;
            Some(ForInit::Expr(expr))
        };

        let cond = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon)?;

        let step = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen)?;

        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::For { init, cond, step, body, location })
    }

    // ==================== Expression Parsing (Pratt) ====================

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_expr_bp(0)
    }

    /// Parse expression with binding power (Pratt parsing)
    fn parse_expr_bp(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op_token = self.current().clone();
            let Some(bp) = op_token.kind.binary_precedence() else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.advance();
            let location = left.location;

            left = if op_token.kind == TokenKind::Question {
                let then_expr = self.parse_expr()?;
                self.expect(TokenKind::Colon)?;
                // Right-associative
                let else_expr = self.parse_expr_bp(bp)?;
                Expr::new(
                    ExprKind::Ternary {
                        cond: Box::new(left),
                        then_expr: Box::new(then_expr),
                        else_expr: Box::new(else_expr),
                    },
                    location,
                )
            } else if let Some(op) = Self::token_to_assign_op(&op_token.kind) {
                // Right-associative
                let value = self.parse_expr_bp(bp)?;
                Expr::new(
                    ExprKind::Assign { op, target: Box::new(left), value: Box::new(value) },
                    op_token.location,
                )
            } else {
                let op = Self::token_to_binop(&op_token.kind)
                    .ok_or_else(|| self.unexpected("binary operator"))?;
                let right = self.parse_expr_bp(bp + 1)?;
                Expr::new(
                    ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) },
                    op_token.location,
                )
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let token = self.current().clone();
        let op = match token.kind {
            TokenKind::PlusPlus => PrefixOp::Inc,
            TokenKind::MinusMinus => PrefixOp::Dec,
            TokenKind::Plus => PrefixOp::Plus,
            TokenKind::Minus => PrefixOp::Neg,
            TokenKind::Not => PrefixOp::Not,
            TokenKind::Tilde => PrefixOp::BitNot,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::new(ExprKind::Prefix { op, operand: Box::new(operand) }, token.location))
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.current().clone();
        let location = token.location;

        let kind = match token.kind {
            TokenKind::IntLit(n) => {
                self.advance();
                if n > i64::from(i32::MAX) {
                    self.recorder.record(
                        Phase::AstBuild,
                        location,
                        format!("integer literal {} is out of range", n),
                    );
                }
                ExprKind::IntLit(n)
            }
            TokenKind::StringLit(s) => {
                self.advance();
                ExprKind::StringLit(s)
            }
            TokenKind::True => {
                self.advance();
                ExprKind::BoolLit(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::BoolLit(false)
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::Null
            }
            TokenKind::This => {
                self.advance();
                ExprKind::This
            }
            TokenKind::Ident(_) => {
                let name = self.parse_ident()?;
                if self.check(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    ExprKind::Call { name, args, symbol: None }
                } else {
                    ExprKind::Ident { name: name.name, symbol: None }
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::New => return self.parse_new(),
            _ => return Err(self.unexpected("expression")),
        };

        Ok(Expr::new(kind, location))
    }

    /// `new T`, `new T(args)` or `new T[n]...[]`
    fn parse_new(&mut self) -> PResult<Expr> {
        let location = self.expect(TokenKind::New)?.location;
        let (base, type_location) = self.parse_base_type()?;
        let elem = TypeNode { base, dims: 0, location: type_location };

        if !self.check(&TokenKind::LBracket) {
            let args = if self.check(&TokenKind::LParen) { self.parse_args()? } else { Vec::new() };
            return Ok(Expr::new(ExprKind::NewObject { class: elem, args, symbol: None }, location));
        }

        let mut lengths = Vec::new();
        let mut dims = 0;
        while self.check(&TokenKind::LBracket) {
            let bracket = self.advance().location;
            dims += 1;
            if self.consume(&TokenKind::RBracket) {
                continue;
            }
            let length = self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            if lengths.len() + 1 < dims {
                self.recorder.record(
                    Phase::AstBuild,
                    bracket,
                    "array length cannot follow an unspecified dimension",
                );
            }
            lengths.push(length);
        }
        if lengths.is_empty() {
            self.recorder.record(Phase::AstBuild, location, "array creation requires a length");
        }

        Ok(Expr::new(ExprKind::NewArray { elem, lengths, dims }, location))
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            args.push(self.parse_expr()?);
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let location = self.current().location;
            if self.consume(&TokenKind::Dot) {
                let field = self.parse_ident()?;
                expr = if self.check(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    Expr::new(
                        ExprKind::MethodCall { receiver: Box::new(expr), method: field, args, symbol: None },
                        location,
                    )
                } else {
                    Expr::new(ExprKind::Member { object: Box::new(expr), field, symbol: None }, location)
                };
            } else if self.consume(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(TokenKind::RBracket)?;
                expr = Expr::new(ExprKind::Index { array: Box::new(expr), index: Box::new(index) }, location);
            } else if self.consume(&TokenKind::PlusPlus) {
                expr = Expr::new(ExprKind::Suffix { op: SuffixOp::Inc, operand: Box::new(expr) }, location);
            } else if self.consume(&TokenKind::MinusMinus) {
                expr = Expr::new(ExprKind::Suffix { op: SuffixOp::Dec, operand: Box::new(expr) }, location);
            } else if self.check(&TokenKind::LParen) {
                return Err(SyntaxError {
                    message: "expression is not callable".to_string(),
                    location,
                });
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn token_to_binop(kind: &TokenKind) -> Option<BinOp> {
        let op = match kind {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::Ne => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::AndAnd => BinOp::And,
            TokenKind::OrOr => BinOp::Or,
            TokenKind::And => BinOp::BitAnd,
            TokenKind::Or => BinOp::BitOr,
            TokenKind::Caret => BinOp::BitXor,
            TokenKind::Shl => BinOp::Shl,
            TokenKind::Shr => BinOp::Shr,
            TokenKind::UShr => BinOp::UShr,
            _ => return None,
        };
        Some(op)
    }

    /// `Some(None)` for plain `=`, `Some(Some(op))` for compound assignment
    fn token_to_assign_op(kind: &TokenKind) -> Option<Option<BinOp>> {
        let op = match kind {
            TokenKind::Eq => None,
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            TokenKind::PercentEq => Some(BinOp::Mod),
            TokenKind::AndEq => Some(BinOp::BitAnd),
            TokenKind::OrEq => Some(BinOp::BitOr),
            TokenKind::CaretEq => Some(BinOp::BitXor),
            TokenKind::ShlEq => Some(BinOp::Shl),
            TokenKind::ShrEq => Some(BinOp::Shr),
            TokenKind::UShrEq => Some(BinOp::UShr),
            _ => return None,
        };
        Some(op)
    }
}

/// Parse `source` into a program, recording syntax errors
pub fn parse_source(source: &str, recorder: &mut ErrorRecorder) -> Program {
    let mut parser = Parser::new(Lexer::new(source), recorder);
    parser.parse_program()
}
