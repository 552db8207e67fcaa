//! Lexer for MxLang
//!
//! Converts source code into a stream of tokens.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::Location;

/// The lexer state
pub struct Lexer {
    /// Source code as chars
    source: Vec<char>,
    /// Current position in source
    pos: usize,
    line: u32,
    column: u32,
    /// Location of the first char of the current token
    start: Location,
    /// Lexical errors, reported by the parser in source order
    errors: Vec<(Location, String)>,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            start: Location::new(1, 1),
            errors: Vec::new(),
        }
    }

    /// Get the current character without advancing
    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    /// Get the next character without advancing
    fn peek_next(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    /// Advance to the next character
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume `expected` if it is the next character
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.start)
    }

    fn error(&mut self, location: Location, message: impl Into<String>) {
        self.errors.push((location, message.into()));
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                // Line comment
                '/' if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                // Block comment, not nested
                '/' if self.peek_next() == Some('*') => {
                    let opened = self.location();
                    self.advance();
                    self.advance();
                    loop {
                        match (self.peek(), self.peek_next()) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => {
                                self.advance();
                            }
                            (None, _) => {
                                self.error(opened, "unterminated block comment");
                                break;
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let begin = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.source[begin..self.pos].iter().collect();
        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Ident(text));
        self.make_token(kind)
    }

    /// Read a decimal integer literal; range checks happen in the parser
    fn read_number(&mut self) -> Token {
        let mut value: i64 = 0;
        while let Some(c) = self.peek() {
            let Some(digit) = c.to_digit(10) else {
                break;
            };
            value = value.saturating_mul(10).saturating_add(i64::from(digit));
            self.advance();
        }
        self.make_token(TokenKind::IntLit(value))
    }

    /// Read a string literal
    fn read_string(&mut self) -> Token {
        self.advance(); // opening quote

        let mut value = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    let escape_at = self.location();
                    self.advance();
                    match self.advance() {
                        Some('n') => value.push('\n'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some('t') => value.push('\t'),
                        Some(other) => {
                            self.error(escape_at, format!("invalid escape sequence \"\\{}\"", other));
                            value.push(other);
                        }
                        None => {
                            self.error(self.start, "unterminated string literal");
                            break;
                        }
                    }
                }
                Some('\n') | None => {
                    self.error(self.start, "unterminated string literal");
                    break;
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        self.make_token(TokenKind::StringLit(value))
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.start = self.location();

        let Some(c) = self.peek() else {
            return Token::eof(self.start);
        };

        if c.is_ascii_alphabetic() || c == '_' {
            return self.read_identifier();
        }
        if c.is_ascii_digit() {
            return self.read_number();
        }
        if c == '"' {
            return self.read_string();
        }

        self.advance();
        let kind = match c {
            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                }
            }
            '*' => if self.eat('=') { TokenKind::StarEq } else { TokenKind::Star },
            '/' => if self.eat('=') { TokenKind::SlashEq } else { TokenKind::Slash },
            '%' => if self.eat('=') { TokenKind::PercentEq } else { TokenKind::Percent },
            '^' => if self.eat('=') { TokenKind::CaretEq } else { TokenKind::Caret },
            '=' => if self.eat('=') { TokenKind::EqEq } else { TokenKind::Eq },
            '!' => if self.eat('=') { TokenKind::Ne } else { TokenKind::Not },
            '<' => {
                if self.eat('<') {
                    if self.eat('=') { TokenKind::ShlEq } else { TokenKind::Shl }
                } else if self.eat('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat('>') {
                    if self.eat('>') {
                        if self.eat('=') { TokenKind::UShrEq } else { TokenKind::UShr }
                    } else if self.eat('=') {
                        TokenKind::ShrEq
                    } else {
                        TokenKind::Shr
                    }
                } else if self.eat('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.eat('&') {
                    TokenKind::AndAnd
                } else if self.eat('=') {
                    TokenKind::AndEq
                } else {
                    TokenKind::And
                }
            }
            '|' => {
                if self.eat('|') {
                    TokenKind::OrOr
                } else if self.eat('=') {
                    TokenKind::OrEq
                } else {
                    TokenKind::Or
                }
            }
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            _ => TokenKind::Unknown(c),
        };

        self.make_token(kind)
    }

    /// Tokenize the entire source and return all tokens
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Lexical errors found so far
    pub fn take_errors(&mut self) -> Vec<(Location, String)> {
        std::mem::take(&mut self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_tokens() {
        assert_eq!(
            kinds("int main() { }"),
            vec![
                TokenKind::Int,
                TokenKind::Ident("main".to_string()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            kinds(">>>= >>> >>= >> ++ += <<= &&"),
            vec![
                TokenKind::UShrEq,
                TokenKind::UShr,
                TokenKind::ShrEq,
                TokenKind::Shr,
                TokenKind::PlusPlus,
                TokenKind::PlusEq,
                TokenKind::ShlEq,
                TokenKind::AndAnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#""hello\n\"world\"""#),
            vec![TokenKind::StringLit("hello\n\"world\"".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_locations() {
        let tokens = Lexer::new("int x;\n  x = 1; // done\n/* a\n b */ y").tokenize();
        let locs: Vec<(u32, u32)> = tokens.iter().map(|t| (t.location.line, t.location.column)).collect();
        assert_eq!(locs, vec![(1, 1), (1, 5), (1, 6), (2, 3), (2, 5), (2, 7), (2, 8), (4, 7), (4, 8)]);
    }

    #[test]
    fn test_lexical_errors() {
        let mut lexer = Lexer::new("string s = \"abc\n; /* open");
        lexer.tokenize();
        let errors: Vec<String> = lexer.take_errors().into_iter().map(|(_, m)| m).collect();
        assert_eq!(errors, vec!["unterminated string literal", "unterminated block comment"]);
    }
}
