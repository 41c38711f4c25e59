//! Lexer for the managed language
//!
//! Converts source text into a stream of tokens. Semicolons are inserted at
//! line ends after tokens that can end a statement, so the parser only ever
//! sees explicit statement terminators.

use super::ast::SourcePos;

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    String(String),
    Char(char),
    Ident(String),

    // Operators and punctuation
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    Percent,    // %
    Amp,        // &
    Pipe,       // |
    Caret,      // ^
    LtLt,       // <<
    GtGt,       // >>
    AmpCaret,   // &^
    AmpAmp,     // &&
    PipePipe,   // ||
    Arrow,      // <-
    PlusPlus,   // ++
    MinusMinus, // --

    EqEq,  // ==
    BangEq, // !=
    Lt,    // <
    LtEq,  // <=
    Gt,    // >
    GtEq,  // >=
    Bang,  // !
    Tilde, // ~

    Eq,       // =
    ColonEq,  // :=
    Ellipsis, // ...

    // Compound assignment
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    LtLtEq,
    GtGtEq,
    AmpCaretEq,

    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    LBrace,    // {
    RBrace,    // }
    Comma,     // ,
    Dot,       // .
    Colon,     // :
    Semicolon, // ; (explicit or inserted)

    // Keywords
    Break,
    Case,
    Chan,
    Const,
    Continue,
    Default,
    Defer,
    Else,
    Fallthrough,
    For,
    Func,
    Go,
    Goto,
    If,
    Import,
    Interface,
    Map,
    Package,
    Range,
    Return,
    Select,
    Struct,
    Switch,
    Type,
    Var,

    // Special
    Eof,
    Error(String),
}

impl Token {
    /// Whether a newline after this token ends the statement
    fn ends_statement(&self) -> bool {
        matches!(
            self,
            Token::Int(_)
                | Token::Float(_)
                | Token::String(_)
                | Token::Char(_)
                | Token::Ident(_)
                | Token::Break
                | Token::Continue
                | Token::Fallthrough
                | Token::Return
                | Token::PlusPlus
                | Token::MinusMinus
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
        )
    }
}

/// Lexer for source code
#[derive(Clone)]
pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    /// Start of the most recently returned token
    token_start: SourcePos,
    /// A newline here should produce a semicolon
    insert_semi: bool,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            token_start: SourcePos {
                offset: 0,
                line: 1,
                column: 1,
            },
            insert_semi: false,
        }
    }

    /// Get the current source position
    pub fn position(&self) -> SourcePos {
        SourcePos {
            offset: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    /// Position of the token last returned by `next_token`
    pub fn token_pos(&self) -> SourcePos {
        self.token_start
    }

    /// Peek at the current character without consuming it
    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    /// Peek at the next character
    fn peek_next(&self) -> Option<u8> {
        self.source.get(self.pos + 1).copied()
    }

    /// Peek at the current character as a full code point
    fn peek_char(&self) -> Option<char> {
        let rest = self.source.get(self.pos..)?;
        let len = match rest.first()? {
            b if *b < 0x80 => 1,
            b if *b >= 0xF0 => 4,
            b if *b >= 0xE0 => 3,
            _ => 2,
        };
        std::str::from_utf8(rest.get(..len)?).ok()?.chars().next()
    }

    /// Consume the current character
    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Skip whitespace and comments
    ///
    /// Returns true if a newline was crossed while a semicolon was owed.
    fn skip_whitespace(&mut self) -> bool {
        loop {
            match self.peek() {
                Some(b'\n') if self.insert_semi => return true,
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_next() == Some(b'/') => {
                    // Line comment, stop before the newline
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_next() == Some(b'*') => {
                    // Block comment
                    self.advance(); // /
                    self.advance(); // *
                    let mut crossed_line = false;
                    while let Some(c) = self.advance() {
                        if c == b'\n' {
                            crossed_line = true;
                        }
                        if c == b'*' && self.peek() == Some(b'/') {
                            self.advance();
                            break;
                        }
                    }
                    if crossed_line && self.insert_semi {
                        return true;
                    }
                }
                _ => return false,
            }
        }
    }

    /// Read the next token
    pub fn next_token(&mut self) -> Token {
        let owed_semi = self.skip_whitespace();
        self.token_start = self.position();

        if owed_semi || (self.peek().is_none() && self.insert_semi) {
            self.insert_semi = false;
            return Token::Semicolon;
        }

        let token = self.scan();
        self.insert_semi = token.ends_statement();
        token
    }

    fn scan(&mut self) -> Token {
        let Some(c) = self.peek() else {
            return Token::Eof;
        };

        // Identifiers and keywords
        if c == b'_' || self.peek_char().is_some_and(char::is_alphabetic) {
            return self.read_identifier();
        }

        // Numbers
        if c.is_ascii_digit() || (c == b'.' && self.peek_next().is_some_and(|n| n.is_ascii_digit())) {
            return self.read_number();
        }

        // Strings
        if c == b'"' {
            return self.read_string();
        }
        if c == b'`' {
            return self.read_raw_string();
        }
        if c == b'\'' {
            return self.read_char();
        }

        // Operators and punctuation
        self.advance();
        match c {
            b'+' => match self.peek() {
                Some(b'+') => { self.advance(); Token::PlusPlus }
                Some(b'=') => { self.advance(); Token::PlusEq }
                _ => Token::Plus
            }
            b'-' => match self.peek() {
                Some(b'-') => { self.advance(); Token::MinusMinus }
                Some(b'=') => { self.advance(); Token::MinusEq }
                _ => Token::Minus
            }
            b'*' => self.with_eq(Token::Star, Token::StarEq),
            b'/' => self.with_eq(Token::Slash, Token::SlashEq),
            b'%' => self.with_eq(Token::Percent, Token::PercentEq),
            b'^' => self.with_eq(Token::Caret, Token::CaretEq),
            b'=' => self.with_eq(Token::Eq, Token::EqEq),
            b'!' => self.with_eq(Token::Bang, Token::BangEq),
            b':' => self.with_eq(Token::Colon, Token::ColonEq),
            b'<' => match self.peek() {
                Some(b'<') => {
                    self.advance();
                    self.with_eq(Token::LtLt, Token::LtLtEq)
                }
                Some(b'-') => { self.advance(); Token::Arrow }
                Some(b'=') => { self.advance(); Token::LtEq }
                _ => Token::Lt
            }
            b'>' => match self.peek() {
                Some(b'>') => {
                    self.advance();
                    self.with_eq(Token::GtGt, Token::GtGtEq)
                }
                Some(b'=') => { self.advance(); Token::GtEq }
                _ => Token::Gt
            }
            b'&' => match self.peek() {
                Some(b'&') => { self.advance(); Token::AmpAmp }
                Some(b'^') => {
                    self.advance();
                    self.with_eq(Token::AmpCaret, Token::AmpCaretEq)
                }
                Some(b'=') => { self.advance(); Token::AmpEq }
                _ => Token::Amp
            }
            b'|' => match self.peek() {
                Some(b'|') => { self.advance(); Token::PipePipe }
                Some(b'=') => { self.advance(); Token::PipeEq }
                _ => Token::Pipe
            }
            b'.' if self.peek() == Some(b'.') && self.peek_next() == Some(b'.') => {
                self.advance();
                self.advance();
                Token::Ellipsis
            }
            b'.' => Token::Dot,
            b',' => Token::Comma,
            b';' => Token::Semicolon,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'[' => Token::LBracket,
            b']' => Token::RBracket,
            b'{' => Token::LBrace,
            b'}' => Token::RBrace,
            b'~' => Token::Tilde,
            _ => Token::Error(format!("Unexpected character: {}", c as char))
        }
    }

    /// Return `with` if the next character is `=`, else `plain`
    fn with_eq(&mut self, plain: Token, with: Token) -> Token {
        if self.peek() == Some(b'=') {
            self.advance();
            with
        } else {
            plain
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let start = self.pos;

        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                for _ in 0..c.len_utf8() {
                    self.advance();
                }
            } else {
                break;
            }
        }

        let ident = std::str::from_utf8(&self.source[start..self.pos])
            .unwrap_or("")
            .to_string();

        // Check for keywords
        match ident.as_str() {
            "break" => Token::Break,
            "case" => Token::Case,
            "chan" => Token::Chan,
            "const" => Token::Const,
            "continue" => Token::Continue,
            "default" => Token::Default,
            "defer" => Token::Defer,
            "else" => Token::Else,
            "fallthrough" => Token::Fallthrough,
            "for" => Token::For,
            "func" => Token::Func,
            "go" => Token::Go,
            "goto" => Token::Goto,
            "if" => Token::If,
            "import" => Token::Import,
            "interface" => Token::Interface,
            "map" => Token::Map,
            "package" => Token::Package,
            "range" => Token::Range,
            "return" => Token::Return,
            "select" => Token::Select,
            "struct" => Token::Struct,
            "switch" => Token::Switch,
            "type" => Token::Type,
            "var" => Token::Var,
            _ => Token::Ident(ident)
        }
    }

    /// Read a number literal
    fn read_number(&mut self) -> Token {
        let start = self.pos;
        let mut is_float = false;

        // Hex integers
        if self.peek() == Some(b'0') && matches!(self.peek_next(), Some(b'x' | b'X')) {
            self.advance();
            self.advance();
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit() || c == b'_') {
                self.advance();
            }
            let digits: String = std::str::from_utf8(&self.source[digits_start..self.pos])
                .unwrap_or("")
                .chars()
                .filter(|&c| c != '_')
                .collect();
            return match i64::from_str_radix(&digits, 16) {
                Ok(n) => Token::Int(n),
                Err(_) => Token::Error(format!("Invalid number: 0x{}", digits)),
            };
        }

        // Integer part
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
            self.advance();
        }

        // Decimal part
        if self.peek() == Some(b'.') && self.peek_next() != Some(b'.') {
            is_float = true;
            self.advance(); // .
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent part
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let num_str: String = std::str::from_utf8(&self.source[start..self.pos])
            .unwrap_or("0")
            .chars()
            .filter(|&c| c != '_')
            .collect();
        if is_float {
            match num_str.parse::<f64>() {
                Ok(n) => Token::Float(n),
                Err(_) => Token::Error(format!("Invalid number: {}", num_str)),
            }
        } else {
            match num_str.parse::<i64>() {
                Ok(n) => Token::Int(n),
                Err(_) => Token::Error(format!("Invalid number: {}", num_str)),
            }
        }
    }

    /// Read an escape sequence after the backslash
    fn read_escape(&mut self) -> Result<char, Token> {
        match self.advance() {
            Some(b'n') => Ok('\n'),
            Some(b'r') => Ok('\r'),
            Some(b't') => Ok('\t'),
            Some(b'0') => Ok('\0'),
            Some(b'\\') => Ok('\\'),
            Some(b'\'') => Ok('\''),
            Some(b'"') => Ok('"'),
            Some(c) => Err(Token::Error(format!("Unknown escape: \\{}", c as char))),
            None => Err(Token::Error("Unterminated string".to_string())),
        }
    }

    /// Read an interpreted string literal
    fn read_string(&mut self) -> Token {
        self.advance(); // "
        let start = self.pos;
        let mut s = String::new();
        let mut chunk_start = start;

        loop {
            match self.peek() {
                None | Some(b'\n') => return Token::Error("Unterminated string".to_string()),
                Some(b'"') => {
                    s.push_str(&String::from_utf8_lossy(&self.source[chunk_start..self.pos]));
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    s.push_str(&String::from_utf8_lossy(&self.source[chunk_start..self.pos]));
                    self.advance();
                    match self.read_escape() {
                        Ok(c) => s.push(c),
                        Err(err) => return err,
                    }
                    chunk_start = self.pos;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }

        Token::String(s)
    }

    /// Read a raw string literal
    fn read_raw_string(&mut self) -> Token {
        self.advance(); // `
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'`' {
                let s = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
                self.advance();
                return Token::String(s);
            }
            self.advance();
        }
        Token::Error("Unterminated raw string".to_string())
    }

    /// Read a rune literal
    fn read_char(&mut self) -> Token {
        self.advance(); // '
        let c = match self.peek() {
            None | Some(b'\n' | b'\'') => return Token::Error("Invalid rune literal".to_string()),
            Some(b'\\') => {
                self.advance();
                match self.read_escape() {
                    Ok(c) => c,
                    Err(err) => return err,
                }
            }
            Some(_) => {
                let rest = std::str::from_utf8(&self.source[self.pos..]).unwrap_or("");
                let Some(c) = rest.chars().next() else {
                    return Token::Error("Invalid rune literal".to_string());
                };
                for _ in 0..c.len_utf8() {
                    self.advance();
                }
                c
            }
        };
        if self.peek() != Some(b'\'') {
            return Token::Error("Unterminated rune literal".to_string());
        }
        self.advance();
        Token::Char(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            if token == Token::Eof {
                break;
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new("42 3.14 1e10 0xff 1_000");

        assert_eq!(lexer.next_token(), Token::Int(42));
        assert!(matches!(lexer.next_token(), Token::Float(n) if (n - 3.14).abs() < 0.001));
        assert!(matches!(lexer.next_token(), Token::Float(n) if n == 1e10));
        assert_eq!(lexer.next_token(), Token::Int(255));
        assert_eq!(lexer.next_token(), Token::Int(1000));
    }

    #[test]
    fn test_strings() {
        let mut lexer = Lexer::new(r#""hello\n" `raw\n` 'x' '\t'"#);

        assert_eq!(lexer.next_token(), Token::String("hello\n".to_string()));
        assert_eq!(lexer.next_token(), Token::String("raw\\n".to_string()));
        assert_eq!(lexer.next_token(), Token::Char('x'));
        assert_eq!(lexer.next_token(), Token::Char('\t'));
    }

    #[test]
    fn test_identifiers_and_keywords() {
        assert_eq!(
            tokens("go func var x"),
            vec![
                Token::Go,
                Token::Func,
                Token::Var,
                Token::Ident("x".to_string()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_more_keywords() {
        assert_eq!(
            tokens("switch case default select chan const type struct goto fallthrough"),
            vec![
                Token::Switch,
                Token::Case,
                Token::Default,
                Token::Select,
                Token::Chan,
                Token::Const,
                Token::Type,
                Token::Struct,
                Token::Goto,
                Token::Fallthrough,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_unicode_identifiers() {
        assert_eq!(
            tokens("π := größe_2"),
            vec![
                Token::Ident("π".to_string()),
                Token::ColonEq,
                Token::Ident("größe_2".to_string()),
                Token::Semicolon,
            ]
        );
        // Multi-byte letter followed by an ASCII identifier
        let mut lexer = Lexer::new("é x");
        assert_eq!(lexer.next_token(), Token::Ident("é".to_string()));
        assert_eq!(lexer.next_token(), Token::Ident("x".to_string()));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("& && &^ &^= := <- ... *= ~"),
            vec![
                Token::Amp,
                Token::AmpAmp,
                Token::AmpCaret,
                Token::AmpCaretEq,
                Token::ColonEq,
                Token::Arrow,
                Token::Ellipsis,
                Token::StarEq,
                Token::Tilde,
            ]
        );
    }

    #[test]
    fn test_semicolon_insertion() {
        let toks = tokens("x := 1\nreturn\n}\nfoo(\n)");
        assert_eq!(
            toks,
            vec![
                Token::Ident("x".to_string()),
                Token::ColonEq,
                Token::Int(1),
                Token::Semicolon,
                Token::Return,
                Token::Semicolon,
                Token::RBrace,
                Token::Semicolon,
                Token::Ident("foo".to_string()),
                Token::LParen,
                Token::RParen,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_no_semicolon_after_operator() {
        assert_eq!(
            tokens("a +\nb"),
            vec![
                Token::Ident("a".to_string()),
                Token::Plus,
                Token::Ident("b".to_string()),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            tokens("1 // comment\n2 /* block */ 3"),
            vec![
                Token::Int(1),
                Token::Semicolon,
                Token::Int(2),
                Token::Int(3),
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_token_position() {
        let mut lexer = Lexer::new("a\n  bb");
        lexer.next_token();
        lexer.next_token(); // inserted semicolon
        lexer.next_token();
        let pos = lexer.token_pos();
        assert_eq!((pos.line, pos.column), (2, 3));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(Lexer::new("\"open").next_token(), Token::Error(_)));
        assert!(matches!(Lexer::new("#").next_token(), Token::Error(_)));
    }
}
