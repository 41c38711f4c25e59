//! Recursive-descent parser
//!
//! Builds the syntax tree for a source unit: an optional `package` clause,
//! skipped `import` declarations, then function, `var`, `const` and `type`
//! declarations.
//!
//! A statement that fails to parse does not fail its function. The parser
//! records the error, skips to the end of the statement and leaves a
//! `Stmt::Bad` holding the identifiers it passed over. Declarations that
//! fail at package level are skipped the same way. [`parse_file`] reports
//! these in `File::errors`; [`parse_func`] and [`parse_body`] reject them.

use super::ast::*;
use super::lexer::{Lexer, Token};
use std::fmt;

/// Parse error with the position of the offending token
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

type PResult<T> = Result<T, ParseError>;

/// Parser state
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
    current_pos: SourcePos,
    /// Composite literals are not allowed in `if`/`for`/`switch` headers
    no_composite: bool,
    /// Identifiers consumed in the current declaration, for recovery
    consumed: Vec<Ident>,
    /// Errors recovered from so far
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given source
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current_token = lexer.next_token();
        let current_pos = lexer.token_pos();

        Parser {
            lexer,
            current_token,
            current_pos,
            no_composite: false,
            consumed: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Parse a whole source unit
    ///
    /// Only a malformed `package` or `import` header is an error here.
    pub fn parse_file(mut self) -> PResult<File> {
        let mut file = File::default();
        self.skip_semicolons();

        if self.eat(&Token::Package) {
            file.package = Some(self.expect_ident()?);
            self.expect_terminator()?;
        }
        self.skip_semicolons();

        while self.check(&Token::Import) {
            self.skip_import()?;
            self.skip_semicolons();
        }

        while !self.check(&Token::Eof) {
            self.consumed.clear();
            if let Err(err) = self.parse_top_decl(&mut file) {
                log::warn!("skipping declaration: {}", err);
                self.errors.push(err);
                self.sync_decl();
            }
            self.skip_semicolons();
        }

        file.errors = self.errors;
        Ok(file)
    }

    /// Parse a single function declaration, with nothing else in the source
    pub fn parse_single_func(mut self) -> PResult<FuncDecl> {
        self.skip_semicolons();
        let func = self.parse_func_decl()?;
        self.skip_semicolons();
        if !self.check(&Token::Eof) {
            return Err(self.error("expected end of input after function"));
        }
        self.into_result(func)
    }

    /// Fail with the first recovered error, if any
    fn into_result<T>(mut self, value: T) -> PResult<T> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(self.errors.swap_remove(0))
        }
    }

    // ---- token helpers ----

    /// Advance to the next token
    fn advance(&mut self) -> Token {
        if let Token::Ident(name) = &self.current_token {
            self.consumed.push(Ident::new(name.clone(), self.current_pos));
        }
        let next = self.lexer.next_token();
        self.current_pos = self.lexer.token_pos();
        std::mem::replace(&mut self.current_token, next)
    }

    /// The token `n` places after the current one
    fn lookahead(&self, n: usize) -> Token {
        let mut lexer = self.lexer.clone();
        let mut token = Token::Eof;
        for _ in 0..n {
            token = lexer.next_token();
        }
        token
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(&self.current_token) == std::mem::discriminant(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect a specific token, advance if matched
    fn expect(&mut self, expected: Token) -> PResult<()> {
        if self.check(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!(
                "expected {:?}, found {:?}",
                expected, self.current_token
            )))
        }
    }

    fn expect_ident(&mut self) -> PResult<Ident> {
        let pos = self.current_pos;
        if !matches!(self.current_token, Token::Ident(_)) {
            return Err(self.error(&format!(
                "expected identifier, found {:?}",
                self.current_token
            )));
        }
        match self.advance() {
            Token::Ident(name) => Ok(Ident::new(name, pos)),
            other => Err(self.error(&format!("expected identifier, found {:?}", other))),
        }
    }

    fn optional_label(&mut self) -> PResult<Option<Ident>> {
        if matches!(self.current_token, Token::Ident(_)) {
            Ok(Some(self.expect_ident()?))
        } else {
            Ok(None)
        }
    }

    /// Statements end at `;`, or just before a closing `}` or `)`
    fn expect_terminator(&mut self) -> PResult<()> {
        match self.current_token {
            Token::Semicolon => {
                self.advance();
                Ok(())
            }
            Token::RBrace | Token::RParen | Token::Eof => Ok(()),
            _ => Err(self.error(&format!(
                "expected end of statement, found {:?}",
                self.current_token
            ))),
        }
    }

    fn skip_semicolons(&mut self) {
        while self.eat(&Token::Semicolon) {}
    }

    fn error(&self, message: &str) -> ParseError {
        if let Token::Error(lex_msg) = &self.current_token {
            return ParseError {
                message: lex_msg.clone(),
                line: self.current_pos.line,
                column: self.current_pos.column,
            };
        }
        ParseError {
            message: message.to_string(),
            line: self.current_pos.line,
            column: self.current_pos.column,
        }
    }

    // ---- recovery ----

    /// Skip to the end of the current statement
    ///
    /// Stops after a `;`, or before a `}`, `case` or `default`, at the
    /// nesting depth skipping started from.
    fn sync_stmt(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current_token {
                Token::Eof => return,
                Token::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                Token::RBrace | Token::Case | Token::Default if depth == 0 => return,
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip to the next package-level declaration
    fn sync_decl(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current_token {
                Token::Eof => return,
                Token::Semicolon if depth == 0 => {
                    self.advance();
                    if matches!(
                        self.current_token,
                        Token::Func | Token::Var | Token::Const | Token::Type | Token::Import | Token::Eof
                    ) {
                        return;
                    }
                    continue;
                }
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
        }
    }

    // ---- declarations ----

    fn skip_import(&mut self) -> PResult<()> {
        self.expect(Token::Import)?;
        if self.eat(&Token::LParen) {
            self.skip_semicolons();
            while !self.check(&Token::RParen) {
                self.skip_import_spec()?;
                self.skip_semicolons();
            }
            self.expect(Token::RParen)?;
        } else {
            self.skip_import_spec()?;
        }
        self.expect_terminator()
    }

    fn skip_import_spec(&mut self) -> PResult<()> {
        if matches!(self.current_token, Token::Ident(_) | Token::Dot) {
            self.advance();
        }
        match self.advance() {
            Token::String(_) => Ok(()),
            other => Err(self.error(&format!("expected import path, found {:?}", other))),
        }
    }

    fn parse_top_decl(&mut self, file: &mut File) -> PResult<()> {
        match self.current_token {
            Token::Func => file.funcs.push(self.parse_func_decl()?),
            Token::Var | Token::Const => {
                let decl = self.parse_value_decl()?;
                self.expect_terminator()?;
                file.decls.push(decl);
            }
            Token::Type => {
                let decl = self.parse_type_decl()?;
                self.expect_terminator()?;
                file.decls.push(decl);
            }
            Token::Import => self.skip_import()?,
            _ => {
                return Err(self.error(&format!(
                    "expected declaration, found {:?}",
                    self.current_token
                )));
            }
        }
        Ok(())
    }

    fn parse_func_decl(&mut self) -> PResult<FuncDecl> {
        self.expect(Token::Func)?;
        let recv = if self.check(&Token::LParen) {
            let mut fields = self.parse_params()?;
            if fields.len() != 1 {
                return Err(self.error("method must have exactly one receiver"));
            }
            fields.pop()
        } else {
            None
        };
        let name = self.expect_ident()?;
        let type_params = if self.check(&Token::LBracket) {
            self.parse_type_params()?
        } else {
            Vec::new()
        };
        let ty = self.parse_signature()?;
        let body = if self.check(&Token::LBrace) {
            Some(self.parse_block()?)
        } else {
            None
        };
        self.expect_terminator()?;
        Ok(FuncDecl {
            recv,
            name,
            type_params,
            ty,
            body,
        })
    }

    /// `[T any, K comparable, N ~int | ~int64]`
    fn parse_type_params(&mut self) -> PResult<Vec<Field>> {
        self.expect(Token::LBracket)?;
        let mut fields = Vec::new();
        let mut names = Vec::new();

        while !self.check(&Token::RBracket) {
            names.push(self.expect_ident()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            let ty = self.parse_constraint()?;
            fields.push(Field {
                names: std::mem::take(&mut names),
                ty,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBracket)?;

        if !names.is_empty() {
            return Err(self.error("missing type constraint"));
        }
        Ok(fields)
    }

    /// Union of optionally `~`-prefixed terms
    fn parse_constraint(&mut self) -> PResult<TypeExpr> {
        let mut terms = vec![self.parse_constraint_term()?];
        while self.eat(&Token::Pipe) {
            terms.push(self.parse_constraint_term()?);
        }
        if terms.len() == 1 {
            Ok(terms.remove(0))
        } else {
            Ok(TypeExpr::Union(terms))
        }
    }

    fn parse_constraint_term(&mut self) -> PResult<TypeExpr> {
        self.eat(&Token::Tilde);
        self.parse_type()
    }

    /// Parameters and optional results
    fn parse_signature(&mut self) -> PResult<FuncType> {
        let params = self.parse_params()?;
        let results = if self.check(&Token::LParen) {
            self.parse_params()?
        } else if self.starts_type() {
            vec![Field {
                names: Vec::new(),
                ty: self.parse_type()?,
            }]
        } else {
            Vec::new()
        };
        Ok(FuncType { params, results })
    }

    /// `( [name] Type, ... )`
    ///
    /// Entries are either all named (`a, b int, c *T`) or all unnamed
    /// (`int, *T`); which one is only known after the whole list is read.
    fn parse_params(&mut self) -> PResult<Vec<Field>> {
        self.expect(Token::LParen)?;
        let mut entries: Vec<(Option<Ident>, Option<TypeExpr>)> = Vec::new();

        while !self.check(&Token::RParen) {
            if let Token::Ident(_) = self.current_token {
                let ident = self.expect_ident()?;
                if matches!(self.current_token, Token::Comma | Token::RParen) {
                    entries.push((Some(ident), None));
                } else if self.eat(&Token::Dot) {
                    let name = self.expect_ident()?;
                    let ty = TypeExpr::Qualified {
                        package: ident,
                        name,
                    };
                    entries.push((None, Some(ty)));
                } else {
                    let ty = self.parse_param_type()?;
                    entries.push((Some(ident), Some(ty)));
                }
            } else {
                let ty = self.parse_param_type()?;
                entries.push((None, Some(ty)));
            }

            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;

        let named = entries.iter().any(|(n, t)| n.is_some() && t.is_some());
        if !named {
            // Bare identifiers were type names
            return Ok(entries
                .into_iter()
                .filter_map(|(name, ty)| match (name, ty) {
                    (_, Some(ty)) => Some(ty),
                    (Some(ident), None) => Some(TypeExpr::Named(ident)),
                    (None, None) => None,
                })
                .map(|ty| Field {
                    names: Vec::new(),
                    ty,
                })
                .collect());
        }

        let mut fields = Vec::new();
        let mut pending: Vec<Ident> = Vec::new();
        for (name, ty) in entries {
            match (name, ty) {
                (Some(ident), None) => pending.push(ident),
                (Some(ident), Some(ty)) => {
                    pending.push(ident);
                    fields.push(Field {
                        names: std::mem::take(&mut pending),
                        ty,
                    });
                }
                (None, _) => return Err(self.error("mixed named and unnamed parameters")),
            }
        }
        if !pending.is_empty() {
            return Err(self.error("missing parameter type"));
        }
        Ok(fields)
    }

    fn parse_param_type(&mut self) -> PResult<TypeExpr> {
        if self.eat(&Token::Ellipsis) {
            return Ok(TypeExpr::Variadic(Box::new(self.parse_type()?)));
        }
        self.parse_type()
    }

    fn starts_type(&self) -> bool {
        matches!(
            self.current_token,
            Token::Ident(_)
                | Token::Star
                | Token::LBracket
                | Token::Map
                | Token::Chan
                | Token::Arrow
                | Token::Func
                | Token::Struct
                | Token::Interface
        )
    }

    fn parse_type(&mut self) -> PResult<TypeExpr> {
        match self.current_token {
            Token::Ident(_) => {
                let ident = self.expect_ident()?;
                let base = if self.eat(&Token::Dot) {
                    let name = self.expect_ident()?;
                    TypeExpr::Qualified {
                        package: ident,
                        name,
                    }
                } else {
                    TypeExpr::Named(ident)
                };
                if self.check(&Token::LBracket) {
                    return Ok(TypeExpr::Instance {
                        base: Box::new(base),
                        args: self.parse_type_args()?,
                    });
                }
                Ok(base)
            }
            Token::Star => {
                self.advance();
                Ok(TypeExpr::Pointer(Box::new(self.parse_type()?)))
            }
            Token::LBracket => {
                self.advance();
                if self.eat(&Token::RBracket) {
                    return Ok(TypeExpr::Slice(Box::new(self.parse_type()?)));
                }
                let len = if self.eat(&Token::Ellipsis) {
                    None
                } else {
                    Some(Box::new(self.parse_expr()?))
                };
                self.expect(Token::RBracket)?;
                Ok(TypeExpr::Array {
                    len,
                    elem: Box::new(self.parse_type()?),
                })
            }
            Token::Map => {
                self.advance();
                self.expect(Token::LBracket)?;
                let key = self.parse_type()?;
                self.expect(Token::RBracket)?;
                let value = self.parse_type()?;
                Ok(TypeExpr::Map {
                    key: Box::new(key),
                    value: Box::new(value),
                })
            }
            Token::Chan => {
                self.advance();
                let dir = if self.eat(&Token::Arrow) {
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                Ok(TypeExpr::Chan {
                    dir,
                    elem: Box::new(self.parse_type()?),
                })
            }
            Token::Arrow => {
                self.advance();
                self.expect(Token::Chan)?;
                Ok(TypeExpr::Chan {
                    dir: ChanDir::Recv,
                    elem: Box::new(self.parse_type()?),
                })
            }
            Token::Func => {
                self.advance();
                Ok(TypeExpr::Func(self.parse_signature()?))
            }
            Token::Struct => {
                self.advance();
                Ok(TypeExpr::Struct(self.parse_struct_fields()?))
            }
            Token::Interface => {
                self.advance();
                Ok(TypeExpr::Interface(self.parse_interface_elems()?))
            }
            Token::LParen => {
                self.advance();
                let ty = self.parse_type()?;
                self.expect(Token::RParen)?;
                Ok(ty)
            }
            _ => Err(self.error(&format!("expected type, found {:?}", self.current_token))),
        }
    }

    /// `[A, B]` after a generic type name
    fn parse_type_args(&mut self) -> PResult<Vec<TypeExpr>> {
        self.expect(Token::LBracket)?;
        let mut args = vec![self.parse_type()?];
        while self.eat(&Token::Comma) {
            if self.check(&Token::RBracket) {
                break;
            }
            args.push(self.parse_type()?);
        }
        self.expect(Token::RBracket)?;
        Ok(args)
    }

    fn parse_struct_fields(&mut self) -> PResult<Vec<Field>> {
        self.expect(Token::LBrace)?;
        let mut fields = Vec::new();

        self.skip_semicolons();
        while !self.check(&Token::RBrace) {
            let field = if let Token::Ident(_) = self.current_token {
                let first = self.expect_ident()?;
                match self.current_token {
                    // Embedded `T`
                    Token::Semicolon | Token::RBrace | Token::String(_) => Field {
                        names: Vec::new(),
                        ty: TypeExpr::Named(first),
                    },
                    // Embedded `pkg.T`
                    Token::Dot => {
                        self.advance();
                        let name = self.expect_ident()?;
                        Field {
                            names: Vec::new(),
                            ty: TypeExpr::Qualified {
                                package: first,
                                name,
                            },
                        }
                    }
                    _ => {
                        let mut names = vec![first];
                        while self.eat(&Token::Comma) {
                            names.push(self.expect_ident()?);
                        }
                        Field {
                            names,
                            ty: self.parse_type()?,
                        }
                    }
                }
            } else {
                // Embedded `*T`
                Field {
                    names: Vec::new(),
                    ty: self.parse_type()?,
                }
            };

            // Field tag
            if let Token::String(_) = self.current_token {
                self.advance();
            }
            fields.push(field);
            self.expect_terminator()?;
            self.skip_semicolons();
        }
        self.expect(Token::RBrace)?;
        Ok(fields)
    }

    fn parse_interface_elems(&mut self) -> PResult<Vec<Field>> {
        self.expect(Token::LBrace)?;
        let mut elems = Vec::new();

        self.skip_semicolons();
        while !self.check(&Token::RBrace) {
            let method =
                matches!(self.current_token, Token::Ident(_)) && self.lookahead(1) == Token::LParen;
            let elem = if method {
                let name = self.expect_ident()?;
                Field {
                    names: vec![name],
                    ty: TypeExpr::Func(self.parse_signature()?),
                }
            } else {
                Field {
                    names: Vec::new(),
                    ty: self.parse_constraint()?,
                }
            };
            elems.push(elem);
            self.expect_terminator()?;
            self.skip_semicolons();
        }
        self.expect(Token::RBrace)?;
        Ok(elems)
    }

    /// `var`/`const`, single or grouped
    ///
    /// A grouped declaration becomes a `Stmt::Group` of single ones.
    fn parse_value_decl(&mut self) -> PResult<Stmt> {
        let is_const = self.check(&Token::Const);
        self.advance();
        let wrap = |spec: VarSpec| {
            if is_const {
                Stmt::Const(spec)
            } else {
                Stmt::Var(spec)
            }
        };

        if self.eat(&Token::LParen) {
            let mut stmts = Vec::new();
            self.skip_semicolons();
            while !self.check(&Token::RParen) {
                stmts.push(wrap(self.parse_value_spec(is_const)?));
                self.expect_terminator()?;
                self.skip_semicolons();
            }
            self.expect(Token::RParen)?;
            return Ok(Stmt::Group(stmts));
        }
        Ok(wrap(self.parse_value_spec(is_const)?))
    }

    /// Inside a `const` group a spec may repeat the previous one implicitly
    fn parse_value_spec(&mut self, is_const: bool) -> PResult<VarSpec> {
        let mut names = vec![self.expect_ident()?];
        while self.eat(&Token::Comma) {
            names.push(self.expect_ident()?);
        }
        let ty = if matches!(
            self.current_token,
            Token::Eq | Token::Semicolon | Token::RParen | Token::RBrace | Token::Eof
        ) {
            None
        } else {
            Some(self.parse_type()?)
        };
        let values = if self.eat(&Token::Eq) {
            self.parse_expr_list()?
        } else {
            Vec::new()
        };
        if !is_const && ty.is_none() && values.is_empty() {
            return Err(self.error("variable declaration needs a type or a value"));
        }
        Ok(VarSpec { names, ty, values })
    }

    fn parse_type_decl(&mut self) -> PResult<Stmt> {
        self.expect(Token::Type)?;
        if self.eat(&Token::LParen) {
            let mut stmts = Vec::new();
            self.skip_semicolons();
            while !self.check(&Token::RParen) {
                stmts.push(Stmt::Type(self.parse_type_spec()?));
                self.expect_terminator()?;
                self.skip_semicolons();
            }
            self.expect(Token::RParen)?;
            return Ok(Stmt::Group(stmts));
        }
        Ok(Stmt::Type(self.parse_type_spec()?))
    }

    fn parse_type_spec(&mut self) -> PResult<TypeSpec> {
        let name = self.expect_ident()?;
        let params = if self.check(&Token::LBracket) && self.type_params_follow() {
            self.parse_type_params()?
        } else {
            Vec::new()
        };
        let alias = self.eat(&Token::Eq);
        let ty = self.parse_type()?;
        Ok(TypeSpec {
            name,
            params,
            alias,
            ty,
        })
    }

    /// `type L[T any]` rather than the array type of `type A [N]int`
    fn type_params_follow(&self) -> bool {
        matches!(self.lookahead(1), Token::Ident(_))
            && matches!(
                self.lookahead(2),
                Token::Ident(_)
                    | Token::Comma
                    | Token::Tilde
                    | Token::Interface
                    | Token::LBracket
                    | Token::Map
                    | Token::Chan
                    | Token::Func
            )
    }

    // ---- statements ----

    pub(crate) fn parse_block(&mut self) -> PResult<Block> {
        self.expect(Token::LBrace)?;
        let saved = std::mem::replace(&mut self.no_composite, false);
        let mut stmts = Vec::new();

        loop {
            stmts.extend(self.parse_stmt_list()?);
            match self.current_token {
                Token::Case | Token::Default => {
                    // Clause keyword outside a switch
                    let err = self.error(&format!("unexpected {:?}", self.current_token));
                    self.errors.push(err);
                    let mark = self.consumed.len();
                    self.advance();
                    self.sync_stmt();
                    stmts.push(Stmt::Bad(self.consumed.split_off(mark)));
                }
                Token::Eof => return Err(self.error("unexpected end of input in block")),
                _ => break,
            }
        }
        self.expect(Token::RBrace)?;

        self.no_composite = saved;
        Ok(Block { stmts })
    }

    /// Statements up to a closing `}` or the next clause of a switch
    fn parse_stmt_list(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();

        self.skip_semicolons();
        while !matches!(
            self.current_token,
            Token::RBrace | Token::Case | Token::Default | Token::Eof
        ) {
            let start = self.current_pos.offset;
            let mark = self.consumed.len();

            let parsed = match self.parse_stmt() {
                Ok(stmt) => self.expect_terminator().map(|()| stmt),
                Err(err) => Err(err),
            };
            match parsed {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => {
                    log::debug!("skipping statement: {}", err);
                    self.errors.push(err);
                    self.sync_stmt();
                    if self.current_pos.offset == start {
                        self.advance();
                    }
                    stmts.push(Stmt::Bad(self.consumed[mark..].to_vec()));
                }
            }
            self.skip_semicolons();
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        match self.current_token {
            Token::Var | Token::Const => self.parse_value_decl(),
            Token::Type => self.parse_type_decl(),
            Token::Return => {
                self.advance();
                let results = if matches!(
                    self.current_token,
                    Token::Semicolon | Token::RBrace | Token::Eof
                ) {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                Ok(Stmt::Return(results))
            }
            Token::Go => {
                self.advance();
                Ok(Stmt::Go(self.parse_call_operand("go")?))
            }
            Token::Defer => {
                self.advance();
                Ok(Stmt::Defer(self.parse_call_operand("defer")?))
            }
            Token::If => self.parse_if(),
            Token::For => self.parse_for(),
            Token::Switch => self.parse_switch(),
            Token::Select => self.parse_select(),
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Token::Break => {
                self.advance();
                Ok(Stmt::Break(self.optional_label()?))
            }
            Token::Continue => {
                self.advance();
                Ok(Stmt::Continue(self.optional_label()?))
            }
            Token::Goto => {
                self.advance();
                Ok(Stmt::Goto(self.expect_ident()?))
            }
            Token::Fallthrough => {
                self.advance();
                Ok(Stmt::Fallthrough)
            }
            Token::Ident(_) if self.lookahead(1) == Token::Colon => {
                let label = self.expect_ident()?;
                self.expect(Token::Colon)?;
                let stmt = if matches!(self.current_token, Token::Semicolon | Token::RBrace) {
                    Stmt::Empty
                } else {
                    self.parse_stmt()?
                };
                Ok(Stmt::Labeled {
                    label,
                    stmt: Box::new(stmt),
                })
            }
            _ => self.parse_simple_stmt(),
        }
    }

    fn parse_call_operand(&mut self, keyword: &str) -> PResult<CallExpr> {
        match self.parse_expr()? {
            Expr::Call(call) => Ok(call),
            _ => Err(self.error(&format!("expression in {} must be a function call", keyword))),
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.expect(Token::If)?;
        let saved = std::mem::replace(&mut self.no_composite, true);

        let first = self.parse_simple_stmt()?;
        let (init, cond) = if self.eat(&Token::Semicolon) {
            (Some(Box::new(first)), self.parse_expr()?)
        } else {
            match first {
                Stmt::Expr(cond) => (None, cond),
                _ => return Err(self.error("expected condition in if statement")),
            }
        };

        self.no_composite = saved;
        let then = self.parse_block()?;

        let els = if self.eat(&Token::Else) {
            if self.check(&Token::If) {
                Some(Box::new(self.parse_if()?))
            } else {
                Some(Box::new(Stmt::Block(self.parse_block()?)))
            }
        } else {
            None
        };

        Ok(Stmt::If {
            init,
            cond,
            then,
            els,
        })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        self.expect(Token::For)?;
        let saved = std::mem::replace(&mut self.no_composite, true);

        // for { }
        if self.check(&Token::LBrace) {
            self.no_composite = saved;
            let body = self.parse_block()?;
            return Ok(Stmt::For {
                init: None,
                cond: None,
                post: None,
                body,
            });
        }

        // for range xs { }
        if self.eat(&Token::Range) {
            let expr = self.parse_expr()?;
            self.no_composite = saved;
            let body = self.parse_block()?;
            return Ok(Stmt::Range {
                key: None,
                value: None,
                define: false,
                expr,
                body,
            });
        }

        let init = if self.check(&Token::Semicolon) {
            None
        } else {
            let stmt = self.parse_simple_stmt_or_range()?;
            if let Stmt::Range { .. } = stmt {
                self.no_composite = saved;
                return self.finish_range(stmt);
            }
            Some(stmt)
        };

        // for cond { }
        if self.check(&Token::LBrace) {
            self.no_composite = saved;
            let cond = match init {
                Some(Stmt::Expr(cond)) => Some(cond),
                None => None,
                Some(_) => return Err(self.error("expected condition in for statement")),
            };
            let body = self.parse_block()?;
            return Ok(Stmt::For {
                init: None,
                cond,
                post: None,
                body,
            });
        }

        // for init; cond; post { }
        self.expect(Token::Semicolon)?;
        let cond = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(Token::Semicolon)?;
        let post = if self.check(&Token::LBrace) {
            None
        } else {
            Some(Box::new(self.parse_simple_stmt()?))
        };

        self.no_composite = saved;
        let body = self.parse_block()?;
        Ok(Stmt::For {
            init: init.map(Box::new),
            cond,
            post,
            body,
        })
    }

    /// Attach the body to a range header
    fn finish_range(&mut self, header: Stmt) -> PResult<Stmt> {
        let body = self.parse_block()?;
        match header {
            Stmt::Range {
                key,
                value,
                define,
                expr,
                ..
            } => Ok(Stmt::Range {
                key,
                value,
                define,
                expr,
                body,
            }),
            _ => Err(self.error("expected range clause")),
        }
    }

    /// Expression and type switches
    fn parse_switch(&mut self) -> PResult<Stmt> {
        self.expect(Token::Switch)?;
        let saved = std::mem::replace(&mut self.no_composite, true);

        let mut init = None;
        let mut header = None;
        if !self.check(&Token::LBrace) {
            let first = if self.check(&Token::Semicolon) {
                None
            } else {
                Some(self.parse_simple_stmt()?)
            };
            if self.eat(&Token::Semicolon) {
                init = first.map(Box::new);
                if !self.check(&Token::LBrace) {
                    header = Some(self.parse_simple_stmt()?);
                }
            } else {
                header = first;
            }
        }

        self.no_composite = saved;
        let clauses = self.parse_case_clauses()?;

        match header {
            None => Ok(Stmt::Switch {
                init,
                tag: None,
                clauses,
            }),
            Some(Stmt::Expr(Expr::TypeAssert { expr, ty: None })) => Ok(Stmt::TypeSwitch {
                init,
                bind: None,
                expr: *expr,
                clauses,
            }),
            Some(Stmt::Expr(tag)) => Ok(Stmt::Switch {
                init,
                tag: Some(tag),
                clauses,
            }),
            Some(Stmt::Assign {
                lhs,
                op: AssignOp::Define,
                rhs,
            }) => match (<[Expr; 1]>::try_from(lhs), <[Expr; 1]>::try_from(rhs)) {
                (Ok([Expr::Ident(bind)]), Ok([Expr::TypeAssert { expr, ty: None }])) => {
                    Ok(Stmt::TypeSwitch {
                        init,
                        bind: Some(bind),
                        expr: *expr,
                        clauses,
                    })
                }
                _ => Err(self.error("expected type switch guard")),
            },
            Some(_) => Err(self.error("expected switch expression")),
        }
    }

    fn parse_case_clauses(&mut self) -> PResult<Vec<CaseClause>> {
        self.expect(Token::LBrace)?;
        let mut clauses = Vec::new();

        self.skip_semicolons();
        while !self.check(&Token::RBrace) {
            let list = if self.eat(&Token::Case) {
                let mut list = vec![self.parse_expr_or_type()?];
                while self.eat(&Token::Comma) {
                    list.push(self.parse_expr_or_type()?);
                }
                list
            } else {
                self.expect(Token::Default)?;
                Vec::new()
            };
            self.expect(Token::Colon)?;
            let body = self.parse_stmt_list()?;
            clauses.push(CaseClause { list, body });
        }
        self.expect(Token::RBrace)?;
        Ok(clauses)
    }

    fn parse_select(&mut self) -> PResult<Stmt> {
        self.expect(Token::Select)?;
        self.expect(Token::LBrace)?;
        let mut clauses = Vec::new();

        self.skip_semicolons();
        while !self.check(&Token::RBrace) {
            let comm = if self.eat(&Token::Case) {
                Some(Box::new(self.parse_simple_stmt()?))
            } else {
                self.expect(Token::Default)?;
                None
            };
            self.expect(Token::Colon)?;
            let body = self.parse_stmt_list()?;
            clauses.push(CommClause { comm, body });
        }
        self.expect(Token::RBrace)?;
        Ok(Stmt::Select(clauses))
    }

    fn parse_simple_stmt(&mut self) -> PResult<Stmt> {
        let stmt = self.parse_simple_stmt_or_range()?;
        if let Stmt::Range { .. } = stmt {
            return Err(self.error("range clause outside for statement"));
        }
        Ok(stmt)
    }

    /// Expression, send, assignment, or inc/dec statement
    ///
    /// Returns a header-only `Stmt::Range` for `k, v := range xs`.
    fn parse_simple_stmt_or_range(&mut self) -> PResult<Stmt> {
        let lhs = self.parse_expr_list()?;

        let op = match self.current_token {
            Token::Eq => AssignOp::Assign,
            Token::ColonEq => AssignOp::Define,
            Token::PlusEq => AssignOp::Compound(BinaryOp::Add),
            Token::MinusEq => AssignOp::Compound(BinaryOp::Sub),
            Token::StarEq => AssignOp::Compound(BinaryOp::Mul),
            Token::SlashEq => AssignOp::Compound(BinaryOp::Div),
            Token::PercentEq => AssignOp::Compound(BinaryOp::Rem),
            Token::AmpEq => AssignOp::Compound(BinaryOp::And),
            Token::PipeEq => AssignOp::Compound(BinaryOp::Or),
            Token::CaretEq => AssignOp::Compound(BinaryOp::Xor),
            Token::LtLtEq => AssignOp::Compound(BinaryOp::Shl),
            Token::GtGtEq => AssignOp::Compound(BinaryOp::Shr),
            Token::AmpCaretEq => AssignOp::Compound(BinaryOp::AndNot),
            Token::PlusPlus | Token::MinusMinus => {
                let increment = self.check(&Token::PlusPlus);
                self.advance();
                let target = self.single(lhs)?;
                return Ok(Stmt::IncDec { target, increment });
            }
            Token::Arrow => {
                self.advance();
                let chan = self.single(lhs)?;
                let value = self.parse_expr()?;
                return Ok(Stmt::Send { chan, value });
            }
            _ => return Ok(Stmt::Expr(self.single(lhs)?)),
        };
        self.advance();

        if matches!(op, AssignOp::Assign | AssignOp::Define) && self.eat(&Token::Range) {
            if lhs.len() > 2 {
                return Err(self.error("range permits at most two iteration variables"));
            }
            let mut vars = lhs.into_iter();
            let key = vars.next();
            let value = vars.next();
            let expr = self.parse_expr()?;
            return Ok(Stmt::Range {
                key,
                value,
                define: op == AssignOp::Define,
                expr,
                body: Block::default(),
            });
        }

        let rhs = self.parse_expr_list()?;
        if let AssignOp::Compound(_) = op {
            if lhs.len() != 1 || rhs.len() != 1 {
                return Err(self.error("compound assignment takes a single operand"));
            }
        }
        if op == AssignOp::Define && !lhs.iter().all(|e| matches!(e, Expr::Ident(_))) {
            return Err(self.error("non-name on left side of :="));
        }
        Ok(Stmt::Assign { lhs, op, rhs })
    }

    fn single(&self, mut exprs: Vec<Expr>) -> PResult<Expr> {
        if exprs.len() != 1 {
            return Err(self.error("expected a single expression"));
        }
        exprs.pop().ok_or_else(|| self.error("expected expression"))
    }

    // ---- expressions ----

    fn parse_expr_list(&mut self) -> PResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat(&Token::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    pub(crate) fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_binary(1)
    }

    fn binary_op(&self) -> Option<BinaryOp> {
        Some(match self.current_token {
            Token::PipePipe => BinaryOp::LogOr,
            Token::AmpAmp => BinaryOp::LogAnd,
            Token::EqEq => BinaryOp::Eq,
            Token::BangEq => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::LtEq => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::GtEq => BinaryOp::Ge,
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            Token::Pipe => BinaryOp::Or,
            Token::Caret => BinaryOp::Xor,
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            Token::Percent => BinaryOp::Rem,
            Token::LtLt => BinaryOp::Shl,
            Token::GtGt => BinaryOp::Shr,
            Token::Amp => BinaryOp::And,
            Token::AmpCaret => BinaryOp::AndNot,
            _ => return None,
        })
    }

    /// Precedence climbing over binary operators
    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.current_token {
            Token::Star => {
                self.advance();
                return Ok(Expr::Star(Box::new(self.parse_unary()?)));
            }
            Token::Amp => UnaryOp::Addr,
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            Token::Caret => UnaryOp::BitNot,
            Token::Arrow => UnaryOp::Recv,
            _ => return self.parse_primary(),
        };
        self.advance();
        Ok(Expr::Unary {
            op,
            expr: Box::new(self.parse_unary()?),
        })
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_operand()?;

        loop {
            match self.current_token {
                Token::Dot => {
                    self.advance();
                    if self.eat(&Token::LParen) {
                        let ty = if self.eat(&Token::Type) {
                            None
                        } else {
                            Some(self.parse_type()?)
                        };
                        self.expect(Token::RParen)?;
                        expr = Expr::TypeAssert {
                            expr: Box::new(expr),
                            ty,
                        };
                    } else {
                        let field = self.expect_ident()?;
                        expr = Expr::Selector {
                            expr: Box::new(expr),
                            field,
                        };
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let saved = std::mem::replace(&mut self.no_composite, false);
                    expr = self.parse_index_or_slice(expr)?;
                    self.no_composite = saved;
                    self.expect(Token::RBracket)?;
                }
                Token::LParen => {
                    expr = Expr::Call(self.parse_call_args(expr)?);
                }
                Token::LBrace if !self.no_composite && is_type_like(&expr) => {
                    let ty = expr_to_type(expr);
                    let elems = self.parse_composite_elems()?;
                    expr = Expr::Composite { ty, elems };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// `a[i]`, `a[lo:hi]` or `a[lo:hi:max]`, up to the closing bracket
    fn parse_index_or_slice(&mut self, expr: Expr) -> PResult<Expr> {
        let low = if self.check(&Token::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr_or_type()?))
        };

        if !self.eat(&Token::Colon) {
            let index = low.ok_or_else(|| self.error("expected index"))?;
            if !self.check(&Token::Comma) {
                return Ok(Expr::Index {
                    expr: Box::new(expr),
                    index,
                });
            }

            // `F[A, B]` instantiates a generic
            let mut exprs = vec![*index];
            while self.eat(&Token::Comma) {
                if self.check(&Token::RBracket) {
                    break;
                }
                exprs.push(self.parse_expr_or_type()?);
            }
            let base = expr_to_type(expr).ok_or_else(|| self.error("expected generic name"))?;
            let args = exprs
                .into_iter()
                .map(expr_to_type)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| self.error("expected type argument"))?;
            return Ok(Expr::Type(TypeExpr::Instance {
                base: Box::new(base),
                args,
            }));
        }

        let high = if matches!(self.current_token, Token::RBracket | Token::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let max = if self.eat(&Token::Colon) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        Ok(Expr::Slice {
            expr: Box::new(expr),
            low,
            high,
            max,
        })
    }

    fn parse_call_args(&mut self, func: Expr) -> PResult<CallExpr> {
        self.expect(Token::LParen)?;
        let saved = std::mem::replace(&mut self.no_composite, false);
        let mut args = Vec::new();
        let mut spread = false;

        self.skip_semicolons();
        while !self.check(&Token::RParen) {
            args.push(self.parse_expr_or_type()?);
            if self.eat(&Token::Ellipsis) {
                spread = true;
            }
            if !self.eat(&Token::Comma) {
                break;
            }
            self.skip_semicolons();
        }
        self.expect(Token::RParen)?;

        self.no_composite = saved;
        Ok(CallExpr {
            func: Box::new(func),
            args,
            spread,
        })
    }

    /// Operands that may be types, as in `make([]int, n)` or `case chan int:`
    fn parse_expr_or_type(&mut self) -> PResult<Expr> {
        match self.current_token {
            Token::LBracket | Token::Map | Token::Chan | Token::Struct | Token::Interface => {
                let ty = self.parse_type()?;
                if self.check(&Token::LBrace) {
                    let elems = self.parse_composite_elems()?;
                    return Ok(Expr::Composite { ty: Some(ty), elems });
                }
                Ok(Expr::Type(ty))
            }
            _ => self.parse_expr(),
        }
    }

    fn parse_composite_elems(&mut self) -> PResult<Vec<Expr>> {
        self.expect(Token::LBrace)?;
        let saved = std::mem::replace(&mut self.no_composite, false);
        let mut elems = Vec::new();

        self.skip_semicolons();
        while !self.check(&Token::RBrace) {
            let elem = self.parse_element()?;
            let elem = if self.eat(&Token::Colon) {
                Expr::KeyValue {
                    key: Box::new(elem),
                    value: Box::new(self.parse_element()?),
                }
            } else {
                elem
            };
            elems.push(elem);
            if !self.eat(&Token::Comma) {
                break;
            }
            self.skip_semicolons();
        }
        self.skip_semicolons();
        self.expect(Token::RBrace)?;

        self.no_composite = saved;
        Ok(elems)
    }

    /// Composite element, allowing elided types: `{1, 2}`
    fn parse_element(&mut self) -> PResult<Expr> {
        if self.check(&Token::LBrace) {
            let elems = self.parse_composite_elems()?;
            return Ok(Expr::Composite { ty: None, elems });
        }
        self.parse_expr()
    }

    fn parse_operand(&mut self) -> PResult<Expr> {
        let pos = self.current_pos;
        match self.current_token {
            Token::Ident(_) => Ok(Expr::Ident(self.expect_ident()?)),
            Token::Int(n) => {
                self.advance();
                Ok(Expr::Lit(Literal::Int(n)))
            }
            Token::Float(x) => {
                self.advance();
                Ok(Expr::Lit(Literal::Float(x)))
            }
            Token::Char(c) => {
                self.advance();
                Ok(Expr::Lit(Literal::Char(c)))
            }
            Token::String(_) => match self.advance() {
                Token::String(s) => Ok(Expr::Lit(Literal::Str(s))),
                _ => unreachable!("checked string token"),
            },
            Token::LParen => {
                self.advance();
                let saved = std::mem::replace(&mut self.no_composite, false);
                let inner = self.parse_expr_or_type()?;
                self.no_composite = saved;
                self.expect(Token::RParen)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            Token::Func => {
                self.advance();
                let ty = self.parse_signature()?;
                if !self.check(&Token::LBrace) {
                    return Ok(Expr::Type(TypeExpr::Func(ty)));
                }
                let body = self.parse_block()?;
                Ok(Expr::FuncLit { ty, body })
            }
            Token::LBracket | Token::Map | Token::Chan | Token::Struct | Token::Interface => {
                self.parse_expr_or_type()
            }
            _ => Err(ParseError {
                message: match &self.current_token {
                    Token::Error(msg) => msg.clone(),
                    other => format!("expected expression, found {:?}", other),
                },
                line: pos.line,
                column: pos.column,
            }),
        }
    }
}

/// Whether an expression can name the type of a composite literal
fn is_type_like(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) | Expr::Type(_) => true,
        Expr::Selector { expr, .. } => matches!(**expr, Expr::Ident(_)),
        // `Pair[int]{...}`
        Expr::Index { expr, index } => is_type_like(expr) && is_type_like(index),
        _ => false,
    }
}

fn expr_to_type(expr: Expr) -> Option<TypeExpr> {
    match expr {
        Expr::Ident(ident) => Some(TypeExpr::Named(ident)),
        Expr::Type(ty) => Some(ty),
        Expr::Selector { expr, field } => match *expr {
            Expr::Ident(package) => Some(TypeExpr::Qualified {
                package,
                name: field,
            }),
            _ => None,
        },
        Expr::Star(inner) => Some(TypeExpr::Pointer(Box::new(expr_to_type(*inner)?))),
        Expr::Paren(inner) => expr_to_type(*inner),
        Expr::Index { expr, index } => Some(TypeExpr::Instance {
            base: Box::new(expr_to_type(*expr)?),
            args: vec![expr_to_type(*index)?],
        }),
        _ => None,
    }
}

/// Parse a source unit, recovering from errors inside declarations
pub fn parse_file(source: &str) -> Result<File, ParseError> {
    Parser::new(source).parse_file()
}

/// Parse one function declaration
pub fn parse_func(source: &str) -> Result<FuncDecl, ParseError> {
    Parser::new(source).parse_single_func()
}

/// Parse a function body, given as a braced block, into an anonymous
/// function declaration with no parameters
pub fn parse_body(source: &str) -> Result<FuncDecl, ParseError> {
    let mut parser = Parser::new(source);
    parser.skip_semicolons();
    let body = parser.parse_block()?;
    parser.skip_semicolons();
    if !parser.check(&Token::Eof) {
        return Err(parser.error("expected end of input after block"));
    }
    parser.into_result(FuncDecl {
        recv: None,
        name: Ident::new("_", SourcePos::default()),
        type_params: Vec::new(),
        ty: FuncType::default(),
        body: Some(body),
    })
}
