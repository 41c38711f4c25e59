//! Scope-resolved variant of the closure-capture rule
//!
//! Walks the body keeping a chain of lexical scopes. Every binding records
//! the function-literal depth it was declared at, so a use inside a literal
//! is a capture exactly when its binding sits at a shallower depth.

use super::{Escapes, Reason};
use crate::syntax::ast::{AssignOp, Block, CaseClause, Expr, FuncDecl, FuncType, Ident, Stmt};
use std::collections::HashMap;

/// Lexical scopes from outermost to innermost
#[derive(Debug, Default)]
pub struct ScopeChain {
    /// Each scope maps a name to the depth it was declared at
    scopes: Vec<HashMap<String, usize>>,
    /// Function-literal nesting depth, 0 for the analyzed function
    depth: usize,
}

impl ScopeChain {
    /// A chain holding one empty scope
    pub fn new() -> Self {
        ScopeChain {
            scopes: vec![HashMap::new()],
            depth: 0,
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Open the scope of a function literal
    pub fn enter_func(&mut self) {
        self.depth += 1;
        self.push();
    }

    pub fn exit_func(&mut self) {
        self.pop();
        self.depth = self.depth.saturating_sub(1);
    }

    /// Bind `ident` in the innermost scope; `_` binds nothing
    pub fn declare(&mut self, ident: &Ident) {
        if ident.is_blank() {
            return;
        }
        let depth = self.depth;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(ident.name.clone(), depth);
        }
    }

    /// Depth of the binding `name` refers to, if it is declared at all
    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// Whether a use of `name` here reaches outside the current literal
    pub fn is_capture(&self, name: &str) -> bool {
        self.resolve(name).is_some_and(|depth| depth < self.depth)
    }
}

struct ScopedWalker {
    chain: ScopeChain,
    escapes: Escapes,
}

pub(super) fn analyze_scoped(func: &FuncDecl, body: &Block) -> Escapes {
    let mut walker = ScopedWalker {
        chain: ScopeChain::new(),
        escapes: Escapes::default(),
    };
    if let Some(recv) = &func.recv {
        for name in &recv.names {
            walker.chain.declare(name);
        }
    }
    walker.declare_fields(&func.ty);
    walker.block(body);
    walker.escapes
}

impl ScopedWalker {
    fn declare_fields(&mut self, ty: &FuncType) {
        for field in ty.params.iter().chain(&ty.results) {
            for name in &field.names {
                self.chain.declare(name);
            }
        }
    }

    fn use_ident(&mut self, ident: &Ident) {
        if self.chain.is_capture(&ident.name) {
            self.escapes.push(&ident.name, Reason::Capture);
        }
    }

    fn block(&mut self, block: &Block) {
        self.chain.push();
        self.stmts(&block.stmts);
        self.chain.pop();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        let chain = &self.chain;
        self.escapes
            .statement(stmt, |name| chain.resolve(name).is_some());

        match stmt {
            Stmt::Var(spec) | Stmt::Const(spec) => {
                for value in &spec.values {
                    self.expr(value);
                }
                for name in &spec.names {
                    self.chain.declare(name);
                }
            }
            Stmt::Group(stmts) => {
                for stmt in stmts {
                    self.stmt(stmt);
                }
            }
            Stmt::Assign { lhs, op, rhs } => {
                for expr in rhs {
                    self.expr(expr);
                }
                if *op == AssignOp::Define {
                    for target in lhs {
                        if let Expr::Ident(ident) = target {
                            self.chain.declare(ident);
                        }
                    }
                } else {
                    for target in lhs {
                        self.expr(target);
                    }
                }
            }
            Stmt::IncDec { target, .. } => self.expr(target),
            Stmt::Send { chan, value } => {
                self.expr(chan);
                self.expr(value);
            }
            Stmt::Expr(expr) => self.expr(expr),
            Stmt::Return(results) => {
                for expr in results {
                    self.expr(expr);
                }
            }
            Stmt::Go(call) | Stmt::Defer(call) => {
                self.expr(&call.func);
                for arg in &call.args {
                    self.expr(arg);
                }
            }
            Stmt::If {
                init,
                cond,
                then,
                els,
            } => {
                self.chain.push();
                if let Some(init) = init {
                    self.stmt(init);
                }
                self.expr(cond);
                self.block(then);
                if let Some(els) = els {
                    self.stmt(els);
                }
                self.chain.pop();
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => {
                self.chain.push();
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(cond) = cond {
                    self.expr(cond);
                }
                if let Some(post) = post {
                    self.stmt(post);
                }
                self.block(body);
                self.chain.pop();
            }
            Stmt::Range {
                key,
                value,
                define,
                expr,
                body,
            } => {
                self.expr(expr);
                self.chain.push();
                for var in key.iter().chain(value) {
                    match var {
                        Expr::Ident(ident) if *define => self.chain.declare(ident),
                        other => self.expr(other),
                    }
                }
                self.block(body);
                self.chain.pop();
            }
            Stmt::Switch { init, tag, clauses } => {
                self.chain.push();
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(tag) = tag {
                    self.expr(tag);
                }
                self.clauses(clauses, None);
                self.chain.pop();
            }
            Stmt::TypeSwitch {
                init,
                bind,
                expr,
                clauses,
            } => {
                self.chain.push();
                if let Some(init) = init {
                    self.stmt(init);
                }
                self.expr(expr);
                self.clauses(clauses, bind.as_ref());
                self.chain.pop();
            }
            Stmt::Select(clauses) => {
                for clause in clauses {
                    self.chain.push();
                    if let Some(comm) = &clause.comm {
                        self.stmt(comm);
                    }
                    self.stmts(&clause.body);
                    self.chain.pop();
                }
            }
            Stmt::Labeled { stmt, .. } => self.stmt(stmt),
            Stmt::Block(block) => self.block(block),
            // Type declarations bind no variables
            Stmt::Type(_)
            | Stmt::Break(_)
            | Stmt::Continue(_)
            | Stmt::Goto(_)
            | Stmt::Fallthrough
            | Stmt::Empty
            | Stmt::Bad(_) => {}
        }
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    /// Each clause is its own scope; a type switch binding is declared in each
    fn clauses(&mut self, clauses: &[CaseClause], bind: Option<&Ident>) {
        for clause in clauses {
            for expr in &clause.list {
                self.expr(expr);
            }
            self.chain.push();
            if let Some(bind) = bind {
                self.chain.declare(bind);
            }
            self.stmts(&clause.body);
            self.chain.pop();
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident(ident) => self.use_ident(ident),
            Expr::Lit(_) | Expr::Type(_) => {}
            Expr::Paren(inner) | Expr::Star(inner) | Expr::Unary { expr: inner, .. } => {
                self.expr(inner)
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            Expr::Call(call) => {
                self.expr(&call.func);
                for arg in &call.args {
                    self.expr(arg);
                }
            }
            // The field name is not a variable
            Expr::Selector { expr, .. } => self.expr(expr),
            Expr::Index { expr, index } => {
                self.expr(expr);
                self.expr(index);
            }
            Expr::Slice {
                expr,
                low,
                high,
                max,
            } => {
                self.expr(expr);
                for bound in [low, high, max].into_iter().flatten() {
                    self.expr(bound);
                }
            }
            Expr::TypeAssert { expr, .. } => self.expr(expr),
            Expr::FuncLit { ty, body } => {
                self.escapes.closure_signature(ty);
                self.chain.enter_func();
                self.declare_fields(ty);
                self.block(body);
                self.chain.exit_func();
            }
            Expr::Composite { elems, .. } => {
                for elem in elems {
                    self.expr(elem);
                }
            }
            Expr::KeyValue { key, value } => {
                self.expr(key);
                self.expr(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ast::SourcePos;

    fn ident(name: &str) -> Ident {
        Ident::new(name, SourcePos::default())
    }

    #[test]
    fn test_resolve_innermost_first() {
        let mut chain = ScopeChain::new();
        chain.declare(&ident("x"));
        chain.enter_func();
        assert!(chain.is_capture("x"));

        chain.declare(&ident("x"));
        assert!(!chain.is_capture("x"));
        assert_eq!(chain.resolve("x"), Some(1));

        chain.exit_func();
        assert_eq!(chain.resolve("x"), Some(0));
        assert_eq!(chain.depth(), 0);
    }

    #[test]
    fn test_pop_forgets_bindings() {
        let mut chain = ScopeChain::new();
        chain.push();
        chain.declare(&ident("tmp"));
        assert!(chain.resolve("tmp").is_some());
        chain.pop();
        assert!(chain.resolve("tmp").is_none());
    }

    #[test]
    fn test_blank_is_never_bound() {
        let mut chain = ScopeChain::new();
        chain.declare(&ident("_"));
        assert!(chain.resolve("_").is_none());
    }

    #[test]
    fn test_unknown_name_is_not_capture() {
        let mut chain = ScopeChain::new();
        chain.enter_func();
        assert!(!chain.is_capture("fmt"));
    }
}
