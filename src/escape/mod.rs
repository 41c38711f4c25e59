//! Escape analysis
//!
//! Decides, per function, which local variables need heap storage because a
//! stack slot might not outlive every use. The result over-approximates:
//! allocating a variable on the heap needlessly is fine, leaving a variable
//! on the stack while a reference to it outlives the frame is not.
//!
//! Rules, applied in one forward pre-order pass over the body:
//! 1. `go f(&x)` / `go f(*p)`: the operand escapes. So does any argument
//!    whose name was already seen or already escaped.
//! 2. `return &x` / `return *p`: the operand escapes.
//! 3. `l = &r` / `l = *r`: both `l` and `r` escape; `l = r` escapes `l` when
//!    `r` already escaped. `var l = ...` and `:=` follow the same rule.
//! 4. Function literals: parameters and results of pointer type escape, and
//!    so do identifiers in the literal's body that refer to the enclosing
//!    function.
//!
//! There is no fixed-point iteration. A variable assigned from an escaping
//! source before that source is found to escape stays on the stack.
//!
//! Rule 4 has two modes. `EscapeMode::Legacy` matches names only: an
//! identifier in the literal escapes if any identifier with the same name
//! was seen earlier in the pass, whatever scope it lived in. This is the
//! default because existing allocation decisions depend on it.
//! `EscapeMode::Scoped` resolves identifiers through a scope chain and only
//! escapes real captures. It changes allocation decisions and has to be
//! chosen explicitly.

mod scope;

use crate::syntax::ast::{Block, CallExpr, Expr, FuncDecl, FuncType, Node, Stmt, inspect};
use crate::syntax::parser::{ParseError, parse_file};
use std::collections::HashSet;
use std::fmt;

pub use scope::ScopeChain;

/// How identifiers inside function literals are matched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EscapeMode {
    /// Name-only matching against everything seen so far
    #[default]
    Legacy,
    /// Resolution through lexical scopes
    Scoped,
}

impl fmt::Display for EscapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapeMode::Legacy => write!(f, "legacy"),
            EscapeMode::Scoped => write!(f, "scoped"),
        }
    }
}

/// Which rule made a variable escape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    Dispatch,
    Return,
    Assign,
    Capture,
    ClosureSignature,
    /// Named in a statement the parser could not read
    Skipped,
}

/// Escaping names, in the order they were found
#[derive(Debug, Default)]
struct Escapes {
    names: Vec<String>,
    set: HashSet<String>,
}

impl Escapes {
    fn push(&mut self, name: &str, reason: Reason) {
        log::trace!("escape: {} ({:?})", name, reason);
        self.names.push(name.to_string());
        self.set.insert(name.to_string());
    }

    fn contains(&self, name: &str) -> bool {
        self.set.contains(name)
    }

    /// Concurrent dispatch: referenced or already-known arguments escape
    fn dispatch(&mut self, call: &CallExpr, known: impl Fn(&str) -> bool) {
        for arg in &call.args {
            let Some(name) = arg.var_name() else {
                continue;
            };
            if arg.is_reference() || self.contains(name) || known(name) {
                self.push(name, Reason::Dispatch);
            }
        }
    }

    /// Returned references escape
    fn returned(&mut self, results: &[Expr]) {
        for result in results {
            if result.is_reference() {
                if let Some(name) = result.var_name() {
                    self.push(name, Reason::Return);
                }
            }
        }
    }

    /// Assignment propagation for `lhs[i] = rhs[i]`
    fn assign<'a>(&mut self, lhs: &[Option<&'a str>], rhs: &[Expr]) {
        for (i, expr) in rhs.iter().enumerate() {
            let target = lhs.get(i).copied().flatten();
            let source = expr.var_name();

            if expr.is_reference() {
                if let Some(target) = target {
                    self.push(target, Reason::Assign);
                }
                if let Some(source) = source {
                    self.push(source, Reason::Assign);
                }
            } else if let (Some(target), Some(source)) = (target, source) {
                if self.contains(source) {
                    self.push(target, Reason::Assign);
                }
            }
        }
    }

    /// Pointer-typed parameters and results of a function literal
    fn closure_signature(&mut self, ty: &FuncType) {
        for field in ty.params.iter().chain(&ty.results) {
            if field.ty.is_pointer() {
                for name in &field.names {
                    self.push(&name.name, Reason::ClosureSignature);
                }
            }
        }
    }

    /// Apply the statement-level rules
    ///
    /// Nothing is known about how a skipped statement uses the names in it,
    /// so all of them escape.
    fn statement(&mut self, stmt: &Stmt, known: impl Fn(&str) -> bool) {
        match stmt {
            Stmt::Go(call) => self.dispatch(call, known),
            Stmt::Return(results) => self.returned(results),
            Stmt::Assign { lhs, rhs, .. } => {
                let targets: Vec<_> = lhs
                    .iter()
                    .map(|target| match target {
                        Expr::Ident(ident) if ident.is_blank() => None,
                        other => other.var_name(),
                    })
                    .collect();
                self.assign(&targets, rhs);
            }
            Stmt::Var(spec) => {
                let targets: Vec<_> = spec
                    .names
                    .iter()
                    .map(|n| (!n.is_blank()).then_some(n.name.as_str()))
                    .collect();
                self.assign(&targets, &spec.values);
            }
            Stmt::Bad(idents) => {
                for ident in idents.iter().filter(|ident| !ident.is_blank()) {
                    self.push(&ident.name, Reason::Skipped);
                }
            }
            _ => {}
        }
    }
}

/// Escape analyzer for one function at a time
#[derive(Debug, Clone, Copy, Default)]
pub struct EscapeAnalyzer {
    mode: EscapeMode,
}

impl EscapeAnalyzer {
    pub fn new(mode: EscapeMode) -> Self {
        EscapeAnalyzer { mode }
    }

    #[inline]
    pub fn mode(&self) -> EscapeMode {
        self.mode
    }

    /// Names of the variables in `func` that must live on the heap
    ///
    /// The list may repeat names; treat it as a set. Functions without a
    /// body have nothing to allocate.
    pub fn analyze(&self, func: &FuncDecl) -> Vec<String> {
        let Some(body) = &func.body else {
            return Vec::new();
        };

        let escapes = match self.mode {
            EscapeMode::Legacy => analyze_legacy(body),
            EscapeMode::Scoped => scope::analyze_scoped(func, body),
        };
        log::debug!(
            "escape analysis of {} ({}): {:?}",
            func.name.name,
            self.mode,
            escapes.names
        );
        escapes.names
    }

    /// Analyze every function of a source unit
    ///
    /// Statements and declarations the parser skipped do not fail the
    /// unit. A function dropped entirely is missing from the result.
    pub fn analyze_source(&self, source: &str) -> Result<Vec<(String, Vec<String>)>, ParseError> {
        let file = parse_file(source)?;
        Ok(file
            .funcs
            .iter()
            .map(|func| (func.name.name.clone(), self.analyze(func)))
            .collect())
    }
}

/// Run the analysis in legacy mode
pub fn analyze(func: &FuncDecl) -> Vec<String> {
    EscapeAnalyzer::default().analyze(func)
}

/// Parse `source` and analyze each function in the given mode
pub fn analyze_source(
    source: &str,
    mode: EscapeMode,
) -> Result<Vec<(String, Vec<String>)>, ParseError> {
    EscapeAnalyzer::new(mode).analyze_source(source)
}

fn analyze_legacy(body: &Block) -> Escapes {
    let mut escapes = Escapes::default();
    let mut seen: HashSet<String> = HashSet::new();

    inspect(Node::Block(body), &mut |node| {
        match node {
            Node::Ident(ident) => {
                seen.insert(ident.name.clone());
            }
            Node::Stmt(stmt) => escapes.statement(stmt, |name| seen.contains(name)),
            Node::Expr(Expr::FuncLit { ty, body }) => {
                // Anything in the literal that shares a name with something
                // already seen counts as captured
                inspect(Node::Block(body), &mut |inner| {
                    if let Node::Ident(ident) = inner {
                        if escapes.contains(&ident.name) || seen.contains(&ident.name) {
                            escapes.push(&ident.name, Reason::Capture);
                        }
                    }
                    true
                });
                escapes.closure_signature(ty);
            }
            _ => {}
        }
        true
    });

    escapes
}

/// Deduplicated view of an analysis result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscapeSet {
    names: HashSet<String>,
}

impl EscapeSet {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in sorted order
    pub fn sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for EscapeSet {
    fn from(names: Vec<String>) -> Self {
        EscapeSet {
            names: names.into_iter().collect(),
        }
    }
}

impl FromIterator<String> for EscapeSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        EscapeSet {
            names: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parser::{parse_body, parse_func};

    fn legacy(source: &str) -> EscapeSet {
        analyze(&parse_body(source).unwrap()).into()
    }

    fn scoped(source: &str) -> EscapeSet {
        EscapeAnalyzer::new(EscapeMode::Scoped)
            .analyze(&parse_body(source).unwrap())
            .into()
    }

    #[test]
    fn test_concurrent_dispatch() {
        let set = legacy("{ var a int; go g(&a) }");
        assert!(set.contains("a"));
        assert!(scoped("{ var a int; go g(&a) }").contains("a"));
    }

    #[test]
    fn test_dispatch_of_dereference() {
        let set = legacy("{ go g(*p) }");
        assert_eq!(set.sorted(), vec!["p"]);
    }

    #[test]
    fn test_dispatch_of_known_name() {
        // Passed by value, but the name was already seen
        let set = legacy("{ n := 1; go worker(n) }");
        assert!(set.contains("n"));
        // First appearance inside the go statement itself
        assert!(legacy("{ go worker(m) }").is_empty());
    }

    #[test]
    fn test_return_reference() {
        let set = legacy("{ var b int; return &b }");
        assert!(set.contains("b"));
        assert!(legacy("{ return &Point{X: 1} }").is_empty());
    }

    #[test]
    fn test_closure_capture() {
        let source = "{ c := 1; go func(){ use(c) }() }";
        assert!(legacy(source).contains("c"));
        assert!(scoped(source).contains("c"));
    }

    #[test]
    fn test_no_false_escape() {
        let source = "{ var d int; d = 1; return d }";
        assert!(!legacy(source).contains("d"));
        assert!(scoped(source).is_empty());
    }

    #[test]
    fn test_assignment_propagation() {
        let set = legacy("{ var x int; p := &x; q := p; r := q }");
        assert_eq!(set.sorted(), vec!["p", "q", "r", "x"]);
    }

    #[test]
    fn test_assignment_of_dereference() {
        let set = legacy("{ v := *ptr }");
        assert_eq!(set.sorted(), vec!["ptr", "v"]);
    }

    #[test]
    fn test_var_initializer_propagates() {
        let set = legacy("{ var x int; var p = &x }");
        assert_eq!(set.sorted(), vec!["p", "x"]);
    }

    #[test]
    fn test_blank_target_skipped() {
        let set = legacy("{ var x int; _ = &x }");
        assert_eq!(set.sorted(), vec!["x"]);
    }

    #[test]
    fn test_propagation_follows_source_order() {
        // q copies p before p is known to escape, so q stays on the stack
        let set = legacy("{ var p *int; var x int; q := p; p = &x }");
        assert!(set.contains("p"));
        assert!(set.contains("x"));
        assert!(!set.contains("q"));
    }

    #[test]
    fn test_closure_pointer_signature() {
        let set = legacy("{ f := func(p *int, n int) (r *int) { return p }; f(nil, 1) }");
        assert!(set.contains("p"));
        assert!(set.contains("r"));
        assert!(!set.contains("n"));
    }

    #[test]
    fn test_closure_grouped_pointer_params() {
        let set = legacy("{ _ = func(a, b *int) {} }");
        assert_eq!(set.sorted(), vec!["a", "b"]);
    }

    #[test]
    fn test_closure_params_not_seen_yet() {
        // The literal's own parameter is only seen after its body is checked
        assert!(legacy("{ go func(n int) { use(n) }(1) }").is_empty());
    }

    #[test]
    fn test_legacy_shadowing_escapes() {
        let source = "{ x := 1; _ = x; go func() { x := 2; use(x) }() }";
        assert!(legacy(source).contains("x"));
        assert!(!scoped(source).contains("x"));
    }

    #[test]
    fn test_legacy_matches_unrelated_names() {
        // `f` in the literal is a selector field, `s.f` was seen outside
        let source = "{ s.f = 1; go func() { t.f = 2 }() }";
        assert!(legacy(source).contains("f"));
        assert!(scoped(source).is_empty());
    }

    #[test]
    fn test_scoped_nested_capture() {
        let source = "{
            total := 0
            run(func() {
                inner := 1
                run(func() { total += inner })
            })
        }";
        let set = scoped(source);
        assert!(set.contains("total"));
        assert!(set.contains("inner"));
    }

    #[test]
    fn test_scoped_params_are_outer() {
        let func = parse_func("func f(n int) { go func() { print(n) }() }").unwrap();
        let names = EscapeAnalyzer::new(EscapeMode::Scoped).analyze(&func);
        assert_eq!(names, vec!["n"]);
        // Legacy never saw `n` in the body before the literal
        assert!(analyze(&func).is_empty());
    }

    #[test]
    fn test_scoped_block_scopes() {
        // `y` is declared in an inner block, the closure's `y` is a global
        let source = "{ { y := 1; _ = y }; go func() { use(y) }() }";
        assert!(legacy(source).contains("y"));
        assert!(!scoped(source).contains("y"));
    }

    #[test]
    fn test_duplicates_permitted() {
        let names = analyze(&parse_body("{ var a int; go g(&a); go g(&a) }").unwrap());
        assert_eq!(names, vec!["a", "a"]);
        assert_eq!(EscapeSet::from(names).len(), 1);
    }

    #[test]
    fn test_unrecognized_constructs_are_skipped() {
        let source = "{
            for k, v := range m { total += k * v }
            if ok := check(); !ok { panic(\"x\") }
            xs := []int{1, 2}
            defer close(ch)
            x := <-ch
        }";
        assert!(legacy(source).is_empty());
        assert!(scoped(source).is_empty());
    }

    #[test]
    fn test_no_body() {
        let func = parse_func("func native(p *int) *int").unwrap();
        assert!(analyze(&func).is_empty());
    }

    #[test]
    fn test_analyze_source() {
        let results = analyze_source(
            "package main
            func a() *int { var x int; return &x }
            func b() int { var y int; return y }",
            EscapeMode::Legacy,
        )
        .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], ("a".to_string(), vec!["x".to_string()]));
        assert!(results[1].1.is_empty());

        assert!(analyze_source("package", EscapeMode::Legacy).is_err());
        assert!(analyze_source("func (", EscapeMode::Legacy).unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_inside_switch() {
        let source = "{
            var a int
            switch k := kind(); k {
            case 1:
                go g(&a)
            default:
            }
        }";
        assert_eq!(legacy(source).sorted(), vec!["a"]);
        assert_eq!(scoped(source).sorted(), vec!["a"]);
    }

    #[test]
    fn test_select_and_type_switch_bodies() {
        let source = "{
            var a, b int
            select {
            case v := <-in:
                go g(&a, v)
            }
            switch t := x.(type) {
            case *T:
                return &b
            }
        }";
        let set = legacy(source);
        assert!(set.contains("a"));
        assert!(set.contains("b"));
        let set = scoped(source);
        assert!(set.contains("a"));
        assert!(set.contains("b"));
    }

    #[test]
    fn test_scoped_case_clause_scope() {
        // `t` is bound per clause, the closure after the switch sees a global
        let source = "{
            switch t := x.(type) {
            case int:
                _ = t
            }
            go func() { use(t) }()
        }";
        assert!(legacy(source).contains("t"));
        assert!(!scoped(source).contains("t"));
    }

    #[test]
    fn test_skipped_statement_escapes_its_names() {
        let file = parse_file("func f() { var a, b int; a ?= b; return }").unwrap();
        assert_eq!(file.errors.len(), 1);
        let set: EscapeSet = analyze(&file.funcs[0]).into();
        assert_eq!(set.sorted(), vec!["a", "b"]);
    }

    #[test]
    fn test_whole_file_with_common_syntax() {
        let results = analyze_source(
            "package store
            import \"sync\"
            const limit = 8
            type Store struct { mu sync.Mutex; items map[string]*Item }
            type Item struct{}
            func (s *Store) Get(key string) (*Item, bool) {
                it, ok := s.items[key]
                return it, ok
            }
            func (s *Store) Watch(done chan struct{}) {
                var buf [limit]int
                go s.flush(&buf)
                select {
                case <-done:
                }
            }
            func Describe(v any) string {
                if s, ok := v.(fmt.Stringer); ok {
                    return s.String()
                }
                return \"\"
            }",
            EscapeMode::Legacy,
        )
        .unwrap();
        let names: Vec<_> = results.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["Get", "Watch", "Describe"]);
        assert_eq!(results[1].1, vec!["buf".to_string()]);
        assert!(results[2].1.is_empty());
    }

    #[test]
    fn test_scoped_receiver_is_outer() {
        let func = parse_func("func (s *Store) Run() { go func() { s.flush() }() }").unwrap();
        let names = EscapeAnalyzer::new(EscapeMode::Scoped).analyze(&func);
        assert_eq!(names, vec!["s"]);
    }

    #[test]
    fn test_scoped_grouped_var_shares_scope() {
        let source = "{ var ( n int; m = 2 ); go func() { use(n, m) }() }";
        assert_eq!(scoped(source).sorted(), vec!["m", "n"]);
    }

    #[test]
    fn test_escape_set_api() {
        let set: EscapeSet = vec!["b".to_string(), "a".to_string()].into_iter().collect();
        assert_eq!(set.sorted(), vec!["a", "b"]);
        assert_eq!(set.iter().count(), 2);
        assert!(!set.is_empty());
        assert_eq!(EscapeMode::default().to_string(), "legacy");
    }
}
