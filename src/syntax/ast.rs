//! Syntax tree for function bodies
//!
//! The tree keeps the shapes the escape analyzer cares about: address-of and
//! dereference expressions, `go` statements, assignments, returns and
//! function literals. Everything else is still represented so traversal can
//! reach identifiers inside it, including statements the parser had to skip.

use super::parser::ParseError;

/// Source position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourcePos {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub pos: SourcePos,
}

impl Ident {
    pub fn new(name: impl Into<String>, pos: SourcePos) -> Self {
        Ident {
            name: name.into(),
            pos,
        }
    }

    /// The blank identifier `_`
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }
}

/// A parsed source unit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct File {
    pub package: Option<Ident>,
    /// Package-level `var`, `const` and `type` declarations
    pub decls: Vec<Stmt>,
    pub funcs: Vec<FuncDecl>,
    /// Errors recovered from while parsing
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    /// Method receiver
    pub recv: Option<Field>,
    pub name: Ident,
    pub type_params: Vec<Field>,
    pub ty: FuncType,
    /// `None` for declarations implemented by the host
    pub body: Option<Block>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FuncType {
    pub params: Vec<Field>,
    pub results: Vec<Field>,
}

/// One group of a parameter or result list: `a, b *int`
///
/// `names` is empty for unnamed parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub names: Vec<Ident>,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// `int`, `T`
    Named(Ident),
    /// `pkg.T`
    Qualified { package: Ident, name: Ident },
    /// `*T`
    Pointer(Box<TypeExpr>),
    /// `[]T`
    Slice(Box<TypeExpr>),
    /// `[N]T`, with no length for `[...]T`
    Array {
        len: Option<Box<Expr>>,
        elem: Box<TypeExpr>,
    },
    /// `map[K]V`
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    Chan {
        dir: ChanDir,
        elem: Box<TypeExpr>,
    },
    /// `func(...) ...`
    Func(FuncType),
    /// Embedded fields have no names
    Struct(Vec<Field>),
    /// Methods are named fields of function type, embedded types unnamed ones
    Interface(Vec<Field>),
    /// `List[T]`
    Instance {
        base: Box<TypeExpr>,
        args: Vec<TypeExpr>,
    },
    /// `~int | ~string` in a constraint
    Union(Vec<TypeExpr>),
    /// `...T` in the last parameter
    Variadic(Box<TypeExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    /// `chan T`
    Both,
    /// `chan<- T`
    Send,
    /// `<-chan T`
    Recv,
}

impl TypeExpr {
    #[inline]
    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeExpr::Pointer(_))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `:=`
    Define,
    /// `+=`, `<<=`, ...
    Compound(BinaryOp),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarSpec {
    pub names: Vec<Ident>,
    pub ty: Option<TypeExpr>,
    pub values: Vec<Expr>,
}

/// `type T U`, `type T = U`, `type L[E any] struct { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub name: Ident,
    pub params: Vec<Field>,
    pub alias: bool,
    pub ty: TypeExpr,
}

/// One `case` of a switch; an empty list is `default`
#[derive(Debug, Clone, PartialEq)]
pub struct CaseClause {
    pub list: Vec<Expr>,
    pub body: Vec<Stmt>,
}

impl CaseClause {
    #[inline]
    pub fn is_default(&self) -> bool {
        self.list.is_empty()
    }
}

/// One `case` of a select; `None` is `default`
#[derive(Debug, Clone, PartialEq)]
pub struct CommClause {
    pub comm: Option<Box<Stmt>>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var(VarSpec),
    Const(VarSpec),
    Type(TypeSpec),
    Assign {
        lhs: Vec<Expr>,
        op: AssignOp,
        rhs: Vec<Expr>,
    },
    IncDec {
        target: Expr,
        increment: bool,
    },
    Expr(Expr),
    /// `ch <- v`
    Send {
        chan: Expr,
        value: Expr,
    },
    Return(Vec<Expr>),
    /// `go f(x)`: the call runs as an independent task
    Go(CallExpr),
    Defer(CallExpr),
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        then: Block,
        /// Either `Stmt::If` or `Stmt::Block`
        els: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        expr: Expr,
        body: Block,
    },
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<Expr>,
        clauses: Vec<CaseClause>,
    },
    /// `switch v := x.(type) { ... }`
    TypeSwitch {
        init: Option<Box<Stmt>>,
        bind: Option<Ident>,
        expr: Expr,
        clauses: Vec<CaseClause>,
    },
    Select(Vec<CommClause>),
    Labeled {
        label: Ident,
        stmt: Box<Stmt>,
    },
    Block(Block),
    /// Grouped `var (...)`, `const (...)` or `type (...)`; opens no scope
    Group(Vec<Stmt>),
    Break(Option<Ident>),
    Continue(Option<Ident>),
    Goto(Ident),
    Fallthrough,
    Empty,
    /// Source the parser skipped, with the identifiers it mentioned
    Bad(Vec<Ident>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `&x`
    Addr,
    Neg,
    Plus,
    Not,
    BitNot,
    /// `<-ch`
    Recv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AndNot,
    LogAnd,
    LogOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Binding strength, higher binds tighter
    pub const fn precedence(self) -> u8 {
        match self {
            BinaryOp::LogOr => 1,
            BinaryOp::LogAnd => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or | BinaryOp::Xor => 4,
            BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Rem
            | BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::And
            | BinaryOp::AndNot => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub func: Box<Expr>,
    pub args: Vec<Expr>,
    /// Trailing `...` on the last argument
    pub spread: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(Ident),
    Lit(Literal),
    Paren(Box<Expr>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    /// `*p`
    Star(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call(CallExpr),
    Selector {
        expr: Box<Expr>,
        field: Ident,
    },
    Index {
        expr: Box<Expr>,
        index: Box<Expr>,
    },
    /// `a[lo:hi]`, `a[lo:hi:max]`
    Slice {
        expr: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
        max: Option<Box<Expr>>,
    },
    /// `x.(T)`, with no type in a type switch guard
    TypeAssert {
        expr: Box<Expr>,
        ty: Option<TypeExpr>,
    },
    FuncLit {
        ty: FuncType,
        body: Block,
    },
    Composite {
        ty: Option<TypeExpr>,
        elems: Vec<Expr>,
    },
    KeyValue {
        key: Box<Expr>,
        value: Box<Expr>,
    },
    /// A type in expression position, e.g. the argument of `new(T)`
    Type(TypeExpr),
}

impl Expr {
    /// Whether the expression takes an address or dereferences a pointer
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Expr::Star(_)
                | Expr::Unary {
                    op: UnaryOp::Addr,
                    ..
                }
        )
    }

    /// Name of the variable the expression operates on
    ///
    /// Sees through one layer of unary operators and dereferences, so `&x`,
    /// `*x` and `-x` all name `x`. Anything else names nothing.
    pub fn var_name(&self) -> Option<&str> {
        match self {
            Expr::Ident(ident) => Some(&ident.name),
            Expr::Star(inner) | Expr::Unary { expr: inner, .. } => inner.var_name(),
            _ => None,
        }
    }
}

/// A node handed to an [`inspect`] callback
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Block(&'a Block),
    Stmt(&'a Stmt),
    Expr(&'a Expr),
    Ident(&'a Ident),
    Type(&'a TypeExpr),
    Field(&'a Field),
    FuncType(&'a FuncType),
}

/// Pre-order walk over a tree
///
/// `f` is called on every node; children are visited only if it returns
/// `true`. Identifier expressions are reported as `Node::Ident`.
pub fn inspect<'a, F>(node: Node<'a>, f: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    if let Node::Expr(Expr::Ident(ident)) = node {
        f(Node::Ident(ident));
        return;
    }
    if !f(node) {
        return;
    }

    match node {
        Node::Block(block) => {
            for stmt in &block.stmts {
                inspect(Node::Stmt(stmt), f);
            }
        }
        Node::Stmt(stmt) => walk_stmt(stmt, f),
        Node::Expr(expr) => walk_expr(expr, f),
        Node::Ident(_) => {}
        Node::Type(ty) => walk_type(ty, f),
        Node::Field(field) => {
            for name in &field.names {
                inspect(Node::Ident(name), f);
            }
            inspect(Node::Type(&field.ty), f);
        }
        Node::FuncType(ty) => {
            for field in ty.params.iter().chain(&ty.results) {
                inspect(Node::Field(field), f);
            }
        }
    }
}

fn walk_stmt<'a, F>(stmt: &'a Stmt, f: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    match stmt {
        Stmt::Var(spec) | Stmt::Const(spec) => {
            for name in &spec.names {
                inspect(Node::Ident(name), f);
            }
            if let Some(ty) = &spec.ty {
                inspect(Node::Type(ty), f);
            }
            for value in &spec.values {
                inspect(Node::Expr(value), f);
            }
        }
        Stmt::Assign { lhs, rhs, .. } => {
            for expr in lhs.iter().chain(rhs) {
                inspect(Node::Expr(expr), f);
            }
        }
        Stmt::Type(spec) => {
            inspect(Node::Ident(&spec.name), f);
            for field in &spec.params {
                inspect(Node::Field(field), f);
            }
            inspect(Node::Type(&spec.ty), f);
        }
        Stmt::IncDec { target, .. } => inspect(Node::Expr(target), f),
        Stmt::Expr(expr) => inspect(Node::Expr(expr), f),
        Stmt::Send { chan, value } => {
            inspect(Node::Expr(chan), f);
            inspect(Node::Expr(value), f);
        }
        Stmt::Return(results) => {
            for expr in results {
                inspect(Node::Expr(expr), f);
            }
        }
        Stmt::Go(call) | Stmt::Defer(call) => walk_call(call, f),
        Stmt::If {
            init,
            cond,
            then,
            els,
        } => {
            if let Some(init) = init {
                inspect(Node::Stmt(init), f);
            }
            inspect(Node::Expr(cond), f);
            inspect(Node::Block(then), f);
            if let Some(els) = els {
                inspect(Node::Stmt(els), f);
            }
        }
        Stmt::For {
            init,
            cond,
            post,
            body,
        } => {
            if let Some(init) = init {
                inspect(Node::Stmt(init), f);
            }
            if let Some(cond) = cond {
                inspect(Node::Expr(cond), f);
            }
            if let Some(post) = post {
                inspect(Node::Stmt(post), f);
            }
            inspect(Node::Block(body), f);
        }
        Stmt::Range {
            key,
            value,
            expr,
            body,
            ..
        } => {
            for e in key.iter().chain(value) {
                inspect(Node::Expr(e), f);
            }
            inspect(Node::Expr(expr), f);
            inspect(Node::Block(body), f);
        }
        Stmt::Switch { init, tag, clauses } => {
            if let Some(init) = init {
                inspect(Node::Stmt(init), f);
            }
            if let Some(tag) = tag {
                inspect(Node::Expr(tag), f);
            }
            walk_clauses(clauses, f);
        }
        Stmt::TypeSwitch {
            init,
            bind,
            expr,
            clauses,
        } => {
            if let Some(init) = init {
                inspect(Node::Stmt(init), f);
            }
            if let Some(bind) = bind {
                inspect(Node::Ident(bind), f);
            }
            inspect(Node::Expr(expr), f);
            walk_clauses(clauses, f);
        }
        Stmt::Select(clauses) => {
            for clause in clauses {
                if let Some(comm) = &clause.comm {
                    inspect(Node::Stmt(comm), f);
                }
                for stmt in &clause.body {
                    inspect(Node::Stmt(stmt), f);
                }
            }
        }
        Stmt::Labeled { label, stmt } => {
            inspect(Node::Ident(label), f);
            inspect(Node::Stmt(stmt), f);
        }
        Stmt::Block(block) => inspect(Node::Block(block), f),
        Stmt::Group(stmts) => {
            for stmt in stmts {
                inspect(Node::Stmt(stmt), f);
            }
        }
        Stmt::Break(label) | Stmt::Continue(label) => {
            if let Some(label) = label {
                inspect(Node::Ident(label), f);
            }
        }
        Stmt::Goto(label) => inspect(Node::Ident(label), f),
        Stmt::Bad(idents) => {
            for ident in idents {
                inspect(Node::Ident(ident), f);
            }
        }
        Stmt::Fallthrough | Stmt::Empty => {}
    }
}

fn walk_clauses<'a, F>(clauses: &'a [CaseClause], f: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    for clause in clauses {
        for expr in &clause.list {
            inspect(Node::Expr(expr), f);
        }
        for stmt in &clause.body {
            inspect(Node::Stmt(stmt), f);
        }
    }
}

fn walk_call<'a, F>(call: &'a CallExpr, f: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    inspect(Node::Expr(&call.func), f);
    for arg in &call.args {
        inspect(Node::Expr(arg), f);
    }
}

fn walk_expr<'a, F>(expr: &'a Expr, f: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    match expr {
        Expr::Ident(ident) => inspect(Node::Ident(ident), f),
        Expr::Lit(_) => {}
        Expr::Paren(inner) | Expr::Star(inner) | Expr::Unary { expr: inner, .. } => {
            inspect(Node::Expr(inner), f)
        }
        Expr::Binary { lhs, rhs, .. } => {
            inspect(Node::Expr(lhs), f);
            inspect(Node::Expr(rhs), f);
        }
        Expr::Call(call) => walk_call(call, f),
        Expr::Selector { expr, field } => {
            inspect(Node::Expr(expr), f);
            inspect(Node::Ident(field), f);
        }
        Expr::Index { expr, index } => {
            inspect(Node::Expr(expr), f);
            inspect(Node::Expr(index), f);
        }
        Expr::Slice {
            expr,
            low,
            high,
            max,
        } => {
            inspect(Node::Expr(expr), f);
            for bound in [low, high, max].into_iter().flatten() {
                inspect(Node::Expr(bound), f);
            }
        }
        Expr::TypeAssert { expr, ty } => {
            inspect(Node::Expr(expr), f);
            if let Some(ty) = ty {
                inspect(Node::Type(ty), f);
            }
        }
        Expr::FuncLit { ty, body } => {
            inspect(Node::FuncType(ty), f);
            inspect(Node::Block(body), f);
        }
        Expr::Composite { ty, elems } => {
            if let Some(ty) = ty {
                inspect(Node::Type(ty), f);
            }
            for elem in elems {
                inspect(Node::Expr(elem), f);
            }
        }
        Expr::KeyValue { key, value } => {
            inspect(Node::Expr(key), f);
            inspect(Node::Expr(value), f);
        }
        Expr::Type(ty) => inspect(Node::Type(ty), f),
    }
}

fn walk_type<'a, F>(ty: &'a TypeExpr, f: &mut F)
where
    F: FnMut(Node<'a>) -> bool,
{
    match ty {
        TypeExpr::Named(ident) => inspect(Node::Ident(ident), f),
        TypeExpr::Qualified { package, name } => {
            inspect(Node::Ident(package), f);
            inspect(Node::Ident(name), f);
        }
        TypeExpr::Pointer(inner) | TypeExpr::Slice(inner) | TypeExpr::Variadic(inner) => {
            inspect(Node::Type(inner), f)
        }
        TypeExpr::Array { len, elem } => {
            if let Some(len) = len {
                inspect(Node::Expr(len), f);
            }
            inspect(Node::Type(elem), f);
        }
        TypeExpr::Map { key, value } => {
            inspect(Node::Type(key), f);
            inspect(Node::Type(value), f);
        }
        TypeExpr::Chan { elem, .. } => inspect(Node::Type(elem), f),
        TypeExpr::Func(func) => inspect(Node::FuncType(func), f),
        TypeExpr::Struct(fields) | TypeExpr::Interface(fields) => {
            for field in fields {
                inspect(Node::Field(field), f);
            }
        }
        TypeExpr::Instance { base, args } => {
            inspect(Node::Type(base), f);
            for arg in args {
                inspect(Node::Type(arg), f);
            }
        }
        TypeExpr::Union(terms) => {
            for term in terms {
                inspect(Node::Type(term), f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Ident {
        Ident::new(name, SourcePos::default())
    }

    fn id_expr(name: &str) -> Expr {
        Expr::Ident(ident(name))
    }

    fn names_in(node: Node<'_>) -> Vec<String> {
        let mut names = Vec::new();
        inspect(node, &mut |n| {
            if let Node::Ident(id) = n {
                names.push(id.name.clone());
            }
            true
        });
        names
    }

    #[test]
    fn test_is_reference() {
        let addr = Expr::Unary {
            op: UnaryOp::Addr,
            expr: Box::new(id_expr("x")),
        };
        let neg = Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(id_expr("x")),
        };
        assert!(addr.is_reference());
        assert!(Expr::Star(Box::new(id_expr("p"))).is_reference());
        assert!(!neg.is_reference());
        assert!(!id_expr("x").is_reference());
    }

    #[test]
    fn test_var_name() {
        let addr = Expr::Unary {
            op: UnaryOp::Addr,
            expr: Box::new(id_expr("x")),
        };
        assert_eq!(addr.var_name(), Some("x"));
        assert_eq!(Expr::Star(Box::new(id_expr("p"))).var_name(), Some("p"));
        assert_eq!(Expr::Paren(Box::new(id_expr("x"))).var_name(), None);
        assert_eq!(Expr::Lit(Literal::Int(1)).var_name(), None);
    }

    #[test]
    fn test_inspect_order() {
        // a = b.c + f(d)
        let stmt = Stmt::Assign {
            lhs: vec![id_expr("a")],
            op: AssignOp::Assign,
            rhs: vec![Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::Selector {
                    expr: Box::new(id_expr("b")),
                    field: ident("c"),
                }),
                rhs: Box::new(Expr::Call(CallExpr {
                    func: Box::new(id_expr("f")),
                    args: vec![id_expr("d")],
                    spread: false,
                })),
            }],
        };
        assert_eq!(names_in(Node::Stmt(&stmt)), vec!["a", "b", "c", "f", "d"]);
    }

    #[test]
    fn test_inspect_prunes() {
        let block = Block {
            stmts: vec![
                Stmt::Expr(id_expr("x")),
                Stmt::Expr(Expr::FuncLit {
                    ty: FuncType::default(),
                    body: Block {
                        stmts: vec![Stmt::Expr(id_expr("hidden"))],
                    },
                }),
            ],
        };

        let mut names = Vec::new();
        inspect(Node::Block(&block), &mut |n| match n {
            Node::Ident(id) => {
                names.push(id.name.clone());
                true
            }
            Node::Expr(Expr::FuncLit { .. }) => false,
            _ => true,
        });
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn test_inspect_types_and_fields() {
        let ty = FuncType {
            params: vec![Field {
                names: vec![ident("p")],
                ty: TypeExpr::Pointer(Box::new(TypeExpr::Qualified {
                    package: ident("pkg"),
                    name: ident("T"),
                })),
            }],
            results: vec![Field {
                names: vec![],
                ty: TypeExpr::Map {
                    key: Box::new(TypeExpr::Named(ident("string"))),
                    value: Box::new(TypeExpr::Interface(Vec::new())),
                },
            }],
        };
        assert_eq!(names_in(Node::FuncType(&ty)), vec!["p", "pkg", "T", "string"]);
    }

    #[test]
    fn test_inspect_switch_and_skipped() {
        // switch k { case a: go g(&b) }; <skipped: c d>
        let block = Block {
            stmts: vec![
                Stmt::Switch {
                    init: None,
                    tag: Some(id_expr("k")),
                    clauses: vec![CaseClause {
                        list: vec![id_expr("a")],
                        body: vec![Stmt::Go(CallExpr {
                            func: Box::new(id_expr("g")),
                            args: vec![Expr::Unary {
                                op: UnaryOp::Addr,
                                expr: Box::new(id_expr("b")),
                            }],
                            spread: false,
                        })],
                    }],
                },
                Stmt::Bad(vec![ident("c"), ident("d")]),
            ],
        };
        assert_eq!(names_in(Node::Block(&block)), vec!["k", "a", "g", "b", "c", "d"]);

        let mut gos = 0;
        inspect(Node::Block(&block), &mut |n| {
            if let Node::Stmt(Stmt::Go(_)) = n {
                gos += 1;
            }
            true
        });
        assert_eq!(gos, 1);
    }

    #[test]
    fn test_inspect_composite_types() {
        // struct { next *Node[T]; buf [n]byte; ch <-chan E }
        let ty = TypeExpr::Struct(vec![
            Field {
                names: vec![ident("next")],
                ty: TypeExpr::Pointer(Box::new(TypeExpr::Instance {
                    base: Box::new(TypeExpr::Named(ident("Node"))),
                    args: vec![TypeExpr::Named(ident("T"))],
                })),
            },
            Field {
                names: vec![ident("buf")],
                ty: TypeExpr::Array {
                    len: Some(Box::new(id_expr("n"))),
                    elem: Box::new(TypeExpr::Named(ident("byte"))),
                },
            },
            Field {
                names: vec![ident("ch")],
                ty: TypeExpr::Chan {
                    dir: ChanDir::Recv,
                    elem: Box::new(TypeExpr::Named(ident("E"))),
                },
            },
        ]);
        assert_eq!(
            names_in(Node::Type(&ty)),
            vec!["next", "Node", "T", "buf", "n", "byte", "ch", "E"]
        );
    }

    #[test]
    fn test_default_clause() {
        let clause = CaseClause {
            list: Vec::new(),
            body: Vec::new(),
        };
        assert!(clause.is_default());
    }

    #[test]
    fn test_precedence() {
        assert!(BinaryOp::Mul.precedence() > BinaryOp::Add.precedence());
        assert!(BinaryOp::Add.precedence() > BinaryOp::Lt.precedence());
        assert!(BinaryOp::LogAnd.precedence() > BinaryOp::LogOr.precedence());
    }
}
