//! Input AST structures.
//!
//! Parsing source text is an external collaborator's job; these are the
//! shapes the engine consumes. Definition nodes are `Arc`-shared so analysis
//! units can hold their defining node without tying lifetimes to the module
//! tree.

use std::sync::Arc;

/// Identifier for one call site, used as a link in a
/// [`CallChain`](crate::analyzer::closure::CallChain). Assigned by whoever
/// builds the AST; only equality matters.
pub type CallSite = u32;

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    FunctionDef(Arc<FunctionDef>),
    ClassDef(Arc<ClassDef>),
    Assign { target: String, value: Expr },
    Return(Option<Expr>),
    Expr(Expr),
    Pass,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub decorators: Vec<Expr>,
    pub return_annotation: Option<Expr>,
    pub body: Vec<Stmt>,
    pub is_lambda: bool,
    pub is_generator: bool,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionDef {
            name: name.into(),
            params: Vec::new(),
            decorators: Vec::new(),
            return_annotation: None,
            body: Vec::new(),
            is_lambda: false,
            is_generator: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Ordinary positional-or-keyword parameter.
    Normal,
    /// Variadic positional (`*args`).
    List,
    /// Variadic keyword (`**kwargs`).
    Dictionary,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Parameter {
            name: name.into(),
            kind: ParameterKind::Normal,
            annotation: None,
            default: None,
        }
    }

    pub fn annotated(name: impl Into<String>, annotation: Expr) -> Self {
        Parameter {
            annotation: Some(annotation),
            ..Parameter::new(name)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Name(String),
    Member {
        target: Box<Expr>,
        name: String,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        site: CallSite,
    },
    /// Annotation form like `Generator[int, str, None]` or `list[int]`.
    Subscript {
        target: Box<Expr>,
        index: Vec<Expr>,
    },
    Constant(Literal),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Yield(Option<Box<Expr>>),
}

impl Expr {
    pub fn name(s: impl Into<String>) -> Expr {
        Expr::Name(s.into())
    }

    pub fn member(target: Expr, name: impl Into<String>) -> Expr {
        Expr::Member {
            target: Box::new(target),
            name: name.into(),
        }
    }

    pub fn call(func: Expr, args: Vec<Expr>, site: CallSite) -> Expr {
        Expr::Call {
            func: Box::new(func),
            args,
            site,
        }
    }

    pub fn subscript(target: Expr, index: Vec<Expr>) -> Expr {
        Expr::Subscript {
            target: Box::new(target),
            index,
        }
    }
}
