//! Dependency-directed type inference for dynamically typed programs.
//!
//! The engine abstractly interprets a program as a network of type
//! variables. Each analysis unit re-walks one scope's body against the
//! variables' current contents; whenever a variable grows, every unit that
//! previously read it is re-enqueued. Growth is monotone set-union with
//! element-wise container merging, so the worklist in
//! [`analyzer::scheduler`] drains to a deterministic fixpoint.
//!
//! ```
//! use typeflow_core::analyzer::Analyzer;
//! use typeflow_core::ast::{Expr, FunctionDef, Literal, Module, Parameter, Stmt};
//! use typeflow_core::cancel::CancellationToken;
//! use typeflow_core::eval::BasicEvaluator;
//! use typeflow_core::types::TypeDesc;
//! use std::sync::Arc;
//!
//! let mut def = FunctionDef::new("ident");
//! def.params.push(Parameter::new("x"));
//! def.body.push(Stmt::Return(Some(Expr::name("x"))));
//!
//! let mut module = Module::default();
//! module.body.push(Stmt::FunctionDef(Arc::new(def)));
//! module.body.push(Stmt::Assign {
//!     target: "y".to_string(),
//!     value: Expr::call(Expr::name("ident"), vec![Expr::Constant(Literal::Int(1))], 0),
//! });
//!
//! let mut analyzer = Analyzer::default();
//! let mid = analyzer.add_module("main", module);
//! analyzer
//!     .solve(&BasicEvaluator, &CancellationToken::new())
//!     .unwrap();
//!
//! let scope = analyzer.module(mid).scope;
//! let y = analyzer.scope(scope).get("y").unwrap();
//! assert!(analyzer.variable(y).types().contains(&TypeDesc::Int));
//! ```

pub mod analyzer;
pub mod arena;
pub mod ast;
pub mod cancel;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod eval;
pub mod providers;
pub mod types;

pub use analyzer::scheduler::SolveResult;
pub use analyzer::Analyzer;
pub use cancel::CancellationToken;
pub use config::Limits;
pub use error::{AnalysisError, Result};
pub use eval::{BasicEvaluator, EvalContext, Evaluator};
pub use types::{TypeDesc, TypeSet};
