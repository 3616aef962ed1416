//! End-to-end inference over small modules: calls, call-chain context
//! sensitivity, generators, classes, and solver behavior at the limits.

use std::sync::Arc;

use typeflow_core::analyzer::values::{ClassId, FunctionId};
use typeflow_core::analyzer::{Analyzer, LinkKind};
use typeflow_core::ast::{Expr, FunctionDef, Literal, Module, Parameter, Stmt};
use typeflow_core::cancel::CancellationToken;
use typeflow_core::config::Limits;
use typeflow_core::eval::{BasicEvaluator, EvalContext, Evaluator};
use typeflow_core::types::{TypeDesc, TypeSet};
use typeflow_core::SolveResult;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn solve(analyzer: &mut Analyzer) -> SolveResult {
    init_tracing();
    analyzer
        .solve(&BasicEvaluator, &CancellationToken::new())
        .unwrap()
}

fn module_var(analyzer: &Analyzer, scope_name: &str, analyzer_scope: typeflow_core::analyzer::scope::ScopeId) -> TypeSet {
    let var = analyzer
        .scope(analyzer_scope)
        .get(scope_name)
        .expect("binding exists");
    analyzer.variable(var).types().clone()
}

fn function_id(analyzer: &Analyzer, scope: typeflow_core::analyzer::scope::ScopeId, name: &str) -> FunctionId {
    let var = analyzer.scope(scope).get(name).expect("binding exists");
    analyzer
        .variable(var)
        .types()
        .functions()
        .next()
        .expect("function value")
}

fn class_id(analyzer: &Analyzer, scope: typeflow_core::analyzer::scope::ScopeId, name: &str) -> ClassId {
    let var = analyzer.scope(scope).get(name).expect("binding exists");
    analyzer
        .variable(var)
        .types()
        .iter()
        .find_map(|d| match d {
            TypeDesc::Class(c) => Some(*c),
            _ => None,
        })
        .expect("class value")
}

fn identity_def() -> Arc<FunctionDef> {
    let mut def = FunctionDef::new("ident");
    def.params.push(Parameter::new("x"));
    def.body.push(Stmt::Return(Some(Expr::name("x"))));
    Arc::new(def)
}

fn int_lit() -> Expr {
    Expr::Constant(Literal::Int(1))
}

fn str_lit() -> Expr {
    Expr::Constant(Literal::Str("s".to_string()))
}

#[test]
fn test_call_result_flows_to_assignment() {
    let mut module = Module::default();
    module.body.push(Stmt::FunctionDef(identity_def()));
    module.body.push(Stmt::Assign {
        target: "y".to_string(),
        value: Expr::call(Expr::name("ident"), vec![int_lit()], 0),
    });

    let mut analyzer = Analyzer::default();
    let mid = analyzer.add_module("main", module);
    let result = solve(&mut analyzer);
    assert!(result.completed);

    let scope = analyzer.module(mid).scope;
    assert_eq!(module_var(&analyzer, "y", scope), TypeSet::of(TypeDesc::Int));
}

#[test]
fn test_call_sites_specialize_independently() {
    let mut module = Module::default();
    module.body.push(Stmt::FunctionDef(identity_def()));
    module.body.push(Stmt::Assign {
        target: "a".to_string(),
        value: Expr::call(Expr::name("ident"), vec![int_lit()], 0),
    });
    module.body.push(Stmt::Assign {
        target: "b".to_string(),
        value: Expr::call(Expr::name("ident"), vec![str_lit()], 1),
    });

    let mut analyzer = Analyzer::default();
    let mid = analyzer.add_module("main", module);
    assert!(solve(&mut analyzer).completed);

    // Each call site gets its own context; neither sees the other's
    // argument types.
    let scope = analyzer.module(mid).scope;
    assert_eq!(module_var(&analyzer, "a", scope), TypeSet::of(TypeDesc::Int));
    assert_eq!(module_var(&analyzer, "b", scope), TypeSet::of(TypeDesc::Str));

    // The generic unit's parameter never absorbed the concrete arguments.
    let ident = function_id(&analyzer, scope, "ident");
    let unit = analyzer.function(ident).unit;
    let unit_scope = analyzer.unit(unit).scope;
    let x = analyzer.scope(unit_scope).get("x").unwrap();
    assert!(analyzer.variable(x).types().is_empty());
}

#[test]
fn test_chain_limit_zero_falls_back_to_generic_unit() {
    let mut limits = Limits::default();
    limits.call_chain_limit = 0;

    let mut module = Module::default();
    module.body.push(Stmt::FunctionDef(identity_def()));
    module.body.push(Stmt::Assign {
        target: "a".to_string(),
        value: Expr::call(Expr::name("ident"), vec![int_lit()], 0),
    });
    module.body.push(Stmt::Assign {
        target: "b".to_string(),
        value: Expr::call(Expr::name("ident"), vec![str_lit()], 1),
    });

    let mut analyzer = Analyzer::new(limits);
    let mid = analyzer.add_module("main", module);
    assert!(solve(&mut analyzer).completed);

    // Without context sensitivity both calls blend in the generic unit.
    let scope = analyzer.module(mid).scope;
    let blended = TypeSet::from_descs([TypeDesc::Int, TypeDesc::Str]);
    assert_eq!(module_var(&analyzer, "a", scope), blended);
    assert_eq!(module_var(&analyzer, "b", scope), blended);
}

#[test]
fn test_solver_reaches_fixpoint_and_stays_there() {
    let mut module = Module::default();
    module.body.push(Stmt::FunctionDef(identity_def()));
    module.body.push(Stmt::Assign {
        target: "y".to_string(),
        value: Expr::call(Expr::name("ident"), vec![int_lit()], 0),
    });

    let mut analyzer = Analyzer::default();
    analyzer.add_module("main", module);
    assert!(solve(&mut analyzer).completed);
    assert_eq!(analyzer.queue_len(), 0);

    // Nothing queued, nothing to do: solving again is a no-op.
    let again = solve(&mut analyzer);
    assert!(again.completed);
    assert_eq!(again.iterations, 0);
}

#[test]
fn test_iteration_cap_stops_with_work_queued() {
    let mut limits = Limits::default();
    limits.max_iterations = 0;

    let mut module = Module::default();
    module.body.push(Stmt::FunctionDef(identity_def()));

    let mut analyzer = Analyzer::new(limits);
    analyzer.add_module("main", module);
    let result = solve(&mut analyzer);
    assert!(!result.completed);
    assert_eq!(result.iterations, 0);
    assert!(analyzer.queue_len() > 0);
}

#[test]
fn test_cancelled_solve_commits_nothing_and_resumes() {
    let mut module = Module::default();
    module.body.push(Stmt::FunctionDef(identity_def()));
    module.body.push(Stmt::Assign {
        target: "y".to_string(),
        value: Expr::call(Expr::name("ident"), vec![int_lit()], 0),
    });

    let mut analyzer = Analyzer::default();
    let mid = analyzer.add_module("main", module);
    let scope = analyzer.module(mid).scope;

    let token = CancellationToken::new();
    token.cancel();
    let result = analyzer.solve(&BasicEvaluator, &token).unwrap();
    assert!(!result.completed);
    assert!(module_var(&analyzer, "ident", scope).is_empty());

    // A fresh token picks the queue back up and finishes the job.
    assert!(solve(&mut analyzer).completed);
    assert_eq!(module_var(&analyzer, "y", scope), TypeSet::of(TypeDesc::Int));
}

/// Delegates to [`BasicEvaluator`] but trips the token the first time it
/// sees a given name, so a pass can be interrupted from inside.
struct CancelOnName {
    name: &'static str,
    token: CancellationToken,
}

impl Evaluator for CancelOnName {
    fn evaluate(&self, cx: &mut EvalContext<'_>, expr: &Expr) -> TypeSet {
        if matches!(expr, Expr::Name(n) if n == self.name) {
            self.token.cancel();
        }
        BasicEvaluator.evaluate(cx, expr)
    }

    fn evaluate_annotation(&self, cx: &mut EvalContext<'_>, expr: &Expr) -> TypeSet {
        BasicEvaluator.evaluate_annotation(cx, expr)
    }

    fn call(&self, cx: &mut EvalContext<'_>, callees: &TypeSet, args: &[TypeSet]) -> TypeSet {
        BasicEvaluator.call(cx, callees, args)
    }
}

#[test]
fn test_cancel_mid_decorator_chain_commits_nothing_and_resumes() {
    init_tracing();

    let mut first = FunctionDef::new("first");
    first.params = vec![Parameter::new("f")];
    first.body.push(Stmt::Return(Some(int_lit())));

    let mut second = FunctionDef::new("second");
    second.params = vec![Parameter::new("f")];
    second.body.push(Stmt::Return(Some(str_lit())));

    let mut g = FunctionDef::new("g");
    g.decorators = vec![Expr::name("first"), Expr::name("second")];
    g.body.push(Stmt::Pass);

    let mut module = Module::default();
    module.body.push(Stmt::FunctionDef(Arc::new(first)));
    module.body.push(Stmt::FunctionDef(Arc::new(second)));
    module.body.push(Stmt::FunctionDef(Arc::new(g)));

    let mut analyzer = Analyzer::default();
    let mid = analyzer.add_module("main", module);
    let scope = analyzer.module(mid).scope;

    // The token trips while the first decorator is being evaluated, so the
    // pass stops between the two decorators with one already applied.
    let evaluator = CancelOnName {
        name: "first",
        token: CancellationToken::new(),
    };
    let result = analyzer.solve(&evaluator, &evaluator.token.clone()).unwrap();
    assert!(!result.completed);
    assert!(analyzer.queue_len() > 0);

    // Units before the interrupted one committed; the interrupted one left
    // its binding exactly as it was, not with the half-decorated value.
    assert!(!module_var(&analyzer, "first", scope).is_empty());
    assert!(module_var(&analyzer, "g", scope).is_empty());

    // Resuming applies the whole chain; the last decorator wins.
    assert!(solve(&mut analyzer).completed);
    assert_eq!(module_var(&analyzer, "g", scope), TypeSet::of(TypeDesc::Str));
}

#[test]
fn test_generator_annotation_fills_channels() {
    let mut def = FunctionDef::new("gen");
    def.is_generator = true;
    def.return_annotation = Some(Expr::subscript(
        Expr::name("Generator"),
        vec![Expr::name("int"), Expr::name("str"), Expr::name("None")],
    ));
    def.body.push(Stmt::Assign {
        target: "received".to_string(),
        value: Expr::Yield(Some(Box::new(int_lit()))),
    });

    let mut module = Module::default();
    module.body.push(Stmt::FunctionDef(Arc::new(def)));
    module.body.push(Stmt::Assign {
        target: "g".to_string(),
        value: Expr::call(Expr::name("gen"), vec![], 0),
    });

    let mut analyzer = Analyzer::default();
    let mid = analyzer.add_module("main", module);
    assert!(solve(&mut analyzer).completed);

    let scope = analyzer.module(mid).scope;
    let gen = function_id(&analyzer, scope, "gen");
    let unit = analyzer.function(gen).unit;
    let unit_scope = analyzer.unit(unit).scope;
    let data = analyzer.scope(unit_scope).function_data().unwrap();
    let channels = data.generator.as_ref().unwrap();

    assert!(analyzer
        .variable(channels.yields)
        .types()
        .contains(&TypeDesc::Int));
    assert!(analyzer
        .variable(channels.sends)
        .types()
        .contains(&TypeDesc::Str));
    assert!(analyzer
        .variable(channels.returns)
        .types()
        .contains(&TypeDesc::None));

    // The value of a yield expression is what callers send in.
    let received = analyzer.scope(unit_scope).get("received").unwrap();
    assert_eq!(
        analyzer.variable(received).types(),
        &TypeSet::of(TypeDesc::Str)
    );

    // Calling the function produces a generator value over the channels.
    let g = module_var(&analyzer, "g", scope);
    let has_generator = g.iter().any(|d| {
        matches!(d, TypeDesc::Generator { yields, .. } if yields.contains(&TypeDesc::Int))
    });
    assert!(has_generator, "expected a generator value, got {g:?}");
}

#[test]
fn test_instantiation_and_method_call() {
    let mut method = FunctionDef::new("m");
    method.params.push(Parameter::new("self"));
    method.body.push(Stmt::Return(Some(int_lit())));

    let class = typeflow_core::ast::ClassDef {
        name: "C".to_string(),
        bases: vec![],
        body: vec![Stmt::FunctionDef(Arc::new(method))],
    };

    let mut module = Module::default();
    module.body.push(Stmt::ClassDef(Arc::new(class)));
    module.body.push(Stmt::Assign {
        target: "obj".to_string(),
        value: Expr::call(Expr::name("C"), vec![], 0),
    });
    module.body.push(Stmt::Assign {
        target: "r".to_string(),
        value: Expr::call(Expr::member(Expr::name("obj"), "m"), vec![], 1),
    });

    let mut analyzer = Analyzer::default();
    let mid = analyzer.add_module("main", module);
    assert!(solve(&mut analyzer).completed);

    let scope = analyzer.module(mid).scope;
    let c = class_id(&analyzer, scope, "C");
    assert_eq!(
        module_var(&analyzer, "obj", scope),
        TypeSet::of(TypeDesc::Instance(c))
    );
    assert_eq!(module_var(&analyzer, "r", scope), TypeSet::of(TypeDesc::Int));

    // The bound method saw its instance as parameter zero.
    let m_unit = analyzer.linked_method_unit(c, "m").unwrap();
    let m_scope = analyzer.unit(m_unit).scope;
    let self_var = analyzer.scope(m_scope).function_data().unwrap().parameters[0];
    assert!(analyzer
        .variable(self_var)
        .types()
        .contains(&TypeDesc::Instance(c)));
}

#[test]
fn test_return_types_propagate_across_linked_classes() {
    let mut base_m = FunctionDef::new("m");
    base_m.params.push(Parameter::new("self"));
    base_m.return_annotation = Some(Expr::name("int"));

    let mut derived_m = FunctionDef::new("m");
    derived_m.params.push(Parameter::new("self"));

    let mut module = Module::default();
    module.body.push(Stmt::ClassDef(Arc::new(typeflow_core::ast::ClassDef {
        name: "Base".to_string(),
        bases: vec![],
        body: vec![Stmt::FunctionDef(Arc::new(base_m))],
    })));
    module.body.push(Stmt::ClassDef(Arc::new(typeflow_core::ast::ClassDef {
        name: "Derived".to_string(),
        bases: vec![Expr::name("Base")],
        body: vec![Stmt::FunctionDef(Arc::new(derived_m))],
    })));

    let mut analyzer = Analyzer::default();
    let mid = analyzer.add_module("main", module);
    let scope = analyzer.module(mid).scope;
    let base = class_id(&analyzer, scope, "Base");
    let derived = class_id(&analyzer, scope, "Derived");
    analyzer.link_return_types(base, derived);
    assert!(solve(&mut analyzer).completed);

    let derived_unit = analyzer.linked_method_unit(derived, "m").unwrap();
    let ret = analyzer.return_var(derived_unit).unwrap();
    assert!(analyzer.variable(ret).types().contains(&TypeDesc::Int));
}

#[test]
fn test_parameter_types_propagate_but_not_for_constructors() {
    let mut base_m = FunctionDef::new("m");
    base_m.params.push(Parameter::new("self"));
    base_m.params.push(Parameter::annotated("x", Expr::name("int")));

    let mut base_init = FunctionDef::new("__init__");
    base_init.params.push(Parameter::new("self"));
    base_init.params.push(Parameter::annotated("x", Expr::name("str")));

    let mut derived_m = FunctionDef::new("m");
    derived_m.params.push(Parameter::new("self"));
    derived_m.params.push(Parameter::new("x"));

    let mut derived_init = FunctionDef::new("__init__");
    derived_init.params.push(Parameter::new("self"));
    derived_init.params.push(Parameter::new("x"));

    let mut module = Module::default();
    module.body.push(Stmt::ClassDef(Arc::new(typeflow_core::ast::ClassDef {
        name: "Base".to_string(),
        bases: vec![],
        body: vec![
            Stmt::FunctionDef(Arc::new(base_init)),
            Stmt::FunctionDef(Arc::new(base_m)),
        ],
    })));
    module.body.push(Stmt::ClassDef(Arc::new(typeflow_core::ast::ClassDef {
        name: "Derived".to_string(),
        bases: vec![Expr::name("Base")],
        body: vec![
            Stmt::FunctionDef(Arc::new(derived_init)),
            Stmt::FunctionDef(Arc::new(derived_m)),
        ],
    })));

    let mut analyzer = Analyzer::default();
    let mid = analyzer.add_module("main", module);
    let scope = analyzer.module(mid).scope;
    let base = class_id(&analyzer, scope, "Base");
    let derived = class_id(&analyzer, scope, "Derived");
    analyzer.link_param_types(base, derived);
    assert!(solve(&mut analyzer).completed);

    let derived_m_unit = analyzer.linked_method_unit(derived, "m").unwrap();
    let m_scope = analyzer.unit(derived_m_unit).scope;
    let x = analyzer.scope(m_scope).get("x").unwrap();
    assert!(analyzer.variable(x).types().contains(&TypeDesc::Int));

    // Constructor-like methods stay out of signature propagation.
    let derived_init_unit = analyzer.linked_method_unit(derived, "__init__").unwrap();
    let init_scope = analyzer.unit(derived_init_unit).scope;
    let init_x = analyzer.scope(init_scope).get("x").unwrap();
    assert!(analyzer.variable(init_x).types().is_empty());
}

#[test]
fn test_propagation_link_cycles_terminate() {
    fn class_with_m(name: &str, annotated: bool) -> Stmt {
        let mut m = FunctionDef::new("m");
        m.params.push(Parameter::new("self"));
        if annotated {
            m.return_annotation = Some(Expr::name("int"));
        }
        Stmt::ClassDef(Arc::new(typeflow_core::ast::ClassDef {
            name: name.to_string(),
            bases: vec![],
            body: vec![Stmt::FunctionDef(Arc::new(m))],
        }))
    }

    let mut module = Module::default();
    module.body.push(class_with_m("A", true));
    module.body.push(class_with_m("B", false));
    module.body.push(class_with_m("C", false));

    let mut analyzer = Analyzer::default();
    let mid = analyzer.add_module("main", module);
    let scope = analyzer.module(mid).scope;
    let a = class_id(&analyzer, scope, "A");
    let b = class_id(&analyzer, scope, "B");
    let c = class_id(&analyzer, scope, "C");

    // A cycle plus a diamond shortcut; each class must still be visited at
    // most once.
    analyzer.link_return_types(a, b);
    analyzer.link_return_types(b, c);
    analyzer.link_return_types(c, a);
    analyzer.link_return_types(a, c);

    let reachable = analyzer.transitively_linked(a, LinkKind::ReturnTypes, &CancellationToken::new());
    assert_eq!(reachable.len(), 2);
    assert!(reachable.contains(&b));
    assert!(reachable.contains(&c));
    assert!(!reachable.contains(&a));

    assert!(solve(&mut analyzer).completed);

    for class in [b, c] {
        let unit = analyzer.linked_method_unit(class, "m").unwrap();
        let ret = analyzer.return_var(unit).unwrap();
        assert!(analyzer.variable(ret).types().contains(&TypeDesc::Int));
    }
}
