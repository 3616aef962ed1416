//! Expression and annotation evaluation.
//!
//! The engine proper never interprets expressions; it hands them to an
//! [`Evaluator`] together with an [`EvalContext`] naming the unit doing the
//! asking and the scope to resolve names in. [`BasicEvaluator`] covers the
//! surface the engine's own semantics need: names, member access (including
//! the `abc` decorator family and property reads), calls with call-chain
//! cloning, literals, containers, and the annotation grammar.

use crate::analyzer::closure::CallChain;
use crate::analyzer::scope::ScopeId;
use crate::analyzer::unit::UnitId;
use crate::analyzer::values::FunctionId;
use crate::analyzer::Analyzer;
use crate::ast::{CallSite, Expr, Literal};
use crate::analyzer::function::CallArgs;
use crate::types::{BuiltinModule, DescriptorKind, TypeDesc, TypeSet};

/// Synthetic call-site marker for calls the engine fabricates itself; these
/// never spawn call-chain clones.
pub const SYNTHETIC_SITE: CallSite = u32::MAX;

/// Evaluation context: which unit is asking, and where names resolve.
pub struct EvalContext<'a> {
    pub analyzer: &'a mut Analyzer,
    pub unit: UnitId,
    pub scope: ScopeId,
}

impl<'a> EvalContext<'a> {
    pub fn new(analyzer: &'a mut Analyzer, unit: UnitId, scope: ScopeId) -> Self {
        EvalContext {
            analyzer,
            unit,
            scope,
        }
    }

    /// Resolve a name along the scope chain, registering the asking unit as
    /// a dependent of the binding it finds. Unbound names fall back to the
    /// recognized builtins.
    pub fn name_types(&mut self, name: &str) -> TypeSet {
        if let Some(var) = self.analyzer.lookup(self.scope, name) {
            self.analyzer.add_dependency(var, self.unit);
            let types = self.analyzer.variable(var).types().clone();
            if !types.is_empty() {
                return types;
            }
        }
        builtin_value(name).map(TypeSet::of).unwrap_or_default()
    }
}

/// Recognized builtin bindings. Kept minimal: the descriptors decorator
/// classification keys on, and the `abc` module value.
fn builtin_value(name: &str) -> Option<TypeDesc> {
    match name {
        "property" => Some(TypeDesc::Descriptor(DescriptorKind::Property)),
        "staticmethod" => Some(TypeDesc::Descriptor(DescriptorKind::StaticMethod)),
        "classmethod" => Some(TypeDesc::Descriptor(DescriptorKind::ClassMethod)),
        "abstractmethod" => Some(TypeDesc::Descriptor(DescriptorKind::AbstractMethod)),
        "abc" => Some(TypeDesc::Module(BuiltinModule::Abc)),
        _ => None,
    }
}

fn abc_member(name: &str) -> Option<TypeDesc> {
    let kind = match name {
        "abstractmethod" => DescriptorKind::AbstractMethod,
        "abstractstaticmethod" => DescriptorKind::AbstractStaticMethod,
        "abstractclassmethod" => DescriptorKind::AbstractClassMethod,
        "abstractproperty" => DescriptorKind::AbstractProperty,
        _ => return None,
    };
    Some(TypeDesc::Descriptor(kind))
}

/// Expression evaluation strategy, injected into every analysis pass.
pub trait Evaluator {
    /// Types an expression evaluates to in `cx`, registering dependencies
    /// on every variable consulted.
    fn evaluate(&self, cx: &mut EvalContext<'_>, expr: &Expr) -> TypeSet;

    /// Types an expression denotes when read as an annotation: class names
    /// mean instances, subscript forms build containers.
    fn evaluate_annotation(&self, cx: &mut EvalContext<'_>, expr: &Expr) -> TypeSet;

    /// Result types of calling each value in `callees` with `args`.
    fn call(&self, cx: &mut EvalContext<'_>, callees: &TypeSet, args: &[TypeSet]) -> TypeSet;
}

/// The stock evaluator.
#[derive(Debug, Default)]
pub struct BasicEvaluator;

impl BasicEvaluator {
    fn member_types(&self, cx: &mut EvalContext<'_>, target: &TypeSet, name: &str) -> TypeSet {
        let mut result = TypeSet::new();
        for desc in target.iter().cloned().collect::<Vec<_>>() {
            match desc {
                TypeDesc::Module(BuiltinModule::Abc) => {
                    if let Some(d) = abc_member(name) {
                        result.insert(d);
                    }
                }
                TypeDesc::Class(class) => {
                    result.union_in_place(&self.class_member(cx, class, name, false));
                }
                TypeDesc::Instance(class) => {
                    result.union_in_place(&self.class_member(cx, class, name, true));
                }
                _ => {}
            }
        }
        result
    }

    /// Member lookup in a class scope. On instances, a property-backed
    /// function reads as its getter's return types.
    fn class_member(
        &self,
        cx: &mut EvalContext<'_>,
        class: crate::analyzer::values::ClassId,
        name: &str,
        through_instance: bool,
    ) -> TypeSet {
        let scope = cx.analyzer.class(class).scope;
        let Some(var) = cx.analyzer.scope(scope).get(name) else {
            return TypeSet::new();
        };
        cx.analyzer.add_dependency(var, cx.unit);
        let raw = cx.analyzer.variable(var).types().clone();
        if !through_instance {
            return raw;
        }

        let mut result = TypeSet::new();
        for desc in raw.iter() {
            if let TypeDesc::Function(f) = desc {
                let info = cx.analyzer.function(*f);
                if let Some(property) = info.property {
                    if cx.analyzer.property(property).getter == *f {
                        let getter_unit = cx.analyzer.function(*f).unit;
                        if let Some(ret) = cx.analyzer.return_var(getter_unit) {
                            cx.analyzer.add_dependency(ret, cx.unit);
                            result.union_in_place(&cx.analyzer.variable(ret).types().clone());
                        }
                        continue;
                    }
                }
            }
            result.insert(desc.clone());
        }
        result
    }

    /// Route a call to a function value. A concrete call site within the
    /// chain limit gets a context-specific closure unit; everything else
    /// lands on the canonical unit.
    fn call_function(
        &self,
        cx: &mut EvalContext<'_>,
        function: FunctionId,
        args: &[TypeSet],
        site: CallSite,
    ) -> TypeSet {
        let canonical = cx.analyzer.function(function).unit;
        let target = self.call_target(cx, function, canonical, args, site);

        if !args.is_empty() {
            let mut call_args = CallArgs::positional(args.to_vec());
            // Bound methods receive their instance in slot zero, so explicit
            // arguments start at the second parameter.
            let info = cx.analyzer.function(function);
            if let Some(class) = info.declaring_class {
                if !info.is_static && !info.is_class_method {
                    call_args
                        .positional
                        .insert(0, TypeSet::of(TypeDesc::Instance(class)));
                }
            }
            if cx.analyzer.update_parameters(target, &call_args, true).unwrap_or_default() {
                cx.analyzer.enqueue(target);
            }
        }

        let def = cx.analyzer.function(function).def.clone();
        if def.is_generator {
            // Calling a generator function yields a generator value over the
            // unit's channel variables.
            let scope = cx.analyzer.unit(target).scope;
            let channels = cx
                .analyzer
                .scope(scope)
                .function_data()
                .and_then(|d| d.generator.as_ref())
                .map(|g| (g.yields, g.sends, g.returns));
            let Some((y_var, s_var, r_var)) = channels else {
                return TypeSet::new();
            };
            for var in [y_var, s_var, r_var] {
                cx.analyzer.add_dependency(var, cx.unit);
            }
            return TypeSet::of(TypeDesc::Generator {
                yields: cx.analyzer.variable(y_var).types().clone(),
                sends: cx.analyzer.variable(s_var).types().clone(),
                returns: cx.analyzer.variable(r_var).types().clone(),
            });
        }

        match cx.analyzer.return_var(target) {
            Some(ret) => {
                cx.analyzer.add_dependency(ret, cx.unit);
                cx.analyzer.variable(ret).types().clone()
            }
            None => TypeSet::new(),
        }
    }

    fn call_target(
        &self,
        cx: &mut EvalContext<'_>,
        function: FunctionId,
        canonical: UnitId,
        args: &[TypeSet],
        site: CallSite,
    ) -> UnitId {
        if site == SYNTHETIC_SITE || args.is_empty() {
            return canonical;
        }
        let limit = cx.analyzer.limits().call_chain_limit;
        let chain = match cx.analyzer.unit_chain(cx.unit) {
            Some(chain) => chain.extended(site, limit),
            None if limit > 0 => Some(CallChain::single(site)),
            None => None,
        };
        match chain {
            Some(chain) => cx
                .analyzer
                .closure_unit(function, chain)
                .unwrap_or(canonical),
            None => canonical,
        }
    }
}

impl Evaluator for BasicEvaluator {
    fn evaluate(&self, cx: &mut EvalContext<'_>, expr: &Expr) -> TypeSet {
        match expr {
            Expr::Name(name) => cx.name_types(name),
            Expr::Member { target, name } => {
                let target = self.evaluate(cx, target);
                self.member_types(cx, &target, name)
            }
            Expr::Call { func, args, site } => {
                let callees = self.evaluate(cx, func);
                let arg_types: Vec<TypeSet> =
                    args.iter().map(|a| self.evaluate(cx, a)).collect();
                self.call_at(cx, &callees, &arg_types, *site)
            }
            // Subscripts carry meaning only in annotation position.
            Expr::Subscript { .. } => TypeSet::new(),
            Expr::Constant(lit) => literal_types(lit),
            Expr::Tuple(elems) => {
                let slots: Vec<TypeSet> = elems.iter().map(|e| self.evaluate(cx, e)).collect();
                TypeSet::of(TypeDesc::Tuple(slots))
            }
            Expr::List(elems) => {
                let mut inner = TypeSet::new();
                for e in elems {
                    inner.union_in_place(&self.evaluate(cx, e));
                }
                TypeSet::of(TypeDesc::List(inner))
            }
            Expr::Dict(items) => {
                let mut keys = TypeSet::new();
                let mut values = TypeSet::new();
                for (k, v) in items {
                    keys.union_in_place(&self.evaluate(cx, k));
                    values.union_in_place(&self.evaluate(cx, v));
                }
                TypeSet::of(TypeDesc::Dict { keys, values })
            }
            // Yield values route through the generator channels in the body
            // walk; as a bare expression here it produces nothing.
            Expr::Yield(_) => TypeSet::new(),
        }
    }

    fn evaluate_annotation(&self, cx: &mut EvalContext<'_>, expr: &Expr) -> TypeSet {
        match expr {
            Expr::Name(name) => annotation_name(cx, name),
            Expr::Constant(Literal::None) => TypeSet::of(TypeDesc::None),
            // A string annotation re-reads as the name it spells.
            Expr::Constant(Literal::Str(s)) => annotation_name(cx, s),
            Expr::Subscript { target, index } => {
                let head = match target.as_ref() {
                    Expr::Name(n) => n.as_str(),
                    _ => return TypeSet::new(),
                };
                match (head, index.len()) {
                    ("Generator", 3) => {
                        let yields = self.evaluate_annotation(cx, &index[0]);
                        let sends = self.evaluate_annotation(cx, &index[1]);
                        let returns = self.evaluate_annotation(cx, &index[2]);
                        TypeSet::of(TypeDesc::Generator {
                            yields,
                            sends,
                            returns,
                        })
                    }
                    ("Iterator" | "Iterable", 1) => {
                        let yields = self.evaluate_annotation(cx, &index[0]);
                        TypeSet::of(TypeDesc::Generator {
                            yields,
                            sends: TypeSet::of(TypeDesc::None),
                            returns: TypeSet::of(TypeDesc::None),
                        })
                    }
                    ("list" | "List", 1) => {
                        TypeSet::of(TypeDesc::List(self.evaluate_annotation(cx, &index[0])))
                    }
                    ("set" | "Set", 1) => {
                        TypeSet::of(TypeDesc::SetOf(self.evaluate_annotation(cx, &index[0])))
                    }
                    ("dict" | "Dict", 2) => TypeSet::of(TypeDesc::Dict {
                        keys: self.evaluate_annotation(cx, &index[0]),
                        values: self.evaluate_annotation(cx, &index[1]),
                    }),
                    ("tuple" | "Tuple", _) => TypeSet::of(TypeDesc::Tuple(
                        index
                            .iter()
                            .map(|e| self.evaluate_annotation(cx, e))
                            .collect(),
                    )),
                    ("Optional", 1) => {
                        let mut types = self.evaluate_annotation(cx, &index[0]);
                        types.insert(TypeDesc::None);
                        types
                    }
                    ("Union", _) => {
                        let mut types = TypeSet::new();
                        for e in index {
                            types.union_in_place(&self.evaluate_annotation(cx, e));
                        }
                        types
                    }
                    _ => TypeSet::new(),
                }
            }
            other => instantiate(self.evaluate(cx, other)),
        }
    }

    fn call(&self, cx: &mut EvalContext<'_>, callees: &TypeSet, args: &[TypeSet]) -> TypeSet {
        self.call_at(cx, callees, args, SYNTHETIC_SITE)
    }
}

impl BasicEvaluator {
    fn call_at(
        &self,
        cx: &mut EvalContext<'_>,
        callees: &TypeSet,
        args: &[TypeSet],
        site: CallSite,
    ) -> TypeSet {
        let mut result = TypeSet::new();
        for desc in callees.iter().cloned().collect::<Vec<_>>() {
            match desc {
                TypeDesc::Class(class) => {
                    // Instantiation; constructor parameters see the args.
                    if !args.is_empty() {
                        if let Some(init) = cx.analyzer.linked_method_unit(class, "__init__") {
                            let mut call_args = CallArgs::positional(args.to_vec());
                            // Slot zero is the instance itself.
                            call_args
                                .positional
                                .insert(0, TypeSet::of(TypeDesc::Instance(class)));
                            if cx
                                .analyzer
                                .update_parameters(init, &call_args, true)
                                .unwrap_or_default()
                            {
                                cx.analyzer.enqueue(init);
                            }
                        }
                    }
                    result.insert(TypeDesc::Instance(class));
                }
                TypeDesc::Function(function) => {
                    result.union_in_place(&self.call_function(cx, function, args, site));
                }
                _ => {}
            }
        }
        result
    }
}

/// Annotation meaning of a bare name: a scalar keyword, or an instance of
/// whatever class the name resolves to.
fn annotation_name(cx: &mut EvalContext<'_>, name: &str) -> TypeSet {
    let scalar = match name {
        "None" => Some(TypeDesc::None),
        "bool" => Some(TypeDesc::Bool),
        "int" => Some(TypeDesc::Int),
        "float" => Some(TypeDesc::Float),
        "str" => Some(TypeDesc::Str),
        "bytes" => Some(TypeDesc::Bytes),
        "Any" => return TypeSet::new(),
        _ => None,
    };
    if let Some(desc) = scalar {
        return TypeSet::of(desc);
    }
    instantiate(cx.name_types(name))
}

/// Annotation position reads class values as instances.
fn instantiate(types: TypeSet) -> TypeSet {
    types
        .iter()
        .map(|d| match d {
            TypeDesc::Class(c) => TypeDesc::Instance(*c),
            other => other.clone(),
        })
        .collect()
}

fn literal_types(lit: &Literal) -> TypeSet {
    let desc = match lit {
        Literal::None => TypeDesc::None,
        Literal::Bool(_) => TypeDesc::Bool,
        Literal::Int(_) => TypeDesc::Int,
        Literal::Float(_) => TypeDesc::Float,
        Literal::Str(_) => TypeDesc::Str,
        Literal::Bytes(_) => TypeDesc::Bytes,
    };
    TypeSet::of(desc)
}
