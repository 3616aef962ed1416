//! Function analysis.
//!
//! One pass over a function unit runs in a strict order: default-parameter
//! and annotation resolution in the declaring scope, return-annotation
//! resolution (with generator-protocol decomposition), decorator processing
//! left-to-right, implicit first-parameter setup, then the body walk in the
//! function's own scope. The function's exposed type — possibly transformed
//! by generic decorators — is committed to the declaring scope only after a
//! full pass, so a cancelled pass never leaves a half-applied decorator
//! chain visible.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::ast::{self, ParameterKind};
use crate::cancel::CancellationToken;
use crate::diagnostics::AnalysisEvent;
use crate::error::{AnalysisError, Result};
use crate::eval::{EvalContext, Evaluator};
use crate::types::{DescriptorKind, TypeDesc, TypeSet};

use super::scope::ScopeId;
use super::unit::{Outcome, UnitId};
use super::values::{FunctionId, PropertyInfo};
use super::variable::VarId;
use super::{Analyzer, LinkKind};

/// Argument types observed at one call site, fed into a unit's parameters
/// before a call-chain-specific re-analysis.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<TypeSet>,
    pub keyword: Vec<(String, TypeSet)>,
}

impl CallArgs {
    pub fn positional(args: Vec<TypeSet>) -> Self {
        CallArgs {
            positional: args,
            keyword: Vec::new(),
        }
    }
}

/// Companion (stub) declaration found for a function by name in the
/// companion module's matching scope.
struct CompanionAnnotation {
    unit: UnitId,
    decl_scope: ScopeId,
    def: Arc<ast::FunctionDef>,
}

impl Analyzer {
    /// Create the parameter variables for a function unit's scope. Idempotent.
    pub fn ensure_parameters(&mut self, unit: UnitId) -> Result<()> {
        let (fid, scope) = self.function_unit_parts(unit)?;
        let def = self.functions[fid].def.clone();
        let existing = self.function_scope(scope)?.parameters.len();
        for param in def.params.iter().skip(existing) {
            let var = self.declare(scope, &param.name);
            if let Some(data) = self.scopes[scope].function_data_mut() {
                data.parameters.push(var);
            }
        }
        Ok(())
    }

    /// Seed the implicit first parameter of bound methods: the owning class
    /// instance, or the class value itself for classmethods.
    pub fn ensure_parameter_zero(&mut self, unit: UnitId) -> Result<()> {
        let (fid, scope) = self.function_unit_parts(unit)?;
        let (class, is_static, is_class_method) = {
            let info = &self.functions[fid];
            match info.declaring_class {
                Some(c) => (c, info.is_static, info.is_class_method),
                None => return Ok(()),
            }
        };
        if is_static {
            return Ok(());
        }
        let Some(&param0) = self.function_scope(scope)?.parameters.first() else {
            return Ok(());
        };
        let desc = if is_class_method {
            TypeDesc::Class(class)
        } else {
            TypeDesc::Instance(class)
        };
        self.add_types(param0, &TypeSet::of(desc), false);
        Ok(())
    }

    /// Feed call-site argument types into a unit's parameters. Returns
    /// whether any parameter type actually changed — the signal for whether
    /// re-analysis is worthwhile.
    pub fn update_parameters(
        &mut self,
        unit: UnitId,
        args: &CallArgs,
        enqueue: bool,
    ) -> Result<bool> {
        self.ensure_parameters(unit)?;
        let (fid, scope) = self.function_unit_parts(unit)?;
        let def = self.functions[fid].def.clone();
        let params: SmallVec<[VarId; 4]> = self.function_scope(scope)?.parameters.clone();

        let mut changed = false;
        let mut positional = args.positional.iter();
        for (param, &var) in def.params.iter().zip(params.iter()) {
            match param.kind {
                ParameterKind::Normal => {
                    if let Some(types) = positional.next() {
                        changed |= self.add_types(var, types, enqueue);
                    }
                }
                ParameterKind::List => {
                    let mut rest = TypeSet::new();
                    for types in positional.by_ref() {
                        rest.union_in_place(types);
                    }
                    if !rest.is_empty() {
                        changed |= self.add_types(var, &TypeSet::of(TypeDesc::List(rest)), enqueue);
                    }
                }
                ParameterKind::Dictionary => {}
            }
        }
        for (name, types) in &args.keyword {
            let named = def
                .params
                .iter()
                .position(|p| &p.name == name && p.kind == ParameterKind::Normal);
            if let Some(i) = named {
                changed |= self.add_types(params[i], types, enqueue);
            } else if let Some(i) = def.params.iter().position(|p| p.kind == ParameterKind::Dictionary)
            {
                let dict = TypeSet::of(TypeDesc::Dict {
                    keys: TypeSet::of(TypeDesc::Str),
                    values: types.clone(),
                });
                changed |= self.add_types(params[i], &dict, enqueue);
            }
        }
        Ok(changed)
    }

    pub(crate) fn analyze_function(
        &mut self,
        unit: UnitId,
        evaluator: &dyn Evaluator,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let (fid, scope) = self.function_unit_parts(unit)?;
        let decl_scope = self.decl_scope(unit)?;
        let def = self.functions[fid].def.clone();
        self.ensure_parameters(unit)?;

        // Companion (stub) declaration; a parameter-count mismatch discards
        // the whole companion annotation set for this function.
        let mut companion = self.companion_function(unit, fid);
        if let Some(c) = &companion {
            if c.def.params.len() != def.params.len() {
                debug!(function = %def.name, "annotation parameter count mismatch");
                self.events.push(AnalysisEvent::AnnotationParameterCountMismatch {
                    function: def.name.clone(),
                });
                companion = None;
            }
        }

        if self.analyze_default_parameters(unit, fid, companion.as_ref(), evaluator, cancel)?
            == Outcome::Cancelled
        {
            return Ok(Outcome::Cancelled);
        }

        let Some(exposed) = self.process_decorators(unit, fid, evaluator, cancel)? else {
            return Ok(Outcome::Cancelled);
        };

        self.ensure_parameter_zero(unit)?;

        // Bind the name before walking the body so recursive and forward
        // references resolve; the final exposed type lands after the walk.
        // Units that registered on the binding while it was still empty must
        // be re-run now, so the pre-bind enqueues dependents.
        let name_var = self.declare(decl_scope, &def.name);
        if self.vars[name_var].types().is_empty() {
            self.add_types(name_var, &TypeSet::of(TypeDesc::Function(fid)), true);
        }

        if self.walk_body(unit, scope, &def.body, evaluator, cancel)? == Outcome::Cancelled {
            return Ok(Outcome::Cancelled);
        }

        self.set_types(name_var, exposed, true);
        Ok(Outcome::Completed)
    }

    // ---- annotations and defaults ----------------------------------------

    /// Resolve parameter defaults plus parameter/return annotations, in
    /// declaration order, against the declaring scope. Priority per site:
    /// inline annotation, companion annotation, registered providers.
    fn analyze_default_parameters(
        &mut self,
        unit: UnitId,
        fid: FunctionId,
        companion: Option<&CompanionAnnotation>,
        evaluator: &dyn Evaluator,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let def = self.functions[fid].def.clone();
        let decl_scope = self.decl_scope(unit)?;
        let overwrite = self.limits.use_type_stub_packages_exclusively;

        for (i, param) in def.params.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }

            let mut annotation = param
                .annotation
                .as_ref()
                .map(|a| self.eval_annotation(evaluator, unit, decl_scope, a))
                .filter(|t| !t.is_empty());
            if annotation.is_none() {
                if let Some(comp) = companion {
                    if let Some(expr) = comp.def.params.get(i).and_then(|p| p.annotation.as_ref()) {
                        // Companion annotations resolve in the companion's
                        // own context, not ours.
                        let types = self.eval_annotation(evaluator, comp.unit, comp.decl_scope, expr);
                        if !types.is_empty() {
                            annotation = Some(types);
                        }
                    }
                }
            }
            if annotation.is_none() {
                let providers = std::mem::take(&mut self.param_providers);
                for provider in &providers {
                    if let Some(types) = provider.get_annotation(self, unit, param) {
                        if !types.is_empty() {
                            annotation = Some(types);
                            break;
                        }
                    }
                }
                self.param_providers = providers;
            }

            if let Some(types) = annotation {
                self.add_parameter_types(unit, fid, &param.name, &types, overwrite, cancel)?;
            }

            // Default values union in regardless of annotations, and never
            // with overwrite.
            if param.kind == ParameterKind::Normal {
                if let Some(default) = &param.default {
                    let types = self.eval_expr(evaluator, unit, decl_scope, default);
                    if !types.is_empty() {
                        self.add_parameter_types(unit, fid, &param.name, &types, false, cancel)?;
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        self.resolve_return_annotation(unit, fid, companion, evaluator, cancel)
    }

    fn resolve_return_annotation(
        &mut self,
        unit: UnitId,
        fid: FunctionId,
        companion: Option<&CompanionAnnotation>,
        evaluator: &dyn Evaluator,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let def = self.functions[fid].def.clone();
        let scope = self.units[unit].scope;
        let decl_scope = self.decl_scope(unit)?;
        let overwrite = self.limits.use_type_stub_packages_exclusively;

        let mut annotation = def
            .return_annotation
            .as_ref()
            .map(|a| self.eval_annotation(evaluator, unit, decl_scope, a))
            .filter(|t| !t.is_empty());
        if annotation.is_none() {
            if let Some(comp) = companion {
                if let Some(expr) = comp.def.return_annotation.as_ref() {
                    let types = self.eval_annotation(evaluator, comp.unit, comp.decl_scope, expr);
                    if !types.is_empty() {
                        annotation = Some(types);
                    }
                }
            }
        }
        if annotation.is_none() {
            let providers = std::mem::take(&mut self.return_providers);
            for provider in &providers {
                if let Some(types) = provider.get_annotation(self, unit) {
                    if !types.is_empty() {
                        annotation = Some(types);
                        break;
                    }
                }
            }
            self.return_providers = providers;
        }
        let Some(annotation) = annotation else {
            return Ok(Outcome::Completed);
        };

        if def.is_generator {
            // Split the annotation into its generator-protocol component and
            // feed the yielded/sent/returned channels.
            let (protocol, _residual) = annotation.split_generator();
            if let Some((yields, sends, returns)) = protocol {
                let channels = self.scopes[scope]
                    .function_data()
                    .and_then(|d| d.generator.as_ref())
                    .map(|g| (g.yields, g.sends, g.returns));
                if let Some((y_var, s_var, r_var)) = channels {
                    if overwrite {
                        self.set_types(y_var, yields, true);
                        self.lock(y_var);
                        self.set_types(s_var, sends, true);
                        self.lock(s_var);
                        self.set_types(r_var, returns, true);
                        self.lock(r_var);
                    } else {
                        self.add_types(y_var, &yields, true);
                        self.add_types(s_var, &sends, true);
                        self.add_types(r_var, &returns, true);
                    }
                }
            }
            return Ok(Outcome::Completed);
        }

        let return_value = self.function_scope(scope)?.return_value;
        if overwrite && !annotation.is_empty() {
            self.set_types(return_value, annotation.clone(), true);
            self.lock(return_value);
        } else {
            self.add_types(return_value, &annotation, true);
        }

        let locked = self.vars[return_value].is_locked();
        self.propagate_return_types(fid, &annotation, locked, cancel);
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        Ok(Outcome::Completed)
    }

    /// Apply a parameter-type update locally, then fan it out across the
    /// parameter-type propagation links. Returns whether the local variable
    /// changed.
    fn add_parameter_types(
        &mut self,
        unit: UnitId,
        fid: FunctionId,
        name: &str,
        types: &TypeSet,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let overwrite = overwrite && !types.is_empty();
        let scope = self.units[unit].scope;
        let added = self.apply_parameter(scope, name, types, overwrite);
        // Propagation is not gated on local growth: a linked class may have
        // committed its method binding after the types first landed here.
        self.propagate_parameter_types(fid, name, types, overwrite, cancel);
        Ok(added)
    }

    /// The fan-out half: identically named parameter of the same-named
    /// method on every class reachable over the parameter links. Lambdas and
    /// constructor-like methods never propagate.
    fn propagate_parameter_types(
        &mut self,
        fid: FunctionId,
        name: &str,
        types: &TypeSet,
        overwrite: bool,
        cancel: &CancellationToken,
    ) {
        let (class, fname, origin) = {
            let info = &self.functions[fid];
            if info.def.is_lambda || info.is_constructor() {
                return;
            }
            match info.declaring_class {
                Some(c) => (c, info.def.name.clone(), info.unit),
                None => return,
            }
        };
        for linked in self.transitively_linked(class, LinkKind::ParameterTypes, cancel) {
            if cancel.is_cancelled() {
                break;
            }
            if let Some(linked_unit) = self.linked_method_unit_tracked(linked, &fname, origin) {
                let linked_scope = self.units[linked_unit].scope;
                self.apply_parameter(linked_scope, name, types, overwrite);
            }
        }
    }

    fn apply_parameter(&mut self, scope: ScopeId, name: &str, types: &TypeSet, overwrite: bool) -> bool {
        let Some(var) = self.scopes[scope].get(name) else {
            return false;
        };
        if overwrite {
            let changed = self.set_types(var, types.clone(), false);
            self.lock(var);
            changed
        } else {
            self.add_types(var, types, false)
        }
    }

    /// Fan a return-type update out across the return-type propagation
    /// links, preserving the origin's lock decision.
    fn propagate_return_types(
        &mut self,
        fid: FunctionId,
        types: &TypeSet,
        locked: bool,
        cancel: &CancellationToken,
    ) {
        let (class, fname, origin) = {
            let info = &self.functions[fid];
            if info.is_constructor() {
                return;
            }
            match info.declaring_class {
                Some(c) => (c, info.def.name.clone(), info.unit),
                None => return,
            }
        };
        for linked in self.transitively_linked(class, LinkKind::ReturnTypes, cancel) {
            if cancel.is_cancelled() {
                break;
            }
            let Some(linked_unit) = self.linked_method_unit_tracked(linked, &fname, origin) else {
                continue;
            };
            let Some(ret) = self.return_var(linked_unit) else {
                continue;
            };
            if locked {
                self.set_types(ret, types.clone(), true);
                self.lock(ret);
            } else {
                self.add_types(ret, types, true);
            }
        }
    }

    // ---- decorators ------------------------------------------------------

    /// Process the declared decorator list left-to-right. Returns the final
    /// exposed type, or `None` if the pass was cancelled mid-chain — in
    /// which case nothing has been committed.
    fn process_decorators(
        &mut self,
        unit: UnitId,
        fid: FunctionId,
        evaluator: &dyn Evaluator,
        cancel: &CancellationToken,
    ) -> Result<Option<TypeSet>> {
        let def = self.functions[fid].def.clone();
        let decl_scope = self.decl_scope(unit)?;
        let mut exposed = TypeSet::of(TypeDesc::Function(fid));
        if def.decorators.is_empty() {
            return Ok(Some(exposed));
        }

        let mut chain_expr = ast::Expr::name(def.name.clone());
        for (index, dec) in def.decorators.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let value = self.eval_expr(evaluator, unit, decl_scope, dec);

            if value.contains(&TypeDesc::Descriptor(DescriptorKind::Property)) {
                self.process_getter_decorator(unit, fid);
            } else if value.contains(&TypeDesc::Descriptor(DescriptorKind::StaticMethod)) {
                self.functions[fid].is_static = true;
            } else if value.contains(&TypeDesc::Descriptor(DescriptorKind::ClassMethod)) {
                self.functions[fid].is_class_method = true;
            } else if self.process_abstract_decorators(unit, fid, &value) {
                // handled
            } else if self.process_setter_decorator(unit, fid, dec, evaluator, cancel)? {
                // handled (possibly as a silent no-op)
            } else {
                // Generic decorator: synthesize a call of the decorator
                // against the current exposed type. The synthetic node is
                // cached per decorator position so repeated passes keep one
                // identity.
                let call_expr = {
                    let data = self.units[unit]
                        .function_mut()
                        .ok_or(AnalysisError::NotAFunctionUnit(unit))?;
                    data.decorator_calls
                        .entry(index)
                        .or_insert_with(|| {
                            ast::Expr::call(dec.clone(), vec![chain_expr.clone()], u32::MAX)
                        })
                        .clone()
                };
                chain_expr = call_expr;

                let mut decorated = TypeSet::new();
                let mut any_results = false;
                for desc in value.iter() {
                    if let TypeDesc::Function(df) = desc {
                        // A decorator that is an enclosing function of this
                        // unit would loop on itself.
                        let dec_scope = self.units[self.functions[*df].unit].scope;
                        if self.encloses(dec_scope, self.units[unit].scope) {
                            continue;
                        }
                    }
                    let result = {
                        let mut cx = EvalContext::new(self, unit, decl_scope);
                        evaluator.call(&mut cx, &TypeSet::of(desc.clone()), std::slice::from_ref(&exposed))
                    };
                    decorated.union_in_place(&result);
                    any_results = true;
                }
                if self.limits.process_custom_decorators && any_results {
                    exposed = decorated;
                }
            }
        }
        Ok(Some(exposed))
    }

    fn process_getter_decorator(&mut self, unit: UnitId, fid: FunctionId) {
        let def = self.functions[fid].def.clone();
        if def.params.len() != 1 || !self.decl_scope_is_class(unit) {
            self.report_skip(fid, "property getter requires one parameter and a class scope");
            return;
        }
        match self.functions[fid].property {
            // Getters are declared, and processed, before their setters.
            Some(existing) => debug_assert_eq!(self.properties[existing].getter, fid),
            None => {
                let property = self.properties.alloc(PropertyInfo {
                    getter: fid,
                    setter: None,
                });
                self.functions[fid].property = Some(property);
            }
        }
    }

    fn process_abstract_decorators(&mut self, unit: UnitId, fid: FunctionId, value: &TypeSet) -> bool {
        let mut handled = false;
        if value.contains(&TypeDesc::Descriptor(DescriptorKind::AbstractMethod)) {
            self.functions[fid].is_abstract = true;
            handled = true;
        }
        if value.contains(&TypeDesc::Descriptor(DescriptorKind::AbstractStaticMethod)) {
            self.functions[fid].is_static = true;
            self.functions[fid].is_abstract = true;
            handled = true;
        }
        if value.contains(&TypeDesc::Descriptor(DescriptorKind::AbstractClassMethod)) {
            self.functions[fid].is_class_method = true;
            self.functions[fid].is_abstract = true;
            handled = true;
        }
        if value.contains(&TypeDesc::Descriptor(DescriptorKind::AbstractProperty)) {
            self.process_getter_decorator(unit, fid);
            self.functions[fid].is_abstract = true;
            handled = true;
        }
        handled
    }

    /// `@x.setter` linking. Returns whether the decorator had setter shape
    /// at all; malformed shapes are consumed silently.
    fn process_setter_decorator(
        &mut self,
        unit: UnitId,
        fid: FunctionId,
        dec: &ast::Expr,
        evaluator: &dyn Evaluator,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let target = match dec {
            ast::Expr::Member { target, name } if name == "setter" => (**target).clone(),
            _ => return Ok(false),
        };
        let def = self.functions[fid].def.clone();
        if def.params.len() != 2 {
            self.report_skip(fid, "property setter requires exactly two parameters");
            return Ok(true);
        }
        if !self.decl_scope_is_class(unit) {
            self.report_skip(fid, "property setter requires a class scope");
            return Ok(true);
        }

        let decl_scope = self.decl_scope(unit)?;
        let getters = self.eval_expr(evaluator, unit, decl_scope, &target);
        if getters.is_empty() {
            return Ok(true);
        }

        let mut getter_found = false;
        let candidates: Vec<FunctionId> = getters.functions().collect();
        for gid in candidates {
            if gid == fid {
                continue;
            }
            let Some(property) = self.functions[gid].property else {
                continue;
            };
            if self.properties[property].getter != gid {
                continue;
            }
            debug_assert!(!getter_found, "two getters claiming the same setter");

            self.properties[property].setter = Some(fid);
            self.functions[fid].property = Some(property);

            // Bidirectional consistency between `x = obj.prop` and
            // `obj.prop = x`: the setter's value parameter feeds the
            // getter's return type and vice versa.
            let setter_scope = self.units[unit].scope;
            let Some(&value_param) = self.function_scope(setter_scope)?.parameters.get(1) else {
                continue;
            };
            let getter_unit = self.functions[gid].unit;
            if let Some(getter_return) = self.return_var(getter_unit) {
                let value_types = self.vars[value_param].types().clone();
                self.add_types(getter_return, &value_types, true);
                let locked = self.vars[getter_return].is_locked();
                self.propagate_return_types(gid, &value_types, locked, cancel);

                let return_types = self.vars[getter_return].types().clone();
                self.add_types(value_param, &return_types, false);
                self.propagate_parameter_types(fid, &def.params[1].name, &return_types, false, cancel);
            }
            getter_found = true;
        }
        Ok(true)
    }

    // ---- body walk -------------------------------------------------------

    /// Walk one scope's statements against current inputs. Nested function
    /// and class definitions already have their own units from the overview
    /// pass and are skipped here.
    pub(crate) fn walk_body(
        &mut self,
        unit: UnitId,
        scope: ScopeId,
        body: &[ast::Stmt],
        evaluator: &dyn Evaluator,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        for stmt in body {
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            match stmt {
                ast::Stmt::Assign { target, value } => {
                    let types = match value {
                        ast::Expr::Yield(inner) => {
                            self.eval_yield(unit, scope, inner.as_deref(), evaluator)
                        }
                        _ => self.eval_expr(evaluator, unit, scope, value),
                    };
                    let var = self.declare(scope, target);
                    if !types.is_empty() {
                        self.add_types(var, &types, true);
                    }
                }
                ast::Stmt::Return(value) => {
                    let types = match value {
                        Some(expr) => self.eval_expr(evaluator, unit, scope, expr),
                        None => TypeSet::of(TypeDesc::None),
                    };
                    // A generator's `return` feeds the returned channel.
                    let target = self.scopes[scope].function_data().map(|d| {
                        d.generator
                            .as_ref()
                            .map(|g| g.returns)
                            .unwrap_or(d.return_value)
                    });
                    if let Some(var) = target {
                        if !types.is_empty() {
                            self.add_types(var, &types, true);
                        }
                    }
                }
                ast::Stmt::Expr(expr) => {
                    if let ast::Expr::Yield(inner) = expr {
                        self.eval_yield(unit, scope, inner.as_deref(), evaluator);
                    } else {
                        self.eval_expr(evaluator, unit, scope, expr);
                    }
                }
                _ => {}
            }
        }
        Ok(Outcome::Completed)
    }

    /// Feed the yielded channel and produce the sent channel's types as the
    /// yield expression's value.
    fn eval_yield(
        &mut self,
        unit: UnitId,
        scope: ScopeId,
        inner: Option<&ast::Expr>,
        evaluator: &dyn Evaluator,
    ) -> TypeSet {
        let yielded = match inner {
            Some(expr) => self.eval_expr(evaluator, unit, scope, expr),
            None => TypeSet::of(TypeDesc::None),
        };
        let channels = self.scopes[scope]
            .function_data()
            .and_then(|d| d.generator.as_ref())
            .map(|g| (g.yields, g.sends));
        if let Some((yields, sends)) = channels {
            self.add_types(yields, &yielded, true);
            self.add_dependency(sends, unit);
            return self.vars[sends].types().clone();
        }
        TypeSet::new()
    }

    // ---- helpers ---------------------------------------------------------

    fn function_unit_parts(&self, unit: UnitId) -> Result<(FunctionId, ScopeId)> {
        let data = self.units.get(unit).ok_or(AnalysisError::MissingUnit(unit))?;
        let function = data
            .function()
            .ok_or(AnalysisError::NotAFunctionUnit(unit))?
            .function;
        Ok((function, data.scope))
    }

    fn decl_scope(&self, unit: UnitId) -> Result<ScopeId> {
        Ok(self
            .units
            .get(unit)
            .ok_or(AnalysisError::MissingUnit(unit))?
            .function()
            .ok_or(AnalysisError::NotAFunctionUnit(unit))?
            .decl_scope)
    }

    fn decl_scope_is_class(&self, unit: UnitId) -> bool {
        self.units[unit]
            .function()
            .map(|f| self.scopes[f.decl_scope].is_class())
            .unwrap_or(false)
    }

    fn companion_function(&mut self, unit: UnitId, fid: FunctionId) -> Option<CompanionAnnotation> {
        let module = self.units.get(unit)?.module;
        let companion_module = self.modules[module].companion?;
        let (name, class_name) = {
            let info = &self.functions[fid];
            let class_name = info
                .declaring_class
                .map(|c| self.classes[c].name.clone());
            (info.def.name.clone(), class_name)
        };

        let mut scope = self.modules[companion_module].scope;
        if let Some(class_name) = class_name {
            let class_var = self.scopes[scope].get(&class_name)?;
            self.add_dependency(class_var, unit);
            let class = self.vars[class_var].types().iter().find_map(|d| match d {
                TypeDesc::Class(c) => Some(*c),
                _ => None,
            })?;
            scope = self.classes[class].scope;
        }

        let var = self.scopes[scope].get(&name)?;
        self.add_dependency(var, unit);
        let companion_fid = self.vars[var].types().functions().next()?;
        if companion_fid == fid {
            return None;
        }
        let (companion_unit, companion_def) = {
            let info = &self.functions[companion_fid];
            (info.unit, info.def.clone())
        };
        let companion_decl = self.units.get(companion_unit)?.function()?.decl_scope;

        // Changes to the companion's signature must re-run this unit.
        if let Some(ret) = self.return_var(companion_unit) {
            self.add_dependency(ret, unit);
        }
        let companion_scope = self.units[companion_unit].scope;
        let params: SmallVec<[VarId; 4]> = self.scopes[companion_scope]
            .function_data()
            .map(|d| d.parameters.clone())
            .unwrap_or_default();
        for param in params {
            self.add_dependency(param, unit);
        }

        Some(CompanionAnnotation {
            unit: companion_unit,
            decl_scope: companion_decl,
            def: companion_def,
        })
    }

    fn report_skip(&mut self, fid: FunctionId, reason: &str) {
        if !self.limits.report_silent_decorator_skips {
            return;
        }
        let function = self.functions[fid].def.name.clone();
        self.events.push(AnalysisEvent::DecoratorSkipped {
            function,
            reason: reason.to_string(),
        });
    }

    pub(crate) fn eval_expr(
        &mut self,
        evaluator: &dyn Evaluator,
        unit: UnitId,
        scope: ScopeId,
        expr: &ast::Expr,
    ) -> TypeSet {
        evaluator.evaluate(&mut EvalContext::new(self, unit, scope), expr)
    }

    fn eval_annotation(
        &mut self,
        evaluator: &dyn Evaluator,
        unit: UnitId,
        scope: ScopeId,
        expr: &ast::Expr,
    ) -> TypeSet {
        evaluator.evaluate_annotation(&mut EvalContext::new(self, unit, scope), expr)
    }
}
