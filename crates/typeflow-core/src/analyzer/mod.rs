//! The dependency-directed analysis engine.
//!
//! All analysis state lives in per-kind arenas owned by [`Analyzer`]:
//! variables, scopes, units, functions, properties, classes and modules
//! cross-reference each other through integer handles. Mutating a variable
//! re-enqueues its dependent units; the worklist loop in
//! [`scheduler`](self::scheduler) drains until fixpoint.
//!
//! Single-writer by design: nothing here synchronizes. Callers sharing an
//! analyzer across threads must serialize access themselves.

pub mod closure;
pub mod function;
pub mod scheduler;
pub mod scope;
pub mod unit;
pub mod values;
pub mod variable;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::arena::{Arena, Id};
use crate::ast;
use crate::cancel::CancellationToken;
use crate::config::Limits;
use crate::diagnostics::{AnalysisEvent, EventSink};
use crate::error::{AnalysisError, Result};
use crate::eval::Evaluator;
use crate::providers::{ParameterAnnotationProvider, ReturnAnnotationProvider};
use crate::types::{TypeDesc, TypeSet};

use closure::CallChain;
use scope::{FunctionScopeData, GeneratorChannels, Scope, ScopeId, ScopeKind};
use smallvec::SmallVec;
use unit::{FunctionUnit, Outcome, UnitData, UnitId, UnitKind};
use values::{ClassId, ClassInfo, FunctionId, FunctionInfo, PropertyInfo};
use variable::{VarId, VariableDef};

/// One analyzed module: its AST, root scope, and optional companion (stub)
/// module consulted for external annotations.
#[derive(Debug)]
pub struct ModuleData {
    pub name: String,
    pub ast: Arc<ast::Module>,
    pub scope: ScopeId,
    pub companion: Option<ModuleId>,
}

pub type ModuleId = Id<ModuleData>;

/// Which propagation-link relation to traverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    ParameterTypes,
    ReturnTypes,
}

pub struct Analyzer {
    limits: Limits,
    vars: Arena<VariableDef>,
    scopes: Arena<Scope>,
    units: Arena<UnitData>,
    functions: Arena<FunctionInfo>,
    properties: Arena<PropertyInfo>,
    classes: Arena<ClassInfo>,
    modules: Arena<ModuleData>,
    /// Call-chain clone cache: one closure unit per (function, chain).
    closures: HashMap<(FunctionId, CallChain), UnitId>,
    queue: VecDeque<UnitId>,
    queued: HashSet<UnitId>,
    events: EventSink,
    param_providers: Vec<Box<dyn ParameterAnnotationProvider>>,
    return_providers: Vec<Box<dyn ReturnAnnotationProvider>>,
    next_version: u32,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl Analyzer {
    pub fn new(limits: Limits) -> Self {
        Analyzer {
            limits,
            vars: Arena::new(),
            scopes: Arena::new(),
            units: Arena::new(),
            functions: Arena::new(),
            properties: Arena::new(),
            classes: Arena::new(),
            modules: Arena::new(),
            closures: HashMap::new(),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            events: EventSink::default(),
            param_providers: Vec::new(),
            return_providers: Vec::new(),
            next_version: 1,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn add_parameter_provider(&mut self, provider: Box<dyn ParameterAnnotationProvider>) {
        self.param_providers.push(provider);
    }

    pub fn add_return_provider(&mut self, provider: Box<dyn ReturnAnnotationProvider>) {
        self.return_providers.push(provider);
    }

    // ---- arena accessors -------------------------------------------------

    pub fn variable(&self, var: VarId) -> &VariableDef {
        &self.vars[var]
    }

    pub fn scope(&self, scope: ScopeId) -> &Scope {
        &self.scopes[scope]
    }

    pub fn unit(&self, unit: UnitId) -> &UnitData {
        &self.units[unit]
    }

    pub fn function(&self, function: FunctionId) -> &FunctionInfo {
        &self.functions[function]
    }

    pub fn property(&self, property: values::PropertyId) -> &PropertyInfo {
        &self.properties[property]
    }

    pub fn class(&self, class: ClassId) -> &ClassInfo {
        &self.classes[class]
    }

    pub fn module(&self, module: ModuleId) -> &ModuleData {
        &self.modules[module]
    }

    // ---- type variables --------------------------------------------------

    pub fn new_variable(&mut self) -> VarId {
        self.vars.alloc(VariableDef::new())
    }

    /// Grow-only union into a variable. On growth, dependents are re-enqueued
    /// unless the caller will trigger re-analysis itself (`enqueue = false`).
    pub fn add_types(&mut self, var: VarId, types: &TypeSet, enqueue: bool) -> bool {
        let def = &mut self.vars[var];
        let grew = def.add_types(types);
        if grew && enqueue {
            let deps: SmallVec<[UnitId; 8]> = def.dependents().collect();
            for dep in deps {
                self.enqueue(dep);
            }
        }
        grew
    }

    /// Authoritative overwrite of a variable's set.
    pub fn set_types(&mut self, var: VarId, types: TypeSet, enqueue: bool) -> bool {
        let def = &mut self.vars[var];
        let changed = def.set_types(types);
        if changed && enqueue {
            let deps: SmallVec<[UnitId; 8]> = def.dependents().collect();
            for dep in deps {
                self.enqueue(dep);
            }
        }
        changed
    }

    pub fn lock(&mut self, var: VarId) {
        self.vars[var].lock();
    }

    pub fn add_dependency(&mut self, var: VarId, unit: UnitId) {
        self.vars[var].add_dependency(unit);
    }

    // ---- scopes ----------------------------------------------------------

    /// Bind `name` in `scope` to an existing or fresh variable.
    pub fn declare(&mut self, scope: ScopeId, name: &str) -> VarId {
        if let Some(var) = self.scopes[scope].get(name) {
            return var;
        }
        let var = self.vars.alloc(VariableDef::new());
        self.scopes[scope].bind(name, var);
        var
    }

    /// Resolve a name by walking the scope chain outward.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<VarId> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(var) = self.scopes[s].get(name) {
                return Some(var);
            }
            cur = self.scopes[s].parent;
        }
        None
    }

    /// Whether `outer` is `scope` or one of its enclosing scopes.
    pub fn encloses(&self, outer: ScopeId, scope: ScopeId) -> bool {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if s == outer {
                return true;
            }
            cur = self.scopes[s].parent;
        }
        false
    }

    pub(crate) fn function_scope(&self, scope: ScopeId) -> Result<&FunctionScopeData> {
        self.scopes[scope]
            .function_data()
            .ok_or(AnalysisError::NotAFunctionScope(scope))
    }

    /// Return-slot variable of a function unit's scope.
    pub fn return_var(&self, unit: UnitId) -> Option<VarId> {
        self.scopes[self.units.get(unit)?.scope]
            .function_data()
            .map(|data| data.return_value)
    }

    /// Call-chain identity of a unit, if it is a closure clone.
    pub fn unit_chain(&self, unit: UnitId) -> Option<CallChain> {
        self.units.get(unit)?.function()?.chain.clone()
    }

    // ---- modules and the overview pass -----------------------------------

    /// Register a module and seed units for its top-level scopes.
    pub fn add_module(&mut self, name: &str, module: ast::Module) -> ModuleId {
        let ast = Arc::new(module);
        let module_id = self.modules.next_id();
        let scope = self.scopes.alloc(Scope::new(ScopeKind::Module(module_id), None, name));
        self.modules.alloc(ModuleData {
            name: name.to_string(),
            ast: ast.clone(),
            scope,
            companion: None,
        });
        self.overview_stmts(module_id, scope, None, &ast.body);
        let unit = self.units.alloc(UnitData::module_unit(module_id, scope));
        self.record_new_unit(unit, name);
        self.enqueue(unit);
        module_id
    }

    /// Declare `companion` as the stub/forward-declaration module consulted
    /// for `module`'s external annotations.
    pub fn set_companion(&mut self, module: ModuleId, companion: ModuleId) {
        self.modules[module].companion = Some(companion);
    }

    fn overview_stmts(
        &mut self,
        module: ModuleId,
        scope: ScopeId,
        decl_class: Option<ClassId>,
        stmts: &[ast::Stmt],
    ) {
        for stmt in stmts {
            match stmt {
                ast::Stmt::FunctionDef(def) => {
                    self.overview_function(module, scope, decl_class, def.clone());
                }
                ast::Stmt::ClassDef(def) => {
                    self.overview_class(module, scope, def.clone());
                }
                _ => {}
            }
        }
    }

    fn overview_function(
        &mut self,
        module: ModuleId,
        decl_scope: ScopeId,
        decl_class: Option<ClassId>,
        def: Arc<ast::FunctionDef>,
    ) -> FunctionId {
        let function = self.functions.next_id();
        let scope = self.new_function_scope(function, decl_scope, &def);
        let unit_id = self.units.next_id();
        self.functions
            .alloc(FunctionInfo::new(def.clone(), module, decl_class, unit_id));
        let unit = self
            .units
            .alloc(UnitData::function_unit(module, scope, function, decl_scope));
        debug_assert_eq!(unit, unit_id);

        // Name binding exists from the start so forward references resolve;
        // the function value is assigned during analysis.
        self.declare(decl_scope, &def.name);

        self.overview_stmts(module, scope, None, &def.body);
        self.record_new_unit(unit, &def.name);
        self.enqueue(unit);
        function
    }

    fn overview_class(
        &mut self,
        module: ModuleId,
        decl_scope: ScopeId,
        def: Arc<ast::ClassDef>,
    ) -> ClassId {
        let class = self.classes.next_id();
        let scope = self
            .scopes
            .alloc(Scope::new(ScopeKind::Class(class), Some(decl_scope), &def.name));
        self.classes
            .alloc(ClassInfo::new(&def.name, module, scope));
        let name_var = self.declare(decl_scope, &def.name);
        self.add_types(name_var, &TypeSet::of(TypeDesc::Class(class)), false);
        self.overview_stmts(module, scope, Some(class), &def.body);
        class
    }

    fn new_function_scope(
        &mut self,
        function: FunctionId,
        decl_scope: ScopeId,
        def: &ast::FunctionDef,
    ) -> ScopeId {
        let return_value = self.vars.alloc(VariableDef::new());
        let generator = def.is_generator.then(|| GeneratorChannels {
            yields: self.vars.alloc(VariableDef::new()),
            sends: self.vars.alloc(VariableDef::new()),
            returns: self.vars.alloc(VariableDef::new()),
        });
        self.scopes.alloc(Scope::new(
            ScopeKind::Function(FunctionScopeData {
                function,
                parameters: SmallVec::new(),
                return_value,
                generator,
                linked: Vec::new(),
            }),
            Some(decl_scope),
            &def.name,
        ))
    }

    fn record_new_unit(&mut self, unit: UnitId, name: &str) {
        debug!(?unit, name, "new analysis unit");
        self.events.push(AnalysisEvent::NewUnit {
            unit,
            name: name.to_string(),
        });
    }

    // ---- class propagation links -----------------------------------------

    /// Install a directed parameter-type propagation link. Direction and
    /// membership come from external hierarchy metadata.
    pub fn link_param_types(&mut self, from: ClassId, to: ClassId) {
        let links = &mut self.classes[from].param_type_links;
        if !links.contains(&to) {
            links.push(to);
        }
    }

    /// Install a directed return-type propagation link.
    pub fn link_return_types(&mut self, from: ClassId, to: ClassId) {
        let links = &mut self.classes[from].return_type_links;
        if !links.contains(&to) {
            links.push(to);
        }
    }

    /// Classes transitively reachable over one link relation, visiting each
    /// at most once. The start class is not part of the result.
    pub fn transitively_linked(
        &self,
        start: ClassId,
        kind: LinkKind,
        cancel: &CancellationToken,
    ) -> Vec<ClassId> {
        let mut visited: HashSet<ClassId> = HashSet::new();
        visited.insert(start);
        let mut result = Vec::new();
        let mut worklist = vec![start];
        while let Some(class) = worklist.pop() {
            if cancel.is_cancelled() {
                break;
            }
            let links = match kind {
                LinkKind::ParameterTypes => &self.classes[class].param_type_links,
                LinkKind::ReturnTypes => &self.classes[class].return_type_links,
            };
            for &linked in links {
                if visited.insert(linked) {
                    result.push(linked);
                    worklist.push(linked);
                }
            }
        }
        result
    }

    /// The canonical unit of the method named `name` on `class`, if the
    /// class scope binds that name to a function value.
    pub fn linked_method_unit(&self, class: ClassId, name: &str) -> Option<UnitId> {
        let scope = self.classes[class].scope;
        let var = self.scopes[scope].get(name)?;
        let function = self.vars[var].types().functions().next()?;
        Some(self.functions[function].unit)
    }

    /// Like [`linked_method_unit`](Self::linked_method_unit), but registers
    /// `dependent` on the binding so propagation re-runs once a linked class
    /// commits its method value.
    pub(crate) fn linked_method_unit_tracked(
        &mut self,
        class: ClassId,
        name: &str,
        dependent: UnitId,
    ) -> Option<UnitId> {
        let scope = self.classes[class].scope;
        let var = self.scopes[scope].get(name)?;
        self.vars[var].add_dependency(dependent);
        let function = self.vars[var].types().functions().next()?;
        Some(self.functions[function].unit)
    }

    // ---- closure units ---------------------------------------------------

    /// Context-sensitive clone of `function`'s canonical unit keyed by
    /// `chain`. Shares FunctionInfo, flags and property bookkeeping; owns a
    /// distinct function scope linked to the canonical one.
    pub fn closure_unit(&mut self, function: FunctionId, chain: CallChain) -> Result<UnitId> {
        if let Some(&existing) = self.closures.get(&(function, chain.clone())) {
            return Ok(existing);
        }
        let (canonical, def, module) = {
            let info = &self.functions[function];
            (info.unit, info.def.clone(), info.module)
        };
        let decl_scope = self
            .units
            .get(canonical)
            .ok_or(AnalysisError::MissingUnit(canonical))?
            .function()
            .ok_or(AnalysisError::NotAFunctionUnit(canonical))?
            .decl_scope;
        let canonical_scope = self.units[canonical].scope;

        let scope = self.new_function_scope(function, decl_scope, &def);
        if let Some(data) = self.scopes[canonical_scope].function_data_mut() {
            data.linked.push(scope);
        }

        let version = self.next_version;
        self.next_version += 1;
        let unit = self.units.alloc(UnitData {
            module,
            scope,
            kind: UnitKind::Function(FunctionUnit {
                function,
                decl_scope,
                concrete_parameters: true,
                decorator_calls: HashMap::new(),
                chain: Some(chain.clone()),
                original: Some(canonical),
            }),
            version,
        });
        self.ensure_parameters(unit)?;
        // Scope-overview pass: rebuild nested scope structure under the
        // chain-specific scope before the ordinary body walk runs.
        self.overview_stmts(module, scope, None, &def.body);

        self.closures.insert((function, chain), unit);
        self.record_new_unit(unit, &def.name);
        self.enqueue(unit);
        Ok(unit)
    }

    // ---- scheduling ------------------------------------------------------

    pub fn enqueue(&mut self, unit: UnitId) {
        if self.queued.insert(unit) {
            self.queue.push_back(unit);
        }
    }

    pub(crate) fn pop_unit(&mut self) -> Option<UnitId> {
        let unit = self.queue.pop_front()?;
        self.queued.remove(&unit);
        Some(unit)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// One re-analysis pass over `unit`.
    pub fn analyze(
        &mut self,
        unit: UnitId,
        evaluator: &dyn Evaluator,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let is_module = matches!(
            self.units.get(unit).ok_or(AnalysisError::MissingUnit(unit))?.kind,
            UnitKind::Module
        );
        if is_module {
            self.analyze_module(unit, evaluator, cancel)
        } else {
            self.analyze_function(unit, evaluator, cancel)
        }
    }

    fn analyze_module(
        &mut self,
        unit: UnitId,
        evaluator: &dyn Evaluator,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let (module, scope) = {
            let data = &self.units[unit];
            (data.module, data.scope)
        };
        let ast = self.modules[module].ast.clone();
        self.walk_body(unit, scope, &ast.body, evaluator, cancel)
    }
}
