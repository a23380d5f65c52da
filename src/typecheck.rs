//! Static type checker and semantic resolver.
//!
//! Runs in two passes. Pass A walks the top level collecting every class
//! and function with its declared signature, orders classes so bases are
//! resolved before subclasses, and computes per-class instance layouts
//! (class-body declarations first, then `self.x = …` discoveries from
//! `__init__`). Pass B walks every body with a scope stack, fills each
//! expression's resolved type, and enforces the assignability rules:
//! implicit widening along `bool → int → float` and subclass →
//! superclass, nothing else.

mod error;
pub mod symbols;

pub use error::{TypeError, TypeResult};
pub use symbols::{
    Binding, ClassInfo, FieldInfo, FuncSig, ModuleInfo, ParamSig, ScopeStack, StaticInfo,
};

use std::collections::{HashMap, HashSet};

use crate::lexer::Span;
use crate::parser::ast::{
    BinOp, ClassDef, Expr, ExprKind, FStringPart, FuncDef, Program, Stmt, StmtKind, Type, UnaryOp,
};

pub const BUILTIN_EXCEPTIONS: [&str; 5] = [
    "RuntimeError",
    "ValueError",
    "IndexError",
    "ZeroDivisionError",
    "AttributeError",
];

pub fn is_builtin_exception(name: &str) -> bool {
    BUILTIN_EXCEPTIONS.contains(&name)
}

pub struct TypeChecker {
    info: ModuleInfo,
    scopes: ScopeStack,
    /// Declared return type of the function being checked; `None` at
    /// module level.
    current_return: Option<Type>,
    current_class: Option<String>,
    /// Names redirected to module scope by `global` in the current
    /// function.
    global_names: HashSet<String>,
}

/// Type-check `program`, filling every expression's type slot, and
/// return the symbol tables the code generator lowers from.
pub fn check(program: &mut Program) -> TypeResult<ModuleInfo> {
    let mut checker = TypeChecker::new();
    checker.collect_declarations(program)?;
    checker.check_bodies(program)?;
    Ok(checker.info)
}

impl TypeChecker {
    pub fn new() -> Self {
        Self {
            info: ModuleInfo::default(),
            scopes: ScopeStack::new(),
            current_return: None,
            current_class: None,
            global_names: HashSet::new(),
        }
    }

    // ───────────────────────── pass A: declarations ─────────────────────────

    fn collect_declarations(&mut self, program: &Program) -> TypeResult<()> {
        // Names and placeholder layouts first, so annotations anywhere may
        // reference any class.
        let mut class_defs: HashMap<&str, &ClassDef> = HashMap::new();
        for stmt in &program.body {
            match &stmt.kind {
                StmtKind::ClassDef(class) => {
                    if self.scopes.lookup_module(&class.name).is_some() {
                        return Err(TypeError::new(
                            class.span,
                            format!("duplicate declaration of '{}'", class.name),
                        ));
                    }
                    self.scopes.declare_module(&class.name, Binding::Class);
                    self.info.classes.insert(
                        class.name.clone(),
                        ClassInfo {
                            name: class.name.clone(),
                            base: class.base.clone(),
                            fields: Vec::new(),
                            statics: Vec::new(),
                            methods: HashMap::new(),
                            method_order: Vec::new(),
                        },
                    );
                    class_defs.insert(class.name.as_str(), class);
                }
                StmtKind::FuncDef(func) => {
                    if self.scopes.lookup_module(&func.name).is_some() {
                        return Err(TypeError::new(
                            func.span,
                            format!("duplicate declaration of '{}'", func.name),
                        ));
                    }
                    self.scopes.declare_module(&func.name, Binding::Function);
                }
                StmtKind::Import { path, alias } => {
                    let name = alias.clone().unwrap_or_else(|| path.join("."));
                    self.scopes.declare_module(&name, Binding::ImportAlias);
                }
                _ => {}
            }
        }

        self.order_classes(program, &class_defs)?;

        // Module function signatures.
        for stmt in &program.body {
            if let StmtKind::FuncDef(func) = &stmt.kind {
                let sig = self.function_signature(func, None)?;
                if func.name == "main" {
                    if !func.params.is_empty() {
                        return Err(TypeError::new(
                            func.span,
                            "'main' must not take parameters",
                        ));
                    }
                    if func.return_type != Type::None {
                        return Err(TypeError::new(
                            func.span,
                            "'main' must not declare a return type",
                        ));
                    }
                    self.info.has_main = true;
                }
                self.info.functions.insert(func.name.clone(), sig);
            }
        }

        // Module globals.
        for stmt in &program.body {
            if let StmtKind::VarDecl { name, declared, .. } = &stmt.kind {
                if self.scopes.lookup_module(name).is_some() {
                    return Err(TypeError::new(
                        stmt.span,
                        format!("duplicate declaration of '{name}'"),
                    ));
                }
                self.validate_type(declared, stmt.span)?;
                self.scopes
                    .declare_module(name, Binding::Local(declared.clone()));
                self.info.globals.push((name.clone(), declared.clone()));
            }
        }

        // Class layouts and method signatures, bases first.
        for class_name in self.info.class_order.clone() {
            let class = class_defs[class_name.as_str()];
            self.collect_class(class)?;
        }

        Ok(())
    }

    /// Topologically order classes base-before-subclass; reject unknown
    /// bases and inheritance cycles.
    fn order_classes(
        &mut self,
        program: &Program,
        class_defs: &HashMap<&str, &ClassDef>,
    ) -> TypeResult<()> {
        let mut order = Vec::new();
        let mut done: HashSet<String> = HashSet::new();

        for stmt in &program.body {
            let StmtKind::ClassDef(class) = &stmt.kind else {
                continue;
            };
            let mut chain = Vec::new();
            let mut current = Some(class);
            while let Some(def) = current {
                if done.contains(&def.name) {
                    break;
                }
                if chain.iter().any(|name: &String| *name == def.name) {
                    return Err(TypeError::new(
                        def.span,
                        format!("inheritance cycle involving class '{}'", def.name),
                    ));
                }
                chain.push(def.name.clone());
                current = match &def.base {
                    Some(base) => match class_defs.get(base.as_str()) {
                        Some(base_def) => Some(*base_def),
                        None => {
                            return Err(TypeError::new(
                                def.span,
                                format!(
                                    "base class '{base}' of '{}' is not defined",
                                    def.name
                                ),
                            ));
                        }
                    },
                    None => None,
                };
            }
            for name in chain.into_iter().rev() {
                if done.insert(name.clone()) {
                    order.push(name);
                }
            }
        }

        self.info.class_order = order;
        Ok(())
    }

    fn collect_class(&mut self, class: &ClassDef) -> TypeResult<()> {
        // Method signatures.
        let mut methods = HashMap::new();
        let mut method_order = Vec::new();
        for method in &class.methods {
            if methods.contains_key(&method.name) {
                return Err(TypeError::new(
                    method.span,
                    format!(
                        "duplicate method '{}' in class '{}'",
                        method.name, class.name
                    ),
                ));
            }
            let sig = self.function_signature(method, Some(&class.name))?;
            method_order.push(method.name.clone());
            methods.insert(method.name.clone(), sig);
        }

        // Class-body declarations are statics and lead the instance layout.
        let mut fields = Vec::new();
        let mut statics = Vec::new();
        for field in &class.fields {
            self.validate_type(&field.declared, field.span)?;
            if fields.iter().any(|f: &FieldInfo| f.name == field.name) {
                return Err(TypeError::new(
                    field.span,
                    format!(
                        "duplicate attribute '{}' in class '{}'",
                        field.name, class.name
                    ),
                ));
            }
            fields.push(FieldInfo {
                name: field.name.clone(),
                ty: field.declared.clone(),
            });
            statics.push(StaticInfo {
                name: field.name.clone(),
                ty: field.declared.clone(),
                init: field.init.clone(),
            });
        }

        {
            let info = self
                .info
                .classes
                .get_mut(&class.name)
                .expect("placeholder inserted for every class");
            info.methods = methods;
            info.method_order = method_order;
            info.statics = statics;
            info.fields = fields;
        }

        // Instance attributes discovered from `self.x = …` in __init__.
        if let Some(init) = class.methods.iter().find(|m| m.name == "__init__") {
            let sig = self.info.classes[&class.name].methods["__init__"].clone();
            let params: HashMap<&str, &Type> = sig
                .params
                .iter()
                .map(|param| (param.name.as_str(), &param.ty))
                .collect();
            let mut discovered = Vec::new();
            self.discover_fields(&class.name, &init.body, &params, &mut discovered)?;
            let info = self
                .info
                .classes
                .get_mut(&class.name)
                .expect("placeholder inserted for every class");
            info.fields.extend(discovered);
        }

        Ok(())
    }

    fn discover_fields(
        &self,
        class_name: &str,
        body: &[Stmt],
        params: &HashMap<&str, &Type>,
        discovered: &mut Vec<FieldInfo>,
    ) -> TypeResult<()> {
        for stmt in body {
            match &stmt.kind {
                StmtKind::Assign { target, value } => {
                    let ExprKind::Attr { base, name } = &target.kind else {
                        continue;
                    };
                    if !matches!(&base.kind, ExprKind::Name(obj) if obj == "self") {
                        continue;
                    }
                    let known_own = self.info.classes[class_name]
                        .own_field(name)
                        .is_some()
                        || discovered.iter().any(|f| f.name == *name);
                    let inherited = self.info.classes[class_name]
                        .base
                        .as_deref()
                        .is_some_and(|base| self.info.resolve_field(base, name).is_some());
                    if known_own || inherited {
                        continue;
                    }
                    let ty = self
                        .infer_attr_type(value, params, discovered)
                        .ok_or_else(|| {
                            TypeError::new(
                                target.span,
                                format!(
                                    "cannot infer type of attribute '{name}' in class \
                                     '{class_name}'; declare it as a class field"
                                ),
                            )
                        })?;
                    discovered.push(FieldInfo {
                        name: name.clone(),
                        ty,
                    });
                }
                StmtKind::If { branches } => {
                    for branch in branches {
                        self.discover_fields(class_name, &branch.body, params, discovered)?;
                    }
                }
                StmtKind::While { body, .. }
                | StmtKind::For { body, .. } => {
                    self.discover_fields(class_name, body, params, discovered)?;
                }
                StmtKind::Try { body, handlers } => {
                    self.discover_fields(class_name, body, params, discovered)?;
                    for handler in handlers {
                        self.discover_fields(class_name, &handler.body, params, discovered)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Restricted inference for `self.x = <expr>` right-hand sides:
    /// literals, constructor parameters, explicit conversions,
    /// constructor calls and previously discovered attributes.
    fn infer_attr_type(
        &self,
        value: &Expr,
        params: &HashMap<&str, &Type>,
        discovered: &[FieldInfo],
    ) -> Option<Type> {
        match &value.kind {
            ExprKind::Int(_) => Some(Type::Int),
            ExprKind::Float(_) => Some(Type::Float),
            ExprKind::Bool(_) => Some(Type::Bool),
            ExprKind::Str(_) | ExprKind::FString(_) => Some(Type::Str),
            ExprKind::Name(name) => params.get(name.as_str()).map(|ty| (*ty).clone()),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match self.infer_attr_type(operand, params, discovered) {
                Some(ty) if ty.is_numeric() => Some(ty),
                _ => None,
            },
            ExprKind::Attr { base, name } => {
                if matches!(&base.kind, ExprKind::Name(obj) if obj == "self") {
                    discovered
                        .iter()
                        .find(|f| f.name == *name)
                        .map(|f| f.ty.clone())
                } else {
                    None
                }
            }
            ExprKind::Call { callee, args: _ } => {
                let ExprKind::Name(name) = &callee.kind else {
                    return None;
                };
                match name.as_str() {
                    "int" => Some(Type::Int),
                    "float" => Some(Type::Float),
                    "bool" => Some(Type::Bool),
                    "str" => Some(Type::Str),
                    _ if self.info.is_class(name) => Some(Type::Class(name.clone())),
                    _ => self
                        .info
                        .functions
                        .get(name)
                        .map(|sig| sig.return_type.clone())
                        .filter(|ty| *ty != Type::None),
                }
            }
            _ => None,
        }
    }

    fn function_signature(
        &self,
        func: &FuncDef,
        class: Option<&str>,
    ) -> TypeResult<FuncSig> {
        let mut params = Vec::new();
        for (index, param) in func.params.iter().enumerate() {
            if class.is_some() && index == 0 {
                if param.name != "self" {
                    return Err(TypeError::new(
                        param.span,
                        format!(
                            "first parameter of method '{}' must be 'self'",
                            func.name
                        ),
                    ));
                }
                if param.ty.is_some() {
                    return Err(TypeError::new(
                        param.span,
                        "'self' must not have a type annotation",
                    ));
                }
                params.push(ParamSig {
                    name: param.name.clone(),
                    ty: Type::Class(class.expect("guarded by class.is_some()").to_string()),
                    default: None,
                });
                continue;
            }

            let Some(ty) = param.ty.clone() else {
                return Err(TypeError::new(
                    param.span,
                    format!(
                        "missing type annotation for parameter '{}' in function '{}'",
                        param.name, func.name
                    ),
                ));
            };
            self.validate_type(&ty, param.span)?;

            if let Some(default) = &param.default {
                let Some(default_ty) = literal_type(default) else {
                    return Err(TypeError::new(
                        default.span,
                        format!(
                            "default for parameter '{}' must be a literal",
                            param.name
                        ),
                    ));
                };
                if !self.assignable(&default_ty, &ty) {
                    return Err(TypeError::new(
                        default.span,
                        format!(
                            "default for parameter '{}' expected {ty}, got {default_ty}",
                            param.name
                        ),
                    ));
                }
            }

            params.push(ParamSig {
                name: param.name.clone(),
                ty,
                default: param.default.clone(),
            });
        }

        self.validate_type(&func.return_type, func.span)?;
        Ok(FuncSig {
            name: func.name.clone(),
            params,
            return_type: func.return_type.clone(),
        })
    }

    /// The runtime monomorphises containers over primitives only.
    fn validate_type(&self, ty: &Type, span: Span) -> TypeResult<()> {
        match ty {
            Type::Int | Type::Float | Type::Bool | Type::Str | Type::None => Ok(()),
            Type::List(elem) => {
                if !elem.is_primitive() {
                    return Err(TypeError::new(
                        span,
                        format!("unsupported list element type '{elem}'"),
                    ));
                }
                Ok(())
            }
            Type::Dict(_, value) => {
                if !value.is_primitive() {
                    return Err(TypeError::new(
                        span,
                        format!("unsupported dict value type '{value}'"),
                    ));
                }
                Ok(())
            }
            Type::Class(name) => {
                if !self.info.is_class(name) {
                    return Err(TypeError::new(span, format!("unknown type '{name}'")));
                }
                Ok(())
            }
        }
    }

    // ───────────────────────── pass B: bodies ─────────────────────────

    fn check_bodies(&mut self, program: &mut Program) -> TypeResult<()> {
        let has_main = self.info.has_main;
        for stmt in &mut program.body {
            let is_declaration = matches!(
                stmt.kind,
                StmtKind::FuncDef(_)
                    | StmtKind::ClassDef(_)
                    | StmtKind::VarDecl { .. }
                    | StmtKind::Import { .. }
            );
            if !is_declaration {
                // Executable top level stands in for main when none exists.
                if has_main {
                    return Err(TypeError::new(
                        stmt.span,
                        "top-level statements are not allowed when 'main' is defined",
                    ));
                }
                self.check_stmt(stmt)?;
                continue;
            }

            let span = stmt.span;
            match &mut stmt.kind {
                StmtKind::FuncDef(func) => self.check_function(func, None)?,
                StmtKind::ClassDef(class) => self.check_class(class)?,
                StmtKind::VarDecl {
                    name,
                    declared,
                    init,
                } => {
                    if !is_const_initializer(init) {
                        return Err(TypeError::new(
                            init.span,
                            format!(
                                "module-level initializer for '{name}' must be a constant literal"
                            ),
                        ));
                    }
                    let declared = declared.clone();
                    let actual = self.check_expr_expecting(init, Some(&declared))?;
                    if !self.assignable(&actual, &declared) {
                        return Err(TypeError::new(
                            span,
                            format!(
                                "type mismatch in variable '{name}': declared {declared}, \
                                 got {actual}"
                            ),
                        ));
                    }
                }
                StmtKind::Import { .. } => {}
                _ => unreachable!("non-declarations handled above"),
            }
        }
        Ok(())
    }

    fn check_class(&mut self, class: &mut ClassDef) -> TypeResult<()> {
        for field in &mut class.fields {
            let Some(literal_ty) = literal_type(&field.init) else {
                return Err(TypeError::new(
                    field.init.span,
                    format!(
                        "class attribute '{}' must be initialized with a literal",
                        field.name
                    ),
                ));
            };
            let declared = field.declared.clone();
            self.check_expr_expecting(&mut field.init, Some(&declared))?;
            if !self.assignable(&literal_ty, &declared) {
                return Err(TypeError::new(
                    field.init.span,
                    format!(
                        "class attribute '{}' declared {declared}, got {literal_ty}",
                        field.name
                    ),
                ));
            }
        }

        let class_name = class.name.clone();
        for method in &mut class.methods {
            self.check_function(method, Some(&class_name))?;
        }
        Ok(())
    }

    fn check_function(&mut self, func: &mut FuncDef, class: Option<&str>) -> TypeResult<()> {
        let sig = match class {
            Some(class_name) => self.info.classes[class_name].methods[&func.name].clone(),
            None => self.info.functions[&func.name].clone(),
        };

        // Fill type slots on default expressions (validated in pass A).
        for param in &mut func.params {
            if let Some(default) = &mut param.default {
                self.check_expr_expecting(default, None)?;
            }
        }

        self.scopes.push();
        for param in &sig.params {
            self.scopes
                .declare(&param.name, Binding::Param(param.ty.clone()));
        }
        self.current_return = Some(sig.return_type.clone());
        self.current_class = class.map(str::to_string);
        self.global_names.clear();

        let result = self.check_block_in_place(&mut func.body);

        self.scopes.pop();
        self.current_return = None;
        self.current_class = None;
        result
    }

    /// Check statements in the current scope (function bodies reuse the
    /// parameter scope; nested blocks push their own).
    fn check_block_in_place(&mut self, body: &mut [Stmt]) -> TypeResult<()> {
        for stmt in body {
            self.check_stmt(stmt)?;
        }
        Ok(())
    }

    fn check_block(&mut self, body: &mut [Stmt]) -> TypeResult<()> {
        self.scopes.push();
        let result = self.check_block_in_place(body);
        self.scopes.pop();
        result
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) -> TypeResult<()> {
        let span = stmt.span;
        match &mut stmt.kind {
            StmtKind::VarDecl {
                name,
                declared,
                init,
            } => {
                self.validate_type(declared, span)?;
                if self.scopes.lookup_innermost(name).is_some() {
                    return Err(TypeError::new(
                        span,
                        format!("variable '{name}' is already declared in this scope"),
                    ));
                }
                let declared = declared.clone();
                let actual = self.check_expr_expecting(init, Some(&declared))?;
                if !self.assignable(&actual, &declared) {
                    return Err(TypeError::new(
                        span,
                        format!(
                            "type mismatch in variable '{name}': declared {declared}, got {actual}"
                        ),
                    ));
                }
                self.scopes
                    .declare(name, Binding::Local(declared.clone()));
                Ok(())
            }
            StmtKind::Assign { target, value } => {
                let expected = self.check_assign_target(target)?;
                let actual = self.check_expr_expecting(value, Some(&expected))?;
                if !self.assignable(&actual, &expected) {
                    return Err(TypeError::new(
                        span,
                        format!("assignment expected {expected}, got {actual}"),
                    ));
                }
                Ok(())
            }
            StmtKind::AugAssign { op, target, value } => {
                let op = *op;
                let target_ty = self.check_assign_target(target)?;
                let value_ty = self.check_expr_expecting(value, None)?;
                let result = self.binary_result(op, &target_ty, &value_ty, span)?;
                if !self.assignable(&result, &target_ty) {
                    return Err(TypeError::new(
                        span,
                        format!(
                            "augmented assignment '{}=' produces {result}, target is {target_ty}",
                            op.symbol()
                        ),
                    ));
                }
                Ok(())
            }
            StmtKind::If { branches } => {
                for branch in branches {
                    if let Some(condition) = &mut branch.condition {
                        let ty = self.check_expr_expecting(condition, None)?;
                        if ty != Type::Bool {
                            return Err(TypeError::new(
                                condition.span,
                                format!("if condition must be bool, got {ty}"),
                            ));
                        }
                    }
                    self.check_block(&mut branch.body)?;
                }
                Ok(())
            }
            StmtKind::While { condition, body } => {
                let ty = self.check_expr_expecting(condition, None)?;
                if ty != Type::Bool {
                    return Err(TypeError::new(
                        condition.span,
                        format!("while condition must be bool, got {ty}"),
                    ));
                }
                self.check_block(body)
            }
            StmtKind::For { var, iter, body } => {
                self.check_range_iter(iter)?;
                self.scopes.push();
                self.scopes.declare(var, Binding::Local(Type::Int));
                let result = self.check_block_in_place(body);
                self.scopes.pop();
                result
            }
            StmtKind::Try { body, handlers } => {
                self.check_block(body)?;
                for handler in handlers {
                    if !is_builtin_exception(&handler.exc_type)
                        && !self.info.is_class(&handler.exc_type)
                    {
                        return Err(TypeError::new(
                            handler.span,
                            format!(
                                "unknown exception type '{}' in except block",
                                handler.exc_type
                            ),
                        ));
                    }
                    self.scopes.push();
                    if let Some(alias) = &handler.alias {
                        // The alias holds the exception's message; for a
                        // user class that is its leading own attribute.
                        if !is_builtin_exception(&handler.exc_type) {
                            self.require_message_attribute(&handler.exc_type, handler.span)?;
                        }
                        self.scopes.declare(alias, Binding::Local(Type::Str));
                    }
                    let result = self.check_block_in_place(&mut handler.body);
                    self.scopes.pop();
                    result?;
                }
                Ok(())
            }
            StmtKind::Raise { exc } => self.check_raise(exc),
            StmtKind::Return { value } => {
                let declared = self
                    .current_return
                    .clone()
                    .expect("parser rejects 'return' outside functions");
                match value {
                    None => {
                        if declared != Type::None {
                            return Err(TypeError::new(
                                span,
                                format!("expected return type {declared}, got None"),
                            ));
                        }
                    }
                    Some(expr) => {
                        if declared == Type::None {
                            return Err(TypeError::new(
                                span,
                                "function declared '-> None' must not return a value",
                            ));
                        }
                        let actual = self.check_expr_expecting(expr, Some(&declared))?;
                        if !self.assignable(&actual, &declared) {
                            return Err(TypeError::new(
                                span,
                                format!(
                                    "return type mismatch: expected {declared}, got {actual}"
                                ),
                            ));
                        }
                    }
                }
                Ok(())
            }
            StmtKind::Assert { condition } => {
                let ty = self.check_expr_expecting(condition, None)?;
                if ty != Type::Bool {
                    return Err(TypeError::new(
                        condition.span,
                        format!("assert expression must be bool, got {ty}"),
                    ));
                }
                Ok(())
            }
            StmtKind::Global { names } => {
                for name in names.iter() {
                    match self.scopes.lookup_module(name) {
                        Some(Binding::Local(_)) => {
                            self.global_names.insert(name.clone());
                        }
                        _ => {
                            return Err(TypeError::new(
                                span,
                                format!("'global {name}' does not name a module variable"),
                            ));
                        }
                    }
                }
                Ok(())
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Pass => Ok(()),
            StmtKind::Import { .. } => Err(TypeError::new(
                span,
                "import is only allowed at module level",
            )),
            StmtKind::FuncDef(_) => Err(TypeError::new(
                span,
                "nested function definitions are not supported",
            )),
            StmtKind::ClassDef(_) => Err(TypeError::new(
                span,
                "class definitions are only allowed at module level",
            )),
            StmtKind::Expr(expr) => {
                self.check_expr_expecting(expr, None)?;
                Ok(())
            }
        }
    }

    /// `for v in range(end)` / `range(start, end)` is the only iterable
    /// form. Fills the type slots of the pseudo-call.
    fn check_range_iter(&mut self, iter: &mut Expr) -> TypeResult<()> {
        let span = iter.span;
        let ExprKind::Call { callee, args } = &mut iter.kind else {
            return Err(TypeError::new(
                span,
                "for loops iterate over range(...) only",
            ));
        };
        if !matches!(&callee.kind, ExprKind::Name(name) if name == "range") {
            return Err(TypeError::new(
                span,
                "for loops iterate over range(...) only",
            ));
        }
        if args.is_empty() || args.len() > 2 {
            return Err(TypeError::new(
                span,
                format!("range() expects 1 or 2 arguments, got {}", args.len()),
            ));
        }
        for arg in args.iter_mut() {
            let ty = self.check_expr_expecting(arg, None)?;
            if ty != Type::Int {
                return Err(TypeError::new(
                    arg.span,
                    format!("range() arguments must be int, got {ty}"),
                ));
            }
        }
        callee.ty = Some(Type::None);
        iter.ty = Some(Type::None);
        Ok(())
    }

    fn check_raise(&mut self, exc: &mut Expr) -> TypeResult<()> {
        let span = exc.span;
        let ExprKind::Call { callee, args } = &mut exc.kind else {
            return Err(TypeError::new(
                span,
                "raise requires an exception constructed with a message",
            ));
        };
        let ExprKind::Name(name) = &callee.kind else {
            return Err(TypeError::new(
                span,
                "raise requires a built-in exception or exception class",
            ));
        };
        let name = name.clone();

        if is_builtin_exception(&name) {
            if args.len() != 1 {
                return Err(TypeError::new(
                    span,
                    format!("{name}(...) expects exactly one message argument"),
                ));
            }
            let ty = self.check_expr_expecting(&mut args[0], None)?;
            if ty != Type::Str {
                return Err(TypeError::new(
                    args[0].span,
                    format!("exception message must be str, got {ty}"),
                ));
            }
            callee.ty = Some(Type::None);
            exc.ty = Some(Type::Str);
            return Ok(());
        }

        if self.info.is_class(&name) {
            let ty = self.check_expr_expecting(exc, None)?;
            let class_name = ty
                .class_name()
                .expect("constructor call yields the class")
                .to_string();
            self.require_message_attribute(&class_name, span)?;
            return Ok(());
        }

        Err(TypeError::new(
            span,
            format!("unknown exception type '{name}'"),
        ))
    }

    /// A user exception class must carry its message as its first own
    /// instance attribute, typed `str`; handlers read it through the
    /// class layout.
    fn require_message_attribute(&self, class_name: &str, span: Span) -> TypeResult<()> {
        let message_slot = self
            .info
            .class(class_name)
            .and_then(|info| info.fields.first())
            .map(|field| field.ty.clone());
        if message_slot != Some(Type::Str) {
            return Err(TypeError::new(
                span,
                format!(
                    "exception class '{class_name}' must store its message in a leading \
                     'str' attribute"
                ),
            ));
        }
        Ok(())
    }

    /// Resolve an assignment target and return the type a value must be
    /// assignable to. Fills the target's type slots.
    fn check_assign_target(&mut self, target: &mut Expr) -> TypeResult<Type> {
        let span = target.span;
        match &mut target.kind {
            ExprKind::Name(name) => {
                let name = name.clone();
                let in_function = self.current_return.is_some();
                let ty = if in_function {
                    if let Some(binding) = self.scopes.lookup_function_local(&name) {
                        match binding.value_type() {
                            Some(ty) => ty.clone(),
                            None => {
                                return Err(TypeError::new(
                                    span,
                                    format!("cannot assign to '{name}'"),
                                ));
                            }
                        }
                    } else if self.global_names.contains(&name) {
                        self.scopes
                            .lookup_module(&name)
                            .and_then(Binding::value_type)
                            .cloned()
                            .expect("'global' names checked against module scope")
                    } else if self
                        .scopes
                        .lookup_module(&name)
                        .is_some_and(|b| b.value_type().is_some())
                    {
                        return Err(TypeError::new(
                            span,
                            format!(
                                "assignment to global '{name}' requires a 'global' declaration"
                            ),
                        ));
                    } else {
                        return Err(TypeError::new(
                            span,
                            format!("cannot assign to undeclared variable '{name}'"),
                        ));
                    }
                } else {
                    match self.scopes.lookup_module(&name).and_then(Binding::value_type) {
                        Some(ty) => ty.clone(),
                        None => {
                            return Err(TypeError::new(
                                span,
                                format!("cannot assign to undeclared variable '{name}'"),
                            ));
                        }
                    }
                };
                target.ty = Some(ty.clone());
                Ok(ty)
            }
            ExprKind::Attr { base, name } => {
                if self.class_reference(base).is_some() {
                    return Err(TypeError::new(span, "cannot assign to a class attribute"));
                }
                let name = name.clone();
                let base_ty = self.check_expr_expecting(base, None)?;
                let Some(class_name) = base_ty.class_name() else {
                    return Err(TypeError::new(
                        span,
                        format!("'{base_ty}' has no assignable attributes"),
                    ));
                };
                let Some((_, field_ty)) = self.info.resolve_field(class_name, &name) else {
                    return Err(TypeError::new(
                        span,
                        format!("class '{class_name}' has no attribute '{name}'"),
                    ));
                };
                target.ty = Some(field_ty.clone());
                Ok(field_ty)
            }
            ExprKind::Index { base, index } => {
                let base_ty = self.check_expr_expecting(base, None)?;
                match base_ty {
                    Type::List(elem) => {
                        let index_ty = self.check_expr_expecting(index, None)?;
                        if index_ty != Type::Int {
                            return Err(TypeError::new(
                                index.span,
                                format!("list index must be int, got {index_ty}"),
                            ));
                        }
                        target.ty = Some((*elem).clone());
                        Ok(*elem)
                    }
                    Type::Dict(_, _) => Err(TypeError::new(
                        span,
                        "dict entries cannot be assigned; dicts are built from literals",
                    )),
                    other => Err(TypeError::new(
                        span,
                        format!("cannot index into value of type '{other}'"),
                    )),
                }
            }
            _ => Err(TypeError::new(span, "invalid assignment target")),
        }
    }

    // ───────────────────────── expressions ─────────────────────────

    fn check_expr_expecting(
        &mut self,
        expr: &mut Expr,
        expected: Option<&Type>,
    ) -> TypeResult<Type> {
        let ty = self.expr_type(expr, expected)?;
        expr.ty = Some(ty.clone());
        Ok(ty)
    }

    fn expr_type(&mut self, expr: &mut Expr, expected: Option<&Type>) -> TypeResult<Type> {
        let span = expr.span;
        if matches!(expr.kind, ExprKind::Attr { .. }) {
            return self.check_attr_expr(expr);
        }
        if matches!(expr.kind, ExprKind::Call { .. }) {
            return self.check_call(expr);
        }
        match &mut expr.kind {
            ExprKind::Int(_) => Ok(Type::Int),
            ExprKind::Float(_) => Ok(Type::Float),
            ExprKind::Bool(_) => Ok(Type::Bool),
            ExprKind::Str(_) => Ok(Type::Str),
            ExprKind::NoneLit => Ok(Type::None),
            ExprKind::FString(parts) => {
                for part in parts {
                    if let FStringPart::Expr(inner) = part {
                        let ty = self.check_expr_expecting(inner, None)?;
                        if !ty.is_primitive() {
                            return Err(TypeError::new(
                                inner.span,
                                format!("f-string placeholders require primitive values, got {ty}"),
                            ));
                        }
                    }
                }
                Ok(Type::Str)
            }
            ExprKind::Name(name) => match self.scopes.lookup(name) {
                Some(Binding::Local(ty)) | Some(Binding::Param(ty)) => Ok(ty.clone()),
                Some(Binding::Class) => Err(TypeError::new(
                    span,
                    format!("class '{name}' cannot be used as a value"),
                )),
                Some(Binding::Function) => Err(TypeError::new(
                    span,
                    format!("function '{name}' cannot be used as a value"),
                )),
                Some(Binding::ImportAlias) => Err(TypeError::new(
                    span,
                    format!("module '{name}' cannot be used as a value"),
                )),
                None => Err(TypeError::new(span, format!("undefined variable '{name}'"))),
            },
            ExprKind::ClassRef(name) => Ok(Type::Class(name.clone())),
            ExprKind::List(elems) => {
                let expected_elem = match expected {
                    Some(Type::List(elem)) => Some((**elem).clone()),
                    _ => None,
                };
                if elems.is_empty() {
                    return match expected_elem {
                        Some(elem) => Ok(Type::List(Box::new(elem))),
                        None => Err(TypeError::new(
                            span,
                            "cannot infer element type of empty list literal \
                             without a declaration",
                        )),
                    };
                }
                let first_ty = self.check_expr_expecting(&mut elems[0], expected_elem.as_ref())?;
                if !first_ty.is_primitive() {
                    return Err(TypeError::new(
                        elems[0].span,
                        format!("list elements must be a primitive type, got {first_ty}"),
                    ));
                }
                for elem in elems.iter_mut().skip(1) {
                    let ty = self.check_expr_expecting(elem, Some(&first_ty))?;
                    if ty != first_ty {
                        return Err(TypeError::new(
                            elem.span,
                            format!("list elements must all be {first_ty}, got {ty}"),
                        ));
                    }
                }
                Ok(Type::List(Box::new(first_ty)))
            }
            ExprKind::Dict(pairs) => {
                let expected_value = match expected {
                    Some(Type::Dict(_, value)) => Some((**value).clone()),
                    _ => None,
                };
                if pairs.is_empty() {
                    return match expected_value {
                        Some(value) => {
                            Ok(Type::Dict(Box::new(Type::Str), Box::new(value)))
                        }
                        None => Err(TypeError::new(
                            span,
                            "cannot infer value type of empty dict literal \
                             without a declaration",
                        )),
                    };
                }
                let mut value_ty: Option<Type> = None;
                for (key, value) in pairs.iter_mut() {
                    let key_ty = self.check_expr_expecting(key, None)?;
                    if key_ty != Type::Str {
                        return Err(TypeError::new(
                            key.span,
                            format!("dict keys must be str, got {key_ty}"),
                        ));
                    }
                    let ty =
                        self.check_expr_expecting(value, value_ty.as_ref().or(expected_value.as_ref()))?;
                    match &value_ty {
                        None => {
                            if !ty.is_primitive() {
                                return Err(TypeError::new(
                                    value.span,
                                    format!("dict values must be a primitive type, got {ty}"),
                                ));
                            }
                            value_ty = Some(ty);
                        }
                        Some(previous) => {
                            if ty != *previous {
                                return Err(TypeError::new(
                                    value.span,
                                    format!("dict values must all be {previous}, got {ty}"),
                                ));
                            }
                        }
                    }
                }
                Ok(Type::Dict(
                    Box::new(Type::Str),
                    Box::new(value_ty.expect("non-empty dict literal")),
                ))
            }
            ExprKind::Index { base, index } => {
                let base_ty = self.check_expr_expecting(base, None)?;
                match base_ty {
                    Type::List(elem) => {
                        let index_ty = self.check_expr_expecting(index, None)?;
                        if index_ty != Type::Int {
                            return Err(TypeError::new(
                                index.span,
                                format!("list index must be int, got {index_ty}"),
                            ));
                        }
                        Ok(*elem)
                    }
                    Type::Dict(_, value) => {
                        let index_ty = self.check_expr_expecting(index, None)?;
                        if index_ty != Type::Str {
                            return Err(TypeError::new(
                                index.span,
                                format!("dict key must be str, got {index_ty}"),
                            ));
                        }
                        Ok(*value)
                    }
                    other => Err(TypeError::new(
                        span,
                        format!("cannot index into value of type '{other}'"),
                    )),
                }
            }
            ExprKind::Attr { .. } | ExprKind::Call { .. } => {
                unreachable!("dispatched before the match")
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                let ty = self.check_expr_expecting(operand, None)?;
                match op {
                    UnaryOp::Neg => {
                        if !ty.is_numeric() {
                            return Err(TypeError::new(
                                span,
                                format!("unary '-' requires a numeric operand, got {ty}"),
                            ));
                        }
                        Ok(ty)
                    }
                    UnaryOp::Not => {
                        if ty != Type::Bool {
                            return Err(TypeError::new(
                                span,
                                format!("unary 'not' requires a bool operand, got {ty}"),
                            ));
                        }
                        Ok(Type::Bool)
                    }
                }
            }
            ExprKind::Binary { op, left, right } => {
                let op = *op;
                let left_ty = self.check_expr_expecting(left, None)?;
                let right_ty = self.check_expr_expecting(right, None)?;
                self.binary_result(op, &left_ty, &right_ty, span)
            }
        }
    }

    fn binary_result(
        &self,
        op: BinOp,
        left: &Type,
        right: &Type,
        span: Span,
    ) -> TypeResult<Type> {
        if op.is_arithmetic() {
            // bool is deliberately not numeric here: `True + 1` is an error.
            if !left.is_numeric() || !right.is_numeric() {
                return Err(TypeError::new(
                    span,
                    format!(
                        "operator '{}' not supported for types '{left}' and '{right}'",
                        op.symbol()
                    ),
                ));
            }
            let ty = match op {
                BinOp::Div => Type::Float,
                _ => {
                    if *left == Type::Float || *right == Type::Float {
                        Type::Float
                    } else {
                        Type::Int
                    }
                }
            };
            return Ok(ty);
        }

        match op {
            BinOp::Eq | BinOp::NotEq => {
                let comparable = (left == right && left.is_primitive())
                    || (left.is_numeric() && right.is_numeric());
                if !comparable {
                    return Err(TypeError::new(
                        span,
                        format!(
                            "comparison '{}' between incompatible types: {left} and {right}",
                            op.symbol()
                        ),
                    ));
                }
                Ok(Type::Bool)
            }
            BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => {
                if !left.is_numeric() || !right.is_numeric() {
                    return Err(TypeError::new(
                        span,
                        format!(
                            "comparison '{}' requires numeric operands, got {left} and {right}",
                            op.symbol()
                        ),
                    ));
                }
                Ok(Type::Bool)
            }
            BinOp::Is | BinOp::IsNot => {
                if *left != Type::Bool || *right != Type::Bool {
                    return Err(TypeError::new(
                        span,
                        format!("'{}' requires bool operands", op.symbol()),
                    ));
                }
                Ok(Type::Bool)
            }
            BinOp::And | BinOp::Or => {
                if *left != Type::Bool || *right != Type::Bool {
                    return Err(TypeError::new(
                        span,
                        format!("logical '{}' requires bool operands", op.symbol()),
                    ));
                }
                Ok(Type::Bool)
            }
            _ => unreachable!("arithmetic handled above"),
        }
    }

    /// Attribute reads: `Class.attr` resolves class-level attributes;
    /// `expr.attr` resolves instance fields along the base chain.
    fn check_attr_expr(&mut self, expr: &mut Expr) -> TypeResult<Type> {
        let span = expr.span;
        let ExprKind::Attr { base, name } = &mut expr.kind else {
            unreachable!("caller matched Attr");
        };
        let name = name.clone();

        if let Some(class_name) = self.class_reference(base) {
            if let Some((_, static_attr)) = self.info.resolve_static(&class_name, &name) {
                let ty = static_attr.ty.clone();
                base.kind = ExprKind::ClassRef(class_name.clone());
                base.ty = Some(Type::Class(class_name));
                return Ok(ty);
            }
            if self.info.resolve_method(&class_name, &name).is_some() {
                return Err(TypeError::new(
                    span,
                    format!("method '{class_name}.{name}' must be called"),
                ));
            }
            return Err(TypeError::new(
                span,
                format!("class '{class_name}' has no attribute '{name}'"),
            ));
        }

        let base_ty = self.check_expr_expecting(base, None)?;
        let Some(class_name) = base_ty.class_name() else {
            return Err(TypeError::new(
                span,
                format!("'{base_ty}' has no attribute '{name}'"),
            ));
        };
        if let Some((_, field_ty)) = self.info.resolve_field(class_name, &name) {
            return Ok(field_ty);
        }
        if self.info.resolve_method(class_name, &name).is_some() {
            return Err(TypeError::new(
                span,
                format!("method '{name}' of class '{class_name}' must be called"),
            ));
        }
        Err(TypeError::new(
            span,
            format!("class '{class_name}' has no attribute '{name}'"),
        ))
    }

    /// Is this base expression a reference to the class itself (not a
    /// variable shadowing the class name)?
    fn class_reference(&self, base: &Expr) -> Option<String> {
        let ExprKind::Name(name) = &base.kind else {
            return None;
        };
        match self.scopes.lookup(name) {
            Some(Binding::Class) => Some(name.clone()),
            _ => None,
        }
    }

    fn check_call(&mut self, expr: &mut Expr) -> TypeResult<Type> {
        let span = expr.span;
        let ExprKind::Call { callee, args } = &mut expr.kind else {
            unreachable!("caller matched Call");
        };

        match &mut callee.kind {
            ExprKind::Name(name) => {
                let name = name.clone();
                callee.ty = Some(Type::None);
                let binding = self.scopes.lookup(&name).cloned();
                match binding {
                    Some(Binding::Function) => {
                        let sig = self.info.functions[&name].clone();
                        self.check_call_args(&name, &sig.params, args, span)?;
                        Ok(sig.return_type)
                    }
                    Some(Binding::Class) => {
                        let init_sig = self
                            .info
                            .resolve_method(&name, "__init__")
                            .map(|(_, sig)| sig.clone());
                        match init_sig {
                            Some(sig) => {
                                self.check_call_args(&name, &sig.params[1..], args, span)?;
                            }
                            None => {
                                if !args.is_empty() {
                                    return Err(TypeError::new(
                                        span,
                                        format!("class '{name}' takes no constructor arguments"),
                                    ));
                                }
                            }
                        }
                        Ok(Type::Class(name))
                    }
                    Some(Binding::Local(_)) | Some(Binding::Param(_)) => Err(TypeError::new(
                        span,
                        format!("'{name}' is not callable"),
                    )),
                    Some(Binding::ImportAlias) => Err(TypeError::new(
                        span,
                        format!("module '{name}' is not callable"),
                    )),
                    None => match name.as_str() {
                        "print" => {
                            if args.len() != 1 {
                                return Err(TypeError::new(
                                    span,
                                    format!("print() takes exactly one argument, got {}", args.len()),
                                ));
                            }
                            let ty = self.check_expr_expecting(&mut args[0], None)?;
                            let printable = ty.is_primitive()
                                || matches!(ty, Type::List(_) | Type::Dict(_, _));
                            if !printable {
                                return Err(TypeError::new(
                                    args[0].span,
                                    format!("cannot print value of type '{ty}'"),
                                ));
                            }
                            Ok(Type::None)
                        }
                        "range" => Err(TypeError::new(
                            span,
                            "range() is only valid as the iterable of a for loop",
                        )),
                        "int" | "float" | "bool" | "str" => {
                            self.check_conversion(&name, args, span)
                        }
                        _ => Err(TypeError::new(
                            span,
                            format!("call to undefined function '{name}'"),
                        )),
                    },
                }
            }
            ExprKind::Attr {
                base,
                name: method_name,
            } => {
                let method_name = method_name.clone();

                // Unbound method call through the class: `P.__init__(self)`.
                if let Some(class_name) = self.class_reference(base) {
                    base.kind = ExprKind::ClassRef(class_name.clone());
                    base.ty = Some(Type::Class(class_name.clone()));
                    callee.ty = Some(Type::None);
                    let Some((_, sig)) = self.info.resolve_method(&class_name, &method_name)
                    else {
                        return Err(TypeError::new(
                            span,
                            format!("class '{class_name}' has no method '{method_name}'"),
                        ));
                    };
                    let sig = sig.clone();
                    if args.is_empty() {
                        return Err(TypeError::new(
                            span,
                            format!(
                                "unbound call to '{class_name}.{method_name}' requires a \
                                 receiver argument"
                            ),
                        ));
                    }
                    let receiver_ty = self.check_expr_expecting(&mut args[0], None)?;
                    if !self.assignable(&receiver_ty, &Type::Class(class_name.clone())) {
                        return Err(TypeError::new(
                            args[0].span,
                            format!(
                                "receiver of '{class_name}.{method_name}' expected \
                                 {class_name}, got {receiver_ty}"
                            ),
                        ));
                    }
                    self.check_call_args(&method_name, &sig.params[1..], &mut args[1..], span)?;
                    return Ok(sig.return_type);
                }

                let base_ty = self.check_expr_expecting(base, None)?;
                callee.ty = Some(Type::None);
                match base_ty {
                    Type::Class(class_name) => {
                        let Some((_, sig)) =
                            self.info.resolve_method(&class_name, &method_name)
                        else {
                            return Err(TypeError::new(
                                span,
                                format!(
                                    "class '{class_name}' has no method '{method_name}'"
                                ),
                            ));
                        };
                        let sig = sig.clone();
                        self.check_call_args(&method_name, &sig.params[1..], args, span)?;
                        Ok(sig.return_type)
                    }
                    Type::List(elem) => {
                        self.check_list_method(&method_name, &elem, args, span)
                    }
                    other => Err(TypeError::new(
                        span,
                        format!("'{other}' has no method '{method_name}'"),
                    )),
                }
            }
            _ => Err(TypeError::new(span, "expression is not callable")),
        }
    }

    fn check_list_method(
        &mut self,
        method: &str,
        elem: &Type,
        args: &mut [Expr],
        span: Span,
    ) -> TypeResult<Type> {
        match method {
            "append" => {
                if args.len() != 1 {
                    return Err(TypeError::new(
                        span,
                        format!("append() takes exactly one argument, got {}", args.len()),
                    ));
                }
                let ty = self.check_expr_expecting(&mut args[0], Some(elem))?;
                if !self.assignable(&ty, elem) {
                    return Err(TypeError::new(
                        args[0].span,
                        format!("append() to list[{elem}] expected {elem}, got {ty}"),
                    ));
                }
                Ok(Type::None)
            }
            "pop" => {
                if !args.is_empty() {
                    return Err(TypeError::new(
                        span,
                        format!("pop() takes no arguments, got {}", args.len()),
                    ));
                }
                Ok(elem.clone())
            }
            "remove" => {
                if args.len() != 1 {
                    return Err(TypeError::new(
                        span,
                        format!("remove() takes exactly one argument, got {}", args.len()),
                    ));
                }
                let ty = self.check_expr_expecting(&mut args[0], Some(elem))?;
                if !self.assignable(&ty, elem) {
                    return Err(TypeError::new(
                        args[0].span,
                        format!("remove() from list[{elem}] expected {elem}, got {ty}"),
                    ));
                }
                Ok(Type::Bool)
            }
            other => Err(TypeError::new(
                span,
                format!("list has no method '{other}'"),
            )),
        }
    }

    fn check_conversion(
        &mut self,
        name: &str,
        args: &mut [Expr],
        span: Span,
    ) -> TypeResult<Type> {
        if args.len() != 1 {
            return Err(TypeError::new(
                span,
                format!("{name}() takes exactly one argument, got {}", args.len()),
            ));
        }
        let from = self.check_expr_expecting(&mut args[0], None)?;
        let to = match name {
            "int" => Type::Int,
            "float" => Type::Float,
            "bool" => Type::Bool,
            "str" => Type::Str,
            _ => unreachable!("caller matched a conversion name"),
        };
        let ok = match to {
            Type::Str => from.is_primitive(),
            _ => matches!(from, Type::Int | Type::Float | Type::Bool),
        };
        if !ok {
            return Err(TypeError::new(
                span,
                format!("cannot convert '{from}' to '{to}'"),
            ));
        }
        Ok(to)
    }

    /// Positional arity must cover every parameter without a default;
    /// trailing defaulted parameters may be omitted.
    fn check_call_args(
        &mut self,
        name: &str,
        params: &[ParamSig],
        args: &mut [Expr],
        span: Span,
    ) -> TypeResult<()> {
        let required = params
            .iter()
            .take_while(|param| param.default.is_none())
            .count();
        if args.len() < required || args.len() > params.len() {
            let expected = if required == params.len() {
                format!("{required}")
            } else {
                format!("{required} to {}", params.len())
            };
            return Err(TypeError::new(
                span,
                format!(
                    "'{name}' expects {expected} arguments, got {}",
                    args.len()
                ),
            ));
        }
        for (index, (arg, param)) in args.iter_mut().zip(params).enumerate() {
            let ty = self.check_expr_expecting(arg, Some(&param.ty))?;
            if !self.assignable(&ty, &param.ty) {
                return Err(TypeError::new(
                    arg.span,
                    format!(
                        "argument {} to '{name}' expected {}, got {ty}",
                        index + 1,
                        param.ty
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Implicit widening: `bool → int → float` plus subclass →
    /// superclass. Everything else must match structurally.
    fn assignable(&self, from: &Type, to: &Type) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (Type::Bool, Type::Int) | (Type::Bool, Type::Float) | (Type::Int, Type::Float) => {
                true
            }
            (Type::Class(sub), Type::Class(ancestor)) => self.info.is_subclass(sub, ancestor),
            _ => false,
        }
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

fn literal_type(expr: &Expr) -> Option<Type> {
    match &expr.kind {
        ExprKind::Int(_) => Some(Type::Int),
        ExprKind::Float(_) => Some(Type::Float),
        ExprKind::Bool(_) => Some(Type::Bool),
        ExprKind::Str(_) => Some(Type::Str),
        _ => None,
    }
}

/// Module globals become C globals, so their initializers must be
/// emittable as static initializers.
fn is_const_initializer(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Bool(_) | ExprKind::Str(_) => true,
        ExprKind::List(elems) => elems.iter().all(|e| literal_type(e).is_some()),
        ExprKind::Dict(pairs) => pairs.iter().all(|(k, v)| {
            matches!(k.kind, ExprKind::Str(_)) && literal_type(v).is_some()
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};
    use indoc::indoc;

    fn check_source(source: &str) -> TypeResult<ModuleInfo> {
        let tokens = lexer::tokenize(source).expect("tokenize should succeed");
        let mut program = parser::parse_tokens(tokens).expect("parse should succeed");
        check(&mut program)
    }

    fn check_err(source: &str) -> TypeError {
        check_source(source).expect_err("expected type failure")
    }

    #[test]
    fn checks_simple_main() {
        let info = check_source(indoc! {"
            def main():
                print(1 + 2)
        "})
        .expect("check should succeed");
        assert!(info.has_main);
    }

    #[test]
    fn rejects_undefined_variable() {
        let err = check_err(indoc! {"
            def main():
                print(x)
        "});
        assert!(err.to_string().contains("undefined variable 'x'"));
    }

    #[test]
    fn rejects_heterogeneous_list() {
        let err = check_err(indoc! {"
            def main():
                xs: list[int] = [1, \"a\"]
        "});
        assert!(err.to_string().contains("list elements must all be int"));
    }

    #[test]
    fn empty_list_requires_declaration() {
        let err = check_err(indoc! {"
            def main():
                print([])
        "});
        assert!(err.to_string().contains("empty list literal"));

        check_source(indoc! {"
            def main():
                xs: list[int] = []
                xs.append(1)
        "})
        .expect("annotated empty list should check");
    }

    #[test]
    fn bool_is_not_numeric() {
        let err = check_err(indoc! {"
            def main():
                x: int = True + 1
        "});
        assert!(err.to_string().contains("'+' not supported"));
    }

    #[test]
    fn explicit_int_conversion_widens_bool() {
        check_source(indoc! {"
            def main():
                x: int = int(True) + 1
                print(x)
        "})
        .expect("int(True) should check");
    }

    #[test]
    fn division_always_yields_float() {
        let err = check_err(indoc! {"
            def main():
                x: int = 10 / 2
        "});
        assert!(err.to_string().contains("declared int, got float"));

        check_source(indoc! {"
            def main():
                x: int = 10 // 2
                y: float = 10.0 // 2
                print(x)
        "})
        .expect("floor division should check");
    }

    #[test]
    fn widening_applies_to_declarations() {
        check_source(indoc! {"
            def main():
                x: float = 1
                print(x)
        "})
        .expect("int widens to float");
    }

    #[test]
    fn conditions_must_be_bool() {
        let err = check_err(indoc! {"
            def main():
                if 1:
                    pass
        "});
        assert!(err.to_string().contains("if condition must be bool"));

        let err = check_err(indoc! {"
            def main():
                while 1:
                    pass
        "});
        assert!(err.to_string().contains("while condition must be bool"));
    }

    #[test]
    fn for_iterates_over_range_only() {
        check_source(indoc! {"
            def main():
                total: int = 0
                for i in range(1, 10):
                    total += i
                print(total)
        "})
        .expect("range loop should check");

        let err = check_err(indoc! {"
            def main():
                xs: list[int] = [1]
                for x in xs:
                    print(x)
        "});
        assert!(err.to_string().contains("range(...)"));
    }

    #[test]
    fn locals_require_declaration_before_assignment() {
        let err = check_err(indoc! {"
            def main():
                x = 1
        "});
        assert!(err.to_string().contains("undeclared variable 'x'"));
    }

    #[test]
    fn reassignment_must_keep_the_declared_type() {
        let err = check_err(indoc! {"
            def main():
                x: int = 1
                x = \"two\"
        "});
        assert!(err.to_string().contains("expected int, got str"));
    }

    #[test]
    fn global_statement_redirects_writes() {
        check_source(indoc! {"
            counter: int = 100
            def bump():
                global counter
                counter += 1
            def main():
                bump()
                print(counter)
        "})
        .expect("global redirect should check");

        let err = check_err(indoc! {"
            counter: int = 100
            def bump():
                counter += 1
        "});
        assert!(err.to_string().contains("'global' declaration"));
    }

    #[test]
    fn inherited_fields_resolve_through_the_chain() {
        let info = check_source(indoc! {"
            class P:
                def __init__(self):
                    self.hp = 10
            class M(P):
                def __init__(self):
                    P.__init__(self)
                    self.mp = 5
            def main():
                m: M = M()
                print(m.hp)
                print(m.mp)
        "})
        .expect("inheritance should check");
        assert_eq!(info.resolve_field("M", "hp"), Some((1, Type::Int)));
        assert_eq!(info.resolve_field("M", "mp"), Some((0, Type::Int)));
    }

    #[test]
    fn rejects_undefined_base_class() {
        let err = check_err(indoc! {"
            class A(B):
                pass
        "});
        assert!(err.to_string().contains("base class 'B'"));
    }

    #[test]
    fn rejects_inheritance_cycle() {
        let err = check_err(indoc! {"
            class A(B):
                pass
            class B(A):
                pass
        "});
        assert!(err.to_string().contains("inheritance cycle"));
    }

    #[test]
    fn rejects_unknown_attribute() {
        let err = check_err(indoc! {"
            class P:
                def __init__(self):
                    self.hp = 10
            def main():
                p: P = P()
                print(p.mana)
        "});
        assert!(err.to_string().contains("has no attribute 'mana'"));
    }

    #[test]
    fn class_attributes_resolve_through_the_class() {
        check_source(indoc! {"
            class P:
                species: str = \"human\"
                def __init__(self):
                    self.hp = 10
            def main():
                print(P.species)
        "})
        .expect("class attribute read should check");
    }

    #[test]
    fn subclass_widens_to_superclass_in_calls() {
        check_source(indoc! {"
            class P:
                def __init__(self):
                    self.hp = 10
            class M(P):
                def __init__(self):
                    P.__init__(self)
                    self.mp = 5
            def describe(p: P) -> int:
                return p.hp
            def main():
                m: M = M()
                print(describe(m))
        "})
        .expect("subclass should widen to superclass");
    }

    #[test]
    fn call_arity_respects_defaults() {
        check_source(indoc! {"
            def bump(n: int, by: int = 1) -> int:
                return n + by
            def main():
                print(bump(1))
                print(bump(1, 2))
        "})
        .expect("defaults should satisfy arity");

        let err = check_err(indoc! {"
            def bump(n: int, by: int = 1) -> int:
                return n + by
            def main():
                print(bump())
        "});
        assert!(err.to_string().contains("expects 1 to 2 arguments, got 0"));
    }

    #[test]
    fn return_type_is_enforced() {
        let err = check_err(indoc! {"
            def f() -> int:
                return \"no\"
        "});
        assert!(err.to_string().contains("expected int, got str"));

        let err = check_err(indoc! {"
            def f():
                return 1
        "});
        assert!(err.to_string().contains("must not return a value"));
    }

    #[test]
    fn raise_and_except_bind_str_alias() {
        check_source(indoc! {"
            def div(a: int, b: int) -> int:
                if b == 0:
                    raise RuntimeError(\"zero\")
                return a // b
            def main():
                try:
                    print(div(10, 0))
                except RuntimeError as e:
                    print(e)
        "})
        .expect("raise/except should check");
    }

    #[test]
    fn rejects_unknown_exception_type() {
        let err = check_err(indoc! {"
            def main():
                raise Oops(\"x\")
        "});
        assert!(err.to_string().contains("unknown exception type 'Oops'"));

        let err = check_err(indoc! {"
            def main():
                try:
                    pass
                except Oops:
                    pass
        "});
        assert!(err.to_string().contains("unknown exception type 'Oops'"));
    }

    #[test]
    fn exception_classes_may_inherit() {
        check_source(indoc! {"
            class Base:
                def __init__(self):
                    self.code = 1
            class Boom(Base):
                def __init__(self):
                    Base.__init__(self)
                    self.msg = \"bad\"
            def main():
                try:
                    raise Boom()
                except Boom as e:
                    print(e)
        "})
        .expect("derived exception class should check");
    }

    #[test]
    fn exception_classes_need_a_message_attribute() {
        let err = check_err(indoc! {"
            class Quiet:
                def __init__(self):
                    self.code = 1
            def main():
                raise Quiet()
        "});
        assert!(err.to_string().contains("leading 'str' attribute"));

        let err = check_err(indoc! {"
            class Quiet:
                def __init__(self):
                    self.code = 1
            def main():
                try:
                    pass
                except Quiet as e:
                    print(e)
        "});
        assert!(err.to_string().contains("leading 'str' attribute"));
    }

    #[test]
    fn is_requires_bool_operands() {
        let err = check_err(indoc! {"
            def main():
                x: bool = 1 is 2
        "});
        assert!(err.to_string().contains("'is' requires bool operands"));
    }

    #[test]
    fn top_level_statements_conflict_with_main() {
        check_source(indoc! {"
            arr: list[int] = [10]
            arr[0] = 20
            print(arr[0])
        "})
        .expect("top-level statements without main should check");

        let err = check_err(indoc! {"
            def main():
                pass
            print(1)
        "});
        assert!(err.to_string().contains("top-level statements"));
    }

    #[test]
    fn fstring_placeholders_must_be_primitive() {
        check_source(indoc! {"
            def main():
                hp: int = 10
                print(f\"hp: {hp}\")
        "})
        .expect("primitive placeholder should check");

        let err = check_err(indoc! {"
            def main():
                xs: list[int] = [1]
                print(f\"xs: {xs}\")
        "});
        assert!(err.to_string().contains("primitive"));
    }

    #[test]
    fn every_expression_gets_a_resolved_type() {
        let tokens = lexer::tokenize(indoc! {"
            def add(a: int, b: int) -> int:
                return a + b
            def main():
                print(add(2, 3))
        "})
        .expect("tokenize should succeed");
        let mut program = parser::parse_tokens(tokens).expect("parse should succeed");
        check(&mut program).expect("check should succeed");

        fn assert_typed(expr: &crate::parser::ast::Expr) {
            assert!(expr.ty.is_some(), "untyped expression: {expr:?}");
        }
        let StmtKind::FuncDef(func) = &program.body[1].kind else {
            panic!("expected main");
        };
        let StmtKind::Expr(call) = &func.body[0].kind else {
            panic!("expected expression statement");
        };
        assert_typed(call);
        let ExprKind::Call { args, .. } = &call.kind else {
            panic!("expected call");
        };
        assert_typed(&args[0]);
    }
}
