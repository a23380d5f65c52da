//! Symbol and layout tables built by the declaration pass and consumed
//! by the body pass and the code generator.

use std::collections::HashMap;

use crate::parser::ast::{Expr, Type};

/// One parameter of a registered function or method signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub name: String,
    pub ty: Type,
    /// Literal default expression, rendered at call sites (C has no
    /// default arguments).
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncSig {
    pub name: String,
    pub params: Vec<ParamSig>,
    pub return_type: Type,
}

impl FuncSig {
    /// Number of leading parameters without defaults.
    pub fn required_arity(&self) -> usize {
        self.params
            .iter()
            .take_while(|param| param.default.is_none())
            .count()
    }
}

/// An instance field of a class layout (own fields only; inherited
/// fields live in the embedded base layout).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
}

/// A class-body declaration: emitted both as the `C_<name>` module
/// constant and as an instance field.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticInfo {
    pub name: String,
    pub ty: Type,
    pub init: Expr,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub base: Option<String>,
    /// Own instance fields: class-body declarations first, then
    /// `self.x = …` discoveries from `__init__` in source order.
    pub fields: Vec<FieldInfo>,
    pub statics: Vec<StaticInfo>,
    pub methods: HashMap<String, FuncSig>,
    /// Own method names in source order, for deterministic emission.
    pub method_order: Vec<String>,
}

impl ClassInfo {
    pub fn own_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn static_attr(&self, name: &str) -> Option<&StaticInfo> {
        self.statics.iter().find(|attr| attr.name == name)
    }
}

/// Everything the body pass resolves against and the generator lowers
/// from: class layouts, function signatures, module globals.
#[derive(Debug, Clone, Default)]
pub struct ModuleInfo {
    pub classes: HashMap<String, ClassInfo>,
    /// Classes ordered base-before-subclass.
    pub class_order: Vec<String>,
    pub functions: HashMap<String, FuncSig>,
    pub globals: Vec<(String, Type)>,
    pub has_main: bool,
}

impl ModuleInfo {
    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn is_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Walk the base chain looking for an instance field. Returns the
    /// number of `base` hops needed to reach the owning layout.
    pub fn resolve_field(&self, class: &str, attr: &str) -> Option<(usize, Type)> {
        let mut depth = 0;
        let mut current = self.class(class);
        while let Some(info) = current {
            if let Some(field) = info.own_field(attr) {
                return Some((depth, field.ty.clone()));
            }
            depth += 1;
            current = info.base.as_deref().and_then(|base| self.class(base));
        }
        None
    }

    /// Walk the base chain looking for a method; returns the defining
    /// class and its signature.
    pub fn resolve_method(&self, class: &str, method: &str) -> Option<(&str, &FuncSig)> {
        let mut current = self.class(class);
        while let Some(info) = current {
            if let Some(sig) = info.methods.get(method) {
                return Some((info.name.as_str(), sig));
            }
            current = info.base.as_deref().and_then(|base| self.class(base));
        }
        None
    }

    /// Walk the base chain looking for a class-level attribute.
    pub fn resolve_static(&self, class: &str, attr: &str) -> Option<(&str, &StaticInfo)> {
        let mut current = self.class(class);
        while let Some(info) = current {
            if let Some(static_attr) = info.static_attr(attr) {
                return Some((info.name.as_str(), static_attr));
            }
            current = info.base.as_deref().and_then(|base| self.class(base));
        }
        None
    }

    pub fn is_subclass(&self, sub: &str, ancestor: &str) -> bool {
        let mut current = Some(sub);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self
                .class(name)
                .and_then(|info| info.base.as_deref());
        }
        false
    }
}

/// What a name is bound to within some scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Local(Type),
    Param(Type),
    Class,
    Function,
    ImportAlias,
}

impl Binding {
    pub fn value_type(&self) -> Option<&Type> {
        match self {
            Binding::Local(ty) | Binding::Param(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Stack of name tables: module scope at the bottom, then one scope per
/// function, then one per nested block.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Binding>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        debug_assert!(self.scopes.len() > 1, "module scope never popped");
        self.scopes.pop();
    }

    pub fn declare(&mut self, name: &str, binding: Binding) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), binding);
    }

    pub fn declare_module(&mut self, name: &str, binding: Binding) {
        self.scopes[0].insert(name.to_string(), binding);
    }

    /// Innermost binding for `name`, searching the whole chain.
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
    }

    /// Binding in the innermost scope only (re-declaration checks).
    pub fn lookup_innermost(&self, name: &str) -> Option<&Binding> {
        self.scopes
            .last()
            .expect("scope stack is never empty")
            .get(name)
    }

    /// Binding anywhere above the module scope (function-local view).
    pub fn lookup_function_local(&self, name: &str) -> Option<&Binding> {
        self.scopes[1..]
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
    }

    pub fn lookup_module(&self, name: &str) -> Option<&Binding> {
        self.scopes[0].get(name)
    }

    /// Drop everything above the module scope.
    pub fn reset_to_module(&mut self) {
        self.scopes.truncate(1);
    }
}
