//! Capability module descriptors
//!
//! A capability module is a named, statically declared bundle of host
//! operations. Each module lists its functions, properties and enumerations
//! as explicit name-to-callable tables; nothing is discovered at runtime.

use mlua::{FromLuaMulti, IntoLua, IntoLuaMulti, Lua, MultiValue, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Host callable behind a script function
pub type HostFunction = Arc<dyn Fn(&Lua, MultiValue) -> mlua::Result<MultiValue> + Send + Sync>;

/// Host callable behind a read-only property
pub type PropertyGetter = Arc<dyn Fn(&Lua) -> mlua::Result<Value> + Send + Sync>;

/// Number of arguments a script function accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    pub const fn exact(count: usize) -> Self {
        Self {
            min: count,
            max: count,
        }
    }

    /// `min` required arguments followed by optional ones up to `max`
    pub const fn range(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn accepts(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{} to {}", self.min, self.max)
        }
    }
}

/// A function exposed in a module namespace
#[derive(Clone)]
pub struct FunctionBinding {
    pub name: &'static str,
    pub arity: Arity,
    call: HostFunction,
}

impl FunctionBinding {
    /// Bind a typed host closure; arguments and results convert through mlua
    pub fn new<A, R, F>(name: &'static str, arity: Arity, f: F) -> Self
    where
        A: FromLuaMulti,
        R: IntoLuaMulti,
        F: Fn(&Lua, A) -> mlua::Result<R> + Send + Sync + 'static,
    {
        let call: HostFunction = Arc::new(move |lua, args| {
            let args = A::from_lua_multi(args, lua)?;
            f(lua, args)?.into_lua_multi(lua)
        });
        Self { name, arity, call }
    }

    /// Check the argument count, then run the host closure
    pub fn invoke(&self, lua: &Lua, module: &str, args: MultiValue) -> mlua::Result<MultiValue> {
        if !self.arity.accepts(args.len()) {
            return Err(mlua::Error::RuntimeError(format!(
                "{}.{} expects {} argument(s), got {}",
                module,
                self.name,
                self.arity,
                args.len()
            )));
        }
        (self.call)(lua, args)
    }
}

impl fmt::Debug for FunctionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBinding")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A read-only property; the getter runs on every access
#[derive(Clone)]
pub struct PropertyBinding {
    pub name: &'static str,
    get: PropertyGetter,
}

impl PropertyBinding {
    pub fn new<R, F>(name: &'static str, f: F) -> Self
    where
        R: IntoLua,
        F: Fn(&Lua) -> mlua::Result<R> + Send + Sync + 'static,
    {
        let get: PropertyGetter = Arc::new(move |lua| f(lua)?.into_lua(lua));
        Self { name, get }
    }

    pub fn read(&self, lua: &Lua) -> mlua::Result<Value> {
        (self.get)(lua)
    }
}

impl fmt::Debug for PropertyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBinding")
            .field("name", &self.name)
            .finish()
    }
}

/// An enumeration exposed as a global constant table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumBinding {
    pub name: &'static str,
    pub members: Vec<(&'static str, i64)>,
}

impl EnumBinding {
    pub fn new(name: &'static str, members: &[(&'static str, i64)]) -> Self {
        Self {
            name,
            members: members.to_vec(),
        }
    }
}

/// A bundle of host operations exposed to scripts under one namespace
pub trait CapabilityModule: Send + Sync {
    /// Global namespace the module is bound under
    fn name(&self) -> &'static str;

    fn functions(&self) -> Vec<FunctionBinding>;

    fn properties(&self) -> Vec<PropertyBinding> {
        Vec::new()
    }

    fn enums(&self) -> Vec<EnumBinding> {
        Vec::new()
    }
}

/// Snapshot of a module's bindings, taken once at registration
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub name: &'static str,
    pub functions: Vec<FunctionBinding>,
    pub properties: Vec<PropertyBinding>,
    pub enums: Vec<EnumBinding>,
}

impl ModuleDescriptor {
    pub fn of(module: &dyn CapabilityModule) -> Self {
        Self {
            name: module.name(),
            functions: module.functions(),
            properties: module.properties(),
            enums: module.enums(),
        }
    }

    pub fn signature(&self) -> ModuleSignature {
        ModuleSignature {
            functions: self.functions.iter().map(|f| (f.name, f.arity)).collect(),
            properties: self.properties.iter().map(|p| p.name).collect(),
            enums: self
                .enums
                .iter()
                .map(|e| (e.name, e.members.clone()))
                .collect(),
        }
    }

    /// Script globals this module installs
    pub fn global_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.enums.iter().map(|e| e.name))
    }

    /// First member name declared more than once
    pub fn duplicate_member(&self) -> Option<&'static str> {
        let mut seen = BTreeSet::new();
        self.functions
            .iter()
            .map(|f| f.name)
            .chain(self.properties.iter().map(|p| p.name))
            .find(|name| !seen.insert(*name))
    }
}

/// Shape of a module's bindings; two registrations under one name must agree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSignature {
    pub functions: BTreeSet<(&'static str, Arity)>,
    pub properties: BTreeSet<&'static str>,
    pub enums: BTreeSet<(&'static str, Vec<(&'static str, i64)>)>,
}

impl ModuleSignature {
    /// Human-readable description of how `other` differs from `self`
    pub fn describe_mismatch(&self, other: &ModuleSignature) -> String {
        let mut reasons = Vec::new();
        if self.functions != other.functions {
            let changed: Vec<_> = self
                .functions
                .symmetric_difference(&other.functions)
                .map(|(name, arity)| format!("{}/{}", name, arity))
                .collect();
            reasons.push(format!("functions differ ({})", changed.join(", ")));
        }
        if self.properties != other.properties {
            reasons.push("properties differ".to_string());
        }
        if self.enums != other.enums {
            reasons.push("enumerations differ".to_string());
        }
        reasons.join("; ")
    }
}
