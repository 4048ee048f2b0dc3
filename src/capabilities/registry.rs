//! Registry that binds capability modules into a script's global namespace

use mlua::{Function, Lua, MetaMethod, MultiValue, UserData, UserDataMethods, Value};
use std::collections::{BTreeSet, HashMap};

use crate::capabilities::binding::{
    CapabilityModule, EnumBinding, ModuleDescriptor, PropertyBinding,
};
use crate::core::error::{MacroError, Result};

/// Ordered set of capability modules
///
/// Built once at host startup and then shared read-only (behind an `Arc`)
/// by every session, so no session can observe a partially registered
/// module.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: Vec<ModuleDescriptor>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module
    ///
    /// Registering a name again with the same binding signature replaces the
    /// earlier bindings in place (last write wins). A different signature is
    /// a conflict and leaves the registry untouched.
    pub fn register<M: CapabilityModule>(&mut self, module: &M) -> Result<()> {
        let descriptor = ModuleDescriptor::of(module);

        if let Some(name) = descriptor.duplicate_member() {
            return Err(self.conflict(
                descriptor.name,
                format!("member '{}' is declared more than once", name),
            ));
        }

        if let Some(clash) = self.global_clash(&descriptor) {
            return Err(self.conflict(descriptor.name, clash));
        }

        match self.modules.iter().position(|m| m.name == descriptor.name) {
            Some(index) => {
                let existing = self.modules[index].signature();
                let incoming = descriptor.signature();
                if existing != incoming {
                    return Err(
                        self.conflict(descriptor.name, existing.describe_mismatch(&incoming))
                    );
                }
                tracing::debug!("Replacing bindings of module {}", descriptor.name);
                self.modules[index] = descriptor;
            }
            None => {
                tracing::debug!(
                    "Registered module {} ({} functions, {} properties, {} enums)",
                    descriptor.name,
                    descriptor.functions.len(),
                    descriptor.properties.len(),
                    descriptor.enums.len()
                );
                self.modules.push(descriptor);
            }
        }

        Ok(())
    }

    fn conflict(&self, name: &str, reason: String) -> MacroError {
        tracing::error!("Module registration conflict for {}: {}", name, reason);
        MacroError::ModuleConflict {
            name: name.to_string(),
            reason,
        }
    }

    /// A global the incoming module would install that another module owns
    fn global_clash(&self, incoming: &ModuleDescriptor) -> Option<String> {
        let others = self.modules.iter().filter(|m| m.name != incoming.name);
        for other in others {
            if other.enums.iter().any(|e| e.name == incoming.name) {
                return Some(format!("name is an enumeration of module {}", other.name));
            }
            for binding in &incoming.enums {
                if binding.name == other.name {
                    return Some(format!("enumeration {} shadows module {}", binding.name, other.name));
                }
                let differs = other
                    .enums
                    .iter()
                    .any(|e| e.name == binding.name && e.members != binding.members);
                if differs {
                    return Some(format!(
                        "enumeration {} is declared differently by module {}",
                        binding.name, other.name
                    ));
                }
            }
        }
        None
    }

    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Every global the registry installs when bound, each listed once
    pub fn global_names(&self) -> Vec<&'static str> {
        let mut seen = BTreeSet::new();
        self.modules
            .iter()
            .flat_map(|m| m.global_names())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Install every module into `lua`'s globals, in registration order
    pub fn bind(&self, lua: &Lua) -> mlua::Result<()> {
        let globals = lua.globals();
        for module in &self.modules {
            globals.raw_set(module.name, Namespace::new(lua, module)?)?;
            for binding in &module.enums {
                globals.raw_set(binding.name, EnumProxy::from(binding))?;
            }
        }
        Ok(())
    }

    /// Remove everything [`bind`](Self::bind) installed
    pub fn unbind(&self, lua: &Lua) -> mlua::Result<()> {
        let globals = lua.globals();
        for name in self.global_names() {
            globals.raw_set(name, Value::Nil)?;
        }
        Ok(())
    }
}

/// Script view of one module
///
/// A userdata rather than a table: it holds no fields of its own, so every
/// read goes through `__index` (functions first, then properties recomputed
/// on each access) and every write through `__newindex`. `rawset` and
/// `setmetatable` refuse userdata outright.
struct Namespace {
    module: &'static str,
    functions: HashMap<&'static str, Function>,
    properties: HashMap<&'static str, PropertyBinding>,
}

impl Namespace {
    fn new(lua: &Lua, module: &ModuleDescriptor) -> mlua::Result<Self> {
        let module_name = module.name;
        let mut functions = HashMap::with_capacity(module.functions.len());
        for function in &module.functions {
            let binding = function.clone();
            let callable = lua.create_function(move |lua, args: MultiValue| {
                binding.invoke(lua, module_name, args)
            })?;
            functions.insert(function.name, callable);
        }

        Ok(Self {
            module: module_name,
            functions,
            properties: module
                .properties
                .iter()
                .map(|p| (p.name, p.clone()))
                .collect(),
        })
    }
}

impl UserData for Namespace {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: Value| {
            let Value::String(key) = key else {
                return Ok(Value::Nil);
            };
            let key = key.to_str()?;
            if let Some(function) = this.functions.get(&*key) {
                return Ok(Value::Function(function.clone()));
            }
            match this.properties.get(&*key) {
                Some(property) => property.read(lua),
                None => Ok(Value::Nil),
            }
        });
        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, this, (key, _): (Value, Value)| -> mlua::Result<()> {
                Err(assignment_error(
                    this.module,
                    &key,
                    "module members are read-only",
                ))
            },
        );
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("module {}", this.module))
        });
    }
}

/// Constant view of one enumeration
struct EnumProxy {
    name: &'static str,
    members: HashMap<&'static str, i64>,
}

impl From<&EnumBinding> for EnumProxy {
    fn from(binding: &EnumBinding) -> Self {
        Self {
            name: binding.name,
            members: binding.members.iter().copied().collect(),
        }
    }
}

impl UserData for EnumProxy {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |_, this, key: Value| {
            let Value::String(key) = key else {
                return Ok(None);
            };
            Ok(this.members.get(&*key.to_str()?).copied())
        });
        methods.add_meta_method(
            MetaMethod::NewIndex,
            |_, this, (key, _): (Value, Value)| -> mlua::Result<()> {
                Err(assignment_error(this.name, &key, "enumerations are constant"))
            },
        );
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("enum {}", this.name))
        });
    }
}

fn assignment_error(owner: &str, key: &Value, reason: &str) -> mlua::Error {
    mlua::Error::RuntimeError(format!(
        "cannot assign to {}.{}: {}",
        owner,
        describe_key(key),
        reason
    ))
}

fn describe_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.to_string_lossy().to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.type_name().to_string(),
    }
}
