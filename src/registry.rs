use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();

/// Process-wide registry resolving wire type names to Rust payload types.
///
/// Read-mostly: register every event type once at startup, before the first
/// envelope is delivered. This is the only process-global state in the crate.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, TypeId>>,
}

impl TypeRegistry {
    /// Returns the process-wide instance.
    pub fn global() -> &'static TypeRegistry {
        GLOBAL.get_or_init(TypeRegistry::default)
    }

    /// Binds `type_name` to `T`. Returns `false` (keeping the first binding)
    /// if the name is already bound to a different type; rebinding a name to
    /// the same type is fine and returns `true`.
    pub fn register<T: 'static>(&self, type_name: impl Into<String>) -> bool {
        let type_name = type_name.into();
        let mut types = self.types.write().expect("type registry lock poisoned");
        match types.get(&type_name) {
            Some(existing) => *existing == TypeId::of::<T>(),
            None => {
                types.insert(type_name, TypeId::of::<T>());
                true
            }
        }
    }

    /// Whether `type_name` is bound to `T`.
    pub fn is<T: 'static>(&self, type_name: &str) -> bool {
        self.types
            .read()
            .expect("type registry lock poisoned")
            .get(type_name)
            .is_some_and(|id| *id == TypeId::of::<T>())
    }

    /// Whether `type_name` is bound at all.
    pub fn contains(&self, type_name: &str) -> bool {
        self.types
            .read()
            .expect("type registry lock poisoned")
            .contains_key(type_name)
    }
}
