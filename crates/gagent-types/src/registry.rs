//! Process-global `type_url -> schema` registry.
//!
//! The design mirrors the reference kernel's global opcode-handler
//! registry: a lazily-initialised, lock-protected map that is populated
//! additively and read far more often than it is written. It gives
//! deterministic `type_url` resolution (spec §4.5, §7 "type resolution
//! failure") without reflection: callers register a descriptor once, at
//! agent-type construction time, and every later lookup by `type_url` is
//! O(1) against the same table.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

/// Metadata describing a payload schema reachable by `type_url`.
///
/// The registry does not itself decode payloads — decoding is the
/// handler's job — it only proves a `type_url` is known, and carries a
/// human-readable name for logging and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Canonical `type_url`, e.g. `type.googleapis.com/orders.Placed`.
    pub type_url: String,
    /// Human-readable name for logs and error messages.
    pub display_name: String,
}

static REGISTRY: Lazy<RwLock<HashMap<String, TypeDescriptor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Process-wide handle for registering and resolving payload schemas by
/// `type_url`. Entries are additive and immutable per key; there is no
/// unregister operation, matching the "additively populated" contract in
/// the concurrency model (§5).
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeRegistry;

impl TypeRegistry {
    /// Register a `type_url`, overwriting any prior descriptor registered
    /// under the same key.
    ///
    /// Returns the previous descriptor, if one was already registered.
    pub fn register(descriptor: TypeDescriptor) -> Option<TypeDescriptor> {
        REGISTRY
            .write()
            .expect("type registry lock poisoned")
            .insert(descriptor.type_url.clone(), descriptor)
    }

    /// Resolve a `type_url` to its descriptor, if known.
    pub fn resolve(type_url: &str) -> Option<TypeDescriptor> {
        REGISTRY
            .read()
            .expect("type registry lock poisoned")
            .get(type_url)
            .cloned()
    }

    /// Whether a `type_url` is known to this process.
    pub fn is_known(type_url: &str) -> bool {
        REGISTRY
            .read()
            .expect("type registry lock poisoned")
            .contains_key(type_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_resolve_roundtrips() {
        let url = format!("type.googleapis.com/gagent.registry.test.{}", uuid::Uuid::new_v4());
        assert!(!TypeRegistry::is_known(&url));

        TypeRegistry::register(TypeDescriptor {
            type_url: url.clone(),
            display_name: "Test".to_string(),
        });

        assert!(TypeRegistry::is_known(&url));
        let resolved = TypeRegistry::resolve(&url).unwrap();
        assert_eq!(resolved.display_name, "Test");
    }

    #[test]
    fn unknown_type_url_resolves_to_none() {
        let url = format!("type.googleapis.com/gagent.registry.unknown.{}", uuid::Uuid::new_v4());
        assert!(TypeRegistry::resolve(&url).is_none());
    }
}
