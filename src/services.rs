//! Service injection for modules
//!
//! Commands declare service slots with
//! [`ParameterDescriptor::service`](crate::command::ParameterDescriptor::service).
//! When a module is built,
//! the executor asks a [`ServiceProvider`] for an instance of each declared
//! role and hands the resolved [`Services`] to the module. Commands never
//! look services up on their own while running.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// A shared, type-erased service instance.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// The declared type of a service slot.
#[derive(Clone, Copy)]
pub struct ServiceRole {
    type_id: TypeId,
    type_name: &'static str,
}

impl ServiceRole {
    /// The role for service type `S`.
    pub fn of<S: Any + Send + Sync>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            type_name: std::any::type_name::<S>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ServiceRole {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceRole {}

impl fmt::Debug for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceRole({})", self.type_name)
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

impl Serialize for ServiceRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.type_name)
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Supplies service instances by role.
///
/// Whether a provider hands out shared singletons or fresh instances is up
/// to the provider; the executor applies no locking of its own.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceProvider: Send + Sync {
    /// An instance for `role`, or `None` if the provider has no such service.
    fn get(&self, role: &ServiceRole) -> Option<ServiceInstance>;
}

/// A simple provider backed by a map of singletons.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use modrun::services::{ServiceProvider, ServiceRegistry, ServiceRole};
///
/// struct Clock;
///
/// let mut registry = ServiceRegistry::new();
/// registry.insert(Arc::new(Clock));
/// assert!(registry.get(&ServiceRole::of::<Clock>()).is_some());
/// ```
#[derive(Default, Clone)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, ServiceInstance>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` as the singleton for its type, replacing any previous one.
    pub fn insert<S: Any + Send + Sync>(&mut self, service: Arc<S>) {
        self.services.insert(TypeId::of::<S>(), service);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<S: Any + Send + Sync>(mut self, service: Arc<S>) -> Self {
        self.insert(service);
        self
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceProvider for ServiceRegistry {
    fn get(&self, role: &ServiceRole) -> Option<ServiceInstance> {
        self.services.get(&role.type_id()).cloned()
    }
}

// ---------------------------------------------------------------------------
// Resolved services for one module
// ---------------------------------------------------------------------------

/// Services resolved for one module at construction time.
#[derive(Default, Clone)]
pub struct Services {
    by_name: HashMap<String, (ServiceRole, ServiceInstance)>,
}

impl Services {
    pub(crate) fn insert(&mut self, name: String, role: ServiceRole, instance: ServiceInstance) {
        self.by_name.insert(name, (role, instance));
    }

    /// The service bound to slot `name`, downcast to `S`.
    pub fn named<S: Any + Send + Sync>(&self, name: &str) -> Option<Arc<S>> {
        let (_, instance) = self.by_name.get(name)?;
        Arc::clone(instance).downcast::<S>().ok()
    }

    /// The first service of type `S`, regardless of slot name.
    pub fn get<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        let wanted = TypeId::of::<S>();
        self.by_name
            .values()
            .find(|(role, _)| role.type_id() == wanted)
            .and_then(|(_, instance)| Arc::clone(instance).downcast::<S>().ok())
    }

    /// Whether slot `name` was filled.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.by_name.iter().map(|(name, (role, _))| (name, role)))
            .finish()
    }
}
