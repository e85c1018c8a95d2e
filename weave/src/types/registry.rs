//! Maps language types to wire dispatch information. Registrations are
//! external-synchronization-only: the registry is read-only for the
//! duration of any serialize/deserialize call (§5).

use super::WireKind;
use crate::error::{Error, Result};
use crate::meta_string::{MetaString, SpecialChars};
use fxhash::FxHashMap;
use std::any::TypeId;

/// Either form a registration may take; mutually exclusive per type.
#[derive(Debug, Clone)]
pub enum RegistrationForm {
    ById(u32),
    ByName { namespace: MetaString, name: MetaString },
}

/// The tuple (language type handle, wire kind, registration form). The
/// language type handle is `TypeId`, the closest stable analog Rust has to
/// "a handle identifying a type at runtime" across the registry's lifetime.
#[derive(Debug, Clone)]
pub struct RegisteredType {
    pub type_handle: TypeId,
    pub wire_kind: WireKind,
    pub form: RegistrationForm,
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_handle: FxHashMap<TypeId, RegisteredType>,
    by_id: FxHashMap<u32, TypeId>,
    by_name: FxHashMap<(String, String), TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Registers `type_handle` under `user_id`. Re-registering the same
    /// handle under the same id is a no-op; registering a different handle
    /// under an id already in use, or the same handle under a second id, is
    /// a conflict.
    pub fn register_by_id(&mut self, type_handle: TypeId, wire_kind: WireKind, user_id: u32) -> Result<()> {
        if let Some(existing) = self.by_handle.get(&type_handle) {
            return match &existing.form {
                RegistrationForm::ById(id) if *id == user_id => Ok(()),
                _ => Err(Error::InvalidData(format!(
                    "type already registered under a different form (handle {type_handle:?})"
                ))),
            };
        }
        if let Some(owner) = self.by_id.get(&user_id) {
            if *owner != type_handle {
                return Err(Error::InvalidData(format!("user id {user_id} already registered to another type")));
            }
        }
        self.by_id.insert(user_id, type_handle);
        self.by_handle.insert(type_handle, RegisteredType { type_handle, wire_kind, form: RegistrationForm::ById(user_id) });
        #[cfg(feature = "tracing")]
        tracing::debug!(?type_handle, user_id, ?wire_kind, "registered type by id");
        Ok(())
    }

    /// Registers `type_handle` under `(namespace, name)`, encoding both as
    /// MetaStrings eagerly so the write path never has to fail mid-envelope.
    pub fn register_by_name(
        &mut self,
        type_handle: TypeId,
        wire_kind: WireKind,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let key = (namespace.to_string(), name.to_string());
        if let Some(existing) = self.by_handle.get(&type_handle) {
            return match &existing.form {
                RegistrationForm::ByName { .. } if self.by_name.get(&key) == Some(&type_handle) => Ok(()),
                _ => Err(Error::InvalidData(format!(
                    "type already registered under a different form (handle {type_handle:?})"
                ))),
            };
        }
        if let Some(owner) = self.by_name.get(&key) {
            if *owner != type_handle {
                return Err(Error::InvalidData(format!("name {namespace}.{name} already registered to another type")));
            }
        }
        let namespace_ms = MetaString::encode(namespace, SpecialChars::NAMESPACE)?;
        let name_ms = MetaString::encode(name, SpecialChars::NAMESPACE)?;
        self.by_name.insert(key, type_handle);
        self.by_handle.insert(
            type_handle,
            RegisteredType { type_handle, wire_kind, form: RegistrationForm::ByName { namespace: namespace_ms, name: name_ms } },
        );
        Ok(())
    }

    /// Write-side lookup: the serializer already has the concrete type, it
    /// needs to know how to frame it.
    pub fn lookup_by_type_handle(&self, handle: TypeId) -> Result<&RegisteredType> {
        self.by_handle.get(&handle).ok_or_else(|| {
            #[cfg(feature = "tracing")]
            tracing::debug!(?handle, "lookup_by_type_handle: no registration for this handle");
            Error::TypeNotRegistered(format!("{handle:?}"))
        })
    }

    /// Read-side lookup by user id, as found in a value's type-info prefix.
    pub fn lookup_by_user_id(&self, id: u32) -> Result<&RegisteredType> {
        let handle = self.by_id.get(&id).ok_or_else(|| {
            #[cfg(feature = "tracing")]
            tracing::debug!(user_id = id, "lookup_by_user_id: no registration for this id");
            Error::TypeNotRegistered(format!("user id {id}"))
        })?;
        self.lookup_by_type_handle(*handle)
    }

    /// Read-side lookup by the decoded namespace/name pair.
    pub fn lookup_by_name(&self, namespace: &str, name: &str) -> Result<&RegisteredType> {
        let handle = self
            .by_name
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| {
                #[cfg(feature = "tracing")]
                tracing::debug!(namespace, name, "lookup_by_name: no registration for this name");
                Error::TypeNotRegistered(format!("{namespace}.{name}"))
            })?;
        self.lookup_by_type_handle(*handle)
    }
}
