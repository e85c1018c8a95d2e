//! The object a host builds once and shares across many calls (§6.3).

use crate::context::{ReadContext, WriteContext};
use crate::types::TypeRegistry;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Options {
    xlang: bool,
    track_ref: bool,
    compatible: bool,
    check_struct_version: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { xlang: true, track_ref: false, compatible: false, check_struct_version: false }
    }
}

/// Holds the four behavioral switches plus the type registry. Built once,
/// shared by reference (or `Arc`) across calls; `Send + Sync` once built
/// since the registry is read-only from that point on.
#[derive(Debug)]
pub struct Config {
    options: Options,
    registry: TypeRegistry,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn xlang(&self) -> bool {
        self.options.xlang
    }

    /// Whether `serialize`/`deserialize` track the top-level value's
    /// identity by default (§6.3). Individual call sites still win over
    /// this default — collection, set, and map elements are always framed
    /// `RefMode::None` (§4.7) regardless of it, and `serialize_tracked`/
    /// `deserialize_tracked` let a caller request tracking (with an
    /// explicit identity) even when this is `false`.
    pub fn track_ref(&self) -> bool {
        self.options.track_ref
    }

    pub fn compatible(&self) -> bool {
        self.options.compatible
    }

    pub fn check_struct_version(&self) -> bool {
        self.options.check_struct_version
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// Hands out a fresh write context for one top-level `serialize` call.
    pub fn writer(&self) -> WriteContext<'_> {
        WriteContext::new(self)
    }

    /// Hands out a fresh read context for one top-level `deserialize` call.
    pub fn reader<'c>(&'c self, data: Arc<[u8]>) -> ReadContext<'c> {
        ReadContext::from_shared(self, data)
    }
}

/// Builder-methods-on-owned-self, in the teacher's style: `Config::builder()
/// .xlang(true).compatible(true).build()`.
#[derive(Default)]
pub struct ConfigBuilder {
    options: Options,
}

impl ConfigBuilder {
    pub fn xlang(mut self, value: bool) -> Self {
        self.options.xlang = value;
        self
    }

    pub fn track_ref(mut self, value: bool) -> Self {
        self.options.track_ref = value;
        self
    }

    pub fn compatible(mut self, value: bool) -> Self {
        self.options.compatible = value;
        self
    }

    pub fn check_struct_version(mut self, value: bool) -> Self {
        self.options.check_struct_version = value;
        self
    }

    pub fn build(self) -> Config {
        Config { options: self.options, registry: TypeRegistry::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_xlang_and_disable_the_rest() {
        let config = Config::builder().build();
        assert!(config.xlang());
        assert!(!config.track_ref());
        assert!(!config.compatible());
        assert!(!config.check_struct_version());
    }

    #[test]
    fn builder_methods_chain_on_owned_self() {
        let config = Config::builder().track_ref(true).compatible(true).check_struct_version(true).build();
        assert!(config.track_ref());
        assert!(config.compatible());
        assert!(config.check_struct_version());
    }
}
