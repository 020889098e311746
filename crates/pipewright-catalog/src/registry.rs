//! Descriptor providers

use crate::descriptor::StageDescriptor;
use pipewright_core::StageKind;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Trait for anything that can look up stage descriptors by name
pub trait DescriptorProvider: Send + Sync {
    /// Find a descriptor by its name
    fn descriptor(&self, name: &str) -> Option<Arc<dyn StageDescriptor>>;

    /// Every known descriptor of a kind, sorted by name
    fn descriptors_of(&self, kind: StageKind) -> Vec<Arc<dyn StageDescriptor>>;
}

/// Descriptor provider backed by a name-keyed map
#[derive(Debug, Clone, Default)]
pub struct DescriptorRegistry {
    descriptors: BTreeMap<String, Arc<dyn StageDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing any previous one of the same name
    pub fn register(&mut self, descriptor: Arc<dyn StageDescriptor>) {
        self.descriptors.insert(descriptor.name().to_string(), descriptor);
    }

    pub fn with(mut self, descriptor: Arc<dyn StageDescriptor>) -> Self {
        self.register(descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors.keys().map(String::as_str).collect()
    }
}

impl DescriptorProvider for DescriptorRegistry {
    fn descriptor(&self, name: &str) -> Option<Arc<dyn StageDescriptor>> {
        self.descriptors.get(name).cloned()
    }

    fn descriptors_of(&self, kind: StageKind) -> Vec<Arc<dyn StageDescriptor>> {
        self.descriptors
            .values()
            .filter(|d| d.kind() == kind)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SimpleDescriptor;

    #[test]
    fn lookup_by_name_and_kind() {
        let registry = DescriptorRegistry::new()
            .with(SimpleDescriptor::filter("Null check", ["NULL", "NOT_NULL"]).build())
            .with(SimpleDescriptor::analyzer("Record counter").build());

        assert_eq!(registry.len(), 2);
        assert!(registry.descriptor("Null check").is_some());
        assert!(registry.descriptor("Missing").is_none());
        assert_eq!(registry.descriptors_of(StageKind::Analyzer).len(), 1);
        assert!(registry.descriptors_of(StageKind::Transformer).is_empty());
    }
}
