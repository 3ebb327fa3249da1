//! Object kind → group-resource mapping used to key custom metrics.

use std::collections::{BTreeMap, HashMap};

use adapter_core::GroupResource;

/// Maps the `kind` of a described object to the group-resource the
/// custom metrics API addresses it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindMap {
    kinds: HashMap<String, GroupResource>,
}

impl Default for KindMap {
    /// `Pod → pods` and `Ingress → extensions/ingresses`.
    fn default() -> Self {
        Self::empty()
            .with("Pod", GroupResource::core("pods"))
            .with("Ingress", GroupResource::new("extensions", "ingresses"))
    }
}

impl KindMap {
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    pub fn with(mut self, kind: impl Into<String>, group_resource: GroupResource) -> Self {
        self.kinds.insert(kind.into(), group_resource);
        self
    }

    /// Merge configured mappings over the current ones.
    pub fn extend(&mut self, kinds: &BTreeMap<String, GroupResource>) {
        for (kind, gr) in kinds {
            self.kinds.insert(kind.clone(), gr.clone());
        }
    }

    pub fn resolve(&self, kind: &str) -> Option<&GroupResource> {
        self.kinds.get(kind)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
