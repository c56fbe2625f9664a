//! The Layout Graph (LG, component C2): a read-only mapping from a
//! `(pass, binding name)` pair to shader-stage visibility and descriptor
//! slot, consulted by the RAG builder when it derives a view's access flags.

use fnv::FnvHashMap;

bitflags! {
    /// Which shader stages a descriptor binding is visible to.
    #[repr(transparent)]
    pub struct ShaderStages: u32 {
        const VERTEX   = 0x01;
        const FRAGMENT = 0x02;
        const COMPUTE  = 0x04;
        const GEOMETRY = 0x08;
    }
}

/// Visibility and slot of one descriptor binding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BindingInfo {
    pub stages: ShaderStages,
    pub slot: u32,
}

/// Read-only `(pass, binding name) -> BindingInfo` table, built once from
/// shader reflection before the RAG is walked.
#[derive(Default)]
pub struct LayoutGraph {
    bindings: FnvHashMap<(String, String), BindingInfo>,
}

impl LayoutGraph {
    pub fn new() -> Self {
        LayoutGraph::default()
    }

    pub fn insert(&mut self, pass: &str, binding: &str, info: BindingInfo) {
        self.bindings
            .insert((pass.to_owned(), binding.to_owned()), info);
    }

    /// Look up shader-stage visibility for a view. If `binding` does not
    /// name a descriptor (e.g. a plain render-target view with no shader
    /// binding), visibility defaults to `FRAGMENT`.
    pub fn visibility(&self, pass: &str, binding: &str) -> ShaderStages {
        self.bindings
            .get(&(pass.to_owned(), binding.to_owned()))
            .map(|info| info.stages)
            .unwrap_or_else(|| {
                log::warn!(
                    "pass `{}` binding `{}` has no layout entry; defaulting visibility to FRAGMENT",
                    pass,
                    binding
                );
                ShaderStages::FRAGMENT
            })
    }

    pub fn slot(&self, pass: &str, binding: &str) -> Option<u32> {
        self.bindings
            .get(&(pass.to_owned(), binding.to_owned()))
            .map(|info| info.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_binding_defaults_to_fragment() {
        let lg = LayoutGraph::new();
        assert_eq!(lg.visibility("pass", "unknown"), ShaderStages::FRAGMENT);
    }

    #[test]
    fn known_binding_returns_declared_visibility() {
        let mut lg = LayoutGraph::new();
        lg.insert(
            "pass",
            "albedo",
            BindingInfo {
                stages: ShaderStages::FRAGMENT | ShaderStages::COMPUTE,
                slot: 3,
            },
        );
        assert_eq!(
            lg.visibility("pass", "albedo"),
            ShaderStages::FRAGMENT | ShaderStages::COMPUTE
        );
        assert_eq!(lg.slot("pass", "albedo"), Some(3));
    }
}
