//! User-facing configuration. A plain in-memory struct — no file format, no
//! CLI parsing.

/// Compile-time options the embedding application sets before building a
/// [`crate::Graph`].
#[derive(Copy, Clone, Debug)]
pub struct GraphConfig {
    /// Run the pass-reorder engine (C5). `false` preserves declaration
    /// order exactly.
    pub enable_pass_reorder: bool,

    /// Run the memory-aliasing stage. Currently a documented no-op: a
    /// future pass may coalesce resources with disjoint lifetimes, but it
    /// is a no-op in this implementation.
    pub enable_memory_aliasing: bool,

    /// Tradeoff weight for the reorder engine, clamped to `[0, 1]` on
    /// construction. `0.0` maximizes memory reuse (serializes diamonds
    /// aggressively); `1.0` preserves parallelism (serializes only where a
    /// `Memoryless` resource forces adjacency).
    pub parallel_exec_weight: f32,

    /// Drop subgraphs that produce only resources with no side effects and
    /// are never read.
    pub branch_culling: bool,
}

impl GraphConfig {
    /// A config with reordering and culling on, aliasing off (not yet
    /// implemented upstream), and a balanced reorder weight.
    pub fn new() -> Self {
        GraphConfig {
            enable_pass_reorder: true,
            enable_memory_aliasing: false,
            parallel_exec_weight: 0.5,
            branch_culling: true,
        }
    }

    /// Clamp `parallel_exec_weight` into `[0, 1]`.
    pub fn clamped(mut self) -> Self {
        self.parallel_exec_weight = self.parallel_exec_weight.max(0.0).min(1.0);
        self
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_clamped() {
        let cfg = GraphConfig {
            parallel_exec_weight: 5.0,
            ..GraphConfig::new()
        }
        .clamped();
        assert_eq!(cfg.parallel_exec_weight, 1.0);

        let cfg = GraphConfig {
            parallel_exec_weight: -5.0,
            ..GraphConfig::new()
        }
        .clamped();
        assert_eq!(cfg.parallel_exec_weight, 0.0);
    }
}
