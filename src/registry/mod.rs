//! Process-wide mutable registries, owned explicitly and injected into the
//! components that need them.
//!
//! Both registries are shared `Mutex`-guarded maps mutated only from the
//! single-process event loop; they exist as owned stores (not globals) so
//! tests and multi-tenant embeddings get full isolation.

pub mod process;
pub mod subagent;

pub use process::ProcessRegistry;
pub use subagent::SubagentRegistry;
