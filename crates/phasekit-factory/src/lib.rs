//! Type registry and override resolution for Phasekit.
//!
//! A [`Factory`] maps type identities and names to creation proxies and
//! decides, per creation request, which type is actually built:
//!
//! - instance overrides scoped to an instance path (glob patterns) win
//!   over type overrides;
//! - overrides chain transitively, with a per-call loop guard;
//! - name lookups honour type aliases and instance-scoped aliases.
//!
//! Failures never cross the API as errors. They are reported through the
//! shared report server and surface as `None` (or the unchanged type).

mod debug;
mod factory;
mod proxy;
mod record;
mod search;
pub mod wildcard;

pub use debug::{CreationTrace, TraceEntry};
pub use factory::{Factory, OverrideKind, full_inst_path};
pub use proxy::{CreationProxy, FnProxy, Products, TypeHandle};
pub use record::{OverrideRecord, TypePair};
