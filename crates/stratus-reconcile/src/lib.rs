//! Declarative reconciliation for Stratus
//!
//! Three layers, composed in strict order inside one pass:
//!
//! - the [`Reconciler`](reconciler::Reconciler) converges one base
//!   resource (create / update / delete) against its spec,
//! - the Permission Grantor ([`grants`]) converges inline statements,
//!   managed-policy attachments and key-usage grants under an owner that
//!   is known to exist,
//! - the Trigger Binder ([`triggers`]) wires event sources to a compute
//!   target, deduping existing bindings.
//!
//! A pass holds no state between invocations; observed state is fetched
//! fresh from the control plane every run. Preview mode computes and
//! reports the same outcomes without issuing a single mutating call.

pub mod artifact;
pub mod error;
pub mod grants;
pub mod pass;
pub mod reconciler;
pub mod triggers;

// Re-exports
pub use artifact::{Artifact, ArtifactSource};
pub use error::{ReconcileError, Result};
pub use grants::{GrantReport, GrantSpec, Grantor, KeyGrantOutcome};
pub use pass::{DeployPlan, PassReport, RoleGrants, StepOutcome, run_pass, teardown};
pub use reconciler::{Ensured, Reconciler};
pub use triggers::{BindingAttrs, TriggerBinder, TriggerBinding, TriggerSource};
