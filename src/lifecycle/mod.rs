// Item lifecycle: activo <-> desactivado, each transition paired with a ledger entry

pub mod workflow;

pub use workflow::{
    LifecycleWorkflow, TransitionOutcome, TransitionPlan, ACTIVATION_NOTE, DEACTIVATION_NOTE,
};
