pub mod engine;
pub mod states;

pub use engine::{SourceUpdateFlow, UpdateEngine, UpdateFlow, UpdateTransitionError};
pub use states::{
    TransitionOutcome, UpdateAction, UpdateContext, UpdateEvent, UpdateKind, UpdateState,
};
