pub mod machine_state;

pub use machine_state::{transition, MachineEvent, TransitionError};
