pub mod cli;
mod main_logic;

pub use main_logic::{
    ENV_NOTE, NO_RESOURCE_FILES, RunPlan, RunSummary, SERVICE_NAME, USAGE, execute, plan, run,
};
pub use smq_bus::{InMemoryTransport, NatsTransport, QueueTransport};
