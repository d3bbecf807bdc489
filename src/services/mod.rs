pub mod attempt;
pub mod engine;
pub mod resolver;
pub mod scheduler;

pub use attempt::{AttemptOutcome, interpret_reply};
pub use engine::{EngineSettings, EngineStatus, RegistrationEngine};
pub use resolver::FallbackResolver;
pub use scheduler::TickScheduler;
