mod intake;
mod processor;

pub use intake::{IntakeService, IntakeSettings};
pub use processor::{Completion, OrderProcessor, Stage};
