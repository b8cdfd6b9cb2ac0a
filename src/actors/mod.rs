// ============================================================================
// Actors Module
// ============================================================================
//
// Infrastructure actors only. Order logic lives in `services`; actors hold
// the operational side such as the dead letter queue.
//
// ============================================================================

mod dlq;

pub use dlq::{AddToDlq, DeadLetter, DeadLetterActor, DlqStats, GetDlqStats};
