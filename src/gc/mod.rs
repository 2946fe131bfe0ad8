pub mod collector;
pub mod coordinator;
pub mod output;
pub mod scheduler;

pub use collector::GarbageCollector;
pub use coordinator::{GarbageBlob, GarbageListing, GcCoordinator};
