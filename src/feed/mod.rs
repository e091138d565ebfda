pub mod bridge;
pub mod queue;
pub mod stream;
