pub mod batch;
pub mod bridge;
pub mod buffer;
pub mod expr;


pub use batch::BatchPlanner;
pub use bridge::{parse_pointer_array, PointerWidth, RemoteBridge, RemoteScratch};
pub use buffer::ABSENT_OFFSET;
