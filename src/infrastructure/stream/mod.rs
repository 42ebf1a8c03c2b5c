pub mod sse;
pub mod subscriber;
