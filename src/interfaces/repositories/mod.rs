pub mod backend;
pub mod codec;
pub mod recognition;
pub mod storage;
pub mod token;
