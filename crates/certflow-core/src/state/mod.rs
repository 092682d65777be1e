// # Parameter Store Implementations
//
// Local implementations of the ParameterStore trait. The remote SSM-backed
// store lives in the AWS provider crate.

pub mod file;
pub mod memory;

pub use file::FileParameterStore;
pub use memory::MemoryParameterStore;
