pub mod builders;
pub mod strategies;

pub use autopromptr_core::test_helpers::*;
pub use builders::*;
