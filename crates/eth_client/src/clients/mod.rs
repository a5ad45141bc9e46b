//! Client implementations.

mod mock;

pub use self::mock::{MockChain, MockExecutedTxHandle};
