pub mod chain;

pub use chain as ChainController;
