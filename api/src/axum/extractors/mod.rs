mod chain;

pub use chain::NamedChain;
