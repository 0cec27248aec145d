pub mod cli;
pub mod daemon;
pub mod node;
pub mod partkey;
pub mod settings;
pub mod testing;
