pub mod crypto;
pub mod txn;
pub mod block;
pub mod vote;
pub mod chain;
pub mod node;
pub mod msg;
pub mod leader;
pub mod config;
pub mod net;
pub mod sim;

pub use block::Block;
pub use chain::Chain;
pub use config::Config;
pub use node::{Id, Node};
pub use vote::Vote;
