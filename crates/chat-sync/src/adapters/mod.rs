//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the outbound port traits: Ethereum JSON-RPC, DexScreener
//! pricing, and in-memory mocks.

pub mod abi;
mod dexscreener;
mod json_rpc;
pub mod mock;

pub use dexscreener::DexScreenerOracle;
pub use json_rpc::{parse_hex_u64, JsonRpcChainClient};
pub use mock::{MockChain, MockPriceOracle, MockWallet};
