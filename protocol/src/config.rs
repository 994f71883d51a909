//! # Protocol Configuration & Constants
//!
//! Every magic number in the CE ledger lives here. The token defaults
//! below describe the asset exactly as it was first deployed; a ledger can
//! be configured differently, but these are what `LedgerConfig::default()`
//! hands out.

// ---------------------------------------------------------------------------
// Token Defaults
// ---------------------------------------------------------------------------

/// Human-readable token name.
pub const TOKEN_NAME: &str = "CE Token";

/// Ticker symbol.
pub const TOKEN_SYMBOL: &str = "CE";

/// Implied decimal places. 18, same as ether and most ERC-20 tokens.
pub const TOKEN_DECIMALS: u8 = 18;

/// Initial supply in whole tokens, minted to the initial holder at
/// construction. Scaled by `10^TOKEN_DECIMALS` before it touches a balance.
pub const INITIAL_SUPPLY_WHOLE: u64 = 1_000_000_000;

/// Largest decimals value a ledger accepts. `10^77` is the biggest power of
/// ten that fits in 256 bits; beyond that a single whole token is
/// unrepresentable.
pub const MAX_DECIMALS: u8 = 77;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Account identifier length in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Domain separator mixed into ledger address derivation so a ledger address
/// can never collide with a hash computed for any other purpose.
pub const LEDGER_ADDRESS_DOMAIN: &[u8] = b"ce-ledger/deploy/v1";

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Version string reported by the node and the status endpoint.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Default JSON-RPC / REST port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Capacity of the broadcast channel feeding WebSocket subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
