//! # teller-core: Pure Domain Logic for Teller
//!
//! This crate is the domain heart of the transfer engine. It contains the
//! value types and rules that every other layer relies on, as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Teller Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    teller CLI (apps/teller-cli)                 │   │
//! │  │        seed • accounts • transfer • stress • ping               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               teller-db (Store + Transfer Engine)               │   │
//! │  │   TransferCoordinator ─► TransactionManager ─► AccountRepository│   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ teller-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   error   │  │ validation│  │   │
//! │  │   │  Account  │  │  Amount   │  │ CoreError │  │   rules   │  │   │
//! │  │   │ Transfer  │  │           │  │           │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Account, TransferRequest, TransferStep, ...)
//! - [`money`] - Amount type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Input and funds-sufficiency rules
//!
//! ## Example Usage
//!
//! ```rust
//! use teller_core::{AccountId, Amount, TransferRequest};
//!
//! let request = TransferRequest::new(AccountId::new(7), AccountId::new(3), Amount::from_minor(1500))
//!     .unwrap();
//!
//! // Locks are always taken lowest id first, whatever the direction.
//! assert_eq!(request.lock_order(), [AccountId::new(3), AccountId::new(7)]);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Amount;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Minor units per major unit (cents per dollar, tiyn per tenge).
///
/// Balances are stored and moved in minor units only; this constant is used
/// for parsing and display.
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Maximum length of an account display name.
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum length of an account contact email (RFC 5321 path limit).
pub const MAX_EMAIL_LENGTH: usize = 254;
