/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # fixwire Store
//!
//! Message storage for the fixwire FIX session engine.
//!
//! This crate provides:
//! - **MessageStore trait**: The append/range contract sessions rely on for
//!   resend requests and for resuming sequence numbers
//! - **MemoryStore**: In-memory store with concurrent append and lookup
//! - **StoreRegistry**: One shared entry point handing out a store per session

pub mod memory;
pub mod traits;

pub use memory::{MemoryStore, StoreRegistry};
pub use traits::MessageStore;
