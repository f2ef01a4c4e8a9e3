//! Pipeline stages for the upload-and-translate flow.
//!
//! Each submodule talks to exactly one remote surface, so each can be tested
//! against its own mock and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! auth ──▶ storage ──▶ encode ──▶ submit ──▶ poll
//! (token)  (bucket +   (urn)      (relay)    (manifest)
//!           upload)
//! ```
//!
//! 1. [`auth`]: client-credentials exchange for a bearer token
//! 2. [`storage`]: idempotent container creation and raw-byte upload
//! 3. [`encode`]: base64url urn encoding and the object id contract
//! 4. [`submit`]: translation job POST through the relay
//! 5. [`poll`]: manifest polling until the job is terminal

pub mod auth;
pub mod encode;
pub mod poll;
pub mod storage;
pub mod submit;
