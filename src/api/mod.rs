// =============================================================================
// HTTP Surface
// =============================================================================
//
// Thin read-only status endpoints plus the authenticated webhook. Everything
// substantive lives behind the engine; the handlers only snapshot shared
// state or enqueue commands.

pub mod auth;
pub mod rest;

pub use rest::router;
