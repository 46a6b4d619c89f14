//! Client for the hosted backend (auth and table access).
//!
//! The backend speaks two protocols off one base URL: password auth under
//! `auth/v1` and row-level table access under `rest/v1`. Everything is
//! authenticated with the project anon key plus, once signed in, the
//! user's access token.

mod api_types;
mod client;
mod types;

pub use client::BackendClient;
pub use types::{AuthUser, MarketPrice, Profile, ProfileUpdate, Quest, Session, Trend};
