//! sso-bearer — SSO bearer token acquisition, caching, and refresh.
//!
//! Client-side engine for the OAuth 2.0 device-authorization grant
//! (RFC 8628) plus refresh-token exchange against a federated SSO identity
//! provider: device-code polling, on-disk caching of client registrations
//! and access tokens, an expiry/staleness state machine, and a
//! single-flight background refresh scheduler.
//!
//! # Quick Start
//!
//! ```no_run
//! use sso_bearer::prelude::*;
//!
//! # async fn example() -> sso_bearer::Result<()> {
//! let key = SessionKey::new(
//!     "https://example.awsapps.com/start",
//!     "us-east-1",
//!     ["sso:account:access"],
//! );
//! let session = BearerTokenSession::builder(key).build();
//! let token = session.resolve_token().await?;
//! println!("{}", token.access_token);
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod cache;
pub mod clock;
pub mod device;
pub mod error;
pub mod oidc;
pub mod prelude;
pub mod session;
pub mod token;

#[cfg(feature = "cli")]
pub mod cli;

pub use acquire::AccessTokenAcquirer;
pub use cache::{FileTokenCache, MemoryTokenCache, TokenCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{DeviceAuthorizationFlow, LoginCallback, NoopLoginCallback};
pub use error::{AuthError, Result};
pub use oidc::{HttpOidcClient, OidcClient};
pub use session::{BearerTokenSession, TokenEvent};
pub use token::{
    AccessToken, BearerTokenAuthState, ClientRegistration, PendingAuthorization, SessionKey,
};
