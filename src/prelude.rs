//! Common imports for working with SSO bearer token sessions.

pub use crate::cache::{FileTokenCache, MemoryTokenCache, TokenCache};
pub use crate::clock::{Clock, SystemClock};
pub use crate::device::{LoginCallback, NoopLoginCallback};
pub use crate::error::{AuthError, Result};
pub use crate::oidc::{HttpOidcClient, OidcClient};
pub use crate::session::{BearerTokenSession, TokenEvent};
pub use crate::token::{
    AccessToken, BearerTokenAuthState, ClientRegistration, PendingAuthorization, SessionKey,
};
