//! Session state trait and macro.

use super::cookie::SessionCookies;
use super::issuer::TokenIssuer;
use crate::db::Database;
use crate::jwt::JwtConfig;

/// Trait for router states that can authenticate requests.
pub trait HasSessionBackend {
    fn db(&self) -> &Database;
    fn issuer(&self) -> &TokenIssuer;
    fn cookies(&self) -> SessionCookies;

    fn jwt(&self) -> &JwtConfig {
        self.issuer().jwt()
    }
}

/// Implement `HasSessionBackend` for a state struct.
///
/// The struct must have these fields:
/// - `db: Database`
/// - `issuer: TokenIssuer`
/// - `cookies: SessionCookies`
#[macro_export]
macro_rules! impl_has_session_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasSessionBackend for $state_type {
            fn db(&self) -> &$crate::db::Database {
                &self.db
            }
            fn issuer(&self) -> &$crate::auth::TokenIssuer {
                &self.issuer
            }
            fn cookies(&self) -> $crate::auth::SessionCookies {
                self.cookies
            }
        }
    };
}
