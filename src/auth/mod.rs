//! JWT session handling.
//!
//! Dual-token system: short-lived access tokens (stateless) and long-lived
//! refresh tokens (the current one is stored on the user row). A request whose
//! access token has expired is revived transparently when its refresh token is
//! still the stored one; both cookies are then rotated.

mod cookie;
mod errors;
mod extractors;
mod issuer;
mod session;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, SessionCookies, append_set_cookies, bearer_token,
    get_cookie,
};
pub use errors::{SessionError, SessionErrorKind};
pub use extractors::{MaybeSession, Session, attach_rotated_cookies};
pub use issuer::{TokenIssuanceError, TokenIssuer, TokenPair};
pub use session::{
    RefreshRejection, SessionCredentials, SessionState, decode_refresh, evaluate_session,
};
pub use state::HasSessionBackend;
pub use types::SessionUser;
