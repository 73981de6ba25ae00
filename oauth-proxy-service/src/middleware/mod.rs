//! Request-ingress middleware: body-size enforcement, bearer-token
//! authentication, and rate limiting.
//!
//! Layer order, outermost first: trace → body-size guard → bearer
//! validator → global rate limiter → router.

pub mod bearer;
pub mod body_limit;
pub mod rate_limit;
