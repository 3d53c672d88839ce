//! Request middleware.
//!
//! The rate limiter guards the public credential routes; the auth
//! validators guard member and admin routes.

pub mod auth;
pub mod rate;
