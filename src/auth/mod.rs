//! Authentication: bearer tokens carrying user id and role.

mod jwt;

pub use jwt::{Claims, JwtSecret};
