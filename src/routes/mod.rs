/// Router Module Index
///
/// Splits the HTTP surface by access level. Authentication is applied as a
/// router layer on the authenticated module, so no protected endpoint can be
/// mounted without it.

/// Liveness only. No identity required.
pub mod public;

/// Every page route plus session management. Requires a valid identity; page
/// handlers additionally require a primary role.
pub mod authenticated;
