//! Explicit request context.
//!
//! The requesting user's identity is passed into every service call rather
//! than read from ambient state; the authentication collaborator has already
//! verified identity and source ownership by the time a request reaches the
//! service.

use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub user_id: Uuid,
}

impl RequestContext {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}
