//! Per-request identifier generation.

use uuid::Uuid;

/// Unique opaque id assigned to every forwarded request; echoed back as
/// `X-Tokencap-Request-Id` and used as the ledger's `requestId` key.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_a_parseable_uuid() {
        let id = generate_request_id();
        assert_eq!(id.len(), 36);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn request_ids_are_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
    }
}
