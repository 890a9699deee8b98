include!(concat!(env!("OUT_DIR"), "/constants.gen.rs"));

/// Content type of payloads posted to the upstream.
pub const PAYLOAD_CONTENT_TYPE: &str = "application/json";
