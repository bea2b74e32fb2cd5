//! Build metadata generated by the build script.

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// Wire protocol version a freshly configured node speaks unless
/// `mbus.protocol-version` says otherwise.
pub fn default_wire_protocol_version() -> u32 {
    WIRE_PROTOCOL_VERSION.parse().unwrap_or(1)
}

/// Build time string from the build script (UTC)
pub fn build_time() -> &'static str {
    BUILD_TIME
}

/// Short git hash captured by the build script
pub fn git_hash() -> &'static str {
    GIT_HASH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_wire_protocol_version_is_positive() {
        assert!(default_wire_protocol_version() >= 1);
    }
}
