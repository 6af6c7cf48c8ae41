//! Per-environment resource names.

use testbed_core::EnvironmentId;

/// `<prefix>_<slug>` limited to `max` characters, for SQL identifiers.
pub(crate) fn identifier(prefix: &str, id: &EnvironmentId, max: usize) -> String {
    let mut name = format!("{}_{}", prefix, id.slug());
    name.truncate(max);
    name.trim_end_matches('_').to_string()
}

/// `<prefix>-<slug>` with dashes, for bucket names, index prefixes and vhosts.
pub(crate) fn dashed(prefix: &str, id: &EnvironmentId, max: usize) -> String {
    let mut name = format!("{}-{}", prefix, id.slug().replace('_', "-"));
    name.truncate(max);
    name.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier() {
        let id = EnvironmentId::new("Env-42.a");
        assert_eq!(identifier("test", &id, 63), "test_env_42_a");
        assert_eq!(identifier("test", &id, 9), "test_env");
    }

    #[test]
    fn test_dashed() {
        let id = EnvironmentId::new("env_0192ABC");
        assert_eq!(dashed("test", &id, 63), "test-env-0192abc");
    }
}
