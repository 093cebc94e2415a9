//! Per-process agent identity: `agent:<pid>:<monotonic_ms>:<random_hex>`
//! (spec §3). Generated once per process and cached; every coordination
//! file write that needs an owner tag uses the same value for the life of
//! the process.

use std::sync::OnceLock;
use std::time::Instant;

use rand::Rng;

static AGENT_TAG: OnceLock<String> = OnceLock::new();
static PROCESS_START: OnceLock<Instant> = OnceLock::new();

fn monotonic_ms() -> u128 {
    let start = PROCESS_START.get_or_init(Instant::now);
    start.elapsed().as_millis()
}

fn random_hex(bytes: usize) -> String {
    let mut rng = rand::rng();
    (0..bytes).map(|_| format!("{:02x}", rng.random::<u8>())).collect()
}

/// Return this process's agent tag, generating it on first call.
pub fn agent_tag() -> &'static str {
    AGENT_TAG.get_or_init(|| {
        format!(
            "agent:{}:{}:{}",
            std::process::id(),
            monotonic_ms(),
            random_hex(4)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_stable_within_process() {
        let a = agent_tag();
        let b = agent_tag();
        assert_eq!(a, b);
    }

    #[test]
    fn tag_has_expected_shape() {
        let tag = agent_tag();
        let parts: Vec<&str> = tag.split(':').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "agent");
        assert_eq!(parts[1], std::process::id().to_string());
    }
}
