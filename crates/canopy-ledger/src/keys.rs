//! Composite world-state keys (`PREFIX_identifier`)

pub const ORACLE_PREFIX: &str = "ORACLE_";
pub const CONSENSUS_PREFIX: &str = "CONSENSUS_";
pub const BASELINE_PREFIX: &str = "BASELINE_";
pub const CLAIM_REF_PREFIX: &str = "CLAIMREF_";

pub fn oracle(oracle_id: &str) -> String {
    format!("{}{}", ORACLE_PREFIX, oracle_id)
}

/// Head pointer to the most recent consensus run for (location, time)
pub fn consensus_head(location: &str, unix: i64) -> String {
    format!("{}{}_{}", CONSENSUS_PREFIX, location, unix)
}

/// One consensus run; zero-padded so runs sort in order under a prefix scan
pub fn consensus_run(location: &str, unix: i64, run: u64) -> String {
    format!("{}_{:06}", consensus_head(location, unix), run)
}

/// Prefix shared by every run of one (location, time) key
pub fn consensus_runs_prefix(location: &str, unix: i64) -> String {
    format!("{}_", consensus_head(location, unix))
}

pub fn baseline_id(region: &str, season: &str) -> String {
    format!("{}_{}", region, season)
}

/// `{len}:{first}_{second}`; the byte length of `first` keeps pairs apart
/// when either id contains `_`
fn pair(first: &str, second: &str) -> String {
    format!("{}:{}_{}", first.len(), first, second)
}

pub fn baseline(region: &str, season: &str) -> String {
    format!("{}{}", BASELINE_PREFIX, pair(region, season))
}

/// Uniqueness marker for a (policy, index) claim pair
pub fn claim_ref(policy_id: &str, index_id: &str) -> String {
    format!("{}{}", CLAIM_REF_PREFIX, pair(policy_id, index_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(oracle("sat-1"), "ORACLE_sat-1");
        assert_eq!(consensus_head("Nakuru", 1709280000), "CONSENSUS_Nakuru_1709280000");
        assert_eq!(consensus_run("Nakuru", 1709280000, 3), "CONSENSUS_Nakuru_1709280000_000003");
        assert!(consensus_run("Nakuru", 1, 1).starts_with(&consensus_runs_prefix("Nakuru", 1)));
        assert_eq!(baseline("RiftValley", "long-rains"), "BASELINE_10:RiftValley_long-rains");
        assert_eq!(claim_ref("POL-1", "IDX-9"), "CLAIMREF_5:POL-1_IDX-9");
    }

    #[test]
    fn test_pair_keys_keep_underscored_ids_apart() {
        assert_ne!(claim_ref("POL_1", "IDX"), claim_ref("POL", "1_IDX"));
        assert_ne!(baseline("Rift_Valley", "long"), baseline("Rift", "Valley_long"));
        assert_ne!(claim_ref("1:A", "B"), claim_ref("1", "A_B"));
    }

    #[test]
    fn test_run_keys_sort_numerically() {
        let a = consensus_run("X", 5, 9);
        let b = consensus_run("X", 5, 10);
        assert!(a < b);
    }
}
