use ethereum_types::H256;

use crate::hashing::Config;
use crate::prover::ProverState;

/// Keeps the tests fast. Proof checks do not depend on the depth.
pub(crate) const TEST_DEPTH: usize = 10;

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

pub(crate) fn storage_key(i: u64) -> H256 {
    H256::from_low_u64_be(i)
}

pub(crate) fn small_storage_trie() -> ProverState<H256, H256> {
    ProverState::new(
        Config::poseidon().with_depth(TEST_DEPTH),
        "0x00000000000000000000000000000000000000aa",
    )
    .unwrap()
}
