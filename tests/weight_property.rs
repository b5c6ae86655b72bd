// tests/weight_property.rs
use proptest::prelude::*;
use tangle_dag::dag::transaction::TAG_TRYTES;
use tangle_dag::dag::trytes::int_to_trytes;
use tangle_dag::tipselection::WeightCalculator;
use tangle_dag::{TangleStore, TransactionBuilder, TryteHash};

/// Admit one transaction per `(trunk, branch)` pick; index 0 means the null
/// hash, `n` the n-th transaction admitted so far.
fn grow(store: &TangleStore, hashes: &mut Vec<TryteHash>, picks: &[(usize, usize)]) {
    for (trunk, branch) in picks {
        let pick = |p: usize| match p % (hashes.len() + 1) {
            0 => TryteHash::NULL,
            n => hashes[n - 1],
        };
        let tag = int_to_trytes(hashes.len() as i64 + 1, TAG_TRYTES).unwrap();
        let tx = TransactionBuilder::new()
            .tag(tag)
            .timestamp(1)
            .parents(pick(*trunk), pick(*branch))
            .build()
            .unwrap();
        hashes.push(store.admit(tx).unwrap().hash);
    }
}

fn assert_weights_match(store: &TangleStore, hashes: &[TryteHash]) {
    let view = store.read();
    let calc = WeightCalculator::new(&view);
    for hash in hashes {
        assert_eq!(calc.cumulative_weight(hash).unwrap(), calc.count_approving(hash).unwrap());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn memoized_weight_matches_brute_force(
        before in prop::collection::vec((0usize..64, 0usize..64), 1..30),
        after in prop::collection::vec((0usize..64, 0usize..64), 0..30),
        window in 1usize..40,
    ) {
        let store = TangleStore::new(window);
        let mut hashes = Vec::new();

        grow(&store, &mut hashes, &before);
        assert_weights_match(&store, &hashes);

        // cached entries now have to follow the incremental path
        grow(&store, &mut hashes, &after);
        assert_weights_match(&store, &hashes);

        let view = store.read();
        let calc = WeightCalculator::new(&view);
        for tip in view.tips() {
            prop_assert_eq!(calc.cumulative_weight(&tip).unwrap(), 1);
            prop_assert!(view.approvers(&tip).is_empty());
        }
    }
}
