//! Property tests for the block sequence and state versioning invariants.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chain_ledger_state::{
    BlockInsert, Ledger, ProvisionMode, StorageEngine, TableRegistry, provision,
};
use chain_ledger_test_utils::{strategies, table_config};
use chain_ledger_types::{Block, BlockNum, Document, IndexValue, OPEN_END_BLOCK, StateRecord};
use proptest::prelude::*;

const KEYS: &[&str] = &["a", "b", "c"];

fn ledger() -> Ledger {
    let engine = StorageEngine::open_in_memory().expect("open");
    let registry = TableRegistry::new([table_config("items", "Item", "key")]).expect("registry");
    provision(&engine, &registry, ProvisionMode::Ensure).expect("provision");
    Ledger::new(engine, registry)
}

fn all_versions(ledger: &Ledger) -> Vec<(IndexValue, Vec<StateRecord>)> {
    KEYS.iter()
        .map(|key| {
            let index = IndexValue::from(*key);
            let history = ledger.state().history("items", &index).expect("history");
            (index, history)
        })
        .collect()
}

/// Checks the per-entity versioning invariants.
fn assert_versions_well_formed(ledger: &Ledger) -> Result<(), TestCaseError> {
    for (index, history) in all_versions(ledger) {
        let open = history.iter().filter(|r| r.is_current()).count();
        prop_assert!(open <= 1, "{index} has {open} current versions");
        for record in &history {
            prop_assert_eq!(record.latest, record.end_block_num == OPEN_END_BLOCK);
            prop_assert!(record.start_block_num < record.end_block_num);
        }
        for pair in history.windows(2) {
            prop_assert_eq!(
                pair[0].end_block_num,
                pair[1].start_block_num,
                "versions of {} must be contiguous",
                index
            );
        }
    }
    Ok(())
}

/// One entity, keyed by a string or an integer, with a payload per height.
fn arb_entity_plan() -> impl Strategy<Value = (IndexValue, Vec<(BlockNum, Document)>)> {
    (strategies::arb_index_value(), strategies::arb_heights(1..12)).prop_flat_map(
        |(index, heights)| {
            let payloads = proptest::collection::vec(
                strategies::arb_payload("key", index.clone()),
                heights.len(),
            );
            (Just(IndexValue::new(&index)), Just(heights), payloads).prop_map(
                |(index, heights, payloads)| (index, heights.into_iter().zip(payloads).collect()),
            )
        },
    )
}

/// Heights with the payload added at each, one payload per height.
fn arb_state_plan() -> impl Strategy<Value = Vec<(BlockNum, Document)>> {
    strategies::arb_heights(1..25).prop_flat_map(|heights| {
        let count = heights.len();
        (
            Just(heights),
            proptest::collection::vec(strategies::arb_keyed_payload("key", KEYS), count),
        )
            .prop_map(|(heights, payloads)| heights.into_iter().zip(payloads).collect())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A conflict-free chain is stored exactly as submitted.
    #[test]
    fn conflict_free_chain_is_stored_verbatim(chain in strategies::arb_chain(1..40)) {
        let ledger = ledger();
        for block in &chain {
            let outcome = ledger.insert_block(block.clone()).expect("insert");
            prop_assert!(matches!(outcome, BlockInsert::Appended(_)));
        }
        let last = chain.last().map_or(0, |b| b.block_num);
        prop_assert_eq!(ledger.blocks().range(0..=last).expect("range"), chain);
    }

    /// Submitting every block twice is the same as submitting it once.
    #[test]
    fn block_insert_is_idempotent(chain in strategies::arb_chain(1..20)) {
        let once = ledger();
        let twice = ledger();
        for block in &chain {
            once.insert_block(block.clone()).expect("insert");
            twice.insert_block(block.clone()).expect("insert");
            let replay = twice.insert_block(block.clone()).expect("replay");
            prop_assert!(matches!(replay, BlockInsert::Replayed(_)));
        }
        prop_assert_eq!(
            once.blocks().range(0..=OPEN_END_BLOCK - 1).expect("range"),
            twice.blocks().range(0..=OPEN_END_BLOCK - 1).expect("range")
        );
    }

    /// A fork at any stored height truncates the chain to that height.
    #[test]
    fn fork_truncates_chain(
        chain in strategies::arb_chain(1..30),
        pick in any::<prop::sample::Index>(),
    ) {
        let ledger = ledger();
        for block in &chain {
            ledger.insert_block(block.clone()).expect("insert");
        }
        let at = pick.index(chain.len());
        let fork = Block::new(chain[at].block_num, format!("{}-fork", chain[at].block_id));

        let outcome = ledger.insert_block(fork.clone()).expect("fork");
        prop_assert!(outcome.is_fork());

        let mut expected: Vec<Block> = chain[..at].to_vec();
        expected.push(fork);
        prop_assert_eq!(ledger.blocks().range(0..=OPEN_END_BLOCK - 1).expect("range"), expected);
    }

    /// Versioning invariants hold after adds, duplicate adds, and a fork.
    #[test]
    fn versions_stay_well_formed_across_fork(
        plan in arb_state_plan(),
        pick in any::<prop::sample::Index>(),
    ) {
        let ledger = ledger();
        for (height, payload) in &plan {
            ledger.insert_block(Block::new(*height, format!("b{height}"))).expect("block");
            ledger.add_entity_state("Item", payload.clone(), *height).expect("add");
            let again = ledger.add_entity_state("Item", payload.clone(), *height).expect("re-add");
            prop_assert!(again.is_duplicate());
        }
        assert_versions_well_formed(&ledger)?;

        let fork_height = plan[pick.index(plan.len())].0;
        ledger.insert_block(Block::new(fork_height, "fork")).expect("fork");
        assert_versions_well_formed(&ledger)?;

        // State reflects only the adds below the fork height.
        for (index, history) in all_versions(&ledger) {
            let expected: Vec<BlockNum> = plan
                .iter()
                .filter(|(h, p)| {
                    *h < fork_height && IndexValue::from_document(p, "key").as_ref() == Some(&index)
                })
                .map(|(h, _)| *h)
                .collect();
            let starts: Vec<BlockNum> = history.iter().map(|r| r.start_block_num).collect();
            prop_assert_eq!(starts, expected);
        }
    }

    /// Every add closes the previous version of the same entity at its height.
    #[test]
    fn entity_history_follows_add_heights((index, plan) in arb_entity_plan()) {
        let ledger = ledger();
        for (height, payload) in &plan {
            ledger.add_entity_state("Item", payload.clone(), *height).expect("add");
        }

        let history = ledger.state().history("items", &index).expect("history");
        let starts: Vec<BlockNum> = history.iter().map(|r| r.start_block_num).collect();
        let heights: Vec<BlockNum> = plan.iter().map(|(h, _)| *h).collect();
        prop_assert_eq!(starts, heights);

        let current = ledger.state().current("items", &index).expect("current").expect("current");
        prop_assert_eq!(Some(current.start_block_num), plan.last().map(|(h, _)| *h));
        prop_assert_eq!(&current.payload, &plan[plan.len() - 1].1);
        prop_assert_eq!(ledger.state().current_all("items").expect("all").len(), 1);
    }
}
