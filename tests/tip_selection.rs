// tests/tip_selection.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tangle_dag::{TangleStore, TipSelectionConfig, TipSelector, TransactionBuilder, TryteHash};
use tokio_util::sync::CancellationToken;

fn admit(store: &TangleStore, tag: &str, trunk: TryteHash, branch: TryteHash) -> TryteHash {
    let tx = TransactionBuilder::new()
        .tag(tag)
        .timestamp(1)
        .parents(trunk, branch)
        .build()
        .unwrap();
    store.admit(tx).unwrap().hash
}

fn selector(store: Arc<TangleStore>, alpha: f64, walk_count: usize, seed: u64) -> TipSelector {
    let config = TipSelectionConfig {
        alpha,
        walk_count,
        max_walk_steps: 10_000,
    };
    TipSelector::from_seed(store, config, Some(seed))
}

#[test]
fn zero_alpha_walks_are_uniform() {
    let store = Arc::new(TangleStore::new(1_000));
    let tips: Vec<_> = ["K", "L", "M", "N"]
        .iter()
        .map(|t| admit(&store, t, TryteHash::NULL, TryteHash::NULL))
        .collect();
    let sel = selector(store, 0.0, 1, 2024);
    let cancel = CancellationToken::new();
    let exclude = HashSet::new();

    let walks = 10_000;
    let mut hits: HashMap<TryteHash, usize> = HashMap::new();
    for _ in 0..walks {
        *hits.entry(sel.select_tip(TryteHash::NULL, &exclude, &cancel).unwrap()).or_default() += 1;
    }
    for tip in &tips {
        let freq = hits.get(tip).copied().unwrap_or(0) as f64 / walks as f64;
        assert!((freq - 0.25).abs() < 0.03, "tip frequency {} too far from 1/4", freq);
    }
}

#[test]
fn high_alpha_follows_the_heavy_branch() {
    let store = Arc::new(TangleStore::new(1_000));
    let mut heavy = admit(&store, "HEAVY", TryteHash::NULL, TryteHash::NULL);
    for tag in ["HA", "HB", "HC", "HD"] {
        heavy = admit(&store, tag, heavy, heavy);
    }
    let light = admit(&store, "LIGHT", TryteHash::NULL, TryteHash::NULL);
    let sel = selector(store, 5.0, 1, 11);
    let cancel = CancellationToken::new();

    for _ in 0..200 {
        let tip = sel.select_tip(TryteHash::NULL, &HashSet::new(), &cancel).unwrap();
        assert_eq!(tip, heavy);
        assert_ne!(tip, light);
    }
}

#[test]
fn excluding_a_branch_steers_the_walk() {
    let store = Arc::new(TangleStore::new(1_000));
    let left = admit(&store, "LEFT", TryteHash::NULL, TryteHash::NULL);
    let right = admit(&store, "RIGHT", TryteHash::NULL, TryteHash::NULL);
    let sel = selector(store, 0.0, 1, 5);
    let cancel = CancellationToken::new();
    for _ in 0..50 {
        let tip = sel.select_tip(TryteHash::NULL, &HashSet::from([left]), &cancel).unwrap();
        assert_eq!(tip, right);
    }
}

#[test]
fn parallel_walks_on_a_clean_tangle_are_consistent() {
    let store = Arc::new(TangleStore::new(1_000));
    let root = admit(&store, "ROOT", TryteHash::NULL, TryteHash::NULL);
    let a = admit(&store, "A", root, root);
    let b = admit(&store, "B", root, a);
    admit(&store, "C", b, root);
    admit(&store, "D", a, TryteHash::NULL);

    let sel = selector(store.clone(), 0.1, 6, 99);
    let selection = sel
        .select_tips(TryteHash::NULL, &HashSet::new(), &CancellationToken::new())
        .unwrap();
    assert_eq!(selection.tips.len(), 6);
    assert!(selection.tips.iter().all(|t| store.tips().contains(t)));
    assert!(selection.is_consistent());
    assert!(selection.trunk_and_branch().is_some());
}

#[test]
fn same_seed_same_selection() {
    let store = Arc::new(TangleStore::new(1_000));
    let root = admit(&store, "ROOT", TryteHash::NULL, TryteHash::NULL);
    for tag in ["P", "Q", "R", "S", "T"] {
        admit(&store, tag, root, TryteHash::NULL);
    }
    let cancel = CancellationToken::new();
    let first = selector(store.clone(), 0.0, 8, 31)
        .select_tips(root, &HashSet::new(), &cancel)
        .unwrap();
    let second = selector(store, 0.0, 8, 31).select_tips(root, &HashSet::new(), &cancel).unwrap();
    assert_eq!(first, second);
}
