//! Property-based tests for ancestry queries over randomly grown graphs.

use proptest::prelude::*;
use proptest::sample::Index;
use std::sync::Arc;
use vellum_cas::{Cid, MemoryStore};
use vellum_dag::DagEngine;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

/// Grow a single-genesis DAG: each edge picks one or two existing nodes as
/// parents, so every node descends from the genesis.
async fn grow_dag(
    dag: &DagEngine<MemoryStore>,
    edges: &[(Index, Option<Index>)],
) -> Vec<Cid> {
    let genesis = dag.add_node(b"genesis", vec![], "doc", "seed").await.unwrap();
    let mut cids = vec![genesis];

    for (i, (first, second)) in edges.iter().enumerate() {
        let p1 = cids[first.index(cids.len())];
        let mut parents = vec![p1];
        if let Some(second) = second {
            let p2 = cids[second.index(cids.len())];
            if p2 != p1 {
                parents.push(p2);
            }
        }
        let cid = dag
            .add_node(format!("rev-{i}").as_bytes(), parents, "doc", "writer")
            .await
            .unwrap();
        cids.push(cid);
    }

    cids
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// `find_common_ancestor` does not depend on argument order, and on a
    /// single-genesis graph it always finds something.
    #[test]
    fn common_ancestor_symmetric(
        edges in proptest::collection::vec(
            (any::<Index>(), proptest::option::of(any::<Index>())),
            1..40,
        ),
        queries in proptest::collection::vec((any::<Index>(), any::<Index>()), 1..12),
    ) {
        block_on(async {
            let dag = DagEngine::new(Arc::new(MemoryStore::new()));
            let cids = grow_dag(&dag, &edges).await;

            for (x, y) in &queries {
                let a = cids[x.index(cids.len())];
                let b = cids[y.index(cids.len())];

                let forward = dag.find_common_ancestor(&a, &b);
                prop_assert_eq!(forward, dag.find_common_ancestor(&b, &a));
                prop_assert!(forward.is_some());
            }
            Ok(())
        })?;
    }

    /// Whatever `find_common_ancestor` returns really is an ancestor of (or
    /// equal to) both arguments.
    #[test]
    fn common_ancestor_is_shared(
        edges in proptest::collection::vec(
            (any::<Index>(), proptest::option::of(any::<Index>())),
            1..40,
        ),
        x in any::<Index>(),
        y in any::<Index>(),
    ) {
        block_on(async {
            let dag = DagEngine::new(Arc::new(MemoryStore::new()));
            let cids = grow_dag(&dag, &edges).await;

            let a = cids[x.index(cids.len())];
            let b = cids[y.index(cids.len())];
            let common = dag.find_common_ancestor(&a, &b).unwrap();

            prop_assert!(common == a || dag.get_ancestors(&a).contains(&common));
            prop_assert!(common == b || dag.get_ancestors(&b).contains(&common));
            Ok(())
        })?;
    }
}
