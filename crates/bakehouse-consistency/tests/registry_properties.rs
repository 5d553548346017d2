// Property tests for the process index registry
// Random add/remove sequences must never break the slot invariants

use std::collections::HashSet;

use bakehouse_consistency::ProcessRegistry;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add(u64),
    Remove(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..20).prop_map(Op::Add),
        (1u64..20).prop_map(Op::Remove),
    ]
}

fn assert_invariants(registry: &ProcessRegistry) {
    let mut seen = HashSet::new();
    for pid in registry.members() {
        let index = registry.index_of(pid).expect("member has an index");
        assert!(seen.insert(index), "index {} assigned twice", index);
        assert!(!registry.is_free(index));
        assert_eq!(registry.pid_at(index), Some(pid));
    }
    assert_eq!(seen.len(), registry.len());
    assert!(registry.len() <= registry.capacity());
}

proptest! {
    #[test]
    fn indices_stay_unique(capacity in 1usize..8, ops in prop::collection::vec(op_strategy(), 0..64)) {
        let mut registry = ProcessRegistry::new(capacity);
        for op in ops {
            match op {
                Op::Add(pid) => {
                    let was_full = registry.len() == capacity && registry.index_of(pid).is_none();
                    let result = registry.add_process(pid);
                    prop_assert_eq!(result.is_none(), was_full);
                }
                Op::Remove(pid) => {
                    let before = registry.index_of(pid);
                    prop_assert_eq!(registry.remove_process(pid), before);
                }
            }
            assert_invariants(&registry);
        }
    }

    #[test]
    fn freed_slot_is_reused(capacity in 2usize..8, victim in 0usize..8) {
        let victim = victim % capacity;
        let mut registry = ProcessRegistry::new(capacity);
        for pid in 0..capacity as u64 {
            registry.add_process(pid + 100);
        }
        let pid = registry.pid_at(victim).unwrap();
        prop_assert_eq!(registry.remove_process(pid), Some(victim));
        prop_assert_eq!(registry.add_process(1), Some(victim));
    }
}
