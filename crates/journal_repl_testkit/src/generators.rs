//! Property-based generators for replication inputs.

use proptest::collection::vec;
use proptest::prelude::*;

/// Journal identifiers: slash-separated lowercase segments.
pub fn arb_journal() -> impl Strategy<Value = String> {
    vec("[a-z][a-z0-9_-]{0,11}", 1..4).prop_map(|segments| segments.join("/"))
}

/// Route tokens, including characters that need query escaping.
pub fn arb_route_token() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9.:/ &=+-]{0,24}"
}

/// Payload split into the writes a caller would issue.
pub fn arb_payload_writes() -> impl Strategy<Value = Vec<Vec<u8>>> {
    vec(vec(any::<u8>(), 0..512), 0..12)
}

/// Offsets across the whole signed range, weighted toward small values.
pub fn arb_offset() -> impl Strategy<Value = i64> {
    prop_oneof![
        3 => 0i64..1 << 20,
        1 => any::<i64>(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn journals_have_no_empty_segments() {
        let mut runner = TestRunner::default();
        for _ in 0..64 {
            let journal = arb_journal().new_tree(&mut runner).unwrap().current();
            assert!(!journal.is_empty());
            assert!(journal.split('/').all(|segment| !segment.is_empty()));
        }
    }
}
