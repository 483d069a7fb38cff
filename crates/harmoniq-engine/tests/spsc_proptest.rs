//! Property-based check of the FIFO law FixedSpscQueue must uphold
//! regardless of how pushes and pops are interleaved by a single
//! producer/consumer pair running on one thread.

use harmoniq_engine::FixedSpscQueue;
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Push(u32),
    Pop,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![any::<u32>().prop_map(Op::Push), Just(Op::Pop),]
}

proptest! {
    #[test]
    fn dequeued_sequence_is_a_prefix_of_the_enqueued_sequence(ops in prop::collection::vec(op_strategy(), 0..500)) {
        let queue = FixedSpscQueue::new(16);
        let mut enqueued = Vec::new();
        let mut dequeued = Vec::new();

        for op in ops {
            match op {
                Op::Push(v) => {
                    if queue.try_push_back(v) {
                        enqueued.push(v);
                    }
                }
                Op::Pop => {
                    if let Some(v) = queue.pop() {
                        dequeued.push(v);
                    }
                }
            }
        }

        prop_assert_eq!(&dequeued[..], &enqueued[..dequeued.len()]);
    }
}
