use std::sync::Arc;
use std::thread;

use dtree::{field, Context, DTree, NodeBuilder, Runner, Tracked, ValueAccessor};

fn main() {
    // Expensive extraction, shared and memoized across threads.
    let risk = ValueAccessor::new("risk", |obj: &Tracked<Context>| {
        thread::sleep(std::time::Duration::from_millis(10));
        obj.lookup("risk")
    })
    .memoized(1_000);
    let age = field::<Tracked<Context>>("user.age");
    let decide = |name: &'static str| Runner::action(name, move |_: &Tracked<Context>| name);

    let node = NodeBuilder::new()
        .branch(risk.gt(80), decide("block"))
        .branch(age.ge(18) & risk.le(20), decide("allow"))
        .otherwise(decide("review"))
        .build()
        .expect("failed to build node");
    let tree = DTree::build(node).expect("failed to build tree");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let ctx = Tracked::new(
                    Context::new()
                        .set("user.age", 16_i64 + i64::from(i))
                        .set("risk", 10_i64 * i64::from(i)),
                );
                let result = tree.run(&ctx);
                println!("Thread {i}: {result:?}");
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}
