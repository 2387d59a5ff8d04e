use dtree::{
    field, register_policy, Context, DTree, Level, NodeBuilder, Outcome, RunError, Runner,
};
use tracing_subscriber::EnvFilter;

/// Take the last branch whose condition holds instead of the first.
fn last_match(level: &mut dyn Level) -> Result<Outcome, RunError> {
    for index in (0..level.len()).rev() {
        if level.validate(index)? {
            return level.delegate(index);
        }
    }
    level.delegate_else()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    register_policy("last-match", last_match).expect("policy name already taken");

    let score = field::<Context>("score");
    let grade = |name: &'static str| Runner::action(name, move |_: &Context| name);

    let node = NodeBuilder::new()
        .branch(score.ge(50), grade("pass"))
        .branch(score.ge(75), grade("merit"))
        .branch(score.ge(90), grade("distinction"))
        .otherwise(grade("fail"))
        .policy("last-match")
        .build()
        .expect("failed to build node");
    let tree = DTree::build(node).expect("failed to build tree");
    println!("{tree}");

    for value in [30_i64, 60, 80, 95] {
        let ctx = Context::new().set("score", value);
        println!("{value} -> {:?}", tree.run(&ctx));
    }
}
