use dtree::{field, Action, Context, DTree, NodeBuilder};
use tracing_subscriber::EnvFilter;

fn give(item: &'static str) -> Action<Context, String> {
    Action::new(format!("give {item}"), move |_: &Context| format!("give {item}"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let age = field::<Context>("age");
    let interest = field::<Context>("interest");
    let gender = field::<Context>("gender");

    let node = NodeBuilder::new()
        .branch(
            age.lt(12),
            NodeBuilder::new()
                .branch(
                    interest.eq("sports"),
                    NodeBuilder::new()
                        .branch(gender.eq("female"), give("note"))
                        .otherwise(give("football")),
                )
                .otherwise(give("book")),
        )
        .branch(
            age.ge(15),
            NodeBuilder::new()
                .branch(interest.eq("writing"), give("note"))
                .otherwise(give("book")),
        )
        .otherwise(
            NodeBuilder::new()
                .branch(gender.eq("male"), give("football"))
                .otherwise(give("book")),
        )
        .build()
        .expect("failed to build node");

    let tree = DTree::build(node).expect("failed to build tree");
    println!("{tree}");

    let students = [
        Context::new()
            .set("age", 15_i64)
            .set("interest", "reading")
            .set("gender", "female"),
        Context::new()
            .set("age", 10_i64)
            .set("interest", "sports")
            .set("gender", "female"),
        Context::new().set("age", 13_i64).set("gender", "male"),
    ];

    for student in &students {
        match tree.run(student) {
            Ok(Some(gift)) => println!("{student:?} -> {gift}"),
            Ok(None) => println!("{student:?} -> nothing"),
            Err(err) => println!("{student:?} -> error: {err}"),
        }
    }
}
