use dtree::policy::{ONCE, RECURSIVE};
use dtree::{field, Context, DTree, NodeBuilder, Runner};
use tracing_subscriber::EnvFilter;

fn route(name: &'static str) -> Runner<Context, &'static str> {
    Runner::action(name, move |_: &Context| name)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let tier = field::<Context>("tier");
    let region = field::<Context>("region");

    // Premium customers outside the supported regions reach a dead end.
    let build = |policy: &str| {
        let node = NodeBuilder::new()
            .branch(
                tier.eq("premium"),
                NodeBuilder::new()
                    .branch(region.eq("eu"), route("premium-eu"))
                    .branch(region.eq("us"), route("premium-us")),
            )
            .branch(region.notnone(), route("standard"))
            .otherwise(route("manual"))
            .policy(policy)
            .build()
            .expect("failed to build node");
        DTree::build(node).expect("failed to build tree")
    };

    let customer = Context::new().set("tier", "premium").set("region", "apac");

    for policy in [ONCE, RECURSIVE] {
        let tree = build(policy);
        println!("{tree}");
        match tree.run(&customer) {
            Ok(routed) => println!("{policy}: {routed:?}\n"),
            Err(err) => println!("{policy}: {err}\n"),
        }
    }
}
