
use dtree::policy::{ONCE, RECURSIVE};
use proptest::prelude::*;
use strategies::{arb_cond, arb_sample, arb_total_tree, arb_tree, outcome};

// ---------------------------------------------------------------------------
// Invariant 1: Condition algebra agrees with plain boolean logic
//
// AND is all(), OR is any(), NOT is negation, whatever the nesting.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn conditions_match_reference(cond in arb_cond(), sample in arb_sample()) {
        let built = cond.build();
        let got = built.validate(&sample.context()).unwrap();
        prop_assert_eq!(got, cond.holds(&sample), "condition {}", built.description());
    }

    #[test]
    fn operators_match_combinators(a in arb_cond(), b in arb_cond(), sample in arb_sample()) {
        let ctx = sample.context();
        let (x, y) = (a.build(), b.build());
        let expected_and = a.holds(&sample) && b.holds(&sample);
        let expected_or = a.holds(&sample) || b.holds(&sample);
        prop_assert_eq!((x.clone() & y.clone()).validate(&ctx).unwrap(), expected_and);
        prop_assert_eq!((x.clone() | y).validate(&ctx).unwrap(), expected_or);
        prop_assert_eq!((!x).validate(&ctx).unwrap(), !a.holds(&sample));
    }
}

// ---------------------------------------------------------------------------
// Invariant 2: Double negation is invisible
//
// Negating twice restores the description and the identity of a condition.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn double_negation_collapses(cond in arb_cond(), sample in arb_sample()) {
        let built = cond.build();
        let twice = built.clone().negate().negate();
        prop_assert_eq!(twice.description(), built.description());
        prop_assert_eq!(&twice, &built);
        prop_assert_eq!(
            twice.validate(&sample.context()).unwrap(),
            built.validate(&sample.context()).unwrap()
        );
    }

    #[test]
    fn single_negation_is_described(cond in arb_cond()) {
        let built = cond.build();
        let once = built.clone().negate();
        prop_assert_ne!(&once, &built);
        prop_assert!(
            once.description() == format!("NOT({})", built.description())
                || built.description() == format!("NOT({})", once.description()),
            "{} vs {}",
            once.description(),
            built.description()
        );
    }
}

// ---------------------------------------------------------------------------
// Invariant 3: Traversal follows the reference walk
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn once_matches_reference(gen in arb_tree(), sample in arb_sample()) {
        let tree = gen.build(ONCE);
        prop_assert_eq!(outcome(&tree, &sample), gen.expected_once(&sample));
    }

    #[test]
    fn recursive_matches_reference(gen in arb_tree(), sample in arb_sample()) {
        let tree = gen.build(RECURSIVE);
        prop_assert_eq!(outcome(&tree, &sample), gen.expected_recursive(&sample));
    }

    #[test]
    fn recursive_finds_at_least_what_once_finds(gen in arb_tree(), sample in arb_sample()) {
        let once = outcome(&gen.build(ONCE), &sample);
        let recursive = outcome(&gen.build(RECURSIVE), &sample);
        if once.is_some() {
            prop_assert_eq!(once, recursive);
        }
    }
}

// ---------------------------------------------------------------------------
// Invariant 4: Without dead ends the policies agree
//
// When every level has an else branch, no sub-tree can run out of matches,
// so backtracking never triggers.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn policies_agree_on_total_trees(gen in arb_total_tree(), sample in arb_sample()) {
        let once = outcome(&gen.build(ONCE), &sample);
        let recursive = outcome(&gen.build(RECURSIVE), &sample);
        prop_assert!(once.is_some());
        prop_assert_eq!(once, recursive);
    }
}

// ---------------------------------------------------------------------------
// Invariant 5: Determinism and rendering shape
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn determinism(gen in arb_tree(), sample in arb_sample()) {
        let tree = gen.build(RECURSIVE);
        let first = outcome(&tree, &sample);
        for _ in 0..5 {
            prop_assert_eq!(outcome(&tree, &sample), first);
        }
    }

    #[test]
    fn one_rendered_line_per_branch(gen in arb_tree()) {
        let rendered = gen.build(ONCE).to_string();
        prop_assert_eq!(rendered.lines().count(), 1 + gen.count_branches());
        prop_assert!(rendered.starts_with("+++root:"));
    }
}
