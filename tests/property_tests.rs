/// Property-based tests using proptest
/// Tests invariants of the rule tables that should hold for all inputs
use loan_filtering_api::blacklist::{lookup, Finding, BLACKLIST_MATRIX};
use loan_filtering_api::credit_bureau::{
    overdue_branch, override_rule, OverdueBranch, OverdueFacts, OverdueLimits, WriteOffFacts,
};
use loan_filtering_api::models::{Decision, TitleOwnership};
use loan_filtering_api::scheme::{ltv_filter, LtvFilter};
use loan_filtering_api::upstream_models::LooseNumber;
use proptest::prelude::*;

fn any_finding() -> impl Strategy<Value = Finding> {
    prop::sample::select(Finding::ALL.to_vec())
}

fn any_title() -> impl Strategy<Value = TitleOwnership> {
    prop_oneof![
        Just(TitleOwnership::SameOwner),
        Just(TitleOwnership::DifferentOwner)
    ]
}

// Property: numeric coercion never panics
proptest! {
    #[test]
    fn loose_number_normalize_never_panics(text in "\\PC*") {
        let _ = LooseNumber::Text(text).normalize("field");
    }

    #[test]
    fn numeric_strings_normalize_to_their_value(n in -1_000_000i64..1_000_000i64) {
        let value = LooseNumber::Text(format!(" {} ", n)).normalize("field").unwrap();
        prop_assert_eq!(value, Some(n as f64));
    }
}

// Property: the blacklist matrix rejects exactly when either person has a reject finding
proptest! {
    #[test]
    fn blacklist_rejects_iff_worst_finding_rejects(
        applicant in any_finding(),
        spouse in prop::option::of(any_finding())
    ) {
        let row = lookup(applicant, spouse).unwrap();
        prop_assert_eq!(row.decision == Decision::Reject, row.worst().is_reject());
        prop_assert_eq!(row.reason().contains(" & "), spouse.is_some());
    }
}

#[test]
fn blacklist_codes_are_unique() {
    let mut codes: Vec<_> = BLACKLIST_MATRIX.iter().map(|row| row.code).collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), BLACKLIST_MATRIX.len());
}

// Property: LTV outside (0, 1000] always targets the sentinel row
proptest! {
    #[test]
    fn ltv_filter_partitions_the_range(ltv in -10i64..5000i64) {
        let filter = ltv_filter(ltv);
        if ltv > 0 && ltv <= 1000 {
            prop_assert_eq!(filter, LtvFilter::Contains(ltv));
        } else {
            prop_assert_eq!(filter, LtvFilter::OpenEnded);
        }
    }
}

// Property: bureau overdue rules
proptest! {
    #[test]
    fn null_twelve_month_window_always_passes(
        current in 0.0f64..100_000.0,
        title in any_title()
    ) {
        let facts = OverdueFacts { last_12_months: None, current };
        let branch = overdue_branch(&facts, &OverdueLimits::for_title(title));
        prop_assert_eq!(branch, OverdueBranch::TwelveMonthNull);
    }

    #[test]
    fn figures_within_limits_pass(title in any_title(), a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let limits = OverdueLimits::for_title(title);
        let facts = OverdueFacts {
            last_12_months: Some(limits.max_last_12_months * a),
            current: limits.max_current * b,
        };
        prop_assert_eq!(overdue_branch(&facts, &limits), OverdueBranch::WithinLimits);
    }

    #[test]
    fn collateralized_write_off_always_rejects(debt in 0.0f64..1e12) {
        let rule = override_rule(&WriteOffFacts {
            write_off: true,
            with_collateral: true,
            non_collateral_debt: debt,
        });
        prop_assert_eq!(rule.decision, Decision::Reject);
    }

    #[test]
    fn debt_within_ceiling_passes_without_collateral(
        debt in 0.0f64..=20_000_000.0,
        write_off in any::<bool>()
    ) {
        let rule = override_rule(&WriteOffFacts {
            write_off,
            with_collateral: false,
            non_collateral_debt: debt,
        });
        prop_assert_eq!(rule.decision, Decision::Pass);
    }
}
