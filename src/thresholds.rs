//! Fixed risk thresholds of the filtering rule set.
//!
//! Values are set by credit policy; changing one changes which branch of the
//! blacklist, bureau, or scheme table an application lands in.

/// Dupcheck: overdue days above which a past contract counts as max-overdue-exceeded.
pub const DUPCHECK_MAX_OVERDUE_DAYS: f64 = 60.0;

/// Dupcheck: number of repossessed (inventoried) assets tolerated.
pub const DUPCHECK_MAX_ASSET_INVENTORIED: f64 = 0.0;

/// PBK, BPKB in the applicant's name: overdue days tolerated in the last 12 months.
pub const PBK_SAME_OWNER_MAX_OVERDUE_12M: f64 = 60.0;

/// PBK, BPKB in the applicant's name: current overdue days tolerated.
pub const PBK_SAME_OWNER_MAX_OVERDUE_CURRENT: f64 = 30.0;

/// PBK, BPKB in another name: overdue days tolerated in the last 12 months.
pub const PBK_DIFFERENT_OWNER_MAX_OVERDUE_12M: f64 = 30.0;

/// PBK, BPKB in another name: current overdue days tolerated.
pub const PBK_DIFFERENT_OWNER_MAX_OVERDUE_CURRENT: f64 = 10.0;

/// PBK: outstanding non-collateral debt ceiling (IDR) above which a reject stands.
pub const PBK_NON_COLLATERAL_DEBT_CEILING: f64 = 20_000_000.0;

/// Scheme: tenor (months) from which PASS applications use the open-ended tenor row.
pub const SCHEME_PASS_OPEN_TENOR: u32 = 36;

/// Scheme: tenor (months) from which NO_HIT / REJECT applications use the open-ended tenor row.
pub const SCHEME_OTHER_OPEN_TENOR: u32 = 24;

/// Scheme: LTV above which (or when absent) the open-ended sentinel row applies.
pub const SCHEME_LTV_SENTINEL: i64 = 1000;
