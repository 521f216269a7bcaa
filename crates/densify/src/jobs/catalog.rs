//! Job Catalog
//!
//! Every ingestion job reads one source table and owns the panels for its
//! factor columns. Jobs are looked up by name.

use chrono::NaiveDate;
use densify_data::TableSpec;
use densify_panel::{AnchorMode, DateKey, Season, TieBreak, panel_key};

/// First date of history materialized by a rebuild unless overridden.
pub const DEFAULT_BEGIN: DateKey =
    DateKey::new(NaiveDate::from_ymd_opt(2016, 1, 1).expect("2016-01-01 is a valid date"));

/// Job metadata
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Job name (unique identifier)
    pub name: &'static str,
    /// Brief description of the source
    pub description: &'static str,
    /// Source table
    pub table: &'static str,
    /// Security identifier column
    pub entity_column: &'static str,
    /// Effective-date column (report period for period-anchored jobs)
    pub date_column: &'static str,
    /// Secondary sort column breaking same-date ties
    pub tie_order: Option<&'static str>,
    /// How records are anchored onto the calendar
    pub anchor: AnchorMode,
    /// How duplicated rows collapse
    pub tie_break: TieBreak,
    /// SQL predicate rows must satisfy
    pub filter: Option<&'static str>,
    /// Skip identifiers starting with a letter (non-A-share codes)
    pub exclude_alpha_entities: bool,
    /// Carry in each entity's last value from before the begin date on rebuild
    pub seed_before_begin: bool,
    /// Factor columns, one panel each
    pub factors: &'static [&'static str],
}

impl JobSpec {
    /// Source table layout for this job.
    pub fn table_spec(&self) -> TableSpec {
        let mut spec = match self.anchor {
            AnchorMode::PointInTime => {
                TableSpec::point_in_time(self.table, self.entity_column, self.date_column)
            }
            AnchorMode::PeriodStart => {
                TableSpec::periodic(self.table, self.entity_column, self.date_column)
            }
        };
        if let Some(filter) = self.filter {
            spec = spec.with_filter(filter);
        }
        if let Some(column) = self.tie_order {
            spec = spec.with_tie_order(column);
        }
        if self.exclude_alpha_entities {
            spec = spec.excluding_alpha_entities();
        }
        spec
    }

    /// Factor names as owned strings.
    pub fn factor_names(&self) -> Vec<String> {
        self.factors.iter().map(|f| f.to_string()).collect()
    }

    /// Store keys of every panel this job owns.
    pub fn panel_keys(&self) -> Vec<String> {
        match self.anchor {
            AnchorMode::PointInTime => self.factor_names(),
            AnchorMode::PeriodStart => self
                .factors
                .iter()
                .flat_map(|f| Season::ALL.iter().map(move |s| panel_key(f, Some(*s))))
                .collect(),
        }
    }
}

/// Daily valuation and trading indicators.
const EOD_DERIVATIVE_FACTORS: &[&str] = &[
    "S_VAL_MV",
    "S_DQ_MV",
    "S_PQ_HIGH_52W_",
    "S_PQ_LOW_52W_",
    "S_VAL_PE",
    "S_VAL_PB_NEW",
    "S_VAL_PE_TTM",
    "S_VAL_PCF_OCF",
    "S_VAL_PCF_OCFTTM",
    "S_VAL_PCF_NCF",
    "S_VAL_PCF_NCFTTM",
    "S_VAL_PS",
    "S_VAL_PS_TTM",
    "S_DQ_TURN",
    "S_DQ_FREETURNOVER",
    "TOT_SHR_TODAY",
    "FLOAT_A_SHR_TODAY",
    "S_DQ_CLOSE_TODAY",
    "S_PRICE_DIV_DPS",
    "S_PQ_ADJHIGH_52W",
    "S_PQ_ADJLOW_52W",
    "FREE_SHARES_TODAY",
    "NET_PROFIT_PARENT_COMP_TTM",
    "NET_PROFIT_PARENT_COMP_LYR",
    "NET_ASSETS_TODAY",
    "NET_CASH_FLOWS_OPER_ACT_TTM",
    "NET_CASH_FLOWS_OPER_ACT_LYR",
    "OPER_REV_TTM",
    "OPER_REV_LYR",
    "NET_INCR_CASH_CASH_EQU_TTM",
    "NET_INCR_CASH_CASH_EQU_LYR",
    "UP_DOWN_LIMIT_STATUS",
    "LOWEST_HIGHEST_STATUS",
];

/// Level-2 order flow indicators.
const L2_FACTORS: &[&str] = &[
    "S_LI_INITIATIVEBUYRATE",
    "S_LI_INITIATIVEBUYMONEY",
    "S_LI_INITIATIVEBUYAMOUNT",
    "S_LI_INITIATIVESELLRATE",
    "S_LI_INITIATIVESELLMONEY",
    "S_LI_INITIATIVESELLAMOUNT",
    "S_LI_LARGEBUYRATE",
    "S_LI_LARGEBUYMONEY",
    "S_LI_LARGEBUYAMOUNT",
    "S_LI_LARGESELLRATE",
    "S_LI_LARGESELLMONEY",
    "S_LI_LARGESELLAMOUNT",
    "S_LI_ENTRUSTRATE",
    "S_LI_ENTRUDIFFERAMOUNT",
    "S_LI_ENTRUDIFFERAMONEY",
    "S_LI_ENTRUSTBUYMONEY",
    "S_LI_ENTRUSTSELLMONEY",
    "S_LI_ENTRUSTBUYAMOUNT",
    "S_LI_ENTRUSTSELLAMOUNT",
];

/// Analyst certainty scores.
const CERTAINTY_SCORE_FACTORS: &[&str] = &[
    "score",
    "profit_score",
    "value_score",
    "market_score",
    "score_grate_1w",
    "score_grate_4w",
    "score_grate_13w",
    "score_grate_26w",
    "score_grate_52w",
];

/// Annual and quarterly report indicators.
const ANN_FINANCIAL_FACTORS: &[&str] = &[
    "S_FA_EPS_DILUTED",
    "S_FA_EPS_BASIC",
    "S_FA_EPS_DILUTED2",
    "S_FA_EPS_EX",
    "S_FA_EPS_EXBASIC",
    "S_FA_EPS_EXDILUTED",
    "S_FA_BPS",
    "S_FA_BPS_SH",
    "S_FA_BPS_ADJUST",
    "ROE_DILUTED",
    "ROE_WEIGHTED",
    "ROE_EX",
    "ROE_EXWEIGHTED",
    "NET_PROFIT",
    "RD_EXPENSE",
    "S_FA_EXTRAORDINARY",
    "S_FA_CURRENT",
    "S_FA_QUICK",
    "S_FA_ARTURN",
    "S_FA_INVTURN",
    "S_FT_DEBTTOASSETS",
    "S_FA_OCFPS",
    "S_FA_YOYOCFPS",
    "S_FA_DEDUCTEDPROFIT",
    "S_FA_DEDUCTEDPROFIT_YOY",
    "GROWTH_BPS_SH",
    "S_FA_YOYEQUITY",
    "YOY_ROE_DILUTED",
    "YOY_NET_CASH_FLOWS",
    "S_FA_YOYEPS_BASIC",
    "S_FA_YOYEPS_DILUTED",
    "S_FA_YOYOP",
    "S_FA_YOYEBT",
    "NET_PROFIT_YOY",
];

/// Get all available jobs
pub fn available_jobs() -> Vec<JobSpec> {
    vec![
        JobSpec {
            name: "holder_number",
            description: "Number of shareholders, effective from the announcement date",
            table: "ASHAREHOLDERNUMBER",
            entity_column: "S_INFO_WINDCODE",
            date_column: "ANN_DT",
            tie_order: Some("S_HOLDER_ENDDATE"),
            anchor: AnchorMode::PointInTime,
            tie_break: TieBreak::Last,
            filter: None,
            exclude_alpha_entities: true,
            seed_before_begin: true,
            factors: &["S_HOLDER_NUM"],
        },
        JobSpec {
            name: "float_volume",
            description: "Floating A-share count, effective from the change date",
            table: "ASHARECAPITALIZATION",
            entity_column: "WIND_CODE",
            date_column: "CHANGE_DT",
            tie_order: None,
            anchor: AnchorMode::PointInTime,
            tie_break: TieBreak::Last,
            filter: Some("FLOAT_A_SHR > 0"),
            exclude_alpha_entities: true,
            seed_before_begin: true,
            factors: &["FLOAT_A_SHR"],
        },
        JobSpec {
            name: "eod_derivative_indicator",
            description: "End-of-day valuation, turnover and price-limit indicators",
            table: "ASHAREEODDERIVATIVEINDICATOR",
            entity_column: "S_INFO_WINDCODE",
            date_column: "TRADE_DT",
            tie_order: None,
            anchor: AnchorMode::PointInTime,
            tie_break: TieBreak::Max,
            filter: None,
            exclude_alpha_entities: false,
            seed_before_begin: false,
            factors: EOD_DERIVATIVE_FACTORS,
        },
        JobSpec {
            name: "l2_indicators",
            description: "Level-2 active buy/sell, large order and entrustment indicators",
            table: "ASHAREL2INDICATORS",
            entity_column: "S_INFO_WINDCODE",
            date_column: "TRADE_DT",
            tie_order: None,
            anchor: AnchorMode::PointInTime,
            tie_break: TieBreak::Max,
            filter: None,
            exclude_alpha_entities: false,
            seed_before_begin: false,
            factors: L2_FACTORS,
        },
        JobSpec {
            name: "certainty_score",
            description: "Analyst consensus certainty scores and their growth rates",
            table: "certainty_score_stk",
            entity_column: "stock_code",
            date_column: "con_date",
            tie_order: None,
            anchor: AnchorMode::PointInTime,
            tie_break: TieBreak::Max,
            filter: Some("index_code = 999999"),
            exclude_alpha_entities: false,
            seed_before_begin: false,
            factors: CERTAINTY_SCORE_FACTORS,
        },
        JobSpec {
            name: "ann_financial_indicator",
            description: "Report-period financial indicators, one panel per fiscal season",
            table: "ASHAREANNFINANCIALINDICATOR",
            entity_column: "S_INFO_WINDCODE",
            date_column: "REPORT_PERIOD",
            tie_order: None,
            anchor: AnchorMode::PeriodStart,
            tie_break: TieBreak::Last,
            filter: None,
            exclude_alpha_entities: false,
            seed_before_begin: false,
            factors: ANN_FINANCIAL_FACTORS,
        },
    ]
}

/// Get job by name
pub fn get_job(name: &str) -> Option<JobSpec> {
    available_jobs().into_iter().find(|j| j.name == name)
}

/// List all job names
pub fn list_job_names() -> Vec<&'static str> {
    available_jobs().into_iter().map(|j| j.name).collect()
}
