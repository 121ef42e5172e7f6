//! Joins between two tables.
//!
//! All four rules share one parameter set:
//!
//! - `named_input_left` / `named_input_right`: the two sides (`None` = main output)
//! - `key_columns_left`: the join keys in the left table
//! - `key_columns_right`: the keys in the right table, defaulting to the left ones
//! - `suffixes`: `[left, right]` appended to non-key columns present on both
//!   sides; either may be `null` to keep that side's names, but not both
//!
//! When a right key is named differently from its left key and the right
//! suffix is set, the result also carries `<right key><right suffix>`, a
//! copy of the matched left key.
//!
//! Missing key columns are always an error, whatever `strict` says.

use super::validation::check_columns;
use super::{FrameRule, Operand, frame_rule_io, rule_builders, transform2};
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

fn default_suffixes() -> [Option<String>; 2] {
    [None, Some("_r".to_owned())]
}

/// How the two sides are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum How {
    Left,
    Inner,
    Outer,
    Right,
}

/// Rename the columns in `common` (minus the keys) by appending `suffix`.
fn suffixed(side: Operand, common: &[&str], keys: &[String], suffix: Option<&str>) -> LazyFrame {
    let Some(suffix) = suffix else {
        return side.lf;
    };
    let exprs: Vec<Expr> = side
        .columns
        .iter()
        .map(|name| {
            if common.contains(&name.as_str()) && !keys.contains(name) {
                col(name.as_str()).alias(format!("{name}{suffix}"))
            } else {
                col(name.as_str())
            }
        })
        .collect();
    side.lf.select(exprs)
}

struct JoinSetup<'a> {
    how: How,
    keys_left: &'a [String],
    keys_right: &'a [String],
    suffix_left: Option<&'a str>,
    suffix_right: Option<&'a str>,
}

fn join(left: Operand, right: Operand, setup: &JoinSetup<'_>) -> Result<LazyFrame> {
    check_columns(&left.columns, setup.keys_left, "Missing columns in join in the left dataframe")?;
    check_columns(&right.columns, setup.keys_right, "Missing columns in join in the right dataframe")?;

    // A right join is a left join with the sides swapped.
    if setup.how == How::Right {
        let swapped = JoinSetup {
            how: How::Left,
            keys_left: setup.keys_right,
            keys_right: setup.keys_left,
            suffix_left: setup.suffix_right,
            suffix_right: setup.suffix_left,
        };
        return join(right, left, &swapped);
    }

    let common: Vec<String> = left
        .columns
        .iter()
        .filter(|c| right.columns.contains(c))
        .cloned()
        .collect();
    let common: Vec<&str> = common.iter().map(String::as_str).collect();
    let left_lf = suffixed(left, &common, setup.keys_left, setup.suffix_left);
    let right_lf = suffixed(right, &common, setup.keys_right, setup.suffix_right);

    let join_type = match setup.how {
        How::Left | How::Right => JoinType::Left,
        How::Inner => JoinType::Inner,
        How::Outer => JoinType::Full,
    };
    let mut args = JoinArgs::new(join_type)
        .with_suffix(Some(setup.suffix_right.unwrap_or("_right").into()));
    if setup.how == How::Outer {
        args = args.with_coalesce(JoinCoalesce::CoalesceColumns);
    }
    let on = |keys: &[String]| keys.iter().map(|k| col(k.as_str())).collect::<Vec<_>>();
    let joined = left_lf.join(right_lf, on(setup.keys_left), on(setup.keys_right), args);

    let Some(suffix) = setup.suffix_right else {
        return Ok(joined);
    };
    let right_keys: Vec<Expr> = setup
        .keys_left
        .iter()
        .zip(setup.keys_right)
        .filter(|(l, r)| l != r)
        .map(|(l, r)| col(l.as_str()).alias(format!("{r}{suffix}")))
        .collect();
    if right_keys.is_empty() {
        Ok(joined)
    } else {
        Ok(joined.with_columns(right_keys))
    }
}

macro_rules! join_rule {
    ($(#[$doc:meta])* $name:ident, $kind:literal, $how:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            #[serde(default)]
            pub named_input_left: Option<String>,
            #[serde(default)]
            pub named_input_right: Option<String>,
            pub key_columns_left: Vec<String>,
            #[serde(default)]
            pub key_columns_right: Option<Vec<String>>,
            #[serde(default = "default_suffixes")]
            pub suffixes: [Option<String>; 2],
            #[serde(default)]
            pub named_output: Option<String>,
            #[serde(flatten)]
            pub meta: RuleMeta,
        }

        impl $name {
            /// Join `left` and `right` (slot names, `None` = main output) on
            /// `key_columns_left`.
            ///
            /// # Errors
            ///
            /// [`EtlError::InvalidRule`] for an empty key list.
            pub fn new<I, S>(left: Option<&str>, right: Option<&str>, key_columns_left: I) -> Result<Self>
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                let mut rule = Self {
                    named_input_left: left.map(str::to_owned),
                    named_input_right: right.map(str::to_owned),
                    key_columns_left: key_columns_left.into_iter().map(Into::into).collect(),
                    key_columns_right: None,
                    suffixes: default_suffixes(),
                    named_output: None,
                    meta: RuleMeta::default(),
                };
                rule.prepare()?;
                Ok(rule)
            }

            /// # Errors
            ///
            /// [`EtlError::InvalidRule`] when the key lists differ in length.
            pub fn with_key_columns_right<I, S>(mut self, keys: I) -> Result<Self>
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                self.key_columns_right = Some(keys.into_iter().map(Into::into).collect());
                self.prepare()?;
                Ok(self)
            }

            /// # Errors
            ///
            /// [`EtlError::InvalidRule`] when both suffixes are `None`.
            pub fn with_suffixes(mut self, left: Option<&str>, right: Option<&str>) -> Result<Self> {
                self.suffixes = [left.map(str::to_owned), right.map(str::to_owned)];
                self.prepare()?;
                Ok(self)
            }
        }

        rule_builders!($name, binary);

        impl FrameRule for $name {
            frame_rule_io!(binary, $kind);

            fn prepare(&mut self) -> Result<()> {
                check_join_params(
                    $kind,
                    &self.key_columns_left,
                    self.key_columns_right.as_deref(),
                    &self.suffixes,
                )
            }

            fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
                let setup = JoinSetup {
                    how: $how,
                    keys_left: &self.key_columns_left,
                    keys_right: self.key_columns_right.as_deref().unwrap_or(&self.key_columns_left),
                    suffix_left: self.suffixes[0].as_deref(),
                    suffix_right: self.suffixes[1].as_deref(),
                };
                transform2(
                    data,
                    self.named_input_left.as_deref(),
                    self.named_input_right.as_deref(),
                    self.named_output.as_deref(),
                    |left, right| join(left, right, &setup),
                )
            }
        }
    };
}

fn check_join_params(
    kind: &str,
    keys_left: &[String],
    keys_right: Option<&[String]>,
    suffixes: &[Option<String>; 2],
) -> Result<()> {
    if keys_left.is_empty() {
        return Err(EtlError::InvalidRule(format!("{kind}: key_columns_left cannot be empty")));
    }
    if let Some(keys_right) = keys_right {
        if keys_right.len() != keys_left.len() {
            return Err(EtlError::InvalidRule(format!(
                "{kind}: key_columns_left and key_columns_right must have the same length ({} != {})",
                keys_left.len(),
                keys_right.len()
            )));
        }
    }
    if suffixes.iter().all(Option::is_none) {
        return Err(EtlError::InvalidRule(format!(
            "{kind}: at least one of the suffixes must be set"
        )));
    }
    Ok(())
}

join_rule!(
    /// Keeps every row of the left table.
    LeftJoinRule,
    "LeftJoinRule",
    How::Left
);

join_rule!(
    /// Keeps rows whose keys appear on both sides.
    InnerJoinRule,
    "InnerJoinRule",
    How::Inner
);

join_rule!(
    /// Keeps every row of both tables, merging the key columns.
    OuterJoinRule,
    "OuterJoinRule",
    How::Outer
);

join_rule!(
    /// Keeps every row of the right table.
    RightJoinRule,
    "RightJoinRule",
    How::Right
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_utils::{assert_round_trip, ints, names, strs};

    fn left() -> DataFrame {
        df!("A" => [1, 2, 3], "B" => ["a", "b", "c"], "C" => [10, 20, 30]).unwrap()
    }

    fn right() -> DataFrame {
        df!("A" => [2, 3, 4], "C" => [200, 300, 400], "D" => ["x", "y", "z"]).unwrap()
    }

    fn run<R: FrameRule>(rule: &R, lazy: bool) -> Result<DataFrame> {
        let out = if lazy {
            let mut data = RuleData::new()
                .with_named_input("left", left().lazy())
                .with_named_input("right", right().lazy());
            crate::rule::Rule::<LazyFrame>::apply(rule, &mut data)?;
            data.take_main_output().ok_or(EtlError::MissingMainInput)?.collect()?
        } else {
            let mut data = RuleData::new()
                .with_named_input("left", left())
                .with_named_input("right", right());
            crate::rule::Rule::<DataFrame>::apply(rule, &mut data)?;
            data.take_main_output().ok_or(EtlError::MissingMainInput)?
        };
        Ok(out.sort(["A"], SortMultipleOptions::default().with_nulls_last(true))?)
    }

    #[test]
    fn test_left_join() -> Result<()> {
        let rule = LeftJoinRule::new(Some("left"), Some("right"), ["A"])?;
        for lazy in [false, true] {
            let out = run(&rule, lazy)?;
            assert_eq!(names(&out), vec!["A", "B", "C", "C_r", "D"]);
            assert_eq!(ints(&out, "A"), vec![Some(1), Some(2), Some(3)]);
            assert_eq!(ints(&out, "C"), vec![Some(10), Some(20), Some(30)]);
            assert_eq!(ints(&out, "C_r"), vec![None, Some(200), Some(300)]);
        }
        Ok(())
    }

    #[test]
    fn test_inner_join_with_left_suffix() -> Result<()> {
        let rule = InnerJoinRule::new(Some("left"), Some("right"), ["A"])?
            .with_suffixes(Some("_x"), None)?;
        let out = run(&rule, false)?;
        assert_eq!(names(&out), vec!["A", "B", "C_x", "C", "D"]);
        assert_eq!(ints(&out, "A"), vec![Some(2), Some(3)]);
        assert_eq!(ints(&out, "C"), vec![Some(200), Some(300)]);
        Ok(())
    }

    #[test]
    fn test_outer_join_merges_keys() -> Result<()> {
        let rule = OuterJoinRule::new(Some("left"), Some("right"), ["A"])?;
        for lazy in [false, true] {
            let out = run(&rule, lazy)?;
            assert_eq!(ints(&out, "A"), vec![Some(1), Some(2), Some(3), Some(4)]);
            assert_eq!(ints(&out, "C"), vec![Some(10), Some(20), Some(30), None]);
            assert_eq!(strs(&out, "D")[3], Some("z".to_owned()));
        }
        Ok(())
    }

    #[test]
    fn test_right_join() -> Result<()> {
        let rule = RightJoinRule::new(Some("left"), Some("right"), ["A"])?;
        let out = run(&rule, true)?;
        assert_eq!(ints(&out, "A"), vec![Some(2), Some(3), Some(4)]);
        assert_eq!(strs(&out, "B"), vec![Some("b".to_owned()), Some("c".to_owned()), None]);
        assert_eq!(ints(&out, "C"), vec![Some(20), Some(30), None]);
        assert_eq!(ints(&out, "C_r"), vec![Some(200), Some(300), Some(400)]);
        Ok(())
    }

    #[test]
    fn test_different_key_names() -> Result<()> {
        let rule = LeftJoinRule::new(Some("left"), Some("right"), ["C"])?
            .with_key_columns_right(["A"])?;
        let out = run(&rule, false)?;
        assert_eq!(out.height(), 3);
        assert_eq!(names(&out), vec!["A", "B", "C", "C_r", "D", "A_r"]);
        assert_eq!(ints(&out, "C"), vec![Some(10), Some(20), Some(30)]);
        assert_eq!(ints(&out, "A_r"), vec![Some(10), Some(20), Some(30)]);
        Ok(())
    }

    #[test]
    fn test_different_key_names_keep_right_key() -> Result<()> {
        let rule = InnerJoinRule::new(Some("left"), Some("right_by_c"), ["A"])?
            .with_key_columns_right(["C"])?;
        let mut data = RuleData::new()
            .with_named_input("left", left())
            .with_named_input("right_by_c", df!("C" => [2, 3], "E" => ["two", "three"])?);
        crate::rule::Rule::<DataFrame>::apply(&rule, &mut data)?;
        let out = data.take_main_output().ok_or(EtlError::MissingMainInput)?;
        assert_eq!(names(&out), vec!["A", "B", "C", "E", "C_r"]);
        assert_eq!(ints(&out, "C_r"), ints(&out, "A"));
        assert_eq!(ints(&out, "A"), vec![Some(2), Some(3)]);

        let rule = rule.with_suffixes(Some("_l"), None)?;
        let mut data = RuleData::new()
            .with_named_input("left", left())
            .with_named_input("right_by_c", df!("C" => [2, 3], "E" => ["two", "three"])?);
        crate::rule::Rule::<DataFrame>::apply(&rule, &mut data)?;
        let out = data.take_main_output().ok_or(EtlError::MissingMainInput)?;
        assert_eq!(names(&out), vec!["A", "B", "C_l", "E"]);
        Ok(())
    }

    #[test]
    fn test_missing_keys_always_error() -> Result<()> {
        let rule = LeftJoinRule::new(Some("left"), Some("right"), ["B"])?.with_strict(false);
        assert!(matches!(run(&rule, false), Err(EtlError::MissingColumn(_))));
        Ok(())
    }

    #[test]
    fn test_missing_input() -> Result<()> {
        let rule = LeftJoinRule::new(Some("left"), Some("nope"), ["A"])?;
        assert!(matches!(run(&rule, false), Err(EtlError::MissingNamedInput(_))));
        Ok(())
    }

    #[test]
    fn test_invalid_params() {
        assert!(LeftJoinRule::new(None, None, Vec::<String>::new()).is_err());
        let rule = LeftJoinRule::new(None, None, ["A"]).unwrap();
        assert!(rule.clone().with_key_columns_right(["A", "B"]).is_err());
        assert!(rule.with_suffixes(None, None).is_err());
    }

    #[test]
    fn test_round_trips() {
        assert_round_trip(&LeftJoinRule::new(Some("l"), None, ["A"]).unwrap());
        assert_round_trip(
            &InnerJoinRule::new(None, Some("r"), ["A"])
                .unwrap()
                .with_key_columns_right(["B"])
                .unwrap(),
        );
        assert_round_trip(
            &OuterJoinRule::new(Some("l"), Some("r"), ["A"])
                .unwrap()
                .with_suffixes(Some("_l"), Some("_r"))
                .unwrap(),
        );
        assert_round_trip(&RightJoinRule::new(Some("l"), Some("r"), ["A"]).unwrap().with_named_output("out"));
    }
}
