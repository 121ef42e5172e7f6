//! The rule library for the polars backends.
//!
//! Every rule is a plain serde struct implementing [`FrameRule`]; a blanket
//! impl turns it into a [`Rule`] for each [`Frame`] type, and
//! [`register_all`] adds it to a backend under its [`FrameRule::KIND`].
//!
//! # Families
//!
//! - [`basic`]: projection, renaming, sorting, de-duplication, value replacement
//! - [`types`], [`numeric`], [`strings`]: per-column conversions
//! - [`fill`]: forward/backward null filling
//! - [`joins`], [`concat`]: combining two tables
//! - [`aggregate`]: group-by aggregation
//! - [`newcolumns`], [`conditions`]: SQL-expression driven rules
//! - [`datetime`]: components, formatting, rounding and date arithmetic
//! - [`io`]: CSV and parquet readers and writers

pub mod aggregate;
pub mod basic;
pub mod concat;
pub mod conditions;
pub mod datetime;
pub mod expressions;
pub mod fill;
pub mod io;
pub mod joins;
pub mod newcolumns;
pub mod numeric;
pub mod strings;
pub mod types;
pub mod validation;

use crate::backend::Backend;
use crate::data::RuleData;
use crate::error::Result;
use crate::frame::Frame;
use crate::rule::{Rule, RuleInputs, RuleMeta, check_known_params, same_rule};
use polars::prelude::{Expr, LazyFrame, col};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;

/// A rule body written once against polars and usable with every [`Frame`].
pub trait FrameRule:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// The type tag in the serialized dict.
    const KIND: &'static str;

    fn meta(&self) -> &RuleMeta;

    fn inputs(&self) -> RuleInputs<'_>;

    fn named_output(&self) -> Option<&str>;

    fn has_output(&self) -> bool {
        true
    }

    /// Extra named slots written besides [`FrameRule::named_output`].
    fn extra_outputs(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Check construction invariants and fill internal caches.
    ///
    /// Called by constructors and by the backend factory, so a deserialized
    /// rule is held to the same checks as one built in code.
    ///
    /// # Errors
    ///
    /// [`crate::error::EtlError::InvalidRule`] and friends.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// # Errors
    ///
    /// Routing errors plus the rule's own data-quality errors.
    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()>;
}

impl<F: Frame, R: FrameRule> Rule<F> for R {
    fn kind(&self) -> &'static str {
        R::KIND
    }

    fn meta(&self) -> &RuleMeta {
        FrameRule::meta(self)
    }

    fn inputs(&self) -> RuleInputs<'_> {
        FrameRule::inputs(self)
    }

    fn named_output(&self) -> Option<&str> {
        FrameRule::named_output(self)
    }

    fn has_output(&self) -> bool {
        FrameRule::has_output(self)
    }

    fn named_outputs(&self) -> Vec<&str> {
        let mut outputs: Vec<&str> = if FrameRule::has_output(self) {
            FrameRule::named_output(self).into_iter().collect()
        } else {
            Vec::new()
        };
        outputs.extend(self.extra_outputs());
        outputs
    }

    fn apply(&self, data: &mut RuleData<F>) -> Result<()> {
        self.run(data)
    }

    fn to_params(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_rule(&self, other: &dyn Rule<F>) -> bool {
        same_rule(self, other)
    }

    fn clone_rule(&self) -> Box<dyn Rule<F>> {
        Box::new(self.clone())
    }
}

/// Backend factory for any [`FrameRule`].
///
/// # Errors
///
/// Malformed or unknown parameters and failed [`FrameRule::prepare`] checks.
pub fn factory<F: Frame, R: FrameRule>(params: &Value, _: &Backend<F>) -> Result<Box<dyn Rule<F>>> {
    let mut rule: R = serde_json::from_value(params.clone())?;
    check_known_params(R::KIND, params, &serde_json::to_value(&rule)?)?;
    rule.prepare()?;
    Ok(Box::new(rule))
}

fn register<F: Frame, R: FrameRule>(backend: &mut Backend<F>) {
    backend.register(R::KIND, factory::<F, R>);
}

/// Register every rule of the library.
pub fn register_all<F: Frame>(backend: &mut Backend<F>) {
    register::<F, basic::ProjectRule>(backend);
    register::<F, basic::RenameRule>(backend);
    register::<F, basic::SortRule>(backend);
    register::<F, basic::DedupeRule>(backend);
    register::<F, basic::ReplaceRule>(backend);

    register::<F, types::TypeConversionRule>(backend);

    register::<F, numeric::RoundRule>(backend);
    register::<F, numeric::AbsRule>(backend);

    register::<F, strings::StrLowerRule>(backend);
    register::<F, strings::StrUpperRule>(backend);
    register::<F, strings::StrCapitalizeRule>(backend);
    register::<F, strings::StrStripRule>(backend);
    register::<F, strings::StrPadRule>(backend);
    register::<F, strings::StrReplaceRule>(backend);
    register::<F, strings::StrSplitRule>(backend);
    register::<F, strings::StrSplitRejoinRule>(backend);
    register::<F, strings::StrExtractRule>(backend);

    register::<F, fill::ForwardFillRule>(backend);
    register::<F, fill::BackFillRule>(backend);

    register::<F, joins::LeftJoinRule>(backend);
    register::<F, joins::InnerJoinRule>(backend);
    register::<F, joins::OuterJoinRule>(backend);
    register::<F, joins::RightJoinRule>(backend);

    register::<F, concat::VConcatRule>(backend);
    register::<F, concat::HConcatRule>(backend);

    register::<F, aggregate::AggregateRule>(backend);

    register::<F, newcolumns::AddNewColumnRule>(backend);
    register::<F, conditions::FilterRule>(backend);
    register::<F, conditions::IfThenElseRule>(backend);

    register::<F, datetime::DateTimeExtractComponentRule>(backend);
    register::<F, datetime::DateTimeToStrFormatRule>(backend);
    register::<F, datetime::DateTimeUTCNowRule>(backend);
    register::<F, datetime::DateTimeLocalNowRule>(backend);
    register::<F, datetime::DateTimeExtractComponentNamesRule>(backend);
    register::<F, datetime::DateTimeRoundRule>(backend);
    register::<F, datetime::DateTimeRoundDownRule>(backend);
    register::<F, datetime::DateTimeRoundUpRule>(backend);
    register::<F, datetime::DateTimeFloorRule>(backend);
    register::<F, datetime::DateTimeCeilingRule>(backend);
    register::<F, datetime::DateTimeAddRule>(backend);
    register::<F, datetime::DateTimeSubstractRule>(backend);
    register::<F, datetime::DateTimeDiffRule>(backend);

    register::<F, io::ReadCSVFileRule>(backend);
    register::<F, io::ReadParquetFileRule>(backend);
    register::<F, io::WriteCSVFileRule>(backend);
    register::<F, io::WriteParquetFileRule>(backend);
}

/// Read one input, transform it lazily and write the result.
///
/// `body` receives the input as a [`LazyFrame`] plus its column names.
///
/// # Errors
///
/// Routing errors plus whatever `body` returns.
pub(crate) fn transform<F, B>(
    data: &mut RuleData<F>,
    named_input: Option<&str>,
    named_output: Option<&str>,
    body: B,
) -> Result<()>
where
    F: Frame,
    B: FnOnce(LazyFrame, &[String]) -> Result<LazyFrame>,
{
    let input = data.input_cloned(named_input)?;
    let columns = input.column_names()?;
    let output = body(input.into_lazy(), &columns)?;
    data.set_output(named_output, F::from_lazy(output)?);
    Ok(())
}

/// One side of a two-input rule: the lazy table and its column names.
pub(crate) struct Operand {
    pub lf: LazyFrame,
    pub columns: Vec<String>,
}

/// [`transform`] for rules reading a left and a right input.
///
/// # Errors
///
/// Routing errors for either input plus whatever `body` returns.
pub(crate) fn transform2<F, B>(
    data: &mut RuleData<F>,
    named_input_left: Option<&str>,
    named_input_right: Option<&str>,
    named_output: Option<&str>,
    body: B,
) -> Result<()>
where
    F: Frame,
    B: FnOnce(Operand, Operand) -> Result<LazyFrame>,
{
    let side = |named: Option<&str>| -> Result<Operand> {
        let table = data.input_cloned(named)?;
        Ok(Operand {
            columns: table.column_names()?,
            lf: table.into_lazy(),
        })
    };
    let left = side(named_input_left)?;
    let right = side(named_input_right)?;
    let output = body(left, right)?;
    data.set_output(named_output, F::from_lazy(output)?);
    Ok(())
}

/// Where a per-column rule reads and writes.
pub(crate) struct ColumnsInOut<'a> {
    pub kind: &'static str,
    pub named_input: Option<&'a str>,
    pub named_output: Option<&'a str>,
    pub strict: bool,
    pub columns: &'a [String],
    pub output_columns: Option<&'a [String]>,
}

/// Apply `f` to each input column, writing the result in place or to the
/// paired output column.
///
/// Missing input columns are an error when strict and skipped otherwise.
///
/// # Errors
///
/// Routing errors plus, when strict, missing input columns and output
/// columns that already exist.
pub(crate) fn per_column<F, E>(data: &mut RuleData<F>, io: &ColumnsInOut<'_>, f: E) -> Result<()>
where
    F: Frame,
    E: Fn(Expr) -> Expr,
{
    transform(data, io.named_input, io.named_output, |lf, available| {
        let exprs = column_exprs(io, available, f)?;
        Ok(lf.with_columns(exprs))
    })
}

/// The expressions [`per_column`] adds, for rules that need to look at the
/// input before building them.
///
/// # Errors
///
/// Same as [`per_column`], minus routing.
pub(crate) fn column_exprs<E>(io: &ColumnsInOut<'_>, available: &[String], f: E) -> Result<Vec<Expr>>
where
    E: Fn(Expr) -> Expr,
{
    let pairs = validation::pair_columns(io.kind, io.columns, io.output_columns)?;
    validation::check_column_pairs(io.strict, available, io.columns, io.output_columns)?;
    Ok(validation::present_pairs(available, &pairs)
        .into_iter()
        .map(|(input, output)| f(col(input)).alias(output))
        .collect())
}

/// [`ColumnsInOut`] for a rule with the usual `columns`/`output_columns` fields.
macro_rules! columns_in_out {
    ($rule:expr) => {
        $crate::rules::ColumnsInOut {
            kind: <Self as $crate::rules::FrameRule>::KIND,
            named_input: $rule.named_input.as_deref(),
            named_output: $rule.named_output.as_deref(),
            strict: $rule.meta.strict,
            columns: &$rule.columns,
            output_columns: $rule.output_columns.as_deref(),
        }
    };
}

/// Accessors for [`FrameRule`] impls, by input shape.
macro_rules! frame_rule_io {
    (unary, $kind:literal) => {
        const KIND: &'static str = $kind;

        fn meta(&self) -> &$crate::rule::RuleMeta {
            &self.meta
        }

        fn inputs(&self) -> $crate::rule::RuleInputs<'_> {
            $crate::rule::RuleInputs::Unary(self.named_input.as_deref())
        }

        fn named_output(&self) -> Option<&str> {
            self.named_output.as_deref()
        }
    };
    (binary, $kind:literal) => {
        const KIND: &'static str = $kind;

        fn meta(&self) -> &$crate::rule::RuleMeta {
            &self.meta
        }

        fn inputs(&self) -> $crate::rule::RuleInputs<'_> {
            $crate::rule::RuleInputs::Binary {
                left: self.named_input_left.as_deref(),
                right: self.named_input_right.as_deref(),
            }
        }

        fn named_output(&self) -> Option<&str> {
            self.named_output.as_deref()
        }
    };
    (source, $kind:literal) => {
        const KIND: &'static str = $kind;

        fn meta(&self) -> &$crate::rule::RuleMeta {
            &self.meta
        }

        fn inputs(&self) -> $crate::rule::RuleInputs<'_> {
            $crate::rule::RuleInputs::Source
        }

        fn named_output(&self) -> Option<&str> {
            self.named_output.as_deref()
        }
    };
    (sink, $kind:literal) => {
        const KIND: &'static str = $kind;

        fn meta(&self) -> &$crate::rule::RuleMeta {
            &self.meta
        }

        fn inputs(&self) -> $crate::rule::RuleInputs<'_> {
            $crate::rule::RuleInputs::Unary(self.named_input.as_deref())
        }

        fn named_output(&self) -> Option<&str> {
            None
        }

        fn has_output(&self) -> bool {
            false
        }
    };
}

/// Chainable setters shared by every rule type.
macro_rules! rule_builders {
    ($ty:ty, unary) => {
        $crate::rules::rule_builders!($ty, meta);
        $crate::rules::rule_builders!($ty, output);

        impl $ty {
            #[must_use]
            pub fn with_named_input(mut self, name: impl Into<String>) -> Self {
                self.named_input = Some(name.into());
                self
            }
        }
    };
    ($ty:ty, binary) => {
        $crate::rules::rule_builders!($ty, meta);
        $crate::rules::rule_builders!($ty, output);
    };
    ($ty:ty, source) => {
        $crate::rules::rule_builders!($ty, meta);
        $crate::rules::rule_builders!($ty, output);
    };
    ($ty:ty, sink) => {
        $crate::rules::rule_builders!($ty, meta);

        impl $ty {
            #[must_use]
            pub fn with_named_input(mut self, name: impl Into<String>) -> Self {
                self.named_input = Some(name.into());
                self
            }
        }
    };
    ($ty:ty, output) => {
        impl $ty {
            #[must_use]
            pub fn with_named_output(mut self, name: impl Into<String>) -> Self {
                self.named_output = Some(name.into());
                self
            }
        }
    };
    ($ty:ty, meta) => {
        impl $ty {
            #[must_use]
            pub fn with_name(mut self, name: impl Into<String>) -> Self {
                self.meta.name = Some(name.into());
                self
            }

            #[must_use]
            pub fn with_description(mut self, description: impl Into<String>) -> Self {
                self.meta.description = Some(description.into());
                self
            }

            #[must_use]
            pub fn with_strict(mut self, strict: bool) -> Self {
                self.meta.strict = strict;
                self
            }
        }
    };
}

pub(crate) use {columns_in_out, frame_rule_io, rule_builders};
