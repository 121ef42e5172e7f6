//! Column checks shared by the rule bodies.

use crate::error::{EtlError, Result};
use std::collections::BTreeSet;

/// Wanted columns that are absent from `available`, in the order wanted.
pub fn missing_columns<'a>(available: &[String], wanted: impl IntoIterator<Item = &'a String>) -> Vec<&'a str> {
    wanted
        .into_iter()
        .filter(|c| !available.contains(c))
        .map(String::as_str)
        .collect()
}

fn as_set<'a>(columns: &[&'a str]) -> BTreeSet<&'a str> {
    columns.iter().copied().collect()
}

/// # Errors
///
/// [`EtlError::MissingColumn`] listing every absent column.
pub fn check_columns<'a>(
    available: &[String],
    wanted: impl IntoIterator<Item = &'a String>,
    what: &str,
) -> Result<()> {
    let missing = missing_columns(available, wanted);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EtlError::MissingColumn(format!("{what}: {:?}", as_set(&missing))))
    }
}

/// Strict-only variant of [`check_columns`].
///
/// # Errors
///
/// Same as [`check_columns`] when `strict` is set.
pub fn check_columns_if<'a>(
    strict: bool,
    available: &[String],
    wanted: impl IntoIterator<Item = &'a String>,
    what: &str,
) -> Result<()> {
    if strict {
        check_columns(available, wanted, what)
    } else {
        Ok(())
    }
}

/// # Errors
///
/// [`EtlError::ColumnAlreadyExists`] listing every output that is already a
/// column of the input.
pub fn check_new_columns<'a>(
    available: &[String],
    outputs: impl IntoIterator<Item = &'a String>,
) -> Result<()> {
    let existing: Vec<&str> = outputs
        .into_iter()
        .filter(|c| available.contains(c))
        .map(String::as_str)
        .collect();
    if existing.is_empty() {
        Ok(())
    } else {
        Err(EtlError::ColumnAlreadyExists(format!(
            "Column(s) already exist: {:?}",
            as_set(&existing)
        )))
    }
}

/// Pair each input column with the column its result is written to.
///
/// Without `output_columns` every column is transformed in place.
///
/// # Errors
///
/// [`EtlError::InvalidRule`] when the two lists differ in length or no
/// columns are given.
pub fn pair_columns<'a>(
    kind: &str,
    columns: &'a [String],
    output_columns: Option<&'a [String]>,
) -> Result<Vec<(&'a str, &'a str)>> {
    if columns.is_empty() {
        return Err(EtlError::InvalidRule(format!("{kind}: columns cannot be empty")));
    }
    match output_columns {
        None => Ok(columns.iter().map(|c| (c.as_str(), c.as_str())).collect()),
        Some(outputs) if outputs.len() == columns.len() => Ok(columns
            .iter()
            .zip(outputs)
            .map(|(c, o)| (c.as_str(), o.as_str()))
            .collect()),
        Some(outputs) => Err(EtlError::InvalidRule(format!(
            "{kind}: output_columns must have the same length as columns ({} != {})",
            outputs.len(),
            columns.len()
        ))),
    }
}

/// Input checks for per-column rules: inputs must exist when strict, and
/// when strict and writing to new columns, those must not exist yet.
///
/// # Errors
///
/// [`EtlError::MissingColumn`] or [`EtlError::ColumnAlreadyExists`].
pub fn check_column_pairs(
    strict: bool,
    available: &[String],
    columns: &[String],
    output_columns: Option<&[String]>,
) -> Result<()> {
    if strict {
        check_columns(available, columns, "Missing columns")?;
        if let Some(outputs) = output_columns {
            check_new_columns(available, outputs)?;
        }
    }
    Ok(())
}

/// The pairs whose input column is present. Non-strict rules skip the rest.
pub fn present_pairs<'a>(available: &[String], pairs: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    pairs
        .iter()
        .copied()
        .filter(|(input, _)| available.iter().any(|c| c.as_str() == *input))
        .collect()
}
