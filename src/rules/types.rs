//! Column type conversion.

use super::validation::check_columns_if;
use super::{FrameRule, frame_rule_io, rule_builders, transform};
use crate::data::RuleData;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::rule::RuleMeta;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type names accepted by [`TypeConversionRule`].
pub const SUPPORTED_TYPES: &[&str] = &[
    "int8", "int16", "int32", "int64", "uint8", "uint16", "uint32", "uint64", "float32", "float64",
    "string", "boolean", "datetime",
];

/// Map a type name to a polars dtype.
///
/// # Errors
///
/// [`EtlError::UnsupportedType`] for names outside [`SUPPORTED_TYPES`].
pub fn parse_type(name: &str) -> Result<DataType> {
    Ok(match name {
        "int8" => DataType::Int8,
        "int16" => DataType::Int16,
        "int32" => DataType::Int32,
        "int64" => DataType::Int64,
        "uint8" => DataType::UInt8,
        "uint16" => DataType::UInt16,
        "uint32" => DataType::UInt32,
        "uint64" => DataType::UInt64,
        "float32" => DataType::Float32,
        "float64" => DataType::Float64,
        "string" => DataType::String,
        "boolean" => DataType::Boolean,
        "datetime" => DataType::Datetime(TimeUnit::Microseconds, None),
        other => {
            return Err(EtlError::UnsupportedType(format!(
                "'{other}' is not one of: {}",
                SUPPORTED_TYPES.join(", ")
            )));
        }
    })
}

/// Casts columns to the types named in `mapper`.
///
/// A strict rule fails on values that cannot be converted; a non-strict one
/// turns them into nulls and skips missing columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeConversionRule {
    pub mapper: BTreeMap<String, String>,
    #[serde(default)]
    pub named_input: Option<String>,
    #[serde(default)]
    pub named_output: Option<String>,
    #[serde(flatten)]
    pub meta: RuleMeta,
}

impl TypeConversionRule {
    /// # Errors
    ///
    /// [`EtlError::UnsupportedType`] for an unknown type name.
    pub fn new<I, K, V>(mapper: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut rule = Self {
            mapper: mapper
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            named_input: None,
            named_output: None,
            meta: RuleMeta::default(),
        };
        rule.prepare()?;
        Ok(rule)
    }
}

rule_builders!(TypeConversionRule, unary);

impl FrameRule for TypeConversionRule {
    frame_rule_io!(unary, "TypeConversionRule");

    fn prepare(&mut self) -> Result<()> {
        for type_name in self.mapper.values() {
            parse_type(type_name)?;
        }
        Ok(())
    }

    fn run<F: Frame>(&self, data: &mut RuleData<F>) -> Result<()> {
        let strict = self.meta.strict;
        transform(data, self.named_input.as_deref(), self.named_output.as_deref(), |lf, available| {
            check_columns_if(strict, available, self.mapper.keys(), "Missing columns to convert")?;
            let exprs = available
                .iter()
                .map(|name| {
                    let Some(type_name) = self.mapper.get(name) else {
                        return Ok(col(name.as_str()));
                    };
                    let dtype = parse_type(type_name)?;
                    Ok(if strict {
                        col(name.as_str()).strict_cast(dtype)
                    } else {
                        col(name.as_str()).cast(dtype)
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(lf.select(exprs))
        })
    }
}
