//! Procedure call descriptor

use crate::param::{Direction, ParamValue, ProcedureParam};
use procall_core::{ProcallError, Result, SqlType};

/// Statement text prefix for executable procedures
pub const NATIVE_CALL_COMMAND: &str = "EXECUTE PROCEDURE ";
/// Statement text prefix for selectable procedures
pub const NATIVE_SELECT_COMMAND: &str = "SELECT * FROM ";

/// A parsed stored-procedure call: the procedure name and its arguments in
/// call-syntax order.
///
/// Placeholders are numbered 1..N in the order they appear, starting with the
/// return-value marker of `{?= call ...}` when present. Literal arguments take
/// part in the rendered text but have no ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    name: String,
    params: Vec<ProcedureParam>,
    placeholder_count: usize,
}

impl ProcedureCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            placeholder_count: 0,
        }
    }

    /// Add the `?=` return-value marker. It must come before any argument.
    pub fn with_return_value(mut self) -> Result<Self> {
        if !self.params.is_empty() {
            return Err(ProcallError::InvalidParameter(
                "return value must be the first parameter of a call".into(),
            ));
        }
        self.placeholder_count += 1;
        self.params
            .push(ProcedureParam::return_value(self.placeholder_count));
        Ok(self)
    }

    /// Append a `?` argument
    pub fn with_placeholder(mut self) -> Self {
        self.push_placeholder();
        self
    }

    /// Append `count` `?` arguments
    pub fn with_placeholders(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.push_placeholder();
        }
        self
    }

    /// Append a literal argument
    pub fn with_literal(mut self, text: impl Into<String>) -> Self {
        self.params.push(ProcedureParam::literal(text.into()));
        self
    }

    /// Append a `?` argument and return its ordinal
    pub fn push_placeholder(&mut self) -> usize {
        self.placeholder_count += 1;
        self.params
            .push(ProcedureParam::placeholder(self.placeholder_count));
        self.placeholder_count
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All arguments in call-syntax order
    pub fn params(&self) -> &[ProcedureParam] {
        &self.params
    }

    /// Number of addressable (`?`) parameters
    pub fn parameter_count(&self) -> usize {
        self.placeholder_count
    }

    /// Parameters bound at execute time, in physical marker order
    pub fn input_params(&self) -> impl Iterator<Item = &ProcedureParam> {
        self.params.iter().filter(|p| p.is_bindable())
    }

    /// OUT parameters in declaration order
    pub fn output_params(&self) -> impl Iterator<Item = &ProcedureParam> {
        self.params
            .iter()
            .filter(|p| p.is_placeholder() && p.is_out())
    }

    /// Look up a parameter by ordinal
    pub fn param(&self, ordinal: usize) -> Result<&ProcedureParam> {
        self.params
            .iter()
            .find(|p| p.ordinal() == Some(ordinal))
            .ok_or_else(|| out_of_range(ordinal, self.placeholder_count))
    }

    fn param_mut(&mut self, ordinal: usize) -> Result<&mut ProcedureParam> {
        let count = self.placeholder_count;
        self.params
            .iter_mut()
            .find(|p| p.ordinal() == Some(ordinal))
            .ok_or_else(|| out_of_range(ordinal, count))
    }

    /// Bind a value to an IN parameter
    pub fn set_input_value(&mut self, ordinal: usize, value: ParamValue) -> Result<()> {
        let param = self.param_mut(ordinal)?;
        if param.direction() == Direction::Out {
            return Err(ProcallError::InvalidParameter(format!(
                "parameter {} is registered as OUT and cannot take a value",
                ordinal
            )));
        }
        param.set_value(value);
        Ok(())
    }

    /// Register a parameter as OUT with the given type.
    ///
    /// With `frozen` set (the statement is already prepared) the directions of
    /// the call can no longer change; only the type of an existing OUT
    /// parameter may be updated.
    pub fn register_out_param(
        &mut self,
        ordinal: usize,
        sql_type: SqlType,
        scale: Option<u32>,
        frozen: bool,
    ) -> Result<()> {
        let param = self.param_mut(ordinal)?;
        if frozen && param.direction() == Direction::In {
            return Err(ProcallError::InvalidParameter(format!(
                "parameter {} cannot be registered as OUT after the statement was prepared",
                ordinal
            )));
        }
        param.register_out(sql_type, scale);
        Ok(())
    }

    /// Verify that every IN marker has a value and every OUT parameter a
    /// registered type
    pub fn check_parameters(&self) -> Result<()> {
        for param in self.params.iter().filter(|p| p.is_placeholder()) {
            let ordinal = param.ordinal().unwrap_or_default();
            match param.direction() {
                Direction::In if param.value().is_none() => {
                    return Err(ProcallError::InvalidParameter(format!(
                        "value of parameter {} is not set",
                        ordinal
                    )));
                }
                Direction::Out if param.registered_type().is_none() => {
                    return Err(ProcallError::InvalidParameter(format!(
                        "OUT parameter {} is not registered",
                        ordinal
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Render the native statement text.
    ///
    /// OUT parameters are not part of the text; the server returns them as
    /// result columns.
    pub fn sql(&self, selectable: bool) -> String {
        let mut sql = String::from(if selectable {
            NATIVE_SELECT_COMMAND
        } else {
            NATIVE_CALL_COMMAND
        });
        sql.push_str(&self.name);

        let args: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.direction() == Direction::In)
            .map(|p| p.sql_text())
            .collect();
        if !args.is_empty() {
            sql.push('(');
            sql.push_str(&args.join(", "));
            sql.push(')');
        }
        sql
    }
}

fn out_of_range(ordinal: usize, count: usize) -> ProcallError {
    ProcallError::InvalidParameter(format!(
        "parameter index {} is out of range (1..={})",
        ordinal, count
    ))
}
