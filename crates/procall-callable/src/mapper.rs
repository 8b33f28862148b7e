//! Mapping of OUT parameter ordinals to result columns

use crate::call::ProcedureCall;
use crate::param::Direction;
use procall_core::{ProcallError, Result};

/// Maps the ordinal a caller uses for an OUT parameter to the position of its
/// value among the result columns.
///
/// The server returns the return value first and then the OUT parameters in
/// declaration order, while callers number OUT parameters by their position
/// among all parameters of the call.
pub struct OutputParameterMapper;

impl OutputParameterMapper {
    /// 1-based result column of the OUT parameter with the given ordinal
    pub fn to_result_column(call: &ProcedureCall, ordinal: usize) -> Result<usize> {
        let param = call.param(ordinal)?;
        if param.direction() == Direction::In {
            return Err(ProcallError::InvalidParameter(format!(
                "parameter {} is not an OUT parameter",
                ordinal
            )));
        }
        let column = call
            .output_params()
            .filter(|p| p.ordinal().is_some_and(|o| o <= ordinal))
            .count();
        Ok(column)
    }
}
