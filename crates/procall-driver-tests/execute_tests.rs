//! Executable procedure tests
//!
//! Calls through `EXECUTE PROCEDURE`: OUT values come back as the single row
//! of the execute response and stay readable however often they are read.

#[cfg(test)]
mod tests {
    use crate::fixtures::{FakeServer, FixtureParser, Notification, init_tracing};
    use anyhow::{Context, Result};
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;
    use procall_callable::{CallableStatement, ExecutionState};
    use procall_core::{SqlType, Value};
    use rstest::rstest;
    use std::io::Read;

    /// Test an IN value echoed back through an OUT parameter
    #[test]
    fn test_out_parameter_echo() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let conn = server.connect();

        let mut stmt =
            CallableStatement::prepare_call(conn.clone(), &FixtureParser, "{call test_out(?, ?)}")?;
        stmt.set_string(1, "test")?;
        stmt.register_out_parameter(2, SqlType::Varchar)?;

        assert!(stmt.execute()?, "executable call with OUT params produces a row");
        assert_eq!(stmt.get_string(2)?, Some("test".to_string()));
        assert!(!stmt.was_null());

        let stats = server.stats();
        assert_eq!(stats.prepared, vec!["EXECUTE PROCEDURE test_out(?)".to_string()]);
        Ok(())
    }

    /// Test that the OUT row stays readable after repeated reads
    #[test]
    fn test_repeated_reads_are_stable() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let mut stmt = CallableStatement::prepare_call(
            server.connect(),
            &FixtureParser,
            "{call test_out(?, ?)}",
        )?;
        stmt.set_string(1, "stable")?;
        stmt.register_out_parameter(2, SqlType::Varchar)?;
        stmt.execute()?;

        for _ in 0..3 {
            assert_eq!(stmt.get_value(2)?, Value::String("stable".into()));
        }
        Ok(())
    }

    /// Test the `{?= call ...}` return value mapping to the first column
    #[test]
    fn test_return_value() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let mut stmt = CallableStatement::prepare_call(
            server.connect(),
            &FixtureParser,
            "{?= call add_one(?)}",
        )?;
        stmt.register_out_parameter(1, SqlType::Integer)?;
        stmt.set_i32(2, 41)?;
        stmt.execute()?;

        assert_eq!(stmt.get_i32(1)?, Some(42));
        assert_eq!(stmt.get_value(1)?, Value::Int32(42));
        Ok(())
    }

    /// Test literal arguments mixed with markers
    #[rstest]
    #[case::string_literal("{call test_out('literal', ?)}", "literal")]
    #[case::integer_literal("{call test_out(17, ?)}", "17")]
    fn test_literal_arguments(#[case] sql: &str, #[case] expected: &str) -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let mut stmt = CallableStatement::prepare_call(server.connect(), &FixtureParser, sql)?;
        assert_eq!(stmt.parameter_count(), 1);
        stmt.register_out_parameter(1, SqlType::Varchar)?;

        stmt.execute().context("literal call should execute")?;
        assert_eq!(stmt.get_string(1)?.as_deref(), Some(expected));
        Ok(())
    }

    /// Test a procedure without parameters or result
    #[rstest]
    #[case::parens("{call test_no_params()}")]
    #[case::bare("{call test_no_params}")]
    fn test_no_params(#[case] sql: &str) -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let mut stmt = CallableStatement::prepare_call(server.connect(), &FixtureParser, sql)?;

        assert!(!stmt.execute()?);
        assert_eq!(stmt.state(), ExecutionState::ExecutedNoResult);
        assert_eq!(stmt.execute_update()?, 0);
        assert_eq!(
            server.stats().prepared,
            vec!["EXECUTE PROCEDURE test_no_params".to_string()]
        );
        Ok(())
    }

    /// Test that preparing happens once however often the call runs
    #[test]
    fn test_prepare_is_idempotent() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let mut stmt = CallableStatement::prepare_call(
            server.connect(),
            &FixtureParser,
            "{call test_out(?, ?)}",
        )?;
        stmt.register_out_parameter(2, SqlType::Varchar)?;

        for value in ["a", "b", "c"] {
            stmt.set_string(1, value)?;
            stmt.execute()?;
            assert_eq!(stmt.get_string(2)?.as_deref(), Some(value));
        }

        let stats = server.stats();
        assert_eq!(stats.prepared.len(), 1);
        assert_eq!(stats.executions, 3);
        Ok(())
    }

    /// Test that OUT registrations made after construction shape the prepared text
    #[test]
    fn test_registration_before_first_execute_shapes_text() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let mut stmt = CallableStatement::prepare_call(
            server.connect(),
            &FixtureParser,
            "{call test_out(?, ?)}",
        )?;
        stmt.set_string(1, "x")?;
        stmt.register_out_parameter(2, SqlType::Varchar)?;
        stmt.execute()?;

        let prepared = server.stats().prepared;
        assert_eq!(prepared.len(), 1);
        assert!(
            prepared[0].ends_with("(?)"),
            "OUT marker must not be sent as an argument: {}",
            prepared[0]
        );
        Ok(())
    }

    /// Test a NULL input producing a NULL OUT value
    #[test]
    fn test_null_out_value_sets_was_null() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let mut stmt = CallableStatement::prepare_call(
            server.connect(),
            &FixtureParser,
            "{call test_out(?, ?)}",
        )?;
        stmt.set_null(1)?;
        stmt.register_out_parameter(2, SqlType::Varchar)?;
        stmt.execute()?;

        assert_eq!(stmt.get_string(2)?, None);
        assert!(stmt.was_null());
        Ok(())
    }

    /// Test character and binary streams truncated to their declared length
    #[test]
    fn test_stream_inputs() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let mut stmt = CallableStatement::prepare_call(
            server.connect(),
            &FixtureParser,
            "{call test_out(?, ?)}",
        )?;
        stmt.register_out_parameter(2, SqlType::Varchar)?;

        stmt.set_character_stream(1, "abcdef", 3)?;
        stmt.execute()?;
        let mut text = String::new();
        stmt.get_character_stream(2)?
            .context("stream should not be NULL")?
            .read_to_string(&mut text)?;
        assert_eq!(text, "abc");

        stmt.set_binary_stream(1, b"xyz".to_vec(), 2)?;
        stmt.execute()?;
        assert_eq!(stmt.get_string(2)?.as_deref(), Some("xy"));
        Ok(())
    }

    /// Test a calendar-qualified timestamp round trip through an OUT parameter
    #[test]
    fn test_temporal_input_and_offset_read() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let mut stmt = CallableStatement::prepare_call(
            server.connect(),
            &FixtureParser,
            "{call test_out(?, ?)}",
        )?;
        let stamp = NaiveDate::from_ymd_opt(2024, 2, 29)
            .and_then(|d| d.and_hms_opt(13, 45, 0))
            .context("valid timestamp")?;
        let offset = FixedOffset::east_opt(2 * 3600).context("valid offset")?;
        stmt.set_timestamp_with_calendar(1, stamp, offset)?;
        stmt.register_out_parameter(2, SqlType::Timestamp)?;
        stmt.execute()?;

        assert_eq!(stmt.get_timestamp(2)?, Some(stamp));
        assert_eq!(
            stmt.get_timestamp_with_offset(2, offset)?,
            offset.from_local_datetime(&stamp).single()
        );
        Ok(())
    }

    /// Test connection notifications around executions
    #[test]
    fn test_execution_notifications() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let conn = server.connect();

        let mut no_result = CallableStatement::prepare_call(
            conn.clone(),
            &FixtureParser,
            "{call test_no_params}",
        )?;
        no_result.execute()?;
        assert_eq!(
            conn.events(),
            vec![Notification::Started, Notification::Completed(true)]
        );

        let mut with_result = CallableStatement::prepare_call(
            conn.clone(),
            &FixtureParser,
            "{call test_out(?, ?)}",
        )?;
        with_result.set_string(1, "n")?;
        with_result.register_out_parameter(2, SqlType::Varchar)?;
        with_result.execute()?;
        assert_eq!(conn.events().len(), 3, "completion waits for the result to be released");

        with_result.close()?;
        assert_eq!(conn.events().last(), Some(&Notification::Completed(true)));
        assert_eq!(conn.events().len(), 4);
        Ok(())
    }

    /// Test update counts of an executable procedure without outputs
    #[test]
    fn test_execute_update_counts_rows() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let mut stmt = CallableStatement::prepare_call(
            server.connect(),
            &FixtureParser,
            "{call set_emp_proj(?, ?, ?, ?)}",
        )?;
        stmt.set_i32(1, 4)?;
        stmt.set_string(2, "MAPDB")?;
        stmt.set_string(3, "Smith")?;
        stmt.set_string(4, "Mapping")?;

        assert_eq!(stmt.execute_update()?, 1);
        assert_eq!(stmt.update_count(), 1);
        Ok(())
    }
}
