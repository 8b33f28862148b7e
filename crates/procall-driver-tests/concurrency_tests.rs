//! Concurrency tests
//!
//! Statements of one connection share its lock, so their executions, fetches
//! and batch runs never overlap on the wire.

#[cfg(test)]
mod tests {
    use crate::fixtures::{FakeServer, FixtureParser, init_tracing};
    use anyhow::{Result, anyhow};
    use pretty_assertions::assert_eq;
    use procall_callable::{CallableStatement, ResultSource};
    use procall_core::SqlType;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    // Latency makes overlapping executions visible
    fn slow_server() -> Arc<FakeServer> {
        Arc::new(FakeServer::sample_catalog().with_latency(Duration::from_millis(5)))
    }

    /// Test executions of many statements on one connection being serialized
    #[test]
    fn test_executions_are_serialized() -> Result<()> {
        init_tracing();
        let server = slow_server();
        let conn = server.connect();

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let conn = conn.clone();
                thread::spawn(move || -> Result<Vec<String>> {
                    let mut stmt = CallableStatement::prepare_call(
                        conn,
                        &FixtureParser,
                        "{call test_out(?, ?)}",
                    )?;
                    stmt.register_out_parameter(2, SqlType::Varchar)?;
                    let mut seen = Vec::new();
                    for round in 0..5 {
                        stmt.set_string(1, format!("{worker}-{round}"))?;
                        stmt.execute()?;
                        seen.extend(stmt.get_string(2)?);
                    }
                    Ok(seen)
                })
            })
            .collect();

        for (worker, handle) in workers.into_iter().enumerate() {
            let seen = handle.join().map_err(|_| anyhow!("worker panicked"))??;
            let expected: Vec<String> = (0..5).map(|round| format!("{worker}-{round}")).collect();
            assert_eq!(seen, expected, "each statement reads its own OUT values");
        }

        assert_eq!(server.stats().executions, 20);
        assert_eq!(server.max_concurrent_executions(), 1);
        Ok(())
    }

    /// Test batches and single calls interleaving without overlap
    #[test]
    fn test_batch_holds_lock_for_whole_run() -> Result<()> {
        init_tracing();
        let server = slow_server();
        let conn = server.connect();

        let batch_conn = conn.clone();
        let batch = thread::spawn(move || -> Result<Vec<i64>> {
            let mut stmt = CallableStatement::prepare_call(
                batch_conn,
                &FixtureParser,
                "{call set_emp_proj(?, ?, ?, ?)}",
            )?;
            for project in 0..10 {
                stmt.set_i32(1, 11)?;
                stmt.set_string(2, format!("P{project:02}"))?;
                stmt.set_string(3, "Young")?;
                stmt.set_string(4, "Batch")?;
                stmt.add_batch()?;
            }
            Ok(stmt.execute_batch()?)
        });

        let mut single =
            CallableStatement::prepare_call(conn.clone(), &FixtureParser, "{call test_no_params}")?;
        for _ in 0..5 {
            single.execute()?;
        }

        let counts = batch.join().map_err(|_| anyhow!("batch thread panicked"))??;
        assert_eq!(counts, vec![1; 10]);
        assert_eq!(server.max_concurrent_executions(), 1);
        Ok(())
    }

    /// Test one statement iterating a cursor while another executes
    #[test]
    fn test_cursor_fetches_interleave_with_other_statements() -> Result<()> {
        init_tracing();
        let server = FakeServer::sample();
        let conn = server.connect();

        let mut rows =
            CallableStatement::prepare_call(conn.clone(), &FixtureParser, "{call factorial(?, ?)}")?;
        rows.set_i32(1, 6)?;
        rows.set_i32(2, 1)?;
        let mut other =
            CallableStatement::prepare_call(conn.clone(), &FixtureParser, "{call test_out(?, ?)}")?;
        other.register_out_parameter(2, SqlType::Varchar)?;

        let mut row_nums = Vec::new();
        rows.execute()?;
        loop {
            let cursor = rows
                .results()?
                .ok_or_else(|| anyhow!("selectable call should have a result"))?;
            if !cursor.next()? {
                break;
            }
            let row_num = cursor.get::<i32>(1)?.unwrap_or_default();
            row_nums.push(row_num);

            other.set_i32(1, row_num)?;
            other.execute()?;
            assert_eq!(other.get_string(2)?, Some(row_num.to_string()));
        }

        assert_eq!(row_nums, (0..=6).collect::<Vec<_>>());
        Ok(())
    }
}
